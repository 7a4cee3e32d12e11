//! Frame-time scaling with particle count.
//!
//! Run with: cargo bench -p pbf-kernel --bench scaling
//! Add `--features gpu` to include the wgpu backend.

use std::time::Instant;

use pbf_kernel::{Aabb, Simulation, SimulationSettings};

fn settings(n: usize) -> SimulationSettings {
    // Grow the tank with the particle count so the fill height stays similar.
    let side = (n as f32 / 8.0).cbrt().max(4.0);
    SimulationSettings::new(Aabb::new([0.0; 3], [side; 3]), n)
}

fn report(label: &str, n: usize, steps: usize, sim: &mut Simulation) {
    // Warmup
    for _ in 0..2 {
        sim.step();
    }
    let start = Instant::now();
    for _ in 0..steps {
        sim.step();
    }
    let secs = start.elapsed().as_secs_f64();
    println!(
        "{:>6} {:>10} {:>8} {:>10.3} {:>10.2} {:>10.2}",
        label,
        n,
        steps,
        secs,
        steps as f64 / secs,
        1000.0 * secs / steps as f64
    );
}

fn main() {
    println!("=== PBF Scaling ===\n");

    // (particles, steps) -- fewer steps at larger counts
    let configs = [(8_000, 20), (27_000, 10), (64_000, 5), (125_000, 3)];

    println!(
        "{:>6} {:>10} {:>8} {:>10} {:>10} {:>10}",
        "Backend", "Particles", "Steps", "Time (s)", "steps/s", "ms/step"
    );

    for &(n, steps) in &configs {
        match Simulation::from_settings(settings(n)) {
            Ok(mut sim) => report("cpu", n, steps, &mut sim),
            Err(e) => println!("cpu {n}: {e}"),
        }

        #[cfg(feature = "gpu")]
        {
            if pbf_kernel::gpu_available() {
                let built = Simulation::with_backend(settings(n), |p, params, domain, cells| {
                    pbf_kernel::GpuBackend::new(p, params, domain, cells)
                });
                match built {
                    Ok(mut sim) => report("gpu", n, steps, &mut sim),
                    Err(e) => println!("gpu {n}: {e}"),
                }
            }
        }
    }
}
