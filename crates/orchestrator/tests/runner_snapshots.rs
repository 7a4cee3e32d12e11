//! Runner snapshots while the tank walls move
//!
//! These tests drive an animated scenario through the background runner and
//! verify:
//! - Every published snapshot has the full particle count and finite values
//! - Snapshots stay inside the swept envelope while the x walls oscillate
//! - Bounds edits sent mid-run take effect at a frame boundary

use pbf_kernel::{Aabb, AnimationType};
use pbf_orchestrator::{build_simulation, AnimationConfig, BackendType, DomainBounds, RunnerState, SimulationConfig, SimulationRunner};
use std::thread;
use std::time::{Duration, Instant};

const PARTICLES: usize = 600;

fn animated_tank() -> SimulationConfig {
    let mut config = SimulationConfig::new(
        "tank",
        DomainBounds {
            min: [0.0, 0.0, 0.0],
            max: [6.0, 3.0, 2.0],
        },
        PARTICLES,
    );
    config.backend = BackendType::Cpu;
    config.animation = AnimationConfig {
        enabled: true,
        both_sides: true,
        kind: AnimationType::SineWave,
        period: 1.0,
        amplitude: 1.5,
    };
    config
}

fn wait_for_frames(runner: &SimulationRunner, frames: u64) {
    let deadline = Instant::now() + Duration::from_secs(60);
    while runner.frame_count() < frames {
        assert!(Instant::now() < deadline, "runner stalled at frame {}", runner.frame_count());
        assert_ne!(runner.state(), RunnerState::Error, "{:?}", runner.error_message());
        thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn snapshots_stay_inside_the_tank() {
    let config = animated_tank();
    let original = config.domain.to_aabb();
    // The sine can push either wall outward by up to the amplitude
    let amp = config.animation.amplitude;
    let envelope = Aabb::new(
        [original.min[0] - amp, original.min[1], original.min[2]],
        [original.max[0] + amp, original.max[1], original.max[2]],
    );
    let r = config.parameters.particle_radius;
    let runner = SimulationRunner::new(build_simulation(&config).unwrap(), Some(60));
    runner.start();

    let deadline = Instant::now() + Duration::from_secs(60);
    while runner.state() == RunnerState::Running {
        assert!(Instant::now() < deadline, "runner never finished");
        let snapshot = runner.latest_positions();
        assert_eq!(snapshot.len(), PARTICLES);
        for p in &snapshot {
            assert!(p.iter().all(|v| v.is_finite()), "non-finite {p:?}");
            assert!(envelope.contains_inset(*p, r - 1e-4), "{p:?} left the tank");
        }
        thread::sleep(Duration::from_millis(5));
    }

    assert_eq!(runner.state(), RunnerState::Finished);
    let sim = runner.join().unwrap();
    assert_eq!(sim.frame_number(), 60);
    assert!(sim.bounds().max[0] <= envelope.max[0]);
    assert!(sim.bounds().min[0] >= envelope.min[0]);
    assert_eq!(sim.bounds().min[1], original.min[1]);
}

#[test]
fn bounds_edit_lands_between_frames() {
    let mut config = animated_tank();
    config.animation.enabled = false;
    let runner = SimulationRunner::new(build_simulation(&config).unwrap(), None);
    runner.start();
    wait_for_frames(&runner, 5);

    let narrow = Aabb::new([1.0, 0.0, 0.0], [5.0, 3.0, 2.0]);
    runner.set_bounds(narrow).unwrap();
    let applied_after = runner.frame_count();
    wait_for_frames(&runner, applied_after + 3);

    // Containment against the edited box holds on every later snapshot
    let r = config.parameters.particle_radius;
    for p in runner.latest_positions() {
        assert!(narrow.contains_inset(p, r - 1e-4), "{p:?} outside narrowed tank");
    }

    runner.reset_bounds().unwrap();
    runner.stop();
    let sim = runner.join().unwrap();
    assert_eq!(sim.particle_count(), PARTICLES);
}
