//! Reference scenario framework for PBF fluid validation
//!
//! Each reference test loads a JSON scenario, runs it to completion through
//! the orchestrator's runner, and checks the final particle state against a
//! set of expected properties.

#[cfg(test)]
mod tests;


use pbf_kernel::sph::poly6;
use pbf_kernel::{Aabb, Simulation, SpatialHashGrid};
use pbf_orchestrator::config::{BackendType, SimulationConfig};
use std::time::Instant;

/// Expected result criteria for a reference test
#[derive(Debug, Clone, Default)]
pub struct ExpectedResult {
    /// Particles stay inside the final domain
    pub containment: Option<ContainmentCheck>,
    /// Interior density near rest density
    pub density: Option<DensityCheck>,
    /// The fluid's centre of mass has dropped
    pub settling: Option<SettlingCheck>,
}

/// Check that particles remain within the domain inset by the particle radius
#[derive(Debug, Clone)]
pub struct ContainmentCheck {
    /// Allowed overshoot past the inset walls
    pub tolerance: f32,
}

/// Check the mean density of interior particles
#[derive(Debug, Clone)]
pub struct DensityCheck {
    /// Relative tolerance (0.0 to 1.0)
    pub tolerance: f32,
    /// Fewer interior particles than this fails the check
    pub min_interior: usize,
}

/// Check that the mean height fell below its starting value
#[derive(Debug, Clone)]
pub struct SettlingCheck {
    /// Required drop as a fraction of the starting mean height above the floor
    pub min_drop_fraction: f32,
}

/// Result of running a reference test
#[derive(Debug)]
pub struct TestResult {
    /// Test name
    pub name: String,
    /// Whether test passed
    pub passed: bool,
    /// Individual check results
    pub checks: Vec<CheckResult>,
    /// Number of frames executed
    pub frames: u64,
    /// Simulated time (seconds)
    pub sim_time: f64,
    /// Wall-clock time (seconds)
    pub wall_time: f64,
    /// Backend the scenario ran on
    pub backend: String,
}

/// Result of an individual validation check
#[derive(Debug)]
pub struct CheckResult {
    /// Check name
    pub name: String,
    /// Whether check passed
    pub passed: bool,
    /// Detail or failure message
    pub message: Option<String>,
}

impl CheckResult {
    fn pass(name: &str, message: String) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            message: Some(message),
        }
    }

    fn fail(name: &str, message: String) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            message: Some(message),
        }
    }
}

/// A reference test case
pub struct ReferenceTest {
    /// Test name
    pub name: String,
    /// Path to scenario file; must set `max_frames`
    pub config_path: String,
    /// Expected results to validate
    pub expected: ExpectedResult,
}

impl ReferenceTest {
    /// Run the reference test on the scenario's configured backend
    pub fn run(&self) -> Result<TestResult, String> {
        self.run_with(None)
    }

    /// Run the reference test, optionally forcing a backend
    pub fn run_with(&self, backend: Option<BackendType>) -> Result<TestResult, String> {
        tracing::info!("Running reference test: {}", self.name);

        let mut config = SimulationConfig::load(&self.config_path)?;
        if let Some(backend) = backend {
            config.backend = backend;
        }
        let frames = config
            .max_frames
            .ok_or_else(|| format!("{} does not set max_frames", self.config_path))?;

        let simulation = pbf_orchestrator::build_simulation(&config).map_err(|e| e.to_string())?;
        let start_height = mean_height_above_floor(&simulation);
        let backend = simulation.backend_name().to_string();

        tracing::info!(
            "Initialized: {} particles, h={}, {} frames",
            simulation.particle_count(),
            config.parameters.smoothing_radius,
            frames
        );

        let wall_start = Instant::now();
        let runner = pbf_orchestrator::SimulationRunner::new(simulation, Some(frames));
        runner.start();
        let simulation = runner.join()?;
        let wall_time = wall_start.elapsed().as_secs_f64();
        let sim_time = simulation.frame_number() as f64 * config.dt as f64;
        tracing::info!(
            "Simulation complete: {} frames, {:.3}s simulated in {:.2}s",
            simulation.frame_number(),
            sim_time,
            wall_time
        );

        let mut checks = vec![validate_particle_count(&simulation, config.particle_count)];

        if let Some(ref containment) = self.expected.containment {
            checks.push(validate_containment(&simulation, containment));
        }

        if let Some(ref density) = self.expected.density {
            checks.push(validate_density(&simulation, density));
        }

        if let Some(ref settling) = self.expected.settling {
            checks.push(validate_settling(&simulation, start_height, settling));
        }

        Ok(TestResult {
            name: self.name.clone(),
            passed: checks.iter().all(|c| c.passed),
            checks,
            frames: simulation.frame_number(),
            sim_time,
            wall_time,
            backend,
        })
    }
}

fn mean_height_above_floor(sim: &Simulation) -> f32 {
    let floor = sim.bounds().min[1];
    let positions = sim.positions();
    positions.iter().map(|p| p[1] - floor).sum::<f32>() / positions.len().max(1) as f32
}

/// The pool never gains or loses particles
fn validate_particle_count(sim: &Simulation, expected: usize) -> CheckResult {
    let finite = sim.positions().iter().all(|p| p.iter().all(|v| v.is_finite()));
    if sim.particle_count() == expected && sim.positions().len() == expected && finite {
        CheckResult::pass("Particle Count", format!("{} particles, all finite", expected))
    } else {
        CheckResult::fail(
            "Particle Count",
            format!(
                "expected {} finite particles, got {} (finite: {})",
                expected,
                sim.positions().len(),
                finite
            ),
        )
    }
}

/// Validate that particles remain within the final domain
fn validate_containment(sim: &Simulation, check: &ContainmentCheck) -> CheckResult {
    let domain: Aabb = sim.bounds();
    let r = sim.parameters().particle_radius;
    let limits = [
        domain.inset_limits(0, r),
        domain.inset_limits(1, r),
        domain.inset_limits(2, r),
    ];

    let mut violations = 0;
    let mut max_violation = 0.0_f32;
    for p in sim.positions() {
        for (axis, &(lo, hi)) in limits.iter().enumerate() {
            let over = (lo - p[axis]).max(p[axis] - hi);
            if over > check.tolerance {
                violations += 1;
                max_violation = max_violation.max(over);
            }
        }
    }

    if violations == 0 {
        CheckResult::pass("Containment", format!("all inside {:?}..{:?}", domain.min, domain.max))
    } else {
        CheckResult::fail(
            "Containment",
            format!(
                "{} coordinates out of bounds (max violation: {:.6})",
                violations, max_violation
            ),
        )
    }
}

/// Re-estimate density on the final positions and compare the interior mean
/// against rest density.
///
/// Interior particles sit at least h from every wall and below the median
/// height, so their kernel support is fully populated.
fn validate_density(sim: &Simulation, check: &DensityCheck) -> CheckResult {
    let params = sim.parameters();
    let h = params.smoothing_radius;
    let m = params.particle_mass();
    let domain = sim.bounds();
    let cells = sim.cells_per_axis();
    let pa = sim.particles();

    let mut grid = SpatialHashGrid::new(&domain, cells, h);
    grid.rebuild(&pa.x, &pa.y, &pa.z, &domain, cells, h);

    let mut heights = pa.y.clone();
    heights.sort_by(f32::total_cmp);
    let median = heights.get(heights.len() / 2).copied().unwrap_or(domain.min[1]);

    let interior: Vec<usize> = (0..pa.len())
        .filter(|&i| {
            let p = [pa.x[i], pa.y[i], pa.z[i]];
            p[1] < median && domain.contains_inset(p, h)
        })
        .collect();

    if interior.len() < check.min_interior {
        return CheckResult::fail(
            "Interior Density",
            format!("only {} interior particles (need {})", interior.len(), check.min_interior),
        );
    }

    let total: f32 = interior
        .iter()
        .map(|&i| {
            let mut rho = 0.0;
            grid.for_each_neighbor(i, &pa.x, &pa.y, &pa.z, h, |_, _, r_sq| rho += m * poly6(r_sq, h));
            rho
        })
        .sum();
    let mean = total / interior.len() as f32;
    let error = (mean - params.rest_density).abs() / params.rest_density;

    let message = format!(
        "Rest: {:.1}, Interior mean: {:.1} over {} particles (error: {:.1}%, tolerance: {:.1}%)",
        params.rest_density,
        mean,
        interior.len(),
        error * 100.0,
        check.tolerance * 100.0
    );
    if error <= check.tolerance {
        CheckResult::pass("Interior Density", message)
    } else {
        CheckResult::fail("Interior Density", message)
    }
}

/// Validate that the fluid has fallen under gravity
fn validate_settling(sim: &Simulation, start_height: f32, check: &SettlingCheck) -> CheckResult {
    let end_height = mean_height_above_floor(sim);
    let required = start_height * (1.0 - check.min_drop_fraction);
    let message = format!(
        "Mean height {:.3} -> {:.3} (limit: {:.3})",
        start_height, end_height, required
    );
    if end_height <= required {
        CheckResult::pass("Settling", message)
    } else {
        CheckResult::fail("Settling", message)
    }
}

impl TestResult {
    /// Print a summary of the test result
    pub fn print_summary(&self) {
        println!("\n{}", "=".repeat(80));
        println!("Test: {}", self.name);
        println!("{}", "=".repeat(80));
        println!("Status: {}", if self.passed { "PASSED" } else { "FAILED" });
        println!("Backend: {}", self.backend);
        println!("Frames: {}", self.frames);
        println!("Simulated time: {:.3} s", self.sim_time);
        println!("Wall time: {:.2} s", self.wall_time);
        println!("\nValidation Checks:");
        for check in &self.checks {
            let status = if check.passed { "PASS" } else { "FAIL" };
            print!("  [{}] {}", status, check.name);
            if let Some(ref msg) = check.message {
                print!(" - {}", msg);
            }
            println!();
        }
        println!("{}", "=".repeat(80));
    }
}

/// Resolve a scenario file in the workspace `configs/` directory
pub fn config_path(file: &str) -> String {
    let manifest_dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .parent()
        .unwrap_or(manifest_dir)
        .join("configs")
        .join(file)
        .to_string_lossy()
        .to_string()
}

/// Fluid at rest with gravity off; the interior relaxes to rest density.
pub fn quiescent_cube_test() -> ReferenceTest {
    ReferenceTest {
        name: "Quiescent Cube".to_string(),
        config_path: config_path("quiescent-cube.json"),
        expected: ExpectedResult {
            containment: Some(ContainmentCheck { tolerance: 1e-4 }),
            density: Some(DensityCheck {
                tolerance: 0.05,
                min_interior: 100,
            }),
            settling: None,
        },
    }
}

/// A tall block released under gravity collapses toward the floor.
pub fn dam_break_test() -> ReferenceTest {
    ReferenceTest {
        name: "Dam Break".to_string(),
        config_path: config_path("dam-break.json"),
        expected: ExpectedResult {
            containment: Some(ContainmentCheck { tolerance: 1e-4 }),
            density: None,
            settling: Some(SettlingCheck {
                min_drop_fraction: 0.1,
            }),
        },
    }
}

/// Both X walls oscillate; no particle leaves the moving tank.
pub fn wave_tank_test() -> ReferenceTest {
    ReferenceTest {
        name: "Wave Tank".to_string(),
        config_path: config_path("wave-tank.json"),
        expected: ExpectedResult {
            containment: Some(ContainmentCheck { tolerance: 1e-4 }),
            density: None,
            settling: None,
        },
    }
}

/// Get all reference tests
pub fn all_tests() -> Vec<ReferenceTest> {
    vec![quiescent_cube_test(), dam_break_test(), wave_tank_test()]
}
