//! Orchestration Layer
//!
//! This crate wires scenario files to the PBF kernel:
//! - JSON scenario parsing and validation
//! - Backend selection (CPU, GPU, or automatic fallback)
//! - Simulation runner with lifecycle management

#![warn(missing_docs)]

pub mod config;
pub mod runner;

pub use config::{AnimationConfig, BackendType, DomainBounds, SimulationConfig};
pub use runner::{RunnerCommand, RunnerState, SimulationRunner};

use pbf_kernel::{Simulation, SimulationError};

/// Create a complete simulation from a configuration file
///
/// This function performs the full simulation setup pipeline:
/// 1. Load and validate the configuration
/// 2. Build the simulation on the configured backend
/// 3. Apply the animation settings
/// 4. Wrap in a SimulationRunner for lifecycle management
///
/// # Arguments
/// * `config_path` - Path to the JSON configuration file
///
/// # Returns
/// A `SimulationRunner` ready to be started, or an error if setup fails
///
/// # Example
/// ```no_run
/// use pbf_orchestrator::create_simulation;
///
/// let runner = create_simulation("configs/dam-break.json")?;
/// runner.start();
/// // ... query positions, pause, resume, etc.
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn create_simulation(config_path: &str) -> Result<SimulationRunner, Box<dyn std::error::Error>> {
    tracing::info!("Creating simulation from config: {}", config_path);

    let config = SimulationConfig::load(config_path)?;
    tracing::info!("Configuration loaded: {}", config.name);

    let simulation = build_simulation(&config)?;
    Ok(SimulationRunner::new(simulation, config.max_frames))
}

/// Build a simulation from an already validated configuration.
pub fn build_simulation(config: &SimulationConfig) -> Result<Simulation, Box<dyn std::error::Error>> {
    let settings = config.to_settings();

    let mut simulation = match config.backend {
        BackendType::Cpu => Simulation::from_settings(settings)?,
        BackendType::Gpu => build_gpu(settings)?,
        BackendType::Auto => match build_gpu(settings.clone()) {
            Ok(sim) => sim,
            Err(e) => {
                tracing::warn!("GPU backend unavailable ({}), falling back to CPU", e);
                Simulation::from_settings(settings)?
            }
        },
    };

    config.animation.apply(&mut simulation)?;

    tracing::info!(
        "Simulation ready: {} particles on {} backend, cells {:?}",
        simulation.particle_count(),
        simulation.backend_name(),
        simulation.cells_per_axis()
    );
    Ok(simulation)
}

#[cfg(feature = "gpu")]
fn build_gpu(settings: pbf_kernel::SimulationSettings) -> Result<Simulation, SimulationError> {
    Simulation::with_backend(settings, pbf_kernel::GpuBackend::new)
}

#[cfg(not(feature = "gpu"))]
fn build_gpu(_settings: pbf_kernel::SimulationSettings) -> Result<Simulation, SimulationError> {
    Err(SimulationError::Backend(
        "built without the `gpu` feature".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn cube_config(backend: BackendType) -> SimulationConfig {
        let mut config = SimulationConfig::new(
            "cube",
            DomainBounds {
                min: [0.0; 3],
                max: [3.0; 3],
            },
            150,
        );
        config.backend = backend;
        config
    }

    #[test]
    fn test_cpu_backend_builds() {
        let sim = build_simulation(&cube_config(BackendType::Cpu)).unwrap();
        assert_eq!(sim.particle_count(), 150);
        assert_eq!(sim.backend_name(), "cpu");
        assert_eq!(sim.frame_number(), 0);
    }

    #[test]
    fn test_auto_backend_always_builds() {
        let sim = build_simulation(&cube_config(BackendType::Auto)).unwrap();
        assert_eq!(sim.particle_count(), 150);
    }

    #[cfg(not(feature = "gpu"))]
    #[test]
    fn test_gpu_backend_requires_feature() {
        assert!(build_simulation(&cube_config(BackendType::Gpu)).is_err());
    }

    #[test]
    fn test_animation_settings_are_applied() {
        let mut config = cube_config(BackendType::Cpu);
        config.animation = AnimationConfig {
            enabled: true,
            both_sides: true,
            kind: pbf_kernel::AnimationType::LinearRamp,
            period: 2.0,
            amplitude: 0.5,
        };
        let sim = build_simulation(&config).unwrap();
        assert!(sim.is_animating_bounds());
        assert!(sim.is_animating_both_sides());
        assert_eq!(sim.animation_type(), pbf_kernel::AnimationType::LinearRamp);
        assert_eq!(sim.animation_period(), 2.0);
        assert_eq!(sim.animation_amplitude(), 0.5);
    }

    #[test]
    fn test_create_simulation_from_file() {
        let path = std::env::temp_dir().join(format!("pbf-orchestrator-{}.json", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{ "name": "file", "domain": {{ "min": [0, 0, 0], "max": [3, 3, 3] }},
                 "particle_count": 100, "max_frames": 3 }}"#
        )
        .unwrap();
        drop(file);

        let runner = create_simulation(path.to_str().unwrap()).unwrap();
        runner.start();
        let sim = runner.join().unwrap();
        assert_eq!(sim.frame_number(), 3);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_create_simulation_missing_file() {
        assert!(create_simulation("/no/such/scenario.json").is_err());
    }
}
