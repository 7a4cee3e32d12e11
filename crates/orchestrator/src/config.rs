//! Configuration parsing and validation for PBF scenarios

use pbf_kernel::simulation::{DEFAULT_FILL_FRACTION, DEFAULT_SEED};
use pbf_kernel::{Aabb, AnimationType, BoundsController, Simulation, SimulationError, SimulationParameters, SimulationSettings, DEFAULT_DT};
use serde::{Deserialize, Serialize};
use std::fs;

/// Main scenario configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Human-readable scenario name
    pub name: String,
    /// Initial domain bounds
    pub domain: DomainBounds,
    /// Number of fluid particles
    pub particle_count: usize,
    /// Frame duration (seconds)
    #[serde(default = "default_dt")]
    pub dt: f32,
    /// Grid resolution; derived from the domain when omitted
    #[serde(default)]
    pub cells_per_axis: Option<[u32; 3]>,
    /// Seed for the initial particle scatter
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Fraction of the domain height the initial block fills
    #[serde(default = "default_fill_fraction")]
    pub initial_fill_fraction: f32,
    /// Solver constants
    #[serde(default)]
    pub parameters: SimulationParameters,
    /// Domain animation
    #[serde(default)]
    pub animation: AnimationConfig,
    /// Compute backend
    #[serde(default)]
    pub backend: BackendType,
    /// Stop after this many frames
    #[serde(default)]
    pub max_frames: Option<u64>,
}

/// Domain bounding box
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DomainBounds {
    /// Minimum corner [x, y, z]
    pub min: [f32; 3],
    /// Maximum corner [x, y, z]
    pub max: [f32; 3],
}

impl DomainBounds {
    /// As a kernel box.
    pub fn to_aabb(self) -> Aabb {
        Aabb::new(self.min, self.max)
    }
}

/// Domain animation settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnimationConfig {
    /// Animate from the first frame
    #[serde(default)]
    pub enabled: bool,
    /// Move the min-X face as well as the max-X face
    #[serde(default)]
    pub both_sides: bool,
    /// Animation shape
    #[serde(default)]
    pub kind: AnimationType,
    /// Wave period
    #[serde(default = "default_period")]
    pub period: f32,
    /// Wave amplitude
    #[serde(default = "default_amplitude")]
    pub amplitude: f32,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            both_sides: false,
            kind: AnimationType::default(),
            period: default_period(),
            amplitude: default_amplitude(),
        }
    }
}

impl AnimationConfig {
    /// Push these settings into a simulation's bounds controller.
    pub fn apply(&self, sim: &mut Simulation) -> Result<(), SimulationError> {
        sim.set_animation_type(self.kind);
        sim.set_animation_period(self.period)?;
        sim.set_animation_amplitude(self.amplitude)?;
        if self.both_sides {
            sim.enable_both_sides_animation();
        } else {
            sim.disable_both_sides_animation();
        }
        if self.enabled {
            sim.enable_bounds_animation();
        } else {
            sim.disable_bounds_animation();
        }
        Ok(())
    }
}

/// Compute backend selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendType {
    /// GPU when available, otherwise CPU
    Auto,
    /// Multi-threaded CPU
    #[default]
    Cpu,
    /// wgpu compute shaders; an error if no adapter is found
    Gpu,
}

// Default values
fn default_dt() -> f32 {
    DEFAULT_DT
}

fn default_seed() -> u64 {
    DEFAULT_SEED
}

fn default_fill_fraction() -> f32 {
    DEFAULT_FILL_FRACTION
}

fn default_period() -> f32 {
    BoundsController::DEFAULT_PERIOD
}

fn default_amplitude() -> f32 {
    BoundsController::DEFAULT_AMPLITUDE
}

impl SimulationConfig {
    /// Minimal configuration with defaults for everything but the domain and
    /// particle count.
    pub fn new(name: impl Into<String>, domain: DomainBounds, particle_count: usize) -> Self {
        Self {
            name: name.into(),
            domain,
            particle_count,
            dt: default_dt(),
            cells_per_axis: None,
            seed: default_seed(),
            initial_fill_fraction: default_fill_fraction(),
            parameters: SimulationParameters::default(),
            animation: AnimationConfig::default(),
            backend: BackendType::default(),
            max_frames: None,
        }
    }

    /// Load configuration from a JSON file
    pub fn load(path: &str) -> Result<Self, String> {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {}", path, e))?;
        Self::from_json(&contents)
    }

    /// Parse and validate configuration JSON
    pub fn from_json(json: &str) -> Result<Self, String> {
        let config: SimulationConfig = serde_json::from_str(json)
            .map_err(|e| format!("Failed to parse config JSON: {}", e))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Scenario name must not be empty".to_string());
        }

        // Domain, particle count, dt, grid and solver constants
        self.to_settings().validate().map_err(|e| e.to_string())?;

        // Animation
        if !(self.animation.period.is_finite() && self.animation.period > 0.0) {
            return Err("Animation period must be positive".to_string());
        }
        if !(self.animation.amplitude.is_finite() && self.animation.amplitude >= 0.0) {
            return Err("Animation amplitude must be non-negative".to_string());
        }

        // Check max_frames
        if let Some(max_frames) = self.max_frames {
            if max_frames == 0 {
                return Err("max_frames must be at least 1".to_string());
            }
        }

        Ok(())
    }

    /// Kernel construction settings
    pub fn to_settings(&self) -> SimulationSettings {
        SimulationSettings {
            domain: self.domain.to_aabb(),
            particle_count: self.particle_count,
            parameters: self.parameters,
            dt: self.dt,
            cells_per_axis: self.cells_per_axis,
            seed: self.seed,
            initial_fill_fraction: self.initial_fill_fraction,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_cube() -> DomainBounds {
        DomainBounds {
            min: [0.0, 0.0, 0.0],
            max: [1.0, 1.0, 1.0],
        }
    }

    #[test]
    fn test_minimal_json_fills_defaults() {
        let config = SimulationConfig::from_json(
            r#"{ "name": "cube", "domain": { "min": [0, 0, 0], "max": [4, 4, 4] }, "particle_count": 500 }"#,
        )
        .unwrap();

        assert_eq!(config.dt, DEFAULT_DT);
        assert_eq!(config.seed, DEFAULT_SEED);
        assert_eq!(config.cells_per_axis, None);
        assert_eq!(config.backend, BackendType::Cpu);
        assert_eq!(config.parameters, SimulationParameters::default());
        assert_eq!(config.animation, AnimationConfig::default());
        assert!(!config.animation.enabled);
        assert_eq!(config.animation.period, 1.0);
        assert_eq!(config.animation.amplitude, 10.0);
    }

    #[test]
    fn test_partial_parameters_keep_other_defaults() {
        let config = SimulationConfig::from_json(
            r#"{
                "name": "zero-g",
                "domain": { "min": [0, 0, 0], "max": [4, 4, 4] },
                "particle_count": 100,
                "parameters": { "gravity": [0, 0, 0], "solver_iterations": 6 },
                "animation": { "enabled": true, "kind": "Compress" },
                "backend": "Auto"
            }"#,
        )
        .unwrap();

        assert_eq!(config.parameters.gravity, [0.0; 3]);
        assert_eq!(config.parameters.solver_iterations, 6);
        assert_eq!(config.parameters.smoothing_radius, 0.6);
        assert_eq!(config.animation.kind, AnimationType::Compress);
        assert_eq!(config.backend, BackendType::Auto);
    }

    #[test]
    fn test_validation_domain_bounds() {
        let mut config = SimulationConfig::new("test", unit_cube(), 10);
        config.domain.min[0] = 1.0;
        config.domain.max[0] = 0.0;
        assert!(config.validate().is_err());

        config.domain = unit_cube();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let base = SimulationConfig::new("test", unit_cube(), 10);

        let mut c = base.clone();
        c.particle_count = 0;
        assert!(c.validate().is_err());

        let mut c = base.clone();
        c.dt = -0.1;
        assert!(c.validate().is_err());

        let mut c = base.clone();
        c.cells_per_axis = Some([4, 0, 4]);
        assert!(c.validate().is_err());

        let mut c = base.clone();
        c.animation.period = 0.0;
        assert!(c.validate().is_err());

        let mut c = base.clone();
        c.max_frames = Some(0);
        assert!(c.validate().is_err());

        let mut c = base;
        c.parameters.smoothing_radius = 0.0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        assert!(SimulationConfig::from_json("{ not json").is_err());
        assert!(SimulationConfig::load("/definitely/not/here.json").is_err());
    }
}
