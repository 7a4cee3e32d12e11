//! Solver constants and grid sizing.
//!
//! `SimulationParameters` is the set of scalars every stage reads. It is
//! immutable for the duration of a frame and replaced wholesale between
//! frames; backends receive a copy on every change.

use serde::{Deserialize, Serialize};

use crate::bounds::Aabb;
use crate::error::{invalid, SimulationError};

/// Rest density of water (kg/m^3), the default fluid.
pub const WATER_REST_DENSITY: f32 = 1000.0;

/// Default frame duration (seconds).
pub const DEFAULT_DT: f32 = 1.0 / 30.0;

/// Target number of particle radii covered by one cell along each axis when
/// cells-per-axis is derived automatically.
pub const PARTICLES_PER_CELL: [f32; 3] = [4.0, 4.0, 4.0];

/// Scalar constants for the PBF solver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationParameters {
    /// Particle radius. Positions are kept at least this far from each wall.
    #[serde(default = "default_particle_radius")]
    pub particle_radius: f32,
    /// Target fluid density.
    #[serde(default = "default_rest_density")]
    pub rest_density: f32,
    /// Constraint-force-mixing term added to the lambda denominator.
    #[serde(default = "default_relaxation_epsilon")]
    pub relaxation_epsilon: f32,
    /// SPH kernel support radius h.
    #[serde(default = "default_smoothing_radius")]
    pub smoothing_radius: f32,
    /// Artificial pressure strength k in `scorr = -k (W(r)/W(dq))^n`.
    #[serde(default = "default_artificial_pressure_k")]
    pub artificial_pressure_k: f32,
    /// Artificial pressure exponent n.
    #[serde(default = "default_artificial_pressure_n")]
    pub artificial_pressure_n: i32,
    /// Artificial pressure reference distance, as a fraction of h.
    #[serde(default = "default_artificial_pressure_dq")]
    pub artificial_pressure_dq: f32,
    /// Vorticity confinement coefficient.
    #[serde(default = "default_vorticity_epsilon")]
    pub vorticity_epsilon: f32,
    /// XSPH viscosity coefficient c.
    #[serde(default = "default_xsph_viscosity")]
    pub xsph_viscosity: f32,
    /// Jacobi iterations per frame.
    #[serde(default = "default_solver_iterations")]
    pub solver_iterations: u32,
    /// Accumulated external acceleration applied during prediction.
    #[serde(default = "default_gravity")]
    pub gravity: [f32; 3],
    /// Fraction of the outward normal velocity reflected at a wall
    /// (0 zeroes it).
    #[serde(default)]
    pub wall_restitution: f32,
}

fn default_particle_radius() -> f32 {
    0.15
}

fn default_rest_density() -> f32 {
    WATER_REST_DENSITY
}

fn default_relaxation_epsilon() -> f32 {
    5.0
}

fn default_smoothing_radius() -> f32 {
    0.6
}

fn default_artificial_pressure_k() -> f32 {
    0.01
}

fn default_artificial_pressure_n() -> i32 {
    4
}

fn default_artificial_pressure_dq() -> f32 {
    0.2
}

fn default_vorticity_epsilon() -> f32 {
    0.05
}

fn default_xsph_viscosity() -> f32 {
    0.05
}

fn default_solver_iterations() -> u32 {
    4
}

fn default_gravity() -> [f32; 3] {
    [0.0, -9.81, 0.0]
}

impl Default for SimulationParameters {
    fn default() -> Self {
        Self {
            particle_radius: default_particle_radius(),
            rest_density: default_rest_density(),
            relaxation_epsilon: default_relaxation_epsilon(),
            smoothing_radius: default_smoothing_radius(),
            artificial_pressure_k: default_artificial_pressure_k(),
            artificial_pressure_n: default_artificial_pressure_n(),
            artificial_pressure_dq: default_artificial_pressure_dq(),
            vorticity_epsilon: default_vorticity_epsilon(),
            xsph_viscosity: default_xsph_viscosity(),
            solver_iterations: default_solver_iterations(),
            gravity: default_gravity(),
            wall_restitution: 0.0,
        }
    }
}

impl SimulationParameters {
    /// Mass of one particle: rest density times the cube of the particle
    /// diameter.
    pub fn particle_mass(&self) -> f32 {
        self.rest_density * self.rest_volume()
    }

    /// Volume one particle occupies at rest, `m / rho0`.
    pub fn rest_volume(&self) -> f32 {
        let d = 2.0 * self.particle_radius;
        d * d * d
    }

    /// Check every field is in range.
    pub fn validate(&self) -> Result<(), SimulationError> {
        let positive = [
            ("particle_radius", self.particle_radius),
            ("rest_density", self.rest_density),
            ("smoothing_radius", self.smoothing_radius),
            ("relaxation_epsilon", self.relaxation_epsilon),
            ("artificial_pressure_dq", self.artificial_pressure_dq),
        ];
        for (name, v) in positive {
            if !(v.is_finite() && v > 0.0) {
                return Err(invalid(format!("{} must be positive and finite, got {}", name, v)));
            }
        }

        let non_negative = [
            ("artificial_pressure_k", self.artificial_pressure_k),
            ("vorticity_epsilon", self.vorticity_epsilon),
            ("xsph_viscosity", self.xsph_viscosity),
            ("wall_restitution", self.wall_restitution),
        ];
        for (name, v) in non_negative {
            if !(v.is_finite() && v >= 0.0) {
                return Err(invalid(format!("{} must be non-negative and finite, got {}", name, v)));
            }
        }

        if self.artificial_pressure_dq >= 1.0 {
            return Err(invalid("artificial_pressure_dq must be a fraction of h below 1"));
        }
        if self.wall_restitution > 1.0 {
            return Err(invalid("wall_restitution must be in [0, 1]"));
        }
        if self.artificial_pressure_n < 1 {
            return Err(invalid("artificial_pressure_n must be at least 1"));
        }
        if self.gravity.iter().any(|g| !g.is_finite()) {
            return Err(invalid("gravity must be finite"));
        }
        Ok(())
    }
}

/// Derive cells per axis for `domain`.
///
/// Each cell spans roughly [`PARTICLES_PER_CELL`] particle radii. The count is
/// capped so a cell is never narrower than `smoothing_radius`, which keeps the
/// 27-cell stencil complete on the original domain.
pub fn ideal_cells_per_axis(domain: &Aabb, particle_radius: f32, smoothing_radius: f32) -> [u32; 3] {
    let extent = domain.extent();
    let mut cells = [1u32; 3];
    for axis in 0..3 {
        let target = ((extent[axis] / particle_radius) / PARTICLES_PER_CELL[axis]).ceil();
        let cap = (extent[axis] / smoothing_radius).floor();
        cells[axis] = target.min(cap).max(1.0) as u32;
    }
    cells
}
