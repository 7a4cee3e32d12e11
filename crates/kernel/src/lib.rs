//! Position-Based Fluids solver kernel
//!
//! This crate provides the per-frame PBF pipeline: a counting-sort spatial
//! hash, the density-constraint Jacobi iteration, vorticity confinement and an
//! animated axis-aligned domain. It is compute-only; rendering consumes the
//! position snapshot exposed by [`Simulation`].
//!
//! # Modules
//! - [`scan`] -- Exclusive prefix sum (Blelloch up/down-sweep).
//! - [`counter`] -- Atomic per-cell counters for histogram and slot claim.
//! - [`neighbor`] -- Uniform-grid spatial hash built by counting sort.
//! - [`sph`] -- Poly6 and Spiky kernels, artificial pressure.
//! - [`solver`] -- Density, lambda and position-delta passes.
//! - [`vorticity`] -- Curl, confinement, XSPH and wall clamping.
//! - [`bounds`] -- Domain box and its animation state machine.
//! - [`simulation`] -- Frame orchestration and the host API.
//! - `gpu` -- wgpu compute backend (feature `gpu`).

#![warn(missing_docs)]

pub mod bounds;
pub mod counter;
pub mod error;
pub mod neighbor;
pub mod params;
pub mod particle;
pub mod scan;
pub mod simulation;
pub mod solver;
pub mod sph;
pub mod vorticity;

#[cfg(feature = "gpu")]
#[allow(missing_docs)]
pub mod gpu;

pub use bounds::{Aabb, AnimationType, BoundsController};
pub use error::SimulationError;
pub use neighbor::{CellAssignment, CellOffset, SpatialHashGrid, EMPTY_CELL};
pub use params::{ideal_cells_per_axis, SimulationParameters, DEFAULT_DT};
pub use particle::ParticleArrays;
pub use simulation::{Simulation, SimulationSettings};

#[cfg(feature = "gpu")]
pub use gpu::{gpu_available, GpuBackend};

use solver::SolverBuffers;
use vorticity::VorticityBuffers;

// ---------------------------------------------------------------------------
// SolverBackend trait
// ---------------------------------------------------------------------------

/// Per-frame inputs every stage receives explicitly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameContext {
    /// Frame duration.
    pub dt: f32,
    /// Domain for this frame.
    pub domain: Aabb,
}

/// Trait that all solver back-ends (CPU, GPU) must implement.
///
/// A backend owns every per-frame buffer and advances the particles through
/// the fixed stage order each frame:
///
/// 1. Reset transient buffers
/// 2. Predict
/// 3. Rebuild the spatial hash
/// 4. `solver_iterations` x (density, lambda, delta, apply)
/// 5. Curl, confinement, XSPH, final position write
pub trait SolverBackend: Send {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Replace all particle state, e.g. on reset.
    fn load_particles(&mut self, particles: &ParticleArrays);

    /// Write new solver constants through to the backend.
    fn set_parameters(&mut self, params: &SimulationParameters);

    /// Run stages 1-5 for one frame.
    fn step(&mut self, ctx: &FrameContext);

    /// Clamp positions and predicted positions into `domain` after it moved.
    fn contain(&mut self, domain: &Aabb);

    /// Host copy of the particle state, valid after each `step`.
    fn particles(&self) -> &ParticleArrays;

    /// Positions as `[x, y, z]`, valid after each `step`.
    fn positions(&self) -> &[[f32; 3]];

    /// Densities from the last density pass.
    fn densities(&self) -> &[f32];

    /// Last frame's spatial hash, when the backend keeps one on the host.
    fn grid(&self) -> Option<&SpatialHashGrid> {
        None
    }

    /// The error that stopped this backend, if a frame failed. A faulted
    /// backend no longer advances.
    fn fault(&self) -> Option<&SimulationError> {
        None
    }
}

// ---------------------------------------------------------------------------
// CpuBackend -- rayon implementation of SolverBackend
// ---------------------------------------------------------------------------

/// Multi-threaded CPU implementation of the PBF pipeline.
pub struct CpuBackend {
    particles: ParticleArrays,
    params: SimulationParameters,
    cells_per_axis: [u32; 3],
    grid: SpatialHashGrid,
    solver: SolverBuffers,
    vorticity: VorticityBuffers,
    snapshot: Vec<[f32; 3]>,
}

impl CpuBackend {
    /// Create a CPU backend.
    ///
    /// # Arguments
    /// * `particles` - Initial particle pool.
    /// * `params` - Solver constants.
    /// * `domain` - Domain the grid is first laid out on.
    /// * `cells_per_axis` - Grid resolution.
    pub fn new(
        particles: ParticleArrays,
        params: SimulationParameters,
        domain: &Aabb,
        cells_per_axis: [u32; 3],
    ) -> Self {
        let grid = SpatialHashGrid::new(domain, cells_per_axis, params.smoothing_radius);
        let snapshot = particles.positions();
        Self {
            particles,
            params,
            cells_per_axis,
            grid,
            solver: SolverBuffers::default(),
            vorticity: VorticityBuffers::default(),
            snapshot,
        }
    }
}

impl SolverBackend for CpuBackend {
    fn name(&self) -> &str {
        "cpu"
    }

    fn load_particles(&mut self, particles: &ParticleArrays) {
        self.particles.clone_from(particles);
        self.particles.write_positions(&mut self.snapshot);
        self.solver.reset(0);
    }

    fn set_parameters(&mut self, params: &SimulationParameters) {
        self.params = *params;
    }

    fn step(&mut self, ctx: &FrameContext) {
        let n = self.particles.len();
        let params = self.params;

        // --- 1. Reset transients ---
        self.solver.reset(n);
        self.vorticity.reset(n);

        // --- 2. Predict ---
        solver::predict(&mut self.particles, &params, ctx.dt);

        // --- 3. Spatial hash ---
        self.grid.rebuild(
            &self.particles.px,
            &self.particles.py,
            &self.particles.pz,
            &ctx.domain,
            self.cells_per_axis,
            params.smoothing_radius,
        );

        // --- 4. Constraint iterations ---
        for _ in 0..params.solver_iterations {
            solver::iterate(&mut self.particles, &self.grid, &params, &mut self.solver, ctx);
        }

        // --- 5. Velocity update and final positions ---
        vorticity::finalize(&mut self.particles, &self.grid, &params, &mut self.vorticity, ctx);

        self.particles.write_positions(&mut self.snapshot);

        if tracing::enabled!(tracing::Level::DEBUG) && n > 0 {
            let mean = self.solver.density.iter().sum::<f32>() / n as f32;
            tracing::debug!(
                occupied_cells = self.grid.occupied_cells(),
                mean_density = mean,
                "cpu frame complete"
            );
        }
    }

    fn contain(&mut self, domain: &Aabb) {
        self.particles.clamp_into(domain, self.params.particle_radius);
        self.particles.write_positions(&mut self.snapshot);
    }

    fn particles(&self) -> &ParticleArrays {
        &self.particles
    }

    fn positions(&self) -> &[[f32; 3]] {
        &self.snapshot
    }

    fn densities(&self) -> &[f32] {
        &self.solver.density
    }

    fn grid(&self) -> Option<&SpatialHashGrid> {
        Some(&self.grid)
    }
}
