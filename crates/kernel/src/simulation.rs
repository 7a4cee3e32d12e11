//! Frame orchestration and the host-facing API.
//!
//! `Simulation` owns the backend (and through it every particle and cell
//! buffer), the domain controller and the frame counter. One call to
//! [`Simulation::step`] runs the complete frame:
//!
//! ```text
//! reset -> predict -> hash/sort -> N x solve -> vorticity/finalize -> animate bounds -> frame++
//! ```

use crate::bounds::{Aabb, AnimationType, BoundsController};
use crate::error::{invalid, SimulationError};
use crate::neighbor::SpatialHashGrid;
use crate::params::{ideal_cells_per_axis, SimulationParameters, DEFAULT_DT};
use crate::particle::ParticleArrays;
use crate::{CpuBackend, FrameContext, SolverBackend};

/// Default seed for the initial particle scatter.
pub const DEFAULT_SEED: u64 = 0x5EED;

/// Default fraction of the domain height the initial block fills.
pub const DEFAULT_FILL_FRACTION: f32 = 0.25;

/// Everything needed to build (and rebuild on reset) a simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationSettings {
    /// Initial domain.
    pub domain: Aabb,
    /// Number of particles in the pool.
    pub particle_count: usize,
    /// Solver constants.
    pub parameters: SimulationParameters,
    /// Frame duration.
    pub dt: f32,
    /// Grid resolution; derived from the domain when `None`.
    pub cells_per_axis: Option<[u32; 3]>,
    /// Seed for the initial scatter.
    pub seed: u64,
    /// Fraction of the domain height the initial block fills.
    pub initial_fill_fraction: f32,
}

impl SimulationSettings {
    /// Settings with default parameters, frame duration, seed and fill.
    pub fn new(domain: Aabb, particle_count: usize) -> Self {
        Self {
            domain,
            particle_count,
            parameters: SimulationParameters::default(),
            dt: DEFAULT_DT,
            cells_per_axis: None,
            seed: DEFAULT_SEED,
            initial_fill_fraction: DEFAULT_FILL_FRACTION,
        }
    }

    /// Check every field before any buffer is allocated.
    pub fn validate(&self) -> Result<(), SimulationError> {
        self.domain.validate()?;
        self.parameters.validate()?;
        if self.particle_count == 0 {
            return Err(invalid("particle_count must be at least 1"));
        }
        if u32::try_from(self.particle_count).is_err() {
            return Err(invalid(format!("particle_count {} exceeds u32 range", self.particle_count)));
        }
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(invalid(format!("dt must be positive and finite, got {}", self.dt)));
        }
        if let Some(cells) = self.cells_per_axis {
            if cells.iter().any(|&c| c == 0) {
                return Err(invalid("cells_per_axis must be at least 1 on every axis"));
            }
            let total = cells.iter().try_fold(1u32, |acc, &c| acc.checked_mul(c));
            if total.is_none() {
                return Err(invalid("cells_per_axis product exceeds u32 range"));
            }
        }
        if !(self.initial_fill_fraction > 0.0 && self.initial_fill_fraction <= 1.0) {
            return Err(invalid(format!(
                "initial_fill_fraction must be in (0, 1], got {}",
                self.initial_fill_fraction
            )));
        }
        Ok(())
    }

    /// Resolution the grid will use.
    pub fn resolved_cells_per_axis(&self) -> [u32; 3] {
        self.cells_per_axis.unwrap_or_else(|| {
            ideal_cells_per_axis(
                &self.domain,
                self.parameters.particle_radius,
                self.parameters.smoothing_radius,
            )
        })
    }

    /// The construction-time particle pool.
    pub fn initial_particles(&self) -> ParticleArrays {
        ParticleArrays::seeded_block(
            self.particle_count,
            &self.domain,
            self.parameters.particle_radius,
            self.initial_fill_fraction,
            self.seed,
        )
    }
}

/// A running PBF simulation.
pub struct Simulation {
    settings: SimulationSettings,
    params: SimulationParameters,
    cells_per_axis: [u32; 3],
    bounds: BoundsController,
    frame: u64,
    backend: Box<dyn SolverBackend>,
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("backend", &self.backend.name())
            .field("particles", &self.settings.particle_count)
            .field("cells_per_axis", &self.cells_per_axis)
            .field("frame", &self.frame)
            .field("bounds", &self.bounds.current())
            .finish()
    }
}

impl Simulation {
    /// Build a CPU-backed simulation.
    ///
    /// # Arguments
    /// * `domain` - Initial domain; `min < max` on every axis.
    /// * `particle_count` - Size of the particle pool.
    /// * `parameters` - Solver constants.
    /// * `dt` - Frame duration.
    /// * `cells_per_axis` - Grid resolution, derived when `None`.
    pub fn new(
        domain: Aabb,
        particle_count: usize,
        parameters: SimulationParameters,
        dt: f32,
        cells_per_axis: Option<[u32; 3]>,
    ) -> Result<Self, SimulationError> {
        let settings = SimulationSettings {
            parameters,
            dt,
            cells_per_axis,
            ..SimulationSettings::new(domain, particle_count)
        };
        Self::from_settings(settings)
    }

    /// Build a CPU-backed simulation from full settings.
    pub fn from_settings(settings: SimulationSettings) -> Result<Self, SimulationError> {
        Self::with_backend(settings, |particles, params, domain, cells| {
            Ok(CpuBackend::new(particles.clone(), *params, domain, cells))
        })
    }

    /// Build a simulation on a custom backend.
    ///
    /// `factory` receives the initial particles, parameters, domain and
    /// resolved grid resolution. Settings are validated before it runs.
    pub fn with_backend<B, F>(settings: SimulationSettings, factory: F) -> Result<Self, SimulationError>
    where
        B: SolverBackend + 'static,
        F: FnOnce(&ParticleArrays, &SimulationParameters, &Aabb, [u32; 3]) -> Result<B, SimulationError>,
    {
        settings.validate()?;
        let bounds = BoundsController::new(settings.domain)?;
        let cells_per_axis = settings.resolved_cells_per_axis();
        let particles = settings.initial_particles();
        let backend = factory(&particles, &settings.parameters, &settings.domain, cells_per_axis)?;

        tracing::info!(
            particles = settings.particle_count,
            cells_per_axis = ?cells_per_axis,
            backend = backend.name(),
            "simulation created"
        );

        Ok(Self {
            params: settings.parameters,
            settings,
            cells_per_axis,
            bounds,
            frame: 0,
            backend: Box::new(backend),
        })
    }

    /// Advance one frame.
    ///
    /// Does nothing once the backend has faulted; see [`Simulation::fault`].
    pub fn step(&mut self) {
        if self.backend.fault().is_some() {
            return;
        }
        let ctx = FrameContext {
            dt: self.settings.dt,
            domain: self.bounds.current(),
        };
        self.backend.step(&ctx);
        if self.backend.fault().is_some() {
            return;
        }

        if self.bounds.advance(self.settings.dt) {
            self.backend.contain(&self.bounds.current());
        }
        self.frame += 1;
    }

    /// Return to the construction-time state: same particles, parameters
    /// re-applied, bounds restored, frame counter zeroed. The backend is kept.
    pub fn reset(&mut self) {
        self.frame = 0;
        let particles = self.settings.initial_particles();
        self.backend.load_particles(&particles);
        self.backend.set_parameters(&self.params);
        self.bounds.reset();
        // the pool was seeded with the construction radius
        self.backend.contain(&self.bounds.current());
        tracing::info!(particles = particles.len(), "simulation reset");
    }

    // ---- Parameters ----

    /// Validate and replace the solver constants.
    ///
    /// Takes effect from the next frame. `reset` keeps the replaced values.
    pub fn set_parameters(&mut self, params: SimulationParameters) -> Result<(), SimulationError> {
        params.validate()?;
        self.params = params;
        self.backend.set_parameters(&params);
        Ok(())
    }

    /// Current solver constants.
    pub fn parameters(&self) -> &SimulationParameters {
        &self.params
    }

    // ---- Bounds ----

    /// Replace the current domain. The original domain is kept for animation
    /// and [`Simulation::reset_bounds`].
    pub fn set_bounds(&mut self, domain: Aabb) -> Result<(), SimulationError> {
        self.bounds.set_current(domain)?;
        self.backend.contain(&domain);
        Ok(())
    }

    /// Current domain.
    pub fn bounds(&self) -> Aabb {
        self.bounds.current()
    }

    /// Domain at construction.
    pub fn original_bounds(&self) -> Aabb {
        self.bounds.original()
    }

    /// Restore the original domain and rewind the animation.
    pub fn reset_bounds(&mut self) {
        self.bounds.reset();
        self.backend.contain(&self.bounds.current());
    }

    /// Animate the domain every frame.
    pub fn enable_bounds_animation(&mut self) {
        self.bounds.enable_animation();
    }

    /// Stop animating; the domain stays where it is.
    pub fn disable_bounds_animation(&mut self) {
        self.bounds.disable_animation();
    }

    /// Whether the domain is animated.
    pub fn is_animating_bounds(&self) -> bool {
        self.bounds.is_animating()
    }

    /// Animate the min-X face as well.
    pub fn enable_both_sides_animation(&mut self) {
        self.bounds.enable_both_sides();
    }

    /// Animate the max-X face only.
    pub fn disable_both_sides_animation(&mut self) {
        self.bounds.disable_both_sides();
    }

    /// Whether both X faces are animated.
    pub fn is_animating_both_sides(&self) -> bool {
        self.bounds.both_sides()
    }

    /// Select the animation shape.
    pub fn set_animation_type(&mut self, kind: AnimationType) {
        self.bounds.set_animation_type(kind);
    }

    /// Current animation shape.
    pub fn animation_type(&self) -> AnimationType {
        self.bounds.animation_type()
    }

    /// Set the animation period (positive).
    pub fn set_animation_period(&mut self, period: f32) -> Result<(), SimulationError> {
        self.bounds.set_period(period)
    }

    /// Current animation period.
    pub fn animation_period(&self) -> f32 {
        self.bounds.period()
    }

    /// Set the animation amplitude (non-negative).
    pub fn set_animation_amplitude(&mut self, amplitude: f32) -> Result<(), SimulationError> {
        self.bounds.set_amplitude(amplitude)
    }

    /// Current animation amplitude.
    pub fn animation_amplitude(&self) -> f32 {
        self.bounds.amplitude()
    }

    // ---- Inspection ----

    /// Positions after the last `step`.
    pub fn positions(&self) -> &[[f32; 3]] {
        self.backend.positions()
    }

    /// Full particle state after the last `step`.
    pub fn particles(&self) -> &ParticleArrays {
        self.backend.particles()
    }

    /// Densities from the last density pass.
    pub fn densities(&self) -> &[f32] {
        self.backend.densities()
    }

    /// Last frame's spatial hash (CPU backend only).
    pub fn grid(&self) -> Option<&SpatialHashGrid> {
        self.backend.grid()
    }

    /// Grid resolution.
    pub fn cells_per_axis(&self) -> [u32; 3] {
        self.cells_per_axis
    }

    /// Size of the particle pool.
    pub fn particle_count(&self) -> usize {
        self.settings.particle_count
    }

    /// Frame duration.
    pub fn dt(&self) -> f32 {
        self.settings.dt
    }

    /// Frames stepped since construction or the last `reset`.
    pub fn frame_number(&self) -> u64 {
        self.frame
    }

    /// Backend name.
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// The backend error that stopped the run, if any.
    pub fn fault(&self) -> Option<&SimulationError> {
        self.backend.fault()
    }

    /// Construction settings.
    pub fn settings(&self) -> &SimulationSettings {
        &self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> Simulation {
        let domain = Aabb::new([0.0; 3], [4.0; 3]);
        Simulation::new(domain, 200, SimulationParameters::default(), DEFAULT_DT, None).unwrap()
    }

    #[test]
    fn rejects_invalid_construction() {
        let domain = Aabb::new([0.0; 3], [1.0; 3]);
        let p = SimulationParameters::default();
        assert!(Simulation::new(domain, 0, p, DEFAULT_DT, None).is_err());
        assert!(Simulation::new(domain, 10, p, 0.0, None).is_err());
        assert!(Simulation::new(domain, 10, p, DEFAULT_DT, Some([4, 0, 4])).is_err());
        let flat = Aabb::new([0.0; 3], [1.0, 0.0, 1.0]);
        assert!(matches!(
            Simulation::new(flat, 10, p, DEFAULT_DT, None),
            Err(SimulationError::InvalidConfig(_))
        ));
    }

    #[test]
    fn step_advances_frame_counter() {
        let mut sim = small();
        assert_eq!(sim.frame_number(), 0);
        sim.step();
        sim.step();
        assert_eq!(sim.frame_number(), 2);
        assert_eq!(sim.positions().len(), 200);
        assert_eq!(sim.densities().len(), 200);
    }

    #[test]
    fn reset_restores_initial_state() {
        let mut sim = small();
        let initial = sim.positions().to_vec();
        sim.enable_bounds_animation();
        for _ in 0..5 {
            sim.step();
        }
        assert_ne!(sim.positions(), initial.as_slice());
        sim.reset();
        assert_eq!(sim.frame_number(), 0);
        assert_eq!(sim.positions(), initial.as_slice());
        assert_eq!(sim.bounds(), sim.original_bounds());
        assert!(sim.is_animating_bounds());
    }

    #[test]
    fn set_parameters_validates() {
        let mut sim = small();
        let bad = SimulationParameters {
            smoothing_radius: -1.0,
            ..Default::default()
        };
        assert!(sim.set_parameters(bad).is_err());
        assert_eq!(sim.parameters().smoothing_radius, 0.6);

        let good = SimulationParameters {
            solver_iterations: 2,
            ..Default::default()
        };
        sim.set_parameters(good).unwrap();
        assert_eq!(sim.parameters().solver_iterations, 2);
    }

    /// CPU backend that faults after a fixed number of frames.
    struct FailingBackend {
        inner: CpuBackend,
        frames_left: u32,
        fault: Option<SimulationError>,
    }

    impl SolverBackend for FailingBackend {
        fn name(&self) -> &str {
            "failing"
        }
        fn load_particles(&mut self, particles: &ParticleArrays) {
            self.inner.load_particles(particles);
        }
        fn set_parameters(&mut self, params: &SimulationParameters) {
            self.inner.set_parameters(params);
        }
        fn step(&mut self, ctx: &FrameContext) {
            if self.frames_left == 0 {
                self.fault = Some(SimulationError::Backend("device lost".to_string()));
                return;
            }
            self.frames_left -= 1;
            self.inner.step(ctx);
        }
        fn contain(&mut self, domain: &Aabb) {
            self.inner.contain(domain);
        }
        fn particles(&self) -> &ParticleArrays {
            self.inner.particles()
        }
        fn positions(&self) -> &[[f32; 3]] {
            self.inner.positions()
        }
        fn densities(&self) -> &[f32] {
            self.inner.densities()
        }
        fn fault(&self) -> Option<&SimulationError> {
            self.fault.as_ref()
        }
    }

    #[test]
    fn faulted_backend_stops_the_run() {
        let settings = SimulationSettings::new(Aabb::new([0.0; 3], [4.0; 3]), 100);
        let mut sim = Simulation::with_backend(settings, |p, params, domain, cells| {
            Ok(FailingBackend {
                inner: CpuBackend::new(p.clone(), *params, domain, cells),
                frames_left: 2,
                fault: None,
            })
        })
        .unwrap();
        sim.set_animation_type(AnimationType::Compress);
        sim.enable_bounds_animation();

        sim.step();
        sim.step();
        assert_eq!(sim.frame_number(), 2);
        assert!(sim.fault().is_none());
        let bounds = sim.bounds();

        // The failing frame and every later one leave the state untouched
        for _ in 0..3 {
            sim.step();
        }
        assert_eq!(sim.frame_number(), 2);
        assert_eq!(sim.bounds(), bounds);
        assert!(matches!(sim.fault(), Some(SimulationError::Backend(_))));
    }

    #[test]
    fn reset_contains_pool_after_radius_grows() {
        let mut sim = small();
        let wide = SimulationParameters {
            particle_radius: 0.4,
            smoothing_radius: 1.6,
            ..Default::default()
        };
        sim.set_parameters(wide).unwrap();
        sim.reset();
        let domain = sim.bounds();
        for p in sim.positions() {
            assert!(domain.contains_inset(*p, 0.4 - 1e-5), "{p:?} outside after reset");
        }
    }

    #[test]
    fn auto_cells_follow_domain() {
        let sim = small();
        // ceil((4 / 0.15) / 4) = 7, capped at floor(4 / 0.6) = 6
        assert_eq!(sim.cells_per_axis(), [6, 6, 6]);
    }
}
