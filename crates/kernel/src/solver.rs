//! Density-constraint Jacobi iteration.
//!
//! Each iteration is four data-parallel passes over the predicted positions:
//! density, Lagrange multiplier, position delta and apply. The neighbor grid
//! is built once per frame and reused by every iteration.

use rayon::prelude::*;

use crate::neighbor::SpatialHashGrid;
use crate::params::SimulationParameters;
use crate::particle::ParticleArrays;
use crate::sph::{artificial_pressure, poly6, spiky_gradient};
use crate::FrameContext;

/// Per-particle scratch owned by the CPU backend. Zeroed at the start of
/// every frame.
#[derive(Debug, Clone, Default)]
pub struct SolverBuffers {
    /// Estimated density from the last density pass.
    pub density: Vec<f32>,
    /// Lagrange multiplier per particle.
    pub lambda: Vec<f32>,
    /// Position correction per particle.
    pub delta: Vec<[f32; 3]>,
}

impl SolverBuffers {
    /// Resize to `n` particles and zero every value.
    pub fn reset(&mut self, n: usize) {
        self.density.clear();
        self.density.resize(n, 0.0);
        self.lambda.clear();
        self.lambda.resize(n, 0.0);
        self.delta.clear();
        self.delta.resize(n, [0.0; 3]);
    }
}

/// Apply external acceleration and integrate predicted positions.
///
/// ```text
/// v  += dt * g
/// p* = x + dt * v
/// ```
pub fn predict(particles: &mut ParticleArrays, params: &SimulationParameters, dt: f32) {
    let g = params.gravity;
    let ParticleArrays {
        x, y, z, px, py, pz, vx, vy, vz,
    } = particles;

    for (axis, (pos, pred, vel)) in [(x, px, vx), (y, py, vy), (z, pz, vz)].into_iter().enumerate() {
        let ga = g[axis];
        pred.par_iter_mut()
            .zip(vel.par_iter_mut())
            .zip(pos.par_iter())
            .for_each(|((p, v), &xi)| {
                *v += dt * ga;
                *p = xi + dt * *v;
            });
    }
}

/// SPH density of every particle at its predicted position.
///
/// ```text
/// rho_i = sum_j m * W_poly6(|p_i - p_j|, h)     (j includes i)
/// ```
pub fn compute_densities(
    particles: &ParticleArrays,
    grid: &SpatialHashGrid,
    params: &SimulationParameters,
    density: &mut Vec<f32>,
) {
    let h = params.smoothing_radius;
    let m = params.particle_mass();
    let (px, py, pz) = (&particles.px, &particles.py, &particles.pz);
    (0..particles.len())
        .into_par_iter()
        .map(|i| {
            let mut rho = 0.0;
            grid.for_each_neighbor(i, px, py, pz, h, |_, _, r_sq| {
                rho += m * poly6(r_sq, h);
            });
            rho
        })
        .collect_into_vec(density);
}

/// Lagrange multiplier of every particle's density constraint.
///
/// ```text
/// C_i      = rho_i / rho0 - 1
/// grad_k   = (m / rho0) * grad W(p_i - p_k)           k != i
/// grad_i   = (m / rho0) * sum_j grad W(p_i - p_j)
/// lambda_i = -C_i / (sum_k |grad_k|^2 + epsilon)
/// ```
pub fn compute_lambdas(
    particles: &ParticleArrays,
    grid: &SpatialHashGrid,
    params: &SimulationParameters,
    density: &[f32],
    lambda: &mut Vec<f32>,
) {
    let h = params.smoothing_radius;
    let rho0 = params.rest_density;
    let vol = params.rest_volume();
    let eps = params.relaxation_epsilon;
    let (px, py, pz) = (&particles.px, &particles.py, &particles.pz);
    (0..particles.len())
        .into_par_iter()
        .map(|i| {
            let constraint = density[i] / rho0 - 1.0;
            let mut grad_i = [0.0f32; 3];
            let mut sum_sq = 0.0f32;
            grid.for_each_neighbor(i, px, py, pz, h, |j, d, _| {
                if j == i {
                    return;
                }
                let (gx, gy, gz) = spiky_gradient(d[0], d[1], d[2], h);
                let g = [vol * gx, vol * gy, vol * gz];
                sum_sq += g[0] * g[0] + g[1] * g[1] + g[2] * g[2];
                grad_i[0] += g[0];
                grad_i[1] += g[1];
                grad_i[2] += g[2];
            });
            sum_sq += grad_i[0] * grad_i[0] + grad_i[1] * grad_i[1] + grad_i[2] * grad_i[2];
            -constraint / (sum_sq + eps)
        })
        .collect_into_vec(lambda);
}

/// Position correction from the multipliers, with artificial pressure.
///
/// ```text
/// dp_i = (m / rho0) * sum_j (lambda_i + lambda_j + scorr_ij) * grad W(p_i - p_j)
/// ```
pub fn compute_deltas(
    particles: &ParticleArrays,
    grid: &SpatialHashGrid,
    params: &SimulationParameters,
    lambda: &[f32],
    delta: &mut Vec<[f32; 3]>,
) {
    let h = params.smoothing_radius;
    let vol = params.rest_volume();
    let dq = params.artificial_pressure_dq * h;
    let w_dq = poly6(dq * dq, h);
    let (k, n) = (params.artificial_pressure_k, params.artificial_pressure_n);
    let (px, py, pz) = (&particles.px, &particles.py, &particles.pz);
    (0..particles.len())
        .into_par_iter()
        .map(|i| {
            let li = lambda[i];
            let mut acc = [0.0f32; 3];
            grid.for_each_neighbor(i, px, py, pz, h, |j, d, r_sq| {
                if j == i {
                    return;
                }
                let scorr = artificial_pressure(r_sq, h, w_dq, k, n);
                let s = li + lambda[j] + scorr;
                let (gx, gy, gz) = spiky_gradient(d[0], d[1], d[2], h);
                acc[0] += s * gx;
                acc[1] += s * gy;
                acc[2] += s * gz;
            });
            [vol * acc[0], vol * acc[1], vol * acc[2]]
        })
        .collect_into_vec(delta);
}

/// Add the corrections to the predicted positions and clamp them into the
/// domain inset by the particle radius.
pub fn apply_deltas(particles: &mut ParticleArrays, delta: &[[f32; 3]], ctx: &FrameContext, radius: f32) {
    let ParticleArrays { px, py, pz, .. } = particles;
    for (axis, pred) in [px, py, pz].into_iter().enumerate() {
        let (lo, hi) = ctx.domain.inset_limits(axis, radius);
        pred.par_iter_mut()
            .zip(delta.par_iter())
            .for_each(|(p, d)| *p = (*p + d[axis]).clamp(lo, hi));
    }
}

/// One full Jacobi iteration: density, lambda, delta, apply.
pub fn iterate(
    particles: &mut ParticleArrays,
    grid: &SpatialHashGrid,
    params: &SimulationParameters,
    buffers: &mut SolverBuffers,
    ctx: &FrameContext,
) {
    compute_densities(particles, grid, params, &mut buffers.density);
    compute_lambdas(particles, grid, params, &buffers.density, &mut buffers.lambda);
    compute_deltas(particles, grid, params, &buffers.lambda, &mut buffers.delta);
    apply_deltas(particles, &buffers.delta, ctx, params.particle_radius);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::Aabb;
    use crate::sph::poly6_coefficient;

    fn ctx() -> FrameContext {
        FrameContext {
            dt: 1.0 / 30.0,
            domain: Aabb::new([0.0; 3], [2.0; 3]),
        }
    }

    fn grid_for(particles: &ParticleArrays, params: &SimulationParameters) -> SpatialHashGrid {
        let c = ctx();
        let dims = [3, 3, 3];
        let h = params.smoothing_radius;
        let mut grid = SpatialHashGrid::new(&c.domain, dims, h);
        grid.rebuild(&particles.px, &particles.py, &particles.pz, &c.domain, dims, h);
        grid
    }

    #[test]
    fn predict_applies_gravity() {
        let params = SimulationParameters::default();
        let mut pa = ParticleArrays::new();
        pa.push_particle(1.0, 1.0, 1.0);
        predict(&mut pa, &params, 0.1);
        assert!((pa.vy[0] + 0.981).abs() < 1e-6);
        assert!((pa.py[0] - (1.0 - 0.0981)).abs() < 1e-6);
        assert_eq!(pa.y[0], 1.0);
        assert_eq!(pa.px[0], 1.0);
    }

    #[test]
    fn lone_particle_density_is_self_term() {
        let params = SimulationParameters::default();
        let mut pa = ParticleArrays::new();
        pa.push_particle(1.0, 1.0, 1.0);
        let grid = grid_for(&pa, &params);
        let mut density = Vec::new();
        compute_densities(&pa, &grid, &params, &mut density);
        let h = params.smoothing_radius;
        let expected = params.particle_mass() * poly6_coefficient(h) * h.powi(6);
        assert!((density[0] - expected).abs() / expected < 1e-5);
    }

    #[test]
    fn overdense_pair_pushes_apart() {
        let params = SimulationParameters {
            artificial_pressure_k: 0.0,
            ..Default::default()
        };
        let mut pa = ParticleArrays::new();
        pa.push_particle(0.95, 1.0, 1.0);
        pa.push_particle(1.05, 1.0, 1.0);
        let grid = grid_for(&pa, &params);
        let mut buffers = SolverBuffers::default();
        buffers.reset(2);

        // force an overdense state so both multipliers are negative
        buffers.density = vec![2.0 * params.rest_density; 2];
        compute_lambdas(&pa, &grid, &params, &buffers.density, &mut buffers.lambda);
        assert!(buffers.lambda.iter().all(|&l| l < 0.0));

        compute_deltas(&pa, &grid, &params, &buffers.lambda, &mut buffers.delta);
        assert!(buffers.delta[0][0] < 0.0);
        assert!(buffers.delta[1][0] > 0.0);
        assert!((buffers.delta[0][0] + buffers.delta[1][0]).abs() < 1e-6);
    }

    #[test]
    fn apply_clamps_into_inset_domain() {
        let mut pa = ParticleArrays::new();
        pa.push_particle(0.2, 1.0, 1.9);
        apply_deltas(&mut pa, &[[-1.0, 0.0, 1.0]], &ctx(), 0.15);
        assert_eq!(pa.px[0], 0.15);
        assert_eq!(pa.py[0], 1.0);
        assert!((pa.pz[0] - 1.85).abs() < 1e-6);
    }
}
