//! Velocity update after the constraint solve: vorticity confinement, XSPH
//! viscosity and the final position write with wall clamping.

use rayon::prelude::*;

use crate::neighbor::SpatialHashGrid;
use crate::params::SimulationParameters;
use crate::particle::ParticleArrays;
use crate::sph::{poly6, spiky_gradient};
use crate::FrameContext;

/// Below this magnitude the confinement location vector has no direction.
pub const MIN_ETA_MAGNITUDE: f32 = 1.0e-6;

/// Scratch for the velocity passes.
#[derive(Debug, Clone, Default)]
pub struct VorticityBuffers {
    /// Curl of the velocity field per particle.
    pub omega: Vec<[f32; 3]>,
    /// Frozen velocities the XSPH pass reads from.
    pub frozen: Vec<[f32; 3]>,
}

impl VorticityBuffers {
    /// Resize to `n` particles and zero every value.
    pub fn reset(&mut self, n: usize) {
        self.omega.clear();
        self.omega.resize(n, [0.0; 3]);
        self.frozen.clear();
        self.frozen.resize(n, [0.0; 3]);
    }
}

#[inline]
fn cross(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

#[inline]
fn length(a: [f32; 3]) -> f32 {
    (a[0] * a[0] + a[1] * a[1] + a[2] * a[2]).sqrt()
}

/// `v = (p* - x) / dt`.
pub fn derive_velocities(particles: &mut ParticleArrays, dt: f32) {
    let inv_dt = 1.0 / dt;
    let ParticleArrays {
        x, y, z, px, py, pz, vx, vy, vz,
    } = particles;
    for (pos, pred, vel) in [(x, px, vx), (y, py, vy), (z, pz, vz)] {
        vel.par_iter_mut()
            .zip(pred.par_iter().zip(pos.par_iter()))
            .for_each(|(v, (&p, &xi))| *v = (p - xi) * inv_dt);
    }
}

/// Velocity curl per particle.
///
/// ```text
/// omega_i = sum_j (m / rho0) (v_j - v_i) x grad W(p_i - p_j)
/// ```
pub fn compute_curl(
    particles: &ParticleArrays,
    grid: &SpatialHashGrid,
    params: &SimulationParameters,
    omega: &mut Vec<[f32; 3]>,
) {
    let h = params.smoothing_radius;
    let vol = params.rest_volume();
    let p = particles;
    (0..p.len())
        .into_par_iter()
        .map(|i| {
            let vi = [p.vx[i], p.vy[i], p.vz[i]];
            let mut w = [0.0f32; 3];
            grid.for_each_neighbor(i, &p.px, &p.py, &p.pz, h, |j, d, _| {
                if j == i {
                    return;
                }
                let dv = [p.vx[j] - vi[0], p.vy[j] - vi[1], p.vz[j] - vi[2]];
                let (gx, gy, gz) = spiky_gradient(d[0], d[1], d[2], h);
                let c = cross(dv, [gx, gy, gz]);
                w[0] += vol * c[0];
                w[1] += vol * c[1];
                w[2] += vol * c[2];
            });
            w
        })
        .collect_into_vec(omega);
}

/// Vorticity confinement.
///
/// ```text
/// eta = sum_j (m / rho0) |omega_j| grad W(p_i - p_j)
/// N   = eta / |eta|
/// v_i += dt * epsilon * (N x omega_i)
/// ```
pub fn apply_confinement(
    particles: &mut ParticleArrays,
    grid: &SpatialHashGrid,
    params: &SimulationParameters,
    omega: &[[f32; 3]],
    dt: f32,
) {
    let h = params.smoothing_radius;
    let vol = params.rest_volume();
    let eps = params.vorticity_epsilon;
    if eps == 0.0 {
        return;
    }

    let p = &*particles;
    let impulses: Vec<[f32; 3]> = (0..p.len())
        .into_par_iter()
        .map(|i| {
            let mut eta = [0.0f32; 3];
            grid.for_each_neighbor(i, &p.px, &p.py, &p.pz, h, |j, d, _| {
                if j == i {
                    return;
                }
                let mag = length(omega[j]);
                let (gx, gy, gz) = spiky_gradient(d[0], d[1], d[2], h);
                eta[0] += vol * mag * gx;
                eta[1] += vol * mag * gy;
                eta[2] += vol * mag * gz;
            });
            let eta_len = length(eta);
            if eta_len < MIN_ETA_MAGNITUDE {
                return [0.0; 3];
            }
            let n = [eta[0] / eta_len, eta[1] / eta_len, eta[2] / eta_len];
            let f = cross(n, omega[i]);
            [dt * eps * f[0], dt * eps * f[1], dt * eps * f[2]]
        })
        .collect();

    let ParticleArrays { vx, vy, vz, .. } = particles;
    for (axis, vel) in [vx, vy, vz].into_iter().enumerate() {
        vel.par_iter_mut()
            .zip(impulses.par_iter())
            .for_each(|(v, dv)| *v += dv[axis]);
    }
}

/// XSPH viscosity, read from a frozen copy of the velocities.
///
/// ```text
/// v_i += c * sum_j (m / rho0) (v_j - v_i) W_poly6(|p_i - p_j|)
/// ```
pub fn apply_xsph(
    particles: &mut ParticleArrays,
    grid: &SpatialHashGrid,
    params: &SimulationParameters,
    frozen: &mut Vec<[f32; 3]>,
) {
    let h = params.smoothing_radius;
    let vol = params.rest_volume();
    let c = params.xsph_viscosity;
    if c == 0.0 {
        return;
    }

    {
        let p = &*particles;
        (0..p.len())
            .into_par_iter()
            .map(|i| [p.vx[i], p.vy[i], p.vz[i]])
            .collect_into_vec(frozen);
    }

    let frozen = &*frozen;
    let p = &*particles;
    let corrections: Vec<[f32; 3]> = (0..p.len())
        .into_par_iter()
        .map(|i| {
            let vi = frozen[i];
            let mut acc = [0.0f32; 3];
            grid.for_each_neighbor(i, &p.px, &p.py, &p.pz, h, |j, _, r_sq| {
                let w = vol * poly6(r_sq, h);
                let vj = frozen[j];
                acc[0] += (vj[0] - vi[0]) * w;
                acc[1] += (vj[1] - vi[1]) * w;
                acc[2] += (vj[2] - vi[2]) * w;
            });
            [c * acc[0], c * acc[1], c * acc[2]]
        })
        .collect();

    let ParticleArrays { vx, vy, vz, .. } = particles;
    for (axis, vel) in [vx, vy, vz].into_iter().enumerate() {
        vel.par_iter_mut()
            .zip(corrections.par_iter())
            .for_each(|(v, dv)| *v += dv[axis]);
    }
}

/// Commit predicted positions and clamp them into the domain.
///
/// A particle held at a wall loses the velocity component pointing out of
/// that wall, scaled by `-wall_restitution`.
pub fn finalize_positions(particles: &mut ParticleArrays, params: &SimulationParameters, ctx: &FrameContext) {
    let r = params.particle_radius;
    let e = params.wall_restitution;
    let ParticleArrays {
        x, y, z, px, py, pz, vx, vy, vz,
    } = particles;
    for (axis, (pos, pred, vel)) in [(x, px, vx), (y, py, vy), (z, pz, vz)].into_iter().enumerate() {
        let (lo, hi) = ctx.domain.inset_limits(axis, r);
        pos.par_iter_mut()
            .zip(pred.par_iter_mut())
            .zip(vel.par_iter_mut())
            .for_each(|((xi, p), v)| {
                let clamped = p.clamp(lo, hi);
                if (clamped <= lo && *v < 0.0) || (clamped >= hi && *v > 0.0) {
                    *v *= -e;
                }
                *p = clamped;
                *xi = clamped;
            });
    }
}

/// Full velocity/position finalization for one frame.
pub fn finalize(
    particles: &mut ParticleArrays,
    grid: &SpatialHashGrid,
    params: &SimulationParameters,
    buffers: &mut VorticityBuffers,
    ctx: &FrameContext,
) {
    derive_velocities(particles, ctx.dt);
    compute_curl(particles, grid, params, &mut buffers.omega);
    apply_confinement(particles, grid, params, &buffers.omega, ctx.dt);
    apply_xsph(particles, grid, params, &mut buffers.frozen);
    finalize_positions(particles, params, ctx);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::Aabb;

    fn ctx() -> FrameContext {
        FrameContext {
            dt: 0.5,
            domain: Aabb::new([0.0; 3], [2.0; 3]),
        }
    }

    fn grid_for(particles: &ParticleArrays, h: f32) -> SpatialHashGrid {
        let c = ctx();
        let mut grid = SpatialHashGrid::new(&c.domain, [3; 3], h);
        grid.rebuild(&particles.px, &particles.py, &particles.pz, &c.domain, [3; 3], h);
        grid
    }

    #[test]
    fn velocity_from_displacement() {
        let mut pa = ParticleArrays::new();
        pa.push_particle(1.0, 1.0, 1.0);
        pa.px[0] = 1.5;
        derive_velocities(&mut pa, 0.5);
        assert_eq!(pa.vx[0], 1.0);
        assert_eq!(pa.vy[0], 0.0);
    }

    #[test]
    fn uniform_flow_has_no_curl() {
        let params = SimulationParameters::default();
        let mut pa = ParticleArrays::new();
        for i in 0..4 {
            pa.push_particle(0.8 + 0.1 * i as f32, 1.0, 1.0);
            pa.vx[i] = 2.0;
        }
        let grid = grid_for(&pa, params.smoothing_radius);
        let mut omega = Vec::new();
        compute_curl(&pa, &grid, &params, &mut omega);
        assert!(omega.iter().all(|w| length(*w) < 1e-6));
    }

    #[test]
    fn xsph_pulls_velocities_together() {
        let params = SimulationParameters {
            xsph_viscosity: 0.5,
            ..Default::default()
        };
        let mut pa = ParticleArrays::new();
        pa.push_particle(1.0, 1.0, 1.0);
        pa.push_particle(1.1, 1.0, 1.0);
        pa.vx[0] = 1.0;
        pa.vx[1] = -1.0;
        let grid = grid_for(&pa, params.smoothing_radius);
        let mut frozen = Vec::new();
        apply_xsph(&mut pa, &grid, &params, &mut frozen);
        assert!(pa.vx[0] < 1.0 && pa.vx[0] > -1.0);
        assert!((pa.vx[0] + pa.vx[1]).abs() < 1e-6);
    }

    #[test]
    fn wall_contact_zeroes_outward_velocity() {
        let params = SimulationParameters::default();
        let mut pa = ParticleArrays::new();
        pa.push_particle(0.3, 1.0, 1.0);
        pa.px[0] = -0.4;
        pa.vx[0] = -3.0;
        pa.vy[0] = 0.7;
        finalize_positions(&mut pa, &params, &ctx());
        assert_eq!(pa.x[0], params.particle_radius);
        assert_eq!(pa.px[0], params.particle_radius);
        assert_eq!(pa.vx[0], 0.0);
        assert_eq!(pa.vy[0], 0.7);
    }

    #[test]
    fn wall_contact_reflects_with_restitution() {
        let params = SimulationParameters {
            wall_restitution: 0.5,
            ..Default::default()
        };
        let mut pa = ParticleArrays::new();
        pa.push_particle(1.0, 1.0, 1.8);
        pa.pz[0] = 3.0;
        pa.vz[0] = 2.0;
        finalize_positions(&mut pa, &params, &ctx());
        assert!((pa.z[0] - 1.85).abs() < 1e-6);
        assert_eq!(pa.vz[0], -1.0);
    }
}
