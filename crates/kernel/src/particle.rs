//! Particle pool in struct-of-arrays layout.
//!
//! The pool is allocated once and never resized during a run: index `i`
//! refers to the same particle for the lifetime of the simulation.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use crate::bounds::Aabb;

/// Struct-of-arrays particle storage.
///
/// All arrays are parallel: index `i` across every array refers to the same
/// particle. Separate x/y/z arrays map one-to-one onto device buffers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParticleArrays {
    // ---- Positions ----
    /// X positions
    pub x: Vec<f32>,
    /// Y positions
    pub y: Vec<f32>,
    /// Z positions
    pub z: Vec<f32>,

    // ---- Predicted positions (solver working copy) ----
    /// Predicted X
    pub px: Vec<f32>,
    /// Predicted Y
    pub py: Vec<f32>,
    /// Predicted Z
    pub pz: Vec<f32>,

    // ---- Velocities ----
    /// X velocities
    pub vx: Vec<f32>,
    /// Y velocities
    pub vy: Vec<f32>,
    /// Z velocities
    pub vz: Vec<f32>,
}

impl ParticleArrays {
    /// Create an empty particle collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty collection with room for `n` particles.
    pub fn with_capacity(n: usize) -> Self {
        Self {
            x: Vec::with_capacity(n),
            y: Vec::with_capacity(n),
            z: Vec::with_capacity(n),
            px: Vec::with_capacity(n),
            py: Vec::with_capacity(n),
            pz: Vec::with_capacity(n),
            vx: Vec::with_capacity(n),
            vy: Vec::with_capacity(n),
            vz: Vec::with_capacity(n),
        }
    }

    /// Return the number of particles currently stored.
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// Return `true` if there are no particles.
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Append a particle at rest. The predicted position starts equal to the
    /// position.
    pub fn push_particle(&mut self, x: f32, y: f32, z: f32) {
        self.x.push(x);
        self.y.push(y);
        self.z.push(z);
        self.px.push(x);
        self.py.push(y);
        self.pz.push(z);
        self.vx.push(0.0);
        self.vy.push(0.0);
        self.vz.push(0.0);
    }

    /// Fill a fresh pool of `count` particles scattered uniformly in the lower
    /// part of `domain`.
    ///
    /// X and Z span the whole domain inset by `radius`; Y spans the bottom
    /// `fill_fraction` of the height. The same `seed` always yields the same
    /// pool.
    pub fn seeded_block(count: usize, domain: &Aabb, radius: f32, fill_fraction: f32, seed: u64) -> Self {
        let mut rng = Pcg32::seed_from_u64(seed);
        let mut out = Self::with_capacity(count);

        let (x_lo, x_hi) = domain.inset_limits(0, radius);
        let (z_lo, z_hi) = domain.inset_limits(2, radius);
        let (y_lo, y_top) = domain.inset_limits(1, radius);
        let fill_top = domain.min[1] + fill_fraction * domain.extent()[1] - radius;
        let y_hi = fill_top.clamp(y_lo, y_top);

        for _ in 0..count {
            let x = rng.gen_range(x_lo..=x_hi);
            let y = rng.gen_range(y_lo..=y_hi);
            let z = rng.gen_range(z_lo..=z_hi);
            out.push_particle(x, y, z);
        }
        out
    }

    /// Copy positions out as `[x, y, z]` triples.
    pub fn positions(&self) -> Vec<[f32; 3]> {
        let mut out = Vec::with_capacity(self.len());
        self.write_positions(&mut out);
        out
    }

    /// Overwrite `out` with the current positions.
    pub fn write_positions(&self, out: &mut Vec<[f32; 3]>) {
        out.clear();
        out.extend((0..self.len()).map(|i| [self.x[i], self.y[i], self.z[i]]));
    }

    /// Clamp positions and predicted positions into `domain` inset by
    /// `radius`.
    pub fn clamp_into(&mut self, domain: &Aabb, radius: f32) {
        let limits = [
            domain.inset_limits(0, radius),
            domain.inset_limits(1, radius),
            domain.inset_limits(2, radius),
        ];
        for (axis, arrays) in [
            [&mut self.x, &mut self.px],
            [&mut self.y, &mut self.py],
            [&mut self.z, &mut self.pz],
        ]
        .into_iter()
        .enumerate()
        {
            let (lo, hi) = limits[axis];
            for buf in arrays {
                for v in buf.iter_mut() {
                    *v = v.clamp(lo, hi);
                }
            }
        }
    }
}
