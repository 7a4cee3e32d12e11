//! Simulation domain and its optional per-frame animation.
//!
//! The domain is an axis-aligned box. `BoundsController` keeps an immutable
//! snapshot of the original box and a mutable current box; when animation is
//! enabled the max-X face (and optionally the mirrored min-X face) is moved
//! once per frame to push waves through the fluid.

use serde::{Deserialize, Serialize};

use crate::error::{invalid, SimulationError};

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Minimum corner [x, y, z].
    pub min: [f32; 3],
    /// Maximum corner [x, y, z].
    pub max: [f32; 3],
}

impl Aabb {
    /// Box spanning `min` to `max`. Not validated; see [`Aabb::validate`].
    pub const fn new(min: [f32; 3], max: [f32; 3]) -> Self {
        Self { min, max }
    }

    /// Reject boxes with `min >= max` or non-finite corners on any axis.
    pub fn validate(&self) -> Result<(), SimulationError> {
        for axis in 0..3 {
            if !(self.min[axis].is_finite() && self.max[axis].is_finite()) {
                return Err(invalid(format!("domain axis {} is not finite", axis)));
            }
            if self.min[axis] >= self.max[axis] {
                return Err(invalid(format!(
                    "domain min must be below max on axis {} ({} >= {})",
                    axis, self.min[axis], self.max[axis]
                )));
            }
        }
        Ok(())
    }

    /// Edge lengths per axis.
    pub fn extent(&self) -> [f32; 3] {
        [
            self.max[0] - self.min[0],
            self.max[1] - self.min[1],
            self.max[2] - self.min[2],
        ]
    }

    /// Width along X.
    pub fn width(&self) -> f32 {
        self.max[0] - self.min[0]
    }

    /// Lower and upper limits a particle centre may occupy on `axis`, the box
    /// shrunk by `inset` on each side. Collapses to the mid-plane when the box
    /// is thinner than `2 * inset`.
    #[inline]
    pub fn inset_limits(&self, axis: usize, inset: f32) -> (f32, f32) {
        let lo = self.min[axis] + inset;
        let hi = self.max[axis] - inset;
        if lo <= hi {
            (lo, hi)
        } else {
            let mid = 0.5 * (self.min[axis] + self.max[axis]);
            (mid, mid)
        }
    }

    /// Whether `p` lies inside the box shrunk by `inset`.
    pub fn contains_inset(&self, p: [f32; 3], inset: f32) -> bool {
        (0..3).all(|axis| {
            let (lo, hi) = self.inset_limits(axis, inset);
            p[axis] >= lo && p[axis] <= hi
        })
    }
}

/// Shape of the bounds animation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AnimationType {
    /// Sinusoidal oscillation of the X face.
    #[default]
    SineWave,
    /// Sawtooth ramp of the X face.
    LinearRamp,
    /// Monotonic squeeze toward a third of the original width, then hold.
    Compress,
}

/// Fraction of the original width the animation may take away.
const ANIMATION_LIMIT_FRACTION: f32 = 0.66;

/// Distance the Compress mode moves a face per frame.
pub const COMPRESS_STEP: f32 = 0.25;

/// Owns the original and current domain plus the animation state machine.
#[derive(Debug, Clone)]
pub struct BoundsController {
    original: Aabb,
    current: Aabb,
    animating: bool,
    both_sides: bool,
    kind: AnimationType,
    period: f32,
    amplitude: f32,
    anim_frame: u32,
}

impl BoundsController {
    /// Default animation period.
    pub const DEFAULT_PERIOD: f32 = 1.0;
    /// Default animation amplitude.
    pub const DEFAULT_AMPLITUDE: f32 = 10.0;

    /// Controller for `domain`, animation disabled.
    pub fn new(domain: Aabb) -> Result<Self, SimulationError> {
        domain.validate()?;
        Ok(Self {
            original: domain,
            current: domain,
            animating: false,
            both_sides: false,
            kind: AnimationType::SineWave,
            period: Self::DEFAULT_PERIOD,
            amplitude: Self::DEFAULT_AMPLITUDE,
            anim_frame: 0,
        })
    }

    /// The domain every stage of the current frame sees.
    pub fn current(&self) -> Aabb {
        self.current
    }

    /// The domain captured at construction.
    pub fn original(&self) -> Aabb {
        self.original
    }

    /// Replace the current domain. The original snapshot is kept, so wave
    /// modes keep oscillating around it and `reset` returns to it.
    pub fn set_current(&mut self, domain: Aabb) -> Result<(), SimulationError> {
        domain.validate()?;
        if self.animating {
            tracing::warn!("bounds replaced while animation is running; x faces follow the animation");
        }
        self.current = domain;
        Ok(())
    }

    /// Restore the original domain and rewind the animation.
    pub fn reset(&mut self) {
        self.anim_frame = 0;
        self.current = self.original;
    }

    /// Turn per-frame animation on.
    pub fn enable_animation(&mut self) {
        self.animating = true;
    }

    /// Turn per-frame animation off, leaving the domain where it is.
    pub fn disable_animation(&mut self) {
        self.animating = false;
    }

    /// Whether [`BoundsController::advance`] moves the domain.
    pub fn is_animating(&self) -> bool {
        self.animating
    }

    /// Mirror the animation onto the min-X face.
    pub fn enable_both_sides(&mut self) {
        self.both_sides = true;
    }

    /// Animate the max-X face only.
    pub fn disable_both_sides(&mut self) {
        self.both_sides = false;
    }

    /// Whether the min-X face is animated as well.
    pub fn both_sides(&self) -> bool {
        self.both_sides
    }

    /// Select the animation shape.
    pub fn set_animation_type(&mut self, kind: AnimationType) {
        self.kind = kind;
    }

    /// Current animation shape.
    pub fn animation_type(&self) -> AnimationType {
        self.kind
    }

    /// Set the animation period. Must be positive.
    pub fn set_period(&mut self, period: f32) -> Result<(), SimulationError> {
        if !(period.is_finite() && period > 0.0) {
            return Err(invalid(format!("animation period must be positive, got {}", period)));
        }
        self.period = period;
        Ok(())
    }

    /// Current animation period.
    pub fn period(&self) -> f32 {
        self.period
    }

    /// Set the animation amplitude. Must be finite and non-negative.
    pub fn set_amplitude(&mut self, amplitude: f32) -> Result<(), SimulationError> {
        if !(amplitude.is_finite() && amplitude >= 0.0) {
            return Err(invalid(format!("animation amplitude must be non-negative, got {}", amplitude)));
        }
        self.amplitude = amplitude;
        Ok(())
    }

    /// Current animation amplitude.
    pub fn amplitude(&self) -> f32 {
        self.amplitude
    }

    /// Animated frames since the last reset.
    pub fn anim_frame(&self) -> u32 {
        self.anim_frame
    }

    /// Advance the animation by one frame of duration `dt`.
    ///
    /// Returns `true` when the domain moved. Does nothing while animation is
    /// disabled.
    pub fn advance(&mut self, dt: f32) -> bool {
        if !self.animating {
            return false;
        }
        let before = self.current;

        let orig_min_x = self.original.min[0];
        let orig_max_x = self.original.max[0];
        let limit = self.original.width() * ANIMATION_LIMIT_FRACTION;
        let half_limit = 0.5 * limit;

        match self.kind {
            AnimationType::SineWave | AnimationType::LinearRamp => {
                // Cap inward travel so the box keeps a third of its width.
                let cap = if self.both_sides { half_limit } else { limit };
                let value = self.wave_offset(dt).min(cap);
                if self.both_sides {
                    self.current.min[0] = orig_min_x + value;
                    self.current.max[0] = orig_max_x - value;
                } else {
                    // min.x may have been moved by set_current; keep the
                    // remaining width on its far side.
                    let floor = self.current.min[0] + (self.original.width() - limit);
                    self.current.max[0] = (orig_max_x - value).max(floor);
                }
            }
            AnimationType::Compress => {
                let limit_min_x = orig_min_x + half_limit;
                let limit_max_x = orig_max_x - half_limit;
                if self.current.max[0] >= limit_max_x
                    && self.current.width() > COMPRESS_STEP
                {
                    self.current.max[0] -= COMPRESS_STEP;
                }
                if self.both_sides
                    && self.current.min[0] <= limit_min_x
                    && self.current.width() > COMPRESS_STEP
                {
                    self.current.min[0] += COMPRESS_STEP;
                }
            }
        }

        self.anim_frame += 1;
        self.current != before
    }

    /// Signed inward displacement of the max-X face for the wave modes.
    ///
    /// ```text
    /// SineWave:   amplitude * sin(period * pi * radians(frame mod 720))
    /// LinearRamp: 2 * amplitude * (t - floor(0.5 + t)),  t = frame * dt / period
    /// ```
    fn wave_offset(&self, dt: f32) -> f32 {
        match self.kind {
            AnimationType::SineWave => {
                let theta = ((self.anim_frame % 720) as f32).to_radians();
                self.amplitude * (self.period * std::f32::consts::PI * theta).sin()
            }
            AnimationType::LinearRamp => {
                let t = (self.anim_frame as f32 / self.period) * dt;
                2.0 * self.amplitude * (t - (0.5 + t).floor())
            }
            AnimationType::Compress => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube() -> Aabb {
        Aabb::new([0.0; 3], [10.0; 3])
    }

    #[test]
    fn rejects_degenerate_domain() {
        assert!(Aabb::new([0.0; 3], [1.0, 0.0, 1.0]).validate().is_err());
        assert!(Aabb::new([0.0; 3], [1.0, 1.0, f32::NAN]).validate().is_err());
        assert!(BoundsController::new(Aabb::new([1.0; 3], [1.0; 3])).is_err());
    }

    #[test]
    fn inset_limits_collapse_to_mid_plane() {
        let thin = Aabb::new([0.0, 0.0, 0.0], [0.2, 1.0, 1.0]);
        assert_eq!(thin.inset_limits(0, 0.15), (0.1, 0.1));
        assert_eq!(thin.inset_limits(1, 0.15), (0.15, 0.85));
    }

    #[test]
    fn disabled_animation_leaves_domain() {
        let mut b = BoundsController::new(cube()).unwrap();
        assert!(!b.advance(1.0 / 30.0));
        assert_eq!(b.current(), cube());
        assert_eq!(b.anim_frame(), 0);
    }

    #[test]
    fn sine_wave_starts_at_original_face() {
        let mut b = BoundsController::new(cube()).unwrap();
        b.enable_animation();
        b.advance(1.0 / 30.0);
        assert_eq!(b.current().max[0], 10.0);
        assert_eq!(b.anim_frame(), 1);
        // second frame moves the face inward
        b.advance(1.0 / 30.0);
        assert!(b.current().max[0] < 10.0);
    }

    #[test]
    fn wave_never_collapses_domain() {
        let mut b = BoundsController::new(cube()).unwrap();
        b.enable_animation();
        b.enable_both_sides();
        b.set_amplitude(100.0).unwrap();
        for _ in 0..800 {
            b.advance(1.0 / 30.0);
            let d = b.current();
            assert!(d.validate().is_ok());
            assert!(d.width() >= 10.0 * (1.0 - ANIMATION_LIMIT_FRACTION) - 1e-4);
        }
    }

    #[test]
    fn compress_shrinks_then_holds() {
        let mut b = BoundsController::new(cube()).unwrap();
        b.enable_animation();
        b.set_animation_type(AnimationType::Compress);
        for _ in 0..100 {
            b.advance(1.0 / 30.0);
        }
        let max_x = b.current().max[0];
        // limit_max_x = 10 - 3.3 = 6.7; last decrement starts at 6.75
        assert!((max_x - 6.5).abs() < 1e-4, "max_x = {max_x}");
        assert_eq!(b.current().min[0], 0.0);
        b.advance(1.0 / 30.0);
        assert_eq!(b.current().max[0], max_x);
    }

    #[test]
    fn reset_restores_original() {
        let mut b = BoundsController::new(cube()).unwrap();
        b.enable_animation();
        b.set_animation_type(AnimationType::LinearRamp);
        for _ in 0..10 {
            b.advance(0.1);
        }
        assert_ne!(b.current(), cube());
        b.reset();
        assert_eq!(b.current(), cube());
        assert_eq!(b.anim_frame(), 0);
    }

    #[test]
    fn set_current_keeps_original_snapshot() {
        let mut b = BoundsController::new(cube()).unwrap();
        let smaller = Aabb::new([1.0; 3], [9.0; 3]);
        b.set_current(smaller).unwrap();
        assert_eq!(b.current(), smaller);
        assert_eq!(b.original(), cube());
        assert!(b.set_current(Aabb::new([2.0; 3], [1.0; 3])).is_err());
        assert_eq!(b.current(), smaller);
    }

    #[test]
    fn invalid_period_rejected() {
        let mut b = BoundsController::new(cube()).unwrap();
        assert!(b.set_period(0.0).is_err());
        assert!(b.set_amplitude(-1.0).is_err());
        assert_eq!(b.period(), BoundsController::DEFAULT_PERIOD);
    }
}
