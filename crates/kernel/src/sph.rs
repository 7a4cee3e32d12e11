//! SPH smoothing kernels used by the PBF solver.
//!
//! Poly6 weights densities and XSPH averaging; the Spiky gradient drives the
//! constraint gradients, position deltas and vorticity terms. Both have
//! compact support `h`.

use std::f32::consts::PI;

/// Gradients vanish below this distance (coincident particles).
pub const MIN_GRADIENT_DISTANCE: f32 = 1.0e-6;

/// Poly6 smoothing kernel in 3D.
///
/// ```text
/// W(r, h) = 315 / (64 pi h^9) * (h^2 - r^2)^3   for 0 <= r <= h
/// W(r, h) = 0                                    otherwise
/// ```
///
/// # Arguments
/// * `r_sq` - Squared distance between the two particles.
/// * `h` - Support radius.
#[inline]
pub fn poly6(r_sq: f32, h: f32) -> f32 {
    let h_sq = h * h;
    if r_sq > h_sq {
        return 0.0;
    }
    let diff = h_sq - r_sq;
    poly6_coefficient(h) * diff * diff * diff
}

/// `315 / (64 pi h^9)`.
#[inline]
pub fn poly6_coefficient(h: f32) -> f32 {
    let h3 = h * h * h;
    315.0 / (64.0 * PI * h3 * h3 * h3)
}

/// Gradient of the Spiky kernel in 3D.
///
/// ```text
/// nabla W = -45 / (pi h^6) * (h - r)^2 * r_vec / |r|   for 0 < r <= h
/// ```
///
/// `(dx, dy, dz)` is the displacement from particle j to particle i. Returns
/// zero outside the support and for `r < MIN_GRADIENT_DISTANCE`.
#[inline]
pub fn spiky_gradient(dx: f32, dy: f32, dz: f32, h: f32) -> (f32, f32, f32) {
    let r = (dx * dx + dy * dy + dz * dz).sqrt();
    if r > h || r < MIN_GRADIENT_DISTANCE {
        return (0.0, 0.0, 0.0);
    }
    let h3 = h * h * h;
    let t = h - r;
    let scale = -45.0 / (PI * h3 * h3) * t * t / r;
    (scale * dx, scale * dy, scale * dz)
}

/// Artificial pressure term for the tensile-instability correction.
///
/// ```text
/// scorr = -k * (W(r) / W(dq * h))^n
/// ```
///
/// `w_dq` is the precomputed `W(dq * h)`; see [`poly6`].
#[inline]
pub fn artificial_pressure(r_sq: f32, h: f32, w_dq: f32, k: f32, n: i32) -> f32 {
    if w_dq <= 0.0 {
        return 0.0;
    }
    -k * (poly6(r_sq, h) / w_dq).powi(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poly6_peak_and_support() {
        let h = 0.6;
        assert!((poly6(0.0, h) - poly6_coefficient(h) * h.powi(6)).abs() < 1e-3);
        assert_eq!(poly6(h * h * 1.0001, h), 0.0);
        assert!(poly6(0.09, h) < poly6(0.01, h));
    }

    #[test]
    fn poly6_integrates_to_one() {
        // midpoint rule over a cube enclosing the support
        let h = 1.0;
        let n = 40;
        let step = 2.0 * h / n as f32;
        let mut sum = 0.0f64;
        for i in 0..n {
            for j in 0..n {
                for k in 0..n {
                    let x = -h + (i as f32 + 0.5) * step;
                    let y = -h + (j as f32 + 0.5) * step;
                    let z = -h + (k as f32 + 0.5) * step;
                    sum += poly6(x * x + y * y + z * z, h) as f64;
                }
            }
        }
        let integral = sum * (step as f64).powi(3);
        assert!((integral - 1.0).abs() < 0.02, "integral = {integral}");
    }

    #[test]
    fn spiky_gradient_points_toward_neighbor() {
        // i sits at +x from j: gradient is negative along x
        let (gx, gy, gz) = spiky_gradient(0.2, 0.0, 0.0, 0.6);
        assert!(gx < 0.0);
        assert_eq!(gy, 0.0);
        assert_eq!(gz, 0.0);
        let (hx, _, _) = spiky_gradient(-0.2, 0.0, 0.0, 0.6);
        assert_eq!(hx, -gx);
    }

    #[test]
    fn spiky_gradient_vanishes_at_origin_and_outside() {
        assert_eq!(spiky_gradient(0.0, 0.0, 0.0, 0.6), (0.0, 0.0, 0.0));
        assert_eq!(spiky_gradient(0.7, 0.0, 0.0, 0.6), (0.0, 0.0, 0.0));
    }

    #[test]
    fn artificial_pressure_at_reference_distance() {
        let h = 0.6;
        let dq = 0.2 * h;
        let w_dq = poly6(dq * dq, h);
        let s = artificial_pressure(dq * dq, h, w_dq, 0.01, 4);
        assert!((s + 0.01).abs() < 1e-6);
        assert_eq!(artificial_pressure(1.0, h, w_dq, 0.01, 4), 0.0);
    }
}
