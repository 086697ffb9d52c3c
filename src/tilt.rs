//! Body-axis tilt from vertical.

use nalgebra::{Quaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::attitude::rotate_vector;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tilt {
    /// Angle between the rotated body z-axis and world z, in `[0, 180]` degrees.
    pub angle_deg: f64,
    /// `cos(angle_deg)`, kept as the clamped dot product itself.
    pub cosine: f64,
}

/// Tilt from the dot product of the rotated body z-axis with world z.
///
/// The dot product is clamped to `[-1, 1]` before `acos`; rounding can push a
/// unit vector's component fractionally past 1.
pub fn tilt_from_dot(dot: f64) -> Tilt {
    let cosine = dot.clamp(-1.0, 1.0);
    Tilt {
        angle_deg: cosine.acos().to_degrees().min(180.0),
        cosine,
    }
}

pub fn compute_tilt(q: &Quaternion<f64>) -> Tilt {
    let z = Vector3::z();
    let body_z = rotate_vector(q, &z);
    tilt_from_dot(body_z.dot(&z))
}

pub fn tilt_series(quats: &[Quaternion<f64>]) -> Vec<Tilt> {
    quats.iter().map(compute_tilt).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attitude::half_euler_increment;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_identity_is_upright() {
        let t = compute_tilt(&Quaternion::identity());
        assert_eq!(t.angle_deg, 0.0);
        assert_eq!(t.cosine, 1.0);
    }

    #[test]
    fn test_pitch_tilts_by_angle() {
        let q = half_euler_increment(0.0, 30.0, 0.0);
        let t = compute_tilt(&q);
        assert_abs_diff_eq!(t.angle_deg, 30.0, epsilon = 1e-9);
        assert_abs_diff_eq!(t.cosine, 30f64.to_radians().cos(), epsilon = 1e-12);
    }

    #[test]
    fn test_yaw_does_not_tilt() {
        let q = half_euler_increment(0.0, 0.0, 123.0);
        let t = compute_tilt(&q);
        assert_abs_diff_eq!(t.angle_deg, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_inverted() {
        let q = half_euler_increment(180.0, 0.0, 0.0);
        let t = compute_tilt(&q);
        assert_abs_diff_eq!(t.angle_deg, 180.0, epsilon = 1e-6);
        assert_abs_diff_eq!(t.cosine, -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_out_of_domain_dot_is_clamped() {
        let up = tilt_from_dot(1.000_000_1);
        assert_eq!(up.angle_deg, 0.0);
        assert_eq!(up.cosine, 1.0);

        let down = tilt_from_dot(-1.000_000_1);
        assert_abs_diff_eq!(down.angle_deg, 180.0, epsilon = 1e-9);
        assert_eq!(down.cosine, -1.0);
    }

    #[test]
    fn test_perturbed_quaternions_stay_in_range() {
        for i in 0..2000 {
            let a = i as f64 * 0.37;
            let q = half_euler_increment(a * 7.0, a * 3.0, a) * (1.0 + 1e-7 * (a.sin()));
            let t = compute_tilt(&q);
            assert!(!t.angle_deg.is_nan());
            assert!((0.0..=180.0).contains(&t.angle_deg));
            assert!((-1.0..=1.0).contains(&t.cosine));
        }
    }

    #[test]
    fn test_series_len() {
        let quats = vec![Quaternion::identity(); 4];
        assert_eq!(tilt_series(&quats).len(), 4);
    }
}
