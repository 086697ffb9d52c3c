/// Dead-reckoning attitude integration from body angular rates.
///
/// Orientation is a Hamilton quaternion stored as nalgebra's `Quaternion`
/// (coords `[x, y, z, w]`), starting at identity. Each gyro sample becomes a
/// small rotation built from half Euler angles and is post-multiplied onto the
/// current orientation, i.e. the increment is expressed in the body frame.
///
/// There is no bias estimation or external correction, so the estimate drifts
/// over long windows. Flight windows are a few seconds.
use log::{debug, warn};
use nalgebra::{Quaternion, Vector3};

/// Incremental rotation for body angles `(roll, pitch, yaw)` in degrees,
/// composed intrinsically in XYZ order.
pub fn half_euler_increment(roll_deg: f64, pitch_deg: f64, yaw_deg: f64) -> Quaternion<f64> {
    // Half the angle, then to radians
    let x = (roll_deg / 2.0).to_radians();
    let y = (pitch_deg / 2.0).to_radians();
    let z = (yaw_deg / 2.0).to_radians();

    let (s_x, c_x) = x.sin_cos();
    let (s_y, c_y) = y.sin_cos();
    let (s_z, c_z) = z.sin_cos();

    Quaternion::new(
        c_x * c_y * c_z + s_x * s_y * s_z,
        s_x * c_y * c_z - c_x * s_y * s_z,
        c_x * s_y * c_z + s_x * c_y * s_z,
        c_x * c_y * s_z - s_x * s_y * c_z,
    )
}

/// Rescale to unit norm only when the norm has grown past 1.
///
/// Sub-unit quaternions are left as they are. A zero quaternion is reset to
/// identity.
pub fn renormalize(q: Quaternion<f64>) -> Quaternion<f64> {
    let norm_sq = q.norm_squared();
    if norm_sq == 0.0 {
        warn!("zero-norm quaternion, resetting to identity");
        return Quaternion::identity();
    }
    if norm_sq > 1.0 {
        q / norm_sq.sqrt()
    } else {
        q
    }
}

/// Normalise to unit length; zero norm maps to identity.
pub fn normalize_or_identity(q: Quaternion<f64>) -> Quaternion<f64> {
    let norm = q.norm();
    if norm == 0.0 {
        Quaternion::identity()
    } else {
        q / norm
    }
}

/// Rotate `v` by `q` (sandwich product `q v q*`, expanded).
pub fn rotate_vector(q: &Quaternion<f64>, v: &Vector3<f64>) -> Vector3<f64> {
    let (qx, qy, qz, qw) = (q.i, q.j, q.k, q.w);

    let tx = 2.0 * (qy * v.z - qz * v.y);
    let ty = 2.0 * (qz * v.x - qx * v.z);
    let tz = 2.0 * (qx * v.y - qy * v.x);

    Vector3::new(
        v.x + qw * tx + qy * tz - qz * ty,
        v.y + qw * ty + qz * tx - qx * tz,
        v.z + qw * tz + qx * ty - qy * tx,
    )
}

/// Roll, pitch, yaw. Pitch saturates at ±90° in gimbal lock.
pub fn to_euler(q: &Quaternion<f64>, degrees: bool) -> Vector3<f64> {
    let (x, y, z, w) = (q.i, q.j, q.k, q.w);

    let sinr_cosp = 2.0 * (w * x + y * z);
    let cosr_cosp = 1.0 - 2.0 * (x * x + y * y);
    let roll = sinr_cosp.atan2(cosr_cosp);

    let sinp = 2.0 * (w * y - z * x);
    let pitch = if sinp.abs() >= 1.0 {
        std::f64::consts::FRAC_PI_2.copysign(sinp)
    } else {
        sinp.asin()
    };

    let siny_cosp = 2.0 * (w * z + x * y);
    let cosy_cosp = 1.0 - 2.0 * (y * y + z * z);
    let yaw = siny_cosp.atan2(cosy_cosp);

    let angles = Vector3::new(roll, pitch, yaw);
    if degrees {
        angles.map(f64::to_degrees)
    } else {
        angles
    }
}

pub struct AttitudeEstimator {
    dt: f64,
    orientation: Quaternion<f64>,
    steps: u64,
}

impl AttitudeEstimator {
    pub fn new(dt: f64) -> Self {
        Self {
            dt,
            orientation: Quaternion::identity(),
            steps: 0,
        }
    }

    pub fn orientation(&self) -> Quaternion<f64> {
        self.orientation
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Integrate one body-rate sample (°/s) and return the new orientation.
    pub fn step(&mut self, rate_deg: &Vector3<f64>) -> Quaternion<f64> {
        let dq = half_euler_increment(
            self.dt * rate_deg.x,
            self.dt * rate_deg.y,
            self.dt * rate_deg.z,
        );
        self.orientation = renormalize(self.orientation * dq);
        self.steps += 1;
        self.orientation
    }

    /// Integrate a whole sequence. Output has `rates.len() + 1` entries, the
    /// first being the initial orientation.
    pub fn integrate(&mut self, rates: &[Vector3<f64>]) -> Vec<Quaternion<f64>> {
        let mut quats = Vec::with_capacity(rates.len() + 1);
        quats.push(self.orientation);
        for rate in rates {
            quats.push(self.step(rate));
        }
        debug!("integrated {} gyro samples (dt={}s)", rates.len(), self.dt);
        quats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const DT: f64 = 1.0 / 500.0;

    #[test]
    fn test_zero_rate_stays_identity() {
        let mut est = AttitudeEstimator::new(DT);
        let quats = est.integrate(&vec![Vector3::zeros(); 1000]);
        assert_eq!(quats.len(), 1001);
        for q in &quats {
            assert_eq!(*q, Quaternion::identity());
        }
    }

    #[test]
    fn test_unit_norm_after_many_steps() {
        let mut est = AttitudeEstimator::new(DT);
        for i in 0..20_000 {
            let t = i as f64 * DT;
            let rate = Vector3::new(
                250.0 * (3.0 * t).sin(),
                -120.0 + 40.0 * t.cos(),
                700.0 * (0.5 * t).cos(),
            );
            let q = est.step(&rate);
            assert!((q.norm() - 1.0).abs() < 1e-6, "norm drifted at step {i}");
            assert!(q.norm() <= 1.0 + 1e-12);
        }
    }

    #[test]
    fn test_constant_yaw_rate() {
        // 90°/s for one second about z
        let mut est = AttitudeEstimator::new(0.01);
        let rates = vec![Vector3::new(0.0, 0.0, 90.0); 100];
        let q = *est.integrate(&rates).last().unwrap();
        let half = std::f64::consts::FRAC_PI_4;
        assert_abs_diff_eq!(q.w, half.cos(), epsilon = 1e-9);
        assert_abs_diff_eq!(q.k, half.sin(), epsilon = 1e-9);
        assert_abs_diff_eq!(q.i, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(q.j, 0.0, epsilon = 1e-12);

        let euler = to_euler(&q, true);
        assert_abs_diff_eq!(euler.z, 90.0, epsilon = 1e-6);
    }

    #[test]
    fn test_increment_is_body_frame() {
        // Roll 90° then pitch 90° must equal q_roll * q_pitch, not q_pitch * q_roll.
        let mut est = AttitudeEstimator::new(1.0);
        est.step(&Vector3::new(90.0, 0.0, 0.0));
        let q = est.step(&Vector3::new(0.0, 90.0, 0.0));

        let q_roll = half_euler_increment(90.0, 0.0, 0.0);
        let q_pitch = half_euler_increment(0.0, 90.0, 0.0);
        let expected = q_roll * q_pitch;
        let wrong = q_pitch * q_roll;

        assert_abs_diff_eq!((q - expected).norm(), 0.0, epsilon = 1e-12);
        assert!((q - wrong).norm() > 0.1);
    }

    #[test]
    fn test_half_euler_is_unit() {
        let q = half_euler_increment(12.0, -34.0, 56.0);
        assert_abs_diff_eq!(q.norm(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_renormalize_is_asymmetric() {
        let big = Quaternion::new(2.0, 0.0, 0.0, 0.0);
        assert_eq!(renormalize(big), Quaternion::identity());

        let small = Quaternion::new(0.5, 0.0, 0.0, 0.0);
        assert_eq!(renormalize(small), small);

        assert_eq!(renormalize(Quaternion::new(0.0, 0.0, 0.0, 0.0)), Quaternion::identity());
    }

    #[test]
    fn test_normalize_or_identity() {
        let q = normalize_or_identity(Quaternion::new(0.0, 0.0, 0.0, 0.0));
        assert_eq!(q, Quaternion::identity());
        let q = normalize_or_identity(Quaternion::new(0.0, 3.0, 0.0, 4.0));
        assert_abs_diff_eq!(q.norm(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_rotate_vector_yaw() {
        let q = half_euler_increment(0.0, 0.0, 90.0);
        let v = rotate_vector(&q, &Vector3::x());
        assert_abs_diff_eq!(v.x, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(v.y, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(v.z, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_euler_pitch_saturates() {
        let q = half_euler_increment(0.0, 90.0, 0.0);
        let e = to_euler(&q, true);
        assert_abs_diff_eq!(e.y, 90.0, epsilon = 1e-4);
    }
}
