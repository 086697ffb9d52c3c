/// Vertical-channel Kalman filter
///
/// State Vector (3D):
/// [0]: Altitude
/// [1]: Vertical velocity
/// [2]: Vertical acceleration
///
/// Constant-acceleration process model. Altitude (barometric) and acceleration
/// (tilt-compensated accelerometer) are observed; velocity never is, it is
/// inferred through the model.
///
/// All quantities share one length unit, chosen by the caller.
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, FilterError};
use crate::types::{KalmanGain, MeasureMatrix, MeasureNoise, MeasureVec, StateMat, StateVec};

/// Diagonal process (`q*`) and measurement (`r*`) noise terms.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    pub q0: f64,
    pub q1: f64,
    pub q2: f64,
    pub r0: f64,
    pub r1: f64,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            q0: 1.0,
            q1: 1.0,
            q2: 1.0,
            r0: 1.0,
            r1: 1.0,
        }
    }
}

impl NoiseConfig {
    pub const NAMES: [&'static str; 5] = ["q0", "q1", "q2", "r0", "r1"];

    pub fn new(q0: f64, q1: f64, q2: f64, r0: f64, r1: f64) -> Result<Self, ConfigError> {
        let noise = Self { q0, q1, q2, r0, r1 };
        noise.validate()?;
        Ok(noise)
    }

    pub fn from_array(v: [f64; 5]) -> Result<Self, ConfigError> {
        Self::new(v[0], v[1], v[2], v[3], v[4])
    }

    pub fn as_array(&self) -> [f64; 5] {
        [self.q0, self.q1, self.q2, self.r0, self.r1]
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in Self::NAMES.into_iter().zip(self.as_array()) {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidNoise { name, value });
            }
        }
        Ok(())
    }

    pub fn process_noise(&self) -> StateMat {
        StateMat::from_diagonal(&StateVec::new(self.q0, self.q1, self.q2))
    }

    pub fn measurement_noise(&self) -> MeasureNoise {
        MeasureNoise::from_diagonal(&MeasureVec::new(self.r0, self.r1))
    }
}

/// How raw measurements become the filter's measurement vector.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeasurementModel {
    /// Gravity removed from the projected axial acceleration [m/s²]
    pub gravity: f64,
    /// Metres → output length unit
    pub unit_scale: f64,
}

impl Default for MeasurementModel {
    fn default() -> Self {
        Self {
            gravity: 9.81,
            unit_scale: 3.28,
        }
    }
}

impl MeasurementModel {
    /// Vertical acceleration from body axial acceleration [m/s²] and tilt cosine.
    pub fn vertical_accel(&self, tilt_cos: f64, axial_accel: f64) -> f64 {
        self.unit_scale * (tilt_cos * axial_accel - self.gravity)
    }

    pub fn measurement(&self, baro_altitude: f64, tilt_cos: f64, axial_accel: f64) -> MeasureVec {
        MeasureVec::new(baro_altitude, self.vertical_accel(tilt_cos, axial_accel))
    }
}

/// Filter state after one step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KalmanState {
    pub x: StateVec,
    pub p: StateMat,
}

impl KalmanState {
    pub fn altitude(&self) -> f64 {
        self.x[0]
    }

    pub fn velocity(&self) -> f64 {
        self.x[1]
    }

    pub fn acceleration(&self) -> f64 {
        self.x[2]
    }

    pub fn covariance_trace(&self) -> f64 {
        self.p.trace()
    }

    fn is_finite(&self) -> bool {
        self.x.iter().all(|v| v.is_finite()) && self.p.iter().all(|v| v.is_finite())
    }
}

/// Per-step filter inputs, all of equal length.
#[derive(Clone, Copy, Debug)]
pub struct FilterInputs<'a> {
    /// Body axial acceleration [m/s²]
    pub axial_accel: &'a [f64],
    pub tilt_cos: &'a [f64],
    /// Barometric altitude, already at the accelerometer rate
    pub baro_altitude: &'a [f64],
}

impl FilterInputs<'_> {
    pub fn len(&self) -> usize {
        self.axial_accel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.axial_accel.is_empty()
    }

    fn check_lengths(&self) -> Result<(), FilterError> {
        let n = self.axial_accel.len();
        if self.tilt_cos.len() != n || self.baro_altitude.len() != n {
            return Err(FilterError::LengthMismatch {
                accel: n,
                tilt: self.tilt_cos.len(),
                baro: self.baro_altitude.len(),
            });
        }
        Ok(())
    }
}

pub struct VerticalKf {
    /// Time step [seconds]
    dt: f64,

    state: StateVec,
    covariance: StateMat,

    transition: StateMat,
    measurement_matrix: MeasureMatrix,
    process_noise: StateMat,
    measurement_noise: MeasureNoise,

    steps: usize,
}

impl VerticalKf {
    pub fn new(dt: f64, noise: &NoiseConfig) -> Self {
        Self {
            dt,
            state: StateVec::zeros(),
            covariance: Self::default_covariance(),
            transition: Self::build_transition(dt),
            measurement_matrix: Self::build_measurement_matrix(),
            process_noise: noise.process_noise(),
            measurement_noise: noise.measurement_noise(),
            steps: 0,
        }
    }

    pub fn with_initial(mut self, state: StateVec, covariance: StateMat) -> Self {
        self.state = state;
        self.covariance = covariance;
        self
    }

    pub fn default_covariance() -> StateMat {
        StateMat::from_diagonal(&StateVec::new(1.0, 0.1, 100.0))
    }

    fn build_transition(dt: f64) -> StateMat {
        let dt2 = dt * dt;
        StateMat::new(
            1.0, dt, 0.5 * dt2, //
            0.0, 1.0, dt, //
            0.0, 0.0, 1.0,
        )
    }

    fn build_measurement_matrix() -> MeasureMatrix {
        let mut h = MeasureMatrix::zeros();
        h[(0, 0)] = 1.0; // altitude
        h[(1, 2)] = 1.0; // acceleration
        h
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn state(&self) -> KalmanState {
        KalmanState {
            x: self.state,
            p: self.covariance,
        }
    }

    pub fn predict(&mut self) {
        self.state = self.transition * self.state;
        self.covariance =
            self.transition * self.covariance * self.transition.transpose() + self.process_noise;
    }

    fn kalman_update(&mut self, z: &MeasureVec) -> Result<(), FilterError> {
        let h = &self.measurement_matrix;
        let p = &self.covariance;

        let residual = z - h * self.state;
        let h_t = h.transpose();
        let s = h * p * h_t + self.measurement_noise;
        let s_inv = s
            .try_inverse()
            .ok_or(FilterError::SingularInnovation { step: self.steps })?;
        let k: KalmanGain = p * h_t * s_inv;

        self.state += k * residual;
        self.covariance = (StateMat::identity() - k * h) * p;
        Ok(())
    }

    /// One predict/correct cycle. A non-finite result is an error.
    pub fn step(&mut self, z: &MeasureVec) -> Result<KalmanState, FilterError> {
        self.predict();
        self.kalman_update(z)?;

        let state = self.state();
        if !state.is_finite() {
            return Err(FilterError::NonFinite { step: self.steps });
        }
        self.steps += 1;
        Ok(state)
    }

    /// Run over a full input set. Either every step succeeds or the run fails.
    pub fn run(
        &mut self,
        inputs: &FilterInputs<'_>,
        model: &MeasurementModel,
    ) -> Result<Vec<KalmanState>, FilterError> {
        inputs.check_lengths()?;

        let mut states = Vec::with_capacity(inputs.len());
        for i in 0..inputs.len() {
            let z = model.measurement(
                inputs.baro_altitude[i],
                inputs.tilt_cos[i],
                inputs.axial_accel[i],
            );
            match self.step(&z) {
                Ok(state) => states.push(state),
                Err(e) => {
                    warn!("filter run failed after {} steps: {}", states.len(), e);
                    return Err(e);
                }
            }
        }
        debug!("filter run completed: {} steps", states.len());
        Ok(states)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const DT: f64 = 1.0 / 500.0;

    fn asymmetry(p: &StateMat) -> f64 {
        (p - p.transpose()).abs().max()
    }

    #[test]
    fn test_noise_rejects_negative() {
        assert!(NoiseConfig::new(1.0, 1.0, -0.1, 1.0, 1.0).is_err());
        assert!(NoiseConfig::new(1.0, f64::NAN, 1.0, 1.0, 1.0).is_err());
        assert!(NoiseConfig::new(0.0, 0.0, 0.0, 0.0, 0.0).is_ok());
    }

    #[test]
    fn test_noise_matrices_are_diagonal() {
        let noise = NoiseConfig::new(1.0, 2.0, 3.0, 4.0, 5.0).unwrap();
        let q = noise.process_noise();
        let r = noise.measurement_noise();
        assert_eq!(q[(1, 1)], 2.0);
        assert_eq!(q[(0, 1)], 0.0);
        assert_eq!(r[(1, 1)], 5.0);
        assert_eq!(r[(1, 0)], 0.0);
    }

    #[test]
    fn test_transition_matrix() {
        let f = VerticalKf::build_transition(0.1);
        assert_abs_diff_eq!(f[(0, 1)], 0.1);
        assert_abs_diff_eq!(f[(0, 2)], 0.005, epsilon = 1e-15);
        assert_abs_diff_eq!(f[(1, 2)], 0.1);
        assert_eq!(f[(2, 0)], 0.0);
    }

    #[test]
    fn test_measurement_model() {
        let model = MeasurementModel {
            gravity: 9.81,
            unit_scale: 1.0,
        };
        assert_abs_diff_eq!(model.vertical_accel(1.0, 9.81), 0.0);
        assert_abs_diff_eq!(model.vertical_accel(0.5, 29.43), 4.905, epsilon = 1e-12);
        let feet = MeasurementModel::default();
        assert_abs_diff_eq!(feet.vertical_accel(1.0, 19.81), 32.8, epsilon = 1e-9);
    }

    #[test]
    fn test_single_step_keeps_covariance_symmetric() {
        let noise = NoiseConfig::new(0.3, 0.7, 1.1, 2.0, 0.5).unwrap();
        let p0 = StateMat::new(4.0, 1.0, 0.5, 1.0, 3.0, 0.2, 0.5, 0.2, 2.0);
        let mut kf = VerticalKf::new(DT, &noise).with_initial(StateVec::zeros(), p0);
        let state = kf.step(&MeasureVec::new(12.0, -3.0)).unwrap();
        assert!(asymmetry(&state.p) < 1e-9);
        assert!(state.p.diagonal().iter().all(|v| *v >= 0.0));
    }

    #[test]
    fn test_covariance_symmetric_over_run() {
        let noise = NoiseConfig::new(0.01, 0.1, 5.0, 4.0, 0.5).unwrap();
        let mut kf = VerticalKf::new(DT, &noise);
        for i in 0..2000 {
            let t = i as f64 * DT;
            let state = kf.step(&MeasureVec::new(3.0 * t * t, 6.0)).unwrap();
            assert!(asymmetry(&state.p) < 1e-6, "asymmetric at {i}");
        }
    }

    #[test]
    fn test_tracks_constant_velocity_ramp() {
        let model = MeasurementModel {
            gravity: 9.81,
            unit_scale: 1.0,
        };
        let n = 5000;
        let baro: Vec<f64> = (0..n).map(|i| 10.0 * i as f64 * DT).collect();
        let accel = vec![9.81; n];
        let tilt = vec![1.0; n];
        let inputs = FilterInputs {
            axial_accel: &accel,
            tilt_cos: &tilt,
            baro_altitude: &baro,
        };

        let noise = NoiseConfig::new(0.001, 0.01, 0.01, 1.0, 1.0).unwrap();
        let states = VerticalKf::new(DT, &noise).run(&inputs, &model).unwrap();
        let last = states.last().unwrap();
        assert_eq!(states.len(), n);
        assert_abs_diff_eq!(last.velocity(), 10.0, epsilon = 0.5);
        assert_abs_diff_eq!(last.altitude(), baro[n - 1], epsilon = 1.0);
        assert_abs_diff_eq!(last.acceleration(), 0.0, epsilon = 0.5);
    }

    #[test]
    fn test_run_is_deterministic() {
        let model = MeasurementModel::default();
        let n = 500;
        let baro: Vec<f64> = (0..n).map(|i| (i as f64 * 0.01).sin() * 20.0).collect();
        let accel: Vec<f64> = (0..n).map(|i| 9.81 + (i as f64 * 0.03).cos()).collect();
        let tilt: Vec<f64> = (0..n).map(|i| 1.0 - i as f64 * 1e-4).collect();
        let inputs = FilterInputs {
            axial_accel: &accel,
            tilt_cos: &tilt,
            baro_altitude: &baro,
        };
        let noise = NoiseConfig::new(0.5, 1.5, 2.5, 3.5, 4.5).unwrap();

        let a = VerticalKf::new(DT, &noise).run(&inputs, &model).unwrap();
        let b = VerticalKf::new(DT, &noise).run(&inputs, &model).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_singular_innovation_fails_run() {
        let noise = NoiseConfig::new(0.0, 0.0, 0.0, 0.0, 0.0).unwrap();
        let mut kf = VerticalKf::new(DT, &noise).with_initial(StateVec::zeros(), StateMat::zeros());
        let err = kf.step(&MeasureVec::new(1.0, 1.0)).unwrap_err();
        assert_eq!(err, FilterError::SingularInnovation { step: 0 });
    }

    #[test]
    fn test_non_finite_measurement_fails_run() {
        let model = MeasurementModel::default();
        let baro = [0.0, 1.0, f64::NAN, 3.0];
        let accel = [9.81; 4];
        let tilt = [1.0; 4];
        let inputs = FilterInputs {
            axial_accel: &accel,
            tilt_cos: &tilt,
            baro_altitude: &baro,
        };
        let err = VerticalKf::new(DT, &NoiseConfig::default())
            .run(&inputs, &model)
            .unwrap_err();
        assert_eq!(err, FilterError::NonFinite { step: 2 });
    }

    #[test]
    fn test_length_mismatch() {
        let inputs = FilterInputs {
            axial_accel: &[9.81; 3],
            tilt_cos: &[1.0; 3],
            baro_altitude: &[0.0; 2],
        };
        let err = VerticalKf::new(DT, &NoiseConfig::default())
            .run(&inputs, &MeasurementModel::default())
            .unwrap_err();
        assert_eq!(
            err,
            FilterError::LengthMismatch {
                accel: 3,
                tilt: 3,
                baro: 2
            }
        );
    }
}
