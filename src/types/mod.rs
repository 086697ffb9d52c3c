pub mod linalg;

pub use linalg::*;

use serde::{Deserialize, Serialize};

/// Raw integer fields of one high-rate frame, in wire order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawHighRate {
    pub accel: [i16; 3],
    pub gyro: [i16; 3],
}

/// Raw integer fields of one low-rate frame (sign-extended 24-bit).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLowRate {
    pub pressure: i32,
    pub temperature: i32,
}

/// Inertial sample: acceleration in g, angular rate in °/s.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HighRateSample {
    pub timestamp: f64,
    pub acc_x: f64,
    pub acc_y: f64,
    pub acc_z: f64,
    pub gyro_x: f64,
    pub gyro_y: f64,
    pub gyro_z: f64,
}

impl HighRateSample {
    pub fn accel(&self) -> [f64; 3] {
        [self.acc_x, self.acc_y, self.acc_z]
    }

    pub fn gyro(&self) -> [f64; 3] {
        [self.gyro_x, self.gyro_y, self.gyro_z]
    }
}

/// Barometric/thermal sample.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LowRateSample {
    pub timestamp: f64,
    pub press: f64,
    pub temp: f64,
}

/// Orientation and tilt at one high-rate step.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttitudeSample {
    pub timestamp: f64,
    pub quat_x: f64,
    pub quat_y: f64,
    pub quat_z: f64,
    pub quat_w: f64,
    /// Degrees from vertical
    pub tilt: f64,
    pub tilt_cos: f64,
}

/// One filtered vertical state, in the configured length unit.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct KalmanEstimate {
    pub timestamp: f64,
    pub altitude: f64,
    pub velocity: f64,
    pub acceleration: f64,
    pub covariance_trace: f64,
}
