//! Linear algebra type system for the vertical state estimator
//!
//! Fixed-size nalgebra aliases so the filter's dimensions are checked at
//! compile time.

use nalgebra::{SMatrix, SVector};

// ===== State Dimensions =====
pub const STATE_DIM: usize = 3; // (altitude, velocity, acceleration)

// ===== Measurement Dimensions =====
pub const MEASURE_DIM: usize = 2; // (baro altitude, axial acceleration)

pub type StateVec = SVector<f64, STATE_DIM>;
pub type StateMat = SMatrix<f64, STATE_DIM, STATE_DIM>;

pub type MeasureVec = SVector<f64, MEASURE_DIM>;
pub type MeasureNoise = SMatrix<f64, MEASURE_DIM, MEASURE_DIM>;

// Measurement model: 2×3
pub type MeasureMatrix = SMatrix<f64, MEASURE_DIM, STATE_DIM>;

// Kalman gain: 3×2
pub type KalmanGain = SMatrix<f64, STATE_DIM, MEASURE_DIM>;
