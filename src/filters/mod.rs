pub mod vertical_kf;

pub use vertical_kf::{FilterInputs, KalmanState, MeasurementModel, NoiseConfig, VerticalKf};
