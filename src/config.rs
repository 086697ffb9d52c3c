//! Pipeline configuration.
//!
//! Every field has a default, so a config file only needs the values it
//! overrides. Validation runs once, before any decoding.

use std::fs;
use std::path::Path;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::calibration::{Axis, AxisMap, GyroBias, Sensitivity};
use crate::error::ConfigError;
use crate::filters::{MeasurementModel, NoiseConfig};
use crate::types::{StateMat, StateVec};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleRates {
    /// Accelerometer/gyro tier [Hz]
    pub high_hz: f64,
    /// Pressure/temperature tier [Hz]
    pub low_hz: f64,
}

impl Default for SampleRates {
    fn default() -> Self {
        Self {
            high_hz: 500.0,
            low_hz: 50.0,
        }
    }
}

impl SampleRates {
    pub fn high_period(&self) -> f64 {
        1.0 / self.high_hz
    }

    pub fn low_period(&self) -> f64 {
        1.0 / self.low_hz
    }

    /// High-rate samples per low-rate sample, at least 1.
    pub fn upsample_factor(&self) -> usize {
        (self.high_hz / self.low_hz).round().max(1.0) as usize
    }

    /// Whether each low-rate sample spans a whole number of high-rate steps.
    pub fn is_integer_ratio(&self) -> bool {
        let ratio = self.high_hz / self.low_hz;
        (ratio - ratio.round()).abs() < 1e-9
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for rate in [self.high_hz, self.low_hz] {
            if !rate.is_finite() || rate <= 0.0 {
                return Err(ConfigError::InvalidRate(rate));
            }
        }
        if self.low_hz > self.high_hz {
            return Err(ConfigError::InvalidParameter(format!(
                "low-rate tier ({} Hz) faster than high-rate tier ({} Hz)",
                self.low_hz, self.high_hz
            )));
        }
        if !self.is_integer_ratio() {
            warn!(
                "rate ratio {}/{} is not an integer; baro upsampling uses {} and will drift",
                self.high_hz,
                self.low_hz,
                self.upsample_factor()
            );
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KalmanSettings {
    pub noise: NoiseConfig,
    pub initial_state: [f64; 3],
    /// Diagonal of the initial covariance
    pub initial_covariance: [f64; 3],
    /// Gravity subtracted from the vertical acceleration [m/s²]
    pub gravity: f64,
    /// g → m/s² for the accelerometer
    pub standard_gravity: f64,
    /// Metres → output length unit (3.28 = feet)
    pub unit_scale: f64,
    /// Body axis aligned with the direction of flight
    pub axial_axis: Axis,
}

impl Default for KalmanSettings {
    fn default() -> Self {
        Self {
            noise: NoiseConfig::default(),
            initial_state: [0.0; 3],
            initial_covariance: [1.0, 0.1, 100.0],
            gravity: 9.81,
            standard_gravity: 9.81,
            unit_scale: 3.28,
            axial_axis: Axis::X,
        }
    }
}

impl KalmanSettings {
    pub fn initial_state(&self) -> StateVec {
        StateVec::from(self.initial_state)
    }

    pub fn initial_covariance(&self) -> StateMat {
        StateMat::from_diagonal(&StateVec::from(self.initial_covariance))
    }

    pub fn measurement_model(&self) -> MeasurementModel {
        MeasurementModel {
            gravity: self.gravity,
            unit_scale: self.unit_scale,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.noise.validate()?;
        if self.initial_state.iter().any(|v| !v.is_finite()) {
            return Err(ConfigError::InvalidParameter(
                "kalman.initial_state must be finite".into(),
            ));
        }
        if self
            .initial_covariance
            .iter()
            .any(|v| !v.is_finite() || *v < 0.0)
        {
            return Err(ConfigError::InvalidParameter(
                "kalman.initial_covariance must be finite and non-negative".into(),
            ));
        }
        for (name, value) in [
            ("gravity", self.gravity),
            ("standard_gravity", self.standard_gravity),
            ("unit_scale", self.unit_scale),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::InvalidParameter(format!(
                    "kalman.{name} = {value}"
                )));
            }
        }
        if self.unit_scale <= 0.0 {
            return Err(ConfigError::InvalidParameter(format!(
                "kalman.unit_scale must be positive, got {}",
                self.unit_scale
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaroSettings {
    /// Low-rate samples averaged into the ground reference pressure
    pub ground_samples: usize,
    /// Leading low-rate samples dropped before anything else
    pub skip_samples: usize,
}

impl Default for BaroSettings {
    fn default() -> Self {
        Self {
            ground_samples: 1,
            skip_samples: 0,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub rates: SampleRates,
    pub sensitivity: Sensitivity,
    pub axis_map: AxisMap,
    pub gyro_bias: GyroBias,
    pub kalman: KalmanSettings,
    pub baro: BaroSettings,
}

impl PipelineConfig {
    /// Load a JSON config file and validate it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let config = Self::from_json(&text)?;
        debug!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.rates.validate()?;
        self.sensitivity.validate()?;
        self.kalman.validate()?;
        if self.gyro_bias.0.iter().any(|v| !v.is_finite()) {
            return Err(ConfigError::InvalidParameter(
                "gyro_bias must be finite".into(),
            ));
        }
        if self.baro.ground_samples == 0 {
            return Err(ConfigError::InvalidParameter(
                "baro.ground_samples must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
