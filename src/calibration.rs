//! LSB → physical unit conversion and body-axis remapping.
//!
//! Decoding never hard-codes a scale factor; every consumer goes through a
//! [`Sensitivity`] so a different hardware revision only needs a new profile.

use std::fmt;
use std::str::FromStr;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{HighRateSample, LowRateSample, RawHighRate, RawLowRate};

/// Per-channel scale factors (physical unit per LSB).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sensitivity {
    /// g / LSB
    pub accel: f64,
    /// °/s / LSB
    pub gyro: f64,
    pub pressure: f64,
    /// °C / LSB
    pub temperature: f64,
}

impl Default for Sensitivity {
    fn default() -> Self {
        Self {
            accel: 1.0 / 2048.0,
            gyro: 0.00875,
            pressure: 1.0 / 64.0,
            temperature: 1.0 / 65536.0,
        }
    }
}

impl Sensitivity {
    pub fn scale_high(&self, raw: &RawHighRate, timestamp: f64) -> HighRateSample {
        let [ax, ay, az] = raw.accel.map(|v| f64::from(v) * self.accel);
        let [gx, gy, gz] = raw.gyro.map(|v| f64::from(v) * self.gyro);
        HighRateSample {
            timestamp,
            acc_x: ax,
            acc_y: ay,
            acc_z: az,
            gyro_x: gx,
            gyro_y: gy,
            gyro_z: gz,
        }
    }

    pub fn scale_low(&self, raw: &RawLowRate, timestamp: f64) -> LowRateSample {
        LowRateSample {
            timestamp,
            press: f64::from(raw.pressure) * self.pressure,
            temp: f64::from(raw.temperature) * self.temperature,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("accel", self.accel),
            ("gyro", self.gyro),
            ("pressure", self.pressure),
            ("temperature", self.temperature),
        ] {
            if !value.is_finite() || value == 0.0 {
                return Err(ConfigError::InvalidParameter(format!(
                    "sensitivity.{name} = {value}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_lowercase() {
            'x' => Some(Axis::X),
            'y' => Some(Axis::Y),
            'z' => Some(Axis::Z),
            _ => None,
        }
    }

    fn as_char(self) -> char {
        match self {
            Axis::X => 'x',
            Axis::Y => 'y',
            Axis::Z => 'z',
        }
    }
}

/// Selects which physical sensor axis feeds each logical body axis, with a
/// per-axis sign/scale. Textual form: `"zyx[-1,1,1]"`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AxisMap {
    pub order: [Axis; 3],
    pub scale: Vector3<f64>,
}

impl Default for AxisMap {
    fn default() -> Self {
        Self {
            order: [Axis::X, Axis::Y, Axis::Z],
            scale: Vector3::new(1.0, 1.0, 1.0),
        }
    }
}

impl AxisMap {
    /// Map a physical-frame triple into the logical body frame.
    pub fn apply(&self, physical: [f64; 3]) -> Vector3<f64> {
        Vector3::new(
            self.scale.x * physical[self.order[0].index()],
            self.scale.y * physical[self.order[1].index()],
            self.scale.z * physical[self.order[2].index()],
        )
    }
}

impl FromStr for AxisMap {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = |why: &str| ConfigError::InvalidAxisMap(format!("{s:?}: {why}"));
        let s_trim = s.trim();

        let (perm, rest) = match s_trim.find('[') {
            Some(idx) => s_trim.split_at(idx),
            None => return Err(bad("missing '[' scale vector")),
        };
        let inner = rest
            .strip_prefix('[')
            .and_then(|r| r.strip_suffix(']'))
            .ok_or_else(|| bad("scale vector must be enclosed in []"))?;

        let axes: Vec<Axis> = perm
            .chars()
            .map(|c| Axis::from_char(c).ok_or_else(|| bad("axis must be one of x, y, z")))
            .collect::<Result<_, _>>()?;
        if axes.len() != 3 {
            return Err(bad("expected exactly three axes"));
        }
        let order = [axes[0], axes[1], axes[2]];
        if order[0] == order[1] || order[0] == order[2] || order[1] == order[2] {
            return Err(bad("axes must be a permutation of xyz"));
        }

        let scale: Vec<f64> = inner
            .split(',')
            .map(|t| t.trim().parse::<f64>().map_err(|_| bad("scale must be numeric")))
            .collect::<Result<_, _>>()?;
        if scale.len() != 3 {
            return Err(bad("expected three scale factors"));
        }
        if scale.iter().any(|v| !v.is_finite()) {
            return Err(bad("scale must be finite"));
        }

        Ok(Self {
            order,
            scale: Vector3::new(scale[0], scale[1], scale[2]),
        })
    }
}

impl fmt::Display for AxisMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let perm: String = self.order.iter().map(|a| a.as_char()).collect();
        write!(
            f,
            "{}[{},{},{}]",
            perm, self.scale.x, self.scale.y, self.scale.z
        )
    }
}

impl Serialize for AxisMap {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AxisMap {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Constant per-axis gyro offset (°/s), subtracted in the logical frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GyroBias(pub [f64; 3]);

impl GyroBias {
    pub fn remove(&self, rate: Vector3<f64>) -> Vector3<f64> {
        rate - Vector3::new(self.0[0], self.0[1], self.0[2])
    }
}

/// Body-frame angular rates (°/s) ready for attitude integration.
pub fn body_rates(samples: &[HighRateSample], axes: &AxisMap, bias: &GyroBias) -> Vec<Vector3<f64>> {
    samples
        .iter()
        .map(|s| bias.remove(axes.apply(s.gyro())))
        .collect()
}

/// Body-frame accelerations (g).
pub fn body_accels(samples: &[HighRateSample], axes: &AxisMap) -> Vec<Vector3<f64>> {
    samples.iter().map(|s| axes.apply(s.accel())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_scale_is_raw_times_sensitivity() {
        let sens = Sensitivity::default();
        let raw = RawHighRate {
            accel: [2048, -4096, 16384],
            gyro: [1000, -1, i16::MIN],
        };
        let s = sens.scale_high(&raw, 0.25);
        assert_eq!(s.timestamp, 0.25);
        assert_eq!(s.acc_x, 1.0);
        assert_eq!(s.acc_y, -2.0);
        assert_eq!(s.acc_z, 8.0);
        assert_eq!(s.gyro_x, 1000.0 * 0.00875);
        assert_eq!(s.gyro_y, -0.00875);
        assert_eq!(s.gyro_z, f64::from(i16::MIN) * 0.00875);
    }

    #[test]
    fn test_scale_low() {
        let sens = Sensitivity::default();
        let raw = RawLowRate {
            pressure: 64 * 101_325,
            temperature: -(1 << 16),
        };
        let s = sens.scale_low(&raw, 0.02);
        assert_eq!(s.press, 101_325.0);
        assert_eq!(s.temp, -1.0);
    }

    #[test]
    fn test_sensitivity_override() {
        let sens = Sensitivity {
            gyro: 1.0 / 13.375,
            ..Sensitivity::default()
        };
        let raw = RawHighRate {
            accel: [0; 3],
            gyro: [107, 0, 0],
        };
        assert_relative_eq!(sens.scale_high(&raw, 0.0).gyro_x, 8.0, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_sensitivity_rejected() {
        let sens = Sensitivity {
            accel: 0.0,
            ..Sensitivity::default()
        };
        assert!(sens.validate().is_err());
        assert!(Sensitivity::default().validate().is_ok());
    }

    #[test]
    fn test_axis_map_parse_identity() {
        let map: AxisMap = "xyz[1,1,1]".parse().unwrap();
        assert_eq!(map, AxisMap::default());
    }

    #[test]
    fn test_axis_map_permutation_and_sign() {
        let map: AxisMap = "zyx[-1, 1, 2]".parse().unwrap();
        let out = map.apply([1.0, 2.0, 3.0]);
        assert_eq!(out, Vector3::new(-3.0, 2.0, 2.0));
    }

    #[test]
    fn test_axis_map_rejects_malformed() {
        for bad in ["xy[1,1,1]", "xxz[1,1,1]", "xyz", "xyz[1,1]", "xyw[1,1,1]", "xyz[a,1,1]"] {
            assert!(bad.parse::<AxisMap>().is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_axis_map_display_round_trip() {
        let map: AxisMap = "yzx[1,-1,0.5]".parse().unwrap();
        let again: AxisMap = map.to_string().parse().unwrap();
        assert_eq!(map, again);
    }

    #[test]
    fn test_body_rates_removes_bias() {
        let sample = HighRateSample {
            timestamp: 0.0,
            acc_x: 0.0,
            acc_y: 0.0,
            acc_z: 1.0,
            gyro_x: 0.5,
            gyro_y: 1.0,
            gyro_z: -0.5,
        };
        let rates = body_rates(&[sample], &AxisMap::default(), &GyroBias([0.5, 0.0, -0.5]));
        assert_eq!(rates[0], Vector3::new(0.0, 1.0, 0.0));
    }
}
