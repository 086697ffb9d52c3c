//! Barometric altitude and upsampling to the inertial rate.

use log::{debug, warn};

use crate::config::BaroSettings;
use crate::error::FilterError;
use crate::types::LowRateSample;

/// International standard atmosphere scale height term [m]
pub const ISA_SCALE_M: f64 = 44_330.77;
/// 1 / 5.255
pub const ISA_EXPONENT: f64 = 0.190_263;

/// Height above the reference pressure `p0`, in metres. Pressure units cancel.
pub fn pressure_to_altitude(pressure: f64, p0: f64) -> f64 {
    ISA_SCALE_M * (1.0 - (pressure / p0).powf(ISA_EXPONENT))
}

/// Mean of the first `n` pressures (fewer if the record is shorter).
pub fn ground_reference(samples: &[LowRateSample], n: usize) -> Option<f64> {
    let take = n.min(samples.len());
    if take == 0 {
        return None;
    }
    let sum: f64 = samples[..take].iter().map(|s| s.press).sum();
    Some(sum / take as f64)
}

/// Altitude of each low-rate sample relative to the ground reference [m].
/// A non-positive or non-finite pressure after the reference holds the
/// previous altitude (0 if it is the first).
pub fn relative_altitudes(
    samples: &[LowRateSample],
    settings: &BaroSettings,
) -> Result<Vec<f64>, FilterError> {
    let samples = samples.get(settings.skip_samples..).unwrap_or(&[]);
    let p0 = ground_reference(samples, settings.ground_samples)
        .ok_or(FilterError::NoBarometricData)?;
    if !p0.is_finite() || p0 <= 0.0 {
        return Err(FilterError::InvalidGroundPressure(p0));
    }
    debug!(
        "ground reference {:.2} from {} samples",
        p0,
        settings.ground_samples.min(samples.len())
    );
    let mut held = 0;
    let mut last = 0.0;
    let altitudes: Vec<f64> = samples
        .iter()
        .map(|s| {
            if s.press.is_finite() && s.press > 0.0 {
                last = pressure_to_altitude(s.press, p0);
            } else {
                held += 1;
            }
            last
        })
        .collect();
    if held > 0 {
        warn!("{} invalid pressure samples held at the previous altitude", held);
    }
    Ok(altitudes)
}

/// Sample-and-hold: repeat each value `factor` times, truncated or extended
/// to exactly `len` entries. Extension holds the last value.
pub fn upsample_hold(values: &[f64], factor: usize, len: usize) -> Result<Vec<f64>, FilterError> {
    let last = match values.last() {
        Some(v) => *v,
        None if len == 0 => return Ok(Vec::new()),
        None => return Err(FilterError::NoBarometricData),
    };
    let factor = factor.max(1);
    let out: Vec<f64> = (0..len)
        .map(|i| values.get(i / factor).copied().unwrap_or(last))
        .collect();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn low(press: f64) -> LowRateSample {
        LowRateSample {
            timestamp: 0.0,
            press,
            temp: 20.0,
        }
    }

    #[test]
    fn test_altitude_at_reference_is_zero() {
        assert_eq!(pressure_to_altitude(101_325.0, 101_325.0), 0.0);
    }

    #[test]
    fn test_altitude_standard_values() {
        // ~1 km at 898.7 hPa on a standard day
        let h = pressure_to_altitude(89_874.6, 101_325.0);
        assert_abs_diff_eq!(h, 1000.0, epsilon = 1.0);
        // Higher pressure is below the reference
        assert!(pressure_to_altitude(102_000.0, 101_325.0) < 0.0);
    }

    #[test]
    fn test_ground_reference_averages() {
        let samples = [low(100.0), low(102.0), low(104.0), low(50.0)];
        assert_eq!(ground_reference(&samples, 3), Some(102.0));
        assert_eq!(ground_reference(&samples, 10), Some(89.0));
        assert_eq!(ground_reference(&[], 3), None);
    }

    #[test]
    fn test_relative_altitudes_skip() {
        let samples = [low(0.0), low(1000.0), low(990.0)];
        let settings = BaroSettings {
            ground_samples: 1,
            skip_samples: 1,
        };
        let alt = relative_altitudes(&samples, &settings).unwrap();
        assert_eq!(alt.len(), 2);
        assert_eq!(alt[0], 0.0);
        assert!(alt[1] > 0.0);
    }

    #[test]
    fn test_relative_altitudes_errors() {
        let settings = BaroSettings::default();
        assert_eq!(
            relative_altitudes(&[], &settings),
            Err(FilterError::NoBarometricData)
        );
        assert_eq!(
            relative_altitudes(&[low(0.0)], &settings),
            Err(FilterError::InvalidGroundPressure(0.0))
        );
        let skip_all = BaroSettings {
            ground_samples: 1,
            skip_samples: 5,
        };
        assert_eq!(
            relative_altitudes(&[low(1.0)], &skip_all),
            Err(FilterError::NoBarometricData)
        );
    }

    #[test]
    fn test_upsample_hold_repeats() {
        let out = upsample_hold(&[1.0, 2.0], 3, 6).unwrap();
        assert_eq!(out, vec![1.0, 1.0, 1.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_upsample_hold_truncates_and_extends() {
        assert_eq!(upsample_hold(&[1.0, 2.0], 3, 4).unwrap(), vec![1.0, 1.0, 1.0, 2.0]);
        assert_eq!(
            upsample_hold(&[1.0, 2.0], 2, 6).unwrap(),
            vec![1.0, 1.0, 2.0, 2.0, 2.0, 2.0]
        );
    }

    #[test]
    fn test_upsample_hold_empty() {
        assert_eq!(upsample_hold(&[], 10, 0).unwrap(), Vec::<f64>::new());
        assert_eq!(upsample_hold(&[], 10, 5), Err(FilterError::NoBarometricData));
    }

    #[test]
    fn test_invalid_pressure_is_held() {
        let samples = [
            low(1000.0),
            low(0.0),
            low(990.0),
            low(-5.0),
            low(f64::NAN),
            low(980.0),
        ];
        let alt = relative_altitudes(&samples, &BaroSettings::default()).unwrap();
        assert_eq!(alt.len(), 6);
        assert!(alt.iter().all(|h| h.is_finite()));
        assert_eq!(alt[1], alt[0]);
        assert!(alt[2] > 0.0);
        assert_eq!(alt[3], alt[2]);
        assert_eq!(alt[4], alt[2]);
        assert!(alt[5] > alt[2]);
    }
}
