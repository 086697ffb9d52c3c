//! Decode → attitude → tilt → vertical filter, for one recording.

use log::{debug, info, warn};
use nalgebra::Quaternion;

use crate::attitude::AttitudeEstimator;
use crate::baro::{relative_altitudes, upsample_hold};
use crate::calibration::{body_accels, body_rates};
use crate::config::{KalmanSettings, PipelineConfig};
use crate::decoder::{decode, DecodedStream};
use crate::error::FilterError;
use crate::filters::{FilterInputs, KalmanState, MeasurementModel, NoiseConfig, VerticalKf};
use crate::tilt::compute_tilt;
use crate::types::{AttitudeSample, HighRateSample, KalmanEstimate};

/// Per-step filter inputs at the high-rate tier.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FilterSeries {
    pub dt: f64,
    pub timestamps: Vec<f64>,
    /// Body axial acceleration [m/s²]
    pub axial_accel: Vec<f64>,
    pub tilt_cos: Vec<f64>,
    /// Relative barometric altitude in the output unit, held at the high rate
    pub baro_altitude: Vec<f64>,
}

impl FilterSeries {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Every per-step vector must have one entry per timestamp.
    pub fn check_lengths(&self) -> Result<(), FilterError> {
        let samples = self.axial_accel.len();
        if self.timestamps.len() != samples {
            return Err(FilterError::TimestampMismatch {
                timestamps: self.timestamps.len(),
                samples,
            });
        }
        if self.tilt_cos.len() != samples || self.baro_altitude.len() != samples {
            return Err(FilterError::LengthMismatch {
                accel: samples,
                tilt: self.tilt_cos.len(),
                baro: self.baro_altitude.len(),
            });
        }
        Ok(())
    }

    pub fn inputs(&self) -> FilterInputs<'_> {
        FilterInputs {
            axial_accel: &self.axial_accel,
            tilt_cos: &self.tilt_cos,
            baro_altitude: &self.baro_altitude,
        }
    }
}

pub struct FlightSolution {
    pub stream: DecodedStream,
    /// One row per high-rate sample: orientation after integrating it
    pub attitude: Vec<AttitudeSample>,
    pub final_orientation: Quaternion<f64>,
    /// Either the full estimate sequence or the reason the run was discarded
    pub estimates: Result<Vec<KalmanEstimate>, FilterError>,
    /// Open-loop vertical velocity from the accelerometer alone, one entry
    /// per filter step. Empty when the filter inputs could not be built.
    pub dead_reckoning_velocity: Vec<f64>,
}

impl FlightSolution {
    pub fn max_tilt(&self) -> Option<f64> {
        self.attitude.iter().map(|a| a.tilt).reduce(f64::max)
    }

    pub fn apogee(&self) -> Option<&KalmanEstimate> {
        self.estimates
            .as_ref()
            .ok()?
            .iter()
            .reduce(|best, e| if e.altitude > best.altitude { e } else { best })
    }
}

/// Integrate gyro rates and attach orientation and tilt to each sample.
pub fn solve_attitude(
    samples: &[HighRateSample],
    config: &PipelineConfig,
) -> (Vec<AttitudeSample>, Quaternion<f64>) {
    let rates = body_rates(samples, &config.axis_map, &config.gyro_bias);
    let mut estimator = AttitudeEstimator::new(config.rates.high_period());
    let quats = estimator.integrate(&rates);

    let rows = samples
        .iter()
        .zip(&quats[1..])
        .map(|(s, q)| {
            let tilt = compute_tilt(q);
            AttitudeSample {
                timestamp: s.timestamp,
                quat_x: q.i,
                quat_y: q.j,
                quat_z: q.k,
                quat_w: q.w,
                tilt: tilt.angle_deg,
                tilt_cos: tilt.cosine,
            }
        })
        .collect();
    (rows, estimator.orientation())
}

/// Assemble the filter inputs from decoded samples and attitude rows.
pub fn build_series(
    stream: &DecodedStream,
    attitude: &[AttitudeSample],
    config: &PipelineConfig,
) -> Result<FilterSeries, FilterError> {
    let kalman = &config.kalman;
    let dt = config.rates.high_period();
    if stream.high_rate.is_empty() {
        return Ok(FilterSeries {
            dt,
            ..FilterSeries::default()
        });
    }

    let axis = kalman.axial_axis.index();
    let axial_accel: Vec<f64> = body_accels(&stream.high_rate, &config.axis_map)
        .iter()
        .map(|a| a[axis] * kalman.standard_gravity)
        .collect();
    let tilt_cos: Vec<f64> = attitude.iter().map(|a| a.tilt_cos).collect();

    let altitude_m = relative_altitudes(&stream.low_rate, &config.baro)?;
    let scaled: Vec<f64> = altitude_m.iter().map(|h| h * kalman.unit_scale).collect();
    let baro_altitude = upsample_hold(
        &scaled,
        config.rates.upsample_factor(),
        stream.high_rate.len(),
    )?;
    if scaled.len() * config.rates.upsample_factor() < stream.high_rate.len() {
        debug!(
            "baro covers {} of {} high-rate steps, holding last value",
            scaled.len() * config.rates.upsample_factor(),
            stream.high_rate.len()
        );
    }

    Ok(FilterSeries {
        dt,
        timestamps: stream.high_rate.iter().map(|s| s.timestamp).collect(),
        axial_accel,
        tilt_cos,
        baro_altitude,
    })
}

/// Tilt-compensated vertical velocity by rectangular integration of the
/// axial accelerometer, starting from rest. No baro correction, so it drifts.
pub fn integrate_velocity(series: &FilterSeries, model: &MeasurementModel) -> Vec<f64> {
    series
        .axial_accel
        .iter()
        .zip(&series.tilt_cos)
        .scan(0.0, |vel, (accel, tilt_cos)| {
            *vel += model.vertical_accel(*tilt_cos, *accel) * series.dt;
            Some(*vel)
        })
        .collect()
}

/// Run the vertical filter with the given noise terms.
pub fn run_filter(
    series: &FilterSeries,
    kalman: &KalmanSettings,
    noise: &NoiseConfig,
) -> Result<Vec<KalmanState>, FilterError> {
    series.check_lengths()?;
    let mut kf = VerticalKf::new(series.dt, noise)
        .with_initial(kalman.initial_state(), kalman.initial_covariance());
    kf.run(&series.inputs(), &kalman.measurement_model())
}

pub fn to_estimates(series: &FilterSeries, states: &[KalmanState]) -> Vec<KalmanEstimate> {
    series
        .timestamps
        .iter()
        .zip(states)
        .map(|(t, s)| KalmanEstimate {
            timestamp: *t,
            altitude: s.altitude(),
            velocity: s.velocity(),
            acceleration: s.acceleration(),
            covariance_trace: s.covariance_trace(),
        })
        .collect()
}

/// Decode a recording and run every stage over it.
pub fn process(buf: &[u8], config: &PipelineConfig) -> FlightSolution {
    let stream = decode(buf, &config.sensitivity, &config.rates);
    let (attitude, final_orientation) = solve_attitude(&stream.high_rate, config);

    let series = build_series(&stream, &attitude, config);
    let dead_reckoning_velocity = series
        .as_ref()
        .map(|s| integrate_velocity(s, &config.kalman.measurement_model()))
        .unwrap_or_default();
    let estimates = series.and_then(|series| {
        run_filter(&series, &config.kalman, &config.kalman.noise)
            .map(|states| to_estimates(&series, &states))
    });

    match &estimates {
        Ok(e) => info!(
            "processed {} high-rate, {} low-rate samples; {} estimates",
            stream.high_rate.len(),
            stream.low_rate.len(),
            e.len()
        ),
        Err(err) => warn!("vertical filter discarded: {}", err),
    }

    FlightSolution {
        stream,
        attitude,
        final_orientation,
        estimates,
        dead_reckoning_velocity,
    }
}
