//! Noise-parameter scoring and grid search.
//!
//! A candidate is scored by running the vertical filter over a prepared
//! recording and comparing its velocity against a reference velocity trace.
//! Score is `-RMSE`, so larger is better. A run that fails numerically gets
//! [`FAILED_RUN_SCORE`].

use std::ops::Range;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::KalmanSettings;
use crate::error::{ConfigError, FilterError, TuningError};
use crate::filters::NoiseConfig;
use crate::pipeline::{run_filter, FilterSeries};

/// Score reported for a discarded filter run.
pub const FAILED_RUN_SCORE: f64 = -1000.0;

/// Default cap on filter runs per grid search (10 steps per term).
pub const DEFAULT_MAX_EVALUATIONS: usize = 100_000;

pub fn rmse(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n == 0 {
        return f64::INFINITY;
    }
    let sum_sq: f64 = a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum();
    (sum_sq / n as f64).sqrt()
}

/// Everything fixed across candidates: filter inputs, settings, and the
/// reference velocity at the high rate.
pub struct ScoringProblem {
    series: FilterSeries,
    kalman: KalmanSettings,
    reference_velocity: Vec<f64>,
    window: Range<usize>,
}

impl ScoringProblem {
    /// `window` indexes high-rate steps; it is clipped to the overlap of the
    /// series and the reference. `None` means the whole overlap.
    pub fn new(
        series: FilterSeries,
        kalman: KalmanSettings,
        reference_velocity: Vec<f64>,
        window: Option<Range<usize>>,
    ) -> Result<Self, TuningError> {
        series.check_lengths()?;
        let overlap = series.len().min(reference_velocity.len());
        let window = match window {
            Some(w) => w.start.min(overlap)..w.end.min(overlap),
            None => 0..overlap,
        };
        if window.is_empty() {
            return Err(TuningError::EmptyWindow);
        }
        debug!(
            "scoring window {}..{} of {} steps",
            window.start,
            window.end,
            series.len()
        );
        Ok(Self {
            series,
            kalman,
            reference_velocity,
            window,
        })
    }

    pub fn window(&self) -> Range<usize> {
        self.window.clone()
    }

    /// Velocity RMSE over the window, or the reason the run was discarded.
    pub fn evaluate(&self, noise: &NoiseConfig) -> Result<f64, FilterError> {
        let states = run_filter(&self.series, &self.kalman, noise)?;
        let (Some(states), Some(reference)) = (
            states.get(self.window.clone()),
            self.reference_velocity.get(self.window.clone()),
        ) else {
            return Err(FilterError::TimestampMismatch {
                timestamps: self.window.end,
                samples: states.len(),
            });
        };
        let velocity: Vec<f64> = states.iter().map(|s| s.velocity()).collect();
        Ok(rmse(&velocity, reference))
    }

    pub fn score(&self, noise: &NoiseConfig) -> f64 {
        match self.evaluate(noise) {
            Ok(err) if err.is_finite() => -err,
            Ok(_) => FAILED_RUN_SCORE,
            Err(e) => {
                debug!("candidate {:?} failed: {}", noise.as_array(), e);
                FAILED_RUN_SCORE
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParamBounds {
    pub min: f64,
    pub max: f64,
}

impl Default for ParamBounds {
    fn default() -> Self {
        Self {
            min: 0.001,
            max: 100.0,
        }
    }
}

impl ParamBounds {
    fn validate(&self, name: &'static str) -> Result<(), ConfigError> {
        let ok = self.min.is_finite() && self.max.is_finite() && self.min >= 0.0 && self.min <= self.max;
        if ok {
            Ok(())
        } else {
            Err(ConfigError::InvalidBounds {
                name,
                min: self.min,
                max: self.max,
            })
        }
    }

    /// `steps` points from `min` to `max`; log-spaced when `min > 0`.
    pub fn grid(&self, steps: usize) -> Vec<f64> {
        match steps {
            0 => Vec::new(),
            1 => vec![self.min],
            _ => {
                let last = (steps - 1) as f64;
                let mut points: Vec<f64> = if self.min > 0.0 {
                    let ratio = (self.max / self.min).ln();
                    (0..steps)
                        .map(|i| self.min * (ratio * i as f64 / last).exp())
                        .collect()
                } else {
                    let span = self.max - self.min;
                    (0..steps)
                        .map(|i| self.min + span * i as f64 / last)
                        .collect()
                };
                // Pin the endpoints against rounding
                points[0] = self.min;
                points[steps - 1] = self.max;
                points
            }
        }
    }
}

/// Bounds for each of the five noise terms.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSpace {
    pub q0: ParamBounds,
    pub q1: ParamBounds,
    pub q2: ParamBounds,
    pub r0: ParamBounds,
    pub r1: ParamBounds,
}

impl SearchSpace {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, bounds) in NoiseConfig::NAMES.into_iter().zip(self.as_array()) {
            bounds.validate(name)?;
        }
        Ok(())
    }

    fn as_array(&self) -> [ParamBounds; 5] {
        [self.q0, self.q1, self.q2, self.r0, self.r1]
    }

    /// Full Cartesian grid, `q0` varying slowest and `r1` fastest.
    /// Refuses grids larger than `max_evaluations`.
    pub fn candidates(
        &self,
        steps: usize,
        max_evaluations: usize,
    ) -> Result<Vec<NoiseConfig>, TuningError> {
        self.validate()?;
        let requested = steps.checked_pow(5).ok_or_else(|| {
            ConfigError::InvalidParameter(format!("{steps} steps per term overflows the grid size"))
        })?;
        if requested > max_evaluations {
            return Err(TuningError::BudgetExceeded {
                requested,
                budget: max_evaluations,
            });
        }
        let axes = self.as_array().map(|b| b.grid(steps));
        let mut out = Vec::with_capacity(requested);
        for &q0 in &axes[0] {
            for &q1 in &axes[1] {
                for &q2 in &axes[2] {
                    for &r0 in &axes[3] {
                        for &r1 in &axes[4] {
                            out.push(NoiseConfig::new(q0, q1, q2, r0, r1)?);
                        }
                    }
                }
            }
        }
        Ok(out)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub best: NoiseConfig,
    pub score: f64,
    pub evaluations: usize,
    pub failed_runs: usize,
}

/// Score every candidate on `threads` scoped workers and keep the best.
/// Ties go to the earliest candidate in grid order.
pub fn grid_search(
    problem: &ScoringProblem,
    space: &SearchSpace,
    steps: usize,
    threads: usize,
    max_evaluations: usize,
) -> Result<SearchResult, TuningError> {
    let candidates = space.candidates(steps, max_evaluations)?;
    if candidates.is_empty() {
        return Err(ConfigError::InvalidParameter("grid needs at least one step".into()).into());
    }
    let threads = threads.clamp(1, candidates.len());
    let chunk = candidates.len().div_ceil(threads);
    info!(
        "grid search: {} candidates on {} workers",
        candidates.len(),
        threads
    );

    let per_worker = crossbeam::thread::scope(|s| {
        let handles: Vec<_> = candidates
            .chunks(chunk)
            .map(|batch| {
                s.spawn(move |_| batch.iter().map(|n| problem.score(n)).collect::<Vec<f64>>())
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join())
            .collect::<Result<Vec<_>, _>>()
    })
    .map_err(|_| TuningError::WorkerPanicked)?
    .map_err(|_| TuningError::WorkerPanicked)?;

    let scores: Vec<f64> = per_worker.into_iter().flatten().collect();
    let failed_runs = scores.iter().filter(|s| **s == FAILED_RUN_SCORE).count();

    let mut best = 0;
    for (i, score) in scores.iter().enumerate() {
        if *score > scores[best] {
            best = i;
        }
    }

    let result = SearchResult {
        best: candidates[best],
        score: scores[best],
        evaluations: scores.len(),
        failed_runs,
    };
    info!(
        "best {:?} score {:.4} ({} failed runs)",
        result.best.as_array(),
        result.score,
        failed_runs
    );
    Ok(result)
}
