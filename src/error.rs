use thiserror::Error;

/// Configuration errors. Raised before any decoding starts.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid axis map: {0}")]
    InvalidAxisMap(String),

    #[error("Invalid noise term {name}: {value} (must be finite and non-negative)")]
    InvalidNoise { name: &'static str, value: f64 },

    #[error("Invalid sample rate: {0} Hz")]
    InvalidRate(f64),

    #[error("Invalid bounds for {name}: [{min}, {max}]")]
    InvalidBounds { name: &'static str, min: f64, max: f64 },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Outcomes that discard a whole filter run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("Innovation covariance is singular at step {step}")]
    SingularInnovation { step: usize },

    #[error("Non-finite filter state at step {step}")]
    NonFinite { step: usize },

    #[error("Input length mismatch: accel={accel} tilt={tilt} baro={baro}")]
    LengthMismatch { accel: usize, tilt: usize, baro: usize },

    #[error("Timestamp count {timestamps} does not match {samples} filter inputs")]
    TimestampMismatch { timestamps: usize, samples: usize },

    #[error("No barometric samples available")]
    NoBarometricData,

    #[error("Invalid ground reference pressure: {0}")]
    InvalidGroundPressure(f64),
}

/// Noise-parameter search failures.
#[derive(Error, Debug)]
pub enum TuningError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error("Reference velocity does not overlap the scoring window")]
    EmptyWindow,

    #[error("Grid of {requested} candidates exceeds the budget of {budget} evaluations")]
    BudgetExceeded { requested: usize, budget: usize },

    #[error("Scoring worker panicked")]
    WorkerPanicked,
}
