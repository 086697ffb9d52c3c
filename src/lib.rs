pub mod attitude;
pub mod baro;
pub mod calibration;
pub mod config;
pub mod decoder;
pub mod error;
pub mod filters;
pub mod pipeline;
pub mod tilt;
pub mod tuning;
pub mod types;

pub use config::PipelineConfig;
pub use decoder::{decode, DecodeStats, DecodedStream};
pub use error::{ConfigError, FilterError, TuningError};
pub use pipeline::{process, FlightSolution};
pub use tuning::{
    grid_search, ScoringProblem, SearchSpace, DEFAULT_MAX_EVALUATIONS, FAILED_RUN_SCORE,
};
