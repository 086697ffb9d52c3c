use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use clap::Parser;
use flate2::read::GzDecoder;
use log::info;
use serde::Deserialize;
use serde_json::json;

use flight_state_rs::baro::upsample_hold;
use flight_state_rs::decoder::decode;
use flight_state_rs::filters::NoiseConfig;
use flight_state_rs::pipeline::{build_series, solve_attitude};
use flight_state_rs::{
    grid_search, PipelineConfig, ScoringProblem, SearchSpace, DEFAULT_MAX_EVALUATIONS,
};

#[derive(Parser, Debug)]
struct Args {
    /// Binary recording (.bin or .gz)
    #[arg(long)]
    recording: PathBuf,

    /// Reference velocity trace (JSON: {"rate_hz": .., "velocity": [..]})
    #[arg(long)]
    reference: PathBuf,

    /// JSON pipeline config
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON search bounds per noise term; default [0.001, 100] each
    #[arg(long)]
    bounds: Option<PathBuf>,

    /// Scoring window start [s]
    #[arg(long)]
    window_start: Option<f64>,

    /// Scoring window end [s]
    #[arg(long)]
    window_end: Option<f64>,

    /// Grid points per noise term
    #[arg(long, default_value_t = 4)]
    steps: usize,

    /// Refuse grids with more filter runs than this
    #[arg(long, default_value_t = DEFAULT_MAX_EVALUATIONS)]
    max_evaluations: usize,

    /// Worker threads (0 = available parallelism)
    #[arg(long, default_value_t = 0)]
    threads: usize,

    /// Score a single candidate "q0,q1,q2,r0,r1" instead of searching
    #[arg(long, value_delimiter = ',', num_args = 5)]
    score: Option<Vec<f64>>,
}

/// Reference velocity, in the same length unit as the filter output.
#[derive(Deserialize)]
struct ReferenceTrace {
    rate_hz: f64,
    velocity: Vec<f64>,
}

fn load_bytes(path: &Path) -> anyhow::Result<Vec<u8>> {
    let file = File::open(path)?;
    let mut buf = Vec::new();
    if path.extension().map(|e| e == "gz").unwrap_or(false) {
        GzDecoder::new(BufReader::new(file)).read_to_end(&mut buf)?;
    } else {
        BufReader::new(file).read_to_end(&mut buf)?;
    }
    Ok(buf)
}

fn load_reference(path: &Path) -> anyhow::Result<ReferenceTrace> {
    let trace: ReferenceTrace = serde_json::from_slice(&load_bytes(path)?)?;
    if !(trace.rate_hz.is_finite() && trace.rate_hz > 0.0) {
        anyhow::bail!("reference rate_hz must be positive, got {}", trace.rate_hz);
    }
    Ok(trace)
}

fn build_problem(args: &Args, config: &PipelineConfig) -> anyhow::Result<ScoringProblem> {
    let buf = load_bytes(&args.recording)?;
    let stream = decode(&buf, &config.sensitivity, &config.rates);
    let (attitude, _) = solve_attitude(&stream.high_rate, config);
    let series = build_series(&stream, &attitude, config)?;
    if series.is_empty() {
        anyhow::bail!("{} has no high-rate samples", args.recording.display());
    }

    let reference = load_reference(&args.reference)?;
    let factor = (config.rates.high_hz / reference.rate_hz).round().max(1.0) as usize;
    let velocity = upsample_hold(&reference.velocity, factor, series.len())?;

    let to_index = |t: f64| (t * config.rates.high_hz).round().max(0.0) as usize;
    let start = args.window_start.map(to_index).unwrap_or(0);
    let end = args.window_end.map(to_index).unwrap_or(series.len());

    Ok(ScoringProblem::new(
        series,
        config.kalman,
        velocity,
        Some(start..end),
    )?)
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match args.config.as_ref() {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    let problem = build_problem(&args, &config)?;
    let window = problem.window();

    let result = if let Some(values) = args.score.as_ref() {
        let &[q0, q1, q2, r0, r1] = values.as_slice() else {
            anyhow::bail!("--score needs exactly five values");
        };
        let noise = NoiseConfig::new(q0, q1, q2, r0, r1)?;
        let score = problem.score(&noise);
        info!("score {:.4} for {:?}", score, noise.as_array());
        json!({
            "recording": args.recording.display().to_string(),
            "window": [window.start, window.end],
            "noise": noise,
            "score": score,
        })
    } else {
        let space: SearchSpace = match args.bounds.as_ref() {
            Some(path) => serde_json::from_slice(&load_bytes(path)?)?,
            None => SearchSpace::default(),
        };
        let threads = if args.threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            args.threads
        };
        let found = grid_search(&problem, &space, args.steps, threads, args.max_evaluations)?;
        json!({
            "recording": args.recording.display().to_string(),
            "window": [window.start, window.end],
            "steps": args.steps,
            "best": found.best,
            "score": found.score,
            "evaluations": found.evaluations,
            "failed_runs": found.failed_runs,
        })
    };

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
