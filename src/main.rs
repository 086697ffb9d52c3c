use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use log::info;
use serde::Serialize;

use flight_state_rs::attitude::to_euler;
use flight_state_rs::calibration::AxisMap;
use flight_state_rs::types::{AttitudeSample, HighRateSample, KalmanEstimate, LowRateSample};
use flight_state_rs::{process, DecodeStats, FlightSolution, PipelineConfig};

#[derive(Parser, Debug)]
#[command(name = "flight_state")]
#[command(about = "Decode a flight recording and estimate attitude, tilt and vertical state", long_about = None)]
struct Args {
    /// Binary recording (.bin, or gzip-compressed .gz)
    #[arg(value_name = "RECORDING")]
    input: PathBuf,

    /// JSON pipeline config; unset fields use defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Axis selection, e.g. "zyx[-1,1,1]"
    #[arg(long)]
    axis_map: Option<AxisMap>,

    #[arg(long)]
    q0: Option<f64>,
    #[arg(long)]
    q1: Option<f64>,
    #[arg(long)]
    q2: Option<f64>,
    #[arg(long)]
    r0: Option<f64>,
    #[arg(long)]
    r1: Option<f64>,

    /// Metres → output length unit (3.28 = feet)
    #[arg(long)]
    unit_scale: Option<f64>,

    /// Include every sample table in the report
    #[arg(long, default_value_t = false)]
    full: bool,

    /// Write the report here as flight_<timestamp>.json instead of stdout
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

#[derive(Serialize)]
struct FilterSummary {
    ok: bool,
    error: Option<String>,
    samples: usize,
    apogee: Option<KalmanEstimate>,
    last: Option<KalmanEstimate>,
}

#[derive(Serialize)]
struct Report {
    generated_at: String,
    input: String,
    axis_map: String,
    decode: DecodeStats,
    high_rate_samples: usize,
    low_rate_samples: usize,
    /// [x, y, z, w]
    final_quaternion: [f64; 4],
    /// roll, pitch, yaw
    final_euler_deg: [f64; 3],
    max_tilt_deg: Option<f64>,
    filter: FilterSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    high_rate: Option<Vec<HighRateSample>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    low_rate: Option<Vec<LowRateSample>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    attitude: Option<Vec<AttitudeSample>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    estimates: Option<Vec<KalmanEstimate>>,
    /// Accelerometer-only vertical velocity, for comparison with the filter
    #[serde(skip_serializing_if = "Option::is_none")]
    dead_reckoning_velocity: Option<Vec<f64>>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = build_config(&args)?;
    let buf = load_recording(&args.input)?;
    info!("[{}] loaded {} bytes from {}", ts_now(), buf.len(), args.input.display());

    let solution = process(&buf, &config);
    let report = build_report(&args, &config, solution);
    let json = serde_json::to_string_pretty(&report)?;

    match args.output_dir.as_ref() {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let filename = dir.join(format!("flight_{}.json", ts_now_clean()));
            std::fs::write(&filename, json)?;
            info!("[{}] report written to {}", ts_now(), filename.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn build_config(args: &Args) -> Result<PipelineConfig> {
    let mut config = match args.config.as_ref() {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(map) = args.axis_map {
        config.axis_map = map;
    }
    let noise = &mut config.kalman.noise;
    for (slot, value) in [
        (&mut noise.q0, args.q0),
        (&mut noise.q1, args.q1),
        (&mut noise.q2, args.q2),
        (&mut noise.r0, args.r0),
        (&mut noise.r1, args.r1),
    ] {
        if let Some(v) = value {
            *slot = v;
        }
    }
    if let Some(scale) = args.unit_scale {
        config.kalman.unit_scale = scale;
    }
    config.validate()?;
    Ok(config)
}

fn load_recording(path: &Path) -> Result<Vec<u8>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut buf = Vec::new();
    if path.extension().map(|e| e == "gz").unwrap_or(false) {
        let mut gz = flate2::read::GzDecoder::new(BufReader::new(file));
        gz.read_to_end(&mut buf)?;
    } else {
        BufReader::new(file).read_to_end(&mut buf)?;
    }
    Ok(buf)
}

fn build_report(args: &Args, config: &PipelineConfig, solution: FlightSolution) -> Report {
    let q = solution.final_orientation;
    let euler = to_euler(&q, true);
    let max_tilt_deg = solution.max_tilt();
    let apogee = solution.apogee().copied();

    let (filter, estimates) = match solution.estimates {
        Ok(estimates) => (
            FilterSummary {
                ok: true,
                error: None,
                samples: estimates.len(),
                apogee,
                last: estimates.last().copied(),
            },
            Some(estimates),
        ),
        Err(e) => (
            FilterSummary {
                ok: false,
                error: Some(e.to_string()),
                samples: 0,
                apogee: None,
                last: None,
            },
            None,
        ),
    };

    let stream = solution.stream;
    let mut report = Report {
        generated_at: Utc::now().to_rfc3339(),
        input: args.input.display().to_string(),
        axis_map: config.axis_map.to_string(),
        decode: stream.stats,
        high_rate_samples: stream.high_rate.len(),
        low_rate_samples: stream.low_rate.len(),
        final_quaternion: [q.i, q.j, q.k, q.w],
        final_euler_deg: [euler.x, euler.y, euler.z],
        max_tilt_deg,
        filter,
        high_rate: None,
        low_rate: None,
        attitude: None,
        estimates: None,
        dead_reckoning_velocity: None,
    };
    if args.full {
        report.high_rate = Some(stream.high_rate);
        report.low_rate = Some(stream.low_rate);
        report.attitude = Some(solution.attitude);
        report.estimates = estimates;
        report.dead_reckoning_velocity = Some(solution.dead_reckoning_velocity);
    }
    report
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}

fn ts_now_clean() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}
