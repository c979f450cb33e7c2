//! Simulation binary for the CPU-feedback throttle.
//!
//! Thin wrapper around the `cpu_throttle` library that handles:
//! - Command-line argument parsing
//! - Logger initialization
//! - Printing the final report as JSON

use std::process;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use cpu_throttle::config::{
    LogFormat, LogLevel, RetrySettings, DEFAULT_INITIAL_RATE, DEFAULT_LOWER_RATE_BOUND,
    DEFAULT_TARGET_CPU_PERCENT, DEFAULT_UPPER_RATE_BOUND, LOGGING_INTERVAL, RETRY_MAX_ATTEMPTS,
};
use cpu_throttle::initialization::init_logger_with;
use cpu_throttle::simulation::{run_simulation, ServiceProfile, SimulationConfig};
use cpu_throttle::ThrottleConfig;

/// Drive a simulated storage cluster through the CPU-feedback rate limiter.
#[derive(Debug, Parser)]
#[command(name = "cpu_throttle", version, about)]
struct Args {
    /// Concurrent writers sharing one rate limiter
    #[arg(long, default_value_t = 8)]
    workers: usize,

    /// How long to run the simulation, in seconds
    #[arg(long, default_value_t = 20)]
    duration_secs: u64,

    /// Request rate at which the simulated service reaches 100% CPU
    #[arg(long, default_value_t = 1_000.0)]
    capacity_rps: f64,

    /// Nodes reporting CPU stats in each response
    #[arg(long, default_value_t = 3)]
    nodes: usize,

    /// Noise added to each CPU reading, in percentage points
    #[arg(long, default_value_t = 3.0)]
    noise: f64,

    /// Simulated service latency per batch, in milliseconds
    #[arg(long, default_value_t = 5)]
    latency_ms: u64,

    /// Rows per batched write
    #[arg(long, default_value_t = 10)]
    batch_size: usize,

    /// CPU utilization the limiter steers towards, in percent
    #[arg(long, default_value_t = DEFAULT_TARGET_CPU_PERCENT)]
    target_cpu: f64,

    /// Starting rate in requests per second
    #[arg(long, default_value_t = DEFAULT_INITIAL_RATE)]
    initial_rate: f64,

    /// Lowest rate the limiter may settle on
    #[arg(long, default_value_t = DEFAULT_LOWER_RATE_BOUND)]
    min_rate: f64,

    /// Highest rate the limiter may settle on
    #[arg(long, default_value_t = DEFAULT_UPPER_RATE_BOUND)]
    max_rate: f64,

    /// Attempts per logical write, including the first
    #[arg(long, default_value_t = RETRY_MAX_ATTEMPTS)]
    max_attempts: usize,

    /// Seconds between progress log lines
    #[arg(long, default_value_t = LOGGING_INTERVAL)]
    progress_interval_secs: u64,

    /// Log level
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    /// Log format
    #[arg(long, value_enum, default_value_t = LogFormat::Plain)]
    log_format: LogFormat,
}

impl Args {
    fn into_config(self) -> SimulationConfig {
        SimulationConfig {
            workers: self.workers,
            duration: Duration::from_secs(self.duration_secs),
            batch_size: self.batch_size,
            profile: ServiceProfile {
                capacity_rps: self.capacity_rps,
                nodes: self.nodes,
                noise_percent: self.noise,
                latency: Duration::from_millis(self.latency_ms),
            },
            throttle: ThrottleConfig {
                target_cpu_percent: self.target_cpu,
                lower_bound: self.min_rate,
                upper_bound: self.max_rate,
                initial_rate: self.initial_rate,
                retry: RetrySettings {
                    max_attempts: self.max_attempts,
                    ..Default::default()
                },
                ..Default::default()
            },
            logging_interval: Duration::from_secs(self.progress_interval_secs.max(1)),
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logger_with(args.log_level.clone().into(), args.log_format.clone())
        .context("Failed to initialize logger")?;

    match run_simulation(args.into_config()).await {
        Ok(report) => {
            let json =
                serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
            println!("{}", json);
            Ok(())
        }
        Err(e) => {
            eprintln!("cpu_throttle error: {:#}", e);
            process::exit(1);
        }
    }
}
