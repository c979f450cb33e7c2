//! Closed-loop simulation of clients writing to a CPU-bound storage service.
//!
//! A pool of workers issues batched writes through one shared [`CpuRateLimiter`]
//! and a [`RetryingWriter`] against a [`SimulatedService`] whose CPU load follows
//! the offered rate. With capacity `C` and target `T` the limiter should settle
//! near `C * T / 100` requests per second.

mod progress;
mod service;
mod window;

use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use log::{info, warn};
use serde::Serialize;
use strum::IntoEnumIterator;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::adaptive_rate_limiter::{CpuRateLimiter, RateSnapshot};
use crate::config::{ThrottleConfig, LOGGING_INTERVAL};
use crate::error_handling::WriteError;
use crate::models::{BatchWriteRequest, CallContext, Mutation, SignalKind};
use crate::throttle::RetryingWriter;

use progress::{log_progress, spawn_progress_logger, WriteCounters};
pub use service::{ServiceProfile, SimulatedService};

/// Parameters of one simulation run.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    /// Concurrent writers sharing the binding
    pub workers: usize,
    /// Wall-clock length of the run
    pub duration: Duration,
    /// Rows per batched write
    pub batch_size: usize,
    pub table: String,
    pub profile: ServiceProfile,
    pub throttle: ThrottleConfig,
    pub logging_interval: Duration,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            duration: Duration::from_secs(20),
            batch_size: 10,
            table: "simulated".to_string(),
            profile: ServiceProfile::default(),
            throttle: ThrottleConfig::default(),
            logging_interval: Duration::from_secs(LOGGING_INTERVAL),
        }
    }
}

/// Summary of a finished simulation run.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub elapsed_secs: f64,
    pub workers: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Successful and failed logical writes per second
    pub throughput: f64,
    /// Rate the limiter should approach: capacity scaled by the CPU target
    pub equilibrium_rate: f64,
    /// Attempt outcomes seen by the limiter, by kind
    pub signals: BTreeMap<&'static str, usize>,
    pub limiter: RateSnapshot,
}

/// Runs a simulation to completion.
///
/// # Errors
///
/// Fails if the throttle configuration is invalid, if there are no workers, or
/// if a worker task panics.
pub async fn run_simulation(config: SimulationConfig) -> Result<SimulationReport> {
    if config.workers == 0 {
        bail!("at least one worker is required");
    }
    if !(config.profile.capacity_rps.is_finite() && config.profile.capacity_rps > 0.0) {
        bail!(
            "service capacity must be a positive number of requests per second, got {}",
            config.profile.capacity_rps
        );
    }

    let limiter = Arc::new(
        CpuRateLimiter::new(&config.throttle).context("Invalid throttle configuration")?,
    );
    let service = SimulatedService::new(config.profile);
    let writer = RetryingWriter::new(service.clone(), Arc::clone(&limiter), config.throttle.retry);
    let counters = Arc::new(WriteCounters::default());
    let shutdown = CancellationToken::new();
    let logging_cancel = CancellationToken::new();

    let equilibrium_rate = config.profile.capacity_rps * limiter.target_cpu_percent() / 100.0;
    info!(
        "Starting simulation: {} workers for {:?}, capacity {:.0} req/s, target {:.1}% CPU (equilibrium ~{:.0} req/s), initial rate {:.0} req/s",
        config.workers,
        config.duration,
        config.profile.capacity_rps,
        limiter.target_cpu_percent(),
        equilibrium_rate,
        limiter.current_rate()
    );

    let start_time = Instant::now();
    let logging_task = spawn_progress_logger(
        config.logging_interval,
        start_time,
        Arc::clone(&counters),
        Arc::clone(&limiter),
        service.clone(),
        logging_cancel.clone(),
    );

    let mut tasks = FuturesUnordered::new();
    for worker in 0..config.workers {
        tasks.push(tokio::spawn(run_worker(
            worker,
            writer.clone(),
            config.table.clone(),
            config.batch_size,
            Arc::clone(&counters),
            shutdown.clone(),
        )));
    }

    tokio::time::sleep(config.duration).await;
    shutdown.cancel();

    while let Some(joined) = tasks.next().await {
        joined.context("Simulation worker panicked")?;
    }

    logging_cancel.cancel();
    if let Err(e) = logging_task.await {
        warn!("Progress logger ended abnormally: {}", e);
    }
    log_progress(start_time, &counters, &limiter, &service);

    let elapsed_secs = start_time.elapsed().as_secs_f64();
    let succeeded = counters.succeeded.load(Ordering::SeqCst);
    let failed = counters.failed.load(Ordering::SeqCst);
    // Safe cast: write counts stay far below 2^53
    #[allow(clippy::cast_precision_loss)]
    let throughput = if elapsed_secs > 0.0 {
        (succeeded + failed) as f64 / elapsed_secs
    } else {
        0.0
    };
    let stats = limiter.stats();

    Ok(SimulationReport {
        elapsed_secs,
        workers: config.workers,
        succeeded,
        failed,
        cancelled: counters.cancelled.load(Ordering::SeqCst),
        throughput,
        equilibrium_rate,
        signals: SignalKind::iter()
            .map(|kind| (kind.as_str(), stats.signal_count(kind)))
            .collect(),
        limiter: limiter.snapshot(),
    })
}

async fn run_worker(
    worker: usize,
    writer: RetryingWriter<SimulatedService>,
    table: String,
    batch_size: usize,
    counters: Arc<WriteCounters>,
    shutdown: CancellationToken,
) {
    let mut sequence = 0u64;
    while !shutdown.is_cancelled() {
        let request = build_batch(&table, worker, sequence, batch_size);
        sequence += 1;

        let context = CallContext::with_cancellation(shutdown.child_token());
        let counter = match writer.write(request, context).await {
            Ok(_) => &counters.succeeded,
            Err(WriteError::Cancelled) => &counters.cancelled,
            Err(_) => &counters.failed,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

fn build_batch(table: &str, worker: usize, sequence: u64, batch_size: usize) -> BatchWriteRequest {
    (0..batch_size.max(1)).fold(BatchWriteRequest::new(table), |request, row| {
        request.add(
            format!("w{:03}#{:010}#{:04}", worker, sequence, row),
            Mutation::set_cell("cf", "payload", sequence.to_be_bytes().to_vec()),
        )
    })
}
