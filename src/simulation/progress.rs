//! Periodic progress logging while a simulation runs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::info;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::service::SimulatedService;
use crate::adaptive_rate_limiter::CpuRateLimiter;

/// Outcome counters for logical writes, shared by all workers.
#[derive(Debug, Default)]
pub(crate) struct WriteCounters {
    pub(crate) succeeded: AtomicUsize,
    pub(crate) failed: AtomicUsize,
    pub(crate) cancelled: AtomicUsize,
}

impl WriteCounters {
    pub(crate) fn completed(&self) -> usize {
        self.succeeded.load(Ordering::SeqCst) + self.failed.load(Ordering::SeqCst)
    }
}

/// Logs the limiter's rate and the achieved throughput once.
pub(crate) fn log_progress(
    start_time: Instant,
    counters: &WriteCounters,
    limiter: &CpuRateLimiter,
    service: &SimulatedService,
) {
    let elapsed_secs = start_time.elapsed().as_secs_f64();
    let completed = counters.completed();
    // Safe cast: write counts stay far below 2^53
    #[allow(clippy::cast_precision_loss)]
    let throughput = if elapsed_secs > 0.0 {
        completed as f64 / elapsed_secs
    } else {
        0.0
    };
    let offered = service.observed_rate();
    info!(
        "{:.1}s: rate {:.2} req/s, offered {:.1} req/s (~{:.0}% CPU), {} writes (~{:.1}/s), {} failed",
        elapsed_secs,
        limiter.current_rate(),
        offered,
        service.load_percent(offered),
        completed,
        throughput,
        counters.failed.load(Ordering::SeqCst)
    );
}

/// Spawns a task logging progress every `interval` until `cancel` fires.
pub(crate) fn spawn_progress_logger(
    interval: Duration,
    start_time: Instant,
    counters: Arc<WriteCounters>,
    limiter: Arc<CpuRateLimiter>,
    service: SimulatedService,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => log_progress(start_time, &counters, &limiter, &service),
            }
        }
    })
}
