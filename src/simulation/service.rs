//! Simulated storage service whose CPU load follows the offered rate.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use rand::Rng;
use tower::Service;

use super::window::ArrivalWindow;
use crate::error_handling::{StatusCode, WriteError};
use crate::models::{BatchWriteResponse, CpuStats, EntryStatus, ServerStats, WriteCall};

/// Declared per-node limit reported in every response, in milli-GCU
pub(crate) const NODE_MILLIGCU_LIMIT: i64 = 10_000;

/// Load model of the simulated service.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServiceProfile {
    /// Requests per second at which every node sits at 100% CPU
    pub capacity_rps: f64,
    /// Nodes reporting CPU stats per response
    pub nodes: usize,
    /// Half-width of the uniform noise added to each node's reading, in percent
    pub noise_percent: f64,
    /// Time to serve one batch
    pub latency: Duration,
}

impl Default for ServiceProfile {
    fn default() -> Self {
        Self {
            capacity_rps: 1_000.0,
            nodes: 3,
            noise_percent: 3.0,
            latency: Duration::from_millis(5),
        }
    }
}

/// Batched-write service simulating a storage cluster under load.
///
/// Each node's CPU is the arrival rate over the last second divided by the
/// cluster's capacity, plus noise. Once load passes 100% a growing share of calls
/// fails with `Unavailable` or `DeadlineExceeded`.
#[derive(Clone)]
pub struct SimulatedService {
    profile: ServiceProfile,
    arrivals: Arc<ArrivalWindow>,
}

impl SimulatedService {
    pub fn new(profile: ServiceProfile) -> Self {
        // Safe cast: capacity is a positive, finite request rate
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let window_capacity = (profile.capacity_rps * 4.0).ceil().max(16.0) as usize;
        Self {
            profile,
            arrivals: Arc::new(ArrivalWindow::new(window_capacity, Duration::from_secs(1))),
        }
    }

    /// Arrival rate over the last second.
    pub fn observed_rate(&self) -> f64 {
        self.arrivals.rate()
    }

    /// Mean CPU load in percent at an offered `rate`, before noise.
    pub fn load_percent(&self, rate: f64) -> f64 {
        100.0 * rate / self.profile.capacity_rps
    }

    fn serve(&self, call: &WriteCall) -> Result<BatchWriteResponse, WriteError> {
        let load = self.load_percent(self.arrivals.record());
        let mut rng = rand::rng();

        if load > 100.0 {
            let failure_probability = ((load - 100.0) / 100.0).clamp(0.0, 0.95);
            if rng.random_bool(failure_probability) {
                let code = if rng.random_bool(0.5) {
                    StatusCode::Unavailable
                } else {
                    StatusCode::DeadlineExceeded
                };
                return Err(WriteError::status(
                    code,
                    format!("simulated overload at {:.0}% CPU", load),
                ));
            }
        }

        let noise = self.profile.noise_percent.abs();
        let cpu_stats = (0..self.profile.nodes)
            .map(|_| {
                let reading = if noise > 0.0 {
                    load + rng.random_range(-noise..=noise)
                } else {
                    load
                };
                // Safe cast: readings are small, non-negative percentages
                #[allow(clippy::cast_possible_truncation)]
                let used = (reading.max(0.0) / 100.0 * NODE_MILLIGCU_LIMIT as f64).round() as i64;
                CpuStats::new(used, NODE_MILLIGCU_LIMIT)
            })
            .collect();

        Ok(BatchWriteResponse {
            entries: (0..call.request.len())
                .map(|index| EntryStatus { index, error: None })
                .collect(),
            server_stats: Some(ServerStats { cpu_stats }),
        })
    }
}

impl Service<WriteCall> for SimulatedService {
    type Response = BatchWriteResponse;
    type Error = WriteError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, call: WriteCall) -> Self::Future {
        let result = self.serve(&call);
        let latency = self.profile.latency;
        Box::pin(async move {
            tokio::time::sleep(latency).await;
            result
        })
    }
}
