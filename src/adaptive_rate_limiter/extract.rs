//! CPU sample extraction from response envelopes.

use crate::models::{BatchWriteResponse, CpuStats, ServerStats};

/// Utilization of one node in percent: `100 * recent usage / declared limit`.
///
/// Not clamped; a node running above its declared limit reports more than 100.
pub fn cpu_utilization(stats: &CpuStats) -> f64 {
    // Safe cast: GCU counters are far below 2^53
    #[allow(clippy::cast_precision_loss)]
    let (usage, limit) = (
        stats.recent_gcu_milliseconds_per_second as f64,
        stats.milligcu_limit as f64,
    );
    100.0 * (usage / limit)
}

/// Per-node CPU utilization percentages, in report order.
///
/// Returns an empty vector when the response carries no server stats, which the
/// controller treats as "no signal".
pub fn cpu_samples(stats: Option<&ServerStats>) -> Vec<f64> {
    stats
        .map(|s| s.cpu_stats.iter().map(cpu_utilization).collect())
        .unwrap_or_default()
}

/// Convenience wrapper over `cpu_samples` for a full response.
pub fn response_cpu_samples(response: &BatchWriteResponse) -> Vec<f64> {
    cpu_samples(response.server_stats.as_ref())
}
