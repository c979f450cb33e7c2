//! Adaptive rate limiter implementation.

use serde::Serialize;
use std::time::Duration;

use super::algorithm::calculate_rate;
use super::pacing::Pacer;
use super::state::{RateBounds, RateChange, RateState};
use crate::config::{ThrottleConfig, OVERLOAD_CPU_SAMPLE};
use crate::error_handling::{ConfigError, ThrottleStats, WriteError};
use crate::models::{CallContext, ResponseSignal};

/// Point-in-time view of a limiter, for diagnostics and reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateSnapshot {
    pub current_rate: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub target_cpu_percent: f64,
    pub secs_since_last_update: f64,
    pub applied_updates: usize,
    pub debounced_updates: usize,
}

/// Adaptive rate limiter that adjusts the request rate from server CPU feedback.
///
/// One instance per client-to-service binding, shared by every concurrent caller
/// (typically behind an `Arc`). There is no background task: each completed
/// attempt feeds its signal through [`observe`](Self::observe) on the caller's
/// own response path, and each attempt waits its turn in
/// [`pace`](Self::pace) before being issued.
///
/// - CPU above target: multiplicative decrease, never below 30% per step
/// - CPU more than 5 points under target: grow by 30%
/// - Retryable overload failures count as a saturated CPU reading
/// - At most one update per debounce window
pub struct CpuRateLimiter {
    state: RateState,
    pacer: Pacer,
    target_cpu_percent: f64,
    min_update_interval: Duration,
    stats: ThrottleStats,
}

impl CpuRateLimiter {
    /// Creates a limiter from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns the `ConfigError` reported by `ThrottleConfig::validate`.
    pub fn new(config: &ThrottleConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let bounds = RateBounds::new(config.lower_bound, config.upper_bound);
        Ok(CpuRateLimiter {
            state: RateState::new(config.initial_rate, bounds),
            pacer: Pacer::new(),
            target_cpu_percent: config.target_cpu_percent,
            min_update_interval: config.min_update_interval,
            stats: ThrottleStats::new(),
        })
    }

    /// Gets the current rate in requests per second.
    pub fn current_rate(&self) -> f64 {
        self.state.read()
    }

    pub fn bounds(&self) -> RateBounds {
        self.state.bounds()
    }

    pub fn target_cpu_percent(&self) -> f64 {
        self.target_cpu_percent
    }

    pub fn time_since_last_update(&self) -> Duration {
        self.state.time_since_last_update()
    }

    pub fn stats(&self) -> &ThrottleStats {
        &self.stats
    }

    /// Waits until the next request on this binding may be issued.
    ///
    /// # Errors
    ///
    /// `WriteError::Cancelled` if the call is cancelled while waiting.
    pub async fn pace(&self, ctx: &CallContext) -> Result<(), WriteError> {
        let waited = self.pacer.acquire(&self.state, ctx).await?;
        if !waited.is_zero() {
            log::trace!("Paced request for {:?}", waited);
        }
        Ok(())
    }

    /// Feeds the outcome of one attempt into the controller.
    ///
    /// Returns the applied change, or `None` when the signal carried no rate
    /// information or arrived inside the debounce window.
    pub fn observe(&self, signal: &ResponseSignal) -> Option<RateChange> {
        self.stats.record_signal(signal.kind());
        if !signal.carries_rate_information() {
            return None;
        }

        let overload = [OVERLOAD_CPU_SAMPLE];
        let samples: &[f64] = match signal {
            ResponseSignal::Success(samples) if samples.is_empty() => {
                log::trace!("Response carried no CPU stats, rate left untouched");
                return None;
            }
            ResponseSignal::RetryableFailure(code) => {
                log::debug!("Retryable failure {} treated as overload", code);
                &overload
            }
            ResponseSignal::Success(samples) => samples,
            ResponseSignal::FatalFailure(_) | ResponseSignal::Cancelled => return None,
        };

        let target = self.target_cpu_percent;
        let bounds = self.state.bounds();
        let change = self
            .state
            .apply_if_elapsed(self.min_update_interval, |current| {
                calculate_rate(samples, target, current, bounds)
            });

        match change {
            Some(change) => {
                self.stats.record_applied();
                if change.is_unchanged() {
                    log::debug!(
                        "CPU rate limiter: CPU within band of target {:.1}%, keeping rate {:.2}",
                        target,
                        change.current
                    );
                } else {
                    log::info!(
                        "CPU rate limiter: {} (target {:.1}%), rate {:.2} → {:.2}",
                        describe(signal),
                        target,
                        change.previous,
                        change.current
                    );
                }
                Some(change)
            }
            None => {
                self.stats.record_debounced();
                log::debug!(
                    "CPU rate limiter: {} inside debounce window, rate unchanged",
                    describe(signal)
                );
                None
            }
        }
    }

    pub fn snapshot(&self) -> RateSnapshot {
        let bounds = self.state.bounds();
        RateSnapshot {
            current_rate: self.state.read(),
            lower_bound: bounds.lower,
            upper_bound: bounds.upper,
            target_cpu_percent: self.target_cpu_percent(),
            secs_since_last_update: self.state.time_since_last_update().as_secs_f64(),
            applied_updates: self.stats.applied_updates(),
            debounced_updates: self.stats.debounced_updates(),
        }
    }
}

fn describe(signal: &ResponseSignal) -> String {
    match signal {
        ResponseSignal::Success(samples) => {
            // Safe cast: one sample per serving node
            #[allow(clippy::cast_precision_loss)]
            let avg = samples.iter().sum::<f64>() / samples.len().max(1) as f64;
            format!("average CPU {:.1}%", avg)
        }
        ResponseSignal::RetryableFailure(code) => format!("overload failure {}", code),
        ResponseSignal::FatalFailure(code) => format!("fatal failure {}", code),
        ResponseSignal::Cancelled => "cancellation".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_handling::StatusCode;
    use crate::models::SignalKind;

    fn limiter(initial: f64, lower: f64, upper: f64) -> CpuRateLimiter {
        CpuRateLimiter::new(&ThrottleConfig {
            initial_rate: initial,
            lower_bound: lower,
            upper_bound: upper,
            ..Default::default()
        })
        .expect("valid config")
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = ThrottleConfig {
            target_cpu_percent: 100.0,
            ..Default::default()
        };
        assert!(CpuRateLimiter::new(&config).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_inside_first_window_is_debounced() {
        let limiter = limiter(10_000.0, 1.0, 100_000.0);
        assert_eq!(limiter.observe(&ResponseSignal::Success(vec![12.5])), None);
        assert_eq!(limiter.current_rate(), 10_000.0);
        assert_eq!(limiter.stats().debounced_updates(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_low_cpu_increases_rate() {
        let limiter = limiter(10_000.0, 1.0, 100_000.0);
        tokio::time::advance(Duration::from_secs(1)).await;

        let change = limiter.observe(&ResponseSignal::Success(vec![12.5]));
        assert!(change.is_some());
        assert!((limiter.current_rate() - 13_000.0).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_failure_shrinks_to_floor() {
        let limiter = limiter(10_000.0, 1.0, 100_000.0);
        tokio::time::advance(Duration::from_secs(1)).await;

        limiter.observe(&ResponseSignal::RetryableFailure(
            StatusCode::DeadlineExceeded,
        ));
        let rate = limiter.current_rate();
        assert!(rate >= 3_000.0 - 1e-6);
        assert!(rate < 10_000.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_and_cancelled_do_not_update() {
        let limiter = limiter(10_000.0, 1.0, 100_000.0);
        tokio::time::advance(Duration::from_secs(5)).await;

        assert_eq!(
            limiter.observe(&ResponseSignal::FatalFailure(StatusCode::NotFound)),
            None
        );
        assert_eq!(limiter.observe(&ResponseSignal::Cancelled), None);
        assert_eq!(limiter.current_rate(), 10_000.0);
        assert_eq!(limiter.stats().applied_updates(), 0);
        assert_eq!(limiter.stats().debounced_updates(), 0);
        assert_eq!(limiter.stats().signal_count(SignalKind::FatalFailure), 1);
        assert_eq!(limiter.stats().signal_count(SignalKind::Cancelled), 1);
        // No update means the debounce clock was not reset
        assert_eq!(limiter.time_since_last_update(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_samples_do_not_consume_window() {
        let limiter = limiter(10_000.0, 1.0, 100_000.0);
        tokio::time::advance(Duration::from_secs(1)).await;

        assert_eq!(limiter.observe(&ResponseSignal::Success(Vec::new())), None);
        assert!(limiter
            .observe(&ResponseSignal::Success(vec![87.5]))
            .is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_signals_within_window_apply_once() {
        let limiter = limiter(10_000.0, 1.0, 100_000.0);
        tokio::time::advance(Duration::from_secs(2)).await;

        limiter.observe(&ResponseSignal::Success(vec![87.5]));
        tokio::time::advance(Duration::from_millis(300)).await;
        limiter.observe(&ResponseSignal::Success(vec![12.5]));

        assert_eq!(limiter.stats().applied_updates(), 1);
        assert_eq!(limiter.stats().debounced_updates(), 1);
        assert!((limiter.current_rate() - 10_000.0 * (1.0 - 17.5 / 30.0)).abs() < 1e-6);

        // Once the window has passed the next signal applies again
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(limiter
            .observe(&ResponseSignal::Success(vec![12.5]))
            .is_some());
        assert_eq!(limiter.stats().applied_updates(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_reports_state() {
        let limiter = limiter(250.0, 10.0, 1_000.0);
        tokio::time::advance(Duration::from_millis(1_500)).await;

        let snapshot = limiter.snapshot();
        assert_eq!(snapshot.current_rate, 250.0);
        assert_eq!(snapshot.lower_bound, 10.0);
        assert_eq!(snapshot.upper_bound, 1_000.0);
        assert_eq!(snapshot.target_cpu_percent, 70.0);
        assert_eq!(snapshot.secs_since_last_update, 1.5);

        let json = serde_json::to_value(&snapshot).expect("serializable");
        assert_eq!(json["current_rate"], 250.0);
    }
}
