//! Error handling and throttle statistics.
//!
//! This module provides:
//! - Error type definitions (`WriteError`, `StatusCode`, `ConfigError`)
//! - Error classification into retryable, fatal and cancelled outcomes
//! - Retry strategy configuration
//! - Signal and update statistics tracking

mod categorization;
mod stats;
mod types;

// Re-export public API
pub use categorization::{
    categorize_status, get_retry_strategy, Classification, ErrorClassifier, StatusClassifier,
};
pub use stats::ThrottleStats;
pub use types::{ConfigError, InitializationError, StatusCode, WriteError};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SignalKind;
    use strum::IntoEnumIterator;

    #[test]
    fn test_throttle_stats_initialization() {
        let stats = ThrottleStats::new();
        for kind in SignalKind::iter() {
            assert_eq!(stats.signal_count(kind), 0);
        }
        assert_eq!(stats.applied_updates(), 0);
        assert_eq!(stats.debounced_updates(), 0);
    }

    #[test]
    fn test_throttle_stats_increment() {
        let stats = ThrottleStats::new();
        stats.record_signal(SignalKind::Success);
        stats.record_signal(SignalKind::Success);
        stats.record_signal(SignalKind::RetryableFailure);
        stats.record_applied();
        stats.record_debounced();
        stats.record_debounced();

        assert_eq!(stats.signal_count(SignalKind::Success), 2);
        assert_eq!(stats.signal_count(SignalKind::RetryableFailure), 1);
        assert_eq!(stats.signal_count(SignalKind::FatalFailure), 0);
        assert_eq!(stats.total_signals(), 3);
        assert_eq!(stats.applied_updates(), 1);
        assert_eq!(stats.debounced_updates(), 2);
    }
}
