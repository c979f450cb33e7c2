//! Error categorization and retry strategy.
//!
//! This module maps write errors onto the three outcomes the throttle cares about
//! and builds the backoff strategy used by `RetryingWriter`.

use std::time::Duration;
use tokio_retry::strategy::ExponentialBackoff;

use super::types::{StatusCode, WriteError};
use crate::config::RetrySettings;

/// Outcome of classifying a failed write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Transient overload; retried, and fed to the controller as maximal load.
    Retryable(StatusCode),
    /// Permanent failure; propagated immediately, no rate effect.
    Fatal(StatusCode),
    /// Caller abort; propagated, no rate effect.
    Cancelled,
}

impl Classification {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Classification::Retryable(_))
    }
}

/// Maps a write error onto a `Classification`.
///
/// Implemented by `StatusClassifier` for the default mapping. Callers talking to a
/// service with different overload semantics can plug in their own.
pub trait ErrorClassifier: Send + Sync + 'static {
    fn classify(&self, error: &WriteError) -> Classification;
}

/// Default classifier: deadline exceeded and unavailable are overload signals,
/// every other status is fatal.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusClassifier;

impl ErrorClassifier for StatusClassifier {
    fn classify(&self, error: &WriteError) -> Classification {
        match error {
            WriteError::Cancelled => Classification::Cancelled,
            WriteError::Status { code, .. } => categorize_status(*code),
        }
    }
}

/// Categorizes a status code into retryable or fatal.
///
/// Only `DeadlineExceeded` and `Unavailable` are retryable. The match is exhaustive,
/// so a new `StatusCode` variant has to be placed on one side explicitly.
pub fn categorize_status(code: StatusCode) -> Classification {
    match code {
        StatusCode::DeadlineExceeded | StatusCode::Unavailable => Classification::Retryable(code),
        StatusCode::ResourceExhausted
        | StatusCode::Aborted
        | StatusCode::Internal
        | StatusCode::Unknown
        | StatusCode::InvalidArgument
        | StatusCode::NotFound
        | StatusCode::AlreadyExists
        | StatusCode::PermissionDenied
        | StatusCode::Unauthenticated
        | StatusCode::FailedPrecondition
        | StatusCode::OutOfRange
        | StatusCode::Unimplemented
        | StatusCode::DataLoss => Classification::Fatal(code),
    }
}

/// Creates an exponential backoff retry strategy.
///
/// The returned iterator yields one delay per retry: `initial_delay`,
/// `initial_delay * factor`, `initial_delay * factor^2`, ... capped at `max_delay`,
/// and stops after `max_attempts - 1` retries so the total number of attempts
/// (initial + retries) never exceeds `max_attempts`.
///
/// `tokio_retry`'s `ExponentialBackoff::from_millis(factor)` yields `factor^n`
/// milliseconds for `n = 1, 2, ...`; it only supplies the exponent here, and the
/// delay itself is `initial_delay * factor^(n - 1)`.
pub fn get_retry_strategy(settings: &RetrySettings) -> impl Iterator<Item = Duration> {
    let factor = settings.factor.max(1);
    let initial_delay = settings.initial_delay;
    let max_delay = settings.max_delay;

    ExponentialBackoff::from_millis(factor)
        .map(move |step| {
            let scale = u32::try_from(step.as_millis() / u128::from(factor)).unwrap_or(u32::MAX);
            initial_delay
                .checked_mul(scale)
                .map_or(max_delay, |delay| delay.min(max_delay))
        })
        .take(settings.max_attempts.saturating_sub(1))
}
