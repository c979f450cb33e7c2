//! Inter-request pacing.
//!
//! Spaces request issuance on a binding by at least `1 / rate` seconds, reading
//! the rate fresh on every check so that a lowered rate throttles callers that are
//! already waiting.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::{sleep_until, Instant};

use super::state::RateState;
use crate::error_handling::WriteError;
use crate::models::CallContext;

/// Minimum spacing between requests at `rate` requests per second.
///
/// `None` when the interval does not fit in a `Duration`.
pub fn pacing_interval(rate: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(1.0 / rate).ok()
}

/// Tracks when the last request on a binding was issued.
///
/// A caller only claims an issuance slot once its wait is over, so a caller that
/// is cancelled while waiting leaves no trace behind.
#[derive(Debug, Default)]
pub struct Pacer {
    last_issue: Mutex<Option<Instant>>,
}

impl Pacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until a request may be issued at the rate held in `state`.
    ///
    /// # Returns
    ///
    /// How long the caller waited.
    ///
    /// # Errors
    ///
    /// `WriteError::Cancelled` if the call's context is cancelled before the wait is
    /// over. The abandoned wait does not claim a slot.
    pub async fn acquire(
        &self,
        state: &RateState,
        ctx: &CallContext,
    ) -> Result<Duration, WriteError> {
        let started = Instant::now();
        loop {
            if ctx.is_cancelled() {
                return Err(WriteError::Cancelled);
            }

            let earliest = {
                let mut last_issue = self
                    .last_issue
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                let now = Instant::now();
                let earliest = match *last_issue {
                    None => Some(now),
                    Some(last) => {
                        pacing_interval(state.read()).and_then(|interval| last.checked_add(interval))
                    }
                };
                match earliest {
                    Some(at) if at <= now => {
                        *last_issue = Some(now);
                        return Ok(now.duration_since(started));
                    }
                    other => other,
                }
            };

            match earliest {
                Some(at) => {
                    tokio::select! {
                        _ = ctx.cancelled() => return Err(WriteError::Cancelled),
                        _ = sleep_until(at) => {}
                    }
                }
                // Interval beyond representable time: only cancellation ends the wait
                None => {
                    ctx.cancelled().await;
                    return Err(WriteError::Cancelled);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adaptive_rate_limiter::state::RateBounds;
    use std::sync::Arc;

    #[test]
    fn test_pacing_interval() {
        assert_eq!(pacing_interval(10.0), Some(Duration::from_millis(100)));
        assert_eq!(pacing_interval(1.0), Some(Duration::from_secs(1)));
        assert_eq!(pacing_interval(0.5), Some(Duration::from_secs(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_request_is_not_delayed() {
        let state = RateState::new(1.0, RateBounds::new(1.0, 10.0));
        let pacer = Pacer::new();
        let waited = pacer.acquire(&state, &CallContext::new()).await.unwrap();
        assert_eq!(waited, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_consecutive_requests_are_spaced() {
        let state = RateState::new(10.0, RateBounds::new(1.0, 100.0));
        let pacer = Pacer::new();
        let ctx = CallContext::new();
        let start = Instant::now();

        pacer.acquire(&state, &ctx).await.unwrap();
        pacer.acquire(&state, &ctx).await.unwrap();
        pacer.acquire(&state, &ctx).await.unwrap();

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_millis(210));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_wait_after_idle_period() {
        let state = RateState::new(10.0, RateBounds::new(1.0, 100.0));
        let pacer = Pacer::new();
        let ctx = CallContext::new();

        pacer.acquire(&state, &ctx).await.unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;
        let waited = pacer.acquire(&state, &ctx).await.unwrap();
        assert_eq!(waited, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_spacing() {
        let state = Arc::new(RateState::new(4.0, RateBounds::new(1.0, 100.0)));
        let pacer = Arc::new(Pacer::new());
        let start = Instant::now();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let state = Arc::clone(&state);
                let pacer = Arc::clone(&pacer);
                tokio::spawn(async move {
                    pacer.acquire(&state, &CallContext::new()).await.unwrap();
                    Instant::now()
                })
            })
            .collect();

        let mut issued = Vec::new();
        for handle in handles {
            issued.push(handle.await.unwrap());
        }
        issued.sort();
        for pair in issued.windows(2) {
            assert!(pair[1].duration_since(pair[0]) >= Duration::from_millis(250));
        }
        assert!(start.elapsed() >= Duration::from_millis(750));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_wait_is_abandoned() {
        let state = Arc::new(RateState::new(1.0, RateBounds::new(1.0, 10.0)));
        let pacer = Arc::new(Pacer::new());
        pacer.acquire(&state, &CallContext::new()).await.unwrap();

        let ctx = CallContext::new();
        let waiter = {
            let state = Arc::clone(&state);
            let pacer = Arc::clone(&pacer);
            let ctx = ctx.clone();
            tokio::spawn(async move { pacer.acquire(&state, &ctx).await })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        ctx.cancel();
        assert_eq!(waiter.await.unwrap(), Err(WriteError::Cancelled));

        // The abandoned wait claimed nothing: the next caller is due one interval
        // after the first issue, not two.
        let start = Instant::now();
        pacer.acquire(&state, &CallContext::new()).await.unwrap();
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(900));
        assert!(elapsed < Duration::from_millis(910));
    }

    #[tokio::test]
    async fn test_already_cancelled_context_fails_fast() {
        let state = RateState::new(1.0, RateBounds::new(1.0, 10.0));
        let ctx = CallContext::new();
        ctx.cancel();
        let result = Pacer::new().acquire(&state, &ctx).await;
        assert_eq!(result, Err(WriteError::Cancelled));
    }
}
