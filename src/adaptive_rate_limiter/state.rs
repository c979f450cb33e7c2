//! Shared rate state for one client-to-service binding.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Inclusive clamps for the target rate, in requests per second.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateBounds {
    pub lower: f64,
    pub upper: f64,
}

impl RateBounds {
    /// Callers are expected to have validated `0 < lower <= upper`
    /// (see `ThrottleConfig::validate`).
    pub fn new(lower: f64, upper: f64) -> Self {
        RateBounds { lower, upper }
    }

    /// Clamps `rate` into `[lower, upper]`. NaN maps to `lower`.
    pub fn clamp(&self, rate: f64) -> f64 {
        rate.max(self.lower).min(self.upper)
    }

    pub fn contains(&self, rate: f64) -> bool {
        rate >= self.lower && rate <= self.upper
    }
}

/// A rate update that was written to the state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateChange {
    pub previous: f64,
    pub current: f64,
}

impl RateChange {
    pub fn is_unchanged(&self) -> bool {
        self.previous == self.current
    }
}

#[derive(Debug)]
struct Inner {
    current_rate: f64,
    last_update: Instant,
}

/// Current target rate plus the time it was last changed.
///
/// Rate and timestamp live behind one mutex, so a reader never sees a rate from
/// one update paired with the timestamp of another. The lock is never held across
/// an `.await`.
#[derive(Debug)]
pub struct RateState {
    bounds: RateBounds,
    inner: Mutex<Inner>,
}

impl RateState {
    /// Creates the state with `initial_rate` clamped into `bounds`. The update
    /// timestamp starts at construction time, so the first update is accepted one
    /// debounce window after the binding is created.
    pub fn new(initial_rate: f64, bounds: RateBounds) -> Self {
        RateState {
            bounds,
            inner: Mutex::new(Inner {
                current_rate: bounds.clamp(initial_rate),
                last_update: Instant::now(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // The guarded data is two plain values; a panicking holder cannot leave it torn.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn bounds(&self) -> RateBounds {
        self.bounds
    }

    /// Snapshot of the current rate.
    pub fn read(&self) -> f64 {
        self.lock().current_rate
    }

    /// Stores `clamp(new_rate)` and stamps the update time. Returns the stored rate.
    pub fn apply(&self, new_rate: f64) -> f64 {
        let clamped = self.bounds.clamp(new_rate);
        let mut inner = self.lock();
        inner.current_rate = clamped;
        inner.last_update = Instant::now();
        clamped
    }

    pub fn time_since_last_update(&self) -> Duration {
        self.lock().last_update.elapsed()
    }

    /// Debounced read-modify-write.
    ///
    /// If at least `min_interval` has passed since the last accepted update, computes
    /// `next(current_rate)` and applies it, all under one lock. Returns `None` when the
    /// debounce window has not elapsed; the state is left untouched in that case.
    pub fn apply_if_elapsed<F>(&self, min_interval: Duration, next: F) -> Option<RateChange>
    where
        F: FnOnce(f64) -> f64,
    {
        let mut inner = self.lock();
        if inner.last_update.elapsed() < min_interval {
            return None;
        }
        let previous = inner.current_rate;
        let current = self.bounds.clamp(next(previous));
        inner.current_rate = current;
        inner.last_update = Instant::now();
        Some(RateChange { previous, current })
    }
}
