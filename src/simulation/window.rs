//! Sliding window over request arrivals at the simulated service.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Thread-safe sliding window of recent arrival times.
///
/// Holds at most `capacity` arrivals; older ones fall out either by age or when the
/// window is full.
pub(crate) struct ArrivalWindow {
    arrivals: Mutex<VecDeque<Instant>>,
    capacity: usize,
    window_duration: Duration,
}

impl ArrivalWindow {
    pub(crate) fn new(capacity: usize, window_duration: Duration) -> Self {
        ArrivalWindow {
            arrivals: Mutex::new(VecDeque::with_capacity(capacity.min(4_096))),
            capacity,
            window_duration,
        }
    }

    /// Records an arrival now and returns the arrival rate including it.
    pub(crate) fn record(&self) -> f64 {
        let mut arrivals = self.arrivals.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        self.expire(&mut arrivals, now);

        arrivals.push_back(now);
        while arrivals.len() > self.capacity {
            arrivals.pop_front();
        }

        self.rate_of(&arrivals, now)
    }

    /// Arrivals per second over the window.
    pub(crate) fn rate(&self) -> f64 {
        let mut arrivals = self.arrivals.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        self.expire(&mut arrivals, now);
        self.rate_of(&arrivals, now)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        let mut arrivals = self.arrivals.lock().unwrap_or_else(PoisonError::into_inner);
        self.expire(&mut arrivals, Instant::now());
        arrivals.len()
    }

    fn expire(&self, arrivals: &mut VecDeque<Instant>, now: Instant) {
        while let Some(front) = arrivals.front() {
            if now.duration_since(*front) > self.window_duration {
                arrivals.pop_front();
            } else {
                break;
            }
        }
    }

    fn rate_of(&self, arrivals: &VecDeque<Instant>, now: Instant) -> f64 {
        let Some(oldest) = arrivals.front() else {
            return 0.0;
        };
        // A full window may cover less than `window_duration`; measure what it holds
        let span = if arrivals.len() >= self.capacity {
            now.duration_since(*oldest).max(Duration::from_millis(1))
        } else {
            self.window_duration
        };
        // Safe cast: bounded by `capacity`
        #[allow(clippy::cast_precision_loss)]
        let count = arrivals.len() as f64;
        count / span.as_secs_f64()
    }
}
