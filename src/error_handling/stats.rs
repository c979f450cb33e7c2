//! Throttle statistics tracking.
//!
//! This module provides thread-safe counters for the signals the throttle observes
//! and for the rate updates it applies or suppresses.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use strum::IntoEnumIterator;

use crate::models::SignalKind;

/// Thread-safe throttle statistics tracker.
///
/// Counts observed signals per `SignalKind` plus the outcome of every update
/// attempt: applied, or suppressed by the debounce window. All counters start at
/// zero and can be shared across tasks through the owning `CpuRateLimiter`.
pub struct ThrottleStats {
    signals: HashMap<SignalKind, AtomicUsize>,
    applied_updates: AtomicUsize,
    debounced_updates: AtomicUsize,
}

impl ThrottleStats {
    pub fn new() -> Self {
        let mut signals = HashMap::new();
        for kind in SignalKind::iter() {
            signals.insert(kind, AtomicUsize::new(0));
        }

        ThrottleStats {
            signals,
            applied_updates: AtomicUsize::new(0),
            debounced_updates: AtomicUsize::new(0),
        }
    }

    /// Increment the counter for an observed signal.
    pub fn record_signal(&self, kind: SignalKind) {
        if let Some(counter) = self.signals.get(&kind) {
            counter.fetch_add(1, Ordering::Relaxed);
        } else {
            log::error!(
                "Attempted to increment signal counter for {:?} which is not in the map. \
                 This indicates a bug in ThrottleStats initialization.",
                kind
            );
        }
    }

    pub fn record_applied(&self) {
        self.applied_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_debounced(&self) {
        self.debounced_updates.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the count for a signal kind.
    pub fn signal_count(&self, kind: SignalKind) -> usize {
        self.signals
            .get(&kind)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Total signals observed across all kinds.
    pub fn total_signals(&self) -> usize {
        SignalKind::iter().map(|k| self.signal_count(k)).sum()
    }

    /// Rate updates that were written to the rate state.
    pub fn applied_updates(&self) -> usize {
        self.applied_updates.load(Ordering::SeqCst)
    }

    /// Rate-bearing signals dropped because the debounce window had not elapsed.
    pub fn debounced_updates(&self) -> usize {
        self.debounced_updates.load(Ordering::SeqCst)
    }
}

impl Default for ThrottleStats {
    fn default() -> Self {
        Self::new()
    }
}
