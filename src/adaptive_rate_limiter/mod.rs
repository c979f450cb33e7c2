//! Adaptive rate limiting driven by server CPU feedback.
//!
//! This module implements the feedback loop that keeps a storage service near a
//! target CPU utilization:
//! - Extracts per-node CPU utilization from each response envelope
//! - Computes a new rate: proportional decrease above target (bounded at 30% of the
//!   current rate per step), 30% growth well under target, no change in a ±5 point
//!   dead band
//! - Treats deadline-exceeded and unavailable failures as saturated CPU
//! - Applies at most one update per debounce window
//! - Paces request issuance to `1 / rate` seconds apart
//!
//! All state for a binding lives in one `CpuRateLimiter`; there is no background task.

mod algorithm;
mod extract;
mod limiter;
mod pacing;
mod state;

pub use algorithm::calculate_rate;
pub use extract::{cpu_samples, cpu_utilization, response_cpu_samples};
pub use limiter::{CpuRateLimiter, RateSnapshot};
pub use pacing::{pacing_interval, Pacer};
pub use state::{RateBounds, RateChange, RateState};
