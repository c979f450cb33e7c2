//! Throttle configuration and constants.
//!
//! This module provides:
//! - Controller constants (target utilization, bounds, dead band, shrink floor)
//! - Retry strategy defaults
//! - Configuration types and validation

mod constants;
mod types;

// Re-export all constants
pub use constants::*;
pub use types::{LogFormat, LogLevel, RetrySettings, ThrottleConfig};
