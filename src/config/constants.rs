//! Configuration constants.
//!
//! This module defines the constants used by the CPU feedback controller and the
//! retry integration. Most of them are defaults that `ThrottleConfig` can override.

use std::time::Duration;

// Controller defaults
/// Desired steady-state CPU utilization of the storage service, in percent
pub const DEFAULT_TARGET_CPU_PERCENT: f64 = 70.0;
/// Lowest rate (requests per second) the controller will ever settle on
pub const DEFAULT_LOWER_RATE_BOUND: f64 = 1.0;
/// Highest rate (requests per second) the controller will ever settle on
pub const DEFAULT_UPPER_RATE_BOUND: f64 = 100_000.0;
/// Rate a freshly constructed binding starts from
pub const DEFAULT_INITIAL_RATE: f64 = 10_000.0;
/// Minimum time between two accepted rate updates (debounce window)
/// Bursts of retries inside this window are observed but never change the rate
pub const MIN_UPDATE_INTERVAL: Duration = Duration::from_secs(1);

// Controller shape
/// Smallest fraction of the current rate retained by a single decrease step
/// Also the growth fraction applied when the service is well under target
pub const PERCENT_CHANGE_LIMIT: f64 = 0.3;
/// Half-width of the band around the target in which the rate is left alone
pub const DEAD_BAND_PERCENT: f64 = 5.0;
/// Ceiling for the averaged CPU reading used in a decrease step
/// Keeps `1 - delta / (100 - target)` strictly positive
pub const MAX_EFFECTIVE_CPU_PERCENT: f64 = 99.9;
/// CPU sample substituted for a retryable overload failure (deadline exceeded, unavailable)
pub const OVERLOAD_CPU_SAMPLE: f64 = 100.0;

// Retry strategy
/// Initial delay in milliseconds before first retry
pub const RETRY_INITIAL_DELAY_MS: u64 = 10;
/// Factor by which retry delay is multiplied on each attempt
pub const RETRY_FACTOR: u64 = 2;
/// Maximum delay between retries in seconds
pub const RETRY_MAX_DELAY_SECS: u64 = 60;
/// Maximum number of attempts (including initial attempt)
pub const RETRY_MAX_ATTEMPTS: usize = 5;

// Simulation
/// Progress logging interval in seconds for the simulation binary
pub const LOGGING_INTERVAL: u64 = 2;
