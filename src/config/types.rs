//! Configuration types.
//!
//! This module defines the throttle configuration consumed by the library and the
//! logging enums shared with the command-line binary.

use std::time::Duration;

use clap::ValueEnum;

use crate::config::constants::{
    DEFAULT_INITIAL_RATE, DEFAULT_LOWER_RATE_BOUND, DEFAULT_TARGET_CPU_PERCENT,
    DEFAULT_UPPER_RATE_BOUND, MIN_UPDATE_INTERVAL, RETRY_FACTOR, RETRY_INITIAL_DELAY_MS,
    RETRY_MAX_ATTEMPTS, RETRY_MAX_DELAY_SECS,
};
use crate::error_handling::ConfigError;

/// Logging level for the application.
///
/// Controls the verbosity of log output, from most restrictive (Error) to most
/// verbose (Trace).
#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    /// Only error messages
    Error,
    /// Error and warning messages
    Warn,
    /// Error, warning, and informational messages
    Info,
    /// All messages except trace
    Debug,
    /// All messages including trace
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(l: LogLevel) -> Self {
        match l {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Log output format.
///
/// - `Plain`: Human-readable format with colors (default)
/// - `Json`: Structured JSON format for machine parsing
#[derive(Clone, Debug, ValueEnum)]
pub enum LogFormat {
    /// Human-readable format with colors (default)
    Plain,
    /// Structured JSON format for machine parsing
    Json,
}

/// Retry policy applied around each logical batched write.
///
/// Delays grow exponentially from `initial_delay` by `factor` and are capped at
/// `max_delay`. `max_attempts` counts the initial attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrySettings {
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Multiplier applied to the delay after each retry
    pub factor: u64,
    /// Upper bound for a single delay
    pub max_delay: Duration,
    /// Total attempts, including the first one
    pub max_attempts: usize,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(RETRY_INITIAL_DELAY_MS),
            factor: RETRY_FACTOR,
            max_delay: Duration::from_secs(RETRY_MAX_DELAY_SECS),
            max_attempts: RETRY_MAX_ATTEMPTS,
        }
    }
}

/// Library configuration for one client-to-service binding.
///
/// # Examples
///
/// ```no_run
/// use cpu_throttle::ThrottleConfig;
///
/// let config = ThrottleConfig {
///     target_cpu_percent: 60.0,
///     upper_bound: 5_000.0,
///     ..Default::default()
/// };
/// config.validate().expect("valid config");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ThrottleConfig {
    /// Desired CPU utilization of the service, in percent (exclusive range 0..100)
    pub target_cpu_percent: f64,

    /// Lowest permitted rate in requests per second
    pub lower_bound: f64,

    /// Highest permitted rate in requests per second
    pub upper_bound: f64,

    /// Rate the binding starts with (clamped into the bounds)
    pub initial_rate: f64,

    /// Debounce window between two accepted rate updates
    pub min_update_interval: Duration,

    /// Retry policy for `RetryingWriter`
    pub retry: RetrySettings,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            target_cpu_percent: DEFAULT_TARGET_CPU_PERCENT,
            lower_bound: DEFAULT_LOWER_RATE_BOUND,
            upper_bound: DEFAULT_UPPER_RATE_BOUND,
            initial_rate: DEFAULT_INITIAL_RATE,
            min_update_interval: MIN_UPDATE_INTERVAL,
            retry: RetrySettings::default(),
        }
    }
}

impl ThrottleConfig {
    /// Checks the invariants the controller relies on.
    ///
    /// # Errors
    ///
    /// - `ConfigError::InvalidTarget` unless `0 < target < 100`
    /// - `ConfigError::InvalidBounds` unless `0 < lower <= upper` and both are finite
    /// - `ConfigError::InvalidInitialRate` if the initial rate is not a positive finite number
    /// - `ConfigError::InvalidRetry` if `max_attempts` is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        let target = self.target_cpu_percent;
        if !target.is_finite() || target <= 0.0 || target >= 100.0 {
            return Err(ConfigError::InvalidTarget(target));
        }
        let (lower, upper) = (self.lower_bound, self.upper_bound);
        if !lower.is_finite() || !upper.is_finite() || lower <= 0.0 || lower > upper {
            return Err(ConfigError::InvalidBounds { lower, upper });
        }
        if !self.initial_rate.is_finite() || self.initial_rate <= 0.0 {
            return Err(ConfigError::InvalidInitialRate(self.initial_rate));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidRetry(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
