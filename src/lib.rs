//! cpu_throttle: client-side adaptive rate limiting driven by server CPU feedback
//!
//! Storage services report per-node CPU utilization in the envelope of every
//! batched-write response. This library reads those reports, compares them with a
//! target utilization and adjusts the rate at which a client issues requests:
//! multiplicative decrease when the service runs hot, 30% growth when it is well
//! under target, nothing in a narrow band around the target. Overload failures
//! (deadline exceeded, unavailable) count as a saturated CPU reading.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use cpu_throttle::{
//!     BatchWriteRequest, BatchWriteResponse, CallContext, CpuRateLimiter, Mutation,
//!     RetryingWriter, ThrottleConfig, WriteCall, WriteError,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ThrottleConfig::default();
//! let limiter = Arc::new(CpuRateLimiter::new(&config)?);
//!
//! // Any tower service performing the actual batched write
//! let transport = tower::service_fn(|_call: WriteCall| async {
//!     Ok::<_, WriteError>(BatchWriteResponse::with_cpu(5_600, 8_000))
//! });
//!
//! let writer = RetryingWriter::new(transport, Arc::clone(&limiter), config.retry);
//! let request = BatchWriteRequest::new("events").add("row#1", Mutation::set_cell("cf", "q", "v"));
//! writer.write(request, CallContext::new()).await?;
//!
//! println!("current rate: {:.1} req/s", limiter.current_rate());
//! # Ok(())
//! # }
//! ```
//!
//! # Requirements
//!
//! Pacing and retries use Tokio timers, so calls must run inside a Tokio runtime.

pub mod adaptive_rate_limiter;
pub mod config;
pub mod error_handling;
pub mod initialization;
pub mod models;
pub mod simulation;
pub mod throttle;

// Re-export public API
pub use adaptive_rate_limiter::{CpuRateLimiter, RateBounds, RateChange, RateSnapshot};
pub use config::{RetrySettings, ThrottleConfig};
pub use error_handling::{
    Classification, ConfigError, ErrorClassifier, StatusClassifier, StatusCode, WriteError,
};
pub use models::{
    BatchWriteRequest, BatchWriteResponse, CallContext, CpuStats, Mutation, ResponseSignal,
    ServerStats, SignalKind, WriteCall,
};
pub use throttle::{RateLimiting, RateLimitingLayer, RetryingWriter};
