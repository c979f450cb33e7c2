//! Client-side write path: pacing, CPU feedback and retries.
//!
//! [`RateLimitingLayer`] plugs the adaptive limiter into any tower service that
//! performs batched writes. [`RetryingWriter`] adds the retry policy on top, so that
//! every retry attempt is paced and observed like a first attempt.

mod layer;
mod retrying;

pub use layer::{RateLimiting, RateLimitingLayer};
pub use retrying::RetryingWriter;
