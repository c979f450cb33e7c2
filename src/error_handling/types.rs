//! Error type definitions.
//!
//! This module defines the status codes reported by the storage service and the
//! error types used throughout the crate.

use log::SetLoggerError;
use strum_macros::EnumIter as EnumIterMacro;
use thiserror::Error;

/// Error types for initialization failures.
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)] // All variants end with "Error" by convention
pub enum InitializationError {
    /// Error initializing the logger.
    #[error("Logger initialization error: {0}")]
    LoggerError(#[from] SetLoggerError),
}

/// Invalid throttle configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Target utilization must lie strictly between 0 and 100 percent.
    #[error("target CPU utilization must be in (0, 100), got {0}")]
    InvalidTarget(f64),

    /// Rate bounds must satisfy `0 < lower <= upper`.
    #[error("invalid rate bounds: lower={lower}, upper={upper}")]
    InvalidBounds {
        /// Configured lower bound
        lower: f64,
        /// Configured upper bound
        upper: f64,
    },

    /// Initial rate must be a positive finite number.
    #[error("initial rate must be positive and finite, got {0}")]
    InvalidInitialRate(f64),

    /// Retry settings are unusable.
    #[error("invalid retry settings: {0}")]
    InvalidRetry(String),
}

/// Status codes a batched write can fail with.
///
/// This is the closed set of codes the transport surfaces; classification into
/// retryable and fatal failures is an exhaustive match over it (see
/// `StatusClassifier`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIterMacro)]
pub enum StatusCode {
    DeadlineExceeded,
    Unavailable,
    ResourceExhausted,
    Aborted,
    Internal,
    Unknown,
    InvalidArgument,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    Unauthenticated,
    FailedPrecondition,
    OutOfRange,
    Unimplemented,
    DataLoss,
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl StatusCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCode::DeadlineExceeded => "DEADLINE_EXCEEDED",
            StatusCode::Unavailable => "UNAVAILABLE",
            StatusCode::ResourceExhausted => "RESOURCE_EXHAUSTED",
            StatusCode::Aborted => "ABORTED",
            StatusCode::Internal => "INTERNAL",
            StatusCode::Unknown => "UNKNOWN",
            StatusCode::InvalidArgument => "INVALID_ARGUMENT",
            StatusCode::NotFound => "NOT_FOUND",
            StatusCode::AlreadyExists => "ALREADY_EXISTS",
            StatusCode::PermissionDenied => "PERMISSION_DENIED",
            StatusCode::Unauthenticated => "UNAUTHENTICATED",
            StatusCode::FailedPrecondition => "FAILED_PRECONDITION",
            StatusCode::OutOfRange => "OUT_OF_RANGE",
            StatusCode::Unimplemented => "UNIMPLEMENTED",
            StatusCode::DataLoss => "DATA_LOSS",
        }
    }
}

/// Error returned by a batched write.
///
/// The rate limiting layers never rewrite this value; whatever the inner service
/// or the retry policy produced is what the caller sees.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WriteError {
    /// The service answered with a non-OK status.
    #[error("{code}: {message}")]
    Status {
        /// Status code reported by the service
        code: StatusCode,
        /// Human-readable detail
        message: String,
    },

    /// The caller cancelled the call.
    #[error("call cancelled by caller")]
    Cancelled,
}

impl WriteError {
    /// Shorthand for a status error.
    pub fn status(code: StatusCode, message: impl Into<String>) -> Self {
        WriteError::Status {
            code,
            message: message.into(),
        }
    }

    /// Status code of the error, if it came from the service.
    pub fn code(&self) -> Option<StatusCode> {
        match self {
            WriteError::Status { code, .. } => Some(*code),
            WriteError::Cancelled => None,
        }
    }
}
