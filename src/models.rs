//! Request, response and signal types for batched writes.
//!
//! The storage service's wire encoding is not owned by this crate; these are the
//! decoded shapes the throttle consumes. Only `ServerStats` carries information
//! the controller reads.

use tokio_util::sync::CancellationToken;

use crate::error_handling::StatusCode;

/// CPU usage reported by one serving node for the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuStats {
    /// Recent compute usage in GCU milliseconds per second
    pub recent_gcu_milliseconds_per_second: i64,
    /// Compute capacity of the node in milli-GCU
    pub milligcu_limit: i64,
}

impl CpuStats {
    pub fn new(recent_gcu_milliseconds_per_second: i64, milligcu_limit: i64) -> Self {
        Self {
            recent_gcu_milliseconds_per_second,
            milligcu_limit,
        }
    }
}

/// Server-side statistics attached to a response envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerStats {
    /// One entry per node that served part of the call
    pub cpu_stats: Vec<CpuStats>,
}

/// A single mutation applied to a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    SetCell {
        family: String,
        qualifier: String,
        value: Vec<u8>,
    },
    DeleteCells {
        family: String,
        qualifier: String,
    },
    DeleteRow,
}

impl Mutation {
    pub fn set_cell(family: &str, qualifier: &str, value: impl Into<Vec<u8>>) -> Self {
        Mutation::SetCell {
            family: family.to_string(),
            qualifier: qualifier.to_string(),
            value: value.into(),
        }
    }
}

/// All mutations for one row key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowEntry {
    pub row_key: String,
    pub mutations: Vec<Mutation>,
}

/// A batched write against one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchWriteRequest {
    pub table: String,
    pub entries: Vec<RowEntry>,
}

impl BatchWriteRequest {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            entries: Vec::new(),
        }
    }

    /// Appends a mutation for `row_key`, grouping it with earlier mutations for the
    /// same row.
    pub fn add(mut self, row_key: impl Into<String>, mutation: Mutation) -> Self {
        let row_key = row_key.into();
        match self.entries.iter_mut().find(|e| e.row_key == row_key) {
            Some(entry) => entry.mutations.push(mutation),
            None => self.entries.push(RowEntry {
                row_key,
                mutations: vec![mutation],
            }),
        }
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Per-entry outcome inside a successful batch response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryStatus {
    /// Index of the entry in the request
    pub index: usize,
    /// `None` when the entry was applied
    pub error: Option<StatusCode>,
}

/// Response to a batched write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchWriteResponse {
    pub entries: Vec<EntryStatus>,
    /// Present only when the service reports load for the call
    pub server_stats: Option<ServerStats>,
}

impl BatchWriteResponse {
    /// Builds a response reporting one node's CPU usage against its limit.
    pub fn with_cpu(recent_gcu_milliseconds_per_second: i64, milligcu_limit: i64) -> Self {
        Self {
            entries: Vec::new(),
            server_stats: Some(ServerStats {
                cpu_stats: vec![CpuStats::new(
                    recent_gcu_milliseconds_per_second,
                    milligcu_limit,
                )],
            }),
        }
    }
}

/// Per-call context passed alongside the request.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    cancel: CancellationToken,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context whose call is abandoned when `token` is cancelled.
    pub fn with_cancellation(token: CancellationToken) -> Self {
        Self { cancel: token }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the caller cancels the call.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Cancels the call.
    pub fn cancel(&self) {
        self.cancel.cancel()
    }
}

/// Request type of the write services: the batch plus its call context.
#[derive(Debug, Clone)]
pub struct WriteCall {
    pub request: BatchWriteRequest,
    pub context: CallContext,
}

impl WriteCall {
    pub fn new(request: BatchWriteRequest, context: CallContext) -> Self {
        Self { request, context }
    }
}

/// What a completed attempt tells the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseSignal {
    /// The write succeeded; carries the per-node CPU utilization percentages.
    Success(Vec<f64>),
    /// Overload failure (deadline exceeded, unavailable).
    RetryableFailure(StatusCode),
    /// Non-retryable failure; carries no rate information.
    FatalFailure(StatusCode),
    /// Caller-initiated abort; carries no rate information.
    Cancelled,
}

impl ResponseSignal {
    pub fn kind(&self) -> SignalKind {
        match self {
            ResponseSignal::Success(_) => SignalKind::Success,
            ResponseSignal::RetryableFailure(_) => SignalKind::RetryableFailure,
            ResponseSignal::FatalFailure(_) => SignalKind::FatalFailure,
            ResponseSignal::Cancelled => SignalKind::Cancelled,
        }
    }

    /// Whether the signal may change the rate at all.
    pub fn carries_rate_information(&self) -> bool {
        matches!(
            self,
            ResponseSignal::Success(_) | ResponseSignal::RetryableFailure(_)
        )
    }
}

/// Discriminant of `ResponseSignal`, used as a statistics key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::EnumIter)]
pub enum SignalKind {
    Success,
    RetryableFailure,
    FatalFailure,
    Cancelled,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Success => "success",
            SignalKind::RetryableFailure => "retryable failure",
            SignalKind::FatalFailure => "fatal failure",
            SignalKind::Cancelled => "cancelled",
        }
    }
}
