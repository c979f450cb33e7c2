//! Logical batched writes: retry policy around paced attempts.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio_retry::RetryIf;
use tower::{Layer, Service, ServiceExt};

use super::layer::{RateLimiting, RateLimitingLayer};
use crate::adaptive_rate_limiter::CpuRateLimiter;
use crate::config::RetrySettings;
use crate::error_handling::{get_retry_strategy, ErrorClassifier, StatusClassifier, WriteError};
use crate::models::{
    BatchWriteRequest, BatchWriteResponse, CallContext, ResponseSignal, WriteCall,
};

/// Issues batched writes with retries, pacing and CPU feedback.
///
/// Each attempt runs through [`RateLimiting`], so every retry is paced and its
/// outcome observed. Only errors the classifier marks retryable are retried, and
/// only while the call has not been cancelled. The error surfaced after the last
/// attempt is the inner service's error, unchanged.
pub struct RetryingWriter<S, C = StatusClassifier> {
    service: RateLimiting<S, C>,
    retry: RetrySettings,
}

impl<S> RetryingWriter<S> {
    pub fn new(inner: S, limiter: Arc<CpuRateLimiter>, retry: RetrySettings) -> Self {
        Self::with_classifier(inner, limiter, StatusClassifier, retry)
    }
}

impl<S, C> RetryingWriter<S, C> {
    pub fn with_classifier(
        inner: S,
        limiter: Arc<CpuRateLimiter>,
        classifier: C,
        retry: RetrySettings,
    ) -> Self {
        RetryingWriter {
            service: RateLimitingLayer::with_classifier(limiter, classifier).layer(inner),
            retry,
        }
    }

    pub fn limiter(&self) -> &Arc<CpuRateLimiter> {
        self.service.limiter()
    }
}

impl<S: Clone, C> Clone for RetryingWriter<S, C> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            retry: self.retry,
        }
    }
}

impl<S, C> RetryingWriter<S, C>
where
    S: Service<WriteCall, Response = BatchWriteResponse, Error = WriteError>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
    C: ErrorClassifier,
{
    /// Runs one logical batched write.
    ///
    /// # Errors
    ///
    /// - `WriteError::Cancelled` if `context` is cancelled, including during a
    ///   pacing wait or a retry backoff
    /// - the last attempt's error once the retry budget is spent
    /// - a fatal error immediately, without further attempts
    pub async fn write(
        &self,
        request: BatchWriteRequest,
        context: CallContext,
    ) -> Result<BatchWriteResponse, WriteError> {
        let attempt_count = AtomicU32::new(0);
        let classifier = Arc::clone(self.service.classifier());

        let retry = RetryIf::spawn(
            get_retry_strategy(&self.retry),
            || {
                attempt_count.fetch_add(1, Ordering::SeqCst);
                let mut service = self.service.clone();
                let call = WriteCall::new(request.clone(), context.clone());
                async move {
                    match service.ready().await {
                        Ok(svc) => svc.call(call).await,
                        Err(e) => Err(e),
                    }
                }
            },
            |e: &WriteError| !context.is_cancelled() && classifier.classify(e).is_retryable(),
        );

        // Backoff sleeps happen inside `RetryIf`; racing it keeps them cancellable.
        // The attempt dropped here never reaches the layer's signal feed.
        let result = tokio::select! {
            biased;
            _ = context.cancelled() => {
                self.limiter().observe(&ResponseSignal::Cancelled);
                Err(WriteError::Cancelled)
            }
            result = retry => result,
        };

        let attempts = attempt_count.load(Ordering::SeqCst);
        match &result {
            Ok(_) if attempts > 1 => log::debug!(
                "Batched write to {} succeeded after {} attempts",
                request.table,
                attempts
            ),
            Ok(_) => {}
            Err(WriteError::Cancelled) => {
                log::debug!("Batched write to {} cancelled by caller", request.table)
            }
            Err(e) => log::warn!(
                "Batched write to {} failed after {} attempt{}: {}",
                request.table,
                attempts,
                if attempts == 1 { "" } else { "s" },
                e
            ),
        }

        result
    }
}
