//! Tower middleware adding CPU-feedback pacing to a batched-write service.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tower::{Layer, Service, ServiceExt};

use crate::adaptive_rate_limiter::{response_cpu_samples, CpuRateLimiter};
use crate::error_handling::{Classification, ErrorClassifier, StatusClassifier, WriteError};
use crate::models::{BatchWriteResponse, ResponseSignal, WriteCall};

/// Wraps a write service in [`RateLimiting`].
///
/// ```no_run
/// use std::sync::Arc;
/// use cpu_throttle::{CpuRateLimiter, RateLimitingLayer, ThrottleConfig};
///
/// let limiter = Arc::new(CpuRateLimiter::new(&ThrottleConfig::default()).unwrap());
/// let layer = RateLimitingLayer::new(limiter);
/// // tower::ServiceBuilder::new().layer(layer).service(transport)
/// ```
pub struct RateLimitingLayer<C = StatusClassifier> {
    limiter: Arc<CpuRateLimiter>,
    classifier: Arc<C>,
}

impl RateLimitingLayer {
    pub fn new(limiter: Arc<CpuRateLimiter>) -> Self {
        Self::with_classifier(limiter, StatusClassifier)
    }
}

impl<C> RateLimitingLayer<C> {
    pub fn with_classifier(limiter: Arc<CpuRateLimiter>, classifier: C) -> Self {
        Self {
            limiter,
            classifier: Arc::new(classifier),
        }
    }
}

impl<C> Clone for RateLimitingLayer<C> {
    fn clone(&self) -> Self {
        Self {
            limiter: Arc::clone(&self.limiter),
            classifier: Arc::clone(&self.classifier),
        }
    }
}

impl<S, C> Layer<S> for RateLimitingLayer<C> {
    type Service = RateLimiting<S, C>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimiting {
            inner,
            limiter: Arc::clone(&self.limiter),
            classifier: Arc::clone(&self.classifier),
        }
    }
}

/// One paced, observed attempt of a batched write.
///
/// Same request and response types as the wrapped service. Per call:
/// 1. waits for the binding's pacing slot (abandoned on cancellation)
/// 2. issues the write, racing it against the call's cancellation
/// 3. turns the outcome into a `ResponseSignal` and feeds it to the limiter
/// 4. returns the inner result unchanged
pub struct RateLimiting<S, C = StatusClassifier> {
    inner: S,
    limiter: Arc<CpuRateLimiter>,
    classifier: Arc<C>,
}

impl<S> RateLimiting<S> {
    pub fn new(inner: S, limiter: Arc<CpuRateLimiter>) -> Self {
        RateLimitingLayer::new(limiter).layer(inner)
    }
}

impl<S, C> RateLimiting<S, C> {
    pub fn limiter(&self) -> &Arc<CpuRateLimiter> {
        &self.limiter
    }

    pub fn classifier(&self) -> &Arc<C> {
        &self.classifier
    }
}

impl<S: Clone, C> Clone for RateLimiting<S, C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            limiter: Arc::clone(&self.limiter),
            classifier: Arc::clone(&self.classifier),
        }
    }
}

impl<S, C> Service<WriteCall> for RateLimiting<S, C>
where
    S: Service<WriteCall, Response = BatchWriteResponse, Error = WriteError>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
    C: ErrorClassifier,
{
    type Response = BatchWriteResponse;
    type Error = WriteError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // Readiness of the inner service is awaited after pacing, inside the call
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, call: WriteCall) -> Self::Future {
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);
        let limiter = Arc::clone(&self.limiter);
        let classifier = Arc::clone(&self.classifier);
        Box::pin(paced_attempt(inner, limiter, classifier, call))
    }
}

async fn paced_attempt<S, C>(
    mut inner: S,
    limiter: Arc<CpuRateLimiter>,
    classifier: Arc<C>,
    call: WriteCall,
) -> Result<BatchWriteResponse, WriteError>
where
    S: Service<WriteCall, Response = BatchWriteResponse, Error = WriteError>,
    C: ErrorClassifier,
{
    let ctx = call.context.clone();

    if let Err(e) = limiter.pace(&ctx).await {
        limiter.observe(&ResponseSignal::Cancelled);
        return Err(e);
    }

    let result = tokio::select! {
        biased;
        _ = ctx.cancelled() => Err(WriteError::Cancelled),
        result = async {
            match inner.ready().await {
                Ok(svc) => svc.call(call).await,
                Err(e) => Err(e),
            }
        } => result,
    };

    let signal = match &result {
        Ok(response) => ResponseSignal::Success(response_cpu_samples(response)),
        Err(e) => match classifier.classify(e) {
            Classification::Retryable(code) => ResponseSignal::RetryableFailure(code),
            Classification::Fatal(code) => ResponseSignal::FatalFailure(code),
            Classification::Cancelled => ResponseSignal::Cancelled,
        },
    };
    limiter.observe(&signal);

    result
}
