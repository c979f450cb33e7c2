//! Resiliency Test Suite: Cancellation
//!
//! **Purpose:** Verify that cancelled calls leave the shared rate state exactly as
//! they found it.
//!
//! **What We're Testing:**
//! 1. A call cancelled while waiting for its pacing slot returns `Cancelled`
//! 2. The abandoned wait does not consume an issuance slot
//! 3. A cancelled call feeds no rate update and is counted once as cancelled
//! 4. Shutting down a pool of writers mid-flight completes promptly

use std::sync::Arc;
use std::time::Duration;

use cpu_throttle::{
    BatchWriteRequest, BatchWriteResponse, CallContext, CpuRateLimiter, Mutation,
    RetrySettings, RetryingWriter, SignalKind, StatusCode, ThrottleConfig, WriteCall, WriteError,
};
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tower::service_fn;

fn request() -> BatchWriteRequest {
    BatchWriteRequest::new("events").add("row#1", Mutation::set_cell("cf", "q", "v"))
}

fn slow_limiter(rate: f64) -> Arc<CpuRateLimiter> {
    Arc::new(
        CpuRateLimiter::new(&ThrottleConfig {
            initial_rate: rate,
            lower_bound: 0.1,
            ..Default::default()
        })
        .expect("valid throttle config"),
    )
}

#[tokio::test(start_paused = true)]
async fn cancelled_pacing_wait_claims_no_slot() {
    // One request per second
    let limiter = slow_limiter(1.0);
    let transport = service_fn(|_call: WriteCall| async {
        Ok::<_, WriteError>(BatchWriteResponse::with_cpu(5_600, 8_000))
    });
    let writer = RetryingWriter::new(transport, Arc::clone(&limiter), RetrySettings::default());

    writer.write(request(), CallContext::new()).await.unwrap();

    let context = CallContext::new();
    let waiting = {
        let writer = writer.clone();
        let context = context.clone();
        tokio::spawn(async move { writer.write(request(), context).await })
    };
    sleep(Duration::from_millis(200)).await;
    context.cancel();
    assert_eq!(waiting.await.unwrap(), Err(WriteError::Cancelled));
    assert_eq!(limiter.stats().signal_count(SignalKind::Cancelled), 1);

    // Next slot is still one interval after the first issue
    let start = Instant::now();
    writer.write(request(), CallContext::new()).await.unwrap();
    let waited = start.elapsed();
    assert!(waited >= Duration::from_millis(800), "waited {:?}", waited);
    assert!(waited < Duration::from_millis(810), "waited {:?}", waited);
}

#[tokio::test(start_paused = true)]
async fn cancelled_call_feeds_no_update() {
    let limiter = slow_limiter(1_000.0);
    tokio::time::advance(Duration::from_secs(2)).await;

    let transport = service_fn(|_call: WriteCall| async {
        sleep(Duration::from_secs(30)).await;
        Err::<BatchWriteResponse, _>(WriteError::status(StatusCode::DeadlineExceeded, "timeout"))
    });
    let writer = RetryingWriter::new(transport, Arc::clone(&limiter), RetrySettings::default());

    let context = CallContext::new();
    let canceller = {
        let context = context.clone();
        tokio::spawn(async move {
            sleep(Duration::from_secs(1)).await;
            context.cancel();
        })
    };

    let result = writer.write(request(), context).await;
    canceller.await.unwrap();

    assert_eq!(result, Err(WriteError::Cancelled));
    assert_eq!(limiter.current_rate(), 1_000.0);
    assert_eq!(limiter.stats().applied_updates(), 0);
    assert_eq!(limiter.stats().signal_count(SignalKind::RetryableFailure), 0);
    assert_eq!(limiter.stats().signal_count(SignalKind::Cancelled), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_all_writers() {
    let limiter = slow_limiter(50.0);
    let transport = service_fn(|_call: WriteCall| async {
        sleep(Duration::from_millis(5)).await;
        Ok::<_, WriteError>(BatchWriteResponse::with_cpu(5_600, 8_000))
    });
    let writer = RetryingWriter::new(transport, Arc::clone(&limiter), RetrySettings::default());
    let shutdown = CancellationToken::new();

    let workers: Vec<_> = (0..16)
        .map(|_| {
            let writer = writer.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                let mut outcomes = Vec::new();
                while !shutdown.is_cancelled() {
                    let context = CallContext::with_cancellation(shutdown.child_token());
                    outcomes.push(writer.write(request(), context).await);
                }
                outcomes
            })
        })
        .collect();

    sleep(Duration::from_secs(2)).await;
    shutdown.cancel();

    let mut succeeded = 0;
    for worker in workers {
        let outcomes = timeout(Duration::from_millis(100), worker)
            .await
            .expect("worker stops promptly after shutdown")
            .unwrap();
        for outcome in outcomes {
            match outcome {
                Ok(_) => succeeded += 1,
                Err(e) => assert_eq!(e, WriteError::Cancelled),
            }
        }
    }

    // 50 req/s for two seconds, give or take the in-flight calls
    assert!((95..=102).contains(&succeeded), "succeeded {}", succeeded);
}
