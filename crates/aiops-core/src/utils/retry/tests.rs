use super::*;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

fn fast(attempts: u32) -> RetryConfig {
    RetryConfig::new()
        .with_max_attempts(attempts)
        .with_initial_delay(Duration::from_millis(1))
        .with_jitter(false)
}

/// Operation that fails `failures` times with a transient error, then succeeds
fn flaky(
    counter: Arc<AtomicU32>,
    failures: u32,
) -> impl FnMut() -> std::pin::Pin<Box<dyn Future<Output = Result<i32, &'static str>> + Send>> {
    move || {
        let c = counter.clone();
        Box::pin(async move {
            if c.fetch_add(1, Ordering::SeqCst) < failures {
                Err("upstream unavailable")
            } else {
                Ok(42)
            }
        })
    }
}

#[test]
fn test_retry_config_defaults() {
    let config = RetryConfig::default();
    assert_eq!(config.max_attempts, 3);
    assert_eq!(config.initial_delay, Duration::from_millis(250));
    assert_eq!(config.max_delay, Duration::from_secs(4));
    assert!(config.jitter);
}

#[test]
fn test_max_attempts_never_zero() {
    assert_eq!(RetryConfig::new().with_max_attempts(0).max_attempts, 1);
}

#[test]
fn test_calculate_delay() {
    let config = RetryConfig::new()
        .with_initial_delay(Duration::from_millis(100))
        .with_backoff_multiplier(2.0)
        .with_jitter(false);

    assert_eq!(config.calculate_delay(1), Duration::from_millis(100));
    assert_eq!(config.calculate_delay(2), Duration::from_millis(200));
    assert_eq!(config.calculate_delay(3), Duration::from_millis(400));
}

#[test]
fn test_delay_respects_max() {
    let config = RetryConfig::new()
        .with_initial_delay(Duration::from_secs(1))
        .with_max_delay(Duration::from_secs(5))
        .with_backoff_multiplier(10.0)
        .with_jitter(false);

    assert_eq!(config.calculate_delay(3), Duration::from_secs(5));
}

#[test]
fn test_jitter_stays_within_quarter() {
    let config = RetryConfig::new()
        .with_initial_delay(Duration::from_millis(400))
        .with_jitter(true);
    let delay = config.calculate_delay(1);
    assert!(delay >= Duration::from_millis(400));
    assert!(delay < Duration::from_millis(500));
}

#[tokio::test]
async fn test_retry_success_after_failures() {
    let counter = Arc::new(AtomicU32::new(0));
    let result = retry_with_backoff(
        &fast(3),
        &CancellationToken::new(),
        flaky(counter.clone(), 2),
        |_| true,
    )
    .await;

    assert_eq!(result.unwrap(), 42);
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_retry_all_attempts_fail() {
    let counter = Arc::new(AtomicU32::new(0));
    let err = retry_with_backoff(
        &fast(3),
        &CancellationToken::new(),
        flaky(counter.clone(), u32::MAX),
        |_| true,
    )
    .await
    .unwrap_err();

    assert_eq!(err.attempts, 3);
    assert_eq!(err.last_error, "upstream unavailable");
    assert!(!err.cancelled);
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_retry_non_retryable_error() {
    let counter = Arc::new(AtomicU32::new(0));
    let err = retry_with_backoff(
        &fast(3),
        &CancellationToken::new(),
        flaky(counter.clone(), u32::MAX),
        |_| false,
    )
    .await
    .unwrap_err();

    assert_eq!(err.attempts, 1);
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cancel_interrupts_backoff() {
    let config = RetryConfig::new()
        .with_max_attempts(5)
        .with_initial_delay(Duration::from_secs(30))
        .with_jitter(false);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let counter = Arc::new(AtomicU32::new(0));
    let started = std::time::Instant::now();
    let err = retry_with_backoff(&config, &cancel, flaky(counter.clone(), u32::MAX), |_| true)
        .await
        .unwrap_err();

    assert!(err.cancelled);
    assert_eq!(err.attempts, 1);
    assert!(started.elapsed() < Duration::from_secs(5));
}
