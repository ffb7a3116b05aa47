use harvest_core::{CoreError, RedditApiError, RetryConfig};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Retry strategy based on error type
#[derive(Debug, Clone, PartialEq)]
pub enum RetryStrategy {
    /// Retry with exponential backoff
    Retry,
    /// Retry after the delay the server asked for
    RetryWithDelay(Duration),
    /// Don't retry, the error propagates as is
    NoRetry,
}

/// Determine retry strategy based on error type. Rate limiting is the only
/// transient failure; everything else ends the run.
pub fn get_retry_strategy(error: &CoreError) -> RetryStrategy {
    match error {
        CoreError::RedditApi(RedditApiError::RateLimitExceeded {
            retry_after: Some(seconds),
        }) => RetryStrategy::RetryWithDelay(Duration::from_secs(*seconds)),
        CoreError::RedditApi(RedditApiError::RateLimitExceeded { retry_after: None }) => {
            RetryStrategy::Retry
        }
        _ => RetryStrategy::NoRetry,
    }
}

/// Calculate delay with exponential backoff and jitter
pub fn calculate_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let base_delay = Duration::from_millis(config.base_delay_ms);
    let max_delay = Duration::from_millis(config.max_delay_ms);

    // Calculate exponential backoff
    let exponential_delay = if attempt == 0 {
        base_delay
    } else {
        let multiplier = config.backoff_multiplier.powi(attempt as i32);
        let delay_ms = (config.base_delay_ms as f64 * multiplier) as u64;
        Duration::from_millis(delay_ms.min(config.max_delay_ms))
    };

    // Add jitter to prevent thundering herd
    let jitter_range = (exponential_delay.as_millis() as f64 * config.jitter_factor) as u64;
    let jitter = fastrand::u64(0..=jitter_range);
    let final_delay = exponential_delay + Duration::from_millis(jitter);

    // Ensure we don't exceed max delay
    final_delay.min(max_delay)
}

/// Retry metrics for the end-of-run summary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryMetrics {
    pub total_retries: u64,
    pub successful_retries: u64,
    pub exhausted_operations: u64,
}

/// Wraps source calls with bounded retry-on-rate-limit.
#[derive(Debug)]
pub struct RetryExecutor {
    config: RetryConfig,
    total_retries: AtomicU64,
    successful_retries: AtomicU64,
    exhausted_operations: AtomicU64,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            total_retries: AtomicU64::new(0),
            successful_retries: AtomicU64::new(0),
            exhausted_operations: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable error
    /// (returned unchanged), or `max_attempts` is used up
    /// (`CoreError::RetriesExhausted`).
    pub async fn execute<F, Fut, T>(
        &self,
        operation_name: &str,
        mut operation: F,
    ) -> Result<T, CoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let max_delay = Duration::from_millis(self.config.max_delay_ms);
        let mut total_delay_ms = 0u64;
        let mut last_error = String::new();

        for attempt in 0..max_attempts {
            if attempt > 0 {
                debug!("Retry attempt {} for {}", attempt, operation_name);
            }

            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        self.total_retries
                            .fetch_add(attempt as u64, Ordering::Relaxed);
                        self.successful_retries.fetch_add(1, Ordering::Relaxed);
                        info!(
                            "Operation {} succeeded after {} retries (total delay: {}ms)",
                            operation_name, attempt, total_delay_ms
                        );
                    }
                    return Ok(result);
                }
                Err(error) => {
                    let delay = match get_retry_strategy(&error) {
                        RetryStrategy::NoRetry => {
                            debug!(
                                "Not retrying {} due to error type: {}",
                                operation_name, error
                            );
                            return Err(error);
                        }
                        RetryStrategy::Retry => calculate_delay(attempt, &self.config),
                        RetryStrategy::RetryWithDelay(delay) => delay.min(max_delay),
                    };

                    last_error = error.to_string();
                    if attempt + 1 >= max_attempts {
                        break;
                    }

                    warn!(
                        "Retrying {} in {:?} (attempt {}/{}) due to: {}",
                        operation_name,
                        delay,
                        attempt + 1,
                        max_attempts,
                        error
                    );
                    total_delay_ms += delay.as_millis() as u64;
                    sleep(delay).await;
                }
            }
        }

        self.total_retries
            .fetch_add((max_attempts - 1) as u64, Ordering::Relaxed);
        self.exhausted_operations.fetch_add(1, Ordering::Relaxed);
        error!(
            "Operation {} failed after {} attempts with total delay of {}ms",
            operation_name, max_attempts, total_delay_ms
        );

        Err(CoreError::RetriesExhausted {
            operation: operation_name.to_string(),
            attempts: max_attempts,
            last_error,
        })
    }

    /// Get current retry metrics
    pub fn get_metrics(&self) -> RetryMetrics {
        RetryMetrics {
            total_retries: self.total_retries.load(Ordering::Relaxed),
            successful_retries: self.successful_retries.load(Ordering::Relaxed),
            exhausted_operations: self.exhausted_operations.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay_ms: 1, // Very short delay for test
            max_delay_ms: 5,
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        }
    }

    fn rate_limited() -> CoreError {
        CoreError::RedditApi(RedditApiError::RateLimitExceeded { retry_after: None })
    }

    #[test]
    fn test_retry_config_reddit() {
        let config = RetryConfig::reddit();
        assert_eq!(config.max_attempts, 10);
        assert_eq!(config.base_delay_ms, 2000);
        assert_eq!(config.jitter_factor, 0.2);
    }

    #[test]
    fn test_retry_strategy_for_errors() {
        let with_header =
            CoreError::RedditApi(RedditApiError::RateLimitExceeded { retry_after: Some(60) });
        assert_eq!(
            get_retry_strategy(&with_header),
            RetryStrategy::RetryWithDelay(Duration::from_secs(60))
        );

        assert_eq!(get_retry_strategy(&rate_limited()), RetryStrategy::Retry);

        let server_error = CoreError::RedditApi(RedditApiError::ServerError { status_code: 500 });
        assert_eq!(get_retry_strategy(&server_error), RetryStrategy::NoRetry);

        let storage_error = CoreError::Database(harvest_core::DatabaseError::ConnectionFailed {
            reason: "locked".to_string(),
        });
        assert_eq!(get_retry_strategy(&storage_error), RetryStrategy::NoRetry);
    }

    #[test]
    fn test_exponential_backoff_calculation() {
        let config = RetryConfig {
            base_delay_ms: 1000,
            max_delay_ms: 10000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.0, // No jitter for predictable test
            ..Default::default()
        };

        assert_eq!(calculate_delay(0, &config), Duration::from_millis(1000));
        assert_eq!(calculate_delay(1, &config), Duration::from_millis(2000));
        assert_eq!(calculate_delay(2, &config), Duration::from_millis(4000));
        assert_eq!(calculate_delay(3, &config), Duration::from_millis(8000));

        // Should cap at max_delay_ms
        assert_eq!(calculate_delay(10, &config), Duration::from_millis(10000));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let config = RetryConfig {
            base_delay_ms: 1000,
            max_delay_ms: 10000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.5, // 50% jitter
            ..Default::default()
        };

        for _ in 0..20 {
            let delay = calculate_delay(1, &config);
            assert!(delay >= Duration::from_millis(2000));
            assert!(delay <= Duration::from_millis(3000)); // base 2000 + 50% jitter
        }
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let executor = RetryExecutor::new(fast_config(3));

        let result = executor
            .execute("test_operation", || async { Ok::<i32, CoreError>(42) })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(executor.get_metrics(), RetryMetrics::default());
    }

    #[tokio::test]
    async fn test_success_after_rate_limits() {
        let executor = RetryExecutor::new(fast_config(5));
        let attempt_count = Arc::new(Mutex::new(0));
        let counter = attempt_count.clone();

        let result = executor
            .execute("test_operation", move || {
                let counter = counter.clone();
                async move {
                    let mut count = counter.lock().unwrap();
                    *count += 1;
                    if *count < 3 {
                        Err(rate_limited())
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(*attempt_count.lock().unwrap(), 3);

        let metrics = executor.get_metrics();
        assert_eq!(metrics.total_retries, 2);
        assert_eq!(metrics.successful_retries, 1);
        assert_eq!(metrics.exhausted_operations, 0);
    }

    #[tokio::test]
    async fn test_non_retryable_error_propagates_unchanged() {
        let executor = RetryExecutor::new(fast_config(5));
        let attempt_count = Arc::new(Mutex::new(0));
        let counter = attempt_count.clone();

        let result = executor
            .execute("test_operation", move || {
                let counter = counter.clone();
                async move {
                    *counter.lock().unwrap() += 1;
                    Err::<i32, CoreError>(CoreError::RedditApi(RedditApiError::Forbidden {
                        resource: "/r/private".to_string(),
                    }))
                }
            })
            .await;

        assert!(matches!(
            result,
            Err(CoreError::RedditApi(RedditApiError::Forbidden { .. }))
        ));
        assert_eq!(*attempt_count.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_attempt_cap_yields_final_failure() {
        let executor = RetryExecutor::new(fast_config(4));
        let attempt_count = Arc::new(Mutex::new(0));
        let counter = attempt_count.clone();

        let result = executor
            .execute("search r/funny", move || {
                let counter = counter.clone();
                async move {
                    *counter.lock().unwrap() += 1;
                    Err::<i32, CoreError>(CoreError::RedditApi(
                        RedditApiError::RateLimitExceeded {
                            retry_after: Some(0),
                        },
                    ))
                }
            })
            .await;

        match result {
            Err(CoreError::RetriesExhausted {
                operation,
                attempts,
                last_error,
            }) => {
                assert_eq!(operation, "search r/funny");
                assert_eq!(attempts, 4);
                assert!(last_error.contains("Rate limit"));
            }
            other => panic!("Expected RetriesExhausted, got {:?}", other),
        }
        assert_eq!(*attempt_count.lock().unwrap(), 4);
        assert_eq!(executor.get_metrics().exhausted_operations, 1);
    }
}
