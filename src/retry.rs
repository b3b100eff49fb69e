use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first one)
    pub max_attempts: u32,
    /// Initial delay before the first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (e.g., 2.0 doubles the delay each time)
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Preset: database connection at startup (5 attempts)
    /// Delays: 1s, 2s, 4s, 8s = 15s total wait, enough for a container
    /// database to finish booting
    pub fn database_connect() -> Self {
        Self::new(5, Duration::from_secs(1)).with_max_delay(Duration::from_secs(8))
    }

    /// Calculate the delay for a given attempt number (0-indexed)
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let delay_ms = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi((attempt - 1) as i32);

        Duration::from_millis(delay_ms as u64).min(self.max_delay)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::database_connect()
    }
}

/// Execute an async operation with retries while `should_retry` accepts the error.
///
/// Errors the predicate rejects (bad credentials, malformed URL) are returned
/// immediately. A `max_attempts` of 0 is treated as 1.
pub async fn with_retry_if<T, E, F, Fut, P>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
    should_retry: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        let delay = config.delay_for_attempt(attempt);
        if !delay.is_zero() {
            debug!(
                "{}: Retry attempt {}/{} after {:?}",
                operation_name,
                attempt + 1,
                max_attempts,
                delay
            );
            sleep(delay).await;
        }

        let error = match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!("{}: Succeeded on attempt {}/{}", operation_name, attempt + 1, max_attempts);
                }
                return Ok(result);
            }
            Err(e) => e,
        };

        if !should_retry(&error) {
            debug!("{}: Error is not retryable: {}", operation_name, error);
            return Err(error);
        }

        let remaining = max_attempts - attempt - 1;
        if remaining == 0 {
            warn!("{}: All {} attempts failed. Last error: {}", operation_name, max_attempts, error);
            return Err(error);
        }

        warn!(
            "{}: Attempt {}/{} failed ({}), {} retries remaining",
            operation_name,
            attempt + 1,
            max_attempts,
            error,
            remaining
        );
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_database_connect_preset() {
        let config = RetryConfig::database_connect();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(8));
    }

    #[test]
    fn test_delay_calculation() {
        let config = RetryConfig::new(4, Duration::from_secs(1)).with_backoff_multiplier(2.0);

        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(4));
    }

    #[test]
    fn test_delay_respects_max() {
        let config = RetryConfig::new(10, Duration::from_secs(1)).with_max_delay(Duration::from_secs(3));

        // Attempt 4 would be 8 seconds, but max is 3
        assert_eq!(config.delay_for_attempt(4), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_errors_until_success() {
        let config = RetryConfig::database_connect();
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result: Result<&str, String> = with_retry_if(
            &config,
            "connect",
            || {
                let c = counter_clone.clone();
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err("connection refused".to_string())
                    } else {
                        Ok("connected")
                    }
                }
            },
            |_| true,
        )
        .await;

        assert_eq!(result.unwrap(), "connected");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let config = RetryConfig::new(3, Duration::from_millis(10));
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result: Result<(), String> = with_retry_if(
            &config,
            "connect",
            || {
                let c = counter_clone.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err("down".to_string())
                }
            },
            |_| true,
        )
        .await;

        assert_eq!(result.unwrap_err(), "down");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_fails_immediately() {
        let config = RetryConfig::new(5, Duration::from_millis(10));
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result: Result<(), String> = with_retry_if(
            &config,
            "connect",
            || {
                let c = counter_clone.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err("password authentication failed".to_string())
                }
            },
            |e| !e.contains("authentication"),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let config = RetryConfig::new(0, Duration::from_millis(10));

        let result: Result<u32, String> =
            with_retry_if(&config, "op", || async { Ok(7) }, |_| true).await;

        assert_eq!(result.unwrap(), 7);
    }
}
