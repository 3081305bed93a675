use std::future::Future;
use std::time::Duration;

use crate::config::ApiConfig;
use crate::error::{AppError, AppResult};

/// Timeout and retry rules applied around every remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for RequestPolicy {
    fn default() -> Self {
        Self::from_config(&ApiConfig::default())
    }
}

impl RequestPolicy {
    pub fn from_config(api: &ApiConfig) -> Self {
        Self {
            timeout: api.timeout(),
            max_retries: api.max_retries,
            retry_backoff: api.retry_backoff(),
        }
    }

    /// Runs `attempt` until it succeeds, fails with a non-retryable error, or
    /// the retry budget is spent. Backoff grows linearly with the attempt
    /// number.
    pub async fn run<T, F, Fut>(&self, label: &str, mut attempt: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let mut retries = 0_u32;
        loop {
            let result = match tokio::time::timeout(self.timeout, attempt()).await {
                Ok(result) => result,
                Err(_) => Err(AppError::network(format!(
                    "{label} timed out after {}ms",
                    self.timeout.as_millis()
                ))),
            };

            match result {
                Err(err) if err.is_retryable() && retries < self.max_retries => {
                    retries += 1;
                    tracing::warn!(
                        label,
                        attempt = retries,
                        max_retries = self.max_retries,
                        error = %err,
                        "retrying request"
                    );
                    if !self.retry_backoff.is_zero() {
                        tokio::time::sleep(self.retry_backoff.saturating_mul(retries)).await;
                    }
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::RequestPolicy;
    use crate::error::AppError;

    fn policy(max_retries: u32) -> RequestPolicy {
        RequestPolicy {
            timeout: Duration::from_millis(50),
            max_retries,
            retry_backoff: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn network_errors_are_retried_until_success() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);
        let result = policy(3)
            .run("search", || {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(AppError::network("connection reset"))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;

        assert_eq!(result.expect("third attempt should succeed"), 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn server_errors_are_not_retried() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);
        let result: Result<(), _> = policy(3)
            .run("search", || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(AppError::server(500, "boom"))
                }
            })
            .await;

        assert!(matches!(result, Err(AppError::Server { status: 500, .. })));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retry_budget_is_bounded() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);
        let result: Result<(), _> = policy(2)
            .run("search", || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(AppError::network("unreachable"))
                }
            })
            .await;

        assert!(matches!(result, Err(AppError::Network(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn slow_attempts_time_out_as_network_errors() {
        let result: Result<(), _> = policy(0)
            .run("search", || async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok(())
            })
            .await;

        let err = result.expect_err("attempt should time out");
        assert!(matches!(err, AppError::Network(_)));
        assert!(err.to_string().contains("timed out"));
    }
}
