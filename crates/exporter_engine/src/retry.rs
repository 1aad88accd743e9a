use std::future::Future;
use std::time::Duration;

use export_logging::export_warn;

use crate::types::FetchError;

/// Capped exponential backoff for transient request failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (0-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = self.multiplier.max(1).saturating_pow(retry);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    fn delay_for(&self, retry: u32, err: &FetchError) -> Duration {
        match err.retry_after {
            Some(requested) => requested.min(self.max_backoff),
            None => self.backoff(retry),
        }
    }
}

/// Runs `op` until it succeeds, fails permanently, or attempts run out.
pub(crate) async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut op: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < attempts => {
                let delay = policy.delay_for(attempt - 1, &err);
                export_warn!(
                    "{what} failed (attempt {attempt}/{attempts}): {err}; retrying in {delay:?}"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(mut err) => {
                if attempt > 1 {
                    err.message = format!("{} (after {attempt} attempts)", err.message);
                }
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::time::Duration;

    use super::{with_retry, RetryPolicy};
    use crate::types::{FailureKind, FetchError};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
            multiplier: 2,
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_millis(500));
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(3), Duration::from_secs(4));
        assert_eq!(policy.backoff(4), Duration::from_secs(8));
        assert_eq!(policy.backoff(30), Duration::from_secs(8));
    }

    #[test]
    fn retry_after_is_capped() {
        let policy = fast_policy(3);
        let err = FetchError::new(FailureKind::HttpStatus(429), "slow down")
            .with_retry_after(Some(Duration::from_secs(60)));
        assert_eq!(policy.delay_for(0, &err), Duration::from_millis(4));
    }

    #[tokio::test]
    async fn transient_errors_are_retried_until_success() {
        let calls = Cell::new(0);
        let result = with_retry(&fast_policy(4), "request", || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move {
                if n < 3 {
                    Err(FetchError::new(FailureKind::HttpStatus(503), "unavailable"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn attempts_are_bounded() {
        let calls = Cell::new(0);
        let err = with_retry(&fast_policy(3), "request", || {
            calls.set(calls.get() + 1);
            async { Err::<(), _>(FetchError::new(FailureKind::Timeout, "slow")) }
        })
        .await
        .unwrap_err();
        assert_eq!(calls.get(), 3);
        assert_eq!(err.kind, FailureKind::Timeout);
        assert!(err.message.ends_with("(after 3 attempts)"));
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = Cell::new(0);
        let err = with_retry(&fast_policy(5), "request", || {
            calls.set(calls.get() + 1);
            async { Err::<(), _>(FetchError::new(FailureKind::Authentication, "401")) }
        })
        .await
        .unwrap_err();
        assert_eq!(calls.get(), 1);
        assert!(err.is_authentication());
    }
}
