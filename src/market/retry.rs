//! Bounded retries for read-only provider calls

use backoff::{future::retry, ExponentialBackoff, ExponentialBackoffBuilder};
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub attempts: u32,
    pub initial_ms: u64,
    pub max_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_ms: 1000,
            max_ms: 10000,
        }
    }
}

impl RetryPolicy {
    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(self.initial_ms))
            .with_multiplier(2.0)
            .with_randomization_factor(0.0)
            .with_max_interval(Duration::from_millis(self.max_ms))
            .with_max_elapsed_time(None)
            .build()
    }
}

/// Run `op` until it succeeds, fails permanently, or runs out of attempts
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 0u32;

    retry(policy.backoff(), || {
        attempt += 1;
        let n = attempt;
        let call = op();
        async move {
            match call.await {
                Ok(value) => Ok(value),
                Err(e) if e.is_retryable() && n < attempts => {
                    warn!("{} failed (attempt {}/{}): {}", what, n, attempts, e);
                    Err(backoff::Error::transient(e))
                }
                Err(e) => Err(backoff::Error::permanent(e)),
            }
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            initial_ms: 1,
            max_ms: 4,
        }
    }

    #[tokio::test]
    async fn test_transient_failure_retried() {
        let calls = AtomicU32::new(0);
        let result = with_retry(fast(), "series", || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(Error::provider("coingecko", "429 Too Many Requests"))
            } else {
                Ok(vec![1.0, 2.0])
            }
        })
        .await;

        assert_eq!(result.unwrap(), vec![1.0, 2.0]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(fast(), "series", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::provider("geckoterminal", "timeout"))
        })
        .await;

        assert!(matches!(result, Err(Error::Provider { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(fast(), "series", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Deserialization("bad body".into()))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
