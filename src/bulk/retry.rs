//! Retry combinator for per-file scan attempts.

use std::future::Future;
use std::time::Duration;

use crate::error::ScanError;

/// How many times to attempt a file and how long to wait between attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Policy for bulk runs: two extra attempts with a one second backoff
    /// when auto retry is on, otherwise a single attempt.
    pub fn from_auto_retry(auto_retry: bool) -> Self {
        if auto_retry {
            Self {
                max_attempts: 3,
                backoff: Duration::from_secs(1),
            }
        } else {
            Self {
                max_attempts: 1,
                backoff: Duration::ZERO,
            }
        }
    }

    /// Number of retries after the first attempt.
    pub fn max_retries(&self) -> u32 {
        self.max_attempts.saturating_sub(1)
    }
}

/// Run `op` until it succeeds or the policy is exhausted. `notify` fires
/// before each retry with the retry number and the retry budget.
pub async fn retry_with_policy<T, F, Fut, N>(
    policy: &RetryPolicy,
    mut notify: N,
    mut op: F,
) -> Result<T, ScanError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ScanError>>,
    N: FnMut(u32, u32),
{
    let attempts = policy.max_attempts.max(1);
    let mut last_err = None;
    for attempt in 1..=attempts {
        if attempt > 1 {
            notify(attempt - 1, policy.max_retries());
            tokio::time::sleep(policy.backoff).await;
        }
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.unwrap_or_else(|| ScanError::Ocr("retry with zero attempts".into())))
}
