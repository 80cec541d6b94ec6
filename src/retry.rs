//! # Retry With Backoff
//!
//! Exponential backoff with jitter, kept from the teacher's retry module and
//! narrowed in scope: this crate only wraps the HTTP submit/resubmit call to
//! the runtime endpoint with it (§B of the ambient stack). Tool handler
//! invocations and MCP requests are never retried here — a handler that
//! mutates state (a file write, an API call with side effects) retried
//! blindly could double-apply it, and MCP already has its own
//! request/response correlation with timeouts.

use std::time::Duration;

use rand::Rng;

use crate::error::{Error, Result};

/// Retry policy: how many attempts, how long to wait between them, and which
/// errors are worth retrying at all.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
        }
    }
}

/// Whether retrying could plausibly help: transport-level and HTTP failures
/// might succeed on a fresh connection; a malformed-config or protocol error
/// never will.
pub fn is_retryable(err: &Error) -> bool {
    matches!(err, Error::Http(_) | Error::Transport(_) | Error::Timeout)
}

fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let exponential = policy.base_delay.as_millis() as u64 * 2u64.saturating_pow(attempt);
    let capped = exponential.min(policy.max_delay.as_millis() as u64);
    let jitter_fraction = rand::thread_rng().gen_range(0.5..1.0);
    Duration::from_millis((capped as f64 * jitter_fraction) as u64)
}

/// Run `operation` up to `policy.max_retries + 1` times, backing off between
/// attempts. Stops early on the first non-retryable error.
pub async fn retry_with_backoff<F, Fut, T>(policy: &RetryPolicy, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.max_retries && is_retryable(&err) => {
                let delay = backoff_delay(policy, attempt);
                log::warn!(
                    "retrying after error (attempt {}/{}, waiting {:?}): {}",
                    attempt + 1,
                    policy.max_retries,
                    delay,
                    err
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
