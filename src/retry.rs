//! Exponential backoff for idempotent calls.
//!
//! Only store queries go through here. Writes are never retried at this level.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total calls, the first one included
    pub attempts: u32,
    /// Wait before the first retry; doubled for every retry after that
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempts,
            base_delay,
            max_delay: Duration::from_secs(30),
        }
    }

    pub fn capped_at(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Store queries: 3 calls, waiting 500ms then 1s
    pub fn store_read() -> Self {
        Self::new(3, Duration::from_millis(500)).capped_at(Duration::from_secs(4))
    }

    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Waits between consecutive calls, `attempts - 1` of them
    pub fn backoff(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.attempts.saturating_sub(1)).map(move |retry| {
            self.base_delay
                .checked_mul(1u32 << retry.min(16))
                .unwrap_or(self.max_delay)
                .min(self.max_delay)
        })
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::store_read()
    }
}

/// Call `operation` until it succeeds, fails with an error `is_retryable`
/// rejects, or the policy runs out of attempts. The last error is returned.
///
/// # Panics
/// Panics if `policy.attempts` is 0
pub async fn retry_when<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
    is_retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    assert!(policy.attempts > 0, "RetryPolicy needs at least one attempt");

    let mut waits = policy.backoff();
    let mut call = 1;
    loop {
        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !is_retryable(&error) {
            debug!("{} failed permanently: {}", label, error);
            return Err(error);
        }
        let Some(wait) = waits.next() else {
            warn!("{} failed {} times, giving up: {}", label, call, error);
            return Err(error);
        };

        warn!("{} failed ({}/{}), retrying in {:?}: {}", label, call, policy.attempts, wait, error);
        sleep(wait).await;
        call += 1;
    }
}
