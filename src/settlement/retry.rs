use crate::{
    constants::{
        DEFAULT_ANCHOR_EXPIRED_BACKOFF, DEFAULT_MAX_ATTEMPTS, DEFAULT_RATE_LIMIT_BACKOFF,
        DEFAULT_TRANSIENT_BACKOFF,
    },
    error::{TransportError, TransportErrorKind},
};
use serde::{Deserialize, Serialize};
use std::{future::Future, time::Duration};
use tracing::warn;

/// How often and how long to back off before attempting a failed operation again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay after the anchor of a transaction expired.
    #[serde(with = "crate::serde::duration")]
    pub anchor_expired_backoff: Duration,
    /// Base of the exponential delay after being rate limited.
    #[serde(with = "crate::serde::duration")]
    pub rate_limit_backoff: Duration,
    /// Delay after timeouts and other transient failures.
    #[serde(with = "crate::serde::duration")]
    pub transient_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            anchor_expired_backoff: DEFAULT_ANCHOR_EXPIRED_BACKOFF,
            rate_limit_backoff: DEFAULT_RATE_LIMIT_BACKOFF,
            transient_backoff: DEFAULT_TRANSIENT_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// Sets the maximum number of attempts.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets all backoff delays at once.
    pub fn with_backoffs(
        mut self,
        anchor_expired: Duration,
        rate_limit: Duration,
        transient: Duration,
    ) -> Self {
        self.anchor_expired_backoff = anchor_expired;
        self.rate_limit_backoff = rate_limit;
        self.transient_backoff = transient;
        self
    }

    /// Delay before the next attempt after attempt number `attempt` (zero based) failed with
    /// `kind`.
    ///
    /// Returns `None` if the failure is not retryable or no attempts are left.
    pub fn delay_for(&self, kind: TransportErrorKind, attempt: u32) -> Option<Duration> {
        if !kind.is_retryable() || attempt + 1 >= self.max_attempts {
            return None;
        }

        Some(match kind {
            TransportErrorKind::AnchorExpired => self.anchor_expired_backoff,
            TransportErrorKind::RateLimited => {
                let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
                self.rate_limit_backoff.saturating_mul(factor)
            }
            _ => self.transient_backoff,
        })
    }

    /// Runs `op` until it succeeds, fails with a non retryable error, or runs out of attempts.
    pub async fn retry<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, TransportError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let Some(delay) = self.delay_for(err.kind, attempt) else {
                        return Err(err);
                    };
                    warn!(%err, attempt, ?delay, "{what} failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
