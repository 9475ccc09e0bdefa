//! Bounded retry with per-failure-kind fallbacks.
//!
//! Failures propagate by default. A policy names the [`FailureKind`]s it is
//! allowed to recover from; for those it runs the caller's fallback (an
//! alternate UI path) and tries again, up to `max_attempts` in total.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use crate::result::{E2eError, E2eResult, FailureKind};

/// Retry policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    /// Pause before each retry
    pub delay: Duration,
    recover_from: HashSet<FailureKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2)
    }
}

impl RetryPolicy {
    /// A policy that recovers from nothing until told otherwise
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay: Duration::ZERO,
            recover_from: HashSet::new(),
        }
    }

    /// Pause before each retry
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Allow the fallback for this failure kind
    #[must_use]
    pub fn recover_from(mut self, kind: FailureKind) -> Self {
        self.recover_from.insert(kind);
        self
    }

    /// Whether this kind triggers the fallback
    #[must_use]
    pub fn recovers(&self, kind: FailureKind) -> bool {
        self.recover_from.contains(&kind)
    }

    /// Run `primary`; on a recoverable failure run `fallback` and retry
    pub async fn run<T, P, PF, B, BF>(
        &self,
        description: &str,
        mut primary: P,
        mut fallback: B,
    ) -> E2eResult<T>
    where
        P: FnMut() -> PF,
        PF: Future<Output = E2eResult<T>>,
        B: FnMut(FailureKind) -> BF,
        BF: Future<Output = E2eResult<()>>,
    {
        let mut attempt = 1;
        loop {
            let err = match primary().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            let kind = err.kind();
            if !self.recovers(kind) {
                return Err(err);
            }
            if attempt >= self.max_attempts {
                return Err(E2eError::RetryExhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }
            tracing::warn!(%description, attempt, ?kind, error = %err, "running fallback before retry");
            fallback(kind).await?;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            attempt += 1;
        }
    }
}
