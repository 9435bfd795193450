//! Per-request context: correlation id and optional deadline.
//!
//! Every service operation and every dispatch run takes a [`RequestContext`].
//! Storage and broker calls go through [`RequestContext::run`], which bounds
//! them with `tokio::time::timeout_at`. Dropping the surrounding future cancels
//! the unit of work.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tradew_inventory_core::InventoryError;

/// The context's deadline passed before the wrapped call completed.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Deadline exceeded")]
pub struct DeadlineExceeded;

impl From<DeadlineExceeded> for InventoryError {
    fn from(_: DeadlineExceeded) -> Self {
        Self::DeadlineExceeded
    }
}

/// Correlation id and deadline of one unit of work.
#[derive(Clone, Debug)]
pub struct RequestContext {
    correlation_id: String,
    deadline: Option<Instant>,
}

impl RequestContext {
    /// New context with a random correlation id and no deadline.
    #[must_use]
    pub fn new() -> Self {
        Self::with_correlation_id(uuid::Uuid::new_v4().to_string())
    }

    /// New context carrying an upstream correlation id.
    #[must_use]
    pub fn with_correlation_id(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            deadline: None,
        }
    }

    /// Set an absolute deadline.
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set a deadline `timeout` from now.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Correlation id for logs and outbound events.
    #[must_use]
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Deadline, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether the deadline has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Fail fast if the deadline has passed.
    ///
    /// # Errors
    ///
    /// Returns [`DeadlineExceeded`] once the deadline is reached.
    pub fn ensure_live(&self) -> Result<(), DeadlineExceeded> {
        if self.is_expired() {
            return Err(DeadlineExceeded);
        }
        Ok(())
    }

    /// Drive `future` to completion, or give up at the deadline.
    ///
    /// # Errors
    ///
    /// Returns [`DeadlineExceeded`] if the deadline passes first; `future` is
    /// dropped (cancelled) in that case.
    pub async fn run<F: Future>(&self, future: F) -> Result<F::Output, DeadlineExceeded> {
        match self.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, future)
                .await
                .map_err(|_| DeadlineExceeded),
            None => Ok(future.await),
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn without_deadline_calls_complete() {
        let ctx = RequestContext::with_correlation_id("corr-1");
        assert_eq!(ctx.run(async { 7 }).await, Ok(7));
        assert!(!ctx.is_expired());
        assert_eq!(ctx.correlation_id(), "corr-1");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_calls_are_cut_at_the_deadline() {
        let ctx = RequestContext::new().with_timeout(Duration::from_millis(50));

        let result = ctx
            .run(tokio::time::sleep(Duration::from_secs(5)))
            .await;

        assert_eq!(result, Err(DeadlineExceeded));
        assert!(ctx.is_expired());
        assert_eq!(ctx.ensure_live(), Err(DeadlineExceeded));
    }

    #[test]
    fn contexts_get_distinct_correlation_ids() {
        assert_ne!(
            RequestContext::new().correlation_id(),
            RequestContext::new().correlation_id()
        );
    }
}
