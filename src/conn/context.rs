//! Deadlines and cancellation for blocking calls.
//!
//! Every call that may wait on the peer (`ask`, `connect`, `wait_connect`)
//! takes a [`CallContext`]. A context ends either when its deadline passes
//! or when its cancellation token fires, whichever comes first.
//!
//! # Example
//!
//! ```ignore
//! let ctx = CallContext::with_timeout(Duration::from_secs(5));
//! let reply = conn.ask(&ctx, msg).await?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

// ============================================================================
// CallContext
// ============================================================================

/// Deadline plus cancellation signal for one blocking call.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl CallContext {
    /// Creates a context with no deadline. It ends only when cancelled.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context ending `timeout` from now.
    ///
    /// A timeout too large to represent as an instant means no deadline.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => Self::with_deadline(deadline),
            None => Self::new(),
        }
    }

    /// Creates a context ending at `deadline`.
    #[inline]
    #[must_use]
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            cancel: CancellationToken::new(),
        }
    }

    /// Ties this context to an existing cancellation token.
    #[inline]
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Returns the deadline, if any.
    #[inline]
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancels the context.
    #[inline]
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns `true` once cancelled or past the deadline.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.cancel.is_cancelled() || self.deadline.is_some_and(|d| d <= Instant::now())
    }

    /// Fails when the deadline is further in the past than `grace`.
    pub(crate) fn check_expired(&self, grace: Duration) -> Result<()> {
        match self.deadline {
            Some(deadline) if Instant::now().saturating_duration_since(deadline) > grace => {
                Err(Error::DeadlineExceeded)
            }
            _ => Ok(()),
        }
    }

    /// Resolves when the context ends, yielding the reason.
    pub async fn done(&self) -> Error {
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.cancel.cancelled() => Error::Cancelled,
                _ = sleep_until(deadline) => Error::DeadlineExceeded,
            },
            None => {
                self.cancel.cancelled().await;
                Error::Cancelled
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio_test::{assert_pending, assert_ready, task};

    #[tokio::test(start_paused = true)]
    async fn test_deadline_fires() {
        let ctx = CallContext::with_timeout(Duration::from_millis(100));
        assert!(!ctx.is_done());
        assert!(matches!(ctx.done().await, Error::DeadlineExceeded));
        assert!(ctx.is_done());
    }

    #[test]
    fn test_huge_timeout_means_no_deadline() {
        let ctx = CallContext::with_timeout(Duration::MAX);
        assert!(ctx.deadline().is_none());
        assert!(!ctx.is_done());
        assert!(ctx.check_expired(Duration::from_secs(1)).is_ok());
    }

    #[tokio::test]
    async fn test_cancel_fires() {
        let ctx = CallContext::new();
        let clone = ctx.clone();
        tokio::spawn(async move { clone.cancel() });
        assert!(matches!(ctx.done().await, Error::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_expired_grace() {
        let now = Instant::now();
        tokio::time::advance(Duration::from_secs(10)).await;

        let recent = CallContext::with_deadline(now + Duration::from_millis(9_500));
        assert!(recent.check_expired(Duration::from_secs(1)).is_ok());

        let stale = CallContext::with_deadline(now + Duration::from_secs(8));
        assert!(matches!(
            stale.check_expired(Duration::from_secs(1)),
            Err(Error::DeadlineExceeded)
        ));

        assert!(CallContext::new().check_expired(Duration::ZERO).is_ok());
    }

    #[test]
    fn test_done_pending_until_cancelled() {
        let ctx = CallContext::new();
        let mut done = task::spawn(ctx.done());

        assert_pending!(done.poll());
        ctx.cancel();
        assert!(done.is_woken());
        assert!(matches!(assert_ready!(done.poll()), Error::Cancelled));
    }
}
