//! Deadline and cancellation propagation for one logical call.
//!
//! Rust has no idiomatic equivalent of Go's `context.Context`; this is a
//! deliberately small stand-in covering exactly what the Executor and
//! Gate need: an optional deadline, and a cooperative cancellation
//! signal a caller can trip from another task.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::Error;

/// Shared handle for one in-flight call. Cheap to clone; all clones
/// observe the same deadline and cancellation state.
#[derive(Clone)]
pub struct CallContext {
    deadline: Option<Instant>,
    cancel_rx: watch::Receiver<bool>,
}

/// The caller-held half: trips cancellation for every [`CallContext`]
/// clone derived from it.
pub struct CancelHandle {
    cancel_tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }
}

impl CallContext {
    /// No deadline, cancellable only via the returned [`CancelHandle`].
    pub fn new() -> (Self, CancelHandle) {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        (
            Self {
                deadline: None,
                cancel_rx,
            },
            CancelHandle { cancel_tx },
        )
    }

    /// A context with a deadline `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> (Self, CancelHandle) {
        let (ctx, handle) = Self::new();
        (
            Self {
                deadline: Some(Instant::now() + timeout),
                ..ctx
            },
            handle,
        )
    }

    /// A context with neither a deadline nor a way to cancel it. Useful
    /// for tests and for call sites that manage their own timeout
    /// externally.
    pub fn unbounded() -> Self {
        let (ctx, handle) = Self::new();
        std::mem::forget(handle);
        ctx
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    /// Resolves once cancellation is signalled. Never resolves on an
    /// uncancellable context (no handle was ever dropped/tripped), so
    /// callers must race it against other futures rather than await it
    /// alone.
    pub async fn cancelled(&self) {
        let mut rx = self.cancel_rx.clone();
        if *rx.borrow() {
            return;
        }
        while rx.changed().await.is_ok() {
            if *rx.borrow() {
                return;
            }
        }
        std::future::pending::<()>().await;
    }

    /// Time remaining until this context's deadline, or `None` if
    /// unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Races `fut` against this context's deadline (if any) and an
    /// additional `internal_timeout` local to the caller — whichever
    /// fires first wins. Returns `Error::DeadlineExceeded` if either
    /// timer elapses first.
    pub async fn race_with_deadline<F, T>(&self, fut: F, internal_timeout: Duration) -> Result<T, Error>
    where
        F: Future<Output = T>,
    {
        let local_deadline = Instant::now() + internal_timeout;
        let effective_deadline = match self.deadline {
            Some(d) => d.min(local_deadline),
            None => local_deadline,
        };

        tokio::select! {
            biased;
            _ = self.cancelled() => Err(Error::Cancelled),
            res = tokio::time::timeout_at(effective_deadline, fut) => {
                res.map_err(|_| Error::DeadlineExceeded(internal_timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unbounded_context_has_no_deadline() {
        let ctx = CallContext::unbounded();
        assert!(ctx.deadline().is_none());
        assert!(ctx.remaining().is_none());
    }

    #[tokio::test]
    async fn with_timeout_sets_a_deadline() {
        let (ctx, _handle) = CallContext::with_timeout(Duration::from_secs(5));
        assert!(ctx.remaining().unwrap() <= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn cancel_handle_trips_is_cancelled() {
        let (ctx, handle) = CallContext::new();
        assert!(!ctx.is_cancelled());
        handle.cancel();
        // Allow the watch channel to propagate.
        tokio::task::yield_now().await;
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn race_with_deadline_returns_deadline_exceeded_on_internal_timeout() {
        let ctx = CallContext::unbounded();
        let result = ctx
            .race_with_deadline(std::future::pending::<()>(), Duration::from_millis(10))
            .await;
        assert!(matches!(result, Err(Error::DeadlineExceeded(_))));
    }

    #[tokio::test]
    async fn race_with_deadline_returns_cancelled_when_tripped_mid_flight() {
        let (ctx, handle) = CallContext::new();
        let ctx2 = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            handle.cancel();
        });
        let result = ctx2
            .race_with_deadline(std::future::pending::<()>(), Duration::from_secs(5))
            .await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn race_with_deadline_completes_when_future_resolves_first() {
        let ctx = CallContext::unbounded();
        let result = ctx
            .race_with_deadline(async { 42 }, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(result, 42);
    }
}
