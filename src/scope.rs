//! # Hierarchical cancellation scopes that carry a cause.
//!
//! [`CancelScope`] wraps a [`CancellationToken`] and adds a once-set cause
//! slot, so whoever observes the cancellation can also learn *why*. Causes
//! propagate downward: a child canceled by its parent reports the parent's
//! cause.
//!
//! The cause is written before the token is canceled, so any observer woken
//! by [`CancelScope::cancelled`] sees a consistent cause.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::TaskError;

/// Cancellation scope with an optional cause, shareable across tasks.
///
/// Cloning is cheap and refers to the same scope. Derive children with
/// [`CancelScope::child`]; canceling a parent cancels all descendants.
#[derive(Clone)]
pub struct CancelScope {
    inner: Arc<Inner>,
}

struct Inner {
    token: CancellationToken,
    /// `Some(cause)` or `None` for a cause-less cancel; set at most once.
    cause: OnceLock<Option<TaskError>>,
    parent: Option<Arc<Inner>>,
}

impl CancelScope {
    /// Creates a new root scope.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                token: CancellationToken::new(),
                cause: OnceLock::new(),
                parent: None,
            }),
        }
    }

    /// Derives a child scope; canceling `self` cancels the child.
    pub fn child(&self) -> Self {
        Self {
            inner: Arc::new(Inner {
                token: self.inner.token.child_token(),
                cause: OnceLock::new(),
                parent: Some(self.inner.clone()),
            }),
        }
    }

    /// Cancels this scope and its descendants without a cause.
    ///
    /// The empty cause is latched, so an ancestor canceled later with a
    /// cause does not retroactively become this scope's cause.
    pub fn cancel(&self) {
        let _ = self.inner.cause.set(None);
        self.inner.token.cancel();
    }

    /// Cancels this scope and its descendants, recording `cause`.
    ///
    /// The first cause wins; the slot is written before the token fires.
    pub fn cancel_with(&self, cause: TaskError) {
        let _ = self.inner.cause.set(Some(cause));
        self.inner.token.cancel();
    }

    /// Cancels this scope after `timeout`, unless it is canceled first.
    pub fn cancel_after(&self, timeout: Duration) {
        let scope = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(timeout) => scope.cancel(),
                _ = scope.cancelled() => {}
            }
        });
    }

    /// Returns whether this scope has been canceled.
    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Completes when this scope is canceled.
    pub async fn cancelled(&self) {
        self.inner.token.cancelled().await;
    }

    /// Returns the cancel cause, or `None` while the scope is live.
    ///
    /// After cancellation this is the scope's own cause if one was
    /// recorded, otherwise the nearest ancestor's; a cause-less cancel
    /// yields `None`.
    pub fn cause(&self) -> Option<TaskError> {
        if !self.is_cancelled() {
            return None;
        }
        let mut next = Some(&self.inner);
        while let Some(inner) = next {
            if let Some(slot) = inner.cause.get() {
                return slot.clone();
            }
            next = inner.parent.as_ref();
        }
        None
    }
}

impl Default for CancelScope {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn child_sees_parent_cancel() {
        let parent = CancelScope::new();
        let child = parent.child();
        assert!(!child.is_cancelled());

        parent.cancel_with(TaskError::failed("parent stopped"));
        assert!(child.is_cancelled());
        assert_eq!(child.cause().unwrap().to_string(), "parent stopped");
        child.cancelled().await;
    }

    #[tokio::test]
    async fn own_cause_wins_over_parent() {
        let parent = CancelScope::new();
        let child = parent.child();

        child.cancel_with(TaskError::failed("child first"));
        parent.cancel_with(TaskError::failed("parent later"));
        assert_eq!(child.cause().unwrap().to_string(), "child first");
    }

    #[tokio::test]
    async fn causeless_cancel_is_latched() {
        let parent = CancelScope::new();
        let child = parent.child();

        child.cancel();
        parent.cancel_with(TaskError::failed("parent later"));
        assert!(child.cause().is_none());
    }

    #[tokio::test]
    async fn live_scope_has_no_cause() {
        let scope = CancelScope::new();
        assert!(scope.cause().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_after_fires_once_deadline_passes() {
        let scope = CancelScope::new();
        scope.cancel_after(Duration::from_secs(1));
        scope.cancelled().await;
        assert!(scope.cause().is_none());
    }
}
