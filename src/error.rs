//! # Error types used by task groups and event streams.
//!
//! This module defines two main error enums:
//!
//! - [`TaskError`] is the outcome of a failed task group: the first task
//!   error, a captured panic, or a cancellation of the group's scope.
//! - [`StreamError`] covers the non-value outcomes of event stream iteration:
//!   end-of-stream, scope cancellation, or a consumer callback failure.
//!
//! [`TaskError`] is cheap to clone: the same value is shared between the
//! group's first-error slot, the scope's cancel cause, and the return of
//! `wait`. Both types provide `as_label` for logs/metrics.

use std::sync::Arc;

use thiserror::Error;

use crate::panic::PanicError;
use crate::scope::CancelScope;

/// Boxed error type returned by task bodies and consume callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// # Outcome of a failed task group.
///
/// The first of these recorded by any task wins, becomes the group scope's
/// cancel cause, and is returned by `wait`. Later errors are dropped.
#[non_exhaustive]
#[derive(Clone, Debug, Error)]
pub enum TaskError {
    /// A task returned an error.
    #[error(transparent)]
    Failed(Arc<dyn std::error::Error + Send + Sync + 'static>),

    /// A task panicked; the unwind was captured at the task boundary.
    #[error(transparent)]
    Panicked(Arc<PanicError>),

    /// The group's scope was canceled before a cause was recorded.
    ///
    /// This is **not an error** in the traditional sense, but signals
    /// intentional termination via the parent scope.
    #[error("scope canceled")]
    Canceled,
}

impl TaskError {
    /// Wraps an arbitrary task error in a shareable [`TaskError::Failed`].
    pub fn failed(err: impl Into<BoxError>) -> Self {
        TaskError::Failed(Arc::from(err.into()))
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Failed(_) => "task_failed",
            TaskError::Panicked(_) => "task_panicked",
            TaskError::Canceled => "scope_canceled",
        }
    }

    /// Returns the captured panic, if this error was produced by an unwind.
    pub fn as_panic(&self) -> Option<&PanicError> {
        match self {
            TaskError::Panicked(p) => Some(p),
            _ => None,
        }
    }

    /// Indicates whether this error is a bare cancellation.
    pub fn is_canceled(&self) -> bool {
        matches!(self, TaskError::Canceled)
    }
}

/// # Non-value outcomes of event stream iteration.
///
/// `Done` is a sentinel, not a failure: `consume` translates it into
/// ordinary success, and an exhausted iterator keeps returning it.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum StreamError {
    /// No more items: the stream was closed and fully drained.
    #[error("no more items in stream")]
    Done,

    /// The scope passed to the iterator was canceled; carries the cause.
    #[error(transparent)]
    Canceled(TaskError),

    /// A consume callback returned an error.
    #[error(transparent)]
    Other(BoxError),
}

impl StreamError {
    /// Wraps an arbitrary callback error in [`StreamError::Other`].
    pub fn other(err: impl Into<BoxError>) -> Self {
        StreamError::Other(err.into())
    }

    /// Builds the cancellation outcome for `scope`, preserving its cause.
    pub(crate) fn canceled_by(scope: &CancelScope) -> Self {
        StreamError::Canceled(scope.cause().unwrap_or(TaskError::Canceled))
    }

    /// Indicates whether this is the end-of-stream sentinel.
    pub fn is_done(&self) -> bool {
        matches!(self, StreamError::Done)
    }

    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            StreamError::Done => "stream_done",
            StreamError::Canceled(_) => "stream_canceled",
            StreamError::Other(_) => "stream_callback_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_error_labels() {
        assert_eq!(TaskError::failed("boom").as_label(), "task_failed");
        assert_eq!(TaskError::Canceled.as_label(), "scope_canceled");
    }

    #[test]
    fn failed_preserves_message() {
        let err = TaskError::failed("lost the plot");
        assert_eq!(err.to_string(), "lost the plot");
        assert!(!err.is_canceled());
        assert!(err.as_panic().is_none());
    }

    #[test]
    fn done_is_a_sentinel() {
        assert!(StreamError::Done.is_done());
        assert!(!StreamError::other("boom").is_done());
        assert_eq!(StreamError::other("boom").to_string(), "boom");
    }
}
