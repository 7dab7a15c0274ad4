//! # Error-aware fan-out/fan-in task supervision.
//!
//! A [`TaskGroup`] supervises a dynamic set of cooperative tasks spawned
//! onto the tokio runtime. The first task to fail, by returning an error
//! or by panicking, cancels the group's scope for every sibling, and
//! becomes the result of [`TaskGroup::wait`].
//!
//! # High-level architecture:
//!
//! ```text
//!   spawn(f) ──► permit pool? ──► tracked task ──► f(scope)
//!                    │                                │ Err / panic
//!              scope cancelled                        ▼
//!                    └──────────► record-first-error (once)
//!                                         │
//!                                 cancel_with(cause)
//!                                         ▼
//!   wait() ◄── pending count reaches zero; returns the recorded error
//! ```
//!
//! - Tasks receive the group's [`CancelScope`] and must honour it to be
//!   cancellable; the group never forcibly terminates a task.
//! - With a concurrency limit, a permit is acquired before the task is
//!   started and released when it exits.
//! - A group is single-use: after `wait` returns, further spawns observe
//!   the canceled scope and run nothing.

use std::future::Future;
use std::sync::{Arc, OnceLock};

use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio_util::task::TaskTracker;

use crate::error::{BoxError, TaskError};
use crate::panic::{self, CatchPanic};
use crate::scope::CancelScope;

/// Supervises a set of tasks; see the [module docs](self).
pub struct TaskGroup {
    shared: Arc<Shared>,
    tracker: TaskTracker,
    permits: Option<Arc<Semaphore>>,
}

struct Shared {
    scope: CancelScope,
    /// First error recorded by any task; written at most once.
    first: OnceLock<TaskError>,
}

impl Shared {
    /// Records `err` if the slot is still empty and cancels the scope with
    /// it as cause. Exactly one error wins; later calls are dropped.
    ///
    /// The slot is written before the cancel, so a waiter woken by the
    /// cancellation observes a consistent cause.
    fn record(&self, err: TaskError) {
        if self.first.set(err.clone()).is_ok() {
            tracing::debug!(error = %err, label = err.as_label(), "task group failed, canceling siblings");
            self.scope.cancel_with(err);
        }
    }

    /// Records the scope's own cancellation as the group outcome.
    fn record_canceled(&self) {
        self.record(self.scope.cause().unwrap_or(TaskError::Canceled));
    }
}

impl TaskGroup {
    /// Creates a group whose tasks share a child scope of `parent`.
    pub fn new(parent: &CancelScope) -> Self {
        Self::build(parent, None)
    }

    /// Creates a group that runs at most `limit` tasks concurrently.
    ///
    /// `limit == 0` is legal and means no task will ever run: every spawn
    /// blocks on a permit that never arrives, until the scope is canceled.
    pub fn with_limit(parent: &CancelScope, limit: usize) -> Self {
        Self::build(parent, Some(Arc::new(Semaphore::new(limit))))
    }

    fn build(parent: &CancelScope, permits: Option<Arc<Semaphore>>) -> Self {
        panic::install_hook();
        Self {
            shared: Arc::new(Shared {
                scope: parent.child(),
                first: OnceLock::new(),
            }),
            tracker: TaskTracker::new(),
            permits,
        }
    }

    /// Returns the group's scope, the one passed to every task.
    pub fn scope(&self) -> &CancelScope {
        &self.shared.scope
    }

    /// Spawns a task onto the runtime, passing the group scope.
    ///
    /// With a permit pool configured, waits for a free permit first; if
    /// the scope is canceled while waiting (or was already), the
    /// cancellation cause is recorded as the group's error and `f` is
    /// never called.
    ///
    /// The first task to return an error (or to panic, which is captured
    /// as [`TaskError::Panicked`]) cancels the group scope; the error is
    /// returned by [`TaskGroup::wait`].
    pub async fn spawn<F, Fut>(&self, f: F)
    where
        F: FnOnce(CancelScope) -> Fut,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let permit = if let Some(permits) = &self.permits {
            tokio::select! {
                _ = self.shared.scope.cancelled() => {
                    self.shared.record_canceled();
                    return;
                }
                permit = permits.clone().acquire_owned() => {
                    Some(permit.expect("permit pool closed"))
                }
            }
        } else {
            None
        };
        if self.shared.scope.is_cancelled() {
            self.shared.record_canceled();
            return;
        }
        self.start(f(self.shared.scope.clone()), permit);
    }

    /// Spawns a task only if it can start without waiting for a permit.
    ///
    /// Returns whether the call was accepted:
    /// - a permit is free (or no limit is configured): the task starts,
    ///   `true`;
    /// - no permit is free and the scope is live: `false`, no side
    ///   effects;
    /// - the scope is already canceled: the cause is recorded as the
    ///   group's error and the call is accepted (`true`) without running
    ///   anything, exactly as [`TaskGroup::spawn`] would.
    pub fn try_spawn<F, Fut>(&self, f: F) -> bool
    where
        F: FnOnce(CancelScope) -> Fut,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let permit = if let Some(permits) = &self.permits {
            match permits.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(TryAcquireError::NoPermits) => {
                    if self.shared.scope.is_cancelled() {
                        self.shared.record_canceled();
                        return true;
                    }
                    return false;
                }
                Err(TryAcquireError::Closed) => unreachable!("permit pool closed"),
            }
        } else {
            None
        };
        if self.shared.scope.is_cancelled() {
            self.shared.record_canceled();
            return true;
        }
        self.start(f(self.shared.scope.clone()), permit);
        true
    }

    /// Waits for every spawned task to finish, then cancels the group
    /// scope with the recorded error (if any) as cause and returns it.
    ///
    /// The group is terminal afterwards: subsequent spawns observe the
    /// canceled scope and run nothing.
    pub async fn wait(&self) -> Result<(), TaskError> {
        self.tracker.close();
        self.tracker.wait().await;
        match self.shared.first.get() {
            Some(err) => {
                self.shared.scope.cancel_with(err.clone());
                Err(err.clone())
            }
            None => {
                self.shared.scope.cancel();
                Ok(())
            }
        }
    }

    fn start<Fut>(&self, task: Fut, permit: Option<OwnedSemaphorePermit>)
    where
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let shared = self.shared.clone();
        self.tracker.spawn(async move {
            match CatchPanic::new(task).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => shared.record(TaskError::failed(err)),
                Err(panic_err) => shared.record(TaskError::Panicked(Arc::new(panic_err))),
            }
            drop(permit);
        });
    }
}
