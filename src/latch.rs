//! One-shot ready signal, observable by any number of waiters.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// A latch that fires at most once and stays fired.
///
/// Waiters that arrive after the fire return immediately; waiters parked
/// before it are woken. The flag is checked again after registering with
/// the [`Notify`], so a fire between the fast path and the park is never
/// lost.
#[derive(Default)]
pub(crate) struct Latch {
    fired: AtomicBool,
    notify: Notify,
}

impl Latch {
    /// Fires the latch, waking every current and future waiter.
    pub(crate) fn fire(&self) {
        self.fired.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub(crate) fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Completes once the latch has fired.
    pub(crate) async fn wait(&self) {
        if self.is_fired() {
            return;
        }
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_fired() {
            return;
        }
        notified.await;
    }
}
