//! Stateful iteration over an event stream.

use std::future::Future;

use crate::error::StreamError;
use crate::node::Promise;
use crate::scope::CancelScope;

/// # Iterator over an event stream.
///
/// Wraps a current [`Promise`] and advances past each event as it is
/// consumed. Unlike promises, iterators are stateful and must not be
/// shared across concurrent consumers; safe to use concurrently with
/// publisher activity.
pub struct EventIter<T> {
    promise: Option<Promise<T>>,
}

impl<T> EventIter<T> {
    pub(crate) fn new(promise: Promise<T>) -> Self {
        Self {
            promise: Some(promise),
        }
    }
}

impl<T: Clone> EventIter<T> {
    /// Returns the next event in the stream.
    ///
    /// - `Ok(value)` when the next event is published.
    /// - `Err(StreamError::Done)` when the stream is exhausted; repeat
    ///   calls keep returning it, even under a canceled scope.
    /// - `Err(StreamError::Canceled(cause))` if `scope` is canceled first;
    ///   the iterator does not advance and stays usable.
    ///
    /// Blocks until one of these three outcomes occurs.
    pub async fn next(&mut self, scope: &CancelScope) -> Result<T, StreamError> {
        let Some(promise) = self.promise.clone() else {
            return Err(StreamError::Done);
        };
        if scope.is_cancelled() {
            return Err(StreamError::canceled_by(scope));
        }
        tokio::select! {
            _ = promise.ready() => {
                let (value, next) = promise.next().await;
                self.promise = next;
                match value {
                    Some(value) => Ok(value),
                    None => Err(StreamError::Done),
                }
            }
            _ = scope.cancelled() => Err(StreamError::canceled_by(scope)),
        }
    }

    /// Feeds every remaining event to `callback` until the stream ends.
    ///
    /// End-of-stream, whether from the stream itself or returned by the
    /// callback as [`StreamError::Done`], becomes ordinary success. A cancellation
    /// of `scope` or any other callback error stops consumption and is
    /// returned as-is.
    pub async fn consume<F, Fut>(
        &mut self,
        scope: &CancelScope,
        mut callback: F,
    ) -> Result<(), StreamError>
    where
        F: FnMut(CancelScope, T) -> Fut,
        Fut: Future<Output = Result<(), StreamError>>,
    {
        loop {
            let value = match self.next(scope).await {
                Ok(value) => value,
                Err(err) => return filter_done(err),
            };
            if let Err(err) = callback(scope.clone(), value).await {
                return filter_done(err);
            }
        }
    }
}

fn filter_done(err: StreamError) -> Result<(), StreamError> {
    match err {
        StreamError::Done => Ok(()),
        other => Err(other),
    }
}
