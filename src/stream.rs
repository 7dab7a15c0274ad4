//! # Single-publisher, multi-subscriber event broadcast.
//!
//! [`EventStream`] links [`Promise`] nodes into a chain: every publish
//! writes the current tail and installs a fresh one, so each subscriber
//! walks the same immutable chain from its own starting point.
//!
//! - [`EventStream::publish`] delivers the next value to all subscribers.
//! - [`EventStream::subscribe`] snapshots the current tail; the returned
//!   promise yields every event from that point forward.
//! - [`EventStream::close`] ends the stream; late subscribers observe an
//!   immediate end-of-stream.
//!
//! Publisher calls take `&mut self`, which encodes the single-publisher
//! rule in the types. Subscribing concurrently with publishing goes
//! through the cloneable [`Subscriber`] handle. Values are shared, not
//! copied: consumers must not mutate a consumed payload. Wrap payloads
//! in `Arc` to share them cheaply.
//!
//! Nodes are carved from fixed-size slabs to amortise allocation; a slow
//! subscriber simply keeps older slabs alive until it catches up. The
//! slab exists for allocation, not back-pressure: producer-subscriber
//! drift is unbounded.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::node::{Promise, Slab};

/// Default node-slab capacity used by [`EventStream::new`].
pub const DEFAULT_BUFFER: usize = 1024;

/// Broadcast stream of opaque values; see the [module docs](self).
pub struct EventStream<T> {
    shared: Arc<Shared<T>>,
    /// The unique not-yet-ready node the next publish writes into.
    tail: Promise<T>,
    /// Current slab being carved, and the next free node within it.
    slab: Arc<Slab<T>>,
    pos: usize,
    capacity: usize,
    closed: bool,
}

struct Shared<T> {
    /// The current tail, as published to subscribers.
    subscribe_tail: Mutex<Promise<T>>,
}

impl<T> EventStream<T> {
    /// Creates an event stream with the default slab capacity.
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_BUFFER)
    }

    /// Creates an event stream carving nodes from slabs of `capacity`.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn with_buffer(capacity: usize) -> Self {
        assert!(capacity > 0, "event stream buffer capacity must be positive");
        let slab = Arc::new(Slab::new(capacity));
        let tail = Promise::new(slab.clone(), 0);
        let shared = Arc::new(Shared {
            subscribe_tail: Mutex::new(tail.clone()),
        });
        Self {
            shared,
            tail,
            slab,
            pos: 1,
            capacity,
            closed: false,
        }
    }

    /// Publishes the next value to every subscriber.
    ///
    /// Safe concurrently with any number of subscribers, but not with
    /// other publisher calls (enforced by `&mut self`).
    ///
    /// # Panics
    ///
    /// Panics if the stream has been closed.
    pub fn publish(&mut self, value: T) {
        assert!(!self.closed, "publish on a closed event stream");
        let next = self.carve();
        // Install the new subscribe-tail before firing the predecessor, so
        // a subscriber that reads an already-fired tail sees its successor.
        *self.shared.subscribe_tail.lock() = next.clone();
        let prev = std::mem::replace(&mut self.tail, next.clone());
        prev.publish(Some(value), Some(next));
    }

    /// Ends the stream. The final node carries no value and no successor;
    /// subscribers that reach it observe end-of-stream.
    ///
    /// # Panics
    ///
    /// Panics if called twice.
    pub fn close(&mut self) {
        assert!(!self.closed, "event stream closed twice");
        self.closed = true;
        self.tail.publish(None, None);
        tracing::debug!("event stream closed");
    }

    /// Returns a promise for the next unpublished event: the stream's
    /// contents from the current position forward.
    pub fn subscribe(&self) -> Promise<T> {
        self.shared.subscribe_tail.lock().clone()
    }

    /// Returns a cloneable handle for subscribing concurrently with
    /// publisher activity.
    pub fn subscriber(&self) -> Subscriber<T> {
        Subscriber {
            shared: self.shared.clone(),
        }
    }

    /// Returns whether [`EventStream::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn carve(&mut self) -> Promise<T> {
        if self.pos >= self.capacity {
            self.slab = Arc::new(Slab::new(self.capacity));
            self.pos = 0;
        }
        let next = Promise::new(self.slab.clone(), self.pos);
        self.pos += 1;
        next
    }
}

impl<T> Default for EventStream<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Subscribe-only handle to an [`EventStream`], safe to clone and share.
pub struct Subscriber<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Subscriber<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> Subscriber<T> {
    /// Snapshots the current tail; equivalent to [`EventStream::subscribe`].
    pub fn subscribe(&self) -> Promise<T> {
        self.shared.subscribe_tail.lock().clone()
    }
}
