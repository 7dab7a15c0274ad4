//! Promise nodes and the slabs they are carved from.

use std::sync::{Arc, OnceLock};

use crate::iter::EventIter;
use crate::latch::Latch;

/// A fixed-size block of nodes carved sequentially by the publisher.
///
/// Reference-counted at slab granularity: a [`Promise`] keeps its whole
/// slab alive, and a slab is reclaimed once no promise points into it.
pub(crate) struct Slab<T> {
    nodes: Box<[Node<T>]>,
}

impl<T> Slab<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            nodes: (0..capacity).map(|_| Node::default()).collect(),
        }
    }
}

/// One event's cell: written at most once, immutable after its latch fires.
struct Node<T> {
    link: OnceLock<Link<T>>,
    ready: Latch,
}

impl<T> Default for Node<T> {
    fn default() -> Self {
        Self {
            link: OnceLock::new(),
            ready: Latch::default(),
        }
    }
}

/// Value and successor, written together before the ready latch fires.
///
/// `(Some(value), Some(next))` for a published event; `(None, None)` marks
/// the closed end of the stream.
struct Link<T> {
    value: Option<T>,
    next: Option<Promise<T>>,
}

/// # Handle to one event in the stream, plus all events following it.
///
/// A `Promise` is effectively immutable and cheap to clone; it can be
/// shared and handed off freely, concurrently with publisher activity.
pub struct Promise<T> {
    slab: Arc<Slab<T>>,
    index: usize,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            slab: self.slab.clone(),
            index: self.index,
        }
    }
}

impl<T> Promise<T> {
    pub(crate) fn new(slab: Arc<Slab<T>>, index: usize) -> Self {
        Self { slab, index }
    }

    fn node(&self) -> &Node<T> {
        &self.slab.nodes[self.index]
    }

    /// Returns whether this promise has been published (or the stream
    /// closed at it).
    pub fn is_ready(&self) -> bool {
        self.node().ready.is_fired()
    }

    /// Completes once this promise is ready.
    pub async fn ready(&self) {
        self.node().ready.wait().await;
    }

    /// Writes the node and fires its latch. Publisher-only.
    pub(crate) fn publish(&self, value: Option<T>, next: Option<Promise<T>>) {
        let installed = self.node().link.set(Link { value, next }).is_ok();
        debug_assert!(installed, "promise node published twice");
        self.node().ready.fire();
    }
}

impl<T: Clone> Promise<T> {
    /// Waits for readiness, then yields the value and the next promise.
    ///
    /// Returns `(None, None)` when the stream is closed at this node.
    /// Repeat calls return consistent results.
    pub async fn next(&self) -> (Option<T>, Option<Promise<T>>) {
        self.node().ready.wait().await;
        let link = self
            .node()
            .link
            .get()
            .expect("ready latch fired before the link was written");
        (link.value.clone(), link.next.clone())
    }

    /// Creates an iterator starting at this promise. The promise itself is
    /// unchanged and can still be shared.
    pub fn iterator(&self) -> EventIter<T> {
        EventIter::new(self.clone())
    }
}
