//! # taskstream
//!
//! **Taskstream** is a small structured-concurrency toolkit.
//!
//! It provides two independent primitives for servers and pipelines,
//! composed only by their consumers: supervised task groups that collapse
//! the first failure into a group result, and broadcast event streams
//! where every subscriber observes every event from its subscription
//! point forward.
//!
//! ## Features
//!
//! | Area              | Description                                                              | Key types / traits                       |
//! |-------------------|--------------------------------------------------------------------------|------------------------------------------|
//! | **Task groups**   | Spawn/await a dynamic set of cancellable tasks; first error cancels all. | [`TaskGroup`]                            |
//! | **Cancellation**  | Hierarchical cancel scopes carrying the cause of the cancellation.       | [`CancelScope`]                          |
//! | **Panic capture** | Task unwinds become error values with a stack trace attached.            | [`PanicError`]                           |
//! | **Event streams** | Single-publisher broadcast; lock-free subscription, slab-pooled nodes.   | [`EventStream`], [`Promise`], [`EventIter`] |
//! | **Errors**        | Typed outcomes for groups and stream iteration.                          | [`TaskError`], [`StreamError`]           |
//!
//! ```
//! use taskstream::{CancelScope, EventStream, TaskGroup};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let root = CancelScope::new();
//!     let group = TaskGroup::new(&root);
//!
//!     // A consumer that drains the stream until it closes.
//!     let mut stream = EventStream::new();
//!     let mut ticks = stream.subscribe().iterator();
//!     group
//!         .spawn(|scope| async move {
//!             let mut total = 0u32;
//!             while let Ok(n) = ticks.next(&scope).await {
//!                 total += n;
//!             }
//!             println!("saw {total}");
//!             Ok(())
//!         })
//!         .await;
//!
//!     for n in 1..=3 {
//!         stream.publish(n);
//!     }
//!     stream.close();
//!
//!     group.wait().await.expect("consumer failed");
//! }
//! ```
//!
//! ---

mod error;
mod group;
mod iter;
mod latch;
mod node;
mod panic;
mod scope;
mod stream;

// ---- Public re-exports ----

pub use error::{BoxError, StreamError, TaskError};
pub use group::TaskGroup;
pub use iter::EventIter;
pub use node::Promise;
pub use panic::PanicError;
pub use scope::CancelScope;
pub use stream::{EventStream, Subscriber, DEFAULT_BUFFER};
