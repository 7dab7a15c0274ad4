//! # Capturing task panics as error values.
//!
//! A task that unwinds must never take the runtime down with it; instead the
//! unwind is caught at the task boundary and packaged as a [`PanicError`]
//! carrying the recovered value, the program counters of the panicking
//! stack, and a textual rendering of that stack.
//!
//! Capture happens in two halves:
//!
//! - [`CatchPanic`] wraps a task future and brackets every `poll` with
//!   [`std::panic::catch_unwind`], so the unwind stops at the executor
//!   boundary and surfaces as a value.
//! - a process-global panic hook (installed once, on first group
//!   construction) records a [`backtrace::Backtrace`] at the panic site
//!   into a thread local. For panics inside a capture window the default
//!   stderr report is suppressed; panics anywhere else fall through to the
//!   previously installed hook.

use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Once;
use std::task::{Context, Poll};

use backtrace::Backtrace;
use pin_project::pin_project;

use crate::error::BoxError;

thread_local! {
    /// Nesting depth of active capture windows on this thread.
    static CAPTURE_DEPTH: Cell<u32> = const { Cell::new(0) };
    /// Backtrace recorded by the hook at the most recent captured panic site.
    static SITE_TRACE: Cell<Option<Backtrace>> = const { Cell::new(None) };
}

/// Installs the capturing panic hook exactly once per process.
pub(crate) fn install_hook() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let prev = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if CAPTURE_DEPTH.with(|depth| depth.get()) > 0 {
                SITE_TRACE.with(|slot| slot.set(Some(Backtrace::new_unresolved())));
            } else {
                prev(info);
            }
        }));
    });
}

/// Marks the current thread as capturing for the duration of one poll.
///
/// Dropped during unwinding as well, so the window closes no matter how the
/// poll exits.
struct CaptureWindow;

impl CaptureWindow {
    fn enter() -> Self {
        CAPTURE_DEPTH.with(|depth| depth.set(depth.get() + 1));
        CaptureWindow
    }
}

impl Drop for CaptureWindow {
    fn drop(&mut self) {
        CAPTURE_DEPTH.with(|depth| depth.set(depth.get() - 1));
    }
}

/// Future wrapper that converts an unwinding poll into `Err(PanicError)`.
#[pin_project]
pub(crate) struct CatchPanic<F> {
    #[pin]
    inner: F,
}

impl<F> CatchPanic<F> {
    pub(crate) fn new(inner: F) -> Self {
        Self { inner }
    }
}

impl<F: Future> Future for CatchPanic<F> {
    type Output = Result<F::Output, PanicError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let _window = CaptureWindow::enter();
        match std::panic::catch_unwind(AssertUnwindSafe(|| this.inner.poll(cx))) {
            Ok(poll) => poll.map(Ok),
            Err(recovered) => Poll::Ready(Err(PanicError::new(recovered))),
        }
    }
}

/// The recovered panic payload, classified at capture time.
///
/// Only payload shapes that are safe to share across threads are retained;
/// anything else is rendered the way std renders unknown payloads.
#[derive(Debug)]
enum Payload {
    Str(&'static str),
    Text(String),
    Error(BoxError),
    Opaque,
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Str(s) => f.write_str(s),
            Payload::Text(s) => f.write_str(s),
            Payload::Error(e) => write!(f, "{e}"),
            Payload::Opaque => f.write_str("Box<dyn Any>"),
        }
    }
}

fn classify(recovered: Box<dyn Any + Send>) -> Payload {
    let recovered = match recovered.downcast::<&'static str>() {
        Ok(s) => return Payload::Str(*s),
        Err(other) => other,
    };
    let recovered = match recovered.downcast::<String>() {
        Ok(s) => return Payload::Text(*s),
        Err(other) => other,
    };
    let recovered = match recovered.downcast::<BoxError>() {
        Ok(e) => return Payload::Error(*e),
        Err(other) => other,
    };
    // A Send-only error cannot be shared as-is; keep its rendering.
    match recovered.downcast::<Box<dyn std::error::Error + Send + 'static>>() {
        Ok(e) => Payload::Text(e.to_string()),
        Err(_) => Payload::Opaque,
    }
}

/// # A captured unwind, usable as an ordinary error value.
///
/// Produced when a task spawned through a group panics. Carries the
/// recovered value, the program counters of the panicking stack, and a
/// textual stack trace.
///
/// `Display` is the short one-line form (`panic: <value>`); the alternate
/// form (`{:#}`) appends the captured stack trace.
pub struct PanicError {
    payload: Payload,
    frames: Box<[usize]>,
    trace: String,
}

impl PanicError {
    /// Packages a recovered panic value.
    ///
    /// Prefers the backtrace recorded by the hook at the panic site; if the
    /// hook never ran (foreign hook installed later, payload from
    /// elsewhere), falls back to capturing here.
    pub(crate) fn new(recovered: Box<dyn Any + Send>) -> Self {
        let mut trace = SITE_TRACE
            .with(|slot| slot.take())
            .unwrap_or_else(Backtrace::new_unresolved);
        trace.resolve();
        let frames = trace.frames().iter().map(|f| f.ip() as usize).collect();
        Self {
            payload: classify(recovered),
            frames,
            trace: format!("{trace:?}"),
        }
    }

    /// Returns the short one-line description, `panic: <value>`.
    pub fn message(&self) -> String {
        format!("panic: {}", self.payload)
    }

    /// Returns the captured stack trace as a multiline string.
    pub fn stack_trace(&self) -> &str {
        &self.trace
    }

    /// Returns the program counters composing the captured stack.
    pub fn stack_frames(&self) -> &[usize] {
        &self.frames
    }

    /// Returns the recovered value if the task panicked with a string.
    pub fn recovered_str(&self) -> Option<&str> {
        match &self.payload {
            Payload::Str(s) => Some(s),
            Payload::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the recovered value if it was itself an error.
    ///
    /// This is the unwrap half of errors-as-values through unwind: a task
    /// that panics with a boxed error round-trips it to the group's waiter.
    pub fn recovered_error(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.payload {
            Payload::Error(e) => Some(&**e),
            _ => None,
        }
    }
}

impl fmt::Display for PanicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            write!(f, "panic: {} [recovered]\n\n{}", self.payload, self.trace)
        } else {
            write!(f, "panic: {}", self.payload)
        }
    }
}

impl fmt::Debug for PanicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PanicError")
            .field("recovered", &self.payload)
            .field("frames", &self.frames.len())
            .finish()
    }
}

impl std::error::Error for PanicError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.recovered_error()
    }
}
