//! Callback traits for observing decoded events
//!
//! Every component reports through hooks rather than return values, so the
//! same stream can feed a UI and a standardizer at once. Hooks follow one
//! rule: a panicking hook is logged and skipped, it never stops delivery to
//! the next hook or undoes state that was already updated.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::router::events::{HilEvent, StreamEvent};

/// Hook for the flat stream callback shape
///
/// # Example
/// ```
/// use agentwire_core::{StreamEvent, StreamHook};
///
/// struct Printer;
///
/// impl StreamHook for Printer {
///     fn on_event(&self, event: &StreamEvent) {
///         if let StreamEvent::Content(text) = event {
///             print!("{}", text);
///         }
///     }
/// }
/// ```
pub trait StreamHook: Send + Sync {
    /// Called once per emitted event, in arrival order
    fn on_event(&self, event: &StreamEvent);
}

/// Blanket implementation for closures
impl<F> StreamHook for F
where
    F: Fn(&StreamEvent) + Send + Sync,
{
    fn on_event(&self, event: &StreamEvent) {
        self(event)
    }
}

/// Handler for human-in-the-loop signals
pub trait HilHandler: Send + Sync {
    /// Called for every interrupt, checkpoint and HIL status signal
    fn on_hil_event(&self, event: &HilEvent);
}

/// Blanket implementation for closures
impl<F> HilHandler for F
where
    F: Fn(&HilEvent) + Send + Sync,
{
    fn on_hil_event(&self, event: &HilEvent) {
        self(event)
    }
}

/// Per-call callback set handed to the router
///
/// Both slots are optional. When `hil` is empty the router falls back to its
/// own default handler, if one was configured.
#[derive(Clone, Default)]
pub struct SseCallbacks {
    stream: Option<Arc<dyn StreamHook>>,
    hil: Option<Arc<dyn HilHandler>>,
}

impl SseCallbacks {
    /// Create an empty callback set
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the stream hook
    pub fn with_stream(mut self, hook: impl StreamHook + 'static) -> Self {
        self.stream = Some(Arc::new(hook));
        self
    }

    /// Set the stream hook from a shared handle
    pub fn with_stream_arc(mut self, hook: Arc<dyn StreamHook>) -> Self {
        self.stream = Some(hook);
        self
    }

    /// Set the HIL handler
    pub fn with_hil(mut self, handler: impl HilHandler + 'static) -> Self {
        self.hil = Some(Arc::new(handler));
        self
    }

    /// Set the HIL handler from a shared handle
    pub fn with_hil_arc(mut self, handler: Arc<dyn HilHandler>) -> Self {
        self.hil = Some(handler);
        self
    }

    /// Stream hook, if any
    pub fn stream(&self) -> Option<&Arc<dyn StreamHook>> {
        self.stream.as_ref()
    }

    /// HIL handler, if any
    pub fn hil(&self) -> Option<&Arc<dyn HilHandler>> {
        self.hil.as_ref()
    }

    /// Deliver a stream event to the stream hook
    pub fn emit(&self, event: &StreamEvent) {
        if let Some(hook) = &self.stream {
            invoke_guarded("stream", || hook.on_event(event));
        }
    }
}

impl std::fmt::Debug for SseCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SseCallbacks")
            .field("stream", &self.stream.is_some())
            .field("hil", &self.hil.is_some())
            .finish()
    }
}

/// Run a callback, logging and swallowing any panic it raises
///
/// Returns `false` if the callback panicked.
pub fn invoke_guarded<F: FnOnce()>(label: &str, callback: F) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(callback)) {
        Ok(()) => true,
        Err(payload) => {
            log::warn!("{} callback panicked: {}", label, panic_message(&*payload));
            false
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}
