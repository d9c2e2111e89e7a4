//! Raw event router
//!
//! [`SseParser`] turns one frame payload into zero or more callbacks. It keeps
//! no per-stream state: the only thing it owns is configuration (the default
//! HIL handler, the legacy content extractor and the interrupt matchers), so
//! one parser can serve any number of streams.
//!
//! # Example
//! ```
//! use std::sync::Arc;
//! use parking_lot::Mutex;
//! use agentwire_core::{ParseOutcome, SseCallbacks, SseParser, StreamEvent};
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = seen.clone();
//! let callbacks = SseCallbacks::new().with_stream(move |e: &StreamEvent| sink.lock().push(e.clone()));
//!
//! let parser = SseParser::new();
//! assert_eq!(parser.parse(r#"{"type":"content","content":"Hi"}"#, &callbacks), ParseOutcome::Handled);
//! assert_eq!(parser.parse("[DONE]", &callbacks), ParseOutcome::Done);
//! assert_eq!(*seen.lock(), vec![StreamEvent::Content("Hi".to_string())]);
//! ```

mod custom;
pub mod events;
mod graph;
pub mod interrupt;
pub mod legacy;
mod signals;

pub use custom::{parse_progress_line, parse_task_list, task_state_progress, workflow_label};

use std::sync::Arc;

use serde_json::Value;

use crate::error::ProtocolError;
use crate::frame::DONE_SENTINEL;
use crate::hooks::{invoke_guarded, HilHandler, SseCallbacks};
use events::{BillingUpdate, HilEvent, RawEvent, StreamEvent};
use interrupt::{InterruptMatcher, MessageStreamInterruptMatcher};
use legacy::{ArtifactSniffer, LegacyContentExtractor, ReprContentExtractor};
use signals::RequestKind;

/// What a single `parse` call did with its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseOutcome {
    /// Payload was routed to a handler
    Handled,
    /// Payload parsed but its type or shape was not recognised
    Unhandled,
    /// Payload was the end-of-stream sentinel
    Done,
    /// Payload was not valid JSON; the error callback was invoked
    Failed,
}

/// Frame payload router
pub struct SseParser {
    default_hil: Option<Arc<dyn HilHandler>>,
    pub(crate) extractor: Arc<dyn LegacyContentExtractor>,
    pub(crate) sniffer: ArtifactSniffer,
    pub(crate) graph_matchers: Vec<Box<dyn InterruptMatcher>>,
    pub(crate) message_matcher: MessageStreamInterruptMatcher,
}

impl Default for SseParser {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SseParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SseParser")
            .field("default_hil", &self.default_hil.is_some())
            .field(
                "graph_matchers",
                &self.graph_matchers.iter().map(|m| m.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl SseParser {
    /// Create a parser with the repr-string extractor and no default HIL handler
    pub fn new() -> Self {
        let extractor: Arc<dyn LegacyContentExtractor> = Arc::new(ReprContentExtractor);
        Self {
            default_hil: None,
            message_matcher: MessageStreamInterruptMatcher::new(extractor.clone()),
            extractor,
            sniffer: ArtifactSniffer,
            graph_matchers: interrupt::graph_update_matchers(),
        }
    }

    /// Handler used for HIL events when a call's callbacks carry none
    pub fn with_default_hil_handler(mut self, handler: impl HilHandler + 'static) -> Self {
        self.default_hil = Some(Arc::new(handler));
        self
    }

    /// Same as [`Self::with_default_hil_handler`], from a shared handle
    pub fn with_default_hil_handler_arc(mut self, handler: Arc<dyn HilHandler>) -> Self {
        self.default_hil = Some(handler);
        self
    }

    /// Replace the extractor used for `message_stream` debug strings
    pub fn with_content_extractor(mut self, extractor: Arc<dyn LegacyContentExtractor>) -> Self {
        self.message_matcher = MessageStreamInterruptMatcher::new(extractor.clone());
        self.extractor = extractor;
        self
    }

    /// Whether a fallback HIL handler is configured
    pub fn has_default_hil_handler(&self) -> bool {
        self.default_hil.is_some()
    }

    /// Parse one frame payload and route it
    ///
    /// Never fails: a payload that is not JSON is reported through
    /// [`StreamEvent::Error`] and the call returns [`ParseOutcome::Failed`].
    pub fn parse(&self, payload: &str, callbacks: &SseCallbacks) -> ParseOutcome {
        let payload = payload.trim();
        if payload == DONE_SENTINEL {
            return ParseOutcome::Done;
        }

        match serde_json::from_str::<RawEvent>(payload) {
            Ok(event) => self.dispatch(&event, callbacks),
            Err(e) => {
                let err = ProtocolError::decode(&e, payload);
                log::debug!("{}", err);
                callbacks.emit(&StreamEvent::Error(err.to_string()));
                ParseOutcome::Failed
            }
        }
    }

    /// Parse an already-decoded JSON value
    pub fn parse_value(&self, value: Value, callbacks: &SseCallbacks) -> ParseOutcome {
        match serde_json::from_value::<RawEvent>(value) {
            Ok(event) => self.dispatch(&event, callbacks),
            Err(e) => {
                let err = ProtocolError::shape("<unknown>", e.to_string());
                callbacks.emit(&StreamEvent::Error(err.to_string()));
                ParseOutcome::Failed
            }
        }
    }

    /// Route a decoded envelope by its `type`
    pub fn dispatch(&self, event: &RawEvent, callbacks: &SseCallbacks) -> ParseOutcome {
        let emit = Emitter {
            callbacks,
            fallback_hil: self.default_hil.as_ref(),
        };

        let handled = match event.event_type.as_str() {
            "start" => {
                let message_id = event
                    .field_str("message_id")
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("msg_{}", uuid::Uuid::new_v4().simple()));
                emit.stream(StreamEvent::StreamStart { message_id });
                true
            }
            "custom_event" => custom::handle_custom_event(event, &emit),
            "custom_stream" => custom::handle_custom_stream(event, &emit),
            "message_stream" => graph::handle_message_stream(self, event, &emit),
            "graph_update" => graph::handle_graph_update(self, event, &emit),
            "memory_update" => {
                let text = text_of(event).unwrap_or_else(|| "Memory updated".to_string());
                emit.status(text);
                true
            }
            "node_update" => {
                let text = text_of(event).or_else(|| event.field_str("node").map(workflow_label));
                match text {
                    Some(t) => {
                        emit.status(t);
                        true
                    }
                    None => {
                        log::debug!("node_update without content or node");
                        false
                    }
                }
            }
            "billing" => handle_billing(event, &emit),
            "content" => match text_of(event) {
                Some(text) => {
                    emit.stream(StreamEvent::Content(text));
                    true
                }
                None => false,
            },
            "end" => {
                emit.stream(StreamEvent::StreamComplete);
                true
            }
            "error" => {
                let message = text_of(event)
                    .or_else(|| event.field_str("error").map(str::to_string))
                    .or_else(|| event.field_str("message").map(str::to_string))
                    .unwrap_or_else(|| "Unknown error".to_string());
                emit.stream(StreamEvent::Error(message));
                true
            }
            "hil_interrupt" => signals::handle_interrupt(event, &emit),
            "hil_checkpoint" => signals::handle_checkpoint(event, &emit),
            "hil_status" => signals::handle_status(event, &emit),
            "hil_approval_required" => signals::handle_request(event, RequestKind::Approval, &emit),
            "hil_review_required" => signals::handle_request(event, RequestKind::Review, &emit),
            "hil_input_required" => signals::handle_request(event, RequestKind::Input, &emit),
            other => {
                log::debug!("Dropping event of unknown type '{}'", other);
                false
            }
        };

        if handled {
            ParseOutcome::Handled
        } else {
            ParseOutcome::Unhandled
        }
    }
}

fn text_of(event: &RawEvent) -> Option<String> {
    match &event.content {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Null) | None => None,
        Some(other) => Some(other.to_string()),
    }
}

fn handle_billing(event: &RawEvent, emit: &Emitter<'_>) -> bool {
    if let Some(message) = event.field_str("error_message") {
        emit.stream(StreamEvent::BillingError(message.to_string()));
        return true;
    }

    let body = event.body();
    let lookup = |name: &str| -> Option<Value> {
        event
            .field(name)
            .cloned()
            .or_else(|| body.as_ref().and_then(|b| b.get(name).cloned()))
    };

    let Some(credits_remaining) = lookup("credits_remaining").as_ref().and_then(Value::as_f64)
    else {
        log::warn!(
            "{}",
            ProtocolError::shape(&event.event_type, "missing credits_remaining")
        );
        return false;
    };

    emit.stream(StreamEvent::Billing(BillingUpdate {
        credits_remaining,
        credits_used: lookup("credits_used").as_ref().and_then(Value::as_f64),
        model: lookup("model").as_ref().and_then(Value::as_str).map(str::to_string),
    }));
    true
}

/// Delivery handle passed to handlers for one dispatch
pub(crate) struct Emitter<'a> {
    callbacks: &'a SseCallbacks,
    fallback_hil: Option<&'a Arc<dyn HilHandler>>,
}

impl Emitter<'_> {
    pub(crate) fn stream(&self, event: StreamEvent) {
        self.callbacks.emit(&event);
    }

    pub(crate) fn status(&self, text: impl Into<String>) {
        self.stream(StreamEvent::Status(text.into()));
    }

    /// Deliver to the call's HIL handler, else the parser's default
    pub(crate) fn hil(&self, event: HilEvent) {
        match self.callbacks.hil().or(self.fallback_hil) {
            Some(handler) => {
                invoke_guarded("hil", || handler.on_hil_event(&event));
            }
            None => log::debug!("No HIL handler registered, dropping {:?}", event),
        }
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
