//! Streaming event protocol for agent backends
//!
//! An agent backend streams one HTTP response as `data: <json>` lines. This
//! crate decodes that stream and normalizes it:
//!
//! - [`frame`] splits raw bytes into frames and recognizes `[DONE]`
//! - [`SseParser`] routes each frame by its `type` to flat [`StreamEvent`]
//!   and [`HilEvent`] callbacks
//! - [`agui`] standardizes those callbacks into canonical [`AguiEvent`]s and
//!   tracks run and message lifecycles
//! - [`consume_stream`] ties a byte stream to a parser
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use agentwire_core::{AguiEventProcessor, SseParser, StandardizingHook};
//!
//! let processor = Arc::new(AguiEventProcessor::new());
//! processor.on("text_message_content", |event: &agentwire_core::AguiEvent| {
//!     println!("{:?}", event);
//! });
//!
//! let hook = Arc::new(StandardizingHook::new(
//!     processor.clone(),
//!     "thread-1".to_string(),
//!     "run-1".to_string(),
//! ));
//! let callbacks = hook.callbacks();
//!
//! let parser = SseParser::new();
//! parser.parse(r#"{"type":"start","message_id":"m-1"}"#, &callbacks);
//! parser.parse(r#"{"type":"content","content":"Hello"}"#, &callbacks);
//! parser.parse(r#"{"type":"end"}"#, &callbacks);
//!
//! assert_eq!(processor.message_text("m-1").as_deref(), Some("Hello"));
//! ```
//!
//! # Human-in-the-Loop Signals
//!
//! Interrupts reach the HIL handler of the call's callbacks or, when that is
//! empty, the parser's default handler:
//!
//! ```
//! use agentwire_core::{HilEvent, SseCallbacks, SseParser};
//!
//! let parser = SseParser::new().with_default_hil_handler(|event: &HilEvent| {
//!     if let HilEvent::Interrupt(interrupt) = event {
//!         println!("{}: {}", interrupt.title, interrupt.message);
//!     }
//! });
//! parser.parse(
//!     r#"{"type":"graph_update","data":{"__interrupt__":[{"value":{"type":"ask_human","question":"Proceed?"}}]}}"#,
//!     &SseCallbacks::new(),
//! );
//! ```

pub mod agui;
pub mod error;
pub mod frame;
pub mod hil;
pub mod hooks;
pub mod router;
pub mod stream;

// Errors
pub use error::{ProtocolError, ProtocolResult};

// Framing and stream driving
pub use frame::{Frame, FrameReader, DONE_SENTINEL};
pub use stream::{
    consume_stream, consume_thread_stream, ActiveStreams, StreamLease, StreamSummary,
};

// Hooks
pub use hooks::{invoke_guarded, HilHandler, SseCallbacks, StreamHook};

// Router
pub use router::events::{
    Artifact, BillingUpdate, HilEvent, HilInterrupt, HilRequest, HilStatusUpdate, InterruptKind,
    InterruptSource, RawEvent, StreamEvent, TaskCompletion, TaskItem, TaskProgress, TaskState,
};
pub use router::interrupt::InterruptMatcher;
pub use router::legacy::{ArtifactSniffer, LegacyContentExtractor, ReprContentExtractor};
pub use router::{ParseOutcome, SseParser};

// Standardization
pub use agui::{
    ActiveMessage, ActiveRun, AguiEvent, AguiEventProcessor, AguiHandler, MessageRole,
    ProcessorConfig, RunStatus, StandardizingHook,
};

// HIL records
pub use hil::{CheckpointInfo, InterruptInfo};
