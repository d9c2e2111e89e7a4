//! Event standardization into the AG-UI event model.
//!
//! The router's flat callbacks carry whatever the backend happened to send.
//! This module normalizes them into one canonical event set, tracks run and
//! message lifecycles per thread, and re-dispatches to registered handlers.
//!
//! # Event Mapping
//!
//! Router output is mapped by [`bridge::StandardizingHook`]:
//!
//! | Router event | Canonical event(s) |
//! |--------------|--------------------|
//! | `StreamStart` | `run_started` (first only), `text_message_start` |
//! | `Content` | `text_message_content` |
//! | `Status` | `status_update` |
//! | `StreamComplete` / `StreamEnded` | `text_message_end`, `run_finished` |
//! | `Error` | `run_error` |
//! | billing, tasks, artifacts | `custom` |
//! | HIL `Interrupt` and `*Required` | `hil_interrupt_detected` |
//! | HIL `Checkpoint` | `hil_checkpoint_created` |
//!
//! The reverse direction, canonical events back to the flat shape, is the
//! processor's legacy bridge ([`AguiEventProcessor::set_legacy_bridge`]).

pub mod bridge;
pub mod events;
pub mod handler;
pub mod processor;

pub use bridge::StandardizingHook;
pub use events::{handler_name, AguiEvent, JsonPatchOp, MessageRole};
pub use handler::{AguiHandler, HandlerRegistry};
pub use processor::{ActiveMessage, ActiveRun, AguiEventProcessor, ProcessorConfig, RunStatus};
