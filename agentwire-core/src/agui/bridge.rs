//! Conversion from router output to canonical events.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};

use super::events::{AguiEvent, MessageRole};
use super::processor::AguiEventProcessor;
use crate::hooks::{HilHandler, SseCallbacks, StreamHook};
use crate::router::events::{Artifact, HilEvent, StreamEvent};

/// Per-stream conversion state.
///
/// Tracks whether the run has started or finished and which message is
/// open, so that one router stream maps onto one well-formed run.
#[derive(Debug, Default)]
struct ConversionState {
    run_started: bool,
    run_finished: bool,
    current_message_id: Option<String>,
}

/// Feeds router callbacks for one thread into an [`AguiEventProcessor`]
///
/// Install it as both the stream hook and the HIL handler of the
/// [`SseCallbacks`] passed to the router; [`StandardizingHook::callbacks`]
/// does exactly that.
pub struct StandardizingHook {
    processor: Arc<AguiEventProcessor>,
    thread_id: String,
    run_id: String,
    state: Mutex<ConversionState>,
}

impl StandardizingHook {
    pub fn new(processor: Arc<AguiEventProcessor>, thread_id: String, run_id: String) -> Self {
        Self {
            processor,
            thread_id,
            run_id,
            state: Mutex::new(ConversionState::default()),
        }
    }

    /// Use a generated run id
    pub fn for_thread(processor: Arc<AguiEventProcessor>, thread_id: impl Into<String>) -> Self {
        Self::new(
            processor,
            thread_id.into(),
            format!("run_{}", uuid::Uuid::new_v4().simple()),
        )
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Callback set routing both stream and HIL events through this hook
    pub fn callbacks(self: &Arc<Self>) -> SseCallbacks {
        SseCallbacks::new()
            .with_stream_arc(self.clone())
            .with_hil_arc(self.clone())
    }

    /// Canonical events for one router event
    ///
    /// Some router events map to several canonical events, so this returns a
    /// Vec. The conversion state is updated as a side effect.
    pub fn convert_stream_event(&self, event: &StreamEvent) -> Vec<AguiEvent> {
        let mut state = self.state.lock();
        let mut events = Vec::new();

        match event {
            StreamEvent::StreamStart { message_id } => {
                self.ensure_run(&mut state, &mut events);
                if let Some(open) = state.current_message_id.take() {
                    events.push(AguiEvent::TextMessageEnd { message_id: open });
                }
                state.current_message_id = Some(message_id.clone());
                events.push(AguiEvent::TextMessageStart {
                    message_id: message_id.clone(),
                    role: MessageRole::Assistant,
                    thread_id: Some(self.thread_id.clone()),
                });
            }

            StreamEvent::Content(delta) => {
                self.ensure_run(&mut state, &mut events);
                let message_id = match &state.current_message_id {
                    Some(id) => id.clone(),
                    None => {
                        // Content arrived without a start frame.
                        let id = format!("msg_{}", uuid::Uuid::new_v4().simple());
                        state.current_message_id = Some(id.clone());
                        events.push(AguiEvent::TextMessageStart {
                            message_id: id.clone(),
                            role: MessageRole::Assistant,
                            thread_id: Some(self.thread_id.clone()),
                        });
                        id
                    }
                };
                events.push(AguiEvent::TextMessageContent {
                    message_id,
                    delta: delta.clone(),
                });
            }

            StreamEvent::Status(message) => events.push(AguiEvent::StatusUpdate {
                thread_id: Some(self.thread_id.clone()),
                message: message.clone(),
            }),

            StreamEvent::StreamComplete | StreamEvent::StreamEnded { .. } => {
                self.finish_run(&mut state, &mut events);
            }

            // Frame errors do not end the stream, so the run stays open.
            StreamEvent::Error(message) => events.push(AguiEvent::RunError {
                thread_id: None,
                message: message.clone(),
                code: None,
            }),

            StreamEvent::Billing(update) => events.push(custom(
                "billing",
                serde_json::to_value(update).unwrap_or(Value::Null),
            )),
            StreamEvent::BillingError(message) => {
                events.push(custom("billing_error", json!({ "message": message })))
            }
            StreamEvent::TaskProgress(progress) => events.push(custom(
                "task_progress",
                serde_json::to_value(progress).unwrap_or(Value::Null),
            )),
            StreamEvent::TaskList(items) => events.push(custom(
                "task_list",
                serde_json::to_value(items).unwrap_or(Value::Null),
            )),
            StreamEvent::TaskCompleted(done) => events.push(custom(
                "task_completed",
                json!({
                    "task_index": done.task_index,
                    "title": done.title,
                    "result": done.result,
                }),
            )),
            StreamEvent::TaskStatus { task_index, status } => events.push(custom(
                "task_status",
                json!({ "task_index": task_index, "status": status }),
            )),
            StreamEvent::Artifact(artifact) => events.push(custom(
                "artifact",
                match artifact {
                    Artifact::Image { url, alt } => json!({"kind": "image", "url": url, "alt": alt}),
                    Artifact::Json(value) => json!({"kind": "json", "value": value}),
                },
            )),
        }

        events
    }

    /// Canonical events for one HIL signal
    pub fn convert_hil_event(&self, event: &HilEvent) -> Vec<AguiEvent> {
        let thread_id = |explicit: &Option<String>| {
            explicit.clone().unwrap_or_else(|| self.thread_id.clone())
        };

        match event {
            HilEvent::Interrupt(interrupt) => vec![AguiEvent::HilInterruptDetected {
                thread_id: thread_id(&interrupt.thread_id),
                interrupt: interrupt.to_info(),
            }],
            HilEvent::Checkpoint {
                thread_id: explicit,
                checkpoint,
            } => vec![AguiEvent::HilCheckpointCreated {
                thread_id: thread_id(explicit),
                checkpoint: checkpoint.clone(),
            }],
            HilEvent::Status(update) => vec![AguiEvent::StatusUpdate {
                thread_id: Some(thread_id(&update.thread_id)),
                message: format!("Execution status: {}", update.status),
            }],
            HilEvent::ApprovalRequired(request) => vec![AguiEvent::HilInterruptDetected {
                thread_id: thread_id(&request.thread_id),
                interrupt: request.to_info("approval"),
            }],
            HilEvent::ReviewRequired(request) => vec![AguiEvent::HilInterruptDetected {
                thread_id: thread_id(&request.thread_id),
                interrupt: request.to_info("review"),
            }],
            HilEvent::InputRequired(request) => vec![AguiEvent::HilInterruptDetected {
                thread_id: thread_id(&request.thread_id),
                interrupt: request.to_info("input"),
            }],
        }
    }

    fn ensure_run(&self, state: &mut ConversionState, events: &mut Vec<AguiEvent>) {
        if !state.run_started {
            state.run_started = true;
            events.push(AguiEvent::RunStarted {
                thread_id: self.thread_id.clone(),
                run_id: self.run_id.clone(),
            });
        }
    }

    fn finish_run(&self, state: &mut ConversionState, events: &mut Vec<AguiEvent>) {
        if let Some(open) = state.current_message_id.take() {
            events.push(AguiEvent::TextMessageEnd { message_id: open });
        }
        if state.run_started && !state.run_finished {
            state.run_finished = true;
            events.push(AguiEvent::RunFinished {
                thread_id: self.thread_id.clone(),
                run_id: self.run_id.clone(),
            });
        }
    }

    fn forward(&self, events: Vec<AguiEvent>) {
        for event in events {
            self.processor.process_event(event);
        }
    }
}

fn custom(name: &str, value: Value) -> AguiEvent {
    AguiEvent::Custom {
        name: name.to_string(),
        value,
    }
}

impl StreamHook for StandardizingHook {
    fn on_event(&self, event: &StreamEvent) {
        let events = self.convert_stream_event(event);
        self.forward(events);
    }
}

impl HilHandler for StandardizingHook {
    fn on_hil_event(&self, event: &HilEvent) {
        let events = self.convert_hil_event(event);
        self.forward(events);
    }
}

impl std::fmt::Debug for StandardizingHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StandardizingHook")
            .field("thread_id", &self.thread_id)
            .field("run_id", &self.run_id)
            .field("state", &*self.state.lock())
            .finish()
    }
}

#[cfg(test)]
#[path = "bridge_tests.rs"]
mod tests;
