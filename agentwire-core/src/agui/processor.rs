//! Run and message state tracking for standardized events.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use super::events::{AguiEvent, MessageRole};
use super::handler::{AguiHandler, HandlerRegistry};
use crate::error::{ProtocolError, ProtocolResult};
use crate::hooks::{invoke_guarded, SseCallbacks};
use crate::router::events::{HilEvent, HilInterrupt, StreamEvent};

/// Lifecycle state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Paused,
    Completed,
    Error,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Error | RunStatus::Cancelled
        )
    }
}

/// One streaming run, keyed by thread id
#[derive(Debug, Clone)]
pub struct ActiveRun {
    pub run_id: String,
    pub thread_id: String,
    pub status: RunStatus,
    pub started_at: Instant,
    pub current_message_id: Option<String>,
    pub active_tool_calls: HashSet<String>,
    /// Checkpoint ids in arrival order
    pub checkpoints: Vec<String>,
    /// Interrupt ids in arrival order
    pub interrupts: Vec<String>,
}

impl ActiveRun {
    fn new(thread_id: &str, run_id: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            thread_id: thread_id.to_string(),
            status: RunStatus::Running,
            started_at: Instant::now(),
            current_message_id: None,
            active_tool_calls: HashSet::new(),
            checkpoints: Vec::new(),
            interrupts: Vec::new(),
        }
    }
}

/// One streaming text message
#[derive(Debug, Clone)]
pub struct ActiveMessage {
    pub message_id: String,
    pub role: MessageRole,
    pub thread_id: Option<String>,
    /// Deltas in arrival order
    pub content_chunks: Vec<String>,
    pub started_at: Instant,
    pub completed: bool,
}

impl ActiveMessage {
    /// Full message text
    pub fn text(&self) -> String {
        self.content_chunks.concat()
    }
}

/// Processor settings
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// How long terminal runs and completed messages are kept
    ///
    /// Also the minimum gap between the sweeps triggered by `run_started`
    /// and `text_message_start`.
    pub retention: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(5 * 60),
        }
    }
}

#[derive(Debug)]
struct ProcessorState {
    runs: HashMap<String, ActiveRun>,
    messages: HashMap<String, ActiveMessage>,
    last_sweep: Instant,
}

impl Default for ProcessorState {
    fn default() -> Self {
        Self {
            runs: HashMap::new(),
            messages: HashMap::new(),
            last_sweep: Instant::now(),
        }
    }
}

impl ProcessorState {
    fn sweep(&mut self, max_age: Duration) -> usize {
        let before = self.runs.len() + self.messages.len();
        self.runs
            .retain(|_, run| !(run.status.is_terminal() && run.started_at.elapsed() >= max_age));
        self.messages
            .retain(|_, msg| !(msg.completed && msg.started_at.elapsed() >= max_age));
        self.last_sweep = Instant::now();
        let removed = before - (self.runs.len() + self.messages.len());
        if removed > 0 {
            log::debug!("Swept {} finished entries", removed);
        }
        removed
    }
}

/// An event the state machine refused; it is logged and not dispatched
#[derive(Debug)]
struct Rejection(String);

/// Tracks runs and messages and re-dispatches standardized events
///
/// State is updated before any handler runs, and handlers are invoked with
/// no lock held, so a handler may query the processor. A panicking handler
/// is logged and skipped.
pub struct AguiEventProcessor {
    config: ProcessorConfig,
    state: Mutex<ProcessorState>,
    handlers: HandlerRegistry,
    legacy: RwLock<Option<SseCallbacks>>,
}

impl Default for AguiEventProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AguiEventProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("AguiEventProcessor")
            .field("config", &self.config)
            .field("runs", &state.runs.len())
            .field("messages", &state.messages.len())
            .field("handlers", &self.handlers)
            .finish()
    }
}

impl AguiEventProcessor {
    pub fn new() -> Self {
        Self::with_config(ProcessorConfig::default())
    }

    pub fn with_config(config: ProcessorConfig) -> Self {
        Self {
            config,
            state: Mutex::new(ProcessorState::default()),
            handlers: HandlerRegistry::new(),
            legacy: RwLock::new(None),
        }
    }

    /// Register a handler for one event type (`run_started` or `onRunStarted`)
    pub fn on(&self, event: &str, handler: impl AguiHandler + 'static) {
        self.handlers.on(event, Arc::new(handler));
    }

    /// Register a handler for every event
    pub fn on_any(&self, handler: impl AguiHandler + 'static) {
        self.handlers.on_any(Arc::new(handler));
    }

    /// Re-emit every processed event in the flat router callback shape
    pub fn set_legacy_bridge(&self, callbacks: SseCallbacks) {
        *self.legacy.write() = Some(callbacks);
    }

    pub fn clear_legacy_bridge(&self) {
        *self.legacy.write() = None;
    }

    /// Decode a JSON event and process it
    ///
    /// Unknown types are accepted and ignored. Returns an error only when a
    /// known type is missing required fields.
    pub fn process_value(&self, value: Value) -> ProtocolResult<bool> {
        let event: AguiEvent = serde_json::from_value(value)?;
        Ok(self.process_event(event))
    }

    /// Update state for `event`, then dispatch it
    ///
    /// Returns `false` when the event was rejected by the lifecycle state
    /// machine (or was of an unknown type) and therefore not dispatched.
    pub fn process_event(&self, event: AguiEvent) -> bool {
        if matches!(event, AguiEvent::Unknown) {
            log::debug!("Ignoring event of unknown type");
            return false;
        }

        let result = {
            let mut state = self.state.lock();
            let opens = matches!(
                event,
                AguiEvent::RunStarted { .. } | AguiEvent::TextMessageStart { .. }
            );
            if opens && state.last_sweep.elapsed() >= self.config.retention {
                state.sweep(self.config.retention);
            }
            apply(&mut state, &event)
        };
        if let Err(Rejection(reason)) = result {
            log::warn!("Rejected {} event: {}", event.event_type(), reason);
            return false;
        }

        for handler in self.handlers.handlers_for(&event) {
            invoke_guarded(event.event_type(), || handler.on_event(&event));
        }

        let legacy = self.legacy.read().clone();
        if let Some(callbacks) = legacy {
            bridge_to_legacy(&event, &callbacks);
        }
        true
    }

    /// Remove terminal runs and completed messages older than `max_age`
    ///
    /// Live runs and open messages are kept regardless of age. Returns the
    /// number of entries removed.
    pub fn cleanup(&self, max_age: Duration) -> usize {
        self.state.lock().sweep(max_age)
    }

    /// [`Self::cleanup`] with the configured retention window
    pub fn cleanup_expired(&self) -> usize {
        self.cleanup(self.config.retention)
    }

    /// Snapshot of the run for `thread_id`
    pub fn active_run(&self, thread_id: &str) -> Option<ActiveRun> {
        self.state.lock().runs.get(thread_id).cloned()
    }

    /// Snapshot of a message
    pub fn active_message(&self, message_id: &str) -> Option<ActiveMessage> {
        self.state.lock().messages.get(message_id).cloned()
    }

    /// Concatenated text of a message
    pub fn message_text(&self, message_id: &str) -> Option<String> {
        self.state.lock().messages.get(message_id).map(ActiveMessage::text)
    }

    pub fn run_count(&self) -> usize {
        self.state.lock().runs.len()
    }

    pub fn message_count(&self) -> usize {
        self.state.lock().messages.len()
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }
}

/// Look up a live (non-terminal) run; a terminal one rejects the event
fn live_run<'a>(
    runs: &'a mut HashMap<String, ActiveRun>,
    thread_id: &str,
) -> Result<Option<&'a mut ActiveRun>, Rejection> {
    match runs.get_mut(thread_id) {
        Some(run) if run.status.is_terminal() => Err(Rejection(format!(
            "run {} for thread {} already {:?}",
            run.run_id, thread_id, run.status
        ))),
        other => Ok(other),
    }
}

fn apply(state: &mut ProcessorState, event: &AguiEvent) -> Result<(), Rejection> {
    match event {
        AguiEvent::RunStarted { thread_id, run_id } => {
            if let Some(existing) = state.runs.get(thread_id) {
                if existing.run_id == *run_id && !existing.status.is_terminal() {
                    return Err(Rejection(format!("run {} already started", run_id)));
                }
                if !existing.status.is_terminal() {
                    log::warn!(
                        "Run {} on thread {} superseded by {}",
                        existing.run_id,
                        thread_id,
                        run_id
                    );
                }
            }
            state
                .runs
                .insert(thread_id.clone(), ActiveRun::new(thread_id, run_id));
        }

        AguiEvent::RunFinished { thread_id, run_id } => {
            finish_run(state, thread_id, Some(run_id), RunStatus::Completed)?;
        }
        AguiEvent::RunError { thread_id, .. } => {
            if let Some(thread_id) = thread_id {
                finish_run(state, thread_id, None, RunStatus::Error)?;
            }
        }
        AguiEvent::RunCancelled { thread_id, .. } => {
            finish_run(state, thread_id, None, RunStatus::Cancelled)?;
        }

        AguiEvent::TextMessageStart {
            message_id,
            role,
            thread_id,
        } => {
            if state.messages.contains_key(message_id) {
                return Err(Rejection(format!(
                    "message {} already started",
                    message_id
                )));
            }
            if let Some(thread_id) = thread_id {
                if let Some(run) = live_run(&mut state.runs, thread_id)? {
                    run.current_message_id = Some(message_id.clone());
                }
            }
            state.messages.insert(
                message_id.clone(),
                ActiveMessage {
                    message_id: message_id.clone(),
                    role: *role,
                    thread_id: thread_id.clone(),
                    content_chunks: Vec::new(),
                    started_at: Instant::now(),
                    completed: false,
                },
            );
        }
        AguiEvent::TextMessageContent { message_id, delta } => match state.messages.get_mut(message_id) {
            Some(msg) if !msg.completed => msg.content_chunks.push(delta.clone()),
            Some(_) => {
                return Err(Rejection(format!(
                    "message {} already completed",
                    message_id
                )))
            }
            None => return Err(Rejection(format!("message {} not started", message_id))),
        },
        AguiEvent::TextMessageEnd { message_id } => {
            match state.messages.get_mut(message_id) {
                Some(msg) if !msg.completed => msg.completed = true,
                Some(_) => {
                    return Err(Rejection(format!(
                        "message {} already completed",
                        message_id
                    )))
                }
                None => {
                    return Err(Rejection(format!("message {} not started", message_id)))
                }
            }
            for run in state.runs.values_mut() {
                if run.current_message_id.as_deref() == Some(message_id.as_str()) {
                    run.current_message_id = None;
                }
            }
        }

        AguiEvent::ToolCallStart {
            tool_call_id,
            parent_message_id,
            thread_id,
            ..
        } => {
            let thread = thread_id.clone().or_else(|| {
                let parent = parent_message_id.as_ref()?;
                state.messages.get(parent)?.thread_id.clone()
            });
            if let Some(thread) = thread {
                if let Some(run) = live_run(&mut state.runs, &thread)? {
                    run.active_tool_calls.insert(tool_call_id.clone());
                }
            }
        }
        AguiEvent::ToolCallEnd { tool_call_id } => {
            for run in state.runs.values_mut() {
                run.active_tool_calls.remove(tool_call_id);
            }
        }

        AguiEvent::HilInterruptDetected {
            thread_id,
            interrupt,
        } => {
            if let Some(run) = live_run(&mut state.runs, thread_id)? {
                run.status = RunStatus::Paused;
                if !run.interrupts.contains(&interrupt.id) {
                    run.interrupts.push(interrupt.id.clone());
                }
            }
        }
        AguiEvent::HilCheckpointCreated {
            thread_id,
            checkpoint,
        } => {
            if let Some(run) = live_run(&mut state.runs, thread_id)? {
                if !run.checkpoints.contains(&checkpoint.checkpoint_id) {
                    run.checkpoints.push(checkpoint.checkpoint_id.clone());
                }
            }
        }
        AguiEvent::HilExecutionResumed { thread_id, .. } => match state.runs.get_mut(thread_id) {
            Some(run) if run.status == RunStatus::Paused => run.status = RunStatus::Running,
            Some(run) => {
                return Err(Rejection(format!(
                    "run {} is {:?}, not paused",
                    run.run_id, run.status
                )))
            }
            None => return Err(Rejection(format!("no run for thread {}", thread_id))),
        },

        _ => {}
    }
    Ok(())
}

fn finish_run(
    state: &mut ProcessorState,
    thread_id: &str,
    run_id: Option<&String>,
    status: RunStatus,
) -> Result<(), Rejection> {
    let Some(run) = live_run(&mut state.runs, thread_id)? else {
        return Err(Rejection(format!("no run for thread {}", thread_id)));
    };
    if let Some(run_id) = run_id {
        if run.run_id != *run_id {
            return Err(Rejection(format!(
                "run {} does not match active run {}",
                run_id, run.run_id
            )));
        }
    }
    run.status = status;
    run.active_tool_calls.clear();
    Ok(())
}

/// Fixed mapping from canonical events to the flat callback shape
fn bridge_to_legacy(event: &AguiEvent, callbacks: &SseCallbacks) {
    let stream = match event {
        AguiEvent::TextMessageStart { message_id, .. } => Some(StreamEvent::StreamStart {
            message_id: message_id.clone(),
        }),
        AguiEvent::TextMessageContent { delta, .. } => Some(StreamEvent::Content(delta.clone())),
        AguiEvent::TextMessageEnd { .. } => Some(StreamEvent::StreamComplete),
        AguiEvent::RunError { message, .. } => Some(StreamEvent::Error(message.clone())),
        AguiEvent::RunCancelled { reason, .. } => Some(StreamEvent::Status(
            reason
                .clone()
                .unwrap_or_else(|| "Run cancelled".to_string()),
        )),
        AguiEvent::ToolCallStart { tool_call_name, .. } => Some(StreamEvent::Status(format!(
            "Calling {}...",
            tool_call_name
        ))),
        AguiEvent::StepStarted { step_name, .. } => Some(StreamEvent::Status(
            crate::router::workflow_label(step_name),
        )),
        AguiEvent::StatusUpdate { message, .. } => Some(StreamEvent::Status(message.clone())),
        AguiEvent::HilExecutionResumed { .. } => {
            Some(StreamEvent::Status("Execution resumed".to_string()))
        }
        _ => None,
    };
    if let Some(stream) = stream {
        callbacks.emit(&stream);
    }

    let hil = match event {
        AguiEvent::HilInterruptDetected {
            thread_id,
            interrupt,
        } => Some(HilEvent::Interrupt(HilInterrupt::from_info(
            interrupt,
            Some(thread_id.clone()),
        ))),
        AguiEvent::HilCheckpointCreated {
            thread_id,
            checkpoint,
        } => Some(HilEvent::Checkpoint {
            thread_id: Some(thread_id.clone()),
            checkpoint: checkpoint.clone(),
        }),
        _ => None,
    };
    if let (Some(hil), Some(handler)) = (hil, callbacks.hil()) {
        invoke_guarded("legacy hil", || handler.on_hil_event(&hil));
    }
}

#[cfg(test)]
#[path = "processor_tests.rs"]
mod tests;
