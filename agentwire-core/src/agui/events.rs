//! Canonical AG-UI event types.
//!
//! Every raw or legacy event shape is normalized into one of these. Events
//! are serialized with a snake_case `type` tag; a tag this crate does not
//! know deserializes to [`AguiEvent::Unknown`] instead of failing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::hil::{CheckpointInfo, InterruptInfo};

/// Canonical agent events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AguiEvent {
    // ===== Lifecycle Events =====
    /// Agent run started.
    RunStarted {
        /// Conversation thread the run belongs to.
        thread_id: String,
        /// Unique run ID for this execution.
        run_id: String,
    },

    /// Agent run finished successfully.
    RunFinished { thread_id: String, run_id: String },

    /// Agent run failed with an error.
    RunError {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        thread_id: Option<String>,
        /// Error message describing the failure.
        message: String,
        /// Optional error code.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },

    /// Agent run was cancelled before finishing.
    RunCancelled {
        thread_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    // ===== Text Message Events =====
    /// Start of a new text message.
    TextMessageStart {
        message_id: String,
        role: MessageRole,
        /// Thread whose run this message belongs to.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        thread_id: Option<String>,
    },

    /// Incremental content for a text message.
    TextMessageContent {
        message_id: String,
        /// Text delta to append.
        delta: String,
    },

    /// End of a text message.
    TextMessageEnd { message_id: String },

    // ===== Tool Call Events =====
    /// Start of a tool call.
    ToolCallStart {
        tool_call_id: String,
        tool_call_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_message_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        thread_id: Option<String>,
    },

    /// Incremental arguments for a tool call.
    ToolCallArgs {
        tool_call_id: String,
        /// JSON argument delta.
        delta: String,
    },

    /// End of tool call arguments.
    ToolCallEnd { tool_call_id: String },

    /// Result from a tool call.
    ToolCallResult {
        message_id: String,
        tool_call_id: String,
        /// Result content (text or JSON string).
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<MessageRole>,
    },

    // ===== Human-in-the-Loop Events =====
    /// Execution paused for human input.
    HilInterruptDetected {
        thread_id: String,
        interrupt: InterruptInfo,
    },

    /// A rollback-capable checkpoint was saved.
    HilCheckpointCreated {
        thread_id: String,
        checkpoint: CheckpointInfo,
    },

    /// A paused run continued after human input.
    HilExecutionResumed {
        thread_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        interrupt_id: Option<String>,
    },

    // ===== Step Events =====
    StepStarted {
        step_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        thread_id: Option<String>,
    },

    StepFinished {
        step_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        thread_id: Option<String>,
    },

    // ===== State Management Events =====
    /// Complete state snapshot.
    StateSnapshot { snapshot: Value },

    /// Incremental state update (JSON Patch).
    StateDelta {
        /// JSON Patch operations (RFC 6902).
        delta: Vec<JsonPatchOp>,
    },

    // ===== Misc =====
    /// Human-readable progress line.
    StatusUpdate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        thread_id: Option<String>,
        message: String,
    },

    /// Application-defined event.
    Custom {
        name: String,
        #[serde(default)]
        value: Value,
    },

    /// An event type this crate does not know.
    #[serde(other)]
    Unknown,
}

impl AguiEvent {
    /// The snake_case `type` tag of this event
    pub fn event_type(&self) -> &'static str {
        match self {
            AguiEvent::RunStarted { .. } => "run_started",
            AguiEvent::RunFinished { .. } => "run_finished",
            AguiEvent::RunError { .. } => "run_error",
            AguiEvent::RunCancelled { .. } => "run_cancelled",
            AguiEvent::TextMessageStart { .. } => "text_message_start",
            AguiEvent::TextMessageContent { .. } => "text_message_content",
            AguiEvent::TextMessageEnd { .. } => "text_message_end",
            AguiEvent::ToolCallStart { .. } => "tool_call_start",
            AguiEvent::ToolCallArgs { .. } => "tool_call_args",
            AguiEvent::ToolCallEnd { .. } => "tool_call_end",
            AguiEvent::ToolCallResult { .. } => "tool_call_result",
            AguiEvent::HilInterruptDetected { .. } => "hil_interrupt_detected",
            AguiEvent::HilCheckpointCreated { .. } => "hil_checkpoint_created",
            AguiEvent::HilExecutionResumed { .. } => "hil_execution_resumed",
            AguiEvent::StepStarted { .. } => "step_started",
            AguiEvent::StepFinished { .. } => "step_finished",
            AguiEvent::StateSnapshot { .. } => "state_snapshot",
            AguiEvent::StateDelta { .. } => "state_delta",
            AguiEvent::StatusUpdate { .. } => "status_update",
            AguiEvent::Custom { .. } => "custom",
            AguiEvent::Unknown => "unknown",
        }
    }

    /// Thread the event names directly, if any
    pub fn thread_id(&self) -> Option<&str> {
        match self {
            AguiEvent::RunStarted { thread_id, .. }
            | AguiEvent::RunFinished { thread_id, .. }
            | AguiEvent::RunCancelled { thread_id, .. }
            | AguiEvent::HilInterruptDetected { thread_id, .. }
            | AguiEvent::HilCheckpointCreated { thread_id, .. }
            | AguiEvent::HilExecutionResumed { thread_id, .. } => Some(thread_id),
            AguiEvent::RunError { thread_id, .. }
            | AguiEvent::TextMessageStart { thread_id, .. }
            | AguiEvent::ToolCallStart { thread_id, .. }
            | AguiEvent::StepStarted { thread_id, .. }
            | AguiEvent::StepFinished { thread_id, .. }
            | AguiEvent::StatusUpdate { thread_id, .. } => thread_id.as_deref(),
            _ => None,
        }
    }
}

/// Handler method name for an event type, `run_started` -> `onRunStarted`
pub fn handler_name(event_type: &str) -> String {
    let mut name = String::from("on");
    for part in event_type.split('_').filter(|p| !p.is_empty()) {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            name.extend(first.to_uppercase());
            name.push_str(chars.as_str());
        }
    }
    name
}

/// Message author role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
    Tool,
}

/// JSON Patch operation (RFC 6902).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonPatchOp {
    /// Operation type (add, remove, replace, move, copy, test).
    pub op: String,
    /// JSON Pointer path.
    pub path: String,
    /// Value for add/replace operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
