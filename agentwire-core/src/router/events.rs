//! Raw envelopes and the flat event shapes the router emits.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::interrupt::describe;
use crate::hil::{CheckpointInfo, InterruptInfo};

/// A parsed frame payload
///
/// The envelope is open: fields beyond the common ones land in `extra` and
/// are never rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Event type discriminator
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Type-specific fields outside the common envelope
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RawEvent {
    /// Create an envelope with only a type
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            ..Default::default()
        }
    }

    /// Look a field up in `data`, then among the envelope's extra fields
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data
            .as_ref()
            .and_then(|d| d.get(name))
            .or_else(|| self.extra.get(name))
    }

    /// String form of a field found by [`Self::field`]
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(Value::as_str)
    }

    /// `content` when it is a plain string
    pub fn content_str(&self) -> Option<&str> {
        self.content.as_ref().and_then(Value::as_str)
    }

    /// Structured body of the event
    ///
    /// Prefers an object `content`, then a `content` string holding JSON,
    /// then `data`.
    pub fn body(&self) -> Option<Value> {
        match &self.content {
            Some(Value::Object(_)) => self.content.clone(),
            Some(Value::String(s)) => match serde_json::from_str::<Value>(s) {
                Ok(v @ Value::Object(_)) => Some(v),
                _ => self.data.clone(),
            },
            _ => self.data.clone(),
        }
    }
}

/// Events delivered to a [`crate::StreamHook`]
///
/// This is the flat, legacy callback shape: each variant corresponds to one
/// `on*` callback of the original client API.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A new assistant response began
    StreamStart { message_id: String },
    /// Primary response text to append
    Content(String),
    /// Human-readable progress line
    Status(String),
    /// The backend signalled the response is complete
    StreamComplete,
    /// The transport ended, via `[DONE]` or connection close
    StreamEnded { done_received: bool },
    /// A frame could not be processed
    Error(String),
    /// Credit balance changed
    Billing(BillingUpdate),
    /// The billing payload carried an error instead of a balance
    BillingError(String),
    /// A tool reported step-level progress
    TaskProgress(TaskProgress),
    /// The planned task list changed
    TaskList(Vec<TaskItem>),
    /// One task finished
    TaskCompleted(TaskCompletion),
    /// One task changed state
    TaskStatus { task_index: usize, status: TaskState },
    /// Something worth rendering was found inside the text
    Artifact(Artifact),
}

/// Billing snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingUpdate {
    pub credits_remaining: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credits_used: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// State of a task in a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl TaskState {
    /// Parse the loose status strings the backend uses
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pending" | "waiting" | "todo" => Some(TaskState::Pending),
            "in_progress" | "running" | "active" | "started" => Some(TaskState::InProgress),
            "completed" | "complete" | "done" | "success" => Some(TaskState::Completed),
            "failed" | "error" => Some(TaskState::Failed),
            _ => None,
        }
    }
}

/// One entry in a task list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskItem {
    pub index: usize,
    pub title: String,
    pub status: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
}

/// Step-level progress of a running tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskProgress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// 1-based step currently executing
    pub current_step: usize,
    pub total_steps: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub tasks: Vec<TaskItem>,
}

/// Notification that a task finished
#[derive(Debug, Clone, PartialEq)]
pub struct TaskCompletion {
    pub task_index: Option<usize>,
    pub title: Option<String>,
    pub result: Option<Value>,
}

/// Content sniffed out of free text
#[derive(Debug, Clone, PartialEq)]
pub enum Artifact {
    /// Markdown image reference
    Image { url: String, alt: String },
    /// Inline JSON object
    Json(Value),
}

/// Kind of human intervention requested
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterruptKind {
    AskHuman,
    Authorization,
    Approval,
    Review,
    Input,
    Other(String),
}

impl InterruptKind {
    pub fn from_type(t: &str) -> Self {
        match t {
            "ask_human" => InterruptKind::AskHuman,
            "authorization" => InterruptKind::Authorization,
            "approval" => InterruptKind::Approval,
            "review" => InterruptKind::Review,
            "input" => InterruptKind::Input,
            other => InterruptKind::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            InterruptKind::AskHuman => "ask_human",
            InterruptKind::Authorization => "authorization",
            InterruptKind::Approval => "approval",
            InterruptKind::Review => "review",
            InterruptKind::Input => "input",
            InterruptKind::Other(t) => t,
        }
    }
}

/// Which encoding an interrupt was recognised from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptSource {
    /// `graph_update` `data.__interrupt__`
    Structured,
    /// `ask_human` tool call inside a `graph_update` node
    GraphToolCall,
    /// `ask_human` tool call inside a `message_stream` debug string
    MessageStream,
    /// Explicit `hil_interrupt` event
    Explicit,
}

/// Normalized interrupt, whatever encoding it arrived in
#[derive(Debug, Clone, PartialEq)]
pub struct HilInterrupt {
    pub id: String,
    pub kind: InterruptKind,
    pub title: String,
    pub message: String,
    pub thread_id: Option<String>,
    pub question: Option<String>,
    pub timestamp: String,
    pub data: Value,
    pub source: InterruptSource,
}

impl HilInterrupt {
    /// Build from a server interrupt record
    pub fn from_info(info: &InterruptInfo, thread_id: Option<String>) -> Self {
        let kind = InterruptKind::from_type(&info.interrupt_type);
        let question = info
            .data
            .get("question")
            .and_then(Value::as_str)
            .map(str::to_string);
        let mut described = info.data.clone();
        if let (Some(reason), Value::Object(map)) = (&info.reason, &mut described) {
            map.entry("message")
                .or_insert_with(|| Value::String(reason.clone()));
        }
        let (title, message) = describe(&kind, &described, question.as_deref());
        Self {
            id: info.id.clone(),
            kind,
            title,
            message,
            thread_id,
            question,
            timestamp: info
                .timestamp
                .clone()
                .unwrap_or_else(|| chrono::Utc::now().to_rfc3339()),
            data: info.data.clone(),
            source: InterruptSource::Explicit,
        }
    }

    /// Convert to the server record shape used by the standardizer
    pub fn to_info(&self) -> InterruptInfo {
        InterruptInfo {
            id: self.id.clone(),
            interrupt_type: self.kind.as_str().to_string(),
            timestamp: Some(self.timestamp.clone()),
            data: self.data.clone(),
            reason: Some(self.message.clone()),
        }
    }
}

/// HIL execution status pushed in-band
#[derive(Debug, Clone, PartialEq)]
pub struct HilStatusUpdate {
    pub thread_id: Option<String>,
    pub status: String,
    pub current_node: Option<String>,
    pub interrupt_count: usize,
    pub checkpoint_count: usize,
    pub durable: bool,
}

/// Request for a human decision (approval, review or free input)
#[derive(Debug, Clone, PartialEq)]
pub struct HilRequest {
    pub id: String,
    pub thread_id: Option<String>,
    pub title: String,
    pub message: String,
    pub timestamp: String,
    pub data: Value,
}

impl HilRequest {
    /// Server record shape, tagged with the request type
    pub fn to_info(&self, interrupt_type: &str) -> InterruptInfo {
        InterruptInfo {
            id: self.id.clone(),
            interrupt_type: interrupt_type.to_string(),
            timestamp: Some(self.timestamp.clone()),
            data: self.data.clone(),
            reason: Some(self.message.clone()),
        }
    }
}

/// Events delivered to a [`crate::HilHandler`]
#[derive(Debug, Clone, PartialEq)]
pub enum HilEvent {
    Interrupt(HilInterrupt),
    Checkpoint {
        thread_id: Option<String>,
        checkpoint: CheckpointInfo,
    },
    Status(HilStatusUpdate),
    ApprovalRequired(HilRequest),
    ReviewRequired(HilRequest),
    InputRequired(HilRequest),
}
