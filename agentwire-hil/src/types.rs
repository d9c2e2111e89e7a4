//! Request and response records of the execution control API

use agentwire_core::{CheckpointInfo, InterruptInfo};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// Status
// ============================================================================

/// Server-side execution state of a thread
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionState {
    Ready,
    Running,
    Interrupted,
    Completed,
    Error,
    /// Any state this client does not know about, or none at all
    #[default]
    #[serde(other)]
    Unknown,
}

impl ExecutionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionState::Ready => "ready",
            ExecutionState::Running => "running",
            ExecutionState::Interrupted => "interrupted",
            ExecutionState::Completed => "completed",
            ExecutionState::Error => "error",
            ExecutionState::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot returned by `GET /api/execution/status/{thread_id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStatus {
    /// Filled in from the request path when the body leaves it out
    #[serde(default)]
    pub thread_id: String,
    #[serde(default)]
    pub status: ExecutionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_node: Option<String>,
    #[serde(default)]
    pub interrupts: Vec<InterruptInfo>,
    /// Number of checkpoints available for rollback
    #[serde(default)]
    pub checkpoints: usize,
    /// Absent means durable
    #[serde(default = "default_durable")]
    pub durable: bool,
}

fn default_durable() -> bool {
    true
}

impl ExecutionStatus {
    /// A status with no node, interrupts or checkpoints
    pub fn new(thread_id: impl Into<String>, status: ExecutionState) -> Self {
        Self {
            thread_id: thread_id.into(),
            status,
            current_node: None,
            interrupts: Vec::new(),
            checkpoints: 0,
            durable: true,
        }
    }
}

/// Status record handed to monitor callbacks
#[derive(Debug, Clone, PartialEq)]
pub struct HilExecutionStatusData {
    pub thread_id: String,
    pub status: ExecutionState,
    pub current_node: Option<String>,
    pub interrupt_count: usize,
    pub checkpoint_count: usize,
    pub durable: bool,
    pub is_interrupted: bool,
    pub is_running: bool,
    pub is_completed: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<&ExecutionStatus> for HilExecutionStatusData {
    fn from(status: &ExecutionStatus) -> Self {
        Self {
            thread_id: status.thread_id.clone(),
            status: status.status,
            current_node: status.current_node.clone(),
            interrupt_count: status.interrupts.len(),
            checkpoint_count: status.checkpoints,
            durable: status.durable,
            is_interrupted: status.status == ExecutionState::Interrupted,
            is_running: status.status == ExecutionState::Running,
            is_completed: status.status == ExecutionState::Completed,
            updated_at: Utc::now(),
        }
    }
}

/// `GET /api/execution/health`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionHealth {
    pub status: String,
    #[serde(default)]
    pub durable_execution: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ExecutionHealth {
    pub fn is_healthy(&self) -> bool {
        matches!(self.status.as_str(), "healthy" | "ok")
    }
}

// ============================================================================
// History and rollback
// ============================================================================

/// `GET /api/execution/history/{thread_id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionHistory {
    pub thread_id: String,
    #[serde(default)]
    pub checkpoints: Vec<CheckpointInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
}

/// Outcome of a rollback request
///
/// A rollback the server refused with 404 or 409 is a result with
/// `success == false`, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackResult {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_id: Option<String>,
}

// ============================================================================
// Resume
// ============================================================================

/// What to do with the interrupted execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResumeAction {
    Continue,
    Skip,
    Modify,
    Pause,
    Reject,
}

/// Payload resolving an interrupt
///
/// Which field is meaningful depends on the interrupt type; use the
/// constructors for the common cases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResumeData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_content: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ResumeData {
    pub fn approval(approved: bool) -> Self {
        Self {
            approved: Some(approved),
            ..Default::default()
        }
    }

    /// Free-text answer to an `ask_human` question
    pub fn answer(answer: impl Into<String>) -> Self {
        Self {
            answer: Some(answer.into()),
            ..Default::default()
        }
    }

    pub fn authorization(token: impl Into<String>) -> Self {
        Self {
            authorization: Some(token.into()),
            ..Default::default()
        }
    }

    pub fn edited(content: Value) -> Self {
        Self {
            edited_content: Some(content),
            ..Default::default()
        }
    }

    pub fn validation(valid: bool) -> Self {
        Self {
            valid: Some(valid),
            ..Default::default()
        }
    }
}

/// Body of `POST /api/execution/resume` and `/resume-stream`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeRequest {
    pub thread_id: String,
    pub action: ResumeAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupt_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_data: Option<ResumeData>,
}

impl ResumeRequest {
    pub fn new(thread_id: impl Into<String>, action: ResumeAction) -> Self {
        Self {
            thread_id: thread_id.into(),
            action,
            interrupt_id: None,
            resume_data: None,
        }
    }

    /// Resolve a specific interrupt
    pub fn interrupt(mut self, interrupt_id: impl Into<String>) -> Self {
        self.interrupt_id = Some(interrupt_id.into());
        self
    }

    pub fn data(mut self, data: ResumeData) -> Self {
        self.resume_data = Some(data);
        self
    }
}

/// Response of a non-streaming resume
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeResult {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ExecutionState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_defaults() {
        let status: ExecutionStatus =
            serde_json::from_value(json!({"thread_id": "t", "status": "running"})).unwrap();
        assert_eq!(status.status, ExecutionState::Running);
        assert!(status.durable);
        assert!(status.interrupts.is_empty());
        assert_eq!(status.checkpoints, 0);
    }

    #[test]
    fn test_explicit_non_durable() {
        let status: ExecutionStatus = serde_json::from_value(
            json!({"thread_id": "t", "status": "ready", "durable": false}),
        )
        .unwrap();
        assert!(!status.durable);
    }

    #[test]
    fn test_status_missing_fields_default() {
        let status: ExecutionStatus =
            serde_json::from_value(json!({"status": "running"})).unwrap();
        assert_eq!(status.thread_id, "");
        assert_eq!(status.status, ExecutionState::Running);

        let status: ExecutionStatus = serde_json::from_value(json!({"thread_id": "t"})).unwrap();
        assert_eq!(status.status, ExecutionState::Unknown);
    }

    #[test]
    fn test_unknown_state() {
        let status: ExecutionStatus =
            serde_json::from_value(json!({"thread_id": "t", "status": "hibernating"})).unwrap();
        assert_eq!(status.status, ExecutionState::Unknown);
    }

    #[test]
    fn test_status_data_flags() {
        let mut status = ExecutionStatus::new("t", ExecutionState::Interrupted);
        status.interrupts.push(InterruptInfo {
            id: "i".to_string(),
            interrupt_type: "ask_human".to_string(),
            timestamp: None,
            data: Value::Null,
            reason: None,
        });
        status.checkpoints = 4;

        let data = HilExecutionStatusData::from(&status);
        assert!(data.is_interrupted);
        assert!(!data.is_running);
        assert_eq!(data.interrupt_count, 1);
        assert_eq!(data.checkpoint_count, 4);
    }

    #[test]
    fn test_resume_request_serialization() {
        let request = ResumeRequest::new("t-1", ResumeAction::Continue)
            .interrupt("int-1")
            .data(ResumeData::answer("us-east-1"));
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "thread_id": "t-1",
                "action": "continue",
                "interrupt_id": "int-1",
                "resume_data": {"answer": "us-east-1"}
            })
        );

        let bare = ResumeRequest::new("t-1", ResumeAction::Reject);
        assert_eq!(
            serde_json::to_value(&bare).unwrap(),
            json!({"thread_id": "t-1", "action": "reject"})
        );
    }

    #[test]
    fn test_resume_data_helpers() {
        assert_eq!(
            serde_json::to_value(ResumeData::approval(true)).unwrap(),
            json!({"approved": true})
        );
        assert_eq!(
            serde_json::to_value(ResumeData::authorization("tok")).unwrap(),
            json!({"authorization": "tok"})
        );
        assert_eq!(
            serde_json::to_value(ResumeData::edited(json!({"x": 1}))).unwrap(),
            json!({"edited_content": {"x": 1}})
        );
        assert_eq!(
            serde_json::to_value(ResumeData::validation(false)).unwrap(),
            json!({"valid": false})
        );
    }

    #[test]
    fn test_history_accepts_id_alias() {
        let history: ExecutionHistory = serde_json::from_value(json!({
            "thread_id": "t",
            "checkpoints": [{"id": "cp-1", "node": "agent"}]
        }))
        .unwrap();
        assert_eq!(history.checkpoints[0].checkpoint_id, "cp-1");
        assert_eq!(history.total, None);
    }

    #[test]
    fn test_health() {
        let health: ExecutionHealth =
            serde_json::from_value(json!({"status": "healthy", "uptime": 12})).unwrap();
        assert!(health.is_healthy());
        assert!(!health.durable_execution);
        assert_eq!(health.extra["uptime"], 12);
    }
}
