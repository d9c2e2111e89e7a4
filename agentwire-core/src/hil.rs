//! Server-issued human-in-the-loop records
//!
//! These records are immutable once received. The client keeps their ids and
//! hands them back to the server; it never reinterprets their payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A pause point that requires human input before execution continues
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterruptInfo {
    /// Interrupt id, echoed back when resuming
    #[serde(default)]
    pub id: String,
    /// Interrupt type (`ask_human`, `authorization`, ...)
    #[serde(rename = "type", default = "default_interrupt_type")]
    pub interrupt_type: String,
    /// When the interrupt was raised
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Type-specific payload
    #[serde(default)]
    pub data: Value,
    /// Human-readable reason, when the server provides one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

fn default_interrupt_type() -> String {
    "unknown".to_string()
}

/// A rollback-capable snapshot of execution state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointInfo {
    /// Checkpoint id
    #[serde(alias = "id")]
    pub checkpoint_id: String,
    /// Graph node the snapshot was taken at
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    /// When the snapshot was taken
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Server-side summary of the captured state
    #[serde(default)]
    pub state_summary: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_interrupt_info_defaults() {
        let info: InterruptInfo = serde_json::from_value(json!({"id": "int-1"})).unwrap();
        assert_eq!(info.id, "int-1");
        assert_eq!(info.interrupt_type, "unknown");
        assert!(info.data.is_null());
        assert!(info.reason.is_none());
    }

    #[test]
    fn test_interrupt_info_ignores_unknown_fields() {
        let info: InterruptInfo = serde_json::from_value(json!({
            "id": "int-2",
            "type": "ask_human",
            "data": {"question": "Proceed?"},
            "reason": "needs confirmation",
            "extra": 42
        }))
        .unwrap();
        assert_eq!(info.interrupt_type, "ask_human");
        assert_eq!(info.data["question"], "Proceed?");
        assert_eq!(info.reason.as_deref(), Some("needs confirmation"));
    }

    #[test]
    fn test_checkpoint_accepts_id_alias() {
        let cp: CheckpointInfo =
            serde_json::from_value(json!({"id": "cp-9", "node": "call_tool"})).unwrap();
        assert_eq!(cp.checkpoint_id, "cp-9");
        assert_eq!(cp.node.as_deref(), Some("call_tool"));
    }
}
