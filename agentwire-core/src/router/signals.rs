//! Handlers for the explicit `hil_*` event family.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use super::events::{
    HilEvent, HilInterrupt, HilRequest, HilStatusUpdate, InterruptKind, InterruptSource,
    RawEvent, StreamEvent,
};
use super::interrupt::{describe, generate_interrupt_id, timestamp_or_now};
use super::Emitter;
use crate::error::ProtocolError;
use crate::hil::CheckpointInfo;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InterruptPayload {
    #[serde(alias = "interrupt_id")]
    id: Option<String>,
    #[serde(rename = "type", alias = "interrupt_type")]
    kind: Option<String>,
    title: Option<String>,
    message: Option<String>,
    thread_id: Option<String>,
    question: Option<String>,
    data: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CheckpointPayload {
    #[serde(alias = "id")]
    checkpoint_id: Option<String>,
    node: Option<String>,
    thread_id: Option<String>,
    timestamp: Option<String>,
    state_summary: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StatusPayload {
    thread_id: Option<String>,
    status: Option<String>,
    current_node: Option<String>,
    interrupts: Value,
    checkpoints: Value,
    durable: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RequestPayload {
    #[serde(alias = "request_id", alias = "interrupt_id")]
    id: Option<String>,
    thread_id: Option<String>,
    title: Option<String>,
    #[serde(alias = "description", alias = "prompt")]
    message: Option<String>,
    data: Value,
}

/// Which human decision a `hil_*_required` event asks for
#[derive(Debug, Clone, Copy)]
pub(super) enum RequestKind {
    Approval,
    Review,
    Input,
}

impl RequestKind {
    fn defaults(self) -> (&'static str, &'static str) {
        match self {
            RequestKind::Approval => (
                "Approval required",
                "Please approve or reject the pending action.",
            ),
            RequestKind::Review => ("Review required", "Please review the proposed content."),
            RequestKind::Input => ("Input required", "Please provide the requested input."),
        }
    }
}

fn payload(event: &RawEvent) -> Value {
    match &event.data {
        Some(v @ Value::Object(_)) => v.clone(),
        _ => Value::Object(event.extra.clone()),
    }
}

fn decode<T: DeserializeOwned>(event: &RawEvent, emit: &Emitter<'_>) -> Option<T> {
    match serde_json::from_value::<T>(payload(event)) {
        Ok(p) => Some(p),
        Err(e) => {
            emit.stream(StreamEvent::Error(
                ProtocolError::shape(&event.event_type, e.to_string()).to_string(),
            ));
            None
        }
    }
}

pub(super) fn handle_interrupt(event: &RawEvent, emit: &Emitter<'_>) -> bool {
    let Some(p) = decode::<InterruptPayload>(event, emit) else {
        return false;
    };

    let kind = p
        .kind
        .as_deref()
        .map(InterruptKind::from_type)
        .unwrap_or_else(|| InterruptKind::Other("unknown".to_string()));
    let described_payload = serde_json::json!({ "message": p.message });
    let (default_title, message) = describe(&kind, &described_payload, p.question.as_deref());
    let title = p.title.unwrap_or(default_title);

    emit.status(format!("Execution paused: {}", title));
    emit.hil(HilEvent::Interrupt(HilInterrupt {
        id: p.id.unwrap_or_else(generate_interrupt_id),
        kind,
        title,
        message,
        thread_id: p.thread_id,
        question: p.question,
        timestamp: timestamp_or_now(event),
        data: p.data,
        source: InterruptSource::Explicit,
    }));
    true
}

pub(super) fn handle_checkpoint(event: &RawEvent, emit: &Emitter<'_>) -> bool {
    let Some(p) = decode::<CheckpointPayload>(event, emit) else {
        return false;
    };
    let Some(checkpoint_id) = p.checkpoint_id else {
        emit.stream(StreamEvent::Error(
            ProtocolError::shape(&event.event_type, "missing checkpoint_id").to_string(),
        ));
        return false;
    };

    emit.status(match &p.node {
        Some(node) => format!("Checkpoint saved at {}", node),
        None => "Checkpoint saved".to_string(),
    });
    emit.hil(HilEvent::Checkpoint {
        thread_id: p.thread_id,
        checkpoint: CheckpointInfo {
            checkpoint_id,
            node: p.node,
            timestamp: p.timestamp.or_else(|| Some(timestamp_or_now(event))),
            state_summary: p.state_summary,
        },
    });
    true
}

pub(super) fn handle_status(event: &RawEvent, emit: &Emitter<'_>) -> bool {
    let Some(p) = decode::<StatusPayload>(event, emit) else {
        return false;
    };
    let Some(status) = p.status else {
        emit.stream(StreamEvent::Error(
            ProtocolError::shape(&event.event_type, "missing status").to_string(),
        ));
        return false;
    };

    emit.status(format!("Execution status: {}", status));
    emit.hil(HilEvent::Status(HilStatusUpdate {
        thread_id: p.thread_id,
        status,
        current_node: p.current_node,
        interrupt_count: count(&p.interrupts),
        checkpoint_count: count(&p.checkpoints),
        // Absent means durable.
        durable: p.durable != Some(false),
    }));
    true
}

pub(super) fn handle_request(event: &RawEvent, kind: RequestKind, emit: &Emitter<'_>) -> bool {
    let Some(p) = decode::<RequestPayload>(event, emit) else {
        return false;
    };
    let (default_title, default_message) = kind.defaults();
    let title = p.title.unwrap_or_else(|| default_title.to_string());
    let data = if p.data.is_null() {
        payload(event)
    } else {
        p.data
    };

    let request = HilRequest {
        id: p.id.unwrap_or_else(generate_interrupt_id),
        thread_id: p.thread_id,
        message: p.message.unwrap_or_else(|| default_message.to_string()),
        timestamp: timestamp_or_now(event),
        title,
        data,
    };

    let prefix = match kind {
        RequestKind::Approval => "Approval required",
        RequestKind::Review => "Review required",
        RequestKind::Input => "Input required",
    };
    emit.status(format!("{}: {}", prefix, request.title));
    emit.hil(match kind {
        RequestKind::Approval => HilEvent::ApprovalRequired(request),
        RequestKind::Review => HilEvent::ReviewRequired(request),
        RequestKind::Input => HilEvent::InputRequired(request),
    });
    true
}

fn count(value: &Value) -> usize {
    match value {
        Value::Array(items) => items.len(),
        Value::Number(n) => n.as_u64().unwrap_or(0) as usize,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    #[test]
    fn test_count_accepts_lists_and_numbers() {
        assert_eq!(count(&serde_json::json!([1, 2, 3])), 3);
        assert_eq!(count(&serde_json::json!(4)), 4);
        assert_eq!(count(&Value::Null), 0);
    }

    #[test]
    fn test_payload_falls_back_to_envelope_fields() {
        let mut extra = Map::new();
        extra.insert("status".to_string(), Value::String("running".to_string()));
        let event = RawEvent {
            extra,
            ..RawEvent::new("hil_status")
        };
        assert_eq!(payload(&event)["status"], "running");
    }
}
