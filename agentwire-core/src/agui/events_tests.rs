//! Serialization tests for canonical events.
//!
//! These pin the wire contract shared with frontends.

use super::*;
use serde_json::json;

#[test]
fn test_lifecycle_events_serialize_with_snake_case_type() {
    let cases = [
        (
            AguiEvent::RunStarted {
                thread_id: "t1".to_string(),
                run_id: "r1".to_string(),
            },
            "run_started",
        ),
        (
            AguiEvent::RunFinished {
                thread_id: "t1".to_string(),
                run_id: "r1".to_string(),
            },
            "run_finished",
        ),
        (
            AguiEvent::RunError {
                thread_id: None,
                message: "failure".to_string(),
                code: Some("E001".to_string()),
            },
            "run_error",
        ),
        (
            AguiEvent::RunCancelled {
                thread_id: "t1".to_string(),
                reason: None,
            },
            "run_cancelled",
        ),
    ];

    for (event, expected_type) in cases {
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], expected_type, "{:?}", event);
        assert_eq!(event.event_type(), expected_type);
    }
}

#[test]
fn test_optional_fields_are_omitted() {
    let event = AguiEvent::TextMessageStart {
        message_id: "m1".to_string(),
        role: MessageRole::Assistant,
        thread_id: None,
    };
    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(
        value,
        json!({"type": "text_message_start", "message_id": "m1", "role": "assistant"})
    );
}

#[test]
fn test_hil_interrupt_detected_roundtrip_shape() {
    let event: AguiEvent = serde_json::from_value(json!({
        "type": "hil_interrupt_detected",
        "thread_id": "t1",
        "interrupt": {"id": "int-1", "type": "ask_human", "data": {"question": "Go?"}}
    }))
    .unwrap();

    match &event {
        AguiEvent::HilInterruptDetected {
            thread_id,
            interrupt,
        } => {
            assert_eq!(thread_id, "t1");
            assert_eq!(interrupt.id, "int-1");
            assert_eq!(interrupt.interrupt_type, "ask_human");
        }
        other => panic!("Expected HilInterruptDetected, got {:?}", other),
    }
    assert_eq!(event.thread_id(), Some("t1"));
}

#[test]
fn test_unknown_type_deserializes_to_unknown() {
    let event: AguiEvent =
        serde_json::from_value(json!({"type": "totally_unknown_future_event", "x": 1})).unwrap();
    assert_eq!(event, AguiEvent::Unknown);
    assert_eq!(event.event_type(), "unknown");
}

#[test]
fn test_missing_required_field_fails() {
    let result = serde_json::from_value::<AguiEvent>(json!({"type": "run_started", "run_id": "r"}));
    assert!(result.is_err());
}

#[test]
fn test_state_delta_deserialization() {
    let event: AguiEvent = serde_json::from_value(json!({
        "type": "state_delta",
        "delta": [
            {"op": "replace", "path": "/count", "value": 2},
            {"op": "remove", "path": "/stale"}
        ]
    }))
    .unwrap();
    match event {
        AguiEvent::StateDelta { delta } => {
            assert_eq!(delta.len(), 2);
            assert_eq!(delta[0].value, Some(json!(2)));
            assert!(delta[1].value.is_none());
        }
        other => panic!("Expected StateDelta, got {:?}", other),
    }
}

#[test]
fn test_custom_value_defaults_to_null() {
    let event: AguiEvent = serde_json::from_value(json!({"type": "custom", "name": "ping"})).unwrap();
    assert_eq!(
        event,
        AguiEvent::Custom {
            name: "ping".to_string(),
            value: Value::Null
        }
    );
}

#[test]
fn test_handler_name_camel_cases_type() {
    assert_eq!(handler_name("run_started"), "onRunStarted");
    assert_eq!(handler_name("hil_interrupt_detected"), "onHilInterruptDetected");
    assert_eq!(handler_name("custom"), "onCustom");
}

#[test]
fn test_thread_id_accessor() {
    let event = AguiEvent::ToolCallEnd {
        tool_call_id: "tc".to_string(),
    };
    assert_eq!(event.thread_id(), None);

    let event = AguiEvent::StatusUpdate {
        thread_id: Some("t9".to_string()),
        message: "working".to_string(),
    };
    assert_eq!(event.thread_id(), Some("t9"));
}
