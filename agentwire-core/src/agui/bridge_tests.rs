//! Tests for router output to canonical event conversion.

use super::*;
use crate::agui::processor::RunStatus;
use crate::router::events::{
    BillingUpdate, HilInterrupt, HilRequest, InterruptKind, InterruptSource,
};
use crate::router::SseParser;

fn hook() -> (Arc<AguiEventProcessor>, Arc<StandardizingHook>) {
    let processor = Arc::new(AguiEventProcessor::new());
    let hook = Arc::new(StandardizingHook::new(
        processor.clone(),
        "thread-1".to_string(),
        "run-1".to_string(),
    ));
    (processor, hook)
}

fn types(events: &[AguiEvent]) -> Vec<&'static str> {
    events.iter().map(AguiEvent::event_type).collect()
}

#[test]
fn test_router_scenario_produces_well_formed_run() {
    let (processor, hook) = hook();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    processor.on_any(move |e: &AguiEvent| sink.lock().push(e.clone()));

    let parser = SseParser::new();
    let callbacks = hook.callbacks();
    for frame in [
        r#"{"type":"start","message_id":"m-1"}"#,
        r#"{"type":"custom_event","metadata":{"raw_chunk":{"response_batch":{"status":"streaming","tokens":"Hi","start_index":0,"count":2,"total_index":2}}}}"#,
        r#"{"type":"custom_event","metadata":{"raw_chunk":{"response_token":{"status":"completed"}}}}"#,
    ] {
        parser.parse(frame, &callbacks);
    }

    let events = seen.lock().clone();
    assert_eq!(
        types(&events),
        vec![
            "run_started",
            "text_message_start",
            "text_message_content",
            "status_update",
            "text_message_end",
            "run_finished",
        ]
    );
    assert_eq!(processor.message_text("m-1").as_deref(), Some("Hi"));
    assert_eq!(
        processor.active_run("thread-1").unwrap().status,
        RunStatus::Completed
    );
}

#[test]
fn test_content_without_start_synthesizes_message() {
    let (_, hook) = hook();
    let events = hook.convert_stream_event(&StreamEvent::Content("x".to_string()));
    assert_eq!(
        types(&events),
        vec!["run_started", "text_message_start", "text_message_content"]
    );

    // The same message continues.
    let events = hook.convert_stream_event(&StreamEvent::Content("y".to_string()));
    assert_eq!(types(&events), vec!["text_message_content"]);
}

#[test]
fn test_second_start_closes_previous_message() {
    let (_, hook) = hook();
    hook.convert_stream_event(&StreamEvent::StreamStart {
        message_id: "a".to_string(),
    });
    let events = hook.convert_stream_event(&StreamEvent::StreamStart {
        message_id: "b".to_string(),
    });
    assert_eq!(events[0], AguiEvent::TextMessageEnd { message_id: "a".to_string() });
    assert!(matches!(
        &events[1],
        AguiEvent::TextMessageStart { message_id, .. } if message_id == "b"
    ));
}

#[test]
fn test_stream_ended_after_complete_is_noop() {
    let (_, hook) = hook();
    hook.convert_stream_event(&StreamEvent::StreamStart {
        message_id: "a".to_string(),
    });
    let done = hook.convert_stream_event(&StreamEvent::StreamComplete);
    assert_eq!(types(&done), vec!["text_message_end", "run_finished"]);

    let ended = hook.convert_stream_event(&StreamEvent::StreamEnded { done_received: true });
    assert!(ended.is_empty());
}

#[test]
fn test_stream_closed_without_complete_finishes_run() {
    let (_, hook) = hook();
    hook.convert_stream_event(&StreamEvent::Content("partial".to_string()));
    let ended = hook.convert_stream_event(&StreamEvent::StreamEnded {
        done_received: false,
    });
    assert_eq!(types(&ended), vec!["text_message_end", "run_finished"]);
}

#[test]
fn test_frame_error_keeps_run_open() {
    let (processor, hook) = hook();
    hook.on_event(&StreamEvent::StreamStart {
        message_id: "m".to_string(),
    });
    hook.on_event(&StreamEvent::Error("bad frame".to_string()));
    hook.on_event(&StreamEvent::Content("still here".to_string()));

    assert_eq!(
        processor.active_run("thread-1").unwrap().status,
        RunStatus::Running
    );
    assert_eq!(processor.message_text("m").as_deref(), Some("still here"));
}

#[test]
fn test_side_channel_events_become_custom() {
    let (_, hook) = hook();
    let events = hook.convert_stream_event(&StreamEvent::Billing(BillingUpdate {
        credits_remaining: 5.0,
        credits_used: None,
        model: None,
    }));
    match &events[0] {
        AguiEvent::Custom { name, value } => {
            assert_eq!(name, "billing");
            assert_eq!(value["credits_remaining"], 5.0);
        }
        other => panic!("Expected Custom, got {:?}", other),
    }

    let events = hook.convert_stream_event(&StreamEvent::Artifact(Artifact::Image {
        url: "https://img/x.png".to_string(),
        alt: "x".to_string(),
    }));
    assert!(matches!(
        &events[0],
        AguiEvent::Custom { name, value } if name == "artifact" && value["kind"] == "image"
    ));
}

#[test]
fn test_interrupt_pauses_run() {
    let (processor, hook) = hook();
    hook.on_event(&StreamEvent::StreamStart {
        message_id: "m".to_string(),
    });
    hook.on_hil_event(&HilEvent::Interrupt(HilInterrupt {
        id: "int-1".to_string(),
        kind: InterruptKind::AskHuman,
        title: "Agent needs your input".to_string(),
        message: "Which region?".to_string(),
        thread_id: None,
        question: Some("Which region?".to_string()),
        timestamp: "2024-01-01T00:00:00Z".to_string(),
        data: serde_json::json!({"question": "Which region?"}),
        source: InterruptSource::Structured,
    }));

    let run = processor.active_run("thread-1").unwrap();
    assert_eq!(run.status, RunStatus::Paused);
    assert_eq!(run.interrupts, vec!["int-1"]);
}

#[test]
fn test_requests_map_to_interrupts_with_type() {
    let (_, hook) = hook();
    let request = HilRequest {
        id: "r-1".to_string(),
        thread_id: Some("other-thread".to_string()),
        title: "Approval required".to_string(),
        message: "Ship it?".to_string(),
        timestamp: "2024-01-01T00:00:00Z".to_string(),
        data: Value::Null,
    };
    let events = hook.convert_hil_event(&HilEvent::ApprovalRequired(request));
    match &events[0] {
        AguiEvent::HilInterruptDetected {
            thread_id,
            interrupt,
        } => {
            assert_eq!(thread_id, "other-thread");
            assert_eq!(interrupt.interrupt_type, "approval");
            assert_eq!(interrupt.reason.as_deref(), Some("Ship it?"));
        }
        other => panic!("Expected HilInterruptDetected, got {:?}", other),
    }
}

#[test]
fn test_for_thread_generates_run_id() {
    let processor = Arc::new(AguiEventProcessor::new());
    let hook = StandardizingHook::for_thread(processor, "t");
    assert_eq!(hook.thread_id(), "t");
    assert!(hook.run_id().starts_with("run_"));
}
