//! Handlers for `graph_update` and `message_stream` envelopes.

use serde_json::Value;

use super::custom::parse_task_list;
use super::events::{HilEvent, RawEvent, StreamEvent};
use super::interrupt::{self, raw_message};
use super::{Emitter, SseParser};

/// Workflow nodes whose output may carry a task list
const TASK_LIST_NODES: &[&str] = &["call_tool", "agent_executor"];

/// `graph_update`: interrupts first, then task lists, then a coarse status
pub(super) fn handle_graph_update(parser: &SseParser, event: &RawEvent, emit: &Emitter<'_>) -> bool {
    if let Some(hit) = interrupt::first_match(&parser.graph_matchers, event) {
        emit.status(format!("{}: {}", hit.title, hit.message));
        emit.hil(HilEvent::Interrupt(hit));
        return true;
    }

    if let Some(tasks) = find_task_list(event) {
        emit.stream(StreamEvent::TaskList(parse_task_list(&tasks)));
        return true;
    }

    let next_action = event
        .data
        .as_ref()
        .and_then(|d| d.pointer("/reason_model/next_action"))
        .and_then(Value::as_str);
    if let Some(action) = next_action {
        emit.status(next_action_label(action));
        return true;
    }

    log::debug!("graph_update carried no interrupt, task list or next action");
    false
}

fn find_task_list(event: &RawEvent) -> Option<Vec<Value>> {
    let parsed_content = match &event.content {
        Some(Value::String(s)) => serde_json::from_str::<Value>(s).ok(),
        Some(v @ Value::Object(_)) => Some(v.clone()),
        _ => None,
    };

    let found = [parsed_content.as_ref(), event.data.as_ref()]
        .into_iter()
        .flatten()
        .find_map(|root| {
            TASK_LIST_NODES.iter().find_map(|node| {
                root.get(*node)
                    .and_then(|n| n.get("task_list"))
                    .and_then(Value::as_array)
                    .cloned()
            })
        });
    found
}

fn next_action_label(action: &str) -> String {
    match action {
        "call_tool" | "tool" | "tools" => "Calling tools...".to_string(),
        "respond" | "response" | "final_answer" | "end" => "Composing response...".to_string(),
        "ask_human" => "Waiting for your input...".to_string(),
        "plan" | "task_planner" => "Planning tasks...".to_string(),
        other => format!("Next step: {}", other.replace('_', " ")),
    }
}

/// `message_stream`: diagnostic text, plus two heuristics on the raw string
pub(super) fn handle_message_stream(parser: &SseParser, event: &RawEvent, emit: &Emitter<'_>) -> bool {
    let Some(raw) = raw_message(event) else {
        log::debug!("message_stream without raw_message");
        return false;
    };

    let extracted = parser.extractor.extract_content(&raw);
    match &extracted {
        Some(text) => emit.status(text.clone()),
        None => log::debug!("No content= field found in raw_message"),
    }

    if let Some(hit) = parser.message_matcher.match_raw(event, &raw) {
        emit.hil(HilEvent::Interrupt(hit));
    }

    if let Some(text) = &extracted {
        for artifact in parser.sniffer.sniff(text) {
            emit.stream(StreamEvent::Artifact(artifact));
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_action_label() {
        assert_eq!(next_action_label("call_tool"), "Calling tools...");
        assert_eq!(next_action_label("final_answer"), "Composing response...");
        assert_eq!(next_action_label("web_lookup"), "Next step: web lookup");
    }

    #[test]
    fn test_find_task_list_prefers_content() {
        let event = RawEvent {
            content: Some(Value::String(
                r#"{"agent_executor":{"task_list":["from content"]}}"#.to_string(),
            )),
            data: Some(serde_json::json!({"call_tool": {"task_list": ["from data"]}})),
            ..RawEvent::new("graph_update")
        };
        assert_eq!(
            find_task_list(&event),
            Some(vec![Value::String("from content".to_string())])
        );
    }

    #[test]
    fn test_find_task_list_ignores_unknown_nodes() {
        let event = RawEvent {
            data: Some(serde_json::json!({"other_node": {"task_list": ["x"]}})),
            ..RawEvent::new("graph_update")
        };
        assert!(find_task_list(&event).is_none());
    }
}
