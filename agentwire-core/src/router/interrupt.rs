//! Interrupt recognition across the backend's encodings.
//!
//! The backend has signalled "a human needs to step in" in several shapes
//! over time. Each shape gets its own [`InterruptMatcher`]; the router tries
//! them in a fixed order and the first hit wins.

use std::sync::Arc;

use serde_json::{Map, Value};

use super::events::{HilInterrupt, InterruptKind, InterruptSource, RawEvent};
use super::legacy::LegacyContentExtractor;

/// Tool name the agent uses to ask the user a question
pub const ASK_HUMAN_TOOL: &str = "ask_human";

/// One way of recognising an interrupt in a raw event
pub trait InterruptMatcher: Send + Sync {
    /// Short name for logging
    fn name(&self) -> &'static str;

    /// Return the interrupt this event encodes, if any
    fn match_event(&self, event: &RawEvent) -> Option<HilInterrupt>;
}

/// Try matchers in order and return the first hit
pub fn first_match(matchers: &[Box<dyn InterruptMatcher>], event: &RawEvent) -> Option<HilInterrupt> {
    matchers.iter().find_map(|m| {
        let hit = m.match_event(event);
        if hit.is_some() {
            log::debug!("Interrupt recognised by {} matcher", m.name());
        }
        hit
    })
}

/// Matchers applied to `graph_update`, structured field first
pub fn graph_update_matchers() -> Vec<Box<dyn InterruptMatcher>> {
    vec![
        Box::new(StructuredInterruptMatcher),
        Box::new(ToolCallInterruptMatcher),
    ]
}

/// `data.__interrupt__`, the authoritative encoding
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredInterruptMatcher;

impl InterruptMatcher for StructuredInterruptMatcher {
    fn name(&self) -> &'static str {
        "structured"
    }

    fn match_event(&self, event: &RawEvent) -> Option<HilInterrupt> {
        let field = event.data.as_ref()?.get("__interrupt__")?;
        let entry = match field {
            Value::Array(items) => items.first()?,
            Value::Null => return None,
            other => other,
        };

        // LangGraph wraps the payload in `value`; older servers send it bare.
        let payload = entry.get("value").unwrap_or(entry);

        let (kind, question) = match payload {
            Value::String(q) => (InterruptKind::AskHuman, Some(q.clone())),
            _ => {
                let kind = payload
                    .get("type")
                    .and_then(Value::as_str)
                    .map(InterruptKind::from_type)
                    .unwrap_or_else(|| {
                        if payload.get("question").is_some() {
                            InterruptKind::AskHuman
                        } else {
                            InterruptKind::Other("unknown".to_string())
                        }
                    });
                let question = str_field(payload, "question");
                (kind, question)
            }
        };

        let id = str_field(entry, "id")
            .or_else(|| str_field(payload, "id"))
            .unwrap_or_else(generate_interrupt_id);
        let thread_id = event
            .field_str("thread_id")
            .map(str::to_string)
            .or_else(|| str_field(payload, "thread_id"));

        let (title, message) = describe(&kind, payload, question.as_deref());
        Some(HilInterrupt {
            id,
            kind,
            title,
            message,
            thread_id,
            question,
            timestamp: timestamp_or_now(event),
            data: payload.clone(),
            source: InterruptSource::Structured,
        })
    }
}

/// `ask_human` tool calls inside a node's `messages`
#[derive(Debug, Default, Clone, Copy)]
pub struct ToolCallInterruptMatcher;

impl InterruptMatcher for ToolCallInterruptMatcher {
    fn name(&self) -> &'static str {
        "graph_tool_call"
    }

    fn match_event(&self, event: &RawEvent) -> Option<HilInterrupt> {
        let nodes = event.data.as_ref()?.as_object()?;

        for (node, value) in nodes {
            let Some(messages) = value.get("messages").and_then(Value::as_array) else {
                continue;
            };
            for call in messages
                .iter()
                .filter_map(|m| m.get("tool_calls").and_then(Value::as_array))
                .flatten()
            {
                if tool_call_name(call) != Some(ASK_HUMAN_TOOL) {
                    continue;
                }
                let args = tool_call_args(call);
                let question = args.as_ref().and_then(|a| str_field(a, "question"));
                let kind = InterruptKind::AskHuman;
                let (title, message) = describe(&kind, &Value::Null, question.as_deref());
                let mut data = Map::new();
                data.insert("node".to_string(), Value::String(node.clone()));
                data.insert("tool_call".to_string(), call.clone());

                return Some(HilInterrupt {
                    id: str_field(call, "id").unwrap_or_else(generate_interrupt_id),
                    kind,
                    title,
                    message,
                    thread_id: event.field_str("thread_id").map(str::to_string),
                    question,
                    timestamp: timestamp_or_now(event),
                    data: Value::Object(data),
                    source: InterruptSource::GraphToolCall,
                });
            }
        }
        None
    }
}

/// `ask_human` tool calls visible only in a `message_stream` debug string
pub struct MessageStreamInterruptMatcher {
    extractor: Arc<dyn LegacyContentExtractor>,
}

impl MessageStreamInterruptMatcher {
    pub fn new(extractor: Arc<dyn LegacyContentExtractor>) -> Self {
        Self { extractor }
    }

    /// Match against the raw message text directly
    pub fn match_raw(&self, event: &RawEvent, raw_message: &str) -> Option<HilInterrupt> {
        if !(raw_message.contains(ASK_HUMAN_TOOL) && raw_message.contains("tool_calls")) {
            return None;
        }
        let question = self.extractor.extract_question(raw_message);
        if question.is_none() {
            log::debug!("ask_human tool call found without a recognisable question");
        }
        let kind = InterruptKind::AskHuman;
        let (title, message) = describe(&kind, &Value::Null, question.as_deref());

        Some(HilInterrupt {
            id: generate_interrupt_id(),
            kind,
            title,
            message,
            thread_id: event.field_str("thread_id").map(str::to_string),
            question: question.clone(),
            timestamp: timestamp_or_now(event),
            data: serde_json::json!({ "question": question, "raw_message": raw_message }),
            source: InterruptSource::MessageStream,
        })
    }
}

impl InterruptMatcher for MessageStreamInterruptMatcher {
    fn name(&self) -> &'static str {
        "message_stream"
    }

    fn match_event(&self, event: &RawEvent) -> Option<HilInterrupt> {
        let raw = raw_message(event)?;
        self.match_raw(event, &raw)
    }
}

/// The `raw_message` debug string of a `message_stream` event
pub(crate) fn raw_message(event: &RawEvent) -> Option<String> {
    if let Some(raw) = event.field_str("raw_message") {
        return Some(raw.to_string());
    }
    match &event.content {
        Some(Value::Object(map)) => map
            .get("raw_message")
            .and_then(Value::as_str)
            .map(str::to_string),
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    }
}

/// Title and message shown for an interrupt
pub fn describe(kind: &InterruptKind, payload: &Value, question: Option<&str>) -> (String, String) {
    let message_field = str_field(payload, "message").or_else(|| str_field(payload, "reason"));
    match kind {
        InterruptKind::AskHuman => (
            "Agent needs your input".to_string(),
            question
                .map(str::to_string)
                .or(message_field)
                .unwrap_or_else(|| "The agent has a question for you.".to_string()),
        ),
        InterruptKind::Authorization => {
            let message = message_field.unwrap_or_else(|| match str_field(payload, "tool_name") {
                Some(tool) => format!("Authorization is required to use {}.", tool),
                None => "The agent requires authorization to continue.".to_string(),
            });
            ("Authorization required".to_string(), message)
        }
        _ => (
            "Human review required".to_string(),
            message_field.unwrap_or_else(|| "Execution paused for human review.".to_string()),
        ),
    }
}

fn tool_call_name(call: &Value) -> Option<&str> {
    call.get("name")
        .and_then(Value::as_str)
        .or_else(|| call.pointer("/function/name").and_then(Value::as_str))
}

fn tool_call_args(call: &Value) -> Option<Value> {
    if let Some(args) = call.get("args") {
        return Some(args.clone());
    }
    // OpenAI-style calls carry arguments as a JSON string.
    match call.pointer("/function/arguments")? {
        Value::String(s) => serde_json::from_str(s).ok(),
        other => Some(other.clone()),
    }
}

fn str_field(value: &Value, name: &str) -> Option<String> {
    value.get(name).and_then(Value::as_str).map(str::to_string)
}

pub(crate) fn generate_interrupt_id() -> String {
    format!("interrupt_{}", uuid::Uuid::new_v4().simple())
}

pub(crate) fn timestamp_or_now(event: &RawEvent) -> String {
    event
        .timestamp
        .clone()
        .unwrap_or_else(|| chrono::Utc::now().to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::legacy::ReprContentExtractor;
    use serde_json::json;

    fn graph_update(data: Value) -> RawEvent {
        RawEvent {
            data: Some(data),
            ..RawEvent::new("graph_update")
        }
    }

    #[test]
    fn test_structured_langgraph_shape() {
        let event = graph_update(json!({
            "__interrupt__": [{
                "id": "int-7",
                "value": {"type": "ask_human", "question": "Which repo?"}
            }],
            "thread_id": "t-1"
        }));
        let hit = StructuredInterruptMatcher.match_event(&event).unwrap();
        assert_eq!(hit.id, "int-7");
        assert_eq!(hit.kind, InterruptKind::AskHuman);
        assert_eq!(hit.message, "Which repo?");
        assert_eq!(hit.question.as_deref(), Some("Which repo?"));
        assert_eq!(hit.thread_id.as_deref(), Some("t-1"));
        assert_eq!(hit.source, InterruptSource::Structured);
    }

    #[test]
    fn test_structured_authorization() {
        let event = graph_update(json!({
            "__interrupt__": {"type": "authorization", "tool_name": "deploy"}
        }));
        let hit = StructuredInterruptMatcher.match_event(&event).unwrap();
        assert_eq!(hit.kind, InterruptKind::Authorization);
        assert_eq!(hit.title, "Authorization required");
        assert_eq!(hit.message, "Authorization is required to use deploy.");
        assert!(hit.id.starts_with("interrupt_"));
    }

    #[test]
    fn test_structured_string_value_is_question() {
        let event = graph_update(json!({"__interrupt__": [{"value": "Continue?"}]}));
        let hit = StructuredInterruptMatcher.match_event(&event).unwrap();
        assert_eq!(hit.kind, InterruptKind::AskHuman);
        assert_eq!(hit.message, "Continue?");
    }

    #[test]
    fn test_structured_other_type() {
        let event = graph_update(json!({"__interrupt__": {"type": "budget", "message": "Over budget"}}));
        let hit = StructuredInterruptMatcher.match_event(&event).unwrap();
        assert_eq!(hit.kind, InterruptKind::Other("budget".to_string()));
        assert_eq!(hit.title, "Human review required");
        assert_eq!(hit.message, "Over budget");
    }

    #[test]
    fn test_structured_absent_or_empty() {
        assert!(StructuredInterruptMatcher
            .match_event(&graph_update(json!({"agent": {}})))
            .is_none());
        assert!(StructuredInterruptMatcher
            .match_event(&graph_update(json!({"__interrupt__": []})))
            .is_none());
        assert!(StructuredInterruptMatcher
            .match_event(&graph_update(json!({"__interrupt__": null})))
            .is_none());
    }

    #[test]
    fn test_tool_call_fallback() {
        let event = graph_update(json!({
            "reason_model": {
                "messages": [{
                    "content": "",
                    "tool_calls": [
                        {"id": "call_1", "name": "search", "args": {}},
                        {"id": "call_2", "name": "ask_human", "args": {"question": "Budget?"}}
                    ]
                }]
            }
        }));
        let hit = ToolCallInterruptMatcher.match_event(&event).unwrap();
        assert_eq!(hit.id, "call_2");
        assert_eq!(hit.question.as_deref(), Some("Budget?"));
        assert_eq!(hit.data["node"], "reason_model");
        assert_eq!(hit.source, InterruptSource::GraphToolCall);
    }

    #[test]
    fn test_tool_call_fallback_openai_shape() {
        let event = graph_update(json!({
            "agent": {"messages": [{"tool_calls": [{
                "id": "call_9",
                "function": {"name": "ask_human", "arguments": "{\"question\":\"Region?\"}"}
            }]}]}
        }));
        let hit = ToolCallInterruptMatcher.match_event(&event).unwrap();
        assert_eq!(hit.question.as_deref(), Some("Region?"));
    }

    #[test]
    fn test_first_match_prefers_structured() {
        let event = graph_update(json!({
            "__interrupt__": [{"id": "structured", "value": {"type": "ask_human", "question": "A?"}}],
            "agent": {"messages": [{"tool_calls": [
                {"id": "fallback", "name": "ask_human", "args": {"question": "B?"}}
            ]}]}
        }));
        let hit = first_match(&graph_update_matchers(), &event).unwrap();
        assert_eq!(hit.id, "structured");
        assert_eq!(hit.source, InterruptSource::Structured);
    }

    #[test]
    fn test_message_stream_matcher() {
        let matcher = MessageStreamInterruptMatcher::new(Arc::new(ReprContentExtractor));
        let event = RawEvent {
            content: Some(json!({
                "raw_message": "AIMessage(content='', tool_calls=[{'name': 'ask_human', 'args': {'question': 'Name?'}}])"
            })),
            ..RawEvent::new("message_stream")
        };
        let hit = matcher.match_event(&event).unwrap();
        assert_eq!(hit.question.as_deref(), Some("Name?"));
        assert_eq!(hit.source, InterruptSource::MessageStream);

        let plain = RawEvent {
            content: Some(json!({"raw_message": "AIMessage(content='ask_human is a tool')"})),
            ..RawEvent::new("message_stream")
        };
        assert!(matcher.match_event(&plain).is_none());
    }
}
