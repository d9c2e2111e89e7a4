//! Handlers for `custom_event` and `custom_stream` envelopes.

use regex::Regex;
use serde_json::Value;

use super::events::{RawEvent, StreamEvent, TaskCompletion, TaskItem, TaskProgress, TaskState};
use super::Emitter;

lazy_static::lazy_static! {
    /// `[tool] description (i/n)`
    static ref PROGRESS_LINE: Regex =
        Regex::new(r"^\s*\[([^\]]+)\]\s*(.*?)\s*\((\d+)\s*/\s*(\d+)\)\s*$")
            .expect("Invalid progress regex");
}

/// Workflow node names and the labels shown while they run
const WORKFLOW_LABELS: &[(&str, &str)] = &[
    ("reason_model", "Thinking..."),
    ("task_planner", "Planning tasks..."),
    ("call_tool", "Calling tools..."),
    ("agent_executor", "Executing tasks..."),
    ("memory_manager", "Updating memory..."),
    ("sensitive_filter", "Checking content..."),
    ("response_model", "Composing response..."),
    ("summarizer", "Summarizing..."),
];

/// Human-readable label for a workflow node
pub fn workflow_label(node: &str) -> String {
    WORKFLOW_LABELS
        .iter()
        .find(|(name, _)| *name == node)
        .map(|(_, label)| label.to_string())
        .unwrap_or_else(|| format!("Running {}...", node.replace('_', " ")))
}

/// `custom_event`: token batches, completion markers and workflow steps
pub(super) fn handle_custom_event(event: &RawEvent, emit: &Emitter<'_>) -> bool {
    let Some(chunk) = raw_chunk(event) else {
        log::debug!("custom_event without metadata.raw_chunk");
        return false;
    };

    if let Some(batch) = chunk.get("response_batch") {
        if batch.get("status").and_then(Value::as_str) == Some("streaming") {
            let tokens = batch.get("tokens").and_then(Value::as_str).unwrap_or_default();
            if !tokens.is_empty() {
                emit.stream(StreamEvent::Content(tokens.to_string()));
            }
            let start = as_usize(batch.get("start_index")).unwrap_or(0);
            let count = as_usize(batch.get("count")).unwrap_or(0);
            let total = as_usize(batch.get("total_index")).unwrap_or(start + count);
            emit.status(format!("Generating response... ({} tokens)", total));
            return true;
        }
    }

    if chunk.pointer("/response_token/status").and_then(Value::as_str) == Some("completed") {
        emit.stream(StreamEvent::StreamComplete);
        return true;
    }

    // At most one workflow step is starting at a time, so the first hit is it.
    if let Some(map) = chunk.as_object() {
        for (key, value) in map {
            let status = value.get("status").and_then(Value::as_str);
            if matches!(status, Some("starting") | Some("deciding")) {
                emit.status(workflow_label(key));
                return true;
            }
        }
    }

    log::debug!("custom_event raw_chunk matched no known shape");
    false
}

fn raw_chunk(event: &RawEvent) -> Option<Value> {
    match event.metadata.as_ref()?.get("raw_chunk")? {
        Value::String(s) => serde_json::from_str(s).ok(),
        other => Some(other.clone()),
    }
}

/// `custom_stream`: exactly one branch fires per call
pub(super) fn handle_custom_stream(event: &RawEvent, emit: &Emitter<'_>) -> bool {
    let Some(body) = event.body() else {
        if let Some(text) = event.content_str() {
            return handle_progress_text(text, emit);
        }
        log::debug!("custom_stream without a body");
        return false;
    };

    if let Some(token) = llm_token(&body) {
        if !token.is_empty() {
            emit.stream(StreamEvent::Content(token.to_string()));
        }
        return true;
    }

    if let Some(state) = body.get("task_state").filter(|v| v.is_object()) {
        let progress = task_state_progress(state);
        if let Some(task) = progress.current_step.checked_sub(1).and_then(|i| progress.tasks.get(i)) {
            emit.status(format!(
                "[{}] {} ({}/{})",
                progress.tool_name.as_deref().unwrap_or("task"),
                task.title,
                progress.current_step,
                progress.total_steps
            ));
        }
        emit.stream(StreamEvent::TaskProgress(progress));
        return true;
    }

    if let Some(done) = body.get("task_completed") {
        let completion = TaskCompletion {
            task_index: as_usize(done.get("task_index").or_else(|| done.get("index"))),
            title: first_str(done, &["task_title", "title", "description"]).map(str::to_string),
            result: done.get("result").cloned(),
        };
        let label = completion.title.clone().unwrap_or_else(|| "Task".to_string());
        emit.status(format!("Completed: {}", label));
        emit.stream(StreamEvent::TaskCompleted(completion));
        return true;
    }

    if let Some(exec) = body.get("agent_execution") {
        let message = first_str(exec, &["message", "description"])
            .map(str::to_string)
            .unwrap_or_else(|| {
                let status = exec.get("status").and_then(Value::as_str).unwrap_or("running");
                match (
                    as_usize(exec.get("completed_tasks")),
                    as_usize(exec.get("total_tasks")),
                ) {
                    (Some(done), Some(total)) => {
                        format!("Agent {}: {}/{} tasks completed", status, done, total)
                    }
                    _ => format!("Agent {}", status),
                }
            });
        emit.status(message);
        return true;
    }

    if let Some(text) = body.get("progress").and_then(Value::as_str) {
        return handle_progress_text(text, emit);
    }

    if let Some(list) = body.get("task_list").and_then(Value::as_array) {
        emit.stream(StreamEvent::TaskList(parse_task_list(list)));
        return true;
    }

    if let Some(status) = body.get("task_status") {
        let index = as_usize(status.get("task_index").or_else(|| status.get("index")));
        let state = status
            .get("status")
            .and_then(Value::as_str)
            .and_then(TaskState::parse);
        if let (Some(task_index), Some(status)) = (index, state) {
            emit.stream(StreamEvent::TaskStatus { task_index, status });
            return true;
        }
        log::debug!("task_status without index or recognised status");
        return false;
    }

    log::debug!("custom_stream body matched no known shape");
    false
}

fn llm_token(body: &Value) -> Option<&str> {
    if body.get("type").and_then(Value::as_str) == Some("llm_token") {
        return first_str(body, &["token", "content", "text"]);
    }
    body.get("llm_token")
        .and_then(Value::as_str)
        .or_else(|| body.get("token").and_then(Value::as_str))
}

fn handle_progress_text(text: &str, emit: &Emitter<'_>) -> bool {
    emit.status(text.to_string());
    if let Some(progress) = parse_progress_line(text) {
        emit.stream(StreamEvent::TaskProgress(progress));
    } else {
        log::debug!("progress text did not match the [tool] description (i/n) pattern");
    }
    true
}

/// Parse `[tool] description (i/n)` into a progress record
pub fn parse_progress_line(text: &str) -> Option<TaskProgress> {
    let caps = PROGRESS_LINE.captures(text)?;
    let current: usize = caps[3].parse().ok()?;
    let total: usize = caps[4].parse().ok()?;
    let description = caps[2].to_string();
    Some(TaskProgress {
        tool_name: Some(caps[1].to_string()),
        current_step: current,
        total_steps: total,
        description: Some(description).filter(|d| !d.is_empty()),
        tasks: Vec::new(),
    })
}

/// Derive a progress record from a `task_state` object
///
/// Task status is synthesized from position: before `completed_tasks` is
/// completed, at `current_task_index` is in progress, the rest are pending.
pub fn task_state_progress(state: &Value) -> TaskProgress {
    let raw_tasks = state
        .get("tasks")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let current = as_usize(state.get("current_task_index"));
    let completed = state.get("completed_tasks");

    let is_completed = |i: usize| match completed {
        Some(Value::Array(done)) => done.iter().any(|v| as_usize(Some(v)) == Some(i)),
        Some(v) => as_usize(Some(v)).is_some_and(|n| i < n),
        None => false,
    };

    let tasks: Vec<TaskItem> = raw_tasks
        .iter()
        .enumerate()
        .map(|(i, task)| {
            let status = if is_completed(i) {
                TaskState::Completed
            } else if current == Some(i) {
                TaskState::InProgress
            } else {
                TaskState::Pending
            };
            TaskItem {
                index: i,
                title: task_title(task, i),
                status,
                tool: task.get("tool").and_then(Value::as_str).map(str::to_string),
            }
        })
        .collect();

    let total = as_usize(state.get("total_tasks")).unwrap_or(tasks.len());
    let current_step = current
        .map(|i| i + 1)
        .unwrap_or_else(|| tasks.iter().filter(|t| t.status == TaskState::Completed).count())
        .min(total);

    TaskProgress {
        tool_name: first_str(state, &["tool_name", "tool"]).map(str::to_string),
        current_step,
        total_steps: total,
        description: current
            .and_then(|i| tasks.get(i))
            .map(|t| t.title.clone()),
        tasks,
    }
}

/// Parse a loosely-shaped task list
pub fn parse_task_list(list: &[Value]) -> Vec<TaskItem> {
    list.iter()
        .enumerate()
        .map(|(i, task)| TaskItem {
            index: i,
            title: task_title(task, i),
            status: task
                .get("status")
                .and_then(Value::as_str)
                .and_then(TaskState::parse)
                .unwrap_or(TaskState::Pending),
            tool: task.get("tool").and_then(Value::as_str).map(str::to_string),
        })
        .collect()
}

fn task_title(task: &Value, index: usize) -> String {
    match task {
        Value::String(s) => s.clone(),
        _ => first_str(task, &["title", "description", "name", "content", "task"])
            .map(str::to_string)
            .unwrap_or_else(|| format!("Task {}", index + 1)),
    }
}

fn first_str<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| value.get(*k).and_then(Value::as_str))
}

fn as_usize(value: Option<&Value>) -> Option<usize> {
    match value? {
        Value::Number(n) => n.as_u64().map(|n| n as usize),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
