//! Best-effort extraction from debug-formatted message strings.
//!
//! Some backend events only carry the `repr` of an internal message object,
//! e.g. `AIMessage(content="Hello", additional_kwargs={...})`. Everything in
//! this module is heuristic and lives behind [`LegacyContentExtractor`] so it
//! can be removed once every event carries structured fields.

use regex::Regex;
use serde_json::Value;

use super::events::Artifact;

lazy_static::lazy_static! {
    static ref DOUBLE_QUOTED_CONTENT: Regex =
        Regex::new(r#"content="((?:[^"\\]|\\.)*)""#).expect("Invalid content regex");
    static ref SINGLE_QUOTED_CONTENT: Regex =
        Regex::new(r#"content='((?:[^'\\]|\\.)*)'"#).expect("Invalid content regex");
    static ref QUESTION_ARG: Regex = Regex::new(
        r#"['"]question['"]\s*:\s*(?:"((?:[^"\\]|\\.)*)"|'((?:[^'\\]|\\.)*)')"#
    )
    .expect("Invalid question regex");
    static ref MARKDOWN_IMAGE: Regex =
        Regex::new(r#"!\[([^\]]*)\]\(\s*([^)\s]+)(?:\s+"[^"]*")?\s*\)"#)
            .expect("Invalid image regex");
}

/// Capability for pulling message text out of a serialized message object
pub trait LegacyContentExtractor: Send + Sync {
    /// Extract the message text, or `None` if nothing recognisable is found
    fn extract_content(&self, raw_message: &str) -> Option<String>;

    /// Extract the `question` argument of an `ask_human` tool call
    fn extract_question(&self, raw_message: &str) -> Option<String>;
}

/// Extractor for Python-style `repr` strings
///
/// Tries `content="..."` first, then `content='...'`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReprContentExtractor;

impl LegacyContentExtractor for ReprContentExtractor {
    fn extract_content(&self, raw_message: &str) -> Option<String> {
        let captures = DOUBLE_QUOTED_CONTENT
            .captures(raw_message)
            .or_else(|| SINGLE_QUOTED_CONTENT.captures(raw_message))?;
        let text = unescape(captures.get(1)?.as_str());
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    fn extract_question(&self, raw_message: &str) -> Option<String> {
        let captures = QUESTION_ARG.captures(raw_message)?;
        let raw = captures.get(1).or_else(|| captures.get(2))?.as_str();
        Some(unescape(raw))
    }
}

/// Undo backslash escapes used by `repr` and JSON string literals
pub fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('"') => out.push('"'),
            Some('\'') => out.push('\''),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Finds renderable artifacts embedded in free text
#[derive(Debug, Default, Clone, Copy)]
pub struct ArtifactSniffer;

impl ArtifactSniffer {
    /// Every markdown image and inline JSON object, images first
    pub fn sniff(&self, text: &str) -> Vec<Artifact> {
        let mut artifacts: Vec<Artifact> = MARKDOWN_IMAGE
            .captures_iter(text)
            .map(|c| Artifact::Image {
                alt: c[1].to_string(),
                url: c[2].to_string(),
            })
            .collect();

        artifacts.extend(json_objects(text).into_iter().map(Artifact::Json));
        artifacts
    }
}

/// Scan for balanced `{...}` spans that parse as non-empty JSON objects
fn json_objects(text: &str) -> Vec<Value> {
    let bytes = text.as_bytes();
    let mut found = Vec::new();
    let mut pos = 0;

    while let Some(offset) = text[pos..].find('{') {
        let start = pos + offset;
        match balanced_end(bytes, start) {
            Some(end) => match serde_json::from_str::<Value>(&text[start..=end]) {
                Ok(Value::Object(map)) if !map.is_empty() => {
                    found.push(Value::Object(map));
                    pos = end + 1;
                }
                _ => pos = start + 1,
            },
            None => pos = start + 1,
        }
    }

    found
}

fn balanced_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}
