//! Text extraction helpers for raw tool output.
//!
//! Tools answer in free-form markdown. These helpers recover the structured
//! parts (code blocks, JSON payloads, shell commands) deterministically.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

static FENCE_OPEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```(?:[\w+\-.]+)?[ \t]*\n").expect("fence regex"));
static BACKTICK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`]+)`").expect("backtick regex"));

/// Build an ASCII slug: lowercase, alphanumerics kept, runs of whitespace,
/// `_` and `-` collapsed to a single `_`, truncated to `max_len`.
pub fn slugify(text: &str, max_len: usize, fallback: &str) -> String {
    let mut slug = String::new();
    let mut pending_sep = false;
    for ch in text.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('_');
            }
            pending_sep = false;
            slug.push(ch);
        } else if ch.is_whitespace() || ch == '_' || ch == '-' {
            pending_sep = true;
        }
    }
    if slug.len() > max_len {
        slug.truncate(max_len);
        while slug.ends_with('_') {
            slug.pop();
        }
    }
    if slug.is_empty() {
        fallback.to_string()
    } else {
        slug
    }
}

/// Project directory name derived from the goal.
pub fn project_slug(goal: &str) -> String {
    slugify(goal, 30, "project")
}

/// Return the body of the first fenced code block, or the trimmed text when
/// there is no fence. An unterminated fence runs to the end of the text.
pub fn extract_code_block(text: &str) -> String {
    let Some(open) = FENCE_OPEN_RE.find(text) else {
        return text.trim().to_string();
    };
    let start = open.end();
    match text.rfind("\n```") {
        Some(end) if end > start => text[start..end].trim().to_string(),
        _ => text[start..].trim().to_string(),
    }
}

/// Derive a shell command from a free-text instruction: the last back-ticked
/// span, else the text after the last colon, else the whole instruction.
pub fn normalize_run_command(instruction: &str) -> String {
    let text = instruction.trim();
    if let Some(caps) = BACKTICK_RE.captures_iter(text).last() {
        return caps[1].trim().to_string();
    }
    if let Some((_, after)) = text.rsplit_once(':') {
        let after = after.trim();
        if !after.is_empty() {
            return after.to_string();
        }
    }
    text.to_string()
}

/// Scan `text` for JSON values starting at `opener` and return every value
/// that decodes cleanly, in order of appearance.
fn scan_json_values(text: &str, opener: char) -> Vec<Value> {
    let mut found = Vec::new();
    let mut idx = 0usize;
    while let Some(offset) = text[idx..].find(opener) {
        let start = idx + offset;
        let mut stream = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(value)) => {
                found.push(value);
                idx = start + stream.byte_offset().max(1);
            }
            _ => idx = start + opener.len_utf8(),
        }
    }
    found
}

/// Extract the JSON array of objects a planner emitted.
///
/// The whole text is tried first; otherwise the last array whose elements are
/// all objects wins, so prose before the payload is ignored.
pub fn extract_json_array(text: &str) -> Option<Vec<Value>> {
    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(text.trim()) {
        return Some(items);
    }
    scan_json_values(text, '[')
        .into_iter()
        .filter_map(|value| match value {
            Value::Array(items) if items.iter().all(Value::is_object) => Some(items),
            _ => None,
        })
        .last()
}

/// Extract the outermost JSON object in the text, preferring the last one.
pub fn extract_json_object(text: &str) -> Option<Value> {
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(text.trim()) {
        return Some(value);
    }
    scan_json_values(text, '{')
        .into_iter()
        .filter(Value::is_object)
        .last()
}

/// Pull assistant text out of one line of a `stream-json` transcript.
pub fn stream_json_text(line: &str) -> Vec<String> {
    let Ok(Value::Object(payload)) = serde_json::from_str::<Value>(line.trim()) else {
        return Vec::new();
    };
    let mut texts = Vec::new();
    let mut push = |value: Option<&Value>| {
        if let Some(text) = value.and_then(Value::as_str) {
            texts.push(text.to_string());
        }
    };
    push(payload.get("result"));
    push(payload.get("delta").and_then(|delta| delta.get("text")));
    push(payload.get("content_block").and_then(|block| block.get("text")));
    push(payload.get("text"));
    if let Some(Value::Array(items)) = payload.get("content") {
        for item in items {
            push(item.get("text"));
        }
    }
    texts
}

/// Keep at most `max_bytes` of `text`, cut on a char boundary.
pub fn excerpt(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
