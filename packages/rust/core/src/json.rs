//! Lenient JSON reading for generation responses.
//!
//! Models often wrap JSON in a Markdown code fence; the fence is stripped
//! before parsing. A top-level object counts as a one-element array.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use html2doc_shared::{Html2DocError, Result};

static FENCE_OPEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^```(?:json)?").expect("valid regex"));

const FENCE: &str = "```";

/// Parse a response into a list of JSON items.
///
/// A blank response yields no items.
///
/// # Errors
///
/// Returns [`Html2DocError::Parse`] when the text is not valid JSON, or is
/// valid JSON but neither an array nor an object.
pub fn parse_items(text: &str) -> Result<Vec<Value>> {
    let cleaned = strip_fence(text);
    if cleaned.is_empty() {
        return Ok(Vec::new());
    }

    let parsed: Value = serde_json::from_str(cleaned)
        .map_err(|e| Html2DocError::parse(format!("response is not valid JSON: {e}")))?;

    match parsed {
        Value::Array(items) => Ok(items),
        object @ Value::Object(_) => Ok(vec![object]),
        other => Err(Html2DocError::parse(format!(
            "expected a JSON array or object, got {}",
            kind(&other)
        ))),
    }
}

fn strip_fence(text: &str) -> &str {
    let mut cleaned = text.trim();
    if cleaned.starts_with(FENCE) {
        let end = FENCE_OPEN_RE.find(cleaned).map_or(0, |m| m.end());
        cleaned = cleaned[end..].trim();
        if let Some(inner) = cleaned.strip_suffix(FENCE) {
            cleaned = inner.trim();
        }
    }
    cleaned
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ---------------------------------------------------------------------------
// Field helpers shared by the knowledge and relation parsers
// ---------------------------------------------------------------------------

/// Whether a JSON value counts as "nothing" (`null`, `false`, `0`, `""`, `[]`, `{}`).
pub(crate) fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

/// Scalar rendering of a value: strings as-is, `null` as empty, the rest as JSON.
pub(crate) fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A string field; missing or `null` gives an empty string.
pub(crate) fn text_field(object: &Map<String, Value>, key: &str) -> String {
    object.get(key).map(value_text).unwrap_or_default()
}

/// The first of `keys` holding a non-empty value, rendered as text.
pub(crate) fn first_text_field(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| object.get(*key))
        .find(|value| !is_empty_value(value))
        .map(value_text)
}

/// A list-of-strings field. A bare string counts as a single entry; empty
/// entries are dropped.
pub(crate) fn list_field(object: &Map<String, Value>, key: &str) -> Vec<String> {
    match object.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter(|item| !is_empty_value(item))
            .map(value_text)
            .collect(),
        Some(value) if !is_empty_value(value) => vec![value_text(value)],
        _ => Vec::new(),
    }
}
