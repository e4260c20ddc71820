/// JSON extraction from free-form model replies.
///
/// Models wrap JSON in prose, markdown fences, or both. Each strategy is a
/// pure function that either finds a candidate span or gives up; strategy
/// lists are tried in priority order.
use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;

/// A single extraction strategy.
pub type Strategy = fn(&str) -> Option<&str>;

const FENCE: &str = "```";

/// Object replies: fenced ```json block, then any fenced block, then the
/// span from the first `{` to the last `}`.
pub const OBJECT_STRATEGIES: &[Strategy] = &[fenced_json_block, any_fenced_block, brace_span];

/// Array-of-objects replies: bare `[{...}]`, then a fenced `[{...}]`.
pub const ARRAY_STRATEGIES: &[Strategy] = &[object_array, fenced_object_array];

static OBJECT_ARRAY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\[\s*\{.*\}\s*\]").unwrap());
static FENCED_OBJECT_ARRAY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*(\[\s*\{.*\}\s*\])\s*```").unwrap());

/// Content of the first ```json fence.
pub fn fenced_json_block(text: &str) -> Option<&str> {
    let start = text.find("```json")? + "```json".len();
    let len = text[start..].find(FENCE)?;
    non_empty(&text[start..start + len])
}

/// Content of the first fence of any tag. A language tag on the opening
/// line is skipped.
pub fn any_fenced_block(text: &str) -> Option<&str> {
    let mut start = text.find(FENCE)? + FENCE.len();
    let len = text[start..].find(FENCE)?;
    let mut body = &text[start..start + len];

    if let Some(newline) = body.find('\n') {
        let tag = body[..newline].trim();
        if tag.chars().all(|c| c.is_ascii_alphanumeric() || "+-_#".contains(c)) {
            start += newline + 1;
            body = &text[start..start + len - newline - 1];
        }
    }
    non_empty(body)
}

/// Span from the first `{` to the last `}`.
pub fn brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| text[start..=end].trim())
}

/// Greedy `[ {...} ]` span.
pub fn object_array(text: &str) -> Option<&str> {
    OBJECT_ARRAY_RE.find(text).map(|m| m.as_str())
}

/// `[ {...} ]` inside a (possibly `json`-tagged) fence.
pub fn fenced_object_array(text: &str) -> Option<&str> {
    FENCED_OBJECT_ARRAY_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

fn non_empty(s: &str) -> Option<&str> {
    let s = s.trim();
    (!s.is_empty()).then_some(s)
}

/// First span any strategy finds, in priority order.
pub fn extract<'a>(text: &'a str, strategies: &[Strategy]) -> Option<&'a str> {
    strategies.iter().find_map(|s| s(text))
}

/// Deserialize the first extracted span that parses as `T`.
///
/// A strategy counts as successful only when its span also parses, so a
/// prose fence in front of the real payload does not hide it.
pub fn decode<T: DeserializeOwned>(text: &str, strategies: &[Strategy]) -> Option<T> {
    strategies
        .iter()
        .filter_map(|s| s(text))
        .find_map(|span| serde_json::from_str(span).ok())
}
