/// Bug analysis types and the model-backed stages that produce them.
///
/// `analyzer` turns a free-text report into a [`BugAnalysis`], `prefilter`
/// narrows the chunk set with it, `ranker` scores the survivors into
/// [`RankedMatch`]es and `fix` drafts a fix for the top one.
pub mod analyzer;
pub mod fix;
pub mod prefilter;
pub mod ranker;

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::corpus::CodeChunk;

/// Keywords kept from one analysis.
pub const MAX_KEYWORDS: usize = 10;
/// Summary lines kept from one analysis.
pub const MAX_SUMMARY_LINES: usize = 3;

/// Three-step rating used for both bug severity and model confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Level {
    High,
    Medium,
    Low,
    #[default]
    Unknown,
}

pub type Severity = Level;
pub type Confidence = Level;

impl Level {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Level::High => "high",
            Level::Medium => "medium",
            Level::Low => "low",
            Level::Unknown => "unknown",
        }
    }

    /// Accepts English labels plus the Korean 높음/중간/낮음 and 상/중/하.
    #[must_use]
    pub fn parse_lenient(s: &str) -> Self {
        let label = s.trim().to_lowercase();
        // "높음 (확신)" style replies: look at the first word only
        let word = label.split_whitespace().next().unwrap_or_default();
        match word {
            "high" | "critical" | "높음" | "상" => Level::High,
            "medium" | "moderate" | "med" | "중간" | "중" => Level::Medium,
            "low" | "minor" | "낮음" | "하" => Level::Low,
            _ => Level::Unknown,
        }
    }
}

impl From<String> for Level {
    fn from(s: String) -> Self {
        Level::parse_lenient(&s)
    }
}

impl From<Level> for String {
    fn from(level: Level) -> Self {
        level.as_str().to_string()
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured reading of one bug report. Always fully populated; a failed
/// analysis is `BugAnalysis::default()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BugAnalysis {
    pub keywords: Vec<String>,
    pub suspected_functions: Vec<String>,
    pub bug_type: String,
    pub severity: Severity,
    pub summary: String,
}

impl Default for BugAnalysis {
    fn default() -> Self {
        Self {
            keywords: Vec::new(),
            suspected_functions: Vec::new(),
            bug_type: "unknown".to_string(),
            severity: Severity::Unknown,
            summary: String::new(),
        }
    }
}

impl BugAnalysis {
    /// Build an analysis, enforcing the keyword cap (set semantics, first
    /// occurrence wins) and the summary line cap.
    #[must_use]
    pub fn new(
        keywords: Vec<String>,
        suspected_functions: Vec<String>,
        bug_type: &str,
        severity: Severity,
        summary: &str,
    ) -> Self {
        let mut seen = HashSet::new();
        let keywords = keywords
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty() && seen.insert(k.clone()))
            .take(MAX_KEYWORDS)
            .collect();
        let suspected_functions = suspected_functions
            .into_iter()
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .collect();
        let bug_type = match bug_type.trim() {
            "" => "unknown".to_string(),
            t => t.to_string(),
        };
        let summary = summary
            .trim()
            .lines()
            .take(MAX_SUMMARY_LINES)
            .collect::<Vec<_>>()
            .join("\n");

        Self {
            keywords,
            suspected_functions,
            bug_type,
            severity,
            summary,
        }
    }

    /// Keywords followed by suspected functions, deduplicated
    /// case-insensitively.
    #[must_use]
    pub fn search_terms(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.keywords
            .iter()
            .chain(&self.suspected_functions)
            .map(|t| t.trim())
            .filter(|t| !t.is_empty() && seen.insert(t.to_lowercase()))
            .collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty() && self.suspected_functions.is_empty()
    }
}

/// One piece of evidence a model pointed at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeReference {
    pub line: Option<u32>,
    pub code: String,
    pub reason: String,
}

/// Where a match's score came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    Model,
    /// Unscored chunk returned because no model result was usable.
    Fallback,
}

/// A chunk annotated with a relevance score in `0..=10`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedMatch {
    pub chunk: CodeChunk,
    pub relevance_score: u8,
    pub reasoning: String,
    pub suspected_lines: Vec<u32>,
    pub referenced_code: Vec<CodeReference>,
    pub confidence: Confidence,
    pub source: MatchSource,
}

// ── Lenient value coercion ──────────────────────────────────

/// A string, or the elements of a list of strings/numbers. Comma-separated
/// strings are split.
pub(crate) fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(scalar_text).collect(),
        Value::String(s) => s
            .split(',')
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

/// Text of a scalar; lists are joined with newlines.
pub(crate) fn text(value: &Value) -> Option<String> {
    match value {
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(scalar_text).collect();
            (!parts.is_empty()).then(|| parts.join("\n"))
        }
        other => scalar_text(other),
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
