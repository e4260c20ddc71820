/// Result persistence (pretty JSON) and console rendering.
use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::fix::FixSuggestion;
use crate::analysis::{BugAnalysis, MatchSource, RankedMatch};
use crate::corpus::CodeChunk;
use crate::lexical::LexicalMatch;
use crate::pipeline::AnalysisOutcome;

/// Characters of chunk content shown in previews.
pub const PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub timestamp: DateTime<Utc>,
    pub bug_report: String,
    pub analysis: BugAnalysis,
    pub matches: Vec<RankedMatch>,
    pub fix_suggestion: Option<FixSuggestion>,
}

impl AnalysisReport {
    pub fn new(bug_report: &str, outcome: AnalysisOutcome) -> Self {
        Self {
            timestamp: Utc::now(),
            bug_report: bug_report.to_string(),
            analysis: outcome.analysis,
            matches: outcome.matches,
            fix_suggestion: outcome.fix,
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let a = &self.analysis;
        let _ = writeln!(out, "=== Bug analysis ===");
        let _ = writeln!(out, "Type:      {}", a.bug_type);
        let _ = writeln!(out, "Severity:  {}", a.severity);
        let _ = writeln!(out, "Keywords:  {}", join_or(&a.keywords, "none"));
        let _ = writeln!(out, "Functions: {}", join_or(&a.suspected_functions, "none"));
        if !a.summary.is_empty() {
            let _ = writeln!(out, "Summary:\n{}", indent(&a.summary));
        }

        let _ = writeln!(out, "\n=== Suspect code ({} matches) ===", self.matches.len());
        for (i, m) in self.matches.iter().enumerate() {
            let tag = match m.source {
                MatchSource::Model => String::new(),
                MatchSource::Fallback => " [unscored]".to_string(),
            };
            let _ = writeln!(
                out,
                "#{} {} (lines {}-{}) score {}/10, confidence {}{tag}",
                i + 1,
                m.chunk.file_path,
                m.chunk.start_line,
                m.chunk.end_line,
                m.relevance_score,
                m.confidence
            );
            if !m.reasoning.is_empty() {
                let _ = writeln!(out, "{}", indent(&m.reasoning));
            }
            if !m.suspected_lines.is_empty() {
                let lines: Vec<String> = m.suspected_lines.iter().map(u32::to_string).collect();
                let _ = writeln!(out, "    suspected lines: {}", lines.join(", "));
            }
            for r in &m.referenced_code {
                match r.line {
                    Some(line) => {
                        let _ = writeln!(out, "    L{line}: {}  // {}", r.code, r.reason);
                    }
                    None => {
                        let _ = writeln!(out, "    {}  // {}", r.code, r.reason);
                    }
                }
            }
        }

        if let Some(fix) = &self.fix_suggestion {
            let _ = writeln!(out, "\n=== Fix suggestion ===\n{}", fix.text);
        }
        out
    }
}

/// One row of a lexical-only run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LexicalHit {
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub similarity: f64,
    pub preview: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LexicalReport {
    pub timestamp: DateTime<Utc>,
    pub bug_report: String,
    pub matches: Vec<LexicalHit>,
}

impl LexicalReport {
    /// Keep the first `top_n` of `ranked`, resolved against `chunks`.
    pub fn new(
        bug_report: &str,
        chunks: &[CodeChunk],
        ranked: &[LexicalMatch],
        top_n: usize,
    ) -> Self {
        let matches = ranked
            .iter()
            .take(top_n)
            .filter_map(|m| {
                let chunk = chunks.get(m.chunk_index)?;
                Some(LexicalHit {
                    file_path: chunk.file_path.clone(),
                    start_line: chunk.start_line,
                    end_line: chunk.end_line,
                    similarity: m.similarity,
                    preview: preview(&chunk.content),
                })
            })
            .collect();
        Self {
            timestamp: Utc::now(),
            bug_report: bug_report.to_string(),
            matches,
        }
    }

    pub fn render(&self) -> String {
        let mut out = format!("=== Lexical matches ({}) ===\n", self.matches.len());
        for (i, m) in self.matches.iter().enumerate() {
            let _ = writeln!(
                out,
                "#{} {} (lines {}-{}) similarity {:.4}\n{}",
                i + 1,
                m.file_path,
                m.start_line,
                m.end_line,
                m.similarity,
                indent(&m.preview)
            );
        }
        out
    }
}

/// Write `value` as pretty JSON, creating parent directories.
pub fn save_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    let json = serde_json::to_string_pretty(value).context("Failed to serialize results")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write results: {}", path.display()))?;
    Ok(())
}

fn preview(content: &str) -> String {
    let trimmed = content.trim();
    match trimmed.char_indices().nth(PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|l| format!("    {l}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn join_or(items: &[String], empty: &str) -> String {
    if items.is_empty() {
        empty.to_string()
    } else {
        items.join(", ")
    }
}
