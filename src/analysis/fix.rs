/// Fix suggestion for the top-ranked match.
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::RankedMatch;
use crate::llm::registry::ModelRegistry;
use crate::llm::translate::TranslationBridge;
use crate::llm::{ChatRequest, Sampling, Specialty, truncate_chars};

/// Endpoint preference for fix drafting.
pub const FIX_PREFERENCES: &[Specialty] = &[Specialty::Fixing, Specialty::Code];

/// Returned whenever no suggestion could be produced.
pub const FIX_UNAVAILABLE: &str = "Unable to generate a fix suggestion for this match.";

const TRUNCATION_MARKER: &str = "\n// ... (remaining code omitted) ...";

const FIX_SYSTEM_PROMPT: &str = "You are an expert C++ bug-fixing assistant.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixSuggestion {
    pub text: String,
    /// False when `text` is the fixed unavailable message.
    pub generated: bool,
}

impl FixSuggestion {
    fn unavailable() -> Self {
        Self {
            text: FIX_UNAVAILABLE.to_string(),
            generated: false,
        }
    }
}

pub fn fix_prompt(report: &str, top: &RankedMatch, max_chars: usize) -> String {
    let chunk = &top.chunk;
    let code = truncate_chars(&chunk.content, max_chars, TRUNCATION_MARKER);
    let evidence: Vec<String> = top
        .referenced_code
        .iter()
        .map(|r| match r.line {
            Some(line) => format!("- line {line}: {} ({})", r.code, r.reason),
            None => format!("- {} {}", r.code, r.reason),
        })
        .collect();
    let evidence = if evidence.is_empty() {
        "None".to_string()
    } else {
        evidence.join("\n")
    };
    let suspected = if top.suspected_lines.is_empty() {
        "unknown".to_string()
    } else {
        top.suspected_lines
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    };

    format!(
        "Analyze the bug report and code below and suggest a fix.\n\n\
         # Bug Report\n{report}\n\n\
         # File Information\n\
         - File: {file}\n\
         - Lines: {start}-{end}\n\
         - Suspected lines: {suspected}\n\
         - Relevance Score: {score}/10\n\
         - Analysis: {reasoning}\n\n\
         # Code\n```cpp\n{code}\n```\n\n\
         # Referenced Code\n{evidence}\n\n\
         # Task\n\
         1. Identify the exact location of the bug\n\
         2. Explain its root cause\n\
         3. Provide a concrete fix showing original and fixed code\n\n\
         # Output Format\n\
         1. FILE: [filename]\n\
         2. BUG LOCATION: [function/line numbers]\n\
         3. BUG CAUSE: [why the bug occurs]\n\
         4. FIX SUGGESTION: [code snippet showing the fix]\n\
         5. ADDITIONAL CHECKS: [other places to look or considerations]\n\n\
         Only reference code that is visible in the snippet above. \
         Do not invent function names or code that is not shown. \
         If you cannot determine a fix with confidence, say what information is missing.",
        file = chunk.file_name(),
        start = chunk.start_line,
        end = chunk.end_line,
        score = top.relevance_score,
        reasoning = top.reasoning,
    )
}

pub struct FixSuggestionGenerator<'a> {
    registry: &'a ModelRegistry,
    bridge: Option<&'a TranslationBridge<'a>>,
    max_chunk_chars: usize,
    sampling: Sampling,
}

impl<'a> FixSuggestionGenerator<'a> {
    pub fn new(registry: &'a ModelRegistry, max_chunk_chars: usize) -> Self {
        Self {
            registry,
            bridge: None,
            max_chunk_chars,
            sampling: Sampling::default(),
        }
    }

    #[must_use]
    pub fn with_bridge(mut self, bridge: Option<&'a TranslationBridge<'a>>) -> Self {
        self.bridge = bridge;
        self
    }

    #[must_use]
    pub fn with_sampling(mut self, sampling: Sampling) -> Self {
        self.sampling = sampling;
        self
    }

    /// Draft a fix for `top`. One call, no retries; any failure yields
    /// [`FIX_UNAVAILABLE`].
    pub fn generate(&self, report: &str, top: &RankedMatch) -> FixSuggestion {
        if top.chunk.content.trim().is_empty() {
            return FixSuggestion::unavailable();
        }
        let Some(model) = self.registry.select(FIX_PREFERENCES) else {
            warn!("No model registered for fix suggestions");
            return FixSuggestion::unavailable();
        };

        let report = match self.bridge {
            Some(bridge) => bridge.to_working(report),
            None => report.to_string(),
        };
        let prompt = fix_prompt(&report, top, self.max_chunk_chars);
        info!(
            "Generating fix suggestion for {} with '{}'",
            top.chunk.file_name(),
            model.name()
        );

        let request = ChatRequest::new(&prompt)
            .with_system(FIX_SYSTEM_PROMPT)
            .with_sampling(self.sampling);
        match model.complete(&request) {
            Ok(reply) if !reply.trim().is_empty() => {
                let text = match self.bridge {
                    Some(bridge) => bridge.to_report(reply.trim()),
                    None => reply.trim().to_string(),
                };
                FixSuggestion {
                    text,
                    generated: true,
                }
            }
            Ok(_) => {
                warn!("Fix model '{}' returned an empty reply", model.name());
                FixSuggestion::unavailable()
            }
            Err(e) => {
                warn!("Fix suggestion via '{}' failed: {e}", model.name());
                FixSuggestion::unavailable()
            }
        }
    }
}
