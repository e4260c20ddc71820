/// Bug report analyzer: one model call turns free text into a
/// [`BugAnalysis`].
///
/// Every failure (no endpoint, network, missing or malformed JSON) yields
/// `BugAnalysis::default()`; nothing propagates.
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use super::{BugAnalysis, Level, MAX_KEYWORDS, string_list, text};
use crate::llm::json_extract::{self, OBJECT_STRATEGIES};
use crate::llm::registry::ModelRegistry;
use crate::llm::translate::TranslationBridge;
use crate::llm::{ChatRequest, Sampling, Specialty};

/// Endpoint preference for report analysis.
pub const ANALYZER_PREFERENCES: &[Specialty] =
    &[Specialty::Analysis, Specialty::Code, Specialty::General];

/// Reply shape before coercion. Every field is optional and may arrive as
/// a string, a number or a list.
#[derive(Deserialize, Default)]
#[serde(default)]
struct RawAnalysis {
    keywords: Value,
    suspected_functions: Value,
    bug_type: Value,
    severity: Value,
    summary: Value,
}

impl RawAnalysis {
    fn into_analysis(self) -> BugAnalysis {
        let severity = text(&self.severity)
            .map(|s| Level::parse_lenient(&s))
            .unwrap_or_default();
        BugAnalysis::new(
            string_list(&self.keywords),
            string_list(&self.suspected_functions),
            &text(&self.bug_type).unwrap_or_default(),
            severity,
            &text(&self.summary).unwrap_or_default(),
        )
    }
}

pub fn analysis_prompt(report: &str) -> String {
    format!(
        "Analyze the following bug report and extract key information.\n\
         Provide your analysis in JSON format with the following fields:\n\
         - keywords: list of keywords (max {MAX_KEYWORDS})\n\
         - suspected_functions: list of function names mentioned or implied\n\
         - bug_type: type of bug (memory leak, crash, UI issue, etc.)\n\
         - severity: high/medium/low\n\
         - summary: brief summary (max 3 lines)\n\n\
         Bug Report:\n{report}\n\n\
         Respond only with the JSON."
    )
}

/// Parse a model reply into an analysis. `None` when no JSON object in
/// the reply parses.
pub fn parse_analysis(reply: &str) -> Option<BugAnalysis> {
    json_extract::decode::<RawAnalysis>(reply, OBJECT_STRATEGIES).map(RawAnalysis::into_analysis)
}

pub struct BugReportAnalyzer<'a> {
    registry: &'a ModelRegistry,
    bridge: Option<&'a TranslationBridge<'a>>,
    sampling: Sampling,
}

impl<'a> BugReportAnalyzer<'a> {
    pub fn new(registry: &'a ModelRegistry) -> Self {
        Self {
            registry,
            bridge: None,
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

    pub fn analyze(&self, report: &str) -> BugAnalysis {
        let Some(model) = self.registry.select(ANALYZER_PREFERENCES) else {
            warn!("No model registered for report analysis");
            return BugAnalysis::default();
        };

        let working_report = match self.bridge {
            Some(bridge) => bridge.to_working(report),
            None => report.to_string(),
        };

        info!(
            "Analyzing bug report ({} chars) with '{}'",
            report.chars().count(),
            model.name()
        );
        let prompt = analysis_prompt(&working_report);
        let reply = match model.complete(&ChatRequest::new(&prompt).with_sampling(self.sampling)) {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Report analysis via '{}' failed: {e}", model.name());
                return BugAnalysis::default();
            }
        };

        let Some(mut analysis) = parse_analysis(&reply) else {
            warn!("No usable JSON in the analysis reply from '{}'", model.name());
            return BugAnalysis::default();
        };

        if let Some(bridge) = self.bridge {
            analysis.summary = bridge.to_report(&analysis.summary);
        }
        info!(
            "Analysis: {} keywords, {} suspected functions, severity {}",
            analysis.keywords.len(),
            analysis.suspected_functions.len(),
            analysis.severity
        );
        analysis
    }
}
