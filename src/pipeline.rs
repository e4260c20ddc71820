/// One analysis pass: chunk, analyze, rank, draft a fix.
///
/// Model failures inside the pass are absorbed by each stage. Only the two
/// preconditions (a registered model, a non-empty corpus) fail the run.
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::analysis::analyzer::BugReportAnalyzer;
use crate::analysis::fix::{FixSuggestion, FixSuggestionGenerator};
use crate::analysis::ranker::{RankError, RankerOptions, RelevanceRanker};
use crate::analysis::{BugAnalysis, RankedMatch};
use crate::corpus::{DEFAULT_WINDOW, SourceFile, chunk_sources};
use crate::knowledge::KnowledgeContext;
use crate::llm::registry::ModelRegistry;
use crate::llm::translate::TranslationBridge;
use crate::llm::{Sampling, Specialty};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PipelineError {
    #[error("no model endpoints are registered")]
    EmptyRegistry,

    #[error("the source corpus produced no chunks")]
    EmptyCorpus,
}

impl From<RankError> for PipelineError {
    fn from(e: RankError) -> Self {
        match e {
            RankError::EmptyInput => PipelineError::EmptyCorpus,
            RankError::EmptyRegistry => PipelineError::EmptyRegistry,
        }
    }
}

/// Report and working language for the translation bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Languages {
    pub report: String,
    pub working: String,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub window: usize,
    pub ranker: RankerOptions,
    pub sampling: Sampling,
    /// `Some` enables translation when a translation endpoint exists.
    pub translation: Option<Languages>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            ranker: RankerOptions::default(),
            sampling: Sampling::default(),
            translation: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOutcome {
    pub analysis: BugAnalysis,
    pub matches: Vec<RankedMatch>,
    pub fix: Option<FixSuggestion>,
    pub chunk_count: usize,
}

pub struct BugLocator<'a> {
    registry: &'a ModelRegistry,
    knowledge: Option<String>,
    options: PipelineOptions,
}

impl<'a> BugLocator<'a> {
    pub fn new(registry: &'a ModelRegistry, options: PipelineOptions) -> Self {
        Self {
            registry,
            knowledge: None,
            options,
        }
    }

    #[must_use]
    pub fn with_knowledge(mut self, knowledge: &KnowledgeContext) -> Self {
        self.knowledge = knowledge.render();
        self
    }

    pub fn run(&self, report: &str, files: &[SourceFile]) -> Result<AnalysisOutcome, PipelineError> {
        if self.registry.is_empty() {
            return Err(PipelineError::EmptyRegistry);
        }
        let chunks = chunk_sources(files, self.options.window);
        if chunks.is_empty() {
            return Err(PipelineError::EmptyCorpus);
        }
        info!("{} files -> {} chunks", files.len(), chunks.len());

        let bridge = self.bridge();
        let bridge = bridge.as_ref();

        let analysis = BugReportAnalyzer::new(self.registry)
            .with_bridge(bridge)
            .with_sampling(self.options.sampling)
            .analyze(report);

        let mut ranker_options = self.options.ranker.clone();
        ranker_options.sampling = self.options.sampling;
        let matches = RelevanceRanker::new(self.registry, ranker_options)
            .with_bridge(bridge)
            .with_knowledge(self.knowledge.as_deref())
            .rank(&analysis, &chunks)?;

        let fix = matches.first().map(|top| {
            FixSuggestionGenerator::new(self.registry, self.options.ranker.max_chunk_chars)
                .with_bridge(bridge)
                .with_sampling(self.options.sampling)
                .generate(report, top)
        });

        Ok(AnalysisOutcome {
            analysis,
            matches,
            fix,
            chunk_count: chunks.len(),
        })
    }

    fn bridge(&self) -> Option<TranslationBridge<'a>> {
        let languages = self.options.translation.as_ref()?;
        match self.registry.find_exact(&Specialty::Translation) {
            Some(model) => Some(TranslationBridge::new(
                model,
                &languages.report,
                &languages.working,
            )),
            None => {
                warn!("Translation enabled but no translation endpoint is registered");
                None
            }
        }
    }
}
