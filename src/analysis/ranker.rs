/// Relevance ranker: prefilter, score with a model, merge, fall back.
///
/// Scoring is sequential. In batched mode each prompt carries up to
/// `batch_size` chunks and asks for a JSON array; in per-chunk mode each
/// chunk gets its own call and a JSON object reply, followed by a fixed
/// delay. A failed call or unparseable reply drops that batch or chunk
/// only. When nothing was scored the first `top_n` input chunks come back
/// with [`FALLBACK_SCORE`].
use std::collections::HashSet;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::prefilter::{DEFAULT_MIN_RETAINED, prefilter};
use super::{BugAnalysis, CodeReference, Level, MatchSource, RankedMatch, text};
use crate::corpus::CodeChunk;
use crate::llm::json_extract::{self, ARRAY_STRATEGIES, OBJECT_STRATEGIES};
use crate::llm::registry::{ModelRegistry, RegisteredModel};
use crate::llm::translate::TranslationBridge;
use crate::llm::{ChatRequest, Sampling, Specialty, truncate_chars};

/// Endpoint preference for relevance scoring.
pub const RANKER_PREFERENCES: &[Specialty] = &[Specialty::Analysis, Specialty::Code];

/// Score given to unscored fallback matches.
pub const FALLBACK_SCORE: u8 = 0;
pub const FALLBACK_REASONING: &str = "No analysis available";
pub const MAX_SCORE: u8 = 10;

const TRUNCATION_MARKER: &str = "... (truncated)";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RankError {
    #[error("no chunks to rank")]
    EmptyInput,

    #[error("no model registered for relevance scoring")]
    EmptyRegistry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMode {
    #[default]
    Batched,
    PerChunk,
}

#[derive(Debug, Clone)]
pub struct RankerOptions {
    pub mode: ScoringMode,
    pub batch_size: usize,
    /// Chunk content beyond this many characters is cut in prompts.
    pub max_chunk_chars: usize,
    pub top_n: usize,
    /// Prefilter minimum; see [`prefilter`].
    pub min_retained: usize,
    /// Per-chunk mode scores at most this many prefiltered chunks.
    pub per_chunk_limit: usize,
    pub inter_call_delay: Duration,
    pub sampling: Sampling,
}

impl Default for RankerOptions {
    fn default() -> Self {
        Self {
            mode: ScoringMode::Batched,
            batch_size: 10,
            max_chunk_chars: 1500,
            top_n: 5,
            min_retained: DEFAULT_MIN_RETAINED,
            per_chunk_limit: 10,
            inter_call_delay: Duration::from_millis(500),
            sampling: Sampling::default(),
        }
    }
}

/// A scored match plus its position in the prefiltered order.
struct Scored {
    ordinal: usize,
    item: RankedMatch,
}

pub struct RelevanceRanker<'a> {
    registry: &'a ModelRegistry,
    bridge: Option<&'a TranslationBridge<'a>>,
    knowledge: Option<&'a str>,
    options: RankerOptions,
}

impl<'a> RelevanceRanker<'a> {
    pub fn new(registry: &'a ModelRegistry, options: RankerOptions) -> Self {
        Self {
            registry,
            bridge: None,
            knowledge: None,
            options,
        }
    }

    #[must_use]
    pub fn with_bridge(mut self, bridge: Option<&'a TranslationBridge<'a>>) -> Self {
        self.bridge = bridge;
        self
    }

    /// Rendered glossary/script context appended to every scoring prompt.
    #[must_use]
    pub fn with_knowledge(mut self, knowledge: Option<&'a str>) -> Self {
        self.knowledge = knowledge.filter(|k| !k.trim().is_empty());
        self
    }

    #[must_use]
    pub fn options(&self) -> &RankerOptions {
        &self.options
    }

    /// Rank `chunks` against `analysis`. Returns between 1 and `top_n`
    /// matches for non-empty input, sorted by score descending with ties in
    /// prefiltered order.
    pub fn rank(
        &self,
        analysis: &BugAnalysis,
        chunks: &[CodeChunk],
    ) -> Result<Vec<RankedMatch>, RankError> {
        if chunks.is_empty() {
            return Err(RankError::EmptyInput);
        }
        let top_n = self.options.top_n.max(1);

        let candidates = prefilter(analysis, chunks, self.options.min_retained);
        info!(
            "Ranking {} of {} chunks ({:?} mode)",
            candidates.len(),
            chunks.len(),
            self.options.mode
        );

        let model = self
            .registry
            .select(RANKER_PREFERENCES)
            .ok_or(RankError::EmptyRegistry)?;
        info!("Scoring with '{}'", model.name());

        let mut scored = match self.options.mode {
            ScoringMode::Batched => self.score_batches(model, analysis, &candidates),
            ScoringMode::PerChunk => self.score_each(model, analysis, &candidates),
        };

        if scored.is_empty() {
            warn!("No chunk was scored, returning the first {top_n} chunks unranked");
            return Ok(fallback(chunks, top_n));
        }

        scored.sort_by(|a, b| {
            b.item
                .relevance_score
                .cmp(&a.item.relevance_score)
                .then(a.ordinal.cmp(&b.ordinal))
        });
        scored.truncate(top_n);
        info!("Ranking complete: {} matches", scored.len());

        Ok(scored
            .into_iter()
            .map(|s| self.localize(s.item))
            .collect())
    }

    fn score_batches(
        &self,
        model: &RegisteredModel,
        analysis: &BugAnalysis,
        candidates: &[&CodeChunk],
    ) -> Vec<Scored> {
        let batch_size = self.options.batch_size.max(1);
        let total = candidates.len().div_ceil(batch_size);
        let mut scored = Vec::new();

        for (b, batch) in candidates.chunks(batch_size).enumerate() {
            debug!("Scoring batch {}/{total} ({} chunks)", b + 1, batch.len());
            let prompt = batch_prompt(
                analysis,
                batch,
                self.options.max_chunk_chars,
                self.knowledge,
            );
            let reply = match model.complete(&self.request(&prompt)) {
                Ok(reply) => reply,
                Err(e) => {
                    warn!("Batch {}/{total} failed: {e}", b + 1);
                    continue;
                }
            };
            let Some(items) = json_extract::decode::<Vec<Value>>(&reply, ARRAY_STRATEGIES) else {
                warn!("Batch {}/{total}: no JSON array in reply", b + 1);
                continue;
            };

            let mut seen = HashSet::new();
            for item in &items {
                let Some(index) = item.get("chunk_index").and_then(integer) else {
                    continue;
                };
                // 1-based in the prompt
                let Some(local) = usize::try_from(index)
                    .ok()
                    .and_then(|i| i.checked_sub(1))
                    .filter(|&i| i < batch.len())
                else {
                    debug!("Batch {}: chunk_index {index} out of range", b + 1);
                    continue;
                };
                if !seen.insert(local) {
                    continue;
                }
                if let Some(m) = scored_match(batch[local], item) {
                    scored.push(Scored {
                        ordinal: b * batch_size + local,
                        item: m,
                    });
                }
            }
        }
        scored
    }

    fn score_each(
        &self,
        model: &RegisteredModel,
        analysis: &BugAnalysis,
        candidates: &[&CodeChunk],
    ) -> Vec<Scored> {
        let limit = candidates.len().min(self.options.per_chunk_limit.max(1));
        let mut scored = Vec::new();

        for (ordinal, chunk) in candidates.iter().take(limit).enumerate() {
            debug!("Scoring {} ({}/{limit})", chunk.file_name(), ordinal + 1);
            let prompt = chunk_prompt(
                analysis,
                chunk,
                self.options.max_chunk_chars,
                self.knowledge,
            );
            let result = model.complete(&self.request(&prompt));
            if !self.options.inter_call_delay.is_zero() {
                thread::sleep(self.options.inter_call_delay);
            }

            let reply = match result {
                Ok(reply) => reply,
                Err(e) => {
                    warn!("Scoring {} failed: {e}", chunk.file_name());
                    continue;
                }
            };
            let parsed = json_extract::decode::<Value>(&reply, OBJECT_STRATEGIES)
                .and_then(|item| scored_match(chunk, &item));
            match parsed {
                Some(item) => scored.push(Scored { ordinal, item }),
                None => warn!("Scoring {}: no usable JSON in reply", chunk.file_name()),
            }
        }
        scored
    }

    fn request<'p>(&self, prompt: &'p str) -> ChatRequest<'p> {
        ChatRequest::new(prompt).with_sampling(self.options.sampling)
    }

    /// Translate user-facing free text back to the report language.
    fn localize(&self, mut item: RankedMatch) -> RankedMatch {
        let Some(bridge) = self.bridge else {
            return item;
        };
        item.reasoning = bridge.to_report(&item.reasoning);
        for reference in &mut item.referenced_code {
            reference.reason = bridge.to_report(&reference.reason);
        }
        item
    }
}

fn fallback(chunks: &[CodeChunk], top_n: usize) -> Vec<RankedMatch> {
    chunks
        .iter()
        .take(top_n)
        .map(|chunk| RankedMatch {
            chunk: chunk.clone(),
            relevance_score: FALLBACK_SCORE,
            reasoning: FALLBACK_REASONING.to_string(),
            suspected_lines: Vec::new(),
            referenced_code: Vec::new(),
            confidence: Level::Unknown,
            source: MatchSource::Fallback,
        })
        .collect()
}

// ── Prompts ─────────────────────────────────────────────────

fn bug_information(analysis: &BugAnalysis) -> String {
    let keywords = if analysis.keywords.is_empty() {
        "No specific keywords".to_string()
    } else {
        analysis.keywords.join(", ")
    };
    let summary = if analysis.summary.is_empty() {
        "No summary available"
    } else {
        analysis.summary.as_str()
    };
    let mut out = format!("# BUG INFORMATION\n- Keywords: {keywords}\n- Bug Summary: {summary}\n");
    if !analysis.suspected_functions.is_empty() {
        out.push_str(&format!(
            "- Suspected Functions: {}\n",
            analysis.suspected_functions.join(", ")
        ));
    }
    out
}

fn knowledge_section(knowledge: Option<&str>) -> String {
    match knowledge {
        Some(k) => format!(
            "\n# CONTEXT KNOWLEDGE\n\
             Use this only to understand terms; do not cite it as code.\n{k}\n"
        ),
        None => String::new(),
    }
}

fn code_block(chunk: &CodeChunk, max_chars: usize) -> String {
    let content = truncate_chars(chunk.content.trim(), max_chars, TRUNCATION_MARKER);
    format!(
        "- File: {}\n- Lines: {}-{}\n```\n{content}\n```\n",
        chunk.file_name(),
        chunk.start_line,
        chunk.end_line
    )
}

pub fn batch_prompt(
    analysis: &BugAnalysis,
    batch: &[&CodeChunk],
    max_chars: usize,
    knowledge: Option<&str>,
) -> String {
    let mut prompt = String::from(
        "You are a specialized code analysis agent analyzing bug reports and source code.\n\n\
         Analyze each code chunk below and decide how relevant it is to the bug report.\n\n",
    );
    prompt.push_str(&bug_information(analysis));
    prompt.push_str(&knowledge_section(knowledge));
    prompt.push_str("\n# CODE CHUNKS TO ANALYZE\n");
    for (i, chunk) in batch.iter().enumerate() {
        prompt.push_str(&format!("\nCHUNK {}:\n", i + 1));
        prompt.push_str(&code_block(chunk, max_chars));
    }
    prompt.push_str(
        "\n# ANALYSIS INSTRUCTIONS\n\
         For each code chunk, decide:\n\
         1. How relevant it is to the bug (score from 0-10)\n\
         2. Why it might be connected to the bug\n\
         3. Which visible lines support that judgement\n\n\
         Only reference code that is shown above.\n\n\
         # RESPONSE FORMAT\n\
         Respond with a JSON array, one element per chunk:\n\
         ```json\n\
         [\n\
           {\n\
             \"chunk_index\": 1,\n\
             \"relevance_score\": 8,\n\
             \"reasoning\": \"why this chunk is or is not related\",\n\
             \"suspected_lines\": [42],\n\
             \"referenced_code\": [{\"line\": 42, \"code\": \"the line\", \"reason\": \"why\"}],\n\
             \"confidence\": \"high\"\n\
           }\n\
         ]\n\
         ```\n",
    );
    prompt
}

pub fn chunk_prompt(
    analysis: &BugAnalysis,
    chunk: &CodeChunk,
    max_chars: usize,
    knowledge: Option<&str>,
) -> String {
    let mut prompt = String::from(
        "You are a C++ code analysis tool. Decide whether the code below is related to the bug.\n\n",
    );
    prompt.push_str(&bug_information(analysis));
    prompt.push_str(&knowledge_section(knowledge));
    prompt.push_str("\n# CODE\n");
    prompt.push_str(&code_block(chunk, max_chars));
    prompt.push_str(
        "\n# RULES\n\
         - Base the analysis only on the code shown.\n\
         - Do not mention functions, classes or variables that do not appear.\n\
         - Give exact line numbers for every line you reference.\n\
         - If unsure, say so and lower the confidence.\n\n\
         Respond only with this JSON object:\n\
         ```json\n\
         {\n\
           \"relevance_score\": 0,\n\
           \"reasoning\": \"why the code is or is not related\",\n\
           \"suspected_lines\": [],\n\
           \"referenced_code\": [{\"line\": 0, \"code\": \"the line\", \"reason\": \"why\"}],\n\
           \"confidence\": \"high/medium/low\"\n\
         }\n\
         ```\n",
    );
    prompt
}

// ── Reply coercion ──────────────────────────────────────────

/// Build a match from one reply element. `None` without a usable score.
fn scored_match(chunk: &CodeChunk, item: &Value) -> Option<RankedMatch> {
    let relevance_score = coerce_score(&item["relevance_score"])?;

    Some(RankedMatch {
        chunk: chunk.clone(),
        relevance_score,
        reasoning: text(&item["reasoning"]).unwrap_or_default(),
        suspected_lines: line_numbers(&item["suspected_lines"]),
        referenced_code: references(&item["referenced_code"]),
        confidence: text(&item["confidence"])
            .map(|c| Level::parse_lenient(&c))
            .unwrap_or_default(),
        source: MatchSource::Model,
    })
}

/// Numbers, numeric strings (`"8"`, `"8/10"`) and floats, rounded and
/// clamped into `0..=10`.
fn coerce_score(value: &Value) -> Option<u8> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.split('/').next()?.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !raw.is_finite() {
        return None;
    }
    Some(raw.round().clamp(0.0, f64::from(MAX_SCORE)) as u8)
}

fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn line_number(value: &Value) -> Option<u32> {
    integer(value).and_then(|n| u32::try_from(n).ok()).filter(|&n| n > 0)
}

fn line_numbers(value: &Value) -> Vec<u32> {
    match value {
        Value::Array(items) => items.iter().filter_map(line_number).collect(),
        other => line_number(other).into_iter().collect(),
    }
}

/// `referenced_code` as a list of `{line, code, reason}` objects, a list of
/// strings, or a single string.
fn references(value: &Value) -> Vec<CodeReference> {
    let one = |v: &Value| -> Option<CodeReference> {
        match v {
            Value::Object(_) => {
                let code = text(&v["code"]).unwrap_or_default();
                let reason = text(&v["reason"]).unwrap_or_default();
                let line = line_number(&v["line"]);
                (line.is_some() || !code.is_empty() || !reason.is_empty()).then_some(
                    CodeReference { line, code, reason },
                )
            }
            other => text(other).map(|code| CodeReference {
                line: None,
                code,
                reason: String::new(),
            }),
        }
    };

    match value {
        Value::Array(items) => items.iter().filter_map(one).collect(),
        other => one(other).into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Severity;
    use crate::llm::mock::MockModel;
    use crate::llm::registry::{ModelEndpoint, SMOKE_TEST_PROMPT};
    use serde_json::json;

    fn chunk(i: usize, content: &str) -> CodeChunk {
        CodeChunk {
            file_path: format!("src/unit{i}.cpp"),
            start_line: i * 100 + 1,
            end_line: i * 100 + 100,
            content: content.to_string(),
        }
    }

    fn registry_with(model: MockModel) -> ModelRegistry {
        let mut registry = ModelRegistry::new();
        registry
            .register_with(
                ModelEndpoint::new("coder", "http://localhost:1", "m", Specialty::Code),
                Box::new(model),
            )
            .unwrap();
        registry
    }

    fn options() -> RankerOptions {
        RankerOptions {
            inter_call_delay: Duration::ZERO,
            ..RankerOptions::default()
        }
    }

    fn probe_or<F>(f: F) -> MockModel
    where
        F: Fn(&str) -> Result<String, crate::llm::ModelError> + Send + Sync + 'static,
    {
        MockModel::new(move |req| {
            if req.prompt == SMOKE_TEST_PROMPT {
                Ok("ok".to_string())
            } else {
                f(req.prompt)
            }
        })
    }

    #[test]
    fn test_sorted_descending_with_stable_ties() {
        let chunks: Vec<CodeChunk> = (0..4).map(|i| chunk(i, &format!("code {i}"))).collect();
        let reply = json!([
            {"chunk_index": 4, "relevance_score": 2, "reasoning": "d"},
            {"chunk_index": 2, "relevance_score": 9, "reasoning": "b"},
            {"chunk_index": 3, "relevance_score": 5, "reasoning": "c"},
            {"chunk_index": 1, "relevance_score": 5, "reasoning": "a"}
        ])
        .to_string();
        let registry = registry_with(MockModel::replying(&reply));
        let ranked = RelevanceRanker::new(&registry, options())
            .rank(&BugAnalysis::default(), &chunks)
            .unwrap();

        let reasons: Vec<&str> = ranked.iter().map(|m| m.reasoning.as_str()).collect();
        assert_eq!(reasons, vec!["b", "a", "c", "d"]);
        assert!(ranked.windows(2).all(|w| w[0].relevance_score >= w[1].relevance_score));
        assert!(ranked.iter().all(|m| m.source == MatchSource::Model));
    }

    #[test]
    fn test_fallback_when_scoring_always_fails() {
        let chunks: Vec<CodeChunk> = (0..7).map(|i| chunk(i, "x")).collect();
        let registry = registry_with(MockModel::failing_after_probe());
        let ranker = RelevanceRanker::new(&registry, options());

        let ranked = ranker.rank(&BugAnalysis::default(), &chunks).unwrap();
        assert_eq!(ranked.len(), 5);
        assert!(ranked.iter().all(|m| m.relevance_score == FALLBACK_SCORE));
        assert!(ranked.iter().all(|m| m.source == MatchSource::Fallback));
        assert_eq!(ranked[0].reasoning, FALLBACK_REASONING);
        assert_eq!(ranked[0].chunk, chunks[0]);

        let ranked = ranker.rank(&BugAnalysis::default(), &chunks[..2]).unwrap();
        assert_eq!(ranked.len(), 2);
    }

    #[test]
    fn test_fallback_when_reply_unparseable() {
        let chunks = vec![chunk(0, "x")];
        let registry = registry_with(MockModel::replying("I think chunk 1 matters."));
        let ranked = RelevanceRanker::new(&registry, options())
            .rank(&BugAnalysis::default(), &chunks)
            .unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].source, MatchSource::Fallback);
    }

    #[test]
    fn test_failed_batch_is_skipped() {
        let chunks = vec![
            chunk(0, "alpha"),
            chunk(1, "alpha two"),
            chunk(2, "beta"),
            chunk(3, "beta two"),
        ];
        let registry = registry_with(probe_or(|prompt| {
            if prompt.contains("alpha") {
                Err(crate::llm::ModelError::Request("timeout".to_string()))
            } else {
                Ok(r#"[{"chunk_index": 2, "relevance_score": 7}]"#.to_string())
            }
        }));
        let opts = RankerOptions {
            batch_size: 2,
            ..options()
        };
        let ranked = RelevanceRanker::new(&registry, opts)
            .rank(&BugAnalysis::default(), &chunks)
            .unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].chunk.content, "beta two");
        assert_eq!(ranked[0].relevance_score, 7);
    }

    #[test]
    fn test_top_n_and_batch_ordinals() {
        let chunks: Vec<CodeChunk> = (0..6).map(|i| chunk(i, &format!("c{i}"))).collect();
        // every batch scores all its chunks 5, so ties keep input order
        let registry = registry_with(MockModel::replying(
            r#"[{"chunk_index": 1, "relevance_score": 5}, {"chunk_index": 2, "relevance_score": 5}]"#,
        ));
        let opts = RankerOptions {
            batch_size: 2,
            top_n: 4,
            ..options()
        };
        let ranked = RelevanceRanker::new(&registry, opts)
            .rank(&BugAnalysis::default(), &chunks)
            .unwrap();
        let contents: Vec<&str> = ranked.iter().map(|m| m.chunk.content.as_str()).collect();
        assert_eq!(contents, vec!["c0", "c1", "c2", "c3"]);
    }

    #[test]
    fn test_bad_indices_ignored() {
        let chunks = vec![chunk(0, "a"), chunk(1, "b")];
        let registry = registry_with(MockModel::replying(
            r#"[{"chunk_index": 0, "relevance_score": 9},
                {"chunk_index": 3, "relevance_score": 9},
                {"chunk_index": "2", "relevance_score": 4},
                {"chunk_index": 2, "relevance_score": 10},
                {"relevance_score": 8}]"#,
        ));
        let ranked = RelevanceRanker::new(&registry, options())
            .rank(&BugAnalysis::default(), &chunks)
            .unwrap();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].chunk.content, "b");
        assert_eq!(ranked[0].relevance_score, 4);
    }

    #[test]
    fn test_errors() {
        let registry = registry_with(MockModel::replying("[]"));
        let ranker = RelevanceRanker::new(&registry, options());
        assert_eq!(
            ranker.rank(&BugAnalysis::default(), &[]).unwrap_err(),
            RankError::EmptyInput
        );

        let empty = ModelRegistry::new();
        let err = RelevanceRanker::new(&empty, options())
            .rank(&BugAnalysis::default(), &[chunk(0, "x")])
            .unwrap_err();
        assert_eq!(err, RankError::EmptyRegistry);
    }

    /// Mock that records when each scoring call arrives.
    fn timed_model(
        reply: &'static str,
    ) -> (MockModel, std::sync::Arc<std::sync::Mutex<Vec<std::time::Instant>>>) {
        let calls = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let log = calls.clone();
        let model = probe_or(move |_| {
            log.lock().unwrap().push(std::time::Instant::now());
            Ok(reply.to_string())
        });
        (model, calls)
    }

    #[test]
    fn test_per_chunk_delay_follows_every_call() {
        let delay = Duration::from_millis(20);
        let chunks: Vec<CodeChunk> = (0..3).map(|i| chunk(i, &format!("body{i}"))).collect();
        let (model, calls) = timed_model(r#"{"relevance_score": 4}"#);
        let registry = registry_with(model);
        let opts = RankerOptions {
            mode: ScoringMode::PerChunk,
            inter_call_delay: delay,
            ..options()
        };

        let start = std::time::Instant::now();
        let ranked = RelevanceRanker::new(&registry, opts)
            .rank(&BugAnalysis::default(), &chunks)
            .unwrap();
        let elapsed = start.elapsed();

        assert_eq!(ranked.len(), 3);
        assert!(elapsed >= delay * 3, "elapsed {elapsed:?}");
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        for pair in calls.windows(2) {
            assert!(pair[1].duration_since(pair[0]) >= delay);
        }
    }

    #[test]
    fn test_batched_mode_has_no_delay() {
        let delay = Duration::from_secs(2);
        let chunks: Vec<CodeChunk> = (0..3).map(|i| chunk(i, &format!("body{i}"))).collect();
        let (model, calls) = timed_model(r#"[{"chunk_index": 1, "relevance_score": 4}]"#);
        let registry = registry_with(model);
        let opts = RankerOptions {
            batch_size: 1,
            inter_call_delay: delay,
            ..options()
        };

        let start = std::time::Instant::now();
        let ranked = RelevanceRanker::new(&registry, opts)
            .rank(&BugAnalysis::default(), &chunks)
            .unwrap();

        assert_eq!(ranked.len(), 3);
        assert_eq!(calls.lock().unwrap().len(), 3);
        assert!(start.elapsed() < delay);
    }

    #[test]
    fn test_per_chunk_mode() {
        let chunks: Vec<CodeChunk> = (0..3).map(|i| chunk(i, &format!("body{i}"))).collect();
        let mock = std::sync::Arc::new(probe_or(|prompt| {
            let score = if prompt.contains("body1") { 8 } else { 3 };
            Ok(format!(
                "```json\n{{\"relevance_score\": {score}, \"reasoning\": \"r\", \
                 \"suspected_lines\": [105, \"106\"], \
                 \"referenced_code\": [{{\"line\": 105, \"code\": \"delete p;\", \"reason\": \"double free\"}}], \
                 \"confidence\": \"높음\"}}\n```"
            ))
        }));
        let mut registry = ModelRegistry::new();
        registry
            .register_with(
                ModelEndpoint::new("coder", "http://localhost:1", "m", Specialty::Code),
                Box::new(mock.clone()),
            )
            .unwrap();
        let opts = RankerOptions {
            mode: ScoringMode::PerChunk,
            per_chunk_limit: 2,
            ..options()
        };
        let ranked = RelevanceRanker::new(&registry, opts)
            .rank(&BugAnalysis::default(), &chunks)
            .unwrap();

        assert_eq!(mock.call_count(), 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].chunk.content, "body1");
        assert_eq!(ranked[0].suspected_lines, vec![105, 106]);
        assert_eq!(ranked[0].referenced_code[0].line, Some(105));
        assert_eq!(ranked[0].confidence, Level::High);
    }

    #[test]
    fn test_prompt_truncates_and_labels() {
        let long = "x".repeat(50);
        let c = chunk(0, &long);
        let analysis = BugAnalysis::new(
            vec!["CSkillUse".into()],
            vec![],
            "crash",
            Severity::High,
            "boom",
        );
        let prompt = batch_prompt(&analysis, &[&c, &c], 10, Some("- CSkillUse: skill class"));
        assert!(prompt.contains("CHUNK 1:"));
        assert!(prompt.contains("CHUNK 2:"));
        assert!(prompt.contains("- File: unit0.cpp"));
        assert!(prompt.contains("- Lines: 1-100"));
        assert!(prompt.contains(&format!("{}{TRUNCATION_MARKER}", "x".repeat(10))));
        assert!(!prompt.contains(&"x".repeat(11)));
        assert!(prompt.contains("- Keywords: CSkillUse"));
        assert!(prompt.contains("CONTEXT KNOWLEDGE"));
    }

    #[test]
    fn test_reasoning_translated() {
        let chunks = vec![chunk(0, "x")];
        let registry = registry_with(probe_or(|prompt| {
            if prompt.starts_with("Translate the following") {
                Ok("번역됨".to_string())
            } else {
                Ok(r#"[{"chunk_index": 1, "relevance_score": 6, "reasoning": "translated",
                        "referenced_code": "delete p;"}]"#
                    .to_string())
            }
        }));
        let bridge = TranslationBridge::new(registry.get("coder").unwrap(), "Korean", "English");
        let ranked = RelevanceRanker::new(&registry, options())
            .with_bridge(Some(&bridge))
            .rank(&BugAnalysis::default(), &chunks)
            .unwrap();
        assert_eq!(ranked[0].reasoning, "번역됨");
        assert_eq!(ranked[0].referenced_code[0].code, "delete p;");
        assert_eq!(ranked[0].referenced_code[0].line, None);
    }

    #[test]
    fn test_coerce_score() {
        assert_eq!(coerce_score(&json!(7)), Some(7));
        assert_eq!(coerce_score(&json!(7.6)), Some(8));
        assert_eq!(coerce_score(&json!("8/10")), Some(8));
        assert_eq!(coerce_score(&json!(15)), Some(10));
        assert_eq!(coerce_score(&json!(-3)), Some(0));
        assert_eq!(coerce_score(&json!("high")), None);
        assert_eq!(coerce_score(&Value::Null), None);
    }
}
