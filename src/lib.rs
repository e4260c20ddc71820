//! # bugscope: bug localization over a source corpus
//!
//! Correlates a free-text bug report with fixed-size source chunks, ranks
//! them with a locally hosted chat model and drafts a fix for the best match.
//! A model-free TF-IDF ranking is available as a standalone baseline.
//!
//! ## Architecture
//!
//! - **[`corpus`]**: Source discovery, encoding negotiation, line-window chunking
//! - **[`lexical`]**: TF-IDF + cosine similarity ranking (no model calls)
//! - **[`llm`]**: Chat model trait, OpenAI-compatible client, registry, JSON extraction, translation
//! - **[`analysis`]**: Report analysis, keyword prefilter, relevance ranking, fix drafting
//! - **[`knowledge`]**: Developer glossary and game-script context for prompts
//! - **[`pipeline`]**: One end-to-end analysis pass
//! - **[`report`]**: JSON persistence and console rendering
//! - **[`config`]**: Configuration loading and validation

pub mod analysis;
pub mod config;
pub mod corpus;
pub mod knowledge;
pub mod lexical;
pub mod llm;
pub mod pipeline;
pub mod report;
