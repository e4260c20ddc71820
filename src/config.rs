/// Configuration module for bugscope.
///
/// Handles loading, validating, and providing default configuration values.
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::analysis::ranker::{RankerOptions, ScoringMode};
use crate::corpus::{DEFAULT_WINDOW, Decoder};
use crate::lexical::DEFAULT_MAX_FEATURES;
use crate::llm::registry::ModelEndpoint;
use crate::llm::{Sampling, Specialty};
use crate::pipeline::{Languages, PipelineOptions};

pub const DEFAULT_CONFIG_PATH: &str = "config.json";

pub const DEFAULT_ENDPOINT_NAME: &str = "default-coder";
pub const DEFAULT_ENDPOINT_URL: &str = "http://localhost:1234";
pub const DEFAULT_ENDPOINT_MODEL: &str = "Qwen2.5-Coder-7B-Instruct-Uncensored";

// ── Default value functions ──────────────────────────────────────────

fn default_chunk_window() -> usize {
    DEFAULT_WINDOW
}

fn default_extensions() -> Vec<String> {
    vec!["cpp".to_string(), "h".to_string()]
}

/// Same order as `Decoder::default`: UTF-8 before the legacy code page.
fn default_encodings() -> Vec<String> {
    vec!["utf-8".to_string(), "euc-kr".to_string()]
}

fn default_output_path() -> String {
    "bug_analysis_results.json".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> u32 {
    2000
}

fn default_batch_size() -> usize {
    10
}

fn default_max_chunk_chars() -> usize {
    1500
}

fn default_top_n() -> usize {
    5
}

fn default_min_prefilter_matches() -> usize {
    3
}

fn default_per_chunk_limit() -> usize {
    10
}

fn default_inter_call_delay_ms() -> u64 {
    500
}

fn default_max_features() -> usize {
    DEFAULT_MAX_FEATURES
}

fn default_lexical_top_n() -> usize {
    10
}

fn default_report_language() -> String {
    "Korean".to_string()
}

fn default_working_language() -> String {
    "English".to_string()
}

fn default_specialty() -> Specialty {
    Specialty::General
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default = "default_chunk_window")]
    pub chunk_window: usize,

    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Tried in order; first clean decode wins.
    #[serde(default = "default_encodings")]
    pub encodings: Vec<String>,

    #[serde(default)]
    pub request: RequestConfig,

    #[serde(default)]
    pub ranking: RankingConfig,

    #[serde(default)]
    pub lexical: LexicalConfig,

    #[serde(default)]
    pub translation: TranslationConfig,

    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,

    /// Deprecated: use `endpoints` instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_servers: Option<LegacyServers>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bug_report_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_dir: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge_file: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_dir: Option<String>,

    #[serde(default = "default_output_path")]
    pub output_path: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RequestConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RankingConfig {
    #[serde(default)]
    pub mode: ScoringMode,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,

    #[serde(default = "default_top_n")]
    pub top_n: usize,

    #[serde(default = "default_min_prefilter_matches")]
    pub min_prefilter_matches: usize,

    #[serde(default = "default_per_chunk_limit")]
    pub per_chunk_limit: usize,

    #[serde(default = "default_inter_call_delay_ms")]
    pub inter_call_delay_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LexicalConfig {
    #[serde(default = "default_max_features")]
    pub max_features: usize,

    #[serde(default = "default_lexical_top_n")]
    pub top_n: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TranslationConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_report_language")]
    pub report_language: String,

    #[serde(default = "default_working_language")]
    pub working_language: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EndpointConfig {
    pub name: String,
    pub url: String,
    pub model: String,

    #[serde(default = "default_specialty")]
    pub specialty: Specialty,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl EndpointConfig {
    #[must_use]
    pub fn to_endpoint(&self) -> ModelEndpoint {
        ModelEndpoint::new(&self.name, &self.url, &self.model, self.specialty.clone())
    }
}

/// Older layout: one translator plus a list of code analyzers.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct LegacyServers {
    #[serde(default)]
    pub translator: Option<LegacyServer>,

    #[serde(default)]
    pub code_analyzers: Vec<EndpointConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LegacyServer {
    pub url: String,
    pub model: String,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_window: default_chunk_window(),
            extensions: default_extensions(),
            encodings: default_encodings(),
            request: RequestConfig::default(),
            ranking: RankingConfig::default(),
            lexical: LexicalConfig::default(),
            translation: TranslationConfig::default(),
            endpoints: Vec::new(),
            llm_servers: None,
            bug_report_path: None,
            source_dir: None,
            knowledge_file: None,
            script_dir: None,
            output_path: default_output_path(),
        }
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            mode: ScoringMode::default(),
            batch_size: default_batch_size(),
            max_chunk_chars: default_max_chunk_chars(),
            top_n: default_top_n(),
            min_prefilter_matches: default_min_prefilter_matches(),
            per_chunk_limit: default_per_chunk_limit(),
            inter_call_delay_ms: default_inter_call_delay_ms(),
        }
    }
}

impl Default for LexicalConfig {
    fn default() -> Self {
        Self {
            max_features: default_max_features(),
            top_n: default_lexical_top_n(),
        }
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            report_language: default_report_language(),
            working_language: default_working_language(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// If `config_path` is empty, defaults to `"config.json"`.
    /// If the file does not exist, returns a default config and generates
    /// a template file for the default path.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            DEFAULT_CONFIG_PATH
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            let cfg = Self::default();

            if path == DEFAULT_CONFIG_PATH {
                match cfg.save(path) {
                    Ok(()) => info!("Generated config template: {path}"),
                    Err(e) => warn!("Failed to generate config template: {e}"),
                }
            }

            return Ok(cfg);
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;

        let mut cfg: Config = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {path}: {e}");
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {path}");
        cfg.migrate_legacy_servers();
        Ok(cfg)
    }

    /// Fold the deprecated `llm_servers` block into `endpoints`.
    fn migrate_legacy_servers(&mut self) {
        let Some(legacy) = self.llm_servers.take() else {
            return;
        };
        info!("Migrating llm_servers to endpoints");

        if self.endpoints.is_empty() {
            self.endpoints = legacy.code_analyzers;
        }
        if let Some(translator) = legacy.translator {
            let exists = self
                .endpoints
                .iter()
                .any(|e| e.specialty == Specialty::Translation);
            if !exists {
                self.endpoints.push(EndpointConfig {
                    name: "translator".to_string(),
                    url: translator.url,
                    model: translator.model,
                    specialty: Specialty::Translation,
                    description: None,
                });
            }
            self.translation.enabled = true;
        }
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.chunk_window > 0, "chunk_window must be positive");
        anyhow::ensure!(
            !self.extensions.is_empty(),
            "at least one source extension must be specified"
        );
        anyhow::ensure!(
            !self.encodings.is_empty(),
            "at least one encoding must be specified"
        );
        anyhow::ensure!(
            self.request.timeout_secs > 0,
            "request.timeout_secs must be positive"
        );
        anyhow::ensure!(
            self.request.max_tokens > 0,
            "request.max_tokens must be positive"
        );
        anyhow::ensure!(self.ranking.batch_size > 0, "ranking.batch_size must be positive");
        anyhow::ensure!(
            self.ranking.max_chunk_chars > 0,
            "ranking.max_chunk_chars must be positive"
        );
        anyhow::ensure!(self.ranking.top_n > 0, "ranking.top_n must be positive");
        anyhow::ensure!(
            self.ranking.per_chunk_limit > 0,
            "ranking.per_chunk_limit must be positive"
        );
        anyhow::ensure!(self.lexical.top_n > 0, "lexical.top_n must be positive");
        anyhow::ensure!(
            self.lexical.max_features > 0,
            "lexical.max_features must be positive"
        );
        for endpoint in &self.endpoints {
            anyhow::ensure!(
                !endpoint.name.is_empty() && !endpoint.url.is_empty() && !endpoint.model.is_empty(),
                "endpoint entries need name, url and model"
            );
        }
        self.decoder()?;
        Ok(())
    }

    pub fn decoder(&self) -> Result<Decoder> {
        Decoder::from_labels(&self.encodings).context("invalid encodings")
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.request.timeout_secs)
    }

    #[must_use]
    pub fn sampling(&self) -> Sampling {
        Sampling {
            temperature: self.request.temperature,
            max_tokens: self.request.max_tokens,
        }
    }

    #[must_use]
    pub fn ranker_options(&self) -> RankerOptions {
        RankerOptions {
            mode: self.ranking.mode,
            batch_size: self.ranking.batch_size,
            max_chunk_chars: self.ranking.max_chunk_chars,
            top_n: self.ranking.top_n,
            min_retained: self.ranking.min_prefilter_matches,
            per_chunk_limit: self.ranking.per_chunk_limit,
            inter_call_delay: Duration::from_millis(self.ranking.inter_call_delay_ms),
            sampling: self.sampling(),
        }
    }

    #[must_use]
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            window: self.chunk_window,
            ranker: self.ranker_options(),
            sampling: self.sampling(),
            translation: self.translation.enabled.then(|| Languages {
                report: self.translation.report_language.clone(),
                working: self.translation.working_language.clone(),
            }),
        }
    }

    /// Endpoints to register: the configured list, else `cli`, else the
    /// built-in `default-coder`.
    #[must_use]
    pub fn resolve_endpoints(&self, cli: &[ModelEndpoint]) -> Vec<ModelEndpoint> {
        if !self.endpoints.is_empty() {
            return self.endpoints.iter().map(EndpointConfig::to_endpoint).collect();
        }
        if !cli.is_empty() {
            return cli.to_vec();
        }
        info!("No endpoints configured, using {DEFAULT_ENDPOINT_NAME}");
        vec![ModelEndpoint::new(
            DEFAULT_ENDPOINT_NAME,
            DEFAULT_ENDPOINT_URL,
            DEFAULT_ENDPOINT_MODEL,
            Specialty::Code,
        )]
    }
}

// ── Tests ────────────────────────────────────────────────────────────
