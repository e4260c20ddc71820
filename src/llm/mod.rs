/// Chat-model abstraction shared by every model-backed stage.
///
/// A `ChatModel` turns one system+user prompt pair into reply text or a
/// `ModelError`. The HTTP implementation lives in [`openai`]; [`mock`]
/// provides a deterministic in-process model for tests.
pub mod json_extract;
pub mod mock;
pub mod openai;
pub mod registry;
pub mod translate;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from a single model call. Callers treat every variant as a
/// failed unit of work, never as fatal.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// Default system prompt for code-oriented calls.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are an expert software engineer specializing in code analysis and bug localization.";

/// Sampling parameters shared by every call of one run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for Sampling {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 2000,
        }
    }
}

/// One chat completion request.
#[derive(Debug, Clone, Copy)]
pub struct ChatRequest<'a> {
    pub system: &'a str,
    pub prompt: &'a str,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl<'a> ChatRequest<'a> {
    /// Request with the default system prompt, temperature 0.3 and 2000 tokens.
    #[must_use]
    pub fn new(prompt: &'a str) -> Self {
        let sampling = Sampling::default();
        Self {
            system: DEFAULT_SYSTEM_PROMPT,
            prompt,
            temperature: sampling.temperature,
            max_tokens: sampling.max_tokens,
        }
    }

    #[must_use]
    pub fn with_system(mut self, system: &'a str) -> Self {
        self.system = system;
        self
    }

    #[must_use]
    pub fn with_sampling(mut self, sampling: Sampling) -> Self {
        self.temperature = sampling.temperature;
        self.max_tokens = sampling.max_tokens;
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Trait for chat-completion backends.
///
/// Calls are synchronous: each blocks until a reply or the backend's
/// timeout. Implementations must be `Send + Sync`.
pub trait ChatModel: Send + Sync {
    fn complete(&self, request: &ChatRequest<'_>) -> Result<String, ModelError>;
}

impl<T: ChatModel + ?Sized> ChatModel for Arc<T> {
    fn complete(&self, request: &ChatRequest<'_>) -> Result<String, ModelError> {
        (**self).complete(request)
    }
}

impl<T: ChatModel + ?Sized> ChatModel for Box<T> {
    fn complete(&self, request: &ChatRequest<'_>) -> Result<String, ModelError> {
        (**self).complete(request)
    }
}

/// Intended use of an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Specialty {
    Translation,
    Analysis,
    Code,
    Fixing,
    General,
    Other(String),
}

impl Specialty {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Specialty::Translation => "translation",
            Specialty::Analysis => "analysis",
            Specialty::Code => "code",
            Specialty::Fixing => "fixing",
            Specialty::General => "general",
            Specialty::Other(tag) => tag,
        }
    }
}

impl FromStr for Specialty {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_lowercase();
        Ok(match tag.as_str() {
            "translation" | "translator" => Specialty::Translation,
            "analysis" => Specialty::Analysis,
            "code" => Specialty::Code,
            "fixing" | "fix" => Specialty::Fixing,
            "general" | "" => Specialty::General,
            _ => Specialty::Other(tag),
        })
    }
}

impl From<String> for Specialty {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(specialty) => specialty,
            Err(never) => match never {},
        }
    }
}

impl From<Specialty> for String {
    fn from(s: Specialty) -> Self {
        s.as_str().to_string()
    }
}

impl fmt::Display for Specialty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Truncate to at most `max_chars` characters, appending `marker` when cut.
pub fn truncate_chars(text: &str, max_chars: usize, marker: &str) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}{marker}", &text[..byte_idx]),
        None => text.to_string(),
    }
}
