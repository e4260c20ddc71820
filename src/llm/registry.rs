/// Model registry: named endpoints tagged by specialty.
///
/// An endpoint is stored only after a short smoke-test call succeeds.
/// Selection walks an explicit specialty preference list; when nothing
/// matches, the first registered endpoint is returned.
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use super::openai::OpenAiCompatModel;
use super::{ChatModel, ChatRequest, ModelError, Specialty};

/// Prompt sent to every endpoint at registration.
pub const SMOKE_TEST_PROMPT: &str = "Write a simple hello world function in Python.";
const SMOKE_TEST_MAX_TOKENS: u32 = 50;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("endpoint '{0}' is already registered")]
    DuplicateName(String),

    #[error("endpoint '{name}' failed its liveness probe: {source}")]
    ProbeFailed {
        name: String,
        #[source]
        source: ModelError,
    },

    #[error("no model endpoints are registered")]
    Empty,
}

/// Address and identity of one model endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEndpoint {
    pub name: String,
    pub address: String,
    pub model: String,
    pub specialty: Specialty,
}

impl ModelEndpoint {
    pub fn new(name: &str, address: &str, model: &str, specialty: Specialty) -> Self {
        Self {
            name: name.to_string(),
            address: address.to_string(),
            model: model.to_string(),
            specialty,
        }
    }

    /// Parse `name:url:model[:specialty]`.
    ///
    /// The URL keeps its own colons: a leading `http`/`https` field absorbs
    /// the `//host` field after it, plus a numeric port field if present.
    /// Model ids may contain colons (`llama3:8b`); the last field is taken
    /// as the specialty only when it is one of the recognized tags.
    pub fn parse_spec(spec: &str) -> Option<Self> {
        let mut fields = spec.split(':');
        let name = fields.next()?;
        let mut address = fields.next()?.to_string();
        let mut rest: Vec<&str> = fields.collect();

        if address.eq_ignore_ascii_case("http") || address.eq_ignore_ascii_case("https") {
            if rest.is_empty() {
                return None;
            }
            address = format!("{address}:{}", rest.remove(0));
            if rest.first().is_some_and(|field| is_port(field)) {
                address = format!("{address}:{}", rest.remove(0));
            }
        }

        let tag = rest.last().map(|field| field.parse::<Specialty>());
        let specialty = match tag {
            Some(Ok(Specialty::Other(_))) | None => Specialty::General,
            Some(Ok(known)) if rest.len() > 1 => {
                rest.pop();
                known
            }
            Some(_) => Specialty::General,
        };
        let model = rest.join(":");
        if name.is_empty() || address.is_empty() || model.is_empty() {
            return None;
        }
        Some(Self::new(name, &address, &model, specialty))
    }
}

/// `1234` or `1234/v1`.
fn is_port(field: &str) -> bool {
    let digits = field.split('/').next().unwrap_or_default();
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

/// A registered endpoint together with its live model handle.
pub struct RegisteredModel {
    endpoint: ModelEndpoint,
    model: Box<dyn ChatModel>,
}

impl RegisteredModel {
    #[must_use]
    pub fn endpoint(&self) -> &ModelEndpoint {
        &self.endpoint
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.endpoint.name
    }

    pub fn complete(&self, request: &ChatRequest<'_>) -> Result<String, ModelError> {
        self.model.complete(request)
    }
}

impl std::fmt::Debug for RegisteredModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredModel")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct ModelRegistry {
    entries: Vec<RegisteredModel>,
}

impl ModelRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an OpenAI-compatible HTTP endpoint.
    pub fn register(
        &mut self,
        endpoint: ModelEndpoint,
        timeout: Duration,
    ) -> Result<(), RegistryError> {
        let model = OpenAiCompatModel::new(&endpoint.address, &endpoint.model, timeout).map_err(
            |source| RegistryError::ProbeFailed {
                name: endpoint.name.clone(),
                source,
            },
        )?;
        self.register_with(endpoint, Box::new(model))
    }

    /// Register any `ChatModel` under `endpoint`, after a smoke test.
    pub fn register_with(
        &mut self,
        endpoint: ModelEndpoint,
        model: Box<dyn ChatModel>,
    ) -> Result<(), RegistryError> {
        if self.get(&endpoint.name).is_some() {
            return Err(RegistryError::DuplicateName(endpoint.name));
        }

        let probe = ChatRequest::new(SMOKE_TEST_PROMPT).with_max_tokens(SMOKE_TEST_MAX_TOKENS);
        match model.complete(&probe) {
            Ok(reply) if !reply.trim().is_empty() => {
                info!(
                    "Registered model '{}' ({} @ {}, specialty {})",
                    endpoint.name, endpoint.model, endpoint.address, endpoint.specialty
                );
                self.entries.push(RegisteredModel { endpoint, model });
                Ok(())
            }
            Ok(_) => {
                warn!("Model '{}' returned an empty probe reply", endpoint.name);
                Err(RegistryError::ProbeFailed {
                    name: endpoint.name,
                    source: ModelError::MalformedResponse("empty reply".to_string()),
                })
            }
            Err(source) => {
                warn!("Model '{}' failed its probe: {source}", endpoint.name);
                Err(RegistryError::ProbeFailed {
                    name: endpoint.name,
                    source,
                })
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&RegisteredModel> {
        self.entries.iter().find(|e| e.endpoint.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredModel> {
        self.entries.iter()
    }

    /// First endpoint whose specialty is exactly `specialty`.
    #[must_use]
    pub fn find_exact(&self, specialty: &Specialty) -> Option<&RegisteredModel> {
        self.entries
            .iter()
            .find(|e| &e.endpoint.specialty == specialty)
    }

    /// Walk `preferences` in order; fall back to the first registered
    /// endpoint. `None` only when the registry is empty.
    #[must_use]
    pub fn select(&self, preferences: &[Specialty]) -> Option<&RegisteredModel> {
        preferences
            .iter()
            .find_map(|p| self.find_exact(p))
            .or_else(|| self.entries.first())
    }

    /// Like [`select`](Self::select), but an empty registry is an error.
    pub fn require(&self, preferences: &[Specialty]) -> Result<&RegisteredModel, RegistryError> {
        self.select(preferences).ok_or(RegistryError::Empty)
    }
}
