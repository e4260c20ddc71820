/// OpenAI-compatible chat completions client (`{base}/v1/chat/completions`).
///
/// Works against LM Studio, llama.cpp server, vLLM and anything else that
/// speaks the same wire format. Blocking; one call at a time.
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ChatModel, ChatRequest, ModelError, truncate_chars};

/// Prompts longer than this are cut before sending.
pub const MAX_PROMPT_CHARS: usize = 15_000;
const PROMPT_TRUNCATION_MARKER: &str = "... (prompt truncated)";

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Normalize a base address into the completions URL.
#[must_use]
pub fn completions_url(base: &str) -> String {
    let base = base.trim().trim_end_matches('/');
    if base.ends_with("/v1/chat/completions") {
        base.to_string()
    } else {
        format!("{base}/v1/chat/completions")
    }
}

pub struct OpenAiCompatModel {
    client: reqwest::blocking::Client,
    url: String,
    model: String,
}

impl OpenAiCompatModel {
    pub fn new(base: &str, model: &str, timeout: Duration) -> Result<Self, ModelError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("bugscope/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ModelError::Request(format!("HTTP client build failed: {e}")))?;

        Ok(Self {
            client,
            url: completions_url(base),
            model: model.to_string(),
        })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl ChatModel for OpenAiCompatModel {
    fn complete(&self, request: &ChatRequest<'_>) -> Result<String, ModelError> {
        let prompt = truncate_chars(request.prompt, MAX_PROMPT_CHARS, PROMPT_TRUNCATION_MARKER);
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: [
                Message {
                    role: "system",
                    content: request.system,
                },
                Message {
                    role: "user",
                    content: &prompt,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        debug!(
            "POST {} (model {}, prompt {} chars, max_tokens {})",
            self.url,
            self.model,
            prompt.chars().count(),
            request.max_tokens
        );

        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .map_err(|e| ModelError::Request(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().unwrap_or_default();
            return Err(ModelError::Status { status, body });
        }

        let text = resp
            .text()
            .map_err(|e| ModelError::Request(format!("failed to read body: {e}")))?;
        parse_completion(&text)
    }
}

/// Pull `choices[0].message.content` out of a response body.
fn parse_completion(body: &str) -> Result<String, ModelError> {
    let parsed: ChatCompletionResponse = serde_json::from_str(body)
        .map_err(|e| ModelError::MalformedResponse(format!("invalid JSON: {e}")))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| ModelError::MalformedResponse("no choices[0].message.content".to_string()))
}
