/// Mock chat model for testing purposes.
///
/// Replies are produced by a closure so tests can script behavior per
/// prompt. Every prompt is recorded for later inspection.
use std::sync::Mutex;

use super::registry::SMOKE_TEST_PROMPT;
use super::{ChatModel, ChatRequest, ModelError};

type Responder = Box<dyn Fn(&ChatRequest<'_>) -> Result<String, ModelError> + Send + Sync>;

pub struct MockModel {
    responder: Responder,
    prompts: Mutex<Vec<String>>,
}

impl MockModel {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&ChatRequest<'_>) -> Result<String, ModelError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Always replies with `text`.
    pub fn replying(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_| Ok(text.clone()))
    }

    /// Always fails, including the registration probe.
    pub fn failing() -> Self {
        Self::new(|_| Err(ModelError::Request("connection refused".to_string())))
    }

    /// Answers the registration probe, then fails every real call.
    pub fn failing_after_probe() -> Self {
        Self::new(|req| {
            if req.prompt == SMOKE_TEST_PROMPT {
                Ok("print('hello world')".to_string())
            } else {
                Err(ModelError::Status {
                    status: 503,
                    body: "overloaded".to_string(),
                })
            }
        })
    }

    /// Prompts received so far, excluding the registration probe.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|p| {
                p.iter()
                    .filter(|s| s.as_str() != SMOKE_TEST_PROMPT)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.prompts().len()
    }
}

impl ChatModel for MockModel {
    fn complete(&self, request: &ChatRequest<'_>) -> Result<String, ModelError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(request.prompt.to_string());
        }
        (self.responder)(request)
    }
}
