/// Optional translation around model-backed stages.
///
/// Reports arrive in one language, code models work best in another. Each
/// call is independent and stateless; a failed or empty translation passes
/// the input through unchanged.
use tracing::{debug, warn};

use super::ChatRequest;
use super::registry::RegisteredModel;

pub struct TranslationBridge<'a> {
    model: &'a RegisteredModel,
    report_language: String,
    working_language: String,
}

impl<'a> TranslationBridge<'a> {
    pub fn new(model: &'a RegisteredModel, report_language: &str, working_language: &str) -> Self {
        Self {
            model,
            report_language: report_language.to_string(),
            working_language: working_language.to_string(),
        }
    }

    /// Report language to working language (bug report before analysis).
    pub fn to_working(&self, text: &str) -> String {
        self.translate(text, &self.report_language, &self.working_language)
    }

    /// Working language back to report language (summary, reasoning, fix).
    pub fn to_report(&self, text: &str) -> String {
        self.translate(text, &self.working_language, &self.report_language)
    }

    fn translate(&self, text: &str, from: &str, to: &str) -> String {
        if text.trim().is_empty() {
            return text.to_string();
        }

        let system = format!("You are an expert translator from {from} to {to}.");
        let prompt = format!(
            "Translate the following {from} text into {to}. \
             Keep code identifiers, file names and numbers unchanged. \
             Reply with the translation only.\n\n{text}"
        );
        let request = ChatRequest::new(&prompt).with_system(&system);

        match self.model.complete(&request) {
            Ok(reply) if !reply.trim().is_empty() => {
                debug!("Translated {} chars {from} -> {to}", text.chars().count());
                reply.trim().to_string()
            }
            Ok(_) => {
                warn!("Translator '{}' returned nothing, keeping original text", self.model.name());
                text.to_string()
            }
            Err(e) => {
                warn!("Translation via '{}' failed: {e}", self.model.name());
                text.to_string()
            }
        }
    }
}
