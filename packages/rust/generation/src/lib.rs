//! Text-generation capability used by the html2doc pipeline.
//!
//! The pipeline sees generation as an opaque request/response collaborator:
//! a list of role-tagged [`Message`]s plus [`RequestOptions`] in, response text
//! and optional [`TokenUsage`] out. [`OpenAiClient`] speaks the OpenAI-compatible
//! chat completions API; `ScriptedGenerator` (feature `mock`) replays canned
//! responses for tests.

#[cfg(any(test, feature = "mock"))]
mod mock;
mod openai;

use std::future::Future;
use std::sync::{Mutex, PoisonError};

use html2doc_shared::{ModelConfig, Result, TokenUsage};

#[cfg(any(test, feature = "mock"))]
pub use mock::ScriptedGenerator;
pub use openai::OpenAiClient;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Role of a message block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
        }
    }
}

/// A single role-tagged text block. Built once at the boundary; multi-part
/// user input is joined into one content string on construction.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// A user message from several text fragments, separated by blank lines.
    /// Empty fragments are dropped.
    pub fn user_parts<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let content = parts
            .into_iter()
            .filter(|part| !part.as_ref().trim().is_empty())
            .map(|part| part.as_ref().to_string())
            .collect::<Vec<_>>()
            .join("\n\n");
        Self::user(content)
    }
}

// ---------------------------------------------------------------------------
// Request options / response
// ---------------------------------------------------------------------------

/// Model identifier and sampling parameters sent with every request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOptions {
    pub model: String,
    pub temperature: f32,
    pub top_p: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

impl RequestOptions {
    /// Override the output token budget for one request.
    #[must_use]
    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = Some(max_output_tokens);
        self
    }
}

impl From<&ModelConfig> for RequestOptions {
    fn from(model: &ModelConfig) -> Self {
        Self {
            model: model.name.clone(),
            temperature: model.temperature,
            top_p: model.top_p,
            max_output_tokens: model.max_output_tokens,
        }
    }
}

/// Text returned by one generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

// ---------------------------------------------------------------------------
// Generator trait
// ---------------------------------------------------------------------------

/// An external text-generation capability.
pub trait Generator: Send + Sync {
    /// Send one request and wait for the complete response.
    ///
    /// # Errors
    ///
    /// Returns [`html2doc_shared::Html2DocError::Generation`] for transport or
    /// provider failures, with the provider's message preserved.
    fn generate(
        &self,
        messages: &[Message],
        options: &RequestOptions,
    ) -> impl Future<Output = Result<Generation>> + Send;

    /// Running total of tokens consumed through this generator.
    fn usage_total(&self) -> TokenUsage;

    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Usage meter
// ---------------------------------------------------------------------------

/// Running token counter shared by generator implementations.
#[derive(Debug, Default)]
pub struct UsageMeter {
    total: Mutex<TokenUsage>,
}

impl UsageMeter {
    pub fn record(&self, usage: TokenUsage) {
        self.total
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .add(usage);
    }

    pub fn snapshot(&self) -> TokenUsage {
        *self.total.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_parts_join_non_empty_fragments() {
        let msg = Message::user_parts(["Outline:\n- A", "", "  ", "Section sec-1"]);
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Outline:\n- A\n\nSection sec-1");
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&Message::system("be terse")).unwrap();
        assert_eq!(json, r#"{"role":"system","content":"be terse"}"#);
        assert_eq!(Role::User.as_str(), "user");
    }

    #[test]
    fn options_from_model_config() {
        let model = ModelConfig {
            name: "gpt-4o".into(),
            temperature: 0.2,
            top_p: Some(0.8),
            max_output_tokens: None,
        };
        let options = RequestOptions::from(&model);
        assert_eq!(options.model, "gpt-4o");
        assert_eq!(options.top_p, Some(0.8));
        assert_eq!(options.max_output_tokens, None);
        assert_eq!(options.with_max_output_tokens(600).max_output_tokens, Some(600));
    }

    #[test]
    fn usage_meter_accumulates() {
        let meter = UsageMeter::default();
        meter.record(TokenUsage {
            input_tokens: 10,
            output_tokens: 3,
        });
        meter.record(TokenUsage {
            input_tokens: 5,
            output_tokens: 2,
        });
        assert_eq!(
            meter.snapshot(),
            TokenUsage {
                input_tokens: 15,
                output_tokens: 5
            }
        );
    }
}
