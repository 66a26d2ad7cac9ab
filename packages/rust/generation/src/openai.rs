//! OpenAI-compatible chat completions client.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use html2doc_shared::{Html2DocError, ProviderConfig, Result, TokenUsage};

use crate::{Generation, Generator, Message, RequestOptions, UsageMeter};

/// User-Agent string for generation requests.
const USER_AGENT: &str = concat!("html2doc/", env!("CARGO_PKG_VERSION"));

/// Maximum characters of an error body echoed into the error message.
const ERROR_BODY_PREVIEW: usize = 200;

/// Client for `{base_url}/chat/completions`.
///
/// The API key is injected at construction; the client never reads the
/// process environment.
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    usage: UsageMeter,
}

impl fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("usage", &self.usage.snapshot())
            .finish()
    }
}

impl OpenAiClient {
    /// Build a client for the configured endpoint.
    pub fn new(provider: &ProviderConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(provider.timeout_secs))
            .build()
            .map_err(|e| Html2DocError::Generation(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: provider.base_url.trim_end_matches('/').to_string(),
            usage: UsageMeter::default(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

impl Generator for OpenAiClient {
    #[instrument(skip_all, fields(model = %options.model, messages = messages.len()))]
    async fn generate(&self, messages: &[Message], options: &RequestOptions) -> Result<Generation> {
        let body = ChatRequest {
            model: &options.model,
            messages: messages
                .iter()
                .map(|m| ApiMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            temperature: options.temperature,
            top_p: options.top_p,
            max_tokens: options.max_output_tokens,
        };

        let url = self.endpoint();
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Html2DocError::Generation(format!("{url}: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Html2DocError::Generation(format!("{url}: failed to read body: {e}")))?;

        if !status.is_success() {
            error!(%status, "generation request failed");
            let preview: String = text.chars().take(ERROR_BODY_PREVIEW).collect();
            return Err(Html2DocError::Generation(format!(
                "provider returned HTTP {status}: {preview}"
            )));
        }

        let parsed: ChatResponse = serde_json::from_str(&text).map_err(|e| {
            Html2DocError::Generation(format!("invalid provider response: {e}"))
        })?;

        let usage = parsed.usage.map(|u| TokenUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        });
        if let Some(usage) = usage {
            self.usage.record(usage);
        }

        let content = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Html2DocError::Generation("provider returned no choices".into()))?
            .message
            .content
            .unwrap_or_default();

        debug!(
            response_len = content.len(),
            input_tokens = usage.map(|u| u.input_tokens),
            output_tokens = usage.map(|u| u.output_tokens),
            "generation complete"
        );

        Ok(Generation {
            text: content.trim().to_string(),
            usage,
        })
    }

    fn usage_total(&self) -> TokenUsage {
        self.usage.snapshot()
    }

    fn name(&self) -> &str {
        "openai-compatible"
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}
