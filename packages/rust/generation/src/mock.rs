//! Scripted generator for tests.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use html2doc_shared::{Html2DocError, Result, TokenUsage};

use crate::{Generation, Generator, Message, RequestOptions, UsageMeter};

/// Replays queued responses in order and records every request it receives.
///
/// Each successful call meters `usage_per_call` tokens. When the queue runs dry
/// the call fails with a generation error.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    responses: Mutex<VecDeque<std::result::Result<String, String>>>,
    requests: Mutex<Vec<Vec<Message>>>,
    usage: UsageMeter,
    pub usage_per_call: TokenUsage,
}

impl ScriptedGenerator {
    #[must_use]
    pub fn with_responses<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(|r| Ok(r.into())).collect()),
            usage_per_call: TokenUsage {
                input_tokens: 10,
                output_tokens: 5,
            },
            ..Self::default()
        }
    }

    /// Queue a successful response.
    pub fn push_response(&self, text: impl Into<String>) {
        self.queue().push_back(Ok(text.into()));
    }

    /// Queue a provider failure.
    pub fn push_failure(&self, message: impl Into<String>) {
        self.queue().push_back(Err(message.into()));
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn queue(&self) -> std::sync::MutexGuard<'_, VecDeque<std::result::Result<String, String>>> {
        self.responses.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Generator for ScriptedGenerator {
    async fn generate(&self, messages: &[Message], _options: &RequestOptions) -> Result<Generation> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(messages.to_vec());

        let next = self.queue().pop_front();
        match next {
            Some(Ok(text)) => {
                self.usage.record(self.usage_per_call);
                Ok(Generation {
                    text: text.trim().to_string(),
                    usage: Some(self.usage_per_call),
                })
            }
            Some(Err(message)) => Err(Html2DocError::Generation(message)),
            None => Err(Html2DocError::Generation(
                "scripted generator has no responses left".into(),
            )),
        }
    }

    fn usage_total(&self) -> TokenUsage {
        self.usage.snapshot()
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
