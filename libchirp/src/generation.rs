//! Text generation through an OpenAI-compatible chat completions endpoint
//!
//! [`Generator::generate`] never fails: any error is logged and replaced by
//! [`FALLBACK_TEXT`] so a flaky model degrades content quality instead of
//! skipping the action. [`GenerationClient::try_generate`] exposes the
//! underlying error for callers that want it.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::GenerationConfig;
use crate::error::GenError;

/// Neutral line posted when the model cannot be reached
pub const FALLBACK_TEXT: &str =
    "Still thinking this one through. Back soon with something worth reading.";

/// Source of persona-styled text
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce text for `prompt` in the voice described by `persona`.
    ///
    /// Always returns usable text.
    async fn generate(&self, persona: &str, prompt: &str, max_tokens: u32, temperature: f32)
        -> String;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<CompletionMessage>,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

pub struct GenerationClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: SecretString,
}

impl GenerationClient {
    pub fn new(base_url: &str, model: &str, api_key: SecretString) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.to_string(),
            api_key,
        }
    }

    pub fn from_config(config: &GenerationConfig) -> Self {
        Self::new(
            &config.base_url,
            &config.model,
            SecretString::from(config.api_key.expose_secret().to_string()),
        )
    }

    /// Single completion request with errors surfaced
    pub async fn try_generate(
        &self,
        persona: &str,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, GenError> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: persona,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens,
            temperature,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| GenError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GenError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(GenError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse =
            serde_json::from_str(&body).map_err(|e| GenError::Malformed(e.to_string()))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .ok_or_else(|| GenError::Malformed("no choices[0].message.content".to_string()))?;

        let text = clean_completion(&content);
        if text.is_empty() {
            return Err(GenError::EmptyCompletion);
        }
        debug!(model = %self.model, chars = text.chars().count(), "Completion received");
        Ok(text)
    }
}

#[async_trait]
impl Generator for GenerationClient {
    async fn generate(
        &self,
        persona: &str,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> String {
        match self.try_generate(persona, prompt, max_tokens, temperature).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Generation failed, using fallback text");
                FALLBACK_TEXT.to_string()
            }
        }
    }
}

/// Trim whitespace and one layer of wrapping quotes
fn clean_completion(raw: &str) -> String {
    let trimmed = raw.trim();
    let unquoted = [('"', '"'), ('\'', '\''), ('“', '”')]
        .iter()
        .find_map(|(open, close)| {
            trimmed
                .strip_prefix(*open)
                .and_then(|rest| rest.strip_suffix(*close))
        })
        .unwrap_or(trimmed);
    unquoted.trim().to_string()
}
