//! Content analysis through a chat-completion model.
//!
//! Used twice: to turn an uploaded file's description into a context summary
//! during ingestion, and to synthesize the final answer to a question.
//! Like embedding, analysis never fails outward; see [`analyze`].

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::Config;
use crate::outcome::{Generated, ProviderError};
use crate::settings::ApiKeyStore;

/// Returned when no API key is configured.
pub const NO_KEY_ANALYSIS: &str = "Dummy analysis: No OpenAI API key configured.";
/// Returned when the provider call fails.
pub const FAILED_ANALYSIS: &str = "Dummy analysis: Error during AI analysis.";

#[async_trait]
pub trait ContentAnalyzer: Send + Sync {
    fn model_name(&self) -> &str;
    async fn complete(&self, text: &str) -> Result<String, ProviderError>;
}

/// Analyze `text`, substituting a sentinel string when the provider is
/// unconfigured or fails. Input is forwarded as-is, whatever its length.
pub async fn analyze(analyzer: &dyn ContentAnalyzer, text: &str) -> Generated<String> {
    match analyzer.complete(text).await {
        Ok(answer) => Generated::success(answer),
        Err(ProviderError::MissingKey) => {
            tracing::warn!("OPENAI_API_KEY not set, returning placeholder analysis");
            Generated::fallback(NO_KEY_ANALYSIS.to_string(), &ProviderError::MissingKey)
        }
        Err(e) => {
            tracing::warn!(error = %e, model = analyzer.model_name(), "analysis failed");
            Generated::fallback(FAILED_ANALYSIS.to_string(), &e)
        }
    }
}

/// Analyzer backed by `POST {base_url}/chat/completions`.
pub struct OpenAIAnalyzer {
    client: Client,
    base_url: String,
    model: String,
    system_prompt: String,
    keys: ApiKeyStore,
}

impl OpenAIAnalyzer {
    pub fn new(config: &Config, keys: ApiKeyStore) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.openai.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.openai.base_url.trim_end_matches('/').to_string(),
            model: config.analyzer.model.clone(),
            system_prompt: config.analyzer.system_prompt.clone(),
            keys,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
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

#[async_trait]
impl ContentAnalyzer for OpenAIAnalyzer {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, text: &str) -> Result<String, ProviderError> {
        let api_key = self.keys.current().await.ok_or(ProviderError::MissingKey)?;

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: self.system_prompt.clone(),
                },
                ChatMessage {
                    role: "user",
                    content: format!("Analyze the following project data: {}", text),
                },
            ],
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::InvalidResponse("no message content in choices".into()))
    }
}
