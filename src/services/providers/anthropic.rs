//! Anthropic messages API client
//!
//! Sends a single user turn with a system prompt and returns the first text
//! block of the reply.
use crate::{
    config::Config,
    error::{AppError, AppResult},
    services::providers::LanguageModel,
};
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use tracing::instrument;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Clone)]
pub struct AnthropicClient {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
    model: String,
}

impl AnthropicClient {
    pub fn new(api_key: String, api_url: String, model: String) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_key,
            api_url: api_url.trim_end_matches('/').to_string(),
            model,
        }
    }

    /// Client for the configured key, or `None` when no key is set
    pub fn from_config(config: &Config) -> Option<Self> {
        config.anthropic_key().map(|key| {
            Self::new(
                key.to_string(),
                config.anthropic_api_url.clone(),
                config.llm_model.clone(),
            )
        })
    }
}

#[async_trait::async_trait]
impl LanguageModel for AnthropicClient {
    #[instrument(skip(self, system, prompt), fields(model = %self.model))]
    async fn complete(&self, system: &str, prompt: &str, max_tokens: u32) -> AppResult<String> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens,
            system,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .http_client
            .post(format!("{}/v1/messages", self.api_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "Anthropic API returned status {}: {}",
                status, body
            )));
        }

        let reply: MessagesResponse = response.json().await?;
        let text = reply
            .content
            .into_iter()
            .find_map(|block| match block {
                ContentBlock::Text { text } => Some(text.trim().to_string()),
                ContentBlock::Other => None,
            })
            .filter(|text| !text.is_empty())
            .ok_or_else(|| AppError::ExternalApi("Empty response from language model".to_string()))?;

        tracing::debug!(chars = text.len(), "Language model reply received");

        Ok(text)
    }

    fn name(&self) -> &'static str {
        "anthropic"
    }
}
