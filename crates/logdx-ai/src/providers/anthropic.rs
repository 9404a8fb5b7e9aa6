//! Anthropic Messages API client

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    ChatMessage, Completion, ModelConfig, ReasoningClient, Usage,
    error::{Error, Result},
};

use super::split_system;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic API client
pub struct AnthropicClient {
    client: reqwest::Client,
    api_key: String,
    model: ModelConfig,
}

impl AnthropicClient {
    /// Create a new client with an API key
    pub fn new(api_key: impl Into<String>, model: ModelConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model,
        }
    }

    fn build_request(&self, messages: &[ChatMessage]) -> AnthropicRequest {
        let (system, rest) = split_system(messages);
        AnthropicRequest {
            model: self.model.id.clone(),
            max_tokens: self.model.max_tokens,
            system,
            temperature: self.model.temperature,
            messages: rest
                .into_iter()
                .map(|m| AnthropicMessage {
                    role: m.role.as_str().to_string(),
                    content: m.content.clone(),
                })
                .collect(),
        }
    }
}

#[async_trait]
impl ReasoningClient for AnthropicClient {
    async fn invoke(&self, messages: &[ChatMessage]) -> Result<Completion> {
        let url = format!("{}/v1/messages", self.model.base_url.trim_end_matches('/'));
        tracing::debug!("Anthropic API URL: {}", url);

        let mut request = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&self.build_request(messages));
        for (key, value) in &self.model.headers {
            request = request.header(key.as_str(), value.as_str());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::from_status(status, text));
        }

        let body: AnthropicResponse = response.json().await?;
        parse_response(body)
    }
}

fn parse_response(body: AnthropicResponse) -> Result<Completion> {
    let text: String = body
        .content
        .iter()
        .filter(|block| block.block_type == "text")
        .filter_map(|block| block.text.as_deref())
        .collect::<Vec<_>>()
        .join("");

    if text.is_empty() {
        return Err(Error::EmptyResponse);
    }

    Ok(Completion {
        content: text,
        model: body.model,
        usage: Usage {
            input: body.usage.input_tokens,
            output: body.usage.output_tokens,
        },
    })
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    messages: Vec<AnthropicMessage>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}
