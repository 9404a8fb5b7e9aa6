//! Reasoning-service provider implementations

pub mod anthropic;
pub mod openai;

use std::sync::Arc;

use crate::{Error, ModelConfig, Provider, Result, SharedClient};

/// Get an API key from the provided value or the provider's environment variable
pub fn get_api_key(provided: Option<&str>, provider: Provider) -> Result<String> {
    if let Some(key) = provided {
        return Ok(key.to_string());
    }

    match provider.api_key_env_var() {
        Some(env_var) => std::env::var(env_var).map_err(|_| Error::InvalidApiKey),
        // Local endpoints (Ollama, custom gateways) accept any bearer token
        None => Ok(String::new()),
    }
}

/// Build a client for the model's provider
pub fn client_for(model: &ModelConfig, api_key: Option<&str>) -> Result<SharedClient> {
    if model.base_url.is_empty() {
        return Err(Error::InvalidConfig(format!(
            "no base URL configured for provider {}",
            model.provider.name()
        )));
    }

    let key = get_api_key(api_key, model.provider)?;
    let client: SharedClient = match model.provider {
        Provider::Anthropic => Arc::new(anthropic::AnthropicClient::new(key, model.clone())),
        Provider::OpenAI
        | Provider::Groq
        | Provider::OpenRouter
        | Provider::Ollama
        | Provider::Custom => Arc::new(openai::OpenAIClient::new(key, model.clone())),
    };
    Ok(client)
}

/// Split a system instruction from the rest of the prompt.
///
/// Multiple system messages are joined with blank lines.
pub(crate) fn split_system(messages: &[crate::ChatMessage]) -> (Option<String>, Vec<&crate::ChatMessage>) {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == crate::Role::System)
        .map(|m| m.content.as_str())
        .collect();
    let rest = messages
        .iter()
        .filter(|m| m.role != crate::Role::System)
        .collect();
    let system = if system.is_empty() {
        None
    } else {
        Some(system.join("\n\n"))
    };
    (system, rest)
}
