//! Configuration file support

use logdx_ai::{Provider, RetryConfig};
use logdx_workflow::EngineConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for logdx
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default model to use
    pub model: Option<String>,
    /// Default provider
    pub provider: Option<String>,
    /// Override the provider's API base URL
    pub base_url: Option<String>,
    /// API keys (alternative to environment variables)
    pub api_keys: ApiKeys,
    /// Log query service settings
    pub tool: ToolSettings,
    /// Workflow engine limits
    pub engine: EngineSettings,
    /// Reasoning-service retry settings
    pub retry: RetrySettings,
}

/// API key configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiKeys {
    pub openai: Option<String>,
    pub anthropic: Option<String>,
    pub groq: Option<String>,
    pub openrouter: Option<String>,
}

/// Log query service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    /// URL the query payload is POSTed to
    pub endpoint: Option<String>,
    /// Per-query timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// Workflow engine limits
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Maximum workflow steps per turn
    pub max_steps: Option<usize>,
    /// Maximum log lines sent for analysis
    pub max_log_lines: Option<usize>,
}

/// Retry configuration for reasoning-service calls
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: Option<u32>,
    pub initial_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("logdx")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("LOGDX_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from file
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content).unwrap_or_else(|e| {
                eprintln!("Warning: Failed to parse config file: {}", e);
                Self::default()
            }),
            Err(e) => {
                eprintln!("Warning: Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Save config to file
    pub fn save(&self) -> std::io::Result<()> {
        let path = Self::config_path();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }

        let default_config = Config {
            model: Some("gpt-4o-mini".to_string()),
            provider: Some("openai".to_string()),
            tool: ToolSettings {
                endpoint: Some("http://localhost:8080/logs/query".to_string()),
                ..ToolSettings::default()
            },
            ..Config::default()
        };

        default_config.save()?;
        Ok(path)
    }

    /// Get the API key for a provider from the config file.
    ///
    /// `None` defers to the provider's environment variable.
    pub fn get_api_key(&self, provider: Provider) -> Option<String> {
        match provider {
            Provider::OpenAI => self.api_keys.openai.clone(),
            Provider::Anthropic => self.api_keys.anthropic.clone(),
            Provider::Groq => self.api_keys.groq.clone(),
            Provider::OpenRouter => self.api_keys.openrouter.clone(),
            Provider::Ollama | Provider::Custom => None,
        }
    }

    /// Engine settings, falling back to the engine defaults
    pub fn engine_config(&self) -> EngineConfig {
        let defaults = EngineConfig::default();
        EngineConfig {
            tool_timeout: self
                .tool
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.tool_timeout),
            max_steps: self.engine.max_steps.unwrap_or(defaults.max_steps),
            max_log_lines: self.engine.max_log_lines.unwrap_or(defaults.max_log_lines),
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        let defaults = RetryConfig::default();
        RetryConfig {
            max_retries: self.retry.max_retries.unwrap_or(defaults.max_retries),
            initial_delay: self
                .retry
                .initial_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.initial_delay),
            max_delay: self
                .retry
                .max_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_delay),
            ..defaults
        }
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# logdx configuration file
# Place at ~/.config/logdx/config.toml (Linux) or set LOGDX_CONFIG_PATH

# Default model to use
model = "gpt-4o-mini"

# Default provider (openai, anthropic, groq, openrouter, ollama)
provider = "openai"

# Override the provider's API base URL (required for custom gateways)
# base_url = "http://localhost:11434/v1"

# API keys (optional - can also use environment variables)
[api_keys]
# openai = "sk-..."
# anthropic = "sk-ant-..."

[tool]
# Log query service; receives {"streamName", "filters", "limit", "format"}
endpoint = "http://localhost:8080/logs/query"
# timeout_secs = 30

[engine]
# max_steps = 32
# max_log_lines = 200

[retry]
# max_retries = 3
# initial_delay_ms = 1000
# max_delay_ms = 60000
"#
}
