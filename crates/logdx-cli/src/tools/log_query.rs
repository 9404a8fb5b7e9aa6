//! HTTP log query tool

use async_trait::async_trait;
use logdx_workflow::{LogQueryTool, ToolArgs, ToolOutcome};

/// Longest response body quoted back in an error
const MAX_ERROR_BODY: usize = 300;

/// Queries a log service by POSTing the tool arguments as JSON
pub struct HttpLogQueryTool {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpLogQueryTool {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

/// Map an HTTP status and body onto a tool outcome
fn outcome_from_response(status: reqwest::StatusCode, body: &str) -> ToolOutcome {
    if !status.is_success() {
        let body: String = body.chars().take(MAX_ERROR_BODY).collect();
        return ToolOutcome::Error(format!("log service returned {}: {}", status, body.trim()));
    }

    match serde_json::from_str(body) {
        Ok(value) => ToolOutcome::Success(value),
        // Plain-text services return one log line per row
        Err(_) => ToolOutcome::Success(serde_json::Value::Array(
            body.lines()
                .filter(|l| !l.trim().is_empty())
                .map(|l| serde_json::Value::String(l.to_string()))
                .collect(),
        )),
    }
}

#[async_trait]
impl LogQueryTool for HttpLogQueryTool {
    async fn execute(&self, args: &ToolArgs) -> ToolOutcome {
        tracing::debug!(endpoint = %self.endpoint, stream = %args.stream_name, "Querying logs");

        let response = match self.client.post(&self.endpoint).json(args).send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => return ToolOutcome::Error("timeout".to_string()),
            Err(e) => return ToolOutcome::Error(format!("request failed: {}", e)),
        };

        let status = response.status();
        match response.text().await {
            Ok(body) => outcome_from_response(status, &body),
            Err(e) => ToolOutcome::Error(format!("failed to read response: {}", e)),
        }
    }
}
