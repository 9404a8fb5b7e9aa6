//! Log-query tool trait and argument validation

use std::sync::Arc;

use async_trait::async_trait;

use crate::state::{ToolArgs, ToolOutcome};

/// JSON Schema for [`ToolArgs`]
pub fn tool_args_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "streamName": { "type": "string", "minLength": 1 },
            "filters": { "type": "object" },
            "limit": { "type": "integer", "minimum": 1, "maximum": 10000 },
            "format": { "type": "string", "enum": ["json", "text"] }
        },
        "required": ["streamName", "filters", "limit", "format"]
    })
}

/// An external capability that fetches log records.
#[async_trait]
pub trait LogQueryTool: Send + Sync {
    /// Tool name (used in status messages)
    fn name(&self) -> &str {
        "query_logs"
    }

    /// JSON Schema the arguments are validated against before execution
    fn parameters_schema(&self) -> serde_json::Value {
        tool_args_schema()
    }

    /// Execute the query. Failures are reported as [`ToolOutcome::Error`].
    async fn execute(&self, args: &ToolArgs) -> ToolOutcome;
}

/// Type alias for a shared tool
pub type SharedTool = Arc<dyn LogQueryTool>;

/// Validate tool arguments using a pre-compiled validator.
/// Returns `Some(error_message)` if validation fails, `None` if valid.
pub fn validate_with_validator(
    args: &serde_json::Value,
    validator: &jsonschema::Validator,
) -> Option<String> {
    let errors: Vec<String> = validator
        .iter_errors(args)
        .map(|e| {
            let path = e.instance_path.to_string();
            if path.is_empty() {
                e.to_string()
            } else {
                format!("{}: {}", path, e)
            }
        })
        .collect();

    if errors.is_empty() {
        None
    } else {
        Some(format!(
            "Tool argument validation failed:\n{}",
            errors.join("\n")
        ))
    }
}
