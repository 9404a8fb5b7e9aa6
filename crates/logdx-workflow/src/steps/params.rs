//! Parameter elicitation: stream name, filters, and the tool call payload

use std::sync::LazyLock;

use async_trait::async_trait;
use logdx_ai::ChatMessage;
use regex::Regex;
use serde_json::json;

use super::prompts;
use crate::error::StepError;
use crate::state::{ConversationState, DEFAULT_STREAM, FilterCriteria, PartialState, ToolArgs};
use crate::step::{Step, StepContext, StepId};

pub const DEFAULT_LIMIT: u32 = 100;
pub const DEFAULT_FORMAT: &str = "json";

/// Stream names recognised anywhere in the message.
///
/// This check runs after the patterns and overrides them.
pub const KNOWN_STREAMS: &[&str] = &["error", "access", "application", "system", "security", "audit"];

/// Ordered patterns for a stream name in a lower-cased message; first match wins.
static STREAM_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // "stream named checkout", "stream 'payments'"
        r#"\bstream\s+(?:named\s+|called\s+)?[`'"]?([a-z0-9][a-z0-9_.\-]*)"#,
        // "from the payments stream", "in checkout logs"
        r#"\b(?:from|in|for|of)\s+(?:the\s+)?[`'"]?([a-z0-9][a-z0-9_.\-]*)[`'"]?\s+(?:stream|logs?)\b"#,
        // "logs for billing", "logs from the gateway"
        r#"\blogs?\s+(?:from|for|of|in)\s+(?:the\s+)?[`'"]?([a-z0-9][a-z0-9_.\-]*)"#,
        // "nginx logs", "auth stream"
        r"\b([a-z0-9][a-z0-9_.\-]*)\s+(?:stream|logs?)\b",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Captures that are grammar rather than names
const STOP_WORDS: &[&str] = &[
    "a", "all", "an", "any", "get", "last", "latest", "log", "logs", "me", "my", "new", "our",
    "recent", "show", "some", "stream", "that", "the", "these", "this", "those", "your",
];

/// Resolve the stream a message refers to.
pub fn extract_stream_name(message: &str) -> String {
    let lower = message.to_lowercase();

    let mut stream = STREAM_PATTERNS.iter().find_map(|re| {
        re.captures_iter(&lower)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str().trim_end_matches(['.', '-']))
            .find(|name| !name.is_empty() && !STOP_WORDS.contains(name))
            .map(str::to_string)
    });

    // Runs unconditionally and overrides a pattern match
    if let Some(known) = KNOWN_STREAMS.iter().find(|name| lower.contains(**name)) {
        stream = Some((*known).to_string());
    }

    stream.unwrap_or_else(|| DEFAULT_STREAM.to_string())
}

/// Parse filter criteria from a reasoning-service reply.
///
/// Tries an embedded JSON object, then `key: value` pairs separated by
/// commas, and finally keeps the whole reply under `raw`.
pub fn parse_filters(reply: &str) -> FilterCriteria {
    if let Some(filters) = parse_embedded_json(reply) {
        return filters;
    }

    let pairs = parse_pairs(reply);
    if !pairs.is_empty() {
        return pairs;
    }

    let mut raw = FilterCriteria::new();
    raw.insert("raw".to_string(), json!(reply.trim()));
    raw
}

fn parse_embedded_json(reply: &str) -> Option<FilterCriteria> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&reply[start..=end]).ok()
}

fn parse_pairs(reply: &str) -> FilterCriteria {
    let unquote = |s: &str| s.trim().trim_matches(['"', '\'', '`']).to_string();
    reply
        .split([',', '\n'])
        .filter_map(|segment| segment.split_once(':'))
        .map(|(key, value)| (unquote(key), unquote(value)))
        .filter(|(key, value)| !key.is_empty() && !value.is_empty())
        .map(|(key, value)| (key, json!(value)))
        .collect()
}

fn describe_filters(filters: &FilterCriteria) -> String {
    if filters.is_empty() {
        return "no filters".to_string();
    }
    let parts: Vec<String> = filters
        .iter()
        .map(|(key, value)| match value.as_str() {
            Some(s) => format!("{}={}", key, s),
            None => format!("{}={}", key, value),
        })
        .collect();
    format!("filters {}", parts.join(", "))
}

/// Resolves the target stream from the latest user message
pub struct ExtractStreamName;

#[async_trait]
impl Step for ExtractStreamName {
    fn id(&self) -> StepId {
        StepId::ExtractStreamName
    }

    async fn run(
        &self,
        state: &ConversationState,
        _ctx: &StepContext,
    ) -> Result<PartialState, StepError> {
        let message = state
            .last_user_message()
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        let stream = extract_stream_name(message);
        tracing::debug!(%stream, "Resolved stream name");

        Ok(PartialState::new()
            .status("stream_name", json!({ "streamName": stream }))
            .stream_name(stream))
    }
}

/// Asks the reasoning service for filter criteria
pub struct RequestFilters;

#[async_trait]
impl Step for RequestFilters {
    fn id(&self) -> StepId {
        StepId::RequestFilters
    }

    async fn run(
        &self,
        state: &ConversationState,
        ctx: &StepContext,
    ) -> Result<PartialState, StepError> {
        let message = state
            .last_user_message()
            .ok_or(StepError::MissingState("messages"))?;
        let reply = ctx.ask(prompts::REQUEST_FILTERS, &message.content).await?;
        let filters = parse_filters(&reply.content);
        tracing::debug!(?filters, "Parsed filter criteria");

        Ok(PartialState::new()
            .status("filters", json!({ "filters": filters }))
            .filter_criteria(filters))
    }
}

/// Builds the tool payload and tells the user what will be queried
pub struct ConfirmToolArgs;

#[async_trait]
impl Step for ConfirmToolArgs {
    fn id(&self) -> StepId {
        StepId::ConfirmToolArgs
    }

    async fn run(
        &self,
        state: &ConversationState,
        _ctx: &StepContext,
    ) -> Result<PartialState, StepError> {
        let args = ToolArgs {
            stream_name: state.stream_name.clone(),
            filters: state.filter_criteria.clone(),
            limit: DEFAULT_LIMIT,
            format: DEFAULT_FORMAT.to_string(),
        };
        let confirmation = format!(
            "Querying the `{}` stream with {} (limit {}, format {}).",
            args.stream_name,
            describe_filters(&args.filters),
            args.limit,
            args.format
        );

        Ok(PartialState::new()
            .message(ChatMessage::assistant(confirmation))
            .tool_args(args))
    }
}
