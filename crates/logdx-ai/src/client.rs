//! Reasoning-service client trait

use std::sync::Arc;

use async_trait::async_trait;

use crate::{ChatMessage, Completion, Result};

/// A request/response text-generation service.
///
/// Implementations receive the full prompt (system instruction first, when
/// present) and return the reply text. Failures are transport or quota
/// errors; callers decide whether to retry.
#[async_trait]
pub trait ReasoningClient: Send + Sync {
    /// Send the prompt messages and wait for the reply
    async fn invoke(&self, messages: &[ChatMessage]) -> Result<Completion>;
}

/// Type alias for a shared client
pub type SharedClient = Arc<dyn ReasoningClient>;

#[async_trait]
impl<T: ReasoningClient + ?Sized> ReasoningClient for Arc<T> {
    async fn invoke(&self, messages: &[ChatMessage]) -> Result<Completion> {
        (**self).invoke(messages).await
    }
}
