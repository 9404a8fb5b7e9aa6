//! Retrying wrapper around a reasoning client

use std::time::Duration;

use async_trait::async_trait;

use crate::{ChatMessage, Completion, ReasoningClient, Result};

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Calculate delay for a given attempt (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_secs =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_secs_f64(delay_secs.min(self.max_delay.as_secs_f64()))
    }
}

/// Wraps a client and retries retryable failures with exponential backoff.
pub struct RetryingClient<C> {
    inner: C,
    config: RetryConfig,
}

impl<C: ReasoningClient> RetryingClient<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            config: RetryConfig::default(),
        }
    }

    /// Set retry configuration
    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.config = config;
        self
    }
}

#[async_trait]
impl<C: ReasoningClient> ReasoningClient for RetryingClient<C> {
    async fn invoke(&self, messages: &[ChatMessage]) -> Result<Completion> {
        let mut attempt = 0u32;
        loop {
            match self.inner.invoke(messages).await {
                Ok(completion) => return Ok(completion),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = self.config.delay_for_attempt(attempt);
                    tracing::warn!(
                        "Reasoning request failed (attempt {}/{}): {}. Retrying in {:?}...",
                        attempt + 1,
                        self.config.max_retries + 1,
                        e,
                        delay
                    );
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use parking_lot::Mutex;

    /// Fails with the queued errors first, then succeeds.
    struct FlakyClient {
        failures: Mutex<Vec<Error>>,
        calls: Mutex<u32>,
    }

    impl FlakyClient {
        fn new(failures: Vec<Error>) -> Self {
            Self {
                failures: Mutex::new(failures),
                calls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl ReasoningClient for FlakyClient {
        async fn invoke(&self, _messages: &[ChatMessage]) -> Result<Completion> {
            *self.calls.lock() += 1;
            let mut failures = self.failures.lock();
            if failures.is_empty() {
                Ok(Completion::text("ok"))
            } else {
                Err(failures.remove(0))
            }
        }
    }

    fn fast_config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
        }
    }

    #[test]
    fn test_delay_for_attempt_is_capped() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(10), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_retries_retryable_errors() {
        let client = RetryingClient::new(FlakyClient::new(vec![
            Error::RateLimited { retry_after: None },
            Error::api("overloaded_error", "busy"),
        ]))
        .with_retry_config(fast_config(3));

        let reply = client.invoke(&[ChatMessage::user("hi")]).await.unwrap();
        assert_eq!(reply.content, "ok");
        assert_eq!(*client.inner.calls.lock(), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_fatal_errors() {
        let client = RetryingClient::new(FlakyClient::new(vec![Error::InvalidApiKey]))
            .with_retry_config(fast_config(3));

        let err = client.invoke(&[ChatMessage::user("hi")]).await.unwrap_err();
        assert!(matches!(err, Error::InvalidApiKey));
        assert_eq!(*client.inner.calls.lock(), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let client = RetryingClient::new(FlakyClient::new(vec![
            Error::RateLimited { retry_after: None },
            Error::RateLimited { retry_after: None },
            Error::RateLimited { retry_after: None },
        ]))
        .with_retry_config(fast_config(1));

        let err = client.invoke(&[ChatMessage::user("hi")]).await.unwrap_err();
        assert!(matches!(err, Error::RateLimited { .. }));
        assert_eq!(*client.inner.calls.lock(), 2);
    }
}
