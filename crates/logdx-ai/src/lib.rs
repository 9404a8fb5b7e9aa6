//! logdx-ai: Reasoning-service client abstraction
//!
//! This crate provides the request/response interface the workflow engine uses
//! to talk to a text-generation model, plus HTTP clients for OpenAI-compatible
//! and Anthropic endpoints and a retrying wrapper.

pub mod client;
pub mod error;
pub mod providers;
pub mod retry;
pub mod types;

pub use client::{ReasoningClient, SharedClient};
pub use error::{Error, Result};
pub use retry::{RetryConfig, RetryingClient};
pub use types::*;
