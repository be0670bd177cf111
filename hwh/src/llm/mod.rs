//! LLM client module
//!
//! Provides the client trait the analyzer calls through the request queue,
//! and an OpenAI implementation.

use std::sync::Arc;

use tracing::{debug, info};

pub mod client;
mod error;
mod openai;
mod types;

pub use client::LlmClient;
pub use error::LlmError;
pub use openai::OpenAIClient;
pub use types::{CompletionRequest, CompletionResponse, Message, Role, TokenUsage};

use crate::config::LlmConfig;

/// Create the configured LLM client
///
/// Returns `Ok(None)` when the API key variable is unset; callers then fall
/// back to offline analysis.
pub fn create_client(config: &LlmConfig) -> Result<Option<Arc<dyn LlmClient>>, LlmError> {
    debug!(model = %config.model, api_key_env = %config.api_key_env, "create_client: called");
    if config.api_key().is_none() {
        info!(
            "No API key in {}, using offline fallback analysis",
            config.api_key_env
        );
        return Ok(None);
    }

    let client = OpenAIClient::from_config(config)?;
    Ok(Some(Arc::new(client)))
}
