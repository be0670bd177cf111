//! LLM error types

use std::time::Duration;
use thiserror::Error;

use crate::queue::RateLimitSignal;

/// Errors that can occur during LLM operations
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Quota exceeded: {message}")]
    QuotaExceeded { message: String },

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("API key not found. Set the {0} environment variable.")]
    MissingApiKey(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LlmError {
    /// Check if this error is retryable by the client itself
    ///
    /// Rate limits are deliberately excluded: those are left to the request queue.
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::ApiError { status, .. } => matches!(status, 408 | 500 | 502 | 503 | 504),
            LlmError::Network(e) => !e.is_rate_limited(),
            LlmError::RateLimited { .. }
            | LlmError::QuotaExceeded { .. }
            | LlmError::InvalidResponse(_)
            | LlmError::MissingApiKey(_)
            | LlmError::Json(_) => false,
        }
    }

    /// Get the server's retry hint if this is a rate limit error
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            LlmError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl RateLimitSignal for LlmError {
    fn is_rate_limited(&self) -> bool {
        match self {
            LlmError::RateLimited { .. } | LlmError::QuotaExceeded { .. } => true,
            LlmError::ApiError { status, .. } => *status == 429,
            LlmError::Network(e) => e.is_rate_limited(),
            _ => false,
        }
    }
}
