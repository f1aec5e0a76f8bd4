//! LLM types — provider-neutral messages, errors and the chat trait.

use serde::{Deserialize, Serialize};

use super::stream::FragmentStream;

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by LLM client operations.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// A configuration value is out of range or unusable.
    #[error("config parse failed: {0}")]
    ConfigParse(String),

    /// The API key is empty.
    #[error("missing API key: {var} is empty")]
    MissingApiKey { var: String },

    /// The HTTP request to the LLM provider failed.
    #[error("API request failed: {0}")]
    ApiRequest(String),

    /// The LLM provider returned a non-success HTTP status.
    #[error("API response error: status {status}")]
    ApiResponse { status: u16, body: String },

    /// The LLM provider response body could not be deserialized.
    #[error("API response parse failed: {0}")]
    ApiParse(String),

    /// The response stream broke off or carried an error event.
    #[error("response stream failed: {0}")]
    Stream(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl crate::frame::ErrorCode for LlmError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::ConfigParse(_) => "E_CONFIG_PARSE",
            Self::MissingApiKey { .. } => "E_MISSING_API_KEY",
            Self::ApiRequest(_) => "E_API_REQUEST",
            Self::ApiResponse { .. } => "E_API_RESPONSE",
            Self::ApiParse(_) => "E_API_PARSE",
            Self::Stream(_) => "E_STREAM",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
        }
    }

    fn retryable(&self) -> bool {
        matches!(
            self,
            Self::ApiRequest(_) | Self::Stream(_) | Self::ApiResponse { status: 429 | 500..=599, .. }
        )
    }
}

// =============================================================================
// MESSAGE TYPES
// =============================================================================

/// A single chat-completions message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: content.into() }
    }
}

// =============================================================================
// LLM CHAT TRAIT
// =============================================================================

/// Provider-neutral async trait for streamed chat. Enables mocking in tests.
#[async_trait::async_trait]
pub trait LlmChat: Send + Sync {
    /// Send `messages` and return the answer as a lazy fragment stream.
    ///
    /// # Errors
    ///
    /// Returns an [`LlmError`] if the request cannot be sent or the provider
    /// rejects it. Failures after the first byte surface through the stream.
    async fn chat_stream(&self, messages: &[Message]) -> Result<FragmentStream, LlmError>;
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
