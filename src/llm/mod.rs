//! LLM — streamed chat against an OpenAI-compatible provider.
//!
//! DESIGN
//! ======
//! Groq serves an OpenAI-compatible `/chat/completions`, so a single client
//! covers it and any other compatible gateway selected by `LLM_BASE_URL`.
//! Callers only see [`LlmChat`]; the engine never touches HTTP types.

pub mod config;
pub mod openai;
pub mod stream;
pub mod types;

use config::LlmConfig;
use stream::FragmentStream;
use types::{LlmChat, LlmError, Message};

// =============================================================================
// CLIENT
// =============================================================================

pub struct LlmClient {
    inner: openai::OpenAiClient,
    config: LlmConfig,
}

impl LlmClient {
    /// Build a client from typed config and the resolved provider credential.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is blank, the temperature is outside
    /// `0.0..=2.0`, or the HTTP client fails to build.
    pub fn new(config: LlmConfig, api_key: &str) -> Result<Self, LlmError> {
        if !(0.0..=2.0).contains(&config.temperature) {
            return Err(LlmError::ConfigParse(format!(
                "LLM_TEMPERATURE must be within 0.0..=2.0, got {}",
                config.temperature
            )));
        }
        let inner = openai::OpenAiClient::new(api_key, &config.base_url, config.timeouts)?;
        Ok(Self { inner, config })
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn sampling(&self) -> openai::Sampling<'_> {
        openai::Sampling {
            model: &self.config.model,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        }
    }
}

#[async_trait::async_trait]
impl LlmChat for LlmClient {
    async fn chat_stream(&self, messages: &[Message]) -> Result<FragmentStream, LlmError> {
        if self.config.streaming {
            return self.inner.stream(self.sampling(), messages).await;
        }
        let text = self.inner.complete(self.sampling(), messages).await?;
        Ok(FragmentStream::from_fragments(vec![text]))
    }
}
