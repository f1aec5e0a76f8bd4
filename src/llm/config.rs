//! LLM configuration parsed from environment variables.

use std::time::Duration;

use crate::config::{Lookup, env_flag, env_parse, env_string};

pub const DEFAULT_LLM_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_LLM_MODEL: &str = "llama3-8b-8192";
pub const DEFAULT_LLM_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_LLM_REQUEST_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_LLM_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_LLM_STREAM_IDLE_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LlmTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LlmConfig {
    pub model: String,
    pub temperature: f32,
    /// Completion cap. `None` leaves the provider default in place.
    pub max_tokens: Option<u32>,
    /// OpenAI-compatible base URL, without trailing slash.
    pub base_url: String,
    /// Stream answers fragment by fragment instead of one final body.
    pub streaming: bool,
    pub timeouts: LlmTimeouts,
    /// Longest gap tolerated between two streamed fragments.
    pub stream_idle_timeout: Duration,
}

impl LlmConfig {
    /// Build typed LLM config from a key lookup.
    ///
    /// Optional:
    /// - `LLM_MODEL`: default `llama3-8b-8192`
    /// - `LLM_TEMPERATURE`: default 0.7
    /// - `LLM_MAX_TOKENS`: provider default when absent
    /// - `LLM_BASE_URL`: default Groq OpenAI-compatible endpoint
    /// - `LLM_STREAMING`: default true
    /// - `LLM_REQUEST_TIMEOUT_SECS`: default 120
    /// - `LLM_CONNECT_TIMEOUT_SECS`: default 10
    /// - `LLM_STREAM_IDLE_TIMEOUT_SECS`: default 60
    pub fn from_lookup(lookup: Lookup<'_>) -> Self {
        let max_tokens: u32 = env_parse(lookup, "LLM_MAX_TOKENS", 0);
        Self {
            model: env_string(lookup, "LLM_MODEL", DEFAULT_LLM_MODEL),
            temperature: env_parse(lookup, "LLM_TEMPERATURE", DEFAULT_LLM_TEMPERATURE),
            max_tokens: (max_tokens > 0).then_some(max_tokens),
            base_url: env_string(lookup, "LLM_BASE_URL", DEFAULT_LLM_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            streaming: env_flag(lookup, "LLM_STREAMING", true),
            timeouts: LlmTimeouts {
                request_secs: env_parse(lookup, "LLM_REQUEST_TIMEOUT_SECS", DEFAULT_LLM_REQUEST_TIMEOUT_SECS),
                connect_secs: env_parse(lookup, "LLM_CONNECT_TIMEOUT_SECS", DEFAULT_LLM_CONNECT_TIMEOUT_SECS),
            },
            stream_idle_timeout: Duration::from_secs(env_parse(
                lookup,
                "LLM_STREAM_IDLE_TIMEOUT_SECS",
                DEFAULT_LLM_STREAM_IDLE_TIMEOUT_SECS,
            )),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self::from_lookup(&|_: &str| None)
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
