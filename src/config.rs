//! Application configuration parsed from environment variables.
//!
//! Every sub-config exposes `from_lookup`, which takes the key → value
//! function to read from. `main` passes [`env_lookup`]; tests pass a map so
//! they never touch process-global environment.

use std::path::PathBuf;
use std::time::Duration;

use crate::corpus::CorpusConfig;
use crate::index::IndexConfig;
use crate::llm::config::LlmConfig;
use crate::rate_limit::RateLimitConfig;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_ACCESS_PARAM: &str = "session_id";
pub const DEFAULT_CREDENTIAL_NAME: &str = "GROQ_API_KEY";
pub const DEFAULT_SECRETS_FILE: &str = ".secrets/secrets.yaml";
pub const DEFAULT_STATIC_DIR: &str = "static";
pub const DEFAULT_TITLE: &str = "Chat Assistant";
pub const DEFAULT_CAPTION: &str = "Welcome! I'm an AI assistant that answers questions from our knowledge base.";
pub const DEFAULT_GREETING: &str = "Hello! How can I assist you today based on our knowledge base?";
pub const DEFAULT_ICON: &str = "🤖";
pub const DEFAULT_SESSION_SWEEP_INTERVAL_SECS: u64 = 60;

/// Key → value lookup used by every `from_lookup` constructor.
pub type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Read a key from the process environment.
#[must_use]
pub fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Parse `key` with `FromStr`, falling back to `default` when absent or invalid.
pub fn env_parse<T>(lookup: Lookup<'_>, key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

/// Parse a boolean flag. Accepts `1/0`, `true/false`, `yes/no`, `on/off`.
pub fn env_flag(lookup: Lookup<'_>, key: &str, default: bool) -> bool {
    match lookup(key).map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        Some("1" | "true" | "yes" | "on") => true,
        Some("0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

/// Read a string key, treating blank values as absent.
pub fn env_string(lookup: Lookup<'_>, key: &str, default: &str) -> String {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

// =============================================================================
// APP CONFIG
// =============================================================================

/// Page text shown by the chat UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageConfig {
    pub title: String,
    pub caption: String,
    /// Seeded assistant turn at the start of every session.
    pub greeting: String,
    /// Browser tab icon, usually a single emoji.
    pub icon: String,
    /// Logo file name under `STATIC_DIR`, shown above the title.
    pub logo: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub port: u16,
    /// Query parameter whose presence opens the gate.
    pub access_param: String,
    /// Name of the credential looked up in the secret store and environment.
    pub credential_name: String,
    pub secrets_file: PathBuf,
    pub static_dir: PathBuf,
    pub page: PageConfig,
    /// Sessions idle longer than this are evicted. `None` keeps them until restart.
    pub session_idle_ttl: Option<Duration>,
    pub session_sweep_interval: Duration,
    pub corpus: CorpusConfig,
    pub index: IndexConfig,
    pub llm: LlmConfig,
    pub rate_limit: RateLimitConfig,
}

impl AppConfig {
    /// Build the full application config from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(&env_lookup)
    }

    /// Build the full application config from an arbitrary lookup.
    ///
    /// Unparseable numeric values fall back to their defaults.
    #[must_use]
    pub fn from_lookup(lookup: Lookup<'_>) -> Self {
        let idle_ttl_secs: u64 = env_parse(lookup, "SESSION_IDLE_TTL_SECS", 0);
        Self {
            port: env_parse(lookup, "PORT", DEFAULT_PORT),
            access_param: env_string(lookup, "ACCESS_PARAM", DEFAULT_ACCESS_PARAM),
            credential_name: env_string(lookup, "CREDENTIAL_NAME", DEFAULT_CREDENTIAL_NAME),
            secrets_file: PathBuf::from(env_string(lookup, "SECRETS_FILE", DEFAULT_SECRETS_FILE)),
            static_dir: PathBuf::from(env_string(lookup, "STATIC_DIR", DEFAULT_STATIC_DIR)),
            page: PageConfig {
                title: env_string(lookup, "APP_TITLE", DEFAULT_TITLE),
                caption: env_string(lookup, "APP_CAPTION", DEFAULT_CAPTION),
                greeting: env_string(lookup, "CHAT_GREETING", DEFAULT_GREETING),
                icon: env_string(lookup, "APP_ICON", DEFAULT_ICON),
                logo: Some(env_string(lookup, "APP_LOGO", "")).filter(|v| !v.is_empty()),
            },
            session_idle_ttl: (idle_ttl_secs > 0).then(|| Duration::from_secs(idle_ttl_secs)),
            session_sweep_interval: Duration::from_secs(
                env_parse(lookup, "SESSION_SWEEP_INTERVAL_SECS", DEFAULT_SESSION_SWEEP_INTERVAL_SECS).max(1),
            ),
            corpus: CorpusConfig::from_lookup(lookup),
            index: IndexConfig::from_lookup(lookup),
            llm: LlmConfig::from_lookup(lookup),
            rate_limit: RateLimitConfig::from_lookup(lookup),
        }
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
