//! Credential resolution with an ordered source fallback.
//!
//! DESIGN
//! ======
//! The deployment secret store (a YAML mapping file mounted by the host) is
//! consulted first, then the process environment, which `main` has already
//! seeded from `.env` via `dotenvy`. The first non-blank value wins.
//!
//! A source that cannot be read (file missing, malformed, not mounted) is
//! skipped, never fatal: resolution degrades to "absent" and the access gate
//! reports the missing credential to the user.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use tracing::{debug, info, warn};

// =============================================================================
// TYPES
// =============================================================================

/// Where a resolved credential came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    DeploymentSecret,
    LocalEnvironment,
}

/// A resolved credential. The value never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    value: String,
    source: CredentialSource,
}

impl Credential {
    #[must_use]
    pub fn new(value: impl Into<String>, source: CredentialSource) -> Self {
        Self { value: value.into(), source }
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.value
    }

    #[must_use]
    pub fn source(&self) -> CredentialSource {
        self.source
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("value", &"<redacted>")
            .field("source", &self.source)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    /// The store is not configured or its backing file does not exist.
    #[error("secret store unavailable: {0}")]
    Unavailable(String),
    /// The store exists but could not be read or parsed.
    #[error("secret store unreadable: {0}")]
    Unreadable(String),
}

// =============================================================================
// SOURCES
// =============================================================================

/// One place a credential can be looked up by name.
pub trait SecretSource: Send + Sync {
    fn kind(&self) -> CredentialSource;

    /// Look up `name`. `Ok(None)` means the source is healthy but has no value.
    ///
    /// # Errors
    ///
    /// Returns a [`SecretError`] when the source itself cannot be consulted.
    fn lookup(&self, name: &str) -> Result<Option<String>, SecretError>;
}

/// Deployment secret store backed by a flat YAML mapping file.
pub struct SecretsFile {
    path: PathBuf,
}

impl SecretsFile {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SecretSource for SecretsFile {
    fn kind(&self) -> CredentialSource {
        CredentialSource::DeploymentSecret
    }

    fn lookup(&self, name: &str) -> Result<Option<String>, SecretError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SecretError::Unavailable(self.path.display().to_string()));
            }
            Err(e) => return Err(SecretError::Unreadable(format!("{}: {e}", self.path.display()))),
        };
        let secrets = parse_secrets_yaml(&raw)?;
        Ok(secrets.get(name).cloned())
    }
}

/// Parse a flat `name: value` YAML mapping. Non-string scalars are stringified;
/// nested values are ignored.
pub(crate) fn parse_secrets_yaml(raw: &str) -> Result<HashMap<String, String>, SecretError> {
    if raw.trim().is_empty() {
        return Ok(HashMap::new());
    }
    let value: serde_yaml::Value =
        serde_yaml::from_str(raw).map_err(|e| SecretError::Unreadable(e.to_string()))?;
    let serde_yaml::Value::Mapping(map) = value else {
        return Err(SecretError::Unreadable("expected a top-level mapping".into()));
    };

    let mut out = HashMap::new();
    for (key, value) in map {
        let Some(key) = key.as_str() else { continue };
        let value = match value {
            serde_yaml::Value::String(s) => s,
            serde_yaml::Value::Number(n) => n.to_string(),
            serde_yaml::Value::Bool(b) => b.to_string(),
            _ => continue,
        };
        out.insert(key.to_string(), value);
    }
    Ok(out)
}

/// Local process environment (including values loaded from `.env`).
pub struct EnvSecrets;

impl SecretSource for EnvSecrets {
    fn kind(&self) -> CredentialSource {
        CredentialSource::LocalEnvironment
    }

    fn lookup(&self, name: &str) -> Result<Option<String>, SecretError> {
        Ok(std::env::var(name).ok())
    }
}

// =============================================================================
// RESOLVER
// =============================================================================

/// Ordered list of secret sources.
pub struct SecretResolver {
    sources: Vec<Box<dyn SecretSource>>,
}

impl SecretResolver {
    #[must_use]
    pub fn new(sources: Vec<Box<dyn SecretSource>>) -> Self {
        Self { sources }
    }

    /// Deployment secrets file first, then the environment.
    #[must_use]
    pub fn standard(secrets_file: impl Into<PathBuf>) -> Self {
        Self::new(vec![Box::new(SecretsFile::new(secrets_file)), Box::new(EnvSecrets)])
    }

    /// Resolve `name` from the first source holding a non-blank value.
    ///
    /// Never fails: unreadable sources are skipped and exhaustion yields `None`.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<Credential> {
        for source in &self.sources {
            match source.lookup(name) {
                Ok(Some(value)) if !value.trim().is_empty() => {
                    info!(credential = name, source = ?source.kind(), "secrets: credential resolved");
                    return Some(Credential::new(value.trim(), source.kind()));
                }
                Ok(_) => debug!(credential = name, source = ?source.kind(), "secrets: no value"),
                Err(SecretError::Unavailable(detail)) => {
                    debug!(credential = name, source = ?source.kind(), %detail, "secrets: source unavailable");
                }
                Err(e) => warn!(credential = name, source = ?source.kind(), error = %e, "secrets: source failed"),
            }
        }
        warn!(credential = name, "secrets: credential not found in any source");
        None
    }
}

#[cfg(test)]
#[path = "secrets_test.rs"]
mod tests;
