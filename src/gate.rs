//! Access gate — decides whether a request may reach the chat engine.
//!
//! The gate is a pure predicate. It runs before any session lookup or engine
//! build, so a denied request never triggers expensive work. Callers render
//! the denial as a blocking notice; the process keeps serving.

use std::collections::HashMap;

use crate::frame::ErrorCode;
use crate::secrets::Credential;

/// Why a request was turned away.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateDenial {
    /// No secret source yielded the language-model credential.
    #[error("{name} is not set. Add it to the deployment secrets file or a local .env file.")]
    CredentialMissing { name: String },
    /// The access parameter is absent from the request's query string.
    #[error("Please access this chat through the unique link provided in your email.")]
    AccessDenied { param: String },
}

impl ErrorCode for GateDenial {
    fn error_code(&self) -> &'static str {
        match self {
            Self::CredentialMissing { .. } => "E_CREDENTIAL_MISSING",
            Self::AccessDenied { .. } => "E_ACCESS_DENIED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Carries the value of the access parameter, used as the session key.
    Allowed { session_id: String },
    Denied(GateDenial),
}

/// Check the credential first, then the presence of `param` in `query`.
///
/// Only presence is checked; the value is not validated against any record.
#[must_use]
pub fn check(
    credential: Option<&Credential>,
    credential_name: &str,
    query: &HashMap<String, String>,
    param: &str,
) -> GateDecision {
    if credential.is_none() {
        return GateDecision::Denied(GateDenial::CredentialMissing { name: credential_name.to_string() });
    }
    match query.get(param) {
        Some(value) => GateDecision::Allowed { session_id: value.clone() },
        None => GateDecision::Denied(GateDenial::AccessDenied { param: param.to_string() }),
    }
}
