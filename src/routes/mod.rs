//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! This module binds the chat page, the history endpoint, the websocket
//! turn channel and the health check under a single Axum router. Every
//! route that can reach a session or the engine runs the access gate first
//! and answers a denial without touching anything downstream.

pub mod chat;
pub mod ws;

use std::collections::HashMap;

use axum::Json;
use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::frame::{ErrorCode, error_data};
use crate::gate::{self, GateDecision, GateDenial};
use crate::state::AppState;

/// Full application router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let static_dir = ServeDir::new(&state.config.static_dir);

    Router::new()
        .route("/", get(chat::index))
        .route("/api/chat/history", get(chat::history))
        .route("/api/ws", get(ws::handle_ws))
        .route("/healthz", get(chat::healthz))
        .nest_service("/static", static_dir)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// GATING
// =============================================================================

/// Run the access gate for one request. `Ok` carries the session key.
pub(crate) fn admit(state: &AppState, params: &HashMap<String, String>) -> Result<String, GateDenial> {
    match gate::check(
        state.credential.as_ref(),
        &state.config.credential_name,
        params,
        &state.config.access_param,
    ) {
        GateDecision::Allowed { session_id } => Ok(session_id),
        GateDecision::Denied(denial) => {
            info!(code = denial.error_code(), "gate: request denied");
            Err(denial)
        }
    }
}

pub(crate) fn denial_status(denial: &GateDenial) -> StatusCode {
    match denial {
        GateDenial::CredentialMissing { .. } => StatusCode::SERVICE_UNAVAILABLE,
        GateDenial::AccessDenied { .. } => StatusCode::FORBIDDEN,
    }
}

/// JSON body for API callers: `{code, message, retryable}`.
pub(crate) fn denial_json(denial: &GateDenial) -> Response {
    (denial_status(denial), Json(error_data(denial))).into_response()
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
