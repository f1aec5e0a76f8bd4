//! Chat page, transcript history and health endpoints.

use std::collections::HashMap;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use serde::Serialize;

use super::{admit, denial_json, denial_status};
use crate::config::PageConfig;
use crate::gate::GateDenial;
use crate::services::conversation::ChatTurn;
use crate::state::AppState;

const CHAT_PAGE: &str = include_str!("../../assets/index.html");

// =============================================================================
// PAGE
// =============================================================================

/// `GET /` — the chat UI, or a blocking notice when the gate denies.
pub async fn index(State(state): State<AppState>, Query(params): Query<HashMap<String, String>>) -> Response {
    let session_id = match admit(&state, &params) {
        Ok(id) => id,
        Err(denial) => return notice_page(&state.config.page.title, &denial),
    };
    state.sessions.get_or_create(&session_id).await;
    Html(render_chat_page(&state.config.page, &state.config.access_param)).into_response()
}

pub(crate) fn render_chat_page(page: &PageConfig, access_param: &str) -> String {
    let logo = page.logo.as_deref().map_or_else(String::new, |file| {
        format!(r#"<img class="logo" src="/static/{}" alt="">"#, escape_html(file.trim_start_matches('/')))
    });
    CHAT_PAGE
        .replace("{{TITLE}}", &escape_html(&page.title))
        .replace("{{CAPTION}}", &escape_html(&page.caption))
        .replace("{{ICON}}", &escape_html(&page.icon))
        .replace("{{LOGO}}", &logo)
        .replace("{{ACCESS_PARAM}}", &escape_html(access_param))
}

fn notice_page(title: &str, denial: &GateDenial) -> Response {
    let (heading, class) = match denial {
        GateDenial::CredentialMissing { .. } => ("Service unavailable", "error"),
        GateDenial::AccessDenied { .. } => ("Access restricted", "warning"),
    };
    let body = format!(
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>{title}</title></head>\
         <body><main class=\"notice {class}\"><h1>{heading}</h1><p>{message}</p></main></body></html>",
        title = escape_html(title),
        message = escape_html(&denial.to_string()),
    );
    (denial_status(denial), Html(body)).into_response()
}

pub(crate) fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

// =============================================================================
// HISTORY
// =============================================================================

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub session_id: String,
    pub turns: Vec<ChatTurn>,
}

/// `GET /api/chat/history` — the caller's transcript, oldest first.
pub async fn history(State(state): State<AppState>, Query(params): Query<HashMap<String, String>>) -> Response {
    let session_id = match admit(&state, &params) {
        Ok(id) => id,
        Err(denial) => return denial_json(&denial),
    };
    let session = state.sessions.get_or_create(&session_id).await;
    let turns = session.turns().await;
    Json(HistoryResponse { session_id, turns }).into_response()
}

// =============================================================================
// HEALTH
// =============================================================================

#[derive(Debug, Serialize)]
pub struct Health {
    pub engine_ready: bool,
    pub sessions: usize,
}

/// `GET /healthz` — liveness plus engine readiness. Never builds the engine.
pub async fn healthz(State(state): State<AppState>) -> (StatusCode, Json<Health>) {
    let health = Health { engine_ready: state.engine.is_built(), sessions: state.sessions.len().await };
    (StatusCode::OK, Json(health))
}

#[cfg(test)]
#[path = "chat_test.rs"]
mod tests;
