//! WebSocket handler — chat turns over a frame stream.
//!
//! DESIGN
//! ======
//! The gate runs before the upgrade; a denied request never opens a socket.
//! On upgrade the connection binds to one session and enters a `select!`
//! loop:
//! - Incoming client frames → parse + dispatch by syscall prefix
//! - Outbound frames from running turns → forward to client
//!
//! Each `chat:prompt` runs as its own task so a long answer never blocks
//! the socket. The task translates [`TurnEvent`]s into `item` frames and
//! finishes with `done` (committed turn) or `error`.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → send `session:connected` with `session_id` and `turns`
//! 2. Client sends frames → dispatch → reply frames or a spawned turn
//! 3. Close → running turns are aborted; their partial answers are dropped

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{info, warn};

use super::{admit, denial_json};
use crate::frame::{Data, Frame, Status};
use crate::services::conversation::{ChatTurn, Session};
use crate::services::turn::{TurnEvent, run_turn};
use crate::state::AppState;

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let session_id = match admit(&state, &params) {
        Ok(id) => id,
        Err(denial) => return denial_json(&denial),
    };
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };
    let session = state.sessions.get_or_create(&session_id).await;
    ws.on_upgrade(move |socket| run_ws(socket, state, session))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState, session: Arc<Session>) {
    // Frames produced by turn tasks.
    let (out_tx, mut out_rx) = mpsc::channel::<Frame>(256);
    // Dropping the set aborts every turn still running.
    let mut turns: JoinSet<()> = JoinSet::new();

    let welcome = Frame::request("session:connected", Data::new())
        .with_session_id(session.id.clone())
        .with_data("session_id", session.id.clone())
        .with_data("turns", turns_value(&session.turns().await));
    if send_frame(&mut socket, &welcome).await.is_err() {
        return;
    }
    session.await_input();
    info!(session_id = %session.id, "ws: client connected");

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(msg) = msg else { break };
                let Ok(msg) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        let replies = process_inbound_text(&state, &session, &out_tx, &mut turns, &text).await;
                        for frame in replies {
                            let _ = send_frame(&mut socket, &frame).await;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(frame) = out_rx.recv() => {
                if send_frame(&mut socket, &frame).await.is_err() {
                    break;
                }
            }
            Some(_) = turns.join_next(), if !turns.is_empty() => {}
        }
    }

    let abandoned = turns.len();
    turns.shutdown().await;
    info!(session_id = %session.id, abandoned, "ws: client disconnected");
}

// =============================================================================
// FRAME DISPATCH
// =============================================================================

/// Parse and process one inbound text frame and return frames for the sender.
///
/// Turn output is not returned here; it flows through `out_tx` from the
/// spawned turn task.
async fn process_inbound_text(
    state: &AppState,
    session: &Arc<Session>,
    out_tx: &mpsc::Sender<Frame>,
    turns: &mut JoinSet<()>,
    text: &str,
) -> Vec<Frame> {
    let mut req: Frame = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(e) => {
            warn!(session_id = %session.id, error = %e, "ws: invalid inbound frame");
            let err = Frame::request("gateway:error", Data::new())
                .with_session_id(session.id.clone())
                .with_data("message", format!("invalid json: {e}"));
            return vec![err];
        }
    };

    // Bind the frame to the gated session, whatever the client claimed.
    req.session_id = Some(session.id.clone());
    info!(session_id = %session.id, id = %req.id, syscall = %req.syscall, status = ?req.status, "ws: recv frame");

    if req.status == Status::Cancel {
        return vec![req.error("cancel is not supported")];
    }

    match req.prefix() {
        "chat" => handle_chat(state, session, out_tx, turns, &req).await,
        prefix => vec![req.error(format!("unknown prefix: {prefix}"))],
    }
}

// =============================================================================
// CHAT HANDLERS
// =============================================================================

async fn handle_chat(
    state: &AppState,
    session: &Arc<Session>,
    out_tx: &mpsc::Sender<Frame>,
    turns: &mut JoinSet<()>,
    req: &Frame,
) -> Vec<Frame> {
    let op = req.syscall.split_once(':').map_or("", |(_, op)| op);

    match op {
        "history" => {
            let mut data = Data::new();
            data.insert("turns".into(), turns_value(&session.turns().await));
            vec![req.done_with(data)]
        }
        "prompt" => {
            let prompt = req
                .data
                .get("prompt")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            turns.spawn(turn_task(state.clone(), Arc::clone(session), req.clone(), prompt, out_tx.clone()));
            Vec::new()
        }
        _ => vec![req.error(format!("unknown chat op: {op}"))],
    }
}

/// Run one turn and relay its events as frames correlated to `req`.
async fn turn_task(state: AppState, session: Arc<Session>, req: Frame, prompt: String, out: mpsc::Sender<Frame>) {
    let (events_tx, mut events_rx) = mpsc::channel::<TurnEvent>(64);

    let run = async move {
        let result = run_turn(&state, &session, &prompt, &events_tx).await;
        drop(events_tx);
        result
    };
    let forward = async {
        while let Some(event) = events_rx.recv().await {
            if let Some(frame) = event_frame(&req, event) {
                let _ = out.send(frame).await;
            }
        }
    };
    let (result, ()) = tokio::join!(run, forward);

    let terminal = match result {
        Ok(turn) => {
            let mut data = Data::new();
            data.insert("turn".into(), serde_json::to_value(&turn).unwrap_or_default());
            req.done_with(data)
        }
        Err(e) => req.error_from(&e),
    };
    let _ = out.send(terminal).await;
}

/// Map a turn event to its `item` frame. The commit itself is reported by
/// the terminal `done`.
fn event_frame(req: &Frame, event: TurnEvent) -> Option<Frame> {
    match event {
        TurnEvent::UserTurn(turn) => {
            let mut data = Data::new();
            data.insert("kind".into(), serde_json::json!("user"));
            data.insert("turn".into(), serde_json::to_value(&turn).unwrap_or_default());
            Some(req.item(data))
        }
        TurnEvent::Partial { content } => {
            let mut data = Data::new();
            data.insert("kind".into(), serde_json::json!("partial"));
            Some(req.item(data).with_content(content))
        }
        TurnEvent::Committed(_) => None,
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn turns_value(turns: &[ChatTurn]) -> serde_json::Value {
    serde_json::to_value(turns).unwrap_or_default()
}

async fn send_frame(socket: &mut WebSocket, frame: &Frame) -> Result<(), ()> {
    let json = match serde_json::to_string(frame) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "ws: failed to serialize frame");
            return Err(());
        }
    };
    if frame.status == Status::Error {
        let code = frame
            .data
            .get("code")
            .and_then(|v| v.as_str())
            .unwrap_or("-");
        let message = frame
            .data
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("-");
        warn!(id = %frame.id, syscall = %frame.syscall, code, message, "ws: send frame status=Error");
    } else if frame.status != Status::Item {
        info!(id = %frame.id, syscall = %frame.syscall, status = ?frame.status, "ws: send frame");
    }
    socket
        .send(Message::Text(json.into()))
        .await
        .map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
