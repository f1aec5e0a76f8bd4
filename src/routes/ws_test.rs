use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpStream;
use tokio::time::{Duration, timeout};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::*;
use crate::services::conversation::Role;
use crate::services::turn::TurnPhase;
use crate::state::test_helpers::*;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect(addr: &str, session_id: &str) -> (Client, Frame) {
    let (mut ws, _) = connect_async(format!("ws://{addr}/api/ws?session_id={session_id}"))
        .await
        .unwrap();
    let welcome = recv(&mut ws).await;
    (ws, welcome)
}

async fn recv(ws: &mut Client) -> Frame {
    loop {
        let msg = timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("frame receive timed out")
            .expect("socket closed")
            .unwrap();
        if let WsMessage::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

/// Collect frames answering `parent` up to and including its terminal frame.
async fn recv_until_terminal(ws: &mut Client, parent: uuid::Uuid) -> Vec<Frame> {
    let mut frames = Vec::new();
    loop {
        let frame = recv(ws).await;
        if frame.parent_id != Some(parent) {
            continue;
        }
        let terminal = frame.status.is_terminal();
        frames.push(frame);
        if terminal {
            return frames;
        }
    }
}

async fn send(ws: &mut Client, frame: &Frame) {
    ws.send(WsMessage::text(serde_json::to_string(frame).unwrap()))
        .await
        .unwrap();
}

fn prompt_frame(prompt: &str) -> Frame {
    let mut data = Data::new();
    data.insert("prompt".into(), json!(prompt));
    Frame::request("chat:prompt", data)
}

// =============================================================================
// HANDSHAKE
// =============================================================================

#[tokio::test]
async fn handshake_without_param_is_refused() {
    let builder = Arc::new(CountingBuilder::failing());
    let addr = spawn_app(test_app_state_with_builder(builder.clone())).await;

    let err = connect_async(format!("ws://{addr}/api/ws")).await.unwrap_err();
    match err {
        tokio_tungstenite::tungstenite::Error::Http(resp) => assert_eq!(resp.status().as_u16(), 403),
        other => panic!("expected HTTP rejection, got {other:?}"),
    }
    assert_eq!(builder.count(), 0);
}

#[tokio::test]
async fn connected_frame_carries_session_and_transcript() {
    let state = test_app_state_with_engine(Arc::new(ScriptedEngine::answering(&["x"])));
    let addr = spawn_app(state).await;

    let (_ws, welcome) = connect(&addr, "abc").await;
    assert_eq!(welcome.syscall, "session:connected");
    assert_eq!(welcome.session_id.as_deref(), Some("abc"));
    assert_eq!(welcome.data["session_id"], "abc");
    assert_eq!(welcome.data["turns"].as_array().unwrap().len(), 1);
}

// =============================================================================
// TURNS
// =============================================================================

#[tokio::test]
async fn prompt_streams_partials_then_done() {
    let state = test_app_state_with_engine(Arc::new(ScriptedEngine::answering(&["Hel", "lo", " world"])));
    let sessions = Arc::clone(&state.sessions);
    let addr = spawn_app(state).await;
    let (mut ws, _) = connect(&addr, "s1").await;

    let req = prompt_frame("Say hello");
    send(&mut ws, &req).await;
    let frames = recv_until_terminal(&mut ws, req.id).await;

    assert_eq!(frames.len(), 5);
    assert_eq!(frames[0].status, Status::Item);
    assert_eq!(frames[0].data["kind"], "user");
    assert_eq!(frames[0].data["turn"], json!({"role": "user", "content": "Say hello"}));
    let partials: Vec<&str> = frames[1..4]
        .iter()
        .map(|f| f.data["content"].as_str().unwrap())
        .collect();
    assert_eq!(partials, vec!["Hel", "Hello", "Hello world"]);
    assert_eq!(frames[4].status, Status::Done);
    assert_eq!(frames[4].data["turn"], json!({"role": "assistant", "content": "Hello world"}));
    assert!(frames.iter().all(|f| f.session_id.as_deref() == Some("s1")));

    let session = sessions.get("s1").await.unwrap();
    assert_eq!(session.len().await, 3);
}

#[tokio::test]
async fn failed_stream_reports_error_and_commits_no_answer() {
    let engine = Arc::new(ScriptedEngine::new(vec![Step::Fragment("Half"), Step::Fail("reset")]));
    let state = test_app_state_with_engine(engine);
    let sessions = Arc::clone(&state.sessions);
    let addr = spawn_app(state).await;
    let (mut ws, _) = connect(&addr, "s").await;

    let req = prompt_frame("question");
    send(&mut ws, &req).await;
    let frames = recv_until_terminal(&mut ws, req.id).await;

    let last = frames.last().unwrap();
    assert_eq!(last.status, Status::Error);
    assert_eq!(last.data["code"], "E_STREAM");
    assert_eq!(last.data["retryable"], true);
    let turns = sessions.get("s").await.unwrap().turns().await;
    assert_eq!(turns.last().unwrap().role, Role::User);
}

#[tokio::test]
async fn empty_prompt_is_an_error_frame() {
    let state = test_app_state_with_engine(Arc::new(ScriptedEngine::answering(&["x"])));
    let addr = spawn_app(state).await;
    let (mut ws, _) = connect(&addr, "s").await;

    let req = prompt_frame("   ");
    send(&mut ws, &req).await;
    let frames = recv_until_terminal(&mut ws, req.id).await;
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].data["code"], "E_EMPTY_PROMPT");
}

#[tokio::test]
async fn history_and_reconnect_see_the_same_transcript() {
    let state = test_app_state_with_engine(Arc::new(ScriptedEngine::answering(&["answer"])));
    let addr = spawn_app(state).await;

    let (mut ws, _) = connect(&addr, "keep").await;
    let req = prompt_frame("q");
    send(&mut ws, &req).await;
    recv_until_terminal(&mut ws, req.id).await;

    let history = Frame::request("chat:history", Data::new());
    send(&mut ws, &history).await;
    let reply = recv_until_terminal(&mut ws, history.id).await;
    assert_eq!(reply[0].data["turns"].as_array().unwrap().len(), 3);
    ws.close(None).await.unwrap();

    let (_ws, welcome) = connect(&addr, "keep").await;
    assert_eq!(welcome.data["turns"], reply[0].data["turns"]);
}

#[tokio::test]
async fn disconnect_mid_stream_drops_partial_answer() {
    let engine = Arc::new(ScriptedEngine::new(vec![Step::Fragment("partial"), Step::Stall]));
    let state = test_app_state_with_engine(engine);
    let sessions = Arc::clone(&state.sessions);
    let addr = spawn_app(state).await;
    let (mut ws, _) = connect(&addr, "gone").await;

    let req = prompt_frame("q");
    send(&mut ws, &req).await;
    // user item, then the first partial
    recv(&mut ws).await;
    recv(&mut ws).await;
    drop(ws);

    let session = sessions.get("gone").await.unwrap();
    for _ in 0..100 {
        if session.phase() == TurnPhase::Idle {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(session.phase(), TurnPhase::Idle);
    assert_eq!(session.len().await, 2);
    assert_eq!(session.last_turn().await.unwrap().role, Role::User);
}

// =============================================================================
// DISPATCH ERRORS
// =============================================================================

#[tokio::test]
async fn unknown_prefix_and_bad_json_are_reported() {
    let state = test_app_state_with_engine(Arc::new(ScriptedEngine::answering(&["x"])));
    let addr = spawn_app(state).await;
    let (mut ws, _) = connect(&addr, "s").await;

    let req = Frame::request("board:join", Data::new());
    send(&mut ws, &req).await;
    let frames = recv_until_terminal(&mut ws, req.id).await;
    assert_eq!(frames[0].status, Status::Error);
    assert_eq!(frames[0].data["message"], "unknown prefix: board");

    ws.send(WsMessage::text("not json")).await.unwrap();
    let err = recv(&mut ws).await;
    assert_eq!(err.syscall, "gateway:error");
}

#[tokio::test]
async fn cancel_is_not_supported() {
    let state = test_app_state_with_engine(Arc::new(ScriptedEngine::answering(&["x"])));
    let addr = spawn_app(state).await;
    let (mut ws, _) = connect(&addr, "s").await;

    let mut req = prompt_frame("q");
    req.status = Status::Cancel;
    send(&mut ws, &req).await;
    let frames = recv_until_terminal(&mut ws, req.id).await;
    assert_eq!(frames[0].status, Status::Error);
    assert_eq!(frames[0].data["message"], "cancel is not supported");
}
