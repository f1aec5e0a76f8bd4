use super::*;

const GREETING: &str = "Hello! How can I assist you today based on our knowledge base?";

// =============================================================================
// ConversationState
// =============================================================================

#[test]
fn new_state_holds_only_the_greeting() {
    let state = ConversationState::new(GREETING);
    assert_eq!(state.all().len(), 1);
    assert_eq!(state.all()[0], ChatTurn::assistant(GREETING));
}

#[test]
fn append_preserves_order() {
    let mut state = ConversationState::new(GREETING);
    state.append(ChatTurn::user("q"));
    state.append(ChatTurn::assistant("a"));
    let roles: Vec<Role> = state.all().iter().map(|t| t.role).collect();
    assert_eq!(roles, vec![Role::Assistant, Role::User, Role::Assistant]);
    assert_eq!(state.all().last().unwrap().content, "a");
}

#[test]
fn chat_turn_serializes_lowercase_role() {
    let json = serde_json::to_value(ChatTurn::user("hi")).unwrap();
    assert_eq!(json, serde_json::json!({"role": "user", "content": "hi"}));
}

// =============================================================================
// SessionStore
// =============================================================================

#[tokio::test]
async fn get_or_create_returns_same_session_for_same_key() {
    let store = SessionStore::new(GREETING);
    let a = store.get_or_create("abc").await;
    let b = store.get_or_create("abc").await;
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn sessions_are_isolated_by_key() {
    let store = SessionStore::new(GREETING);
    let a = store.get_or_create("a").await;
    let b = store.get_or_create("b").await;
    a.append(ChatTurn::user("only in a")).await;
    assert_eq!(a.len().await, 2);
    assert_eq!(b.len().await, 1);
}

#[tokio::test]
async fn get_does_not_create() {
    let store = SessionStore::new(GREETING);
    assert!(store.get("missing").await.is_none());
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn new_session_starts_idle_with_greeting() {
    let store = SessionStore::new(GREETING);
    let s = store.get_or_create("x").await;
    assert_eq!(s.phase(), TurnPhase::Idle);
    assert_eq!(s.turns().await, vec![ChatTurn::assistant(GREETING)]);
}

#[tokio::test]
async fn evict_idle_skips_held_and_recent_sessions() {
    let store = SessionStore::new(GREETING);
    let held = store.get_or_create("held").await;
    drop(store.get_or_create("released").await);

    // Zero TTL: anything idle for any time is stale unless still referenced.
    tokio::time::sleep(Duration::from_millis(5)).await;
    let evicted = store.evict_idle(Duration::ZERO).await;
    assert_eq!(evicted, vec!["released".to_string()]);
    assert!(store.get("held").await.is_some());

    // A long TTL keeps everything.
    drop(held);
    assert!(store.evict_idle(Duration::from_secs(3600)).await.is_empty());
}

#[tokio::test]
async fn evict_idle_skips_session_mid_turn() {
    let store = SessionStore::new(GREETING);
    {
        let s = store.get_or_create("busy").await;
        assert!(s.begin(TurnPhase::Submitting));
    }
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert!(store.evict_idle(Duration::ZERO).await.is_empty());
}

#[test]
fn begin_fails_while_in_flight() {
    let s = Session::new("s", GREETING);
    assert!(s.begin(TurnPhase::Submitting));
    assert!(!s.begin(TurnPhase::Submitting));
    s.replace_phase(TurnPhase::Idle);
    assert!(s.begin(TurnPhase::Submitting));
}

#[test]
fn await_input_leaves_running_turn_alone() {
    let s = Session::new("s", GREETING);
    s.await_input();
    assert_eq!(s.phase(), TurnPhase::AwaitingUserInput);
    s.replace_phase(TurnPhase::StreamingResponse);
    s.await_input();
    assert_eq!(s.phase(), TurnPhase::StreamingResponse);
}
