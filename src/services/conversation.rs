//! Conversation transcripts and the in-memory session store.
//!
//! DESIGN
//! ======
//! A session is keyed by the access parameter's value and owns one
//! append-only transcript, seeded with the assistant greeting so it is
//! never empty. The transcript sits behind a `tokio::sync::RwLock` because
//! readers (history requests, reconnects) hold it across awaits; the turn
//! phase uses a `std::sync::Mutex` because it is only flipped, never held.
//!
//! TRADE-OFFS
//! ==========
//! Nothing is persisted. A restart clears every transcript.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::turn::TurnPhase;

// =============================================================================
// TURNS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message in a transcript. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

// =============================================================================
// CONVERSATION STATE
// =============================================================================

/// Ordered transcript, oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationState {
    turns: Vec<ChatTurn>,
}

impl ConversationState {
    /// A transcript holding only the assistant greeting.
    pub fn new(greeting: impl Into<String>) -> Self {
        Self { turns: vec![ChatTurn::assistant(greeting)] }
    }

    pub fn append(&mut self, turn: ChatTurn) {
        self.turns.push(turn);
    }

    #[must_use]
    pub fn all(&self) -> &[ChatTurn] {
        &self.turns
    }
}

// =============================================================================
// SESSION
// =============================================================================

pub struct Session {
    pub id: String,
    conversation: RwLock<ConversationState>,
    phase: Mutex<TurnPhase>,
    last_active: Mutex<Instant>,
}

impl Session {
    pub fn new(id: impl Into<String>, greeting: &str) -> Self {
        Self {
            id: id.into(),
            conversation: RwLock::new(ConversationState::new(greeting)),
            phase: Mutex::new(TurnPhase::Idle),
            last_active: Mutex::new(Instant::now()),
        }
    }

    /// Copy of every turn, oldest first.
    pub async fn turns(&self) -> Vec<ChatTurn> {
        self.conversation.read().await.all().to_vec()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.conversation.read().await.all().len()
    }

    #[cfg(test)]
    pub async fn last_turn(&self) -> Option<ChatTurn> {
        self.conversation.read().await.all().last().cloned()
    }

    pub(crate) async fn append(&self, turn: ChatTurn) {
        self.conversation.write().await.append(turn);
        self.touch();
    }

    #[must_use]
    pub fn phase(&self) -> TurnPhase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the phase, returning the previous one.
    pub(crate) fn replace_phase(&self, next: TurnPhase) -> TurnPhase {
        let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *phase, next)
    }

    /// Atomically move from a resting phase to `next`. Fails if a turn is in flight.
    pub(crate) fn begin(&self, next: TurnPhase) -> bool {
        let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
        if phase.is_in_flight() {
            return false;
        }
        *phase = next;
        true
    }

    /// Mark the chat input as shown, unless a turn is running.
    pub fn await_input(&self) {
        let mut phase = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
        if !phase.is_in_flight() {
            *phase = TurnPhase::AwaitingUserInput;
        }
    }

    pub fn touch(&self) {
        *self.last_active.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.last_active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }
}

// =============================================================================
// SESSION STORE
// =============================================================================

pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    greeting: String,
}

impl SessionStore {
    pub fn new(greeting: impl Into<String>) -> Self {
        Self { sessions: RwLock::new(HashMap::new()), greeting: greeting.into() }
    }

    /// Return the session for `id`, creating a freshly greeted one if absent.
    pub async fn get_or_create(&self, id: &str) -> Arc<Session> {
        if let Some(session) = self.sessions.read().await.get(id) {
            session.touch();
            return Arc::clone(session);
        }
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Session::new(id, &self.greeting)));
        session.touch();
        Arc::clone(session)
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Remove sessions idle longer than `ttl` that no connection holds and
    /// no turn is using. Returns the evicted ids.
    pub async fn evict_idle(&self, ttl: Duration) -> Vec<String> {
        let mut sessions = self.sessions.write().await;
        let stale: Vec<String> = sessions
            .iter()
            .filter(|(_, s)| Arc::strong_count(s) == 1 && !s.phase().is_in_flight() && s.idle_for() > ttl)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            sessions.remove(id);
        }
        stale
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    #[cfg(test)]
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
#[path = "conversation_test.rs"]
mod tests;
