//! Turn controller — one user prompt to one committed assistant answer.
//!
//! DESIGN
//! ======
//! A turn walks `Submitting → StreamingResponse → Committed` and always
//! ends back at `Idle`, whichever way it exits: [`TurnGuard`] restores the
//! phase on drop, which also covers the task being aborted when its socket
//! goes away.
//!
//! The user turn is committed before any engine work so it survives a
//! failed build or query. The assistant turn is committed only after the
//! fragment stream is exhausted; on error or timeout the accumulated text is
//! dropped and the transcript ends with the user turn.
//!
//! Display is decoupled through a channel of [`TurnEvent`]s. A closed
//! receiver does not stop the turn.

use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{info, warn};

use super::conversation::{ChatTurn, Session};
use crate::engine::{BuildError, QueryError};
use crate::frame::ErrorCode;
use crate::rate_limit::RateLimitError;
use crate::state::AppState;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Idle,
    AwaitingUserInput,
    Submitting,
    StreamingResponse,
    Committed,
}

impl TurnPhase {
    #[must_use]
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Submitting | Self::StreamingResponse | Self::Committed)
    }
}

/// Incremental output of a turn, in emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEvent {
    /// The user's prompt has been committed.
    UserTurn(ChatTurn),
    /// Everything received so far for the assistant answer.
    Partial { content: String },
    /// The assistant answer has been committed.
    Committed(ChatTurn),
}

#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("prompt is empty")]
    EmptyPrompt,

    #[error("a response is already streaming in this session")]
    TurnInFlight,

    #[error(transparent)]
    RateLimited(#[from] RateLimitError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("no response fragment within {secs}s")]
    StreamTimeout { secs: u64 },
}

impl ErrorCode for TurnError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::EmptyPrompt => "E_EMPTY_PROMPT",
            Self::TurnInFlight => "E_TURN_IN_FLIGHT",
            Self::RateLimited(e) => e.error_code(),
            Self::Build(e) => e.error_code(),
            Self::Query(e) => e.error_code(),
            Self::StreamTimeout { .. } => "E_STREAM_TIMEOUT",
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::EmptyPrompt => false,
            Self::TurnInFlight | Self::StreamTimeout { .. } => true,
            Self::RateLimited(e) => e.retryable(),
            Self::Build(e) => e.retryable(),
            Self::Query(e) => e.retryable(),
        }
    }
}

// =============================================================================
// GUARD
// =============================================================================

/// Holds a session's single turn slot. Dropping it returns the session to `Idle`.
pub struct TurnGuard<'a> {
    session: &'a Session,
}

impl<'a> TurnGuard<'a> {
    /// # Errors
    ///
    /// Returns [`TurnError::TurnInFlight`] if another turn holds the slot.
    pub fn acquire(session: &'a Session) -> Result<Self, TurnError> {
        if session.begin(TurnPhase::Submitting) {
            Ok(Self { session })
        } else {
            Err(TurnError::TurnInFlight)
        }
    }

    pub fn advance(&self, phase: TurnPhase) {
        self.session.replace_phase(phase);
    }
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        self.session.replace_phase(TurnPhase::Idle);
    }
}

// =============================================================================
// RUN
// =============================================================================

async fn emit(events: &mpsc::Sender<TurnEvent>, event: TurnEvent) {
    let _ = events.send(event).await;
}

/// Run one turn for `session`, streaming progress into `events`.
///
/// Returns the committed assistant turn.
///
/// # Errors
///
/// See [`TurnError`]. Only `Build`, `Query` and `StreamTimeout` leave a
/// committed user turn behind.
pub async fn run_turn(
    state: &AppState,
    session: &Session,
    prompt: &str,
    events: &mpsc::Sender<TurnEvent>,
) -> Result<ChatTurn, TurnError> {
    if prompt.trim().is_empty() {
        return Err(TurnError::EmptyPrompt);
    }
    let guard = TurnGuard::acquire(session)?;
    state.rate_limiter.check_and_record(&session.id)?;

    let started = Instant::now();
    let user = ChatTurn::user(prompt);
    session.append(user.clone()).await;
    emit(events, TurnEvent::UserTurn(user)).await;

    let engine = state.engine.get_or_build().await?;
    let mut stream = engine.query(prompt).await?;
    guard.advance(TurnPhase::StreamingResponse);

    let idle_timeout = state.config.llm.stream_idle_timeout;
    let mut buffer = String::new();
    let mut fragments = 0_usize;
    loop {
        let next = if idle_timeout.is_zero() {
            stream.next_fragment().await
        } else {
            match tokio::time::timeout(idle_timeout, stream.next_fragment()).await {
                Ok(next) => next,
                Err(_) => {
                    warn!(session_id = %session.id, fragments, "turn: stream stalled, discarding partial answer");
                    return Err(TurnError::StreamTimeout { secs: idle_timeout.as_secs() });
                }
            }
        };
        match next {
            Some(Ok(fragment)) => {
                fragments += 1;
                buffer.push_str(&fragment);
                emit(events, TurnEvent::Partial { content: buffer.clone() }).await;
            }
            Some(Err(e)) => {
                warn!(session_id = %session.id, fragments, error = %e, "turn: stream failed, discarding partial answer");
                return Err(QueryError::from(e).into());
            }
            None => break,
        }
    }

    guard.advance(TurnPhase::Committed);
    let reply = ChatTurn::assistant(buffer);
    session.append(reply.clone()).await;
    emit(events, TurnEvent::Committed(reply.clone())).await;

    info!(
        session_id = %session.id,
        fragments,
        chars = reply.content.len(),
        elapsed_ms = started.elapsed().as_millis(),
        "turn: committed"
    );
    Ok(reply)
}

#[cfg(test)]
#[path = "turn_test.rs"]
mod tests;
