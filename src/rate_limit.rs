//! In-memory rate limiting for chat turns.
//!
//! DESIGN
//! ======
//! Sliding-window counters backed by `HashMap<String, VecDeque<Instant>>`.
//! Two limits are enforced before a turn reaches the language model:
//! - Per-session: 10 turns/min
//! - Global: 60 turns/min across every session in the process
//!
//! A rejected turn records nothing, so a throttled user is not pushed
//! further into the window by retrying.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::config::{Lookup, env_parse};
use crate::frame::ErrorCode;

const DEFAULT_PER_SESSION_LIMIT: usize = 10;
const DEFAULT_PER_SESSION_WINDOW_SECS: u64 = 60;

const DEFAULT_GLOBAL_LIMIT: usize = 60;
const DEFAULT_GLOBAL_WINDOW_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub per_session_limit: usize,
    pub per_session_window: Duration,
    pub global_limit: usize,
    pub global_window: Duration,
}

impl RateLimitConfig {
    pub fn from_lookup(lookup: Lookup<'_>) -> Self {
        Self {
            per_session_limit: env_parse(lookup, "RATE_LIMIT_PER_SESSION", DEFAULT_PER_SESSION_LIMIT),
            per_session_window: Duration::from_secs(env_parse(
                lookup,
                "RATE_LIMIT_PER_SESSION_WINDOW_SECS",
                DEFAULT_PER_SESSION_WINDOW_SECS,
            )),
            global_limit: env_parse(lookup, "RATE_LIMIT_GLOBAL", DEFAULT_GLOBAL_LIMIT),
            global_window: Duration::from_secs(env_parse(
                lookup,
                "RATE_LIMIT_GLOBAL_WINDOW_SECS",
                DEFAULT_GLOBAL_WINDOW_SECS,
            )),
        }
    }
}

// =============================================================================
// ERROR TYPE
// =============================================================================

#[derive(Debug, thiserror::Error)]
#[allow(clippy::enum_variant_names)]
pub enum RateLimitError {
    #[error("session rate limit exceeded (max {limit} messages/{window_secs}s)")]
    PerSessionExceeded { limit: usize, window_secs: u64 },
    #[error("global rate limit exceeded (max {limit} messages/{window_secs}s)")]
    GlobalExceeded { limit: usize, window_secs: u64 },
}

impl ErrorCode for RateLimitError {
    fn error_code(&self) -> &'static str {
        "E_RATE_LIMITED"
    }

    fn retryable(&self) -> bool {
        true
    }
}

// =============================================================================
// RATE LIMITER
// =============================================================================

#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Mutex<RateLimiterInner>>,
    config: RateLimitConfig,
}

struct RateLimiterInner {
    /// Per-session turn timestamps.
    session_turns: HashMap<String, VecDeque<Instant>>,
    /// Global turn timestamps.
    global_turns: VecDeque<Instant>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RateLimiterInner {
                session_turns: HashMap::new(),
                global_turns: VecDeque::new(),
            })),
            config,
        }
    }

    /// Check both per-session and global limits, then record the turn.
    ///
    /// # Errors
    ///
    /// Returns a [`RateLimitError`] naming the first limit that is full.
    pub fn check_and_record(&self, session_id: &str) -> Result<(), RateLimitError> {
        self.check_and_record_at(session_id, Instant::now())
    }

    /// Internal: check + record with explicit timestamp (for testing).
    fn check_and_record_at(&self, session_id: &str, now: Instant) -> Result<(), RateLimitError> {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let cfg = self.config;

        // Prune and check global first (no borrow conflict).
        prune_window(&mut inner.global_turns, now, cfg.global_window);
        if inner.global_turns.len() >= cfg.global_limit {
            return Err(RateLimitError::GlobalExceeded {
                limit: cfg.global_limit,
                window_secs: cfg.global_window.as_secs(),
            });
        }

        let session_deque = inner
            .session_turns
            .entry(session_id.to_string())
            .or_default();
        prune_window(session_deque, now, cfg.per_session_window);
        if session_deque.len() >= cfg.per_session_limit {
            return Err(RateLimitError::PerSessionExceeded {
                limit: cfg.per_session_limit,
                window_secs: cfg.per_session_window.as_secs(),
            });
        }

        session_deque.push_back(now);
        inner.global_turns.push_back(now);

        Ok(())
    }

    /// Drop bookkeeping for a session that has been evicted.
    pub fn forget(&self, session_id: &str) {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.session_turns.remove(session_id);
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn prune_window(deque: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&front) = deque.front() {
        if now.duration_since(front) > window {
            deque.pop_front();
        } else {
            break;
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "rate_limit_test.rs"]
mod tests;
