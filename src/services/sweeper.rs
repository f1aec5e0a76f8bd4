//! Idle session sweeper.
//!
//! Off by default: sessions live until restart. With `SESSION_IDLE_TTL_SECS`
//! set, a background task periodically drops sessions that have been idle
//! for longer than the TTL and that no connection or turn still holds.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

use crate::state::AppState;

/// Evict idle sessions once, forgetting their rate-limit history. Returns
/// how many were dropped.
pub async fn sweep_once(state: &AppState, ttl: Duration) -> usize {
    let evicted = state.sessions.evict_idle(ttl).await;
    for id in &evicted {
        state.rate_limiter.forget(id);
    }
    if !evicted.is_empty() {
        let remaining = state.sessions.len().await;
        info!(evicted = evicted.len(), remaining, "sessions: evicted idle");
    }
    evicted.len()
}

/// Spawn the sweeper if an idle TTL is configured.
#[must_use]
pub fn spawn_session_sweeper(state: AppState) -> Option<JoinHandle<()>> {
    let ttl = state.config.session_idle_ttl?;
    let every = state.config.session_sweep_interval;
    info!(ttl_secs = ttl.as_secs(), interval_secs = every.as_secs(), "session sweeper configured");
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            sweep_once(&state, ttl).await;
        }
    }))
}
