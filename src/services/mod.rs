//! Domain services used by websocket and HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own conversation state and turn logic so route handlers
//! can stay focused on protocol translation and gating.

pub mod conversation;
pub mod sweeper;
pub mod turn;
