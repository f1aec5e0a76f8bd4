//! Engine cache — one engine per process, built on first gated use.
//!
//! DESIGN
//! ======
//! `tokio::sync::OnceCell::get_or_try_init` serializes concurrent first
//! callers: exactly one runs the builder, the rest await its outcome and
//! then share the same `Arc`. A failed build leaves the cell empty, so the
//! next caller retries from scratch. There is no invalidation; the engine
//! lives until the process exits.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::OnceCell;
use tracing::{info, warn};

use super::Engine;
use crate::corpus::CorpusError;
use crate::index::IndexError;
use crate::llm::types::LlmError;

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("corpus load failed: {0}")]
    CorpusLoad(#[from] CorpusError),

    #[error("index build failed: {0}")]
    IndexBuild(#[from] IndexError),

    #[error("llm setup failed: {0}")]
    LlmSetup(#[from] LlmError),
}

impl crate::frame::ErrorCode for BuildError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::CorpusLoad(_) => "E_CORPUS_LOAD",
            Self::IndexBuild(_) => "E_INDEX_BUILD",
            Self::LlmSetup(_) => "E_LLM_SETUP",
        }
    }

    /// Nothing is cached on failure; the next turn rebuilds.
    fn retryable(&self) -> bool {
        true
    }
}

// =============================================================================
// BUILDER TRAIT
// =============================================================================

/// Produces the process engine. Enables counting or failing builders in tests.
#[async_trait::async_trait]
pub trait EngineBuilder: Send + Sync {
    /// # Errors
    ///
    /// Returns a [`BuildError`] naming the stage that failed.
    async fn build(&self) -> Result<Arc<dyn Engine>, BuildError>;
}

// =============================================================================
// CACHE
// =============================================================================

pub struct EngineCache {
    cell: OnceCell<Arc<dyn Engine>>,
    builder: Arc<dyn EngineBuilder>,
}

impl EngineCache {
    #[must_use]
    pub fn new(builder: Arc<dyn EngineBuilder>) -> Self {
        Self { cell: OnceCell::new(), builder }
    }

    /// Return the engine, building it if no build has succeeded yet.
    ///
    /// # Errors
    ///
    /// Returns the builder's [`BuildError`]; the cache stays empty.
    pub async fn get_or_build(&self) -> Result<Arc<dyn Engine>, BuildError> {
        let engine = self
            .cell
            .get_or_try_init(|| async {
                let started = Instant::now();
                info!("engine: building");
                match self.builder.build().await {
                    Ok(engine) => {
                        info!(elapsed_ms = started.elapsed().as_millis(), "engine: ready");
                        Ok(engine)
                    }
                    Err(e) => {
                        warn!(error = %e, elapsed_ms = started.elapsed().as_millis(), "engine: build failed");
                        Err(e)
                    }
                }
            })
            .await?;
        Ok(Arc::clone(engine))
    }

    #[must_use]
    pub fn is_built(&self) -> bool {
        self.cell.initialized()
    }
}

#[cfg(test)]
#[path = "cache_test.rs"]
mod tests;
