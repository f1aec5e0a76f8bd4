//! Engine — retrieval plus streamed generation for one query.
//!
//! DESIGN
//! ======
//! `RagEngine` embeds the query, takes the top-k chunks from the index,
//! renders them into the QA template and streams the model's answer. It is
//! built once per process (see [`cache::EngineCache`]) and shared behind an
//! `Arc<dyn Engine>`, so queries take `&self` and hold no per-turn state.
//!
//! TRADE-OFFS
//! ==========
//! The engine is stateless across turns: prior conversation is not fed back
//! into the prompt. Each question is answered from the corpus alone.

pub mod builder;
pub mod cache;

use std::sync::Arc;

use tracing::debug;

use crate::index::{IndexError, ScoredChunk, VectorIndex};
use crate::llm::stream::FragmentStream;
use crate::llm::types::{LlmChat, LlmError, Message};

pub use builder::RagEngineBuilder;
pub use cache::{BuildError, EngineBuilder, EngineCache};

// =============================================================================
// TRAIT
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("retrieval failed: {0}")]
    Retrieval(#[from] IndexError),

    #[error(transparent)]
    Llm(#[from] LlmError),
}

impl crate::frame::ErrorCode for QueryError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Retrieval(e) => e.error_code(),
            Self::Llm(e) => e.error_code(),
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Retrieval(e) => e.retryable(),
            Self::Llm(e) => e.retryable(),
        }
    }
}

/// Answers one query as a lazy fragment stream. Enables simulated engines in tests.
#[async_trait::async_trait]
pub trait Engine: Send + Sync {
    /// # Errors
    ///
    /// Returns a [`QueryError`] if retrieval fails or the model rejects the
    /// request. Failures after the first fragment surface through the stream.
    async fn query(&self, prompt: &str) -> Result<FragmentStream, QueryError>;
}

// =============================================================================
// RAG ENGINE
// =============================================================================

const QA_TEMPLATE_HEAD: &str = "Context information is below.\n---------------------\n";
const QA_TEMPLATE_MID: &str = "\n---------------------\nGiven the context information and not prior knowledge, answer the query.\nQuery: ";
const QA_TEMPLATE_TAIL: &str = "\nAnswer: ";

/// Render retrieved passages and the user query into the QA prompt.
#[must_use]
pub fn qa_prompt(passages: &[ScoredChunk], query: &str) -> String {
    let context = passages
        .iter()
        .map(|p| p.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("{QA_TEMPLATE_HEAD}{context}{QA_TEMPLATE_MID}{query}{QA_TEMPLATE_TAIL}")
}

pub struct RagEngine {
    index: VectorIndex,
    llm: Arc<dyn LlmChat>,
    top_k: usize,
}

impl RagEngine {
    #[must_use]
    pub fn new(index: VectorIndex, llm: Arc<dyn LlmChat>, top_k: usize) -> Self {
        Self { index, llm, top_k: top_k.max(1) }
    }
}

#[async_trait::async_trait]
impl Engine for RagEngine {
    async fn query(&self, prompt: &str) -> Result<FragmentStream, QueryError> {
        let passages = self.index.retrieve(prompt, self.top_k).await?;
        debug!(
            passages = passages.len(),
            top_score = passages.first().map_or(0.0, |p| p.score),
            "engine: retrieved context"
        );
        let messages = [Message::user(qa_prompt(&passages, prompt))];
        Ok(self.llm.chat_stream(&messages).await?)
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
