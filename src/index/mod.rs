//! Vector index — in-memory cosine top-k over embedded chunks.
//!
//! DESIGN
//! ======
//! The corpus is small and fixed for the life of the process, so a flat
//! scan over every chunk vector is enough. Ties keep corpus order, which
//! makes retrieval deterministic for a given corpus and embedder.

pub mod embed;

use std::cmp::Ordering;
use std::sync::Arc;

use tracing::info;

use crate::config::{Lookup, env_parse, env_string};
use crate::corpus::Chunk;

pub use embed::{Embedder, HashingEmbedder, OpenAiEmbedder};

pub const DEFAULT_TOP_K: usize = 2;
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 512;
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_EMBEDDING_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_EMBEDDING_API_KEY_ENV: &str = "OPENAI_API_KEY";

// =============================================================================
// CONFIG
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingProvider {
    Hashing,
    OpenAi,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexConfig {
    /// Passages handed to the model per query.
    pub top_k: usize,
    pub provider: EmbeddingProvider,
    /// Vector width for the hashing embedder.
    pub dimensions: usize,
    pub model: String,
    pub base_url: String,
    /// Credential name holding the embeddings API key.
    pub api_key_env: String,
}

impl IndexConfig {
    /// Optional:
    /// - `RETRIEVAL_TOP_K`: default 2, minimum 1
    /// - `EMBEDDING_PROVIDER`: `hashing` (default) or `openai`
    /// - `EMBEDDING_DIMENSIONS`: default 512
    /// - `EMBEDDING_MODEL`: default `text-embedding-3-small`
    /// - `EMBEDDING_BASE_URL`: default `OpenAI` endpoint
    /// - `EMBEDDING_API_KEY_ENV`: default `OPENAI_API_KEY`
    pub fn from_lookup(lookup: Lookup<'_>) -> Self {
        let provider = match env_string(lookup, "EMBEDDING_PROVIDER", "hashing")
            .to_ascii_lowercase()
            .as_str()
        {
            "openai" => EmbeddingProvider::OpenAi,
            _ => EmbeddingProvider::Hashing,
        };
        Self {
            top_k: env_parse(lookup, "RETRIEVAL_TOP_K", DEFAULT_TOP_K).max(1),
            provider,
            dimensions: env_parse(lookup, "EMBEDDING_DIMENSIONS", DEFAULT_EMBEDDING_DIMENSIONS).max(1),
            model: env_string(lookup, "EMBEDDING_MODEL", DEFAULT_EMBEDDING_MODEL),
            base_url: env_string(lookup, "EMBEDDING_BASE_URL", DEFAULT_EMBEDDING_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key_env: env_string(lookup, "EMBEDDING_API_KEY_ENV", DEFAULT_EMBEDDING_API_KEY_ENV),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self::from_lookup(&|_: &str| None)
    }
}

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("no chunks to index")]
    NoChunks,

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("embedder returned {got} vectors for {expected} inputs")]
    CountMismatch { expected: usize, got: usize },
}

impl crate::frame::ErrorCode for IndexError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NoChunks => "E_INDEX_EMPTY",
            Self::Embedding(_) => "E_EMBEDDING",
            Self::CountMismatch { .. } => "E_EMBEDDING_COUNT",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Embedding(_))
    }
}

// =============================================================================
// INDEX
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Cosine similarity in `[-1, 1]`.
    pub score: f32,
}

pub struct VectorIndex {
    entries: Vec<(Chunk, Vec<f32>)>,
    embedder: Arc<dyn Embedder>,
}

impl VectorIndex {
    /// Embed every chunk and hold the vectors in memory.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::NoChunks`] for an empty input, or the embedder's
    /// failure.
    pub async fn build(chunks: Vec<Chunk>, embedder: Arc<dyn Embedder>) -> Result<Self, IndexError> {
        if chunks.is_empty() {
            return Err(IndexError::NoChunks);
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder.embed(&texts).await?;
        if vectors.len() != chunks.len() {
            return Err(IndexError::CountMismatch { expected: chunks.len(), got: vectors.len() });
        }
        info!(chunks = chunks.len(), embedder = embedder.name(), "index: built");
        Ok(Self { entries: chunks.into_iter().zip(vectors).collect(), embedder })
    }

    /// The `k` chunks most similar to `query`, best first.
    ///
    /// # Errors
    ///
    /// Returns the embedder's failure for the query text.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>, IndexError> {
        let mut vectors = self.embedder.embed(&[query.to_string()]).await?;
        let Some(query_vec) = vectors.pop() else {
            return Err(IndexError::CountMismatch { expected: 1, got: 0 });
        };

        let mut scored: Vec<ScoredChunk> = self
            .entries
            .iter()
            .map(|(chunk, vector)| ScoredChunk { chunk: chunk.clone(), score: cosine(&query_vec, vector) })
            .collect();
        // Stable sort keeps corpus order among equal scores.
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }
}

/// Cosine similarity; zero when either side has no magnitude or widths differ.
#[must_use]
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na * nb)
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
