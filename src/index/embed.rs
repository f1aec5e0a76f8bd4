//! Embedders — text to fixed-width vectors.
//!
//! `HashingEmbedder` is local and deterministic: each lowercase word token is
//! hashed with SHA-256 into one of `dimensions` signed buckets and the result
//! is L2-normalized. No network, no model download, stable across restarts.
//! `OpenAiEmbedder` calls an OpenAI-compatible `/embeddings` endpoint.

use sha2::{Digest, Sha256};

use super::IndexError;
use crate::llm::config::LlmTimeouts;
use crate::llm::openai::OpenAiClient;

/// Inputs per `/embeddings` request.
const OPENAI_BATCH_SIZE: usize = 64;

#[async_trait::async_trait]
pub trait Embedder: Send + Sync {
    /// Embed each input; the result has one vector per input, in order.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Embedding`] if the backend fails.
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, IndexError>;

    /// Short name for logs.
    fn name(&self) -> &str;
}

// =============================================================================
// HASHING
// =============================================================================

pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions: dimensions.max(1) }
    }

    #[must_use]
    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimensions];
        for token in tokens(text) {
            let digest = Sha256::digest(token.as_bytes());
            let mut head = [0_u8; 8];
            head.copy_from_slice(&digest[..8]);
            #[allow(clippy::cast_possible_truncation)]
            let bucket = (u64::from_le_bytes(head) % self.dimensions as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        normalize(&mut vector);
        vector
    }
}

#[async_trait::async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, IndexError> {
        Ok(inputs.iter().map(|text| self.embed_one(text)).collect())
    }

    fn name(&self) -> &str {
        "hashing"
    }
}

/// Lowercase alphanumeric word tokens.
pub(crate) fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

// =============================================================================
// OPENAI-COMPATIBLE
// =============================================================================

pub struct OpenAiEmbedder {
    client: OpenAiClient,
    model: String,
}

impl OpenAiEmbedder {
    /// # Errors
    ///
    /// Returns [`IndexError::Embedding`] if the key is blank or the HTTP
    /// client fails to build.
    pub fn new(api_key: &str, base_url: &str, model: impl Into<String>, timeouts: LlmTimeouts) -> Result<Self, IndexError> {
        let client = OpenAiClient::new(api_key, base_url, timeouts).map_err(|e| IndexError::Embedding(e.to_string()))?;
        Ok(Self { client, model: model.into() })
    }
}

#[async_trait::async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, IndexError> {
        let mut out = Vec::with_capacity(inputs.len());
        for batch in inputs.chunks(OPENAI_BATCH_SIZE) {
            let vectors = self
                .client
                .embeddings(&self.model, batch)
                .await
                .map_err(|e| IndexError::Embedding(e.to_string()))?;
            out.extend(vectors);
        }
        Ok(out)
    }

    fn name(&self) -> &str {
        &self.model
    }
}
