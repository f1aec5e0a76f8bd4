//! Production engine builder: corpus → chunks → index, plus the LLM client.

use std::sync::Arc;

use tracing::info;

use super::cache::{BuildError, EngineBuilder};
use super::{Engine, RagEngine};
use crate::config::AppConfig;
use crate::corpus::{self, CorpusConfig};
use crate::index::{Embedder, EmbeddingProvider, HashingEmbedder, IndexConfig, IndexError, OpenAiEmbedder, VectorIndex};
use crate::llm::LlmClient;
use crate::llm::config::LlmConfig;
use crate::llm::types::LlmError;
use crate::secrets::Credential;

pub struct RagEngineBuilder {
    corpus: CorpusConfig,
    index: IndexConfig,
    llm: LlmConfig,
    credential_name: String,
    credential: Option<Credential>,
    embedding_key: Option<Credential>,
}

impl RagEngineBuilder {
    /// `embedding_key` is only consulted when the `openai` embedding provider
    /// is selected.
    #[must_use]
    pub fn new(config: &AppConfig, credential: Option<Credential>, embedding_key: Option<Credential>) -> Self {
        Self {
            corpus: config.corpus.clone(),
            index: config.index.clone(),
            llm: config.llm.clone(),
            credential_name: config.credential_name.clone(),
            credential,
            embedding_key,
        }
    }

    fn embedder(&self) -> Result<Arc<dyn Embedder>, IndexError> {
        match self.index.provider {
            EmbeddingProvider::Hashing => Ok(Arc::new(HashingEmbedder::new(self.index.dimensions))),
            EmbeddingProvider::OpenAi => {
                let key = self.embedding_key.as_ref().map(Credential::expose).unwrap_or_default();
                if key.is_empty() {
                    return Err(IndexError::Embedding(format!("{} is not set", self.index.api_key_env)));
                }
                let embedder = OpenAiEmbedder::new(key, &self.index.base_url, &self.index.model, self.llm.timeouts)?;
                Ok(Arc::new(embedder))
            }
        }
    }
}

#[async_trait::async_trait]
impl EngineBuilder for RagEngineBuilder {
    async fn build(&self) -> Result<Arc<dyn Engine>, BuildError> {
        let documents = corpus::load_documents(&self.corpus).await?;

        let Some(credential) = self.credential.as_ref() else {
            return Err(LlmError::MissingApiKey { var: self.credential_name.clone() }.into());
        };
        let llm = LlmClient::new(self.llm.clone(), credential.expose())?;

        let chunks = corpus::chunk_documents(&documents, self.corpus.chunk_size, self.corpus.chunk_overlap);
        let chunk_count = chunks.len();
        let index = VectorIndex::build(chunks, self.embedder()?).await?;

        info!(
            documents = documents.len(),
            chunks = chunk_count,
            model = llm.model(),
            top_k = self.index.top_k,
            streaming = self.llm.streaming,
            "engine: components assembled"
        );
        Ok(Arc::new(RagEngine::new(index, Arc::new(llm), self.index.top_k)))
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::frame::ErrorCode;
    use crate::secrets::CredentialSource;

    struct Corpus(PathBuf);

    impl Corpus {
        fn with(files: &[(&str, &str)]) -> Self {
            let path = std::env::temp_dir().join(format!("builder-test-{}", uuid::Uuid::new_v4()));
            std::fs::create_dir_all(&path).unwrap();
            for (name, text) in files {
                std::fs::write(path.join(name), text).unwrap();
            }
            Self(path)
        }
    }

    impl Drop for Corpus {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }

    fn config(corpus: &Corpus) -> AppConfig {
        let mut cfg = AppConfig::from_lookup(&|_: &str| None);
        cfg.corpus.path = corpus.0.clone();
        cfg.llm.base_url = "http://127.0.0.1:1".into();
        cfg
    }

    fn key() -> Option<Credential> {
        Some(Credential::new("gsk_test", CredentialSource::LocalEnvironment))
    }

    #[tokio::test]
    async fn builds_from_corpus_without_network() {
        let corpus = Corpus::with(&[("faq.txt", "Our office opens at nine.")]);
        let builder = RagEngineBuilder::new(&config(&corpus), key(), None);
        assert!(builder.build().await.is_ok());
    }

    #[tokio::test]
    async fn missing_corpus_is_corpus_load_failure() {
        let corpus = Corpus::with(&[]);
        let mut cfg = config(&corpus);
        cfg.corpus.path = corpus.0.join("absent");
        let err = RagEngineBuilder::new(&cfg, key(), None).build().await.err().unwrap();
        assert!(matches!(err, BuildError::CorpusLoad(_)));
        assert_eq!(err.error_code(), "E_CORPUS_LOAD");
    }

    #[tokio::test]
    async fn blank_only_corpus_is_index_build_failure() {
        let corpus = Corpus::with(&[("blank.txt", "   \n")]);
        let err = RagEngineBuilder::new(&config(&corpus), key(), None).build().await.err().unwrap();
        assert!(matches!(err, BuildError::IndexBuild(IndexError::NoChunks)));
    }

    #[tokio::test]
    async fn missing_credential_is_llm_setup_failure() {
        let corpus = Corpus::with(&[("faq.txt", "text")]);
        let err = RagEngineBuilder::new(&config(&corpus), None, None).build().await.err().unwrap();
        assert!(matches!(err, BuildError::LlmSetup(LlmError::MissingApiKey { ref var }) if var == "GROQ_API_KEY"));
    }

    #[tokio::test]
    async fn openai_embeddings_need_a_key() {
        let corpus = Corpus::with(&[("faq.txt", "text")]);
        let mut cfg = config(&corpus);
        cfg.index.provider = EmbeddingProvider::OpenAi;
        let err = RagEngineBuilder::new(&cfg, key(), None).build().await.err().unwrap();
        assert!(matches!(err, BuildError::IndexBuild(IndexError::Embedding(_))));
    }
}
