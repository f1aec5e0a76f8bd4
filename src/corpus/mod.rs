//! Corpus — the read-only document set the assistant answers from.
//!
//! DESIGN
//! ======
//! Every non-hidden regular file under the corpus root is one document.
//! Text is decoded lossily so a stray binary or mis-encoded file degrades
//! to replacement characters instead of failing the whole build. Documents
//! are returned sorted by id so chunk order, and therefore retrieval ties,
//! is stable across runs.

pub mod chunk;

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::{Lookup, env_flag, env_parse, env_string};

pub use chunk::{Chunk, chunk_documents};

pub const DEFAULT_DATA_PATH: &str = "data";
pub const DEFAULT_CHUNK_SIZE: usize = 200;
pub const DEFAULT_CHUNK_OVERLAP: usize = 20;

// =============================================================================
// CONFIG
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusConfig {
    pub path: PathBuf,
    /// Descend into subdirectories.
    pub recursive: bool,
    /// Words per chunk.
    pub chunk_size: usize,
    /// Words shared between consecutive chunks of one document.
    pub chunk_overlap: usize,
}

impl CorpusConfig {
    /// Optional:
    /// - `DATA_PATH`: default `data`
    /// - `CORPUS_RECURSIVE`: default false
    /// - `CHUNK_SIZE`: default 200 words, minimum 1
    /// - `CHUNK_OVERLAP`: default 20 words, clamped below `CHUNK_SIZE`
    pub fn from_lookup(lookup: Lookup<'_>) -> Self {
        let chunk_size = env_parse(lookup, "CHUNK_SIZE", DEFAULT_CHUNK_SIZE).max(1);
        let chunk_overlap = env_parse(lookup, "CHUNK_OVERLAP", DEFAULT_CHUNK_OVERLAP).min(chunk_size - 1);
        Self {
            path: PathBuf::from(env_string(lookup, "DATA_PATH", DEFAULT_DATA_PATH)),
            recursive: env_flag(lookup, "CORPUS_RECURSIVE", false),
            chunk_size,
            chunk_overlap,
        }
    }
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self::from_lookup(&|_: &str| None)
    }
}

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CorpusError {
    #[error("corpus directory {path} is unreadable: {source}")]
    Unreadable { path: PathBuf, source: std::io::Error },

    #[error("corpus directory {path} contains no documents")]
    Empty { path: PathBuf },
}

impl crate::frame::ErrorCode for CorpusError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Unreadable { .. } => "E_CORPUS_UNREADABLE",
            Self::Empty { .. } => "E_CORPUS_EMPTY",
        }
    }

    fn retryable(&self) -> bool {
        true
    }
}

/// One source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Path relative to the corpus root, `/`-separated.
    pub id: String,
    pub text: String,
}

// =============================================================================
// LOADING
// =============================================================================

/// Read every document under `config.path`.
///
/// # Errors
///
/// Returns [`CorpusError::Unreadable`] if the root cannot be listed and
/// [`CorpusError::Empty`] if it holds no documents. Individual files that
/// fail to read are logged and skipped.
pub async fn load_documents(config: &CorpusConfig) -> Result<Vec<Document>, CorpusError> {
    let root = config.path.as_path();
    let mut pending = vec![root.to_path_buf()];
    let mut documents = Vec::new();

    while let Some(dir) = pending.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(source) if dir == root => {
                return Err(CorpusError::Unreadable { path: root.to_path_buf(), source });
            }
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "corpus: skipping unreadable directory");
                continue;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "corpus: directory listing interrupted");
                    break;
                }
            };
            if is_hidden(&entry.file_name()) {
                continue;
            }
            let path = entry.path();
            let Ok(file_type) = entry.file_type().await else {
                continue;
            };
            if file_type.is_dir() {
                if config.recursive {
                    pending.push(path);
                }
                continue;
            }
            match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    let id = document_id(root, &path);
                    debug!(%id, bytes = bytes.len(), "corpus: loaded document");
                    documents.push(Document { id, text: String::from_utf8_lossy(&bytes).into_owned() });
                }
                Err(e) => warn!(path = %path.display(), error = %e, "corpus: skipping unreadable file"),
            }
        }
    }

    if documents.is_empty() {
        return Err(CorpusError::Empty { path: root.to_path_buf() });
    }
    documents.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(documents)
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

fn document_id(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
