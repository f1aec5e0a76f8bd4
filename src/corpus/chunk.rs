//! Word-window chunking.
//!
//! Each document is split on whitespace into windows of `size` words, with
//! consecutive windows sharing `overlap` words. The final window may be
//! short. Whitespace inside a chunk is normalized to single spaces.

use super::Document;

/// A retrievable slice of one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub doc_id: String,
    /// Position of this chunk within its document, from 0.
    pub ordinal: usize,
    pub text: String,
}

/// Split `text` into overlapping word windows.
///
/// `size` is raised to 1 and `overlap` is clamped below `size`, so the
/// window always advances.
#[must_use]
pub fn split_words(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let size = size.max(1);
    let step = size - overlap.min(size - 1);
    let words: Vec<&str> = text.split_whitespace().collect();

    let mut out = Vec::new();
    let mut start = 0;
    while start < words.len() {
        let end = (start + size).min(words.len());
        out.push(words[start..end].join(" "));
        if end == words.len() {
            break;
        }
        start += step;
    }
    out
}

/// Chunk every document, preserving document order.
#[must_use]
pub fn chunk_documents(documents: &[Document], size: usize, overlap: usize) -> Vec<Chunk> {
    documents
        .iter()
        .flat_map(|doc| {
            split_words(&doc.text, size, overlap)
                .into_iter()
                .enumerate()
                .map(|(ordinal, text)| Chunk { doc_id: doc.id.clone(), ordinal, text })
        })
        .collect()
}
