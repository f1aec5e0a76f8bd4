//! Pull-based fragment stream returned by every streamed chat call.
//!
//! Consumers call [`FragmentStream::next_fragment`] until it yields `None`.
//! The stream is lazy, finite and not restartable; a new query produces a
//! new stream.

use std::fmt;

use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};

use super::types::LlmError;

pub struct FragmentStream {
    inner: BoxStream<'static, Result<String, LlmError>>,
}

impl FragmentStream {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<String, LlmError>> + Send + 'static,
    {
        Self { inner: stream.boxed() }
    }

    /// A stream that yields `fragments` in order and then ends.
    #[must_use]
    pub fn from_fragments(fragments: Vec<String>) -> Self {
        Self::new(stream::iter(fragments.into_iter().map(Ok)))
    }

    /// Pull the next fragment. `None` means the stream is exhausted.
    pub async fn next_fragment(&mut self) -> Option<Result<String, LlmError>> {
        self.inner.next().await
    }

    /// Drain the stream into one string. Test-side convenience.
    ///
    /// # Errors
    ///
    /// Returns the first error the stream yields; fragments seen so far are dropped.
    #[cfg(test)]
    pub async fn collect_text(mut self) -> Result<String, LlmError> {
        let mut out = String::new();
        while let Some(fragment) = self.next_fragment().await {
            out.push_str(&fragment?);
        }
        Ok(out)
    }
}

impl fmt::Debug for FragmentStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FragmentStream").finish_non_exhaustive()
    }
}
