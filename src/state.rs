//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor.
//! It holds the typed config, the credential resolved at startup, the
//! process-wide engine cache and the live session store. Clone is required
//! by Axum; every field is `Arc`-wrapped or cheap to clone.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::engine::{EngineBuilder, EngineCache};
use crate::rate_limit::RateLimiter;
use crate::secrets::Credential;
use crate::services::conversation::SessionStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    /// `None` when no secret source held the credential; the gate denies everything.
    pub credential: Option<Credential>,
    pub engine: Arc<EngineCache>,
    pub sessions: Arc<SessionStore>,
    /// In-memory rate limiter for chat turns.
    pub rate_limiter: RateLimiter,
}

impl AppState {
    #[must_use]
    pub fn new(config: AppConfig, credential: Option<Credential>, builder: Arc<dyn EngineBuilder>) -> Self {
        let sessions = Arc::new(SessionStore::new(config.page.greeting.clone()));
        let rate_limiter = RateLimiter::new(config.rate_limit);
        Self { config: Arc::new(config), credential, engine: Arc::new(EngineCache::new(builder)), sessions, rate_limiter }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
pub mod test_helpers {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::{StreamExt, stream};

    use super::*;
    use crate::engine::{BuildError, Engine, QueryError};
    use crate::index::IndexError;
    use crate::llm::stream::FragmentStream;
    use crate::llm::types::LlmError;
    use crate::secrets::CredentialSource;

    /// One step of a simulated answer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Step {
        Fragment(&'static str),
        /// Mid-stream provider failure.
        Fail(&'static str),
        /// Never yield again.
        Stall,
    }

    /// Engine that replays scripted answers, one script per query. The last
    /// script repeats once the queue runs dry.
    pub struct ScriptedEngine {
        scripts: Mutex<VecDeque<Vec<Step>>>,
        last: Mutex<Vec<Step>>,
        pub queries: Mutex<Vec<String>>,
    }

    impl ScriptedEngine {
        #[must_use]
        pub fn new(steps: Vec<Step>) -> Self {
            Self::sequence(vec![steps])
        }

        #[must_use]
        pub fn sequence(scripts: Vec<Vec<Step>>) -> Self {
            Self { scripts: Mutex::new(scripts.into()), last: Mutex::new(Vec::new()), queries: Mutex::new(Vec::new()) }
        }

        #[must_use]
        pub fn answering(fragments: &[&'static str]) -> Self {
            Self::new(fragments.iter().copied().map(Step::Fragment).collect())
        }
    }

    fn stream_for(steps: Vec<Step>) -> FragmentStream {
        let stalls = steps.contains(&Step::Stall);
        let items: Vec<Result<String, LlmError>> = steps
            .into_iter()
            .filter_map(|step| match step {
                Step::Fragment(text) => Some(Ok(text.to_string())),
                Step::Fail(message) => Some(Err(LlmError::Stream(message.to_string()))),
                Step::Stall => None,
            })
            .collect();
        let head = stream::iter(items);
        if stalls { FragmentStream::new(head.chain(stream::pending())) } else { FragmentStream::new(head) }
    }

    #[async_trait::async_trait]
    impl Engine for ScriptedEngine {
        async fn query(&self, prompt: &str) -> Result<FragmentStream, QueryError> {
            self.queries.lock().unwrap().push(prompt.to_string());
            let next = self.scripts.lock().unwrap().pop_front();
            let steps = match next {
                Some(steps) => {
                    self.last.lock().unwrap().clone_from(&steps);
                    steps
                }
                None => self.last.lock().unwrap().clone(),
            };
            Ok(stream_for(steps))
        }
    }

    /// Builder that hands out a fixed engine and counts invocations.
    pub struct CountingBuilder {
        pub builds: AtomicUsize,
        engine: Option<Arc<dyn Engine>>,
    }

    impl CountingBuilder {
        #[must_use]
        pub fn with_engine(engine: Arc<dyn Engine>) -> Self {
            Self { builds: AtomicUsize::new(0), engine: Some(engine) }
        }

        /// A builder whose every build fails.
        #[must_use]
        pub fn failing() -> Self {
            Self { builds: AtomicUsize::new(0), engine: None }
        }

        pub fn count(&self) -> usize {
            self.builds.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl EngineBuilder for CountingBuilder {
        async fn build(&self) -> Result<Arc<dyn Engine>, BuildError> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            self.engine
                .clone()
                .ok_or(BuildError::IndexBuild(IndexError::NoChunks))
        }
    }

    #[must_use]
    pub fn test_config() -> AppConfig {
        AppConfig::from_lookup(&|_: &str| None)
    }

    #[must_use]
    pub fn test_credential() -> Credential {
        Credential::new("gsk_test", CredentialSource::LocalEnvironment)
    }

    /// `AppState` with a credential and the given builder.
    #[must_use]
    pub fn test_app_state_with_builder(builder: Arc<dyn EngineBuilder>) -> AppState {
        AppState::new(test_config(), Some(test_credential()), builder)
    }

    /// `AppState` whose engine cache builds `engine`.
    #[must_use]
    pub fn test_app_state_with_engine(engine: Arc<dyn Engine>) -> AppState {
        test_app_state_with_builder(Arc::new(CountingBuilder::with_engine(engine)))
    }

    /// Serve the full router on a loopback port. Returns `host:port`.
    pub async fn spawn_app(state: AppState) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, crate::routes::app(state)).await.unwrap();
        });
        addr.to_string()
    }
}
