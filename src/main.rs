mod config;
mod corpus;
mod engine;
mod frame;
mod gate;
mod index;
mod llm;
mod rate_limit;
mod routes;
mod secrets;
mod services;
mod state;

use std::process::ExitCode;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::engine::RagEngineBuilder;
use crate::index::EmbeddingProvider;
use crate::secrets::SecretResolver;

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is normal in deployment.
    let dotenv = dotenvy::dotenv();
    tracing_subscriber::fmt::init();
    if let Ok(path) = dotenv {
        tracing::info!(path = %path.display(), "loaded .env");
    }

    let config = AppConfig::from_env();
    let resolver = SecretResolver::standard(&config.secrets_file);

    // Non-fatal: without a credential every gated request gets the notice.
    let credential = resolver.resolve(&config.credential_name);
    match &credential {
        Some(c) => tracing::info!(name = %config.credential_name, source = ?c.source(), "credential resolved"),
        None => tracing::warn!(name = %config.credential_name, "credential not found, chat disabled"),
    }
    let embedding_key = match config.index.provider {
        EmbeddingProvider::OpenAi => resolver.resolve(&config.index.api_key_env),
        EmbeddingProvider::Hashing => None,
    };

    let builder = Arc::new(RagEngineBuilder::new(&config, credential.clone(), embedding_key));
    let port = config.port;
    tracing::info!(
        corpus = %config.corpus.path.display(),
        model = %config.llm.model,
        base_url = %config.llm.base_url,
        access_param = %config.access_param,
        "configuration loaded"
    );

    let state = state::AppState::new(config, credential, builder);

    // Spawn idle session eviction when a TTL is configured.
    let _sweeper = services::sweeper::spawn_session_sweeper(state.clone());

    let app = routes::app(state);
    let listener = match tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%port, error = %e, "failed to bind");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(%port, "corpus-chat listening");
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "server failed");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
