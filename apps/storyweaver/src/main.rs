mod batch;
mod config;
mod errors;
mod llm_client;
mod providers;
mod routes;
mod state;
mod story;
#[cfg(test)]
mod testing;
mod usage;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::llm_client::structured::StructuredClient;
use crate::llm_client::LlmClient;
use crate::providers::openai::OpenAiMediaClient;
use crate::providers::translation::{DeeplTranslator, LlmTranslator};
use crate::providers::Translator;
use crate::routes::build_router;
use crate::state::AppState;
use crate::story::engine::{Collaborators, StoryEngine};
use crate::story::session::SessionRegistry;
use crate::story::store::StoryStore;
use crate::usage::UsageTracker;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Storyweaver v{}", env!("CARGO_PKG_VERSION"));

    let usage = Arc::new(UsageTracker::new());

    // Text generation
    let llm = Arc::new(LlmClient::new(
        config.openai_api_key.clone(),
        config.openai_model.clone(),
        Arc::clone(&usage),
    )?);
    info!("LLM client initialized (model: {})", llm.model());

    // Images and speech
    let media = Arc::new(OpenAiMediaClient::new(
        config.openai_api_key.clone(),
        Arc::clone(&usage),
    )?);

    // Translation: DeepL when a key is configured, otherwise the text model
    let translator: Arc<dyn Translator> = match &config.deepl_api_key {
        Some(key) => {
            info!("Translation via DeepL");
            Arc::new(DeeplTranslator::new(key.clone())?)
        }
        None => {
            info!("Translation via {}", llm.model());
            Arc::new(LlmTranslator::new(
                StructuredClient::new(llm.clone()),
                config.max_attempts.max(1),
            ))
        }
    };

    let store = StoryStore::new(&config.data_dir);
    info!("Story data directory: {}", config.data_dir);

    let engine = StoryEngine::new(
        Collaborators {
            text: llm,
            images: media.clone(),
            speech: media,
            translator,
        },
        store,
        config.engine_config(),
    );

    let state = AppState {
        engine: Arc::new(engine),
        sessions: Arc::new(SessionRegistry::new()),
        usage,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once a frontend host is fixed

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
