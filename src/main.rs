use anyhow::Result;
use std::{fs, io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;

use services::{
    ai_gateway::{OpenAiCompatGateway, ProviderConfig},
    content_service::ContentService,
    conversation_store::ConversationStore,
    storage_service::StorageService,
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config ---
    let cfg = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting learnwise-server with config: {:?}", cfg);

    // --- Ensure upload directory exists ---
    if !Path::new(&cfg.upload_dir).exists() {
        fs::create_dir_all(&cfg.upload_dir)?;
        tracing::info!("Created upload directory at {}", cfg.upload_dir);
    }

    // --- AI provider ---
    let provider = ProviderConfig::from_env();
    if provider.kind.is_none() {
        tracing::warn!("AI provider `{}` is not supported", provider.provider);
    } else if provider.api_key.is_none() {
        tracing::warn!(
            "No API key configured for {}; AI endpoints will fail",
            provider.provider
        );
    }
    tracing::info!(
        "Using AI provider {} (model {:?})",
        provider.provider,
        provider.model
    );
    let gateway = Arc::new(OpenAiCompatGateway::new(provider)?);

    // --- Initialize services ---
    let storage = StorageService::new(cfg.upload_dir.clone(), cfg.max_file_size);
    let content = ContentService::new(storage.clone(), cfg.unknown_extensions, cfg.read_timeout);
    let conversations = ConversationStore::new(cfg.max_conversations, cfg.conversation_ttl);

    // --- Build router ---
    let app = routes::routes::app(state::AppState {
        storage,
        content,
        conversations,
        gateway,
    });

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Resolve on Ctrl-C.
async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
