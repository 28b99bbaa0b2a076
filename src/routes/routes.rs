//! Defines routes for material delivery, uploads and the AI endpoints.
//!
//! ## Structure
//! - **Materials**
//!   - `POST   /api/upload` — upload a file (multipart field `file`)
//!   - `GET    /api/upload/{file_id}/content` — stream media or return text
//!
//! - **AI**
//!   - `POST   /api/ai/summary` — summarise a piece of material
//!   - `GET    /api/ai/config` — active provider, model and key status
//!   - `POST   /api/chat` — one tutoring chat turn
//!   - `GET    /api/chat/{conversation_id}` — conversation history
//!   - `DELETE /api/chat/{conversation_id}` — forget a conversation
//!
//! - **Probes**: `GET /health`, `GET /readyz`

use crate::{
    handlers::{
        ai_handlers::{provider_config, summary},
        chat_handlers::{chat, delete_history, get_history},
        content_handlers::{get_content, upload_file},
        health_handlers::{health, readyz},
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{Method, header},
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Build and return the router for all API routes.
///
/// The router carries shared state (`AppState`) to all handlers.
pub fn routes() -> Router<AppState> {
    Router::new()
        // probes (mounted at root)
        .route("/health", get(health))
        .route("/readyz", get(readyz))
        // Materials; the upload size limit is enforced while streaming to disk
        .route(
            "/api/upload",
            post(upload_file).layer(DefaultBodyLimit::disable()),
        )
        .route("/api/upload/{file_id}/content", get(get_content))
        // AI
        .route("/api/ai/summary", post(summary))
        .route("/api/ai/config", get(provider_config))
        .route("/api/chat", post(chat))
        .route(
            "/api/chat/{conversation_id}",
            get(get_history).delete(delete_history),
        )
}

/// The full application: routes, state, CORS and request tracing.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::OPTIONS,
            Method::PUT,
            Method::DELETE,
        ])
        .allow_headers(Any)
        .expose_headers([
            header::CONTENT_RANGE,
            header::ACCEPT_RANGES,
            header::CONTENT_LENGTH,
        ]);

    routes()
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
