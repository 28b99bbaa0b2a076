//! Summaries and provider introspection backed by the configured `ChatGateway`.

use crate::{
    errors::AppError,
    services::{
        ai_gateway::CompletionOptions,
        prompts::{SummaryKind, summary_messages},
    },
    state::AppState,
};
use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Debug, Deserialize)]
pub struct SummaryRequest {
    #[serde(default)]
    pub content: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderInfo {
    pub provider: String,
    pub model: Option<String>,
    #[serde(rename = "baseURL")]
    pub base_url: Option<String>,
    pub has_api_key: bool,
    pub api_key_prefix: String,
}

/// `POST /api/ai/summary`
pub async fn summary(
    State(state): State<AppState>,
    Json(req): Json<SummaryRequest>,
) -> Result<Json<Value>, AppError> {
    if req.content.trim().is_empty() {
        return Err(AppError::bad_request("content must not be empty"));
    }

    let kind = SummaryKind::parse(req.kind.as_deref().unwrap_or("text"));
    let messages = summary_messages(&req.content, kind);
    let summary = state
        .gateway
        .complete(&messages, CompletionOptions::default())
        .await?;

    Ok(Json(json!({ "success": true, "summary": summary })))
}

/// `GET /api/ai/config` — which provider is active, without leaking the key.
pub async fn provider_config(State(state): State<AppState>) -> Json<ProviderInfo> {
    let cfg = state.gateway.config();
    Json(ProviderInfo {
        provider: cfg.provider.clone(),
        model: cfg.model.clone(),
        base_url: cfg.base_url.clone(),
        has_api_key: cfg.api_key.is_some(),
        api_key_prefix: cfg
            .api_key_prefix()
            .unwrap_or_else(|| "not configured".into()),
    })
}
