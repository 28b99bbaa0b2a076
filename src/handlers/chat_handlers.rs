//! Tutoring chat with per-conversation history.

use crate::{
    errors::AppError,
    models::conversation::ChatMessage,
    services::{
        ai_gateway::CompletionOptions,
        prompts::{CHAT_CONTEXT_MESSAGES, chat_system_prompt},
    },
    state::AppState,
};
use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    pub conversation_id: Option<String>,
    pub context: Option<String>,
}

/// `POST /api/chat`
pub async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<Value>, AppError> {
    if req.message.trim().is_empty() {
        return Err(AppError::bad_request("message must not be empty"));
    }

    let conversation_id = req
        .conversation_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    state
        .conversations
        .append(&conversation_id, ChatMessage::user(req.message))
        .await;

    let mut messages = vec![ChatMessage::system(chat_system_prompt(
        req.context.as_deref(),
    ))];
    messages.extend(
        state
            .conversations
            .recent(&conversation_id, CHAT_CONTEXT_MESSAGES)
            .await,
    );
    debug!(
        "chat turn for {} with {} messages",
        conversation_id,
        messages.len()
    );

    let reply = state
        .gateway
        .complete(&messages, CompletionOptions::default())
        .await?;
    state
        .conversations
        .append(&conversation_id, ChatMessage::assistant(reply.clone()))
        .await;

    Ok(Json(json!({
        "success": true,
        "conversationId": conversation_id,
        "response": reply,
    })))
}

/// `GET /api/chat/{conversation_id}`
pub async fn get_history(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Json<Value> {
    let history = state.conversations.history(&conversation_id).await;
    Json(json!({ "history": history }))
}

/// `DELETE /api/chat/{conversation_id}`
pub async fn delete_history(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Json<Value> {
    state.conversations.remove(&conversation_id).await;
    Json(json!({ "success": true }))
}
