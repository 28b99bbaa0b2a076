//! Shared state handed to every handler.

use crate::services::{
    ai_gateway::ChatGateway, content_service::ContentService,
    conversation_store::ConversationStore, storage_service::StorageService,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub storage: StorageService,
    pub content: ContentService,
    pub conversations: ConversationStore,
    pub gateway: Arc<dyn ChatGateway>,
}
