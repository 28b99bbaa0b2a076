pub mod ai_gateway;
pub mod content_service;
pub mod conversation_store;
pub mod prompts;
pub mod storage_service;
