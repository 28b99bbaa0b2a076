pub mod ai_handlers;
pub mod chat_handlers;
pub mod content_handlers;
pub mod health_handlers;
