//! src/services/conversation_store.rs
//!
//! In-memory chat history keyed by conversation id, shared through the
//! application state. Bounded in three ways: idle conversations expire after
//! `ttl`, the least recently active one is evicted past `capacity`, and each
//! log keeps at most `MAX_MESSAGES_PER_CONVERSATION` messages.

use crate::models::conversation::ChatMessage;
use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;
use tracing::debug;

pub const MAX_MESSAGES_PER_CONVERSATION: usize = 200;

#[derive(Debug)]
struct Conversation {
    messages: VecDeque<ChatMessage>,
    last_active: Instant,
}

#[derive(Clone, Debug)]
pub struct ConversationStore {
    inner: Arc<Mutex<HashMap<String, Conversation>>>,
    capacity: usize,
    ttl: Duration,
}

impl ConversationStore {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
            ttl,
        }
    }

    /// Append a message, creating the conversation if needed.
    pub async fn append(&self, id: &str, message: ChatMessage) {
        let mut map = self.inner.lock().await;
        let now = Instant::now();
        self.expire(&mut map, now);

        if !map.contains_key(id) && map.len() >= self.capacity {
            evict_least_recent(&mut map);
        }

        let conversation = map.entry(id.to_string()).or_insert_with(|| Conversation {
            messages: VecDeque::new(),
            last_active: now,
        });
        conversation.messages.push_back(message);
        while conversation.messages.len() > MAX_MESSAGES_PER_CONVERSATION {
            conversation.messages.pop_front();
        }
        conversation.last_active = now;
    }

    /// Full stored history, oldest first. Unknown ids yield an empty list.
    pub async fn history(&self, id: &str) -> Vec<ChatMessage> {
        self.recent(id, usize::MAX).await
    }

    /// The last `n` messages, oldest first.
    pub async fn recent(&self, id: &str, n: usize) -> Vec<ChatMessage> {
        let mut map = self.inner.lock().await;
        self.expire(&mut map, Instant::now());

        map.get(id)
            .map(|c| {
                let skip = c.messages.len().saturating_sub(n);
                c.messages.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default()
    }

    /// Drop a conversation. Returns whether it existed.
    pub async fn remove(&self, id: &str) -> bool {
        self.inner.lock().await.remove(id).is_some()
    }

    fn expire(&self, map: &mut HashMap<String, Conversation>, now: Instant) {
        let before = map.len();
        map.retain(|_, c| now.duration_since(c.last_active) <= self.ttl);
        let expired = before - map.len();
        if expired > 0 {
            debug!("expired {} idle conversations", expired);
        }
    }
}

fn evict_least_recent(map: &mut HashMap<String, Conversation>) {
    let oldest = map
        .iter()
        .min_by_key(|(_, c)| c.last_active)
        .map(|(id, _)| id.clone());
    if let Some(id) = oldest {
        debug!("evicting conversation {}", id);
        map.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::conversation::Role;

    #[tokio::test]
    async fn appends_and_reads_back_in_order() {
        let store = ConversationStore::new(10, Duration::from_secs(60));
        store.append("c1", ChatMessage::user("hello")).await;
        store.append("c1", ChatMessage::assistant("hi")).await;

        let history = store.history("c1").await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].content, "hi");
        assert!(store.history("other").await.is_empty());
    }

    #[tokio::test]
    async fn recent_returns_tail() {
        let store = ConversationStore::new(10, Duration::from_secs(60));
        for i in 0..15 {
            store.append("c", ChatMessage::user(i.to_string())).await;
        }
        let tail = store.recent("c", 10).await;
        assert_eq!(tail.len(), 10);
        assert_eq!(tail[0].content, "5");
        assert_eq!(tail[9].content, "14");
    }

    #[tokio::test]
    async fn per_conversation_log_is_capped() {
        let store = ConversationStore::new(10, Duration::from_secs(60));
        for i in 0..MAX_MESSAGES_PER_CONVERSATION + 5 {
            store.append("c", ChatMessage::user(i.to_string())).await;
        }
        let history = store.history("c").await;
        assert_eq!(history.len(), MAX_MESSAGES_PER_CONVERSATION);
        assert_eq!(history[0].content, "5");
    }

    #[tokio::test]
    async fn least_recent_conversation_is_evicted_at_capacity() {
        let store = ConversationStore::new(2, Duration::from_secs(60));
        store.append("a", ChatMessage::user("1")).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        store.append("b", ChatMessage::user("2")).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        store.append("c", ChatMessage::user("3")).await;

        assert!(store.history("a").await.is_empty());
        assert_eq!(store.history("b").await.len(), 1);
        assert_eq!(store.history("c").await.len(), 1);
    }

    #[tokio::test]
    async fn idle_conversations_expire() {
        let store = ConversationStore::new(10, Duration::from_millis(10));
        store.append("a", ChatMessage::user("1")).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(store.history("a").await.is_empty());
    }

    #[tokio::test]
    async fn remove_reports_existence() {
        let store = ConversationStore::new(10, Duration::from_secs(60));
        store.append("a", ChatMessage::user("1")).await;
        assert!(store.remove("a").await);
        assert!(!store.remove("a").await);
    }
}
