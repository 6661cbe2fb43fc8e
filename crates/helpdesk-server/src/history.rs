//! Chat-history persistence: a TTL'd key-value cache and the session
//! records stored in it.
//!
//! This is deliberately independent of the orchestrator's `SessionStore`;
//! it exists so clients can list, reload, and manage named conversations.
//! Expired entries are dropped lazily on read and swept by a periodic
//! reaper task spawned at startup.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use helpdesk_common::new_id;

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("Chat session not found")]
    SessionNotFound,

    #[error("storage error: {0}")]
    Storage(String),
}

struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

/// In-process key-value cache with a per-entry time-to-live.
#[derive(Clone)]
pub struct TtlCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    ttl: Duration,
}

impl TtlCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        let entries = self.entries.read().await;
        let entry = entries.get(key)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        Some(entry.value.clone())
    }

    pub async fn set(&self, key: &str, value: Value) {
        self.entries.write().await.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    pub async fn delete(&self, key: &str) {
        self.entries.write().await.remove(key);
    }

    /// Sweep expired entries. Returns how many were dropped.
    pub async fn reap_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        let now = Instant::now();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }
}

/// One message inside a stored chat session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub id: String,
    pub content: String,
    pub is_user: bool,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    pub model: String,
    pub mode: String,
}

/// A named chat session as stored in the cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSessionRecord {
    pub id: String,
    pub title: String,
    pub messages: Vec<StoredMessage>,
    pub config: ChatConfig,
    pub created: i64,
    pub updated: i64,
}

/// Per-user chat session management on top of the cache.
///
/// Sessions live under `user:{user}:chat:{session}`, with a per-user
/// index list under `user:{user}:chats`.
#[derive(Clone)]
pub struct HistoryService {
    cache: TtlCache,
}

impl HistoryService {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: TtlCache::new(ttl),
        }
    }

    fn index_key(user_id: &str) -> String {
        format!("user:{user_id}:chats")
    }

    fn session_key(user_id: &str, session_id: &str) -> String {
        format!("user:{user_id}:chat:{session_id}")
    }

    pub async fn create_session(
        &self,
        user_id: &str,
        session_id: &str,
        title: &str,
        config: ChatConfig,
    ) -> Result<ChatSessionRecord, HistoryError> {
        let now = chrono::Utc::now().timestamp_millis();
        let record = ChatSessionRecord {
            id: session_id.to_string(),
            title: title.to_string(),
            messages: Vec::new(),
            config,
            created: now,
            updated: now,
        };

        self.put_session(user_id, &record).await?;

        let mut index = self.session_ids(user_id).await;
        if !index.iter().any(|id| id == session_id) {
            index.push(session_id.to_string());
            self.cache
                .set(
                    &Self::index_key(user_id),
                    serde_json::to_value(&index)
                        .map_err(|e| HistoryError::Storage(e.to_string()))?,
                )
                .await;
        }

        Ok(record)
    }

    pub async fn get_session(&self, user_id: &str, session_id: &str) -> Option<ChatSessionRecord> {
        let value = self.cache.get(&Self::session_key(user_id, session_id)).await?;
        serde_json::from_value(value).ok()
    }

    pub async fn session_ids(&self, user_id: &str) -> Vec<String> {
        match self.cache.get(&Self::index_key(user_id)).await {
            Some(value) => serde_json::from_value(value).unwrap_or_default(),
            None => Vec::new(),
        }
    }

    /// All of a user's sessions, most recently updated first.
    pub async fn sessions_with_details(&self, user_id: &str) -> Vec<ChatSessionRecord> {
        let mut sessions = Vec::new();
        for id in self.session_ids(user_id).await {
            if let Some(record) = self.get_session(user_id, &id).await {
                sessions.push(record);
            }
        }
        sessions.sort_by(|a, b| b.updated.cmp(&a.updated));
        sessions
    }

    pub async fn add_message(
        &self,
        user_id: &str,
        session_id: &str,
        content: &str,
        is_user: bool,
    ) -> Result<ChatSessionRecord, HistoryError> {
        let mut record = self
            .get_session(user_id, session_id)
            .await
            .ok_or(HistoryError::SessionNotFound)?;

        record.messages.push(StoredMessage {
            id: new_id(),
            content: content.to_string(),
            is_user,
            timestamp: chrono::Utc::now().timestamp_millis(),
        });
        record.updated = chrono::Utc::now().timestamp_millis();

        self.put_session(user_id, &record).await?;
        Ok(record)
    }

    pub async fn update_title(
        &self,
        user_id: &str,
        session_id: &str,
        title: &str,
    ) -> Result<ChatSessionRecord, HistoryError> {
        let mut record = self
            .get_session(user_id, session_id)
            .await
            .ok_or(HistoryError::SessionNotFound)?;

        record.title = title.to_string();
        record.updated = chrono::Utc::now().timestamp_millis();

        self.put_session(user_id, &record).await?;
        Ok(record)
    }

    pub async fn delete_session(&self, user_id: &str, session_id: &str) -> Result<(), HistoryError> {
        let index: Vec<String> = self
            .session_ids(user_id)
            .await
            .into_iter()
            .filter(|id| id != session_id)
            .collect();
        self.cache
            .set(
                &Self::index_key(user_id),
                serde_json::to_value(&index).map_err(|e| HistoryError::Storage(e.to_string()))?,
            )
            .await;

        self.cache
            .delete(&Self::session_key(user_id, session_id))
            .await;
        Ok(())
    }

    pub async fn reap_expired(&self) -> usize {
        let reaped = self.cache.reap_expired().await;
        if reaped > 0 {
            debug!(reaped, "Swept expired chat sessions");
        }
        reaped
    }

    async fn put_session(
        &self,
        user_id: &str,
        record: &ChatSessionRecord,
    ) -> Result<(), HistoryError> {
        self.cache
            .set(
                &Self::session_key(user_id, &record.id),
                serde_json::to_value(record).map_err(|e| HistoryError::Storage(e.to_string()))?,
            )
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ChatConfig {
        ChatConfig {
            model: "gemini-2.0-flash".into(),
            mode: "standard".into(),
        }
    }

    fn service() -> HistoryService {
        HistoryService::new(Duration::from_secs(60))
    }

    #[tokio::test]
    async fn create_and_get_session() {
        let history = service();
        history
            .create_session("u1", "s1", "Troubleshooting", config())
            .await
            .unwrap();

        let record = history.get_session("u1", "s1").await.unwrap();
        assert_eq!(record.id, "s1");
        assert_eq!(record.title, "Troubleshooting");
        assert!(record.messages.is_empty());
        assert_eq!(history.session_ids("u1").await, vec!["s1".to_string()]);
    }

    #[tokio::test]
    async fn create_is_idempotent_in_the_index() {
        let history = service();
        history.create_session("u1", "s1", "A", config()).await.unwrap();
        history.create_session("u1", "s1", "B", config()).await.unwrap();
        assert_eq!(history.session_ids("u1").await.len(), 1);
        assert_eq!(history.get_session("u1", "s1").await.unwrap().title, "B");
    }

    #[tokio::test]
    async fn add_message_appends_and_touches_updated() {
        let history = service();
        let created = history
            .create_session("u1", "s1", "T", config())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        let record = history
            .add_message("u1", "s1", "How do I create a test case?", true)
            .await
            .unwrap();

        assert_eq!(record.messages.len(), 1);
        assert_eq!(record.messages[0].content, "How do I create a test case?");
        assert!(record.messages[0].is_user);
        assert!(!record.messages[0].id.is_empty());
        assert!(record.updated > created.updated);
    }

    #[tokio::test]
    async fn add_message_to_missing_session_fails() {
        let history = service();
        let err = history.add_message("u1", "nope", "hi", true).await.unwrap_err();
        assert!(matches!(err, HistoryError::SessionNotFound));
    }

    #[tokio::test]
    async fn listing_sorts_by_most_recently_updated() {
        let history = service();
        history.create_session("u1", "old", "Old", config()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        history.create_session("u1", "new", "New", config()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        history.add_message("u1", "old", "bump", true).await.unwrap();

        let sessions = history.sessions_with_details("u1").await;
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].id, "old");
        assert_eq!(sessions[1].id, "new");
    }

    #[tokio::test]
    async fn delete_removes_record_and_index_entry() {
        let history = service();
        history.create_session("u1", "s1", "A", config()).await.unwrap();
        history.create_session("u1", "s2", "B", config()).await.unwrap();

        history.delete_session("u1", "s1").await.unwrap();

        assert!(history.get_session("u1", "s1").await.is_none());
        assert_eq!(history.session_ids("u1").await, vec!["s2".to_string()]);
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let cache = TtlCache::new(Duration::from_millis(30));
        cache.set("k", serde_json::json!("v")).await;
        assert!(cache.get("k").await.is_some());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(cache.get("k").await.is_none());
        assert_eq!(cache.reap_expired().await, 1);
        assert_eq!(cache.reap_expired().await, 0);
    }

    #[tokio::test]
    async fn users_are_isolated() {
        let history = service();
        history.create_session("u1", "s1", "A", config()).await.unwrap();
        assert!(history.get_session("u2", "s1").await.is_none());
        assert!(history.session_ids("u2").await.is_empty());
    }
}
