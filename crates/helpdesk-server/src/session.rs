//! Session store: maps session ids to conversation transcripts.
//!
//! Shared by concurrent requests; all access goes through one lock so
//! appends for the same session cannot lose updates.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use helpdesk_ai::Turn;

/// Thread-safe transcript store. Entries live for the process lifetime;
/// durable persistence is the history cache's job, not this store's.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, Vec<Turn>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the transcript; empty for an unseen session.
    pub async fn get(&self, session_id: &str) -> Vec<Turn> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Overwrite the transcript wholesale (caller supplied an explicit history).
    pub async fn replace(&self, session_id: &str, transcript: Vec<Turn>) {
        self.sessions
            .write()
            .await
            .insert(session_id.to_string(), transcript);
    }

    /// Append one turn, creating the session if absent.
    pub async fn append(&self, session_id: &str, turn: Turn) {
        self.sessions
            .write()
            .await
            .entry(session_id.to_string())
            .or_default()
            .push(turn);
    }

    /// Drop turns past `len`. Used to roll back a request that appended a
    /// user turn but could not produce an answer.
    pub async fn truncate(&self, session_id: &str, len: usize) {
        if let Some(transcript) = self.sessions.write().await.get_mut(session_id) {
            transcript.truncate(len);
        }
    }

    pub async fn len(&self, session_id: &str) -> usize {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unseen_session_is_empty() {
        let store = SessionStore::new();
        assert!(store.get("nobody").await.is_empty());
        assert_eq!(store.len("nobody").await, 0);
    }

    #[tokio::test]
    async fn append_creates_and_preserves_order() {
        let store = SessionStore::new();
        store.append("s1", Turn::user("first")).await;
        store.append("s1", Turn::model("second")).await;
        store.append("s1", Turn::user("third")).await;

        let transcript = store.get("s1").await;
        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript[0].text, "first");
        assert_eq!(transcript[1].text, "second");
        assert_eq!(transcript[2].text, "third");
    }

    #[tokio::test]
    async fn replace_overwrites_prior_state() {
        let store = SessionStore::new();
        store.append("s1", Turn::user("old")).await;

        store
            .replace("s1", vec![Turn::user("a"), Turn::model("b")])
            .await;

        let transcript = store.get("s1").await;
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].text, "a");
    }

    #[tokio::test]
    async fn truncate_rolls_back_to_prior_length() {
        let store = SessionStore::new();
        store.append("s1", Turn::user("a")).await;
        store.append("s1", Turn::model("b")).await;
        store.append("s1", Turn::user("dangling")).await;

        store.truncate("s1", 2).await;
        let transcript = store.get("s1").await;
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[1].text, "b");
    }

    #[tokio::test]
    async fn sessions_are_independent() {
        let store = SessionStore::new();
        store.append("a", Turn::user("for a")).await;
        store.append("b", Turn::user("for b")).await;
        assert_eq!(store.len("a").await, 1);
        assert_eq!(store.get("b").await[0].text, "for b");
    }

    #[tokio::test]
    async fn concurrent_appends_do_not_lose_updates() {
        let store = SessionStore::new();
        let mut handles = Vec::new();
        for _ in 0..4 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..25 {
                    store.append("shared", Turn::user(format!("m{i}"))).await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.len("shared").await, 100);
    }
}
