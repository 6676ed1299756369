use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;

use crate::error::Result;

/// Place where the signed-in principal lives for the duration of one browsing session.
///
/// Values are stored as raw JSON so that a corrupt entry can be detected and dropped
/// by the reader instead of failing the store.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn save(&self, key: &str, value: Value) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn delete(&self, key: &str) -> Result<()>;
}

/// In-memory implementation of SessionStore
#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    entries: Arc<DashMap<String, Value>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn save(&self, key: &str, value: Value) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.get(key).map(|entry| entry.clone()))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn save_get_delete() {
        let store = InMemorySessionStore::new();
        store.save("user", json!({"id": 1})).await.unwrap();
        assert_eq!(store.get("user").await.unwrap(), Some(json!({"id": 1})));

        store.delete("user").await.unwrap();
        store.delete("user").await.unwrap();
        assert!(store.get("user").await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn clones_share_entries() {
        let store = InMemorySessionStore::new();
        let other = store.clone();
        store.save("user", json!("x")).await.unwrap();
        assert_eq!(other.len(), 1);
    }
}
