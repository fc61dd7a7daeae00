use crate::core::models::FeedState;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone, Default)]
pub struct FeedStore {
    inner: Arc<RwLock<HashMap<String, FeedState>>>,
}

impl FeedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Option<FeedState> {
        self.inner.read().await.get(key).cloned()
    }

    pub async fn all(&self) -> HashMap<String, FeedState> {
        self.inner.read().await.clone()
    }

    /// Marks a fetch as started: `loading` before the first success,
    /// `is_refreshing` afterwards.
    pub async fn begin_fetch(&self, key: &str) {
        let mut inner = self.inner.write().await;
        let state = inner.entry(key.to_string()).or_default();
        if state.has_data() {
            state.is_refreshing = true;
        } else {
            state.loading = true;
        }
    }

    pub async fn complete_fetch(&self, key: &str, data: serde_json::Value) {
        let mut inner = self.inner.write().await;
        let state = inner.entry(key.to_string()).or_default();
        state.data = Some(data);
        state.error = None;
        state.loading = false;
        state.is_refreshing = false;
        state.updated_at = Some(Utc::now());
    }

    /// Records a failure but keeps the last good data on screen.
    pub async fn fail_fetch(&self, key: &str, error: String) {
        let mut inner = self.inner.write().await;
        let state = inner.entry(key.to_string()).or_default();
        state.error = Some(error);
        state.loading = false;
        state.is_refreshing = false;
    }

    pub async fn remove(&self, key: &str) {
        self.inner.write().await.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_first_fetch_is_loading() {
        let store = FeedStore::new();
        store.begin_fetch("disruptions").await;

        let state = store.get("disruptions").await.unwrap();
        assert!(state.loading);
        assert!(!state.is_refreshing);
    }

    #[tokio::test]
    async fn test_later_fetch_is_refreshing() {
        let store = FeedStore::new();
        store.complete_fetch("disruptions", json!([{"line": "A"}])).await;
        store.begin_fetch("disruptions").await;

        let state = store.get("disruptions").await.unwrap();
        assert!(!state.loading);
        assert!(state.is_refreshing);
        assert!(state.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_failure_keeps_stale_data() {
        let store = FeedStore::new();
        store.complete_fetch("routes", json!({"count": 3})).await;
        store.begin_fetch("routes").await;
        store.fail_fetch("routes", "502 Bad Gateway".to_string()).await;

        let state = store.get("routes").await.unwrap();
        assert_eq!(state.data, Some(json!({"count": 3})));
        assert_eq!(state.error.as_deref(), Some("502 Bad Gateway"));
        assert!(!state.is_busy());
    }

    #[tokio::test]
    async fn test_success_clears_error() {
        let store = FeedStore::new();
        store.fail_fetch("routes", "timeout".to_string()).await;
        store.complete_fetch("routes", json!([])).await;

        let state = store.get("routes").await.unwrap();
        assert!(state.error.is_none());

        store.remove("routes").await;
        assert!(store.get("routes").await.is_none());
        assert!(store.all().await.is_empty());
    }
}
