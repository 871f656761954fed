use log::debug;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Values this node hosts, keyed by content key. Entries never expire.
#[derive(Debug, Clone, Default)]
pub struct LocalStore {
    values: Arc<RwLock<HashMap<String, String>>>,
}

impl LocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a value. Returns the previous value, if any.
    pub async fn insert(&self, key: String, value: String) -> Option<String> {
        debug!("Storing value under {}", key);
        self.values.write().await.insert(key, value)
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.values.read().await.get(key).cloned()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.values.read().await.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.values.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.values.read().await.is_empty()
    }

    /// All keys, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.values.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}
