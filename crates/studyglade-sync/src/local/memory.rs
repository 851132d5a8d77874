use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{LocalAdapter, LocalError};

/// Process-local adapter with an optional byte quota.
#[derive(Debug, Default)]
pub struct MemoryAdapter {
    entries: RwLock<HashMap<String, String>>,
    quota: Option<usize>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject writes that would push the total stored bytes past `bytes`.
    pub fn with_quota(bytes: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            quota: Some(bytes),
        }
    }

    /// Total bytes held across all keys.
    pub async fn used_bytes(&self) -> usize {
        self.entries
            .read()
            .await
            .iter()
            .map(|(k, v)| k.len() + v.len())
            .sum()
    }
}

#[async_trait]
impl LocalAdapter for MemoryAdapter {
    async fn get(&self, key: &str) -> Result<Option<String>, LocalError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), LocalError> {
        let mut entries = self.entries.write().await;

        if let Some(quota) = self.quota {
            let others: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let needed = others + key.len() + value.len();
            if needed > quota {
                return Err(LocalError::QuotaExceeded { needed, quota });
            }
        }

        entries.insert(key.to_string(), value);
        Ok(())
    }
}
