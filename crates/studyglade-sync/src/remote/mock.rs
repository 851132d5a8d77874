//! In-memory remote API for testing.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use studyglade_client::ListQuery;
use tokio::sync::Mutex;

use super::{RemoteApi, RemoteError};
use crate::record::{Attachment, FileUpload};

/// Mock remote for testing.
///
/// Behaves like a small API server holding collections in memory. It can be
/// switched off (transport failure) or made to answer 401 at any point.
pub struct MockRemote {
    available: AtomicBool,
    auth_required: AtomicBool,
    failing_lists: AtomicBool,
    call_count: AtomicU32,
    next_id: AtomicU32,
    collections: Mutex<HashMap<String, Vec<Value>>>,
}

impl MockRemote {
    /// Create a new, reachable mock remote.
    pub fn new() -> Self {
        Self {
            available: AtomicBool::new(true),
            auth_required: AtomicBool::new(false),
            failing_lists: AtomicBool::new(false),
            call_count: AtomicU32::new(0),
            next_id: AtomicU32::new(1),
            collections: Mutex::new(HashMap::new()),
        }
    }

    /// Set availability.
    pub fn with_available(self, available: bool) -> Self {
        self.set_available(available);
        self
    }

    /// Answer every call with 401.
    pub fn with_auth_required(self) -> Self {
        self.auth_required.store(true, Ordering::SeqCst);
        self
    }

    /// Make `list` fail while every other call keeps working.
    pub fn set_failing_lists(&self, failing: bool) {
        self.failing_lists.store(failing, Ordering::SeqCst);
    }

    /// Flip availability after construction.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of calls received, failed ones included.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Stored bodies of one collection.
    pub async fn records(&self, collection: &str) -> Vec<Value> {
        self.collections
            .lock()
            .await
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Pre-populate a collection.
    pub async fn seed(&self, collection: &str, records: Vec<Value>) {
        self.collections
            .lock()
            .await
            .insert(collection.to_string(), records);
    }

    fn check(&self) -> Result<(), RemoteError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        if !self.available.load(Ordering::SeqCst) {
            return Err(RemoteError::Transport("Mock remote unavailable".to_string()));
        }
        if self.auth_required.load(Ordering::SeqCst) {
            return Err(RemoteError::AuthRequired);
        }
        Ok(())
    }
}

impl Default for MockRemote {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found(id: &str) -> RemoteError {
    RemoteError::Transport(format!("Server error 404: record {} not found", id))
}

#[async_trait]
impl RemoteApi for MockRemote {
    async fn open_session(&self, owner_key: &str) -> Result<String, RemoteError> {
        self.check()?;
        Ok(owner_key.to_string())
    }

    async fn list(&self, collection: &str, query: &ListQuery) -> Result<Vec<Value>, RemoteError> {
        self.check()?;
        if self.failing_lists.load(Ordering::SeqCst) {
            return Err(RemoteError::Transport("Mock remote list failed".to_string()));
        }
        let collections = self.collections.lock().await;
        let records = collections.get(collection).cloned().unwrap_or_default();

        Ok(records
            .into_iter()
            .filter(|r| match query.owner.as_deref() {
                Some(owner) => r["ownerKey"] == owner,
                None => true,
            })
            .filter(|r| match query.status.as_deref() {
                Some(status) => r["status"] == status,
                None => true,
            })
            .filter(|r| {
                query.fields.iter().all(|(key, expected)| match &r[key.as_str()] {
                    Value::String(s) => s == expected,
                    Value::Null => false,
                    other => other.to_string() == *expected,
                })
            })
            .collect())
    }

    async fn create(&self, collection: &str, record: &Value) -> Result<Value, RemoteError> {
        self.check()?;
        let id = format!("srv-{}", self.next_id.fetch_add(1, Ordering::SeqCst));

        let mut stored = record.clone();
        stored["id"] = json!(id);

        self.collections
            .lock()
            .await
            .entry(collection.to_string())
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }

    async fn replace(&self, collection: &str, id: &str, record: &Value) -> Result<Value, RemoteError> {
        self.check()?;
        let mut collections = self.collections.lock().await;
        let entry = collections
            .get_mut(collection)
            .and_then(|records| records.iter_mut().find(|r| r["id"] == id))
            .ok_or_else(|| not_found(id))?;

        let mut stored = record.clone();
        stored["id"] = json!(id);
        *entry = stored.clone();
        Ok(stored)
    }

    async fn upload(&self, _collection: &str, _id: &str, file: &FileUpload) -> Result<Attachment, RemoteError> {
        self.check()?;
        Ok(Attachment {
            name: file.name.clone(),
            url: format!("/uploads/{}", file.name),
            mime_type: file.mime_type.clone(),
        })
    }

    async fn increment(&self, collection: &str, id: &str, field: &str) -> Result<Value, RemoteError> {
        self.check()?;
        let mut collections = self.collections.lock().await;
        let entry = collections
            .get_mut(collection)
            .and_then(|records| records.iter_mut().find(|r| r["id"] == id))
            .ok_or_else(|| not_found(id))?;

        let next = entry[field].as_u64().unwrap_or(0) + 1;
        entry[field] = json!(next);
        Ok(entry.clone())
    }
}
