use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{Result, StoreError};
use crate::local::{LocalAdapter, CURRENT_OWNER_KEY};
use crate::normalize::{normalize_record, raw_id};
use crate::record::Record;

/// One collection's blob inside a local adapter.
///
/// The blob is a JSON array of records. Entries are kept as raw values so
/// that anything the normalizer cannot read survives a rewrite untouched.
/// An empty collection with seeds gets the seeds written on first read.
pub(crate) struct LocalSource {
    adapter: Arc<dyn LocalAdapter>,
    key: String,
    seeds: Vec<Value>,
}

impl LocalSource {
    pub(crate) fn new(adapter: Arc<dyn LocalAdapter>, key: impl Into<String>, seeds: &[Record]) -> Self {
        Self {
            adapter,
            key: key.into(),
            seeds: seeds.iter().map(Record::to_value).collect(),
        }
    }

    pub(crate) async fn read_raw(&self) -> Result<Vec<Value>> {
        let entries = self.read_stored().await?;
        if !entries.is_empty() || self.seeds.is_empty() {
            return Ok(entries);
        }

        self.write_raw(self.seeds.clone()).await?;
        info!(key = %self.key, count = self.seeds.len(), "Seeded local collection");
        Ok(self.seeds.clone())
    }

    async fn read_stored(&self) -> Result<Vec<Value>> {
        let blob = self
            .adapter
            .get(&self.key)
            .await
            .map_err(|e| StoreError::persistence(e, None))?;

        let Some(blob) = blob else {
            return Ok(Vec::new());
        };
        if blob.trim().is_empty() {
            return Ok(Vec::new());
        }

        match serde_json::from_str::<Value>(&blob) {
            Ok(Value::Array(entries)) => Ok(entries),
            Ok(_) => Err(StoreError::persistence(
                format!("stored '{}' is not a list", self.key),
                None,
            )),
            Err(e) => Err(StoreError::persistence(
                format!("stored '{}' is corrupt: {}", self.key, e),
                None,
            )),
        }
    }

    pub(crate) async fn write_raw(&self, entries: Vec<Value>) -> Result<()> {
        let blob = serde_json::to_string(&Value::Array(entries))
            .map_err(|e| StoreError::persistence(e, None))?;
        self.adapter
            .set(&self.key, blob)
            .await
            .map_err(|e| StoreError::persistence(e, None))
    }

    /// Every readable record. Unreadable entries are skipped.
    pub(crate) async fn read_all(&self, now: DateTime<Utc>) -> Result<Vec<Record>> {
        let entries = self.read_raw().await?;
        Ok(normalize_entries(&self.key, entries, now))
    }

    /// Stored record with `id`, if there is a readable one.
    pub(crate) async fn find(&self, id: &str, now: DateTime<Utc>) -> Result<Option<Record>> {
        let entries = self.read_raw().await?;
        let found = entries
            .into_iter()
            .find(|e| raw_id(e).as_deref() == Some(id))
            .and_then(|e| normalize_record(e, now).ok());
        Ok(found)
    }

    /// Replace the entry with the record's id, or append it.
    pub(crate) async fn upsert(&self, record: &Record) -> Result<()> {
        let mut entries = self.read_raw().await?;
        let value = record.to_value();

        let position = record
            .id()
            .and_then(|id| entries.iter().position(|e| raw_id(e).as_deref() == Some(id)));
        match position {
            Some(i) => entries[i] = value,
            None => entries.push(value),
        }

        debug!(key = %self.key, record_id = ?record.id(), "Writing local collection");
        self.write_raw(entries).await
    }

    /// Read-increment-write of a numeric field. Not atomic across handles.
    pub(crate) async fn increment(&self, id: &str, field: &str, now: DateTime<Utc>) -> Result<Record> {
        let mut entries = self.read_raw().await?;
        let position = entries
            .iter()
            .position(|e| raw_id(e).as_deref() == Some(id))
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let mut record = normalize_record(entries[position].clone(), now)?;
        let current = match record.get(field) {
            None | Some(Value::Null) => 0,
            Some(value) => value.as_u64().ok_or_else(|| {
                StoreError::Validation(format!("'{}' is not a counter: {}", field, value))
            })?,
        };
        let next = current
            .checked_add(1)
            .ok_or_else(|| StoreError::Validation(format!("'{}' cannot grow past {}", field, u64::MAX)))?;
        record.set(field, next);
        record.updated_at = Some(now);

        entries[position] = record.to_value();
        self.write_raw(entries).await?;
        Ok(record)
    }

    pub(crate) async fn current_owner(&self) -> Option<String> {
        match self.adapter.get(CURRENT_OWNER_KEY).await {
            Ok(owner) => owner.map(|o| o.trim().to_string()).filter(|o| !o.is_empty()),
            Err(e) => {
                warn!(error = %e, "Could not read current owner");
                None
            }
        }
    }

    pub(crate) async fn set_current_owner(&self, owner: &str) {
        if let Err(e) = self.adapter.set(CURRENT_OWNER_KEY, owner.to_string()).await {
            warn!(owner = %owner, error = %e, "Could not persist current owner");
        }
    }
}

pub(crate) fn normalize_entries(key: &str, entries: Vec<Value>, now: DateTime<Utc>) -> Vec<Record> {
    entries
        .into_iter()
        .filter_map(|entry| match normalize_record(entry, now) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(key = %key, error = %e, "Skipping unreadable stored record");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::MemoryAdapter;
    use serde_json::json;

    fn source() -> (Arc<MemoryAdapter>, LocalSource) {
        let adapter = Arc::new(MemoryAdapter::new());
        let source = LocalSource::new(adapter.clone(), "questions", &[]);
        (adapter, source)
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_legacy_id() {
        let (adapter, source) = source();
        adapter
            .set(
                "questions",
                json!([{"_id": "a", "student": "alice", "title": "Old"}, {"junk": true, "status": "??"}])
                    .to_string(),
            )
            .await
            .unwrap();

        let record = Record::new("alice").with_id("a").with_field("title", "New");
        source.upsert(&record).await.unwrap();

        let raw = source.read_raw().await.unwrap();
        assert_eq!(raw.len(), 2);
        assert_eq!(raw[0]["title"], "New");
        // Unreadable entry kept on disk, skipped on read
        assert_eq!(raw[1]["junk"], true);
        assert_eq!(source.read_all(Utc::now()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_blob_is_persistence_error() {
        let (adapter, source) = source();
        adapter.set("questions", "{not json".into()).await.unwrap();
        assert!(matches!(
            source.read_raw().await,
            Err(StoreError::Persistence { .. })
        ));
    }

    #[tokio::test]
    async fn test_seeds_on_first_read_only() {
        let adapter = Arc::new(MemoryAdapter::new());
        let seeds = vec![Record::new("Admin").with_id("1").with_field("title", "Calculus Notes")];
        let source = LocalSource::new(adapter.clone(), "documents", &seeds);

        assert_eq!(source.read_raw().await.unwrap().len(), 1);
        assert!(adapter.get("documents").await.unwrap().is_some());

        source
            .upsert(&Record::new("Admin").with_id("2").with_field("title", "Notes"))
            .await
            .unwrap();
        assert_eq!(source.read_raw().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_find_by_legacy_id() {
        let (adapter, source) = source();
        adapter
            .set("questions", json!([{"_id": "a", "student": "bob", "title": "Thesis"}]).to_string())
            .await
            .unwrap();

        let found = source.find("a", Utc::now()).await.unwrap().unwrap();
        assert_eq!(found.owner_key, "bob");
        assert!(source.find("b", Utc::now()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_increment_rejects_non_counters() {
        let (adapter, source) = source();
        adapter
            .set(
                "questions",
                json!([
                    {"id": "s", "ownerKey": "a", "downloads": "5"},
                    {"id": "f", "ownerKey": "a", "downloads": 5.5},
                    {"id": "max", "ownerKey": "a", "downloads": u64::MAX}
                ])
                .to_string(),
            )
            .await
            .unwrap();

        for id in ["s", "f", "max"] {
            assert!(matches!(
                source.increment(id, "downloads", Utc::now()).await,
                Err(StoreError::Validation(_))
            ));
        }
        // Nothing was rewritten
        let raw = source.read_raw().await.unwrap();
        assert_eq!(raw[0]["downloads"], "5");
        assert_eq!(raw[2]["downloads"], u64::MAX);
    }

    #[tokio::test]
    async fn test_increment() {
        let (_, source) = source();
        source
            .upsert(&Record::new("Admin").with_id("1").with_field("downloads", 2))
            .await
            .unwrap();

        let updated = source.increment("1", "downloads", Utc::now()).await.unwrap();
        assert_eq!(updated.get_u64("downloads"), Some(3));
        assert!(matches!(
            source.increment("missing", "downloads", Utc::now()).await,
            Err(StoreError::NotFound(_))
        ));
    }
}
