use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use super::fallback::{FallbackNotice, FallbackPolicy, StoreMode};
use super::local_source::LocalSource;
use crate::collection::CollectionSpec;
use crate::error::{Result, StoreError};
use crate::local::LocalAdapter;
use crate::normalize::normalize_record;
use crate::record::{local_id, Attachment, FileUpload, Record, RecordFilter, RecordPatch, RecordStatus};
use crate::remote::{RemoteApi, RemoteError};

/// Prefix of attachment URLs served from the in-memory blob table.
pub const LOCAL_BLOB_SCHEME: &str = "local-blob://";

/// A collection of records backed by the remote API, or by the local
/// adapter once the API has failed.
///
/// The switch to local is one-way: after the first remote failure every
/// later call stays local for the lifetime of the store, and subscribers
/// get a single [`FallbackNotice`].
pub struct SyncedCollectionStore {
    spec: CollectionSpec,
    local: LocalSource,
    remote: Option<Arc<dyn RemoteApi>>,
    fallback: FallbackPolicy,
    owner: Option<String>,
    filter: RecordFilter,
    records: Vec<Record>,
    blobs: HashMap<String, Vec<u8>>,
}

impl SyncedCollectionStore {
    /// Local-only store over `adapter`.
    pub fn new(spec: CollectionSpec, adapter: Arc<dyn LocalAdapter>) -> Self {
        let local = LocalSource::new(adapter, spec.storage_key.clone(), &spec.seeds);
        Self {
            spec,
            local,
            remote: None,
            fallback: FallbackPolicy::new(StoreMode::Local),
            owner: None,
            filter: RecordFilter::default(),
            records: Vec::new(),
            blobs: HashMap::new(),
        }
    }

    /// Start in remote mode against `remote`.
    pub fn with_remote(mut self, remote: Arc<dyn RemoteApi>) -> Self {
        self.remote = Some(remote);
        self.fallback.set_remote();
        self
    }

    pub fn spec(&self) -> &CollectionSpec {
        &self.spec
    }

    pub fn mode(&self) -> StoreMode {
        self.fallback.mode()
    }

    /// Acting identity, once `initialize` has run.
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    /// Current in-memory view.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn get(&self, id: &str) -> Option<&Record> {
        self.records.iter().find(|r| r.id() == Some(id))
    }

    /// Receive the one-time fallback notice.
    pub fn subscribe(&self) -> broadcast::Receiver<FallbackNotice> {
        self.fallback.subscribe()
    }

    /// Bytes behind a `local-blob://` attachment URL.
    pub fn resolve_local_blob(&self, url: &str) -> Option<&[u8]> {
        self.blobs.get(url).map(Vec::as_slice)
    }

    fn active_remote(&self) -> Option<Arc<dyn RemoteApi>> {
        match self.fallback.mode() {
            StoreMode::Remote => self.remote.clone(),
            StoreMode::Local => None,
        }
    }

    fn fall_back(&mut self, operation: &str, error: &RemoteError) -> Option<String> {
        self.fallback.trip(&self.spec.name, operation, error);
        Some(error.to_string())
    }

    /// Owner reads are restricted to, if this collection is scoped.
    fn scope(&self) -> Option<&str> {
        if self.spec.owner_scoped {
            self.owner.as_deref()
        } else {
            None
        }
    }

    fn in_scope(&self, record: &Record) -> bool {
        match self.scope() {
            Some(owner) => record.owner_key == owner,
            None => true,
        }
    }

    /// Resolve the acting identity and load the collection.
    ///
    /// The identity comes from `owner_key`, else the one persisted by an
    /// earlier session, else a fresh guest name. In remote mode the API
    /// session decides the final identity.
    pub async fn initialize(&mut self, owner_key: Option<&str>) -> Result<&[Record]> {
        let requested = owner_key
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_string);

        let mut owner = match requested {
            Some(owner) => owner,
            None => match self.local.current_owner().await {
                Some(owner) => owner,
                None => guest_owner(),
            },
        };

        if let Some(remote) = self.active_remote() {
            let session = remote.open_session(&owner).await;
            match session {
                Ok(resolved) if !resolved.trim().is_empty() => owner = resolved,
                Ok(_) => {}
                Err(e) => {
                    self.fall_back("initialize", &e);
                }
            }
        }

        self.local.set_current_owner(&owner).await;
        info!(
            collection = %self.spec.name,
            owner = %owner,
            mode = %self.mode(),
            "Store initialized"
        );
        self.owner = Some(owner);

        let filter = self.filter.clone();
        self.load(filter).await
    }

    /// Replace the in-memory view with the records matching `filter`.
    pub async fn load(&mut self, filter: RecordFilter) -> Result<&[Record]> {
        self.filter = filter;
        self.refresh().await?;
        Ok(&self.records)
    }

    /// Re-run the last `load`.
    pub async fn refresh(&mut self) -> Result<()> {
        if self.spec.owner_scoped && self.owner.is_none() {
            self.records.clear();
            return Ok(());
        }

        let now = Utc::now();
        let mut remote_failure = None;

        if let Some(remote) = self.active_remote() {
            let query = self.filter.to_list_query(self.scope());
            let result = match remote.list(&self.spec.name, &query).await {
                Ok(raw) => normalize_response(raw, now),
                Err(e) => Err(e),
            };
            match result {
                Ok(records) => {
                    self.records = records.into_iter().filter(|r| self.in_scope(r)).collect();
                    debug!(
                        collection = %self.spec.name,
                        count = self.records.len(),
                        mode = %StoreMode::Remote,
                        "Loaded records"
                    );
                    return Ok(());
                }
                Err(e) => remote_failure = self.fall_back("load", &e),
            }
        }

        let records = self
            .local
            .read_all(now)
            .await
            .map_err(|e| e.with_remote(remote_failure))?;

        self.records = records
            .into_iter()
            .filter(|r| self.in_scope(r) && self.filter.matches(r))
            .collect();
        debug!(
            collection = %self.spec.name,
            count = self.records.len(),
            mode = %StoreMode::Local,
            "Loaded records"
        );
        Ok(())
    }

    /// Create (no id) or update (with id) a record and reload the view.
    ///
    /// A record with an id is laid over the current copy: whatever it
    /// leaves out (status, payload fields, attachments, owner, creation
    /// time) is kept. The current copy is the one in view or, in local
    /// mode, the stored one.
    ///
    /// An owner-scoped store only writes records of its own owner. Another
    /// owner's record is reported as `NotFound`.
    pub async fn save(&mut self, mut record: Record) -> Result<Record> {
        if let Some(id) = record.id().map(str::to_string) {
            match self.current_copy(&id).await? {
                Some(existing) if !self.in_scope(&existing) => {
                    debug!(collection = %self.spec.name, record_id = %id, "Refusing write to another owner's record");
                    return Err(StoreError::NotFound(id));
                }
                Some(existing) => fill_from(&mut record, existing),
                None if self.spec.owner_scoped && self.mode() == StoreMode::Remote => {
                    return Err(StoreError::NotFound(id));
                }
                None => {}
            }
        }

        if let Some(owner) = self.scope() {
            let claimed = record.owner_key.trim();
            if !claimed.is_empty() && claimed != owner {
                return Err(StoreError::Validation(format!(
                    "cannot save a record owned by '{}' as '{}'",
                    claimed, owner
                )));
            }
        }

        self.persist(record).await
    }

    /// Copy of `id` that an id-bearing save is merged over.
    async fn current_copy(&self, id: &str) -> Result<Option<Record>> {
        if let Some(record) = self.get(id) {
            return Ok(Some(record.clone()));
        }
        match self.mode() {
            StoreMode::Remote => Ok(None),
            StoreMode::Local => self.local.find(id, Utc::now()).await,
        }
    }

    async fn persist(&mut self, mut record: Record) -> Result<Record> {
        if record.owner_key.trim().is_empty() {
            if let Some(owner) = &self.owner {
                record.owner_key = owner.clone();
            }
        }
        if record.status.is_none() {
            record.status = Some(RecordStatus::Pending);
        }
        self.spec.validate(&record)?;

        let now = Utc::now();
        if record.created_at.is_none() {
            record.created_at = Some(now);
        }
        record.updated_at = Some(now);

        let mut remote_failure = None;

        if let Some(remote) = self.active_remote() {
            let body = record.to_value();
            let result = match record.id() {
                None => remote.create(&self.spec.name, &body).await,
                Some(id) => remote.replace(&self.spec.name, id, &body).await,
            };
            match result.and_then(|v| normalize_saved(v, &record, now)) {
                Ok(saved) => {
                    debug!(
                        collection = %self.spec.name,
                        record_id = ?saved.id(),
                        mode = %StoreMode::Remote,
                        "Saved record"
                    );
                    self.refresh_after_remote_write(&saved).await?;
                    return Ok(saved);
                }
                Err(e) => remote_failure = self.fall_back("save", &e),
            }
        }

        if record.id.is_none() {
            record.id = Some(local_id());
        }
        self.local
            .upsert(&record)
            .await
            .map_err(|e| e.with_remote(remote_failure.clone()))?;
        debug!(
            collection = %self.spec.name,
            record_id = ?record.id(),
            mode = %StoreMode::Local,
            "Saved record"
        );

        self.refresh().await?;
        Ok(record)
    }

    /// Apply `patch` to the in-memory copy of `id` and save it.
    pub async fn update(&mut self, id: &str, patch: RecordPatch) -> Result<Record> {
        let mut record = self
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        patch.apply(&mut record);
        self.persist(record).await
    }

    /// Change only the status of `id`.
    pub async fn set_status(&mut self, id: &str, status: RecordStatus) -> Result<Record> {
        self.update(id, RecordPatch::status(status)).await
    }

    /// Store a file for `id` and return its descriptor.
    ///
    /// In local mode the bytes only live in this store's blob table.
    pub async fn upload_attachment(&mut self, id: &str, file: &FileUpload) -> Result<Attachment> {
        self.spec.file_rules.check(file)?;

        if let Some(remote) = self.active_remote() {
            match remote.upload(&self.spec.name, id, file).await {
                Ok(attachment) => {
                    debug!(
                        collection = %self.spec.name,
                        record_id = %id,
                        url = %attachment.url,
                        "Uploaded attachment"
                    );
                    return Ok(attachment);
                }
                Err(e) => {
                    self.fall_back("upload_attachment", &e);
                }
            }
        }

        let url = format!("{}{}", LOCAL_BLOB_SCHEME, Uuid::new_v4());
        self.blobs.insert(url.clone(), file.bytes.clone());
        debug!(collection = %self.spec.name, record_id = %id, url = %url, "Kept attachment locally");

        Ok(Attachment {
            name: file.name.clone(),
            url,
            mime_type: file.mime_type.clone(),
        })
    }

    /// Upload `file` and append it to the record's attachments.
    pub async fn attach_file(&mut self, id: &str, file: &FileUpload) -> Result<Record> {
        if self.get(id).is_none() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        let attachment = self.upload_attachment(id, file).await?;
        self.update(id, RecordPatch::new().append_attachment(attachment))
            .await
    }

    /// Add one to a numeric field of `id`.
    pub async fn increment_counter(&mut self, id: &str, field: &str) -> Result<Record> {
        let now = Utc::now();
        let mut remote_failure = None;

        if let Some(remote) = self.active_remote() {
            let result = match remote.increment(&self.spec.name, id, field).await {
                Ok(value) => normalize_record(value, now)
                    .map_err(|e| RemoteError::Transport(format!("unusable response: {}", e))),
                Err(e) => Err(e),
            };
            match result {
                Ok(updated) => {
                    self.refresh_after_remote_write(&updated).await?;
                    return Ok(self.get(id).cloned().unwrap_or(updated));
                }
                Err(e) => remote_failure = self.fall_back("increment_counter", &e),
            }
        }

        let updated = self
            .local
            .increment(id, field, now)
            .await
            .map_err(|e| e.with_remote(remote_failure.clone()))?;
        self.refresh().await?;
        Ok(updated)
    }

    /// Reload after the API accepted `written`. If the reload is what
    /// trips the fallback, `written` goes into the local collection first
    /// so the local view still shows it.
    async fn refresh_after_remote_write(&mut self, written: &Record) -> Result<()> {
        let refreshed = self.refresh().await;
        if self.mode() == StoreMode::Remote {
            return refreshed;
        }

        self.local.upsert(written).await?;
        debug!(
            collection = %self.spec.name,
            record_id = ?written.id(),
            "Kept remotely written record after fallback"
        );
        self.refresh().await
    }
}

fn fill_from(record: &mut Record, existing: Record) {
    if record.status.is_none() {
        record.status = existing.status;
    }
    if record.owner_key.trim().is_empty() {
        record.owner_key = existing.owner_key;
    }
    if record.attachments.is_empty() {
        record.attachments = existing.attachments;
    }
    if record.created_at.is_none() {
        record.created_at = existing.created_at;
    }
    for (key, value) in existing.payload {
        record.payload.entry(key).or_insert(value);
    }
}

fn guest_owner() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("guest-{}", &suffix[..8])
}

/// An API answer the normalizer rejects counts as a remote failure.
fn normalize_response(raw: Vec<Value>, now: DateTime<Utc>) -> std::result::Result<Vec<Record>, RemoteError> {
    raw.into_iter()
        .map(|v| normalize_record(v, now))
        .collect::<Result<Vec<_>>>()
        .map_err(|e| RemoteError::Transport(format!("unusable response: {}", e)))
}

fn normalize_saved(value: Value, sent: &Record, now: DateTime<Utc>) -> std::result::Result<Record, RemoteError> {
    let mut saved = normalize_record(value, now)
        .map_err(|e| RemoteError::Transport(format!("unusable response: {}", e)))?;
    if saved.id.is_none() {
        saved.id = sent.id.clone();
    }
    if saved.id.is_none() {
        return Err(RemoteError::Transport("saved record has no id".to_string()));
    }
    if saved.owner_key.is_empty() {
        saved.owner_key = sent.owner_key.clone();
    }
    Ok(saved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::MemoryAdapter;

    #[test]
    fn test_guest_owner_shape() {
        let guest = guest_owner();
        assert!(guest.starts_with("guest-"));
        assert_eq!(guest.len(), "guest-".len() + 8);
    }

    #[tokio::test]
    async fn test_scoped_store_without_owner_is_empty() {
        let adapter = Arc::new(MemoryAdapter::new());
        adapter
            .set("questions", r#"[{"id":"1","ownerKey":"alice","title":"Essay"}]"#.into())
            .await
            .unwrap();

        let mut store = SyncedCollectionStore::new(CollectionSpec::questions(), adapter);
        store.refresh().await.unwrap();
        assert!(store.records().is_empty());
        assert_eq!(store.mode(), StoreMode::Local);
    }

    #[tokio::test]
    async fn test_attach_unknown_record() {
        let mut store =
            SyncedCollectionStore::new(CollectionSpec::documents(), Arc::new(MemoryAdapter::new()));
        let file = FileUpload::new("a.pdf", "application/pdf", vec![1, 2, 3]);
        assert!(matches!(
            store.attach_file("nope", &file).await,
            Err(StoreError::NotFound(_))
        ));
    }
}
