//! Canonical record schema shared by every collection
//!
//! A [`Record`] is the unit the store persists: an assignment/question or a
//! library document. Only the envelope (id, owner, status, attachments,
//! timestamps) is typed; everything else lives in `payload` and is stored
//! and returned untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::StoreError;

/// Lifecycle tag of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    #[default]
    Pending,
    PendingPayment,
    InProgress,
    Completed,
    Dispute,
    Failed,
}

impl RecordStatus {
    pub const ALL: [RecordStatus; 6] = [
        RecordStatus::Pending,
        RecordStatus::PendingPayment,
        RecordStatus::InProgress,
        RecordStatus::Completed,
        RecordStatus::Dispute,
        RecordStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Pending => "pending",
            RecordStatus::PendingPayment => "pending_payment",
            RecordStatus::InProgress => "in_progress",
            RecordStatus::Completed => "completed",
            RecordStatus::Dispute => "dispute",
            RecordStatus::Failed => "failed",
        }
    }

    /// Position in the normal forward flow; `None` for side states.
    fn rank(&self) -> Option<u8> {
        match self {
            RecordStatus::Pending => Some(0),
            RecordStatus::PendingPayment => Some(1),
            RecordStatus::InProgress => Some(2),
            RecordStatus::Completed => Some(3),
            RecordStatus::Dispute | RecordStatus::Failed => None,
        }
    }

    /// Whether `self -> next` is an allowed lifecycle step.
    ///
    /// The normal flow only moves forward (steps may be skipped). `dispute`
    /// can be entered from anything but `completed`; `failed` only from
    /// `pending_payment`, and a failed payment may be retried. Re-applying
    /// the current status is always allowed.
    pub fn can_transition_to(&self, next: RecordStatus) -> bool {
        if *self == next {
            return true;
        }
        match (self, next) {
            (RecordStatus::Completed, _) => false,
            (_, RecordStatus::Dispute) => true,
            (RecordStatus::PendingPayment, RecordStatus::Failed) => true,
            (_, RecordStatus::Failed) => false,
            (RecordStatus::Failed, RecordStatus::PendingPayment) => true,
            (from, to) => match (from.rank(), to.rank()) {
                (Some(a), Some(b)) => b > a,
                _ => false,
            },
        }
    }

    /// Whether the record counts as outstanding work on a dashboard.
    pub fn is_pending(&self) -> bool {
        matches!(self, RecordStatus::Pending | RecordStatus::PendingPayment)
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordStatus {
    type Err = StoreError;

    /// Accepts any casing and `-`/space/`_` separators
    /// (`"Pending Payment"`, `"in-progress"`, `"COMPLETED"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let folded: String = s
            .trim()
            .chars()
            .map(|c| match c {
                '-' | ' ' => '_',
                c => c.to_ascii_lowercase(),
            })
            .collect();

        match folded.as_str() {
            "pending" => Ok(RecordStatus::Pending),
            "pending_payment" => Ok(RecordStatus::PendingPayment),
            "in_progress" => Ok(RecordStatus::InProgress),
            "completed" => Ok(RecordStatus::Completed),
            "dispute" | "disputed" => Ok(RecordStatus::Dispute),
            "failed" => Ok(RecordStatus::Failed),
            _ => Err(StoreError::Normalization(format!("unknown status '{}'", s))),
        }
    }
}

/// File reference attached to a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub name: String,
    pub url: String,
    pub mime_type: String,
}

/// File contents handed to `upload_attachment`.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl FileUpload {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// A persisted record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub owner_key: String,
    /// `None` on a partial save means "keep the current status".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RecordStatus>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Record {
    /// New unsaved record for `owner_key`
    pub fn new(owner_key: impl Into<String>) -> Self {
        Self {
            id: None,
            owner_key: owner_key.into(),
            status: None,
            attachments: Vec::new(),
            created_at: None,
            updated_at: None,
            payload: Map::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_status(mut self, status: RecordStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Lifecycle tag; an unsaved record without one is `pending`.
    pub fn status(&self) -> RecordStatus {
        self.status.unwrap_or_default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.payload.get(key).and_then(Value::as_f64)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.payload.get(key).and_then(Value::as_u64)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.payload.insert(key.into(), value.into());
    }

    pub fn title(&self) -> Option<&str> {
        self.get_str("title")
    }

    pub fn amount(&self) -> f64 {
        self.get_f64("amount").unwrap_or(0.0)
    }

    /// Serialize for the wire or for durable storage.
    pub fn to_value(&self) -> Value {
        // Only string keys and JSON values inside, so this cannot fail.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Partial change applied by `update`.
///
/// Attachments can only be appended; there is no way to drop or reorder
/// existing entries through a patch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPatch {
    pub status: Option<RecordStatus>,
    pub fields: Map<String, Value>,
    pub append_attachments: Vec<Attachment>,
}

impl RecordPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(status: RecordStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: RecordStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Set a payload field; `Value::Null` removes it.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn append_attachment(mut self, attachment: Attachment) -> Self {
        self.append_attachments.push(attachment);
        self
    }

    pub fn apply(&self, record: &mut Record) {
        if let Some(status) = self.status {
            record.status = Some(status);
        }
        for (key, value) in &self.fields {
            if value.is_null() {
                record.payload.remove(key);
            } else {
                record.payload.insert(key.clone(), value.clone());
            }
        }
        record
            .attachments
            .extend(self.append_attachments.iter().cloned());
    }
}

/// Read filter for `load`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    pub status: Option<RecordStatus>,
    /// Exact matches on payload fields (`category = "notes"`)
    pub fields: BTreeMap<String, String>,
    /// Case-insensitive substring over title, subject and category
    pub search: Option<String>,
}

const SEARCH_FIELDS: &[&str] = &["title", "subject", "category"];

impl RecordFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: RecordStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn matches(&self, record: &Record) -> bool {
        if let Some(status) = self.status {
            if record.status() != status {
                return false;
            }
        }

        for (key, expected) in &self.fields {
            let matched = match record.get(key) {
                Some(Value::String(s)) => s == expected,
                Some(Value::Number(n)) => n.to_string() == *expected,
                Some(Value::Bool(b)) => b.to_string() == *expected,
                _ => false,
            };
            if !matched {
                return false;
            }
        }

        match self.search.as_deref().map(str::trim) {
            Some(term) if !term.is_empty() => {
                let term = term.to_lowercase();
                SEARCH_FIELDS.iter().any(|field| {
                    record
                        .get_str(field)
                        .is_some_and(|v| v.to_lowercase().contains(&term))
                })
            }
            _ => true,
        }
    }

    /// Query the API with the same filter, scoped to `owner` when given.
    pub fn to_list_query(&self, owner: Option<&str>) -> studyglade_client::ListQuery {
        studyglade_client::ListQuery {
            owner: owner.map(str::to_string),
            status: self.status.map(|s| s.as_str().to_string()),
            search: self.search.clone(),
            fields: self.fields.clone(),
        }
    }
}

/// Locally generated id: `<unix-millis>-<8 hex chars>`.
pub fn local_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", Utc::now().timestamp_millis(), &suffix[..8])
}
