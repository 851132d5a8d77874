//! Ingestion boundary for records
//!
//! API responses and stored blobs written by older dashboard builds disagree
//! on field names (`_id` vs `id`, `postedAt` vs `created_at`, `student` vs
//! `studentName`) and on status casing. Everything entering the store goes
//! through [`normalize_record`] so the rest of the crate only sees the
//! canonical [`Record`] shape.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};

use crate::error::{Result, StoreError};
use crate::record::{Attachment, Record, RecordStatus};

const ID_KEYS: &[&str] = &["id", "_id"];
const OWNER_KEYS: &[&str] = &[
    "ownerKey",
    "owner_key",
    "owner",
    "student",
    "studentName",
    "uploader",
    "uploadedBy",
    "senderId",
    "sender",
];
const CREATED_KEYS: &[&str] = &["createdAt", "created_at", "postedAt", "uploaded_at"];
const UPDATED_KEYS: &[&str] = &["updatedAt", "updated_at"];
const DROPPED_KEYS: &[&str] = &["__v"];

/// Map one external record onto the canonical schema.
///
/// `now` fills in missing timestamps.
pub fn normalize_record(value: Value, now: DateTime<Utc>) -> Result<Record> {
    let mut map = match value {
        Value::Object(map) => map,
        other => {
            return Err(StoreError::Normalization(format!(
                "expected a record object, got {}",
                other
            )))
        }
    };

    let id = take_first(&mut map, ID_KEYS).and_then(id_string);
    let owner_key = take_first(&mut map, OWNER_KEYS)
        .and_then(owner_string)
        .unwrap_or_default();

    let status = match map.remove("status") {
        Some(Value::String(s)) => Some(s.parse::<RecordStatus>()?),
        Some(Value::Null) | None => Some(RecordStatus::Pending),
        Some(other) => {
            return Err(StoreError::Normalization(format!(
                "status must be a string, got {}",
                other
            )))
        }
    };

    let created_at = take_first(&mut map, CREATED_KEYS)
        .and_then(|v| parse_timestamp(&v))
        .unwrap_or(now);
    let updated_at = take_first(&mut map, UPDATED_KEYS)
        .and_then(|v| parse_timestamp(&v))
        .unwrap_or(created_at);

    let attachments = match map.remove("attachments") {
        Some(Value::Array(items)) => items
            .into_iter()
            .map(normalize_attachment)
            .collect::<Result<Vec<_>>>()?,
        _ => Vec::new(),
    };

    for key in DROPPED_KEYS {
        map.remove(*key);
    }

    Ok(Record {
        id,
        owner_key,
        status,
        attachments,
        created_at: Some(created_at),
        updated_at: Some(updated_at),
        payload: map,
    })
}

/// Id of a raw stored entry without normalizing the rest of it.
pub fn raw_id(value: &Value) -> Option<String> {
    let map = value.as_object()?;
    ID_KEYS
        .iter()
        .find_map(|key| map.get(*key).cloned())
        .and_then(id_string)
}

/// Attachment descriptor under any of its historical spellings.
pub fn normalize_attachment(value: Value) -> Result<Attachment> {
    let mut map = match value {
        Value::Object(map) => map,
        other => {
            return Err(StoreError::Normalization(format!(
                "attachment must be an object, got {}",
                other
            )))
        }
    };

    let name = take_first(&mut map, &["name", "fileName", "file_name"])
        .and_then(|v| v.as_str().map(str::to_string));
    let url = take_first(&mut map, &["url", "fileUrl", "file_url"])
        .and_then(|v| v.as_str().map(str::to_string));
    let mime_type = take_first(&mut map, &["mimeType", "mime_type", "type", "file_type"])
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_else(|| "application/octet-stream".to_string());

    match (name, url) {
        (Some(name), Some(url)) => Ok(Attachment {
            name,
            url,
            mime_type,
        }),
        _ => Err(StoreError::Normalization(
            "attachment needs a name and a url".to_string(),
        )),
    }
}

fn take_first(map: &mut Map<String, Value>, keys: &[&str]) -> Option<Value> {
    let mut found = None;
    for key in keys {
        if let Some(value) = map.remove(*key) {
            if found.is_none() && !value.is_null() {
                found = Some(value);
            }
        }
    }
    found
}

fn id_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Owners arrive as a plain name/id or as a populated user object.
fn owner_string(value: Value) -> Option<String> {
    match value {
        Value::Object(map) => ["_id", "id", "name"]
            .iter()
            .find_map(|key| map.get(*key).cloned())
            .and_then(id_string),
        other => id_string(other),
    }
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
                    .map(|dt| Utc.from_utc_datetime(&dt))
            }),
        Value::Number(n) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        _ => None,
    }
}
