//! Types for the collection API

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{ClientError, Result};

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the API, including any `/api` prefix
    pub base_url: String,
    /// Bearer token sent with every request, if already known
    pub api_token: Option<String>,
    /// Request timeout in seconds (default: 30)
    pub timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3001/api".to_string(),
            api_token: None,
            timeout_secs: 30,
        }
    }
}

/// Filters for collection reads
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    /// Restrict to records owned by this actor
    pub owner: Option<String>,
    /// Restrict to one status tag
    pub status: Option<String>,
    /// Free-text search
    pub search: Option<String>,
    /// Exact-match filters on payload fields (e.g. `category=notes`)
    pub fields: BTreeMap<String, String>,
}

impl ListQuery {
    /// Render as a query string without the leading `?`.
    pub fn to_query_string(&self) -> String {
        let mut params = Vec::new();
        if let Some(ref owner) = self.owner {
            params.push(format!("owner={}", urlencoding::encode(owner)));
        }
        if let Some(ref status) = self.status {
            params.push(format!("status={}", urlencoding::encode(status)));
        }
        if let Some(ref search) = self.search {
            params.push(format!("search={}", urlencoding::encode(search)));
        }
        for (key, value) in &self.fields {
            params.push(format!(
                "{}={}",
                urlencoding::encode(key),
                urlencoding::encode(value)
            ));
        }
        params.join("&")
    }
}

/// Session returned by `POST /auth/session`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Bearer token for subsequent requests
    pub token: String,
    /// Identity the server resolved for this session
    #[serde(alias = "owner", alias = "name")]
    pub owner_key: String,
}

/// Request body for `POST /auth/session`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest<'a> {
    pub owner_key: &'a str,
}

/// Request body for `POST /{collection}/{id}/increment`
#[derive(Debug, Clone, Serialize)]
pub struct IncrementRequest<'a> {
    pub field: &'a str,
}

/// A file to send through the multipart upload endpoint
#[derive(Debug, Clone)]
pub struct FilePart {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Attachment descriptor returned by the upload endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    #[serde(alias = "fileName", alias = "originalname")]
    pub name: String,
    #[serde(alias = "fileUrl", alias = "file_url")]
    pub url: String,
    #[serde(alias = "type", alias = "mime_type", alias = "mimetype")]
    pub mime_type: String,
}

/// Keys under which the API wraps record lists.
const LIST_ENVELOPES: &[&str] = &["records", "documents", "assignments", "questions", "items"];

/// Keys under which the API wraps a single record.
const RECORD_ENVELOPES: &[&str] = &["record", "document", "assignment", "question", "updated"];

/// Extract the record array from a list response.
///
/// Accepts a bare array or one of the known envelopes.
pub fn unwrap_list(body: Value) -> Result<Vec<Value>> {
    match body {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => {
            for key in LIST_ENVELOPES {
                if let Some(Value::Array(items)) = map.remove(*key) {
                    return Ok(items);
                }
            }
            Err(ClientError::InvalidResponse(
                "expected an array of records".to_string(),
            ))
        }
        other => Err(ClientError::InvalidResponse(format!(
            "expected an array of records, got {}",
            type_name(&other)
        ))),
    }
}

/// Extract the record object from a single-record response.
pub fn unwrap_record(body: Value) -> Result<Value> {
    match body {
        Value::Object(mut map) => {
            for key in RECORD_ENVELOPES {
                if let Some(inner @ Value::Object(_)) = map.remove(*key) {
                    return Ok(inner);
                }
            }
            Ok(Value::Object(map))
        }
        other => Err(ClientError::InvalidResponse(format!(
            "expected a record object, got {}",
            type_name(&other)
        ))),
    }
}

/// Extract the attachment descriptor from an upload response.
pub fn unwrap_upload(body: Value) -> Result<UploadedFile> {
    let inner = match body {
        Value::Object(mut map) => match map.remove("attachment") {
            Some(inner @ Value::Object(_)) => inner,
            _ => Value::Object(map),
        },
        other => other,
    };
    serde_json::from_value(inner)
        .map_err(|e| ClientError::InvalidResponse(format!("upload descriptor: {}", e)))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
