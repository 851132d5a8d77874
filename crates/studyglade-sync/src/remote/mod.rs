//! Remote side of a synchronized collection
//!
//! `RemoteApi` is the seam between the store and the REST API. The HTTP
//! implementation wraps [`studyglade_client::ApiClient`]; tests use
//! [`mock::MockRemote`].

pub mod mock;

use async_trait::async_trait;
use serde_json::Value;
use studyglade_client::{ApiClient, ClientError, FilePart, ListQuery};

use crate::record::{Attachment, FileUpload};

/// Why a remote call failed. Both variants trigger fallback.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// Network failure, non-2xx answer, or an unusable body
    #[error("Transport error: {0}")]
    Transport(String),

    /// Server answered 401
    #[error("Authentication required")]
    AuthRequired,
}

impl From<ClientError> for RemoteError {
    fn from(err: ClientError) -> Self {
        if err.is_auth_required() {
            RemoteError::AuthRequired
        } else {
            RemoteError::Transport(err.to_string())
        }
    }
}

/// Remote collection endpoints consumed by the store.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Authenticate as `owner_key`; returns the identity the server resolved.
    async fn open_session(&self, owner_key: &str) -> Result<String, RemoteError>;

    /// Raw record bodies matching `query`.
    async fn list(&self, collection: &str, query: &ListQuery) -> Result<Vec<Value>, RemoteError>;

    /// Create a record; returns the stored body including its new id.
    async fn create(&self, collection: &str, record: &Value) -> Result<Value, RemoteError>;

    /// Replace the record with `id`; returns the stored body.
    async fn replace(&self, collection: &str, id: &str, record: &Value) -> Result<Value, RemoteError>;

    /// Upload a file for record `id`.
    async fn upload(&self, collection: &str, id: &str, file: &FileUpload) -> Result<Attachment, RemoteError>;

    /// Atomically increment `field` on record `id`; returns the server's answer.
    async fn increment(&self, collection: &str, id: &str, field: &str) -> Result<Value, RemoteError>;
}

#[async_trait]
impl RemoteApi for ApiClient {
    async fn open_session(&self, owner_key: &str) -> Result<String, RemoteError> {
        Ok(self.create_session(owner_key).await?.owner_key)
    }

    async fn list(&self, collection: &str, query: &ListQuery) -> Result<Vec<Value>, RemoteError> {
        Ok(ApiClient::list(self, collection, query).await?)
    }

    async fn create(&self, collection: &str, record: &Value) -> Result<Value, RemoteError> {
        Ok(ApiClient::create(self, collection, record).await?)
    }

    async fn replace(&self, collection: &str, id: &str, record: &Value) -> Result<Value, RemoteError> {
        Ok(ApiClient::replace(self, collection, id, record).await?)
    }

    async fn upload(&self, collection: &str, id: &str, file: &FileUpload) -> Result<Attachment, RemoteError> {
        let part = FilePart {
            file_name: file.name.clone(),
            mime_type: file.mime_type.clone(),
            bytes: file.bytes.clone(),
        };
        let uploaded = ApiClient::upload(self, collection, id, part).await?;
        Ok(Attachment {
            name: uploaded.name,
            url: uploaded.url,
            mime_type: uploaded.mime_type,
        })
    }

    async fn increment(&self, collection: &str, id: &str, field: &str) -> Result<Value, RemoteError> {
        Ok(ApiClient::increment(self, collection, id, field).await?)
    }
}
