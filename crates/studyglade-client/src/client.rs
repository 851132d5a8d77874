//! HTTP client for the StudyGlade collection API

use crate::error::{ClientError, Result};
use crate::types::*;
use reqwest::multipart::{Form, Part};
use reqwest::{header, Client, RequestBuilder, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::RwLock;

/// HTTP client for the StudyGlade collection API
///
/// Every collection (`questions`, `assignments`, `documents`) shares the
/// same endpoint shape, so the collection name is a per-call argument.
///
/// # Example
///
/// ```rust,no_run
/// use studyglade_client::{ApiClient, ClientConfig, ListQuery};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = ApiClient::new(ClientConfig {
///     base_url: "http://localhost:3001/api".into(),
///     ..Default::default()
/// })?;
///
/// client.create_session("alice").await?;
/// let records = client
///     .list("questions", &ListQuery { owner: Some("alice".into()), ..Default::default() })
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct ApiClient {
    base_url: String,
    client: Client,
    token: RwLock<Option<String>>,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ClientError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            token: RwLock::new(config.api_token),
        })
    }

    /// Base URL requests are issued against
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Replace the bearer token
    pub async fn set_token(&self, token: Option<String>) {
        *self.token.write().await = token;
    }

    // ==================== Auth ====================

    /// Open a session for `owner_key` and keep its token for later calls
    pub async fn create_session(&self, owner_key: &str) -> Result<Session> {
        let url = format!("{}/auth/session", self.base_url);

        let request = self
            .client
            .post(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&SessionRequest { owner_key });

        let response = self.authorized(request).await.send().await?;
        let session: Session = self.handle_response(response).await?;
        self.set_token(Some(session.token.clone())).await;
        Ok(session)
    }

    // ==================== Collections ====================

    /// `GET /{collection}?filters`
    pub async fn list(&self, collection: &str, query: &ListQuery) -> Result<Vec<Value>> {
        let mut url = self.collection_url(collection);
        let params = query.to_query_string();
        if !params.is_empty() {
            url.push('?');
            url.push_str(&params);
        }

        let response = self.authorized(self.client.get(&url)).await.send().await?;
        let body: Value = self.handle_response(response).await?;
        unwrap_list(body)
    }

    /// `POST /{collection}`
    pub async fn create(&self, collection: &str, record: &Value) -> Result<Value> {
        let url = self.collection_url(collection);

        let request = self
            .client
            .post(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .json(record);

        let response = self.authorized(request).await.send().await?;
        let body: Value = self.handle_response(response).await?;
        unwrap_record(body)
    }

    /// `PUT /{collection}/{id}`
    pub async fn replace(&self, collection: &str, id: &str, record: &Value) -> Result<Value> {
        let url = self.record_url(collection, id);

        let request = self
            .client
            .put(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .json(record);

        let response = self.authorized(request).await.send().await?;
        let body: Value = self.handle_response(response).await?;
        unwrap_record(body)
    }

    /// `POST /{collection}/{id}/upload` as multipart with a single `file` field
    pub async fn upload(&self, collection: &str, id: &str, file: FilePart) -> Result<UploadedFile> {
        let url = format!("{}/upload", self.record_url(collection, id));

        let part = Part::bytes(file.bytes)
            .file_name(file.file_name)
            .mime_str(&file.mime_type)?;
        let form = Form::new().part("file", part);

        let request = self.client.post(&url).multipart(form);
        let response = self.authorized(request).await.send().await?;
        let body: Value = self.handle_response(response).await?;
        unwrap_upload(body)
    }

    /// `POST /{collection}/{id}/increment`: server-side counter bump
    pub async fn increment(&self, collection: &str, id: &str, field: &str) -> Result<Value> {
        let url = format!("{}/increment", self.record_url(collection, id));

        let request = self
            .client
            .post(&url)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&IncrementRequest { field });

        let response = self.authorized(request).await.send().await?;
        self.handle_response(response).await
    }

    // ==================== Helper Methods ====================

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/{}", self.base_url, urlencoding::encode(collection))
    }

    fn record_url(&self, collection: &str, id: &str) -> String {
        format!(
            "{}/{}",
            self.collection_url(collection),
            urlencoding::encode(id)
        )
    }

    async fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self.token.read().await.as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(ClientError::Unauthorized);
        }

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            tracing::debug!(status, "API request failed: {}", body);
            return Err(ClientError::Server {
                status,
                message: body,
            });
        }

        let body = response.json().await?;
        Ok(body)
    }
}
