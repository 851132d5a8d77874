//! Rust client for the StudyGlade collection API
//!
//! Thin typed wrapper over the REST endpoints the dashboards talk to:
//! session creation, collection list/create/replace, multipart attachment
//! upload, and atomic counter increments. Record bodies are passed through
//! as `serde_json::Value`; shaping them into records is the caller's job.
//!
//! # Example
//!
//! ```rust,no_run
//! use studyglade_client::{ApiClient, ClientConfig};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ApiClient::new(ClientConfig::default())?;
//! client.create_session("alice").await?;
//!
//! let created = client
//!     .create("questions", &json!({"title": "Essay", "amount": 5}))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod types;

// Re-export main types
pub use client::ApiClient;
pub use error::{ClientError, Result};
pub use types::*;
