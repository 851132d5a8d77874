//! StudyGlade synchronized collections
//!
//! Dashboards read and write their collections (questions, the tutor queue,
//! assignment messages, the document library) through a [`SyncedCollectionStore`]. The store
//! works against the REST API while it answers and falls back to a durable
//! local key-value adapter the first time it does not, for the rest of its
//! lifetime.
//!
//! # Modes
//!
//! - **Remote**: every operation goes to the API; reads are replaced with
//!   the server's answer.
//! - **Local**: the collection lives as one JSON array under its storage key
//!   in a [`LocalAdapter`]; ids are generated on the device.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use studyglade_sync::{
//!     commands, ApiClient, ClientConfig, CollectionSpec, FileAdapter, NewQuestion,
//!     SyncedCollectionStore,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let adapter = Arc::new(FileAdapter::open("./data").await?);
//! let api = Arc::new(ApiClient::new(ClientConfig::default())?);
//!
//! let mut store = SyncedCollectionStore::new(CollectionSpec::questions(), adapter)
//!     .with_remote(api);
//! store.initialize(Some("alice")).await?;
//!
//! commands::post_question(
//!     &mut store,
//!     NewQuestion {
//!         title: "Essay".into(),
//!         amount: 5.0,
//!         ..Default::default()
//!     },
//! )
//! .await?;
//! # Ok(())
//! # }
//! ```

pub mod collection;
pub mod commands;
pub mod error;
pub mod local;
pub mod normalize;
pub mod payment;
pub mod record;
pub mod remote;
pub mod store;
pub mod views;

// Re-export main types
pub use collection::{CollectionKind, CollectionSpec, FileRules, ALLOWED_MIME_TYPES};
pub use commands::{NewDocument, NewMessage, NewQuestion, MIN_AMOUNT_PER_PAGE};
pub use error::{Result, StoreError};
pub use local::{FileAdapter, LocalAdapter, LocalError, MemoryAdapter, CURRENT_OWNER_KEY};
pub use normalize::normalize_record;
pub use payment::{stripe_outcome, MpesaCallback, PaymentOutcome};
pub use record::{Attachment, FileUpload, Record, RecordFilter, RecordPatch, RecordStatus};
pub use remote::{RemoteApi, RemoteError};
pub use store::{FallbackNotice, FallbackReason, StoreMode, SyncedCollectionStore, LOCAL_BLOB_SCHEME};
pub use views::{DashboardStats, PaymentSummary, ReportSnapshot};

pub use studyglade_client::{ApiClient, ClientConfig};
