//! Durable local key-value persistence
//!
//! A local adapter stores opaque string blobs under string keys, the way a
//! browser profile's local storage does. The store keeps one JSON array per
//! collection under the collection's key and the acting identity under
//! [`CURRENT_OWNER_KEY`].

mod file;
mod memory;

pub use file::FileAdapter;
pub use memory::MemoryAdapter;

use async_trait::async_trait;
use thiserror::Error;

/// Key holding the current owner identity
pub const CURRENT_OWNER_KEY: &str = "current_owner";

/// Local storage error
#[derive(Debug, Error)]
pub enum LocalError {
    /// Write would exceed the adapter's quota
    #[error("Storage quota exceeded: {needed} bytes needed, quota is {quota}")]
    QuotaExceeded { needed: usize, quota: usize },

    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Blob persistence keyed by name.
///
/// Implementations give no locking across handles: two stores sharing an
/// adapter can interleave read-modify-write cycles.
#[async_trait]
pub trait LocalAdapter: Send + Sync {
    /// Read the blob stored under `key`
    async fn get(&self, key: &str) -> Result<Option<String>, LocalError>;

    /// Replace the blob stored under `key`. Either the whole value is
    /// written or nothing is.
    async fn set(&self, key: &str, value: String) -> Result<(), LocalError>;
}
