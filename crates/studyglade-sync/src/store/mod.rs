//! Dual-mode collection store
//!
//! [`SyncedCollectionStore`] talks to the API while it works and falls back
//! to a [`LocalAdapter`](crate::local::LocalAdapter) for good on the first
//! remote failure.

mod fallback;
mod local_source;
mod synced;

pub use fallback::{FallbackNotice, FallbackReason, StoreMode};
pub use synced::{SyncedCollectionStore, LOCAL_BLOB_SCHEME};
