//! Remote-to-local fallback state

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tokio::sync::broadcast;
use tracing::warn;

use crate::remote::RemoteError;

/// Which side currently backs the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreMode {
    Remote,
    Local,
}

impl fmt::Display for StoreMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreMode::Remote => f.write_str("remote"),
            StoreMode::Local => f.write_str("local"),
        }
    }
}

/// Why the store stopped talking to the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// Network failure or an unusable answer
    Transport,
    /// The API rejected the session; the user should sign in again
    AuthRequired,
}

/// Sent to subscribers when the store switches to local mode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FallbackNotice {
    pub collection: String,
    /// Store operation that hit the failure
    pub operation: String,
    pub reason: FallbackReason,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl FallbackNotice {
    /// Text suitable for a one-line banner.
    pub fn user_message(&self) -> &'static str {
        match self.reason {
            FallbackReason::Transport => {
                "Working offline: changes are saved on this device only."
            }
            FallbackReason::AuthRequired => {
                "Your session has expired. Sign in again to sync; working offline for now."
            }
        }
    }
}

const NOTICE_CAPACITY: usize = 4;

/// One-way mode switch plus its notification channel.
#[derive(Debug)]
pub(crate) struct FallbackPolicy {
    mode: StoreMode,
    notices: broadcast::Sender<FallbackNotice>,
}

impl FallbackPolicy {
    pub(crate) fn new(mode: StoreMode) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self { mode, notices }
    }

    pub(crate) fn mode(&self) -> StoreMode {
        self.mode
    }

    pub(crate) fn set_remote(&mut self) {
        self.mode = StoreMode::Remote;
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<FallbackNotice> {
        self.notices.subscribe()
    }

    /// Switch to local mode after `error`. Only the first call has any
    /// effect.
    pub(crate) fn trip(&mut self, collection: &str, operation: &str, error: &RemoteError) {
        if self.mode == StoreMode::Local {
            return;
        }
        self.mode = StoreMode::Local;

        let reason = match error {
            RemoteError::AuthRequired => FallbackReason::AuthRequired,
            RemoteError::Transport(_) => FallbackReason::Transport,
        };

        warn!(
            collection = %collection,
            operation = %operation,
            reason = ?reason,
            error = %error,
            "Remote API failed, switching to local storage"
        );

        let notice = FallbackNotice {
            collection: collection.to_string(),
            operation: operation.to_string(),
            reason,
            message: error.to_string(),
            at: Utc::now(),
        };
        // No receivers is fine
        let _ = self.notices.send(notice);
    }
}
