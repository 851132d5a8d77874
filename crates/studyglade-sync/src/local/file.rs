use async_trait::async_trait;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::{LocalAdapter, LocalError};

/// Adapter keeping one file per key under a data directory.
///
/// Writes go to a temporary sibling and are renamed into place, so a
/// crashed write never leaves a truncated blob behind.
#[derive(Debug, Clone)]
pub struct FileAdapter {
    root: PathBuf,
}

impl FileAdapter {
    /// Use `root` as the data directory, creating it if needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, LocalError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Percent-encoded, so distinct keys never share a file.
    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", urlencoding::encode(key)))
    }
}

#[async_trait]
impl LocalAdapter for FileAdapter {
    async fn get(&self, key: &str) -> Result<Option<String>, LocalError> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: String) -> Result<(), LocalError> {
        let target = self.path_for(key);
        let staging = self
            .root
            .join(format!(".{}.tmp", Uuid::new_v4().simple()));

        tokio::fs::write(&staging, value).await?;
        if let Err(e) = tokio::fs::rename(&staging, &target).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(e.into());
        }
        Ok(())
    }
}
