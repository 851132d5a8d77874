//! CLI configuration

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use studyglade_client::ClientConfig;
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudyGladeConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// Remote API settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Try the API at all; `false` starts every store in local mode
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Base URL including the `/api` prefix
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token, if one was issued already
    #[serde(default)]
    pub token: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_base_url(),
            token: None,
            timeout_secs: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the local collections
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Acting identity; falls back to the last one used on this machine
    #[serde(default)]
    pub owner: Option<String>,
}

/// Values given on the command line or in the environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub data_dir: Option<PathBuf>,
    pub api_url: Option<String>,
    pub api_token: Option<String>,
    pub owner: Option<String>,
    pub offline: bool,
}

impl StudyGladeConfig {
    /// Read `path`, or use defaults when it does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn apply(&mut self, overrides: ConfigOverrides) {
        if let Some(data_dir) = overrides.data_dir {
            self.storage.data_dir = data_dir;
        }
        if let Some(api_url) = overrides.api_url {
            self.api.base_url = api_url;
        }
        if let Some(token) = overrides.api_token {
            self.api.token = Some(token);
        }
        if let Some(owner) = overrides.owner {
            self.session.owner = Some(owner);
        }
        if overrides.offline {
            self.api.enabled = false;
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.api.base_url.clone(),
            api_token: self.api.token.clone(),
            timeout_secs: self.api.timeout_secs,
        }
    }
}

// Defaults
fn default_true() -> bool { true }
fn default_base_url() -> String { ClientConfig::default().base_url }
fn default_timeout() -> u64 { 30 }
fn default_data_dir() -> PathBuf { PathBuf::from("studyglade-data") }
