//! Static configuration for the release bot.
//!
//! One [`BotConfig`] value is deserialized from a JSON file at process start
//! and passed by reference into each component's constructor. There is no
//! ambient global state and no hot reload.

use crate::error::{ConfigError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration, loaded once from a JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    /// Source-host API settings
    pub github: GithubConfig,
    /// Remote signing host settings
    pub signing: SigningConfig,
    /// Object store settings
    pub store: StoreConfig,
    /// Asset polling policy
    #[serde(default)]
    pub wait: WaitPolicy,
}

/// Source-host API settings.
#[derive(Debug, Clone, Deserialize)]
pub struct GithubConfig {
    /// Access token used for every API call
    pub token: String,
    /// Organization (or user) owning the plugin repositories
    pub org: String,
    /// REST API base URL
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Asset upload base URL
    #[serde(default = "default_upload_base")]
    pub upload_base: String,
}

/// Remote signing host settings.
///
/// The pinned `host_public_key` is required: connecting without host-key
/// verification is not acceptable, and an empty pin is rejected when the
/// SSH client is constructed.
#[derive(Debug, Clone, Deserialize)]
pub struct SigningConfig {
    /// Signing host name or address
    pub host: String,
    /// SSH port
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    /// SSH user
    pub user: String,
    /// Path to the SSH private key
    pub private_key_path: PathBuf,
    /// Optional short-lived certificate presented with the key
    #[serde(default)]
    pub certificate_path: Option<PathBuf>,
    /// Pinned host public key, `<type> <base64>` as in a known_hosts entry
    #[serde(default)]
    pub host_public_key: String,
    /// Remote directory files are staged into before signing
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,
    /// Remote command invoked once per staged file
    pub sign_command: String,
    /// Remote directory the signing command writes `<file>.sig` into
    pub output_dir: PathBuf,
}

/// Object store settings.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Bucket name
    pub bucket: String,
    /// Region name
    pub region: String,
    /// Static access key
    pub access_key: String,
    /// Static secret key
    pub secret_key: String,
}

/// Polling policy for the release-asset wait loop.
#[derive(Debug, Clone, Deserialize)]
pub struct WaitPolicy {
    /// Seconds between polls
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Overall bound on the wait
    #[serde(default = "default_wait_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            timeout_secs: default_wait_timeout_secs(),
        }
    }
}

impl WaitPolicy {
    /// Interval between polls.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Overall timeout for the wait loop.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl BotConfig {
    /// Load configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: BotConfig =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(config)
    }
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_upload_base() -> String {
    "https://uploads.github.com".to_string()
}

fn default_ssh_port() -> u16 {
    22
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("/tmp")
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_wait_timeout_secs() -> u64 {
    1800
}
