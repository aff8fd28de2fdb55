//! TOML configuration parsing and validation.
//!
//! Only `[db]` is required; every other section has defaults so a minimal
//! file is enough for a local install. Secrets are never read from the file:
//! the session signing key comes from `JWT_SECRET` and S3 credentials from
//! the usual `AWS_*` variables.
//!
//! ```toml
//! [db]
//! path = "./data/tabi.sqlite"
//!
//! [server]
//! bind = "127.0.0.1:7340"
//! production = false
//!
//! [sync]
//! remote_url = "http://127.0.0.1:7340"
//! local_dir = "./data/local"
//! debounce_ms = 750
//!
//! [blob]
//! backend = "filesystem"
//! root = "./data/blobs"
//! public_base_url = "http://127.0.0.1:7340/files"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tabi_core::catalog::Catalog;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub trip: TripConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub blob: BlobConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Adds `Secure` to the session cookie.
    #[serde(default)]
    pub production: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            production: false,
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct TripConfig {
    /// Key of the single remote trip document.
    #[serde(default = "default_user_id")]
    pub user_id: String,
    /// Replaces the bundled itinerary when set.
    #[serde(default)]
    pub catalog: Option<PathBuf>,
}

impl Default for TripConfig {
    fn default() -> Self {
        Self {
            user_id: default_user_id(),
            catalog: None,
        }
    }
}

fn default_user_id() -> String {
    "default-user".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    #[serde(default = "default_remote_url")]
    pub remote_url: String,
    #[serde(default = "default_local_dir")]
    pub local_dir: PathBuf,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote_url: default_remote_url(),
            local_dir: default_local_dir(),
            debounce_ms: default_debounce_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl SyncConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_remote_url() -> String {
    "http://127.0.0.1:7340".to_string()
}
fn default_local_dir() -> PathBuf {
    PathBuf::from("./data/local")
}
fn default_debounce_ms() -> u64 {
    750
}
fn default_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BlobBackend {
    #[default]
    Disabled,
    Filesystem,
    S3,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BlobConfig {
    #[serde(default)]
    pub backend: BlobBackend,
    /// Filesystem backend: directory holding stored blobs.
    #[serde(default)]
    pub root: Option<PathBuf>,
    /// Prefix for returned URLs. Required for the filesystem backend.
    #[serde(default)]
    pub public_base_url: Option<String>,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub prefix: String,
    /// Custom S3-compatible endpoint (MinIO, LocalStack).
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            backend: BlobBackend::Disabled,
            root: None,
            public_base_url: None,
            bucket: None,
            region: default_region(),
            prefix: String::new(),
            endpoint_url: None,
        }
    }
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl Config {
    /// Configuration with every default and the database at `db_path`.
    pub fn minimal(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig {
                path: db_path.into(),
            },
            server: ServerConfig::default(),
            trip: TripConfig::default(),
            sync: SyncConfig::default(),
            blob: BlobConfig::default(),
        }
    }

    /// The itinerary catalog: the configured file, or the bundled one.
    pub fn load_catalog(&self) -> Result<Catalog> {
        match &self.trip.catalog {
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read catalog: {}", path.display()))?;
                Catalog::from_json(&json)
            }
            None => Catalog::bundled(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.trip.user_id.trim().is_empty() {
        anyhow::bail!("trip.user_id must not be empty");
    }

    if !(500..=1000).contains(&config.sync.debounce_ms) {
        anyhow::bail!("sync.debounce_ms must be in [500, 1000]");
    }

    if config.sync.timeout_secs == 0 {
        anyhow::bail!("sync.timeout_secs must be > 0");
    }

    if !config.sync.remote_url.starts_with("http://")
        && !config.sync.remote_url.starts_with("https://")
    {
        anyhow::bail!("sync.remote_url must start with http:// or https://");
    }

    match config.blob.backend {
        BlobBackend::Disabled => {}
        BlobBackend::Filesystem => {
            if config.blob.root.is_none() {
                anyhow::bail!("blob.root must be set when backend is 'filesystem'");
            }
            if config.blob.public_base_url.is_none() {
                anyhow::bail!("blob.public_base_url must be set when backend is 'filesystem'");
            }
        }
        BlobBackend::S3 => {
            if config.blob.bucket.as_deref().unwrap_or("").is_empty() {
                anyhow::bail!("blob.bucket must be set when backend is 's3'");
            }
        }
    }

    Ok(())
}
