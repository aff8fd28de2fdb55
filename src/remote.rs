//! Client side of the remote trip document.
//!
//! [`RemoteTrip`] is what the sync coordinator talks to. Two
//! implementations:
//!
//! - [`HttpRemote`]: `GET`/`POST {remote_url}/trip` against a `tabi serve`
//!   instance, with a request timeout.
//! - [`DocumentStoreRemote`]: calls a [`TripDocumentStore`] in-process,
//!   for embedding and tests.
//!
//! [`HttpUploader`] posts attachments to `{remote_url}/upload` after
//! running the same type and size checks the server does.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use tabi_core::blob::{content_type_for_path, validate_upload};
use tabi_core::models::{AttachmentKind, TripSnapshot};
use tabi_core::store::TripDocumentStore;

use crate::config::SyncConfig;
use crate::upload::{StoredBlob, UploadError, UploadFile};

/// Remote copy of the trip snapshot.
#[async_trait]
pub trait RemoteTrip: Send + Sync {
    /// Fetch the remote snapshot. An absent document reads as empty.
    async fn load(&self) -> Result<TripSnapshot>;

    /// Replace the remote snapshot.
    async fn save(&self, snapshot: &TripSnapshot) -> Result<()>;
}

/// `/trip` over HTTP.
pub struct HttpRemote {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRemote {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        Self::new(&config.remote_url, config.timeout())
    }

    fn trip_url(&self) -> String {
        format!("{}/trip", self.base_url)
    }
}

#[async_trait]
impl RemoteTrip for HttpRemote {
    async fn load(&self) -> Result<TripSnapshot> {
        let url = self.trip_url();
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {}", url))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("GET {} failed (HTTP {}): {}", url, status, body);
        }
        resp.json::<TripSnapshot>()
            .await
            .with_context(|| format!("GET {}: malformed trip document", url))
    }

    async fn save(&self, snapshot: &TripSnapshot) -> Result<()> {
        let url = self.trip_url();
        let resp = self
            .client
            .post(&url)
            .json(snapshot)
            .send()
            .await
            .with_context(|| format!("POST {}", url))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("POST {} failed (HTTP {}): {}", url, status, body);
        }
        Ok(())
    }
}

/// A [`TripDocumentStore`] bound to one user identifier.
pub struct DocumentStoreRemote {
    store: Arc<dyn TripDocumentStore>,
    user_id: String,
}

impl DocumentStoreRemote {
    pub fn new(store: Arc<dyn TripDocumentStore>, user_id: impl Into<String>) -> Self {
        Self {
            store,
            user_id: user_id.into(),
        }
    }
}

#[async_trait]
impl RemoteTrip for DocumentStoreRemote {
    async fn load(&self) -> Result<TripSnapshot> {
        self.store.load_snapshot(&self.user_id).await
    }

    async fn save(&self, snapshot: &TripSnapshot) -> Result<()> {
        self.store.upsert(&self.user_id, snapshot).await?;
        Ok(())
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorMessage,
}

#[derive(Deserialize)]
struct ErrorMessage {
    message: String,
}

/// Uploads attachments to a `tabi serve` instance.
pub struct HttpUploader {
    client: reqwest::Client,
    base_url: String,
}

impl HttpUploader {
    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            base_url: config.remote_url.trim_end_matches('/').to_string(),
        })
    }

    /// Read a file from disk and upload it, guessing its content type from
    /// the extension.
    pub async fn upload_path(&self, path: &Path) -> Result<(StoredBlob, AttachmentKind), UploadError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        let content_type = content_type_for_path(&name).to_string();
        // Checked before reading so an oversized file is never loaded.
        if let Ok(meta) = tokio::fs::metadata(path).await {
            validate_upload(&content_type, meta.len())?;
        }
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| UploadError::Upload(format!("cannot read {}: {}", path.display(), e)))?;
        self.upload(UploadFile {
            name,
            content_type,
            bytes,
        })
        .await
    }

    pub async fn upload(&self, file: UploadFile) -> Result<(StoredBlob, AttachmentKind), UploadError> {
        let kind = validate_upload(&file.content_type, file.bytes.len() as u64)?;

        let url = format!("{}/upload", self.base_url);
        let part = reqwest::multipart::Part::bytes(file.bytes)
            .file_name(file.name)
            .mime_str(&file.content_type)
            .map_err(|e| UploadError::Upload(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let resp = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| UploadError::Upload(format!("POST {}: {}", url, e)))?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp
                .json::<ErrorEnvelope>()
                .await
                .map(|e| e.error.message)
                .unwrap_or_else(|_| status.to_string());
            return Err(if status == reqwest::StatusCode::INTERNAL_SERVER_ERROR
                && message.contains("not configured")
            {
                UploadError::Configuration(message)
            } else {
                UploadError::Upload(format!("HTTP {}: {}", status, message))
            });
        }

        let stored = resp
            .json::<StoredBlob>()
            .await
            .map_err(|e| UploadError::Upload(format!("malformed upload response: {}", e)))?;
        Ok((stored, kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabi_core::models::DayUserData;
    use tabi_core::store::memory::InMemoryTripStore;

    #[tokio::test]
    async fn document_store_remote_round_trip() {
        let store = Arc::new(InMemoryTripStore::new());
        let remote = DocumentStoreRemote::new(store.clone(), "default-user");

        assert_eq!(remote.load().await.unwrap(), TripSnapshot::default());

        let mut snapshot = TripSnapshot::default();
        snapshot.user_data_map.insert(
            "2025-02-21".into(),
            DayUserData {
                notes: "ramen".into(),
                attachments: vec![],
            },
        );
        remote.save(&snapshot).await.unwrap();
        assert_eq!(remote.load().await.unwrap(), snapshot);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn uploader_rejects_before_network() {
        // Nothing listens on port 9; validation must fail first.
        let uploader = HttpUploader {
            client: reqwest::Client::new(),
            base_url: "http://127.0.0.1:9".into(),
        };
        let err = uploader
            .upload(UploadFile {
                name: "movie.mp4".into(),
                content_type: "video/mp4".into(),
                bytes: vec![1, 2, 3],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Validation(_)));
    }
}
