//! Attachment upload service.
//!
//! Validates a file (type `image/*` or `application/pdf`, at most 50 MiB),
//! stores it under a content-addressed key in the configured blob backend,
//! and returns `{url, name}`. Validation always runs before the backend is
//! touched, so an oversized or unsupported file never costs a network call.
//!
//! # Backends
//!
//! | `[blob].backend` | Storage | URL |
//! |------------------|---------|-----|
//! | `disabled` | none, every upload is a configuration error | — |
//! | `filesystem` | files under `[blob].root` | `public_base_url/<key>` |
//! | `s3` | signed `PUT` to a bucket (AWS SigV4) | `public_base_url/<key>` or the object URL |
//!
//! # S3 credentials
//!
//! Read from the environment on every upload, so a server started without
//! them reports a configuration error instead of refusing to boot:
//! - `AWS_ACCESS_KEY_ID` — required
//! - `AWS_SECRET_ACCESS_KEY` — required
//! - `AWS_SESSION_TOKEN` — optional

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use tabi_core::blob::{content_key, validate_upload, UploadRejection};

use crate::config::{BlobBackend, BlobConfig};
use crate::error::AppError;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error(transparent)]
    Validation(#[from] UploadRejection),

    #[error("{0}")]
    Configuration(String),

    #[error("Failed to upload: {0}")]
    Upload(String),
}

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::Validation(r) => AppError::Validation(r.to_string()),
            UploadError::Configuration(m) => AppError::Configuration(m),
            e @ UploadError::Upload(_) => AppError::Upload(e.to_string()),
        }
    }
}

/// A file received from a client.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Successful upload result, also the `POST /upload` response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredBlob {
    pub url: String,
    pub name: String,
}

/// A place to put blobs. Implementations return the public URL.
#[async_trait]
pub trait BlobStore: Send + Sync {
    fn name(&self) -> &str;

    async fn put(&self, key: &str, content_type: &str, bytes: &[u8]) -> Result<String, UploadError>;
}

pub struct UploadService {
    store: Arc<dyn BlobStore>,
}

impl UploadService {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    pub fn from_config(config: &BlobConfig) -> Self {
        Self::new(blob_store_from_config(config))
    }

    pub async fn upload(&self, file: UploadFile) -> Result<StoredBlob, UploadError> {
        validate_upload(&file.content_type, file.bytes.len() as u64)?;

        let key = content_key(&file.bytes, &file.name);
        tracing::info!(
            name = %file.name,
            size = file.bytes.len(),
            backend = self.store.name(),
            "uploading attachment"
        );
        let url = self.store.put(&key, &file.content_type, &file.bytes).await?;
        tracing::info!(%url, "upload successful");

        Ok(StoredBlob {
            url,
            name: file.name,
        })
    }
}

pub fn blob_store_from_config(config: &BlobConfig) -> Arc<dyn BlobStore> {
    match config.backend {
        BlobBackend::Disabled => Arc::new(DisabledBlobStore),
        BlobBackend::Filesystem => Arc::new(FilesystemBlobStore {
            root: config.root.clone().unwrap_or_else(|| PathBuf::from("./data/blobs")),
            public_base_url: config.public_base_url.clone().unwrap_or_default(),
        }),
        BlobBackend::S3 => Arc::new(S3BlobStore {
            bucket: config.bucket.clone().unwrap_or_default(),
            region: config.region.clone(),
            prefix: config.prefix.clone(),
            endpoint_url: config.endpoint_url.clone(),
            public_base_url: config.public_base_url.clone(),
            client: reqwest::Client::new(),
        }),
    }
}

// ============ Disabled ============

pub struct DisabledBlobStore;

#[async_trait]
impl BlobStore for DisabledBlobStore {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn put(&self, _key: &str, _ct: &str, _bytes: &[u8]) -> Result<String, UploadError> {
        Err(UploadError::Configuration(
            "Blob storage not configured".to_string(),
        ))
    }
}

// ============ Filesystem ============

/// Stores blobs as files; the server exposes the root under `/files`.
pub struct FilesystemBlobStore {
    pub root: PathBuf,
    pub public_base_url: String,
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    fn name(&self) -> &str {
        "filesystem"
    }

    async fn put(&self, key: &str, _ct: &str, bytes: &[u8]) -> Result<String, UploadError> {
        let path = self.root.join(key);
        let result: anyhow::Result<()> = async {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("cannot create {}", parent.display()))?;
            }
            // Content-addressed: an existing file already holds these bytes.
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return Ok(());
            }
            tokio::fs::write(&path, bytes)
                .await
                .with_context(|| format!("cannot write {}", path.display()))?;
            Ok(())
        }
        .await;
        result.map_err(|e| UploadError::Upload(format!("{:#}", e)))?;

        Ok(format!(
            "{}/{}",
            self.public_base_url.trim_end_matches('/'),
            key
        ))
    }
}

// ============ S3 ============

type HmacSha256 = Hmac<Sha256>;

/// AWS credentials loaded from environment variables.
struct AwsCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl AwsCredentials {
    fn from_env() -> Result<Self, UploadError> {
        let missing = |var: &str| UploadError::Configuration(format!("{} environment variable not set", var));
        let access_key_id =
            std::env::var("AWS_ACCESS_KEY_ID").map_err(|_| missing("AWS_ACCESS_KEY_ID"))?;
        let secret_access_key =
            std::env::var("AWS_SECRET_ACCESS_KEY").map_err(|_| missing("AWS_SECRET_ACCESS_KEY"))?;
        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

/// S3 or S3-compatible bucket, written with signed `PUT` requests.
pub struct S3BlobStore {
    bucket: String,
    region: String,
    prefix: String,
    endpoint_url: Option<String>,
    public_base_url: Option<String>,
    client: reqwest::Client,
}

/// Where a signed request goes: scheme + host, and the canonical path.
struct S3Target {
    scheme: &'static str,
    host: String,
    canonical_uri: String,
}

impl S3BlobStore {
    fn object_key(&self, key: &str) -> String {
        let prefix = self.prefix.trim_matches('/');
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}/{}", prefix, key)
        }
    }

    /// Virtual-hosted style for AWS, path style for custom endpoints
    /// (MinIO, LocalStack).
    fn target(&self, object_key: &str) -> S3Target {
        let encoded_key = object_key
            .split('/')
            .map(uri_encode)
            .collect::<Vec<_>>()
            .join("/");
        match &self.endpoint_url {
            Some(endpoint) => {
                let scheme = if endpoint.starts_with("http://") {
                    "http"
                } else {
                    "https"
                };
                let host = endpoint
                    .trim_start_matches("https://")
                    .trim_start_matches("http://")
                    .trim_end_matches('/')
                    .to_string();
                S3Target {
                    scheme,
                    host,
                    canonical_uri: format!("/{}/{}", uri_encode(&self.bucket), encoded_key),
                }
            }
            None => S3Target {
                scheme: "https",
                host: format!("{}.s3.{}.amazonaws.com", self.bucket, self.region),
                canonical_uri: format!("/{}", encoded_key),
            },
        }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    fn name(&self) -> &str {
        "s3"
    }

    async fn put(&self, key: &str, content_type: &str, bytes: &[u8]) -> Result<String, UploadError> {
        if self.bucket.is_empty() {
            return Err(UploadError::Configuration(
                "Blob storage not configured".to_string(),
            ));
        }
        let creds = AwsCredentials::from_env()?;

        let object_key = self.object_key(key);
        let target = self.target(&object_key);
        let url = format!("{}://{}{}", target.scheme, target.host, target.canonical_uri);

        let now = Utc::now();
        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let payload_hash = hex_sha256(bytes);

        let authorization = sign_request(
            &SignInput {
                method: "PUT",
                canonical_uri: &target.canonical_uri,
                host: &target.host,
                content_type,
                payload_hash: &payload_hash,
                amz_date: &amz_date,
                date_stamp: &date_stamp,
                region: &self.region,
            },
            &creds,
        );

        let mut req_builder = self
            .client
            .put(&url)
            .header("Authorization", &authorization)
            .header("Content-Type", content_type)
            .header("x-amz-content-sha256", &payload_hash)
            .header("x-amz-date", &amz_date)
            .body(bytes.to_vec());

        if let Some(ref token) = creds.session_token {
            req_builder = req_builder.header("x-amz-security-token", token);
        }

        let resp = req_builder.send().await.map_err(|e| {
            UploadError::Upload(format!("PUT s3://{}/{}: {}", self.bucket, object_key, e))
        })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(UploadError::Upload(format!(
                "S3 PutObject failed (HTTP {}): {}",
                status,
                body.chars().take(500).collect::<String>()
            )));
        }

        Ok(match &self.public_base_url {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), object_key),
            None => url,
        })
    }
}

// ============ AWS SigV4 Helpers ============

struct SignInput<'a> {
    method: &'a str,
    canonical_uri: &'a str,
    host: &'a str,
    content_type: &'a str,
    payload_hash: &'a str,
    amz_date: &'a str,
    date_stamp: &'a str,
    region: &'a str,
}

/// Build the `Authorization` header value for a request with no query
/// string.
fn sign_request(input: &SignInput<'_>, creds: &AwsCredentials) -> String {
    let mut headers = vec![
        ("content-type".to_string(), input.content_type.to_string()),
        ("host".to_string(), input.host.to_string()),
        (
            "x-amz-content-sha256".to_string(),
            input.payload_hash.to_string(),
        ),
        ("x-amz-date".to_string(), input.amz_date.to_string()),
    ];
    if let Some(ref token) = creds.session_token {
        headers.push(("x-amz-security-token".to_string(), token.clone()));
    }
    headers.sort_by(|a, b| a.0.cmp(&b.0));

    let signed_headers: String = headers
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";");

    let canonical_headers: String = headers
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v.trim()))
        .collect();

    let canonical_request = format!(
        "{}\n{}\n\n{}\n{}\n{}",
        input.method, input.canonical_uri, canonical_headers, signed_headers, input.payload_hash
    );

    let credential_scope = format!("{}/{}/s3/aws4_request", input.date_stamp, input.region);
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        input.amz_date,
        credential_scope,
        hex_sha256(canonical_request.as_bytes())
    );

    let signing_key = derive_signing_key(
        &creds.secret_access_key,
        input.date_stamp,
        input.region,
        "s3",
    );
    let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

    format!(
        "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
        creds.access_key_id, credential_scope, signed_headers, signature
    )
}

fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// ```text
/// kDate    = HMAC("AWS4" + secret, dateStamp)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(
        format!("AWS4{}", secret_key).as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// RFC 3986 encoding: everything but `A-Z a-z 0-9 - _ . ~`.
fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Counts calls so tests can prove validation ran first.
    struct CountingStore {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl BlobStore for CountingStore {
        fn name(&self) -> &str {
            "counting"
        }

        async fn put(&self, key: &str, _ct: &str, _b: &[u8]) -> Result<String, UploadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("mem://{}", key))
        }
    }

    fn file(name: &str, content_type: &str, len: usize) -> UploadFile {
        UploadFile {
            name: name.to_string(),
            content_type: content_type.to_string(),
            bytes: vec![7u8; len],
        }
    }

    #[tokio::test]
    async fn oversized_file_never_reaches_backend() {
        let store = Arc::new(CountingStore {
            calls: AtomicUsize::new(0),
        });
        let service = UploadService::new(store.clone());

        let err = service
            .upload(file("big.pdf", "application/pdf", 60 * 1024 * 1024))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            UploadError::Validation(UploadRejection::TooLarge { .. })
        ));

        let err = service
            .upload(file("notes.txt", "text/plain", 10))
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Validation(_)));
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);

        let ok = service.upload(file("ticket.pdf", "application/pdf", 10)).await.unwrap();
        assert_eq!(ok.name, "ticket.pdf");
        assert!(ok.url.starts_with("mem://"));
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disabled_backend_is_a_configuration_error() {
        let service = UploadService::new(Arc::new(DisabledBlobStore));
        let err = service
            .upload(file("a.png", "image/png", 10))
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Configuration(_)));
    }

    #[tokio::test]
    async fn filesystem_backend_writes_content_addressed_file() {
        let tmp = TempDir::new().unwrap();
        let service = UploadService::new(Arc::new(FilesystemBlobStore {
            root: tmp.path().to_path_buf(),
            public_base_url: "http://localhost:7340/files/".to_string(),
        }));

        let stored = service
            .upload(file("Boarding Pass.pdf", "application/pdf", 32))
            .await
            .unwrap();
        let key = stored
            .url
            .strip_prefix("http://localhost:7340/files/")
            .unwrap();
        assert!(key.ends_with("/Boarding_Pass.pdf"));
        assert_eq!(std::fs::read(tmp.path().join(key)).unwrap(), vec![7u8; 32]);

        // Same bytes, same key.
        let again = service
            .upload(file("Boarding Pass.pdf", "application/pdf", 32))
            .await
            .unwrap();
        assert_eq!(again.url, stored.url);
    }

    #[test]
    fn s3_targets() {
        let store = S3BlobStore {
            bucket: "trip-files".into(),
            region: "eu-north-1".into(),
            prefix: "attachments/".into(),
            endpoint_url: None,
            public_base_url: None,
            client: reqwest::Client::new(),
        };
        let key = store.object_key("abc/ticket one.pdf");
        assert_eq!(key, "attachments/abc/ticket one.pdf");
        let t = store.target(&key);
        assert_eq!(t.host, "trip-files.s3.eu-north-1.amazonaws.com");
        assert_eq!(t.canonical_uri, "/attachments/abc/ticket%20one.pdf");

        let minio = S3BlobStore {
            endpoint_url: Some("http://localhost:9000/".into()),
            ..store
        };
        let t = minio.target("k.pdf");
        assert_eq!(t.scheme, "http");
        assert_eq!(t.host, "localhost:9000");
        assert_eq!(t.canonical_uri, "/trip-files/k.pdf");
    }

    #[test]
    fn signing_key_matches_aws_example() {
        // From the AWS SigV4 documentation.
        let key = derive_signing_key(
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "20120215",
            "us-east-1",
            "iam",
        );
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }
}
