//! Attachment upload rules shared by the client and the server.
//!
//! An upload is accepted when its content type is `image/*` or
//! `application/pdf` and it is at most [`MAX_UPLOAD_BYTES`]. Accepted bytes
//! are stored under a content-addressed key: the SHA-256 of the content,
//! followed by a sanitized copy of the original file name so URLs stay
//! readable.

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::models::AttachmentKind;

/// 50 MiB.
pub const MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UploadRejection {
    #[error("unsupported file type '{0}': upload a PDF or an image")]
    UnsupportedType(String),

    #[error("file is too large ({size} bytes, max {max} bytes)")]
    TooLarge { size: u64, max: u64 },

    #[error("file is empty")]
    Empty,
}

/// Check type and size before anything touches a storage backend.
pub fn validate_upload(content_type: &str, size: u64) -> Result<AttachmentKind, UploadRejection> {
    let kind = AttachmentKind::from_content_type(content_type)
        .ok_or_else(|| UploadRejection::UnsupportedType(content_type.to_string()))?;
    if size > MAX_UPLOAD_BYTES {
        return Err(UploadRejection::TooLarge {
            size,
            max: MAX_UPLOAD_BYTES,
        });
    }
    if size == 0 {
        return Err(UploadRejection::Empty);
    }
    Ok(kind)
}

/// Storage key for an upload: `<sha256 hex>/<sanitized name>`.
pub fn content_key(bytes: &[u8], file_name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{}/{}", hex::encode(hasher.finalize()), sanitize_file_name(file_name))
}

/// Keep ASCII alphanumerics, `.`, `-` and `_`; everything else becomes `_`.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

/// Guess a content type from a file extension, for uploads from disk.
pub fn content_type_for_path(path: &str) -> &'static str {
    let ext = path
        .rsplit('.')
        .next()
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_images_and_pdfs() {
        assert_eq!(validate_upload("image/png", 10), Ok(AttachmentKind::Image));
        assert_eq!(
            validate_upload("application/pdf", MAX_UPLOAD_BYTES),
            Ok(AttachmentKind::Pdf)
        );
    }

    #[test]
    fn rejects_other_types_and_oversized_files() {
        assert!(matches!(
            validate_upload("application/zip", 10),
            Err(UploadRejection::UnsupportedType(_))
        ));
        assert_eq!(
            validate_upload("image/jpeg", 60 * 1024 * 1024),
            Err(UploadRejection::TooLarge {
                size: 60 * 1024 * 1024,
                max: MAX_UPLOAD_BYTES
            })
        );
        assert_eq!(validate_upload("image/jpeg", 0), Err(UploadRejection::Empty));
    }

    #[test]
    fn content_key_is_stable_and_readable() {
        let a = content_key(b"hello", "Boarding Pass.pdf");
        let b = content_key(b"hello", "Boarding Pass.pdf");
        assert_eq!(a, b);
        assert!(a.ends_with("/Boarding_Pass.pdf"));
        assert_eq!(a.split('/').next().unwrap().len(), 64);
    }

    #[test]
    fn sanitize_strips_paths() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("..."), "file");
        assert_eq!(sanitize_file_name("旅.png"), "_.png");
    }

    #[test]
    fn content_type_guess() {
        assert_eq!(content_type_for_path("ticket.PDF"), "application/pdf");
        assert_eq!(content_type_for_path("a/b/photo.jpeg"), "image/jpeg");
        assert_eq!(content_type_for_path("notes.txt"), "application/octet-stream");
    }
}
