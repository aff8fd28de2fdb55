//! HTTP boundary errors.
//!
//! Every handler returns `Result<_, AppError>`. The response body always has
//! the shape
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "Invalid email format" } }
//! ```
//!
//! | Variant | Status | Code |
//! |---------|--------|------|
//! | `Validation` | 400 | `bad_request` |
//! | `Conflict` | 400 | `bad_request` |
//! | `Auth` | 401 | `unauthorized` |
//! | `Unauthenticated` | 401 | `unauthorized` |
//! | `Configuration` | 500 | `misconfigured` |
//! | `Upload` | 500 | `upload_failed` |
//! | `Internal` | 500 | `internal` |
//!
//! `Conflict` renders exactly like a credentials failure so signup does not
//! reveal which emails have accounts. `Internal` never exposes its detail;
//! the detail is logged instead.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Message shared by every credentials-related failure.
pub const INVALID_CREDENTIALS: &str = "Invalid credentials";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("account already exists")]
    Conflict,

    #[error("invalid credentials")]
    Auth,

    #[error("not signed in")]
    Unauthenticated,

    #[error("{0}")]
    Configuration(String),

    #[error("{0}")]
    Upload(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Conflict => StatusCode::BAD_REQUEST,
            AppError::Auth | AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::Configuration(_) | AppError::Upload(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) | AppError::Conflict => "bad_request",
            AppError::Auth | AppError::Unauthenticated => "unauthorized",
            AppError::Configuration(_) => "misconfigured",
            AppError::Upload(_) => "upload_failed",
            AppError::Internal(_) => "internal",
        }
    }

    fn public_message(&self) -> String {
        match self {
            AppError::Validation(m) | AppError::Configuration(m) | AppError::Upload(m) => {
                m.clone()
            }
            AppError::Conflict | AppError::Auth => INVALID_CREDENTIALS.to_string(),
            AppError::Unauthenticated => "Unauthorized".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Internal(e) => tracing::error!(error = ?e, "request failed"),
            AppError::Configuration(m) => tracing::error!(message = %m, "misconfigured"),
            AppError::Upload(m) => tracing::warn!(message = %m, "upload failed"),
            _ => {}
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code(),
                message: self.public_message(),
            },
        };
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_of(err: AppError) -> (StatusCode, serde_json::Value) {
        let resp = err.into_response();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn conflict_renders_like_a_credentials_failure() {
        let (status, body) = body_of(AppError::Conflict).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body,
            serde_json::json!({"error": {"code": "bad_request", "message": "Invalid credentials"}})
        );
    }

    #[tokio::test]
    async fn internal_detail_is_not_leaked() {
        let (status, body) = body_of(AppError::Internal(anyhow::anyhow!(
            "disk I/O error at /var/lib/tabi"
        )))
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["message"], "Internal server error");
    }
}
