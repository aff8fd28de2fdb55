//! HTTP server.
//!
//! Hosts the remote trip document, accounts and notes, and attachment
//! uploads. Everything is JSON except `POST /upload` (multipart) and
//! `GET /files/{key}` (raw bytes, filesystem blob backend only).
//!
//! # Endpoints
//!
//! | Method | Path | Auth | Description |
//! |--------|------|------|-------------|
//! | `POST` | `/auth/signup` | — | Create an account, set the session cookie |
//! | `POST` | `/auth/login` | — | Check credentials, set the session cookie |
//! | `GET`  | `/notes` | cookie | The caller's notes, newest first |
//! | `POST` | `/notes` | cookie | Add a note, return the updated list |
//! | `GET`  | `/trip` | — | The trip snapshot (empty when never saved) |
//! | `POST` | `/trip` | — | Replace the trip snapshot |
//! | `POST` | `/upload` | — | Store an attachment, return `{url, name}` |
//! | `GET`  | `/health` | — | Health check (returns version) |
//!
//! The trip document is keyed by `[trip].user_id`, not by session: the
//! itinerary client has no login.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "Password must be at least 8 characters" } }
//! ```
//!
//! See [`crate::error::AppError`] for the status and code of each failure.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, FromRequestParts, Multipart, State},
    http::{header, request::Parts, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

use tabi_core::blob::MAX_UPLOAD_BYTES;
use tabi_core::models::TripSnapshot;
use tabi_core::store::TripDocumentStore;

use crate::auth::{self, Credentials, SessionKeys, DEFAULT_PBKDF2_ITERATIONS};
use crate::config::{BlobBackend, Config};
use crate::db::Database;
use crate::error::AppError;
use crate::notes::{self, NewNote, Note};
use crate::sqlite_store::SqliteTripStore;
use crate::upload::{BlobStore, StoredBlob, UploadFile, UploadService};

/// Multipart framing on top of the largest accepted file.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// Shared state for every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Arc<Database>,
    pub trips: Arc<dyn TripDocumentStore>,
    pub keys: SessionKeys,
    pub password_iterations: u32,
    pub uploads: Arc<UploadService>,
}

impl AppState {
    /// Wire the SQLite-backed stores and the configured blob backend. The
    /// database is opened on first use.
    pub fn new(config: Config, keys: SessionKeys) -> Self {
        let db = Arc::new(Database::new(&config));
        let uploads = Arc::new(UploadService::from_config(&config.blob));
        Self {
            trips: Arc::new(SqliteTripStore::new(db.clone())),
            config: Arc::new(config),
            db,
            keys,
            password_iterations: DEFAULT_PBKDF2_ITERATIONS,
            uploads,
        }
    }

    pub fn with_password_iterations(mut self, iterations: u32) -> Self {
        self.password_iterations = iterations;
        self
    }

    pub fn with_blob_store(mut self, store: Arc<dyn BlobStore>) -> Self {
        self.uploads = Arc::new(UploadService::new(store));
        self
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = Router::new()
        .route("/auth/signup", post(handle_signup))
        .route("/auth/login", post(handle_login))
        .route("/notes", get(handle_list_notes).post(handle_add_note))
        .route("/trip", get(handle_get_trip).post(handle_save_trip))
        .route(
            "/upload",
            post(handle_upload)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES as usize + MULTIPART_OVERHEAD)),
        )
        .route("/health", get(handle_health));

    if state.config.blob.backend == BlobBackend::Filesystem {
        if let Some(root) = &state.config.blob.root {
            app = app.nest_service("/files", ServeDir::new(root));
        }
    }

    app.layer(cors).with_state(state)
}

/// Start the server on `[server].bind` and run until Ctrl+C or SIGTERM.
///
/// Requires `JWT_SECRET` in the environment.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let keys = SessionKeys::from_env()?;
    let bind_addr = config.server.bind.clone();
    let state = AppState::new(config.clone(), keys);

    // Open the database before accepting traffic so a bad path fails fast.
    state.db.pool().await?;

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("cannot bind {}", bind_addr))?;
    tracing::info!(
        "tabi server listening on http://{} (blob backend: {:?})",
        bind_addr,
        config.blob.backend
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
        tracing::info!("received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                tracing::info!("received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

// ============ Session ============

/// The signed-in user, from the session cookie. Rejects with 401.
pub struct SessionUser(pub String);

impl FromRequestParts<AppState> for SessionUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = auth::token_from_headers(&parts.headers).ok_or(AppError::Unauthenticated)?;
        let claims = state
            .keys
            .verify(&token, Utc::now().timestamp())
            .ok_or(AppError::Unauthenticated)?;
        Ok(SessionUser(claims.user_id))
    }
}

/// Unwrap a JSON body, turning axum's rejection into our 400.
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| AppError::validation(rejection.body_text()))
}

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

// ============ POST /auth/signup, /auth/login ============

async fn handle_signup(
    State(state): State<AppState>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let creds = json_body(payload)?;
    let pool = state.db.pool().await?;
    let user_id = auth::signup(pool, &creds, state.password_iterations).await?;
    tracing::info!(%user_id, "account created");

    let token = state.keys.issue(&user_id, Utc::now().timestamp());
    Ok((
        StatusCode::CREATED,
        [(
            header::SET_COOKIE,
            auth::session_cookie(&token, state.config.server.production),
        )],
        Json(MessageResponse {
            message: "User created",
        }),
    ))
}

async fn handle_login(
    State(state): State<AppState>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let creds = json_body(payload)?;
    let pool = state.db.pool().await?;
    let user_id = auth::login(pool, &creds).await?;

    let token = state.keys.issue(&user_id, Utc::now().timestamp());
    Ok((
        [(
            header::SET_COOKIE,
            auth::session_cookie(&token, state.config.server.production),
        )],
        Json(MessageResponse {
            message: "Logged in",
        }),
    ))
}

// ============ /notes ============

async fn handle_list_notes(
    State(state): State<AppState>,
    SessionUser(user_id): SessionUser,
) -> Result<Json<Vec<Note>>, AppError> {
    let pool = state.db.pool().await?;
    Ok(Json(notes::list_notes(pool, &user_id).await?))
}

async fn handle_add_note(
    State(state): State<AppState>,
    SessionUser(user_id): SessionUser,
    payload: Result<Json<NewNote>, JsonRejection>,
) -> Result<Json<Vec<Note>>, AppError> {
    let body = json_body(payload)?;
    let text = body.note.unwrap_or_default();
    if text.trim().is_empty() {
        return Err(AppError::validation("Note cannot be empty"));
    }

    let pool = state.db.pool().await?;
    notes::add_note(pool, &user_id, &text).await?;
    Ok(Json(notes::list_notes(pool, &user_id).await?))
}

// ============ /trip ============

async fn handle_get_trip(State(state): State<AppState>) -> Result<Json<TripSnapshot>, AppError> {
    let snapshot = state
        .trips
        .load_snapshot(&state.config.trip.user_id)
        .await?;
    Ok(Json(snapshot))
}

#[derive(Serialize, Deserialize)]
struct SaveResponse {
    success: bool,
}

async fn handle_save_trip(
    State(state): State<AppState>,
    payload: Result<Json<TripSnapshot>, JsonRejection>,
) -> Result<Json<SaveResponse>, AppError> {
    let snapshot = json_body(payload)?;
    let doc = state
        .trips
        .upsert(&state.config.trip.user_id, &snapshot)
        .await?;
    tracing::debug!(
        user_id = %doc.user_id,
        custom_days = doc.custom_days.len(),
        annotated_days = doc.user_data_map.len(),
        "trip saved"
    );
    Ok(Json(SaveResponse { success: true }))
}

// ============ POST /upload ============

async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<StoredBlob>, AppError> {
    let mut file = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let name = field.file_name().unwrap_or("file").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field.bytes().await.map_err(multipart_error)?;
        file = Some(UploadFile {
            name,
            content_type,
            bytes: bytes.to_vec(),
        });
        break;
    }

    let file = file.ok_or_else(|| AppError::validation("No file uploaded"))?;
    Ok(Json(state.uploads.upload(file).await?))
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::validation(format!(
            "File is too large (max {} bytes)",
            MAX_UPLOAD_BYTES
        ))
    } else {
        AppError::validation(format!("Invalid upload: {}", err.body_text()))
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
