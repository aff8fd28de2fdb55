//! Router-level tests: every request goes through `tower::ServiceExt::oneshot`
//! against a SQLite file in a temp directory.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use tabi::auth::SessionKeys;
use tabi::config::{BlobBackend, Config};
use tabi::server::{router, AppState};
use tabi::upload::{BlobStore, UploadError};

const BOUNDARY: &str = "tabi-test-boundary";

struct TestApp {
    _tmp: TempDir,
    state: AppState,
    app: Router,
}

impl TestApp {
    fn new() -> Self {
        Self::with_config(|_| {})
    }

    fn with_config(tweak: impl FnOnce(&mut Config)) -> Self {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::minimal(tmp.path().join("tabi.sqlite"));
        tweak(&mut config);
        let state = AppState::new(config, SessionKeys::new("test-secret"))
            .with_password_iterations(1_000);
        Self::from_state(tmp, state)
    }

    fn from_state(tmp: TempDir, state: AppState) -> Self {
        let app = router(state.clone());
        Self {
            _tmp: tmp,
            state,
            app,
        }
    }

    async fn send(&self, req: Request<Body>) -> (StatusCode, HeaderMap, Vec<u8>) {
        let resp = self.app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, headers, body.to_vec())
    }

    async fn json(&self, req: Request<Body>) -> (StatusCode, HeaderMap, Value) {
        let (status, headers, body) = self.send(req).await;
        let value = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body)
                .unwrap_or_else(|_| panic!("not JSON: {}", String::from_utf8_lossy(&body)))
        };
        (status, headers, value)
    }

    async fn user_count(&self) -> i64 {
        let pool = self.state.db.pool().await.unwrap();
        sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(pool)
            .await
            .unwrap()
    }

    /// Sign up and return the `Cookie` header value for the session.
    async fn signup(&self, email: &str, password: &str) -> String {
        let (status, headers, body) = self
            .json(post_json(
                "/auth/signup",
                json!({"email": email, "password": password}),
            ))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        session_cookie(&headers)
    }
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn session_cookie(headers: &HeaderMap) -> String {
    let set_cookie = headers
        .get(header::SET_COOKIE)
        .expect("Set-Cookie header")
        .to_str()
        .unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

fn multipart_upload(name: &str, content_type: &str, bytes: &[u8]) -> Request<Body> {
    let mut body = Vec::with_capacity(bytes.len() + 256);
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{n}\"\r\nContent-Type: {ct}\r\n\r\n",
            b = BOUNDARY,
            n = name,
            ct = content_type
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    Request::post("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

struct CountingStore {
    calls: AtomicUsize,
}

#[async_trait]
impl BlobStore for CountingStore {
    fn name(&self) -> &str {
        "counting"
    }

    async fn put(&self, key: &str, _ct: &str, _bytes: &[u8]) -> Result<String, UploadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("https://blobs.test/{}", key))
    }
}

// ============ /health ============

#[tokio::test]
async fn health_reports_version() {
    let app = TestApp::new();
    let (status, _, body) = app.json(get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

// ============ /trip ============

#[tokio::test]
async fn missing_trip_document_reads_as_empty() {
    let app = TestApp::new();
    let (status, _, body) = app.json(get("/trip")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"customDays": [], "userDataMap": {}}));
}

#[tokio::test]
async fn trip_save_then_load_returns_equal_json() {
    let app = TestApp::new();
    let snapshot = json!({
        "customDays": [
            {
                "date": "2025-03-10",
                "location": "Kyoto",
                "transportation": null,
                "accommodation": null
            },
            {
                "date": "2025-03-11",
                "location": "Nara",
                "transportation": {"type": "train", "route": "Kyoto → Nara"},
                "accommodation": "Ryokan Asukasou"
            },
            {
                "date": "2025-03-12",
                "location": "Osaka",
                "transportation": null,
                "accommodation": {
                    "name": "Keio",
                    "nights": 2,
                    "hannaRoom": {"dates": "Mar 12-14", "reference": "H-77", "pin": "0420"}
                }
            }
        ],
        "userDataMap": {
            "2025-03-10": {
                "notes": "Fushimi Inari at dawn",
                "attachments": [{
                    "id": "1741600000000",
                    "name": "jr-pass.pdf",
                    "url": "https://blobs.test/abc/jr-pass.pdf",
                    "type": "pdf",
                    "addedAt": "2025-03-10T06:00:00.000Z"
                }]
            },
            "2025-03-11": {"notes": "", "attachments": []}
        }
    });

    let (status, _, body) = app.json(post_json("/trip", snapshot.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true}));

    let (status, _, body) = app.json(get("/trip")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, snapshot);

    // A second save replaces the document wholesale.
    let replacement = json!({"customDays": [], "userDataMap": {}});
    app.json(post_json("/trip", replacement.clone())).await;
    let (_, _, body) = app.json(get("/trip")).await;
    assert_eq!(body, replacement);
}

#[tokio::test]
async fn malformed_trip_body_is_rejected() {
    let app = TestApp::new();
    let req = Request::post("/trip")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"customDays\": 42"))
        .unwrap();
    let (status, _, body) = app.json(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
}

// ============ /auth ============

#[tokio::test]
async fn signup_sets_session_cookie() {
    let app = TestApp::new();
    let (status, headers, body) = app
        .json(post_json(
            "/auth/signup",
            json!({"email": "kari@example.no", "password": "longenough"}),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "User created");

    let cookie = headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(cookie.starts_with("token="));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Strict"));
    assert!(cookie.contains("Max-Age=604800"));
    assert!(!cookie.contains("Secure"));
    assert_eq!(app.user_count().await, 1);
}

#[tokio::test]
async fn production_cookie_is_secure() {
    let app = TestApp::with_config(|c| c.server.production = true);
    let (_, headers, _) = app
        .json(post_json(
            "/auth/signup",
            json!({"email": "kari@example.no", "password": "longenough"}),
        ))
        .await;
    let cookie = headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(cookie.ends_with("; Secure"));
}

#[tokio::test]
async fn short_password_creates_no_account() {
    let app = TestApp::new();
    let (status, _, body) = app
        .json(post_json(
            "/auth/signup",
            json!({"email": "kari@example.no", "password": "short"}),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
    assert_eq!(app.user_count().await, 0);
}

#[tokio::test]
async fn astral_characters_count_twice_toward_password_length() {
    let app = TestApp::new();
    let (status, _, _) = app
        .json(post_json(
            "/auth/signup",
            json!({"email": "kari@example.no", "password": "🗾🍣🚄🏯"}),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(app.user_count().await, 1);
}

#[tokio::test]
async fn invalid_email_is_rejected() {
    let app = TestApp::new();
    let (status, _, body) = app
        .json(post_json(
            "/auth/signup",
            json!({"email": "not-an-email", "password": "longenough"}),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "Invalid email format");
    assert_eq!(app.user_count().await, 0);
}

#[tokio::test]
async fn duplicate_signup_looks_like_a_validation_failure() {
    let app = TestApp::new();
    app.signup("kari@example.no", "longenough").await;

    let (status, headers, body) = app
        .json(post_json(
            "/auth/signup",
            json!({"email": "kari@example.no", "password": "different-pass"}),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(headers.get(header::SET_COOKIE).is_none());
    assert_eq!(
        body,
        json!({"error": {"code": "bad_request", "message": "Invalid credentials"}})
    );

    let (_, _, validation) = app
        .json(post_json(
            "/auth/signup",
            json!({"email": "x@example.no", "password": "short"}),
        ))
        .await;
    let keys = |v: &Value| {
        let mut k: Vec<String> = v["error"].as_object().unwrap().keys().cloned().collect();
        k.sort();
        k
    };
    assert_eq!(keys(&body), keys(&validation));
    assert_eq!(app.user_count().await, 1);
}

#[tokio::test]
async fn login_failures_are_indistinguishable() {
    let app = TestApp::new();
    app.signup("kari@example.no", "longenough").await;

    let (wrong_status, _, wrong_password) = app
        .send(post_json(
            "/auth/login",
            json!({"email": "kari@example.no", "password": "not-the-one"}),
        ))
        .await;
    let (unknown_status, _, unknown_email) = app
        .send(post_json(
            "/auth/login",
            json!({"email": "nobody@example.no", "password": "longenough"}),
        ))
        .await;

    assert_eq!(wrong_status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_password, unknown_email);

    let (status, headers, body) = app
        .json(post_json(
            "/auth/login",
            json!({"email": "kari@example.no", "password": "longenough"}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Logged in");
    assert!(headers.get(header::SET_COOKIE).is_some());
}

#[tokio::test]
async fn login_with_missing_fields_is_bad_request() {
    let app = TestApp::new();
    let (status, _, body) = app
        .json(post_json("/auth/login", json!({"email": "kari@example.no"})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
}

// ============ /notes ============

#[tokio::test]
async fn notes_require_a_session() {
    let app = TestApp::new();
    let (status, _, body) = app.json(get("/notes")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "unauthorized");

    let forged = Request::get("/notes")
        .header(header::COOKIE, "token=abc.def.ghi")
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = app.json(forged).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn notes_are_per_user_newest_first() {
    let app = TestApp::new();
    let kari = app.signup("kari@example.no", "longenough").await;
    let ola = app.signup("ola@example.no", "longenough").await;

    let add = |cookie: &str, note: &str| {
        Request::post("/notes")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::COOKIE, cookie)
            .body(Body::from(json!({"note": note}).to_string()))
            .unwrap()
    };

    let (status, _, body) = app.json(add(&kari, "Book onsen")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (_, _, body) = app.json(add(&kari, "Buy Suica card")).await;
    let texts: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["text"].as_str().unwrap())
        .collect();
    assert_eq!(texts, vec!["Buy Suica card", "Book onsen"]);

    let (status, _, body) = app.json(add(&kari, "   ")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "Note cannot be empty");

    let list = Request::get("/notes")
        .header(header::COOKIE, &ola)
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = app.json(list).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

// ============ /upload ============

#[tokio::test]
async fn oversized_upload_is_rejected_before_the_backend() {
    let store = Arc::new(CountingStore {
        calls: AtomicUsize::new(0),
    });
    let app = TestApp::new();
    let app = TestApp::from_state(
        app._tmp,
        app.state.with_blob_store(store.clone()),
    );

    let big = vec![0u8; 60 * 1024 * 1024];
    let (status, _, body) = app
        .json(multipart_upload("scan.pdf", "application/pdf", &big))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
    assert_eq!(store.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unsupported_type_is_rejected_before_the_backend() {
    let store = Arc::new(CountingStore {
        calls: AtomicUsize::new(0),
    });
    let app = TestApp::new();
    let app = TestApp::from_state(app._tmp, app.state.with_blob_store(store.clone()));

    let (status, _, _) = app
        .json(multipart_upload("itinerary.docx", "application/msword", b"doc"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, body) = app
        .json(multipart_upload("ticket.pdf", "application/pdf", b"%PDF-1.7"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "ticket.pdf");
    assert_eq!(store.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn upload_without_file_field_is_bad_request() {
    let app = TestApp::new();
    let req = Request::post("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"other\"\r\n\r\nx\r\n--{b}--\r\n",
            b = BOUNDARY
        )))
        .unwrap();
    let (status, _, body) = app.json(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "No file uploaded");
}

#[tokio::test]
async fn disabled_backend_is_misconfigured() {
    let app = TestApp::new();
    let (status, _, body) = app
        .json(multipart_upload("photo.jpg", "image/jpeg", b"jpeg"))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], "misconfigured");
}

#[tokio::test]
async fn filesystem_upload_is_served_back() {
    let app = TestApp::with_config(|c| {
        let blobs = c.db.path.parent().unwrap().join("blobs");
        c.blob.backend = BlobBackend::Filesystem;
        c.blob.root = Some(blobs);
        c.blob.public_base_url = Some("http://127.0.0.1:7340/files".into());
    });

    let (status, _, body) = app
        .json(multipart_upload("Boarding Pass.png", "image/png", b"fake png bytes"))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["name"], "Boarding Pass.png");

    let url = body["url"].as_str().unwrap();
    let key = url.strip_prefix("http://127.0.0.1:7340/files/").unwrap();
    assert!(key.ends_with("/Boarding_Pass.png"));

    let (status, _, bytes) = app.send(get(&format!("/files/{}", key))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, b"fake png bytes");
}
