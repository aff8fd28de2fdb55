//! Email/password accounts and signed session tokens.
//!
//! # Passwords
//!
//! Stored as `pbkdf2-sha256$<iterations>$<salt hex>$<hash hex>` with a
//! 16-byte random salt. Hashing runs on the blocking pool so a signup does
//! not stall other requests.
//!
//! # Sessions
//!
//! A session is a compact HS256 JWT (`header.payload.signature`, each part
//! base64url without padding) whose payload is `{userId, iat, exp}`. Tokens
//! live for seven days and travel in an HTTP-only `token` cookie.
//! [`SessionKeys::verify`] is total: a malformed, forged, or expired token
//! yields `None`, never an error.
//!
//! # Enumeration
//!
//! Signup with an existing email and login with a wrong password or an
//! unknown email all surface the same "Invalid credentials" message.

use std::sync::OnceLock;

use anyhow::Context;
use axum::http::HeaderMap;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use sqlx::{Row, SqlitePool};
use subtle::ConstantTimeEq;

use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

pub const SESSION_COOKIE: &str = "token";
pub const SESSION_TTL_SECS: i64 = 60 * 60 * 24 * 7;
pub const MIN_PASSWORD_LEN: usize = 8;
pub const DEFAULT_PBKDF2_ITERATIONS: u32 = 100_000;

const HASH_SCHEME: &str = "pbkdf2-sha256";
const HASH_LEN: usize = 32;

// ============ Session tokens ============

/// Token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

/// HMAC key used to sign and verify session tokens.
#[derive(Clone)]
pub struct SessionKeys {
    secret: Vec<u8>,
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeys").finish_non_exhaustive()
    }
}

impl SessionKeys {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Read the signing secret from `JWT_SECRET`.
    pub fn from_env() -> anyhow::Result<Self> {
        let secret = std::env::var("JWT_SECRET")
            .context("JWT_SECRET environment variable not set")?;
        if secret.is_empty() {
            anyhow::bail!("JWT_SECRET must not be empty");
        }
        Ok(Self::new(secret))
    }

    /// Issue a token for `user_id` valid for [`SESSION_TTL_SECS`] from `now`.
    pub fn issue(&self, user_id: &str, now: i64) -> String {
        let header = Header {
            alg: "HS256".to_string(),
            typ: "JWT".to_string(),
        };
        let claims = Claims {
            user_id: user_id.to_string(),
            iat: now,
            exp: now + SESSION_TTL_SECS,
        };
        // Serializing these two plain structs cannot fail.
        let header_json = serde_json::to_vec(&header).unwrap_or_default();
        let claims_json = serde_json::to_vec(&claims).unwrap_or_default();

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header_json),
            URL_SAFE_NO_PAD.encode(claims_json)
        );
        let signature = URL_SAFE_NO_PAD.encode(self.sign(signing_input.as_bytes()));
        format!("{}.{}", signing_input, signature)
    }

    /// Verify a token at time `now`. Any defect means unauthenticated.
    pub fn verify(&self, token: &str, now: i64) -> Option<Claims> {
        let mut parts = token.split('.');
        let (header_b64, claims_b64, sig_b64) = (parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() {
            return None;
        }

        let header: Header = serde_json::from_slice(&URL_SAFE_NO_PAD.decode(header_b64).ok()?).ok()?;
        if header.alg != "HS256" {
            return None;
        }

        let signature = URL_SAFE_NO_PAD.decode(sig_b64).ok()?;
        let mut mac = self.mac();
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(claims_b64.as_bytes());
        mac.verify_slice(&signature).ok()?;

        let claims: Claims = serde_json::from_slice(&URL_SAFE_NO_PAD.decode(claims_b64).ok()?).ok()?;
        if claims.exp <= now || claims.user_id.is_empty() {
            return None;
        }
        Some(claims)
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size")
    }

    fn sign(&self, data: &[u8]) -> Vec<u8> {
        let mut mac = self.mac();
        mac.update(data);
        mac.finalize().into_bytes().to_vec()
    }
}

/// `Set-Cookie` value carrying a session token.
pub fn session_cookie(token: &str, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}",
        SESSION_COOKIE, token, SESSION_TTL_SECS
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// The session token from the request's `Cookie` headers, if any.
pub fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(axum::http::header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
}

// ============ Passwords ============

pub fn hash_password(password: &str, iterations: u32) -> String {
    let salt = *uuid::Uuid::new_v4().as_bytes();
    let hash = derive(password, &salt, iterations);
    format!(
        "{}${}${}${}",
        HASH_SCHEME,
        iterations,
        hex::encode(salt),
        hex::encode(hash)
    )
}

/// Check `password` against a stored hash. Unparseable hashes never match.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');
    let (Some(scheme), Some(iterations), Some(salt), Some(expected), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };
    if scheme != HASH_SCHEME {
        return false;
    }
    let (Ok(iterations), Ok(salt), Ok(expected)) =
        (iterations.parse::<u32>(), hex::decode(salt), hex::decode(expected))
    else {
        return false;
    };
    if iterations == 0 || expected.len() != HASH_LEN {
        return false;
    }
    let actual = derive(password, &salt, iterations);
    actual.ct_eq(expected.as_slice()).into()
}

fn derive(password: &str, salt: &[u8], iterations: u32) -> [u8; HASH_LEN] {
    let mut out = [0u8; HASH_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut out);
    out
}

// ============ Accounts ============

/// Signup/login request body. Missing fields deserialize as empty.
#[derive(Debug, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

pub fn is_valid_email(email: &str) -> bool {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL
        .get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"))
        .is_match(email)
}

fn require_fields(creds: &Credentials) -> Result<(), AppError> {
    if creds.email.is_empty() || creds.password.is_empty() {
        return Err(AppError::validation("Email and password are required"));
    }
    Ok(())
}

/// Length in UTF-16 code units, as browsers count it. Characters outside
/// the Basic Multilingual Plane count twice.
pub fn password_length(password: &str) -> usize {
    password.encode_utf16().count()
}

/// Create an account. Returns the new user id.
pub async fn signup(
    pool: &SqlitePool,
    creds: &Credentials,
    iterations: u32,
) -> Result<String, AppError> {
    require_fields(creds)?;
    if !is_valid_email(&creds.email) {
        return Err(AppError::validation("Invalid email format"));
    }
    if password_length(&creds.password) < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    let existing = sqlx::query("SELECT id FROM users WHERE email = ?")
        .bind(&creds.email)
        .fetch_optional(pool)
        .await
        .context("failed to look up user")?;
    if existing.is_some() {
        return Err(AppError::Conflict);
    }

    let password = creds.password.clone();
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password, iterations))
        .await
        .context("password hashing task failed")?;

    let user_id = uuid::Uuid::new_v4().to_string();
    let inserted = sqlx::query(
        "INSERT INTO users (id, email, password_hash, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(&user_id)
    .bind(&creds.email)
    .bind(&password_hash)
    .bind(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true))
    .execute(pool)
    .await;

    match inserted {
        Ok(_) => Ok(user_id),
        // Lost a race with a concurrent signup for the same email.
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(AppError::Conflict),
        Err(e) => Err(anyhow::Error::new(e).context("failed to create user").into()),
    }
}

/// Check credentials. Returns the user id.
pub async fn login(pool: &SqlitePool, creds: &Credentials) -> Result<String, AppError> {
    require_fields(creds)?;

    let row = sqlx::query("SELECT id, password_hash FROM users WHERE email = ?")
        .bind(&creds.email)
        .fetch_optional(pool)
        .await
        .context("failed to look up user")?;
    let Some(row) = row else {
        return Err(AppError::Auth);
    };

    let user_id: String = row.get("id");
    let stored: String = row.get("password_hash");
    let password = creds.password.clone();
    let valid = tokio::task::spawn_blocking(move || verify_password(&password, &stored))
        .await
        .context("password verification task failed")?;

    if valid {
        Ok(user_id)
    } else {
        Err(AppError::Auth)
    }
}
