//! SQLite database connection management.
//!
//! [`Database`] is the process-wide handle to the connection pool. It is
//! constructed once (in `main`, or by a test) and injected wherever a pool
//! is needed; nothing reaches for a global.
//!
//! # Lazy initialization contract
//!
//! - Constructing a [`Database`] does no I/O.
//! - The first call to [`Database::pool`] creates the database file and its
//!   parent directories, opens the pool, and runs the idempotent schema
//!   migrations. Concurrent first callers wait on the same initialization.
//! - If initialization fails the error is returned and the next call tries
//!   again.
//! - Every later call returns the same pool. There is no teardown; the pool
//!   lives as long as the handle.
//!
//! # Write-Ahead Logging (WAL)
//!
//! WAL mode is enabled for all connections so request handlers can read
//! while another request writes.

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::sync::OnceCell;

use crate::config::Config;
use crate::migrate;

pub struct Database {
    path: PathBuf,
    pool: OnceCell<SqlitePool>,
}

impl Database {
    pub fn new(config: &Config) -> Self {
        Self::at(&config.db.path)
    }

    pub fn at(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            pool: OnceCell::new(),
        }
    }

    /// The shared pool, connecting and migrating on first use.
    pub async fn pool(&self) -> Result<&SqlitePool> {
        self.pool
            .get_or_try_init(|| async {
                let pool = connect(&self.path).await?;
                migrate::run_migrations(&pool).await?;
                tracing::info!(path = %self.path.display(), "database ready");
                Ok(pool)
            })
            .await
    }
}

/// Open a pool to the SQLite database at `db_path`.
///
/// - Creates the database file and parent directories if they don't exist.
/// - Enables WAL journal mode.
/// - Returns a pool with up to 5 connections.
pub async fn connect(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}
