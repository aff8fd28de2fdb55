use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Create the database (if needed) and apply the schema. Used by `tabi init`.
pub async fn init_database(config: &Config) -> Result<()> {
    let pool = db::connect(&config.db.path).await?;
    run_migrations(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Apply the schema. Every statement is idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // One snapshot document per user identifier
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS trip_documents (
            user_id TEXT PRIMARY KEY,
            custom_days_json TEXT NOT NULL DEFAULT '[]',
            user_data_map_json TEXT NOT NULL DEFAULT '{}',
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS notes (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            text TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_notes_user_created ON notes(user_id, created_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
