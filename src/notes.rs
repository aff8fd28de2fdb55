//! Per-user freeform notes, behind a session.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub user_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// `POST /notes` body.
#[derive(Debug, Deserialize)]
pub struct NewNote {
    #[serde(default)]
    pub note: Option<String>,
}

/// All notes for `user_id`, newest first.
pub async fn list_notes(pool: &SqlitePool, user_id: &str) -> Result<Vec<Note>> {
    let rows = sqlx::query(
        "SELECT id, user_id, text, created_at FROM notes WHERE user_id = ? ORDER BY created_at DESC, rowid DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let created_at: String = row.get("created_at");
            Ok(Note {
                id: row.get("id"),
                user_id: row.get("user_id"),
                text: row.get("text"),
                created_at: DateTime::parse_from_rfc3339(&created_at)
                    .with_context(|| format!("corrupt created_at '{}'", created_at))?
                    .with_timezone(&Utc),
            })
        })
        .collect()
}

/// Store a note. The caller has already rejected blank text.
pub async fn add_note(pool: &SqlitePool, user_id: &str, text: &str) -> Result<Note> {
    let note = Note {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        text: text.to_string(),
        created_at: Utc::now(),
    };

    sqlx::query("INSERT INTO notes (id, user_id, text, created_at) VALUES (?, ?, ?, ?)")
        .bind(&note.id)
        .bind(&note.user_id)
        .bind(&note.text)
        .bind(note.created_at.to_rfc3339_opts(SecondsFormat::Micros, true))
        .execute(pool)
        .await?;

    Ok(note)
}
