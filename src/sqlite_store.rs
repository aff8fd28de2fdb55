//! SQLite-backed [`TripDocumentStore`] implementation.
//!
//! Each trip document is one row in `trip_documents`, keyed by user id. The
//! two mutable field groups are stored as JSON text exactly as serialized,
//! so a save followed by a load returns the same structures.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::Row;

use tabi_core::models::{TripDocument, TripSnapshot};
use tabi_core::store::TripDocumentStore;

use crate::db::Database;

pub struct SqliteTripStore {
    db: Arc<Database>,
}

impl SqliteTripStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TripDocumentStore for SqliteTripStore {
    async fn find(&self, user_id: &str) -> Result<Option<TripDocument>> {
        let pool = self.db.pool().await?;
        let row = sqlx::query(
            "SELECT custom_days_json, user_data_map_json, updated_at FROM trip_documents WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let custom_days_json: String = row.get("custom_days_json");
        let user_data_map_json: String = row.get("user_data_map_json");
        let updated_at: String = row.get("updated_at");

        Ok(Some(TripDocument {
            user_id: user_id.to_string(),
            custom_days: serde_json::from_str(&custom_days_json)
                .with_context(|| format!("corrupt customDays for {}", user_id))?,
            user_data_map: serde_json::from_str(&user_data_map_json)
                .with_context(|| format!("corrupt userDataMap for {}", user_id))?,
            updated_at: DateTime::parse_from_rfc3339(&updated_at)
                .with_context(|| format!("corrupt updated_at for {}", user_id))?
                .with_timezone(&Utc),
        }))
    }

    async fn upsert(&self, user_id: &str, snapshot: &TripSnapshot) -> Result<TripDocument> {
        let pool = self.db.pool().await?;
        let updated_at = Utc::now();
        let custom_days_json = serde_json::to_string(&snapshot.custom_days)?;
        let user_data_map_json = serde_json::to_string(&snapshot.user_data_map)?;

        sqlx::query(
            r#"
            INSERT INTO trip_documents (user_id, custom_days_json, user_data_map_json, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                custom_days_json = excluded.custom_days_json,
                user_data_map_json = excluded.user_data_map_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(&custom_days_json)
        .bind(&user_data_map_json)
        .bind(updated_at.to_rfc3339_opts(SecondsFormat::Micros, true))
        .execute(pool)
        .await?;

        Ok(TripDocument {
            user_id: user_id.to_string(),
            custom_days: snapshot.custom_days.clone(),
            user_data_map: snapshot.user_data_map.clone(),
            updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabi_core::models::{Accommodation, DayUserData, ItineraryDay};
    use tempfile::TempDir;

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let tmp = TempDir::new().unwrap();
        let db = Arc::new(Database::at(&tmp.path().join("tabi.sqlite")));
        let store = SqliteTripStore::new(db);

        assert!(store.find("default-user").await.unwrap().is_none());

        let mut snapshot = TripSnapshot::default();
        snapshot.custom_days.push(ItineraryDay {
            date: "2025-03-10".into(),
            location: "Kyoto".into(),
            transportation: None,
            accommodation: Some(Accommodation::Text("Ryokan Yachiyo".into())),
        });
        snapshot.user_data_map.insert(
            "2025-03-10".into(),
            DayUserData {
                notes: "Fushimi Inari at dawn".into(),
                attachments: vec![],
            },
        );

        store.upsert("default-user", &snapshot).await.unwrap();
        let loaded = store.load_snapshot("default-user").await.unwrap();
        assert_eq!(
            serde_json::to_string(&loaded).unwrap(),
            serde_json::to_string(&snapshot).unwrap()
        );

        // Second save replaces, it does not merge.
        store
            .upsert("default-user", &TripSnapshot::default())
            .await
            .unwrap();
        assert_eq!(
            store.load_snapshot("default-user").await.unwrap(),
            TripSnapshot::default()
        );
    }
}
