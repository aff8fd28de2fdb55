//! In-memory [`TripDocumentStore`] implementation for tests and embedding.
//!
//! Uses a `HashMap` behind `std::sync::RwLock`.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;

use crate::models::{TripDocument, TripSnapshot};

use super::TripDocumentStore;

pub struct InMemoryTripStore {
    docs: RwLock<HashMap<String, TripDocument>>,
}

impl InMemoryTripStore {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.docs.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryTripStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TripDocumentStore for InMemoryTripStore {
    async fn find(&self, user_id: &str) -> Result<Option<TripDocument>> {
        let docs = self.docs.read().map_err(|_| anyhow!("trip store lock poisoned"))?;
        Ok(docs.get(user_id).cloned())
    }

    async fn upsert(&self, user_id: &str, snapshot: &TripSnapshot) -> Result<TripDocument> {
        let doc = TripDocument {
            user_id: user_id.to_string(),
            custom_days: snapshot.custom_days.clone(),
            user_data_map: snapshot.user_data_map.clone(),
            updated_at: Utc::now(),
        };
        let mut docs = self.docs.write().map_err(|_| anyhow!("trip store lock poisoned"))?;
        docs.insert(user_id.to_string(), doc.clone());
        Ok(doc)
    }
}
