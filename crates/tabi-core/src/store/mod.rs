//! Storage abstraction for the remote trip document.
//!
//! The [`TripDocumentStore`] trait is the server side of trip sync: one
//! document per user identifier, created on first save and replaced
//! wholesale on every save after that. The store has no merge semantics of
//! its own.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{TripDocument, TripSnapshot};

/// Snapshot store keyed by user identifier.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`find`](TripDocumentStore::find) | Load the document, `None` if never saved |
/// | [`upsert`](TripDocumentStore::upsert) | Replace (or create) the document |
#[async_trait]
pub trait TripDocumentStore: Send + Sync {
    /// Load the document for `user_id`.
    async fn find(&self, user_id: &str) -> Result<Option<TripDocument>>;

    /// Replace the document for `user_id` with `snapshot`, stamping
    /// `updatedAt` with the current time. Returns the stored document.
    async fn upsert(&self, user_id: &str, snapshot: &TripSnapshot) -> Result<TripDocument>;

    /// Load the snapshot for `user_id`, empty when no document exists.
    async fn load_snapshot(&self, user_id: &str) -> Result<TripSnapshot> {
        Ok(self
            .find(user_id)
            .await?
            .map(|doc| doc.snapshot())
            .unwrap_or_default())
    }
}
