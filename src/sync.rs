//! Sync coordinator: one in-memory [`TripState`], mirrored to the local
//! store on every mutation and pushed to the remote after a quiet period.
//!
//! # Lifecycle
//!
//! 1. [`SyncCoordinator::open`] reads the local store. The coordinator is
//!    usable immediately.
//! 2. [`SyncCoordinator::reconcile`] reads the remote once and merges it in,
//!    remote winning per day and per user-data entry. Failure leaves local
//!    state alone and is not retried.
//! 3. Each mutation validates against a copy of the state, writes the copy
//!    locally, then swaps it in. A push of the whole snapshot is scheduled
//!    `debounce` after the most recent mutation; a newer mutation restarts
//!    the timer.
//! 4. [`SyncCoordinator::flush`] skips the wait and pushes now.
//!
//! # Failure
//!
//! A local write failure is fatal: the mutation is rejected and every
//! later mutation, reconcile, or push fails with
//! [`SyncError::LocalUnavailable`]. The published `LocalFailed` status is
//! never replaced. A remote failure only changes the published
//! [`SyncStatus`].
//!
//! # Ordering
//!
//! A push that has started always completes, even after a newer mutation.
//! Pushes carry no sequence number, so a slow earlier push can land after a
//! later one and overwrite it remotely.
//!
//! Mutations spawn Tokio tasks and must run inside a runtime.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use tabi_core::catalog::Catalog;
use tabi_core::models::{Attachment, AttachmentKind, DayUserData, ItineraryDay, TripSnapshot};
use tabi_core::state::{next_attachment_id, position_of, Applied, Mutation, StateError, TripState};

use crate::local::LocalStore;
use crate::remote::RemoteTrip;
use crate::upload::StoredBlob;

/// Published on the coordinator's watch channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    Idle,
    /// A push is scheduled.
    Pending,
    Syncing,
    Synced,
    SyncFailed(String),
    /// Sticky. No further mutations are accepted.
    LocalFailed(String),
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("remote sync failed: {0:#}")]
    Remote(anyhow::Error),

    #[error("local storage failed: {0:#}")]
    LocalStore(anyhow::Error),

    #[error("{0}")]
    Validation(String),

    #[error("no day dated {0} in this trip")]
    UnknownDay(String),

    #[error("local storage unavailable after an earlier failure: {0}")]
    LocalUnavailable(String),
}

impl From<StateError> for SyncError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::UnknownDay(date) => SyncError::UnknownDay(date),
            other => SyncError::Validation(other.to_string()),
        }
    }
}

struct Data {
    state: TripState,
    current_day: usize,
    /// Set while a push is scheduled; cleared by the timer when it fires.
    timer: Option<JoinHandle<()>>,
    generation: u64,
    in_flight: Option<JoinHandle<()>>,
    local_failed: Option<String>,
}

impl Data {
    fn push_scheduled(&self) -> bool {
        self.timer.is_some()
    }
}

struct Inner {
    catalog: Arc<Catalog>,
    local: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteTrip>,
    debounce: Duration,
    data: Mutex<Data>,
    status: watch::Sender<SyncStatus>,
}

/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SyncCoordinator {
    inner: Arc<Inner>,
}

impl SyncCoordinator {
    /// Load local state. Does not touch the remote.
    pub fn open(
        catalog: Arc<Catalog>,
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteTrip>,
        debounce: Duration,
    ) -> Result<Self, SyncError> {
        let state = local.load().map_err(SyncError::LocalStore)?;
        let (status, _) = watch::channel(SyncStatus::Idle);
        tracing::debug!(
            custom_days = state.custom_days.len(),
            annotated_days = state.user_data_map.len(),
            "loaded local trip state"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                catalog,
                local,
                remote,
                debounce,
                data: Mutex::new(Data {
                    state,
                    current_day: 0,
                    timer: None,
                    generation: 0,
                    in_flight: None,
                    local_failed: None,
                }),
                status,
            }),
        })
    }

    /// Merge the remote snapshot into local state and persist the result.
    pub async fn reconcile(&self) -> Result<(), SyncError> {
        let inner = &self.inner;
        inner.ensure_local_available()?;
        inner.publish(SyncStatus::Syncing);

        let remote = match inner.remote.load().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(error = %format!("{:#}", e), "could not load remote trip");
                inner.publish(SyncStatus::SyncFailed(format!("{:#}", e)));
                return Err(SyncError::Remote(e));
            }
        };

        let mut data = inner.lock();
        if let Some(msg) = &data.local_failed {
            return Err(SyncError::LocalUnavailable(msg.clone()));
        }

        let selected = data
            .state
            .days(&inner.catalog)
            .get(data.current_day)
            .map(|d| d.date.clone());

        let mut next = data.state.clone();
        next.merge_remote(remote);
        inner.persist_locally(&mut data, &next)?;
        data.state = next;

        if let Some(date) = selected {
            let days = data.state.days(&inner.catalog);
            if let Some(index) = position_of(&days, &date) {
                data.current_day = index;
            }
        }

        let status = if data.push_scheduled() {
            SyncStatus::Pending
        } else {
            SyncStatus::Synced
        };
        inner.publish(status);
        tracing::info!(
            custom_days = data.state.custom_days.len(),
            annotated_days = data.state.user_data_map.len(),
            "reconciled with remote"
        );
        Ok(())
    }

    /// Run [`reconcile`](Self::reconcile) in the background. Mutations may
    /// proceed while it runs.
    pub fn spawn_reconcile(&self) -> JoinHandle<Result<(), SyncError>> {
        let this = self.clone();
        tokio::spawn(async move { this.reconcile().await })
    }

    pub fn set_notes(&self, date: &str, notes: impl Into<String>) -> Result<(), SyncError> {
        let notes = notes.into();
        self.mutate(|_| Mutation::SetNotes {
            date: date.to_string(),
            notes,
        })
        .map(|_| ())
    }

    /// Record an uploaded file on `date`. Call only after the upload
    /// succeeded.
    pub fn add_attachment(
        &self,
        date: &str,
        file: StoredBlob,
        kind: AttachmentKind,
    ) -> Result<Attachment, SyncError> {
        let now = Utc::now();
        let added_at = now.to_rfc3339_opts(SecondsFormat::Millis, true);
        let mut added = None;
        self.mutate(|state| {
            let existing = state.user_data(date).attachments;
            let attachment = Attachment {
                id: next_attachment_id(&existing, now.timestamp_millis()),
                name: file.name,
                url: file.url,
                kind,
                added_at,
            };
            added = Some(attachment.clone());
            Mutation::AddAttachment {
                date: date.to_string(),
                attachment,
            }
        })?;
        added.ok_or_else(|| SyncError::Validation("attachment was not built".to_string()))
    }

    /// Remove an attachment. Unknown ids are a no-op.
    pub fn remove_attachment(&self, date: &str, id: &str) -> Result<(), SyncError> {
        self.mutate(|_| Mutation::RemoveAttachment {
            date: date.to_string(),
            id: id.to_string(),
        })
        .map(|_| ())
    }

    /// Add a custom day and select it. Returns its index in the sorted
    /// day list.
    pub fn add_day(&self, day: ItineraryDay) -> Result<usize, SyncError> {
        let date = day.date.clone();
        self.mutate(|_| Mutation::AddDay(day))?;
        let data = self.inner.lock();
        position_of(&data.state.days(&self.inner.catalog), &date)
            .ok_or(SyncError::UnknownDay(date))
    }

    pub fn select_day(&self, index: usize) -> Result<(), SyncError> {
        let mut data = self.inner.lock();
        let count = data.state.days(&self.inner.catalog).len();
        if index >= count {
            return Err(SyncError::Validation(format!(
                "day index {} out of range (trip has {} days)",
                index, count
            )));
        }
        data.current_day = index;
        Ok(())
    }

    /// Catalog and custom days, date-sorted.
    pub fn days(&self) -> Vec<ItineraryDay> {
        self.inner.lock().state.days(&self.inner.catalog)
    }

    pub fn current_day(&self) -> usize {
        self.inner.lock().current_day
    }

    pub fn user_data(&self, date: &str) -> DayUserData {
        self.inner.lock().state.user_data(date)
    }

    pub fn snapshot(&self) -> TripSnapshot {
        self.inner.lock().state.snapshot()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.inner.catalog
    }

    pub fn status(&self) -> SyncStatus {
        self.inner.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.inner.status.subscribe()
    }

    /// Cancel a scheduled push and push now. Waits for a push already in
    /// flight first. Does nothing when no push is due.
    pub async fn flush(&self) -> Result<(), SyncError> {
        let (due, in_flight) = {
            let mut data = self.inner.lock();
            let due = data.push_scheduled();
            if let Some(timer) = data.timer.take() {
                timer.abort();
                // A timer already past its sleep must not push as well.
                data.generation += 1;
            }
            (due, data.in_flight.take())
        };
        if let Some(handle) = in_flight {
            let _ = handle.await;
        }
        if due {
            self.push_now().await
        } else {
            Ok(())
        }
    }

    /// Push the current snapshot and wait for the result. Refused after a
    /// local write failure.
    pub async fn push_now(&self) -> Result<(), SyncError> {
        let snapshot = self.snapshot();
        Inner::push(&self.inner, snapshot).await
    }

    /// Validate `build`'s mutation against a copy, persist the copy, swap.
    fn mutate(&self, build: impl FnOnce(&TripState) -> Mutation) -> Result<Applied, SyncError> {
        let inner = &self.inner;
        let mut data = inner.lock();
        if let Some(msg) = &data.local_failed {
            return Err(SyncError::LocalUnavailable(msg.clone()));
        }

        let mutation = build(&data.state);
        let mut next = data.state.clone();
        let applied = next.apply(&inner.catalog, mutation)?;
        if applied == Applied::Unchanged {
            return Ok(applied);
        }

        inner.persist_locally(&mut data, &next)?;
        data.state = next;

        if let Applied::DayAdded { date } = &applied {
            let days = data.state.days(&inner.catalog);
            if let Some(index) = position_of(&days, date) {
                data.current_day = index;
            }
        }

        Inner::schedule_push(inner, &mut data);
        Ok(applied)
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Data> {
        self.data.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn ensure_local_available(&self) -> Result<(), SyncError> {
        match &self.lock().local_failed {
            Some(msg) => Err(SyncError::LocalUnavailable(msg.clone())),
            None => Ok(()),
        }
    }

    /// Publish `status` unless a local failure has already been published.
    fn publish(&self, status: SyncStatus) {
        self.status.send_if_modified(|current| {
            if matches!(current, SyncStatus::LocalFailed(_)) {
                return false;
            }
            *current = status;
            true
        });
    }

    fn persist_locally(&self, data: &mut Data, next: &TripState) -> Result<(), SyncError> {
        if let Err(e) = self.local.save(next) {
            let msg = format!("{:#}", e);
            tracing::error!(error = %msg, "local write failed; refusing further changes");
            data.local_failed = Some(msg.clone());
            if let Some(timer) = data.timer.take() {
                timer.abort();
            }
            self.status.send_replace(SyncStatus::LocalFailed(msg));
            return Err(SyncError::LocalStore(e));
        }
        Ok(())
    }

    /// Restart the quiet period. The snapshot is taken when the timer
    /// fires, so the push carries the latest state.
    fn schedule_push(this: &Arc<Self>, data: &mut Data) {
        if let Some(timer) = data.timer.take() {
            timer.abort();
        }
        this.publish(SyncStatus::Pending);
        data.generation += 1;
        let generation = data.generation;

        let inner = Arc::clone(this);
        data.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(inner.debounce).await;
            let mut data = inner.lock();
            // Superseded while waiting for the lock; the newer timer pushes.
            if data.generation != generation {
                return;
            }
            data.timer = None;
            let snapshot = data.state.snapshot();
            // Detached: aborting the timer must not cancel a started push.
            let pusher = Arc::clone(&inner);
            data.in_flight = Some(tokio::spawn(async move {
                let _ = Inner::push(&pusher, snapshot).await;
            }));
        }));
    }

    async fn push(this: &Arc<Self>, snapshot: TripSnapshot) -> Result<(), SyncError> {
        this.ensure_local_available()?;
        this.publish(SyncStatus::Syncing);
        let result = this.remote.save(&snapshot).await;

        let data = this.lock();
        if data.local_failed.is_some() {
            return result.map_err(SyncError::Remote);
        }
        let scheduled = data.push_scheduled();
        match result {
            Ok(()) => {
                tracing::info!(
                    custom_days = snapshot.custom_days.len(),
                    annotated_days = snapshot.user_data_map.len(),
                    "pushed trip to remote"
                );
                this.publish(if scheduled {
                    SyncStatus::Pending
                } else {
                    SyncStatus::Synced
                });
                Ok(())
            }
            Err(e) => {
                let msg = format!("{:#}", e);
                tracing::warn!(error = %msg, "remote push failed");
                this.publish(SyncStatus::SyncFailed(msg));
                Err(SyncError::Remote(e))
            }
        }
    }
}
