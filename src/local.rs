//! Local annotation store: the client's durable copy of trip state.
//!
//! Two keys, each a JSON file under `[sync].local_dir`:
//!
//! | Key | File | Content |
//! |-----|------|---------|
//! | `tripUserData` | `tripUserData.json` | `userDataMap` |
//! | `tripCustomDays` | `tripCustomDays.json` | `customDays` |
//!
//! Writes are atomic (temp file in the same directory, then rename), so a
//! crash mid-write leaves the previous file intact. The two keys are
//! written separately, custom days first; a failure between them leaves
//! the new days with the previous annotations. A file that exists but
//! does not parse is discarded with a warning and read as empty. Any other
//! I/O error is returned to the caller.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;

use tabi_core::models::{ItineraryDay, UserDataMap};
use tabi_core::state::TripState;

pub const USER_DATA_KEY: &str = "tripUserData";
pub const CUSTOM_DAYS_KEY: &str = "tripCustomDays";

/// Synchronous key-value persistence for [`TripState`].
pub trait LocalStore: Send + Sync {
    /// Read the stored state. Missing keys read as empty.
    fn load(&self) -> Result<TripState>;

    /// Overwrite both keys with `state`.
    fn save(&self, state: &TripState) -> Result<()>;
}

/// File-backed store, one JSON file per key.
pub struct FileLocalStore {
    dir: PathBuf,
}

impl FileLocalStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    fn read_key<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T> {
        let path = self.path_for(key);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(T::default()),
            Err(e) => {
                return Err(e).with_context(|| format!("cannot read {}", path.display()));
            }
        };
        match serde_json::from_str(&content) {
            Ok(value) => Ok(value),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "discarding unreadable local data"
                );
                Ok(T::default())
            }
        }
    }

    fn write_key<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let path = self.path_for(key);
        let json = serde_json::to_vec_pretty(value)?;
        atomic_write(&path, &json).with_context(|| format!("cannot write {}", path.display()))
    }
}

impl LocalStore for FileLocalStore {
    fn load(&self) -> Result<TripState> {
        let user_data_map: UserDataMap = self.read_key(USER_DATA_KEY)?;
        let custom_days: Vec<ItineraryDay> = self.read_key(CUSTOM_DAYS_KEY)?;
        Ok(TripState {
            custom_days,
            user_data_map,
        })
    }

    fn save(&self, state: &TripState) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("cannot create {}", self.dir.display()))?;
        // Days before annotations: if the second write fails, disk holds a
        // day with stale notes rather than notes for a day that is missing.
        self.write_key(CUSTOM_DAYS_KEY, &state.custom_days)?;
        self.write_key(USER_DATA_KEY, &state.user_data_map)?;
        Ok(())
    }
}

fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// In-memory store for tests and embedding. Writes can be made to fail.
#[derive(Default)]
pub struct MemoryLocalStore {
    state: Mutex<TripState>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: TripState) -> Self {
        Self {
            state: Mutex::new(state),
            ..Self::default()
        }
    }

    /// Make every subsequent `save` fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn stored(&self) -> TripState {
        self.state
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl LocalStore for MemoryLocalStore {
    fn load(&self) -> Result<TripState> {
        Ok(self.stored())
    }

    fn save(&self, state: &TripState) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("local storage quota exceeded");
        }
        let mut guard = self
            .state
            .lock()
            .map_err(|_| anyhow::anyhow!("local store lock poisoned"))?;
        *guard = state.clone();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
