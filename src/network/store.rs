//! Session Store
//!
//! Persistence behind the session manager. The manager keeps its own
//! in-memory cache and only needs atomic get/put of a session's bundle plus a
//! full listing to rebuild the leaderboard on startup.
//!
//! - [`MemoryStore`]: no durability, used by tests and as the fallback.
//! - [`JsonFileStore`]: whole-snapshot JSON file written on `flush`.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};

use serde::{Serialize, Deserialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info};

use crate::game::leaderboard::LeaderboardEntry;
use crate::game::state::{ProgressionState, SessionId};

/// Snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Everything persisted for one session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Progression.
    pub state: ProgressionState,
    /// Highest validated score the session has placed.
    #[serde(default)]
    pub best_entry: Option<LeaderboardEntry>,
}

impl SessionRecord {
    /// Record for a state that has never placed a score.
    pub fn new(state: ProgressionState) -> Self {
        Self { state, best_entry: None }
    }
}

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// File I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Snapshot could not be encoded or decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Snapshot written by an incompatible version.
    #[error("Unsupported snapshot version {0}")]
    UnsupportedVersion(u32),

    /// A writer panicked while holding the lock.
    #[error("Store lock poisoned")]
    Poisoned,
}

/// Persistence contract.
pub trait SessionStore: Send + Sync {
    /// Fetch a session's record.
    fn get(&self, id: &SessionId) -> Result<Option<SessionRecord>, StoreError>;

    /// Insert or replace a session's record.
    fn put(&self, record: SessionRecord) -> Result<(), StoreError>;

    /// Is a record stored under `id`?
    fn contains(&self, id: &SessionId) -> Result<bool, StoreError> {
        Ok(self.get(id)?.is_some())
    }

    /// Every stored record.
    fn list_all(&self) -> Result<Vec<SessionRecord>, StoreError>;

    /// Make pending writes durable. No-op for volatile stores.
    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

// =============================================================================
// MEMORY STORE
// =============================================================================

/// Volatile store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<SessionId, SessionRecord>>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, id: &SessionId) -> Result<Option<SessionRecord>, StoreError> {
        let records = self.records.read().map_err(|_| StoreError::Poisoned)?;
        Ok(records.get(id).cloned())
    }

    fn put(&self, record: SessionRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().map_err(|_| StoreError::Poisoned)?;
        records.insert(record.state.session_id.clone(), record);
        Ok(())
    }

    fn contains(&self, id: &SessionId) -> Result<bool, StoreError> {
        let records = self.records.read().map_err(|_| StoreError::Poisoned)?;
        Ok(records.contains_key(id))
    }

    fn list_all(&self) -> Result<Vec<SessionRecord>, StoreError> {
        let records = self.records.read().map_err(|_| StoreError::Poisoned)?;
        Ok(records.values().cloned().collect())
    }
}

// =============================================================================
// JSON FILE STORE
// =============================================================================

#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    sessions: BTreeMap<SessionId, SessionRecord>,
}

/// Store backed by a single JSON snapshot file.
///
/// Records live in memory. `flush` writes a synced temporary file in the
/// same directory and renames it over the snapshot, so a crash mid-write
/// keeps the previous snapshot.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    records: RwLock<BTreeMap<SessionId, SessionRecord>>,
    dirty: AtomicBool,
    /// Held for a whole flush so a second flush waits for the first.
    flush_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open `path`, loading its snapshot if the file exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        let records = match fs::read(&path) {
            Ok(bytes) => {
                let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
                if snapshot.version != SNAPSHOT_VERSION {
                    return Err(StoreError::UnsupportedVersion(snapshot.version));
                }
                info!(path = %path.display(), sessions = snapshot.sessions.len(), "Loaded snapshot");
                snapshot.sessions
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No snapshot, starting empty");
                BTreeMap::new()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            records: RwLock::new(records),
            dirty: AtomicBool::new(false),
            flush_lock: Mutex::new(()),
        })
    }

    /// Snapshot file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unflushed writes pending?
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }
}

impl SessionStore for JsonFileStore {
    fn get(&self, id: &SessionId) -> Result<Option<SessionRecord>, StoreError> {
        let records = self.records.read().map_err(|_| StoreError::Poisoned)?;
        Ok(records.get(id).cloned())
    }

    fn put(&self, record: SessionRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().map_err(|_| StoreError::Poisoned)?;
        records.insert(record.state.session_id.clone(), record);
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    fn contains(&self, id: &SessionId) -> Result<bool, StoreError> {
        let records = self.records.read().map_err(|_| StoreError::Poisoned)?;
        Ok(records.contains_key(id))
    }

    fn list_all(&self) -> Result<Vec<SessionRecord>, StoreError> {
        let records = self.records.read().map_err(|_| StoreError::Poisoned)?;
        Ok(records.values().cloned().collect())
    }

    fn flush(&self) -> Result<(), StoreError> {
        let _guard = self.flush_lock.lock().map_err(|_| StoreError::Poisoned)?;
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        let bytes = {
            let records = self.records.read().map_err(|_| StoreError::Poisoned)?;
            let snapshot = Snapshot { version: SNAPSHOT_VERSION, sessions: records.clone() };
            serde_json::to_vec_pretty(&snapshot)?
        };

        if let Err(e) = write_snapshot(&self.path, &bytes) {
            // Retry on the next flush
            self.dirty.store(true, Ordering::Release);
            return Err(e.into());
        }

        debug!(path = %self.path.display(), bytes = bytes.len(), "Snapshot written");
        Ok(())
    }
}

/// Write `bytes` to `path` through a synced temporary file and a rename.
fn write_snapshot(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
