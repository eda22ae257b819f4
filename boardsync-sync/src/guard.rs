//! Idempotency guard for inbound create events.
//!
//! The webhook router claims a key before applying a create; the
//! reconciliation job clears the set at the start of each pass. Two
//! implementations share the contract:
//!
//! - [`MemoryGuard`]: process-lifetime set behind a mutex.
//! - [`FileGuard`]: the same set mirrored to a JSON file, written with the
//!   atomic `.tmp` + rename pattern so a crash never leaves a torn file.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use boardsync_core::GuardConfig;

use crate::error::{io_err, SyncError};

/// Tracks event keys that have already been applied.
pub trait IdempotencyGuard: Send + Sync {
    fn has_processed(&self, key: &str) -> bool;

    fn mark_processed(&self, key: &str) -> Result<(), SyncError>;

    /// Forget every key.
    fn reset(&self) -> Result<(), SyncError>;

    /// Forget the keys that start with `prefix`.
    fn forget_prefix(&self, prefix: &str) -> Result<(), SyncError>;

    /// Check and mark in one step. Returns `true` if `key` was not yet
    /// processed and is now marked; `false` for a duplicate.
    fn claim(&self, key: &str) -> Result<bool, SyncError>;
}

/// Build the guard described by `config`.
pub fn from_config(config: &GuardConfig) -> Result<Arc<dyn IdempotencyGuard>, SyncError> {
    Ok(match config {
        GuardConfig::Memory => Arc::new(MemoryGuard::new()),
        GuardConfig::File { path } => Arc::new(FileGuard::open(path)?),
    })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Insert and clear never leave the set half-updated.
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryGuard {
    keys: Mutex<BTreeSet<String>>,
}

impl MemoryGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.keys).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl IdempotencyGuard for MemoryGuard {
    fn has_processed(&self, key: &str) -> bool {
        lock(&self.keys).contains(key)
    }

    fn mark_processed(&self, key: &str) -> Result<(), SyncError> {
        lock(&self.keys).insert(key.to_string());
        Ok(())
    }

    fn reset(&self) -> Result<(), SyncError> {
        lock(&self.keys).clear();
        Ok(())
    }

    fn forget_prefix(&self, prefix: &str) -> Result<(), SyncError> {
        lock(&self.keys).retain(|key| !key.starts_with(prefix));
        Ok(())
    }

    fn claim(&self, key: &str) -> Result<bool, SyncError> {
        Ok(lock(&self.keys).insert(key.to_string()))
    }
}

// ---------------------------------------------------------------------------
// File-backed
// ---------------------------------------------------------------------------

/// On-disk guard payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GuardFile {
    pub updated_at: DateTime<Utc>,
    pub keys: BTreeSet<String>,
}

#[derive(Debug)]
pub struct FileGuard {
    path: PathBuf,
    keys: Mutex<BTreeSet<String>>,
}

impl FileGuard {
    /// Open the guard at `path`. A missing file is an empty guard.
    pub fn open(path: &Path) -> Result<Self, SyncError> {
        let keys = if path.exists() {
            let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
            serde_json::from_str::<GuardFile>(&contents)?.keys
        } else {
            BTreeSet::new()
        };
        tracing::debug!(path = %path.display(), keys = keys.len(), "guard file opened");
        Ok(Self {
            path: path.to_path_buf(),
            keys: Mutex::new(keys),
        })
    }

    /// Write `<path>.tmp` then rename to `<path>`.
    fn persist(&self, keys: &BTreeSet<String>) -> Result<(), SyncError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }
        let file = GuardFile {
            updated_at: Utc::now(),
            keys: keys.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| io_err(&tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| io_err(&self.path, e))?;
        Ok(())
    }
}

impl IdempotencyGuard for FileGuard {
    fn has_processed(&self, key: &str) -> bool {
        lock(&self.keys).contains(key)
    }

    fn mark_processed(&self, key: &str) -> Result<(), SyncError> {
        let mut keys = lock(&self.keys);
        if keys.insert(key.to_string()) {
            self.persist(&keys)?;
        }
        Ok(())
    }

    fn reset(&self) -> Result<(), SyncError> {
        let mut keys = lock(&self.keys);
        keys.clear();
        self.persist(&keys)
    }

    fn forget_prefix(&self, prefix: &str) -> Result<(), SyncError> {
        let mut keys = lock(&self.keys);
        let before = keys.len();
        keys.retain(|key| !key.starts_with(prefix));
        if keys.len() == before {
            return Ok(());
        }
        self.persist(&keys)
    }

    fn claim(&self, key: &str) -> Result<bool, SyncError> {
        let mut keys = lock(&self.keys);
        if !keys.insert(key.to_string()) {
            return Ok(false);
        }
        self.persist(&keys)?;
        Ok(true)
    }
}
