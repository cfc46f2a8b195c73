/*
    backup.rs - Local fallback copy of the document

    A key-value store written on every successful save and on teardown, read
    only as a last-resort recovery source when the initial fetch fails. Never
    a source of truth: a recovered backup may be stale, and the engine says
    so in its error state.
*/

use super::errors::{SyncError, SyncResult};
use super::types::DocumentId;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;
use tracing::warn;

/// Storage key for a document's backup copy
pub fn backup_key(id: &DocumentId) -> String {
    format!("document_{}_content", id)
}

/// Last-resort local persistence for document content.
///
/// Reads model absence as `None` rather than an error; a missing backup is
/// the normal case, not a failure.
pub trait BackupStore: Send + Sync {
    /// Persist the backup copy for a document.
    fn save(&self, id: &DocumentId, content: &str) -> SyncResult<()>;

    /// Read the backup copy, if one exists.
    fn load(&self, id: &DocumentId) -> Option<String>;
}

/// In-memory backup store for tests and the simulator.
#[derive(Default)]
pub struct MemoryBackupStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryBackupStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BackupStore for MemoryBackupStore {
    fn save(&self, id: &DocumentId, content: &str) -> SyncResult<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| SyncError::Backup("backup store lock poisoned".to_string()))?;
        entries.insert(backup_key(id), content.to_string());
        Ok(())
    }

    fn load(&self, id: &DocumentId) -> Option<String> {
        self.entries.read().ok()?.get(&backup_key(id)).cloned()
    }
}

/// File-backed backup store: one file per key under a data directory.
pub struct FileBackupStore {
    data_dir: PathBuf,
}

impl FileBackupStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        FileBackupStore {
            data_dir: data_dir.into(),
        }
    }

    fn path_for(&self, id: &DocumentId) -> PathBuf {
        self.data_dir.join(backup_key(id))
    }
}

impl BackupStore for FileBackupStore {
    fn save(&self, id: &DocumentId, content: &str) -> SyncResult<()> {
        std::fs::create_dir_all(&self.data_dir)
            .map_err(|e| SyncError::Backup(format!("create backup dir: {}", e)))?;
        std::fs::write(self.path_for(id), content)
            .map_err(|e| SyncError::Backup(format!("write backup: {}", e)))
    }

    fn load(&self, id: &DocumentId) -> Option<String> {
        match std::fs::read_to_string(self.path_for(id)) {
            Ok(content) => Some(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(document = %id, error = %e, "backup read failed");
                None
            }
        }
    }
}
