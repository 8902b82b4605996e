//! Durable storage of encoded machine records.
//!
//! The engine only needs three operations from storage: load everything,
//! replace everything, and clear. [`MachineStore`] is that seam. Two
//! implementations ship with the crate: [`MemoryStore`] and the
//! one-file-per-machine [`DirStore`].

use crate::id::MachineId;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tempfile::NamedTempFile;

/// File extension used by [`DirStore`] records.
pub const RECORD_EXTENSION: &str = "vfm";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

/// A durable key-value store of encoded machine records keyed by id.
pub trait MachineStore: Send + Sync {
    /// Every record currently stored.
    fn load_all(&self) -> Result<Vec<(MachineId, Vec<u8>)>, StoreError>;

    /// Replace the stored content with exactly `records`.
    fn persist_all(&self, records: Vec<(MachineId, Vec<u8>)>) -> Result<(), StoreError>;

    /// Erase every stored record.
    fn clear(&self) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-memory store, for tests and for hosts that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<MachineId, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Overwrite a single record. Used to seed or corrupt a store in tests.
    pub fn insert_raw(&self, id: MachineId, bytes: Vec<u8>) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, bytes);
    }
}

impl MachineStore for MemoryStore {
    fn load_all(&self) -> Result<Vec<(MachineId, Vec<u8>)>, StoreError> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records.iter().map(|(id, bytes)| (*id, bytes.clone())).collect())
    }

    fn persist_all(&self, records: Vec<(MachineId, Vec<u8>)>) -> Result<(), StoreError> {
        let mut stored = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        *stored = records.into_iter().collect();
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).clear();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// DirStore
// ---------------------------------------------------------------------------

/// One `<id>.vfm` file per machine in a directory.
///
/// Records are written through a temp file in the same directory and renamed
/// into place, so a crash mid-persist leaves either the old or the new record.
/// Files for machines no longer live are removed after the new records land.
#[derive(Debug)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| StoreError::io(&root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, id: MachineId) -> PathBuf {
        self.root.join(format!("{id}.{RECORD_EXTENSION}"))
    }

    /// Ids of every record file on disk. Foreign files, directories and
    /// entries that cannot be inspected are skipped with a warning.
    fn stored_ids(&self) -> Result<Vec<(MachineId, PathBuf)>, StoreError> {
        let entries = std::fs::read_dir(&self.root).map_err(|e| StoreError::io(&self.root, e))?;
        let mut ids = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(root = %self.root.display(), error = %e, "skipping unreadable store entry");
                    continue;
                }
            };
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            match entry.file_type() {
                Ok(kind) if kind.is_file() => {}
                Ok(_) => {
                    tracing::warn!(path = %path.display(), "skipping record path that is not a file");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable store entry");
                    continue;
                }
            }
            let parsed = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(MachineId::parse);
            match parsed {
                Some(id) => ids.push((id, path)),
                None => tracing::warn!(path = %path.display(), "skipping record with unparseable name"),
            }
        }
        ids.sort_by_key(|(id, _)| *id);
        Ok(ids)
    }

    /// Remove each path, continuing past failures. Returns the first error.
    fn remove_all<'p>(paths: impl IntoIterator<Item = &'p PathBuf>) -> Result<(), StoreError> {
        let mut first = None;
        for path in paths {
            if let Err(e) = std::fs::remove_file(path) {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove record");
                if first.is_none() {
                    first = Some(StoreError::io(path, e));
                }
            }
        }
        first.map_or(Ok(()), Err)
    }

    fn write_record(&self, id: MachineId, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.record_path(id);
        let mut tmp = NamedTempFile::new_in(&self.root).map_err(|e| StoreError::io(&self.root, e))?;
        tmp.write_all(bytes).map_err(|e| StoreError::io(tmp.path(), e))?;
        tmp.as_file().sync_all().map_err(|e| StoreError::io(tmp.path(), e))?;
        tmp.persist(&path).map_err(|e| StoreError::io(&path, e.error))?;
        Ok(())
    }
}

impl MachineStore for DirStore {
    /// Records that cannot be read are logged and left out; one bad file
    /// never fails the whole load.
    fn load_all(&self) -> Result<Vec<(MachineId, Vec<u8>)>, StoreError> {
        let mut records = Vec::new();
        for (id, path) in self.stored_ids()? {
            match std::fs::read(&path) {
                Ok(bytes) => records.push((id, bytes)),
                Err(e) => {
                    tracing::warn!(machine = %id, path = %path.display(), error = %e, "skipping unreadable record");
                }
            }
        }
        Ok(records)
    }

    fn persist_all(&self, records: Vec<(MachineId, Vec<u8>)>) -> Result<(), StoreError> {
        let live: BTreeSet<MachineId> = records.iter().map(|(id, _)| *id).collect();
        for (id, bytes) in &records {
            self.write_record(*id, bytes)?;
        }
        let stale = self.stored_ids()?;
        Self::remove_all(
            stale
                .iter()
                .filter(|(id, _)| !live.contains(id))
                .map(|(_, path)| path),
        )
    }

    fn clear(&self) -> Result<(), StoreError> {
        let stored = self.stored_ids()?;
        Self::remove_all(stored.iter().map(|(_, path)| path))
    }
}
