//! In-memory overlay of writes accepted but not yet persisted.

use crate::cache::meta::Metadata;
use crate::cache::types::CacheObject;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// A write accepted by [`crate::cache::CacheBin::write`] but not yet
/// durable. Created when the asynchronous path is taken; removed the
/// instant the background task finishes persisting it, whether or not
/// the write succeeded.
#[derive(Debug, Clone)]
pub struct PendingWrite {
    pub object: Arc<CacheObject>,
    pub metadata: Metadata,
}

/// Map from fully-qualified stem path to the most recently accepted
/// pending write for that path.
///
/// Purely advisory: the overlay never touches disk. Readers consult it
/// before disk so an accepted-but-unflushed write is never observed as
/// missing. Safe under many concurrent readers and occasional writers.
#[derive(Debug, Default)]
pub struct WriteOverlay {
    entries: RwLock<HashMap<PathBuf, PendingWrite>>,
}

impl WriteOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unconditionally replace any pending entry for `path`; the most
    /// recently accepted write is the valid one.
    pub fn put(&self, path: PathBuf, pending: PendingWrite) {
        self.entries.write().unwrap().insert(path, pending);
    }

    /// Fetch the pending entry for `path`, if any. Never blocks on disk.
    pub fn get(&self, path: &Path) -> Option<PendingWrite> {
        self.entries.read().unwrap().get(path).cloned()
    }

    /// Remove the pending entry for `path`. Idempotent.
    pub fn remove(&self, path: &Path) {
        self.entries.write().unwrap().remove(path);
    }

    /// Number of writes accepted but not yet persisted.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
