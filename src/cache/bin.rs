//! Cache bin: the per-namespace façade over gate, overlay, codec and
//! disk layout.

use crate::cache::codec::ObjectCodec;
use crate::cache::gate::FileGate;
use crate::cache::meta::{self, Metadata};
use crate::cache::overlay::{PendingWrite, WriteOverlay};
use crate::cache::path::{self, BIN_METADATA_FILENAME};
use crate::cache::pool::{SharedPool, WritePool};
use crate::cache::stats::CacheStats;
use crate::cache::types::{CacheKey, CacheObject, CacheRecord, ReadResult, RecordStatus};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::SystemTime;
use tracing::{debug, warn};

/// Validity latch for a bin's root directory.
///
/// Once the directory is confirmed present it is trusted for the rest of
/// the process. A directory that is missing (or could not be created)
/// flips `ok` off exactly once so failures do not log-storm; a later
/// check finding the directory restored flips it back on.
#[derive(Debug)]
struct Validity {
    path_exists: AtomicBool,
    ok: AtomicBool,
    invalid_reported: AtomicBool,
}

impl Validity {
    fn new() -> Self {
        Self {
            path_exists: AtomicBool::new(false),
            ok: AtomicBool::new(true),
            invalid_reported: AtomicBool::new(false),
        }
    }
}

/// A named, independently rooted sub-store within the cache.
///
/// Bins are obtained from [`crate::cache::CacheStore::get_or_create_bin`]
/// and shared freely across threads. All operations recover failures
/// locally: a corrupt or unreadable record reads as a miss, a failed
/// write surfaces only as a later miss, and nothing here panics in
/// normal operation.
pub struct CacheBin {
    id: String,
    bin_path: PathBuf,
    metadata_path: PathBuf,
    codec: Arc<dyn ObjectCodec>,
    pool: SharedPool,
    overlay: WriteOverlay,
    gate: FileGate,
    validity: Validity,
    stats: Mutex<CacheStats>,
    weak_self: Weak<CacheBin>,
}

impl CacheBin {
    pub(crate) fn new(
        id: &str,
        root_path: &Path,
        codec: Arc<dyn ObjectCodec>,
        pool: SharedPool,
    ) -> Arc<Self> {
        let bin_path = root_path.join(path::mangle_key(id));
        let metadata_path = bin_path.join(BIN_METADATA_FILENAME);

        Arc::new_cyclic(|weak_self| Self {
            id: id.to_string(),
            bin_path,
            metadata_path,
            codec,
            pool,
            overlay: WriteOverlay::new(),
            gate: FileGate::new(),
            validity: Validity::new(),
            stats: Mutex::new(CacheStats::new()),
            weak_self: weak_self.clone(),
        })
    }

    /// The bin's identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The bin's root directory.
    pub fn path(&self) -> &Path {
        &self.bin_path
    }

    /// Read the record for `key`.
    ///
    /// Always consults the write overlay before disk, so a write
    /// accepted moments ago is visible before it lands on disk, even
    /// while a replaced pool is still draining its queue. A record whose
    /// bytes fail to decode reads as [`ReadResult::NotFound`].
    pub fn read(&self, key: &CacheKey) -> ReadResult {
        if !self.valid_for_reading() {
            if !self.validity.invalid_reported.swap(true, Ordering::AcqRel) {
                return ReadResult::Invalid;
            }
            return ReadResult::NotFound;
        }

        let stem = path::stem_path(&self.bin_path, key.as_str());
        let object_path = path::object_path(&stem, self.codec.extension());

        let _gate = self.gate.acquire(&stem.to_string_lossy());

        if let Some(pending) = self.overlay.get(&stem) {
            // The record is queued for asynchronous writing and the
            // object is already in memory; no decode needed.
            let last_modified = file_mtime(&object_path).unwrap_or_else(SystemTime::now);
            self.stats.lock().unwrap().record_overlay_hit();
            debug!(bin = %self.id, key = %key, "read served from write overlay");
            return ReadResult::Found(CacheRecord {
                object: pending.object,
                metadata: pending.metadata,
                last_modified,
            });
        }

        let bytes = match fs::read(&object_path) {
            Ok(bytes) => bytes,
            Err(_) => {
                self.stats.lock().unwrap().record_miss();
                return ReadResult::NotFound;
            }
        };
        let last_modified = file_mtime(&object_path).unwrap_or_else(SystemTime::now);

        let object = match self.codec.decode(&bytes) {
            Ok(object) => object,
            Err(e) => {
                // A corrupt record is operationally a miss.
                debug!(bin = %self.id, key = %key, error = %e, "decode failed; treating record as absent");
                self.stats.lock().unwrap().record_miss();
                return ReadResult::NotFound;
            }
        };

        // Absence of a sidecar is not an error.
        let metadata = meta::read_sidecar(&path::sidecar_path(&stem)).unwrap_or_default();

        self.stats.lock().unwrap().record_disk_hit();
        debug!(bin = %self.id, key = %key, "read record from disk");

        ReadResult::Found(CacheRecord {
            object: Arc::new(object),
            metadata,
            last_modified,
        })
    }

    /// Accept a write for `key`.
    ///
    /// With a write pool configured, and unless the object's category
    /// forces the synchronous path, the record enters the overlay, a
    /// background task is queued, and `true` is returned immediately:
    /// accepted means queued, not durable. Callers needing durability
    /// confirmation poll [`record_status`](Self::record_status). Without
    /// a pool, or for [`CacheObject::Node`], the write runs inline and
    /// its success or failure is returned directly.
    pub fn write(&self, key: &CacheKey, object: CacheObject, metadata: Metadata) -> bool {
        if !self.valid_for_writing() {
            return false;
        }

        let stem = path::stem_path(&self.bin_path, key.as_str());
        let object = Arc::new(object);

        self.stats.lock().unwrap().record_write();

        match (self.current_pool(), self.weak_self.upgrade()) {
            (Some(pool), Some(bin)) if !object.requires_sync_write() => {
                // The entry must be in the overlay before the task can
                // possibly run, so a read between submission and
                // persistence sees the new value.
                self.overlay.put(
                    stem.clone(),
                    PendingWrite {
                        object: Arc::clone(&object),
                        metadata: metadata.clone(),
                    },
                );
                pool.submit(move || {
                    bin.perform_write(&stem, &object, &metadata);
                });
                true
            }
            _ => self.perform_write(&stem, &object, &metadata),
        }
    }

    /// Gate, encode and persist one record. Always clears the overlay
    /// entry for the path as its final step, success or not; a failed
    /// background write is observable only through logging and a later
    /// miss.
    fn perform_write(&self, stem: &Path, object: &CacheObject, metadata: &Metadata) -> bool {
        let _gate = self.gate.acquire(&stem.to_string_lossy());

        let ok = self.persist(stem, object, metadata);
        if ok {
            debug!(bin = %self.id, path = %stem.display(), "wrote record");
        } else {
            self.stats.lock().unwrap().record_write_failure();
        }

        self.overlay.remove(stem);
        ok
    }

    fn persist(&self, stem: &Path, object: &CacheObject, metadata: &Metadata) -> bool {
        if let Some(parent) = stem.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!(bin = %self.id, path = %stem.display(), error = %e, "failed to create record directory");
                return false;
            }
        }

        let bytes = match self.codec.encode(object) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(bin = %self.id, path = %stem.display(), error = %e, "failed to encode record");
                return false;
            }
        };

        let object_path = path::object_path(stem, self.codec.extension());
        if let Err(e) = fs::write(&object_path, bytes) {
            warn!(bin = %self.id, path = %object_path.display(), error = %e, "failed to write record");
            return false;
        }

        if !metadata.is_empty() {
            meta::write_sidecar(&path::sidecar_path(stem), metadata);
        }

        true
    }

    /// Delete the durable record for `key`.
    ///
    /// Returns whether the delete succeeded; removing an absent record
    /// returns `false`. The metadata sidecar is left behind.
    pub fn remove(&self, key: &CacheKey) -> bool {
        if !self.valid_for_reading() {
            return false;
        }

        let stem = path::stem_path(&self.bin_path, key.as_str());
        let _gate = self.gate.acquire(&stem.to_string_lossy());

        let removed = fs::remove_file(path::object_path(&stem, self.codec.extension())).is_ok();
        if removed {
            self.stats.lock().unwrap().record_remove();
        }
        removed
    }

    /// Refresh the record's modification timestamp without altering its
    /// content. Supports callers implementing their own staleness
    /// policy.
    pub fn touch(&self, key: &CacheKey) -> bool {
        if !self.valid_for_reading() {
            return false;
        }

        let stem = path::stem_path(&self.bin_path, key.as_str());
        let _gate = self.gate.acquire(&stem.to_string_lossy());

        let object_path = path::object_path(&stem, self.codec.extension());
        match File::options().write(true).open(&object_path) {
            Ok(file) => file.set_modified(SystemTime::now()).is_ok(),
            Err(_) => false,
        }
    }

    /// Cheap existence check against durable state only.
    ///
    /// Does not decode content and deliberately does not consult the
    /// overlay: status reflects what has actually been persisted.
    pub fn record_status(&self, key: &CacheKey) -> RecordStatus {
        if !self.valid_for_reading() {
            return RecordStatus::NotFound;
        }

        let stem = path::stem_path(&self.bin_path, key.as_str());
        if path::object_path(&stem, self.codec.extension()).is_file() {
            RecordStatus::Found
        } else {
            RecordStatus::NotFound
        }
    }

    /// Recursively delete every record under the bin, depth-first.
    ///
    /// Only paths containing the bin's own directory name are touched, a
    /// safety latch against purging unrelated directory trees, and the
    /// bin-level metadata record is preserved. Returns whether every
    /// deletion succeeded.
    pub fn clear(&self) -> bool {
        if !self.valid_for_reading() {
            return false;
        }
        // The latch must match what is actually on disk: the directory
        // name is the mangled form of the bin id.
        let latch = match self.bin_path.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => return false,
        };
        debug!(bin = %self.id, "clearing cache bin");
        self.purge_directory(&self.bin_path, &latch)
    }

    fn purge_directory(&self, dir: &Path, latch: &str) -> bool {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(bin = %self.id, path = %dir.display(), error = %e, "failed to list directory during clear");
                return false;
            }
        };

        let mut all_ok = true;
        for entry in entries.flatten() {
            let full = entry.path();

            // Safety latch: never delete a path that does not carry the
            // bin's own directory name.
            if !full.to_string_lossy().contains(latch) {
                continue;
            }

            let ok = if full.is_dir() {
                self.purge_directory(&full, latch) && fs::remove_dir(&full).is_ok()
            } else if full == self.metadata_path {
                true
            } else {
                fs::remove_file(&full).is_ok()
            };

            if !ok {
                all_ok = false;
            }
        }

        all_ok
    }

    /// Write the bin-level metadata record at the bin's reserved path.
    pub fn write_bin_metadata(&self, metadata: &Metadata) -> bool {
        if !self.valid_for_writing() {
            return false;
        }
        meta::write_sidecar(&self.metadata_path, metadata)
    }

    /// Read the bin-level metadata record, if present.
    pub fn read_bin_metadata(&self) -> Option<Metadata> {
        if !self.valid_for_reading() {
            return None;
        }
        meta::read_sidecar(&self.metadata_path)
    }

    /// Snapshot of this bin's operation counters.
    pub fn stats(&self) -> CacheStats {
        self.stats.lock().unwrap().clone()
    }

    /// Number of writes accepted but not yet persisted.
    pub fn pending_writes(&self) -> usize {
        self.overlay.len()
    }

    fn current_pool(&self) -> Option<Arc<WritePool>> {
        self.pool.read().unwrap().clone()
    }

    fn valid_for_reading(&self) -> bool {
        if self.validity.path_exists.load(Ordering::Acquire) {
            return true;
        }
        if self.bin_path.is_dir() {
            self.mark_valid();
            true
        } else {
            if self.validity.ok.swap(false, Ordering::AcqRel) {
                warn!(bin = %self.id, path = %self.bin_path.display(), "failed to locate cache bin directory");
            }
            false
        }
    }

    fn valid_for_writing(&self) -> bool {
        if self.validity.path_exists.load(Ordering::Acquire) {
            return true;
        }
        match fs::create_dir_all(&self.bin_path) {
            Ok(()) => {
                self.mark_valid();
                true
            }
            Err(e) => {
                if self.validity.ok.swap(false, Ordering::AcqRel) {
                    warn!(bin = %self.id, path = %self.bin_path.display(), error = %e, "failed to create cache bin directory");
                }
                false
            }
        }
    }

    fn mark_valid(&self) {
        self.validity.path_exists.store(true, Ordering::Release);
        self.validity.ok.store(true, Ordering::Release);
        self.validity.invalid_reported.store(false, Ordering::Release);
    }
}

fn file_mtime(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).ok()?.modified().ok()
}
