//! Cache store: root directory, named bins, shared write pool.

use crate::cache::bin::CacheBin;
use crate::cache::codec::{BinaryCodec, ObjectCodec};
use crate::cache::pool::{SharedPool, WritePool};
use crate::cache::types::CacheError;
use crate::config::CacheConfig;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use tracing::info;

/// Well-known identifier of the default bin.
pub const DEFAULT_BIN_ID: &str = "__default";

/// A filesystem-backed cache store.
///
/// Owns the root directory, a collection of named [`CacheBin`]s created
/// lazily on first use, and the write pool shared by every bin.
/// Constructed once at process start and passed by handle to consumers;
/// there are no implicit singletons. Dropping the store's last pool
/// handle drains outstanding background writes before the workers are
/// joined.
pub struct CacheStore {
    root_path: PathBuf,
    codec: Arc<dyn ObjectCodec>,
    bins: RwLock<HashMap<String, Arc<CacheBin>>>,
    default_bin: Mutex<Option<Arc<CacheBin>>>,
    pool: SharedPool,
}

impl CacheStore {
    /// Open a store rooted at `config.root_path` using the default
    /// binary codec with the configured compressor.
    pub fn new(config: CacheConfig) -> Result<Self, CacheError> {
        let codec = Arc::new(BinaryCodec::new(config.compressor));
        Self::with_codec(config, codec)
    }

    /// Open a store with an injected object codec.
    pub fn with_codec(
        config: CacheConfig,
        codec: Arc<dyn ObjectCodec>,
    ) -> Result<Self, CacheError> {
        if fs::create_dir_all(&config.root_path).is_err() {
            return Err(CacheError::RootUnavailable {
                path: config.root_path.display().to_string(),
            });
        }

        let pool = (config.threads > 0).then(|| Arc::new(WritePool::new(config.threads)));

        info!(
            root = %config.root_path.display(),
            threads = config.threads,
            format = codec.format(),
            "opened filesystem cache"
        );

        Ok(Self {
            root_path: config.root_path,
            codec,
            bins: RwLock::new(HashMap::new()),
            default_bin: Mutex::new(None),
            pool: Arc::new(RwLock::new(pool)),
        })
    }

    /// The store's root directory.
    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// Get or lazily create the named bin.
    ///
    /// Idempotent and thread-safe; a bin is created once and never
    /// replaced. The common already-exists case takes only the read
    /// lock.
    pub fn get_or_create_bin(&self, name: &str) -> Arc<CacheBin> {
        if let Some(bin) = self.bins.read().unwrap().get(name) {
            return Arc::clone(bin);
        }

        let mut bins = self.bins.write().unwrap();
        // Double-check: another thread may have created the bin while we
        // waited for the write lock.
        if let Some(bin) = bins.get(name) {
            return Arc::clone(bin);
        }

        let bin = CacheBin::new(
            name,
            &self.root_path,
            Arc::clone(&self.codec),
            Arc::clone(&self.pool),
        );
        bins.insert(name.to_string(), Arc::clone(&bin));
        bin
    }

    /// The default bin, created lazily under its own lock the first time
    /// it is needed.
    pub fn get_or_create_default_bin(&self) -> Arc<CacheBin> {
        let mut slot = self.default_bin.lock().unwrap();
        if let Some(bin) = slot.as_ref() {
            return Arc::clone(bin);
        }

        let bin = CacheBin::new(
            DEFAULT_BIN_ID,
            &self.root_path,
            Arc::clone(&self.codec),
            Arc::clone(&self.pool),
        );
        *slot = Some(Arc::clone(&bin));
        bin
    }

    /// Replace the shared write pool.
    ///
    /// `threads == 0` disables background writes; subsequent writes run
    /// inline on the caller's thread through the same entry point.
    /// Outstanding tasks on the previous pool drain before its workers
    /// are joined, so this call doubles as a flush point.
    pub fn set_num_threads(&self, threads: usize) {
        let new_pool = (threads > 0).then(|| Arc::new(WritePool::new(threads)));
        let old = {
            let mut slot = self.pool.write().unwrap();
            std::mem::replace(&mut *slot, new_pool)
        };
        // WritePool::drop drains the queue and joins the workers once
        // this was the last handle.
        drop(old);
    }

    /// Block until every background write accepted so far has been
    /// persisted. No-op when async writes are disabled.
    pub fn flush(&self) {
        let threads = match self.pool.read().unwrap().as_ref() {
            Some(pool) => pool.thread_count(),
            None => return,
        };
        let old = {
            let mut slot = self.pool.write().unwrap();
            slot.replace(Arc::new(WritePool::new(threads)))
        };
        drop(old);
    }

    /// Current number of background write threads; 0 when async writes
    /// are disabled.
    pub fn write_threads(&self) -> usize {
        self.pool
            .read()
            .unwrap()
            .as_ref()
            .map(|pool| pool.thread_count())
            .unwrap_or(0)
    }
}
