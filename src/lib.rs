//! TileVault - disk-backed, write-behind key/value object cache.
//!
//! TileVault sits in front of expensive remote or computed artifacts
//! (tiles, imagery, geometry) and lets many concurrent readers and
//! writers share one logical store. Writes may be deferred to a pool of
//! background workers; an in-memory overlay masks not-yet-persisted
//! records so readers never observe an accepted write as missing.
//!
//! # High-Level API
//!
//! A [`cache::CacheStore`] owns a root directory and hands out named
//! [`cache::CacheBin`]s:
//!
//! ```no_run
//! use tilevault::cache::{CacheKey, CacheObject, CacheStore, Metadata, ReadResult};
//! use tilevault::config::CacheConfig;
//!
//! let store = CacheStore::new(CacheConfig::new("/var/cache/tiles").with_threads(2))?;
//! let bin = store.get_or_create_bin("imagery");
//!
//! let key = CacheKey::new("tile/15/12754/5279");
//! let mut meta = Metadata::new();
//! meta.set("format", "png");
//! bin.write(&key, CacheObject::Image(vec![0xAB; 64]), meta);
//!
//! if let ReadResult::Found(record) = bin.read(&key) {
//!     // served from the write overlay or from disk
//!     assert_eq!(record.metadata.get("format"), Some("png"));
//! }
//! # Ok::<(), tilevault::cache::CacheError>(())
//! ```

pub mod cache;
pub mod config;
pub mod logging;

/// Version of the TileVault library.
///
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
