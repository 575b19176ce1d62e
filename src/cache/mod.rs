//! Disk-backed, write-behind object cache bins.
//!
//! A [`CacheStore`] owns a root directory and a set of named [`CacheBin`]s
//! created lazily on first use. Within a bin, every disk access for a
//! given key is serialized by a per-key [`FileGate`]; reads consult the
//! in-memory [`WriteOverlay`] before falling back to disk, and writes can
//! be handed to a shared [`WritePool`] of background worker threads.

mod bin;
pub mod codec;
mod gate;
mod meta;
mod overlay;
pub mod path;
mod pool;
mod stats;
mod store;
mod types;

pub use bin::CacheBin;
pub use codec::{BinaryCodec, CodecError, ObjectCodec};
pub use gate::{FileGate, GateGuard};
pub use meta::Metadata;
pub use overlay::{PendingWrite, WriteOverlay};
pub use pool::{WritePool, MAX_WRITE_THREADS};
pub use stats::CacheStats;
pub use store::{CacheStore, DEFAULT_BIN_ID};
pub use types::{
    CacheError, CacheKey, CacheObject, CacheRecord, ObjectKind, ReadResult, RecordStatus,
};
