//! Core types for the cache: keys, objects, records, results, errors.

use crate::cache::meta::Metadata;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;

/// Opaque cache key supplied by the caller.
///
/// A key is mapped deterministically to a root-relative file path; see
/// [`crate::cache::path::mangle_key`]. `/` separators become directory
/// boundaries on disk, so hierarchical keys such as
/// `"tile/15/12754/5279"` lay out naturally.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Create a new cache key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw key string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for CacheKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// Category tag for a [`CacheObject`], with a stable one-byte wire tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Image,
    Text,
    Node,
    Generic,
}

impl ObjectKind {
    pub(crate) fn tag(self) -> u8 {
        match self {
            ObjectKind::Image => 0,
            ObjectKind::Text => 1,
            ObjectKind::Node => 2,
            ObjectKind::Generic => 3,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(ObjectKind::Image),
            1 => Some(ObjectKind::Text),
            2 => Some(ObjectKind::Node),
            3 => Some(ObjectKind::Generic),
            _ => None,
        }
    }
}

/// An in-memory object accepted by the cache, tagged with the category
/// the codec serializes it under.
///
/// `Node` is the documented carve-out: its underlying writer is not
/// thread-safe, so node writes always take the synchronous path even
/// when a write pool is configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheObject {
    /// Encoded image/texture payload.
    Image(Vec<u8>),
    /// UTF-8 text payload.
    Text(String),
    /// Scene-node payload; always written synchronously.
    Node(Vec<u8>),
    /// Any other payload the codec understands.
    Generic(Vec<u8>),
}

impl CacheObject {
    /// The category tag for this object.
    pub fn kind(&self) -> ObjectKind {
        match self {
            CacheObject::Image(_) => ObjectKind::Image,
            CacheObject::Text(_) => ObjectKind::Text,
            CacheObject::Node(_) => ObjectKind::Node,
            CacheObject::Generic(_) => ObjectKind::Generic,
        }
    }

    /// Whether this object must bypass the asynchronous write pool.
    pub fn requires_sync_write(&self) -> bool {
        matches!(self, CacheObject::Node(_))
    }

    /// The raw payload bytes.
    pub fn payload(&self) -> &[u8] {
        match self {
            CacheObject::Image(bytes) => bytes,
            CacheObject::Text(text) => text.as_bytes(),
            CacheObject::Node(bytes) => bytes,
            CacheObject::Generic(bytes) => bytes,
        }
    }
}

/// A fully materialized record returned by [`crate::cache::CacheBin::read`].
///
/// Records are immutable once produced; a later write for the same key
/// creates a new record value rather than mutating this one.
#[derive(Debug, Clone)]
pub struct CacheRecord {
    /// The cached object.
    pub object: Arc<CacheObject>,
    /// Metadata stored alongside the object; empty if no sidecar exists.
    pub metadata: Metadata,
    /// Last modification time of the on-disk record, or the observation
    /// time for a record still waiting in the write overlay.
    pub last_modified: SystemTime,
}

/// Outcome of a read.
#[derive(Debug)]
pub enum ReadResult {
    /// The record was found in the write overlay or on disk.
    Found(CacheRecord),
    /// No record exists for the key. A record whose bytes failed to
    /// decode is reported the same way: a corrupt entry is operationally
    /// a miss, never a hard error.
    NotFound,
    /// The bin's directory is missing or was never creatable. Reported
    /// once per bin; subsequent reads degrade to [`ReadResult::NotFound`].
    Invalid,
}

impl ReadResult {
    /// Whether a record was found.
    pub fn is_found(&self) -> bool {
        matches!(self, ReadResult::Found(_))
    }

    /// Consume the result, yielding the record if one was found.
    pub fn into_record(self) -> Option<CacheRecord> {
        match self {
            ReadResult::Found(record) => Some(record),
            _ => None,
        }
    }
}

/// Result of a cheap durable-state existence check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    /// The primary object file exists on disk.
    Found,
    /// No durable record exists (a pending overlay entry does not count).
    NotFound,
}

/// Cache-level errors.
///
/// Per-record failures never surface through this type; they are folded
/// into boolean or optional results. `CacheError` is only returned where
/// the store itself cannot be used.
#[derive(Debug, Error)]
pub enum CacheError {
    /// I/O error during cache operations.
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The root directory is missing and could not be created.
    #[error("cache root unavailable: {path}")]
    RootUnavailable { path: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_round_trip() {
        let key = CacheKey::new("tile/15/12754/5279");
        assert_eq!(key.as_str(), "tile/15/12754/5279");
        assert_eq!(key.to_string(), "tile/15/12754/5279");
    }

    #[test]
    fn test_cache_key_equality() {
        assert_eq!(CacheKey::from("a/b"), CacheKey::new("a/b"));
        assert_ne!(CacheKey::from("a/b"), CacheKey::new("a/c"));
    }

    #[test]
    fn test_object_kind_tags_round_trip() {
        for kind in [
            ObjectKind::Image,
            ObjectKind::Text,
            ObjectKind::Node,
            ObjectKind::Generic,
        ] {
            assert_eq!(ObjectKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(ObjectKind::from_tag(200), None);
    }

    #[test]
    fn test_only_nodes_require_sync_writes() {
        assert!(CacheObject::Node(vec![1]).requires_sync_write());
        assert!(!CacheObject::Image(vec![1]).requires_sync_write());
        assert!(!CacheObject::Text("x".into()).requires_sync_write());
        assert!(!CacheObject::Generic(vec![1]).requires_sync_write());
    }

    #[test]
    fn test_object_payload() {
        assert_eq!(CacheObject::Text("abc".into()).payload(), b"abc");
        assert_eq!(CacheObject::Image(vec![1, 2]).payload(), &[1, 2]);
    }

    #[test]
    fn test_read_result_accessors() {
        assert!(!ReadResult::NotFound.is_found());
        assert!(ReadResult::NotFound.into_record().is_none());
        assert!(ReadResult::Invalid.into_record().is_none());
    }
}
