//! Metadata records and their JSON sidecar representation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Ordered string-to-string metadata attached to a cache record.
///
/// Stored on disk as a UTF-8 JSON object. Attribute names and values
/// round-trip losslessly, and the ordered map keeps the on-disk text
/// deterministic for a given mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, String>);

impl Metadata {
    /// Create an empty metadata record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an attribute, replacing any existing value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    /// Look up an attribute value.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate over attributes in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    /// Serialize to the sidecar JSON text.
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| String::from("{}"))
    }

    /// Parse sidecar JSON text; `None` if the text is not a flat JSON
    /// object of strings.
    pub fn from_json(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }
}

/// Read a metadata sidecar. Absence or malformed content is not an
/// error; both yield `None`.
pub(crate) fn read_sidecar(path: &Path) -> Option<Metadata> {
    let text = fs::read_to_string(path).ok()?;
    let meta = Metadata::from_json(&text);
    if meta.is_none() {
        debug!(path = %path.display(), "ignoring malformed metadata sidecar");
    }
    meta
}

/// Write a metadata sidecar. Best effort; returns whether it succeeded.
pub(crate) fn write_sidecar(path: &Path, metadata: &Metadata) -> bool {
    match fs::write(path, metadata.to_json()) {
        Ok(()) => true,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to write metadata sidecar");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_metadata_set_and_get() {
        let mut meta = Metadata::new();
        meta.set("format", "png");
        meta.set("format", "jpeg");

        assert_eq!(meta.get("format"), Some("jpeg"));
        assert_eq!(meta.get("missing"), None);
        assert_eq!(meta.len(), 1);
    }

    #[test]
    fn test_metadata_json_round_trip() {
        let meta = Metadata::new()
            .with("format", "png")
            .with("source", "bing")
            .with("empty", "");

        let parsed = Metadata::from_json(&meta.to_json()).unwrap();
        assert_eq!(parsed, meta);
    }

    #[test]
    fn test_metadata_json_is_deterministic() {
        let a = Metadata::new().with("b", "2").with("a", "1");
        let b = Metadata::new().with("a", "1").with("b", "2");
        assert_eq!(a.to_json(), b.to_json());
    }

    #[test]
    fn test_from_json_rejects_non_object_text() {
        assert!(Metadata::from_json("[1, 2]").is_none());
        assert!(Metadata::from_json("not json").is_none());
    }

    #[test]
    fn test_sidecar_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("record.meta");
        let meta = Metadata::new().with("format", "png");

        assert!(write_sidecar(&path, &meta));
        assert_eq!(read_sidecar(&path), Some(meta));
    }

    #[test]
    fn test_missing_or_corrupt_sidecar_reads_as_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("record.meta");

        assert_eq!(read_sidecar(&path), None);

        fs::write(&path, "{{ broken").unwrap();
        assert_eq!(read_sidecar(&path), None);
    }
}
