//! Key-to-path mangling and bin directory layout.
//!
//! The mapping from an opaque key to a relative path is a pure function
//! and stable across runs: the same key always yields the same path.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// File extension used by the default codec for primary object files.
pub const OBJECT_EXT: &str = ".tvb";

/// Suffix appended to a record's stem path for its metadata sidecar.
pub const META_SUFFIX: &str = ".meta";

/// Reserved filename for a bin's own metadata record.
///
/// [`crate::cache::CacheBin::clear`] preserves this file.
pub const BIN_METADATA_FILENAME: &str = "tilevault_bininfo.json";

/// Mangle an opaque key into a legal relative path.
///
/// `/` separators split the key into directory components; characters
/// that are not portable in filenames are replaced with `_`. Empty
/// components and the `.`/`..` specials are replaced as well, so a key
/// can never escape its bin directory.
///
/// # Example
///
/// ```
/// use std::path::PathBuf;
/// use tilevault::cache::path::mangle_key;
///
/// assert_eq!(mangle_key("tile/15/12754/5279"), PathBuf::from("tile/15/12754/5279"));
/// assert_eq!(mangle_key("http://host?q=1"), PathBuf::from("http_/_/host_q=1"));
/// assert_eq!(mangle_key("../escape"), PathBuf::from("_/escape"));
/// ```
pub fn mangle_key(key: &str) -> PathBuf {
    key.split('/').map(sanitize_segment).collect()
}

fn sanitize_segment(segment: &str) -> String {
    if segment.is_empty() || segment == "." || segment == ".." {
        return "_".to_string();
    }
    segment
        .chars()
        .map(|c| match c {
            '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// Full stem path for a key within a bin: the object file minus its
/// extension. The stem doubles as the gate and overlay key for the
/// record.
pub fn stem_path(bin_path: &Path, key: &str) -> PathBuf {
    bin_path.join(mangle_key(key))
}

/// Path of the primary object file: the stem plus the codec extension.
pub fn object_path(stem: &Path, extension: &str) -> PathBuf {
    append_suffix(stem, extension)
}

/// Path of the metadata sidecar for a record.
///
/// # Example
///
/// ```
/// use std::path::{Path, PathBuf};
/// use tilevault::cache::path::sidecar_path;
///
/// let stem = Path::new("/cache/imagery/tile/15/12754/5279");
/// assert_eq!(sidecar_path(stem), PathBuf::from("/cache/imagery/tile/15/12754/5279.meta"));
/// ```
pub fn sidecar_path(stem: &Path) -> PathBuf {
    append_suffix(stem, META_SUFFIX)
}

fn append_suffix(stem: &Path, suffix: &str) -> PathBuf {
    let mut full = OsString::from(stem.as_os_str());
    full.push(suffix);
    PathBuf::from(full)
}
