//! Store configuration: root path, write concurrency, compressor.

use crate::cache::MAX_WRITE_THREADS;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

/// Environment variable overriding the cache root path.
pub const ENV_CACHE_PATH: &str = "TILEVAULT_CACHE_PATH";
/// Environment variable overriding the background write-thread count.
pub const ENV_THREADS: &str = "TILEVAULT_THREADS";
/// Environment variable overriding the compressor identifier.
pub const ENV_COMPRESSOR: &str = "TILEVAULT_COMPRESSOR";

/// Compressor applied by the default codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compressor {
    #[default]
    Zlib,
    None,
}

/// Invalid configuration values.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown compressor identifier '{0}' (expected 'zlib' or 'none')")]
    UnknownCompressor(String),
}

impl FromStr for Compressor {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "zlib" => Ok(Compressor::Zlib),
            "none" => Ok(Compressor::None),
            other => Err(ConfigError::UnknownCompressor(other.to_string())),
        }
    }
}

/// Cache store configuration.
///
/// # Example
///
/// ```
/// use tilevault::config::{CacheConfig, Compressor};
///
/// let config = CacheConfig::new("/tmp/tilevault")
///     .with_threads(2)
///     .with_compressor(Compressor::None);
///
/// assert_eq!(config.threads, 2);
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Root directory holding every bin.
    pub root_path: PathBuf,
    /// Background write threads; 0 disables asynchronous writes.
    /// Nonzero values are clamped to [`MAX_WRITE_THREADS`].
    pub threads: usize,
    /// Compressor used by the default codec.
    pub compressor: Compressor,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let root_path = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tilevault");

        Self {
            root_path,
            threads: 1,
            compressor: Compressor::default(),
        }
    }
}

impl CacheConfig {
    /// Configuration rooted at the given directory, defaults elsewhere.
    pub fn new(root_path: impl Into<PathBuf>) -> Self {
        Self {
            root_path: root_path.into(),
            ..Self::default()
        }
    }

    /// Defaults overlaid with any `TILEVAULT_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    pub fn with_root_path(mut self, root_path: impl Into<PathBuf>) -> Self {
        self.root_path = root_path.into();
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = clamp_threads(threads);
        self
    }

    pub fn with_compressor(mut self, compressor: Compressor) -> Self {
        self.compressor = compressor;
        self
    }

    /// Apply `TILEVAULT_*` environment overrides to this configuration.
    /// Unparseable values are ignored with a warning.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(value) = env::var(ENV_CACHE_PATH) {
            if !value.trim().is_empty() {
                self.root_path = PathBuf::from(value);
            }
        }

        if let Ok(value) = env::var(ENV_THREADS) {
            match value.trim().parse::<usize>() {
                Ok(threads) => self.threads = clamp_threads(threads),
                Err(_) => warn!(value = %value, "ignoring unparseable {}", ENV_THREADS),
            }
        }

        if let Ok(value) = env::var(ENV_COMPRESSOR) {
            match value.trim().parse::<Compressor>() {
                Ok(compressor) => self.compressor = compressor,
                Err(e) => warn!(error = %e, "ignoring invalid {}", ENV_COMPRESSOR),
            }
        }

        self
    }
}

fn clamp_threads(threads: usize) -> usize {
    if threads == 0 {
        0
    } else {
        threads.min(MAX_WRITE_THREADS)
    }
}
