//! # Cache Types
//!
//! Records handed out by the cache store.

use std::path::PathBuf;

use super::CacheKey;

/// A cached file on disk. Only ever constructed after a successful stat with a non-zero
/// size; validity is re-checked against the disk on every lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub path: PathBuf,
    pub size: u64,
}

/// Disk usage of the cache tree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheUsage {
    /// Number of namespace directories
    pub namespaces: usize,
    /// Number of cached files
    pub files: usize,
    /// Total size of cached files in bytes
    pub bytes: u64,
}
