//! # Cache Store
//!
//! Filesystem-backed mapping from `(namespace, key)` to a file. Nothing is indexed in
//! memory; every lookup stats the disk again.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::fs;
use tokio::io;
use tracing::{debug, warn};

use super::{CacheEntry, CacheKey, CacheUsage};
use crate::config::CacheConfig;
use crate::request::ResourceRequest;

/// Name of the tag file that marks the cache root for backup and sync tools.
pub const CACHEDIR_TAG: &str = "CACHEDIR.TAG";

const CACHEDIR_TAG_CONTENT: &str = "Signature: 8a477f597d28d172789f06886806bc55\n\
# This file is a cache directory tag created by imgcache.\n\
# For information about cache directory tags see https://bford.info/cachedir/\n";

#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
    exclude_from_backup: bool,
    tagged: Arc<AtomicBool>,
}

impl CacheStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            root: config.root.clone(),
            exclude_from_backup: config.exclude_from_backup,
            tagged: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of a cached resource, whether or not it exists
    pub fn path_for(&self, namespace: &str, key: &CacheKey) -> PathBuf {
        self.root.join(namespace).join(key.as_str())
    }

    /// Stat the file for `key`; a missing, empty or unreadable file is a miss.
    pub async fn lookup(&self, namespace: &str, key: &CacheKey) -> Option<CacheEntry> {
        self.entry_at(key.clone(), self.path_for(namespace, key))
            .await
    }

    pub(crate) async fn entry_at(&self, key: CacheKey, path: PathBuf) -> Option<CacheEntry> {
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() && meta.len() > 0 => Some(CacheEntry {
                key,
                path,
                size: meta.len(),
            }),
            Ok(meta) => {
                debug!(path = ?path, size = meta.len(), "Ignoring empty or non-file cache entry");
                None
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = ?path, error = %e, "Failed to stat cache file, treating as miss");
                None
            }
        }
    }

    /// Create the namespace directory if it does not exist yet.
    pub async fn ensure_directory(&self, namespace: &str) -> io::Result<PathBuf> {
        let dir = self.root.join(namespace);
        fs::create_dir_all(&dir).await?;

        if self.exclude_from_backup {
            self.tag_root().await;
        }

        Ok(dir)
    }

    async fn tag_root(&self) {
        if self.tagged.load(Ordering::Acquire) {
            return;
        }

        let tag = self.root.join(CACHEDIR_TAG);
        match fs::try_exists(&tag).await {
            Ok(true) => {}
            Ok(false) => {
                if let Err(e) = fs::write(&tag, CACHEDIR_TAG_CONTENT).await {
                    warn!(path = ?tag, error = %e, "Failed to write cache directory tag");
                    return;
                }
                debug!(path = ?tag, "Tagged cache root for backup exclusion");
            }
            Err(e) => {
                warn!(path = ?tag, error = %e, "Failed to check cache directory tag");
                return;
            }
        }

        self.tagged.store(true, Ordering::Release);
    }

    /// Remove a file; failures are logged and swallowed.
    pub async fn delete(&self, path: &Path) {
        remove_file_best_effort(path).await;
    }

    /// Remove the cached file of `request`, if any.
    pub async fn remove(&self, request: &ResourceRequest) {
        let path = self.path_for(request.namespace(), &request.cache_key());
        self.delete(&path).await;
    }

    /// Count namespaces, files and bytes under the cache root.
    pub async fn usage(&self) -> io::Result<CacheUsage> {
        let mut usage = CacheUsage::default();

        let mut namespaces = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(usage),
            Err(e) => return Err(e),
        };

        while let Some(namespace) = namespaces.next_entry().await? {
            if !namespace.file_type().await?.is_dir() {
                continue;
            }
            usage.namespaces += 1;

            let mut files = fs::read_dir(namespace.path()).await?;
            while let Some(file) = files.next_entry().await? {
                let meta = file.metadata().await?;
                if meta.is_file() {
                    usage.files += 1;
                    usage.bytes += meta.len();
                }
            }
        }

        Ok(usage)
    }

    /// Remove every namespace directory, keeping the root and its tag.
    /// Returns the number of namespaces removed.
    pub async fn clear(&self) -> io::Result<usize> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                warn!(dir = ?self.root, error = %e, "Failed to read cache directory");
                return Err(e);
            }
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            match fs::remove_dir_all(&path).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = ?path, error = %e, "Failed to remove cache namespace"),
            }
        }

        debug!(count = removed, "Cleared cache namespaces");
        Ok(removed)
    }
}

pub(crate) async fn remove_file_best_effort(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => debug!(path = ?path, "Removed cache file"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = ?path, error = %e, "Failed to remove cache file"),
    }
}
