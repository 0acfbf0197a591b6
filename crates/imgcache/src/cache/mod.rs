//! # Cache System
//!
//! On-disk storage of downloaded resources. Files live at
//! `<root>/<namespace>/<key>`, where the namespace is the host of the resource URI.

mod key;
mod store;
mod types;

pub use key::{CacheKey, derive_key};
pub use store::{CACHEDIR_TAG, CacheStore};
pub use types::{CacheEntry, CacheUsage};

pub(crate) use store::remove_file_best_effort;
