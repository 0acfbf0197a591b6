//! # Cache Keys
//!
//! Keys are derived from the request path plus an optional selection of query values,
//! hashed with SHA-1 so they are safe to use as file names. A file extension found at the
//! end of the path is kept as a suffix, which lets platform decoders sniff the type from
//! the file name alone.

use std::fmt;

use sha1::{Digest, Sha1};
use url::Url;

use crate::request::QueryKeyPolicy;

/// Deterministic, filename-safe identifier of a cached resource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derive the cache key of `url` under `policy`.
pub fn derive_key(url: &Url, policy: &QueryKeyPolicy) -> CacheKey {
    let path = url.path();
    let mut cacheable = String::from(path);

    match policy {
        QueryKeyPolicy::None => {}
        QueryKeyPolicy::All => {
            if let Some(query) = url.query() {
                cacheable.push_str(query);
            }
        }
        QueryKeyPolicy::Names(names) => {
            for name in names {
                if let Some((_, value)) = url.query_pairs().find(|(k, _)| k == name.as_str()) {
                    cacheable.push_str(&value);
                }
            }
        }
    }

    let mut key = hex::encode(Sha1::digest(cacheable.as_bytes()));
    if let Some(ext) = extension_of(path) {
        key.push('.');
        key.push_str(ext);
    }

    CacheKey(key)
}

// Last dot-delimited segment of the path, unless it spans a directory separator.
fn extension_of(path: &str) -> Option<&str> {
    let candidate = path.rsplit('.').next()?;
    if candidate.is_empty() || candidate.len() >= path.len() || candidate.contains('/') {
        return None;
    }
    Some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(uri: &str, policy: &QueryKeyPolicy) -> CacheKey {
        derive_key(&Url::parse(uri).unwrap(), policy)
    }

    fn names(list: &[&str]) -> QueryKeyPolicy {
        QueryKeyPolicy::Names(list.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_path_only_key_with_extension() {
        let k = key("https://img.example.com/a/b.png", &QueryKeyPolicy::None);
        // sha1("/a/b.png")
        assert_eq!(k.as_str(), "f06f41d3d34b3bc9ab888004d83c3c59a32348c6.png");
    }

    #[test]
    fn test_key_is_deterministic() {
        let policy = names(&["v"]);
        let first = key("https://img.example.com/img.png?v=1&x=a", &policy);
        for _ in 0..10 {
            assert_eq!(first, key("https://img.example.com/img.png?v=1&x=a", &policy));
        }
        // Host does not participate, only path and selected query values
        assert_eq!(first, key("http://cdn.example.org/img.png?v=1", &policy));
    }

    #[test]
    fn test_selected_query_params() {
        let policy = names(&["v"]);
        let v1 = key("https://img.example.com/img.png?v=1", &policy);
        let v2 = key("https://img.example.com/img.png?v=2", &policy);
        assert_ne!(v1, v2);

        let xa = key("https://img.example.com/img.png?v=1&x=a", &policy);
        let xb = key("https://img.example.com/img.png?v=1&x=b", &policy);
        assert_eq!(xa, xb);
        assert_eq!(v1, xa);

        // sha1("/img.png1")
        assert_eq!(v1.as_str(), "b5acb584790f39db13261b30e59bd9da6ebe9fe2.png");
    }

    #[test]
    fn test_selected_params_follow_given_order() {
        let vw = key("https://h.example.com/i.jpg?v=1&w=2", &names(&["v", "w"]));
        let wv = key("https://h.example.com/i.jpg?v=1&w=2", &names(&["w", "v"]));
        assert_ne!(vw, wv);

        // Absent names are skipped
        let absent = key("https://h.example.com/i.jpg?v=1", &names(&["missing", "v"]));
        let only_v = key("https://h.example.com/i.jpg?v=1", &names(&["v"]));
        assert_eq!(absent, only_v);
    }

    #[test]
    fn test_all_and_none_policies() {
        let a = key("https://h.example.com/i.jpg?x=1", &QueryKeyPolicy::All);
        let b = key("https://h.example.com/i.jpg?x=2", &QueryKeyPolicy::All);
        assert_ne!(a, b);

        let c = key("https://h.example.com/i.jpg?x=1", &QueryKeyPolicy::None);
        let d = key("https://h.example.com/i.jpg?x=2", &QueryKeyPolicy::None);
        assert_eq!(c, d);
        assert_eq!(c, key("https://h.example.com/i.jpg", &QueryKeyPolicy::All));
    }

    #[test]
    fn test_extension_detection() {
        assert_eq!(extension_of("/a/b.png"), Some("png"));
        assert_eq!(extension_of("/a/b.tar.gz"), Some("gz"));
        assert_eq!(extension_of("/a/b"), None);
        assert_eq!(extension_of("/"), None);
        assert_eq!(extension_of("/a.d/b"), None);
        assert_eq!(extension_of("/a/b."), None);

        let k = key("https://h.example.com/photos/123", &QueryKeyPolicy::None);
        assert_eq!(k.as_str().len(), 40);
        assert!(!k.as_str().contains('.'));
    }
}
