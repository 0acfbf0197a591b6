use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};

use crate::proxy::ProxyConfig;

const DEFAULT_USER_AGENT: &str = concat!("imgcache/", env!("CARGO_PKG_VERSION"));

/// Where and how cached files are stored
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Root of the cache tree; namespaces are created below it
    pub root: PathBuf,
    /// Tag the cache root so backup and sync tools skip it
    pub exclude_from_backup: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: std::env::temp_dir().join("imgcache"),
            exclude_from_backup: true,
        }
    }
}

impl CacheConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn with_exclude_from_backup(mut self, exclude: bool) -> Self {
        self.exclude_from_backup = exclude;
        self
    }
}

/// Configurable options for the HTTP transport
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Overall timeout for the entire HTTP request, zero disables it
    pub timeout: Duration,

    /// Connection timeout (time to establish initial connection)
    pub connect_timeout: Duration,

    /// Read timeout (maximum time between receiving data chunks)
    pub read_timeout: Duration,

    /// Whether to follow redirects
    pub follow_redirects: bool,

    /// User agent string
    pub user_agent: String,

    /// Custom HTTP headers for requests
    pub headers: HeaderMap,

    /// Proxy configuration (optional)
    pub proxy: Option<ProxyConfig>,

    /// Whether to use system proxy settings if available
    pub use_system_proxy: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::ZERO,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            follow_redirects: true,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            headers: TransportConfig::default_headers(),
            proxy: None,
            use_system_proxy: true,
        }
    }
}

impl TransportConfig {
    pub fn builder() -> crate::builder::TransportConfigBuilder {
        crate::builder::TransportConfigBuilder::new()
    }

    pub fn default_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();

        headers.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static("image/avif,image/webp,image/*,*/*;q=0.8"),
        );
        headers.insert(
            reqwest::header::CONNECTION,
            HeaderValue::from_static("keep-alive"),
        );

        headers
    }
}
