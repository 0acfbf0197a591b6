//! # Builder for TransportConfig
//!
//! Fluent construction of [`TransportConfig`] values.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use imgcache_engine::TransportConfig;
//!
//! let config = TransportConfig::builder()
//!     .with_timeout(Duration::from_secs(60))
//!     .with_connect_timeout(Duration::from_secs(15))
//!     .with_user_agent("MyApp/1.0")
//!     .with_header("X-Api-Key", "my-secret-key")
//!     .build();
//! assert_eq!(config.user_agent, "MyApp/1.0");
//! ```

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::warn;

use crate::{TransportConfig, proxy::ProxyConfig};

#[derive(Debug, Clone)]
pub struct TransportConfigBuilder {
    config: TransportConfig,
}

impl TransportConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: TransportConfig::default(),
        }
    }

    /// Set the overall timeout for the entire HTTP request
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the read timeout
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    pub fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.config.follow_redirects = follow;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Add a custom HTTP header; invalid names or values are skipped with a warning
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        match (
            name.as_ref().parse::<HeaderName>(),
            HeaderValue::from_str(value.as_ref()),
        ) {
            (Ok(name), Ok(value)) => {
                self.config.headers.insert(name, value);
            }
            _ => warn!(name = name.as_ref(), "Skipping invalid HTTP header"),
        }
        self
    }

    /// Merge headers over the current set; entries in `headers` win
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        for (name, value) in headers.iter() {
            self.config.headers.insert(name.clone(), value.clone());
        }
        self
    }

    /// Set an explicit proxy; this turns off the system proxy
    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.config.proxy = Some(proxy);
        self.config.use_system_proxy = false;
        self
    }

    /// Only honoured while no explicit proxy is configured
    pub fn with_system_proxy(mut self, use_system_proxy: bool) -> Self {
        if self.config.proxy.is_none() {
            self.config.use_system_proxy = use_system_proxy;
        }
        self
    }

    pub fn build(self) -> TransportConfig {
        self.config
    }
}

impl Default for TransportConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::{ProxyAuth, ProxyType};

    #[test]
    fn test_builder_defaults() {
        let config = TransportConfigBuilder::new().build();
        assert_eq!(config.timeout, Duration::ZERO);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert!(config.follow_redirects);
        assert!(config.use_system_proxy);
        assert!(config.user_agent.starts_with("imgcache/"));
        assert!(config.headers.contains_key(reqwest::header::ACCEPT));
    }

    #[test]
    fn test_builder_customization() {
        let config = TransportConfigBuilder::new()
            .with_timeout(Duration::from_secs(60))
            .with_read_timeout(Duration::from_secs(5))
            .with_follow_redirects(false)
            .with_user_agent("Custom/1.0")
            .with_header("X-Custom-Header", "CustomValue")
            .with_header("bad header", "ignored")
            .with_system_proxy(false)
            .build();

        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.read_timeout, Duration::from_secs(5));
        assert!(!config.follow_redirects);
        assert_eq!(config.user_agent, "Custom/1.0");
        assert!(!config.use_system_proxy);
        assert_eq!(
            config.headers.get("X-Custom-Header").unwrap(),
            "CustomValue"
        );
        assert!(!config.headers.contains_key("bad header"));
        // Defaults survive
        assert!(config.headers.contains_key(reqwest::header::ACCEPT));
    }

    #[test]
    fn test_explicit_proxy_disables_system_proxy() {
        let config = TransportConfigBuilder::new()
            .with_proxy(ProxyConfig {
                url: "http://proxy.example.com:8080".to_string(),
                proxy_type: ProxyType::Http,
                auth: Some(ProxyAuth {
                    username: "user".to_string(),
                    password: "pass".to_string(),
                }),
            })
            .with_system_proxy(true)
            .build();

        assert!(!config.use_system_proxy);
        let proxy = config.proxy.unwrap();
        assert_eq!(proxy.url, "http://proxy.example.com:8080");
        assert_eq!(proxy.auth.unwrap().username, "user");
    }
}
