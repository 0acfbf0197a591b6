//! # Resource Requests
//!
//! A [`ResourceRequest`] is built once per source assignment and never mutated afterwards.
//! The cache namespace is the host of the parsed URI, so a request without a host is
//! rejected here, before any key derivation happens.

use serde::Deserialize;
use url::Url;

use crate::CacheError;
use crate::cache::{CacheKey, derive_key};

/// Which query parameters take part in the cache key
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum QueryKeyPolicy {
    /// Path only
    #[default]
    None,
    /// The whole raw query string
    All,
    /// The values of these parameters, in this order
    Names(Vec<String>),
}

/// Wire shape of `useQueryParamsInCacheKey`: either a flag or a list of parameter names.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum QueryParamsInKey {
    Flag(bool),
    Names(Vec<String>),
}

impl Default for QueryParamsInKey {
    fn default() -> Self {
        Self::Flag(false)
    }
}

impl From<QueryParamsInKey> for QueryKeyPolicy {
    fn from(value: QueryParamsInKey) -> Self {
        match value {
            QueryParamsInKey::Flag(false) => Self::None,
            QueryParamsInKey::Flag(true) => Self::All,
            QueryParamsInKey::Names(names) => Self::Names(names),
        }
    }
}

/// Request descriptor as handed over by a display layer.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    pub uri: String,
    #[serde(default)]
    pub use_query_params_in_cache_key: QueryParamsInKey,
    #[serde(default)]
    pub download_in_background: bool,
}

/// An immutable request for one remote resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRequest {
    url: Url,
    namespace: String,
    policy: QueryKeyPolicy,
    background: bool,
}

impl ResourceRequest {
    /// Parse `uri` and derive its cache namespace from the host.
    pub fn new(uri: &str, policy: QueryKeyPolicy) -> Result<Self, CacheError> {
        let url = Url::parse(uri).map_err(|e| CacheError::InvalidRequest(format!("{uri}: {e}")))?;
        let namespace = match url.host_str() {
            Some(host) if !host.is_empty() => host.to_string(),
            _ => {
                return Err(CacheError::InvalidRequest(format!(
                    "{uri}: URI has no host to derive a cache namespace from"
                )));
            }
        };

        Ok(Self {
            url,
            namespace,
            policy,
            background: false,
        })
    }

    /// Ask the transport to keep the transfer going while the caller is in the background.
    pub fn with_background(mut self, background: bool) -> Self {
        self.background = background;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn uri(&self) -> &str {
        self.url.as_str()
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn policy(&self) -> &QueryKeyPolicy {
        &self.policy
    }

    pub fn background(&self) -> bool {
        self.background
    }

    /// Cache key of this request under its query policy
    pub fn cache_key(&self) -> CacheKey {
        derive_key(&self.url, &self.policy)
    }
}

impl TryFrom<ResourceDescriptor> for ResourceRequest {
    type Error = CacheError;

    fn try_from(descriptor: ResourceDescriptor) -> Result<Self, Self::Error> {
        Ok(
            Self::new(&descriptor.uri, descriptor.use_query_params_in_cache_key.into())?
                .with_background(descriptor.download_in_background),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_is_host() {
        let request =
            ResourceRequest::new("https://img.example.com:8443/a/b.png", QueryKeyPolicy::None)
                .unwrap();
        assert_eq!(request.namespace(), "img.example.com");
        assert_eq!(request.url().path(), "/a/b.png");
        assert!(!request.background());
    }

    #[test]
    fn test_rejects_unparsable_and_hostless_uris() {
        assert!(matches!(
            ResourceRequest::new("not a uri", QueryKeyPolicy::None),
            Err(CacheError::InvalidRequest(_))
        ));
        assert!(matches!(
            ResourceRequest::new("file:///tmp/a.png", QueryKeyPolicy::None),
            Err(CacheError::InvalidRequest(_))
        ));
        assert!(matches!(
            ResourceRequest::new("data:image/png;base64,AAAA", QueryKeyPolicy::All),
            Err(CacheError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_descriptor_flag_and_names() {
        let descriptor: ResourceDescriptor = serde_json::from_str(
            r#"{"uri":"https://img.example.com/a.png?v=1","useQueryParamsInCacheKey":true,"downloadInBackground":true}"#,
        )
        .unwrap();
        let request = ResourceRequest::try_from(descriptor).unwrap();
        assert_eq!(request.policy(), &QueryKeyPolicy::All);
        assert!(request.background());

        let descriptor: ResourceDescriptor = serde_json::from_str(
            r#"{"uri":"https://img.example.com/a.png","useQueryParamsInCacheKey":["v","w"]}"#,
        )
        .unwrap();
        let request = ResourceRequest::try_from(descriptor).unwrap();
        assert_eq!(
            request.policy(),
            &QueryKeyPolicy::Names(vec!["v".to_string(), "w".to_string()])
        );
        assert!(!request.background());
    }

    #[test]
    fn test_descriptor_defaults_to_path_only() {
        let descriptor: ResourceDescriptor =
            serde_json::from_str(r#"{"uri":"https://img.example.com/a.png?v=1"}"#).unwrap();
        let request = ResourceRequest::try_from(descriptor).unwrap();
        assert_eq!(request.policy(), &QueryKeyPolicy::None);
    }
}
