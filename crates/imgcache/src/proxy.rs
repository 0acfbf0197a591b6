use std::str::FromStr;

use reqwest::Proxy;

use crate::CacheError;

#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub enum ProxyType {
    Http,
    Https,
    Socks5,
    /// Every scheme goes through the proxy
    All,
}

impl FromStr for ProxyType {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "https" => Ok(Self::Https),
            "socks5" => Ok(Self::Socks5),
            "all" => Ok(Self::All),
            other => Err(CacheError::ProxyError(format!("unknown proxy type '{other}'"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProxyAuth {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Proxy server URL (e.g., "http://proxy.example.com:8080")
    pub url: String,
    pub proxy_type: ProxyType,
    pub auth: Option<ProxyAuth>,
}

impl ProxyConfig {
    /// Build the reqwest proxy for this configuration
    pub fn to_proxy(&self) -> Result<Proxy, CacheError> {
        let invalid = |e: reqwest::Error| CacheError::ProxyError(format!("{}: {e}", self.url));

        let proxy = match self.proxy_type {
            ProxyType::Http => Proxy::http(&self.url).map_err(invalid)?,
            ProxyType::Https => Proxy::https(&self.url).map_err(invalid)?,
            ProxyType::Socks5 if self.url.starts_with("socks5://") => {
                Proxy::all(&self.url).map_err(invalid)?
            }
            ProxyType::Socks5 => Proxy::all(format!("socks5://{}", self.url)).map_err(invalid)?,
            ProxyType::All => Proxy::all(&self.url).map_err(invalid)?,
        };

        Ok(match &self.auth {
            Some(auth) => proxy.basic_auth(&auth.username, &auth.password),
            None => proxy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_type_parsing() {
        assert_eq!("HTTP".parse::<ProxyType>().unwrap(), ProxyType::Http);
        assert_eq!("socks5".parse::<ProxyType>().unwrap(), ProxyType::Socks5);
        assert_eq!("all".parse::<ProxyType>().unwrap(), ProxyType::All);
        assert!("ftp".parse::<ProxyType>().is_err());
    }

    #[test]
    fn test_build_proxy() {
        let config = ProxyConfig {
            url: "127.0.0.1:1080".to_string(),
            proxy_type: ProxyType::Socks5,
            auth: Some(ProxyAuth {
                username: "u".to_string(),
                password: "p".to_string(),
            }),
        };
        assert!(config.to_proxy().is_ok());

        let config = ProxyConfig {
            url: "http://proxy.example.com:8080".to_string(),
            proxy_type: ProxyType::Http,
            auth: None,
        };
        assert!(config.to_proxy().is_ok());
    }
}
