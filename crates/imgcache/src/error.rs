use reqwest::StatusCode;

/// Reason a resource ended up without a cached file.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FailureKind {
    #[error("resource not found (404)")]
    NotFound,

    #[error("access to resource forbidden (403)")]
    Forbidden,

    #[error("transfer failed: {0}")]
    Transfer(String),

    #[error("cache directory could not be created: {0}")]
    Directory(String),
}

impl FailureKind {
    /// Classify a non-success status reported by the transport.
    pub fn from_status(status: StatusCode) -> Self {
        Self::refusal(status)
            .unwrap_or_else(|| Self::Transfer(format!("server returned status code {status}")))
    }

    /// Statuses that make a resource permanently uncacheable for this attempt.
    pub fn refusal(status: StatusCode) -> Option<Self> {
        match status {
            StatusCode::NOT_FOUND => Some(Self::NotFound),
            StatusCode::FORBIDDEN => Some(Self::Forbidden),
            _ => None,
        }
    }
}

// Errors surfaced by the public API. Download failures never escape the controller,
// they are folded into `Resolution::Uncacheable` instead.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid proxy configuration: {0}")]
    ProxyError(String),
}

/// Error returned by a [`Transport`](crate::transport::Transport) when a transfer breaks
/// off before a final status is known.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Interrupted(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(
            FailureKind::from_status(StatusCode::NOT_FOUND),
            FailureKind::NotFound
        );
        assert_eq!(
            FailureKind::from_status(StatusCode::FORBIDDEN),
            FailureKind::Forbidden
        );
        assert!(matches!(
            FailureKind::from_status(StatusCode::INTERNAL_SERVER_ERROR),
            FailureKind::Transfer(msg) if msg.contains("500")
        ));
        assert!(FailureKind::refusal(StatusCode::BAD_GATEWAY).is_none());
        assert!(FailureKind::refusal(StatusCode::OK).is_none());
    }
}
