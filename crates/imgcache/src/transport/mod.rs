//! # Transport
//!
//! The seam between the cache core and whatever moves bytes over the network. A transport
//! streams one resource into a target file, reporting through the [`TransferSink`] it is
//! given, and returns the final status. On cancellation a transport should return promptly
//! (see [`TransferSink::cancelled`]); one that does not is dropped after a grace period.

use std::path::Path;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::error::TransportError;
use crate::request::ResourceRequest;

pub use crate::job::TransferSink;

mod http;

pub use http::{HttpTransport, create_client};

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Fetch `request` into `target`.
    ///
    /// Implementations call [`TransferSink::begin`] once the response status is known and
    /// [`TransferSink::progress`] after each chunk reaches the file. A 404 or 403 must not
    /// leave a file behind.
    async fn download(
        &self,
        request: &ResourceRequest,
        target: &Path,
        sink: &TransferSink,
    ) -> Result<StatusCode, TransportError>;
}
