//! # HTTP Transport
//!
//! Default [`Transport`] backed by a reqwest client. Bodies are streamed chunk by chunk
//! into the target file; nothing is created on disk for a non-success status.

use std::path::Path;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

use super::{TransferSink, Transport};
use crate::error::TransportError;
use crate::request::ResourceRequest;
use crate::{CacheError, TransportConfig};

/// Create a reqwest Client with the provided configuration
pub fn create_client(config: &TransportConfig) -> Result<Client, CacheError> {
    let mut client_builder = Client::builder()
        .pool_max_idle_per_host(5)
        .user_agent(&config.user_agent)
        .default_headers(config.headers.clone())
        .redirect(if config.follow_redirects {
            reqwest::redirect::Policy::limited(10)
        } else {
            reqwest::redirect::Policy::none()
        });

    if !config.timeout.is_zero() {
        client_builder = client_builder.timeout(config.timeout);
    }

    if !config.connect_timeout.is_zero() {
        client_builder = client_builder.connect_timeout(config.connect_timeout);
    }

    if !config.read_timeout.is_zero() {
        client_builder = client_builder.read_timeout(config.read_timeout);
    }

    if let Some(proxy_config) = &config.proxy {
        client_builder = client_builder.proxy(proxy_config.to_proxy()?);
        info!(proxy_url = %proxy_config.url, "Using explicitly configured proxy for downloads");
    } else if config.use_system_proxy {
        // reqwest picks up system proxy settings unless no_proxy() is called
        debug!("Using system proxy settings for downloads");
    } else {
        client_builder = client_builder.no_proxy();
        debug!("Proxy disabled for downloads");
    }

    client_builder.build().map_err(CacheError::from)
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, CacheError> {
        Self::with_config(&TransportConfig::default())
    }

    pub fn with_config(config: &TransportConfig) -> Result<Self, CacheError> {
        Ok(Self {
            client: create_client(config)?,
        })
    }

    /// Share an existing client, e.g. with a reachability probe
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(skip(self, target, sink), fields(uri = %request.uri(), job = %sink.job_id()), level = "debug")]
    async fn download(
        &self,
        request: &ResourceRequest,
        target: &Path,
        sink: &TransferSink,
    ) -> Result<StatusCode, TransportError> {
        let response = tokio::select! {
            response = self.client.get(request.url().clone()).send() => response?,
            _ = sink.cancelled() => return Err(cancelled()),
        };
        let status = response.status();
        let content_length = response.content_length();

        sink.begin(status, content_length);
        if !status.is_success() {
            debug!(%status, "Server did not return the resource");
            return Ok(status);
        }

        debug!(
            ?content_length,
            background = request.background(),
            "Streaming response body to cache file"
        );

        // File operations are never raced against cancellation, so none of them is still
        // running when the job cleans up.
        let mut file = File::create(target).await?;
        let mut body = response.bytes_stream();
        let mut bytes_written = 0u64;

        loop {
            let chunk = tokio::select! {
                chunk = body.next() => chunk,
                _ = sink.cancelled() => return Err(cancelled()),
            };
            let Some(chunk) = chunk else {
                break;
            };

            let chunk = chunk?;
            file.write_all(&chunk).await?;
            bytes_written += chunk.len() as u64;

            // Whatever is reported as complete has to be on disk already.
            if content_length == Some(bytes_written) {
                file.flush().await?;
            }
            sink.progress(bytes_written, content_length);
        }

        file.flush().await?;
        Ok(status)
    }
}

fn cancelled() -> TransportError {
    TransportError::Interrupted("download cancelled".to_string())
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::Router;
    use axum::body::{Body, Bytes};
    use axum::routing::get;
    use tokio::sync::mpsc;

    use super::*;
    use crate::job::{DownloadJob, JobEvent, JobEventKind, JobId, JobOutcome, JobState};
    use crate::request::QueryKeyPolicy;
    use crate::FailureKind;

    const PNG_BODY: &[u8] = b"\x89PNG\r\n\x1a\nnot-really-a-png";

    async fn serve() -> SocketAddr {
        let app = Router::new()
            .route("/ok.png", get(|| async { PNG_BODY }))
            .route(
                "/missing.png",
                get(|| async { (axum::http::StatusCode::NOT_FOUND, "missing") }),
            )
            .route(
                "/forbidden.png",
                get(|| async { (axum::http::StatusCode::FORBIDDEN, "forbidden") }),
            )
            .route(
                "/broken.png",
                get(|| async { (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
            )
            .route(
                "/endless.png",
                get(|| async {
                    let first = futures::stream::once(async {
                        Ok::<_, std::io::Error>(Bytes::from_static(PNG_BODY))
                    });
                    Body::from_stream(first.chain(futures::stream::pending()))
                }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    async fn run_job(addr: SocketAddr, path: &str, target: &Path) -> (JobState, Vec<JobEvent>) {
        let transport = HttpTransport::with_config(
            &TransportConfig::builder().with_system_proxy(false).build(),
        )
        .unwrap();
        let request =
            ResourceRequest::new(&format!("http://{addr}{path}"), QueryKeyPolicy::None).unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let job = DownloadJob::start(
            JobId::new(7),
            Arc::new(transport),
            request,
            target.to_path_buf(),
            tx,
        );

        let mut events = Vec::new();
        loop {
            let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
                .await
                .unwrap()
                .unwrap();
            let finished = matches!(event.kind, JobEventKind::Finished(_));
            events.push(event);
            if finished {
                break;
            }
        }

        let handle = job.handle().clone();
        job.join().await;
        (handle.state(), events)
    }

    #[tokio::test]
    async fn test_http_download_to_file() {
        let addr = serve().await;
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("ok.png");

        let (state, events) = run_job(addr, "/ok.png", &target).await;

        assert_eq!(state, JobState::Completed);
        assert_eq!(
            events[0].kind,
            JobEventKind::Begin {
                status: StatusCode::OK,
                content_length: Some(PNG_BODY.len() as u64),
            }
        );
        assert_eq!(tokio::fs::read(&target).await.unwrap(), PNG_BODY);
    }

    #[tokio::test]
    async fn test_http_refusals_leave_no_file() {
        let addr = serve().await;

        for (path, kind) in [
            ("/missing.png", FailureKind::NotFound),
            ("/forbidden.png", FailureKind::Forbidden),
        ] {
            let dir = tempfile::tempdir().unwrap();
            let target = dir.path().join("x.png");

            let (state, events) = run_job(addr, path, &target).await;

            assert_eq!(state, JobState::Failed(kind.clone()));
            assert_eq!(
                events.last().unwrap().kind,
                JobEventKind::Finished(JobOutcome::Failed(kind))
            );
            assert!(
                !events
                    .iter()
                    .any(|e| matches!(e.kind, JobEventKind::Progress { .. }))
            );
            assert!(!target.exists());
        }
    }

    #[tokio::test]
    async fn test_http_server_error_is_transfer_failure() {
        let addr = serve().await;
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("broken.png");

        let (state, _) = run_job(addr, "/broken.png", &target).await;

        assert!(matches!(state, JobState::Failed(FailureKind::Transfer(_))));
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_http_cancel_mid_body_returns_promptly() {
        let addr = serve().await;
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("endless.png");

        let transport = HttpTransport::with_config(
            &TransportConfig::builder().with_system_proxy(false).build(),
        )
        .unwrap();
        let request =
            ResourceRequest::new(&format!("http://{addr}/endless.png"), QueryKeyPolicy::None)
                .unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let job = DownloadJob::start(JobId::new(9), Arc::new(transport), request, target.clone(), tx);

        loop {
            let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
                .await
                .unwrap()
                .unwrap();
            if matches!(event.kind, JobEventKind::Progress { .. }) {
                break;
            }
        }
        assert!(target.exists());

        let handle = job.handle().clone();
        assert!(job.cancel());
        // Well inside the grace period: the transport noticed the cancellation itself
        tokio::time::timeout(Duration::from_secs(1), job.join())
            .await
            .unwrap();

        assert_eq!(handle.state(), JobState::Cancelled);
        assert!(!target.exists());
        assert_eq!(
            rx.recv().await.unwrap().kind,
            JobEventKind::Finished(JobOutcome::Cancelled)
        );
    }
}
