//! # imgcache
//!
//! A disk cache for remote image resources. Each display slot gets a
//! [`ResourceCacheController`] which answers a request from the cache when it can and
//! otherwise downloads the resource into a per-host directory, cancelling whatever it
//! was fetching before.
//!
//! ## Features
//!
//! - Deterministic cache keys with configurable query parameter handling
//! - Offline deferral driven by a shared [`ConnectivityMonitor`]
//! - Pluggable [`Transport`], with a reqwest-backed default
//! - Cancellation that never leaves partial files behind

pub mod builder;
pub mod cache;
pub mod config;
pub mod connectivity;
pub mod controller;
pub mod error;
pub mod job;
pub mod proxy;
pub mod request;
pub mod transport;

pub use builder::TransportConfigBuilder;
pub use cache::{CACHEDIR_TAG, CacheEntry, CacheKey, CacheStore, CacheUsage, derive_key};
pub use config::{CacheConfig, TransportConfig};
pub use connectivity::{ConnectivityMonitor, ConnectivityState, ReachabilityProbe, Subscription};
pub use controller::{Resolution, ResourceCacheController};
pub use error::{CacheError, FailureKind, TransportError};
pub use job::{DownloadJob, JobEvent, JobEventKind, JobHandle, JobId, JobOutcome, JobState};
pub use proxy::{ProxyAuth, ProxyConfig, ProxyType};
pub use request::{QueryKeyPolicy, QueryParamsInKey, ResourceDescriptor, ResourceRequest};
pub use transport::{HttpTransport, TransferSink, Transport, create_client};
