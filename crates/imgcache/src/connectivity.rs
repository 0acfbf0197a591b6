//! # Connectivity
//!
//! Process-wide reachability flag with explicit subscriptions. A subscriber receives the
//! current state as soon as it subscribes, then one event per transition. Subscriptions
//! are plain channels; dropping the receiver is enough to stop deliveries, but owners are
//! expected to [`ConnectivityMonitor::unsubscribe`] on teardown.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::Client;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityState {
    pub reachable: bool,
}

impl ConnectivityState {
    pub const ONLINE: Self = Self { reachable: true };
    pub const OFFLINE: Self = Self { reachable: false };

    pub fn is_reachable(&self) -> bool {
        self.reachable
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Receiving end of a connectivity subscription
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    events: mpsc::UnboundedReceiver<ConnectivityState>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub async fn recv(&mut self) -> Option<ConnectivityState> {
        self.events.recv().await
    }

    pub fn try_recv(&mut self) -> Option<ConnectivityState> {
        self.events.try_recv().ok()
    }
}

#[derive(Debug)]
struct MonitorInner {
    state: ConnectivityState,
    listeners: HashMap<SubscriptionId, mpsc::UnboundedSender<ConnectivityState>>,
    next_id: u64,
}

/// Shared reachability state; clones observe and update the same flag
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    inner: Arc<Mutex<MonitorInner>>,
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ConnectivityMonitor {
    pub fn new(reachable: bool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MonitorInner {
                state: ConnectivityState { reachable },
                listeners: HashMap::new(),
                next_id: 0,
            })),
        }
    }

    /// The process-wide monitor, optimistic until told otherwise.
    pub fn global() -> &'static ConnectivityMonitor {
        static GLOBAL: OnceLock<ConnectivityMonitor> = OnceLock::new();
        GLOBAL.get_or_init(ConnectivityMonitor::default)
    }

    pub fn current_state(&self) -> ConnectivityState {
        self.inner.lock().state
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock();

        let id = SubscriptionId(inner.next_id);
        inner.next_id += 1;

        // Receiver is alive, so this cannot fail.
        let _ = tx.send(inner.state);
        inner.listeners.insert(id, tx);

        debug!(subscription = id.0, "Connectivity subscription added");
        Subscription { id, events: rx }
    }

    /// Remove a subscription. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.inner.lock().listeners.remove(&id).is_some();
        if removed {
            debug!(subscription = id.0, "Connectivity subscription removed");
        }
        removed
    }

    /// Update reachability. Subscribers are only notified on an actual transition;
    /// returns whether one happened.
    pub fn set_reachable(&self, reachable: bool) -> bool {
        let mut inner = self.inner.lock();
        if inner.state.reachable == reachable {
            return false;
        }

        let state = ConnectivityState { reachable };
        inner.state = state;
        inner.listeners.retain(|_, tx| tx.send(state).is_ok());

        info!(reachable, subscribers = inner.listeners.len(), "Connectivity changed");
        true
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().listeners.len()
    }
}

/// Periodically checks a URL and feeds the result into a [`ConnectivityMonitor`].
/// Any HTTP response counts as reachable; only connection-level errors count as offline.
#[derive(Debug, Clone)]
pub struct ReachabilityProbe {
    client: Client,
    url: Url,
    interval: Duration,
}

impl ReachabilityProbe {
    pub fn new(client: Client, url: Url, interval: Duration) -> Self {
        Self {
            client,
            url,
            interval,
        }
    }

    pub async fn check(&self) -> bool {
        match self.client.head(self.url.clone()).send().await {
            Ok(response) => {
                debug!(url = %self.url, status = %response.status(), "Reachability probe answered");
                true
            }
            Err(e) => {
                debug!(url = %self.url, error = %e, "Reachability probe failed");
                false
            }
        }
    }

    /// Run the probe in a background task until the handle is aborted.
    pub fn spawn(self, monitor: ConnectivityMonitor) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            loop {
                interval.tick().await;
                let reachable = self.check().await;
                monitor.set_reachable(reachable);
            }
        })
    }
}
