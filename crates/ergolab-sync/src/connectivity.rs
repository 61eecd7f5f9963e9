//! # Connectivity Monitor
//!
//! Tracks whether the device can currently reach the inventory service and
//! lets interested parties react to transitions.
//!
//! ## Design
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Connectivity Monitoring                             │
//! │                                                                         │
//! │  ┌──────────────┐   set_state()   ┌──────────────────────────────────┐ │
//! │  │ HealthProbe  │ ──────────────► │ ConnectivityMonitor              │ │
//! │  │ (GET /health │                 │ (tokio watch channel)            │ │
//! │  │  every N s)  │                 │                                  │ │
//! │  └──────────────┘                 │ Publishes only REAL transitions: │ │
//! │                                   │ repeated identical reports are   │ │
//! │  Host platform hooks can call     │ swallowed by send_if_modified    │ │
//! │  set_state() directly too.        └───────────────┬──────────────────┘ │
//! │                                                   │                    │
//! │                                      subscribe()  │                    │
//! │                          ┌────────────────────────┼─────────────┐      │
//! │                          ▼                        ▼             ▼      │
//! │                   SyncCoordinator          LiveUpdates      UI layer   │
//! │                   (trigger pass on         (reconnect on                │
//! │                    offline→online)          online)                     │
//! │                                                                         │
//! │  Dropping a ConnectivitySubscription unsubscribes it; the monitor      │
//! │  never retains dead listeners.                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Connectivity State
// =============================================================================

/// Whether the inventory service is currently reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    /// The service is reachable.
    Online,

    /// The service is not reachable. All reads are served from cache and
    /// all writes queue locally.
    Offline,
}

impl ConnectivityState {
    pub fn is_online(&self) -> bool {
        matches!(self, ConnectivityState::Online)
    }
}

impl std::fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectivityState::Online => write!(f, "online"),
            ConnectivityState::Offline => write!(f, "offline"),
        }
    }
}

// =============================================================================
// Connectivity Monitor
// =============================================================================

/// Shared connectivity state with change notification.
///
/// Cheap to clone; all clones publish into and read from the same channel.
/// Every instance is explicit state owned by its creator, so tests can run
/// several monitors side by side without interference.
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    tx: watch::Sender<ConnectivityState>,
}

impl ConnectivityMonitor {
    /// Creates a monitor with the given initial state.
    pub fn new(initial: ConnectivityState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        ConnectivityMonitor { tx }
    }

    /// Creates a monitor that starts offline. The safe default: nothing is
    /// attempted against the network until a probe or host hook reports
    /// otherwise.
    pub fn starting_offline() -> Self {
        Self::new(ConnectivityState::Offline)
    }

    /// Returns the current state.
    pub fn state(&self) -> ConnectivityState {
        *self.tx.borrow()
    }

    /// Reports a state observation.
    ///
    /// Subscribers are only woken on an actual transition; reporting the
    /// current state again is a no-op.
    ///
    /// ## Returns
    /// `true` if this was a transition.
    pub fn set_state(&self, state: ConnectivityState) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });

        if changed {
            info!(state = %state, "Connectivity changed");
        }

        changed
    }

    /// Shorthand for `set_state(ConnectivityState::Online)`.
    pub fn set_online(&self) -> bool {
        self.set_state(ConnectivityState::Online)
    }

    /// Shorthand for `set_state(ConnectivityState::Offline)`.
    pub fn set_offline(&self) -> bool {
        self.set_state(ConnectivityState::Offline)
    }

    /// Registers a listener for state transitions.
    pub fn subscribe(&self) -> ConnectivitySubscription {
        ConnectivitySubscription {
            rx: self.tx.subscribe(),
        }
    }
}

/// A live subscription to connectivity transitions.
///
/// Dropping the subscription unregisters it.
#[derive(Debug)]
pub struct ConnectivitySubscription {
    rx: watch::Receiver<ConnectivityState>,
}

impl ConnectivitySubscription {
    /// Returns the state as of the latest observation.
    pub fn current(&self) -> ConnectivityState {
        *self.rx.borrow()
    }

    /// Waits for the next transition and returns the new state.
    ///
    /// ## Errors
    /// [`SyncError::ChannelError`] once the monitor has been dropped.
    pub async fn changed(&mut self) -> SyncResult<ConnectivityState> {
        self.rx
            .changed()
            .await
            .map_err(|_| SyncError::ChannelError("connectivity monitor dropped".into()))?;
        Ok(*self.rx.borrow_and_update())
    }
}

// =============================================================================
// Health Probes
// =============================================================================

/// A reachability check against the inventory service.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Returns true if the service answered.
    async fn check(&self) -> bool;
}

/// Probe that GETs the service health endpoint.
#[derive(Debug, Clone)]
pub struct HttpHealthProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpHealthProbe {
    /// ## Arguments
    /// * `base_url` - Service base URL; `/health` is appended
    /// * `timeout` - Probe timeout; an unanswered probe counts as offline
    pub fn new(base_url: &str, timeout: Duration) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Internal(format!("http client: {}", e)))?;

        Ok(HttpHealthProbe {
            client,
            url: format!("{}/health", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn check(&self) -> bool {
        match self.client.get(&self.url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!(error = %e, "Health probe failed");
                false
            }
        }
    }
}

// =============================================================================
// Probe Loop
// =============================================================================

/// Handle for a running background probe loop.
pub struct ProbeHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ProbeHandle {
    /// Stops the probe loop.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Probe task panicked during shutdown");
        }
    }
}

/// Spawns a loop that feeds probe results into the monitor at a fixed
/// interval until shut down.
pub fn spawn_probe_loop<P>(
    monitor: ConnectivityMonitor,
    probe: P,
    interval: Duration,
) -> ProbeHandle
where
    P: HealthProbe + 'static,
{
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let state = if probe.check().await {
                        ConnectivityState::Online
                    } else {
                        ConnectivityState::Offline
                    };
                    monitor.set_state(state);
                }
                _ = shutdown_rx.changed() => {
                    debug!("Probe loop shutting down");
                    break;
                }
            }
        }
    });

    ProbeHandle { shutdown_tx, task }
}

// =============================================================================
// Unit Tests
// =============================================================================
