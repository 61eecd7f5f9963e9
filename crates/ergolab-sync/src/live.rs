//! # Live Update Channel
//!
//! Listen-only WebSocket client for the service's notification endpoint.
//! Whenever another device changes an entity, the service pushes a small
//! event and we drop the matching cache entry so the next read refetches.
//!
//! ## Connection Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    WebSocket Connection States                          │
//! │                                                                         │
//! │  ┌────────────┐    connect()    ┌────────────┐                         │
//! │  │Disconnected│ ──────────────► │ Connecting │                         │
//! │  └────────────┘                 └─────┬──────┘                         │
//! │        ▲                              │                                 │
//! │        │                    success   │   failure                       │
//! │        │                        ┌─────┴─────┐                          │
//! │        │                        ▼           ▼                           │
//! │        │              ┌────────────┐  ┌────────────┐                   │
//! │        │              │ Connected  │  │ Backoff    │                   │
//! │        │              └─────┬──────┘  └─────┬──────┘                   │
//! │        │                    │               │                           │
//! │        │              disconnect/error      │  timer expired            │
//! │        │                    │               │                           │
//! │        │                    ▼               │                           │
//! │        │              ┌────────────┐        │                           │
//! │        └───────────── │Reconnecting│ ◄──────┘                          │
//! │                       └────────────┘                                    │
//! │                                                                         │
//! │  Losing this channel never breaks anything: the cache just serves       │
//! │  stale data until the next sync pass or manual refresh.                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, RwLock};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use ergolab_core::EntityType;
use ergolab_db::Database;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Connection State
// =============================================================================

/// Connection state of the live-update channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Not connected.
    Disconnected,
    /// Attempting to connect.
    Connecting,
    /// Connected and listening.
    Connected,
    /// Waiting before reconnection attempt.
    Backoff,
    /// Reconnection in progress.
    Reconnecting,
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelState::Disconnected => write!(f, "disconnected"),
            ChannelState::Connecting => write!(f, "connecting"),
            ChannelState::Connected => write!(f, "connected"),
            ChannelState::Backoff => write!(f, "backoff"),
            ChannelState::Reconnecting => write!(f, "reconnecting"),
        }
    }
}

// =============================================================================
// Live Update Events
// =============================================================================

/// One pushed notification from the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveUpdate {
    /// What happened ("created", "updated", "deleted", ...).
    pub event_type: String,

    /// Entity type the event is about ("material", "warehouse", "project").
    pub entity_type: String,

    /// Identifier of the affected entity.
    pub entity_id: String,
}

impl LiveUpdate {
    pub fn from_json(json: &str) -> SyncResult<Self> {
        serde_json::from_str(json).map_err(SyncError::from)
    }
}

// =============================================================================
// Listener Configuration
// =============================================================================

/// Configuration for the live-update listener.
#[derive(Debug, Clone)]
pub struct LiveConfig {
    /// WebSocket URL of the notification endpoint.
    pub url: String,

    /// Connection timeout.
    pub connect_timeout: Duration,

    /// Initial backoff duration.
    pub initial_backoff: Duration,

    /// Maximum backoff duration.
    pub max_backoff: Duration,

    /// Ping interval for keepalive.
    pub ping_interval: Duration,
}

impl Default for LiveConfig {
    fn default() -> Self {
        LiveConfig {
            url: String::new(),
            connect_timeout: Duration::from_secs(10),
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(60),
            ping_interval: Duration::from_secs(30),
        }
    }
}

// =============================================================================
// Listener Handle
// =============================================================================

/// Handle for a running live-update listener.
#[derive(Clone)]
pub struct LiveHandle {
    state: Arc<RwLock<ChannelState>>,
    shutdown_tx: mpsc::Sender<()>,
}

impl LiveHandle {
    /// Returns the current channel state.
    pub async fn state(&self) -> ChannelState {
        *self.state.read().await
    }

    /// Returns true if currently listening.
    pub async fn is_connected(&self) -> bool {
        *self.state.read().await == ChannelState::Connected
    }

    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| SyncError::ChannelError("Failed to send shutdown signal".into()))
    }
}

// =============================================================================
// Live Update Listener
// =============================================================================

/// WebSocket listener with automatic reconnection.
///
/// ## Usage
/// ```rust,ignore
/// let config = LiveConfig {
///     url: "wss://inventory.example.com/ws/notifications".into(),
///     ..Default::default()
/// };
///
/// let (handle, mut updates) = LiveListener::spawn(config, database);
///
/// // Optionally watch the raw events too
/// while let Some(update) = updates.recv().await {
///     println!("{} {} {}", update.event_type, update.entity_type, update.entity_id);
/// }
/// ```
pub struct LiveListener {
    config: LiveConfig,
    db: Database,
    state: Arc<RwLock<ChannelState>>,
    updates_tx: mpsc::Sender<LiveUpdate>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl LiveListener {
    /// Creates a listener and spawns its background task.
    ///
    /// Returns a control handle and a receiver mirroring every applied
    /// update (for UI refresh hooks). The receiver may be dropped freely.
    pub fn spawn(config: LiveConfig, db: Database) -> (LiveHandle, mpsc::Receiver<LiveUpdate>) {
        let (updates_tx, updates_rx) = mpsc::channel::<LiveUpdate>(100);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        let state = Arc::new(RwLock::new(ChannelState::Disconnected));

        let listener = LiveListener {
            config,
            db,
            state: state.clone(),
            updates_tx,
            shutdown_rx,
        };

        tokio::spawn(listener.run());

        let handle = LiveHandle { state, shutdown_tx };

        (handle, updates_rx)
    }

    /// Main listener loop.
    async fn run(mut self) {
        info!(url = %self.config.url, "Live update listener starting");

        let mut backoff = self.create_backoff();

        loop {
            if self.shutdown_rx.try_recv().is_ok() {
                info!("Live listener received shutdown signal");
                break;
            }

            *self.state.write().await = ChannelState::Connecting;

            match self.connect_with_timeout().await {
                Ok(ws_stream) => {
                    info!("Live update channel connected");
                    *self.state.write().await = ChannelState::Connected;
                    backoff.reset();

                    if let Err(e) = self.listen_loop(ws_stream).await {
                        warn!(?e, "Live update channel ended");
                    } else {
                        // Clean shutdown from inside the loop
                        break;
                    }
                }
                Err(e) => {
                    debug!(?e, "Failed to connect live update channel");
                }
            }

            *self.state.write().await = ChannelState::Backoff;

            if let Some(duration) = backoff.next_backoff() {
                debug!(?duration, "Waiting before live channel reconnect");

                tokio::select! {
                    _ = tokio::time::sleep(duration) => {
                        *self.state.write().await = ChannelState::Reconnecting;
                    }
                    _ = self.shutdown_rx.recv() => {
                        info!("Shutdown during backoff");
                        break;
                    }
                }
            } else {
                error!("Backoff exhausted");
                break;
            }
        }

        *self.state.write().await = ChannelState::Disconnected;
        info!("Live update listener stopped");
    }

    /// Connects with timeout.
    async fn connect_with_timeout(
        &self,
    ) -> SyncResult<WebSocketStream<MaybeTlsStream<TcpStream>>> {
        let connect_future = connect_async(&self.config.url);

        match timeout(self.config.connect_timeout, connect_future).await {
            Ok(Ok((ws_stream, response))) => {
                debug!(status = ?response.status(), "WebSocket handshake complete");
                Ok(ws_stream)
            }
            Ok(Err(e)) => Err(SyncError::from(e)),
            Err(_) => Err(SyncError::Timeout(self.config.connect_timeout.as_secs())),
        }
    }

    /// Receives events until the connection drops or shutdown is requested.
    async fn listen_loop(
        &mut self,
        ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    ) -> SyncResult<()> {
        let (mut write, mut read) = ws_stream.split();

        let mut ping_interval = tokio::time::interval(self.config.ping_interval);
        ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                Some(result) = read.next() => {
                    match result {
                        Ok(WsMessage::Text(text)) => {
                            match LiveUpdate::from_json(&text) {
                                Ok(update) => self.apply_update(update).await,
                                Err(e) => warn!(?e, "Failed to parse live update"),
                            }
                        }
                        Ok(WsMessage::Ping(data)) => {
                            write.send(WsMessage::Pong(data)).await?;
                        }
                        Ok(WsMessage::Pong(_)) => {
                            debug!("Received pong");
                        }
                        Ok(WsMessage::Close(frame)) => {
                            info!(?frame, "Received close frame");
                            return Err(SyncError::Transient("server closed channel".into()));
                        }
                        Ok(WsMessage::Binary(_)) => {
                            warn!("Received unexpected binary message");
                        }
                        Ok(WsMessage::Frame(_)) => {
                            // Raw frame, ignore
                        }
                        Err(e) => {
                            error!(?e, "WebSocket error");
                            return Err(SyncError::from(e));
                        }
                    }
                }

                _ = ping_interval.tick() => {
                    write.send(WsMessage::Ping(vec![].into())).await?;
                    debug!("Sent ping");
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Shutdown signal received, closing live channel");
                    let _ = write.send(WsMessage::Close(None)).await;
                    return Ok(());
                }
            }
        }
    }

    /// Drops the affected cache entry and mirrors the event to the host.
    async fn apply_update(&self, update: LiveUpdate) {
        debug!(
            event = %update.event_type,
            entity_type = %update.entity_type,
            entity_id = %update.entity_id,
            "Applying live update"
        );

        match update.entity_type.parse::<EntityType>() {
            Ok(entity_type) => {
                if let Err(e) = self.db.cache().invalidate(entity_type, &update.entity_id).await {
                    warn!(error = %e, "Failed to invalidate cache entry");
                }
            }
            Err(_) => {
                // Unknown entity types from newer servers are skipped, not fatal
                debug!(entity_type = %update.entity_type, "Ignoring update for unknown entity type");
                return;
            }
        }

        // Host may or may not be listening; either is fine
        let _ = self.updates_tx.try_send(update);
    }

    /// Creates the exponential backoff configuration.
    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.config.initial_backoff,
            max_interval: self.config.max_backoff,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_state_display() {
        assert_eq!(ChannelState::Connected.to_string(), "connected");
        assert_eq!(ChannelState::Backoff.to_string(), "backoff");
    }

    #[test]
    fn test_live_config_default() {
        let config = LiveConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.ping_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_live_update_parsing() {
        let update = LiveUpdate::from_json(
            r#"{"event_type": "updated", "entity_type": "material", "entity_id": "mat-7"}"#,
        )
        .unwrap();
        assert_eq!(update.event_type, "updated");
        assert_eq!(update.entity_type, "material");
        assert_eq!(update.entity_id, "mat-7");

        assert!(LiveUpdate::from_json("not json").is_err());
    }
}
