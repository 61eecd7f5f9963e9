//! # ergolab-sync: Offline Sync Engine for ErgoLab Field Devices
//!
//! This crate keeps a frequently-offline field device converged with the
//! ErgoLab inventory service: reads come from a durable local cache, writes
//! go through a durable write-ahead queue, and a coordinator reconciles the
//! queue whenever connectivity allows.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Engine Architecture                          │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                SyncCoordinator (Main Orchestrator)               │  │
//! │  │                                                                  │  │
//! │  │  Runs one pass at a time; triggered manually or by the           │  │
//! │  │  offline→online transition. Emits a SyncSummary per pass.        │  │
//! │  └───────┬──────────────────────┬──────────────────────┬───────────┘  │
//! │          │                      │                      │               │
//! │          ▼                      ▼                      ▼               │
//! │  ┌────────────────┐  ┌──────────────────┐  ┌────────────────────────┐ │
//! │  │ Connectivity   │  │  RemoteGateway   │  │  ergolab-db            │ │
//! │  │ Monitor        │  │                  │  │                        │ │
//! │  │                │  │ HTTP submit/fetch│  │ OperationQueue +       │ │
//! │  │ watch channel, │  │ with typed       │  │ CachedEntity           │ │
//! │  │ health probe   │  │ outcomes         │  │ repositories (SQLite)  │ │
//! │  └────────────────┘  └──────────────────┘  └────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                      LiveListener                                │   │
//! │  │                                                                 │   │
//! │  │ WebSocket client with auto-reconnect; turns pushed entity       │   │
//! │  │ change events into cache invalidations. Purely best-effort:     │   │
//! │  │ staleness checks on the cache remain the authoritative fallback │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`config`] - Sync configuration (device identity, gateway, live channel)
//! - [`connectivity`] - Online/offline monitoring with subscriptions
//! - [`coordinator`] - The sync pass state machine
//! - [`error`] - Sync error types
//! - [`gateway`] - Remote service access with typed outcomes
//! - [`live`] - WebSocket live-update listener
//!
//! ## Usage
//! ```rust,ignore
//! use ergolab_db::{Database, DbConfig};
//! use ergolab_sync::{
//!     ConnectivityMonitor, HttpGateway, SyncConfig, SyncCoordinator,
//! };
//! use std::sync::Arc;
//!
//! let config = SyncConfig::load_or_default(None);
//! let db = Database::new(
//!     DbConfig::new("ergolab.db").retry_ceiling(config.gateway.retry_ceiling),
//! )
//! .await?;
//!
//! let gateway = Arc::new(HttpGateway::new(
//!     &config.gateway.base_url,
//!     config.device_id(),
//!     config.request_timeout(),
//! )?);
//! let monitor = ConnectivityMonitor::starting_offline();
//!
//! let coordinator =
//!     SyncCoordinator::new(db.clone(), gateway, monitor.clone(), config.gateway.batch_size);
//! let handle = coordinator.start();
//!
//! // Record work (durable immediately, synced when possible)
//! db.operations().enqueue(operation).await?;
//! handle.trigger();
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod connectivity;
pub mod coordinator;
pub mod error;
pub mod gateway;
pub mod live;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{CacheSettings, DeviceConfig, GatewaySettings, LiveSettings, SyncConfig};
pub use connectivity::{
    spawn_probe_loop, ConnectivityMonitor, ConnectivityState, ConnectivitySubscription,
    HealthProbe, HttpHealthProbe, ProbeHandle,
};
pub use coordinator::{CoordinatorHandle, NoOpReporter, SyncCoordinator, SyncReporter, SyncState};
pub use error::{SyncError, SyncResult};
pub use gateway::{FetchOutcome, HttpGateway, RemoteGateway, SubmitOutcome};
pub use live::{ChannelState, LiveConfig, LiveHandle, LiveListener, LiveUpdate};
