//! # Sync Error Types
//!
//! Error types for the device sync engine.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │    Transport    │  │      Submission         │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Offline        │  │  Conflict               │ │
//! │  │  InvalidUrl     │  │  Transient      │  │  Rejected               │ │
//! │  │  ConfigLoad/Save│  │  Timeout        │  │  DecodeFailed           │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────────────────────────────────┐  │
//! │  │    Storage      │  │                Internal                     │  │
//! │  │                 │  │                                             │  │
//! │  │  Database       │  │  PassInProgress, ShuttingDown, Channel      │  │
//! │  └─────────────────┘  └─────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The coordinator keys its control flow off the category: transient errors
//! abort the rest of the pass, conflicts halt only their own target, and
//! rejections go terminal at once.

use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all possible sync failures.
///
/// ## Design Principles
/// - Each variant includes enough context for debugging
/// - Errors are categorized for different handling strategies
/// - All errors are `Send + Sync` for async compatibility
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Invalid gateway or live-update URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// The device is offline; nothing was attempted.
    #[error("Device is offline")]
    Offline,

    /// Network-level failure reaching the inventory service.
    #[error("Transient network failure: {0}")]
    Transient(String),

    /// Request timed out.
    #[error("Request timeout after {0} seconds")]
    Timeout(u64),

    /// WebSocket protocol error on the live-update channel.
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    // =========================================================================
    // Submission Errors
    // =========================================================================
    /// The service rejected the operation on business rules.
    #[error("Conflict for operation {local_id}: {reason}")]
    Conflict { local_id: String, reason: String },

    /// The service rejected the operation as malformed; retrying is pointless.
    #[error("Operation {local_id} rejected: {cause}")]
    Rejected { local_id: String, cause: String },

    /// Failed to decode a response or live-update message.
    #[error("Decode failed: {0}")]
    DecodeFailed(String),

    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// Local database failure.
    #[error("Database error: {0}")]
    Database(#[from] ergolab_db::DbError),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// A sync pass is already running.
    #[error("Sync pass already in progress")]
    PassInProgress,

    /// The coordinator is shutting down.
    #[error("Sync coordinator is shutting down")]
    ShuttingDown,

    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// Internal coordinator error.
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::DecodeFailed(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Timeout(0)
        } else if err.is_decode() {
            SyncError::DecodeFailed(err.to_string())
        } else {
            SyncError::Transient(err.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SyncError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => {
                SyncError::Transient("connection closed".into())
            }
            WsError::Protocol(p) => SyncError::WebSocketError(p.to_string()),
            WsError::Io(io) => SyncError::Transient(io.to_string()),
            other => SyncError::WebSocketError(other.to_string()),
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (drives pass control flow)
// =============================================================================

impl SyncError {
    /// Returns true if this failure is worth retrying on a later pass.
    ///
    /// ## Retryable Errors
    /// - Network failures and timeouts
    /// - Going offline mid-pass
    ///
    /// ## Non-Retryable Errors
    /// - Configuration errors
    /// - Rejections and decode failures
    /// - Conflicts (these wait for the user, not for a retry)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Offline
                | SyncError::Transient(_)
                | SyncError::Timeout(_)
                | SyncError::WebSocketError(_)
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }
}
