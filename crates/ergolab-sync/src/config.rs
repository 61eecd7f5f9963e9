//! # Sync Configuration
//!
//! Configuration management for the device sync engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     ERGOLAB_GATEWAY_URL=https://inventory.example.com                  │
//! │     ERGOLAB_DEVICE_ID=abc-123                                          │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/ergolab/sync.toml (Linux)                                │
//! │     ~/Library/Application Support/com.ergolab.field/sync.toml (macOS)  │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     auto-generated device_id, retry_ceiling = 5                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [device]
//! id = "550e8400-e29b-41d4-a716-446655440000"
//! name = "Warehouse Tablet 3"
//!
//! [gateway]
//! base_url = "https://inventory.example.com"
//! request_timeout_secs = 30
//! retry_ceiling = 5
//! batch_size = 50
//!
//! [live]
//! enabled = true
//! url = "wss://inventory.example.com/ws/notifications"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};
use uuid::Uuid;

use ergolab_core::DEFAULT_RETRY_CEILING;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Device Configuration
// =============================================================================

/// Configuration for this field device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Unique device identifier (UUID v4).
    /// Auto-generated on first run if not provided.
    pub id: String,

    /// Human-readable device name (e.g., "Warehouse Tablet 3").
    #[serde(default = "default_device_name")]
    pub name: String,
}

fn default_device_name() -> String {
    "Field Device".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            id: Uuid::new_v4().to_string(),
            name: default_device_name(),
        }
    }
}

// =============================================================================
// Gateway Settings
// =============================================================================

/// Settings for the HTTP gateway to the inventory service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySettings {
    /// Base URL of the inventory service (http:// or https://).
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout (seconds). A hung request counts as a
    /// transient failure once this elapses.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Retryable-failure ceiling per operation. Once an operation has
    /// failed this many times it goes terminally failed.
    #[serde(default = "default_retry_ceiling")]
    pub retry_ceiling: i64,

    /// Maximum operations drained per target in one pass.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_retry_ceiling() -> i64 {
    DEFAULT_RETRY_CEILING
}

fn default_batch_size() -> u32 {
    50
}

impl Default for GatewaySettings {
    fn default() -> Self {
        GatewaySettings {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
            retry_ceiling: default_retry_ceiling(),
            batch_size: default_batch_size(),
        }
    }
}

// =============================================================================
// Cache Settings
// =============================================================================

/// Settings for the local entity cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Age (seconds) after which a cached snapshot counts as stale.
    /// Stale data is still served; readers just see the flag.
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,

    /// Delete synced queue rows older than this many days during
    /// maintenance. 0 disables pruning.
    #[serde(default = "default_prune_after_days")]
    pub prune_synced_after_days: u32,
}

fn default_stale_after() -> u64 {
    3600
}

fn default_prune_after_days() -> u32 {
    30
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings {
            stale_after_secs: default_stale_after(),
            prune_synced_after_days: default_prune_after_days(),
        }
    }
}

// =============================================================================
// Live Update Settings
// =============================================================================

/// Settings for the WebSocket live-update channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveSettings {
    /// Enable the live-update listener.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// WebSocket URL of the notification endpoint (ws:// or wss://).
    #[serde(default)]
    pub url: Option<String>,

    /// Keepalive ping interval (seconds).
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,

    /// Initial backoff duration (milliseconds) for reconnection.
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff duration (seconds) for reconnection.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_ping_interval() -> u64 {
    30
}

fn default_initial_backoff() -> u64 {
    500
}

fn default_max_backoff() -> u64 {
    60
}

impl Default for LiveSettings {
    fn default() -> Self {
        LiveSettings {
            enabled: true,
            url: None,
            ping_interval_secs: default_ping_interval(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
        }
    }
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete sync configuration.
///
/// ## Example Config File
/// ```toml
/// [device]
/// id = "550e8400-e29b-41d4-a716-446655440000"
/// name = "Warehouse Tablet 3"
///
/// [gateway]
/// base_url = "https://inventory.example.com"
/// request_timeout_secs = 30
/// retry_ceiling = 5
///
/// [cache]
/// stale_after_secs = 3600
///
/// [live]
/// enabled = true
/// url = "wss://inventory.example.com/ws/notifications"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Device-specific configuration.
    #[serde(default)]
    pub device: DeviceConfig,

    /// HTTP gateway settings.
    #[serde(default)]
    pub gateway: GatewaySettings,

    /// Local cache settings.
    #[serde(default)]
    pub cache: CacheSettings,

    /// Live-update channel settings.
    #[serde(default)]
    pub live: LiveSettings,
}

impl SyncConfig {
    /// Creates a new config with defaults and a generated device ID.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (sync.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load sync config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Sync config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.device.id.is_empty() {
            return Err(SyncError::InvalidConfig("device.id must not be empty".into()));
        }

        if !self.gateway.base_url.starts_with("http://")
            && !self.gateway.base_url.starts_with("https://")
        {
            return Err(SyncError::InvalidUrl(format!(
                "Gateway URL must start with http:// or https://, got: {}",
                self.gateway.base_url
            )));
        }

        if let Some(ref url) = self.live.url {
            if !url.starts_with("ws://") && !url.starts_with("wss://") {
                return Err(SyncError::InvalidUrl(format!(
                    "Live update URL must start with ws:// or wss://, got: {}",
                    url
                )));
            }
        }

        if self.gateway.retry_ceiling < 1 {
            return Err(SyncError::InvalidConfig(
                "gateway.retry_ceiling must be at least 1".into(),
            ));
        }

        if self.gateway.batch_size == 0 {
            return Err(SyncError::InvalidConfig(
                "gateway.batch_size must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(id) = std::env::var("ERGOLAB_DEVICE_ID") {
            debug!(device_id = %id, "Overriding device ID from environment");
            self.device.id = id;
        }

        if let Ok(name) = std::env::var("ERGOLAB_DEVICE_NAME") {
            self.device.name = name;
        }

        if let Ok(url) = std::env::var("ERGOLAB_GATEWAY_URL") {
            debug!(url = %url, "Overriding gateway URL from environment");
            self.gateway.base_url = url;
        }

        if let Ok(ceiling) = std::env::var("ERGOLAB_RETRY_CEILING") {
            if let Ok(c) = ceiling.parse::<i64>() {
                self.gateway.retry_ceiling = c;
            }
        }

        if let Ok(url) = std::env::var("ERGOLAB_LIVE_URL") {
            debug!(url = %url, "Overriding live update URL from environment");
            self.live.url = Some(url);
        }

        if let Ok(enabled) = std::env::var("ERGOLAB_LIVE_ENABLED") {
            match enabled.to_lowercase().as_str() {
                "1" | "true" | "yes" => self.live.enabled = true,
                "0" | "false" | "no" => self.live.enabled = false,
                other => warn!(value = %other, "Unknown ERGOLAB_LIVE_ENABLED value"),
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "ergolab", "field")
            .map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Returns the device ID.
    pub fn device_id(&self) -> &str {
        &self.device.id
    }

    /// Returns the per-request timeout as a Duration.
    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.gateway.request_timeout_secs)
    }

    /// Returns the staleness threshold as a Duration.
    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cache.stale_after_secs as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert!(!config.device.id.is_empty()); // Auto-generated
        assert_eq!(config.gateway.retry_ceiling, 5);
        assert_eq!(config.gateway.batch_size, 50);
        assert!(config.live.enabled);
    }

    #[test]
    fn test_config_validation() {
        let mut config = SyncConfig::default();
        assert!(config.validate().is_ok());

        // Empty device ID should fail
        config.device.id = String::new();
        assert!(config.validate().is_err());
        config.device.id = "device-1".to_string();

        // Non-HTTP gateway URL should fail
        config.gateway.base_url = "ftp://example.com".to_string();
        assert!(config.validate().is_err());
        config.gateway.base_url = "https://example.com".to_string();

        // Non-WS live URL should fail
        config.live.url = Some("http://example.com/ws".to_string());
        assert!(config.validate().is_err());
        config.live.url = Some("wss://example.com/ws".to_string());
        assert!(config.validate().is_ok());

        // Zero retry ceiling should fail
        config.gateway.retry_ceiling = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = SyncConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[device]"));
        assert!(toml_str.contains("[gateway]"));

        let parsed: SyncConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.device.id, config.device.id);
        assert_eq!(parsed.gateway.base_url, config.gateway.base_url);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let parsed: SyncConfig = toml::from_str(
            r#"
            [gateway]
            base_url = "https://inventory.example.com"
            "#,
        )
        .unwrap();

        assert_eq!(parsed.gateway.base_url, "https://inventory.example.com");
        assert_eq!(parsed.gateway.retry_ceiling, 5);
        assert!(!parsed.device.id.is_empty());
    }
}
