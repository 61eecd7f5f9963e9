//! # Domain Types
//!
//! Core domain types used throughout the ErgoLab mobile sync core.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌──────────────────┐   ┌──────────────────┐   ┌──────────────────┐    │
//! │  │ PendingOperation │   │  CachedEntity    │   │    EntityRef     │    │
//! │  │  ──────────────  │   │  ──────────────  │   │  ──────────────  │    │
//! │  │  local_id (UUID) │   │  entity_type     │   │  entity_type     │    │
//! │  │  idempotency_tok │   │  id              │   │  id              │    │
//! │  │  kind (payload)  │   │  payload (JSON)  │   │                  │    │
//! │  │  status          │   │  cached_at       │   │  ordering key    │    │
//! │  │  attempt_count   │   └──────────────────┘   │  for sync passes │    │
//! │  └──────────────────┘                          └──────────────────┘    │
//! │                                                                         │
//! │  ┌──────────────────┐   ┌──────────────────┐                           │
//! │  │ OperationStatus  │   │   EntityType     │                           │
//! │  │  ──────────────  │   │  ──────────────  │                           │
//! │  │  Pending         │   │  Material        │                           │
//! │  │  Syncing         │   │  Warehouse       │                           │
//! │  │  Synced          │   │  Project         │                           │
//! │  │  Failed          │   └──────────────────┘                           │
//! │  │  Conflict        │                                                   │
//! │  └──────────────────┘                                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every pending operation has:
//! - `local_id`: UUID v4 - immutable, client-generated, the queue key
//! - `server_id`: assigned by the remote service once the operation is
//!   confirmed; `None` until then

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::operation::OperationKind;

// =============================================================================
// Entity Type
// =============================================================================

/// The kinds of reference entities the local cache holds.
///
/// Mirrors the reference data a field worker needs offline: the material
/// catalogue, warehouse list, and project list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// A material in the catalogue.
    Material,
    /// A physical warehouse.
    Warehouse,
    /// A project stock can be issued against.
    Project,
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityType::Material => write!(f, "material"),
            EntityType::Warehouse => write!(f, "warehouse"),
            EntityType::Project => write!(f, "project"),
        }
    }
}

impl std::str::FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "material" => Ok(EntityType::Material),
            "warehouse" => Ok(EntityType::Warehouse),
            "project" => Ok(EntityType::Project),
            other => Err(format!("unknown entity type: '{}'", other)),
        }
    }
}

// =============================================================================
// Entity Reference
// =============================================================================

/// A reference to the resource an operation mutates.
///
/// This is the **ordering key** of the sync algorithm: operations sharing a
/// target are replayed in strict creation order, operations on disjoint
/// targets are independent.
///
/// Serialized as `"material:550e8400-..."` in the queue table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    /// The kind of entity referenced.
    pub entity_type: EntityType,

    /// The entity's ID on the remote service.
    pub id: String,
}

impl EntityRef {
    /// Creates a new entity reference.
    pub fn new(entity_type: EntityType, id: impl Into<String>) -> Self {
        EntityRef {
            entity_type,
            id: id.into(),
        }
    }

    /// Shorthand for a material reference.
    pub fn material(id: impl Into<String>) -> Self {
        EntityRef::new(EntityType::Material, id)
    }
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.id)
    }
}

impl std::str::FromStr for EntityRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ty, id) = s
            .split_once(':')
            .ok_or_else(|| format!("entity ref missing ':' separator: '{}'", s))?;
        if id.is_empty() {
            return Err(format!("entity ref has empty id: '{}'", s));
        }
        Ok(EntityRef {
            entity_type: ty.parse()?,
            id: id.to_string(),
        })
    }
}

// =============================================================================
// Operation Status
// =============================================================================

/// Lifecycle status of a pending operation.
///
/// ## State Machine
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │                                                                         │
/// │              mark_syncing          success                              │
/// │   ┌─────────┐ ────────► ┌─────────┐ ────────► ┌────────┐               │
/// │   │ Pending │           │ Syncing │           │ Synced │ (terminal)    │
/// │   └─────────┘ ◄──────── └─────────┘           └────────┘               │
/// │        ▲      retryable      │                                          │
/// │        │      failure        │ business rejection                       │
/// │        │  (below ceiling)    ▼                                          │
/// │        │                ┌──────────┐                                    │
/// │        │                │ Conflict │ (needs user action)                │
/// │        │                └──────────┘                                    │
/// │        │                     │                                          │
/// │        │   attempt ceiling / ▼                                          │
/// │        │   non-retryable ┌────────┐                                     │
/// │        └─────────────────│ Failed │ (terminal)                          │
/// │                          └────────┘                                     │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    /// Recorded locally, not yet confirmed by the remote service.
    Pending,
    /// Submission in flight during the current sync pass.
    Syncing,
    /// Confirmed by the remote service; `server_id` is set.
    Synced,
    /// Terminal failure (validation error or retry ceiling reached).
    Failed,
    /// Rejected for a business reason; awaiting user resolution.
    Conflict,
}

impl OperationStatus {
    /// Returns true if the operation will never be submitted again.
    ///
    /// `Conflict` is not terminal in the audit sense (the user may resolve
    /// it), but it is never auto-retried, so for submission purposes it
    /// blocks like a terminal state until resolved.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationStatus::Synced | OperationStatus::Failed)
    }

    /// Returns true if the status permits a transition to `to`.
    ///
    /// The queue enforces this so a crash mid-pass can never resurrect a
    /// `synced` operation.
    pub fn can_transition(&self, to: OperationStatus) -> bool {
        use OperationStatus::*;
        matches!(
            (self, to),
            (Pending, Syncing)
                | (Syncing, Synced)
                | (Syncing, Failed)
                | (Syncing, Conflict)
                | (Syncing, Pending) // retryable failure re-queues
        )
    }
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationStatus::Pending => write!(f, "pending"),
            OperationStatus::Syncing => write!(f, "syncing"),
            OperationStatus::Synced => write!(f, "synced"),
            OperationStatus::Failed => write!(f, "failed"),
            OperationStatus::Conflict => write!(f, "conflict"),
        }
    }
}

// =============================================================================
// Cached Entity
// =============================================================================

/// A locally cached snapshot of a reference entity.
///
/// Keyed uniquely by `(entity_type, id)`. Refreshes overwrite the whole
/// payload; the cache never patches a snapshot in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedEntity {
    /// The kind of entity cached.
    pub entity_type: EntityType,

    /// The entity's ID on the remote service.
    pub id: String,

    /// Full entity snapshot as delivered by the remote service.
    pub payload: serde_json::Value,

    /// When this snapshot was stored locally.
    pub cached_at: DateTime<Utc>,
}

impl CachedEntity {
    /// Creates a snapshot stamped with the current time.
    pub fn new(entity_type: EntityType, id: impl Into<String>, payload: serde_json::Value) -> Self {
        CachedEntity {
            entity_type,
            id: id.into(),
            payload,
            cached_at: Utc::now(),
        }
    }

    /// Returns the entity reference for this snapshot.
    pub fn entity_ref(&self) -> EntityRef {
        EntityRef::new(self.entity_type, self.id.clone())
    }

    /// Returns true if the snapshot is older than `max_age`.
    pub fn is_stale(&self, max_age: Duration) -> bool {
        Utc::now() - self.cached_at > max_age
    }
}

// =============================================================================
// Pending Operation
// =============================================================================

/// A locally recorded write operation not yet confirmed by the remote
/// service.
///
/// ## Invariants
/// - `local_id` and `idempotency_token` are assigned at creation and never
///   reused, even across conflict resolution (a resolved conflict is a new
///   operation with fresh identifiers).
/// - `kind` is immutable once enqueued; only `status`, `attempt_count`,
///   `server_id` and `last_error` ever change.
/// - Operations sharing `target()` sync in strict `created_at` order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingOperation {
    /// Client-generated UUID, the queue primary key.
    pub local_id: String,

    /// Client-generated token the remote service dedups replays on.
    pub idempotency_token: String,

    /// The typed operation payload.
    pub kind: OperationKind,

    /// Lifecycle status.
    pub status: OperationStatus,

    /// Number of submission attempts consumed by retryable failures.
    pub attempt_count: i64,

    /// When the operation was recorded locally.
    pub created_at: DateTime<Utc>,

    /// Remote-assigned ID, set only once `status` is `Synced`.
    pub server_id: Option<String>,

    /// Last failure or conflict reason, if any.
    pub last_error: Option<String>,
}

impl PendingOperation {
    /// Creates a fresh pending operation with generated identifiers.
    pub fn new(kind: OperationKind) -> Self {
        PendingOperation {
            local_id: uuid::Uuid::new_v4().to_string(),
            idempotency_token: uuid::Uuid::new_v4().to_string(),
            kind,
            status: OperationStatus::Pending,
            attempt_count: 0,
            created_at: Utc::now(),
            server_id: None,
            last_error: None,
        }
    }

    /// The ordering key: the resource this operation mutates.
    pub fn target(&self) -> EntityRef {
        self.kind.target()
    }

    /// Returns true if this operation may still be submitted.
    pub fn is_submittable(&self) -> bool {
        self.status == OperationStatus::Pending
    }
}

// =============================================================================
// Sync Summary
// =============================================================================

/// Outcome counts for one completed sync pass.
///
/// Emitted to the host application at the end of every pass, whether the
/// pass drained the queue or aborted early.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    /// Operations confirmed by the remote service this pass.
    pub synced: u64,

    /// Operations rejected for business reasons this pass.
    pub conflicts: u64,

    /// Operations that recorded a failure this pass (retryable or terminal).
    pub failed: u64,

    /// Operations still pending after the pass.
    pub remaining: u64,
}

impl SyncSummary {
    /// Returns true if the pass confirmed or rejected nothing.
    pub fn is_noop(&self) -> bool {
        self.synced == 0 && self.conflicts == 0 && self.failed == 0
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
