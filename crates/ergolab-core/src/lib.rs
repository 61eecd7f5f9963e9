//! # ergolab-core: Pure Domain Types for ErgoLab Mobile Sync
//!
//! This crate is the shared domain model of the offline synchronization
//! core. It contains types and rules only, with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     ErgoLab Mobile Sync Architecture                    │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  Host Application (mobile shell)                │   │
//! │  │    Enqueues operations ── Reads cached entities ── Shows sync   │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ ergolab-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │ operation │  │  status   │  │ validation│  │   │
//! │  │   │ EntityRef │  │  StockIn  │  │ lifecycle │  │   rules   │  │   │
//! │  │   │  Cached   │  │  StockOut │  │  machine  │  │  checks   │  │   │
//! │  │   │  Entity   │  │  Photo... │  │           │  │           │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE TYPES               │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                  ergolab-db (Persistence Layer)                 │   │
//! │  │         SQLite queue + cache, migrations, repositories          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Entity references, cached entities, operation records
//! - [`operation`] - Typed operation payloads (the tagged `op_type` enum)
//! - [`error`] - Domain error types
//! - [`validation`] - Payload validation rules
//!
//! ## Design Principles
//!
//! 1. **Typed payloads**: every operation kind carries its own struct, so a
//!    queue replayed after an app upgrade can never produce a runtime type
//!    error from loose JSON.
//! 2. **Immutable payloads**: once an operation is enqueued, only its
//!    status, attempt count, server ID and last error ever change.
//! 3. **Explicit errors**: all errors are typed, never strings or panics.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod operation;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use ergolab_core::PendingOperation` instead of
// `use ergolab_core::types::PendingOperation`

pub use error::{CoreError, CoreResult, ValidationError};
pub use operation::{MaterialFields, OperationKind};
pub use types::{CachedEntity, EntityRef, EntityType, OperationStatus, PendingOperation, SyncSummary};

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default ceiling on retryable sync attempts per operation.
///
/// Once `attempt_count` reaches this value the queue forces the operation
/// into terminal `failed` status, so a sync pass always converges even
/// against a permanently flaky link.
pub const DEFAULT_RETRY_CEILING: i64 = 5;

/// Maximum quantity accepted for a single stock movement.
///
/// ## Business Reason
/// Prevents fat-finger entries (e.g., scanning a barcode into the quantity
/// field). Warehouse counts above this are recorded as multiple movements.
pub const MAX_MOVEMENT_QUANTITY: i64 = 1_000_000;

/// Maximum length of a free-text note on a stock movement.
pub const MAX_NOTE_LENGTH: usize = 500;
