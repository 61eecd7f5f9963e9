//! # ergolab-db: Persistence Layer for ErgoLab Mobile Sync
//!
//! This crate provides local storage for the offline sync core. It uses
//! SQLite for durability with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      ErgoLab Local Data Flow                            │
//! │                                                                         │
//! │  Host action (record stock_out)          Sync pass (coordinator)       │
//! │       │                                       │                         │
//! │       ▼                                       ▼                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     ergolab-db (THIS CRATE)                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐   ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories  │   │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │ queue / cache  │   │  (embedded)  │  │   │
//! │  │   │               │    │                │   │              │  │   │
//! │  │   │ SqlitePool    │◄───│ OperationQueue │   │ 001_init.sql │  │   │
//! │  │   │ WAL mode      │    │ CachedEntity   │   │              │  │   │
//! │  │   └───────────────┘    └────────────────┘   └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │        <app data dir>/ergolab/ergolab.db (host-chosen)          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Storage error types
//! - [`repository`] - The operation queue and the entity cache
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ergolab_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/ergolab.db")).await?;
//!
//! // Record a movement while offline - durable before enqueue returns
//! let op = db.operations().enqueue(kind).await?;
//!
//! // Read reference data
//! let material = db.cache().get(EntityType::Material, "mat-42").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::cache::CachedEntityRepository;
pub use repository::queue::OperationQueueRepository;
