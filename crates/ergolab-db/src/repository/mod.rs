//! # Repository Module
//!
//! Database repository implementations for the ErgoLab local store.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern Explained                         │
//! │                                                                         │
//! │  The Repository pattern abstracts database access behind a clean API.  │
//! │                                                                         │
//! │  Coordinator / host caller                                             │
//! │       │                                                                 │
//! │       │  db.operations().next_batch(Some(&target), 50)                 │
//! │       │  ↓                                                              │
//! │       ▼                                                                 │
//! │  OperationQueueRepository                                              │
//! │  ├── enqueue(&self, kind)                                              │
//! │  ├── next_batch(&self, target, limit)                                  │
//! │  ├── mark_syncing / mark_synced / mark_failed / mark_conflict          │
//! │  └── count(&self, status)                                              │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! │  Benefits:                                                              │
//! │  • Status transition rules live in one place                           │
//! │  • Easy to test against an in-memory database                          │
//! │  • SQL is isolated from the sync algorithm                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`queue::OperationQueueRepository`] - The durable pending-operation queue
//! - [`cache::CachedEntityRepository`] - Reference-entity snapshots

pub mod cache;
pub mod queue;
