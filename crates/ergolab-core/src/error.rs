//! # Error Types
//!
//! Domain-specific error types for ergolab-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  ergolab-core errors (this file)                                       │
//! │  ├── CoreError        - General domain errors                          │
//! │  └── ValidationError  - Payload validation failures                    │
//! │                                                                         │
//! │  ergolab-db errors (separate crate)                                    │
//! │  └── DbError          - Local storage failures                         │
//! │                                                                         │
//! │  ergolab-sync errors (separate crate)                                  │
//! │  └── SyncError        - Gateway / coordinator failures                 │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError/SyncError → host app      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (local_id, target, etc.)
//! 3. Errors are enum variants, never String

use thiserror::Error;

use crate::types::OperationStatus;

// =============================================================================
// Core Error
// =============================================================================

/// Core domain errors.
///
/// These errors represent violations of the operation lifecycle or payload
/// rules. They are raised before anything touches storage or the network.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An operation status transition that the lifecycle forbids.
    ///
    /// ## When This Occurs
    /// - Marking a `synced` operation as `syncing` again
    /// - Re-submitting a terminal `failed` or `conflict` operation
    #[error("Operation {local_id} cannot move from {from} to {to}")]
    InvalidStatusTransition {
        local_id: String,
        from: OperationStatus,
        to: OperationStatus,
    },

    /// A persisted payload could not be decoded into its typed form.
    ///
    /// ## When This Occurs
    /// - Replaying a queue written by an incompatible schema version
    /// - Manual tampering with the local database file
    #[error("Operation {local_id} has an undecodable payload: {reason}")]
    PayloadDecode { local_id: String, reason: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Payload validation errors.
///
/// These errors occur when a user-supplied operation payload doesn't meet
/// requirements. Used for early validation before the operation is enqueued,
/// so malformed operations never enter the durable queue.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Invalid format (e.g., invalid UUID, invalid hash).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InvalidStatusTransition {
            local_id: "op-1".to_string(),
            from: OperationStatus::Synced,
            to: OperationStatus::Syncing,
        };
        assert_eq!(
            err.to_string(),
            "Operation op-1 cannot move from synced to syncing"
        );
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "material_id".to_string(),
        };
        assert_eq!(err.to_string(), "material_id is required");

        let err = ValidationError::MustBePositive {
            field: "quantity".to_string(),
        };
        assert_eq!(err.to_string(), "quantity must be positive");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "material_id".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
