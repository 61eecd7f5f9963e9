//! # Validation Module
//!
//! Payload validation rules for the sync core.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Host UI                                                      │
//! │  ├── Basic format checks (empty, length)                               │
//! │  └── Immediate user feedback                                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE (on enqueue)                                     │
//! │  ├── Payload rule validation                                           │
//! │  └── Malformed operations never enter the durable queue                │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Remote service                                               │
//! │  ├── Business rules (stock sufficiency, permissions)                   │
//! │  └── Rejections surface as Conflict / Invalid outcomes                 │
//! │                                                                         │
//! │  Defense in depth: each layer catches different errors                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::{MAX_MOVEMENT_QUANTITY, MAX_NOTE_LENGTH};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Identifier Validators
// =============================================================================

/// Validates an entity identifier field.
///
/// ## Rules
/// - Must not be empty (after trimming)
/// - Must be at most 64 characters
///
/// IDs are remote-assigned opaque strings (UUIDs in practice), so no
/// character-set rule beyond length is enforced here.
pub fn validate_identifier(field: &str, value: &str) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.len() > 64 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 64,
        });
    }

    Ok(())
}

// =============================================================================
// Quantity Validators
// =============================================================================

/// Validates a stock movement quantity.
///
/// ## Rules
/// - Must be strictly positive (direction is carried by the op kind,
///   never by the sign)
/// - Must not exceed [`MAX_MOVEMENT_QUANTITY`]
pub fn validate_quantity(quantity: i64) -> ValidationResult<()> {
    if quantity <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if quantity > MAX_MOVEMENT_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_MOVEMENT_QUANTITY,
        });
    }

    Ok(())
}

// =============================================================================
// Text Validators
// =============================================================================

/// Validates an optional free-text note.
pub fn validate_note(note: Option<&str>) -> ValidationResult<()> {
    if let Some(note) = note {
        if note.len() > MAX_NOTE_LENGTH {
            return Err(ValidationError::TooLong {
                field: "note".to_string(),
                max: MAX_NOTE_LENGTH,
            });
        }
    }
    Ok(())
}

/// Validates a hex-encoded SHA-256 content hash.
///
/// ## Rules
/// - Exactly 64 characters
/// - Lowercase hex digits only
pub fn validate_content_hash(hash: &str) -> ValidationResult<()> {
    if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()) {
        return Err(ValidationError::InvalidFormat {
            field: "content_hash".to_string(),
            reason: "must be 64 lowercase hex characters".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_rules() {
        assert!(validate_identifier("material_id", "mat-42").is_ok());
        assert!(validate_identifier("material_id", "  ").is_err());
        assert!(validate_identifier("material_id", &"x".repeat(65)).is_err());
    }

    #[test]
    fn test_quantity_rules() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(MAX_MOVEMENT_QUANTITY).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-5).is_err());
        assert!(validate_quantity(MAX_MOVEMENT_QUANTITY + 1).is_err());
    }

    #[test]
    fn test_note_rules() {
        assert!(validate_note(None).is_ok());
        assert!(validate_note(Some("left at gate 3")).is_ok());
        assert!(validate_note(Some(&"x".repeat(MAX_NOTE_LENGTH + 1))).is_err());
    }

    #[test]
    fn test_content_hash_rules() {
        let good = "a".repeat(64);
        assert!(validate_content_hash(&good).is_ok());
        assert!(validate_content_hash("deadbeef").is_err());
        assert!(validate_content_hash(&"A".repeat(64)).is_err());
    }
}
