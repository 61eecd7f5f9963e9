//! # Operation Payloads
//!
//! The typed payloads a field worker's actions produce.
//!
//! ## Why a Tagged Enum?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Typed Payloads vs Loose JSON                         │
//! │                                                                         │
//! │  The queue is durable across app upgrades. A loose JSON payload        │
//! │  replayed by a newer app version can fail at arbitrary points with     │
//! │  runtime type errors. A serde-tagged enum fails exactly once, at       │
//! │  decode, with a typed PayloadDecode error the coordinator can report.  │
//! │                                                                         │
//! │  Stored form (pending_operations.payload):                             │
//! │                                                                         │
//! │  { "op_type": "stock_out",                                             │
//! │    "material_id": "…", "warehouse_id": "…",                            │
//! │    "quantity": 5, "project_id": "…", "note": null }                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::types::{EntityRef, EntityType};
use crate::validation::{
    validate_content_hash, validate_identifier, validate_note, validate_quantity,
};

// =============================================================================
// Material Fields
// =============================================================================

/// Fields of a material a field worker can amend from the device.
///
/// All fields are optional; `None` means "leave unchanged". The remote
/// service applies the update as a partial patch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaterialFields {
    /// Display name of the material.
    pub name: Option<String>,

    /// Unit of measure (e.g., "pcs", "kg", "m").
    pub unit: Option<String>,

    /// Reorder threshold for low-stock warnings.
    pub min_quantity: Option<i64>,

    /// Free-text description.
    pub description: Option<String>,
}

impl MaterialFields {
    /// Returns true if no field would change.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.unit.is_none()
            && self.min_quantity.is_none()
            && self.description.is_none()
    }
}

// =============================================================================
// Operation Kind
// =============================================================================

/// A write operation recorded on the device, with its typed payload.
///
/// The serde tag becomes the `op_type` column of the queue table, so the
/// stored JSON is self-describing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op_type", rename_all = "snake_case")]
pub enum OperationKind {
    /// Goods received into a warehouse.
    StockIn {
        material_id: String,
        warehouse_id: String,
        quantity: i64,
        note: Option<String>,
    },

    /// Goods issued out of a warehouse, optionally against a project.
    StockOut {
        material_id: String,
        warehouse_id: String,
        quantity: i64,
        project_id: Option<String>,
        note: Option<String>,
    },

    /// Photo evidence attached to a material.
    ///
    /// Only the descriptor is queued; the image bytes live in the device's
    /// media store and are streamed by the gateway at submission time.
    PhotoUpload {
        material_id: String,
        file_name: String,
        /// SHA-256 of the image content, hex-encoded.
        content_hash: String,
        byte_len: i64,
    },

    /// Partial update of a material's descriptive fields.
    MaterialUpdate {
        material_id: String,
        fields: MaterialFields,
    },
}

impl OperationKind {
    /// Returns the wire name of this operation kind.
    pub fn op_type(&self) -> &'static str {
        match self {
            OperationKind::StockIn { .. } => "stock_in",
            OperationKind::StockOut { .. } => "stock_out",
            OperationKind::PhotoUpload { .. } => "photo_upload",
            OperationKind::MaterialUpdate { .. } => "material_update",
        }
    }

    /// Returns the ordering key: the resource this operation mutates.
    ///
    /// Every current kind targets a material; deriving the target from the
    /// payload (rather than accepting it separately) keeps the two from
    /// ever disagreeing.
    pub fn target(&self) -> EntityRef {
        let material_id = match self {
            OperationKind::StockIn { material_id, .. } => material_id,
            OperationKind::StockOut { material_id, .. } => material_id,
            OperationKind::PhotoUpload { material_id, .. } => material_id,
            OperationKind::MaterialUpdate { material_id, .. } => material_id,
        };
        EntityRef::new(EntityType::Material, material_id.clone())
    }

    /// Validates the payload before it may be enqueued.
    ///
    /// The queue calls this on `enqueue`, so malformed operations are
    /// rejected at the door instead of becoming terminal `failed` rows.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            OperationKind::StockIn {
                material_id,
                warehouse_id,
                quantity,
                note,
            } => {
                validate_identifier("material_id", material_id)?;
                validate_identifier("warehouse_id", warehouse_id)?;
                validate_quantity(*quantity)?;
                validate_note(note.as_deref())?;
            }
            OperationKind::StockOut {
                material_id,
                warehouse_id,
                quantity,
                project_id,
                note,
            } => {
                validate_identifier("material_id", material_id)?;
                validate_identifier("warehouse_id", warehouse_id)?;
                validate_quantity(*quantity)?;
                if let Some(project_id) = project_id {
                    validate_identifier("project_id", project_id)?;
                }
                validate_note(note.as_deref())?;
            }
            OperationKind::PhotoUpload {
                material_id,
                file_name,
                content_hash,
                byte_len,
            } => {
                validate_identifier("material_id", material_id)?;
                validate_identifier("file_name", file_name)?;
                validate_content_hash(content_hash)?;
                if *byte_len <= 0 {
                    return Err(ValidationError::MustBePositive {
                        field: "byte_len".to_string(),
                    });
                }
            }
            OperationKind::MaterialUpdate {
                material_id,
                fields,
            } => {
                validate_identifier("material_id", material_id)?;
                if fields.is_empty() {
                    return Err(ValidationError::Required {
                        field: "fields".to_string(),
                    });
                }
                if let Some(name) = &fields.name {
                    validate_identifier("fields.name", name)?;
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn stock_out() -> OperationKind {
        OperationKind::StockOut {
            material_id: "mat-9".into(),
            warehouse_id: "wh-1".into(),
            quantity: 5,
            project_id: Some("proj-3".into()),
            note: None,
        }
    }

    #[test]
    fn test_tagged_serialization() {
        let json = serde_json::to_value(stock_out()).unwrap();
        assert_eq!(json["op_type"], "stock_out");
        assert_eq!(json["quantity"], 5);

        let back: OperationKind = serde_json::from_value(json).unwrap();
        assert_eq!(back, stock_out());
    }

    #[test]
    fn test_unknown_op_type_fails_decode() {
        let loose = serde_json::json!({ "op_type": "teleport", "material_id": "mat-1" });
        assert!(serde_json::from_value::<OperationKind>(loose).is_err());
    }

    #[test]
    fn test_target_derived_from_payload() {
        assert_eq!(stock_out().target(), EntityRef::material("mat-9"));
    }

    #[test]
    fn test_validate_rejects_zero_quantity() {
        let kind = OperationKind::StockIn {
            material_id: "mat-1".into(),
            warehouse_id: "wh-1".into(),
            quantity: 0,
            note: None,
        };
        assert!(kind.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_material_update() {
        let kind = OperationKind::MaterialUpdate {
            material_id: "mat-1".into(),
            fields: MaterialFields::default(),
        };
        assert!(kind.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_well_formed() {
        assert!(stock_out().validate().is_ok());
    }
}
