//! # Remote Gateway
//!
//! The narrow seam between the sync engine and the inventory service.
//!
//! ## Outcome Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Submission Outcomes                                │
//! │                                                                         │
//! │  submit(operation)                                                     │
//! │       │                                                                 │
//! │       ├─► Synced { server_id, snapshot }                               │
//! │       │     Accepted (or deduplicated replay of an earlier accept;     │
//! │       │     the idempotency token makes the two indistinguishable      │
//! │       │     and both are success)                                      │
//! │       │                                                                 │
//! │       ├─► Conflict { reason }                                          │
//! │       │     Business rule rejection. Halts this TARGET, pass moves on. │
//! │       │                                                                 │
//! │       ├─► TransientFailure { cause }                                   │
//! │       │     Network/server trouble. Aborts the whole PASS; the         │
//! │       │     operation stays pending and is retried later.              │
//! │       │                                                                 │
//! │       └─► Invalid { cause }                                            │
//! │             Malformed as judged by the service. Terminal at once,      │
//! │             no retries, pass continues.                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The trait exists so the coordinator never touches HTTP directly; tests
//! drive it with scripted in-memory gateways.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use ergolab_core::{EntityRef, EntityType, PendingOperation};

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Outcomes
// =============================================================================

/// The result of submitting one operation.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// The service accepted (or had already accepted) the operation.
    Synced {
        /// Authoritative identifier assigned by the service.
        server_id: String,

        /// Post-operation snapshot of the target entity, when the service
        /// returns one; used to refresh the local cache.
        snapshot: Option<serde_json::Value>,
    },

    /// Rejected on business rules; waits for user resolution.
    Conflict { reason: String },

    /// Could not be delivered or the service is unhealthy; retry later.
    TransientFailure { cause: String },

    /// Structurally rejected; retrying the same payload is pointless.
    Invalid { cause: String },
}

/// The result of fetching one entity snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Current authoritative snapshot.
    Fetched(serde_json::Value),

    /// The entity does not exist on the service.
    NotFound,

    /// Could not be reached; serve the cache instead.
    TransientFailure { cause: String },
}

// =============================================================================
// Gateway Trait
// =============================================================================

/// Access to the remote inventory service.
///
/// All transport trouble is folded into the outcome types; an `Err` from
/// these methods means a local problem (bad config, encode failure), never
/// a network one.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Submits one queued operation under its idempotency token.
    async fn submit(&self, operation: &PendingOperation) -> SyncResult<SubmitOutcome>;

    /// Fetches the current snapshot of one entity.
    async fn fetch(&self, entity: &EntityRef) -> SyncResult<FetchOutcome>;
}

// =============================================================================
// HTTP Gateway
// =============================================================================

/// Wire shape of a successful submission response.
#[derive(Debug, Deserialize)]
struct SubmitResponse {
    server_id: String,
    #[serde(default)]
    entity: Option<serde_json::Value>,
}

/// Wire shape of an error response body.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    detail: String,
}

/// [`RemoteGateway`] over the service's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    device_id: String,
}

impl HttpGateway {
    /// ## Arguments
    /// * `base_url` - Service base URL, no trailing slash required
    /// * `device_id` - Identifies this device in submissions
    /// * `timeout` - Mandatory per-request timeout; a hung request becomes
    ///   a [`SubmitOutcome::TransientFailure`] once it elapses
    pub fn new(
        base_url: &str,
        device_id: &str,
        timeout: std::time::Duration,
    ) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::Internal(format!("http client: {}", e)))?;

        Ok(HttpGateway {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            device_id: device_id.to_string(),
        })
    }

    fn entity_url(&self, entity: &EntityRef) -> String {
        let collection = match entity.entity_type {
            EntityType::Material => "materials",
            EntityType::Warehouse => "warehouses",
            EntityType::Project => "projects",
        };
        format!("{}/{}/{}", self.base_url, collection, entity.id)
    }
}

/// Maps an HTTP status + error body onto a submission outcome.
///
/// Kept free of I/O so the mapping itself is unit-testable.
fn classify_submit_failure(status: reqwest::StatusCode, detail: String) -> SubmitOutcome {
    if status == reqwest::StatusCode::CONFLICT {
        SubmitOutcome::Conflict { reason: detail }
    } else if status.is_client_error() {
        // 400/404/422: the payload itself is the problem
        SubmitOutcome::Invalid {
            cause: format!("{}: {}", status, detail),
        }
    } else {
        // 5xx and anything unexpected: the service is the problem
        SubmitOutcome::TransientFailure {
            cause: format!("{}: {}", status, detail),
        }
    }
}

#[async_trait]
impl RemoteGateway for HttpGateway {
    async fn submit(&self, operation: &PendingOperation) -> SyncResult<SubmitOutcome> {
        let url = format!("{}/sync/operations", self.base_url);
        let body = serde_json::json!({
            "idempotency_token": operation.idempotency_token,
            "device_id": self.device_id,
            "operation": operation.kind,
        });

        debug!(
            local_id = %operation.local_id,
            op_type = operation.kind.op_type(),
            "Submitting operation"
        );

        let response = match self
            .client
            .post(&url)
            .header("Idempotency-Key", &operation.idempotency_token)
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                return Ok(SubmitOutcome::TransientFailure {
                    cause: e.to_string(),
                })
            }
        };

        let status = response.status();
        if status.is_success() {
            let parsed: SubmitResponse = response.json().await.map_err(|e| {
                SyncError::DecodeFailed(format!("submit response: {}", e))
            })?;
            return Ok(SubmitOutcome::Synced {
                server_id: parsed.server_id,
                snapshot: parsed.entity,
            });
        }

        let detail = match response.json::<ErrorResponse>().await {
            Ok(body) => body.detail,
            Err(_) => String::new(),
        };

        Ok(classify_submit_failure(status, detail))
    }

    async fn fetch(&self, entity: &EntityRef) -> SyncResult<FetchOutcome> {
        let url = self.entity_url(entity);

        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                return Ok(FetchOutcome::TransientFailure {
                    cause: e.to_string(),
                })
            }
        };

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(FetchOutcome::NotFound);
        }
        if !status.is_success() {
            return Ok(FetchOutcome::TransientFailure {
                cause: status.to_string(),
            });
        }

        let snapshot: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SyncError::DecodeFailed(format!("fetch response: {}", e)))?;

        Ok(FetchOutcome::Fetched(snapshot))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_conflict_status_maps_to_conflict() {
        let outcome =
            classify_submit_failure(StatusCode::CONFLICT, "insufficient stock".into());
        assert_eq!(
            outcome,
            SubmitOutcome::Conflict {
                reason: "insufficient stock".into()
            }
        );
    }

    #[test]
    fn test_client_errors_map_to_invalid() {
        for status in [
            StatusCode::BAD_REQUEST,
            StatusCode::NOT_FOUND,
            StatusCode::UNPROCESSABLE_ENTITY,
        ] {
            let outcome = classify_submit_failure(status, "bad payload".into());
            assert!(
                matches!(outcome, SubmitOutcome::Invalid { .. }),
                "{} should be invalid",
                status
            );
        }
    }

    #[test]
    fn test_server_errors_map_to_transient() {
        for status in [
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::BAD_GATEWAY,
            StatusCode::SERVICE_UNAVAILABLE,
        ] {
            let outcome = classify_submit_failure(status, "oops".into());
            assert!(
                matches!(outcome, SubmitOutcome::TransientFailure { .. }),
                "{} should be transient",
                status
            );
        }
    }

    #[test]
    fn test_entity_urls() {
        let gateway = HttpGateway::new(
            "https://inventory.example.com/",
            "device-1",
            std::time::Duration::from_secs(30),
        )
        .unwrap();

        assert_eq!(
            gateway.entity_url(&EntityRef::material("mat-9")),
            "https://inventory.example.com/materials/mat-9"
        );
        assert_eq!(
            gateway.entity_url(&EntityRef::new(EntityType::Warehouse, "wh-2")),
            "https://inventory.example.com/warehouses/wh-2"
        );
    }
}
