//! # Pending Operation Queue Repository
//!
//! The durable, ordered queue of not-yet-confirmed write operations.
//!
//! ## The Write-Ahead Queue
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  Write-Ahead Queue Implementation                       │
//! │                                                                         │
//! │  USER ACTION (e.g., record stock_out while offline)                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  enqueue(kind)                                                         │
//! │    1. validate payload (reject at the door)                            │
//! │    2. INSERT row with status='pending'                                 │
//! │    3. return local_id  ← the row is durable BEFORE this returns;       │
//! │                          a crash here loses nothing                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            SYNC PASS (coordinator, later)                       │   │
//! │  │                                                                 │   │
//! │  │  1. next_batch: SELECT * WHERE status='pending'                │   │
//! │  │                 [AND target_ref=?] ORDER BY created_at         │   │
//! │  │  2. mark_syncing → submit → mark_synced / mark_conflict /      │   │
//! │  │     mark_failed(retryable?)                                    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  KEY GUARANTEES:                                                       │
//! │  • An operation is never lost (durable before enqueue returns)         │
//! │  • Per-target creation order is the iteration order                    │
//! │  • The retry ceiling lives HERE: mark_failed(retryable=true) can       │
//! │    force terminal 'failed', so every pass converges                    │
//! │  • synced/failed/conflict rows are retained for audit, never           │
//! │    deleted by the sync pass                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, warn};

use ergolab_core::{EntityRef, OperationKind, OperationStatus, PendingOperation};

use crate::error::{DbError, DbResult};

// =============================================================================
// Row Mapping
// =============================================================================

/// Raw queue row as stored; the payload is decoded into its typed form
/// during conversion so corruption surfaces as one typed error.
#[derive(Debug, sqlx::FromRow)]
struct OperationRow {
    local_id: String,
    idempotency_token: String,
    payload: String,
    status: OperationStatus,
    attempt_count: i64,
    created_at: DateTime<Utc>,
    server_id: Option<String>,
    last_error: Option<String>,
}

impl OperationRow {
    fn into_operation(self) -> DbResult<PendingOperation> {
        let kind: OperationKind =
            serde_json::from_str(&self.payload).map_err(|e| DbError::CorruptPayload {
                local_id: self.local_id.clone(),
                reason: e.to_string(),
            })?;

        Ok(PendingOperation {
            local_id: self.local_id,
            idempotency_token: self.idempotency_token,
            kind,
            status: self.status,
            attempt_count: self.attempt_count,
            created_at: self.created_at,
            server_id: self.server_id,
            last_error: self.last_error,
        })
    }
}

const SELECT_COLUMNS: &str = "local_id, idempotency_token, payload, status, \
     attempt_count, created_at, server_id, last_error";

// =============================================================================
// Operation Queue Repository
// =============================================================================

/// Repository for the pending-operation queue.
#[derive(Debug, Clone)]
pub struct OperationQueueRepository {
    pool: SqlitePool,

    /// Attempt ceiling after which a retryable failure goes terminal.
    retry_ceiling: i64,
}

impl OperationQueueRepository {
    /// Creates a new OperationQueueRepository.
    pub fn new(pool: SqlitePool, retry_ceiling: i64) -> Self {
        OperationQueueRepository {
            pool,
            retry_ceiling,
        }
    }

    /// Records a write operation durably, write-ahead.
    ///
    /// Generates `local_id` and `idempotency_token`, validates the payload,
    /// and persists the row in `pending` status **before** returning. The
    /// caller may crash immediately after and the operation still exists
    /// on restart.
    ///
    /// ## Errors
    /// * [`DbError::Rejected`] - payload failed validation, nothing stored
    pub async fn enqueue(&self, kind: OperationKind) -> DbResult<PendingOperation> {
        kind.validate()?;

        let op = PendingOperation::new(kind);
        let payload = serde_json::to_string(&op.kind)
            .map_err(|e| DbError::Internal(format!("payload encode: {}", e)))?;
        let target_ref = op.target().to_string();

        debug!(
            local_id = %op.local_id,
            op_type = op.kind.op_type(),
            target = %target_ref,
            "Enqueuing operation"
        );

        sqlx::query(
            r#"
            INSERT INTO pending_operations (
                local_id, idempotency_token, op_type, target_ref, payload,
                status, attempt_count, created_at, server_id, last_error
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&op.local_id)
        .bind(&op.idempotency_token)
        .bind(op.kind.op_type())
        .bind(&target_ref)
        .bind(&payload)
        .bind(op.status)
        .bind(op.attempt_count)
        .bind(op.created_at)
        .bind(&op.server_id)
        .bind(&op.last_error)
        .execute(&self.pool)
        .await?;

        Ok(op)
    }

    /// Fetches a single operation by its local ID.
    pub async fn get(&self, local_id: &str) -> DbResult<Option<PendingOperation>> {
        let row: Option<OperationRow> = sqlx::query_as(&format!(
            "SELECT {} FROM pending_operations WHERE local_id = ?1",
            SELECT_COLUMNS
        ))
        .bind(local_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(OperationRow::into_operation).transpose()
    }

    /// Returns pending operations oldest-first.
    ///
    /// ## Arguments
    /// * `target` - When given, restricted to that target so the caller can
    ///   drain one target in strict creation order
    /// * `limit` - Maximum operations to return
    pub async fn next_batch(
        &self,
        target: Option<&EntityRef>,
        limit: u32,
    ) -> DbResult<Vec<PendingOperation>> {
        let rows: Vec<OperationRow> = match target {
            Some(target) => {
                sqlx::query_as(&format!(
                    r#"
                    SELECT {} FROM pending_operations
                    WHERE status = 'pending' AND target_ref = ?1
                    ORDER BY created_at ASC
                    LIMIT ?2
                    "#,
                    SELECT_COLUMNS
                ))
                .bind(target.to_string())
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(&format!(
                    r#"
                    SELECT {} FROM pending_operations
                    WHERE status = 'pending'
                    ORDER BY created_at ASC
                    LIMIT ?1
                    "#,
                    SELECT_COLUMNS
                ))
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(OperationRow::into_operation).collect()
    }

    /// Returns the distinct targets with pending operations, ordered by
    /// their oldest pending operation.
    ///
    /// The coordinator partitions a pass by this list; targets are
    /// independent of each other.
    pub async fn pending_targets(&self) -> DbResult<Vec<EntityRef>> {
        let refs: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT target_ref FROM pending_operations
            WHERE status = 'pending'
            GROUP BY target_ref
            ORDER BY MIN(created_at) ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        refs.into_iter()
            .map(|r| {
                r.parse::<EntityRef>()
                    .map_err(|e| DbError::Internal(format!("bad target_ref '{}': {}", r, e)))
            })
            .collect()
    }

    /// Marks an operation as in-flight for the current pass.
    ///
    /// Only a `pending` operation may enter `syncing`; anything else is an
    /// [`DbError::InvalidTransition`], which is how a crashed pass is
    /// prevented from ever resubmitting a `synced` row.
    pub async fn mark_syncing(&self, local_id: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE pending_operations SET status = 'syncing' \
             WHERE local_id = ?1 AND status = 'pending'",
        )
        .bind(local_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.transition_error(local_id, OperationStatus::Syncing).await);
        }

        Ok(())
    }

    /// Marks an operation as confirmed by the remote service.
    pub async fn mark_synced(&self, local_id: &str, server_id: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE pending_operations SET status = 'synced', server_id = ?2, last_error = NULL \
             WHERE local_id = ?1 AND status = 'syncing'",
        )
        .bind(local_id)
        .bind(server_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.transition_error(local_id, OperationStatus::Synced).await);
        }

        debug!(local_id = %local_id, server_id = %server_id, "Operation synced");
        Ok(())
    }

    /// Records a submission failure.
    ///
    /// ## Retry policy (lives here as data, not in the coordinator)
    /// - `retryable = false`: terminal `failed` immediately; the attempt
    ///   budget is untouched since retrying can never succeed.
    /// - `retryable = true`: `attempt_count` is incremented. Below the
    ///   ceiling the operation is re-queued as `pending`; at the ceiling
    ///   the status is forced to terminal `failed` regardless of caller
    ///   intent, so a pass-level retry loop always converges.
    ///
    /// ## Returns
    /// The status the operation ended up in.
    pub async fn mark_failed(
        &self,
        local_id: &str,
        error: &str,
        retryable: bool,
    ) -> DbResult<OperationStatus> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(OperationStatus, i64)> = sqlx::query_as(
            "SELECT status, attempt_count FROM pending_operations WHERE local_id = ?1",
        )
        .bind(local_id)
        .fetch_optional(&mut *tx)
        .await?;

        let (status, attempt_count) = match row {
            Some(row) => row,
            None => return Err(DbError::not_found("Operation", local_id)),
        };

        if status != OperationStatus::Syncing {
            return Err(DbError::InvalidTransition {
                local_id: local_id.to_string(),
                actual: status,
                requested: OperationStatus::Failed,
            });
        }

        let (new_status, new_attempts) = if !retryable {
            (OperationStatus::Failed, attempt_count)
        } else {
            let attempts = attempt_count + 1;
            if attempts >= self.retry_ceiling {
                (OperationStatus::Failed, attempts)
            } else {
                (OperationStatus::Pending, attempts)
            }
        };

        sqlx::query(
            "UPDATE pending_operations \
             SET status = ?2, attempt_count = ?3, last_error = ?4 \
             WHERE local_id = ?1",
        )
        .bind(local_id)
        .bind(new_status)
        .bind(new_attempts)
        .bind(error)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        if new_status == OperationStatus::Failed {
            warn!(
                local_id = %local_id,
                attempts = new_attempts,
                retryable,
                error = %error,
                "Operation failed terminally"
            );
        } else {
            debug!(
                local_id = %local_id,
                attempts = new_attempts,
                "Operation re-queued after retryable failure"
            );
        }

        Ok(new_status)
    }

    /// Records a business-rule rejection.
    ///
    /// Conflicts are never auto-retried; the row waits for explicit user
    /// resolution (which enqueues a new operation with fresh identifiers).
    pub async fn mark_conflict(&self, local_id: &str, reason: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE pending_operations SET status = 'conflict', last_error = ?2 \
             WHERE local_id = ?1 AND status = 'syncing'",
        )
        .bind(local_id)
        .bind(reason)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.transition_error(local_id, OperationStatus::Conflict).await);
        }

        warn!(local_id = %local_id, reason = %reason, "Operation in conflict");
        Ok(())
    }

    /// Counts operations in a given status.
    pub async fn count(&self, status: OperationStatus) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM pending_operations WHERE status = ?1")
                .bind(status)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    /// Re-queues operations stranded in `syncing` by a crash.
    ///
    /// Called once at the start of a pass. The replay reuses the original
    /// idempotency token, so a submission that was accepted just before
    /// the crash dedups to the same `server_id` on the remote side.
    ///
    /// ## Returns
    /// Number of recovered operations.
    pub async fn recover_stranded(&self) -> DbResult<u64> {
        let result = sqlx::query(
            "UPDATE pending_operations SET status = 'pending' WHERE status = 'syncing'",
        )
        .execute(&self.pool)
        .await?;

        let recovered = result.rows_affected();
        if recovered > 0 {
            warn!(count = recovered, "Recovered operations stranded mid-sync");
        }

        Ok(recovered)
    }

    /// Deletes old synced rows (maintenance, host-invoked only).
    ///
    /// ## Arguments
    /// * `days_old` - Delete synced rows created more than this many days ago
    ///
    /// ## Returns
    /// Number of deleted rows.
    pub async fn prune_synced(&self, days_old: u32) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM pending_operations
            WHERE status = 'synced'
            AND created_at < datetime('now', '-' || ?1 || ' days')
            "#,
        )
        .bind(days_old)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Builds the precise error for a guarded UPDATE that matched no row.
    async fn transition_error(&self, local_id: &str, requested: OperationStatus) -> DbError {
        let actual: Result<Option<OperationStatus>, sqlx::Error> =
            sqlx::query_scalar("SELECT status FROM pending_operations WHERE local_id = ?1")
                .bind(local_id)
                .fetch_optional(&self.pool)
                .await;

        match actual {
            Ok(Some(actual)) => DbError::InvalidTransition {
                local_id: local_id.to_string(),
                actual,
                requested,
            },
            Ok(None) => DbError::not_found("Operation", local_id),
            Err(e) => e.into(),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use ergolab_core::EntityType;

    fn stock_in(material: &str, qty: i64) -> OperationKind {
        OperationKind::StockIn {
            material_id: material.to_string(),
            warehouse_id: "wh-1".to_string(),
            quantity: qty,
            note: None,
        }
    }

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_enqueue_persists_pending() {
        let db = test_db().await;
        let queue = db.operations();

        let op = queue.enqueue(stock_in("mat-1", 5)).await.unwrap();

        let stored = queue.get(&op.local_id).await.unwrap().unwrap();
        assert_eq!(stored.status, OperationStatus::Pending);
        assert_eq!(stored.idempotency_token, op.idempotency_token);
        assert_eq!(stored.kind, op.kind);
        assert_eq!(stored.attempt_count, 0);
        assert!(stored.server_id.is_none());
    }

    #[tokio::test]
    async fn test_enqueue_rejects_invalid_payload() {
        let db = test_db().await;
        let queue = db.operations();

        let err = queue.enqueue(stock_in("mat-1", 0)).await.unwrap_err();
        assert!(matches!(err, DbError::Rejected(_)));

        // Nothing was stored
        assert_eq!(queue.count(OperationStatus::Pending).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_next_batch_orders_oldest_first_per_target() {
        let db = test_db().await;
        let queue = db.operations();

        let a1 = queue.enqueue(stock_in("mat-a", 1)).await.unwrap();
        let b1 = queue.enqueue(stock_in("mat-b", 2)).await.unwrap();
        let a2 = queue.enqueue(stock_in("mat-a", 3)).await.unwrap();

        let target_a = EntityRef::new(EntityType::Material, "mat-a");
        let batch = queue.next_batch(Some(&target_a), 10).await.unwrap();
        let ids: Vec<&str> = batch.iter().map(|op| op.local_id.as_str()).collect();
        assert_eq!(ids, vec![a1.local_id.as_str(), a2.local_id.as_str()]);

        let all = queue.next_batch(None, 10).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[1].local_id, b1.local_id);
    }

    #[tokio::test]
    async fn test_pending_targets_ordered_by_oldest() {
        let db = test_db().await;
        let queue = db.operations();

        queue.enqueue(stock_in("mat-b", 1)).await.unwrap();
        queue.enqueue(stock_in("mat-a", 1)).await.unwrap();
        queue.enqueue(stock_in("mat-b", 2)).await.unwrap();

        let targets = queue.pending_targets().await.unwrap();
        assert_eq!(
            targets,
            vec![EntityRef::material("mat-b"), EntityRef::material("mat-a")]
        );
    }

    #[tokio::test]
    async fn test_sync_lifecycle_happy_path() {
        let db = test_db().await;
        let queue = db.operations();

        let op = queue.enqueue(stock_in("mat-1", 5)).await.unwrap();

        queue.mark_syncing(&op.local_id).await.unwrap();
        queue.mark_synced(&op.local_id, "srv-77").await.unwrap();

        let stored = queue.get(&op.local_id).await.unwrap().unwrap();
        assert_eq!(stored.status, OperationStatus::Synced);
        assert_eq!(stored.server_id.as_deref(), Some("srv-77"));
    }

    #[tokio::test]
    async fn test_synced_operation_cannot_resync() {
        let db = test_db().await;
        let queue = db.operations();

        let op = queue.enqueue(stock_in("mat-1", 5)).await.unwrap();
        queue.mark_syncing(&op.local_id).await.unwrap();
        queue.mark_synced(&op.local_id, "srv-1").await.unwrap();

        let err = queue.mark_syncing(&op.local_id).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::InvalidTransition {
                actual: OperationStatus::Synced,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_retryable_failure_requeues_and_counts_attempt() {
        let db = test_db().await;
        let queue = db.operations();

        let op = queue.enqueue(stock_in("mat-1", 5)).await.unwrap();
        queue.mark_syncing(&op.local_id).await.unwrap();

        let status = queue
            .mark_failed(&op.local_id, "connection reset", true)
            .await
            .unwrap();
        assert_eq!(status, OperationStatus::Pending);

        let stored = queue.get(&op.local_id).await.unwrap().unwrap();
        assert_eq!(stored.attempt_count, 1);
        assert_eq!(stored.last_error.as_deref(), Some("connection reset"));
    }

    #[tokio::test]
    async fn test_retry_ceiling_forces_terminal_failed() {
        let db = Database::new(DbConfig::in_memory().retry_ceiling(5))
            .await
            .unwrap();
        let queue = db.operations();

        let op = queue.enqueue(stock_in("mat-1", 5)).await.unwrap();

        for attempt in 1..=5i64 {
            queue.mark_syncing(&op.local_id).await.unwrap();
            let status = queue
                .mark_failed(&op.local_id, "timeout", true)
                .await
                .unwrap();

            let expected = if attempt < 5 {
                OperationStatus::Pending
            } else {
                OperationStatus::Failed
            };
            assert_eq!(status, expected, "attempt {}", attempt);
        }

        let stored = queue.get(&op.local_id).await.unwrap().unwrap();
        assert_eq!(stored.attempt_count, 5);
        assert_eq!(stored.status, OperationStatus::Failed);

        // Terminal: cannot be picked up again
        assert!(queue.mark_syncing(&op.local_id).await.is_err());
    }

    #[tokio::test]
    async fn test_non_retryable_failure_spares_attempt_budget() {
        let db = test_db().await;
        let queue = db.operations();

        let op = queue.enqueue(stock_in("mat-1", 5)).await.unwrap();
        queue.mark_syncing(&op.local_id).await.unwrap();

        let status = queue
            .mark_failed(&op.local_id, "unknown warehouse", false)
            .await
            .unwrap();
        assert_eq!(status, OperationStatus::Failed);

        let stored = queue.get(&op.local_id).await.unwrap().unwrap();
        assert_eq!(stored.attempt_count, 0);
    }

    #[tokio::test]
    async fn test_conflict_holds_for_user_resolution() {
        let db = test_db().await;
        let queue = db.operations();

        let op = queue.enqueue(stock_in("mat-1", 5)).await.unwrap();
        queue.mark_syncing(&op.local_id).await.unwrap();
        queue
            .mark_conflict(&op.local_id, "insufficient stock")
            .await
            .unwrap();

        let stored = queue.get(&op.local_id).await.unwrap().unwrap();
        assert_eq!(stored.status, OperationStatus::Conflict);
        assert_eq!(stored.last_error.as_deref(), Some("insufficient stock"));

        // Conflicts are not picked up by next_batch
        assert!(queue.next_batch(None, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recover_stranded_requeues_syncing_rows() {
        let db = test_db().await;
        let queue = db.operations();

        let op = queue.enqueue(stock_in("mat-1", 5)).await.unwrap();
        queue.mark_syncing(&op.local_id).await.unwrap();

        // Simulated crash: the row is stuck in 'syncing'
        let recovered = queue.recover_stranded().await.unwrap();
        assert_eq!(recovered, 1);

        let stored = queue.get(&op.local_id).await.unwrap().unwrap();
        assert_eq!(stored.status, OperationStatus::Pending);
        // Same token: the remote dedups the replay
        assert_eq!(stored.idempotency_token, op.idempotency_token);
    }

    #[tokio::test]
    async fn test_enqueue_survives_restart() {
        // Durability needs a real file, not :memory:
        let path = std::env::temp_dir().join(format!("ergolab-queue-{}.db", uuid::Uuid::new_v4()));

        let op = {
            let db = Database::new(DbConfig::new(&path)).await.unwrap();
            let op = db.operations().enqueue(stock_in("mat-1", 5)).await.unwrap();
            db.close().await;
            op
        };

        // "Restart": a fresh pool over the same file
        let db = Database::new(DbConfig::new(&path)).await.unwrap();
        let stored = db.operations().get(&op.local_id).await.unwrap().unwrap();
        assert_eq!(stored.status, OperationStatus::Pending);
        assert_eq!(stored.kind, op.kind);

        db.close().await;
        let _ = std::fs::remove_file(&path);
    }
}
