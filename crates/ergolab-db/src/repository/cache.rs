//! # Cached Entity Repository
//!
//! Local snapshots of server entities (materials, warehouses, projects) so
//! reads keep working with no connectivity. Entries carry the time they were
//! stored; staleness is the reader's call, never grounds for refusing data.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use ergolab_core::{CachedEntity, EntityType};

use crate::error::{DbError, DbResult};

// =============================================================================
// Row Mapping
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct CacheRow {
    entity_type: EntityType,
    id: String,
    payload: String,
    cached_at: DateTime<Utc>,
}

impl CacheRow {
    fn into_entity(self) -> DbResult<CachedEntity> {
        let payload: serde_json::Value =
            serde_json::from_str(&self.payload).map_err(|e| DbError::CorruptPayload {
                local_id: format!("{}:{}", self.entity_type, self.id),
                reason: e.to_string(),
            })?;

        Ok(CachedEntity {
            entity_type: self.entity_type,
            id: self.id,
            payload,
            cached_at: self.cached_at,
        })
    }
}

// =============================================================================
// Cached Entity Repository
// =============================================================================

/// Repository for locally cached entity snapshots.
#[derive(Debug, Clone)]
pub struct CachedEntityRepository {
    pool: SqlitePool,
}

impl CachedEntityRepository {
    /// Creates a new CachedEntityRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CachedEntityRepository { pool }
    }

    /// Looks up one cached entity. `None` means never cached (or invalidated),
    /// not "does not exist remotely".
    pub async fn get(&self, entity_type: EntityType, id: &str) -> DbResult<Option<CachedEntity>> {
        let row: Option<CacheRow> = sqlx::query_as(
            "SELECT entity_type, id, payload, cached_at FROM cached_entities \
             WHERE entity_type = ?1 AND id = ?2",
        )
        .bind(entity_type)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(CacheRow::into_entity).transpose()
    }

    /// Stores or replaces a snapshot, stamping it with the current time.
    pub async fn put(
        &self,
        entity_type: EntityType,
        id: &str,
        payload: &serde_json::Value,
    ) -> DbResult<CachedEntity> {
        let entity = CachedEntity::new(entity_type, id, payload.clone());
        let encoded = serde_json::to_string(&entity.payload)
            .map_err(|e| DbError::Internal(format!("payload encode: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO cached_entities (entity_type, id, payload, cached_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (entity_type, id) DO UPDATE SET
                payload = excluded.payload,
                cached_at = excluded.cached_at
            "#,
        )
        .bind(entity.entity_type)
        .bind(&entity.id)
        .bind(&encoded)
        .bind(entity.cached_at)
        .execute(&self.pool)
        .await?;

        debug!(entity_type = %entity.entity_type, id = %entity.id, "Cached entity snapshot");
        Ok(entity)
    }

    /// Returns every cached entity of one type, stable by id.
    pub async fn all(&self, entity_type: EntityType) -> DbResult<Vec<CachedEntity>> {
        let rows: Vec<CacheRow> = sqlx::query_as(
            "SELECT entity_type, id, payload, cached_at FROM cached_entities \
             WHERE entity_type = ?1 ORDER BY id ASC",
        )
        .bind(entity_type)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CacheRow::into_entity).collect()
    }

    /// Filters cached entities of one type with an arbitrary predicate over
    /// the snapshot payload.
    pub async fn query<F>(&self, entity_type: EntityType, predicate: F) -> DbResult<Vec<CachedEntity>>
    where
        F: Fn(&CachedEntity) -> bool,
    {
        let all = self.all(entity_type).await?;
        Ok(all.into_iter().filter(|e| predicate(e)).collect())
    }

    /// Drops one cached entry so the next read misses and refetches.
    ///
    /// ## Returns
    /// `true` if an entry existed.
    pub async fn invalidate(&self, entity_type: EntityType, id: &str) -> DbResult<bool> {
        let result = sqlx::query(
            "DELETE FROM cached_entities WHERE entity_type = ?1 AND id = ?2",
        )
        .bind(entity_type)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Drops every cached entry of one type.
    pub async fn invalidate_all(&self, entity_type: EntityType) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM cached_entities WHERE entity_type = ?1")
            .bind(entity_type)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Counts cached entries of one type.
    pub async fn count(&self, entity_type: EntityType) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM cached_entities WHERE entity_type = ?1")
                .bind(entity_type)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use serde_json::json;

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_put_then_get_round_trips() {
        let db = test_db().await;
        let cache = db.cache();

        let payload = json!({"name": "Rebar 12mm", "unit": "kg", "quantity": 420});
        cache
            .put(EntityType::Material, "mat-1", &payload)
            .await
            .unwrap();

        let entity = cache
            .get(EntityType::Material, "mat-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entity.payload, payload);
        assert_eq!(entity.id, "mat-1");
    }

    #[tokio::test]
    async fn test_miss_returns_none() {
        let db = test_db().await;
        let cache = db.cache();

        assert!(cache
            .get(EntityType::Warehouse, "nope")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_put_replaces_and_restamps() {
        let db = test_db().await;
        let cache = db.cache();

        let first = cache
            .put(EntityType::Material, "mat-1", &json!({"quantity": 10}))
            .await
            .unwrap();
        let second = cache
            .put(EntityType::Material, "mat-1", &json!({"quantity": 7}))
            .await
            .unwrap();

        let stored = cache
            .get(EntityType::Material, "mat-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.payload["quantity"], 7);
        assert!(second.cached_at >= first.cached_at);
        assert_eq!(cache.count(EntityType::Material).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_types_are_separate_namespaces() {
        let db = test_db().await;
        let cache = db.cache();

        cache
            .put(EntityType::Material, "x-1", &json!({"kind": "material"}))
            .await
            .unwrap();
        cache
            .put(EntityType::Warehouse, "x-1", &json!({"kind": "warehouse"}))
            .await
            .unwrap();

        let mat = cache.get(EntityType::Material, "x-1").await.unwrap().unwrap();
        assert_eq!(mat.payload["kind"], "material");
        assert_eq!(cache.count(EntityType::Warehouse).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_query_filters_by_payload() {
        let db = test_db().await;
        let cache = db.cache();

        cache
            .put(EntityType::Material, "mat-1", &json!({"quantity": 3}))
            .await
            .unwrap();
        cache
            .put(EntityType::Material, "mat-2", &json!({"quantity": 50}))
            .await
            .unwrap();

        let low = cache
            .query(EntityType::Material, |e| {
                e.payload["quantity"].as_i64().unwrap_or(0) < 10
            })
            .await
            .unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].id, "mat-1");
    }

    #[tokio::test]
    async fn test_query_by_staleness() {
        let db = test_db().await;
        let cache = db.cache();

        cache
            .put(EntityType::Material, "mat-1", &json!({"name": "Rebar"}))
            .await
            .unwrap();

        // Freshly stored: nothing is older than a day
        let stale = cache
            .query(EntityType::Material, |e| {
                e.is_stale(chrono::Duration::hours(24))
            })
            .await
            .unwrap();
        assert!(stale.is_empty());

        // But everything is older than zero seconds
        let stale = cache
            .query(EntityType::Material, |e| {
                e.is_stale(chrono::Duration::zero())
            })
            .await
            .unwrap();
        assert_eq!(stale.len(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_removes_entry() {
        let db = test_db().await;
        let cache = db.cache();

        cache
            .put(EntityType::Project, "prj-1", &json!({"name": "Bridge"}))
            .await
            .unwrap();

        assert!(cache.invalidate(EntityType::Project, "prj-1").await.unwrap());
        assert!(cache
            .get(EntityType::Project, "prj-1")
            .await
            .unwrap()
            .is_none());
        // Second invalidation is a no-op
        assert!(!cache.invalidate(EntityType::Project, "prj-1").await.unwrap());
    }
}
