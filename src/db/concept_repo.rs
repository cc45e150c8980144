use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteConnection;
use sqlx::SqlitePool;
use std::str::FromStr;
use uuid::Uuid;

use crate::models::{ConceptRecord, ConceptType};

/// Durable keyed storage for concept records.
///
/// Owns the uniqueness of (owner, concept_type) and the version counter.
/// The transaction-scoped operations (`get_for_update`, `upsert`) take the
/// caller's connection so a batch can hold one write transaction across
/// every record it touches.
pub struct ConceptStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct ConceptRow {
    id: String,
    owner_id: String,
    concept_type: String,
    position_x: f64,
    position_y: f64,
    width: f64,
    height: f64,
    desmos_state: Option<String>,
    description: String,
    is_complete: bool,
    created_at: String,
    updated_at: String,
    last_synced_at: Option<String>,
    version: i64,
}

fn decode_err(what: &str, detail: impl std::fmt::Display) -> sqlx::Error {
    sqlx::Error::Decode(format!("{}: {}", what, detail).into())
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| decode_err("invalid timestamp", e))
}

impl TryFrom<ConceptRow> for ConceptRecord {
    type Error = sqlx::Error;

    fn try_from(row: ConceptRow) -> Result<Self, Self::Error> {
        Ok(ConceptRecord {
            id: Uuid::parse_str(&row.id).map_err(|e| decode_err("invalid concept id", e))?,
            owner_id: row.owner_id,
            concept_type: ConceptType::from_str(&row.concept_type)
                .map_err(|e| decode_err("invalid concept type", e))?,
            position_x: row.position_x,
            position_y: row.position_y,
            width: row.width,
            height: row.height,
            desmos_state: row.desmos_state,
            description: row.description,
            is_complete: row.is_complete,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
            last_synced_at: row
                .last_synced_at
                .as_deref()
                .map(parse_timestamp)
                .transpose()?,
            version: row.version,
        })
    }
}

impl ConceptStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// All records for one owner, in display order.
    pub async fn list(&self, owner_id: &str) -> Result<Vec<ConceptRecord>, sqlx::Error> {
        let rows: Vec<ConceptRow> =
            sqlx::query_as("SELECT * FROM concepts WHERE owner_id = ? ORDER BY concept_type")
                .bind(owner_id)
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(ConceptRecord::try_from).collect()
    }

    /// Same as [`list`](Self::list) but inside the caller's transaction, so
    /// a batch response reflects exactly what it committed.
    pub async fn list_in_tx(
        conn: &mut SqliteConnection,
        owner_id: &str,
    ) -> Result<Vec<ConceptRecord>, sqlx::Error> {
        let rows: Vec<ConceptRow> =
            sqlx::query_as("SELECT * FROM concepts WHERE owner_id = ? ORDER BY concept_type")
                .bind(owner_id)
                .fetch_all(conn)
                .await?;

        rows.into_iter().map(ConceptRecord::try_from).collect()
    }

    pub async fn get_by_id(
        &self,
        owner_id: &str,
        id: Uuid,
    ) -> Result<Option<ConceptRecord>, sqlx::Error> {
        let row: Option<ConceptRow> =
            sqlx::query_as("SELECT * FROM concepts WHERE owner_id = ? AND id = ?")
                .bind(owner_id)
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        row.map(ConceptRecord::try_from).transpose()
    }

    /// Read the record a prospective write targets.
    ///
    /// Must run inside the write transaction that will apply the write;
    /// the transaction's database lock is what keeps two concurrent
    /// writers from both observing a stale version.
    pub async fn get_for_update(
        conn: &mut SqliteConnection,
        owner_id: &str,
        concept_type: ConceptType,
    ) -> Result<Option<ConceptRecord>, sqlx::Error> {
        let row: Option<ConceptRow> =
            sqlx::query_as("SELECT * FROM concepts WHERE owner_id = ? AND concept_type = ?")
                .bind(owner_id)
                .bind(concept_type.as_str())
                .fetch_optional(conn)
                .await?;

        row.map(ConceptRecord::try_from).transpose()
    }

    /// By-id variant of [`get_for_update`](Self::get_for_update), for the
    /// direct update path.
    pub async fn get_by_id_for_update(
        conn: &mut SqliteConnection,
        owner_id: &str,
        id: Uuid,
    ) -> Result<Option<ConceptRecord>, sqlx::Error> {
        let row: Option<ConceptRow> =
            sqlx::query_as("SELECT * FROM concepts WHERE owner_id = ? AND id = ?")
                .bind(owner_id)
                .bind(id.to_string())
                .fetch_optional(conn)
                .await?;

        row.map(ConceptRecord::try_from).transpose()
    }

    /// Write a record, creating it if no row exists for its
    /// (owner, concept_type). Returns whether a prior record existed, so
    /// creation and update branches stay independently observable.
    pub async fn upsert(
        conn: &mut SqliteConnection,
        record: &ConceptRecord,
    ) -> Result<bool, sqlx::Error> {
        let existing: Option<(String,)> =
            sqlx::query_as("SELECT id FROM concepts WHERE owner_id = ? AND concept_type = ?")
                .bind(&record.owner_id)
                .bind(record.concept_type.as_str())
                .fetch_optional(&mut *conn)
                .await?;

        match existing {
            Some((id,)) => {
                sqlx::query(
                    r#"
                    UPDATE concepts
                    SET position_x = ?, position_y = ?, width = ?, height = ?,
                        desmos_state = ?, description = ?, is_complete = ?,
                        updated_at = ?, last_synced_at = ?, version = ?
                    WHERE id = ?
                    "#,
                )
                .bind(record.position_x)
                .bind(record.position_y)
                .bind(record.width)
                .bind(record.height)
                .bind(&record.desmos_state)
                .bind(&record.description)
                .bind(record.is_complete)
                .bind(record.updated_at.to_rfc3339())
                .bind(record.last_synced_at.map(|t| t.to_rfc3339()))
                .bind(record.version)
                .bind(&id)
                .execute(conn)
                .await?;
                Ok(true)
            }
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO concepts
                        (id, owner_id, concept_type, position_x, position_y, width, height,
                         desmos_state, description, is_complete, created_at, updated_at,
                         last_synced_at, version)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(record.id.to_string())
                .bind(&record.owner_id)
                .bind(record.concept_type.as_str())
                .bind(record.position_x)
                .bind(record.position_y)
                .bind(record.width)
                .bind(record.height)
                .bind(&record.desmos_state)
                .bind(&record.description)
                .bind(record.is_complete)
                .bind(record.created_at.to_rfc3339())
                .bind(record.updated_at.to_rfc3339())
                .bind(record.last_synced_at.map(|t| t.to_rfc3339()))
                .bind(record.version)
                .execute(conn)
                .await?;
                Ok(false)
            }
        }
    }

    /// Remove a record. Only the direct path calls this; batch sync never
    /// deletes. Returns whether a row was removed.
    pub async fn delete(&self, owner_id: &str, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM concepts WHERE owner_id = ? AND id = ?")
            .bind(owner_id)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn test_upsert_reports_create_vs_update() {
        let (pool, _temp) = test_pool().await;

        let mut record = ConceptRecord::new("user1", ConceptType::Linear);

        let mut tx = pool.begin().await.unwrap();
        let existed = ConceptStore::upsert(&mut tx, &record).await.unwrap();
        tx.commit().await.unwrap();
        assert!(!existed);

        record.version = 2;
        record.description = "updated".to_string();

        let mut tx = pool.begin().await.unwrap();
        let existed = ConceptStore::upsert(&mut tx, &record).await.unwrap();
        tx.commit().await.unwrap();
        assert!(existed);

        let store = ConceptStore::new(pool);
        let records = store.list("user1").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].version, 2);
        assert_eq!(records[0].description, "updated");
    }

    #[tokio::test]
    async fn test_get_for_update_roundtrip() {
        let (pool, _temp) = test_pool().await;

        let mut record = ConceptRecord::new("user1", ConceptType::Exponential);
        record.desmos_state = Some("{\"expressions\":[]}".to_string());
        record.is_complete = true;

        let mut tx = pool.begin().await.unwrap();
        ConceptStore::upsert(&mut tx, &record).await.unwrap();

        let loaded = ConceptStore::get_for_update(&mut tx, "user1", ConceptType::Exponential)
            .await
            .unwrap()
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(loaded.id, record.id);
        assert_eq!(loaded.concept_type, ConceptType::Exponential);
        assert_eq!(loaded.desmos_state.as_deref(), Some("{\"expressions\":[]}"));
        assert!(loaded.is_complete);
        assert_eq!(loaded.version, 1);
    }

    #[tokio::test]
    async fn test_get_for_update_missing_returns_none() {
        let (pool, _temp) = test_pool().await;

        let mut tx = pool.begin().await.unwrap();
        let loaded = ConceptStore::get_for_update(&mut tx, "user1", ConceptType::Piecewise)
            .await
            .unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_list_is_scoped_to_owner() {
        let (pool, _temp) = test_pool().await;

        let mut tx = pool.begin().await.unwrap();
        ConceptStore::upsert(&mut tx, &ConceptRecord::new("user1", ConceptType::Linear))
            .await
            .unwrap();
        ConceptStore::upsert(&mut tx, &ConceptRecord::new("user1", ConceptType::Cubic))
            .await
            .unwrap();
        ConceptStore::upsert(&mut tx, &ConceptRecord::new("user2", ConceptType::Linear))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let store = ConceptStore::new(pool);
        assert_eq!(store.list("user1").await.unwrap().len(), 2);
        assert_eq!(store.list("user2").await.unwrap().len(), 1);
        assert!(store.list("user3").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete() {
        let (pool, _temp) = test_pool().await;

        let record = ConceptRecord::new("user1", ConceptType::Inverse);
        let mut tx = pool.begin().await.unwrap();
        ConceptStore::upsert(&mut tx, &record).await.unwrap();
        tx.commit().await.unwrap();

        let store = ConceptStore::new(pool);

        // Wrong owner can't delete it
        assert!(!store.delete("user2", record.id).await.unwrap());
        assert!(store.delete("user1", record.id).await.unwrap());
        assert!(!store.delete("user1", record.id).await.unwrap());
        assert!(store.list("user1").await.unwrap().is_empty());
    }
}
