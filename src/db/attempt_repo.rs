use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteConnection;
use sqlx::SqlitePool;
use std::str::FromStr;
use uuid::Uuid;

use crate::models::{SyncAttempt, SyncStatus};

/// Append-only audit log of batch sync attempts.
///
/// An attempt row is created once with status pending, finalized exactly
/// once, and never deleted by the sync path.
pub struct SyncAuditLog {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct AttemptRow {
    id: String,
    owner_id: String,
    device_label: String,
    started_at: String,
    status: String,
    items_synced: i64,
    error_message: Option<String>,
}

impl TryFrom<AttemptRow> for SyncAttempt {
    type Error = sqlx::Error;

    fn try_from(row: AttemptRow) -> Result<Self, Self::Error> {
        let decode = |what: &str, e: String| sqlx::Error::Decode(format!("{}: {}", what, e).into());

        Ok(SyncAttempt {
            id: Uuid::parse_str(&row.id).map_err(|e| decode("invalid attempt id", e.to_string()))?,
            owner_id: row.owner_id,
            device_label: row.device_label,
            started_at: DateTime::parse_from_rfc3339(&row.started_at)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| decode("invalid started_at", e.to_string()))?,
            status: SyncStatus::from_str(&row.status).map_err(|e| decode("invalid status", e))?,
            items_synced: row.items_synced,
            error_message: row.error_message,
        })
    }
}

impl SyncAuditLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Record a pending attempt. Committed immediately, before any concept
    /// record is touched, so the attempt survives a crash mid-batch.
    pub async fn create(&self, attempt: &SyncAttempt) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO sync_attempts (id, owner_id, device_label, started_at, status, items_synced)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(attempt.id.to_string())
        .bind(&attempt.owner_id)
        .bind(&attempt.device_label)
        .bind(attempt.started_at.to_rfc3339())
        .bind(attempt.status.to_string())
        .bind(attempt.items_synced)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Finalize an attempt inside the batch transaction, so the outcome
    /// commits together with the writes it describes.
    pub async fn finalize_in_tx(
        conn: &mut SqliteConnection,
        id: Uuid,
        status: SyncStatus,
        items_synced: i64,
        error_message: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE sync_attempts SET status = ?, items_synced = ?, error_message = ? WHERE id = ?",
        )
        .bind(status.to_string())
        .bind(items_synced)
        .bind(error_message)
        .bind(id.to_string())
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Finalize an attempt on its own connection. Used after a rollback,
    /// when the in-transaction finalization was discarded with the batch.
    pub async fn finalize(
        &self,
        id: Uuid,
        status: SyncStatus,
        items_synced: i64,
        error_message: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        Self::finalize_in_tx(&mut conn, id, status, items_synced, error_message).await
    }

    /// The owner's most recent attempts, newest first.
    pub async fn recent(&self, owner_id: &str, limit: i64) -> Result<Vec<SyncAttempt>, sqlx::Error> {
        let rows: Vec<AttemptRow> = sqlx::query_as(
            "SELECT * FROM sync_attempts WHERE owner_id = ? ORDER BY started_at DESC LIMIT ?",
        )
        .bind(owner_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SyncAttempt::try_from).collect()
    }
}
