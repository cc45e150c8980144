//! Direct single-record path, used outside batch sync.
//!
//! Stricter than the batch resolver on purpose: a supplied version must
//! equal the stored version exactly, with no timestamp fallback. A client
//! that loses the race refetches and retries; the server never resolves
//! the conflict for it.

use chrono::Utc;
use sqlx::SqlitePool;
use std::str::FromStr;
use uuid::Uuid;

use crate::db::ConceptStore;
use crate::error::SyncError;
use crate::models::{ConceptPatch, ConceptRecord, ConceptType};

pub struct ItemUpdateGuard {
    pool: SqlitePool,
}

impl ItemUpdateGuard {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a record directly, at version 1. Rejects a duplicate
    /// (owner, concept-type) pair instead of silently updating it.
    pub async fn create(
        &self,
        owner_id: &str,
        concept_type: &str,
        patch: &ConceptPatch,
    ) -> Result<ConceptRecord, SyncError> {
        let concept_type =
            ConceptType::from_str(concept_type).map_err(SyncError::Validation)?;
        patch.validate().map_err(SyncError::Validation)?;

        let mut tx = self.pool.begin().await?;

        // Take the write lock before the duplicate check so concurrent
        // creates serialize instead of failing with a stale snapshot.
        sqlx::query("UPDATE concepts SET id = id WHERE owner_id = ? AND concept_type = ?")
            .bind(owner_id)
            .bind(concept_type.as_str())
            .execute(&mut *tx)
            .await?;

        if ConceptStore::get_for_update(&mut tx, owner_id, concept_type)
            .await?
            .is_some()
        {
            return Err(SyncError::Duplicate(concept_type.to_string()));
        }

        let mut record = ConceptRecord::new(owner_id, concept_type);
        record.apply(patch);
        ConceptStore::upsert(&mut tx, &record).await?;
        tx.commit().await?;

        Ok(record)
    }

    /// Update a record with a hard optimistic version check.
    ///
    /// If a version is supplied and doesn't exactly match the stored one,
    /// the call fails before any field is touched. The version increment
    /// and `last_synced_at` land in the same transaction as the field
    /// changes, so there is no window where the version is stale relative
    /// to the data.
    pub async fn update(
        &self,
        owner_id: &str,
        id: Uuid,
        expected_version: Option<i64>,
        patch: &ConceptPatch,
    ) -> Result<ConceptRecord, SyncError> {
        patch.validate().map_err(SyncError::Validation)?;

        let mut tx = self.pool.begin().await?;

        // No-op write against the target row to take the write lock before
        // the read, so concurrent updates serialize on the busy timeout
        // rather than one of them surfacing a storage error.
        sqlx::query("UPDATE concepts SET id = id WHERE owner_id = ? AND id = ?")
            .bind(owner_id)
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        let mut record = ConceptStore::get_by_id_for_update(&mut tx, owner_id, id)
            .await?
            .ok_or(SyncError::NotFound(id))?;

        if let Some(expected) = expected_version {
            if expected != record.version {
                // Dropping the transaction rolls it back; nothing mutated.
                return Err(SyncError::VersionMismatch {
                    submitted: expected,
                    stored: record.version,
                });
            }
        }

        let now = Utc::now();
        record.apply(patch);
        record.version += 1;
        record.updated_at = now;
        record.last_synced_at = Some(now);

        ConceptStore::upsert(&mut tx, &record).await?;
        tx.commit().await?;

        Ok(record)
    }

    /// Delete a record. The only delete operation in the system; batch
    /// sync never removes records.
    pub async fn delete(&self, owner_id: &str, id: Uuid) -> Result<(), SyncError> {
        let store = ConceptStore::new(self.pool.clone());
        if store.delete(owner_id, id).await? {
            Ok(())
        } else {
            Err(SyncError::NotFound(id))
        }
    }
}
