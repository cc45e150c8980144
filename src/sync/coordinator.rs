//! Batch sync orchestration.
//!
//! One batch call is one transaction. Per-item conflicts and validation
//! failures are recovered locally and summarized; infrastructure faults
//! roll the whole batch back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::str::FromStr;
use uuid::Uuid;

use crate::db::{ConceptStore, SyncAuditLog};
use crate::error::SyncError;
use crate::models::{ConceptPatch, ConceptRecord, ConceptType, SyncAttempt, SyncStatus};
use crate::sync::resolver::{resolve, IncomingMeta, Resolution, StoredMeta};

/// At most this many per-item errors are kept in the audit row.
const MAX_SUMMARIZED_ERRORS: usize = 5;

/// One client-submitted item state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncItem {
    /// Raw concept type; validated per item so one bad item can't fail
    /// the whole request.
    pub concept_type: String,
    #[serde(default = "default_version")]
    pub version: i64,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub fields: ConceptPatch,
}

fn default_version() -> i64 {
    1
}

/// Outcome of one batch call, returned to the caller with the owner's full
/// record set so local state can be rebuilt without a follow-up read.
#[derive(Debug, Serialize)]
pub struct SyncReport {
    pub status: SyncStatus,
    pub attempt_id: Uuid,
    pub items_synced: i64,
    pub conflicts_resolved: i64,
    pub concepts: Vec<ConceptRecord>,
}

pub struct SyncCoordinator {
    pool: SqlitePool,
}

impl SyncCoordinator {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Reconcile a batch of item states for one owner.
    ///
    /// The attempt row is committed before any record is touched, so a
    /// crash mid-batch still leaves a durable pending row. All accepted
    /// writes then commit together or not at all.
    pub async fn sync_batch(
        &self,
        owner_id: &str,
        device_label: Option<String>,
        items: &[SyncItem],
    ) -> Result<SyncReport, SyncError> {
        let audit = SyncAuditLog::new(self.pool.clone());
        let attempt = SyncAttempt::new(owner_id, device_label);
        audit.create(&attempt).await?;

        match self.apply_batch(owner_id, attempt.id, items).await {
            Ok(report) => {
                tracing::info!(
                    owner = owner_id,
                    attempt = %attempt.id,
                    items_synced = report.items_synced,
                    conflicts_resolved = report.conflicts_resolved,
                    status = %report.status,
                    "sync batch finished"
                );
                Ok(report)
            }
            Err(e) => {
                // The transaction is already rolled back; record the fault
                // on a fresh connection. Best effort: the original error is
                // what the caller needs to see.
                tracing::error!(owner = owner_id, attempt = %attempt.id, error = %e, "sync batch aborted");
                if let Err(finalize_err) = audit
                    .finalize(attempt.id, SyncStatus::Failed, 0, Some(&e.to_string()))
                    .await
                {
                    tracing::warn!(attempt = %attempt.id, error = %finalize_err, "failed to finalize aborted attempt");
                }
                Err(SyncError::Database(e))
            }
        }
    }

    /// The transactional body of a batch. Any error here aborts the whole
    /// batch; the caller handles the rollback bookkeeping.
    async fn apply_batch(
        &self,
        owner_id: &str,
        attempt_id: Uuid,
        items: &[SyncItem],
    ) -> Result<SyncReport, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        // Touch our own attempt row first. This is a no-op write that takes
        // the database write lock before any record is read, so concurrent
        // batches serialize on the busy timeout rather than failing later
        // with a stale snapshot.
        sqlx::query("UPDATE sync_attempts SET status = status WHERE id = ?")
            .bind(attempt_id.to_string())
            .execute(&mut *tx)
            .await?;

        let mut items_synced: i64 = 0;
        let mut conflicts_resolved: i64 = 0;
        let mut errors: Vec<String> = Vec::new();

        for item in items {
            let concept_type = match self.validate_item(item) {
                Ok(concept_type) => concept_type,
                Err(message) => {
                    errors.push(message);
                    continue;
                }
            };

            let existing =
                ConceptStore::get_for_update(&mut tx, owner_id, concept_type).await?;
            let stored_meta = existing.as_ref().map(|record| StoredMeta {
                version: record.version,
                updated_at: record.updated_at,
            });
            let incoming_meta = IncomingMeta {
                version: item.version,
                updated_at: item.updated_at,
            };

            match resolve(stored_meta.as_ref(), &incoming_meta) {
                Resolution::Accept { new_version } => {
                    let now = Utc::now();
                    let mut record = existing
                        .unwrap_or_else(|| ConceptRecord::new(owner_id, concept_type));
                    record.apply(&item.fields);
                    record.version = new_version;
                    record.updated_at = now;
                    record.last_synced_at = Some(now);

                    ConceptStore::upsert(&mut tx, &record).await?;
                    items_synced += 1;
                }
                Resolution::Skip { reason } => {
                    tracing::debug!(
                        owner = owner_id,
                        concept = %concept_type,
                        ?reason,
                        "conflict resolved in favor of the server"
                    );
                    conflicts_resolved += 1;
                }
            }
        }

        let (status, error_message) = if !errors.is_empty() {
            (SyncStatus::Failed, Some(summarize_errors(&errors)))
        } else if conflicts_resolved > 0 {
            (
                SyncStatus::Complete,
                Some(format!(
                    "Resolved {} conflict(s) in favor of the server",
                    conflicts_resolved
                )),
            )
        } else {
            (SyncStatus::Complete, None)
        };

        SyncAuditLog::finalize_in_tx(
            &mut tx,
            attempt_id,
            status,
            items_synced,
            error_message.as_deref(),
        )
        .await?;

        // Read back inside the transaction so the response matches exactly
        // what commits.
        let concepts = ConceptStore::list_in_tx(&mut tx, owner_id).await?;

        tx.commit().await?;

        Ok(SyncReport {
            status,
            attempt_id,
            items_synced,
            conflicts_resolved,
            concepts,
        })
    }

    fn validate_item(&self, item: &SyncItem) -> Result<ConceptType, String> {
        let concept_type = ConceptType::from_str(&item.concept_type)
            .map_err(|e| format!("Validation error for '{}': {}", item.concept_type, e))?;

        if item.version < 1 {
            return Err(format!(
                "Validation error for '{}': version must be >= 1, got {}",
                concept_type, item.version
            ));
        }

        item.fields
            .validate()
            .map_err(|e| format!("Validation error for '{}': {}", concept_type, e))?;

        Ok(concept_type)
    }
}

/// Concatenate the first few per-item errors into a bounded audit string.
fn summarize_errors(errors: &[String]) -> String {
    let mut summary = errors
        .iter()
        .take(MAX_SUMMARIZED_ERRORS)
        .cloned()
        .collect::<Vec<_>>()
        .join("; ");
    if errors.len() > MAX_SUMMARIZED_ERRORS {
        summary.push_str(&format!(" (and {} more)", errors.len() - MAX_SUMMARIZED_ERRORS));
    }
    summary
}
