//! Error taxonomy for the sync engine.
//!
//! Conflict skips during batch sync are not errors; they are counted
//! outcomes. Everything here either fails a single direct-path call or
//! aborts a whole batch.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Malformed item payload. During batch sync this is recorded and the
    /// batch continues; on the direct path it fails the call.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Direct-path optimistic lock failure. The client must refetch and
    /// retry; the server never resolves this automatically.
    #[error("Version mismatch: submitted {submitted}, stored {stored}")]
    VersionMismatch { submitted: i64, stored: i64 },

    /// Operating on a record that doesn't exist, outside a create path.
    #[error("Concept record not found: {0}")]
    NotFound(Uuid),

    /// Direct create of a (owner, concept-type) pair that already exists.
    #[error("Concept '{0}' already exists for this user")]
    Duplicate(String),

    /// Storage fault. Aborts and rolls back the whole batch.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}
