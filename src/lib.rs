//! Math Museums sync engine.
//!
//! Reconciles per-concept editor state from multiple devices against one
//! server-held copy. Each (owner, concept-type) pair has exactly one
//! record with a monotonic version counter; batch sync decides per item
//! whether to accept, skip, or count a conflict, and every batch leaves an
//! append-only audit row.

pub mod db;
pub mod error;
pub mod models;
pub mod server;
pub mod sync;

pub use db::{init_db, ConceptStore, SyncAuditLog};
pub use error::SyncError;
pub use models::{ConceptPatch, ConceptRecord, ConceptType, SyncAttempt, SyncStatus};
pub use sync::{ItemUpdateGuard, SyncCoordinator, SyncItem, SyncReport};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
