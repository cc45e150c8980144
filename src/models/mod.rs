mod concept;
mod sync_attempt;

pub use concept::{ConceptPatch, ConceptRecord, ConceptType};
pub use sync_attempt::{SyncAttempt, SyncStatus, UNKNOWN_DEVICE};
