//! The synchronization engine.
//!
//! Two write paths share the concept store but deliberately differ in
//! strictness:
//!
//! - [`SyncCoordinator`] reconciles a whole batch from one device. Each
//!   item is resolved against the stored record by the pure
//!   [`resolver`](resolver::resolve); conflicts are skipped and counted,
//!   never fatal. The batch is one transaction and every call leaves an
//!   audit row.
//! - [`ItemUpdateGuard`] updates a single record with a hard version
//!   equality check and no timestamp fallback.

pub mod coordinator;
pub mod guard;
pub mod resolver;

pub use coordinator::{SyncCoordinator, SyncItem, SyncReport};
pub use guard::ItemUpdateGuard;
pub use resolver::{resolve, IncomingMeta, Resolution, SkipReason, StoredMeta};
