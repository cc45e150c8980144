//! Conflict resolution for batch sync.
//!
//! One canonical policy: a version comparison with a timestamp tiebreak.
//! A pure decision function keeps every rule independently testable and
//! keeps the decision logic out of the transaction code.

use chrono::{DateTime, Utc};

/// Version and timestamp of the record the server currently holds.
#[derive(Debug, Clone, Copy)]
pub struct StoredMeta {
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

/// Version and (optional) timestamp claimed by an incoming item.
#[derive(Debug, Clone, Copy)]
pub struct IncomingMeta {
    pub version: i64,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Why an incoming item was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The server copy is strictly newer by timestamp even though the
    /// version label didn't signal a conflict.
    ServerNewerByTimestamp,
    /// The version label is stale and the incoming timestamp doesn't prove
    /// the client copy is newer.
    StaleVersion,
    /// The version label is stale and the item carries no timestamp, so
    /// recency can't be proven. Skipping avoids silently discarding a
    /// newer server edit.
    NoTimestampProof,
}

/// Outcome of resolving one incoming item against the stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Accept { new_version: i64 },
    Skip { reason: SkipReason },
}

/// Decide whether an incoming item is applied.
///
/// Total over all inputs and free of side effects. An accepted write
/// always advances the version counter by exactly one; re-submitting an
/// identical item is accepted and still increments the version (a
/// deliberate choice, keeping the no-conflict branch uniform).
pub fn resolve(stored: Option<&StoredMeta>, incoming: &IncomingMeta) -> Resolution {
    let stored = match stored {
        None => return Resolution::Accept { new_version: 1 },
        Some(stored) => stored,
    };

    let version_conflict = stored.version > incoming.version;
    let timestamp_conflict = matches!(
        incoming.updated_at,
        Some(incoming_at) if stored.updated_at > incoming_at
    );

    if !version_conflict && !timestamp_conflict {
        return Resolution::Accept {
            new_version: stored.version + 1,
        };
    }

    if timestamp_conflict && !version_conflict {
        return Resolution::Skip {
            reason: SkipReason::ServerNewerByTimestamp,
        };
    }

    // Stale version label; a strictly newer client timestamp overrides it.
    match incoming.updated_at {
        Some(incoming_at) if incoming_at > stored.updated_at => Resolution::Accept {
            new_version: stored.version + 1,
        },
        Some(_) => Resolution::Skip {
            reason: SkipReason::StaleVersion,
        },
        None => Resolution::Skip {
            reason: SkipReason::NoTimestampProof,
        },
    }
}
