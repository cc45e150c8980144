use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Device label recorded when the client doesn't send one.
pub const UNKNOWN_DEVICE: &str = "unknown-device";

/// Lifecycle of a sync attempt: pending -> complete | failed | conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Pending,
    Complete,
    Failed,
    Conflict,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::Pending => write!(f, "pending"),
            SyncStatus::Complete => write!(f, "complete"),
            SyncStatus::Failed => write!(f, "failed"),
            SyncStatus::Conflict => write!(f, "conflict"),
        }
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SyncStatus::Pending),
            "complete" => Ok(SyncStatus::Complete),
            "failed" => Ok(SyncStatus::Failed),
            "conflict" => Ok(SyncStatus::Conflict),
            _ => Err(format!("Unknown sync status '{}'", s)),
        }
    }
}

/// One batch reconciliation call from a device, audited as a single row.
///
/// Created with status pending before any record is touched, finalized
/// exactly once at the end of the same call, and never mutated afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncAttempt {
    pub id: Uuid,
    pub owner_id: String,
    pub device_label: String,
    pub started_at: DateTime<Utc>,
    pub status: SyncStatus,
    pub items_synced: i64,
    pub error_message: Option<String>,
}

impl SyncAttempt {
    pub fn new(owner_id: impl Into<String>, device_label: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            device_label: device_label.unwrap_or_else(|| UNKNOWN_DEVICE.to_string()),
            started_at: Utc::now(),
            status: SyncStatus::Pending,
            items_synced: 0,
            error_message: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display_roundtrip() {
        for status in [
            SyncStatus::Pending,
            SyncStatus::Complete,
            SyncStatus::Failed,
            SyncStatus::Conflict,
        ] {
            let parsed = SyncStatus::from_str(&status.to_string()).unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_status_from_str_invalid() {
        assert!(SyncStatus::from_str("done").is_err());
    }

    #[test]
    fn test_new_attempt_is_pending() {
        let attempt = SyncAttempt::new("user1", Some("laptop".to_string()));

        assert_eq!(attempt.status, SyncStatus::Pending);
        assert_eq!(attempt.device_label, "laptop");
        assert_eq!(attempt.items_synced, 0);
        assert!(attempt.error_message.is_none());
    }

    #[test]
    fn test_missing_device_label_defaults() {
        let attempt = SyncAttempt::new("user1", None);
        assert_eq!(attempt.device_label, UNKNOWN_DEVICE);
    }
}
