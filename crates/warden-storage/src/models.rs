//! Persisted row types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry of the pending-download transition journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub id: i64,
    /// Stable key for the download across its lifetime.
    pub download_key: String,
    /// Privacy-preserving hash of the source URL.
    pub url_hash: String,
    pub from_state: String,
    pub to_state: String,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TransitionRecord {
    /// Returns true if the recorded target state is terminal.
    pub fn is_terminal(&self) -> bool {
        self.to_state.starts_with("terminal")
    }
}

/// One entry of the local scan-event log shown in the popup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanEventRecord {
    pub id: i64,
    pub url_hash: String,
    /// Truncated URL for display.
    pub preview: String,
    /// "page" or "download".
    pub kind: String,
    pub status: String,
    pub threat_level: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A scan event about to be persisted.
#[derive(Debug, Clone)]
pub struct NewScanEvent {
    pub url: String,
    pub kind: String,
    pub status: String,
    pub threat_level: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_detection() {
        let mut record = TransitionRecord {
            id: 1,
            download_key: "dl-1".to_string(),
            url_hash: "abc".to_string(),
            from_state: "scanning".to_string(),
            to_state: "terminal_approved".to_string(),
            detail: None,
            created_at: Utc::now(),
        };
        assert!(record.is_terminal());

        record.to_state = "awaiting_approval".to_string();
        assert!(!record.is_terminal());
    }
}
