//! Wire types for the remote scan service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warden_core::verdict::{ThreatLevel, Verdict, VerdictStatus};

/// Body for `POST /scan/download`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadScanRequest {
    /// The resolved file URL.
    pub file_url: String,
    /// The destination filename.
    pub file_name: String,
}

/// Body for `POST /scan/page`.
#[derive(Debug, Clone, Serialize)]
pub struct PageScanRequest {
    /// The page URL.
    pub url: String,
}

/// Response body for both scan endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ScanResponse {
    pub status: VerdictStatus,
    #[serde(default)]
    pub threats: Vec<String>,
}

impl From<ScanResponse> for Verdict {
    fn from(resp: ScanResponse) -> Self {
        Verdict {
            status: resp.status,
            threats: resp.threats,
        }
    }
}

/// Which log feed to retrieve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Page,
    Download,
}

impl LogKind {
    /// Returns the `type` query parameter value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Page => "page",
            Self::Download => "download",
        }
    }
}

/// One entry of `GET /logs`, used for UI display and for polling page-scan
/// completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    /// The scanned URL.
    pub source: String,
    pub result: VerdictStatus,
    #[serde(default)]
    pub threat_level: Option<ThreatLevel>,
    #[serde(default)]
    pub details: Option<String>,
}
