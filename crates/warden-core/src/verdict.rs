//! Verdict vocabulary shared by the scanner, the interceptor and the prompts.

use serde::{Deserialize, Serialize};

/// Classification of a remote scan result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictStatus {
    /// No threats found.
    Clean,

    /// One or more threats found.
    Infected,

    /// The scan did not finish inside the submission window.
    Timeout,

    /// The scan failed for a reason other than a timeout.
    Error,
}

impl VerdictStatus {
    /// Returns the status as a wire string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::Infected => "infected",
            Self::Timeout => "timeout",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for VerdictStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The remote scanning service's classification of a URL or file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// Overall status.
    pub status: VerdictStatus,
    /// Threat names, empty unless infected.
    #[serde(default)]
    pub threats: Vec<String>,
}

impl Verdict {
    /// A clean verdict.
    pub fn clean() -> Self {
        Self {
            status: VerdictStatus::Clean,
            threats: Vec::new(),
        }
    }

    /// An infected verdict with the named threats.
    pub fn infected(threats: Vec<String>) -> Self {
        Self {
            status: VerdictStatus::Infected,
            threats,
        }
    }

    /// A timed-out verdict.
    pub fn timeout() -> Self {
        Self {
            status: VerdictStatus::Timeout,
            threats: Vec::new(),
        }
    }

    /// An errored verdict.
    pub fn error() -> Self {
        Self {
            status: VerdictStatus::Error,
            threats: Vec::new(),
        }
    }

    /// Returns true if the verdict is clean.
    pub fn is_clean(&self) -> bool {
        self.status == VerdictStatus::Clean
    }

    /// Returns true if the file may only proceed with explicit user consent.
    ///
    /// Infected files always require consent; timed-out and errored scans do
    /// too, because the file could not be fully verified.
    pub fn needs_consent(&self) -> bool {
        !self.is_clean()
    }
}

/// Severity of a flagged URL, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreatLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl ThreatLevel {
    /// Returns the level as a wire string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Parses a wire string, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Cache record for a URL previously flagged as unsafe.
///
/// Lives in the flagged-URL cache for one hour; navigations to a URL with a
/// live entry are held on the placeholder page until the user consents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsafeUrlEntry {
    /// Number of critical findings.
    pub critical_count: u32,
    /// Number of high findings.
    pub high_count: u32,
    /// Overall severity shown in the permission prompt.
    pub level: ThreatLevel,
}

impl UnsafeUrlEntry {
    /// Builds an entry from finding counts, deriving the overall level.
    pub fn from_counts(critical_count: u32, high_count: u32) -> Self {
        let level = if critical_count > 0 {
            ThreatLevel::Critical
        } else if high_count > 0 {
            ThreatLevel::High
        } else {
            ThreatLevel::Medium
        };
        Self {
            critical_count,
            high_count,
            level,
        }
    }
}
