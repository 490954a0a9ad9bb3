//! Verdict provider seam.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{LogEntry, LogKind};
use warden_core::verdict::Verdict;

/// The remote verdict provider as the coordinator sees it.
///
/// The production implementation is [`crate::ScanClient`]; tests substitute
/// scripted backends to exercise timeout, auth-failure and outage paths
/// without a network.
#[async_trait]
pub trait ScanBackend: Send + Sync {
    /// Cheap liveness probe. Returns false when the service is unreachable.
    async fn probe(&self) -> bool;

    /// Submits a download for scanning and waits for the verdict.
    async fn scan_download(&self, file_url: &str, file_name: &str) -> Result<Verdict>;

    /// Submits a page for scanning.
    async fn scan_page(&self, url: &str) -> Result<Verdict>;

    /// Retrieves recent log entries of the given kind.
    async fn fetch_logs(&self, kind: LogKind, limit: usize) -> Result<Vec<LogEntry>>;

    /// The service origin, skipped by the navigation auto-scanner.
    fn origin(&self) -> String;
}
