//! Warden Scan - remote verdict service client and scan coordinator.
//!
//! The scan service is an opaque verdict provider: Warden submits a URL or
//! file reference and receives a clean/infected/timeout/error classification.
//! This crate wraps that REST API ([`ScanClient`]) and layers the timing and
//! availability policy on top ([`ScanCoordinator`]):
//!
//! - liveness probe before every submission, failing open on outage
//! - credential purge + fail closed on an auth rejection
//! - 120 s submission cap and a 700 ms minimum hold before download
//!   verdicts surface
//! - 2 s / 2 min log-feed polling for page-scan completion

mod backend;
mod client;
mod coordinator;
pub mod error;
pub mod models;

pub use backend::ScanBackend;
pub use client::{ScanClient, PROBE_TIMEOUT};
pub use coordinator::{ScanConfig, ScanCoordinator, ScanOutcome};
pub use error::{Result, ScanError};
pub use models::{DownloadScanRequest, LogEntry, LogKind, PageScanRequest, ScanResponse};
