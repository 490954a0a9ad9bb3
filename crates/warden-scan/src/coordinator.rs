//! Scan coordination: probing, timeouts, classification, minimum hold.
//!
//! The coordinator owns the availability policy around the raw client:
//!
//! - the service is probed before every submission; an unreachable service
//!   fails open (the caller allows without a prompt)
//! - a rejected credential is purged on the spot and fails closed
//! - submissions are capped at a total timeout, independent of the host's
//!   own download deadline
//! - download verdicts are held back until a minimum delay has passed, so a
//!   near-instant scan does not flash a prompt at the user

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, warn};

use warden_core::credentials::CredentialStore;
use warden_core::urlnorm;
use warden_core::verdict::Verdict;

use crate::backend::ScanBackend;
use crate::error::ScanError;
use crate::models::{LogEntry, LogKind};

/// Timing knobs for the coordinator.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Total cap on a scan submission.
    pub submission_timeout: Duration,
    /// Minimum delay before a download verdict is surfaced.
    pub min_hold: Duration,
    /// Interval between log-feed polls for page-scan completion.
    pub log_poll_interval: Duration,
    /// Total window for log-feed polling.
    pub log_poll_window: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            submission_timeout: Duration::from_secs(120),
            min_hold: Duration::from_millis(700),
            log_poll_interval: Duration::from_secs(2),
            log_poll_window: Duration::from_secs(120),
        }
    }
}

/// Outcome of a coordinated scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// The service answered (or the submission timed out / errored) —
    /// classification carried in the verdict.
    Verdict(Verdict),

    /// The service was unreachable at probe time. Fail open.
    Unavailable,

    /// The stored credential was rejected and has been purged. Fail closed.
    AuthRequired,
}

/// Drives scans against a [`ScanBackend`] with the timing policy applied.
#[derive(Clone)]
pub struct ScanCoordinator {
    backend: Arc<dyn ScanBackend>,
    credentials: CredentialStore,
    config: ScanConfig,
}

impl ScanCoordinator {
    /// Creates a coordinator with default timing.
    pub fn new(backend: Arc<dyn ScanBackend>, credentials: CredentialStore) -> Self {
        Self::with_config(backend, credentials, ScanConfig::default())
    }

    /// Creates a coordinator with custom timing.
    pub fn with_config(
        backend: Arc<dyn ScanBackend>,
        credentials: CredentialStore,
        config: ScanConfig,
    ) -> Self {
        Self {
            backend,
            credentials,
            config,
        }
    }

    /// Returns the scan service origin.
    pub fn service_origin(&self) -> String {
        self.backend.origin()
    }

    /// Returns the timing configuration.
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Scans a download and classifies the result.
    ///
    /// The minimum hold is applied before returning any verdict, measured
    /// from submission start.
    pub async fn scan_download(&self, file_url: &str, file_name: &str) -> ScanOutcome {
        let started = Instant::now();

        if !self.backend.probe().await {
            warn!(url = file_url, "Scan service unreachable, failing open");
            return ScanOutcome::Unavailable;
        }

        let submission = self.backend.scan_download(file_url, file_name);
        let verdict = match timeout(self.config.submission_timeout, submission).await {
            Err(_) => {
                warn!(url = file_url, "Download scan exceeded submission window");
                Verdict::timeout()
            }
            Ok(Ok(verdict)) => verdict,
            Ok(Err(ScanError::AuthRequired)) => {
                warn!("Scan service rejected credential, purging");
                self.credentials.clear_all();
                return ScanOutcome::AuthRequired;
            }
            Ok(Err(ScanError::Timeout)) => Verdict::timeout(),
            Ok(Err(e)) => {
                warn!(url = file_url, error = %e, "Download scan failed");
                Verdict::error()
            }
        };

        self.hold_remainder(started).await;
        ScanOutcome::Verdict(verdict)
    }

    /// Submits a page scan. No minimum hold; page results surface through
    /// the log feed, not a blocking prompt.
    pub async fn scan_page(&self, url: &str) -> ScanOutcome {
        if !self.backend.probe().await {
            debug!(url, "Scan service unreachable, skipping page scan");
            return ScanOutcome::Unavailable;
        }

        match timeout(self.config.submission_timeout, self.backend.scan_page(url)).await {
            Err(_) => ScanOutcome::Verdict(Verdict::timeout()),
            Ok(Ok(verdict)) => ScanOutcome::Verdict(verdict),
            Ok(Err(ScanError::AuthRequired)) => {
                warn!("Scan service rejected credential, purging");
                self.credentials.clear_all();
                ScanOutcome::AuthRequired
            }
            Ok(Err(ScanError::Timeout)) => ScanOutcome::Verdict(Verdict::timeout()),
            Ok(Err(e)) => {
                debug!(url, error = %e, "Page scan failed");
                ScanOutcome::Verdict(Verdict::error())
            }
        }
    }

    /// Polls the page log feed until an entry for `url` appears or the
    /// polling window closes.
    pub async fn poll_page_result(&self, url: &str) -> Option<LogEntry> {
        let target = urlnorm::normalize(url)?;
        let deadline = Instant::now() + self.config.log_poll_window;

        loop {
            match self.backend.fetch_logs(LogKind::Page, 50).await {
                Ok(entries) => {
                    let hit = entries
                        .into_iter()
                        .find(|e| urlnorm::normalize(&e.source).as_deref() == Some(target.as_str()));
                    if let Some(entry) = hit {
                        return Some(entry);
                    }
                }
                Err(ScanError::AuthRequired) => {
                    warn!("Scan service rejected credential during log poll, purging");
                    self.credentials.clear_all();
                    return None;
                }
                Err(e) => debug!(error = %e, "Log poll failed"),
            }

            if Instant::now() + self.config.log_poll_interval > deadline {
                debug!(url, "Page scan result did not appear within the polling window");
                return None;
            }
            sleep(self.config.log_poll_interval).await;
        }
    }

    async fn hold_remainder(&self, started: Instant) {
        let elapsed = started.elapsed();
        if let Some(rest) = self.config.min_hold.checked_sub(elapsed) {
            sleep(rest).await;
        }
    }
}

impl std::fmt::Debug for ScanCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanCoordinator")
            .field("config", &self.config)
            .finish()
    }
}
