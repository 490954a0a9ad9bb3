//! Navigation guarding: auto page scans and unsafe-URL blocking.
//!
//! Runs on committed top-level navigations. Two independent behaviors share
//! the verdict/approval vocabulary of the download path:
//!
//! - **Auto-scan**: pages not scanned recently are submitted to the scan
//!   service; completion is picked up by polling the log feed, and the
//!   result is announced once per dedupe window. Infected pages land in the
//!   flagged-URL cache.
//! - **Unsafe-URL blocking**: a navigation to a URL with a live flagged
//!   entry is redirected to the neutral placeholder before content loads
//!   and held there behind a severity-labelled permission prompt. Approval
//!   is tab-scoped and single-use.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use warden_core::cache::ExpiringCache;
use warden_core::credentials::CredentialStore;
use warden_core::events::{AgentEvent, EventBus};
use warden_core::protection::ProtectionManager;
use warden_core::urlnorm::{self, PLACEHOLDER_PAGE};
use warden_core::verdict::{ThreatLevel, UnsafeUrlEntry, VerdictStatus};
use warden_scan::{ScanCoordinator, ScanOutcome};
use warden_storage::{Database, NewScanEvent};

use crate::approval::ApprovalGate;
use crate::blocks::NavBlocks;
use crate::commands::{CommandQueue, HostCommand};
use crate::hooks::{NavigationEvent, TabId};
use crate::ids;
use crate::notify::Notifier;
use crate::tabs::TabRegistry;

/// Lifetime of a flagged-URL entry.
pub const UNSAFE_URL_TTL: Duration = Duration::from_secs(60 * 60);

/// How long a completed auto-scan suppresses re-scanning.
pub const AUTO_SCAN_ACTIVE_TTL: Duration = Duration::from_secs(60);

/// How long a pending auto-scan suppresses re-submission.
pub const AUTO_SCAN_PENDING_TTL: Duration = Duration::from_secs(2 * 60);

/// Progress of an auto-scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoScanState {
    Pending,
    Complete,
}

/// Cache record for one auto-scanned URL.
#[derive(Debug, Clone)]
pub struct AutoScanRecord {
    pub state: AutoScanState,
    pub tab_id: TabId,
    pub scan_id: String,
}

/// Guards committed navigations.
#[derive(Clone)]
pub struct NavigationGuard {
    unsafe_urls: ExpiringCache<String, UnsafeUrlEntry>,
    auto_scans: ExpiringCache<String, AutoScanRecord>,
    gate: ApprovalGate,
    coordinator: ScanCoordinator,
    tabs: TabRegistry,
    blocks: NavBlocks,
    queue: CommandQueue,
    notifier: Notifier,
    events: EventBus,
    protection: ProtectionManager,
    credentials: CredentialStore,
    db: Option<Database>,
    auto_scan: Arc<AtomicBool>,
}

impl NavigationGuard {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        gate: ApprovalGate,
        coordinator: ScanCoordinator,
        tabs: TabRegistry,
        blocks: NavBlocks,
        queue: CommandQueue,
        notifier: Notifier,
        events: EventBus,
        protection: ProtectionManager,
        credentials: CredentialStore,
        db: Option<Database>,
        auto_scan_enabled: bool,
    ) -> Self {
        Self {
            unsafe_urls: ExpiringCache::new("unsafe-urls", UNSAFE_URL_TTL),
            auto_scans: ExpiringCache::new("auto-scans", AUTO_SCAN_ACTIVE_TTL),
            gate,
            coordinator,
            tabs,
            blocks,
            queue,
            notifier,
            events,
            protection,
            credentials,
            db,
            auto_scan: Arc::new(AtomicBool::new(auto_scan_enabled)),
        }
    }

    /// The flagged-URL cache.
    pub fn unsafe_urls(&self) -> &ExpiringCache<String, UnsafeUrlEntry> {
        &self.unsafe_urls
    }

    /// The auto-scan history cache.
    pub fn auto_scans(&self) -> &ExpiringCache<String, AutoScanRecord> {
        &self.auto_scans
    }

    /// Whether page auto-scanning is on.
    pub fn auto_scan_enabled(&self) -> bool {
        self.auto_scan.load(Ordering::Relaxed)
    }

    /// Toggles page auto-scanning.
    pub fn set_auto_scan(&self, enabled: bool) {
        self.auto_scan.store(enabled, Ordering::Relaxed);
    }

    /// Flags a URL as unsafe (also used when a download scan implicates the
    /// page it came from).
    pub fn flag_unsafe(&self, url: &str, entry: UnsafeUrlEntry) {
        if let Some(norm) = urlnorm::normalize(url) {
            self.unsafe_urls.insert(norm, entry);
        }
    }

    /// Committed top-level navigation.
    pub fn on_committed(&self, event: NavigationEvent) {
        self.tabs.record_navigation(event.tab_id, &event.url);

        if urlnorm::is_internal(&event.url) {
            return;
        }
        let Some(norm) = urlnorm::normalize(&event.url) else {
            return;
        };

        // A single-use pass from a prior approval lets exactly one
        // navigation through; the next one re-checks the cache.
        if self
            .gate
            .passes()
            .consume(&(event.tab_id, norm.clone()))
            .is_some()
        {
            debug!(tab = event.tab_id, url = %event.url, "Single-use pass consumed");
            return;
        }

        if !self.protection.is_active() {
            return;
        }

        if let Some(entry) = self.unsafe_urls.get(&norm) {
            self.block_navigation(event.tab_id, &event.url, entry);
            return;
        }

        self.maybe_auto_scan(event.tab_id, &event.url, norm);
    }

    /// Host closed a tab.
    pub fn on_tab_removed(&self, tab_id: TabId) {
        self.tabs.remove(tab_id);
        if let Some(block) = self.blocks.remove(tab_id) {
            if let Some(prompt_id) = block.prompt_id {
                self.gate.dismiss(&prompt_id);
            }
        }
    }

    fn block_navigation(&self, tab_id: TabId, url: &str, entry: UnsafeUrlEntry) {
        info!(tab = tab_id, url, level = %entry.level, "Blocking navigation to flagged URL");

        // Park the tab before any content loads, then ask.
        self.queue.push(HostCommand::UpdateTab {
            tab_id,
            url: PLACEHOLDER_PAGE.to_string(),
        });
        let prompt_id = self.gate.present_navigation(tab_id, url, &entry);
        self.blocks.insert(tab_id, url, prompt_id);
    }

    fn maybe_auto_scan(&self, tab_id: TabId, url: &str, norm: String) {
        if !self.auto_scan_enabled() || !self.credentials.is_signed_in() {
            return;
        }
        // Scanning the scanner would recurse through its own log feed.
        if urlnorm::same_origin(url, &self.coordinator.service_origin()) {
            return;
        }
        if self.auto_scans.contains(&norm) {
            return;
        }

        let scan_id = ids::generate("scan");
        self.auto_scans.insert_with_ttl(
            norm.clone(),
            AutoScanRecord {
                state: AutoScanState::Pending,
                tab_id,
                scan_id: scan_id.clone(),
            },
            AUTO_SCAN_PENDING_TTL,
        );

        let this = self.clone();
        let url = url.to_string();
        tokio::spawn(async move {
            this.run_page_scan(tab_id, url, norm, scan_id).await;
        });
    }

    async fn run_page_scan(&self, tab_id: TabId, url: String, norm: String, scan_id: String) {
        let verdict = match self.coordinator.scan_page(&url).await {
            ScanOutcome::Unavailable => {
                // The pending record stays as backoff until its TTL lapses.
                debug!(url = %url, "Page scan skipped, service unreachable");
                return;
            }
            ScanOutcome::AuthRequired => {
                self.auto_scans.remove(&norm);
                if let Some(db) = &self.db {
                    let _ = db.clear_credential();
                }
                self.events
                    .publish(AgentEvent::AuthChanged { signed_in: false });
                return;
            }
            ScanOutcome::Verdict(v) => v,
        };

        // The authoritative result (with severity) arrives on the log feed.
        let logged = self.coordinator.poll_page_result(&url).await;
        let (status, threat_level) = match &logged {
            Some(entry) => (entry.result, entry.threat_level),
            None => (verdict.status, None),
        };

        self.auto_scans.insert_with_ttl(
            norm.clone(),
            AutoScanRecord {
                state: AutoScanState::Complete,
                tab_id,
                scan_id,
            },
            AUTO_SCAN_ACTIVE_TTL,
        );

        if status == VerdictStatus::Infected {
            let findings = verdict.threats.len().max(1) as u32;
            let entry = match threat_level {
                Some(ThreatLevel::Critical) => UnsafeUrlEntry::from_counts(findings, 0),
                Some(ThreatLevel::High) | None => UnsafeUrlEntry::from_counts(0, findings),
                Some(_) => UnsafeUrlEntry::from_counts(0, 0),
            };
            self.unsafe_urls.insert(norm.clone(), entry);
        }

        self.log_scan_event(&url, status, threat_level);
        self.events.publish(AgentEvent::ScanComplete {
            url: url.clone(),
            status,
        });

        let title = match status {
            VerdictStatus::Clean => "Page scan clean",
            VerdictStatus::Infected => "Unsafe page detected",
            VerdictStatus::Timeout | VerdictStatus::Error => "Page scan incomplete",
        };
        let result_key = format!("page:{norm}:{status}");
        self.notifier.notice_once(&result_key, title, &url);
    }

    fn log_scan_event(&self, url: &str, status: VerdictStatus, level: Option<ThreatLevel>) {
        if let Some(db) = &self.db {
            let event = NewScanEvent {
                url: url.to_string(),
                kind: "page".to_string(),
                status: status.as_str().to_string(),
                threat_level: level.map(|l| l.as_str().to_string()),
            };
            if let Err(e) = db.log_scan_event(event) {
                warn!(error = %e, "Failed to log scan event");
            }
        }
    }
}
