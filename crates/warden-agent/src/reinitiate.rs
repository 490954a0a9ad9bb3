//! Carrying out an allow decision.
//!
//! The cheap path grants the original pre-start callback, which needs no new
//! download object. When that callback is gone (the host deadline passed, or
//! the safety net already cancelled an auto-started object), a brand-new
//! download is issued against the resolved URL — exempted from the safety
//! net by a single-use, short-TTL permit so the created hook does not
//! re-cancel our own reissue.

use std::time::Duration;

use tracing::{debug, warn};

use warden_core::cache::ExpiringCache;
use warden_core::filename;
use warden_core::urlnorm;

use crate::commands::{CommandQueue, HostCommand};
use crate::hooks::{DownloadId, HookDecision};
use crate::notify::Notifier;
use crate::pending::{DownloadState, PendingStore, TerminalReason};

/// Permit lifetime. Deliberately short: the permit exempts one reissue, not
/// later downloads of the same URL.
pub const PERMIT_TTL: Duration = Duration::from_secs(5);

/// Issues approved downloads, directly or via reissue.
#[derive(Clone)]
pub struct ReinitiationManager {
    store: PendingStore,
    permits: ExpiringCache<String, ()>,
    queue: CommandQueue,
    notifier: Notifier,
}

impl ReinitiationManager {
    /// Creates a manager over the shared store and command queue.
    pub fn new(store: PendingStore, queue: CommandQueue, notifier: Notifier) -> Self {
        Self {
            store,
            permits: ExpiringCache::new("reinitiation-permits", PERMIT_TTL),
            queue,
            notifier,
        }
    }

    /// The permit cache, consumed by the created hook and swept by the
    /// janitor.
    pub fn permits(&self) -> &ExpiringCache<String, ()> {
        &self.permits
    }

    /// Carries out an allow decision for a pending download.
    pub fn approve(&self, id: DownloadId) {
        let Some(snapshot) = self.store.snapshot(id) else {
            debug!(id, "Approve for a record that no longer exists");
            return;
        };
        if snapshot.state.is_terminal() {
            debug!(id, state = %snapshot.state, "Approve for an already-terminal record");
            return;
        }
        if self.store.transition(id, DownloadState::Reinitiating).is_err() {
            return;
        }

        // Cheapest path: the original callback is still waiting and the host
        // never auto-started the object.
        if !snapshot.auto_started {
            if let Some(token) = self.store.take_token(id) {
                if token.grant(HookDecision::Allow { file_name: None }) {
                    debug!(id, "Allowed through the original pre-start callback");
                    let _ = self
                        .store
                        .transition(id, DownloadState::Terminal(TerminalReason::Approved));
                    return;
                }
                debug!(id, "Original callback lost, reissuing");
            }
        }

        self.reissue(id, &snapshot.resolved_url, &snapshot.file_name);
    }

    fn reissue(&self, id: DownloadId, resolved_url: &str, file_name: &str) {
        let Some(url) = urlnorm::normalize(resolved_url) else {
            warn!(id, url = resolved_url, "Cannot reissue download for unparsable URL");
            self.notifier.notice(
                "Download could not be restarted",
                "The approved download has no usable URL.",
            );
            let _ = self
                .store
                .transition(id, DownloadState::Terminal(TerminalReason::Cancelled));
            return;
        };

        let file_name = filename::sanitize(file_name);

        // The permit must exist before the new object's created hook can
        // possibly fire.
        self.permits.insert(url.clone(), ());
        let _ = self
            .store
            .transition(id, DownloadState::Terminal(TerminalReason::Approved));
        debug!(id, url = %url, "Reissuing approved download");
        self.queue.push(HostCommand::StartDownload { url, file_name });
    }

    /// Host rejected a reissued download. One notice, no retry loop.
    pub fn on_host_rejected(&self, url: &str) {
        let key = format!(
            "reinit-failed:{}",
            urlnorm::normalize(url).unwrap_or_else(|| url.to_string())
        );
        self.notifier.notice_once(
            &key,
            "Download could not be restarted",
            &format!("The browser rejected the download from {url}."),
        );
    }
}
