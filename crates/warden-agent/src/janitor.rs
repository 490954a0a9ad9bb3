//! Periodic cleanup.
//!
//! Sweeps every TTL-bound cache, destroys retained terminal records,
//! reconciles pending navigation blocks against the live-tab registry, and
//! collects transition-journal remnants left by a previous process.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use warden_core::cache::Sweep;
use warden_core::urlnorm;
use warden_storage::Database;

use crate::approval::ApprovalGate;
use crate::blocks::NavBlocks;
use crate::pending::PendingStore;
use crate::tabs::TabRegistry;

/// Fixed sweep interval.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(15);

/// How long terminal records linger before destruction.
pub const TERMINAL_RETENTION: Duration = Duration::from_secs(60);

/// Age at which a block whose tab still sits on the placeholder counts as
/// stale.
pub const BLOCK_STALE_AFTER: Duration = Duration::from_secs(60);

/// What one sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JanitorReport {
    /// Expired cache entries purged.
    pub expired_entries: usize,
    /// Terminal download records destroyed.
    pub terminal_removed: usize,
    /// Navigation blocks reconciled away.
    pub blocks_removed: usize,
    /// Journal remnants from a previous process purged.
    pub remnants_purged: usize,
}

impl JanitorReport {
    fn total(&self) -> usize {
        self.expired_entries + self.terminal_removed + self.blocks_removed + self.remnants_purged
    }
}

/// The cleanup task.
pub struct Janitor {
    sweeps: Vec<Arc<dyn Sweep>>,
    store: PendingStore,
    blocks: NavBlocks,
    tabs: TabRegistry,
    gate: ApprovalGate,
    db: Option<Database>,
}

impl Janitor {
    pub(crate) fn new(
        sweeps: Vec<Arc<dyn Sweep>>,
        store: PendingStore,
        blocks: NavBlocks,
        tabs: TabRegistry,
        gate: ApprovalGate,
        db: Option<Database>,
    ) -> Self {
        Self {
            sweeps,
            store,
            blocks,
            tabs,
            gate,
            db,
        }
    }

    /// Runs one sweep.
    pub fn run_once(&self) -> JanitorReport {
        let mut report = JanitorReport::default();

        for cache in &self.sweeps {
            let purged = cache.sweep();
            if purged > 0 {
                debug!(cache = cache.name(), purged, "Swept expired entries");
            }
            report.expired_entries += purged;
        }

        report.terminal_removed = self.store.sweep_terminal(TERMINAL_RETENTION);
        report.blocks_removed = self.reconcile_blocks();
        report.remnants_purged = self.purge_remnants();

        if report.total() > 0 {
            debug!(?report, "Janitor sweep finished");
        }
        report
    }

    /// Runs forever at the fixed interval.
    pub async fn run(self: Arc<Self>) {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            self.run_once();
        }
    }

    fn reconcile_blocks(&self) -> usize {
        let mut removed = 0;
        for tab_id in self.blocks.tabs() {
            let Some(block) = self.blocks.get(tab_id) else {
                continue;
            };

            if !self.tabs.exists(tab_id) {
                // Tab is gone: the prompt can never be acted on.
                if let Some(block) = self.blocks.remove(tab_id) {
                    if let Some(prompt_id) = block.prompt_id {
                        self.gate.dismiss(&prompt_id);
                    }
                    removed += 1;
                }
                continue;
            }

            match self.tabs.url_of(tab_id) {
                Some(url) if urlnorm::is_placeholder(&url) => {
                    // Still parked. The record is reconciled away once stale;
                    // the prompt itself stays answerable.
                    if block.inserted_at.elapsed() >= BLOCK_STALE_AFTER
                        && self.blocks.remove(tab_id).is_some()
                    {
                        removed += 1;
                    }
                }
                Some(url) if urlnorm::normalize(&url) == urlnorm::normalize(&block.url) => {
                    // Back on the blocked URL via an approval; nothing to do.
                }
                _ => {
                    // The user navigated elsewhere; the block is moot.
                    if let Some(block) = self.blocks.remove(tab_id) {
                        if let Some(prompt_id) = block.prompt_id {
                            self.gate.dismiss(&prompt_id);
                        }
                        removed += 1;
                    }
                }
            }
        }
        removed
    }

    fn purge_remnants(&self) -> usize {
        let Some(db) = &self.db else {
            return 0;
        };
        let keys = match db.unresolved_keys() {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Failed to query journal remnants");
                return 0;
            }
        };

        let live: HashSet<String> = self
            .store
            .ids()
            .into_iter()
            .map(|id| format!("dl-{id}"))
            .collect();

        let mut purged = 0;
        for key in keys {
            if live.contains(&key) {
                continue;
            }
            warn!(key, "Collecting stale transition journal remnant");
            match db.purge_download(&key) {
                Ok(_) => purged += 1,
                Err(e) => warn!(key, error = %e, "Failed to purge remnant"),
            }
        }
        purged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use warden_core::cache::ExpiringCache;
    use warden_core::urlnorm::PLACEHOLDER_PAGE;

    use crate::commands::CommandQueue;
    use crate::notify::Notifier;
    use crate::pending::DownloadState;
    use crate::pending::TerminalReason;
    use crate::reinitiate::ReinitiationManager;

    struct Fixture {
        janitor: Janitor,
        store: PendingStore,
        blocks: NavBlocks,
        tabs: TabRegistry,
        cache: ExpiringCache<String, u32>,
        db: Database,
    }

    fn fixture() -> Fixture {
        let db = Database::in_memory().unwrap();
        let store = PendingStore::new(Some(db.clone()));
        let queue = CommandQueue::new();
        let notifier = Notifier::new(queue.clone());
        let reinit = ReinitiationManager::new(store.clone(), queue.clone(), notifier.clone());
        let blocks = NavBlocks::new();
        let tabs = TabRegistry::new();
        let gate = ApprovalGate::new(store.clone(), reinit, notifier, queue, blocks.clone());
        let cache: ExpiringCache<String, u32> =
            ExpiringCache::new("test", Duration::from_millis(10));
        let janitor = Janitor::new(
            vec![Arc::new(cache.clone())],
            store.clone(),
            blocks.clone(),
            tabs.clone(),
            gate,
            Some(db.clone()),
        );
        Fixture {
            janitor,
            store,
            blocks,
            tabs,
            cache,
            db,
        }
    }

    #[test]
    fn sweeps_registered_caches() {
        let f = fixture();
        f.cache.insert("a".to_string(), 1);
        std::thread::sleep(Duration::from_millis(15));

        let report = f.janitor.run_once();
        assert_eq!(report.expired_entries, 1);
    }

    #[test]
    fn destroys_terminal_records_past_retention() {
        let f = fixture();
        let _rx = f.store.register(&crate::hooks::PreStartEvent {
            id: 1,
            source_url: "https://example.com/f.exe".to_string(),
            resolved_url: None,
            file_name: "f.exe".to_string(),
            mime: None,
        });
        f.store
            .transition(1, DownloadState::Terminal(TerminalReason::Approved))
            .unwrap();

        // Inside retention the record survives.
        let report = f.janitor.run_once();
        assert_eq!(report.terminal_removed, 0);
        assert_eq!(f.store.len(), 1);
    }

    #[test]
    fn removes_blocks_for_dead_tabs_and_dismisses_prompts() {
        let f = fixture();
        f.blocks.insert(9, "https://bad.example/", Some("p-9".to_string()));
        // Tab 9 does not exist in the registry.

        let report = f.janitor.run_once();
        assert_eq!(report.blocks_removed, 1);
        assert!(f.blocks.is_empty());
    }

    #[test]
    fn keeps_fresh_placeholder_blocks() {
        let f = fixture();
        f.tabs.record_navigation(9, PLACEHOLDER_PAGE);
        f.blocks.insert(9, "https://bad.example/", None);

        let report = f.janitor.run_once();
        assert_eq!(report.blocks_removed, 0);
        assert!(f.blocks.get(9).is_some());
    }

    #[test]
    fn removes_blocks_when_tab_moved_on() {
        let f = fixture();
        f.tabs.record_navigation(9, "https://unrelated.example/");
        f.blocks.insert(9, "https://bad.example/", None);

        let report = f.janitor.run_once();
        assert_eq!(report.blocks_removed, 1);
    }

    #[test]
    fn keeps_blocks_for_tab_back_on_blocked_url() {
        let f = fixture();
        f.tabs.record_navigation(9, "https://bad.example/");
        f.blocks.insert(9, "https://bad.example/", None);

        let report = f.janitor.run_once();
        assert_eq!(report.blocks_removed, 0);
    }

    #[test]
    fn purges_journal_remnants_for_dead_downloads() {
        let f = fixture();
        // A remnant from a previous process: journaled but not in the store.
        f.db
            .record_transition("dl-42", "https://example.com/f.exe", "detected", "scanning", None)
            .unwrap();
        // A live flow is left alone.
        let _rx = f.store.register(&crate::hooks::PreStartEvent {
            id: 7,
            source_url: "https://example.com/g.exe".to_string(),
            resolved_url: None,
            file_name: "g.exe".to_string(),
            mime: None,
        });

        let report = f.janitor.run_once();
        assert_eq!(report.remnants_purged, 1);
        assert!(f.db.transitions_for("dl-42").unwrap().is_empty());
        assert!(!f.db.transitions_for("dl-7").unwrap().is_empty());
    }
}
