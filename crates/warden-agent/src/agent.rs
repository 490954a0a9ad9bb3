//! The assembled agent.
//!
//! [`Warden`] wires the pending-download store, scan coordinator, approval
//! gate, reinitiation manager, navigation guard and janitor together and
//! exposes the bridge entry points the server forwards host callbacks to.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use warden_core::credentials::CredentialStore;
use warden_core::events::{AgentEvent, EventBus};
use warden_core::protection::{PauseDuration, ProtectionManager, ProtectionState};
use warden_scan::{ScanBackend, ScanConfig, ScanCoordinator};
use warden_storage::{Database, ScanEventRecord};

use crate::approval::{ApprovalGate, PromptAction};
use crate::blocks::NavBlocks;
use crate::commands::CommandQueue;
use crate::hooks::{
    ChangedEvent, CreatedAction, CreatedEvent, DownloadId, NavigationEvent, PreStartEvent,
    PreStartReply, TabId,
};
use crate::interceptor::DownloadInterceptor;
use crate::janitor::Janitor;
use crate::navguard::NavigationGuard;
use crate::notify::Notifier;
use crate::pending::PendingStore;
use crate::reinitiate::ReinitiationManager;
use crate::tabs::TabRegistry;

/// Agent construction knobs.
#[derive(Debug, Clone)]
pub struct WardenConfig {
    /// Scan coordinator timing.
    pub scan: ScanConfig,
    /// Whether committed pages are auto-scanned.
    pub auto_scan_pages: bool,
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            scan: ScanConfig::default(),
            auto_scan_pages: true,
        }
    }
}

/// One-line agent health summary for the status endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatus {
    pub protection: ProtectionState,
    pub signed_in: bool,
    pub auto_scan_pages: bool,
    pub pending_downloads: usize,
    pub live_prompts: usize,
    pub queued_commands: usize,
}

/// The assembled protection agent.
#[derive(Clone)]
pub struct Warden {
    store: PendingStore,
    queue: CommandQueue,
    reinit: ReinitiationManager,
    gate: ApprovalGate,
    interceptor: DownloadInterceptor,
    navguard: NavigationGuard,
    janitor: Arc<Janitor>,
    protection: ProtectionManager,
    credentials: CredentialStore,
    events: EventBus,
    tabs: TabRegistry,
    db: Option<Database>,
}

impl Warden {
    /// Builds the agent over a verdict backend and optional persistence.
    ///
    /// Persisted protection state and credential are restored when a
    /// database is given.
    pub fn new(
        backend: Arc<dyn ScanBackend>,
        credentials: CredentialStore,
        db: Option<Database>,
        config: WardenConfig,
    ) -> Self {
        let protection = ProtectionManager::new();
        if let Some(db) = &db {
            match db.protection_state() {
                Ok(state) => protection.restore(state),
                Err(e) => warn!(error = %e, "Failed to restore protection state"),
            }
            if !credentials.is_signed_in() {
                match db.load_credential() {
                    Ok(Some(credential)) => {
                        credentials.set(credential.token, credential.user);
                    }
                    Ok(None) => {}
                    Err(e) => warn!(error = %e, "Failed to restore credential"),
                }
            }
        }

        let events = EventBus::new();
        let store = PendingStore::new(db.clone());
        let queue = CommandQueue::new();
        let notifier = Notifier::new(queue.clone());
        let tabs = TabRegistry::new();
        let blocks = NavBlocks::new();
        let coordinator =
            ScanCoordinator::with_config(backend, credentials.clone(), config.scan.clone());
        let reinit = ReinitiationManager::new(store.clone(), queue.clone(), notifier.clone());
        let gate = ApprovalGate::new(
            store.clone(),
            reinit.clone(),
            notifier.clone(),
            queue.clone(),
            blocks.clone(),
        );
        let interceptor = DownloadInterceptor::new(
            store.clone(),
            coordinator.clone(),
            gate.clone(),
            reinit.clone(),
            protection.clone(),
            credentials.clone(),
            queue.clone(),
            notifier.clone(),
            events.clone(),
            db.clone(),
        );
        let navguard = NavigationGuard::new(
            gate.clone(),
            coordinator,
            tabs.clone(),
            blocks.clone(),
            queue.clone(),
            notifier.clone(),
            events.clone(),
            protection.clone(),
            credentials.clone(),
            db.clone(),
            config.auto_scan_pages,
        );
        let janitor = Arc::new(Janitor::new(
            vec![
                Arc::new(navguard.unsafe_urls().clone()),
                Arc::new(navguard.auto_scans().clone()),
                Arc::new(gate.passes().clone()),
                Arc::new(reinit.permits().clone()),
                Arc::new(notifier.dedupe_cache()),
            ],
            store.clone(),
            blocks,
            tabs.clone(),
            gate.clone(),
            db.clone(),
        ));

        Self {
            store,
            queue,
            reinit,
            gate,
            interceptor,
            navguard,
            janitor,
            protection,
            credentials,
            events,
            tabs,
            db,
        }
    }

    // === Bridge entry points ===

    /// Pre-start download hook.
    pub fn pre_start(&self, event: PreStartEvent) -> PreStartReply {
        self.interceptor.on_pre_start(event)
    }

    /// Post-creation download hook.
    pub fn created(&self, event: CreatedEvent) -> CreatedAction {
        self.interceptor.on_created(event)
    }

    /// Download state change.
    pub fn changed(&self, event: ChangedEvent) {
        self.interceptor.on_changed(event);
    }

    /// Download object removed by the host.
    pub fn removed(&self, id: DownloadId) {
        self.interceptor.on_removed(id);
    }

    /// Host could not cancel a download.
    pub fn cancel_failed(&self, id: DownloadId) {
        self.interceptor.on_cancel_failed(id);
    }

    /// Host rejected a reissued download.
    pub fn reinitiation_failed(&self, url: &str) {
        self.reinit.on_host_rejected(url);
    }

    /// Committed top-level navigation.
    pub fn navigation_committed(&self, event: NavigationEvent) {
        self.navguard.on_committed(event);
    }

    /// Tab closed.
    pub fn tab_removed(&self, tab_id: TabId) {
        self.navguard.on_tab_removed(tab_id);
    }

    /// User answered a prompt. Returns false for duplicates.
    pub fn prompt_response(&self, prompt_id: &str, action: PromptAction) -> bool {
        self.gate.on_response(prompt_id, action)
    }

    // === Control surface ===

    /// Applies a protection-state request from the popup.
    pub fn apply_protection(&self, state: ProtectionState, pause: Option<PauseDuration>) {
        let changed = match state {
            ProtectionState::Active => self.protection.resume().is_some(),
            ProtectionState::Paused => {
                self.protection.pause(pause.unwrap_or(PauseDuration::Indefinite));
                true
            }
            ProtectionState::Disabled => self.protection.disable().is_some(),
        };

        if let Some(db) = &self.db {
            if let Err(e) = db.set_protection_state(state) {
                warn!(error = %e, "Failed to persist protection state");
            }
        }
        if changed {
            info!(state = %state, "Protection state changed");
            self.events
                .publish(AgentEvent::ProtectionStateChanged { state });
        }
    }

    /// Stores a scan-service credential.
    pub fn sign_in(&self, token: &str, user: &str) {
        let changed = self.credentials.set(token, user);
        if let Some(db) = &self.db {
            if let Err(e) = db.save_credential(&warden_core::credentials::Credential {
                token: token.to_string(),
                user: user.to_string(),
            }) {
                warn!(error = %e, "Failed to persist credential");
            }
        }
        if changed {
            self.events.publish(AgentEvent::AuthChanged { signed_in: true });
        }
    }

    /// Clears the stored credential.
    pub fn sign_out(&self) {
        let changed = self.credentials.clear_all();
        if let Some(db) = &self.db {
            if let Err(e) = db.clear_credential() {
                warn!(error = %e, "Failed to clear persisted credential");
            }
        }
        if changed {
            self.events
                .publish(AgentEvent::AuthChanged { signed_in: false });
        }
    }

    /// Recent local scan events for the popup.
    pub fn recent_scan_events(&self, limit: i64) -> Vec<ScanEventRecord> {
        match &self.db {
            Some(db) => db.recent_scan_events(limit).unwrap_or_else(|e| {
                warn!(error = %e, "Failed to read scan events");
                Vec::new()
            }),
            None => Vec::new(),
        }
    }

    /// Clears the local scan-event log.
    pub fn clear_scan_events(&self) {
        if let Some(db) = &self.db {
            match db.clear_scan_events() {
                Ok(cleared) => {
                    info!(cleared, "Scan-event log cleared");
                    self.events.publish(AgentEvent::LogsCleared);
                }
                Err(e) => warn!(error = %e, "Failed to clear scan events"),
            }
        }
    }

    /// Toggles page auto-scanning.
    pub fn set_auto_scan(&self, enabled: bool) {
        self.navguard.set_auto_scan(enabled);
    }

    /// Current agent health.
    pub fn status(&self) -> AgentStatus {
        AgentStatus {
            protection: self.protection.state(),
            signed_in: self.credentials.is_signed_in(),
            auto_scan_pages: self.navguard.auto_scan_enabled(),
            pending_downloads: self.store.len(),
            live_prompts: self.gate.live_prompts(),
            queued_commands: self.queue.len(),
        }
    }

    // === Accessors ===

    /// The host command queue (drained by the extension).
    pub fn commands(&self) -> &CommandQueue {
        &self.queue
    }

    /// The popup event feed.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// The protection toggle.
    pub fn protection(&self) -> &ProtectionManager {
        &self.protection
    }

    /// The credential store.
    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// The live-tab registry.
    pub fn tabs(&self) -> &TabRegistry {
        &self.tabs
    }

    /// Spawns the janitor loop.
    pub fn spawn_janitor(&self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(Arc::clone(&self.janitor).run())
    }

    /// Runs one janitor sweep synchronously.
    pub fn sweep_now(&self) -> crate::janitor::JanitorReport {
        self.janitor.run_once()
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> &PendingStore {
        &self.store
    }

    #[cfg(test)]
    pub(crate) fn navguard(&self) -> &NavigationGuard {
        &self.navguard
    }
}
