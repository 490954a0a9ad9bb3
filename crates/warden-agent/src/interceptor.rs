//! Download interception: reconciling the two host hooks.
//!
//! The pre-start hook may decide immediately (protection off, signed out,
//! intermediate files) or withhold the decision while a scan runs. The host
//! enforces its own deadline on that withheld decision; if it elapses, the
//! host starts the download anyway and the created hook is the safety net
//! that cancels anything the agent never approved.
//!
//! Because the record is registered synchronously inside the pre-start hook
//! — before the first suspension point — no download that needs scanning
//! can be created without a record the created hook will see.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use warden_core::credentials::CredentialStore;
use warden_core::events::{AgentEvent, EventBus};
use warden_core::filename;
use warden_core::protection::ProtectionManager;
use warden_core::urlnorm;
use warden_core::verdict::VerdictStatus;
use warden_scan::{ScanCoordinator, ScanOutcome};
use warden_storage::{Database, NewScanEvent};

use crate::approval::{ApprovalGate, PromptKind};
use crate::commands::{CommandQueue, HostCommand};
use crate::hooks::{
    ChangedEvent, CreatedAction, CreatedEvent, DownloadChange, DownloadId, HookDecision,
    PreStartEvent, PreStartReply,
};
use crate::notify::Notifier;
use crate::pending::{DownloadState, PendingStore, TerminalReason};
use crate::reinitiate::ReinitiationManager;

/// Owns the pre-start / post-creation hook pair.
#[derive(Clone)]
pub struct DownloadInterceptor {
    store: PendingStore,
    coordinator: ScanCoordinator,
    gate: ApprovalGate,
    reinit: ReinitiationManager,
    protection: ProtectionManager,
    credentials: CredentialStore,
    queue: CommandQueue,
    notifier: Notifier,
    events: EventBus,
    db: Option<Database>,
    scans_in_flight: Arc<Mutex<HashSet<DownloadId>>>,
}

impl DownloadInterceptor {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        store: PendingStore,
        coordinator: ScanCoordinator,
        gate: ApprovalGate,
        reinit: ReinitiationManager,
        protection: ProtectionManager,
        credentials: CredentialStore,
        queue: CommandQueue,
        notifier: Notifier,
        events: EventBus,
        db: Option<Database>,
    ) -> Self {
        Self {
            store,
            coordinator,
            gate,
            reinit,
            protection,
            credentials,
            queue,
            notifier,
            events,
            db,
            scans_in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Pre-start hook: decide now, or register and withhold.
    pub fn on_pre_start(&self, event: PreStartEvent) -> PreStartReply {
        if !self.protection.is_active() {
            debug!(id = event.id, "Protection off, allowing download");
            return PreStartReply::Immediate(HookDecision::Allow { file_name: None });
        }
        if !self.credentials.is_signed_in() {
            debug!(id = event.id, "Not signed in, allowing download unscanned");
            return PreStartReply::Immediate(HookDecision::Allow { file_name: None });
        }

        let url = event.effective_url().to_string();

        if !urlnorm::is_scannable(&url) {
            // Opaque or malformed source: no scan is possible, ask directly.
            debug!(id = event.id, url = %url, "Unscannable source, prompting directly");
            let receiver = self.store.register(&event);
            let _ = self.store.transition(event.id, DownloadState::AwaitingApproval);
            self.gate.present_download(event.id, PromptKind::Unscannable);
            return PreStartReply::Withheld(receiver);
        }

        if filename::is_intermediate(&event.file_name, event.mime.as_deref()) {
            debug!(id = event.id, name = %event.file_name, "Intermediate file, allowing without scan");
            return PreStartReply::Immediate(HookDecision::Allow {
                file_name: Some(event.file_name),
            });
        }

        let receiver = self.store.register(&event);
        let _ = self.store.transition(event.id, DownloadState::Scanning);
        self.spawn_scan(event.id, url, event.file_name);
        PreStartReply::Withheld(receiver)
    }

    /// Post-creation hook: the safety net.
    pub fn on_created(&self, event: CreatedEvent) -> CreatedAction {
        // A reissued download carries a live permit; consume it and let the
        // object through without re-cancelling.
        if let Some(url) = urlnorm::normalize(&event.url) {
            if self.reinit.permits().consume(&url).is_some() {
                debug!(id = event.id, url = %url, "Permit matched, allowing reissued download");
                return CreatedAction::Allow;
            }
        }

        let Some(state) = self.store.state(event.id) else {
            // Decided immediately at pre-start, or not ours.
            return CreatedAction::Allow;
        };

        match state {
            DownloadState::Terminal(TerminalReason::Approved) | DownloadState::Reinitiating => {
                CreatedAction::Allow
            }
            DownloadState::Terminal(_) => {
                debug!(id = event.id, "Blocked download object appeared, cancelling");
                CreatedAction::Cancel
            }
            DownloadState::Detected | DownloadState::Scanning | DownloadState::AwaitingApproval => {
                // The host's deadline elapsed before a decision: it started
                // something the agent never approved.
                if self.store.mark_auto_started(event.id) {
                    info!(id = event.id, "Host auto-started an undecided download, cancelling");
                    let _ = self
                        .store
                        .transition(event.id, DownloadState::AwaitingApproval);
                    self.ensure_scan(event.id);
                }
                CreatedAction::Cancel
            }
        }
    }

    /// Host failed to cancel: pause is the degraded fallback.
    pub fn on_cancel_failed(&self, id: DownloadId) {
        warn!(id, "Cancel failed, pausing download instead");
        self.queue.push(HostCommand::PauseDownload { id });
    }

    /// Host download state change.
    pub fn on_changed(&self, event: ChangedEvent) {
        if event.change == DownloadChange::Complete {
            self.remove_record(event.id);
        }
    }

    /// Host removed the download object.
    pub fn on_removed(&self, id: DownloadId) {
        self.remove_record(id);
    }

    fn remove_record(&self, id: DownloadId) {
        if let Some(snapshot) = self.store.remove(id) {
            debug!(id, state = %snapshot.state, "Record destroyed on host event");
            if let Some(prompt_id) = snapshot.prompt_id {
                self.gate.dismiss(&prompt_id);
            }
        }
    }

    /// Starts the scan task unless one is already in flight for this id.
    fn ensure_scan(&self, id: DownloadId) {
        let Some(snapshot) = self.store.snapshot(id) else {
            return;
        };
        if snapshot.verdict.is_some() || !urlnorm::is_scannable(&snapshot.resolved_url) {
            return;
        }
        self.spawn_scan(id, snapshot.resolved_url, snapshot.file_name);
    }

    fn spawn_scan(&self, id: DownloadId, url: String, file_name: String) {
        if !self.scans_in_flight.lock().insert(id) {
            return;
        }
        let this = self.clone();
        tokio::spawn(async move {
            this.drive_scan(id, &url, &file_name).await;
            this.scans_in_flight.lock().remove(&id);
        });
    }

    async fn drive_scan(&self, id: DownloadId, url: &str, file_name: &str) {
        let outcome = self.coordinator.scan_download(url, file_name).await;

        // A record that died or finished while the scan was in flight
        // ignores the late verdict.
        let Some(snapshot) = self.store.snapshot(id) else {
            debug!(id, "Verdict arrived for a destroyed record, ignoring");
            return;
        };
        if snapshot.state.is_terminal() {
            debug!(id, "Verdict arrived for a terminal record, ignoring");
            return;
        }

        match outcome {
            ScanOutcome::Unavailable => {
                // Availability over paranoia: proceed silently, leave nothing
                // behind.
                info!(id, "Scan service unavailable, allowing download unscanned");
                self.reinit.approve(id);
                self.store.remove(id);
            }
            ScanOutcome::AuthRequired => {
                info!(id, "Credential rejected, blocking download");
                let _ = self
                    .store
                    .transition(id, DownloadState::Terminal(TerminalReason::Blocked));
                if let Some(token) = self.store.take_token(id) {
                    token.grant(HookDecision::Deny);
                }
                if let Some(db) = &self.db {
                    let _ = db.clear_credential();
                }
                self.notifier.notice_once(
                    "auth-required",
                    "Sign-in required",
                    "Warden cannot scan downloads until you sign in again.",
                );
                self.events.publish(AgentEvent::AuthChanged { signed_in: false });
            }
            ScanOutcome::Verdict(verdict) => {
                self.log_scan_event(url, verdict.status);
                self.events.publish(AgentEvent::ScanComplete {
                    url: url.to_string(),
                    status: verdict.status,
                });

                if verdict.is_clean() && !snapshot.auto_started {
                    // The original object is still held; no consent needed.
                    debug!(id, "Clean verdict, allowing download");
                    self.reinit.approve(id);
                } else {
                    let kind = match verdict.status {
                        VerdictStatus::Clean => PromptKind::Clean,
                        VerdictStatus::Infected => PromptKind::Infected,
                        _ => PromptKind::Unverified,
                    };
                    info!(id, status = %verdict.status, "Verdict requires consent");
                    self.store.set_verdict(id, verdict);
                    self.gate.present_download(id, kind);
                }
            }
        }
    }

    fn log_scan_event(&self, url: &str, status: VerdictStatus) {
        if let Some(db) = &self.db {
            let event = NewScanEvent {
                url: url.to_string(),
                kind: "download".to_string(),
                status: status.as_str().to_string(),
                threat_level: None,
            };
            if let Err(e) = db.log_scan_event(event) {
                warn!(error = %e, "Failed to log scan event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use tokio::time::sleep;

    use warden_core::verdict::Verdict;
    use warden_scan::error::ScanError;

    use crate::blocks::NavBlocks;
    use crate::testutil::{signed_in_credentials, ScriptedBackend};

    struct Fixture {
        interceptor: DownloadInterceptor,
        store: PendingStore,
        queue: CommandQueue,
        credentials: CredentialStore,
        protection: ProtectionManager,
        events: EventBus,
        gate: ApprovalGate,
    }

    fn fixture(backend: Arc<ScriptedBackend>) -> Fixture {
        let store = PendingStore::new(None);
        let queue = CommandQueue::new();
        let notifier = Notifier::new(queue.clone());
        let credentials = signed_in_credentials();
        let protection = ProtectionManager::new();
        let events = EventBus::new();
        let coordinator = ScanCoordinator::new(backend, credentials.clone());
        let reinit = ReinitiationManager::new(store.clone(), queue.clone(), notifier.clone());
        let gate = ApprovalGate::new(
            store.clone(),
            reinit.clone(),
            notifier.clone(),
            queue.clone(),
            NavBlocks::new(),
        );
        let interceptor = DownloadInterceptor::new(
            store.clone(),
            coordinator,
            gate.clone(),
            reinit,
            protection.clone(),
            credentials.clone(),
            queue.clone(),
            notifier,
            events.clone(),
            None,
        );
        Fixture {
            interceptor,
            store,
            queue,
            credentials,
            protection,
            events,
            gate,
        }
    }

    fn pre_start(id: DownloadId, url: &str, name: &str) -> PreStartEvent {
        PreStartEvent {
            id,
            source_url: url.to_string(),
            resolved_url: None,
            file_name: name.to_string(),
            mime: None,
        }
    }

    async fn settle() {
        // Lets spawned scan tasks run to completion under the paused clock.
        sleep(Duration::from_secs(2)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn protection_off_allows_immediately() {
        let f = fixture(ScriptedBackend::clean().shared());
        f.protection.disable();

        let reply = f
            .interceptor
            .on_pre_start(pre_start(1, "https://example.com/f.exe", "f.exe"));
        assert!(matches!(
            reply,
            PreStartReply::Immediate(HookDecision::Allow { file_name: None })
        ));
        assert!(f.store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn signed_out_allows_immediately() {
        let f = fixture(ScriptedBackend::clean().shared());
        f.credentials.clear_all();

        let reply = f
            .interceptor
            .on_pre_start(pre_start(1, "https://example.com/f.exe", "f.exe"));
        assert!(matches!(reply, PreStartReply::Immediate(_)));
        assert!(f.store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn intermediate_file_auto_allowed_with_name() {
        let f = fixture(ScriptedBackend::clean().shared());

        let reply = f
            .interceptor
            .on_pre_start(pre_start(1, "https://example.com/go", "landing.html"));
        match reply {
            PreStartReply::Immediate(HookDecision::Allow { file_name }) => {
                assert_eq!(file_name.as_deref(), Some("landing.html"));
            }
            other => panic!("unexpected reply {other:?}"),
        }
        assert!(f.store.is_empty());
        assert!(f.queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unscannable_source_prompts_without_scan() {
        let f = fixture(ScriptedBackend::clean().shared());

        let reply = f
            .interceptor
            .on_pre_start(pre_start(1, "blob:https://example.com/abc", "f.bin"));
        assert!(matches!(reply, PreStartReply::Withheld(_)));
        assert_eq!(f.store.state(1), Some(DownloadState::AwaitingApproval));

        settle().await;
        // A prompt went out and no scan ran.
        assert!(f
            .queue
            .drain()
            .iter()
            .any(|c| matches!(c, HostCommand::Notify { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn clean_verdict_grants_original_callback() {
        let f = fixture(ScriptedBackend::clean().shared());

        let reply = f
            .interceptor
            .on_pre_start(pre_start(1, "https://example.com/f.exe", "f.exe"));
        let PreStartReply::Withheld(rx) = reply else {
            panic!("expected withheld reply");
        };
        assert_eq!(f.store.state(1), Some(DownloadState::Scanning));

        settle().await;
        assert_eq!(rx.await.unwrap(), HookDecision::Allow { file_name: None });
        assert_eq!(
            f.store.state(1),
            Some(DownloadState::Terminal(TerminalReason::Approved))
        );
        // Silent: no prompt for clean files.
        assert!(!f
            .queue
            .drain()
            .iter()
            .any(|c| matches!(c, HostCommand::Notify { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn infected_verdict_prompts_and_keeps_record() {
        let backend =
            ScriptedBackend::with_download(Ok(Verdict::infected(vec!["EICAR".to_string()])));
        let f = fixture(backend.shared());

        let _reply = f
            .interceptor
            .on_pre_start(pre_start(1, "https://example.com/f.exe", "f.exe"));
        settle().await;

        let snapshot = f.store.snapshot(1).unwrap();
        assert!(snapshot.prompt_id.is_some());
        assert_eq!(
            snapshot.verdict.unwrap().status,
            VerdictStatus::Infected
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_service_fails_open_and_leaves_nothing() {
        let f = fixture(ScriptedBackend::unreachable().shared());

        let reply = f
            .interceptor
            .on_pre_start(pre_start(1, "https://example.com/f.exe", "f.exe"));
        let PreStartReply::Withheld(rx) = reply else {
            panic!("expected withheld reply");
        };

        settle().await;
        assert_eq!(rx.await.unwrap(), HookDecision::Allow { file_name: None });
        assert!(f.store.is_empty());
        assert!(!f
            .queue
            .drain()
            .iter()
            .any(|c| matches!(c, HostCommand::Notify { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn auth_rejection_fails_closed_with_notice() {
        let backend = ScriptedBackend::with_download(Err(ScanError::AuthRequired));
        let f = fixture(backend.shared());
        let mut event_rx = f.events.subscribe();

        let reply = f
            .interceptor
            .on_pre_start(pre_start(1, "https://example.com/f.exe", "f.exe"));
        let PreStartReply::Withheld(rx) = reply else {
            panic!("expected withheld reply");
        };

        settle().await;
        assert_eq!(rx.await.unwrap(), HookDecision::Deny);
        assert_eq!(
            f.store.state(1),
            Some(DownloadState::Terminal(TerminalReason::Blocked))
        );
        assert!(!f.credentials.is_signed_in());
        assert!(f
            .queue
            .drain()
            .iter()
            .any(|c| matches!(c, HostCommand::Notify { .. })));
        assert_eq!(
            event_rx.recv().await.unwrap().event,
            AgentEvent::AuthChanged { signed_in: false }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn race_cancels_exactly_once_and_awaits_approval() {
        let backend = ScriptedBackend::clean().shared();
        *backend.response_delay.lock().unwrap() = Duration::from_secs(30);
        let f = fixture(backend);

        let _reply = f
            .interceptor
            .on_pre_start(pre_start(1, "https://example.com/f.exe", "f.exe"));

        // Host deadline elapsed; the object appears while still scanning.
        let action = f.interceptor.on_created(CreatedEvent {
            id: 1,
            url: "https://example.com/f.exe".to_string(),
            file_name: None,
        });
        assert_eq!(action, CreatedAction::Cancel);
        assert_eq!(f.store.state(1), Some(DownloadState::AwaitingApproval));
        assert!(f.store.snapshot(1).unwrap().auto_started);

        // Duplicate created event: still cancelled, but no second race
        // handling.
        let action = f.interceptor.on_created(CreatedEvent {
            id: 1,
            url: "https://example.com/f.exe".to_string(),
            file_name: None,
        });
        assert_eq!(action, CreatedAction::Cancel);
    }

    #[tokio::test(start_paused = true)]
    async fn race_then_clean_verdict_prompts_and_reissues_via_permit() {
        let backend = ScriptedBackend::clean().shared();
        *backend.response_delay.lock().unwrap() = Duration::from_secs(10);
        let f = fixture(backend);

        let _reply = f
            .interceptor
            .on_pre_start(pre_start(1, "https://example.com/f.exe", "f.exe"));
        f.interceptor.on_created(CreatedEvent {
            id: 1,
            url: "https://example.com/f.exe".to_string(),
            file_name: None,
        });

        settle().await;
        sleep(Duration::from_secs(10)).await;

        // Clean verdict on an auto-started record still needs consent: the
        // original object is gone.
        let prompt_id = f.store.snapshot(1).unwrap().prompt_id.expect("prompted");
        f.queue.drain();
        assert!(f
            .gate
            .on_response(&prompt_id, crate::approval::PromptAction::Allow));

        let commands = f.queue.drain();
        let start = commands
            .iter()
            .find_map(|c| match c {
                HostCommand::StartDownload { url, .. } => Some(url.clone()),
                _ => None,
            })
            .expect("reissue queued");

        // The reissued object is exempted exactly once.
        let action = f.interceptor.on_created(CreatedEvent {
            id: 2,
            url: start,
            file_name: None,
        });
        assert_eq!(action, CreatedAction::Allow);
    }

    #[tokio::test(start_paused = true)]
    async fn created_for_unknown_download_is_allowed() {
        let f = fixture(ScriptedBackend::clean().shared());
        let action = f.interceptor.on_created(CreatedEvent {
            id: 99,
            url: "https://example.com/f.exe".to_string(),
            file_name: None,
        });
        assert_eq!(action, CreatedAction::Allow);
    }

    #[tokio::test(start_paused = true)]
    async fn created_for_blocked_record_cancels() {
        let f = fixture(ScriptedBackend::clean().shared());
        let _rx = f.store.register(&pre_start(1, "https://example.com/f.exe", "f.exe"));
        f.store
            .transition(1, DownloadState::Terminal(TerminalReason::Blocked))
            .unwrap();

        let action = f.interceptor.on_created(CreatedEvent {
            id: 1,
            url: "https://example.com/f.exe".to_string(),
            file_name: None,
        });
        assert_eq!(action, CreatedAction::Cancel);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_failure_pauses_as_fallback() {
        let f = fixture(ScriptedBackend::clean().shared());
        f.interceptor.on_cancel_failed(7);
        assert_eq!(
            f.queue.drain(),
            vec![HostCommand::PauseDownload { id: 7 }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn completion_destroys_record() {
        let f = fixture(ScriptedBackend::clean().shared());
        let _rx = f.store.register(&pre_start(1, "https://example.com/f.exe", "f.exe"));

        f.interceptor.on_changed(ChangedEvent {
            id: 1,
            change: DownloadChange::InProgress,
        });
        assert!(!f.store.is_empty());

        f.interceptor.on_changed(ChangedEvent {
            id: 1,
            change: DownloadChange::Complete,
        });
        assert!(f.store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn late_verdict_for_terminal_record_is_ignored() {
        let backend = ScriptedBackend::clean().shared();
        *backend.response_delay.lock().unwrap() = Duration::from_secs(5);
        let f = fixture(backend);

        let _reply = f
            .interceptor
            .on_pre_start(pre_start(1, "https://example.com/f.exe", "f.exe"));
        // The host removes the download before the verdict lands.
        f.interceptor.on_removed(1);

        settle().await;
        sleep(Duration::from_secs(5)).await;
        assert!(f.store.is_empty());
        assert!(f.queue.is_empty());
    }
}
