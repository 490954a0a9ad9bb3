//! User consent gate.
//!
//! Renders prompts correlated to pending decisions and processes each
//! response exactly once. The correlation table maps the prompt id straight
//! to its target, so routing a response is a single lookup; the entry is
//! consumed before any action runs, which makes duplicate delivery of the
//! same UI event a no-op.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use warden_core::cache::ExpiringCache;
use warden_core::urlnorm;
use warden_core::verdict::UnsafeUrlEntry;

use crate::blocks::NavBlocks;
use crate::commands::{CommandQueue, HostCommand, NotificationSpec};
use crate::hooks::{DownloadId, HookDecision, TabId};
use crate::ids;
use crate::notify::Notifier;
use crate::pending::{DownloadState, PendingStore, TerminalReason};
use crate::reinitiate::ReinitiationManager;

/// Lifetime of a single-use navigation pass.
pub const NAV_PASS_TTL: Duration = Duration::from_secs(30);

/// What a prompt is asking about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    /// The scan found no threats, but the cancelled object needs consent to
    /// be reissued.
    Clean,
    /// The scan found threats.
    Infected,
    /// The scan timed out or errored; the file is unverified.
    Unverified,
    /// The source cannot be scanned (opaque or malformed URL).
    Unscannable,
    /// Navigation to a previously-flagged URL.
    UnsafeNavigation,
}

impl PromptKind {
    /// Whether a failed prompt falls open (allow) instead of closed (block).
    fn fails_open(&self) -> bool {
        matches!(self, Self::Clean | Self::Unverified)
    }

    fn title(&self) -> &'static str {
        match self {
            Self::Clean => "No threats found",
            Self::Infected => "Threat detected",
            Self::Unverified => "Download not verified",
            Self::Unscannable => "Download cannot be scanned",
            Self::UnsafeNavigation => "Unsafe site blocked",
        }
    }
}

/// Where a response routes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptTarget {
    Download(DownloadId),
    Navigation { tab_id: TabId, url: String },
}

/// User's answer to a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptAction {
    Allow,
    Block,
}

#[derive(Debug, Clone)]
struct PromptContext {
    target: PromptTarget,
    kind: PromptKind,
}

/// At-most-once consent gate over host notifications.
#[derive(Clone)]
pub struct ApprovalGate {
    prompts: Arc<RwLock<HashMap<String, PromptContext>>>,
    store: PendingStore,
    reinit: ReinitiationManager,
    notifier: Notifier,
    queue: CommandQueue,
    blocks: NavBlocks,
    /// Single-use (tab, normalized URL) approvals for unsafe navigations.
    passes: ExpiringCache<(TabId, String), ()>,
}

impl ApprovalGate {
    /// Creates the gate over the shared structures.
    pub fn new(
        store: PendingStore,
        reinit: ReinitiationManager,
        notifier: Notifier,
        queue: CommandQueue,
        blocks: NavBlocks,
    ) -> Self {
        Self {
            prompts: Arc::new(RwLock::new(HashMap::new())),
            store,
            reinit,
            notifier,
            queue,
            blocks,
            passes: ExpiringCache::new("navigation-passes", NAV_PASS_TTL),
        }
    }

    /// The single-use navigation pass cache.
    pub fn passes(&self) -> &ExpiringCache<(TabId, String), ()> {
        &self.passes
    }

    /// Number of live prompts.
    pub fn live_prompts(&self) -> usize {
        self.prompts.read().len()
    }

    /// Presents a consent prompt for a pending download.
    ///
    /// At most one live prompt exists per download: a second verdict for an
    /// already-prompted download is dropped, not re-prompted. A delivery
    /// failure falls back to the kind's conservative default.
    pub fn present_download(&self, id: DownloadId, kind: PromptKind) {
        let Some(snapshot) = self.store.snapshot(id) else {
            debug!(id, "Prompt requested for a record that no longer exists");
            return;
        };

        let prompt_id = ids::generate("prompt");
        if !self.store.set_prompt(id, &prompt_id) {
            debug!(id, "Prompt already live for download, dropping");
            return;
        }

        let mut message = snapshot.file_name.clone();
        if let Some(verdict) = &snapshot.verdict {
            if !verdict.threats.is_empty() {
                message = format!("{}\nThreats: {}", message, verdict.threats.join(", "));
            }
        }

        let spec = NotificationSpec {
            id: prompt_id.clone(),
            title: kind.title().to_string(),
            message,
            actions: vec!["Allow".to_string(), "Block".to_string()],
        };

        match self.notifier.deliver_prompt(spec) {
            Ok(()) => {
                self.prompts.write().insert(
                    prompt_id,
                    PromptContext {
                        target: PromptTarget::Download(id),
                        kind,
                    },
                );
            }
            Err(e) => {
                warn!(id, error = %e, "Prompt delivery failed, applying default");
                if kind.fails_open() {
                    self.reinit.approve(id);
                } else {
                    self.block_download(id);
                }
            }
        }
    }

    /// Presents a severity-labelled prompt for a blocked navigation.
    ///
    /// Returns the prompt id when one was delivered; the navigation stays
    /// blocked either way.
    pub fn present_navigation(
        &self,
        tab_id: TabId,
        url: &str,
        entry: &UnsafeUrlEntry,
    ) -> Option<String> {
        let prompt_id = ids::generate("prompt");
        let spec = NotificationSpec {
            id: prompt_id.clone(),
            title: format!("{} ({} severity)", PromptKind::UnsafeNavigation.title(), entry.level),
            message: format!(
                "{url}\n{} critical, {} high findings",
                entry.critical_count, entry.high_count
            ),
            actions: vec!["Allow".to_string(), "Block".to_string()],
        };

        match self.notifier.deliver_prompt(spec) {
            Ok(()) => {
                self.prompts.write().insert(
                    prompt_id.clone(),
                    PromptContext {
                        target: PromptTarget::Navigation {
                            tab_id,
                            url: url.to_string(),
                        },
                        kind: PromptKind::UnsafeNavigation,
                    },
                );
                Some(prompt_id)
            }
            Err(e) => {
                warn!(tab_id, error = %e, "Navigation prompt delivery failed; staying blocked");
                None
            }
        }
    }

    /// Processes a user response.
    ///
    /// The correlation entry is consumed before any action runs; duplicate
    /// deliveries of the same response return false and do nothing.
    pub fn on_response(&self, prompt_id: &str, action: PromptAction) -> bool {
        let context = self.prompts.write().remove(prompt_id);
        let Some(context) = context else {
            debug!(prompt_id, "Response for unknown or already-consumed prompt");
            return false;
        };

        self.notifier.clear(prompt_id);
        debug!(
            prompt_id,
            ?action,
            kind = ?context.kind,
            target = ?context.target,
            "Processing prompt response"
        );

        match context.target {
            PromptTarget::Download(id) => match action {
                PromptAction::Allow => self.reinit.approve(id),
                PromptAction::Block => self.block_download(id),
            },
            PromptTarget::Navigation { tab_id, url } => match action {
                PromptAction::Allow => {
                    // One pass, this tab only; a later navigation re-checks
                    // the flagged-URL cache and re-prompts.
                    if let Some(norm) = urlnorm::normalize(&url) {
                        self.passes.insert((tab_id, norm), ());
                    }
                    self.blocks.remove(tab_id);
                    self.queue.push(HostCommand::UpdateTab { tab_id, url });
                }
                PromptAction::Block => {
                    // Tab stays parked on the placeholder.
                    self.blocks.remove(tab_id);
                }
            },
        }
        true
    }

    /// Removes a prompt without acting on it (download gone, tab closed).
    pub fn dismiss(&self, prompt_id: &str) {
        if self.prompts.write().remove(prompt_id).is_some() {
            self.notifier.clear(prompt_id);
        }
    }

    fn block_download(&self, id: DownloadId) {
        let _ = self
            .store
            .transition(id, DownloadState::Terminal(TerminalReason::Blocked));
        // The allow callback is never invoked on a block; an explicit deny
        // closes the bridge reply if it is still waiting.
        if let Some(token) = self.store.take_token(id) {
            token.grant(HookDecision::Deny);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use warden_core::verdict::Verdict;

    use crate::hooks::PreStartEvent;

    struct Fixture {
        gate: ApprovalGate,
        store: PendingStore,
        queue: CommandQueue,
        notifier: Notifier,
        blocks: NavBlocks,
    }

    fn fixture() -> Fixture {
        let store = PendingStore::new(None);
        let queue = CommandQueue::new();
        let notifier = Notifier::new(queue.clone());
        let reinit = ReinitiationManager::new(store.clone(), queue.clone(), notifier.clone());
        let blocks = NavBlocks::new();
        let gate = ApprovalGate::new(
            store.clone(),
            reinit,
            notifier.clone(),
            queue.clone(),
            blocks.clone(),
        );
        Fixture {
            gate,
            store,
            queue,
            notifier,
            blocks,
        }
    }

    fn register(store: &PendingStore, id: DownloadId) -> tokio::sync::oneshot::Receiver<HookDecision> {
        let rx = store.register(&PreStartEvent {
            id,
            source_url: "https://example.com/f.exe".to_string(),
            resolved_url: None,
            file_name: "f.exe".to_string(),
            mime: None,
        });
        store.transition(id, DownloadState::Scanning).unwrap();
        rx
    }

    fn live_prompt_id(f: &Fixture, id: DownloadId) -> String {
        f.store.snapshot(id).unwrap().prompt_id.unwrap()
    }

    #[tokio::test]
    async fn second_verdict_does_not_reprompt() {
        let f = fixture();
        let _rx = register(&f.store, 1);
        f.store
            .set_verdict(1, Verdict::infected(vec!["EICAR".to_string()]));

        f.gate.present_download(1, PromptKind::Infected);
        f.gate.present_download(1, PromptKind::Unverified);

        assert_eq!(f.gate.live_prompts(), 1);
        let notifies = f
            .queue
            .drain()
            .into_iter()
            .filter(|c| matches!(c, HostCommand::Notify { .. }))
            .count();
        assert_eq!(notifies, 1);
    }

    #[tokio::test]
    async fn block_response_denies_and_never_allows() {
        let f = fixture();
        let rx = register(&f.store, 1);
        f.gate.present_download(1, PromptKind::Infected);
        let prompt = live_prompt_id(&f, 1);

        assert!(f.gate.on_response(&prompt, PromptAction::Block));
        assert_eq!(
            f.store.state(1),
            Some(DownloadState::Terminal(TerminalReason::Blocked))
        );
        assert_eq!(rx.await.unwrap(), HookDecision::Deny);
        // No reissue was queued.
        assert!(!f
            .queue
            .drain()
            .iter()
            .any(|c| matches!(c, HostCommand::StartDownload { .. })));
    }

    #[tokio::test]
    async fn duplicate_response_is_ignored() {
        let f = fixture();
        let _rx = register(&f.store, 1);
        f.gate.present_download(1, PromptKind::Infected);
        let prompt = live_prompt_id(&f, 1);

        assert!(f.gate.on_response(&prompt, PromptAction::Block));
        assert!(!f.gate.on_response(&prompt, PromptAction::Allow));
        assert_eq!(
            f.store.state(1),
            Some(DownloadState::Terminal(TerminalReason::Blocked))
        );
    }

    #[tokio::test]
    async fn allow_response_routes_to_reinitiation() {
        let f = fixture();
        let rx = register(&f.store, 1);
        f.gate.present_download(1, PromptKind::Unverified);
        let prompt = live_prompt_id(&f, 1);

        assert!(f.gate.on_response(&prompt, PromptAction::Allow));
        assert_eq!(
            f.store.state(1),
            Some(DownloadState::Terminal(TerminalReason::Approved))
        );
        assert_eq!(rx.await.unwrap(), HookDecision::Allow { file_name: None });
    }

    #[tokio::test]
    async fn prompt_failure_blocks_infected() {
        let f = fixture();
        let rx = register(&f.store, 1);
        f.notifier.fail_next_delivery();

        f.gate.present_download(1, PromptKind::Infected);

        assert_eq!(f.gate.live_prompts(), 0);
        assert_eq!(
            f.store.state(1),
            Some(DownloadState::Terminal(TerminalReason::Blocked))
        );
        assert_eq!(rx.await.unwrap(), HookDecision::Deny);
    }

    #[tokio::test]
    async fn prompt_failure_fails_open_for_unverified() {
        let f = fixture();
        let rx = register(&f.store, 1);
        f.notifier.fail_next_delivery();

        f.gate.present_download(1, PromptKind::Unverified);

        assert_eq!(
            f.store.state(1),
            Some(DownloadState::Terminal(TerminalReason::Approved))
        );
        assert_eq!(rx.await.unwrap(), HookDecision::Allow { file_name: None });
    }

    #[tokio::test]
    async fn navigation_allow_grants_single_use_pass() {
        let f = fixture();
        f.blocks.insert(7, "https://bad.example/", None);
        let entry = UnsafeUrlEntry::from_counts(2, 0);
        let prompt = f
            .gate
            .present_navigation(7, "https://bad.example/", &entry)
            .unwrap();

        assert!(f.gate.on_response(&prompt, PromptAction::Allow));
        assert!(f.blocks.get(7).is_none());
        // Pass is single-use.
        assert!(f
            .gate
            .passes()
            .consume(&(7, "https://bad.example/".to_string()))
            .is_some());
        assert!(f
            .gate
            .passes()
            .consume(&(7, "https://bad.example/".to_string()))
            .is_none());
        // Tab was sent back to the original URL.
        assert!(f.queue.drain().iter().any(|c| matches!(
            c,
            HostCommand::UpdateTab { tab_id: 7, url } if url == "https://bad.example/"
        )));
    }

    #[tokio::test]
    async fn navigation_block_keeps_placeholder() {
        let f = fixture();
        f.blocks.insert(7, "https://bad.example/", None);
        let entry = UnsafeUrlEntry::from_counts(0, 1);
        let prompt = f
            .gate
            .present_navigation(7, "https://bad.example/", &entry)
            .unwrap();
        f.queue.drain();

        assert!(f.gate.on_response(&prompt, PromptAction::Block));
        assert!(f.blocks.get(7).is_none());
        // No tab update: the tab stays on the placeholder.
        assert!(!f
            .queue
            .drain()
            .iter()
            .any(|c| matches!(c, HostCommand::UpdateTab { .. })));
    }

    #[tokio::test]
    async fn navigation_prompt_includes_severity() {
        let f = fixture();
        let entry = UnsafeUrlEntry::from_counts(2, 1);
        f.gate
            .present_navigation(7, "https://bad.example/", &entry)
            .unwrap();

        let commands = f.queue.drain();
        match &commands[0] {
            HostCommand::Notify { notification } => {
                assert!(notification.title.contains("critical"));
                assert!(notification.message.contains("2 critical"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[tokio::test]
    async fn dismiss_drops_prompt_silently() {
        let f = fixture();
        let _rx = register(&f.store, 1);
        f.gate.present_download(1, PromptKind::Infected);
        let prompt = live_prompt_id(&f, 1);
        f.queue.drain();

        f.gate.dismiss(&prompt);
        assert_eq!(f.gate.live_prompts(), 0);
        // Later response is a no-op.
        assert!(!f.gate.on_response(&prompt, PromptAction::Allow));
    }
}
