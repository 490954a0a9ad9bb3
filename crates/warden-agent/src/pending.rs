//! Typed store of pending-download records.
//!
//! This replaces the "which map is this id in right now" pattern with one
//! arena of [`PendingDownload`] records and an enforced transition function:
//! states only move forward, and the journal entry is written before the
//! in-memory mutation so a crash between the two leaves a detectable
//! remnant rather than a silent leak.
//!
//! Every mutation is a single non-yielding step under one lock; nothing is
//! held across an await. In the agent's single-threaded event model that is
//! the whole locking story.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::warn;

use warden_core::verdict::Verdict;
use warden_storage::Database;

use crate::hooks::{DownloadId, HookDecision, PreStartEvent};

/// Why a download reached its terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalReason {
    /// The user (or a fail-open policy) allowed it.
    Approved,
    /// The user (or a fail-closed policy) blocked it.
    Blocked,
    /// The host removed it before a decision.
    Cancelled,
}

/// Lifecycle state of a pending download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadState {
    /// Pre-start hook fired, nothing decided yet.
    Detected,
    /// A scan is in flight.
    Scanning,
    /// Waiting on an explicit user response.
    AwaitingApproval,
    /// An allow decision is being carried out.
    Reinitiating,
    /// Final. The record is destroyed on the next host removal event or
    /// janitor pass.
    Terminal(TerminalReason),
}

impl DownloadState {
    fn rank(&self) -> u8 {
        match self {
            Self::Detected => 0,
            Self::Scanning => 1,
            Self::AwaitingApproval => 2,
            Self::Reinitiating => 3,
            Self::Terminal(_) => 4,
        }
    }

    /// Returns true for any terminal variant.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal(_))
    }

    /// Journal representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Detected => "detected",
            Self::Scanning => "scanning",
            Self::AwaitingApproval => "awaiting_approval",
            Self::Reinitiating => "reinitiating",
            Self::Terminal(TerminalReason::Approved) => "terminal_approved",
            Self::Terminal(TerminalReason::Blocked) => "terminal_blocked",
            Self::Terminal(TerminalReason::Cancelled) => "terminal_cancelled",
        }
    }
}

impl std::fmt::Display for DownloadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Transition errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    /// No record for the id.
    #[error("no pending download {0}")]
    NotFound(DownloadId),

    /// The requested transition would move backwards (or sideways).
    #[error("illegal transition {from} -> {to} for download {id}")]
    Regression {
        id: DownloadId,
        from: &'static str,
        to: &'static str,
    },
}

/// Single-use handle wrapping the host's pre-start "allow" callback.
///
/// Granting consumes the token by move, so a second invocation is a type
/// error, not a runtime bug. A token whose receiver is gone (the bridge
/// reply timed out, the download was cancelled) reports the loss through
/// the return value.
#[derive(Debug)]
pub struct ApprovalToken {
    sender: oneshot::Sender<HookDecision>,
}

impl ApprovalToken {
    /// Creates a token and the receiver the bridge awaits.
    pub fn channel() -> (Self, oneshot::Receiver<HookDecision>) {
        let (sender, receiver) = oneshot::channel();
        (Self { sender }, receiver)
    }

    /// Delivers the decision. Returns false if the callback was lost.
    pub fn grant(self, decision: HookDecision) -> bool {
        self.sender.send(decision).is_ok()
    }
}

/// One intercepted download, from pre-start to terminal.
#[derive(Debug)]
struct PendingDownload {
    id: DownloadId,
    source_url: String,
    resolved_url: String,
    file_name: String,
    state: DownloadState,
    verdict: Option<Verdict>,
    scan_started_at: Option<Instant>,
    token: Option<ApprovalToken>,
    /// Set once the created hook has cancelled a host-auto-started object.
    auto_started: bool,
    prompt_id: Option<String>,
    terminal_at: Option<Instant>,
}

/// Copy of a record without the token, for callers that only read.
#[derive(Debug, Clone)]
pub struct DownloadSnapshot {
    pub id: DownloadId,
    pub source_url: String,
    pub resolved_url: String,
    pub file_name: String,
    pub state: DownloadState,
    pub verdict: Option<Verdict>,
    pub scan_started_at: Option<Instant>,
    pub auto_started: bool,
    pub prompt_id: Option<String>,
}

impl PendingDownload {
    fn snapshot(&self) -> DownloadSnapshot {
        DownloadSnapshot {
            id: self.id,
            source_url: self.source_url.clone(),
            resolved_url: self.resolved_url.clone(),
            file_name: self.file_name.clone(),
            state: self.state,
            verdict: self.verdict.clone(),
            scan_started_at: self.scan_started_at,
            auto_started: self.auto_started,
            prompt_id: self.prompt_id.clone(),
        }
    }
}

/// Arena of pending downloads keyed by the host id.
#[derive(Clone)]
pub struct PendingStore {
    inner: Arc<RwLock<HashMap<DownloadId, PendingDownload>>>,
    db: Option<Database>,
}

impl PendingStore {
    /// Creates a store, journaling transitions when a database is given.
    pub fn new(db: Option<Database>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            db,
        }
    }

    fn journal(&self, record: &PendingDownload, to: DownloadState, detail: Option<&str>) {
        if let Some(db) = &self.db {
            let key = format!("dl-{}", record.id);
            if let Err(e) = db.record_transition(
                &key,
                &record.source_url,
                record.state.as_str(),
                to.as_str(),
                detail,
            ) {
                warn!(id = record.id, error = %e, "Failed to journal transition");
            }
        }
    }

    /// Registers a new record in `Detected` and returns the bridge receiver
    /// paired with its approval token.
    pub fn register(&self, event: &PreStartEvent) -> oneshot::Receiver<HookDecision> {
        let (token, receiver) = ApprovalToken::channel();
        let record = PendingDownload {
            id: event.id,
            source_url: event.source_url.clone(),
            resolved_url: event.effective_url().to_string(),
            file_name: event.file_name.clone(),
            state: DownloadState::Detected,
            verdict: None,
            scan_started_at: None,
            token: Some(token),
            auto_started: false,
            prompt_id: None,
            terminal_at: None,
        };

        if let Some(db) = &self.db {
            let key = format!("dl-{}", record.id);
            if let Err(e) =
                db.record_transition(&key, &record.source_url, "none", "detected", None)
            {
                warn!(id = record.id, error = %e, "Failed to journal registration");
            }
        }

        self.inner.write().insert(event.id, record);
        receiver
    }

    /// Moves a record forward. The journal entry is written before the
    /// in-memory state changes.
    pub fn transition(&self, id: DownloadId, to: DownloadState) -> Result<(), TransitionError> {
        let mut inner = self.inner.write();
        let record = inner.get_mut(&id).ok_or(TransitionError::NotFound(id))?;

        if to.rank() <= record.state.rank() {
            return Err(TransitionError::Regression {
                id,
                from: record.state.as_str(),
                to: to.as_str(),
            });
        }

        self.journal(record, to, None);
        record.state = to;
        if to == DownloadState::Scanning {
            record.scan_started_at = Some(Instant::now());
        }
        if to.is_terminal() {
            record.terminal_at = Some(Instant::now());
        }
        Ok(())
    }

    /// Returns the state of a record, if it exists.
    pub fn state(&self, id: DownloadId) -> Option<DownloadState> {
        self.inner.read().get(&id).map(|r| r.state)
    }

    /// Returns a tokenless copy of a record.
    pub fn snapshot(&self, id: DownloadId) -> Option<DownloadSnapshot> {
        self.inner.read().get(&id).map(|r| r.snapshot())
    }

    /// Removes and returns the approval token, if still held.
    pub fn take_token(&self, id: DownloadId) -> Option<ApprovalToken> {
        self.inner.write().get_mut(&id)?.token.take()
    }

    /// Stores the verdict on a record.
    pub fn set_verdict(&self, id: DownloadId, verdict: Verdict) {
        if let Some(record) = self.inner.write().get_mut(&id) {
            record.verdict = Some(verdict);
        }
    }

    /// Associates a prompt with a record.
    ///
    /// Returns false if the record already has a live prompt (or does not
    /// exist) — the caller must drop the duplicate instead of re-prompting.
    pub fn set_prompt(&self, id: DownloadId, prompt_id: &str) -> bool {
        let mut inner = self.inner.write();
        match inner.get_mut(&id) {
            Some(record) if record.prompt_id.is_none() => {
                record.prompt_id = Some(prompt_id.to_string());
                true
            }
            _ => false,
        }
    }

    /// Marks the record as host-auto-started (the created-hook race).
    ///
    /// Returns true the first time only; the caller cancels exactly once.
    pub fn mark_auto_started(&self, id: DownloadId) -> bool {
        let mut inner = self.inner.write();
        match inner.get_mut(&id) {
            Some(record) if !record.auto_started => {
                record.auto_started = true;
                true
            }
            _ => false,
        }
    }

    /// Destroys a record, returning its final snapshot.
    pub fn remove(&self, id: DownloadId) -> Option<DownloadSnapshot> {
        self.inner.write().remove(&id).map(|r| r.snapshot())
    }

    /// Ids of all live records.
    pub fn ids(&self) -> Vec<DownloadId> {
        self.inner.read().keys().copied().collect()
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Returns true if no records are held.
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Destroys terminal records older than `retention`. Returns the count.
    pub fn sweep_terminal(&self, retention: std::time::Duration) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.write();
        let before = inner.len();
        inner.retain(|_, r| match r.terminal_at {
            Some(at) => now.duration_since(at) < retention,
            None => true,
        });
        before - inner.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use warden_core::verdict::VerdictStatus;

    fn event(id: DownloadId) -> PreStartEvent {
        PreStartEvent {
            id,
            source_url: "https://example.com/dl".to_string(),
            resolved_url: Some("https://cdn.example.com/f.exe".to_string()),
            file_name: "f.exe".to_string(),
            mime: None,
        }
    }

    fn store() -> PendingStore {
        PendingStore::new(None)
    }

    #[test]
    fn register_starts_detected() {
        let store = store();
        let _rx = store.register(&event(1));
        assert_eq!(store.state(1), Some(DownloadState::Detected));
        let snap = store.snapshot(1).unwrap();
        assert_eq!(snap.resolved_url, "https://cdn.example.com/f.exe");
        assert!(!snap.auto_started);
    }

    #[test]
    fn transitions_move_forward_only() {
        let store = store();
        let _rx = store.register(&event(1));

        store.transition(1, DownloadState::Scanning).unwrap();
        store.transition(1, DownloadState::AwaitingApproval).unwrap();

        // Sideways and backwards are both rejected.
        assert!(matches!(
            store.transition(1, DownloadState::AwaitingApproval),
            Err(TransitionError::Regression { .. })
        ));
        assert!(matches!(
            store.transition(1, DownloadState::Scanning),
            Err(TransitionError::Regression { .. })
        ));
    }

    #[test]
    fn skipping_states_forward_is_allowed() {
        let store = store();
        let _rx = store.register(&event(1));
        // Direct-prompt path: Detected straight to AwaitingApproval.
        store.transition(1, DownloadState::AwaitingApproval).unwrap();
        store
            .transition(1, DownloadState::Terminal(TerminalReason::Blocked))
            .unwrap();
    }

    #[test]
    fn terminal_is_final() {
        let store = store();
        let _rx = store.register(&event(1));
        store
            .transition(1, DownloadState::Terminal(TerminalReason::Approved))
            .unwrap();
        assert!(store
            .transition(1, DownloadState::Terminal(TerminalReason::Blocked))
            .is_err());
    }

    #[test]
    fn transition_on_missing_record() {
        let store = store();
        assert_eq!(
            store.transition(9, DownloadState::Scanning),
            Err(TransitionError::NotFound(9))
        );
    }

    #[tokio::test]
    async fn token_grant_delivers_once() {
        let store = store();
        let rx = store.register(&event(1));

        let token = store.take_token(1).unwrap();
        // Second take yields nothing: consume-on-use.
        assert!(store.take_token(1).is_none());

        assert!(token.grant(HookDecision::Allow { file_name: None }));
        assert_eq!(
            rx.await.unwrap(),
            HookDecision::Allow { file_name: None }
        );
    }

    #[tokio::test]
    async fn token_grant_reports_lost_callback() {
        let store = store();
        let rx = store.register(&event(1));
        drop(rx); // Bridge reply timed out.

        let token = store.take_token(1).unwrap();
        assert!(!token.grant(HookDecision::Allow { file_name: None }));
    }

    #[test]
    fn mark_auto_started_fires_once() {
        let store = store();
        let _rx = store.register(&event(1));
        assert!(store.mark_auto_started(1));
        assert!(!store.mark_auto_started(1));
        assert!(store.snapshot(1).unwrap().auto_started);
    }

    #[test]
    fn set_prompt_rejects_second_prompt() {
        let store = store();
        let _rx = store.register(&event(1));
        assert!(store.set_prompt(1, "prompt-a"));
        assert!(!store.set_prompt(1, "prompt-b"));
        assert_eq!(
            store.snapshot(1).unwrap().prompt_id.as_deref(),
            Some("prompt-a")
        );
    }

    #[test]
    fn verdict_is_stored() {
        let store = store();
        let _rx = store.register(&event(1));
        store.set_verdict(1, Verdict::infected(vec!["EICAR".to_string()]));
        assert_eq!(
            store.snapshot(1).unwrap().verdict.unwrap().status,
            VerdictStatus::Infected
        );
    }

    #[test]
    fn scanning_records_start_time() {
        let store = store();
        let _rx = store.register(&event(1));
        assert!(store.snapshot(1).unwrap().scan_started_at.is_none());
        store.transition(1, DownloadState::Scanning).unwrap();
        assert!(store.snapshot(1).unwrap().scan_started_at.is_some());
    }

    #[test]
    fn sweep_terminal_respects_retention() {
        let store = store();
        let _rx = store.register(&event(1));
        let _rx2 = store.register(&event(2));
        store
            .transition(1, DownloadState::Terminal(TerminalReason::Approved))
            .unwrap();

        // Generous retention: nothing to collect yet.
        assert_eq!(store.sweep_terminal(Duration::from_secs(60)), 0);
        // Zero retention: terminal records go, live ones stay.
        assert_eq!(store.sweep_terminal(Duration::ZERO), 1);
        assert_eq!(store.ids(), vec![2]);
    }

    #[test]
    fn journal_records_transitions_in_order() {
        let db = Database::in_memory().unwrap();
        let store = PendingStore::new(Some(db.clone()));
        let _rx = store.register(&event(5));
        store.transition(5, DownloadState::Scanning).unwrap();
        store
            .transition(5, DownloadState::Terminal(TerminalReason::Approved))
            .unwrap();

        let entries = db.transitions_for("dl-5").unwrap();
        let states: Vec<_> = entries.iter().map(|t| t.to_state.as_str()).collect();
        assert_eq!(states, vec!["detected", "scanning", "terminal_approved"]);
        assert!(db.unresolved_keys().unwrap().is_empty());
    }
}
