//! Shared application state for the bridge server.

use std::time::Duration;

use warden_agent::Warden;

/// How long a withheld pre-start decision is awaited before answering
/// "none". Kept under the host's own deadline so the extension always gets
/// an answer it can act on.
pub const DEFAULT_DECISION_WAIT: Duration = Duration::from_secs(4);

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    /// The agent all hooks are forwarded to.
    pub agent: Warden,
    /// Bridge deadline for withheld pre-start decisions.
    pub decision_wait: Duration,
}

impl AppState {
    /// Creates state with the default decision wait.
    pub fn new(agent: Warden) -> Self {
        Self {
            agent,
            decision_wait: DEFAULT_DECISION_WAIT,
        }
    }

    /// Overrides the decision wait.
    pub fn with_decision_wait(mut self, decision_wait: Duration) -> Self {
        self.decision_wait = decision_wait;
        self
    }
}
