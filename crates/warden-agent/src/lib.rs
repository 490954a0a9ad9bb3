//! Warden Agent - the background coordinator.
//!
//! This crate is the heart of Warden: it synchronizes the host's
//! partially-reliable download and navigation callbacks into one consistent
//! decision per action, guaranteeing that
//!
//! - the "allow" callback (or its reinitiation equivalent) fires at most
//!   once per download — enforced by a consume-on-use token type
//! - nothing unscanned slips through the host's own decision deadline —
//!   the created hook cancels anything the agent never approved
//! - unsafe verdicts never proceed without an explicit user Allow
//!
//! ## Architecture
//!
//! ```text
//! pre-start hook ──► DownloadInterceptor ──► ScanCoordinator ──► verdict
//!                         │    ▲                                   │
//!     created hook ───────┘    └── ReinitiationManager ◄── ApprovalGate
//!                                        (permit)            (user)
//!
//! navigation commit ──► NavigationGuard ──► auto-scan / unsafe-URL block
//! ```
//!
//! All shared state lives in TTL caches and the typed pending-download
//! store; the [`janitor`] sweeps both on a fixed interval.

pub mod agent;
pub mod approval;
pub mod blocks;
pub mod commands;
pub mod hooks;
mod ids;
pub mod interceptor;
pub mod janitor;
pub mod navguard;
pub mod notify;
pub mod pending;
pub mod reinitiate;
pub mod tabs;

#[cfg(test)]
pub(crate) mod testutil;

pub use agent::{AgentStatus, Warden, WardenConfig};
pub use approval::{ApprovalGate, PromptAction, PromptKind};
pub use commands::{CommandQueue, HostCommand, NotificationSpec};
pub use hooks::{
    ChangedEvent, CreatedAction, CreatedEvent, DownloadChange, DownloadId, HookDecision,
    NavigationEvent, PreStartEvent, PreStartReply, TabId,
};
pub use janitor::{Janitor, JanitorReport, SWEEP_INTERVAL};
pub use navguard::NavigationGuard;
pub use pending::{ApprovalToken, DownloadSnapshot, DownloadState, PendingStore, TerminalReason};
pub use reinitiate::{ReinitiationManager, PERMIT_TTL};
