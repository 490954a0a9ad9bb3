//! Warden Core - shared vocabulary for the protection agent.
//!
//! This crate holds the pieces every other Warden crate builds on:
//!
//! - [`cache`]: the generic expiring key-value store behind every TTL-bound
//!   structure (flagged URLs, reinitiation permits, auto-scan history,
//!   notification dedupe)
//! - [`verdict`]: scan verdicts and threat severity
//! - [`credentials`]: the shared scan-service credential store
//! - [`protection`]: the Active/Paused/Disabled protection toggle
//! - [`urlnorm`] / [`filename`]: URL and filename hygiene
//! - [`events`]: the popup-facing event feed

pub mod cache;
pub mod credentials;
pub mod events;
pub mod filename;
pub mod protection;
pub mod urlnorm;
pub mod verdict;

pub use cache::{ExpiringCache, Sweep};
pub use credentials::{Credential, CredentialStore};
pub use events::{AgentEvent, EventBus, SequencedEvent};
pub use protection::{PauseDuration, ProtectionEvent, ProtectionManager, ProtectionState};
pub use verdict::{ThreatLevel, UnsafeUrlEntry, Verdict, VerdictStatus};
