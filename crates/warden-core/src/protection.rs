//! Protection state management.
//!
//! Controls whether the agent intercepts downloads and navigations at all.
//! When protection is paused or disabled, the pre-start hook answers with an
//! immediate allow and nothing is scanned.
//!
//! ## States
//!
//! - **Active**: downloads and navigations are intercepted (default)
//! - **Paused**: interception temporarily off, auto-resumes after a duration
//! - **Disabled**: interception off until explicitly re-enabled
//!
//! ## Usage
//!
//! ```
//! use warden_core::protection::{ProtectionManager, ProtectionState, PauseDuration};
//!
//! let manager = ProtectionManager::new();
//! assert_eq!(manager.state(), ProtectionState::Active);
//!
//! manager.pause(PauseDuration::Minutes(15));
//! assert!(!manager.is_active());
//!
//! manager.resume();
//! assert!(manager.is_active());
//! ```

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Protection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProtectionState {
    /// Interception is on.
    #[default]
    Active,

    /// Interception is temporarily off and will auto-resume.
    Paused,

    /// Interception is off until re-enabled.
    Disabled,
}

impl ProtectionState {
    /// Returns true if interception is on.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Returns true if downloads and navigations bypass the agent.
    pub fn is_bypassed(&self) -> bool {
        matches!(self, Self::Paused | Self::Disabled)
    }

    /// Returns the state as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Disabled => "disabled",
        }
    }
}

impl std::fmt::Display for ProtectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Duration for which to pause protection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum PauseDuration {
    /// Pause for a number of minutes.
    Minutes(u32),

    /// Pause for a number of hours.
    Hours(u32),

    /// Pause until manually resumed or disabled.
    Indefinite,
}

impl PauseDuration {
    /// Converts to a Duration, or None if indefinite.
    pub fn to_duration(&self) -> Option<Duration> {
        match self {
            Self::Minutes(m) => Some(Duration::from_secs(*m as u64 * 60)),
            Self::Hours(h) => Some(Duration::from_secs(*h as u64 * 60 * 60)),
            Self::Indefinite => None,
        }
    }
}

/// Emitted when the protection state changes, for the popup event feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtectionEvent {
    /// Previous state.
    pub from: ProtectionState,
    /// New state.
    pub to: ProtectionState,
}

#[derive(Debug)]
struct ProtectionData {
    state: ProtectionState,
    pause_start: Option<Instant>,
    pause_duration: Option<Duration>,
}

impl Default for ProtectionData {
    fn default() -> Self {
        Self {
            state: ProtectionState::Active,
            pause_start: None,
            pause_duration: None,
        }
    }
}

impl ProtectionData {
    fn pause_remaining(&self) -> Option<Duration> {
        match (self.state, self.pause_start, self.pause_duration) {
            (ProtectionState::Paused, Some(start), Some(duration)) => {
                let elapsed = start.elapsed();
                if elapsed >= duration {
                    None
                } else {
                    Some(duration - elapsed)
                }
            }
            _ => None,
        }
    }

    fn is_pause_expired(&self) -> bool {
        match (self.state, self.pause_start, self.pause_duration) {
            (ProtectionState::Paused, Some(start), Some(duration)) => start.elapsed() >= duration,
            _ => false,
        }
    }
}

/// Manages the protection toggle.
///
/// Thread-safe and clonable for use across async contexts.
#[derive(Debug, Clone, Default)]
pub struct ProtectionManager {
    data: Arc<RwLock<ProtectionData>>,
}

impl ProtectionManager {
    /// Creates a new manager in the active state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current state, resuming first if a timed pause expired.
    pub fn state(&self) -> ProtectionState {
        let mut data = self.data.write().unwrap();
        if data.is_pause_expired() {
            data.state = ProtectionState::Active;
            data.pause_start = None;
            data.pause_duration = None;
        }
        data.state
    }

    /// Returns true if interception is on.
    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }

    /// Remaining pause time; None if not paused, paused indefinitely, or expired.
    pub fn pause_remaining(&self) -> Option<Duration> {
        self.data.read().unwrap().pause_remaining()
    }

    /// Pauses protection for the given duration.
    pub fn pause(&self, duration: PauseDuration) -> ProtectionEvent {
        let mut data = self.data.write().unwrap();
        let from = data.state;
        data.state = ProtectionState::Paused;
        data.pause_start = Some(Instant::now());
        data.pause_duration = duration.to_duration();
        ProtectionEvent {
            from,
            to: ProtectionState::Paused,
        }
    }

    /// Resumes protection immediately. Returns None if already active.
    pub fn resume(&self) -> Option<ProtectionEvent> {
        let mut data = self.data.write().unwrap();
        if data.state == ProtectionState::Active {
            return None;
        }
        let from = data.state;
        data.state = ProtectionState::Active;
        data.pause_start = None;
        data.pause_duration = None;
        Some(ProtectionEvent {
            from,
            to: ProtectionState::Active,
        })
    }

    /// Disables protection until explicitly resumed. Returns None if already disabled.
    pub fn disable(&self) -> Option<ProtectionEvent> {
        let mut data = self.data.write().unwrap();
        if data.state == ProtectionState::Disabled {
            return None;
        }
        let from = data.state;
        data.state = ProtectionState::Disabled;
        data.pause_start = None;
        data.pause_duration = None;
        Some(ProtectionEvent {
            from,
            to: ProtectionState::Disabled,
        })
    }

    /// Sets the state directly, without event bookkeeping.
    ///
    /// Use only when restoring persisted state at startup.
    pub fn restore(&self, state: ProtectionState) {
        let mut data = self.data.write().unwrap();
        data.state = state;
        data.pause_start = None;
        data.pause_duration = None;
    }
}
