//! Agent event feed for the popup UI.
//!
//! Components publish [`AgentEvent`]s; the popup either subscribes live or
//! replays from a sequence number after reconnecting. The replay ring is
//! bounded, so a popup that was closed for a long time simply starts from
//! the oldest retained event.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::protection::ProtectionState;
use crate::verdict::VerdictStatus;

/// Number of events retained for replay.
const REPLAY_CAPACITY: usize = 256;

/// Broadcast channel capacity for live subscribers.
const CHANNEL_CAPACITY: usize = 64;

/// Structured notifications delivered to the popup layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AgentEvent {
    /// The stored scan-service credential was set or cleared.
    #[serde(rename = "AUTH_CHANGED")]
    AuthChanged { signed_in: bool },

    /// The protection toggle moved.
    #[serde(rename = "PROTECTION_STATE_CHANGED")]
    ProtectionStateChanged { state: ProtectionState },

    /// A page or download scan finished.
    #[serde(rename = "SCAN_COMPLETE")]
    ScanComplete { url: String, status: VerdictStatus },

    /// The local scan-event log was cleared.
    #[serde(rename = "LOGS_CLEARED")]
    LogsCleared,
}

/// An event with its position in the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencedEvent {
    /// Monotonically increasing sequence number, starting at 1.
    pub seq: u64,
    #[serde(flatten)]
    pub event: AgentEvent,
}

#[derive(Debug)]
struct Ring {
    next_seq: u64,
    buf: VecDeque<SequencedEvent>,
}

/// Publish/subscribe event bus with bounded replay.
#[derive(Debug, Clone)]
pub struct EventBus {
    ring: Arc<RwLock<Ring>>,
    tx: broadcast::Sender<SequencedEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            ring: Arc::new(RwLock::new(Ring {
                next_seq: 1,
                buf: VecDeque::with_capacity(REPLAY_CAPACITY),
            })),
            tx,
        }
    }

    /// Publishes an event, returning its sequence number.
    pub fn publish(&self, event: AgentEvent) -> u64 {
        let sequenced = {
            let mut ring = self.ring.write().unwrap();
            let seq = ring.next_seq;
            ring.next_seq += 1;
            let sequenced = SequencedEvent { seq, event };
            if ring.buf.len() == REPLAY_CAPACITY {
                ring.buf.pop_front();
            }
            ring.buf.push_back(sequenced.clone());
            sequenced
        };

        tracing::debug!(seq = sequenced.seq, event = ?sequenced.event, "Publishing agent event");
        // Send fails when no popup is listening, which is the common case.
        let _ = self.tx.send(sequenced.clone());
        sequenced.seq
    }

    /// Subscribes to live events.
    pub fn subscribe(&self) -> broadcast::Receiver<SequencedEvent> {
        self.tx.subscribe()
    }

    /// Returns retained events with a sequence number greater than `seq`.
    pub fn since(&self, seq: u64) -> Vec<SequencedEvent> {
        let ring = self.ring.read().unwrap();
        ring.buf.iter().filter(|e| e.seq > seq).cloned().collect()
    }

    /// The most recently assigned sequence number, 0 if none.
    pub fn latest_seq(&self) -> u64 {
        self.ring.read().unwrap().next_seq - 1
    }
}
