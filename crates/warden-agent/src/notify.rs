//! User notices with result deduplication.
//!
//! Interactive prompts go through the approval gate; this module handles
//! the one-way notices (sign-in required, reinitiation failed, scan
//! results). Repeat results inside the dedupe window are dropped so a
//! flapping page does not spam the user.

use std::time::Duration;

use tracing::debug;

use warden_core::cache::ExpiringCache;

use crate::commands::{CommandQueue, HostCommand, NotificationSpec};
use crate::ids;

/// Window during which an identical result is not re-announced.
pub const DEDUPE_TTL: Duration = Duration::from_secs(10 * 60);

/// Delivery errors.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The host notification could not be created.
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// Queue-backed notice dispatcher.
#[derive(Debug, Clone)]
pub struct Notifier {
    queue: CommandQueue,
    seen: ExpiringCache<String, ()>,
    #[cfg(test)]
    fail_next: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

impl Notifier {
    /// Creates a notifier delivering through the given command queue.
    pub fn new(queue: CommandQueue) -> Self {
        Self {
            queue,
            seen: ExpiringCache::new("notified-results", DEDUPE_TTL),
            #[cfg(test)]
            fail_next: std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false)),
        }
    }

    /// The dedupe cache, for janitor registration.
    pub fn dedupe_cache(&self) -> ExpiringCache<String, ()> {
        self.seen.clone()
    }

    /// Delivers an interactive prompt. The caller owns correlation.
    pub fn deliver_prompt(&self, spec: NotificationSpec) -> Result<(), NotifyError> {
        self.check_injected_failure()?;
        self.show_desktop_toast(&spec);
        self.queue.push(HostCommand::Notify { notification: spec });
        Ok(())
    }

    /// Shows a plain notice (no actions), without deduplication.
    pub fn notice(&self, title: &str, message: &str) {
        let spec = NotificationSpec {
            id: ids::generate("notice"),
            title: title.to_string(),
            message: message.to_string(),
            actions: Vec::new(),
        };
        self.show_desktop_toast(&spec);
        self.queue.push(HostCommand::Notify { notification: spec });
    }

    /// Shows a notice at most once per dedupe window for the given key.
    ///
    /// Returns true if the notice was sent, false if deduplicated.
    pub fn notice_once(&self, key: &str, title: &str, message: &str) -> bool {
        if self.seen.contains(&key.to_string()) {
            debug!(key, "Notice suppressed by dedupe window");
            return false;
        }
        self.seen.insert(key.to_string(), ());
        self.notice(title, message);
        true
    }

    /// Asks the host to remove a notification.
    pub fn clear(&self, id: &str) {
        self.queue.push(HostCommand::ClearNotification {
            id: id.to_string(),
        });
    }

    #[cfg(feature = "desktop-notices")]
    fn show_desktop_toast(&self, spec: &NotificationSpec) {
        // Best effort; the host notification command is the reliable path.
        if let Err(e) = notify_rust::Notification::new()
            .summary(&spec.title)
            .body(&spec.message)
            .appname("Warden")
            .timeout(notify_rust::Timeout::Milliseconds(5000))
            .show()
        {
            debug!(error = %e, "Desktop toast failed");
        }
    }

    #[cfg(not(feature = "desktop-notices"))]
    fn show_desktop_toast(&self, _spec: &NotificationSpec) {}

    #[cfg(test)]
    fn check_injected_failure(&self) -> Result<(), NotifyError> {
        use std::sync::atomic::Ordering;
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(NotifyError::Delivery("injected failure".to_string()));
        }
        Ok(())
    }

    #[cfg(not(test))]
    fn check_injected_failure(&self) -> Result<(), NotifyError> {
        Ok(())
    }

    /// Makes the next prompt delivery fail, to exercise the conservative
    /// fallback paths.
    #[cfg(test)]
    pub fn fail_next_delivery(&self) {
        self.fail_next
            .store(true, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notifier() -> (Notifier, CommandQueue) {
        let queue = CommandQueue::new();
        (Notifier::new(queue.clone()), queue)
    }

    fn notify_count(queue: &CommandQueue) -> usize {
        queue
            .drain()
            .into_iter()
            .filter(|c| matches!(c, HostCommand::Notify { .. }))
            .count()
    }

    #[test]
    fn notice_queues_host_notification() {
        let (notifier, queue) = notifier();
        notifier.notice("Title", "Message");
        let commands = queue.drain();
        assert_eq!(commands.len(), 1);
        match &commands[0] {
            HostCommand::Notify { notification } => {
                assert_eq!(notification.title, "Title");
                assert!(notification.actions.is_empty());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn notice_once_deduplicates_within_window() {
        let (notifier, queue) = notifier();
        assert!(notifier.notice_once("k", "Title", "Message"));
        assert!(!notifier.notice_once("k", "Title", "Message"));
        assert_eq!(notify_count(&queue), 1);

        // A different key is independent.
        assert!(notifier.notice_once("other", "Title", "Message"));
    }

    #[test]
    fn deliver_prompt_queues_spec() {
        let (notifier, queue) = notifier();
        notifier
            .deliver_prompt(NotificationSpec {
                id: "p-1".to_string(),
                title: "Allow?".to_string(),
                message: "f.exe".to_string(),
                actions: vec!["Allow".to_string(), "Block".to_string()],
            })
            .unwrap();
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn injected_failure_surfaces_error() {
        let (notifier, queue) = notifier();
        notifier.fail_next_delivery();
        let result = notifier.deliver_prompt(NotificationSpec {
            id: "p-1".to_string(),
            title: "Allow?".to_string(),
            message: "f.exe".to_string(),
            actions: vec![],
        });
        assert!(result.is_err());
        assert!(queue.is_empty());

        // Only the next delivery fails.
        assert!(notifier
            .deliver_prompt(NotificationSpec {
                id: "p-2".to_string(),
                title: "Allow?".to_string(),
                message: "f.exe".to_string(),
                actions: vec![],
            })
            .is_ok());
    }

    #[test]
    fn clear_queues_removal() {
        let (notifier, queue) = notifier();
        notifier.clear("p-1");
        assert_eq!(
            queue.drain(),
            vec![HostCommand::ClearNotification {
                id: "p-1".to_string()
            }]
        );
    }
}
