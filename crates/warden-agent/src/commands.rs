//! Host command queue.
//!
//! Actions the agent needs the host to perform (start a reinitiated
//! download, pause one that could not be cancelled, redirect a tab, show or
//! clear a notification) are queued here and drained by the extension over
//! the bridge.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::hooks::{DownloadId, TabId};

/// A user-facing notification the host should render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSpec {
    /// Correlation id; responses come back through the prompts endpoint.
    pub id: String,
    pub title: String,
    pub message: String,
    /// Action button labels; empty for plain notices.
    #[serde(default)]
    pub actions: Vec<String>,
}

/// One queued host action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum HostCommand {
    #[serde(rename_all = "camelCase")]
    StartDownload { url: String, file_name: String },
    #[serde(rename_all = "camelCase")]
    CancelDownload { id: DownloadId },
    #[serde(rename_all = "camelCase")]
    PauseDownload { id: DownloadId },
    #[serde(rename_all = "camelCase")]
    UpdateTab { tab_id: TabId, url: String },
    Notify { notification: NotificationSpec },
    #[serde(rename_all = "camelCase")]
    ClearNotification { id: String },
}

/// FIFO queue of host commands.
#[derive(Debug, Clone, Default)]
pub struct CommandQueue {
    inner: Arc<Mutex<VecDeque<HostCommand>>>,
}

impl CommandQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a command.
    pub fn push(&self, command: HostCommand) {
        self.inner.lock().push_back(command);
    }

    /// Removes and returns every queued command, oldest first.
    pub fn drain(&self) -> Vec<HostCommand> {
        self.inner.lock().drain(..).collect()
    }

    /// Number of queued commands.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
