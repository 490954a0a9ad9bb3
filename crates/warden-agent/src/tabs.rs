//! Live-tab registry.
//!
//! Fed by committed navigations and tab-removed events from the host; the
//! janitor reconciles pending navigation blocks against it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::hooks::TabId;

/// Last-known URL per live tab.
#[derive(Debug, Clone, Default)]
pub struct TabRegistry {
    inner: Arc<RwLock<HashMap<TabId, String>>>,
}

impl TabRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a committed navigation.
    pub fn record_navigation(&self, tab_id: TabId, url: &str) {
        self.inner.write().insert(tab_id, url.to_string());
    }

    /// Drops a closed tab.
    pub fn remove(&self, tab_id: TabId) {
        self.inner.write().remove(&tab_id);
    }

    /// Returns true if the tab is known to exist.
    pub fn exists(&self, tab_id: TabId) -> bool {
        self.inner.read().contains_key(&tab_id)
    }

    /// Last committed URL of a tab.
    pub fn url_of(&self, tab_id: TabId) -> Option<String> {
        self.inner.read().get(&tab_id).cloned()
    }

    /// Number of known tabs.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Returns true if no tabs are known.
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
