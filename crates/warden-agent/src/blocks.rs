//! Pending navigation blocks.
//!
//! A tab parked on the placeholder page while its unsafe-URL prompt is open
//! has an entry here. The janitor reconciles entries against the live-tab
//! registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;

use crate::hooks::TabId;

/// One blocked navigation awaiting the user's response.
#[derive(Debug, Clone)]
pub struct NavBlock {
    /// The URL the user tried to reach.
    pub url: String,
    /// The correlated prompt, if one was delivered.
    pub prompt_id: Option<String>,
    pub inserted_at: Instant,
}

/// Tab-keyed table of pending navigation blocks.
#[derive(Debug, Clone, Default)]
pub struct NavBlocks {
    inner: Arc<RwLock<HashMap<TabId, NavBlock>>>,
}

impl NavBlocks {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the block for a tab.
    pub fn insert(&self, tab_id: TabId, url: &str, prompt_id: Option<String>) {
        self.inner.write().insert(
            tab_id,
            NavBlock {
                url: url.to_string(),
                prompt_id,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Removes and returns the block for a tab.
    pub fn remove(&self, tab_id: TabId) -> Option<NavBlock> {
        self.inner.write().remove(&tab_id)
    }

    /// Returns a copy of the block for a tab.
    pub fn get(&self, tab_id: TabId) -> Option<NavBlock> {
        self.inner.read().get(&tab_id).cloned()
    }

    /// All blocked tab ids.
    pub fn tabs(&self) -> Vec<TabId> {
        self.inner.read().keys().copied().collect()
    }

    /// Number of pending blocks.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Returns true if no blocks are pending.
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_remove() {
        let blocks = NavBlocks::new();
        blocks.insert(3, "https://bad.example/", Some("p-1".to_string()));
        assert_eq!(blocks.len(), 1);

        let block = blocks.get(3).unwrap();
        assert_eq!(block.url, "https://bad.example/");
        assert_eq!(block.prompt_id.as_deref(), Some("p-1"));

        let removed = blocks.remove(3).unwrap();
        assert_eq!(removed.url, "https://bad.example/");
        assert!(blocks.is_empty());
        assert!(blocks.remove(3).is_none());
    }

    #[test]
    fn insert_replaces_existing_block() {
        let blocks = NavBlocks::new();
        blocks.insert(3, "https://first.example/", None);
        blocks.insert(3, "https://second.example/", None);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks.get(3).unwrap().url, "https://second.example/");
    }
}
