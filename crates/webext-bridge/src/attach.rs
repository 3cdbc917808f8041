//! Tracking of extension page contexts that are ready in each tab.
//!
//! The compatibility shim can only reach a tab whose extension content
//! context is already running. The host reports readiness; navigation,
//! tab close and uninstall clear it.

use std::collections::{BTreeSet, HashMap};

use webext_core::{ExtensionId, TabId};

/// Which extensions have a live page context in which tabs.
#[derive(Debug, Default)]
pub struct PageAttachments {
    tabs: HashMap<TabId, BTreeSet<ExtensionId>>,
}

impl PageAttachments {
    /// No attachments.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `extension_id` has a page context in `tab`.
    pub fn attach(&mut self, tab: TabId, extension_id: ExtensionId) -> bool {
        self.tabs.entry(tab).or_default().insert(extension_id)
    }

    /// Whether `extension_id` has a page context in `tab`.
    #[must_use]
    pub fn is_attached(&self, tab: TabId, extension_id: &ExtensionId) -> bool {
        self.tabs
            .get(&tab)
            .is_some_and(|extensions| extensions.contains(extension_id))
    }

    /// Drop every attachment of `tab`. Returns how many were dropped.
    pub fn detach_tab(&mut self, tab: TabId) -> usize {
        self.tabs.remove(&tab).map_or(0, |extensions| extensions.len())
    }

    /// Drop every attachment of `extension_id`. Returns how many were dropped.
    pub fn detach_extension(&mut self, extension_id: &ExtensionId) -> usize {
        let mut dropped: usize = 0;
        self.tabs.retain(|_, extensions| {
            if extensions.remove(extension_id) {
                dropped = dropped.saturating_add(1);
            }
            !extensions.is_empty()
        });
        dropped
    }
}
