//! Stable tab and window adapters.
//!
//! The runtime holds adapters as long-lived handles, so the cache hands out
//! exactly one [`Arc`] per open id. An adapter stores its id and the
//! generation of the entity it was created for, and resolves through the
//! [`HostModel`] on every access. Once the entity closes, or its id is reused
//! by a newer entity, resolution returns `None`.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{trace, warn};
use webext_core::{TabId, WindowId};

use crate::host::{Generation, HostModel, TabState, WindowState};

/// The runtime-facing handle for one logical tab.
#[derive(Debug, PartialEq, Eq)]
pub struct TabAdapter {
    id: TabId,
    generation: Generation,
}

impl TabAdapter {
    /// Tab id.
    #[must_use]
    pub fn id(&self) -> TabId {
        self.id
    }

    /// Generation of the tab this adapter was created for.
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// The live tab, or `None` if it closed or the id now names another tab.
    #[must_use]
    pub fn resolve<'h>(&self, host: &'h HostModel) -> Option<&'h TabState> {
        host.tab(self.id).filter(|t| t.generation == self.generation)
    }

    /// Whether the tab is still open.
    #[must_use]
    pub fn is_live(&self, host: &HostModel) -> bool {
        self.resolve(host).is_some()
    }
}

/// The runtime-facing handle for one logical window.
#[derive(Debug, PartialEq, Eq)]
pub struct WindowAdapter {
    id: WindowId,
    generation: Generation,
}

impl WindowAdapter {
    /// Window id.
    #[must_use]
    pub fn id(&self) -> WindowId {
        self.id
    }

    /// Generation of the window this adapter was created for.
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// The live window, or `None` if it closed or the id now names another
    /// window.
    #[must_use]
    pub fn resolve<'h>(&self, host: &'h HostModel) -> Option<&'h WindowState> {
        host.window(self.id)
            .filter(|w| w.generation == self.generation)
    }

    /// Whether the window is still open.
    #[must_use]
    pub fn is_live(&self, host: &HostModel) -> bool {
        self.resolve(host).is_some()
    }
}

/// Id-keyed cache of adapters.
///
/// Creating an adapter never touches the host model. Entries are removed
/// only by [`on_tab_closed`](Self::on_tab_closed) and
/// [`on_window_closed`](Self::on_window_closed).
#[derive(Debug, Default)]
pub struct AdapterIdentityCache {
    tabs: HashMap<TabId, Arc<TabAdapter>>,
    windows: HashMap<WindowId, Arc<WindowAdapter>>,
}

impl AdapterIdentityCache {
    /// An empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The adapter for an open tab, created on first use.
    ///
    /// Returns `None` if the tab is not open.
    pub fn tab_adapter(&mut self, host: &HostModel, id: TabId) -> Option<Arc<TabAdapter>> {
        let tab = host.tab(id)?;
        if let Some(existing) = self.tabs.get(&id)
            && existing.generation == tab.generation
        {
            return Some(Arc::clone(existing));
        }
        // An entry for an older generation means the close notification was
        // missed; the stale adapter must not be handed out again.
        let adapter = Arc::new(TabAdapter {
            id,
            generation: tab.generation,
        });
        if let Some(stale) = self.tabs.insert(id, Arc::clone(&adapter)) {
            warn!(tab_id = %id, stale = %stale.generation, "Replacing stale tab adapter");
        } else {
            trace!(tab_id = %id, generation = %tab.generation, "Tab adapter created");
        }
        Some(adapter)
    }

    /// The adapter for an open window, created on first use.
    ///
    /// Returns `None` if the window is not open.
    pub fn window_adapter(
        &mut self,
        host: &HostModel,
        id: WindowId,
    ) -> Option<Arc<WindowAdapter>> {
        let window = host.window(id)?;
        if let Some(existing) = self.windows.get(&id)
            && existing.generation == window.generation
        {
            return Some(Arc::clone(existing));
        }
        let adapter = Arc::new(WindowAdapter {
            id,
            generation: window.generation,
        });
        if let Some(stale) = self.windows.insert(id, Arc::clone(&adapter)) {
            warn!(window_id = %id, stale = %stale.generation, "Replacing stale window adapter");
        } else {
            trace!(window_id = %id, generation = %window.generation, "Window adapter created");
        }
        Some(adapter)
    }

    /// The cached tab adapter, without creating one.
    #[must_use]
    pub fn existing_tab(&self, id: TabId) -> Option<Arc<TabAdapter>> {
        self.tabs.get(&id).cloned()
    }

    /// The cached window adapter, without creating one.
    #[must_use]
    pub fn existing_window(&self, id: WindowId) -> Option<Arc<WindowAdapter>> {
        self.windows.get(&id).cloned()
    }

    /// Purge the entry for a closed tab. Returns the purged adapter.
    pub fn on_tab_closed(&mut self, id: TabId) -> Option<Arc<TabAdapter>> {
        let purged = self.tabs.remove(&id);
        if purged.is_some() {
            trace!(tab_id = %id, "Tab adapter purged");
        }
        purged
    }

    /// Purge the entry for a closed window. Returns the purged adapter.
    pub fn on_window_closed(&mut self, id: WindowId) -> Option<Arc<WindowAdapter>> {
        let purged = self.windows.remove(&id);
        if purged.is_some() {
            trace!(window_id = %id, "Window adapter purged");
        }
        purged
    }

    /// Number of cached tab adapters.
    #[must_use]
    pub fn tab_count(&self) -> usize {
        self.tabs.len()
    }

    /// Number of cached window adapters.
    #[must_use]
    pub fn window_count(&self) -> usize {
        self.windows.len()
    }
}
