//! Translation of host tab/window mutations into runtime notifications.
//!
//! Ordering the runtime relies on:
//!
//! - a window is announced before any tab in it; tabs reported earlier are
//!   held and announced right after their window,
//! - on activation, tabs leaving the selection are reported first, then the
//!   activation, then the new selection,
//! - one property batch produces at most one change notification,
//! - a closing tab is reported while its adapter still resolves; the adapter
//!   is purged afterwards,
//! - a closing window closes its remaining tabs first.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, trace};
use webext_core::{TabId, WindowId};
use webext_telemetry::{OperationContext, OperationGuard};

use crate::adapter::{AdapterIdentityCache, TabAdapter};
use crate::error::{HostError, HostResult};
use crate::host::{HostModel, TabProperties, TabProperty, TabUpdate};
use crate::runtime::ExtensionRuntime;

/// The state a host notification is applied to.
pub struct SyncContext<'a> {
    /// Owning tab/window model.
    pub host: &'a mut HostModel,
    /// Adapter cache.
    pub adapters: &'a mut AdapterIdentityCache,
    /// Runtime receiving the notifications.
    pub runtime: &'a dyn ExtensionRuntime,
}

impl SyncContext<'_> {
    fn tab_adapter(&mut self, id: TabId) -> Option<Arc<TabAdapter>> {
        self.adapters.tab_adapter(self.host, id)
    }

    fn tab_adapters(&mut self, ids: impl IntoIterator<Item = TabId>) -> Vec<Arc<TabAdapter>> {
        ids.into_iter().filter_map(|id| self.tab_adapter(id)).collect()
    }
}

/// Tracks what the runtime has been told and sequences new notifications.
///
/// A held tab stays held until it closes, its window opens, or the host
/// retires the window id with [`window_retired`](Self::window_retired).
#[derive(Debug, Default)]
pub struct EventSynchronizer {
    announced_windows: HashSet<WindowId>,
    announced_tabs: HashSet<TabId>,
    held: HashMap<WindowId, Vec<TabId>>,
}

impl EventSynchronizer {
    /// Nothing announced yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the runtime was told about `window`.
    #[must_use]
    pub fn is_window_announced(&self, window: WindowId) -> bool {
        self.announced_windows.contains(&window)
    }

    /// Whether the runtime was told about `tab`.
    #[must_use]
    pub fn is_tab_announced(&self, tab: TabId) -> bool {
        self.announced_tabs.contains(&tab)
    }

    /// Tabs waiting for their window to be announced.
    #[must_use]
    pub fn held_tabs(&self, window: WindowId) -> &[TabId] {
        self.held.get(&window).map_or(&[], Vec::as_slice)
    }

    // -----------------------------------------------------------------------
    // Windows
    // -----------------------------------------------------------------------

    /// A window opened. Announces it, then any tabs held for it, then focus.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::DuplicateWindow`] if the window is already open.
    pub fn window_opened(
        &mut self,
        cx: &mut SyncContext<'_>,
        id: WindowId,
        focused: bool,
    ) -> HostResult<()> {
        cx.host.open_window(id)?;
        let window = cx
            .adapters
            .window_adapter(cx.host, id)
            .ok_or(HostError::UnknownWindow(id))?;
        debug!(window_id = %id, "Window opened");
        cx.runtime.did_open_window(cx.host, &window);
        self.announced_windows.insert(id);

        for tab in self.held.remove(&id).unwrap_or_default() {
            if let Some(adapter) = cx.tab_adapter(tab) {
                trace!(tab_id = %tab, window_id = %id, "Announcing held tab");
                cx.runtime.did_open_tab(cx.host, &adapter, &window);
                self.announced_tabs.insert(tab);
            }
        }

        if focused {
            self.window_focused(cx, Some(id))?;
        }
        Ok(())
    }

    /// A window closed. Its remaining tabs are closed first.
    ///
    /// Returns the tabs closed by the cascade.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::UnknownWindow`] if the window is not open.
    pub fn window_closed(
        &mut self,
        cx: &mut SyncContext<'_>,
        id: WindowId,
    ) -> HostResult<Vec<TabId>> {
        if cx.host.window(id).is_none() {
            return Err(HostError::UnknownWindow(id));
        }
        let _guard = OperationGuard::new(OperationContext::new("window_close"));

        let tabs = cx.host.tabs_in(id);
        for tab in &tabs {
            self.close_tab(cx, *tab, true)?;
        }

        if self.announced_windows.remove(&id)
            && let Some(window) = cx.adapters.window_adapter(cx.host, id)
        {
            cx.runtime.did_close_window(cx.host, &window);
        }
        cx.adapters.on_window_closed(id);
        cx.host.close_window(id)?;
        self.held.remove(&id);
        debug!(window_id = %id, tabs = tabs.len(), "Window closed");
        Ok(tabs)
    }

    /// The host will never open `id`. Tabs reported for it are closed
    /// without ever reaching the runtime. An open window is closed instead.
    ///
    /// Returns the tabs closed.
    ///
    /// # Errors
    ///
    /// Propagates host errors from closing an open window.
    pub fn window_retired(
        &mut self,
        cx: &mut SyncContext<'_>,
        id: WindowId,
    ) -> HostResult<Vec<TabId>> {
        if cx.host.window(id).is_some() {
            return self.window_closed(cx, id);
        }
        let tabs = cx.host.tabs_in(id);
        for tab in &tabs {
            self.close_tab(cx, *tab, true)?;
        }
        self.held.remove(&id);
        debug!(window_id = %id, dropped = tabs.len(), "Unopened window retired");
        Ok(tabs)
    }

    /// The focused window changed. Notifies only on an actual change.
    ///
    /// Returns whether focus changed.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::UnknownWindow`] if `id` is not open.
    pub fn window_focused(
        &mut self,
        cx: &mut SyncContext<'_>,
        id: Option<WindowId>,
    ) -> HostResult<bool> {
        if !cx.host.set_focused(id)? {
            return Ok(false);
        }
        match id {
            Some(id) if self.announced_windows.contains(&id) => {
                let window = cx.adapters.window_adapter(cx.host, id);
                trace!(window_id = %id, "Window focused");
                cx.runtime.did_focus_window(cx.host, window.as_ref());
            },
            Some(_) => {},
            None => cx.runtime.did_focus_window(cx.host, None),
        }
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Tabs
    // -----------------------------------------------------------------------

    /// A tab opened. Announced at once if its window is, held otherwise.
    ///
    /// Returns whether the tab was announced.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::DuplicateTab`] if the tab is already open.
    pub fn tab_opened(
        &mut self,
        cx: &mut SyncContext<'_>,
        id: TabId,
        window: WindowId,
        properties: TabProperties,
    ) -> HostResult<bool> {
        cx.host.open_tab(id, window, properties)?;
        if !self.announced_windows.contains(&window) {
            debug!(tab_id = %id, window_id = %window, "Holding tab until its window opens");
            self.held.entry(window).or_default().push(id);
            return Ok(false);
        }

        let Some(window_adapter) = cx.adapters.window_adapter(cx.host, window) else {
            return Err(HostError::UnknownWindow(window));
        };
        let Some(adapter) = cx.tab_adapter(id) else {
            return Err(HostError::UnknownTab(id));
        };
        debug!(tab_id = %id, window_id = %window, "Tab opened");
        cx.runtime.did_open_tab(cx.host, &adapter, &window_adapter);
        self.announced_tabs.insert(id);
        Ok(true)
    }

    /// A tab closed.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::UnknownTab`] if the tab is not open.
    pub fn tab_closed(&mut self, cx: &mut SyncContext<'_>, id: TabId) -> HostResult<()> {
        self.close_tab(cx, id, false)
    }

    fn close_tab(
        &mut self,
        cx: &mut SyncContext<'_>,
        id: TabId,
        window_closing: bool,
    ) -> HostResult<()> {
        let window = cx.host.tab(id).ok_or(HostError::UnknownTab(id))?.window;
        if self.announced_tabs.remove(&id)
            && let Some(adapter) = cx.tab_adapter(id)
        {
            cx.runtime.did_close_tab(cx.host, &adapter, window_closing);
        }
        cx.adapters.on_tab_closed(id);
        cx.host.close_tab(id)?;
        if let Some(held) = self.held.get_mut(&window) {
            held.retain(|t| *t != id);
        }
        debug!(tab_id = %id, window_closing, "Tab closed");
        Ok(())
    }

    /// A tab became active in its window. The selection collapses to it.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::UnknownTab`] or [`HostError::UnknownWindow`].
    pub fn tab_activated(&mut self, cx: &mut SyncContext<'_>, id: TabId) -> HostResult<()> {
        let (previous, previous_selection) = cx.host.activate_tab(id)?;
        if previous == Some(id) && previous_selection == BTreeSet::from([id]) {
            return Ok(());
        }
        if !self.announced_tabs.contains(&id) {
            trace!(tab_id = %id, "Activation of unannounced tab applied to model only");
            return Ok(());
        }

        let deselected = self.announced(previous_selection.into_iter().filter(|t| *t != id));
        if !deselected.is_empty() {
            let tabs = cx.tab_adapters(deselected);
            cx.runtime.did_deselect_tabs(cx.host, &tabs);
        }

        let previous = previous
            .filter(|p| *p != id && self.announced_tabs.contains(p))
            .and_then(|p| cx.tab_adapter(p));
        let Some(adapter) = cx.tab_adapter(id) else {
            return Err(HostError::UnknownTab(id));
        };
        debug!(tab_id = %id, previous = ?previous.as_ref().map(|p| p.id()), "Tab activated");
        cx.runtime
            .did_activate_tab(cx.host, &adapter, previous.as_ref());
        cx.runtime
            .did_select_tabs(cx.host, std::slice::from_ref(&adapter));
        Ok(())
    }

    /// The selection of `window` changed. The active tab stays selected.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] if the window or a tab is unknown, or a tab
    /// belongs to another window.
    pub fn tabs_selected(
        &mut self,
        cx: &mut SyncContext<'_>,
        window: WindowId,
        tabs: &[TabId],
    ) -> HostResult<()> {
        let previous = cx.host.select_tabs(window, tabs)?;
        let current = cx
            .host
            .window(window)
            .map(|w| w.selected.clone())
            .unwrap_or_default();
        if previous == current || !self.announced_windows.contains(&window) {
            return Ok(());
        }

        let deselected = self.announced(previous.difference(&current).copied());
        if !deselected.is_empty() {
            let adapters = cx.tab_adapters(deselected);
            cx.runtime.did_deselect_tabs(cx.host, &adapters);
        }
        let selected = self.announced(current.iter().copied());
        let adapters = cx.tab_adapters(selected);
        trace!(window_id = %window, selected = adapters.len(), "Selection changed");
        cx.runtime.did_select_tabs(cx.host, &adapters);
        Ok(())
    }

    /// One batch of property changes. Returns the properties that actually
    /// changed; the runtime hears about them in one notification.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::UnknownTab`] if the tab is not open.
    pub fn tab_updated(
        &mut self,
        cx: &mut SyncContext<'_>,
        id: TabId,
        update: TabUpdate,
    ) -> HostResult<BTreeSet<TabProperty>> {
        let changed = cx.host.update_tab(id, update)?;
        if changed.is_empty() || !self.announced_tabs.contains(&id) {
            return Ok(changed);
        }
        if let Some(adapter) = cx.tab_adapter(id) {
            trace!(tab_id = %id, changed = ?changed, "Tab properties changed");
            cx.runtime
                .did_change_tab_properties(cx.host, &adapter, &changed);
        }
        Ok(changed)
    }

    fn announced(&self, tabs: impl IntoIterator<Item = TabId>) -> Vec<TabId> {
        tabs.into_iter()
            .filter(|t| self.announced_tabs.contains(t))
            .collect()
    }
}

#[cfg(test)]
#[path = "sync_tests.rs"]
mod tests;
