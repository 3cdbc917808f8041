//! The owning model of logical tabs and windows.
//!
//! Every tab and window entry carries a generation number assigned when it
//! is opened. Generations never repeat, so an adapter that remembers
//! `(id, generation)` can tell the entity it was created for apart from a
//! later entity that reuses the id.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;
use webext_core::{TabId, WindowId};

use crate::error::{HostError, HostResult};

/// Monotonic entity generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Generation(u64);

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// Page load state of a tab.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    /// A navigation is in progress.
    Loading,
    /// The page finished loading.
    #[default]
    Complete,
}

/// A tab property the runtime can be told about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TabProperty {
    /// Document title.
    Title,
    /// Committed URL.
    Url,
    /// Pinned flag.
    Pinned,
    /// Load state.
    LoadState,
}

/// Initial properties of a newly opened tab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabProperties {
    /// Document title.
    pub title: String,
    /// Committed URL (`about:blank` before the first navigation).
    pub url: Url,
    /// Pinned flag.
    pub pinned: bool,
    /// Load state.
    pub load_state: LoadState,
}

impl TabProperties {
    /// Properties of a tab showing `url`.
    #[must_use]
    pub fn at(url: Url) -> Self {
        Self {
            url,
            ..Self::default()
        }
    }
}

impl Default for TabProperties {
    fn default() -> Self {
        Self {
            title: String::new(),
            url: blank_url(),
            pinned: false,
            load_state: LoadState::Complete,
        }
    }
}

fn blank_url() -> Url {
    Url::parse("about:blank").unwrap_or_else(|_| unreachable!("about:blank is a valid URL"))
}

/// One batch of property mutations reported by the host.
///
/// Fields left `None` are unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TabUpdate {
    /// New title.
    pub title: Option<String>,
    /// New committed URL.
    pub url: Option<Url>,
    /// New pinned flag.
    pub pinned: Option<bool>,
    /// New load state.
    pub load_state: Option<LoadState>,
}

impl TabUpdate {
    /// An empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the title.
    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the URL.
    #[must_use]
    pub fn url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }

    /// Set the pinned flag.
    #[must_use]
    pub fn pinned(mut self, pinned: bool) -> Self {
        self.pinned = Some(pinned);
        self
    }

    /// Set the load state.
    #[must_use]
    pub fn load_state(mut self, state: LoadState) -> Self {
        self.load_state = Some(state);
        self
    }
}

/// A logical tab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabState {
    /// Tab id.
    pub id: TabId,
    /// Owning window.
    pub window: WindowId,
    /// Generation assigned at open.
    pub generation: Generation,
    /// Document title.
    pub title: String,
    /// Committed URL.
    pub url: Url,
    /// Pinned flag.
    pub pinned: bool,
    /// Load state.
    pub load_state: LoadState,
}

impl TabState {
    fn apply(&mut self, update: TabUpdate) -> BTreeSet<TabProperty> {
        let mut changed = BTreeSet::new();
        if let Some(title) = update.title
            && title != self.title
        {
            self.title = title;
            changed.insert(TabProperty::Title);
        }
        if let Some(url) = update.url
            && url != self.url
        {
            self.url = url;
            changed.insert(TabProperty::Url);
        }
        if let Some(pinned) = update.pinned
            && pinned != self.pinned
        {
            self.pinned = pinned;
            changed.insert(TabProperty::Pinned);
        }
        if let Some(state) = update.load_state
            && state != self.load_state
        {
            self.load_state = state;
            changed.insert(TabProperty::LoadState);
        }
        changed
    }
}

/// A logical window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowState {
    /// Window id.
    pub id: WindowId,
    /// Generation assigned at open.
    pub generation: Generation,
    /// Tabs in open order.
    pub tabs: Vec<TabId>,
    /// Active tab.
    pub active_tab: Option<TabId>,
    /// Selected tabs (always includes the active tab).
    pub selected: BTreeSet<TabId>,
}

/// Owning collection of tabs and windows.
#[derive(Debug, Default)]
pub struct HostModel {
    tabs: HashMap<TabId, TabState>,
    windows: HashMap<WindowId, WindowState>,
    focused: Option<WindowId>,
    next_generation: u64,
}

impl HostModel {
    /// An empty model.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next_generation(&mut self) -> Generation {
        self.next_generation = self.next_generation.saturating_add(1);
        Generation(self.next_generation)
    }

    /// Look up an open tab.
    #[must_use]
    pub fn tab(&self, id: TabId) -> Option<&TabState> {
        self.tabs.get(&id)
    }

    /// Look up an open window.
    #[must_use]
    pub fn window(&self, id: WindowId) -> Option<&WindowState> {
        self.windows.get(&id)
    }

    /// The focused window, if any.
    #[must_use]
    pub fn focused_window(&self) -> Option<WindowId> {
        self.focused
    }

    /// Number of open tabs.
    #[must_use]
    pub fn tab_count(&self) -> usize {
        self.tabs.len()
    }

    /// Number of open windows.
    #[must_use]
    pub fn window_count(&self) -> usize {
        self.windows.len()
    }

    /// Open tabs of `window`, in open order. Includes tabs reported before
    /// the window itself.
    #[must_use]
    pub fn tabs_in(&self, window: WindowId) -> Vec<TabId> {
        let mut tabs: Vec<&TabState> = self.tabs.values().filter(|t| t.window == window).collect();
        tabs.sort_by_key(|t| t.generation);
        tabs.into_iter().map(|t| t.id).collect()
    }

    pub(crate) fn open_window(&mut self, id: WindowId) -> HostResult<Generation> {
        if self.windows.contains_key(&id) {
            return Err(HostError::DuplicateWindow(id));
        }
        let generation = self.next_generation();
        let tabs = self.tabs_in(id);
        self.windows.insert(
            id,
            WindowState {
                id,
                generation,
                tabs,
                active_tab: None,
                selected: BTreeSet::new(),
            },
        );
        Ok(generation)
    }

    pub(crate) fn close_window(&mut self, id: WindowId) -> HostResult<WindowState> {
        let window = self
            .windows
            .remove(&id)
            .ok_or(HostError::UnknownWindow(id))?;
        if self.focused == Some(id) {
            self.focused = None;
        }
        Ok(window)
    }

    pub(crate) fn set_focused(&mut self, id: Option<WindowId>) -> HostResult<bool> {
        if let Some(id) = id
            && !self.windows.contains_key(&id)
        {
            return Err(HostError::UnknownWindow(id));
        }
        let changed = self.focused != id;
        self.focused = id;
        Ok(changed)
    }

    pub(crate) fn open_tab(
        &mut self,
        id: TabId,
        window: WindowId,
        properties: TabProperties,
    ) -> HostResult<Generation> {
        if self.tabs.contains_key(&id) {
            return Err(HostError::DuplicateTab(id));
        }
        let generation = self.next_generation();
        self.tabs.insert(
            id,
            TabState {
                id,
                window,
                generation,
                title: properties.title,
                url: properties.url,
                pinned: properties.pinned,
                load_state: properties.load_state,
            },
        );
        if let Some(w) = self.windows.get_mut(&window) {
            w.tabs.push(id);
        }
        Ok(generation)
    }

    pub(crate) fn close_tab(&mut self, id: TabId) -> HostResult<TabState> {
        let tab = self.tabs.remove(&id).ok_or(HostError::UnknownTab(id))?;
        if let Some(w) = self.windows.get_mut(&tab.window) {
            w.tabs.retain(|t| *t != id);
            w.selected.remove(&id);
            if w.active_tab == Some(id) {
                w.active_tab = None;
            }
        }
        Ok(tab)
    }

    /// Make `id` the active tab of its window. Returns the previous active
    /// tab and the previous selection.
    pub(crate) fn activate_tab(
        &mut self,
        id: TabId,
    ) -> HostResult<(Option<TabId>, BTreeSet<TabId>)> {
        let window = self.tabs.get(&id).ok_or(HostError::UnknownTab(id))?.window;
        let Some(w) = self.windows.get_mut(&window) else {
            return Err(HostError::UnknownWindow(window));
        };
        let previous = w.active_tab.replace(id);
        let previous_selection = std::mem::replace(&mut w.selected, BTreeSet::from([id]));
        Ok((previous, previous_selection))
    }

    /// Replace the selection of `window`. The active tab stays selected.
    /// Returns the previous selection.
    pub(crate) fn select_tabs(
        &mut self,
        window: WindowId,
        tabs: &[TabId],
    ) -> HostResult<BTreeSet<TabId>> {
        for tab in tabs {
            match self.tabs.get(tab) {
                None => return Err(HostError::UnknownTab(*tab)),
                Some(t) if t.window != window => {
                    return Err(HostError::WrongWindow { tab: *tab, window });
                },
                Some(_) => {},
            }
        }
        let w = self
            .windows
            .get_mut(&window)
            .ok_or(HostError::UnknownWindow(window))?;
        let mut selected: BTreeSet<TabId> = tabs.iter().copied().collect();
        if let Some(active) = w.active_tab {
            selected.insert(active);
        }
        Ok(std::mem::replace(&mut w.selected, selected))
    }

    pub(crate) fn update_tab(
        &mut self,
        id: TabId,
        update: TabUpdate,
    ) -> HostResult<BTreeSet<TabProperty>> {
        let tab = self.tabs.get_mut(&id).ok_or(HostError::UnknownTab(id))?;
        Ok(tab.apply(update))
    }
}
