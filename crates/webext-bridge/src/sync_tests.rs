#![allow(clippy::arithmetic_side_effects)]

use std::sync::Arc;

use url::Url;
use webext_core::{TabId, WindowId};

use super::*;
use crate::test_support::TestRuntime;

struct Fixture {
    host: HostModel,
    adapters: AdapterIdentityCache,
    sync: EventSynchronizer,
    runtime: Arc<TestRuntime>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            host: HostModel::new(),
            adapters: AdapterIdentityCache::new(),
            sync: EventSynchronizer::new(),
            runtime: TestRuntime::new(),
        }
    }

    fn run<T>(&mut self, f: impl FnOnce(&mut EventSynchronizer, &mut SyncContext<'_>) -> T) -> T {
        let mut cx = SyncContext {
            host: &mut self.host,
            adapters: &mut self.adapters,
            runtime: self.runtime.as_ref(),
        };
        f(&mut self.sync, &mut cx)
    }

    fn open_window(&mut self, id: u64) {
        self.run(|s, cx| s.window_opened(cx, WindowId(id), false))
            .unwrap();
    }

    fn open_tab(&mut self, id: u64, window: u64) {
        self.run(|s, cx| s.tab_opened(cx, TabId(id), WindowId(window), TabProperties::default()))
            .unwrap();
    }
}

#[test]
fn test_tab_before_window_is_held_until_window_opens() {
    let mut fx = Fixture::new();
    let announced = fx
        .run(|s, cx| s.tab_opened(cx, TabId(10), WindowId(1), TabProperties::default()))
        .unwrap();
    assert!(!announced);
    assert!(fx.runtime.calls().is_empty());
    assert_eq!(fx.sync.held_tabs(WindowId(1)), &[TabId(10)]);

    fx.open_window(1);
    assert_eq!(fx.runtime.calls(), vec!["open_window 1", "open_tab 10 in 1"]);
    assert!(fx.sync.is_tab_announced(TabId(10)));
    assert!(fx.sync.held_tabs(WindowId(1)).is_empty());
}

#[test]
fn test_retired_window_drops_held_tabs() {
    let mut fx = Fixture::new();
    fx.open_tab(10, 7);
    fx.open_tab(11, 7);

    let dropped = fx.run(|s, cx| s.window_retired(cx, WindowId(7))).unwrap();
    assert_eq!(dropped, vec![TabId(10), TabId(11)]);
    assert!(fx.sync.held_tabs(WindowId(7)).is_empty());
    assert!(fx.host.tab(TabId(10)).is_none());
    assert!(fx.runtime.calls().is_empty());

    // A later window reusing the id starts empty.
    fx.open_window(7);
    assert_eq!(fx.runtime.calls(), vec!["open_window 7"]);
}

#[test]
fn test_retiring_an_open_window_closes_it() {
    let mut fx = Fixture::new();
    fx.open_window(1);
    fx.open_tab(1, 1);
    fx.runtime.clear();

    let closed = fx.run(|s, cx| s.window_retired(cx, WindowId(1))).unwrap();
    assert_eq!(closed, vec![TabId(1)]);
    assert!(fx.host.window(WindowId(1)).is_none());
    assert_eq!(fx.runtime.calls().last().unwrap(), "close_window 1");
}

#[test]
fn test_every_tab_open_follows_its_window_open() {
    let mut fx = Fixture::new();
    fx.open_tab(1, 2);
    fx.open_window(1);
    fx.open_tab(2, 1);
    fx.open_tab(3, 2);
    fx.open_window(2);

    let calls = fx.runtime.calls();
    for (i, call) in calls.iter().enumerate() {
        if let Some(rest) = call.strip_prefix("open_tab ") {
            let window = rest.rsplit(' ').next().unwrap();
            let opened = calls[..i]
                .iter()
                .any(|c| *c == format!("open_window {window}"));
            assert!(opened, "{call} before its window in {calls:?}");
        }
    }
    assert_eq!(calls.len(), 5);
}

#[test]
fn test_focus_notifies_only_on_change() {
    let mut fx = Fixture::new();
    fx.run(|s, cx| s.window_opened(cx, WindowId(1), true))
        .unwrap();
    assert_eq!(fx.runtime.calls(), vec!["open_window 1", "focus_window 1"]);

    fx.runtime.clear();
    let changed = fx
        .run(|s, cx| s.window_focused(cx, Some(WindowId(1))))
        .unwrap();
    assert!(!changed);
    fx.run(|s, cx| s.window_focused(cx, None)).unwrap();
    assert_eq!(fx.runtime.calls(), vec!["focus_window none"]);

    assert_eq!(
        fx.run(|s, cx| s.window_focused(cx, Some(WindowId(9)))),
        Err(HostError::UnknownWindow(WindowId(9)))
    );
}

#[test]
fn test_activation_sequence() {
    let mut fx = Fixture::new();
    fx.open_window(1);
    fx.open_tab(1, 1);
    fx.open_tab(2, 1);
    fx.open_tab(3, 1);
    fx.run(|s, cx| s.tab_activated(cx, TabId(1))).unwrap();
    fx.run(|s, cx| s.tabs_selected(cx, WindowId(1), &[TabId(3)]))
        .unwrap();
    fx.runtime.clear();

    fx.run(|s, cx| s.tab_activated(cx, TabId(2))).unwrap();
    assert_eq!(
        fx.runtime.calls(),
        vec!["deselect 1,3", "activate 2 previous=1", "select 2"]
    );

    fx.runtime.clear();
    fx.run(|s, cx| s.tab_activated(cx, TabId(2))).unwrap();
    assert!(fx.runtime.calls().is_empty());
}

#[test]
fn test_first_activation_has_no_previous() {
    let mut fx = Fixture::new();
    fx.open_window(1);
    fx.open_tab(1, 1);
    fx.runtime.clear();

    fx.run(|s, cx| s.tab_activated(cx, TabId(1))).unwrap();
    assert_eq!(fx.runtime.calls(), vec!["activate 1 previous=none", "select 1"]);
}

#[test]
fn test_selection_change_reports_departures_first() {
    let mut fx = Fixture::new();
    fx.open_window(1);
    for id in 1..=3 {
        fx.open_tab(id, 1);
    }
    fx.run(|s, cx| s.tab_activated(cx, TabId(1))).unwrap();
    fx.run(|s, cx| s.tabs_selected(cx, WindowId(1), &[TabId(2)]))
        .unwrap();
    fx.runtime.clear();

    fx.run(|s, cx| s.tabs_selected(cx, WindowId(1), &[TabId(3)]))
        .unwrap();
    assert_eq!(fx.runtime.calls(), vec!["deselect 2", "select 1,3"]);

    fx.runtime.clear();
    fx.run(|s, cx| s.tabs_selected(cx, WindowId(1), &[TabId(3)]))
        .unwrap();
    assert!(fx.runtime.calls().is_empty());
}

#[test]
fn test_property_batch_is_one_notification() {
    let mut fx = Fixture::new();
    fx.open_window(1);
    fx.open_tab(1, 1);
    fx.runtime.clear();

    let changed = fx
        .run(|s, cx| {
            s.tab_updated(
                cx,
                TabId(1),
                TabUpdate::new()
                    .title("Example")
                    .url(Url::parse("https://example.com/").unwrap())
                    .pinned(true),
            )
        })
        .unwrap();
    assert_eq!(changed.len(), 3);
    assert_eq!(
        fx.runtime.calls(),
        vec!["changed 1 {Title, Url, Pinned}"]
    );

    fx.runtime.clear();
    let changed = fx
        .run(|s, cx| s.tab_updated(cx, TabId(1), TabUpdate::new().title("Example")))
        .unwrap();
    assert!(changed.is_empty());
    assert!(fx.runtime.calls().is_empty());
}

#[test]
fn test_close_notifies_before_purge() {
    let mut fx = Fixture::new();
    fx.open_window(1);
    fx.open_tab(1, 1);
    let adapter = fx.adapters.existing_tab(TabId(1)).unwrap();

    fx.run(|s, cx| s.tab_closed(cx, TabId(1))).unwrap();
    assert!(fx.runtime.unresolved_on_close.lock().unwrap().is_empty());
    assert!(fx.adapters.existing_tab(TabId(1)).is_none());
    assert!(!adapter.is_live(&fx.host));
    assert_eq!(
        fx.runtime.calls().last().unwrap(),
        "close_tab 1 window_closing=false"
    );

    assert_eq!(
        fx.run(|s, cx| s.tab_closed(cx, TabId(1))),
        Err(HostError::UnknownTab(TabId(1)))
    );
}

#[test]
fn test_window_close_cascades_to_tabs() {
    let mut fx = Fixture::new();
    fx.run(|s, cx| s.window_opened(cx, WindowId(1), true))
        .unwrap();
    fx.open_tab(1, 1);
    fx.open_tab(2, 1);
    fx.runtime.clear();

    let closed = fx.run(|s, cx| s.window_closed(cx, WindowId(1))).unwrap();
    assert_eq!(closed, vec![TabId(1), TabId(2)]);
    assert_eq!(
        fx.runtime.calls(),
        vec![
            "close_tab 1 window_closing=true",
            "close_tab 2 window_closing=true",
            "close_window 1",
        ]
    );
    assert!(fx.runtime.unresolved_on_close.lock().unwrap().is_empty());
    assert_eq!(fx.adapters.tab_count(), 0);
    assert_eq!(fx.adapters.window_count(), 0);
    assert_eq!(fx.host.focused_window(), None);
    assert!(!fx.sync.is_window_announced(WindowId(1)));
}

#[test]
fn test_reopened_ids_get_fresh_adapters() {
    let mut fx = Fixture::new();
    fx.open_window(1);
    fx.open_tab(5, 1);
    let first = fx.adapters.existing_tab(TabId(5)).unwrap();
    fx.run(|s, cx| s.tab_closed(cx, TabId(5))).unwrap();
    fx.open_tab(5, 1);
    let second = fx.adapters.existing_tab(TabId(5)).unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
}
