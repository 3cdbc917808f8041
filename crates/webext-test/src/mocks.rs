//! Recording doubles for the bridge's collaborators.
//!
//! Every mock uses `std::sync::Mutex` so it can be configured and inspected
//! from sync and async code alike.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use webext_bridge::injection::{
    ChannelError, PageMessageChannel, ShimRequest, ShimResponse, decode_request, decode_response,
    encode_request, encode_response,
};
use webext_bridge::{
    ExtensionManifest, ExtensionRuntime, HostModel, ManifestError, ManifestValidator,
    NativeFailureKind, NativeInjectionError, PackageSource, RuntimeContext, RuntimeError,
    RuntimeResult, ScriptPayload, TabAdapter, TabProperty, WindowAdapter,
};
use webext_core::{
    ExtensionId, GrantSet, InjectionWorld, PermissionItem, PermissionStatus, TabId, WindowId,
};
use webext_permissions::{PermissionPresenter, PermissionPrompt, PromptResponse};

fn locked<T, R>(mutex: &Mutex<T>, f: impl FnOnce(&mut T) -> R) -> Option<R> {
    mutex.lock().ok().map(|mut guard| f(&mut guard))
}

// ---------------------------------------------------------------------------
// Runtime
// ---------------------------------------------------------------------------

/// One call received by [`RecordingRuntime`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCall {
    /// `register_package`.
    Register(ExtensionId),
    /// `unregister_package`.
    Unregister(ExtensionId),
    /// `load`, with the grants the context was seeded with.
    Load {
        /// Package loaded.
        extension_id: ExtensionId,
        /// Grants in the context.
        grants: GrantSet,
    },
    /// `unload`.
    Unload(ExtensionId),
    /// `set_permission_status`.
    SetPermission {
        /// Package updated.
        extension_id: ExtensionId,
        /// Item updated.
        item: PermissionItem,
        /// New status.
        status: PermissionStatus,
    },
    /// `execute_script`.
    Execute {
        /// Requesting package.
        extension_id: ExtensionId,
        /// Target tab.
        tab: TabId,
        /// Requested world.
        world: InjectionWorld,
    },
    /// `did_open_window`.
    OpenWindow(WindowId),
    /// `did_close_window`.
    CloseWindow(WindowId),
    /// `did_focus_window`.
    FocusWindow(Option<WindowId>),
    /// `did_open_tab`.
    OpenTab {
        /// Opened tab.
        tab: TabId,
        /// Its window.
        window: WindowId,
    },
    /// `did_close_tab`.
    CloseTab {
        /// Closing tab.
        tab: TabId,
        /// Whether its window is closing too.
        window_closing: bool,
        /// Whether the adapter still resolved during the call.
        resolved: bool,
    },
    /// `did_activate_tab`.
    ActivateTab {
        /// Newly active tab.
        tab: TabId,
        /// Previously active tab.
        previous: Option<TabId>,
    },
    /// `did_select_tabs`.
    SelectTabs(Vec<TabId>),
    /// `did_deselect_tabs`.
    DeselectTabs(Vec<TabId>),
    /// `did_change_tab_properties`.
    ChangeTabProperties {
        /// Changed tab.
        tab: TabId,
        /// Changed properties.
        changed: BTreeSet<TabProperty>,
    },
}

impl RuntimeCall {
    /// Whether this is a tab or window notification.
    #[must_use]
    pub fn is_notification(&self) -> bool {
        !matches!(
            self,
            Self::Register(_)
                | Self::Unregister(_)
                | Self::Load { .. }
                | Self::Unload(_)
                | Self::SetPermission { .. }
                | Self::Execute { .. }
        )
    }
}

/// Mock [`ExtensionRuntime`] that records every call.
#[derive(Debug, Default)]
pub struct RecordingRuntime {
    calls: Mutex<Vec<RuntimeCall>>,
    loaded: Mutex<HashSet<ExtensionId>>,
    reject_load: Mutex<HashSet<ExtensionId>>,
    reject_register: Mutex<HashSet<ExtensionId>>,
    script_results: Mutex<VecDeque<Result<Vec<serde_json::Value>, NativeInjectionError>>>,
    script_delay: Mutex<Option<Duration>>,
    tab_handles: Mutex<HashMap<TabId, Vec<Arc<TabAdapter>>>>,
    window_handles: Mutex<HashMap<WindowId, Vec<Arc<WindowAdapter>>>>,
}

impl RecordingRuntime {
    /// Create a runtime that accepts everything.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make `load` fail for `id`.
    pub fn reject_load(&self, id: &ExtensionId) {
        locked(&self.reject_load, |set| set.insert(id.clone()));
    }

    /// Let `load` succeed for `id` again.
    pub fn accept_load(&self, id: &ExtensionId) {
        locked(&self.reject_load, |set| set.remove(id));
    }

    /// Make `register_package` fail for `id`.
    pub fn reject_register(&self, id: &ExtensionId) {
        locked(&self.reject_register, |set| set.insert(id.clone()));
    }

    /// Queue the result of the next `execute_script`. An empty queue answers
    /// `[null]`.
    pub fn queue_script_result(
        &self,
        result: Result<Vec<serde_json::Value>, NativeInjectionError>,
    ) {
        locked(&self.script_results, |queue| queue.push_back(result));
    }

    /// Queue a capability-gap failure.
    pub fn queue_capability_gap(&self) {
        self.queue_script_result(Err(NativeInjectionError::new(
            NativeFailureKind::CapabilityGap,
            "world not supported by the native API",
        )));
    }

    /// Delay every `execute_script` by `delay`.
    pub fn set_script_delay(&self, delay: Option<Duration>) {
        locked(&self.script_delay, |d| *d = delay);
    }

    /// Every call so far.
    #[must_use]
    pub fn calls(&self) -> Vec<RuntimeCall> {
        locked(&self.calls, |calls| calls.clone()).unwrap_or_default()
    }

    /// Only the tab and window notifications.
    #[must_use]
    pub fn notifications(&self) -> Vec<RuntimeCall> {
        self.calls()
            .into_iter()
            .filter(RuntimeCall::is_notification)
            .collect()
    }

    /// Forget recorded calls.
    pub fn clear(&self) {
        locked(&self.calls, Vec::clear);
    }

    /// Number of `execute_script` calls.
    #[must_use]
    pub fn script_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, RuntimeCall::Execute { .. }))
            .count()
    }

    /// Whether `id` is currently loaded.
    #[must_use]
    pub fn is_loaded(&self, id: &ExtensionId) -> bool {
        locked(&self.loaded, |set| set.contains(id)).unwrap_or(false)
    }

    /// Every tab adapter handed to the runtime for `tab`, in call order.
    #[must_use]
    pub fn tab_handles(&self, tab: TabId) -> Vec<Arc<TabAdapter>> {
        locked(&self.tab_handles, |map| map.get(&tab).cloned())
            .flatten()
            .unwrap_or_default()
    }

    /// Every window adapter handed to the runtime for `window`, in call order.
    #[must_use]
    pub fn window_handles(&self, window: WindowId) -> Vec<Arc<WindowAdapter>> {
        locked(&self.window_handles, |map| map.get(&window).cloned())
            .flatten()
            .unwrap_or_default()
    }

    fn record(&self, call: RuntimeCall) {
        tracing::trace!(call = ?call, "Runtime call");
        locked(&self.calls, |calls| calls.push(call));
    }

    fn seen_tab(&self, tab: &Arc<TabAdapter>) {
        locked(&self.tab_handles, |map| {
            map.entry(tab.id()).or_default().push(Arc::clone(tab));
        });
    }

    fn seen_window(&self, window: &Arc<WindowAdapter>) {
        locked(&self.window_handles, |map| {
            map.entry(window.id()).or_default().push(Arc::clone(window));
        });
    }

    fn tab_ids(&self, tabs: &[Arc<TabAdapter>]) -> Vec<TabId> {
        tabs.iter()
            .map(|tab| {
                self.seen_tab(tab);
                tab.id()
            })
            .collect()
    }
}

#[async_trait]
impl ExtensionRuntime for RecordingRuntime {
    async fn register_package(&self, extension_id: &ExtensionId) -> RuntimeResult<()> {
        if locked(&self.reject_register, |set| set.contains(extension_id)).unwrap_or(false) {
            return Err(RuntimeError::Rejected("package format not supported".into()));
        }
        self.record(RuntimeCall::Register(extension_id.clone()));
        Ok(())
    }

    async fn unregister_package(&self, extension_id: &ExtensionId) -> RuntimeResult<()> {
        self.record(RuntimeCall::Unregister(extension_id.clone()));
        Ok(())
    }

    async fn load(&self, context: &RuntimeContext) -> RuntimeResult<()> {
        if locked(&self.reject_load, |set| set.contains(&context.extension_id)).unwrap_or(false) {
            return Err(RuntimeError::Rejected("background script failed to start".into()));
        }
        self.record(RuntimeCall::Load {
            extension_id: context.extension_id.clone(),
            grants: context.grants.clone(),
        });
        locked(&self.loaded, |set| set.insert(context.extension_id.clone()));
        Ok(())
    }

    async fn unload(&self, extension_id: &ExtensionId) -> RuntimeResult<()> {
        self.record(RuntimeCall::Unload(extension_id.clone()));
        locked(&self.loaded, |set| set.remove(extension_id));
        Ok(())
    }

    fn set_permission_status(
        &self,
        extension_id: &ExtensionId,
        item: &PermissionItem,
        status: PermissionStatus,
    ) {
        self.record(RuntimeCall::SetPermission {
            extension_id: extension_id.clone(),
            item: item.clone(),
            status,
        });
    }

    async fn execute_script(
        &self,
        extension_id: &ExtensionId,
        tab: &Arc<TabAdapter>,
        world: InjectionWorld,
        _payload: &ScriptPayload,
    ) -> Result<Vec<serde_json::Value>, NativeInjectionError> {
        self.seen_tab(tab);
        self.record(RuntimeCall::Execute {
            extension_id: extension_id.clone(),
            tab: tab.id(),
            world,
        });
        if let Some(delay) = locked(&self.script_delay, |d| *d).flatten() {
            tokio::time::sleep(delay).await;
        }
        locked(&self.script_results, VecDeque::pop_front)
            .flatten()
            .unwrap_or_else(|| Ok(vec![serde_json::Value::Null]))
    }

    fn did_open_window(&self, _host: &HostModel, window: &Arc<WindowAdapter>) {
        self.seen_window(window);
        self.record(RuntimeCall::OpenWindow(window.id()));
    }

    fn did_close_window(&self, _host: &HostModel, window: &Arc<WindowAdapter>) {
        self.seen_window(window);
        self.record(RuntimeCall::CloseWindow(window.id()));
    }

    fn did_focus_window(&self, _host: &HostModel, window: Option<&Arc<WindowAdapter>>) {
        if let Some(window) = window {
            self.seen_window(window);
        }
        self.record(RuntimeCall::FocusWindow(window.map(|w| w.id())));
    }

    fn did_open_tab(&self, _host: &HostModel, tab: &Arc<TabAdapter>, window: &Arc<WindowAdapter>) {
        self.seen_tab(tab);
        self.seen_window(window);
        self.record(RuntimeCall::OpenTab {
            tab: tab.id(),
            window: window.id(),
        });
    }

    fn did_close_tab(&self, host: &HostModel, tab: &Arc<TabAdapter>, window_closing: bool) {
        self.seen_tab(tab);
        self.record(RuntimeCall::CloseTab {
            tab: tab.id(),
            window_closing,
            resolved: tab.is_live(host),
        });
    }

    fn did_activate_tab(
        &self,
        _host: &HostModel,
        tab: &Arc<TabAdapter>,
        previous: Option<&Arc<TabAdapter>>,
    ) {
        self.seen_tab(tab);
        if let Some(previous) = previous {
            self.seen_tab(previous);
        }
        self.record(RuntimeCall::ActivateTab {
            tab: tab.id(),
            previous: previous.map(|p| p.id()),
        });
    }

    fn did_select_tabs(&self, _host: &HostModel, tabs: &[Arc<TabAdapter>]) {
        let ids = self.tab_ids(tabs);
        self.record(RuntimeCall::SelectTabs(ids));
    }

    fn did_deselect_tabs(&self, _host: &HostModel, tabs: &[Arc<TabAdapter>]) {
        let ids = self.tab_ids(tabs);
        self.record(RuntimeCall::DeselectTabs(ids));
    }

    fn did_change_tab_properties(
        &self,
        _host: &HostModel,
        tab: &Arc<TabAdapter>,
        changed: &BTreeSet<TabProperty>,
    ) {
        self.seen_tab(tab);
        self.record(RuntimeCall::ChangeTabProperties {
            tab: tab.id(),
            changed: changed.clone(),
        });
    }
}

// ---------------------------------------------------------------------------
// Page channel
// ---------------------------------------------------------------------------

/// How [`MockPageChannel`] answers the next request.
#[derive(Debug, Clone, PartialEq)]
pub enum PageReply {
    /// Evaluate successfully with these results.
    Complete(Vec<serde_json::Value>),
    /// The page reports an evaluation failure.
    Fail(String),
    /// The channel itself fails.
    Error(ChannelError),
    /// Answer with a response id that does not match the request.
    Mismatched,
}

/// A request the page side received, after decoding from the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredRequest {
    /// Target tab.
    pub tab: TabId,
    /// Extension whose page context received it.
    pub extension_id: ExtensionId,
    /// The decoded request.
    pub request: ShimRequest,
}

/// Mock [`PageMessageChannel`] that round-trips messages through the wire
/// codec and answers from a queue.
#[derive(Debug, Default)]
pub struct MockPageChannel {
    delivered: Mutex<Vec<DeliveredRequest>>,
    replies: Mutex<VecDeque<PageReply>>,
}

impl MockPageChannel {
    /// Create a channel that completes every request with `[null]`.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue the answer to the next request.
    pub fn queue_reply(&self, reply: PageReply) {
        locked(&self.replies, |queue| queue.push_back(reply));
    }

    /// Requests delivered so far.
    #[must_use]
    pub fn delivered(&self) -> Vec<DeliveredRequest> {
        locked(&self.delivered, |d| d.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PageMessageChannel for MockPageChannel {
    async fn send(
        &self,
        tab: TabId,
        extension_id: &ExtensionId,
        request: ShimRequest,
    ) -> Result<ShimResponse, ChannelError> {
        let wire = encode_request(&request)?;
        let received = decode_request(&wire)?;
        locked(&self.delivered, |d| {
            d.push(DeliveredRequest {
                tab,
                extension_id: extension_id.clone(),
                request: received.clone(),
            });
        });

        let reply = locked(&self.replies, VecDeque::pop_front)
            .flatten()
            .unwrap_or_else(|| PageReply::Complete(vec![serde_json::Value::Null]));
        let response = match reply {
            PageReply::Complete(results) => ShimResponse::completed(&received, results),
            PageReply::Fail(message) => ShimResponse::failed(&received, message),
            PageReply::Error(e) => return Err(e),
            PageReply::Mismatched => {
                let other = ShimRequest::new(
                    received.extension_id.clone(),
                    received.world,
                    received.script.clone(),
                );
                ShimResponse::completed(&other, Vec::new())
            },
        };
        decode_response(&encode_response(&response)?)
    }
}

// ---------------------------------------------------------------------------
// Presenter
// ---------------------------------------------------------------------------

/// Mock [`PermissionPresenter`] answering from a queue.
///
/// An empty queue dismisses the prompt.
#[derive(Debug)]
pub struct MockPresenter {
    responses: Mutex<VecDeque<PromptResponse>>,
    prompts: Mutex<Vec<PermissionPrompt>>,
    available: bool,
    delay: Option<Duration>,
}

impl Default for MockPresenter {
    fn default() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
            available: true,
            delay: None,
        }
    }
}

impl MockPresenter {
    /// Create a presenter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response.
    #[must_use]
    pub fn with_response(self, response: PromptResponse) -> Self {
        locked(&self.responses, |queue| queue.push_back(response));
        self
    }

    /// Grant `granted` on the next prompt.
    #[must_use]
    pub fn granting(self, granted: GrantSet) -> Self {
        self.with_response(PromptResponse::Granted(granted))
    }

    /// Report the presenter as unable to show prompts.
    #[must_use]
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// Wait `delay` before answering.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Prompts shown so far.
    #[must_use]
    pub fn prompts(&self) -> Vec<PermissionPrompt> {
        locked(&self.prompts, |p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PermissionPresenter for MockPresenter {
    async fn present(&self, prompt: PermissionPrompt) -> PromptResponse {
        locked(&self.prompts, |p| p.push(prompt));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        locked(&self.responses, VecDeque::pop_front)
            .flatten()
            .unwrap_or(PromptResponse::Cancelled)
    }

    fn is_available(&self) -> bool {
        self.available
    }
}

// ---------------------------------------------------------------------------
// Manifest validator
// ---------------------------------------------------------------------------

/// Mock [`ManifestValidator`] keyed by extension id.
#[derive(Debug, Default)]
pub struct MockValidator {
    manifests: Mutex<HashMap<ExtensionId, Result<ExtensionManifest, ManifestError>>>,
}

impl MockValidator {
    /// Create a validator that knows no packages.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Validate `id` as `manifest`.
    pub fn set_manifest(&self, id: &ExtensionId, manifest: ExtensionManifest) {
        locked(&self.manifests, |m| m.insert(id.clone(), Ok(manifest)));
    }

    /// Fail validation of `id` with `error`.
    pub fn set_failure(&self, id: &ExtensionId, error: ManifestError) {
        locked(&self.manifests, |m| m.insert(id.clone(), Err(error)));
    }
}

#[async_trait]
impl ManifestValidator for MockValidator {
    async fn validate(&self, source: &PackageSource) -> Result<ExtensionManifest, ManifestError> {
        locked(&self.manifests, |m| m.get(&source.extension_id).cloned())
            .flatten()
            .unwrap_or_else(|| {
                Err(ManifestError::Extraction(format!(
                    "no package at {}",
                    source.install_path.display()
                )))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_page_channel_round_trips_through_codec() {
        let channel = MockPageChannel::new();
        let id = ExtensionId::new("reader").unwrap();
        let request = ShimRequest::new(
            id.clone(),
            InjectionWorld::Main,
            webext_bridge::injection::ShimScript::Code {
                source: "1 + 1".into(),
            },
        );

        let response = channel.send(TabId(4), &id, request.clone()).await.unwrap();
        assert_eq!(response.request_id, request.request_id);
        assert_eq!(channel.delivered()[0].request, request);

        channel.queue_reply(PageReply::Mismatched);
        let response = channel.send(TabId(4), &id, request.clone()).await.unwrap();
        assert_ne!(response.request_id, request.request_id);
    }

    #[tokio::test]
    async fn test_presenter_defaults_to_dismissal() {
        let presenter = MockPresenter::new();
        let prompt = PermissionPrompt {
            extension_id: ExtensionId::new("reader").unwrap(),
            display_name: "Reader".into(),
            request: webext_permissions::PermissionRequest::new(),
        };
        assert_eq!(presenter.present(prompt).await, PromptResponse::Cancelled);
        assert_eq!(presenter.prompts().len(), 1);
    }
}
