//! Collaborator doubles for unit tests.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use webext_core::{ExtensionId, InjectionWorld, PermissionItem, PermissionStatus, TabId};
use webext_storage::{MemoryObjectStore, ObjectStore, StorageError, StorageResult};

use crate::adapter::{TabAdapter, WindowAdapter};
use crate::error::{RuntimeError, RuntimeResult};
use crate::host::{HostModel, TabProperty};
use crate::injection::{ChannelError, PageMessageChannel, ScriptPayload, ShimRequest, ShimResponse};
use crate::manifest::{ExtensionManifest, ManifestError, ManifestValidator, PackageSource};
use crate::runtime::{ExtensionRuntime, NativeInjectionError, RuntimeContext};

/// Records runtime calls as readable strings.
#[derive(Default)]
pub(crate) struct TestRuntime {
    pub(crate) calls: Mutex<Vec<String>>,
    pub(crate) loaded: Mutex<HashSet<ExtensionId>>,
    pub(crate) reject_load: Mutex<HashSet<ExtensionId>>,
    pub(crate) reject_register: Mutex<HashSet<ExtensionId>>,
    pub(crate) script_results: Mutex<VecDeque<Result<Vec<serde_json::Value>, NativeInjectionError>>>,
    pub(crate) script_calls: Mutex<usize>,
    pub(crate) script_delay: Mutex<Option<Duration>>,
    /// Tabs whose adapter did not resolve while the close was reported.
    pub(crate) unresolved_on_close: Mutex<Vec<TabId>>,
}

impl TestRuntime {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub(crate) fn push_script_result(
        &self,
        result: Result<Vec<serde_json::Value>, NativeInjectionError>,
    ) {
        self.script_results.lock().unwrap().push_back(result);
    }

    pub(crate) fn script_calls(&self) -> usize {
        *self.script_calls.lock().unwrap()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

fn tab_list(tabs: &[Arc<TabAdapter>]) -> String {
    tabs.iter()
        .map(|t| t.id().0.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl ExtensionRuntime for TestRuntime {
    async fn register_package(&self, extension_id: &ExtensionId) -> RuntimeResult<()> {
        if self.reject_register.lock().unwrap().contains(extension_id) {
            return Err(RuntimeError::Rejected("unsupported package".into()));
        }
        self.record(format!("register {extension_id}"));
        Ok(())
    }

    async fn unregister_package(&self, extension_id: &ExtensionId) -> RuntimeResult<()> {
        self.record(format!("unregister {extension_id}"));
        Ok(())
    }

    async fn load(&self, context: &RuntimeContext) -> RuntimeResult<()> {
        if self.reject_load.lock().unwrap().contains(&context.extension_id) {
            return Err(RuntimeError::Rejected("script failed to start".into()));
        }
        self.record(format!("load {}", context.extension_id));
        self.loaded
            .lock()
            .unwrap()
            .insert(context.extension_id.clone());
        Ok(())
    }

    async fn unload(&self, extension_id: &ExtensionId) -> RuntimeResult<()> {
        self.record(format!("unload {extension_id}"));
        self.loaded.lock().unwrap().remove(extension_id);
        Ok(())
    }

    fn set_permission_status(
        &self,
        extension_id: &ExtensionId,
        item: &PermissionItem,
        status: PermissionStatus,
    ) {
        self.record(format!("permission {extension_id} {item} {status:?}"));
    }

    async fn execute_script(
        &self,
        _extension_id: &ExtensionId,
        tab: &Arc<TabAdapter>,
        world: InjectionWorld,
        _payload: &ScriptPayload,
    ) -> Result<Vec<serde_json::Value>, NativeInjectionError> {
        {
            let mut count = self.script_calls.lock().unwrap();
            *count += 1;
        }
        self.record(format!("execute tab:{} {world}", tab.id().0));
        let delay = *self.script_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.script_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(vec![serde_json::Value::Null]))
    }

    fn did_open_window(&self, _host: &HostModel, window: &Arc<WindowAdapter>) {
        self.record(format!("open_window {}", window.id().0));
    }

    fn did_close_window(&self, _host: &HostModel, window: &Arc<WindowAdapter>) {
        self.record(format!("close_window {}", window.id().0));
    }

    fn did_focus_window(&self, _host: &HostModel, window: Option<&Arc<WindowAdapter>>) {
        match window {
            Some(w) => self.record(format!("focus_window {}", w.id().0)),
            None => self.record("focus_window none".into()),
        }
    }

    fn did_open_tab(&self, _host: &HostModel, tab: &Arc<TabAdapter>, window: &Arc<WindowAdapter>) {
        self.record(format!("open_tab {} in {}", tab.id().0, window.id().0));
    }

    fn did_close_tab(&self, host: &HostModel, tab: &Arc<TabAdapter>, window_closing: bool) {
        if !tab.is_live(host) {
            self.unresolved_on_close.lock().unwrap().push(tab.id());
        }
        self.record(format!("close_tab {} window_closing={window_closing}", tab.id().0));
    }

    fn did_activate_tab(
        &self,
        _host: &HostModel,
        tab: &Arc<TabAdapter>,
        previous: Option<&Arc<TabAdapter>>,
    ) {
        let previous = previous.map_or_else(|| "none".to_string(), |p| p.id().0.to_string());
        self.record(format!("activate {} previous={previous}", tab.id().0));
    }

    fn did_select_tabs(&self, _host: &HostModel, tabs: &[Arc<TabAdapter>]) {
        self.record(format!("select {}", tab_list(tabs)));
    }

    fn did_deselect_tabs(&self, _host: &HostModel, tabs: &[Arc<TabAdapter>]) {
        self.record(format!("deselect {}", tab_list(tabs)));
    }

    fn did_change_tab_properties(
        &self,
        _host: &HostModel,
        tab: &Arc<TabAdapter>,
        changed: &BTreeSet<TabProperty>,
    ) {
        self.record(format!("changed {} {changed:?}", tab.id().0));
    }
}

/// Validator returning a fixed manifest, or a scripted failure.
pub(crate) struct TestValidator {
    pub(crate) manifest: Mutex<ExtensionManifest>,
    pub(crate) failure: Mutex<Option<ManifestError>>,
}

impl TestValidator {
    pub(crate) fn new(manifest: ExtensionManifest) -> Arc<Self> {
        Arc::new(Self {
            manifest: Mutex::new(manifest),
            failure: Mutex::new(None),
        })
    }
}

#[async_trait]
impl ManifestValidator for TestValidator {
    async fn validate(&self, _source: &PackageSource) -> Result<ExtensionManifest, ManifestError> {
        if let Some(failure) = self.failure.lock().unwrap().clone() {
            return Err(failure);
        }
        Ok(self.manifest.lock().unwrap().clone())
    }
}

/// Page channel answering from a queue; an empty queue echoes `Null`.
#[derive(Default)]
pub(crate) struct TestChannel {
    pub(crate) sent: Mutex<Vec<ShimRequest>>,
    pub(crate) failures: Mutex<VecDeque<ChannelError>>,
}

impl TestChannel {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn sent(&self) -> Vec<ShimRequest> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageMessageChannel for TestChannel {
    async fn send(
        &self,
        _tab: TabId,
        _extension_id: &ExtensionId,
        request: ShimRequest,
    ) -> Result<ShimResponse, ChannelError> {
        self.sent.lock().unwrap().push(request.clone());
        if let Some(failure) = self.failures.lock().unwrap().pop_front() {
            return Err(failure);
        }
        Ok(ShimResponse::completed(&request, vec![serde_json::Value::Null]))
    }
}

/// Memory store whose deletes fail in selected namespaces.
#[derive(Default)]
pub(crate) struct FailingStore {
    inner: MemoryObjectStore,
    fail_deletes: Mutex<HashSet<String>>,
}

impl FailingStore {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn fail_deletes_in(&self, namespace: &str) {
        self.fail_deletes.lock().unwrap().insert(namespace.to_owned());
    }

    pub(crate) fn heal(&self) {
        self.fail_deletes.lock().unwrap().clear();
    }

    fn check_delete(&self, namespace: &str) -> StorageResult<()> {
        if self.fail_deletes.lock().unwrap().contains(namespace) {
            return Err(StorageError::Unavailable(format!("delete in {namespace}")));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FailingStore {
    async fn fetch(&self, namespace: &str, key: &str) -> StorageResult<Option<Vec<u8>>> {
        self.inner.fetch(namespace, key).await
    }

    async fn upsert(&self, namespace: &str, key: &str, value: Vec<u8>) -> StorageResult<()> {
        self.inner.upsert(namespace, key, value).await
    }

    async fn delete(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        self.check_delete(namespace)?;
        self.inner.delete(namespace, key).await
    }

    async fn list_keys(&self, namespace: &str) -> StorageResult<Vec<String>> {
        self.inner.list_keys(namespace).await
    }

    async fn delete_namespace(&self, namespace: &str) -> StorageResult<u64> {
        self.check_delete(namespace)?;
        self.inner.delete_namespace(namespace).await
    }
}
