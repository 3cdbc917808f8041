//! Test harness wiring a bridge to recording collaborators.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use webext_bridge::{ExtensionBridge, ExtensionManifest, ExtensionPackage, PackageSource};
use webext_config::BridgeConfig;
use webext_core::{ExtensionId, TabId, WindowId};
use webext_storage::{MemoryObjectStore, ObjectStore};

use crate::fixtures::{test_source, test_tab_at};
use crate::mocks::{MockPageChannel, MockValidator, RecordingRuntime};

/// Set up test logging with the given filter.
///
/// # Example
///
/// ```rust,ignore
/// use webext_test::setup_test_logging;
///
/// #[test]
/// fn my_test() {
///     setup_test_logging("webext_bridge=debug");
/// }
/// ```
pub fn setup_test_logging(filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_test_writer()
        .try_init();
}

/// Set up test logging at `warn`.
pub fn setup_test_logging_default() {
    setup_test_logging("warn");
}

/// A bridge with recording collaborators.
pub struct BridgeHarness {
    /// The bridge under test.
    pub bridge: ExtensionBridge,
    /// Runtime double.
    pub runtime: Arc<RecordingRuntime>,
    /// Page channel double.
    pub channel: Arc<MockPageChannel>,
    /// Manifest validator double.
    pub validator: Arc<MockValidator>,
    /// Backing store, shared so a second harness can restore from it.
    pub store: Arc<MemoryObjectStore>,
}

impl std::fmt::Debug for BridgeHarness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeHarness")
            .field("bridge", &self.bridge)
            .finish_non_exhaustive()
    }
}

impl Default for BridgeHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl BridgeHarness {
    /// A harness with the default configuration and an empty store.
    ///
    /// # Panics
    ///
    /// Panics if the bridge cannot be built.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(&BridgeConfig::default())
    }

    /// A harness with `config` and an empty store.
    ///
    /// # Panics
    ///
    /// Panics if the bridge cannot be built.
    #[must_use]
    pub fn with_config(config: &BridgeConfig) -> Self {
        Self::with_store(Arc::new(MemoryObjectStore::new()), config)
    }

    /// A harness over an existing store, as after a host restart.
    ///
    /// # Panics
    ///
    /// Panics if the bridge cannot be built.
    #[must_use]
    pub fn with_store(store: Arc<MemoryObjectStore>, config: &BridgeConfig) -> Self {
        let runtime = RecordingRuntime::new();
        let channel = MockPageChannel::new();
        let validator = MockValidator::new();
        let backend: Arc<dyn ObjectStore> = store.clone();
        let bridge = ExtensionBridge::new(runtime.clone(), validator.clone(), backend, config)
            .expect("Failed to build bridge")
            .with_page_channel(channel.clone());
        Self {
            bridge,
            runtime,
            channel,
            validator,
            store,
        }
    }

    /// Install `id` with `manifest` from `/packages/<id>`.
    ///
    /// # Panics
    ///
    /// Panics if the install fails.
    pub async fn install(
        &mut self,
        id: &ExtensionId,
        manifest: ExtensionManifest,
    ) -> ExtensionPackage {
        self.install_from(test_source(id), manifest).await
    }

    /// Install from an explicit source.
    ///
    /// # Panics
    ///
    /// Panics if the install fails.
    pub async fn install_from(
        &mut self,
        source: PackageSource,
        manifest: ExtensionManifest,
    ) -> ExtensionPackage {
        self.validator.set_manifest(&source.extension_id, manifest);
        self.bridge
            .install(source)
            .await
            .expect("Failed to install package")
    }

    /// Install and load `id`.
    ///
    /// # Panics
    ///
    /// Panics if the install or load fails.
    pub async fn install_loaded(
        &mut self,
        id: &ExtensionId,
        manifest: ExtensionManifest,
    ) -> ExtensionPackage {
        let package = self.install(id, manifest).await;
        self.bridge.load(id).await.expect("Failed to load package");
        package
    }

    /// Open a focused window and one tab per `(id, url)`.
    ///
    /// # Panics
    ///
    /// Panics if the host rejects a notification.
    pub fn open_window(&mut self, window: WindowId, tabs: &[(TabId, &str)]) {
        self.bridge
            .window_opened(window, true)
            .expect("Failed to open window");
        for (tab, url) in tabs {
            self.bridge
                .tab_opened(*tab, window, test_tab_at(url))
                .expect("Failed to open tab");
        }
    }
}
