//! The bridge context object.
//!
//! [`ExtensionBridge`] is constructed once at startup and owns every piece of
//! bridge state: the host model, the adapter cache, the synchronizer, the
//! lifecycle controller and the ledger. Host notifications and management
//! actions are plain `&mut self` calls, so all mutation happens on the owner.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};
use webext_config::BridgeConfig;
use webext_core::{ExtensionId, GrantSet, Permission, PermissionItem, TabId, WindowId};
use webext_events::{EventBus, EventReceiver};
use webext_permissions::{
    AutoGrantPolicy, DecisionSource, PermissionDecision, PermissionError, PermissionLedger,
    PermissionPresenter, PromptOutcome,
};
use webext_storage::ObjectStore;

use crate::adapter::{AdapterIdentityCache, TabAdapter, WindowAdapter};
use crate::attach::PageAttachments;
use crate::error::{
    BridgeResult, HostError, HostResult, InjectionResult, InstallationResult, LifecycleError,
    LifecycleResult,
};
use crate::host::{HostModel, TabProperties, TabProperty, TabUpdate};
use crate::injection::{
    InjectionOutcome, InjectionRequest, InjectionScope, PageMessageChannel, PreparedInjection,
    ScriptInjectionBridge,
};
use crate::lifecycle::{LifecycleController, PackageState, RestoreReport};
use crate::manifest::{ManifestValidator, PackageSource};
use crate::package::ExtensionPackage;
use crate::runtime::ExtensionRuntime;
use crate::sync::{EventSynchronizer, SyncContext};

/// Owner of all bridge state.
pub struct ExtensionBridge {
    host: HostModel,
    adapters: AdapterIdentityCache,
    sync: EventSynchronizer,
    attachments: PageAttachments,
    lifecycle: LifecycleController,
    ledger: Arc<PermissionLedger>,
    injection: ScriptInjectionBridge,
    runtime: Arc<dyn ExtensionRuntime>,
    events: EventBus,
    prompt_timeout: Duration,
}

impl std::fmt::Debug for ExtensionBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionBridge")
            .field("tabs", &self.host.tab_count())
            .field("windows", &self.host.window_count())
            .field("lifecycle", &self.lifecycle)
            .field("injection", &self.injection)
            .finish_non_exhaustive()
    }
}

impl ExtensionBridge {
    /// Build a bridge from its collaborators and configuration.
    ///
    /// # Errors
    ///
    /// Returns a config error if the auto-grant allow-list does not parse, or
    /// a storage error if the package namespace cannot be bound.
    pub fn new(
        runtime: Arc<dyn ExtensionRuntime>,
        validator: Arc<dyn ManifestValidator>,
        store: Arc<dyn ObjectStore>,
        config: &BridgeConfig,
    ) -> BridgeResult<Self> {
        let events = EventBus::with_capacity(config.events.capacity);
        let ledger = Arc::new(PermissionLedger::new(Arc::clone(&store)));
        let policy = AutoGrantPolicy::new(config.permissions.auto_grant.items()?);

        let lifecycle = LifecycleController::new(
            Arc::clone(&runtime),
            validator,
            Arc::clone(&ledger),
            store,
            events.clone(),
        )?
        .with_policy(policy);

        let injection = ScriptInjectionBridge::new(config.origins.policy())
            .with_timeout(config.injection.timeout())
            .with_fallback(config.injection.fallback_enabled);

        info!(
            injection_timeout_ms = config.injection.timeout_ms,
            fallback_enabled = config.injection.fallback_enabled,
            auto_grant = !config.permissions.auto_grant.is_empty(),
            "Extension bridge initialized"
        );

        Ok(Self {
            host: HostModel::new(),
            adapters: AdapterIdentityCache::new(),
            sync: EventSynchronizer::new(),
            attachments: PageAttachments::new(),
            lifecycle,
            ledger,
            injection,
            runtime,
            events,
            prompt_timeout: config.prompt.timeout(),
        })
    }

    /// Set the page-message channel the injection fallback uses.
    #[must_use]
    pub fn with_page_channel(mut self, channel: Arc<dyn PageMessageChannel>) -> Self {
        self.injection = self.injection.with_channel(channel);
        self
    }

    /// Install the global log subscriber described by `config`.
    ///
    /// # Errors
    ///
    /// Returns a telemetry error if the subscriber cannot be installed.
    pub fn init_logging(config: &BridgeConfig) -> BridgeResult<()> {
        webext_telemetry::setup_logging(&config.logging)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Current tabs and windows.
    #[must_use]
    pub fn host(&self) -> &HostModel {
        &self.host
    }

    /// The permission ledger.
    ///
    /// Narrowing grants through it directly, rather than through
    /// [`revoke`](Self::revoke), fails injection closed until the next
    /// [`sync_grants`](Self::sync_grants).
    #[must_use]
    pub fn ledger(&self) -> &PermissionLedger {
        &self.ledger
    }

    /// The lifecycle controller.
    #[must_use]
    pub fn lifecycle(&self) -> &LifecycleController {
        &self.lifecycle
    }

    /// What the runtime has been told about windows and tabs.
    #[must_use]
    pub fn synchronizer(&self) -> &EventSynchronizer {
        &self.sync
    }

    /// Ready page contexts.
    #[must_use]
    pub fn attachments(&self) -> &PageAttachments {
        &self.attachments
    }

    /// The event bus.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Subscribe to every bridge event.
    #[must_use]
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// The adapter for an open tab, created on first use.
    pub fn tab_adapter(&mut self, id: TabId) -> Option<Arc<TabAdapter>> {
        self.adapters.tab_adapter(&self.host, id)
    }

    /// The adapter for an open window, created on first use.
    pub fn window_adapter(&mut self, id: WindowId) -> Option<Arc<WindowAdapter>> {
        self.adapters.window_adapter(&self.host, id)
    }

    // -----------------------------------------------------------------------
    // Host notifications
    // -----------------------------------------------------------------------

    fn split(&mut self) -> (&mut EventSynchronizer, SyncContext<'_>) {
        (
            &mut self.sync,
            SyncContext {
                host: &mut self.host,
                adapters: &mut self.adapters,
                runtime: self.runtime.as_ref(),
            },
        )
    }

    /// A window opened.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::DuplicateWindow`] if it is already open.
    pub fn window_opened(&mut self, id: WindowId, focused: bool) -> HostResult<()> {
        let (sync, mut cx) = self.split();
        sync.window_opened(&mut cx, id, focused)
    }

    /// A window closed, taking its remaining tabs with it.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::UnknownWindow`] if it is not open.
    pub fn window_closed(&mut self, id: WindowId) -> HostResult<Vec<TabId>> {
        let (sync, mut cx) = self.split();
        let closed = sync.window_closed(&mut cx, id)?;
        for tab in &closed {
            self.attachments.detach_tab(*tab);
        }
        Ok(closed)
    }

    /// The host will never open window `id`; tabs held for it are dropped.
    ///
    /// # Errors
    ///
    /// Propagates host errors if `id` is open and gets closed instead.
    pub fn window_retired(&mut self, id: WindowId) -> HostResult<Vec<TabId>> {
        let (sync, mut cx) = self.split();
        let dropped = sync.window_retired(&mut cx, id)?;
        for tab in &dropped {
            self.attachments.detach_tab(*tab);
        }
        Ok(dropped)
    }

    /// Focus moved to `id`, or away from every window.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::UnknownWindow`] if `id` is not open.
    pub fn window_focused(&mut self, id: Option<WindowId>) -> HostResult<bool> {
        let (sync, mut cx) = self.split();
        sync.window_focused(&mut cx, id)
    }

    /// A tab opened. Returns whether it was announced right away.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::DuplicateTab`] if it is already open.
    pub fn tab_opened(
        &mut self,
        id: TabId,
        window: WindowId,
        properties: TabProperties,
    ) -> HostResult<bool> {
        let (sync, mut cx) = self.split();
        sync.tab_opened(&mut cx, id, window, properties)
    }

    /// A tab closed.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::UnknownTab`] if it is not open.
    pub fn tab_closed(&mut self, id: TabId) -> HostResult<()> {
        let (sync, mut cx) = self.split();
        sync.tab_closed(&mut cx, id)?;
        self.attachments.detach_tab(id);
        Ok(())
    }

    /// A tab became active in its window.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::UnknownTab`] if it is not open.
    pub fn tab_activated(&mut self, id: TabId) -> HostResult<()> {
        let (sync, mut cx) = self.split();
        sync.tab_activated(&mut cx, id)
    }

    /// The selection of `window` changed.
    ///
    /// # Errors
    ///
    /// Returns a host error if the window is not open or a tab is elsewhere.
    pub fn tabs_selected(&mut self, window: WindowId, tabs: &[TabId]) -> HostResult<()> {
        let (sync, mut cx) = self.split();
        sync.tabs_selected(&mut cx, window, tabs)
    }

    /// Properties of a tab changed. Navigation drops its page contexts.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::UnknownTab`] if it is not open.
    pub fn tab_updated(
        &mut self,
        id: TabId,
        update: TabUpdate,
    ) -> HostResult<BTreeSet<TabProperty>> {
        let (sync, mut cx) = self.split();
        let changed = sync.tab_updated(&mut cx, id, update)?;
        if changed.contains(&TabProperty::Url) {
            let dropped = self.attachments.detach_tab(id);
            if dropped > 0 {
                debug!(tab_id = %id, dropped, "Navigation dropped page contexts");
            }
        }
        Ok(changed)
    }

    /// The content context of `extension_id` is ready in `tab`.
    ///
    /// Returns `false` if it was already recorded.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::UnknownTab`] if the tab is not open.
    pub fn page_context_ready(
        &mut self,
        tab: TabId,
        extension_id: ExtensionId,
    ) -> HostResult<bool> {
        if self.host.tab(tab).is_none() {
            return Err(HostError::UnknownTab(tab));
        }
        debug!(tab_id = %tab, extension_id = %extension_id, "Page context ready");
        Ok(self.attachments.attach(tab, extension_id))
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Install a package. It is enabled but not loaded.
    ///
    /// # Errors
    ///
    /// See [`LifecycleController::install`].
    pub async fn install(&mut self, source: PackageSource) -> InstallationResult<ExtensionPackage> {
        self.lifecycle.install(source).await
    }

    /// Replace an installed package with a new version.
    ///
    /// # Errors
    ///
    /// See [`LifecycleController::update`].
    pub async fn update(
        &mut self,
        id: &ExtensionId,
        source: PackageSource,
    ) -> LifecycleResult<ExtensionPackage> {
        self.lifecycle.update(id, source).await
    }

    /// Unload if needed, then remove the package, its ledger rows and its
    /// page contexts.
    ///
    /// # Errors
    ///
    /// See [`LifecycleController::uninstall`].
    pub async fn uninstall(&mut self, id: &ExtensionId) -> LifecycleResult<()> {
        self.lifecycle.uninstall(id).await?;
        self.attachments.detach_extension(id);
        Ok(())
    }

    /// Set the enabled flag and load.
    ///
    /// # Errors
    ///
    /// See [`LifecycleController::enable`].
    pub async fn enable(&mut self, id: &ExtensionId) -> LifecycleResult<()> {
        self.lifecycle.enable(id).await
    }

    /// Unload and clear the enabled flag.
    ///
    /// # Errors
    ///
    /// See [`LifecycleController::disable`].
    pub async fn disable(&mut self, id: &ExtensionId) -> LifecycleResult<()> {
        self.lifecycle.disable(id).await
    }

    /// Load an enabled package into the runtime.
    ///
    /// # Errors
    ///
    /// See [`LifecycleController::load`].
    pub async fn load(&mut self, id: &ExtensionId) -> LifecycleResult<()> {
        self.lifecycle.load(id).await
    }

    /// Unload a loaded package.
    ///
    /// # Errors
    ///
    /// See [`LifecycleController::unload`].
    pub async fn unload(&mut self, id: &ExtensionId) -> LifecycleResult<()> {
        self.lifecycle.unload(id).await
    }

    /// Restore persisted packages at startup.
    ///
    /// # Errors
    ///
    /// See [`LifecycleController::restore`].
    pub async fn restore(&mut self) -> LifecycleResult<RestoreReport> {
        self.lifecycle.restore().await
    }

    /// State of an installed package.
    #[must_use]
    pub fn package_state(&self, id: &ExtensionId) -> Option<PackageState> {
        self.lifecycle.state(id)
    }

    // -----------------------------------------------------------------------
    // Permissions
    // -----------------------------------------------------------------------

    /// Prompt for every undecided item of the package manifest and apply the
    /// result to the live runtime context.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::UnknownPackage`] or a ledger error.
    pub async fn request_permissions(
        &mut self,
        id: &ExtensionId,
        presenter: &dyn PermissionPresenter,
    ) -> BridgeResult<PromptOutcome> {
        let package = self
            .lifecycle
            .package(id)
            .ok_or_else(|| LifecycleError::UnknownPackage(id.clone()))?;
        let request = package.manifest.permissions.clone();
        let display_name = package.manifest.name.clone();

        let outcome = self
            .ledger
            .prompt(id, &display_name, &request, presenter, self.prompt_timeout)
            .await?;
        if !outcome.decisions().is_empty() {
            self.lifecycle.sync_grants(id).await?;
        }
        Ok(outcome)
    }

    /// Record a user decision over the full manifest request without a
    /// prompt. Items outside `granted` are denied.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::UnknownPackage`] or a ledger error.
    pub async fn decide(
        &mut self,
        id: &ExtensionId,
        granted: &GrantSet,
    ) -> BridgeResult<Vec<PermissionDecision>> {
        let request = self
            .lifecycle
            .package(id)
            .ok_or_else(|| LifecycleError::UnknownPackage(id.clone()))?
            .manifest
            .permissions
            .clone();
        let decisions = self
            .ledger
            .decide(id, &request, granted, DecisionSource::User)
            .await?;
        self.lifecycle.sync_grants(id).await?;
        Ok(decisions)
    }

    /// Deny `items` and apply the change to the live runtime context before
    /// returning.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::UnknownPackage`] or a ledger error.
    pub async fn revoke(
        &mut self,
        id: &ExtensionId,
        items: &[PermissionItem],
    ) -> BridgeResult<GrantSet> {
        self.ledger.revoke(id, items).await?;
        Ok(self.lifecycle.sync_grants(id).await?)
    }

    /// Reseed the live runtime context from the ledger.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::UnknownPackage`] or a ledger error.
    pub async fn sync_grants(&mut self, id: &ExtensionId) -> BridgeResult<GrantSet> {
        Ok(self.lifecycle.sync_grants(id).await?)
    }

    /// The granted set as recorded in the ledger.
    ///
    /// # Errors
    ///
    /// Returns a ledger error.
    pub async fn current_grants(&self, id: &ExtensionId) -> BridgeResult<GrantSet> {
        Ok(self.ledger.current_grants(id).await?)
    }

    /// Check an API permission against the live runtime context.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError::Denied`] if the package is not loaded, the
    /// permission is not granted, or grants were narrowed outside the bridge.
    pub fn require_permission(
        &self,
        id: &ExtensionId,
        permission: Permission,
    ) -> Result<(), PermissionError> {
        let item = PermissionItem::Api(permission);
        let epoch = self.ledger.revocation_epoch(id).ok();
        match self.lifecycle.context(id) {
            Some(context)
                if epoch == Some(context.grants_epoch) && context.grants.contains(&item) =>
            {
                Ok(())
            },
            _ => Err(PermissionError::Denied {
                extension_id: id.clone(),
                item,
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Injection
    // -----------------------------------------------------------------------

    /// Admit an injection against the current state.
    ///
    /// # Errors
    ///
    /// See [`ScriptInjectionBridge::prepare`].
    pub fn prepare_injection(
        &mut self,
        request: InjectionRequest,
    ) -> InjectionResult<PreparedInjection> {
        let context = self.lifecycle.context(&request.extension_id);
        let scope = InjectionScope {
            host: &self.host,
            adapters: &mut self.adapters,
            context,
            ledger: &self.ledger,
            attachments: &self.attachments,
            runtime: Arc::clone(&self.runtime),
            events: &self.events,
        };
        self.injection.prepare(request, scope)
    }

    /// Admit and run an injection.
    ///
    /// # Errors
    ///
    /// See [`ScriptInjectionBridge::prepare`] and
    /// [`PreparedInjection::execute`].
    pub async fn inject(&mut self, request: InjectionRequest) -> InjectionResult<InjectionOutcome> {
        self.prepare_injection(request)?.execute().await
    }
}

#[cfg(test)]
#[path = "bridge_tests.rs"]
mod tests;
