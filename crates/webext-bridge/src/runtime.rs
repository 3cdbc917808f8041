//! Extension runtime collaborator contract.
//!
//! The runtime is a black box that loads packages, executes scripts and
//! tracks the tabs and windows it was told about. The bridge drives it
//! through [`ExtensionRuntime`]. Tab and window notifications are synchronous
//! and receive the [`HostModel`] so the runtime can resolve adapters while
//! the call is in progress.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use webext_core::{ExtensionId, GrantSet, InjectionWorld, PermissionItem, PermissionStatus};

use crate::adapter::{TabAdapter, WindowAdapter};
use crate::error::RuntimeResult;
use crate::host::{HostModel, TabProperty};
use crate::injection::ScriptPayload;
use crate::manifest::ExtensionManifest;

/// State the runtime needs to run one loaded package.
///
/// Exists exactly while the package is loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeContext {
    /// Package id.
    pub extension_id: ExtensionId,
    /// Currently granted permissions and host patterns.
    pub grants: GrantSet,
    /// Ledger revocation epoch `grants` was read at. Admission fails closed
    /// once the ledger has moved past it.
    pub grants_epoch: u64,
    /// Package install directory.
    pub install_path: PathBuf,
    /// Validated manifest.
    pub manifest: ExtensionManifest,
}

/// How a native script execution failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeFailureKind {
    /// The runtime cannot service this request (unsupported world,
    /// restricted execution context). Eligible for the fallback.
    CapabilityGap,
    /// The target page is gone or not reachable.
    TargetUnreachable,
    /// The runtime refused on permission grounds.
    PermissionDenied,
    /// Anything else.
    Other,
}

impl fmt::Display for NativeFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CapabilityGap => f.write_str("capability gap"),
            Self::TargetUnreachable => f.write_str("target unreachable"),
            Self::PermissionDenied => f.write_str("permission denied"),
            Self::Other => f.write_str("other"),
        }
    }
}

/// A classified native script execution failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct NativeInjectionError {
    /// Failure class.
    pub kind: NativeFailureKind,
    /// Runtime-provided message.
    pub message: String,
}

impl NativeInjectionError {
    /// Create an error.
    #[must_use]
    pub fn new(kind: NativeFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// The extension runtime.
#[async_trait]
pub trait ExtensionRuntime: Send + Sync {
    /// Make a newly installed package known to the runtime.
    async fn register_package(&self, _extension_id: &ExtensionId) -> RuntimeResult<()> {
        Ok(())
    }

    /// Forget an uninstalled package.
    async fn unregister_package(&self, _extension_id: &ExtensionId) -> RuntimeResult<()> {
        Ok(())
    }

    /// Start the package's script contexts.
    async fn load(&self, context: &RuntimeContext) -> RuntimeResult<()>;

    /// Stop the package's script contexts.
    async fn unload(&self, extension_id: &ExtensionId) -> RuntimeResult<()>;

    /// Update one permission or host pattern of a loaded package.
    fn set_permission_status(
        &self,
        extension_id: &ExtensionId,
        item: &PermissionItem,
        status: PermissionStatus,
    );

    /// Run a script in a tab through the native API.
    async fn execute_script(
        &self,
        extension_id: &ExtensionId,
        tab: &Arc<TabAdapter>,
        world: InjectionWorld,
        payload: &ScriptPayload,
    ) -> Result<Vec<serde_json::Value>, NativeInjectionError>;

    // -----------------------------------------------------------------------
    // Tab and window notifications
    // -----------------------------------------------------------------------

    /// A window opened.
    fn did_open_window(&self, _host: &HostModel, _window: &Arc<WindowAdapter>) {}

    /// A window closed. Its tabs were closed before this call.
    fn did_close_window(&self, _host: &HostModel, _window: &Arc<WindowAdapter>) {}

    /// The focused window changed. `None` means no window has focus.
    fn did_focus_window(&self, _host: &HostModel, _window: Option<&Arc<WindowAdapter>>) {}

    /// A tab opened in an announced window.
    fn did_open_tab(
        &self,
        _host: &HostModel,
        _tab: &Arc<TabAdapter>,
        _window: &Arc<WindowAdapter>,
    ) {
    }

    /// A tab is closing. The adapter still resolves during this call.
    fn did_close_tab(&self, _host: &HostModel, _tab: &Arc<TabAdapter>, _window_closing: bool) {}

    /// A tab became active. `previous` was active before it.
    fn did_activate_tab(
        &self,
        _host: &HostModel,
        _tab: &Arc<TabAdapter>,
        _previous: Option<&Arc<TabAdapter>>,
    ) {
    }

    /// The selection of a window changed. `tabs` is the new selection.
    fn did_select_tabs(&self, _host: &HostModel, _tabs: &[Arc<TabAdapter>]) {}

    /// Tabs left the selection.
    fn did_deselect_tabs(&self, _host: &HostModel, _tabs: &[Arc<TabAdapter>]) {}

    /// One batch of tab property changes.
    fn did_change_tab_properties(
        &self,
        _host: &HostModel,
        _tab: &Arc<TabAdapter>,
        _changed: &BTreeSet<TabProperty>,
    ) {
    }
}
