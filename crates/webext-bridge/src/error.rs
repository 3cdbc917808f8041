//! Error types for the bridge.

use webext_core::{ExtensionId, RestrictedReason, TabId, WindowId};
use webext_permissions::{LedgerError, PermissionError};
use webext_storage::StorageError;

/// Failures reported by the runtime collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    /// The runtime refused the operation.
    #[error("runtime rejected the operation: {0}")]
    Rejected(String),

    /// The runtime is not reachable.
    #[error("runtime unavailable: {0}")]
    Unavailable(String),
}

/// Result type for runtime collaborator calls.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Inconsistent host notifications.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    /// A tab id was reported open twice.
    #[error("{0} is already open")]
    DuplicateTab(TabId),

    /// A window id was reported open twice.
    #[error("{0} is already open")]
    DuplicateWindow(WindowId),

    /// The tab is not open.
    #[error("{0} is not open")]
    UnknownTab(TabId),

    /// The window is not open.
    #[error("{0} is not open")]
    UnknownWindow(WindowId),

    /// A tab was reported as belonging to a different window.
    #[error("{tab} does not belong to {window}")]
    WrongWindow {
        /// Reported tab.
        tab: TabId,
        /// Reported window.
        window: WindowId,
    },
}

/// Result type for host notifications.
pub type HostResult<T> = Result<T, HostError>;

/// Failures while installing or updating a package.
#[derive(Debug, thiserror::Error)]
pub enum InstallationError {
    /// A package with this id is already installed.
    #[error("{0} is already installed")]
    AlreadyInstalled(ExtensionId),

    /// The package contents could not be extracted.
    #[error("failed to extract {id}: {reason}")]
    Extraction {
        /// Package being installed.
        id: ExtensionId,
        /// Collaborator-provided reason.
        reason: String,
    },

    /// The manifest failed validation.
    #[error("invalid manifest for {id}: {reason}")]
    InvalidManifest {
        /// Package being installed.
        id: ExtensionId,
        /// Collaborator-provided reason.
        reason: String,
    },

    /// The runtime refused to register the package.
    #[error("runtime rejected {id}: {reason}")]
    RuntimeRejected {
        /// Package being installed.
        id: ExtensionId,
        /// Runtime-provided reason.
        reason: String,
    },

    /// The package id in an update does not match the installed package.
    #[error("update for {expected} carries package id {actual}")]
    IdMismatch {
        /// Installed package.
        expected: ExtensionId,
        /// Id found in the update.
        actual: ExtensionId,
    },

    /// Persisting the package failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Registering with the ledger failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Result type for installation.
pub type InstallationResult<T> = Result<T, InstallationError>;

/// Failures of lifecycle transitions.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// No package with this id is installed.
    #[error("{0} is not installed")]
    UnknownPackage(ExtensionId),

    /// Load was requested for a disabled package.
    #[error("{0} is disabled and cannot be loaded")]
    LoadWhileDisabled(ExtensionId),

    /// Unload was requested for a package that is not loaded.
    #[error("{0} is not loaded")]
    UnloadNotLoaded(ExtensionId),

    /// The runtime refused a load or unload.
    #[error("runtime rejected the transition of {id}: {reason}")]
    TransitionRejectedByRuntime {
        /// Package being transitioned.
        id: ExtensionId,
        /// Runtime-provided reason.
        reason: String,
    },

    /// Internal state contradicts a lifecycle invariant. Nothing was mutated.
    #[error("lifecycle invariant violated: {0}")]
    InvariantViolation(String),

    /// Re-validating an update failed.
    #[error(transparent)]
    Installation(#[from] InstallationError),

    /// Persisting the package failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Reading or writing the ledger failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Result type for lifecycle transitions.
pub type LifecycleResult<T> = Result<T, LifecycleError>;

/// Failures of a script injection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InjectionError {
    /// The target tab is closed or was never open.
    #[error("no target tab {0}")]
    NoTargetTab(TabId),

    /// The target page is never injectable.
    #[error("{tab} has a restricted origin: {reason}")]
    RestrictedOrigin {
        /// Target tab.
        tab: TabId,
        /// Why the origin is restricted.
        reason: RestrictedReason,
    },

    /// The extension may not access the target page.
    #[error("{extension_id} may not inject into {tab}: {detail}")]
    PermissionDenied {
        /// Requesting extension.
        extension_id: ExtensionId,
        /// Target tab.
        tab: TabId,
        /// What was missing.
        detail: String,
    },

    /// The requesting extension has no runtime context.
    #[error("{0} is not loaded")]
    ExtensionNotLoaded(ExtensionId),

    /// The runtime cannot service the request and no fallback is available.
    #[error("capability gap: {0}")]
    CapabilityGap(String),

    /// The runtime failed for a reason outside the classified kinds.
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl InjectionError {
    /// Whether the failure is expected churn rather than a fault (the tab
    /// closed while the request was in flight).
    #[must_use]
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::NoTargetTab(_))
    }
}

/// Result type for injection.
pub type InjectionResult<T> = Result<T, InjectionError>;

/// Any bridge failure.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Inconsistent host notification.
    #[error(transparent)]
    Host(#[from] HostError),

    /// Installation failed.
    #[error(transparent)]
    Installation(#[from] InstallationError),

    /// A lifecycle transition failed.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// Injection failed.
    #[error(transparent)]
    Injection(#[from] InjectionError),

    /// A permission check failed.
    #[error(transparent)]
    Permission(#[from] PermissionError),

    /// The ledger failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Storage failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Configuration could not be applied.
    #[error(transparent)]
    Config(#[from] webext_config::ConfigError),

    /// Logging could not be initialized.
    #[error(transparent)]
    Telemetry(#[from] webext_telemetry::TelemetryError),
}

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;
