//! Bridge event types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use webext_core::{ExtensionId, GrantSet, InjectionPath, TabId};

/// Metadata attached to every event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// When the event was created.
    pub timestamp: DateTime<Utc>,
    /// Operation that produced the event, if it was correlated.
    pub correlation_id: Option<Uuid>,
    /// Component that produced the event.
    pub source: String,
}

impl EventMetadata {
    /// Create metadata for an event produced by `source`.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            correlation_id: None,
            source: source.into(),
        }
    }

    /// Attach a correlation id.
    #[must_use]
    pub fn with_correlation_id(mut self, id: Uuid) -> Self {
        self.correlation_id = Some(id);
        self
    }
}

/// A management-visible bridge outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeEvent {
    /// A package was validated and persisted.
    PackageInstalled {
        /// Event metadata.
        metadata: EventMetadata,
        /// Installed package.
        extension_id: ExtensionId,
        /// Manifest version.
        version: String,
    },
    /// A package was replaced with a new version.
    PackageUpdated {
        /// Event metadata.
        metadata: EventMetadata,
        /// Updated package.
        extension_id: ExtensionId,
        /// Version before the update.
        previous_version: String,
        /// Version after the update.
        version: String,
    },
    /// A package's enabled flag was set.
    PackageEnabled {
        /// Event metadata.
        metadata: EventMetadata,
        /// Enabled package.
        extension_id: ExtensionId,
    },
    /// A package's enabled flag was cleared.
    PackageDisabled {
        /// Event metadata.
        metadata: EventMetadata,
        /// Disabled package.
        extension_id: ExtensionId,
    },
    /// The runtime accepted a load.
    PackageLoaded {
        /// Event metadata.
        metadata: EventMetadata,
        /// Loaded package.
        extension_id: ExtensionId,
    },
    /// The runtime rejected a load; the package stays enabled but unloaded.
    PackageLoadFailed {
        /// Event metadata.
        metadata: EventMetadata,
        /// Package that failed to load.
        extension_id: ExtensionId,
        /// Runtime-provided reason.
        reason: String,
    },
    /// The package was unloaded from the runtime.
    PackageUnloaded {
        /// Event metadata.
        metadata: EventMetadata,
        /// Unloaded package.
        extension_id: ExtensionId,
    },
    /// A package and its ledger rows were removed.
    PackageUninstalled {
        /// Event metadata.
        metadata: EventMetadata,
        /// Removed package.
        extension_id: ExtensionId,
    },
    /// The granted set of a package changed.
    PermissionsChanged {
        /// Event metadata.
        metadata: EventMetadata,
        /// Affected package.
        extension_id: ExtensionId,
        /// Grants after the change.
        granted: GrantSet,
    },
    /// An injection ran to completion.
    InjectionCompleted {
        /// Event metadata.
        metadata: EventMetadata,
        /// Requesting package.
        extension_id: ExtensionId,
        /// Target tab.
        tab_id: TabId,
        /// Path that serviced the request.
        path: InjectionPath,
    },
    /// The fallback was attempted and failed.
    InjectionDegraded {
        /// Event metadata.
        metadata: EventMetadata,
        /// Requesting package.
        extension_id: ExtensionId,
        /// Target tab.
        tab_id: TabId,
        /// Why the fallback did not complete.
        reason: String,
    },
    /// An injection timed out or was cancelled.
    InjectionAbandoned {
        /// Event metadata.
        metadata: EventMetadata,
        /// Requesting package.
        extension_id: ExtensionId,
        /// Target tab.
        tab_id: TabId,
    },
}

impl BridgeEvent {
    /// Stable snake-case name of the event kind.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::PackageInstalled { .. } => "package_installed",
            Self::PackageUpdated { .. } => "package_updated",
            Self::PackageEnabled { .. } => "package_enabled",
            Self::PackageDisabled { .. } => "package_disabled",
            Self::PackageLoaded { .. } => "package_loaded",
            Self::PackageLoadFailed { .. } => "package_load_failed",
            Self::PackageUnloaded { .. } => "package_unloaded",
            Self::PackageUninstalled { .. } => "package_uninstalled",
            Self::PermissionsChanged { .. } => "permissions_changed",
            Self::InjectionCompleted { .. } => "injection_completed",
            Self::InjectionDegraded { .. } => "injection_degraded",
            Self::InjectionAbandoned { .. } => "injection_abandoned",
        }
    }

    /// The event metadata.
    #[must_use]
    pub fn metadata(&self) -> &EventMetadata {
        match self {
            Self::PackageInstalled { metadata, .. }
            | Self::PackageUpdated { metadata, .. }
            | Self::PackageEnabled { metadata, .. }
            | Self::PackageDisabled { metadata, .. }
            | Self::PackageLoaded { metadata, .. }
            | Self::PackageLoadFailed { metadata, .. }
            | Self::PackageUnloaded { metadata, .. }
            | Self::PackageUninstalled { metadata, .. }
            | Self::PermissionsChanged { metadata, .. }
            | Self::InjectionCompleted { metadata, .. }
            | Self::InjectionDegraded { metadata, .. }
            | Self::InjectionAbandoned { metadata, .. } => metadata,
        }
    }

    /// The package the event concerns.
    #[must_use]
    pub fn extension_id(&self) -> &ExtensionId {
        match self {
            Self::PackageInstalled { extension_id, .. }
            | Self::PackageUpdated { extension_id, .. }
            | Self::PackageEnabled { extension_id, .. }
            | Self::PackageDisabled { extension_id, .. }
            | Self::PackageLoaded { extension_id, .. }
            | Self::PackageLoadFailed { extension_id, .. }
            | Self::PackageUnloaded { extension_id, .. }
            | Self::PackageUninstalled { extension_id, .. }
            | Self::PermissionsChanged { extension_id, .. }
            | Self::InjectionCompleted { extension_id, .. }
            | Self::InjectionDegraded { extension_id, .. }
            | Self::InjectionAbandoned { extension_id, .. } => extension_id,
        }
    }

    /// Whether the event reports an injection outcome.
    #[must_use]
    pub fn is_injection_event(&self) -> bool {
        matches!(
            self,
            Self::InjectionCompleted { .. }
                | Self::InjectionDegraded { .. }
                | Self::InjectionAbandoned { .. }
        )
    }
}
