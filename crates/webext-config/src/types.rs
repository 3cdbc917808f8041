//! Configuration types.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use webext_core::{HostPattern, OriginPolicy, Permission, PermissionItem};
use webext_telemetry::LogConfig;

use crate::error::{ConfigError, ConfigResult};

/// Top-level bridge configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Script injection settings.
    pub injection: InjectionConfig,
    /// Origins that are never injectable.
    pub origins: OriginsConfig,
    /// Permission policy.
    pub permissions: PermissionsConfig,
    /// Permission prompt settings.
    pub prompt: PromptConfig,
    /// Event bus settings.
    pub events: EventsConfig,
    /// Logging settings.
    pub logging: LogConfig,
}

/// `[injection]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InjectionConfig {
    /// How long an injection may run before it is abandoned.
    pub timeout_ms: u64,
    /// Whether the page-context fallback may be used on capability gaps.
    pub fallback_enabled: bool,
}

impl Default for InjectionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            fallback_enabled: true,
        }
    }
}

impl InjectionConfig {
    /// The timeout as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// `[origins]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OriginsConfig {
    /// Lowercase schemes whose pages are injectable. Every other scheme is
    /// restricted. Entries must be schemes a host pattern can name.
    pub content_schemes: Vec<String>,
    /// Lowercase hosts that are never injectable.
    pub restricted_hosts: Vec<String>,
}

impl Default for OriginsConfig {
    fn default() -> Self {
        let policy = OriginPolicy::default();
        Self {
            content_schemes: policy.content_schemes.into_iter().collect(),
            restricted_hosts: policy.restricted_hosts.into_iter().collect(),
        }
    }
}

impl OriginsConfig {
    /// Build the origin policy.
    #[must_use]
    pub fn policy(&self) -> OriginPolicy {
        OriginPolicy {
            content_schemes: self.content_schemes.iter().cloned().collect(),
            restricted_hosts: self.restricted_hosts.iter().cloned().collect(),
        }
    }
}

/// `[permissions]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionsConfig {
    /// Explicit auto-grant allow-list.
    pub auto_grant: AutoGrantConfig,
}

/// `[permissions.auto_grant]`
///
/// Items listed here are granted at install time without a prompt, but only
/// when the manifest requests them and no explicit user decision exists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoGrantConfig {
    /// API permission names.
    pub permissions: Vec<String>,
    /// Host match patterns.
    pub host_patterns: Vec<String>,
}

impl AutoGrantConfig {
    /// Parse the allow-list into ledger items.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] for an entry that does not
    /// parse.
    pub fn items(&self) -> ConfigResult<Vec<PermissionItem>> {
        let mut items = Vec::with_capacity(
            self.permissions
                .len()
                .saturating_add(self.host_patterns.len()),
        );
        for name in &self.permissions {
            let permission: Permission =
                name.parse().map_err(|e| ConfigError::ValidationError {
                    field: "permissions.auto_grant.permissions".to_owned(),
                    message: format!("{e}"),
                })?;
            items.push(PermissionItem::Api(permission));
        }
        for pattern in &self.host_patterns {
            let pattern: HostPattern =
                pattern.parse().map_err(|e| ConfigError::ValidationError {
                    field: "permissions.auto_grant.host_patterns".to_owned(),
                    message: format!("{e}"),
                })?;
            items.push(PermissionItem::Host(pattern));
        }
        Ok(items)
    }

    /// Whether the allow-list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty() && self.host_patterns.is_empty()
    }
}

/// `[prompt]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// How long a prompt may stay open before it counts as dismissed.
    pub timeout_ms: u64,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 300_000,
        }
    }
}

impl PromptConfig {
    /// The timeout as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// `[events]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Broadcast channel capacity.
    pub capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { capacity: 256 }
    }
}
