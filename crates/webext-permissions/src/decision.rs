//! Permission requests and recorded decisions.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use webext_core::{ExtensionId, HostPattern, Permission, PermissionItem, PermissionStatus, Timestamp};

/// The permissions and host patterns a manifest asks for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionRequest {
    /// Required API permissions.
    pub permissions: BTreeSet<Permission>,
    /// Optional API permissions.
    pub optional_permissions: BTreeSet<Permission>,
    /// Required host patterns.
    pub host_patterns: BTreeSet<HostPattern>,
    /// Optional host patterns.
    pub optional_host_patterns: BTreeSet<HostPattern>,
}

impl PermissionRequest {
    /// Create an empty request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a required API permission.
    #[must_use]
    pub fn with_permission(mut self, permission: Permission) -> Self {
        self.permissions.insert(permission);
        self
    }

    /// Add an optional API permission.
    #[must_use]
    pub fn with_optional_permission(mut self, permission: Permission) -> Self {
        self.optional_permissions.insert(permission);
        self
    }

    /// Add a required host pattern.
    #[must_use]
    pub fn with_host_pattern(mut self, pattern: HostPattern) -> Self {
        self.host_patterns.insert(pattern);
        self
    }

    /// Add an optional host pattern.
    #[must_use]
    pub fn with_optional_host_pattern(mut self, pattern: HostPattern) -> Self {
        self.optional_host_patterns.insert(pattern);
        self
    }

    /// Every requested-or-optional item, deduplicated and ordered.
    #[must_use]
    pub fn items(&self) -> BTreeSet<PermissionItem> {
        self.permissions
            .iter()
            .chain(&self.optional_permissions)
            .cloned()
            .map(PermissionItem::Api)
            .chain(
                self.host_patterns
                    .iter()
                    .chain(&self.optional_host_patterns)
                    .cloned()
                    .map(PermissionItem::Host),
            )
            .collect()
    }

    /// Whether the item is requested or optional.
    #[must_use]
    pub fn covers(&self, item: &PermissionItem) -> bool {
        match item {
            PermissionItem::Api(p) => {
                self.permissions.contains(p) || self.optional_permissions.contains(p)
            },
            PermissionItem::Host(h) => {
                self.host_patterns.contains(h) || self.optional_host_patterns.contains(h)
            },
        }
    }

    /// The subset of this request limited to `items`, keeping each item's
    /// required/optional classification.
    #[must_use]
    pub fn restricted_to(&self, items: &BTreeSet<PermissionItem>) -> Self {
        let api = |p: &Permission| items.contains(&PermissionItem::Api(p.clone()));
        let host = |h: &HostPattern| items.contains(&PermissionItem::Host(h.clone()));
        Self {
            permissions: self.permissions.iter().filter(|p| api(p)).cloned().collect(),
            optional_permissions: self
                .optional_permissions
                .iter()
                .filter(|p| api(p))
                .cloned()
                .collect(),
            host_patterns: self.host_patterns.iter().filter(|h| host(h)).cloned().collect(),
            optional_host_patterns: self
                .optional_host_patterns
                .iter()
                .filter(|h| host(h))
                .cloned()
                .collect(),
        }
    }

    /// Whether nothing is requested.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
            && self.optional_permissions.is_empty()
            && self.host_patterns.is_empty()
            && self.optional_host_patterns.is_empty()
    }
}

/// Who produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    /// An explicit choice in the permission prompt, or a revoke.
    User,
    /// The configured auto-grant allow-list.
    Policy,
    /// The prompt was dismissed or timed out.
    Dismissed,
}

impl DecisionSource {
    /// Whether the decision came from the user (choice or dismissal).
    #[must_use]
    pub fn is_user(self) -> bool {
        matches!(self, Self::User | Self::Dismissed)
    }
}

/// One persisted ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionDecision {
    /// Extension the decision belongs to.
    pub extension_id: ExtensionId,
    /// Permission or host pattern decided.
    pub item: PermissionItem,
    /// Recorded status.
    pub status: PermissionStatus,
    /// Origin of the decision.
    pub source: DecisionSource,
    /// When it was recorded.
    pub decided_at: Timestamp,
}

impl PermissionDecision {
    /// Create a decision stamped now.
    #[must_use]
    pub fn new(
        extension_id: ExtensionId,
        item: PermissionItem,
        status: PermissionStatus,
        source: DecisionSource,
    ) -> Self {
        Self {
            extension_id,
            item,
            status,
            source,
            decided_at: Timestamp::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_items_merge_required_and_optional() {
        let pattern: HostPattern = "*://*.example.com/*".parse().unwrap();
        let request = PermissionRequest::new()
            .with_permission(Permission::Storage)
            .with_optional_permission(Permission::Storage)
            .with_optional_permission(Permission::Tabs)
            .with_host_pattern(pattern.clone());

        let items = request.items();
        assert_eq!(items.len(), 3);
        assert!(request.covers(&PermissionItem::Host(pattern)));
        assert!(request.covers(&PermissionItem::Api(Permission::Tabs)));
        assert!(!request.covers(&PermissionItem::Api(Permission::Cookies)));
    }

    #[test]
    fn test_decision_serializes_structurally() {
        let decision = PermissionDecision::new(
            ExtensionId::new("reader").unwrap(),
            PermissionItem::Api(Permission::Storage),
            PermissionStatus::GrantedExplicitly,
            DecisionSource::User,
        );
        let json = serde_json::to_value(&decision).unwrap();
        assert_eq!(json["item"]["kind"], "api");
        assert_eq!(json["item"]["value"], "storage");
        assert_eq!(json["status"], "granted_explicitly");
        let back: PermissionDecision = serde_json::from_value(json).unwrap();
        assert_eq!(back, decision);
    }

    #[test]
    fn test_dismissal_counts_as_user_decision() {
        assert!(DecisionSource::Dismissed.is_user());
        assert!(!DecisionSource::Policy.is_user());
    }
}
