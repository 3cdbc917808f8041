//! Explicit auto-grant policy.
//!
//! Nothing is granted without a user decision unless the host lists it here.

use std::collections::BTreeSet;

use webext_core::PermissionItem;

use crate::decision::PermissionRequest;

/// Items the host grants at install time without prompting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutoGrantPolicy {
    items: BTreeSet<PermissionItem>,
}

impl AutoGrantPolicy {
    /// A policy that grants nothing.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// A policy granting exactly `items`.
    #[must_use]
    pub fn new<I>(items: I) -> Self
    where
        I: IntoIterator<Item = PermissionItem>,
    {
        Self {
            items: items.into_iter().collect(),
        }
    }

    /// Whether the policy grants nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items that are both on the allow-list and in `request`.
    #[must_use]
    pub fn applicable(&self, request: &PermissionRequest) -> BTreeSet<PermissionItem> {
        self.items
            .iter()
            .filter(|item| request.covers(item))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use webext_core::Permission;

    #[test]
    fn test_only_requested_items_apply() {
        let policy = AutoGrantPolicy::new([
            PermissionItem::Api(Permission::Storage),
            PermissionItem::Api(Permission::Cookies),
        ]);
        let request = PermissionRequest::new()
            .with_permission(Permission::Storage)
            .with_permission(Permission::Tabs);

        let applicable = policy.applicable(&request);
        assert_eq!(applicable.len(), 1);
        assert!(applicable.contains(&PermissionItem::Api(Permission::Storage)));
        assert!(AutoGrantPolicy::none().applicable(&request).is_empty());
    }
}
