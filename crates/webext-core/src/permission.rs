//! API permissions, ledger items, and grant sets.
//!
//! Permissions are compared structurally. A manifest string such as
//! `"storage"` is parsed once into [`Permission::Storage`]; unknown names are
//! kept as [`Permission::Other`] so they can still be recorded and denied.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{CoreError, CoreResult};
use crate::pattern::HostPattern;

/// An API permission an extension can request.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Permission {
    /// Temporary host access to the active tab after a user gesture.
    ActiveTab,
    /// `alarms` API.
    Alarms,
    /// Read from the clipboard.
    ClipboardRead,
    /// Write to the clipboard.
    ClipboardWrite,
    /// `contextMenus` / `menus` API.
    ContextMenus,
    /// `cookies` API.
    Cookies,
    /// `declarativeNetRequest` API.
    DeclarativeNetRequest,
    /// `declarativeNetRequestFeedback` API.
    DeclarativeNetRequestFeedback,
    /// `declarativeNetRequestWithHostAccess` API.
    DeclarativeNetRequestWithHostAccess,
    /// `nativeMessaging` API.
    NativeMessaging,
    /// `notifications` API.
    Notifications,
    /// `scripting` API.
    Scripting,
    /// `storage` API.
    Storage,
    /// `tabs` API (URL/title visibility).
    Tabs,
    /// `unlimitedStorage`.
    UnlimitedStorage,
    /// `webNavigation` API.
    WebNavigation,
    /// `webRequest` API.
    WebRequest,
    /// A permission this bridge does not model specifically.
    Other(String),
}

impl Permission {
    /// The manifest spelling of this permission.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::ActiveTab => "activeTab",
            Self::Alarms => "alarms",
            Self::ClipboardRead => "clipboardRead",
            Self::ClipboardWrite => "clipboardWrite",
            Self::ContextMenus => "contextMenus",
            Self::Cookies => "cookies",
            Self::DeclarativeNetRequest => "declarativeNetRequest",
            Self::DeclarativeNetRequestFeedback => "declarativeNetRequestFeedback",
            Self::DeclarativeNetRequestWithHostAccess => "declarativeNetRequestWithHostAccess",
            Self::NativeMessaging => "nativeMessaging",
            Self::Notifications => "notifications",
            Self::Scripting => "scripting",
            Self::Storage => "storage",
            Self::Tabs => "tabs",
            Self::UnlimitedStorage => "unlimitedStorage",
            Self::WebNavigation => "webNavigation",
            Self::WebRequest => "webRequest",
            Self::Other(name) => name,
        }
    }
}

impl FromStr for Permission {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.chars().any(char::is_whitespace) {
            return Err(CoreError::InvalidPermission(s.to_string()));
        }
        Ok(match s {
            "activeTab" => Self::ActiveTab,
            "alarms" => Self::Alarms,
            "clipboardRead" => Self::ClipboardRead,
            "clipboardWrite" => Self::ClipboardWrite,
            // `menus` is the Firefox alias.
            "contextMenus" | "menus" => Self::ContextMenus,
            "cookies" => Self::Cookies,
            "declarativeNetRequest" => Self::DeclarativeNetRequest,
            "declarativeNetRequestFeedback" => Self::DeclarativeNetRequestFeedback,
            "declarativeNetRequestWithHostAccess" => Self::DeclarativeNetRequestWithHostAccess,
            "nativeMessaging" => Self::NativeMessaging,
            "notifications" => Self::Notifications,
            "scripting" => Self::Scripting,
            "storage" => Self::Storage,
            "tabs" => Self::Tabs,
            "unlimitedStorage" => Self::UnlimitedStorage,
            "webNavigation" => Self::WebNavigation,
            "webRequest" => Self::WebRequest,
            other => Self::Other(other.to_string()),
        })
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Permission {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Permission {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One row subject in the permission ledger: an API permission or a host pattern.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PermissionItem {
    /// An API permission.
    Api(Permission),
    /// A host match pattern.
    Host(HostPattern),
}

impl PermissionItem {
    /// Stable key used to store the decision for this item.
    #[must_use]
    pub fn storage_key(&self) -> String {
        match self {
            Self::Api(p) => format!("api:{p}"),
            Self::Host(h) => format!("host:{h}"),
        }
    }

    /// Parse a key produced by [`storage_key`](Self::storage_key).
    ///
    /// # Errors
    ///
    /// Returns a [`CoreError`] if the key has no known prefix or the payload
    /// does not parse.
    pub fn from_storage_key(key: &str) -> CoreResult<Self> {
        if let Some(rest) = key.strip_prefix("api:") {
            return Ok(Self::Api(rest.parse()?));
        }
        if let Some(rest) = key.strip_prefix("host:") {
            return Ok(Self::Host(rest.parse()?));
        }
        Err(CoreError::InvalidPermission(key.to_string()))
    }
}

impl fmt::Display for PermissionItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Api(p) => write!(f, "{p}"),
            Self::Host(h) => write!(f, "{h}"),
        }
    }
}

impl From<Permission> for PermissionItem {
    fn from(p: Permission) -> Self {
        Self::Api(p)
    }
}

impl From<HostPattern> for PermissionItem {
    fn from(h: HostPattern) -> Self {
        Self::Host(h)
    }
}

/// Status of a recorded permission decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    /// The user (or an explicit policy) granted the item.
    GrantedExplicitly,
    /// The user denied, dismissed, or revoked the item.
    DeniedExplicitly,
    /// No decision has been recorded.
    Undecided,
}

impl PermissionStatus {
    /// Whether this status grants access.
    #[must_use]
    pub fn is_granted(self) -> bool {
        matches!(self, Self::GrantedExplicitly)
    }
}

/// The set of granted API permissions and host patterns for one extension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantSet {
    /// Granted API permissions.
    pub permissions: BTreeSet<Permission>,
    /// Granted host patterns.
    pub host_patterns: BTreeSet<HostPattern>,
}

impl GrantSet {
    /// Create an empty grant set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a grant set from a list of items.
    #[must_use]
    pub fn from_items<I>(items: I) -> Self
    where
        I: IntoIterator<Item = PermissionItem>,
    {
        let mut set = Self::new();
        for item in items {
            set.insert(item);
        }
        set
    }

    /// Add an item. Returns `true` if it was not already present.
    pub fn insert(&mut self, item: PermissionItem) -> bool {
        match item {
            PermissionItem::Api(p) => self.permissions.insert(p),
            PermissionItem::Host(h) => self.host_patterns.insert(h),
        }
    }

    /// Remove an item. Returns `true` if it was present.
    pub fn remove(&mut self, item: &PermissionItem) -> bool {
        match item {
            PermissionItem::Api(p) => self.permissions.remove(p),
            PermissionItem::Host(h) => self.host_patterns.remove(h),
        }
    }

    /// Whether the exact item is in the set.
    #[must_use]
    pub fn contains(&self, item: &PermissionItem) -> bool {
        match item {
            PermissionItem::Api(p) => self.permissions.contains(p),
            PermissionItem::Host(h) => self.host_patterns.contains(h),
        }
    }

    /// Whether any granted host pattern covers `url`.
    #[must_use]
    pub fn allows_url(&self, url: &Url) -> bool {
        self.host_patterns.iter().any(|p| p.matches(url))
    }

    /// Iterate over every item in the set.
    pub fn items(&self) -> impl Iterator<Item = PermissionItem> + '_ {
        self.permissions
            .iter()
            .cloned()
            .map(PermissionItem::Api)
            .chain(self.host_patterns.iter().cloned().map(PermissionItem::Host))
    }

    /// Whether nothing is granted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty() && self.host_patterns.is_empty()
    }
}
