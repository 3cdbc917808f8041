//! Identifiers for extensions, tabs, and windows.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Longest extension identifier accepted.
const MAX_EXTENSION_ID_LEN: usize = 128;

/// Unique, stable identifier of an installed extension package.
///
/// Identifiers are ASCII alphanumerics plus `.`, `-` and `_`, which covers
/// both reverse-DNS bundle identifiers and store-assigned ids. They are used
/// as storage namespaces, so the character set is deliberately narrow.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ExtensionId(String);

impl<'de> Deserialize<'de> for ExtensionId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

impl ExtensionId {
    /// Create a validated extension identifier.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidExtensionId`] if the id is empty, too long,
    /// or contains characters outside the allowed set.
    pub fn new(id: impl Into<String>) -> CoreResult<Self> {
        let id = id.into();
        Self::validate(&id)?;
        Ok(Self(id))
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(id: &str) -> CoreResult<()> {
        if id.is_empty() {
            return Err(CoreError::InvalidExtensionId(
                "extension id must not be empty".into(),
            ));
        }
        if id.len() > MAX_EXTENSION_ID_LEN {
            return Err(CoreError::InvalidExtensionId(format!(
                "extension id exceeds {MAX_EXTENSION_ID_LEN} bytes"
            )));
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        {
            return Err(CoreError::InvalidExtensionId(format!(
                "extension id must contain only ASCII alphanumerics, '.', '-' or '_', got: {id}"
            )));
        }
        Ok(())
    }
}

impl fmt::Display for ExtensionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ExtensionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for ExtensionId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Host-assigned identifier of a logical tab.
///
/// The host may reuse a numeric id after the tab closes; identity across
/// reuse is tracked separately by the bridge's host model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub u64);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tab:{}", self.0)
    }
}

/// Host-assigned identifier of a logical window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowId(pub u64);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "window:{}", self.0)
    }
}
