//! Manifest collaborator contract.
//!
//! Parsing and validating a package manifest happen outside the bridge. The
//! bridge only sees the validated result.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use webext_core::ExtensionId;
use webext_permissions::PermissionRequest;

/// The validated manifest data the bridge keeps per package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionManifest {
    /// Display name.
    pub name: String,
    /// Package version.
    pub version: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// Requested permissions and host patterns.
    #[serde(default)]
    pub permissions: PermissionRequest,
}

impl ExtensionManifest {
    /// A manifest with no permissions.
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: None,
            permissions: PermissionRequest::new(),
        }
    }

    /// Set the requested permissions.
    #[must_use]
    pub fn with_permissions(mut self, permissions: PermissionRequest) -> Self {
        self.permissions = permissions;
        self
    }
}

/// An extracted package awaiting validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSource {
    /// Package id.
    pub extension_id: ExtensionId,
    /// Directory the package was extracted into.
    pub install_path: PathBuf,
}

impl PackageSource {
    /// Create a source.
    #[must_use]
    pub fn new(extension_id: ExtensionId, install_path: impl Into<PathBuf>) -> Self {
        Self {
            extension_id,
            install_path: install_path.into(),
        }
    }
}

/// Why a package failed validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ManifestError {
    /// The package contents could not be read.
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// The manifest is malformed or unsupported.
    #[error("invalid manifest: {0}")]
    Invalid(String),
}

/// Validates package manifests.
#[async_trait]
pub trait ManifestValidator: Send + Sync {
    /// Validate the package at `source`.
    async fn validate(&self, source: &PackageSource) -> Result<ExtensionManifest, ManifestError>;
}
