//! Test fixtures for common values.

use std::path::Path;

use tempfile::TempDir;
use url::Url;
use webext_bridge::{ExtensionManifest, PackageSource, TabProperties};
use webext_core::{ExtensionId, GrantSet, HostPattern, Permission, PermissionItem};
use webext_permissions::PermissionRequest;

/// Host pattern used by [`test_manifest`].
pub const EXAMPLE_PATTERN: &str = "*://*.example.com/*";

/// Create a test extension id.
///
/// # Panics
///
/// Panics if `name` is not a valid extension id.
#[must_use]
pub fn test_extension_id(name: &str) -> ExtensionId {
    ExtensionId::new(name).expect("Invalid test extension id")
}

/// Parse a URL.
///
/// # Panics
///
/// Panics if `url` does not parse.
#[must_use]
pub fn test_url(url: &str) -> Url {
    Url::parse(url).expect("Invalid test URL")
}

/// Parse a host pattern.
///
/// # Panics
///
/// Panics if `pattern` does not parse.
#[must_use]
pub fn test_pattern(pattern: &str) -> HostPattern {
    pattern.parse().expect("Invalid test host pattern")
}

/// Properties of a tab showing `url`.
#[must_use]
pub fn test_tab_at(url: &str) -> TabProperties {
    TabProperties::at(test_url(url))
}

/// A manifest requesting `storage`, `tabs` and [`EXAMPLE_PATTERN`].
#[must_use]
pub fn test_manifest() -> ExtensionManifest {
    ExtensionManifest::new("Example Reader", "1.0.0").with_permissions(
        PermissionRequest::new()
            .with_permission(Permission::Storage)
            .with_permission(Permission::Tabs)
            .with_host_pattern(test_pattern(EXAMPLE_PATTERN)),
    )
}

/// A manifest with no permissions.
#[must_use]
pub fn test_bare_manifest(version: &str) -> ExtensionManifest {
    ExtensionManifest::new("Bare", version)
}

/// A package source under `/packages/<id>`.
#[must_use]
pub fn test_source(id: &ExtensionId) -> PackageSource {
    PackageSource::new(id.clone(), Path::new("/packages").join(id.as_str()))
}

/// Grant of the given API permissions.
#[must_use]
pub fn grant_permissions(permissions: &[Permission]) -> GrantSet {
    GrantSet::from_items(permissions.iter().cloned().map(PermissionItem::Api))
}

/// Every item [`test_manifest`] requests.
#[must_use]
pub fn grant_all_requested() -> GrantSet {
    GrantSet::from_items(test_manifest().permissions.items())
}

/// An extracted package on disk with the given files.
///
/// # Panics
///
/// Panics if the directory or a file cannot be created.
#[must_use]
pub fn test_package_dir(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().expect("Failed to create temp directory");
    for (name, contents) in files {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(&path, contents).expect("Failed to write file");
    }
    dir
}
