//! Installed package records and their persistence.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;
use webext_core::{ExtensionId, Timestamp};
use webext_storage::{ObjectStore, ScopedStore, StorageResult};

use crate::manifest::ExtensionManifest;

/// Storage namespace of package rows.
pub const PACKAGE_NAMESPACE: &str = "packages";

/// One installed package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionPackage {
    /// Package id.
    pub id: ExtensionId,
    /// Validated manifest.
    pub manifest: ExtensionManifest,
    /// Install directory.
    pub install_path: PathBuf,
    /// Whether the package may be loaded.
    pub enabled: bool,
    /// First install.
    pub installed_at: Timestamp,
    /// Last install or update.
    pub updated_at: Timestamp,
}

impl ExtensionPackage {
    /// A freshly installed, enabled package.
    #[must_use]
    pub fn new(id: ExtensionId, manifest: ExtensionManifest, install_path: PathBuf) -> Self {
        let now = Timestamp::now();
        Self {
            id,
            manifest,
            install_path,
            enabled: true,
            installed_at: now,
            updated_at: now,
        }
    }

    /// Manifest version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.manifest.version
    }
}

/// Package rows keyed by extension id.
#[derive(Debug, Clone)]
pub(crate) struct PackageStore {
    scoped: ScopedStore,
}

impl PackageStore {
    pub(crate) fn new(store: Arc<dyn ObjectStore>) -> StorageResult<Self> {
        Ok(Self {
            scoped: ScopedStore::new(store, PACKAGE_NAMESPACE)?,
        })
    }

    pub(crate) async fn save(&self, package: &ExtensionPackage) -> StorageResult<()> {
        self.scoped.upsert_json(package.id.as_str(), package).await
    }

    pub(crate) async fn delete(&self, id: &ExtensionId) -> StorageResult<bool> {
        self.scoped.delete(id.as_str()).await
    }

    /// Every decodable row whose key matches its package id.
    pub(crate) async fn load_all(&self) -> StorageResult<Vec<ExtensionPackage>> {
        let rows: Vec<(String, ExtensionPackage)> = self.scoped.fetch_all_json().await?;
        Ok(rows
            .into_iter()
            .filter_map(|(key, package)| {
                if key == package.id.as_str() {
                    Some(package)
                } else {
                    warn!(key = %key, extension_id = %package.id, "Skipping package row stored under a foreign key");
                    None
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use webext_storage::MemoryObjectStore;

    #[tokio::test]
    async fn test_save_load_delete() {
        let backend: Arc<dyn ObjectStore> = Arc::new(MemoryObjectStore::new());
        let store = PackageStore::new(Arc::clone(&backend)).unwrap();
        let id = ExtensionId::new("com.example.reader").unwrap();
        let package = ExtensionPackage::new(
            id.clone(),
            ExtensionManifest::new("Reader", "1.0.0"),
            PathBuf::from("/ext/reader"),
        );

        store.save(&package).await.unwrap();
        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded, vec![package]);

        assert!(store.delete(&id).await.unwrap());
        assert!(store.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_foreign_key_rows_are_skipped() {
        let backend: Arc<dyn ObjectStore> = Arc::new(MemoryObjectStore::new());
        let store = PackageStore::new(Arc::clone(&backend)).unwrap();
        let package = ExtensionPackage::new(
            ExtensionId::new("com.example.reader").unwrap(),
            ExtensionManifest::new("Reader", "1.0.0"),
            PathBuf::from("/ext/reader"),
        );
        let scoped = ScopedStore::new(backend, PACKAGE_NAMESPACE).unwrap();
        scoped.upsert_json("com.example.other", &package).await.unwrap();

        assert!(store.load_all().await.unwrap().is_empty());
    }
}
