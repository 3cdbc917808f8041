//! Package lifecycle: install, enable, load, unload, disable, uninstall.
//!
//! ```text
//! uninstalled -> installed(disabled) <-> installed(enabled, unloaded) <-> loaded
//! ```
//!
//! Enabling and loading are independent steps. A load the runtime rejects
//! leaves the package enabled and unloaded; nothing is retried or rolled
//! back. A [`RuntimeContext`] exists exactly while a package is loaded.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tracing::{debug, info, warn};
use webext_core::{ExtensionId, GrantSet, PermissionItem, PermissionStatus, Timestamp};
use webext_events::{BridgeEvent, EventBus, EventMetadata};
use webext_permissions::{AutoGrantPolicy, PermissionLedger};
use webext_storage::{ObjectStore, StorageResult};

use crate::error::{InstallationError, InstallationResult, LifecycleError, LifecycleResult};
use crate::manifest::{ExtensionManifest, ManifestError, ManifestValidator, PackageSource};
use crate::package::{ExtensionPackage, PackageStore};
use crate::runtime::{ExtensionRuntime, RuntimeContext};

/// Where a package sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageState {
    /// Installed with the enabled flag cleared.
    Disabled,
    /// Enabled but not running in the runtime.
    Enabled,
    /// Running in the runtime.
    Loaded,
}

/// Summary of a startup restore.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    /// Packages read back from storage.
    pub restored: Vec<ExtensionId>,
    /// Enabled packages the runtime accepted.
    pub loaded: Vec<ExtensionId>,
    /// Enabled packages that failed to load, with the reason.
    pub failed: Vec<(ExtensionId, String)>,
}

/// Drives package state against the runtime, the ledger and storage.
pub struct LifecycleController {
    packages: HashMap<ExtensionId, ExtensionPackage>,
    contexts: HashMap<ExtensionId, RuntimeContext>,
    store: PackageStore,
    runtime: Arc<dyn ExtensionRuntime>,
    validator: Arc<dyn ManifestValidator>,
    ledger: Arc<PermissionLedger>,
    policy: AutoGrantPolicy,
    events: EventBus,
}

impl std::fmt::Debug for LifecycleController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleController")
            .field("packages", &self.packages.len())
            .field("loaded", &self.contexts.len())
            .finish_non_exhaustive()
    }
}

fn metadata() -> EventMetadata {
    EventMetadata::new("lifecycle")
}

impl LifecycleController {
    /// Create a controller with no packages and no auto-grant policy.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the package namespace cannot be bound.
    pub fn new(
        runtime: Arc<dyn ExtensionRuntime>,
        validator: Arc<dyn ManifestValidator>,
        ledger: Arc<PermissionLedger>,
        store: Arc<dyn ObjectStore>,
        events: EventBus,
    ) -> StorageResult<Self> {
        Ok(Self {
            packages: HashMap::new(),
            contexts: HashMap::new(),
            store: PackageStore::new(store)?,
            runtime,
            validator,
            ledger,
            policy: AutoGrantPolicy::none(),
            events,
        })
    }

    /// Set the auto-grant allow-list applied at install and update.
    #[must_use]
    pub fn with_policy(mut self, policy: AutoGrantPolicy) -> Self {
        self.policy = policy;
        self
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// State of an installed package.
    #[must_use]
    pub fn state(&self, id: &ExtensionId) -> Option<PackageState> {
        let package = self.packages.get(id)?;
        Some(if self.contexts.contains_key(id) {
            PackageState::Loaded
        } else if package.enabled {
            PackageState::Enabled
        } else {
            PackageState::Disabled
        })
    }

    /// An installed package.
    #[must_use]
    pub fn package(&self, id: &ExtensionId) -> Option<&ExtensionPackage> {
        self.packages.get(id)
    }

    /// Every installed package, ordered by id.
    #[must_use]
    pub fn packages(&self) -> Vec<&ExtensionPackage> {
        let mut packages: Vec<&ExtensionPackage> = self.packages.values().collect();
        packages.sort_by(|a, b| a.id.cmp(&b.id));
        packages
    }

    /// Runtime context of a loaded package.
    #[must_use]
    pub fn context(&self, id: &ExtensionId) -> Option<&RuntimeContext> {
        self.contexts.get(id)
    }

    /// Whether the package is loaded.
    #[must_use]
    pub fn is_loaded(&self, id: &ExtensionId) -> bool {
        self.contexts.contains_key(id)
    }

    fn installed(&self, id: &ExtensionId) -> LifecycleResult<&ExtensionPackage> {
        self.packages
            .get(id)
            .ok_or_else(|| LifecycleError::UnknownPackage(id.clone()))
    }

    // -----------------------------------------------------------------------
    // Install / update / uninstall
    // -----------------------------------------------------------------------

    async fn validate(&self, source: &PackageSource) -> InstallationResult<ExtensionManifest> {
        let id = &source.extension_id;
        self.validator
            .validate(source)
            .await
            .map_err(|e| match e {
                ManifestError::Extraction(reason) => InstallationError::Extraction {
                    id: id.clone(),
                    reason,
                },
                ManifestError::Invalid(reason) => InstallationError::InvalidManifest {
                    id: id.clone(),
                    reason,
                },
            })
    }

    /// Validate, register and persist a package. The package is enabled but
    /// not loaded.
    ///
    /// # Errors
    ///
    /// Returns [`InstallationError`] if the id is taken, validation fails,
    /// the runtime rejects the package, or persistence fails. Nothing is
    /// left behind on failure.
    pub async fn install(&mut self, source: PackageSource) -> InstallationResult<ExtensionPackage> {
        let id = source.extension_id.clone();
        if self.packages.contains_key(&id) {
            return Err(InstallationError::AlreadyInstalled(id));
        }

        let manifest = self.validate(&source).await?;

        self.runtime
            .register_package(&id)
            .await
            .map_err(|e| InstallationError::RuntimeRejected {
                id: id.clone(),
                reason: e.to_string(),
            })?;

        let package = ExtensionPackage::new(id.clone(), manifest, source.install_path);
        if let Err(e) = self.store.save(&package).await {
            self.unregister_quietly(&id).await;
            return Err(e.into());
        }
        if let Err(e) = self.register_with_ledger(&package).await {
            if let Err(cleanup) = self.store.delete(&id).await {
                warn!(extension_id = %id, error = %cleanup, "Failed to remove package row");
            }
            self.unregister_quietly(&id).await;
            return Err(e);
        }

        info!(extension_id = %id, version = %package.version(), "Package installed");
        self.events.publish(BridgeEvent::PackageInstalled {
            metadata: metadata(),
            extension_id: id.clone(),
            version: package.version().to_string(),
        });
        self.packages.insert(id, package.clone());
        Ok(package)
    }

    async fn register_with_ledger(&self, package: &ExtensionPackage) -> InstallationResult<()> {
        self.ledger.register_package(&package.id)?;
        self.ledger
            .apply_policy(&package.id, &package.manifest.permissions, &self.policy)
            .await?;
        Ok(())
    }

    async fn unregister_quietly(&self, id: &ExtensionId) {
        if let Err(e) = self.runtime.unregister_package(id).await {
            warn!(extension_id = %id, error = %e, "Runtime failed to unregister package");
        }
    }

    /// Replace an installed package with a new version.
    ///
    /// A loaded package is unloaded and loaded again. Permissions the new
    /// manifest no longer asks for lose their decisions; new ones stay
    /// undecided unless the auto-grant policy covers them.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::UnknownPackage`], an
    /// [`InstallationError`] for a mismatched id or failed validation, or the
    /// error of the unload or reload.
    pub async fn update(
        &mut self,
        id: &ExtensionId,
        source: PackageSource,
    ) -> LifecycleResult<ExtensionPackage> {
        let previous = self.installed(id)?.clone();
        if source.extension_id != *id {
            return Err(InstallationError::IdMismatch {
                expected: id.clone(),
                actual: source.extension_id,
            }
            .into());
        }
        let manifest = self.validate(&source).await?;

        let was_loaded = self.is_loaded(id);
        if was_loaded {
            self.unload(id).await?;
        }

        let mut package = previous.clone();
        package.manifest = manifest;
        package.install_path = source.install_path;
        package.updated_at = Timestamp::now();
        self.store.save(&package).await?;

        let kept = package.manifest.permissions.items();
        let dropped: Vec<PermissionItem> = previous
            .manifest
            .permissions
            .items()
            .into_iter()
            .filter(|item| !kept.contains(item))
            .collect();
        if !dropped.is_empty() {
            self.ledger.reset(id, &dropped).await?;
        }
        self.ledger
            .apply_policy(id, &package.manifest.permissions, &self.policy)
            .await?;

        info!(
            extension_id = %id,
            from = %previous.version(),
            to = %package.version(),
            dropped = dropped.len(),
            "Package updated"
        );
        self.events.publish(BridgeEvent::PackageUpdated {
            metadata: metadata(),
            extension_id: id.clone(),
            previous_version: previous.version().to_string(),
            version: package.version().to_string(),
        });
        self.packages.insert(id.clone(), package.clone());

        if was_loaded && package.enabled {
            self.load(id).await?;
        }
        Ok(package)
    }

    /// Remove a package: unload it, delete its ledger rows and its record.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::UnknownPackage`], the unload error if the
    /// runtime refuses to unload (nothing is deleted then), or
    /// [`LifecycleError::InvariantViolation`] if the package is still loaded
    /// after unloading. A storage or ledger failure leaves the package
    /// installed with its ledger registration intact.
    pub async fn uninstall(&mut self, id: &ExtensionId) -> LifecycleResult<()> {
        let package = self.installed(id)?.clone();
        if self.is_loaded(id) {
            self.unload(id).await?;
        }
        if self.is_loaded(id) {
            return Err(LifecycleError::InvariantViolation(format!(
                "{id} still has a runtime context after unload"
            )));
        }

        // Package row first. A ledger failure puts the row back, so the
        // package stays installed and registered.
        self.store.delete(id).await?;
        if let Err(e) = self.ledger.forget_package(id).await {
            warn!(extension_id = %id, error = %e, "Ledger cleanup failed, keeping package");
            if let Err(save) = self.store.save(&package).await {
                warn!(extension_id = %id, error = %save, "Failed to restore package row");
            }
            return Err(e.into());
        }
        self.packages.remove(id);
        self.unregister_quietly(id).await;

        info!(extension_id = %id, "Package uninstalled");
        self.events.publish(BridgeEvent::PackageUninstalled {
            metadata: metadata(),
            extension_id: id.clone(),
        });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Enable / disable
    // -----------------------------------------------------------------------

    async fn set_enabled(&mut self, id: &ExtensionId, enabled: bool) -> LifecycleResult<bool> {
        let package = self.installed(id)?;
        if package.enabled == enabled {
            return Ok(false);
        }
        let mut package = package.clone();
        package.enabled = enabled;
        self.store.save(&package).await?;
        self.packages.insert(id.clone(), package);
        Ok(true)
    }

    /// Set the enabled flag and load. Enabling an enabled, loaded package is
    /// a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::UnknownPackage`], a storage error, or the
    /// load error. A load failure keeps the flag set.
    pub async fn enable(&mut self, id: &ExtensionId) -> LifecycleResult<()> {
        if self.set_enabled(id, true).await? {
            info!(extension_id = %id, "Package enabled");
            self.events.publish(BridgeEvent::PackageEnabled {
                metadata: metadata(),
                extension_id: id.clone(),
            });
        }
        self.load(id).await
    }

    /// Unload if loaded and clear the enabled flag. Disabling a disabled
    /// package is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::UnknownPackage`], the unload error (the flag
    /// stays set then), or a storage error.
    pub async fn disable(&mut self, id: &ExtensionId) -> LifecycleResult<()> {
        self.installed(id)?;
        if self.is_loaded(id) {
            self.unload(id).await?;
        }
        if self.set_enabled(id, false).await? {
            info!(extension_id = %id, "Package disabled");
            self.events.publish(BridgeEvent::PackageDisabled {
                metadata: metadata(),
                extension_id: id.clone(),
            });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Load / unload
    // -----------------------------------------------------------------------

    /// Load an enabled package, seeding its context from the ledger. Loading
    /// a loaded package is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::UnknownPackage`],
    /// [`LifecycleError::LoadWhileDisabled`], a ledger error, or
    /// [`LifecycleError::TransitionRejectedByRuntime`].
    pub async fn load(&mut self, id: &ExtensionId) -> LifecycleResult<()> {
        let package = self.installed(id)?;
        if !package.enabled {
            return Err(LifecycleError::LoadWhileDisabled(id.clone()));
        }
        if self.is_loaded(id) {
            debug!(extension_id = %id, "Package already loaded");
            return Ok(());
        }

        let install_path = package.install_path.clone();
        let manifest = package.manifest.clone();
        // Epoch before grants, so a revoke in between fails admission.
        let grants_epoch = self.ledger.revocation_epoch(id)?;
        let context = RuntimeContext {
            extension_id: id.clone(),
            grants: self.ledger.current_grants(id).await?,
            grants_epoch,
            install_path,
            manifest,
        };

        if let Err(e) = self.runtime.load(&context).await {
            warn!(extension_id = %id, error = %e, "Runtime rejected load");
            self.events.publish(BridgeEvent::PackageLoadFailed {
                metadata: metadata(),
                extension_id: id.clone(),
                reason: e.to_string(),
            });
            return Err(LifecycleError::TransitionRejectedByRuntime {
                id: id.clone(),
                reason: e.to_string(),
            });
        }

        info!(
            extension_id = %id,
            permissions = context.grants.permissions.len(),
            host_patterns = context.grants.host_patterns.len(),
            "Package loaded"
        );
        self.contexts.insert(id.clone(), context);
        self.events.publish(BridgeEvent::PackageLoaded {
            metadata: metadata(),
            extension_id: id.clone(),
        });
        Ok(())
    }

    /// Unload a loaded package.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::UnknownPackage`],
    /// [`LifecycleError::UnloadNotLoaded`], or
    /// [`LifecycleError::TransitionRejectedByRuntime`] (the package stays
    /// loaded then).
    pub async fn unload(&mut self, id: &ExtensionId) -> LifecycleResult<()> {
        self.installed(id)?;
        if !self.is_loaded(id) {
            return Err(LifecycleError::UnloadNotLoaded(id.clone()));
        }
        self.runtime.unload(id).await.map_err(|e| {
            warn!(extension_id = %id, error = %e, "Runtime rejected unload");
            LifecycleError::TransitionRejectedByRuntime {
                id: id.clone(),
                reason: e.to_string(),
            }
        })?;
        self.contexts.remove(id);
        info!(extension_id = %id, "Package unloaded");
        self.events.publish(BridgeEvent::PackageUnloaded {
            metadata: metadata(),
            extension_id: id.clone(),
        });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Grants
    // -----------------------------------------------------------------------

    /// Re-read the granted set of `id` from the ledger and push every change
    /// into the live runtime context.
    ///
    /// Returns the granted set. Call after every ledger write so a revoke
    /// takes effect before the next permission check.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::UnknownPackage`] or a ledger error.
    pub async fn sync_grants(&mut self, id: &ExtensionId) -> LifecycleResult<GrantSet> {
        self.installed(id)?;
        let grants_epoch = self.ledger.revocation_epoch(id)?;
        let grants = self.ledger.current_grants(id).await?;

        if let Some(context) = self.contexts.get_mut(id) {
            let before: BTreeSet<PermissionItem> = context.grants.items().collect();
            let after: BTreeSet<PermissionItem> = grants.items().collect();
            for item in before.difference(&after) {
                self.runtime
                    .set_permission_status(id, item, PermissionStatus::DeniedExplicitly);
            }
            for item in after.difference(&before) {
                self.runtime
                    .set_permission_status(id, item, PermissionStatus::GrantedExplicitly);
            }
            if before != after {
                debug!(
                    extension_id = %id,
                    removed = before.difference(&after).count(),
                    added = after.difference(&before).count(),
                    "Runtime context grants updated"
                );
            }
            context.grants = grants.clone();
            context.grants_epoch = grants_epoch;
        }

        self.events.publish(BridgeEvent::PermissionsChanged {
            metadata: metadata(),
            extension_id: id.clone(),
            granted: grants.clone(),
        });
        Ok(grants)
    }

    // -----------------------------------------------------------------------
    // Restore
    // -----------------------------------------------------------------------

    /// Read persisted packages back, register them with the ledger and load
    /// every enabled one. Load failures are reported, not returned.
    ///
    /// # Errors
    ///
    /// Returns a storage or ledger error if the package rows cannot be read
    /// or registered.
    pub async fn restore(&mut self) -> LifecycleResult<RestoreReport> {
        let mut report = RestoreReport::default();
        for package in self.store.load_all().await? {
            if self.packages.contains_key(&package.id) {
                continue;
            }
            self.ledger.register_package(&package.id)?;
            if let Err(e) = self.runtime.register_package(&package.id).await {
                warn!(extension_id = %package.id, error = %e, "Runtime rejected restored package");
                report.failed.push((package.id.clone(), e.to_string()));
                self.packages.insert(package.id.clone(), package);
                continue;
            }
            report.restored.push(package.id.clone());
            self.packages.insert(package.id.clone(), package);
        }

        let mut enabled: Vec<ExtensionId> = report
            .restored
            .iter()
            .filter(|id| self.packages.get(*id).is_some_and(|p| p.enabled))
            .cloned()
            .collect();
        enabled.sort();
        for id in enabled {
            match self.load(&id).await {
                Ok(()) => report.loaded.push(id),
                Err(e) => {
                    warn!(extension_id = %id, error = %e, "Restored package failed to load");
                    report.failed.push((id, e.to_string()));
                },
            }
        }

        info!(
            restored = report.restored.len(),
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            "Packages restored"
        );
        Ok(report)
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
