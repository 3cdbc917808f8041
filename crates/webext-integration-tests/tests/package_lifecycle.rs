//! Integration tests for package lifecycle against storage and the runtime.

use std::io::Write;

use webext_bridge::{
    InstallationError, LifecycleError, ManifestError, PACKAGE_NAMESPACE, PackageState,
};
use webext_config::BridgeConfig;
use webext_core::{Permission, PermissionItem, TabId, WindowId};
use webext_permissions::{LEDGER_NAMESPACE_PREFIX, PermissionRequest};
use webext_storage::ObjectStore;
use webext_test::{
    BridgeHarness, MockPresenter, RuntimeCall, grant_all_requested, grant_permissions,
    setup_test_logging_default, test_bare_manifest, test_extension_id, test_manifest,
    test_source,
};

fn ledger_namespace(name: &str) -> String {
    format!("{LEDGER_NAMESPACE_PREFIX}{name}")
}

// ---------------------------------------------------------------------------
// Install / uninstall
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_uninstall_removes_ledger_rows_and_unloads() {
    setup_test_logging_default();
    let mut harness = BridgeHarness::new();
    let id = test_extension_id("reader");
    harness.install_loaded(&id, test_manifest()).await;
    harness.bridge.decide(&id, &grant_all_requested()).await.unwrap();
    assert_eq!(
        harness
            .store
            .list_keys(&ledger_namespace("reader"))
            .await
            .unwrap()
            .len(),
        3
    );
    assert!(harness.runtime.is_loaded(&id));

    harness.bridge.uninstall(&id).await.unwrap();

    assert!(
        harness
            .store
            .list_keys(&ledger_namespace("reader"))
            .await
            .unwrap()
            .is_empty()
    );
    assert!(
        harness
            .store
            .list_keys(PACKAGE_NAMESPACE)
            .await
            .unwrap()
            .is_empty()
    );
    assert!(!harness.runtime.is_loaded(&id));
    assert_eq!(harness.bridge.package_state(&id), None);

    let calls = harness.runtime.calls();
    let unload = calls
        .iter()
        .position(|c| *c == RuntimeCall::Unload(id.clone()))
        .unwrap();
    let unregister = calls
        .iter()
        .position(|c| *c == RuntimeCall::Unregister(id.clone()))
        .unwrap();
    assert!(unload < unregister);
}

#[tokio::test]
async fn test_uninstall_leaves_other_packages_alone() {
    let mut harness = BridgeHarness::new();
    let reader = test_extension_id("reader");
    let notes = test_extension_id("notes");
    harness.install_loaded(&reader, test_manifest()).await;
    harness.install_loaded(&notes, test_manifest()).await;
    harness.bridge.decide(&reader, &grant_all_requested()).await.unwrap();
    harness.bridge.decide(&notes, &grant_all_requested()).await.unwrap();

    harness.bridge.uninstall(&reader).await.unwrap();

    assert_eq!(
        harness.bridge.current_grants(&notes).await.unwrap(),
        grant_all_requested()
    );
    assert!(harness.runtime.is_loaded(&notes));
    assert_eq!(harness.bridge.package_state(&notes), Some(PackageState::Loaded));
}

#[tokio::test]
async fn test_failed_install_leaves_nothing_behind() {
    let mut harness = BridgeHarness::new();
    let id = test_extension_id("broken");

    harness
        .validator
        .set_failure(&id, ManifestError::Invalid("missing version".into()));
    let err = harness.bridge.install(test_source(&id)).await.unwrap_err();
    assert!(matches!(err, InstallationError::InvalidManifest { .. }));

    harness.validator.set_manifest(&id, test_manifest());
    harness.runtime.reject_register(&id);
    let err = harness.bridge.install(test_source(&id)).await.unwrap_err();
    assert!(matches!(err, InstallationError::RuntimeRejected { .. }));

    assert!(harness.store.list_keys(PACKAGE_NAMESPACE).await.unwrap().is_empty());
    assert_eq!(harness.bridge.package_state(&id), None);
    assert!(!harness.bridge.ledger().is_registered(&id));
}

#[tokio::test]
async fn test_duplicate_install_is_rejected() {
    let mut harness = BridgeHarness::new();
    let id = test_extension_id("reader");
    harness.install(&id, test_manifest()).await;
    let err = harness.bridge.install(test_source(&id)).await.unwrap_err();
    assert!(matches!(err, InstallationError::AlreadyInstalled(_)));
}

// ---------------------------------------------------------------------------
// Load / unload
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_load_seeds_context_with_recorded_grants() {
    let mut harness = BridgeHarness::new();
    let id = test_extension_id("reader");
    harness.install(&id, test_manifest()).await;
    harness
        .bridge
        .decide(&id, &grant_permissions(&[Permission::Tabs]))
        .await
        .unwrap();

    harness.bridge.load(&id).await.unwrap();
    assert!(harness.runtime.calls().contains(&RuntimeCall::Load {
        extension_id: id.clone(),
        grants: grant_permissions(&[Permission::Tabs]),
    }));
    assert!(harness.bridge.require_permission(&id, Permission::Tabs).is_ok());
}

#[tokio::test]
async fn test_disabled_package_cannot_load() {
    let mut harness = BridgeHarness::new();
    let id = test_extension_id("reader");
    harness.install_loaded(&id, test_manifest()).await;
    harness.bridge.disable(&id).await.unwrap();
    assert!(!harness.runtime.is_loaded(&id));

    let err = harness.bridge.load(&id).await.unwrap_err();
    assert!(matches!(err, LifecycleError::LoadWhileDisabled(_)));

    harness.bridge.enable(&id).await.unwrap();
    assert!(harness.runtime.is_loaded(&id));
    assert_eq!(harness.bridge.package_state(&id), Some(PackageState::Loaded));
}

#[tokio::test]
async fn test_runtime_refusing_load_keeps_package_enabled() {
    let mut harness = BridgeHarness::new();
    let id = test_extension_id("reader");
    harness.install(&id, test_manifest()).await;
    harness.runtime.reject_load(&id);
    let mut events = harness.bridge.subscribe();

    let err = harness.bridge.load(&id).await.unwrap_err();
    assert!(matches!(err, LifecycleError::TransitionRejectedByRuntime { .. }));
    assert_eq!(harness.bridge.package_state(&id), Some(PackageState::Enabled));
    assert!(
        events
            .drain()
            .iter()
            .any(|e| e.event_type() == "package_load_failed")
    );

    let err = harness.bridge.unload(&id).await.unwrap_err();
    assert!(matches!(err, LifecycleError::UnloadNotLoaded(_)));
}

#[tokio::test]
async fn test_unload_drops_live_grants_but_keeps_ledger() {
    let mut harness = BridgeHarness::new();
    let id = test_extension_id("reader");
    harness.install_loaded(&id, test_manifest()).await;
    harness.bridge.decide(&id, &grant_all_requested()).await.unwrap();

    harness.bridge.unload(&id).await.unwrap();
    assert!(harness.bridge.require_permission(&id, Permission::Storage).is_err());
    assert_eq!(
        harness.bridge.current_grants(&id).await.unwrap(),
        grant_all_requested()
    );
}

// ---------------------------------------------------------------------------
// Update
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_update_forgets_dropped_permissions_and_reloads() {
    let mut harness = BridgeHarness::new();
    let id = test_extension_id("reader");
    harness.install_loaded(&id, test_manifest()).await;
    harness.bridge.decide(&id, &grant_all_requested()).await.unwrap();

    let next = test_bare_manifest("2.0.0").with_permissions(
        PermissionRequest::new()
            .with_permission(Permission::Storage)
            .with_permission(Permission::Cookies),
    );
    harness.validator.set_manifest(&id, next.clone());
    harness.runtime.clear();
    let package = harness.bridge.update(&id, test_source(&id)).await.unwrap();
    assert_eq!(package.manifest, next);

    let grants = harness.bridge.current_grants(&id).await.unwrap();
    assert_eq!(grants, grant_permissions(&[Permission::Storage]));
    let undecided = harness
        .bridge
        .ledger()
        .undecided(&id, &next.permissions)
        .await
        .unwrap();
    assert_eq!(undecided, vec![PermissionItem::Api(Permission::Cookies)]);

    let calls = harness.runtime.calls();
    assert_eq!(calls.first(), Some(&RuntimeCall::Unload(id.clone())));
    assert!(matches!(calls.last(), Some(RuntimeCall::Load { .. })));
}

#[tokio::test]
async fn test_update_rejects_mismatched_source() {
    let mut harness = BridgeHarness::new();
    let id = test_extension_id("reader");
    harness.install(&id, test_manifest()).await;
    let err = harness
        .bridge
        .update(&id, test_source(&test_extension_id("other")))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::Installation(InstallationError::IdMismatch { .. })
    ));
}

// ---------------------------------------------------------------------------
// Restore
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_restart_restores_packages_and_grants() {
    let config = BridgeConfig::default();
    let mut first = BridgeHarness::with_config(&config);
    let reader = test_extension_id("reader");
    let notes = test_extension_id("notes");
    first.install_loaded(&reader, test_manifest()).await;
    first.install_loaded(&notes, test_bare_manifest("1.0.0")).await;
    first
        .bridge
        .request_permissions(
            &reader,
            &MockPresenter::new().granting(grant_permissions(&[Permission::Storage])),
        )
        .await
        .unwrap();
    first.bridge.disable(&notes).await.unwrap();

    let mut second = BridgeHarness::with_store(first.store.clone(), &config);
    let report = second.bridge.restore().await.unwrap();
    assert_eq!(report.restored.len(), 2);
    assert_eq!(report.loaded, vec![reader.clone()]);
    assert!(report.failed.is_empty());

    assert_eq!(second.bridge.package_state(&reader), Some(PackageState::Loaded));
    assert_eq!(second.bridge.package_state(&notes), Some(PackageState::Disabled));
    assert!(second.runtime.calls().contains(&RuntimeCall::Load {
        extension_id: reader.clone(),
        grants: grant_permissions(&[Permission::Storage]),
    }));

    // Decisions survived: nothing left to ask.
    let outcome = second
        .bridge
        .request_permissions(&reader, &MockPresenter::new())
        .await
        .unwrap();
    assert_eq!(outcome, webext_permissions::PromptOutcome::NothingToAsk);
}

#[tokio::test]
async fn test_restore_reports_load_failures() {
    let config = BridgeConfig::default();
    let mut first = BridgeHarness::with_config(&config);
    let id = test_extension_id("reader");
    first.install_loaded(&id, test_manifest()).await;

    let mut second = BridgeHarness::with_store(first.store.clone(), &config);
    second.runtime.reject_load(&id);
    let report = second.bridge.restore().await.unwrap();
    assert_eq!(report.restored, vec![id.clone()]);
    assert!(report.loaded.is_empty());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(second.bridge.package_state(&id), Some(PackageState::Enabled));
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_config_file_drives_bridge() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[injection]
fallback_enabled = false

[origins]
restricted_hosts = ["intranet.example.com"]

[permissions.auto_grant]
permissions = ["tabs"]
"#
    )
    .unwrap();
    let config = webext_config::load_file(file.path()).unwrap();
    assert!(!config.injection.fallback_enabled);

    let mut harness = BridgeHarness::with_config(&config);
    harness.open_window(
        WindowId(1),
        &[(TabId(1), "https://intranet.example.com/wiki")],
    );
    let id = test_extension_id("reader");
    harness.install_loaded(&id, test_manifest()).await;
    assert!(harness.bridge.require_permission(&id, Permission::Tabs).is_ok());

    harness.bridge.decide(&id, &grant_all_requested()).await.unwrap();
    let err = harness
        .bridge
        .inject(webext_bridge::InjectionRequest::code(id, TabId(1), "1"))
        .await
        .unwrap_err();
    assert!(matches!(err, webext_bridge::InjectionError::RestrictedOrigin { .. }));
}

#[test]
fn test_invalid_config_is_rejected() {
    let err = webext_config::load_str(
        r#"
        [injection]
        timeout_ms = 0
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, webext_config::ConfigError::ValidationError { .. }));
}
