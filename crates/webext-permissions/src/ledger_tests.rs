#![allow(clippy::arithmetic_side_effects)]

use std::sync::Mutex;

use async_trait::async_trait;
use webext_core::{HostPattern, Permission};
use webext_storage::MemoryObjectStore;

use super::*;

fn ext(id: &str) -> ExtensionId {
    ExtensionId::new(id).unwrap()
}

fn example_pattern() -> HostPattern {
    "*://*.example.com/*".parse().unwrap()
}

fn reader_request() -> PermissionRequest {
    PermissionRequest::new()
        .with_permission(Permission::Storage)
        .with_permission(Permission::Tabs)
        .with_host_pattern(example_pattern())
}

fn ledger() -> (Arc<MemoryObjectStore>, PermissionLedger) {
    let store = Arc::new(MemoryObjectStore::new());
    let ledger = PermissionLedger::new(Arc::clone(&store) as Arc<dyn ObjectStore>);
    (store, ledger)
}

struct ScriptedPresenter {
    response: Option<PromptResponse>,
    seen: Mutex<Vec<PermissionPrompt>>,
}

impl ScriptedPresenter {
    fn answering(response: PromptResponse) -> Self {
        Self {
            response: Some(response),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn never_answering() -> Self {
        Self {
            response: None,
            seen: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl PermissionPresenter for ScriptedPresenter {
    async fn present(&self, prompt: PermissionPrompt) -> PromptResponse {
        self.seen.lock().unwrap().push(prompt);
        match &self.response {
            Some(response) => response.clone(),
            None => std::future::pending().await,
        }
    }
}

#[tokio::test]
async fn test_decide_unknown_package_rejected() {
    let (_, ledger) = ledger();
    let err = ledger
        .decide(
            &ext("ghost"),
            &reader_request(),
            &GrantSet::new(),
            DecisionSource::User,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::UnknownPackage(id) if id.as_str() == "ghost"));
    assert!(ledger.current_grants(&ext("ghost")).await.is_err());
}

#[tokio::test]
async fn test_decide_records_every_item_and_persists() {
    let (store, ledger) = ledger();
    let id = ext("reader");
    ledger.register_package(&id).unwrap();

    let granted = GrantSet::from_items([PermissionItem::Api(Permission::Storage)]);
    let recorded = ledger
        .decide(&id, &reader_request(), &granted, DecisionSource::User)
        .await
        .unwrap();
    assert_eq!(recorded.len(), 3);
    assert_eq!(store.len(), 3);

    let grants = ledger.current_grants(&id).await.unwrap();
    assert_eq!(grants.permissions, [Permission::Storage].into());
    assert!(grants.host_patterns.is_empty());
    assert_eq!(
        ledger
            .status(&id, &PermissionItem::Api(Permission::Tabs))
            .await
            .unwrap(),
        PermissionStatus::DeniedExplicitly
    );
}

#[tokio::test]
async fn test_grants_survive_a_fresh_ledger() {
    let store: Arc<dyn ObjectStore> = Arc::new(MemoryObjectStore::new());
    let id = ext("reader");

    let first = PermissionLedger::new(Arc::clone(&store));
    first.register_package(&id).unwrap();
    let granted = GrantSet::from_items([PermissionItem::Api(Permission::Storage)]);
    first
        .decide(&id, &reader_request(), &granted, DecisionSource::User)
        .await
        .unwrap();
    drop(first);

    let second = PermissionLedger::new(store);
    second.register_package(&id).unwrap();
    assert_eq!(second.current_grants(&id).await.unwrap(), granted);
}

#[tokio::test]
async fn test_grant_outside_request_is_not_widened() {
    let (_, ledger) = ledger();
    let id = ext("reader");
    ledger.register_package(&id).unwrap();

    let granted = GrantSet::from_items([
        PermissionItem::Api(Permission::Storage),
        PermissionItem::Api(Permission::Cookies),
    ]);
    ledger
        .decide(&id, &reader_request(), &granted, DecisionSource::User)
        .await
        .unwrap();

    let grants = ledger.current_grants(&id).await.unwrap();
    assert!(!grants.permissions.contains(&Permission::Cookies));
}

#[tokio::test]
async fn test_policy_never_overrides_user_decision() {
    let (_, ledger) = ledger();
    let id = ext("reader");
    ledger.register_package(&id).unwrap();

    ledger
        .decide(&id, &reader_request(), &GrantSet::new(), DecisionSource::User)
        .await
        .unwrap();

    let policy = AutoGrantPolicy::new([PermissionItem::Api(Permission::Storage)]);
    let recorded = ledger
        .apply_policy(&id, &reader_request(), &policy)
        .await
        .unwrap();
    assert!(recorded.is_empty());
    assert!(ledger.current_grants(&id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_policy_grants_only_requested_undecided_items() {
    let (_, ledger) = ledger();
    let id = ext("reader");
    ledger.register_package(&id).unwrap();

    let policy = AutoGrantPolicy::new([
        PermissionItem::Api(Permission::Storage),
        PermissionItem::Api(Permission::Cookies),
    ]);
    let recorded = ledger
        .apply_policy(&id, &reader_request(), &policy)
        .await
        .unwrap();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].source, DecisionSource::Policy);

    let undecided = ledger.undecided(&id, &reader_request()).await.unwrap();
    assert_eq!(undecided.len(), 2);
    assert!(!undecided.contains(&PermissionItem::Api(Permission::Storage)));
}

#[tokio::test]
async fn test_empty_policy_records_nothing() {
    let (store, ledger) = ledger();
    let id = ext("reader");
    ledger.register_package(&id).unwrap();
    let recorded = ledger
        .apply_policy(&id, &reader_request(), &AutoGrantPolicy::none())
        .await
        .unwrap();
    assert!(recorded.is_empty());
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_revoke_denies_and_invalidates_tokens() {
    let (_, ledger) = ledger();
    let id = ext("reader");
    ledger.register_package(&id).unwrap();
    let host = PermissionItem::Host(example_pattern());
    ledger
        .decide(
            &id,
            &reader_request(),
            &GrantSet::from_items([host.clone()]),
            DecisionSource::User,
        )
        .await
        .unwrap();

    let token = ledger.revocation_token(&id).unwrap();
    assert!(token.check().is_ok());
    assert_eq!(token.observed(), ledger.revocation_epoch(&id).unwrap());

    let grants = ledger.revoke(&id, std::slice::from_ref(&host)).await.unwrap();
    assert!(grants.is_empty());
    assert_eq!(
        ledger.status(&id, &host).await.unwrap(),
        PermissionStatus::DeniedExplicitly
    );
    assert!(matches!(
        token.check(),
        Err(PermissionError::Revoked { .. })
    ));
    assert!(ledger.revocation_epoch(&id).unwrap() > token.observed());
    assert!(ledger.revocation_token(&id).unwrap().check().is_ok());
}

#[tokio::test]
async fn test_regrant_does_not_advance_epoch() {
    let (_, ledger) = ledger();
    let id = ext("reader");
    ledger.register_package(&id).unwrap();
    let token = ledger.revocation_token(&id).unwrap();
    ledger
        .decide(
            &id,
            &reader_request(),
            &GrantSet::from_items(reader_request().items()),
            DecisionSource::User,
        )
        .await
        .unwrap();
    assert!(token.check().is_ok());
}

#[tokio::test]
async fn test_reset_returns_items_to_undecided() {
    let (_, ledger) = ledger();
    let id = ext("reader");
    ledger.register_package(&id).unwrap();
    let storage = PermissionItem::Api(Permission::Storage);
    ledger
        .decide(
            &id,
            &reader_request(),
            &GrantSet::from_items([storage.clone()]),
            DecisionSource::User,
        )
        .await
        .unwrap();
    let token = ledger.revocation_token(&id).unwrap();

    assert_eq!(ledger.reset(&id, std::slice::from_ref(&storage)).await.unwrap(), 1);
    assert_eq!(
        ledger.status(&id, &storage).await.unwrap(),
        PermissionStatus::Undecided
    );
    assert!(token.check().is_err());
}

#[tokio::test]
async fn test_forget_package_removes_rows_and_registration() {
    let (store, ledger) = ledger();
    let id = ext("reader");
    let other = ext("other");
    ledger.register_package(&id).unwrap();
    ledger.register_package(&other).unwrap();
    for target in [&id, &other] {
        ledger
            .decide(target, &reader_request(), &GrantSet::new(), DecisionSource::User)
            .await
            .unwrap();
    }
    let token = ledger.revocation_token(&id).unwrap();

    assert_eq!(ledger.forget_package(&id).await.unwrap(), 3);
    assert!(!ledger.is_registered(&id));
    assert!(token.check().is_err());
    assert_eq!(store.len(), 3);
    assert!(matches!(
        ledger.decisions(&id).await,
        Err(LedgerError::UnknownPackage(_))
    ));
}

#[tokio::test]
async fn test_prompt_records_user_choice_for_undecided_only() {
    let (_, ledger) = ledger();
    let id = ext("reader");
    ledger.register_package(&id).unwrap();
    ledger
        .apply_policy(
            &id,
            &reader_request(),
            &AutoGrantPolicy::new([PermissionItem::Api(Permission::Tabs)]),
        )
        .await
        .unwrap();

    let presenter = ScriptedPresenter::answering(PromptResponse::Granted(GrantSet::from_items([
        PermissionItem::Api(Permission::Storage),
    ])));
    let outcome = ledger
        .prompt(
            &id,
            "Reader",
            &reader_request(),
            &presenter,
            Duration::from_secs(5),
        )
        .await
        .unwrap();

    assert!(matches!(outcome, PromptOutcome::Decided { .. }));
    assert_eq!(outcome.decisions().len(), 2);
    let seen = presenter.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].display_name, "Reader");
    assert!(!seen[0].request.permissions.contains(&Permission::Tabs));

    let grants = ledger.current_grants(&id).await.unwrap();
    assert_eq!(
        grants.permissions,
        [Permission::Storage, Permission::Tabs].into()
    );
    assert!(grants.host_patterns.is_empty());
}

#[tokio::test]
async fn test_prompt_dismissal_is_explicit_deny() {
    let (_, ledger) = ledger();
    let id = ext("reader");
    ledger.register_package(&id).unwrap();
    let presenter = ScriptedPresenter::answering(PromptResponse::Cancelled);

    let outcome = ledger
        .prompt(&id, "Reader", &reader_request(), &presenter, Duration::from_secs(5))
        .await
        .unwrap();
    assert!(matches!(outcome, PromptOutcome::Dismissed { .. }));
    for decision in outcome.decisions() {
        assert_eq!(decision.status, PermissionStatus::DeniedExplicitly);
        assert_eq!(decision.source, DecisionSource::Dismissed);
    }
    assert!(ledger.undecided(&id, &reader_request()).await.unwrap().is_empty());

    let again = ledger
        .prompt(&id, "Reader", &reader_request(), &presenter, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(again, PromptOutcome::NothingToAsk);
}

#[tokio::test(start_paused = true)]
async fn test_prompt_timeout_is_dismissal() {
    let (_, ledger) = ledger();
    let id = ext("reader");
    ledger.register_package(&id).unwrap();
    let presenter = ScriptedPresenter::never_answering();

    let outcome = ledger
        .prompt(&id, "Reader", &reader_request(), &presenter, Duration::from_millis(50))
        .await
        .unwrap();
    assert!(matches!(outcome, PromptOutcome::Dismissed { .. }));
    assert_eq!(outcome.decisions().len(), 3);
}

#[tokio::test]
async fn test_prompt_unavailable_leaves_items_undecided() {
    struct Offline;

    #[async_trait]
    impl PermissionPresenter for Offline {
        async fn present(&self, _prompt: PermissionPrompt) -> PromptResponse {
            PromptResponse::Cancelled
        }

        fn is_available(&self) -> bool {
            false
        }
    }

    let (store, ledger) = ledger();
    let id = ext("reader");
    ledger.register_package(&id).unwrap();
    let outcome = ledger
        .prompt(&id, "Reader", &reader_request(), &Offline, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(outcome, PromptOutcome::Unavailable);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_corrupt_row_reads_as_undecided() {
    let (store, ledger) = ledger();
    let id = ext("reader");
    ledger.register_package(&id).unwrap();
    let storage = PermissionItem::Api(Permission::Storage);
    store
        .upsert("ledger:reader", &storage.storage_key(), b"garbage".to_vec())
        .await
        .unwrap();
    assert_eq!(
        ledger.status(&id, &storage).await.unwrap(),
        PermissionStatus::Undecided
    );
    assert!(ledger.current_grants(&id).await.unwrap().is_empty());
}
