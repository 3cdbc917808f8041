//! The persisted permission ledger.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tracing::{debug, info, warn};
use webext_core::{ExtensionId, GrantSet, PermissionItem, PermissionStatus};
use webext_storage::{ObjectStore, ScopedStore, StorageError};

use crate::decision::{DecisionSource, PermissionDecision, PermissionRequest};
use crate::error::{LedgerError, LedgerResult, PermissionError};
use crate::policy::AutoGrantPolicy;
use crate::prompt::{PermissionPresenter, PermissionPrompt, PromptOutcome, PromptResponse};

/// Namespace prefix for ledger rows.
pub const LEDGER_NAMESPACE_PREFIX: &str = "ledger:";

/// Snapshot of an extension's revocation epoch.
///
/// Taken before an operation that relies on current grants; [`check`]
/// fails once any grant of the extension has been narrowed since.
///
/// [`check`]: RevocationToken::check
#[derive(Debug, Clone)]
pub struct RevocationToken {
    extension_id: ExtensionId,
    epoch: Arc<AtomicU64>,
    observed: u64,
}

impl RevocationToken {
    /// Fail with [`PermissionError::Revoked`] if grants were narrowed since
    /// the token was taken.
    ///
    /// # Errors
    ///
    /// Returns [`PermissionError::Revoked`] on any intervening revoke.
    pub fn check(&self) -> Result<(), PermissionError> {
        if self.epoch.load(Ordering::Acquire) == self.observed {
            Ok(())
        } else {
            Err(PermissionError::Revoked {
                extension_id: self.extension_id.clone(),
            })
        }
    }

    /// The extension the token watches.
    #[must_use]
    pub fn extension_id(&self) -> &ExtensionId {
        &self.extension_id
    }

    /// The epoch observed when the token was taken.
    #[must_use]
    pub fn observed(&self) -> u64 {
        self.observed
    }
}

/// Per-extension record of permission and host-pattern decisions.
///
/// Rows live in the `ledger:{extension_id}` namespace, keyed by
/// [`PermissionItem::storage_key`]. Every write completes before the call
/// returns. Only registered packages may be decided for.
pub struct PermissionLedger {
    store: Arc<dyn ObjectStore>,
    /// Registered packages and their revocation epochs.
    packages: RwLock<HashMap<ExtensionId, Arc<AtomicU64>>>,
}

impl std::fmt::Debug for PermissionLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionLedger").finish_non_exhaustive()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> LedgerError {
    LedgerError::Internal(e.to_string())
}

impl PermissionLedger {
    /// Create a ledger over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            packages: RwLock::new(HashMap::new()),
        }
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Mark `id` as an installed package. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Internal`] if the registry lock is poisoned.
    pub fn register_package(&self, id: &ExtensionId) -> LedgerResult<()> {
        let mut packages = self.packages.write().map_err(poisoned)?;
        packages
            .entry(id.clone())
            .or_insert_with(|| Arc::new(AtomicU64::new(0)));
        Ok(())
    }

    /// Whether `id` is registered.
    #[must_use]
    pub fn is_registered(&self, id: &ExtensionId) -> bool {
        self.packages
            .read()
            .is_ok_and(|packages| packages.contains_key(id))
    }

    fn epoch(&self, id: &ExtensionId) -> LedgerResult<Arc<AtomicU64>> {
        let packages = self.packages.read().map_err(poisoned)?;
        packages
            .get(id)
            .cloned()
            .ok_or_else(|| LedgerError::UnknownPackage(id.clone()))
    }

    fn bump_epoch(&self, id: &ExtensionId) -> LedgerResult<()> {
        let epoch = self.epoch(id)?;
        let previous = epoch.fetch_add(1, Ordering::AcqRel);
        debug!(extension_id = %id, epoch = previous.saturating_add(1), "Revocation epoch advanced");
        Ok(())
    }

    /// Current revocation epoch of `id`. It only ever grows, and advances
    /// whenever a grant of `id` is narrowed.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::UnknownPackage`] if `id` is not registered.
    pub fn revocation_epoch(&self, id: &ExtensionId) -> LedgerResult<u64> {
        Ok(self.epoch(id)?.load(Ordering::Acquire))
    }

    /// Snapshot the revocation epoch of `id`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::UnknownPackage`] if `id` is not registered.
    pub fn revocation_token(&self, id: &ExtensionId) -> LedgerResult<RevocationToken> {
        let epoch = self.epoch(id)?;
        let observed = epoch.load(Ordering::Acquire);
        Ok(RevocationToken {
            extension_id: id.clone(),
            epoch,
            observed,
        })
    }

    fn scope(&self, id: &ExtensionId) -> LedgerResult<ScopedStore> {
        Ok(ScopedStore::new(
            Arc::clone(&self.store),
            format!("{LEDGER_NAMESPACE_PREFIX}{id}"),
        )?)
    }

    async fn fetch_decision(
        scoped: &ScopedStore,
        item: &PermissionItem,
    ) -> LedgerResult<Option<PermissionDecision>> {
        match scoped.fetch_json(&item.storage_key()).await {
            Ok(row) => Ok(row),
            Err(StorageError::Serialization(e)) => {
                warn!(namespace = scoped.namespace(), item = %item, error = %e, "Ignoring undecodable ledger row");
                Ok(None)
            },
            Err(e) => Err(e.into()),
        }
    }

    // -----------------------------------------------------------------------
    // Decisions
    // -----------------------------------------------------------------------

    /// Record one decision per requested-or-optional item of `request`.
    ///
    /// Items in `granted` become `GrantedExplicitly`; every other item becomes
    /// `DeniedExplicitly`. Granted items outside the request are ignored. A
    /// [`DecisionSource::Policy`] decision never overwrites a user decision.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::UnknownPackage`] for an unregistered id, or the
    /// storage error if a write fails.
    pub async fn decide(
        &self,
        id: &ExtensionId,
        request: &PermissionRequest,
        granted: &GrantSet,
        source: DecisionSource,
    ) -> LedgerResult<Vec<PermissionDecision>> {
        self.epoch(id)?;

        for item in granted.items() {
            if !request.covers(&item) {
                warn!(extension_id = %id, item = %item, "Ignoring grant for an item that was not requested");
            }
        }

        let scoped = self.scope(id)?;
        let mut recorded = Vec::new();
        let mut narrowed = false;

        for item in request.items() {
            let previous = Self::fetch_decision(&scoped, &item).await?;
            if source == DecisionSource::Policy
                && let Some(previous) = &previous
                && previous.source.is_user()
            {
                debug!(extension_id = %id, item = %item, "Keeping user decision over policy");
                continue;
            }

            let status = if granted.contains(&item) {
                PermissionStatus::GrantedExplicitly
            } else {
                PermissionStatus::DeniedExplicitly
            };
            if previous.is_some_and(|p| p.status.is_granted()) && !status.is_granted() {
                narrowed = true;
            }

            let decision = PermissionDecision::new(id.clone(), item, status, source);
            scoped
                .upsert_json(&decision.item.storage_key(), &decision)
                .await?;
            recorded.push(decision);
        }

        if narrowed {
            self.bump_epoch(id)?;
        }

        info!(
            extension_id = %id,
            recorded = recorded.len(),
            granted = recorded.iter().filter(|d| d.status.is_granted()).count(),
            source = ?source,
            "Permission decisions recorded"
        );
        Ok(recorded)
    }

    /// Grant the policy's allow-listed items that `request` asks for and that
    /// have no decision yet.
    ///
    /// # Errors
    ///
    /// See [`decide`](Self::decide).
    pub async fn apply_policy(
        &self,
        id: &ExtensionId,
        request: &PermissionRequest,
        policy: &AutoGrantPolicy,
    ) -> LedgerResult<Vec<PermissionDecision>> {
        self.epoch(id)?;
        if policy.is_empty() {
            return Ok(Vec::new());
        }

        let undecided: BTreeSet<PermissionItem> =
            self.undecided(id, request).await?.into_iter().collect();
        let eligible: BTreeSet<PermissionItem> = policy
            .applicable(request)
            .into_iter()
            .filter(|item| undecided.contains(item))
            .collect();
        if eligible.is_empty() {
            return Ok(Vec::new());
        }

        let subset = request.restricted_to(&eligible);
        let granted = GrantSet::from_items(eligible);
        self.decide(id, &subset, &granted, DecisionSource::Policy)
            .await
    }

    /// Recorded status of one item; `Undecided` if no row exists.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::UnknownPackage`] for an unregistered id, or the
    /// storage error if the read fails.
    pub async fn status(
        &self,
        id: &ExtensionId,
        item: &PermissionItem,
    ) -> LedgerResult<PermissionStatus> {
        self.epoch(id)?;
        let scoped = self.scope(id)?;
        Ok(Self::fetch_decision(&scoped, item)
            .await?
            .map_or(PermissionStatus::Undecided, |d| d.status))
    }

    /// Every recorded row of `id`, ordered by storage key.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::UnknownPackage`] for an unregistered id, or the
    /// storage error if the read fails.
    pub async fn decisions(&self, id: &ExtensionId) -> LedgerResult<Vec<PermissionDecision>> {
        self.epoch(id)?;
        let rows: Vec<(String, PermissionDecision)> = self.scope(id)?.fetch_all_json().await?;
        Ok(rows.into_iter().map(|(_, d)| d).collect())
    }

    /// Items of `request` without a recorded decision.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::UnknownPackage`] for an unregistered id, or the
    /// storage error if the read fails.
    pub async fn undecided(
        &self,
        id: &ExtensionId,
        request: &PermissionRequest,
    ) -> LedgerResult<Vec<PermissionItem>> {
        self.epoch(id)?;
        let scoped = self.scope(id)?;
        let mut pending = Vec::new();
        for item in request.items() {
            let status = Self::fetch_decision(&scoped, &item)
                .await?
                .map_or(PermissionStatus::Undecided, |d| d.status);
            if status == PermissionStatus::Undecided {
                pending.push(item);
            }
        }
        Ok(pending)
    }

    /// Rebuild the granted set of `id` from storage.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::UnknownPackage`] for an unregistered id, or the
    /// storage error if the read fails.
    pub async fn current_grants(&self, id: &ExtensionId) -> LedgerResult<GrantSet> {
        let decisions = self.decisions(id).await?;
        Ok(GrantSet::from_items(
            decisions
                .into_iter()
                .filter(|d| d.status.is_granted())
                .map(|d| d.item),
        ))
    }

    /// Record `items` as explicitly denied and advance the revocation epoch.
    ///
    /// Returns the granted set after the revoke. Callers holding a live
    /// runtime context must apply it before the next permission check.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::UnknownPackage`] for an unregistered id, or the
    /// storage error if a write fails.
    pub async fn revoke(
        &self,
        id: &ExtensionId,
        items: &[PermissionItem],
    ) -> LedgerResult<GrantSet> {
        self.epoch(id)?;
        let scoped = self.scope(id)?;
        for item in items {
            let decision = PermissionDecision::new(
                id.clone(),
                item.clone(),
                PermissionStatus::DeniedExplicitly,
                DecisionSource::User,
            );
            scoped.upsert_json(&item.storage_key(), &decision).await?;
        }
        self.bump_epoch(id)?;
        info!(extension_id = %id, revoked = items.len(), "Permissions revoked");
        self.current_grants(id).await
    }

    /// Delete the rows for `items` so they are prompted for again.
    ///
    /// Returns the number of rows removed.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::UnknownPackage`] for an unregistered id, or the
    /// storage error if a delete fails.
    pub async fn reset(&self, id: &ExtensionId, items: &[PermissionItem]) -> LedgerResult<usize> {
        self.epoch(id)?;
        let scoped = self.scope(id)?;
        let mut removed: usize = 0;
        let mut narrowed = false;
        for item in items {
            if Self::fetch_decision(&scoped, item)
                .await?
                .is_some_and(|d| d.status.is_granted())
            {
                narrowed = true;
            }
            if scoped.delete(&item.storage_key()).await? {
                removed = removed.saturating_add(1);
            }
        }
        if narrowed {
            self.bump_epoch(id)?;
        }
        debug!(extension_id = %id, removed, "Permission decisions reset");
        Ok(removed)
    }

    /// Delete every row of `id` and unregister it. Outstanding revocation
    /// tokens for `id` fail their next check.
    ///
    /// Returns the number of rows removed.
    ///
    /// # Errors
    ///
    /// Returns the storage error if the delete fails.
    pub async fn forget_package(&self, id: &ExtensionId) -> LedgerResult<u64> {
        let removed = self.scope(id)?.clear().await?;
        let epoch = self.packages.write().map_err(poisoned)?.remove(id);
        if let Some(epoch) = epoch {
            epoch.fetch_add(1, Ordering::AcqRel);
        }
        info!(extension_id = %id, removed, "Permission ledger rows deleted");
        Ok(removed)
    }

    // -----------------------------------------------------------------------
    // Prompt flow
    // -----------------------------------------------------------------------

    /// Ask the user about every undecided item of `request`.
    ///
    /// Dismissal and timeout are recorded as explicit denies with
    /// [`DecisionSource::Dismissed`].
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::UnknownPackage`] for an unregistered id, or the
    /// storage error if a read or write fails.
    pub async fn prompt(
        &self,
        id: &ExtensionId,
        display_name: &str,
        request: &PermissionRequest,
        presenter: &dyn PermissionPresenter,
        timeout: Duration,
    ) -> LedgerResult<PromptOutcome> {
        let pending: BTreeSet<PermissionItem> =
            self.undecided(id, request).await?.into_iter().collect();
        if pending.is_empty() {
            return Ok(PromptOutcome::NothingToAsk);
        }
        if !presenter.is_available() {
            warn!(extension_id = %id, "No permission presenter available");
            return Ok(PromptOutcome::Unavailable);
        }

        let subset = request.restricted_to(&pending);
        let prompt = PermissionPrompt {
            extension_id: id.clone(),
            display_name: display_name.to_owned(),
            request: subset.clone(),
        };

        match tokio::time::timeout(timeout, presenter.present(prompt)).await {
            Ok(PromptResponse::Granted(granted)) => {
                let decisions = self
                    .decide(id, &subset, &granted, DecisionSource::User)
                    .await?;
                Ok(PromptOutcome::Decided { decisions })
            },
            Ok(PromptResponse::Cancelled) => {
                info!(extension_id = %id, "Permission prompt dismissed");
                let decisions = self
                    .decide(id, &subset, &GrantSet::new(), DecisionSource::Dismissed)
                    .await?;
                Ok(PromptOutcome::Dismissed { decisions })
            },
            Err(_) => {
                warn!(extension_id = %id, timeout_ms = timeout.as_millis(), "Permission prompt timed out");
                let decisions = self
                    .decide(id, &subset, &GrantSet::new(), DecisionSource::Dismissed)
                    .await?;
                Ok(PromptOutcome::Dismissed { decisions })
            },
        }
    }
}

#[cfg(test)]
#[path = "ledger_tests.rs"]
mod tests;
