//! Webext Permissions - The persisted permission ledger.
//!
//! For each installed extension the ledger keeps one [`PermissionDecision`]
//! per requested-or-optional API permission and host pattern. Decisions are
//! explicit: they come from the user (a prompt choice, a dismissal, or a
//! revoke) or from the host's configured [`AutoGrantPolicy`]. There is no
//! implicit default grant.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use webext_core::{ExtensionId, GrantSet, Permission, PermissionItem};
//! use webext_permissions::{DecisionSource, PermissionLedger, PermissionRequest};
//! use webext_storage::MemoryObjectStore;
//!
//! # async fn example() {
//! let ledger = PermissionLedger::new(Arc::new(MemoryObjectStore::new()));
//! let id = ExtensionId::new("com.example.reader").unwrap();
//! ledger.register_package(&id).unwrap();
//!
//! let request = PermissionRequest::new()
//!     .with_permission(Permission::Storage)
//!     .with_permission(Permission::Tabs);
//! let granted = GrantSet::from_items([PermissionItem::Api(Permission::Storage)]);
//! ledger.decide(&id, &request, &granted, DecisionSource::User).await.unwrap();
//!
//! let grants = ledger.current_grants(&id).await.unwrap();
//! assert!(grants.permissions.contains(&Permission::Storage));
//! assert!(!grants.permissions.contains(&Permission::Tabs));
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod decision;
mod error;
mod ledger;
mod policy;
mod prompt;

pub use decision::{DecisionSource, PermissionDecision, PermissionRequest};
pub use error::{LedgerError, LedgerResult, PermissionError};
pub use ledger::{LEDGER_NAMESPACE_PREFIX, PermissionLedger, RevocationToken};
pub use policy::AutoGrantPolicy;
pub use prompt::{PermissionPresenter, PermissionPrompt, PromptOutcome, PromptResponse};
