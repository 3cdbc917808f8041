use webext_core::{ExtensionId, PermissionItem};
use webext_storage::StorageError;

/// Errors from ledger operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The extension id is not a registered package.
    #[error("unknown package: {0}")]
    UnknownPackage(ExtensionId),

    /// The persistence collaborator failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Internal ledger state is unusable (poisoned lock).
    #[error("internal ledger error: {0}")]
    Internal(String),
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// A permission check that did not pass.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PermissionError {
    /// The item was never granted (denied, dismissed, or undecided).
    #[error("{extension_id} lacks permission '{item}'")]
    Denied {
        /// Extension that was checked.
        extension_id: ExtensionId,
        /// Missing item.
        item: PermissionItem,
    },

    /// A grant was revoked while an operation relying on it was in flight.
    #[error("permissions of {extension_id} were revoked during the operation")]
    Revoked {
        /// Extension whose grants changed.
        extension_id: ExtensionId,
    },
}
