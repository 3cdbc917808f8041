//! Webext Storage - keyed object store used for package and permission rows.
//!
//! The bridge does not own a storage engine. It talks to the host's
//! persistence layer through the [`ObjectStore`] trait: namespaced
//! upsert/fetch/delete of opaque byte values. The bridge uses two namespace
//! families:
//!
//! | Namespace | Rows |
//! |-----------|------|
//! | `packages` | one `ExtensionPackage` per extension id |
//! | `ledger:{extension_id}` | one `PermissionDecision` per permission or host pattern |
//!
//! [`MemoryObjectStore`] is the in-process implementation used by tests and by
//! hosts that persist elsewhere. [`ScopedStore`] pre-binds a namespace and
//! adds JSON helpers.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod error;
pub mod store;

pub use error::{StorageError, StorageResult};
pub use store::{MemoryObjectStore, ObjectStore, ScopedStore};
