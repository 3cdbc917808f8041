//! Webext Bridge - Tab/window bridge between a browsing host and an extension runtime.
//!
//! The host owns its tabs and windows; the extension runtime is a black box
//! that loads packages and executes scripts. This crate sits between them:
//!
//! - [`HostModel`]: the owning tab/window collection, with a generation per
//!   logical entity so reused ids are never confused.
//! - [`AdapterIdentityCache`]: one stable [`TabAdapter`] / [`WindowAdapter`]
//!   per open id, purged exactly on close.
//! - [`LifecycleController`]: install, enable, load, unload, disable and
//!   uninstall against the runtime, the ledger and storage.
//! - [`EventSynchronizer`]: host mutations forwarded to the runtime in the
//!   order it requires.
//! - [`ScriptInjectionBridge`]: permission-checked injection with a single
//!   best-effort fallback through the page-context shim.
//!
//! [`ExtensionBridge`] owns all of it and is the entry point for hosts.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use webext_bridge::{ExtensionBridge, InjectionRequest, PackageSource, TabProperties};
//! use webext_config::BridgeConfig;
//! use webext_core::{TabId, WindowId};
//! use webext_storage::MemoryObjectStore;
//!
//! let config = BridgeConfig::load(None)?;
//! let mut bridge = ExtensionBridge::new(runtime, validator, Arc::new(MemoryObjectStore::new()), &config)?
//!     .with_page_channel(channel);
//!
//! bridge.window_opened(WindowId(1), true)?;
//! bridge.tab_opened(TabId(1), WindowId(1), TabProperties::at(url))?;
//!
//! let package = bridge.install(PackageSource::new(id.clone(), path)).await?;
//! bridge.request_permissions(&package.id, &presenter).await?;
//! bridge.load(&package.id).await?;
//!
//! let outcome = bridge.inject(InjectionRequest::code(id, TabId(1), "document.title")).await?;
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod adapter;
mod attach;
mod bridge;
mod error;
mod host;
mod lifecycle;
mod manifest;
mod package;
mod runtime;
mod sync;

pub mod injection;

#[cfg(test)]
mod test_support;

pub use adapter::{AdapterIdentityCache, TabAdapter, WindowAdapter};
pub use attach::PageAttachments;
pub use bridge::ExtensionBridge;
pub use error::{
    BridgeError, BridgeResult, HostError, HostResult, InjectionError, InjectionResult,
    InstallationError, InstallationResult, LifecycleError, LifecycleResult, RuntimeError,
    RuntimeResult,
};
pub use host::{
    Generation, HostModel, LoadState, TabProperties, TabProperty, TabState, TabUpdate,
    WindowState,
};
pub use injection::{
    AbandonReason, InjectionOutcome, InjectionRequest, InjectionScope, PreparedInjection,
    RequestOrigin, ScriptInjectionBridge, ScriptPayload,
};
pub use lifecycle::{LifecycleController, PackageState, RestoreReport};
pub use manifest::{ExtensionManifest, ManifestError, ManifestValidator, PackageSource};
pub use package::{ExtensionPackage, PACKAGE_NAMESPACE};
pub use runtime::{ExtensionRuntime, NativeFailureKind, NativeInjectionError, RuntimeContext};
pub use sync::{EventSynchronizer, SyncContext};
