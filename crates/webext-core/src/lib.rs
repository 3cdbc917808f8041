//! Webext Core - Shared vocabulary for the webext tab/window bridge.
//!
//! This crate provides:
//! - Identifiers for extensions, tabs, and windows
//! - The structured [`Permission`] and [`HostPattern`] types used by the
//!   permission ledger (no textual comparison of permission descriptions)
//! - [`GrantSet`], the granted-permission view seeded into a runtime context
//! - Origin classification for script injection targets
//!
//! # Example
//!
//! ```
//! use webext_core::{GrantSet, HostPattern, Permission};
//!
//! let pattern: HostPattern = "*://*.example.com/*".parse().unwrap();
//! let mut grants = GrantSet::default();
//! grants.permissions.insert(Permission::Storage);
//! grants.host_patterns.insert(pattern);
//!
//! let url = url::Url::parse("https://example.com/index.html").unwrap();
//! assert!(grants.allows_url(&url));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod error;
pub mod ids;
pub mod origin;
pub mod pattern;
pub mod permission;
pub mod types;

pub use error::{CoreError, CoreResult};
pub use ids::{ExtensionId, TabId, WindowId};
pub use origin::{InjectionPath, InjectionWorld, OriginClass, OriginPolicy, RestrictedReason};
pub use pattern::{HostPattern, PATTERN_SCHEMES};
pub use permission::{GrantSet, Permission, PermissionItem, PermissionStatus};
pub use types::Timestamp;
