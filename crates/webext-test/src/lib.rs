//! Webext Test - Shared test utilities for the webext bridge.
//!
//! Recording doubles for every collaborator the bridge consumes, fixtures for
//! common values, and a [`BridgeHarness`] that wires them together.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! webext-test.workspace = true
//! ```
//!
//! ```rust,ignore
//! use webext_test::{BridgeHarness, RuntimeCall, test_extension_id};
//!
//! #[tokio::test]
//! async fn test_window_announced() {
//!     let mut harness = BridgeHarness::new();
//!     harness.bridge.window_opened(WindowId(1), true).unwrap();
//!     assert_eq!(harness.runtime.calls()[0], RuntimeCall::OpenWindow(WindowId(1)));
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod fixtures;
pub mod harness;
pub mod mocks;

pub use fixtures::*;
pub use harness::*;
pub use mocks::*;
