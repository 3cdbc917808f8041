//! Webext Events - Event bus for the webext bridge.
//!
//! The bridge publishes a [`BridgeEvent`] whenever a management-visible
//! outcome happens: a package changes lifecycle state, a permission decision
//! is recorded, or an injection finishes. The host's management UI
//! subscribes to render those outcomes without polling.
//!
//! # Example
//!
//! ```rust
//! use webext_core::ExtensionId;
//! use webext_events::{BridgeEvent, EventBus, EventMetadata};
//!
//! # async fn example() {
//! let bus = EventBus::new();
//! let mut receiver = bus.subscribe();
//!
//! bus.publish(BridgeEvent::PackageEnabled {
//!     metadata: EventMetadata::new("lifecycle"),
//!     extension_id: ExtensionId::new("com.example.reader").unwrap(),
//! });
//!
//! let event = receiver.recv().await.unwrap();
//! assert_eq!(event.event_type(), "package_enabled");
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod bus;
mod event;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus, EventReceiver};
pub use event::{BridgeEvent, EventMetadata};
