//! Webext Telemetry - logging setup and operation spans.
//!
//! This crate provides:
//! - [`LogConfig`] and [`setup_logging`] on top of `tracing-subscriber`
//! - [`OperationContext`], a correlation id plus span for one management or
//!   injection operation
//!
//! # Example
//!
//! ```rust,no_run
//! use webext_telemetry::{LogConfig, LogFormat, OperationContext, setup_logging};
//!
//! # fn main() -> Result<(), webext_telemetry::TelemetryError> {
//! setup_logging(&LogConfig::new("info").with_format(LogFormat::Compact))?;
//!
//! let ctx = OperationContext::new("lifecycle").with_extension("com.example.reader");
//! let _span = ctx.span().entered();
//! tracing::info!("enabling package");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod context;
mod error;
mod logging;

pub use context::{OperationContext, OperationGuard};
pub use error::{TelemetryError, TelemetryResult};
pub use logging::{
    FileLogConfig, FileRotation, LogConfig, LogFormat, LogTarget, setup_default_logging,
    setup_logging,
};
