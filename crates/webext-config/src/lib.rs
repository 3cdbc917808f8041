//! Webext Config - Layered configuration for the webext bridge.
//!
//! Configuration is assembled from, in increasing precedence:
//! 1. Embedded defaults (`defaults.toml`)
//! 2. A TOML file (explicit path, or the platform config directory)
//! 3. `WEBEXT_*` environment variables
//!
//! The merged result is validated before it is returned.
//!
//! # Example
//!
//! ```rust
//! let config = webext_config::load_str("[injection]\ntimeout_ms = 500").unwrap();
//! assert_eq!(config.injection.timeout_ms, 500);
//! assert!(config.permissions.auto_grant.is_empty());
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod env;
mod error;
mod loader;
mod types;
mod validate;

pub use env::collect_env_vars;
pub use error::{ConfigError, ConfigResult};
pub use loader::{default_config_path, load, load_file, load_str, load_with_env};
pub use types::{
    AutoGrantConfig, BridgeConfig, EventsConfig, InjectionConfig, OriginsConfig,
    PermissionsConfig, PromptConfig,
};
pub use validate::validate;
