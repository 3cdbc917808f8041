//! Layered config loading.
//!
//! 1. Parse the embedded `defaults.toml`
//! 2. Merge the config file (explicit path, or the platform config dir)
//! 3. Apply `WEBEXT_*` environment overrides
//! 4. Deserialize and validate

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::env::{apply_env_overrides, collect_env_vars};
use crate::error::{ConfigError, ConfigResult};
use crate::types::BridgeConfig;
use crate::validate;

/// Embedded default configuration.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Maximum accepted config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1_048_576;

/// Platform config file location (`~/.config/webext/config.toml` on Linux).
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "webext").map(|d| d.config_dir().join("config.toml"))
}

/// Load configuration using the process environment.
///
/// With `path = None` the platform config file is used if it exists.
///
/// # Errors
///
/// Returns a [`ConfigError`] if a file is malformed, an override does not
/// parse, or the merged configuration fails validation.
pub fn load(path: Option<&Path>) -> ConfigResult<BridgeConfig> {
    load_with_env(path, &collect_env_vars())
}

/// Load configuration with an explicit environment snapshot.
///
/// # Errors
///
/// See [`load`].
pub fn load_with_env(
    path: Option<&Path>,
    env: &HashMap<String, String>,
) -> ConfigResult<BridgeConfig> {
    let mut merged = parse_defaults()?;

    let file = path.map(Path::to_path_buf).or_else(default_config_path);
    if let Some(file) = file
        && let Some(overlay) = try_load_file(&file)?
    {
        deep_merge(&mut merged, overlay);
        info!(path = %file.display(), "loaded config file");
    }

    let applied = apply_env_overrides(&mut merged, env)?;
    if applied > 0 {
        debug!(count = applied, "applied environment overrides");
    }

    finish(merged, "<merged config>")
}

/// Load a config from TOML text layered over the defaults. No environment.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the text does not parse or fails validation.
pub fn load_str(content: &str) -> ConfigResult<BridgeConfig> {
    let mut merged = parse_defaults()?;
    let overlay: toml::Value = toml::from_str(content).map_err(|e| ConfigError::ParseError {
        path: "<string>".to_owned(),
        source: e,
    })?;
    deep_merge(&mut merged, overlay);
    finish(merged, "<string>")
}

/// Load a specific file layered over the defaults. The file must exist.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read, does not parse, or
/// fails validation.
pub fn load_file(path: &Path) -> ConfigResult<BridgeConfig> {
    let mut merged = parse_defaults()?;
    let overlay = try_load_file(path)?.ok_or_else(|| ConfigError::ReadError {
        path: path.display().to_string(),
        source: std::io::Error::from(std::io::ErrorKind::NotFound),
    })?;
    deep_merge(&mut merged, overlay);
    finish(merged, &path.display().to_string())
}

fn parse_defaults() -> ConfigResult<toml::Value> {
    toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
        path: "<embedded defaults>".to_owned(),
        source: e,
    })
}

fn finish(merged: toml::Value, origin: &str) -> ConfigResult<BridgeConfig> {
    let config: BridgeConfig =
        merged
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::ParseError {
                path: origin.to_owned(),
                source: e,
            })?;
    validate::validate(&config)?;
    Ok(config)
}

/// Read and parse a file, returning `None` if it does not exist.
fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config file not found, skipping");
            return Ok(None);
        },
        Err(e) => {
            return Err(ConfigError::ReadError {
                path: path.display().to_string(),
                source: e,
            });
        },
    };

    if u64::try_from(content.len()).unwrap_or(u64::MAX) > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::ValidationError {
            field: path.display().to_string(),
            message: format!("config file exceeds the {MAX_CONFIG_FILE_SIZE} byte limit"),
        });
    }

    toml::from_str(&content)
        .map(Some)
        .map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            source: e,
        })
}

/// Merge `overlay` into `base`. Tables merge recursively; anything else in
/// the overlay replaces the base value.
fn deep_merge(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base.insert(key, value);
                    },
                }
            }
        },
        (base, overlay) => *base = overlay,
    }
}

impl BridgeConfig {
    /// See [`load`].
    ///
    /// # Errors
    ///
    /// See [`load`].
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        load(path)
    }

    /// See [`load_file`].
    ///
    /// # Errors
    ///
    /// See [`load_file`].
    pub fn load_file(path: &Path) -> ConfigResult<Self> {
        load_file(path)
    }
}
