//! `WEBEXT_*` environment overrides.
//!
//! Overrides are applied to the merged TOML tree after every file layer, so
//! an exported variable always wins over a file value.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};

/// How an environment string is turned into a TOML value.
#[derive(Clone, Copy)]
enum EnvKind {
    Bool,
    Integer,
    String,
}

struct EnvMapping {
    var_name: &'static str,
    field_path: &'static str,
    kind: EnvKind,
}

const ENV_MAPPINGS: &[EnvMapping] = &[
    EnvMapping {
        var_name: "WEBEXT_INJECTION_TIMEOUT_MS",
        field_path: "injection.timeout_ms",
        kind: EnvKind::Integer,
    },
    EnvMapping {
        var_name: "WEBEXT_FALLBACK_ENABLED",
        field_path: "injection.fallback_enabled",
        kind: EnvKind::Bool,
    },
    EnvMapping {
        var_name: "WEBEXT_PROMPT_TIMEOUT_MS",
        field_path: "prompt.timeout_ms",
        kind: EnvKind::Integer,
    },
    EnvMapping {
        var_name: "WEBEXT_EVENTS_CAPACITY",
        field_path: "events.capacity",
        kind: EnvKind::Integer,
    },
    EnvMapping {
        var_name: "WEBEXT_LOG_LEVEL",
        field_path: "logging.level",
        kind: EnvKind::String,
    },
];

/// Snapshot the `WEBEXT_*` variables of the current process.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars()
        .filter(|(k, _)| k.starts_with("WEBEXT_"))
        .collect()
}

fn parse_value(mapping: &EnvMapping, raw: &str) -> ConfigResult<toml::Value> {
    let raw = raw.trim();
    let err = |message: &str| ConfigError::EnvError {
        var_name: mapping.var_name.to_owned(),
        message: message.to_owned(),
    };
    match mapping.kind {
        EnvKind::Bool => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(toml::Value::Boolean(true)),
            "0" | "false" | "no" | "off" => Ok(toml::Value::Boolean(false)),
            _ => Err(err("expected a boolean")),
        },
        EnvKind::Integer => raw
            .parse::<i64>()
            .map(toml::Value::Integer)
            .map_err(|_| err("expected an integer")),
        EnvKind::String => Ok(toml::Value::String(raw.to_owned())),
    }
}

fn set_path(node: &mut toml::Value, path: &[&str], value: toml::Value) {
    let toml::Value::Table(table) = node else {
        return;
    };
    match path {
        [] => {},
        [leaf] => {
            table.insert((*leaf).to_owned(), value);
        },
        [head, rest @ ..] => {
            let child = table
                .entry((*head).to_owned())
                .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
            set_path(child, rest, value);
        },
    }
}

/// Apply overrides from `env` to `merged`. Returns how many were applied.
///
/// # Errors
///
/// Returns [`ConfigError::EnvError`] if a set variable does not parse.
pub(crate) fn apply_env_overrides(
    merged: &mut toml::Value,
    env: &HashMap<String, String>,
) -> ConfigResult<usize> {
    let mut applied: usize = 0;
    for mapping in ENV_MAPPINGS {
        let Some(raw) = env.get(mapping.var_name) else {
            continue;
        };
        let value = parse_value(mapping, raw)?;
        debug!(var = mapping.var_name, field = mapping.field_path, "applying env override");
        let path: Vec<&str> = mapping.field_path.split('.').collect();
        set_path(merged, &path, value);
        applied = applied.saturating_add(1);
    }
    Ok(applied)
}
