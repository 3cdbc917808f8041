//! Post-merge configuration validation.

use webext_core::PATTERN_SCHEMES;

use crate::error::{ConfigError, ConfigResult};
use crate::types::BridgeConfig;

/// Largest accepted event bus capacity.
const MAX_EVENT_CAPACITY: usize = 65_536;

/// Validate a merged configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &BridgeConfig) -> ConfigResult<()> {
    validate_timeouts(config)?;
    validate_origins(config)?;
    validate_auto_grant(config)?;
    validate_events(config)?;
    Ok(())
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_owned(),
        message: message.into(),
    }
}

fn validate_timeouts(config: &BridgeConfig) -> ConfigResult<()> {
    if config.injection.timeout_ms == 0 {
        return Err(invalid("injection.timeout_ms", "must be greater than zero"));
    }
    if config.prompt.timeout_ms == 0 {
        return Err(invalid("prompt.timeout_ms", "must be greater than zero"));
    }
    Ok(())
}

fn validate_origins(config: &BridgeConfig) -> ConfigResult<()> {
    for scheme in &config.origins.content_schemes {
        if scheme.is_empty() || scheme.contains(':') {
            return Err(invalid(
                "origins.content_schemes",
                format!("'{scheme}' is not a bare scheme name"),
            ));
        }
        if scheme.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(invalid(
                "origins.content_schemes",
                format!("'{scheme}' must be lowercase"),
            ));
        }
        if !PATTERN_SCHEMES.contains(&scheme.as_str()) {
            return Err(invalid(
                "origins.content_schemes",
                format!("'{scheme}' cannot be matched by a host pattern"),
            ));
        }
    }
    for host in &config.origins.restricted_hosts {
        if host.is_empty() || host.contains('/') {
            return Err(invalid(
                "origins.restricted_hosts",
                format!("'{host}' is not a bare host name"),
            ));
        }
        if host.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(invalid(
                "origins.restricted_hosts",
                format!("'{host}' must be lowercase"),
            ));
        }
    }
    Ok(())
}

fn validate_auto_grant(config: &BridgeConfig) -> ConfigResult<()> {
    config.permissions.auto_grant.items().map(|_| ())
}

fn validate_events(config: &BridgeConfig) -> ConfigResult<()> {
    let capacity = config.events.capacity;
    if capacity == 0 || capacity > MAX_EVENT_CAPACITY {
        return Err(invalid(
            "events.capacity",
            format!("must be between 1 and {MAX_EVENT_CAPACITY}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(err: ConfigError) -> String {
        match err {
            ConfigError::ValidationError { field, .. } => field,
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&BridgeConfig::default()).is_ok());
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        let mut config = BridgeConfig::default();
        config.injection.timeout_ms = 0;
        assert_eq!(field_of(validate(&config).unwrap_err()), "injection.timeout_ms");

        let mut config = BridgeConfig::default();
        config.prompt.timeout_ms = 0;
        assert_eq!(field_of(validate(&config).unwrap_err()), "prompt.timeout_ms");
    }

    #[test]
    fn test_origin_entries_must_be_bare_lowercase() {
        let mut config = BridgeConfig::default();
        config.origins.content_schemes.push("WSS".into());
        assert_eq!(
            field_of(validate(&config).unwrap_err()),
            "origins.content_schemes"
        );

        let mut config = BridgeConfig::default();
        config.origins.content_schemes.push("wss:".into());
        assert!(validate(&config).is_err());

        let mut config = BridgeConfig::default();
        config.origins.content_schemes.push("wss".into());
        assert!(validate(&config).is_ok());

        let mut config = BridgeConfig::default();
        config.origins.restricted_hosts.push("example.com/path".into());
        assert_eq!(
            field_of(validate(&config).unwrap_err()),
            "origins.restricted_hosts"
        );
    }

    #[test]
    fn test_internal_scheme_cannot_be_opted_in() {
        let mut config = BridgeConfig::default();
        config.origins.content_schemes.push("chrome".into());
        assert_eq!(
            field_of(validate(&config).unwrap_err()),
            "origins.content_schemes"
        );
    }

    #[test]
    fn test_auto_grant_patterns_must_parse() {
        let mut config = BridgeConfig::default();
        config
            .permissions
            .auto_grant
            .host_patterns
            .push("not a pattern".into());
        assert_eq!(
            field_of(validate(&config).unwrap_err()),
            "permissions.auto_grant.host_patterns"
        );
    }

    #[test]
    fn test_event_capacity_bounds() {
        let mut config = BridgeConfig::default();
        config.events.capacity = 0;
        assert!(validate(&config).is_err());
        config.events.capacity = MAX_EVENT_CAPACITY;
        assert!(validate(&config).is_ok());
    }
}
