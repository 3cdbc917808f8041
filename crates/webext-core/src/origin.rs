//! Injection worlds and origin classification.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

/// Execution context requested for injected code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectionWorld {
    /// The page's own global scope.
    Main,
    /// The extension's isolated, sandboxed scope.
    #[default]
    Isolated,
}

impl fmt::Display for InjectionWorld {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Main => f.write_str("main"),
            Self::Isolated => f.write_str("isolated"),
        }
    }
}

/// Delivery mechanism that serviced an injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectionPath {
    /// The runtime's native script-execution API.
    Primary,
    /// The page-context compatibility shim.
    Fallback,
}

impl fmt::Display for InjectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => f.write_str("primary"),
            Self::Fallback => f.write_str("fallback"),
        }
    }
}

/// Why a URL is off-limits to injection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum RestrictedReason {
    /// The scheme is not a content scheme (`about:`, `devtools:`, `data:` ...).
    Scheme {
        /// The offending scheme.
        scheme: String,
    },
    /// The host is on the restricted list (e.g. the extension gallery).
    Host {
        /// The offending host.
        host: String,
    },
}

impl fmt::Display for RestrictedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scheme { scheme } => write!(f, "restricted scheme '{scheme}'"),
            Self::Host { host } => write!(f, "restricted host '{host}'"),
        }
    }
}

/// Result of classifying a page URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginClass {
    /// Ordinary web content; subject to host permissions.
    Content,
    /// Never injectable regardless of permissions.
    Restricted(RestrictedReason),
}

/// Policy deciding which origins are never injectable.
///
/// Schemes are allow-listed: anything outside `content_schemes` is
/// restricted, including internal schemes this crate has never heard of.
/// Hosts are deny-listed on top of that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginPolicy {
    /// Lowercase schemes that carry injectable content.
    pub content_schemes: BTreeSet<String>,
    /// Lowercase hosts that are always restricted.
    pub restricted_hosts: BTreeSet<String>,
}

impl Default for OriginPolicy {
    fn default() -> Self {
        Self {
            content_schemes: ["http", "https"].into_iter().map(String::from).collect(),
            restricted_hosts: BTreeSet::new(),
        }
    }
}

impl OriginPolicy {
    /// Classify a page URL.
    #[must_use]
    pub fn classify(&self, url: &Url) -> OriginClass {
        let scheme = url.scheme().to_ascii_lowercase();
        if !self.content_schemes.contains(&scheme) {
            return OriginClass::Restricted(RestrictedReason::Scheme { scheme });
        }
        if let Some(host) = url.host_str() {
            let host = host.to_ascii_lowercase();
            if self.restricted_hosts.contains(&host) {
                return OriginClass::Restricted(RestrictedReason::Host { host });
            }
        }
        OriginClass::Content
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_restricts_internal_schemes() {
        let policy = OriginPolicy::default();
        for s in ["about:blank", "chrome://settings", "data:text/html,hi", "file:///etc"] {
            let url = Url::parse(s).unwrap();
            assert!(
                matches!(policy.classify(&url), OriginClass::Restricted(_)),
                "{s} should be restricted"
            );
        }
        let url = Url::parse("https://example.com").unwrap();
        assert_eq!(policy.classify(&url), OriginClass::Content);
    }

    #[test]
    fn test_unlisted_internal_schemes_are_restricted() {
        let policy = OriginPolicy::default();
        for s in [
            "devtools://devtools/bundled/inspector.html",
            "chrome-untrusted://print/",
            "edge-extension://abc/popup.html",
            "browserhost://newtab",
        ] {
            let url = Url::parse(s).unwrap();
            assert!(
                matches!(
                    policy.classify(&url),
                    OriginClass::Restricted(RestrictedReason::Scheme { .. })
                ),
                "{s} should be restricted"
            );
        }
    }

    #[test]
    fn test_opted_in_scheme_is_content() {
        let mut policy = OriginPolicy::default();
        let url = Url::parse("wss://example.com/socket").unwrap();
        assert!(matches!(policy.classify(&url), OriginClass::Restricted(_)));
        policy.content_schemes.insert("wss".into());
        assert_eq!(policy.classify(&url), OriginClass::Content);
    }

    #[test]
    fn test_restricted_host() {
        let mut policy = OriginPolicy::default();
        policy.restricted_hosts.insert("addons.example.net".into());
        let url = Url::parse("https://ADDONS.example.net/x").unwrap();
        assert_eq!(
            policy.classify(&url),
            OriginClass::Restricted(RestrictedReason::Host {
                host: "addons.example.net".into()
            })
        );
    }

    #[test]
    fn test_world_default_is_isolated() {
        assert_eq!(InjectionWorld::default(), InjectionWorld::Isolated);
        assert_eq!(InjectionWorld::Main.to_string(), "main");
    }
}
