//! Host match patterns.
//!
//! A [`HostPattern`] is parsed once from the manifest's textual form
//! (`<scheme>://<host><path>` or `<all_urls>`) and then compared and matched
//! structurally. Two patterns are equal exactly when their parsed components
//! are equal, so `*://*.Example.com/*` and `*://*.example.com/*` are the same
//! ledger item.

use std::fmt;
use std::str::FromStr;

use globset::GlobBuilder;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{CoreError, CoreResult};

/// Schemes matched by a `*` scheme wildcard.
const WILDCARD_SCHEMES: &[&str] = &["http", "https", "ws", "wss"];

/// Schemes matched by `<all_urls>`.
const ALL_URLS_SCHEMES: &[&str] = &["http", "https", "ws", "wss", "ftp", "file"];

/// Schemes a pattern may name explicitly.
pub const PATTERN_SCHEMES: &[&str] = &["http", "https", "ws", "wss", "ftp", "file"];

/// Scheme component of a host pattern.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SchemePattern {
    /// `*`: any web scheme (`http`, `https`, `ws`, `wss`).
    Web,
    /// One specific scheme.
    Exact(String),
}

/// Host component of a host pattern.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HostMatch {
    /// `*`: any host.
    Any,
    /// `*.domain`: the domain itself and every subdomain.
    Subdomains(String),
    /// An exact host name.
    Exact(String),
}

/// A structured host match pattern.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HostPattern {
    /// `<all_urls>`.
    AllUrls,
    /// `<scheme>://<host><path>`.
    Match {
        /// Scheme component.
        scheme: SchemePattern,
        /// Host component.
        host: HostMatch,
        /// Path component, always starting with `/`. `*` matches any run of
        /// characters, including `/`.
        path: String,
    },
}

fn invalid(pattern: &str, reason: impl Into<String>) -> CoreError {
    CoreError::InvalidHostPattern {
        pattern: pattern.to_string(),
        reason: reason.into(),
    }
}

/// Escape glob metacharacters other than `*`.
fn escape_path_glob(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        if matches!(c, '?' | '[' | ']' | '{' | '}' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

impl HostPattern {
    /// Parse a pattern from its manifest form.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidHostPattern`] if the pattern is malformed.
    pub fn parse(pattern: &str) -> CoreResult<Self> {
        let pattern = pattern.trim();
        if pattern == "<all_urls>" {
            return Ok(Self::AllUrls);
        }

        let (scheme, rest) = pattern
            .split_once("://")
            .ok_or_else(|| invalid(pattern, "missing '://'"))?;

        let scheme = match scheme {
            "*" => SchemePattern::Web,
            s if PATTERN_SCHEMES.contains(&s) => SchemePattern::Exact(s.to_string()),
            s => return Err(invalid(pattern, format!("unsupported scheme '{s}'"))),
        };

        let slash = rest
            .find('/')
            .ok_or_else(|| invalid(pattern, "missing path"))?;
        let (host, path) = rest.split_at(slash);

        let is_file = scheme == SchemePattern::Exact("file".into());
        let host = if is_file {
            if !host.is_empty() {
                return Err(invalid(pattern, "file patterns must not name a host"));
            }
            HostMatch::Any
        } else {
            Self::parse_host(pattern, host)?
        };

        Ok(Self::Match {
            scheme,
            host,
            path: path.to_string(),
        })
    }

    fn parse_host(pattern: &str, host: &str) -> CoreResult<HostMatch> {
        if host.is_empty() {
            return Err(invalid(pattern, "missing host"));
        }
        if host.contains(':') {
            return Err(invalid(pattern, "ports are not supported"));
        }
        if host == "*" {
            return Ok(HostMatch::Any);
        }
        let (subdomains, domain) = match host.strip_prefix("*.") {
            Some(domain) => (true, domain),
            None => (false, host),
        };
        if domain.is_empty() || domain.contains('*') {
            return Err(invalid(pattern, "'*' is only allowed as a leading '*.'"));
        }
        let domain = domain.to_ascii_lowercase();
        Ok(if subdomains {
            HostMatch::Subdomains(domain)
        } else {
            HostMatch::Exact(domain)
        })
    }

    /// Whether this pattern covers `url`.
    #[must_use]
    pub fn matches(&self, url: &Url) -> bool {
        match self {
            Self::AllUrls => ALL_URLS_SCHEMES.contains(&url.scheme()),
            Self::Match { scheme, host, path } => {
                Self::scheme_matches(scheme, url.scheme())
                    && Self::host_matches(host, url.host_str().unwrap_or_default())
                    && Self::path_matches(path, url)
            },
        }
    }

    fn scheme_matches(pattern: &SchemePattern, scheme: &str) -> bool {
        match pattern {
            SchemePattern::Web => WILDCARD_SCHEMES.contains(&scheme),
            SchemePattern::Exact(s) => s == scheme,
        }
    }

    fn host_matches(pattern: &HostMatch, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        match pattern {
            HostMatch::Any => true,
            HostMatch::Exact(h) => *h == host,
            HostMatch::Subdomains(domain) => {
                host == *domain
                    || host
                        .strip_suffix(domain.as_str())
                        .is_some_and(|prefix| prefix.ends_with('.'))
            },
        }
    }

    fn path_matches(pattern: &str, url: &Url) -> bool {
        let mut target = url.path().to_string();
        if let Some(query) = url.query() {
            target.push('?');
            target.push_str(query);
        }
        if pattern == "/*" {
            return true;
        }
        GlobBuilder::new(&escape_path_glob(pattern))
            .literal_separator(false)
            .backslash_escape(true)
            .build()
            .map(|glob| glob.compile_matcher().is_match(&target))
            .unwrap_or(false)
    }
}

impl FromStr for HostPattern {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for HostPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllUrls => f.write_str("<all_urls>"),
            Self::Match { scheme, host, path } => {
                let scheme = match scheme {
                    SchemePattern::Web => "*",
                    SchemePattern::Exact(s) => s.as_str(),
                };
                if scheme == "file" {
                    return write!(f, "file://{path}");
                }
                match host {
                    HostMatch::Any => write!(f, "{scheme}://*{path}"),
                    HostMatch::Subdomains(d) => write!(f, "{scheme}://*.{d}{path}"),
                    HostMatch::Exact(h) => write!(f, "{scheme}://{h}{path}"),
                }
            },
        }
    }
}

impl Serialize for HostPattern {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for HostPattern {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
