//! Injection requests and outcomes.

use serde::{Deserialize, Serialize};
use webext_core::{ExtensionId, InjectionPath, InjectionWorld, TabId};

/// What to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScriptPayload {
    /// Inline source.
    Code {
        /// Script source.
        source: String,
    },
    /// Files inside the package, relative to its install directory.
    Files {
        /// Relative file paths, run in order.
        files: Vec<String>,
    },
}

/// Which extension surface issued the request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestOrigin {
    /// The browser-action popup.
    Popup,
    /// The background context.
    #[default]
    Background,
    /// A content script in the foreground page.
    Foreground,
}

/// One script injection request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectionRequest {
    /// Requesting extension.
    pub extension_id: ExtensionId,
    /// Target tab.
    pub target_tab: TabId,
    /// Script to run.
    pub payload: ScriptPayload,
    /// Requested execution world.
    pub world: InjectionWorld,
    /// Requesting surface.
    pub origin: RequestOrigin,
}

impl InjectionRequest {
    /// Run inline `source` in the isolated world of `target_tab`.
    #[must_use]
    pub fn code(extension_id: ExtensionId, target_tab: TabId, source: impl Into<String>) -> Self {
        Self {
            extension_id,
            target_tab,
            payload: ScriptPayload::Code {
                source: source.into(),
            },
            world: InjectionWorld::default(),
            origin: RequestOrigin::default(),
        }
    }

    /// Run package `files` in the isolated world of `target_tab`.
    #[must_use]
    pub fn files<I, S>(extension_id: ExtensionId, target_tab: TabId, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            extension_id,
            target_tab,
            payload: ScriptPayload::Files {
                files: files.into_iter().map(Into::into).collect(),
            },
            world: InjectionWorld::default(),
            origin: RequestOrigin::default(),
        }
    }

    /// Set the execution world.
    #[must_use]
    pub fn in_world(mut self, world: InjectionWorld) -> Self {
        self.world = world;
        self
    }

    /// Set the requesting surface.
    #[must_use]
    pub fn from_origin(mut self, origin: RequestOrigin) -> Self {
        self.origin = origin;
        self
    }
}

/// Why an injection stopped waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbandonReason {
    /// The deadline passed.
    Timeout,
    /// The caller cancelled.
    Cancelled,
}

/// How an admitted injection ended.
///
/// Failures that must reach the caller are `Err(InjectionError)`. A failed
/// fallback is reported here as [`Degraded`](Self::Degraded).
#[derive(Debug, Clone, PartialEq)]
pub enum InjectionOutcome {
    /// The script ran.
    Completed {
        /// Path that serviced the request.
        path: InjectionPath,
        /// One result per frame or file, as reported.
        results: Vec<serde_json::Value>,
    },
    /// The fallback was attempted and did not complete.
    Degraded {
        /// Why the fallback failed.
        reason: String,
    },
    /// The result was abandoned; nothing is retried.
    Abandoned {
        /// Timeout or cancellation.
        reason: AbandonReason,
    },
}

impl InjectionOutcome {
    /// The servicing path of a completed injection.
    #[must_use]
    pub fn path(&self) -> Option<InjectionPath> {
        match self {
            Self::Completed { path, .. } => Some(*path),
            Self::Degraded { .. } | Self::Abandoned { .. } => None,
        }
    }

    /// Whether the script ran.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}
