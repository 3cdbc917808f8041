//! Typed messages of the page-context compatibility shim.
//!
//! When the native API cannot service a request, the bridge sends a
//! [`ShimRequest`] to the extension's already-running page context over a
//! reserved channel. The page side evaluates the sources in the requested
//! world and answers with a [`ShimResponse`] carrying the same request id.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use webext_core::{ExtensionId, InjectionWorld, TabId};

/// Name of the reserved page-message channel.
pub const SHIM_CHANNEL: &str = "webext-bridge.compat-shim.v1";

/// One source file sent to the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShimFile {
    /// Package-relative name, for error reporting.
    pub name: String,
    /// File contents.
    pub source: String,
}

/// The script the page context evaluates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ShimScript {
    /// Inline source.
    Code {
        /// Script source.
        source: String,
    },
    /// Resolved package files, evaluated in order.
    Files {
        /// File sources.
        sources: Vec<ShimFile>,
    },
}

/// Request sent into the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShimRequest {
    /// Correlates the response.
    pub request_id: Uuid,
    /// Extension whose page context evaluates the script.
    pub extension_id: ExtensionId,
    /// World to evaluate in.
    pub world: InjectionWorld,
    /// What to evaluate.
    pub script: ShimScript,
}

impl ShimRequest {
    /// A request with a fresh id.
    #[must_use]
    pub fn new(extension_id: ExtensionId, world: InjectionWorld, script: ShimScript) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            extension_id,
            world,
            script,
        }
    }
}

/// Result reported by the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ShimOutcome {
    /// Evaluation finished.
    Completed {
        /// One result per evaluated source.
        results: Vec<serde_json::Value>,
    },
    /// Evaluation threw or was refused.
    Failed {
        /// Page-provided message.
        message: String,
    },
}

/// Response from the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShimResponse {
    /// Id of the request being answered.
    pub request_id: Uuid,
    /// Evaluation result.
    pub outcome: ShimOutcome,
}

impl ShimResponse {
    /// A successful response to `request`.
    #[must_use]
    pub fn completed(request: &ShimRequest, results: Vec<serde_json::Value>) -> Self {
        Self {
            request_id: request.request_id,
            outcome: ShimOutcome::Completed { results },
        }
    }

    /// A failed response to `request`.
    #[must_use]
    pub fn failed(request: &ShimRequest, message: impl Into<String>) -> Self {
        Self {
            request_id: request.request_id,
            outcome: ShimOutcome::Failed {
                message: message.into(),
            },
        }
    }
}

/// Wire envelope on the reserved channel.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    channel: String,
    body: T,
}

/// Failures of the page-message channel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// No page context of the extension is listening in the tab.
    #[error("no page context attached")]
    NotAttached,

    /// The channel closed before a response arrived.
    #[error("channel closed: {0}")]
    Closed(String),

    /// A message did not decode or was addressed to another channel.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Encode a request for the reserved channel.
///
/// # Errors
///
/// Returns [`ChannelError::Protocol`] if serialization fails.
pub fn encode_request(request: &ShimRequest) -> Result<String, ChannelError> {
    serde_json::to_string(&Envelope {
        channel: SHIM_CHANNEL.to_string(),
        body: request,
    })
    .map_err(|e| ChannelError::Protocol(e.to_string()))
}

/// Decode a request received on the reserved channel.
///
/// # Errors
///
/// Returns [`ChannelError::Protocol`] for malformed messages or messages
/// addressed to another channel.
pub fn decode_request(message: &str) -> Result<ShimRequest, ChannelError> {
    decode(message)
}

/// Encode a response for the reserved channel.
///
/// # Errors
///
/// Returns [`ChannelError::Protocol`] if serialization fails.
pub fn encode_response(response: &ShimResponse) -> Result<String, ChannelError> {
    serde_json::to_string(&Envelope {
        channel: SHIM_CHANNEL.to_string(),
        body: response,
    })
    .map_err(|e| ChannelError::Protocol(e.to_string()))
}

/// Decode a response received on the reserved channel.
///
/// # Errors
///
/// Returns [`ChannelError::Protocol`] for malformed messages or messages
/// addressed to another channel.
pub fn decode_response(message: &str) -> Result<ShimResponse, ChannelError> {
    decode(message)
}

fn decode<T: serde::de::DeserializeOwned>(message: &str) -> Result<T, ChannelError> {
    let envelope: Envelope<T> =
        serde_json::from_str(message).map_err(|e| ChannelError::Protocol(e.to_string()))?;
    if envelope.channel != SHIM_CHANNEL {
        return Err(ChannelError::Protocol(format!(
            "message addressed to channel '{}'",
            envelope.channel
        )));
    }
    Ok(envelope.body)
}

/// Delivers shim requests to a tab's page context and awaits the answer.
#[async_trait]
pub trait PageMessageChannel: Send + Sync {
    /// Send `request` to the page context of `extension_id` in `tab`.
    async fn send(
        &self,
        tab: TabId,
        extension_id: &ExtensionId,
        request: ShimRequest,
    ) -> Result<ShimResponse, ChannelError>;
}
