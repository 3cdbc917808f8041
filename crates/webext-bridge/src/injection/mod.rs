//! Script injection with a single best-effort fallback.
//!
//! An injection is admitted synchronously by [`ScriptInjectionBridge::prepare`]
//! against the current host, runtime-context and attachment state:
//!
//! 1. the target tab must be open,
//! 2. its origin must not be restricted,
//! 3. the extension must be loaded,
//! 4. a granted host pattern must cover the page URL.
//!
//! The returned [`PreparedInjection`] owns everything it needs and runs the
//! primary path through the runtime. Only a failure classified as a
//! capability gap triggers the fallback, at most once, through the
//! page-message channel. A fallback that fails degrades the outcome rather
//! than failing the call.

mod payload;
mod request;
mod shim;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, warn};
use webext_core::{ExtensionId, InjectionPath, OriginClass, OriginPolicy, TabId};
use webext_events::{BridgeEvent, EventBus, EventMetadata};
use webext_permissions::{PermissionLedger, RevocationToken};
use webext_telemetry::OperationContext;

use crate::adapter::{AdapterIdentityCache, TabAdapter};
use crate::attach::PageAttachments;
use crate::error::{InjectionError, InjectionResult};
use crate::host::HostModel;
use crate::runtime::{ExtensionRuntime, NativeFailureKind, NativeInjectionError, RuntimeContext};

pub use payload::{PayloadError, resolve_payload};
pub use request::{AbandonReason, InjectionOutcome, InjectionRequest, RequestOrigin, ScriptPayload};
pub use shim::{
    ChannelError, PageMessageChannel, SHIM_CHANNEL, ShimFile, ShimOutcome, ShimRequest,
    ShimResponse, ShimScript, decode_request, decode_response, encode_request, encode_response,
};

/// Default deadline for one injection.
pub const DEFAULT_INJECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Bridge state an injection is admitted against.
pub struct InjectionScope<'a> {
    /// Current tabs and windows.
    pub host: &'a HostModel,
    /// Adapter cache; the target's adapter is created if needed.
    pub adapters: &'a mut AdapterIdentityCache,
    /// Runtime context of the requesting extension, if loaded.
    pub context: Option<&'a RuntimeContext>,
    /// Ledger, for the revocation token.
    pub ledger: &'a PermissionLedger,
    /// Ready page contexts.
    pub attachments: &'a PageAttachments,
    /// The runtime that services the primary path.
    pub runtime: Arc<dyn ExtensionRuntime>,
    /// Where outcomes are published.
    pub events: &'a EventBus,
}

/// Admits injection requests and configures their execution.
pub struct ScriptInjectionBridge {
    origin_policy: OriginPolicy,
    timeout: Duration,
    fallback_enabled: bool,
    channel: Option<Arc<dyn PageMessageChannel>>,
}

impl std::fmt::Debug for ScriptInjectionBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptInjectionBridge")
            .field("origin_policy", &self.origin_policy)
            .field("timeout", &self.timeout)
            .field("fallback_enabled", &self.fallback_enabled)
            .field("channel", &self.channel.is_some())
            .finish()
    }
}

impl Default for ScriptInjectionBridge {
    fn default() -> Self {
        Self::new(OriginPolicy::default())
    }
}

impl ScriptInjectionBridge {
    /// A bridge with the default deadline, fallback enabled and no channel.
    #[must_use]
    pub fn new(origin_policy: OriginPolicy) -> Self {
        Self {
            origin_policy,
            timeout: DEFAULT_INJECTION_TIMEOUT,
            fallback_enabled: true,
            channel: None,
        }
    }

    /// Set the per-request deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enable or disable the fallback.
    #[must_use]
    pub fn with_fallback(mut self, enabled: bool) -> Self {
        self.fallback_enabled = enabled;
        self
    }

    /// Set the page-message channel used by the fallback.
    #[must_use]
    pub fn with_channel(mut self, channel: Arc<dyn PageMessageChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    /// The origin policy.
    #[must_use]
    pub fn origin_policy(&self) -> &OriginPolicy {
        &self.origin_policy
    }

    /// Admit `request` against `scope`.
    ///
    /// # Errors
    ///
    /// - [`InjectionError::NoTargetTab`] if the tab is not open.
    /// - [`InjectionError::RestrictedOrigin`] if the page is never injectable.
    /// - [`InjectionError::ExtensionNotLoaded`] if the extension has no
    ///   runtime context.
    /// - [`InjectionError::PermissionDenied`] if no granted host pattern
    ///   covers the page.
    pub fn prepare(
        &self,
        request: InjectionRequest,
        scope: InjectionScope<'_>,
    ) -> InjectionResult<PreparedInjection> {
        let result = self.admit(request, scope);
        match &result {
            Err(e) if e.is_benign() => debug!(error = %e, "Injection target gone"),
            Err(e) => info!(error = %e, "Injection rejected"),
            Ok(prepared) => debug!(
                extension_id = %prepared.request.extension_id,
                tab_id = %prepared.request.target_tab,
                world = %prepared.request.world,
                fallback = prepared.fallback.is_some(),
                "Injection admitted"
            ),
        }
        result
    }

    fn admit(
        &self,
        request: InjectionRequest,
        scope: InjectionScope<'_>,
    ) -> InjectionResult<PreparedInjection> {
        let tab_id = request.target_tab;
        let extension_id = &request.extension_id;

        let Some(tab) = scope.host.tab(tab_id) else {
            return Err(InjectionError::NoTargetTab(tab_id));
        };
        if let OriginClass::Restricted(reason) = self.origin_policy.classify(&tab.url) {
            return Err(InjectionError::RestrictedOrigin {
                tab: tab_id,
                reason,
            });
        }

        let Some(context) = scope.context else {
            return Err(InjectionError::ExtensionNotLoaded(extension_id.clone()));
        };

        let denied = |detail: String| InjectionError::PermissionDenied {
            extension_id: extension_id.clone(),
            tab: tab_id,
            detail,
        };
        let revocation = scope
            .ledger
            .revocation_token(extension_id)
            .map_err(|e| denied(format!("ledger unavailable: {e}")))?;
        if revocation.observed() != context.grants_epoch {
            return Err(denied(format!(
                "grants narrowed since the runtime context was seeded (epoch {} > {})",
                revocation.observed(),
                context.grants_epoch
            )));
        }
        if !context.grants.allows_url(&tab.url) {
            return Err(denied(format!(
                "no granted host pattern matches {}",
                tab.url
            )));
        }

        let Some(adapter) = scope.adapters.tab_adapter(scope.host, tab_id) else {
            return Err(InjectionError::NoTargetTab(tab_id));
        };

        let fallback = match &self.channel {
            Some(channel)
                if self.fallback_enabled
                    && scope.attachments.is_attached(tab_id, extension_id) =>
            {
                Some(FallbackPlan {
                    channel: Arc::clone(channel),
                    install_path: context.install_path.clone(),
                })
            },
            _ => None,
        };

        let operation = OperationContext::new("injection")
            .with_extension(extension_id.as_str())
            .with_tab(tab_id.0);

        Ok(PreparedInjection {
            request,
            adapter,
            runtime: scope.runtime,
            events: scope.events.clone(),
            revocation,
            fallback,
            timeout: self.timeout,
            cancel: CancellationToken::new(),
            operation,
        })
    }
}

/// Where the fallback sends its request.
struct FallbackPlan {
    channel: Arc<dyn PageMessageChannel>,
    install_path: PathBuf,
}

/// An admitted injection, ready to run.
pub struct PreparedInjection {
    request: InjectionRequest,
    adapter: Arc<TabAdapter>,
    runtime: Arc<dyn ExtensionRuntime>,
    events: EventBus,
    revocation: RevocationToken,
    fallback: Option<FallbackPlan>,
    timeout: Duration,
    cancel: CancellationToken,
    operation: OperationContext,
}

impl std::fmt::Debug for PreparedInjection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedInjection")
            .field("request", &self.request)
            .field("fallback", &self.fallback.is_some())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl PreparedInjection {
    /// The admitted request.
    #[must_use]
    pub fn request(&self) -> &InjectionRequest {
        &self.request
    }

    /// Whether a capability gap would be retried through the shim.
    #[must_use]
    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    /// A token that abandons the injection when cancelled.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the injection.
    ///
    /// Timeout and cancellation yield [`InjectionOutcome::Abandoned`]; nothing
    /// is retried.
    ///
    /// # Errors
    ///
    /// - [`InjectionError::PermissionDenied`] if grants were revoked after
    ///   admission, or the runtime refused on permission grounds.
    /// - [`InjectionError::NoTargetTab`] if the runtime could not reach the tab.
    /// - [`InjectionError::CapabilityGap`] if the runtime cannot service the
    ///   request and no fallback is available.
    /// - [`InjectionError::Runtime`] for unclassified runtime failures.
    pub async fn execute(self) -> InjectionResult<InjectionOutcome> {
        let span = self.operation.span();
        self.run().instrument(span).await
    }

    async fn run(self) -> InjectionResult<InjectionOutcome> {
        let result = tokio::select! {
            biased;
            () = self.cancel.cancelled() => Ok(self.abandoned(AbandonReason::Cancelled)),
            dispatched = tokio::time::timeout(self.timeout, self.dispatch()) => match dispatched {
                Ok(result) => result,
                Err(_) => Ok(self.abandoned(AbandonReason::Timeout)),
            },
        };
        if let Err(e) = &result {
            if e.is_benign() {
                debug!(error = %e, "Injection target gone");
            } else {
                info!(error = %e, "Injection failed");
            }
        }
        result
    }

    async fn dispatch(&self) -> InjectionResult<InjectionOutcome> {
        self.revocation.check().map_err(|e| self.denied(e.to_string()))?;

        let primary = self
            .runtime
            .execute_script(
                &self.request.extension_id,
                &self.adapter,
                self.request.world,
                &self.request.payload,
            )
            .await;

        match primary {
            Ok(results) => Ok(self.completed(InjectionPath::Primary, results)),
            Err(e) => match e.kind {
                NativeFailureKind::CapabilityGap => self.fallback(e).await,
                NativeFailureKind::PermissionDenied => Err(self.denied(e.message)),
                NativeFailureKind::TargetUnreachable => {
                    Err(InjectionError::NoTargetTab(self.request.target_tab))
                },
                NativeFailureKind::Other => Err(InjectionError::Runtime(e.message)),
            },
        }
    }

    async fn fallback(&self, primary: NativeInjectionError) -> InjectionResult<InjectionOutcome> {
        let Some(plan) = &self.fallback else {
            debug!(reason = %primary.message, "Capability gap without a fallback");
            return Err(InjectionError::CapabilityGap(primary.message));
        };
        // A revoke during the primary attempt closes the fallback.
        self.revocation.check().map_err(|e| self.denied(e.to_string()))?;

        debug!(reason = %primary.message, "Primary path unsupported, using fallback");
        let script = match resolve_payload(&self.request.payload, &plan.install_path).await {
            Ok(script) => script,
            Err(e) => return Ok(self.degraded(e.to_string())),
        };

        let shim = ShimRequest::new(
            self.request.extension_id.clone(),
            self.request.world,
            script,
        );
        let request_id = shim.request_id;
        match plan
            .channel
            .send(self.request.target_tab, &self.request.extension_id, shim)
            .await
        {
            Ok(response) if response.request_id != request_id => Ok(self.degraded(format!(
                "response id {} does not match request {request_id}",
                response.request_id
            ))),
            Ok(ShimResponse {
                outcome: ShimOutcome::Completed { results },
                ..
            }) => Ok(self.completed(InjectionPath::Fallback, results)),
            Ok(ShimResponse {
                outcome: ShimOutcome::Failed { message },
                ..
            }) => Ok(self.degraded(message)),
            Err(e) => Ok(self.degraded(e.to_string())),
        }
    }

    // -----------------------------------------------------------------------
    // Outcomes
    // -----------------------------------------------------------------------

    fn metadata(&self) -> EventMetadata {
        EventMetadata::new("injection").with_correlation_id(self.operation.operation_id)
    }

    fn extension_id(&self) -> ExtensionId {
        self.request.extension_id.clone()
    }

    fn tab_id(&self) -> TabId {
        self.request.target_tab
    }

    fn denied(&self, detail: String) -> InjectionError {
        InjectionError::PermissionDenied {
            extension_id: self.extension_id(),
            tab: self.tab_id(),
            detail,
        }
    }

    fn completed(&self, path: InjectionPath, results: Vec<serde_json::Value>) -> InjectionOutcome {
        info!(path = %path, results = results.len(), "Injection completed");
        self.events.publish(BridgeEvent::InjectionCompleted {
            metadata: self.metadata(),
            extension_id: self.extension_id(),
            tab_id: self.tab_id(),
            path,
        });
        InjectionOutcome::Completed { path, results }
    }

    fn degraded(&self, reason: String) -> InjectionOutcome {
        warn!(reason = %reason, "Fallback injection failed");
        self.events.publish(BridgeEvent::InjectionDegraded {
            metadata: self.metadata(),
            extension_id: self.extension_id(),
            tab_id: self.tab_id(),
            reason: reason.clone(),
        });
        InjectionOutcome::Degraded { reason }
    }

    fn abandoned(&self, reason: AbandonReason) -> InjectionOutcome {
        debug!(reason = ?reason, elapsed_ms = self.operation.elapsed_ms(), "Injection abandoned");
        self.events.publish(BridgeEvent::InjectionAbandoned {
            metadata: self.metadata(),
            extension_id: self.extension_id(),
            tab_id: self.tab_id(),
        });
        InjectionOutcome::Abandoned { reason }
    }
}

#[cfg(test)]
#[path = "injection_tests.rs"]
mod tests;
