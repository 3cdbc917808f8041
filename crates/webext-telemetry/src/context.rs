//! Operation context for correlating log lines.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Correlation data for one bridge operation (an install, an injection, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationContext {
    /// Unique operation identifier.
    pub operation_id: Uuid,
    /// Parent operation, if this is a sub-step.
    pub parent_id: Option<Uuid>,
    /// Component that started the operation.
    pub component: String,
    /// Extension the operation concerns, if any.
    pub extension_id: Option<String>,
    /// Tab the operation targets, if any.
    pub tab_id: Option<u64>,
    /// When the operation started.
    pub started_at: DateTime<Utc>,
}

impl OperationContext {
    /// Start a new operation.
    #[must_use]
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            operation_id: Uuid::new_v4(),
            parent_id: None,
            component: component.into(),
            extension_id: None,
            tab_id: None,
            started_at: Utc::now(),
        }
    }

    /// Start a sub-step that inherits the extension and tab.
    #[must_use]
    pub fn child(&self, component: impl Into<String>) -> Self {
        Self {
            operation_id: Uuid::new_v4(),
            parent_id: Some(self.operation_id),
            component: component.into(),
            extension_id: self.extension_id.clone(),
            tab_id: self.tab_id,
            started_at: Utc::now(),
        }
    }

    /// Attach an extension id.
    #[must_use]
    pub fn with_extension(mut self, extension_id: impl Into<String>) -> Self {
        self.extension_id = Some(extension_id.into());
        self
    }

    /// Attach a tab id.
    #[must_use]
    pub fn with_tab(mut self, tab_id: u64) -> Self {
        self.tab_id = Some(tab_id);
        self
    }

    /// Milliseconds since the operation started.
    #[must_use]
    pub fn elapsed_ms(&self) -> i64 {
        Utc::now()
            .signed_duration_since(self.started_at)
            .num_milliseconds()
    }

    /// A span carrying this context's fields.
    #[must_use]
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "operation",
            operation_id = %self.operation_id,
            component = %self.component,
            extension_id = self.extension_id.as_deref(),
            tab_id = self.tab_id,
        )
    }
}

/// Enters an operation span and logs its duration on drop.
pub struct OperationGuard {
    context: OperationContext,
    _span: tracing::span::EnteredSpan,
}

impl OperationGuard {
    /// Enter the span for `context`.
    #[must_use]
    pub fn new(context: OperationContext) -> Self {
        let span = context.span().entered();
        tracing::trace!("operation started");
        Self {
            context,
            _span: span,
        }
    }

    /// The guarded context.
    #[must_use]
    pub fn context(&self) -> &OperationContext {
        &self.context
    }
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        tracing::debug!(elapsed_ms = self.context.elapsed_ms(), "operation finished");
    }
}
