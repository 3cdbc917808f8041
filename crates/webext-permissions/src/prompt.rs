//! Presentation collaborator for permission prompts.

use async_trait::async_trait;
use webext_core::{ExtensionId, GrantSet};

use crate::decision::{PermissionDecision, PermissionRequest};

/// What the user is asked to decide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionPrompt {
    /// Extension asking.
    pub extension_id: ExtensionId,
    /// Name shown to the user.
    pub display_name: String,
    /// Items still awaiting a decision.
    pub request: PermissionRequest,
}

/// The presenter's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptResponse {
    /// The user confirmed; everything outside the set is denied.
    Granted(GrantSet),
    /// The user dismissed the prompt.
    Cancelled,
}

/// UI that shows permission prompts.
#[async_trait]
pub trait PermissionPresenter: Send + Sync {
    /// Show the prompt and wait for the user.
    async fn present(&self, prompt: PermissionPrompt) -> PromptResponse;

    /// Whether a prompt can be shown right now.
    fn is_available(&self) -> bool {
        true
    }
}

/// Result of running a prompt through the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptOutcome {
    /// The user chose; decisions were recorded.
    Decided {
        /// Recorded rows.
        decisions: Vec<PermissionDecision>,
    },
    /// The prompt was dismissed or timed out; every item was denied.
    Dismissed {
        /// Recorded rows.
        decisions: Vec<PermissionDecision>,
    },
    /// Every requested item already has a decision.
    NothingToAsk,
    /// No presenter could show the prompt; items stay undecided.
    Unavailable,
}

impl PromptOutcome {
    /// Rows recorded by this prompt.
    #[must_use]
    pub fn decisions(&self) -> &[PermissionDecision] {
        match self {
            Self::Decided { decisions } | Self::Dismissed { decisions } => decisions,
            Self::NothingToAsk | Self::Unavailable => &[],
        }
    }
}
