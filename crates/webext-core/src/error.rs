//! Parse and validation errors for core types.

use thiserror::Error;

/// Errors produced when constructing core types from untrusted input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// The extension identifier is empty or contains forbidden characters.
    #[error("invalid extension id: {0}")]
    InvalidExtensionId(String),

    /// A host match pattern could not be parsed.
    #[error("invalid host pattern '{pattern}': {reason}")]
    InvalidHostPattern {
        /// The pattern as written.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A permission name was empty or malformed.
    #[error("invalid permission: {0}")]
    InvalidPermission(String),
}

/// Result type for core parsing operations.
pub type CoreResult<T> = Result<T, CoreError>;
