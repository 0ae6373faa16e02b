//! Connector and validation error types.

use thiserror::Error;

use crate::github::GitHubError;

/// Errors that end a connector step.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// A step or validation ran before credentials were loaded.
    #[error("GitHub credentials not loaded")]
    MissingCredential,

    /// The checkpoint expects a current repository but has none.
    #[error("no repository saved in checkpoint")]
    MissingCachedRepository,

    /// Rate-limit backoff retried a logical operation too many times.
    #[error("re-tried {operation} too many times; something is going wrong fetching from GitHub")]
    RetriesExhausted { operation: String },

    #[error(transparent)]
    GitHub(#[from] GitHubError),

    /// The checkpoint (or its cached repository) could not be decoded.
    #[error("invalid checkpoint: {0}")]
    Checkpoint(#[from] serde_json::Error),
}

/// Human-readable outcome categories of settings validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0}")]
    MissingCredential(String),

    #[error("{0}")]
    InvalidSettings(String),

    #[error("{0}")]
    CredentialExpired(String),

    #[error("{0}")]
    InsufficientPermissions(String),

    #[error("{0}")]
    Unexpected(String),
}

impl ValidationError {
    /// Short category name.
    pub fn category(&self) -> &'static str {
        match self {
            ValidationError::MissingCredential(_) => "missing_credential",
            ValidationError::InvalidSettings(_) => "invalid_settings",
            ValidationError::CredentialExpired(_) => "credential_expired",
            ValidationError::InsufficientPermissions(_) => "insufficient_permissions",
            ValidationError::Unexpected(_) => "unexpected",
        }
    }
}
