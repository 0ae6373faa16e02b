//! GitHub API error types.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::http::HttpError;

/// Errors that can occur when interacting with the GitHub API.
#[derive(Debug, Error)]
pub enum GitHubError {
    /// The request never produced a response.
    #[error("HTTP error: {0}")]
    Transport(#[from] HttpError),

    /// The response body did not match the expected shape.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API returned a non-success status.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Primary or secondary rate limit exceeded.
    #[error("Rate limit exceeded. Resets at {reset_at}")]
    RateLimited { reset_at: DateTime<Utc> },

    /// The access token is empty or malformed.
    #[error("Invalid credentials: {0}")]
    Credentials(String),
}

impl GitHubError {
    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    #[inline]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    #[inline]
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Whether this is GitHub refusing page-number pagination for a large
    /// result set.
    ///
    /// The message reads "Pagination with the page parameter is not supported
    /// for large datasets, please use cursor based pagination (after/before)".
    /// `message` holds the JSON `message` field when the body had one, or the
    /// raw body otherwise, so one substring check covers both.
    pub fn requires_cursor_pagination(&self) -> bool {
        match self {
            Self::Api { status, message } => *status == 422 && message.contains("cursor"),
            _ => false,
        }
    }

    /// Whether a retry of the same request could succeed.
    pub fn is_transient_transport(&self) -> bool {
        matches!(self, Self::Transport(HttpError::Transport(_)))
    }
}

/// Get a short error message suitable for logs.
pub fn short_error_message(err: &GitHubError) -> String {
    match err {
        GitHubError::Transport(_) => "Network error".to_string(),
        GitHubError::Json(_) => "JSON parse error".to_string(),
        GitHubError::Api { status, message } => {
            if message.chars().count() > 50 {
                let truncated: String = message.chars().take(47).collect();
                format!("HTTP {}: {}...", status, truncated)
            } else {
                format!("HTTP {}: {}", status, message)
            }
        }
        GitHubError::RateLimited { .. } => "Rate limited".to_string(),
        GitHubError::Credentials(_) => "Invalid credentials".to_string(),
    }
}
