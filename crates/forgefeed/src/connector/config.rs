//! Connector configuration and credentials.

use std::str::FromStr;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// GitHub state filter for pull requests and issues.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateFilter {
    Open,
    Closed,
    #[default]
    All,
}

impl StateFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateFilter::Open => "open",
            StateFilter::Closed => "closed",
            StateFilter::All => "all",
        }
    }
}

impl std::fmt::Display for StateFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid state filter '{0}' (expected open, closed or all)")]
pub struct ParseStateFilterError(String);

impl FromStr for StateFilter {
    type Err = ParseStateFilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(StateFilter::Open),
            "closed" => Ok(StateFilter::Closed),
            "all" => Ok(StateFilter::All),
            _ => Err(ParseStateFilterError(s.to_string())),
        }
    }
}

/// What to sync and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorConfig {
    /// User or organisation owning the repositories.
    pub repo_owner: String,
    /// One repository name, a comma-separated list, or `None` for all.
    pub repositories: Option<String>,
    pub state_filter: StateFilter,
    pub include_prs: bool,
    pub include_issues: bool,
    /// API root override for GitHub Enterprise.
    pub base_url: Option<String>,
    /// How far to move the window start back to catch late updates.
    pub start_lookback: Duration,
    /// Fetch the detail payload of listed pull requests and closed issues.
    pub hydrate_items: bool,
    /// Look up the name and email of every user an item mentions.
    pub lookup_users: bool,
    /// Pace requests to this rate when set.
    pub requests_per_second: Option<u32>,
}

impl ConnectorConfig {
    pub fn new(repo_owner: impl Into<String>) -> Self {
        Self {
            repo_owner: repo_owner.into(),
            repositories: None,
            state_filter: StateFilter::All,
            include_prs: true,
            include_issues: false,
            base_url: None,
            start_lookback: Duration::zero(),
            hydrate_items: true,
            lookup_users: true,
            requests_per_second: None,
        }
    }

    #[must_use]
    pub fn with_repositories(mut self, repositories: impl Into<String>) -> Self {
        self.repositories = Some(repositories.into());
        self
    }

    #[must_use]
    pub fn with_state_filter(mut self, state_filter: StateFilter) -> Self {
        self.state_filter = state_filter;
        self
    }

    #[must_use]
    pub fn with_prs(mut self, include: bool) -> Self {
        self.include_prs = include;
        self
    }

    #[must_use]
    pub fn with_issues(mut self, include: bool) -> Self {
        self.include_issues = include;
        self
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    #[must_use]
    pub fn with_start_lookback(mut self, lookback: Duration) -> Self {
        self.start_lookback = lookback;
        self
    }

    #[must_use]
    pub fn with_hydration(mut self, hydrate: bool) -> Self {
        self.hydrate_items = hydrate;
        self
    }

    #[must_use]
    pub fn with_user_lookup(mut self, lookup: bool) -> Self {
        self.lookup_users = lookup;
        self
    }

    #[must_use]
    pub fn with_requests_per_second(mut self, rps: u32) -> Self {
        self.requests_per_second = Some(rps);
        self
    }
}

/// Credentials for the GitHub API.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    #[serde(alias = "github_access_token")]
    pub access_token: String,
}

impl Credentials {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"<redacted>")
            .finish()
    }
}
