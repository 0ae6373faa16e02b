//! Typed listing handles for pull requests and issues.
//!
//! [`PaginatedList`] exposes its next-page link through [`PagedListing`]
//! so the paginator can save and restore cursor positions. Entries are
//! decoded one at a time: an entry that does not match the item type is
//! handed on as a [`MalformedItem`] instead of failing its page.

use std::marker::PhantomData;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::client::{GitHubClient, PAGE_SIZE};
use super::error::{GitHubError, short_error_message};
use super::types::{Issue, PullRequest};
use crate::paginator::PagedListing;

/// An item type that can be listed from a repository.
#[async_trait]
pub trait Listable: DeserializeOwned + Clone + Send + Sync + 'static {
    /// Path segment of the listing endpoint under `/repos/{owner}/{name}`.
    const ENDPOINT: &'static str;

    /// Fill in fields the listing endpoint leaves out.
    async fn realize(
        self,
        client: &GitHubClient,
        repo_full_name: &str,
        hydrate: bool,
    ) -> Result<Self, GitHubError>;
}

#[async_trait]
impl Listable for PullRequest {
    const ENDPOINT: &'static str = "/pulls";

    async fn realize(
        self,
        client: &GitHubClient,
        repo_full_name: &str,
        hydrate: bool,
    ) -> Result<Self, GitHubError> {
        if !hydrate || self.is_complete() {
            return Ok(self);
        }
        let full_name = self.repo_full_name().unwrap_or(repo_full_name).to_string();
        client.get_pull(&full_name, self.number).await
    }
}

#[async_trait]
impl Listable for Issue {
    const ENDPOINT: &'static str = "/issues";

    /// Closed issues are re-read for `closed_by`, which only the detail
    /// payload carries. A failed read keeps the listed issue; rate limits
    /// are returned so the caller can wait and retry.
    async fn realize(
        self,
        client: &GitHubClient,
        repo_full_name: &str,
        hydrate: bool,
    ) -> Result<Self, GitHubError> {
        if !hydrate
            || self.closed_at.is_none()
            || self.closed_by.is_some()
            || self.is_pull_request()
        {
            return Ok(self);
        }
        let full_name = self
            .repo_full_name()
            .unwrap_or_else(|| repo_full_name.to_string());
        match client.get_issue(&full_name, self.number).await {
            Ok(detail) => Ok(detail),
            Err(e) if e.is_rate_limited() => Err(e),
            Err(e) => {
                tracing::debug!(
                    "Keeping listed issue #{} without closed_by: {}",
                    self.number,
                    short_error_message(&e)
                );
                Ok(self)
            }
        }
    }
}

/// A listed entry that did not decode as the expected item type.
#[derive(Debug, Clone, PartialEq)]
pub struct MalformedItem {
    pub raw: Value,
    pub message: String,
}

impl MalformedItem {
    /// The entry's `id`, else its `number`, else `"unknown"`.
    pub fn id(&self) -> String {
        ["id", "number"]
            .iter()
            .find_map(|key| match self.raw.get(*key) {
                Some(Value::Number(n)) => Some(n.to_string()),
                Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
                _ => None,
            })
            .unwrap_or_else(|| "unknown".to_string())
    }

    pub fn html_url(&self) -> Option<String> {
        self.raw
            .get("html_url")
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.raw
            .get("updated_at")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
    }

    /// Whether the issues endpoint listed this entry for a pull request.
    pub fn is_pull_request(&self) -> bool {
        self.raw.get("pull_request").is_some_and(|v| !v.is_null())
    }
}

/// One listed entry, decoded or not.
pub type Listed<T> = Result<T, MalformedItem>;

/// Decode each raw entry of a page on its own.
fn decode_entries<T: DeserializeOwned>(raw: Vec<Value>) -> Vec<Listed<T>> {
    raw.into_iter()
        .map(|entry| match <T as serde::Deserialize>::deserialize(&entry) {
            Ok(item) => Ok(item),
            Err(e) => {
                tracing::warn!("Could not decode listed entry: {}", e);
                Err(MalformedItem {
                    raw: entry,
                    message: e.to_string(),
                })
            }
        })
        .collect()
}

/// A listing of one repository's pull requests or issues, newest update
/// first.
pub struct PaginatedList<T> {
    client: GitHubClient,
    repo_full_name: String,
    first_url: String,
    next_url: Option<String>,
    hydrate: bool,
    _item: PhantomData<fn() -> T>,
}

impl<T: Listable> PaginatedList<T> {
    /// `state` is the GitHub state filter (`open`, `closed` or `all`).
    pub fn new(client: GitHubClient, repo_full_name: &str, state: &str, hydrate: bool) -> Self {
        let query = format!(
            "?state={}&sort=updated&direction=desc&per_page={}",
            state, PAGE_SIZE
        );
        let first_url = client.repo_url(repo_full_name, &format!("{}{}", T::ENDPOINT, query));
        Self {
            client,
            repo_full_name: repo_full_name.to_string(),
            next_url: Some(first_url.clone()),
            first_url,
            hydrate,
            _item: PhantomData,
        }
    }

    /// URL of the given zero-based page.
    pub fn page_url(&self, page: u32) -> String {
        format!("{}&page={}", self.first_url, page.saturating_add(1))
    }
}

#[async_trait]
impl<T: Listable> PagedListing for PaginatedList<T> {
    type Item = Listed<T>;

    async fn get_page(&self, page: u32) -> Result<Vec<Listed<T>>, GitHubError> {
        let page = self.client.get_page::<Value>(&self.page_url(page)).await?;
        Ok(decode_entries(page.items))
    }

    async fn next_page(&mut self) -> Result<Option<Vec<Listed<T>>>, GitHubError> {
        let Some(url) = self.next_url.as_deref() else {
            return Ok(None);
        };
        let page = self.client.get_page::<Value>(url).await?;
        self.next_url = page.next;
        Ok(Some(decode_entries(page.items)))
    }

    fn next_page_token(&self) -> Option<String> {
        self.next_url.clone()
    }

    fn set_next_page_token(&mut self, token: String) {
        self.next_url = Some(token);
    }

    async fn realize(&self, item: Listed<T>) -> Result<Listed<T>, GitHubError> {
        match item {
            Ok(item) => item
                .realize(&self.client, &self.repo_full_name, self.hydrate)
                .await
                .map(Ok),
            Err(malformed) => Ok(Err(malformed)),
        }
    }
}
