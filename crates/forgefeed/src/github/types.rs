//! GitHub API data types.
//!
//! Only the fields the connector reads are declared, which keeps decoding
//! resilient to API additions. User objects nested inside pull requests and
//! issues are decoded leniently: a malformed user becomes `None` instead of
//! failing the whole item.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::http::HttpHeaders;

/// Decode an optional nested object, dropping it if it does not match `T`.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match serde_json::from_value(v) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            tracing::debug!("Dropping malformed nested object: {}", e);
            None
        }
    }))
}

/// Decode a list of nested objects, dropping entries that do not match `T`.
fn lenient_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let values = Option::<Vec<serde_json::Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(values
        .into_iter()
        .filter_map(|v| match serde_json::from_value(v) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                tracing::debug!("Dropping malformed list entry: {}", e);
                None
            }
        })
        .collect())
}

/// A GitHub account as embedded in other objects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleUser {
    pub login: String,
    /// Display name; only present on full user payloads.
    #[serde(default)]
    pub name: Option<String>,
    /// Public email; only present on full user payloads.
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Label {
    pub name: String,
}

/// Minimal repository reference embedded in pull requests and issues.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RepoRef {
    pub full_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PullRequestBase {
    #[serde(default, deserialize_with = "lenient")]
    pub repo: Option<RepoRef>,
}

/// Typed view of the repository fields the connector reads.
#[derive(Debug, Clone, Deserialize)]
struct RepositoryFields {
    id: i64,
    name: String,
    full_name: String,
    #[serde(default, deserialize_with = "lenient")]
    owner: Option<SimpleUser>,
    #[serde(default)]
    private: bool,
}

/// A repository handle that can be rebuilt from cached data alone.
///
/// The raw payload and response headers are retained so the repository can
/// be written into a checkpoint and restored without another request.
#[derive(Debug, Clone, PartialEq)]
pub struct Repository {
    pub id: i64,
    pub name: String,
    pub full_name: String,
    pub owner: Option<String>,
    pub private: bool,
    pub headers: BTreeMap<String, String>,
    pub raw_data: serde_json::Value,
}

impl Repository {
    /// Build a repository from its raw JSON payload.
    pub fn from_raw(
        raw_data: serde_json::Value,
        headers: BTreeMap<String, String>,
    ) -> Result<Self, serde_json::Error> {
        let fields = RepositoryFields::deserialize(&raw_data)?;
        Ok(Self {
            id: fields.id,
            name: fields.name,
            full_name: fields.full_name,
            owner: fields.owner.map(|o| o.login),
            private: fields.private,
            headers,
            raw_data,
        })
    }

    /// Build a repository from a response payload and its headers.
    pub fn from_response(
        raw_data: serde_json::Value,
        headers: &HttpHeaders,
    ) -> Result<Self, serde_json::Error> {
        Self::from_raw(raw_data, headers_to_map(headers))
    }
}

/// Convert response headers into the map form stored in checkpoints.
///
/// Names are lowercased; the first value wins for repeated headers.
pub fn headers_to_map(headers: &HttpHeaders) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for (k, v) in headers {
        map.entry(k.to_ascii_lowercase()).or_insert_with(|| v.clone());
    }
    map
}

/// GitHub pull request.
///
/// List responses omit `merged`, `commits`, `changed_files` and `merged_by`;
/// [`PullRequest::is_complete`] tells whether the detail payload is needed.
#[derive(Debug, Clone, Deserialize)]
pub struct PullRequest {
    pub id: i64,
    pub number: u64,
    pub html_url: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub state: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub user: Option<SimpleUser>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub assignees: Vec<SimpleUser>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub labels: Vec<Label>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub merged: Option<bool>,
    #[serde(default)]
    pub commits: Option<u64>,
    #[serde(default)]
    pub changed_files: Option<u64>,
    #[serde(default, deserialize_with = "lenient")]
    pub merged_by: Option<SimpleUser>,
    #[serde(default, deserialize_with = "lenient")]
    pub base: Option<PullRequestBase>,
}

impl PullRequest {
    /// Whether the detail-only fields are present.
    pub fn is_complete(&self) -> bool {
        self.merged.is_some() && self.commits.is_some() && self.changed_files.is_some()
    }

    /// Full name of the base repository, if embedded.
    pub fn repo_full_name(&self) -> Option<&str> {
        self.base
            .as_ref()
            .and_then(|b| b.repo.as_ref())
            .map(|r| r.full_name.as_str())
    }
}

/// GitHub issue. The issues endpoint also returns pull requests, marked by
/// a non-null `pull_request` field.
#[derive(Debug, Clone, Deserialize)]
pub struct Issue {
    pub id: i64,
    pub number: u64,
    pub html_url: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub state: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub user: Option<SimpleUser>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub assignees: Vec<SimpleUser>,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub labels: Vec<Label>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient")]
    pub closed_by: Option<SimpleUser>,
    #[serde(default)]
    pub pull_request: Option<serde_json::Value>,
    #[serde(default, deserialize_with = "lenient")]
    pub repository: Option<RepoRef>,
    #[serde(default)]
    pub repository_url: Option<String>,
}

impl Issue {
    /// Whether this issue is a pull request in disguise.
    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }

    /// Full name of the owning repository.
    ///
    /// Falls back to the trailing `owner/name` of `repository_url` because
    /// the repository-scoped issues endpoint does not embed `repository`.
    pub fn repo_full_name(&self) -> Option<String> {
        if let Some(repo) = &self.repository {
            return Some(repo.full_name.clone());
        }
        let url = self.repository_url.as_deref()?;
        let (_, tail) = url.split_once("/repos/")?;
        let mut parts = tail.trim_end_matches('/').splitn(3, '/');
        match (parts.next(), parts.next()) {
            (Some(owner), Some(name)) if !owner.is_empty() && !name.is_empty() => {
                Some(format!("{}/{}", owner, name))
            }
            _ => None,
        }
    }
}

/// Response from `GET /rate_limit`.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitResponse {
    pub resources: RateLimitResources,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitResources {
    pub core: RateLimitResource,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitResource {
    pub limit: u64,
    pub remaining: u64,
    /// Unix epoch seconds.
    pub reset: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_from_response_keeps_raw_payload() {
        let raw = serde_json::json!({
            "id": 7,
            "name": "widgets",
            "full_name": "acme/widgets",
            "owner": { "login": "acme" },
            "private": true,
            "stargazers_count": 3
        });
        let headers = vec![
            ("ETag".to_string(), "W/\"1\"".to_string()),
            ("etag".to_string(), "W/\"2\"".to_string()),
        ];

        let repo = Repository::from_response(raw.clone(), &headers).expect("valid repo");
        assert_eq!(repo.id, 7);
        assert_eq!(repo.full_name, "acme/widgets");
        assert_eq!(repo.owner.as_deref(), Some("acme"));
        assert!(repo.private);
        assert_eq!(repo.raw_data, raw);
        assert_eq!(repo.headers.get("etag").map(String::as_str), Some("W/\"1\""));
    }

    #[test]
    fn test_repository_from_raw_rejects_missing_id() {
        let raw = serde_json::json!({ "name": "x", "full_name": "o/x" });
        assert!(Repository::from_raw(raw, BTreeMap::new()).is_err());
    }

    #[test]
    fn test_pull_request_lenient_users() {
        let pr: PullRequest = serde_json::from_value(serde_json::json!({
            "id": 1,
            "number": 12,
            "html_url": "https://github.com/acme/widgets/pull/12",
            "title": "Add gears",
            "body": null,
            "state": "open",
            "user": { "id": 5 },
            "assignees": [{ "login": "ada" }, { "bogus": true }],
            "labels": [{ "name": "bug" }],
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-02T00:00:00Z",
            "closed_at": null,
            "merged_at": null,
            "base": { "repo": { "full_name": "acme/widgets" } }
        }))
        .expect("pull request should decode");

        assert!(pr.user.is_none());
        assert_eq!(pr.assignees.len(), 1);
        assert_eq!(pr.assignees[0].login, "ada");
        assert_eq!(pr.repo_full_name(), Some("acme/widgets"));
        assert!(!pr.is_complete());
    }

    #[test]
    fn test_issue_repo_full_name_from_repository_url() {
        let issue: Issue = serde_json::from_value(serde_json::json!({
            "id": 2,
            "number": 3,
            "html_url": "https://github.com/acme/widgets/issues/3",
            "title": "Broken",
            "body": "it broke",
            "state": "open",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-02T00:00:00Z",
            "closed_at": null,
            "repository_url": "https://api.github.com/repos/acme/widgets"
        }))
        .expect("issue should decode");

        assert_eq!(issue.repo_full_name().as_deref(), Some("acme/widgets"));
        assert!(!issue.is_pull_request());
    }

    #[test]
    fn test_issue_pull_request_marker() {
        let issue: Issue = serde_json::from_value(serde_json::json!({
            "id": 2,
            "number": 4,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-02T00:00:00Z",
            "closed_at": null,
            "pull_request": { "url": "https://api.github.com/repos/acme/widgets/pulls/4" }
        }))
        .expect("issue should decode");
        assert!(issue.is_pull_request());
    }
}
