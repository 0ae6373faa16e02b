//! GitHub REST client over the [`HttpTransport`] seam.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;

use super::error::{GitHubError, short_error_message};
use super::link::parse_link_header;
use super::types::{Issue, PullRequest, RateLimitResponse, Repository, SimpleUser};
use crate::http::reqwest_transport::ReqwestTransport;
use crate::http::{HttpHeaders, HttpRequest, HttpResponse, HttpTransport, header_get};
use crate::rate_limit::{ApiRateLimiter, RateLimitSource};
use crate::retry::{RetryConfig, with_retry};

/// Public GitHub API root.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Items requested per page on every listing.
pub const PAGE_SIZE: u32 = 100;

/// REST API version pinned on every request.
const API_VERSION: &str = "2022-11-28";

/// One page of a listing, with the `rel="next"` URL if there is one.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<String>,
    pub headers: HttpHeaders,
}

/// GitHub API client.
///
/// Cloning is cheap; clones share the transport and the pacing limiter.
#[derive(Clone)]
pub struct GitHubClient {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    token: String,
    rate_limiter: Option<ApiRateLimiter>,
    retry: RetryConfig,
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("base_url", &self.base_url)
            .field("paced", &self.rate_limiter.is_some())
            .finish_non_exhaustive()
    }
}

impl GitHubClient {
    /// Create a client backed by reqwest with a 30 second timeout.
    ///
    /// `base_url` overrides [`DEFAULT_API_URL`] for GitHub Enterprise
    /// (e.g. `https://github.example.com/api/v3`).
    pub fn new(
        token: &str,
        base_url: Option<&str>,
        rate_limiter: Option<ApiRateLimiter>,
    ) -> Result<Self, GitHubError> {
        if token.trim().is_empty() {
            return Err(GitHubError::Credentials(
                "access token must not be empty".to_string(),
            ));
        }
        let transport = ReqwestTransport::with_timeout(StdDuration::from_secs(30))?;
        Ok(Self::new_with_transport(
            token,
            base_url,
            rate_limiter,
            Arc::new(transport),
        ))
    }

    pub fn new_with_transport(
        token: &str,
        base_url: Option<&str>,
        rate_limiter: Option<ApiRateLimiter>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        let base_url = base_url
            .unwrap_or(DEFAULT_API_URL)
            .trim_end_matches('/')
            .to_string();
        Self {
            transport,
            base_url,
            token: token.to_string(),
            rate_limiter,
            retry: RetryConfig::default(),
        }
    }

    /// Override the transport retry policy.
    #[must_use]
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for an API path starting with `/`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Repository-scoped URL, with both path segments percent-encoded.
    pub fn repo_url(&self, full_name: &str, suffix: &str) -> String {
        let path = match full_name.split_once('/') {
            Some((owner, name)) => format!(
                "/repos/{}/{}{}",
                urlencoding::encode(owner),
                urlencoding::encode(name),
                suffix
            ),
            None => format!("/repos/{}{}", urlencoding::encode(full_name), suffix),
        };
        self.url(&path)
    }

    fn build_request(&self, url: &str) -> HttpRequest {
        HttpRequest {
            url: url.to_string(),
            headers: vec![
                (
                    "Accept".to_string(),
                    "application/vnd.github+json".to_string(),
                ),
                ("User-Agent".to_string(), "forgefeed".to_string()),
                (
                    "Authorization".to_string(),
                    format!("Bearer {}", self.token),
                ),
                ("X-GitHub-Api-Version".to_string(), API_VERSION.to_string()),
            ],
        }
    }

    /// Make an authenticated GET request to an absolute URL.
    ///
    /// Transport failures are retried with backoff. A non-success status is
    /// classified into [`GitHubError::RateLimited`] or [`GitHubError::Api`].
    pub async fn get(&self, url: &str) -> Result<HttpResponse, GitHubError> {
        if let Some(ref limiter) = self.rate_limiter {
            limiter.wait().await;
        }

        let response = with_retry(
            move || async move {
                self.transport
                    .send(self.build_request(url))
                    .await
                    .map_err(GitHubError::from)
            },
            self.retry.clone().into_backoff(),
            GitHubError::is_transient_transport,
            short_error_message,
            url,
        )
        .await?;

        if response.is_success() {
            tracing::debug!("GET {} -> {}", url, response.status);
            Ok(response)
        } else {
            Err(error_from_response(&response))
        }
    }

    /// GET and decode a JSON body, returning it with the response headers.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<(T, HttpHeaders), GitHubError> {
        let response = self.get(url).await?;
        let data = serde_json::from_slice(&response.body)?;
        Ok((data, response.headers))
    }

    /// GET one page of a listing.
    pub async fn get_page<T: DeserializeOwned>(&self, url: &str) -> Result<Page<T>, GitHubError> {
        let (items, headers): (Vec<T>, _) = self.get_json(url).await?;
        let next = header_get(&headers, "link").and_then(|h| parse_link_header(h).next);
        Ok(Page {
            items,
            next,
            headers,
        })
    }

    /// Get a repository by owner and name.
    pub async fn get_repo(&self, owner: &str, name: &str) -> Result<Repository, GitHubError> {
        let url = self.repo_url(&format!("{}/{}", owner, name), "");
        self.fetch_repository(&url).await
    }

    /// Get a repository by its numeric id.
    pub async fn get_repo_by_id(&self, id: i64) -> Result<Repository, GitHubError> {
        let url = self.url(&format!("/repositories/{}", id));
        self.fetch_repository(&url).await
    }

    async fn fetch_repository(&self, url: &str) -> Result<Repository, GitHubError> {
        let (raw, headers): (serde_json::Value, _) = self.get_json(url).await?;
        Ok(Repository::from_response(raw, &headers)?)
    }

    /// First page URL of an organisation's repositories.
    pub fn org_repos_url(&self, org: &str) -> String {
        self.url(&format!(
            "/orgs/{}/repos?per_page={}",
            urlencoding::encode(org),
            PAGE_SIZE
        ))
    }

    /// First page URL of a user's repositories.
    pub fn user_repos_url(&self, user: &str) -> String {
        self.url(&format!(
            "/users/{}/repos?per_page={}",
            urlencoding::encode(user),
            PAGE_SIZE
        ))
    }

    /// List every repository of an organisation.
    pub async fn list_org_repos(&self, org: &str) -> Result<Vec<Repository>, GitHubError> {
        self.list_all_repos(self.org_repos_url(org)).await
    }

    /// List every repository owned by a user.
    pub async fn list_user_repos(&self, user: &str) -> Result<Vec<Repository>, GitHubError> {
        self.list_all_repos(self.user_repos_url(user)).await
    }

    /// Whether the first page of a repository listing has any entries.
    pub async fn has_any_repos(&self, first_url: &str) -> Result<bool, GitHubError> {
        let page: Page<serde_json::Value> = self.get_page(first_url).await?;
        Ok(!page.items.is_empty())
    }

    async fn list_all_repos(&self, first_url: String) -> Result<Vec<Repository>, GitHubError> {
        let mut repos = Vec::new();
        let mut next = Some(first_url);

        while let Some(url) = next {
            let page: Page<serde_json::Value> = self.get_page(&url).await?;
            for raw in page.items {
                repos.push(Repository::from_response(raw, &page.headers)?);
            }
            next = page.next;
        }

        Ok(repos)
    }

    /// Get the full payload of a pull request.
    pub async fn get_pull(&self, full_name: &str, number: u64) -> Result<PullRequest, GitHubError> {
        let url = self.repo_url(full_name, &format!("/pulls/{}", number));
        let (pr, _) = self.get_json(&url).await?;
        Ok(pr)
    }

    /// Get the full payload of an issue, including `closed_by`.
    pub async fn get_issue(&self, full_name: &str, number: u64) -> Result<Issue, GitHubError> {
        let url = self.repo_url(full_name, &format!("/issues/{}", number));
        let (issue, _) = self.get_json(&url).await?;
        Ok(issue)
    }

    /// Get a user's public profile.
    pub async fn get_user(&self, login: &str) -> Result<SimpleUser, GitHubError> {
        let url = self.url(&format!("/users/{}", urlencoding::encode(login)));
        let (user, _) = self.get_json(&url).await?;
        Ok(user)
    }

    /// Read the root directory listing of a repository.
    pub async fn get_root_contents(&self, full_name: &str) -> Result<(), GitHubError> {
        let url = self.repo_url(full_name, "/contents/");
        self.get(&url).await.map(|_| ())
    }

    /// When the core rate-limit window resets.
    pub async fn get_rate_limit_reset(&self) -> Result<DateTime<Utc>, GitHubError> {
        let (limits, _): (RateLimitResponse, _) = self.get_json(&self.url("/rate_limit")).await?;
        let core = limits.resources.core;
        tracing::debug!(
            "Rate limit: {}/{} remaining, resets at {}",
            core.remaining,
            core.limit,
            core.reset
        );
        Ok(DateTime::from_timestamp(core.reset, 0).unwrap_or_else(Utc::now))
    }
}

#[async_trait]
impl RateLimitSource for GitHubClient {
    async fn rate_limit_reset(&self) -> Result<DateTime<Utc>, GitHubError> {
        self.get_rate_limit_reset().await
    }
}

/// Classify a non-success response.
///
/// GitHub signals primary rate limits with 403 and `x-ratelimit-remaining: 0`
/// (or 429), and secondary limits with a 403 whose message mentions the
/// rate limit.
pub fn error_from_response(response: &HttpResponse) -> GitHubError {
    let raw = String::from_utf8_lossy(&response.body).to_string();
    let message = serde_json::from_slice::<serde_json::Value>(&response.body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
        .unwrap_or(raw);

    let exhausted = response.header("x-ratelimit-remaining") == Some("0");
    let secondary = message.to_ascii_lowercase().contains("rate limit");

    if response.status == 429 || (response.status == 403 && (exhausted || secondary)) {
        let reset_at = reset_from_headers(&response.headers).unwrap_or_else(Utc::now);
        return GitHubError::RateLimited { reset_at };
    }

    GitHubError::Api {
        status: response.status,
        message,
    }
}

/// Reset instant from `x-ratelimit-reset` (epoch seconds) or `retry-after`.
fn reset_from_headers(headers: &HttpHeaders) -> Option<DateTime<Utc>> {
    if let Some(epoch) = header_get(headers, "x-ratelimit-reset").and_then(|v| v.parse::<i64>().ok())
    {
        return DateTime::from_timestamp(epoch, 0);
    }
    header_get(headers, "retry-after")
        .and_then(|v| v.parse::<i64>().ok())
        .map(|secs| Utc::now() + Duration::seconds(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::MockTransport;

    fn json_response(status: u16, body: serde_json::Value) -> HttpResponse {
        HttpResponse {
            status,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: serde_json::to_vec(&body).expect("json body"),
        }
    }

    fn client(transport: &MockTransport) -> GitHubClient {
        GitHubClient::new_with_transport(
            "token",
            Some("https://api.test"),
            None,
            Arc::new(transport.clone()),
        )
        .with_retry_config(RetryConfig::new(
            StdDuration::from_millis(1),
            StdDuration::from_millis(1),
            2,
        ))
    }

    fn repo_json(id: i64, name: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "name": name,
            "full_name": format!("acme/{}", name),
            "owner": { "login": "acme" },
            "private": false
        })
    }

    #[test]
    fn test_new_rejects_empty_token() {
        let err = GitHubClient::new("  ", None, None).expect_err("empty token");
        assert!(matches!(err, GitHubError::Credentials(_)));
    }

    #[tokio::test]
    async fn test_get_sends_github_headers() {
        let transport = MockTransport::new();
        transport.set_response(
            "https://api.test/repos/acme/widgets",
            json_response(200, repo_json(1, "widgets")),
        );

        let repo = client(&transport)
            .get_repo("acme", "widgets")
            .await
            .expect("repo");
        assert_eq!(repo.full_name, "acme/widgets");

        let request = &transport.requests()[0];
        assert_eq!(
            header_get(&request.headers, "authorization"),
            Some("Bearer token")
        );
        assert_eq!(
            header_get(&request.headers, "accept"),
            Some("application/vnd.github+json")
        );
        assert_eq!(
            header_get(&request.headers, "x-github-api-version"),
            Some(API_VERSION)
        );
    }

    #[tokio::test]
    async fn test_list_org_repos_follows_link_header() {
        let transport = MockTransport::new();
        let first = "https://api.test/orgs/acme/repos?per_page=100";
        let second = "https://api.test/orgs/acme/repos?per_page=100&page=2";

        let mut page_one = json_response(200, serde_json::json!([repo_json(1, "a")]));
        page_one
            .headers
            .push(("link".to_string(), format!("<{}>; rel=\"next\"", second)));
        transport.set_response(first, page_one);
        transport.set_response(second, json_response(200, serde_json::json!([repo_json(2, "b")])));

        let repos = client(&transport)
            .list_org_repos("acme")
            .await
            .expect("repos");
        let ids: Vec<i64> = repos.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_get_classifies_rate_limit_responses() {
        let transport = MockTransport::new();
        let url = "https://api.test/repositories/9";
        let mut resp = json_response(403, serde_json::json!({ "message": "API rate limit exceeded" }));
        resp.headers
            .push(("x-ratelimit-remaining".to_string(), "0".to_string()));
        resp.headers
            .push(("x-ratelimit-reset".to_string(), "1700000000".to_string()));
        transport.set_response(url, resp);

        let err = client(&transport)
            .get_repo_by_id(9)
            .await
            .expect_err("rate limited");
        match err {
            GitHubError::RateLimited { reset_at } => {
                assert_eq!(reset_at.timestamp(), 1_700_000_000);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_error_from_response_secondary_limit_and_429() {
        let secondary = json_response(
            403,
            serde_json::json!({ "message": "You have exceeded a secondary rate limit" }),
        );
        assert!(error_from_response(&secondary).is_rate_limited());

        let mut too_many = json_response(429, serde_json::json!({}));
        too_many
            .headers
            .push(("retry-after".to_string(), "30".to_string()));
        assert!(error_from_response(&too_many).is_rate_limited());

        let forbidden = json_response(403, serde_json::json!({ "message": "Resource not accessible" }));
        assert_eq!(error_from_response(&forbidden).status(), Some(403));
    }

    #[test]
    fn test_error_from_response_keeps_cursor_message() {
        let resp = json_response(
            422,
            serde_json::json!({
                "message": "Pagination with the page parameter is not supported for large datasets, please use cursor based pagination (after/before)"
            }),
        );
        assert!(error_from_response(&resp).requires_cursor_pagination());

        let plain = HttpResponse {
            status: 422,
            headers: Vec::new(),
            body: b"use cursor based pagination".to_vec(),
        };
        assert!(error_from_response(&plain).requires_cursor_pagination());
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_retries_transport_errors() {
        let transport = MockTransport::new();
        let url = "https://api.test/repositories/3";
        transport.push_transport_error(url, "connection reset");
        transport.set_response(url, json_response(200, repo_json(3, "c")));

        let repo = client(&transport).get_repo_by_id(3).await.expect("repo");
        assert_eq!(repo.id, 3);
        assert_eq!(transport.count(url), 2);
    }

    #[tokio::test]
    async fn test_rate_limit_reset_reads_core_resource() {
        let transport = MockTransport::new();
        transport.set_response(
            "https://api.test/rate_limit",
            json_response(
                200,
                serde_json::json!({
                    "resources": { "core": { "limit": 5000, "remaining": 0, "reset": 1700000037 } },
                    "rate": { "limit": 5000, "remaining": 0, "reset": 1700000037 }
                }),
            ),
        );

        let reset = client(&transport)
            .rate_limit_reset()
            .await
            .expect("reset time");
        assert_eq!(reset.timestamp(), 1_700_000_037);
    }

    #[test]
    fn test_repo_url_encodes_segments() {
        let transport = MockTransport::new();
        let c = client(&transport);
        assert_eq!(
            c.repo_url("acme/my repo", "/pulls/4"),
            "https://api.test/repos/acme/my%20repo/pulls/4"
        );
    }

    #[tokio::test]
    async fn test_get_user_reads_profile_fields() {
        let transport = MockTransport::new();
        transport.set_response(
            "https://api.test/users/octo%20cat",
            json_response(
                200,
                serde_json::json!({ "login": "octo cat", "name": "Octo", "email": null }),
            ),
        );

        let user = client(&transport).get_user("octo cat").await.expect("user");
        assert_eq!(user.login, "octo cat");
        assert_eq!(user.name.as_deref(), Some("Octo"));
        assert!(user.email.is_none());
    }
}
