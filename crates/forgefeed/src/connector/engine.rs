//! The GitHub connector step function.
//!
//! Each call to [`GitHubConnector::step`] does at most one page of work per
//! stage and hands back a new [`Checkpoint`]:
//!
//! ```text
//! Start ──resolve repos──▶ PullRequests ──exhausted──▶ Issues ──exhausted──▶ rotate
//!                               ▲                                           │
//!                               └─────────────── next repository ◀──────────┘
//! ```
//!
//! Listings are requested newest update first, so the first item updated at
//! or before the window start ends a stage.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use super::checkpoint::{Checkpoint, CheckpointOutput, SerializedRepository, Stage};
use super::config::{ConnectorConfig, Credentials};
use super::error::{ConnectorError, ValidationError};
use super::traits::{CheckpointedConnector, PermissionSyncConnector, SecondsSinceUnixEpoch};
use super::validate;
use crate::convert::{ConversionError, issue_to_document, pull_request_to_document};
use crate::document::{ConnectorFailure, Document, DocumentOrFailure, ExternalAccess};
use crate::github::{
    GitHubClient, Issue, Listable, Listed, MalformedItem, PaginatedList, PullRequest, Repository,
    SimpleUser,
};
use crate::paginator::{BatchRequest, PaginationMode, fetch_batch};
use crate::permissions::{NoSpecialPermissions, PermissionResolver};
use crate::rate_limit::{ApiRateLimiter, retry_rate_limited};
use crate::repos::resolve_repositories;
use crate::users::UserDirectory;

/// The UTC window a step filters items by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Build the window from epoch seconds.
    ///
    /// The start moves back by `lookback` and never precedes the Unix epoch.
    /// The end is padded by one day.
    pub fn new(
        start: SecondsSinceUnixEpoch,
        end: SecondsSinceUnixEpoch,
        lookback: Duration,
    ) -> Self {
        let start = from_epoch(start)
            .checked_sub_signed(lookback)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
            .max(DateTime::<Utc>::UNIX_EPOCH);
        let end = from_epoch(end)
            .checked_add_signed(Duration::days(1))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self { start, end }
    }
}

fn from_epoch(seconds: SecondsSinceUnixEpoch) -> DateTime<Utc> {
    DateTime::from_timestamp(seconds, 0).unwrap_or(if seconds < 0 {
        DateTime::<Utc>::UNIX_EPOCH
    } else {
        DateTime::<Utc>::MAX_UTC
    })
}

/// What the stage machine needs from a listed item.
trait StageItem: Listable {
    const KIND: &'static str;

    fn item_id(&self) -> i64;
    fn item_link(&self) -> Option<String>;
    fn updated_at(&self) -> Option<DateTime<Utc>>;

    /// Items listed by the endpoint that belong to another stage.
    fn is_excluded(&self) -> bool {
        false
    }

    /// Like [`StageItem::is_excluded`], for an entry that did not decode.
    fn excludes_malformed(_item: &MalformedItem) -> bool {
        false
    }

    /// Every user the item mentions.
    fn users_mut(&mut self) -> Vec<&mut SimpleUser>;

    fn to_document(&self, access: Option<&ExternalAccess>) -> Result<Document, ConversionError>;
}

impl StageItem for PullRequest {
    const KIND: &'static str = "PR";

    fn item_id(&self) -> i64 {
        self.id
    }

    fn item_link(&self) -> Option<String> {
        self.html_url.clone()
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    fn users_mut(&mut self) -> Vec<&mut SimpleUser> {
        self.user
            .iter_mut()
            .chain(self.assignees.iter_mut())
            .chain(self.merged_by.iter_mut())
            .collect()
    }

    fn to_document(&self, access: Option<&ExternalAccess>) -> Result<Document, ConversionError> {
        pull_request_to_document(self, access)
    }
}

impl StageItem for Issue {
    const KIND: &'static str = "issue";

    fn item_id(&self) -> i64 {
        self.id
    }

    fn item_link(&self) -> Option<String> {
        self.html_url.clone()
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    fn is_excluded(&self) -> bool {
        self.is_pull_request()
    }

    fn excludes_malformed(item: &MalformedItem) -> bool {
        item.is_pull_request()
    }

    fn users_mut(&mut self) -> Vec<&mut SimpleUser> {
        self.user
            .iter_mut()
            .chain(self.assignees.iter_mut())
            .chain(self.closed_by.iter_mut())
            .collect()
    }

    fn to_document(&self, access: Option<&ExternalAccess>) -> Result<Document, ConversionError> {
        issue_to_document(self, access)
    }
}

fn listed_updated_at<T: StageItem>(item: &Listed<T>) -> Option<DateTime<Utc>> {
    match item {
        Ok(item) => item.updated_at(),
        Err(malformed) => malformed.updated_at(),
    }
}

fn malformed_failure<T: StageItem>(item: &MalformedItem) -> DocumentOrFailure {
    let message = format!("Error decoding {}: {}", T::KIND, item.message);
    tracing::error!("{}", message);
    DocumentOrFailure::Failure(ConnectorFailure::for_item(
        item.id(),
        item.html_url(),
        message,
        Some(item.message.clone()),
    ))
}

/// Result of one batch of a stage.
#[derive(Default)]
struct StageOutcome {
    items: Vec<DocumentOrFailure>,
    /// Items looked at, including skipped ones.
    seen: usize,
    /// An item at or before the window start was reached.
    done: bool,
    used_cursor: bool,
}

impl StageOutcome {
    /// Whether the stage should resume from the next page on the next call.
    fn has_more_pages(&self) -> bool {
        self.seen > 0 && !self.done && !self.used_cursor
    }
}

/// Incremental connector for GitHub pull requests and issues.
pub struct GitHubConnector {
    config: ConnectorConfig,
    client: Option<GitHubClient>,
    permission_resolver: Arc<dyn PermissionResolver>,
}

impl std::fmt::Debug for GitHubConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubConnector")
            .field("config", &self.config)
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}

impl GitHubConnector {
    pub fn new(config: ConnectorConfig) -> Self {
        Self {
            config,
            client: None,
            permission_resolver: Arc::new(NoSpecialPermissions),
        }
    }

    #[must_use]
    pub fn with_permission_resolver(mut self, resolver: Arc<dyn PermissionResolver>) -> Self {
        self.permission_resolver = resolver;
        self
    }

    /// Use an already built client instead of loading credentials.
    #[must_use]
    pub fn with_client(mut self, client: GitHubClient) -> Self {
        self.client = Some(client);
        self
    }

    /// Build the API client from credentials.
    pub fn load_credentials(&mut self, credentials: &Credentials) -> Result<(), ConnectorError> {
        let limiter = self.config.requests_per_second.map(ApiRateLimiter::new);
        let client = GitHubClient::new(
            &credentials.access_token,
            self.config.base_url.as_deref(),
            limiter,
        )?;
        self.client = Some(client);
        Ok(())
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    pub fn client(&self) -> Option<&GitHubClient> {
        self.client.as_ref()
    }

    /// Run one step of the sync.
    pub async fn step(
        &self,
        start: SecondsSinceUnixEpoch,
        end: SecondsSinceUnixEpoch,
        mut checkpoint: Checkpoint,
        include_permissions: bool,
    ) -> Result<CheckpointOutput, ConnectorError> {
        let client = self.client.as_ref().ok_or(ConnectorError::MissingCredential)?;
        let window = TimeWindow::new(start, end, self.config.start_lookback);
        let mut users = UserDirectory::new(client);
        let mut items = Vec::new();

        if checkpoint.cached_repository_ids.is_none() {
            self.resolve_repository_set(client, &mut checkpoint).await?;
            return Ok(CheckpointOutput { items, checkpoint });
        }

        let repo = checkpoint
            .cached_repository
            .as_ref()
            .ok_or(ConnectorError::MissingCachedRepository)?
            .to_repository()?;

        let access = if include_permissions {
            Some(
                self.permission_resolver
                    .resolve_permissions(&repo, client)
                    .await,
            )
        } else {
            None
        };

        if self.config.include_prs && checkpoint.stage == Stage::PullRequests {
            tracing::info!("Fetching PRs for repo: {}", repo.full_name);
            let mut outcome = self
                .run_stage::<PullRequest>(
                    client,
                    &repo,
                    &mut checkpoint,
                    &window,
                    access.as_ref(),
                    &mut users,
                )
                .await?;
            items.append(&mut outcome.items);

            if outcome.has_more_pages() {
                return Ok(CheckpointOutput { items, checkpoint });
            }

            checkpoint.stage = Stage::Issues;
            checkpoint.reset_pagination();

            // a cursor walk covers the whole listing, so save before moving on
            if outcome.used_cursor {
                return Ok(CheckpointOutput { items, checkpoint });
            }
        }

        checkpoint.stage = Stage::Issues;

        if self.config.include_issues {
            tracing::info!("Fetching issues for repo: {}", repo.full_name);
            let mut outcome = self
                .run_stage::<Issue>(
                    client,
                    &repo,
                    &mut checkpoint,
                    &window,
                    access.as_ref(),
                    &mut users,
                )
                .await?;
            items.append(&mut outcome.items);

            if outcome.has_more_pages() {
                return Ok(CheckpointOutput { items, checkpoint });
            }

            checkpoint.stage = Stage::PullRequests;
            checkpoint.reset_pagination();
        }

        self.rotate_repository(client, &mut checkpoint).await?;
        Ok(CheckpointOutput { items, checkpoint })
    }

    /// Resolve the repositories once and make the first one current.
    async fn resolve_repository_set(
        &self,
        client: &GitHubClient,
        checkpoint: &mut Checkpoint,
    ) -> Result<(), ConnectorError> {
        let mut repos = resolve_repositories(
            client,
            &self.config.repo_owner,
            self.config.repositories.as_deref(),
        )
        .await?;

        if repos.is_empty() {
            tracing::warn!("No repositories found for {}", self.config.repo_owner);
            checkpoint.has_more = false;
            return Ok(());
        }

        let current = repos.remove(0);
        tracing::info!(
            "Resolved {} repositories for {}, starting with {}",
            repos.len() + 1,
            self.config.repo_owner,
            current.full_name
        );

        checkpoint.cached_repository_ids = Some(repos.iter().map(|r| r.id).collect());
        checkpoint.cached_repository = Some(SerializedRepository::from(&current));
        checkpoint.stage = Stage::PullRequests;
        checkpoint.current_page = 0;
        Ok(())
    }

    /// Move to the next cached repository, fetching it fresh.
    async fn rotate_repository(
        &self,
        client: &GitHubClient,
        checkpoint: &mut Checkpoint,
    ) -> Result<(), ConnectorError> {
        let remaining = checkpoint.cached_repository_ids.get_or_insert_with(Vec::new);
        let next_id = remaining.pop();
        checkpoint.has_more = next_id.is_some();

        if let Some(id) = next_id {
            let next = retry_rate_limited(client, "repository fetch", move || {
                client.get_repo_by_id(id)
            })
            .await?;
            tracing::info!("Moving on to repository {}", next.full_name);
            checkpoint.cached_repository = Some(SerializedRepository::from(&next));
            checkpoint.stage = Stage::PullRequests;
            checkpoint.reset_pagination();
        }

        match checkpoint.cached_repository_ids.as_deref() {
            Some(ids) if !ids.is_empty() => {
                tracing::info!("{} repos remaining (IDs: {:?})", ids.len(), ids)
            }
            _ => tracing::info!("No more repos remaining"),
        }
        Ok(())
    }

    /// Fetch one batch of a stage and convert what falls in the window.
    async fn run_stage<T: StageItem>(
        &self,
        client: &GitHubClient,
        repo: &Repository,
        checkpoint: &mut Checkpoint,
        window: &TimeWindow,
        access: Option<&ExternalAccess>,
        users: &mut UserDirectory<'_>,
    ) -> Result<StageOutcome, ConnectorError> {
        let request = BatchRequest {
            page: checkpoint.current_page,
            cursor_url: checkpoint.cursor_url.clone(),
            prev_count: checkpoint.num_retrieved,
        };
        let state = self.config.state_filter.as_str();
        let hydrate = self.config.hydrate_items;
        let start = window.start;

        let mut cursor_url = checkpoint.cursor_url.clone();
        let mut num_retrieved = checkpoint.num_retrieved;

        let batch = fetch_batch(
            || PaginatedList::<T>::new(client.clone(), &repo.full_name, state, hydrate),
            &request,
            |next, count| {
                cursor_url = next.map(str::to_string);
                num_retrieved = count;
            },
            |item: &Listed<T>| listed_updated_at(item).is_some_and(|updated| updated <= start),
            client,
        )
        .await?;

        checkpoint.current_page = checkpoint.current_page.saturating_add(1);
        checkpoint.cursor_url = cursor_url;
        checkpoint.num_retrieved = num_retrieved;

        let mut outcome = StageOutcome {
            used_cursor: batch.mode == PaginationMode::Cursor || checkpoint.cursor_url.is_some(),
            ..Default::default()
        };

        for listed in batch.items {
            outcome.seen += 1;
            let updated = listed_updated_at(&listed);

            if updated.is_some_and(|u| u <= window.start) {
                outcome.done = true;
                break;
            }
            if updated.is_some_and(|u| u > window.end) {
                continue;
            }
            let mut item = match listed {
                Ok(item) => item,
                Err(malformed) => {
                    if !T::excludes_malformed(&malformed) {
                        outcome.items.push(malformed_failure::<T>(&malformed));
                    }
                    continue;
                }
            };
            if item.is_excluded() {
                continue;
            }
            if self.config.lookup_users {
                users.complete_all(item.users_mut()).await?;
            }

            match item.to_document(access) {
                Ok(doc) => outcome.items.push(DocumentOrFailure::Document(doc)),
                Err(e) => {
                    let message = format!("Error converting {} to document: {}", T::KIND, e);
                    tracing::error!("{}", message);
                    outcome
                        .items
                        .push(DocumentOrFailure::Failure(ConnectorFailure::for_item(
                            item.item_id().to_string(),
                            item.item_link(),
                            message,
                            Some(e.to_string()),
                        )));
                }
            }
        }

        tracing::debug!(
            "{} batch for {}: {} seen, {} emitted",
            T::KIND,
            repo.full_name,
            outcome.seen,
            outcome.items.len()
        );
        Ok(outcome)
    }
}

#[async_trait]
impl CheckpointedConnector for GitHubConnector {
    async fn load_from_checkpoint(
        &self,
        start: SecondsSinceUnixEpoch,
        end: SecondsSinceUnixEpoch,
        checkpoint: Checkpoint,
    ) -> Result<CheckpointOutput, ConnectorError> {
        self.step(start, end, checkpoint, false).await
    }

    fn build_dummy_checkpoint(&self) -> Checkpoint {
        Checkpoint::dummy()
    }

    fn validate_checkpoint_json(&self, json: &str) -> Result<Checkpoint, ConnectorError> {
        Ok(Checkpoint::from_json(json)?)
    }

    async fn validate_connector_settings(&self) -> Result<(), ValidationError> {
        validate::validate_connector_settings(self.client.as_ref(), &self.config).await
    }

    fn as_permission_sync(&self) -> Option<&dyn PermissionSyncConnector> {
        Some(self)
    }
}

#[async_trait]
impl PermissionSyncConnector for GitHubConnector {
    async fn load_from_checkpoint_with_perm_sync(
        &self,
        start: SecondsSinceUnixEpoch,
        end: SecondsSinceUnixEpoch,
        checkpoint: Checkpoint,
    ) -> Result<CheckpointOutput, ConnectorError> {
        self.step(start, end, checkpoint, true).await
    }
}
