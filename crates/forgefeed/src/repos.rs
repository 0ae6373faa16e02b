//! Repository enumeration.
//!
//! Resolves the configured repository list into concrete repositories:
//! one named repository, a comma-separated list, or everything the owner
//! has. Every request goes through the rate-limit retry loop.

use crate::connector::ConnectorError;
use crate::github::{GitHubClient, GitHubError, Repository, short_error_message};
use crate::rate_limit::{RetryBudget, retry_rate_limited};

/// Which repositories a connector syncs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositorySelection<'a> {
    /// One repository by name.
    Single(&'a str),
    /// A comma-separated list of names.
    Multiple(&'a str),
    /// Every repository of the owner.
    All,
}

impl<'a> RepositorySelection<'a> {
    /// A value containing a comma selects several repositories, any other
    /// non-empty value selects one, and no value selects all of them.
    pub fn from_config(list: Option<&'a str>) -> Self {
        match list {
            Some(list) if list.contains(',') => RepositorySelection::Multiple(list),
            Some(list) if !list.trim().is_empty() => RepositorySelection::Single(list),
            _ => RepositorySelection::All,
        }
    }
}

/// Split a comma-separated list, trimming names and dropping empty ones.
pub fn split_repository_names(list: &str) -> Vec<&str> {
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .collect()
}

/// Fetch one repository. Any failure is returned to the caller.
pub async fn get_repository(
    client: &GitHubClient,
    owner: &str,
    name: &str,
) -> Result<Repository, ConnectorError> {
    let name = name.trim();
    retry_rate_limited(client, "repository fetch", move || {
        client.get_repo(owner, name)
    })
    .await
}

/// Fetch each named repository, omitting the ones that cannot be read.
pub async fn get_repositories(
    client: &GitHubClient,
    owner: &str,
    list: &str,
) -> Result<Vec<Repository>, ConnectorError> {
    let mut repos = Vec::new();

    for name in split_repository_names(list) {
        match get_repository(client, owner, name).await {
            Ok(repo) => repos.push(repo),
            Err(ConnectorError::GitHub(e)) => {
                tracing::warn!(
                    "Could not fetch repo {}/{}: {}",
                    owner,
                    name,
                    short_error_message(&e)
                );
            }
            Err(e) => return Err(e),
        }
    }

    Ok(repos)
}

/// List every repository of `owner`, as an organisation or else as a user.
pub async fn get_all_repositories(
    client: &GitHubClient,
    owner: &str,
) -> Result<Vec<Repository>, ConnectorError> {
    let mut budget = RetryBudget::new("repository listing");
    loop {
        match list_org_or_user(client, owner).await {
            Ok(repos) => return Ok(repos),
            Err(e) if e.is_rate_limited() => budget.backoff(client).await?,
            Err(e) => return Err(e.into()),
        }
    }
}

async fn list_org_or_user(
    client: &GitHubClient,
    owner: &str,
) -> Result<Vec<Repository>, GitHubError> {
    match client.list_org_repos(owner).await {
        Ok(repos) => Ok(repos),
        Err(e) if e.is_rate_limited() => Err(e),
        Err(e) => {
            tracing::debug!(
                "{} is not a readable organization ({}), listing as a user",
                owner,
                short_error_message(&e)
            );
            client.list_user_repos(owner).await
        }
    }
}

/// Resolve the configured repositories.
pub async fn resolve_repositories(
    client: &GitHubClient,
    owner: &str,
    list: Option<&str>,
) -> Result<Vec<Repository>, ConnectorError> {
    match RepositorySelection::from_config(list) {
        RepositorySelection::Multiple(list) => get_repositories(client, owner, list).await,
        RepositorySelection::Single(name) => {
            Ok(vec![get_repository(client, owner, name).await?])
        }
        RepositorySelection::All => get_all_repositories(client, owner).await,
    }
}
