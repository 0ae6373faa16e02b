//! One-time settings check.
//!
//! Makes a handful of cheap requests that prove the token can read what the
//! configuration names, and maps GitHub failures onto [`ValidationError`]
//! categories a user can act on.

use super::config::ConnectorConfig;
use super::error::ValidationError;
use crate::github::{GitHubClient, GitHubError};
use crate::repos::{RepositorySelection, split_repository_names};

const MISSING_SSO_MESSAGE: &str =
    "you must grant your personal access token access to this organization";

const SSO_GUIDE_LINK: &str = "https://docs.github.com/en/enterprise-cloud@latest/authentication/\
     authenticating-with-saml-single-sign-on/\
     authorizing-a-personal-access-token-for-use-with-saml-single-sign-on";

enum CheckError {
    Settings(ValidationError),
    GitHub(GitHubError),
}

impl From<GitHubError> for CheckError {
    fn from(e: GitHubError) -> Self {
        CheckError::GitHub(e)
    }
}

/// Validate that the configured owner and repositories are readable.
pub async fn validate_connector_settings(
    client: Option<&GitHubClient>,
    config: &ConnectorConfig,
) -> Result<(), ValidationError> {
    let client = client.ok_or_else(|| {
        ValidationError::MissingCredential("GitHub credentials not loaded.".to_string())
    })?;

    if config.repo_owner.trim().is_empty() {
        return Err(ValidationError::InvalidSettings(
            "Invalid connector settings: 'repo_owner' must be provided.".to_string(),
        ));
    }

    let selection = RepositorySelection::from_config(config.repositories.as_deref());
    match check(client, &config.repo_owner, selection).await {
        Ok(()) => Ok(()),
        Err(CheckError::Settings(e)) => Err(e),
        Err(CheckError::GitHub(e)) => Err(classify(&e, &config.repo_owner, selection)),
    }
}

async fn check(
    client: &GitHubClient,
    owner: &str,
    selection: RepositorySelection<'_>,
) -> Result<(), CheckError> {
    match selection {
        RepositorySelection::Multiple(list) => check_any_repository(client, owner, list).await,
        RepositorySelection::Single(name) => {
            check_repository(client, owner, name.trim()).await?;
            Ok(())
        }
        RepositorySelection::All => check_owner(client, owner).await,
    }
}

async fn check_repository(
    client: &GitHubClient,
    owner: &str,
    name: &str,
) -> Result<(), GitHubError> {
    let repo = client.get_repo(owner, name).await?;
    tracing::info!("Successfully accessed repository: {}", repo.full_name);
    client.get_root_contents(&repo.full_name).await
}

/// At least one listed repository must be readable.
async fn check_any_repository(
    client: &GitHubClient,
    owner: &str,
    list: &str,
) -> Result<(), CheckError> {
    let names = split_repository_names(list);
    if names.is_empty() {
        return Err(CheckError::Settings(ValidationError::InvalidSettings(
            "Invalid connector settings: No valid repository names provided.".to_string(),
        )));
    }

    let mut errors = Vec::new();
    for name in names {
        match check_repository(client, owner, name).await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_rate_limited() => return Err(e.into()),
            Err(e) => errors.push(format!("Repository '{}': {}", name, api_message(&e))),
        }
    }

    Err(CheckError::Settings(ValidationError::InvalidSettings(
        format!(
            "None of the specified repositories could be accessed: {}",
            errors.join(", ")
        ),
    )))
}

/// The owner must have at least one repository, as an organisation or a user.
async fn check_owner(client: &GitHubClient, owner: &str) -> Result<(), CheckError> {
    match client.has_any_repos(&client.org_repos_url(owner)).await {
        Ok(true) => return Ok(()),
        Ok(false) => {
            return Err(CheckError::Settings(ValidationError::InvalidSettings(
                format!(
                    "Found no repos for organization: {}. Does the credential have the right scopes?",
                    owner
                ),
            )));
        }
        Err(e) if e.is_rate_limited() => return Err(e.into()),
        Err(e) if e.to_string().to_lowercase().contains(MISSING_SSO_MESSAGE) => {
            return Err(CheckError::Settings(ValidationError::InvalidSettings(
                format!(
                    "Your GitHub token is missing authorization to access the `{}` organization. \
                     Please follow the guide to authorize your token: {}",
                    owner, SSO_GUIDE_LINK
                ),
            )));
        }
        Err(e) => {
            tracing::debug!("{} is not a readable organization: {}", owner, e);
        }
    }

    if client.has_any_repos(&client.user_repos_url(owner)).await? {
        Ok(())
    } else {
        Err(CheckError::Settings(ValidationError::InvalidSettings(
            format!(
                "Found no repos for user: {}. Does the credential have the right scopes?",
                owner
            ),
        )))
    }
}

fn api_message(e: &GitHubError) -> String {
    match e {
        GitHubError::Api { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

fn classify(e: &GitHubError, owner: &str, selection: RepositorySelection<'_>) -> ValidationError {
    if e.is_rate_limited() {
        return ValidationError::Unexpected(
            "Validation failed due to GitHub rate-limits being exceeded. Please try again later."
                .to_string(),
        );
    }

    match e.status() {
        Some(401) => ValidationError::CredentialExpired(
            "GitHub credential appears to be invalid or expired (HTTP 401).".to_string(),
        ),
        Some(403) => ValidationError::InsufficientPermissions(
            "Your GitHub token does not have sufficient permissions for this repository (HTTP 403)."
                .to_string(),
        ),
        Some(404) => ValidationError::InvalidSettings(match selection {
            RepositorySelection::Multiple(_) => format!(
                "None of the specified GitHub repositories could be found for owner: {}",
                owner
            ),
            RepositorySelection::Single(name) => format!(
                "GitHub repository not found with name: {}/{}",
                owner,
                name.trim()
            ),
            RepositorySelection::All => {
                format!("GitHub user or organization not found: {}", owner)
            }
        }),
        Some(status) => ValidationError::InvalidSettings(format!(
            "Unexpected GitHub error (status={}): {}",
            status,
            api_message(e)
        )),
        None => ValidationError::Unexpected(format!(
            "Unexpected error during GitHub settings validation: {}",
            e
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpResponse, MockTransport};
    use std::sync::Arc;

    fn json_response(status: u16, body: serde_json::Value) -> HttpResponse {
        HttpResponse {
            status,
            headers: Vec::new(),
            body: serde_json::to_vec(&body).expect("json body"),
        }
    }

    fn repo_json(name: &str) -> serde_json::Value {
        serde_json::json!({ "id": 1, "name": name, "full_name": format!("acme/{}", name) })
    }

    fn client(transport: &MockTransport) -> GitHubClient {
        GitHubClient::new_with_transport(
            "token",
            Some("https://api.test"),
            None,
            Arc::new(transport.clone()),
        )
    }

    async fn validate(
        transport: &MockTransport,
        config: ConnectorConfig,
    ) -> Result<(), ValidationError> {
        validate_connector_settings(Some(&client(transport)), &config).await
    }

    #[tokio::test]
    async fn test_missing_client_and_owner() {
        let err = validate_connector_settings(None, &ConnectorConfig::new("acme"))
            .await
            .expect_err("no client");
        assert_eq!(err.category(), "missing_credential");

        let transport = MockTransport::new();
        let err = validate(&transport, ConnectorConfig::new(" "))
            .await
            .expect_err("no owner");
        assert_eq!(err.category(), "invalid_settings");
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_single_repository_must_be_readable() {
        let transport = MockTransport::new();
        transport.set_response(
            "https://api.test/repos/acme/widgets",
            json_response(200, repo_json("widgets")),
        );
        transport.set_response(
            "https://api.test/repos/acme/widgets/contents/",
            json_response(200, serde_json::json!([])),
        );

        validate(&transport, ConnectorConfig::new("acme").with_repositories("widgets"))
            .await
            .expect("valid");
    }

    #[tokio::test]
    async fn test_single_repository_not_found() {
        let transport = MockTransport::new();
        transport.set_response(
            "https://api.test/repos/acme/nope",
            json_response(404, serde_json::json!({ "message": "Not Found" })),
        );

        let err = validate(&transport, ConnectorConfig::new("acme").with_repositories("nope"))
            .await
            .expect_err("not found");
        assert_eq!(
            err,
            ValidationError::InvalidSettings(
                "GitHub repository not found with name: acme/nope".to_string()
            )
        );
    }

    #[tokio::test]
    async fn test_repository_list_needs_one_readable_repository() {
        let transport = MockTransport::new();
        transport.set_response(
            "https://api.test/repos/acme/a",
            json_response(404, serde_json::json!({ "message": "Not Found" })),
        );
        transport.set_response(
            "https://api.test/repos/acme/b",
            json_response(200, repo_json("b")),
        );
        transport.set_response(
            "https://api.test/repos/acme/b/contents/",
            json_response(200, serde_json::json!([])),
        );

        validate(&transport, ConnectorConfig::new("acme").with_repositories("a, b"))
            .await
            .expect("b is readable");

        let transport = MockTransport::new();
        transport.set_response(
            "https://api.test/repos/acme/a",
            json_response(404, serde_json::json!({ "message": "Not Found" })),
        );
        transport.set_response(
            "https://api.test/repos/acme/c",
            json_response(403, serde_json::json!({ "message": "Forbidden" })),
        );
        let err = validate(&transport, ConnectorConfig::new("acme").with_repositories("a,c"))
            .await
            .expect_err("none readable");
        assert_eq!(
            err.to_string(),
            "None of the specified repositories could be accessed: \
             Repository 'a': Not Found, Repository 'c': Forbidden"
        );
    }

    #[tokio::test]
    async fn test_status_categories() {
        for (status, category) in [
            (401, "credential_expired"),
            (403, "insufficient_permissions"),
            (404, "invalid_settings"),
            (500, "invalid_settings"),
        ] {
            let transport = MockTransport::new();
            transport.set_response(
                "https://api.test/repos/acme/widgets",
                json_response(status, serde_json::json!({ "message": "x" })),
            );
            let err = validate(&transport, ConnectorConfig::new("acme").with_repositories("widgets"))
                .await
                .expect_err("failure");
            assert_eq!(err.category(), category, "status {}", status);
        }
    }

    #[tokio::test]
    async fn test_rate_limited_validation_is_unexpected() {
        let transport = MockTransport::new();
        transport.set_response(
            "https://api.test/repos/acme/widgets",
            HttpResponse {
                status: 429,
                headers: vec![("retry-after".to_string(), "30".to_string())],
                body: b"{\"message\":\"API rate limit exceeded\"}".to_vec(),
            },
        );

        let err = validate(&transport, ConnectorConfig::new("acme").with_repositories("widgets"))
            .await
            .expect_err("rate limited");
        assert_eq!(err.category(), "unexpected");
        assert!(err.to_string().contains("rate-limits being exceeded"));
    }

    #[tokio::test]
    async fn test_owner_falls_back_to_user() {
        let transport = MockTransport::new();
        transport.set_response(
            "https://api.test/orgs/ada/repos?per_page=100",
            json_response(404, serde_json::json!({ "message": "Not Found" })),
        );
        transport.set_response(
            "https://api.test/users/ada/repos?per_page=100",
            json_response(200, serde_json::json!([repo_json("dotfiles")])),
        );
        validate(&transport, ConnectorConfig::new("ada"))
            .await
            .expect("user has repos");

        transport.set_response(
            "https://api.test/users/ada/repos?per_page=100",
            json_response(200, serde_json::json!([])),
        );
        let err = validate(&transport, ConnectorConfig::new("ada"))
            .await
            .expect_err("no repos");
        assert!(err.to_string().starts_with("Found no repos for user: ada."));
    }

    #[tokio::test]
    async fn test_owner_not_found() {
        let transport = MockTransport::new();
        for url in [
            "https://api.test/orgs/ghost/repos?per_page=100",
            "https://api.test/users/ghost/repos?per_page=100",
        ] {
            transport.set_response(url, json_response(404, serde_json::json!({ "message": "Not Found" })));
        }

        let err = validate(&transport, ConnectorConfig::new("ghost"))
            .await
            .expect_err("not found");
        assert_eq!(
            err.to_string(),
            "GitHub user or organization not found: ghost"
        );
    }

    #[tokio::test]
    async fn test_missing_sso_authorisation() {
        let transport = MockTransport::new();
        transport.set_response(
            "https://api.test/orgs/acme/repos?per_page=100",
            json_response(
                403,
                serde_json::json!({
                    "message": "Resource protected by organization SAML enforcement. You must grant your Personal Access token access to this organization."
                }),
            ),
        );

        let err = validate(&transport, ConnectorConfig::new("acme"))
            .await
            .expect_err("sso");
        assert!(err.to_string().contains("missing authorization to access the `acme` organization"));
        assert!(err.to_string().contains(SSO_GUIDE_LINK));
        assert_eq!(transport.count("https://api.test/users/acme/repos?per_page=100"), 0);
    }
}
