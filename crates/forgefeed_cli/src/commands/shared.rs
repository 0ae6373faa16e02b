use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use forgefeed::{Checkpoint, CheckpointedConnector, ConnectorConfig, Credentials, GitHubConnector};

use crate::ConnectionArgs;
use crate::config::Config;

pub(crate) type CommandResult<T = ()> = Result<T, Box<dyn Error>>;

/// Merge command-line flags over the loaded configuration.
pub(crate) fn connector_config(args: &ConnectionArgs, config: &Config) -> CommandResult<ConnectorConfig> {
    let owner = args
        .owner
        .clone()
        .or_else(|| config.github.owner.clone())
        .ok_or("no repository owner; pass --owner or set [github] owner")?;

    let mut connector_config = ConnectorConfig::new(owner)
        .with_state_filter(args.state.unwrap_or(config.github.state_filter))
        .with_prs(args.include_prs().unwrap_or(config.github.include_prs))
        .with_issues(args.include_issues().unwrap_or(config.github.include_issues))
        .with_start_lookback(chrono::Duration::hours(i64::from(
            config.sync.start_lookback_hours,
        )));

    if let Some(repos) = args.repos.as_ref().or(config.github.repositories.as_ref()) {
        connector_config = connector_config.with_repositories(repos.clone());
    }
    if let Some(base_url) = args.base_url.as_ref().or(config.github.base_url.as_ref()) {
        connector_config = connector_config.with_base_url(base_url.clone());
    }
    if let Some(rps) = config.sync.requests_per_second {
        connector_config = connector_config.with_requests_per_second(rps);
    }

    Ok(connector_config)
}

/// Build the connector, loading credentials when a token is available.
///
/// A connector without credentials is still returned so that validation
/// can report the missing token in its own terms.
pub(crate) fn build_connector(args: &ConnectionArgs, config: &Config) -> CommandResult<GitHubConnector> {
    let mut connector = GitHubConnector::new(connector_config(args, config)?);

    let token = args
        .token
        .clone()
        .filter(|t| !t.is_empty())
        .or_else(|| config.github_token());
    match token {
        Some(token) => connector.load_credentials(&Credentials::new(token))?,
        None => tracing::debug!("No GitHub token configured"),
    }

    Ok(connector)
}

pub(crate) fn checkpoint_path(explicit: Option<PathBuf>, config: &Config) -> CommandResult<PathBuf> {
    explicit
        .or_else(|| config.checkpoint_path())
        .ok_or_else(|| "could not determine a checkpoint path; pass --checkpoint".into())
}

/// Read the persisted checkpoint, or start fresh when there is none.
pub(crate) fn load_checkpoint(
    connector: &dyn CheckpointedConnector,
    path: &Path,
) -> CommandResult<Checkpoint> {
    if !path.exists() {
        tracing::debug!("No checkpoint at {}, starting fresh", path.display());
        return Ok(connector.build_dummy_checkpoint());
    }
    let json = fs::read_to_string(path)?;
    Ok(connector.validate_checkpoint_json(&json)?)
}

/// Persist the checkpoint by writing a sibling file and renaming it over
/// the old one, so a crash never leaves a truncated checkpoint.
pub(crate) fn save_checkpoint(path: &Path, checkpoint: &Checkpoint) -> CommandResult {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, checkpoint.to_json()?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
