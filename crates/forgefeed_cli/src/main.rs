//! forgefeed CLI - host for the GitHub connector's polling loop.

mod commands;
mod config;
mod shutdown;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use forgefeed::StateFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "forgefeed")]
#[command(version)]
#[command(about = "Incrementally export GitHub pull requests and issues as documents")]
#[command(
    long_about = "forgefeed walks the pull requests and issues of one, several or all \
repositories of a GitHub owner and writes them as JSON documents. Progress is saved to \
a checkpoint file after every step, so an interrupted sync resumes where it stopped."
)]
#[command(after_long_help = r#"EXAMPLES
    Sync two repositories, pull requests and issues:
        $ forgefeed sync --owner acme --repos widgets,gadgets --issues

    Sync everything an organization owns updated since a point in time:
        $ forgefeed sync --owner acme --start 1717200000 --output acme.jsonl

    Check the token and settings:
        $ forgefeed validate --owner acme

CONFIGURATION
    forgefeed reads configuration from:
      1. ~/.config/forgefeed/config.toml (or $XDG_CONFIG_HOME/forgefeed/config.toml)
      2. ./forgefeed.toml
      3. Environment variables (FORGEFEED_* prefix, e.g., FORGEFEED_GITHUB_TOKEN)
      4. .env file in current directory

ENVIRONMENT VARIABLES
    FORGEFEED_GITHUB_TOKEN    GitHub personal access token
    FORGEFEED_GITHUB_OWNER    Repository owner (user or organization)
    GITHUB_TOKEN              Used when no token is configured
    RUST_LOG                  Log filter (default: forgefeed=info,forgefeed_cli=info)
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the sync until it is complete or interrupted
    Sync(SyncArgs),
    /// Check that the token can read the configured repositories
    Validate {
        #[command(flatten)]
        connection: ConnectionArgs,
    },
    /// Inspect or reset the persisted checkpoint
    Checkpoint {
        #[command(subcommand)]
        action: CheckpointAction,
        /// Checkpoint file (default: state directory)
        #[arg(long, global = true)]
        path: Option<PathBuf>,
    },
}

#[derive(Subcommand, Clone, Copy)]
enum CheckpointAction {
    /// Print the checkpoint
    Show,
    /// Delete the checkpoint so the next sync starts over
    Reset,
}

/// What to connect to; each flag overrides the configuration file.
#[derive(Args, Debug, Clone)]
pub(crate) struct ConnectionArgs {
    /// Repository owner (user or organization)
    #[arg(long)]
    pub owner: Option<String>,

    /// One repository name or a comma-separated list (default: all)
    #[arg(long)]
    pub repos: Option<String>,

    /// State filter for pull requests and issues
    #[arg(long)]
    pub state: Option<StateFilter>,

    /// Include pull requests
    #[arg(long, overrides_with = "no_prs")]
    pub prs: bool,

    /// Skip pull requests
    #[arg(long = "no-prs", overrides_with = "prs")]
    pub no_prs: bool,

    /// Include issues
    #[arg(long, overrides_with = "no_issues")]
    pub issues: bool,

    /// Skip issues
    #[arg(long = "no-issues", overrides_with = "issues")]
    pub no_issues: bool,

    /// API root for GitHub Enterprise (e.g. https://github.example.com/api/v3)
    #[arg(long)]
    pub base_url: Option<String>,

    /// GitHub token (default: configured token, then $GITHUB_TOKEN)
    #[arg(long)]
    pub token: Option<String>,
}

impl ConnectionArgs {
    pub fn include_prs(&self) -> Option<bool> {
        flag_pair(self.prs, self.no_prs)
    }

    pub fn include_issues(&self) -> Option<bool> {
        flag_pair(self.issues, self.no_issues)
    }
}

fn flag_pair(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

#[derive(Args, Debug, Clone)]
pub(crate) struct SyncArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Window start, seconds since the Unix epoch
    #[arg(long, default_value_t = 0)]
    pub start: i64,

    /// Window end, seconds since the Unix epoch (default: now)
    #[arg(long)]
    pub end: Option<i64>,

    /// Checkpoint file (default: state directory)
    #[arg(long)]
    pub checkpoint: Option<PathBuf>,

    /// Append documents to this file as JSON lines (default: stdout)
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Stamp documents with repository access permissions
    #[arg(long)]
    pub perm_sync: bool,

    /// Documents per batch
    #[arg(long)]
    pub batch_size: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    shutdown::setup_shutdown_handler();

    // stdout carries documents, so logs go to stderr
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new("forgefeed=info,forgefeed_cli=info"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = config::Config::load();
    let cli = Cli::parse();

    match cli.command {
        Commands::Sync(args) => commands::sync::handle_sync(args, &config).await?,
        Commands::Validate { connection } => {
            commands::validate::handle_validate(&connection, &config).await?
        }
        Commands::Checkpoint { action, path } => {
            let path = commands::shared::checkpoint_path(path, &config)?;
            match action {
                CheckpointAction::Show => commands::checkpoint::handle_show(&path)?,
                CheckpointAction::Reset => commands::checkpoint::handle_reset(&path)?,
            }
        }
    }

    Ok(())
}
