//! Configuration loading for forgefeed CLI.
//!
//! Configuration is loaded from multiple sources with the following precedence
//! (highest priority first):
//! 1. Environment variables (FORGEFEED_* prefix)
//! 2. Project-local config file (./forgefeed.toml)
//! 3. User config file (~/.config/forgefeed/config.toml)
//! 4. Built-in defaults
//!
//! Command-line flags are applied on top by the commands themselves.

use std::path::{Path, PathBuf};

use config::{Config as ConfigBuilder, Environment, File};
use directories::ProjectDirs;
use forgefeed::StateFilter;
use serde::Deserialize;

const CHECKPOINT_FILE: &str = "checkpoint.json";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub github: GitHubConfig,
    pub sync: SyncConfig,
}

/// `[github]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub token: Option<String>,
    pub owner: Option<String>,
    /// One name or a comma-separated list; empty or absent means every
    /// repository of the owner.
    pub repositories: Option<String>,
    pub state_filter: StateFilter,
    pub include_prs: bool,
    pub include_issues: bool,
    pub base_url: Option<String>,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            owner: None,
            repositories: None,
            state_filter: StateFilter::All,
            include_prs: true,
            include_issues: false,
            base_url: None,
        }
    }
}

/// `[sync]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub batch_size: usize,
    pub checkpoint_path: Option<PathBuf>,
    pub output_path: Option<PathBuf>,
    /// Widen every window start by this many hours.
    pub start_lookback_hours: u32,
    pub requests_per_second: Option<u32>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: forgefeed::runner::DEFAULT_BATCH_SIZE,
            checkpoint_path: None,
            output_path: None,
            start_lookback_hours: 0,
            requests_per_second: None,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Invalid configuration is reported and replaced by defaults.
    pub fn load() -> Self {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = Self::user_config_path()
            && path.exists()
        {
            builder = builder.add_source(File::from(path).required(false));
        }

        let local = Path::new("forgefeed.toml");
        if local.exists() {
            builder = builder.add_source(File::from(local).required(false));
        }

        // FORGEFEED_GITHUB_TOKEN -> github.token
        builder = builder.add_source(
            Environment::with_prefix("FORGEFEED")
                .separator("_")
                .try_parsing(true),
        );

        Self::from_builder(builder)
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Self {
        match builder.build() {
            Ok(config) => match config.try_deserialize() {
                Ok(cfg) => cfg,
                Err(e) => {
                    tracing::warn!("Failed to parse config: {}, using defaults", e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to load config: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// `~/.config/forgefeed/config.toml` or the platform equivalent.
    pub fn user_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "forgefeed").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Where state such as the checkpoint lives by default.
    ///
    /// Uses the platform state directory, falling back to the data
    /// directory where there is none.
    pub fn default_state_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "forgefeed").map(|dirs| {
            dirs.state_dir()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| dirs.data_dir().to_path_buf())
        })
    }

    /// The configured checkpoint path, or the default under the state dir.
    pub fn checkpoint_path(&self) -> Option<PathBuf> {
        self.sync
            .checkpoint_path
            .clone()
            .or_else(|| Self::default_state_dir().map(|dir| dir.join(CHECKPOINT_FILE)))
    }

    /// Configured token, else the conventional `GITHUB_TOKEN`.
    pub fn github_token(&self) -> Option<String> {
        self.github
            .token
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty()))
    }
}
