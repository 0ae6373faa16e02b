//! forgefeed - a resumable, rate-limit-aware GitHub connector.
//!
//! The connector turns the pull requests and issues of one, several or all
//! repositories of an owner into a stream of [`Document`]s. Work is done one
//! step at a time: every step takes a [`Checkpoint`] and returns the next
//! one with whatever the step produced, so a sync can stop after any step
//! and resume later without skipping or repeating items in its time window.
//!
//! # Example
//!
//! ```ignore
//! use forgefeed::{ConnectorConfig, ConnectorRunner, Credentials, GitHubConnector};
//!
//! let mut connector = GitHubConnector::new(
//!     ConnectorConfig::new("acme").with_repositories("widgets,gadgets").with_issues(true),
//! );
//! connector.load_credentials(&Credentials::new(token))?;
//!
//! let runner = ConnectorRunner::new(&connector, 16);
//! let output = runner.run(0, now, connector.build_dummy_checkpoint(), false).await?;
//! ```

pub mod connector;
pub mod convert;
pub mod document;
pub mod github;
pub mod http;
pub mod paginator;
pub mod permissions;
pub mod rate_limit;
pub mod repos;
pub mod retry;
pub mod runner;
pub mod users;

pub use connector::{
    Checkpoint, CheckpointOutput, CheckpointedConnector, ConnectorConfig, ConnectorError,
    Credentials, GitHubConnector, PermissionSyncConnector, Stage, StateFilter, ValidationError,
};
pub use document::{
    ConnectorFailure, Document, DocumentOrFailure, DocumentSource, ExternalAccess, MetadataValue,
};
pub use github::{GitHubClient, GitHubError};
pub use http::{HttpError, HttpRequest, HttpResponse, HttpTransport};
pub use permissions::{NoSpecialPermissions, PermissionResolver};
pub use rate_limit::ApiRateLimiter;
pub use runner::{ConnectorRunner, RunOutput};
