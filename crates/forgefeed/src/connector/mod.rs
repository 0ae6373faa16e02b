//! Checkpointed GitHub connector.
//!
//! # Module Structure
//!
//! - [`checkpoint`] - `Checkpoint`, `Stage` and the cached repository snapshot
//! - [`config`] - `ConnectorConfig`, `StateFilter`, `Credentials`
//! - [`error`] - `ConnectorError` and `ValidationError`
//! - [`traits`] - Capability traits hosts drive connectors through
//! - [`engine`] - `GitHubConnector` and its step function
//! - [`validate`] - Settings validation
//!
//! # Example
//!
//! ```ignore
//! use forgefeed::connector::{CheckpointedConnector, ConnectorConfig, Credentials, GitHubConnector};
//!
//! let mut connector = GitHubConnector::new(ConnectorConfig::new("rust-lang").with_repositories("regex"));
//! connector.load_credentials(&Credentials::new(token))?;
//!
//! let mut checkpoint = connector.build_dummy_checkpoint();
//! while checkpoint.has_more {
//!     let output = connector.load_from_checkpoint(0, now, checkpoint).await?;
//!     checkpoint = output.checkpoint;
//! }
//! ```

pub mod checkpoint;
pub mod config;
pub mod engine;
pub mod error;
pub mod traits;
pub mod validate;

pub use checkpoint::{Checkpoint, CheckpointOutput, SerializedRepository, Stage};
pub use config::{ConnectorConfig, Credentials, ParseStateFilterError, StateFilter};
pub use engine::{GitHubConnector, TimeWindow};
pub use error::{ConnectorError, ValidationError};
pub use traits::{CheckpointedConnector, PermissionSyncConnector, SecondsSinceUnixEpoch};
