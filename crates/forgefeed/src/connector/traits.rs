//! Connector capabilities.
//!
//! Hosts drive any connector through [`CheckpointedConnector`]. A connector
//! that can also stamp documents with access permissions exposes that
//! through [`CheckpointedConnector::as_permission_sync`].

use async_trait::async_trait;

use super::checkpoint::{Checkpoint, CheckpointOutput};
use super::error::{ConnectorError, ValidationError};

/// Seconds since the Unix epoch, as supplied by the polling loop.
pub type SecondsSinceUnixEpoch = i64;

/// A connector that syncs incrementally from a checkpoint.
#[async_trait]
pub trait CheckpointedConnector: Send + Sync {
    /// Run one step within the window `[start, end]`.
    async fn load_from_checkpoint(
        &self,
        start: SecondsSinceUnixEpoch,
        end: SecondsSinceUnixEpoch,
        checkpoint: Checkpoint,
    ) -> Result<CheckpointOutput, ConnectorError>;

    /// The checkpoint a brand-new sync starts from.
    fn build_dummy_checkpoint(&self) -> Checkpoint;

    /// Parse a persisted checkpoint.
    fn validate_checkpoint_json(&self, json: &str) -> Result<Checkpoint, ConnectorError>;

    async fn validate_connector_settings(&self) -> Result<(), ValidationError>;

    /// Permission-sync capability, if this connector has it.
    fn as_permission_sync(&self) -> Option<&dyn PermissionSyncConnector> {
        None
    }
}

/// A connector whose documents can carry external access permissions.
#[async_trait]
pub trait PermissionSyncConnector: CheckpointedConnector {
    async fn load_from_checkpoint_with_perm_sync(
        &self,
        start: SecondsSinceUnixEpoch,
        end: SecondsSinceUnixEpoch,
        checkpoint: Checkpoint,
    ) -> Result<CheckpointOutput, ConnectorError>;
}
