//! Repository access resolution for permission-aware syncs.

use async_trait::async_trait;

use crate::document::ExternalAccess;
use crate::github::{GitHubClient, Repository};

/// Resolves who may read documents from a repository.
#[async_trait]
pub trait PermissionResolver: Send + Sync {
    async fn resolve_permissions(
        &self,
        repository: &Repository,
        client: &GitHubClient,
    ) -> ExternalAccess;
}

/// Grants no special access and performs no I/O.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSpecialPermissions;

#[async_trait]
impl PermissionResolver for NoSpecialPermissions {
    async fn resolve_permissions(
        &self,
        repository: &Repository,
        _client: &GitHubClient,
    ) -> ExternalAccess {
        tracing::debug!("No permission resolution for {}", repository.full_name);
        ExternalAccess::empty()
    }
}
