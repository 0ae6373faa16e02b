//! Checkpoint: the only state carried between connector steps.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::document::{ConnectorFailure, Document, DocumentOrFailure};
use crate::github::Repository;

/// Per-repository phase of a sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// The repository set has not been resolved yet.
    Start,
    #[serde(alias = "prs")]
    PullRequests,
    Issues,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Start => write!(f, "start"),
            Stage::PullRequests => write!(f, "pull_requests"),
            Stage::Issues => write!(f, "issues"),
        }
    }
}

/// A repository snapshot that can be rebuilt without a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedRepository {
    pub id: i64,
    pub headers: BTreeMap<String, String>,
    pub raw_data: serde_json::Value,
}

impl From<&Repository> for SerializedRepository {
    fn from(repo: &Repository) -> Self {
        Self {
            id: repo.id,
            headers: repo.headers.clone(),
            raw_data: repo.raw_data.clone(),
        }
    }
}

impl SerializedRepository {
    /// Rebuild the repository handle from the cached payload.
    pub fn to_repository(&self) -> Result<Repository, serde_json::Error> {
        Repository::from_raw(self.raw_data.clone(), self.headers.clone())
    }
}

/// Sync progress marker.
///
/// Steps take a checkpoint by value and hand back a new one, so a caller's
/// copy is never changed behind its back. Optional fields always serialise,
/// as `null` when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub stage: Stage,
    /// Next zero-based page in offset mode.
    #[serde(alias = "curr_page")]
    pub current_page: u32,
    /// Repositories still to process in this pass; `None` until resolved.
    #[serde(default, alias = "cached_repo_ids")]
    pub cached_repository_ids: Option<Vec<i64>>,
    /// The repository currently being processed.
    #[serde(default, alias = "cached_repo")]
    pub cached_repository: Option<SerializedRepository>,
    /// Next-page link while cursor pagination is in effect.
    #[serde(default)]
    pub cursor_url: Option<String>,
    /// Items read so far in the current cursor pass.
    pub num_retrieved: u64,
    pub has_more: bool,
}

impl Default for Checkpoint {
    fn default() -> Self {
        Self::dummy()
    }
}

impl Checkpoint {
    /// A fresh checkpoint for a sync that has not started.
    pub fn dummy() -> Self {
        Self {
            stage: Stage::Start,
            current_page: 0,
            cached_repository_ids: None,
            cached_repository: None,
            cursor_url: None,
            num_retrieved: 0,
            has_more: true,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Reset page, cursor and retrieved count for a new sub-resource.
    pub fn reset_pagination(&mut self) {
        self.current_page = 0;
        self.num_retrieved = 0;
        self.cursor_url = None;
    }
}

/// Result of one connector step.
#[derive(Debug, Clone)]
pub struct CheckpointOutput {
    pub items: Vec<DocumentOrFailure>,
    pub checkpoint: Checkpoint,
}

impl CheckpointOutput {
    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.items.iter().filter_map(DocumentOrFailure::as_document)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ConnectorFailure> {
        self.items.iter().filter_map(DocumentOrFailure::as_failure)
    }
}
