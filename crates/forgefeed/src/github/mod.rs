//! GitHub REST adapter.
//!
//! # Module Structure
//!
//! - [`error`] - Error types and classifiers for GitHub API failures
//! - [`types`] - Wire types for repositories, pull requests and issues
//! - [`link`] - `Link` header parsing
//! - [`client`] - Authenticated client over the HTTP transport seam
//! - [`listing`] - Pull request and issue listings for the paginator

pub mod client;
pub mod error;
pub mod link;
pub mod listing;
pub mod types;

pub use client::{DEFAULT_API_URL, GitHubClient, PAGE_SIZE, Page};
pub use error::{GitHubError, short_error_message};
pub use listing::{Listable, Listed, MalformedItem, PaginatedList};
pub use types::{Issue, Label, PullRequest, Repository, SimpleUser};
