//! Canonical output records.
//!
//! A step of the connector produces [`Document`]s for the items it could
//! convert and [`ConnectorFailure`]s for the ones it could not. Both are
//! immutable once built and are handed to the downstream indexing pipeline
//! as [`DocumentOrFailure`].

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Where a document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentSource {
    Github,
}

impl std::fmt::Display for DocumentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentSource::Github => write!(f, "github"),
        }
    }
}

/// Who may read a document outside the indexing system's own ACLs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalAccess {
    pub external_user_emails: BTreeSet<String>,
    pub external_user_group_ids: BTreeSet<String>,
    pub is_public: bool,
}

impl ExternalAccess {
    /// No special access: not public, no users, no groups.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Flat metadata value: a string or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Text(String),
    List(Vec<String>),
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<Vec<String>> for MetadataValue {
    fn from(value: Vec<String>) -> Self {
        MetadataValue::List(value)
    }
}

/// A person associated with a document (author, for issues).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonInfo {
    pub login: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// One indexed unit: a pull request or an issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Stable web URL of the item.
    pub id: String,
    /// Raw body bytes (UTF-8 text for GitHub items).
    #[serde(serialize_with = "blob_as_text", deserialize_with = "blob_from_text")]
    pub blob: Vec<u8>,
    pub source: DocumentSource,
    pub semantic_identifier: String,
    pub extension: String,
    pub size_bytes: u64,
    pub doc_updated_at: Option<DateTime<Utc>>,
    pub metadata: BTreeMap<String, MetadataValue>,
    pub external_access: Option<ExternalAccess>,
    #[serde(default)]
    pub primary_owners: Vec<PersonInfo>,
    /// Extra keys used by permission sync (`repo`).
    #[serde(default)]
    pub doc_metadata: BTreeMap<String, String>,
}

fn blob_as_text<S: Serializer>(blob: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(blob))
}

fn blob_from_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    String::deserialize(deserializer).map(String::into_bytes)
}

/// The item a failure refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFailure {
    pub document_id: String,
    pub document_link: Option<String>,
}

/// A single item that could not be converted. Never aborts a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorFailure {
    pub failed_document: DocumentFailure,
    pub failure_message: String,
    /// Display form of the underlying error.
    pub cause: Option<String>,
}

impl ConnectorFailure {
    pub fn for_item(
        id: impl Into<String>,
        link: Option<String>,
        message: impl Into<String>,
        cause: Option<String>,
    ) -> Self {
        Self {
            failed_document: DocumentFailure {
                document_id: id.into(),
                document_link: link,
            },
            failure_message: message.into(),
            cause,
        }
    }

    pub fn failed_item_id(&self) -> &str {
        &self.failed_document.document_id
    }

    pub fn failed_item_link(&self) -> Option<&str> {
        self.failed_document.document_link.as_deref()
    }
}

/// One entry of a step's output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DocumentOrFailure {
    Document(Document),
    Failure(ConnectorFailure),
}

impl DocumentOrFailure {
    pub fn as_document(&self) -> Option<&Document> {
        match self {
            DocumentOrFailure::Document(doc) => Some(doc),
            DocumentOrFailure::Failure(_) => None,
        }
    }

    pub fn as_failure(&self) -> Option<&ConnectorFailure> {
        match self {
            DocumentOrFailure::Failure(failure) => Some(failure),
            DocumentOrFailure::Document(_) => None,
        }
    }
}
