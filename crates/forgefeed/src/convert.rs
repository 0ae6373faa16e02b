//! Conversion of pull requests and issues into [`Document`]s.
//!
//! Conversion is pure. A missing required field is reported as a
//! [`ConversionError`] so the stage machine can surface it as a
//! per-item failure without aborting the batch.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use crate::document::{Document, DocumentSource, ExternalAccess, MetadataValue, PersonInfo};
use crate::github::{Issue, PullRequest, SimpleUser};

/// Extension given to every document.
pub const DOCUMENT_EXTENSION: &str = ".md";

/// Names longer than this many characters are shortened.
const MAX_NAME_LEN: usize = 200;

/// Length the stem is cut to when a name is shortened.
const TRUNCATED_STEM_LEN: usize = 180;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConversionError {
    #[error("{item} #{number} has no {field}")]
    MissingField {
        item: &'static str,
        number: u64,
        field: &'static str,
    },
}

/// Make a title safe to use as an object-store key.
///
/// `\ ? # % * : | < > "` and `/` become spaces, whitespace runs collapse
/// to one space and the ends are trimmed. Names over 200 characters keep
/// their first 180 stem characters and their extension. `.{extension}` is
/// appended when the result has no extension of its own.
pub fn sanitize_filename(name: Option<&str>, extension: &str) -> String {
    let Some(name) = name else {
        return format!("file.{}", extension);
    };

    let replaced: String = name
        .chars()
        .map(|c| match c {
            '\\' | '?' | '#' | '%' | '*' | ':' | '|' | '<' | '>' | '"' | '/' => ' ',
            c => c,
        })
        .collect();
    let mut name = replaced.split_whitespace().collect::<Vec<_>>().join(" ");

    if name.chars().count() > MAX_NAME_LEN {
        let (stem, ext) = split_extension(&name);
        let stem: String = stem.chars().take(TRUNCATED_STEM_LEN).collect();
        name = format!("{}{}", stem.trim_end(), ext);
    }

    if split_extension(&name).1.is_empty() {
        name.push('.');
        name.push_str(extension);
    }

    name
}

/// Split `name` into stem and extension.
///
/// The extension starts at the last dot, unless every character before
/// that dot is also a dot (`.profile` has no extension).
fn split_extension(name: &str) -> (&str, &str) {
    let Some(dot) = name.rfind('.') else {
        return (name, "");
    };
    match name.find(|c| c != '.') {
        Some(first) if dot > first => (&name[..dot], &name[dot..]),
        _ => (name, ""),
    }
}

fn timestamp(value: Option<DateTime<Utc>>) -> Option<MetadataValue> {
    value.map(|dt| MetadataValue::Text(dt.to_rfc3339_opts(SecondsFormat::Secs, true)))
}

/// Compact JSON object of the user fields that are present.
fn user_info(user: &SimpleUser) -> String {
    let mut info = BTreeMap::new();
    info.insert("login", user.login.as_str());
    if let Some(name) = user.name.as_deref() {
        info.insert("name", name);
    }
    if let Some(email) = user.email.as_deref() {
        info.insert("email", email);
    }
    serde_json::to_string(&info).unwrap_or_else(|_| user.login.clone())
}

fn person(user: &SimpleUser) -> PersonInfo {
    PersonInfo {
        login: user.login.clone(),
        display_name: user.name.clone(),
        email: user.email.clone(),
    }
}

/// Builder that drops absent values instead of storing nulls.
#[derive(Default)]
struct Metadata(BTreeMap<String, MetadataValue>);

impl Metadata {
    fn set(&mut self, key: &str, value: Option<impl Into<MetadataValue>>) -> &mut Self {
        if let Some(value) = value {
            self.0.insert(key.to_string(), value.into());
        }
        self
    }

    fn set_list(&mut self, key: &str, values: Vec<String>) -> &mut Self {
        self.0.insert(key.to_string(), MetadataValue::List(values));
        self
    }
}

fn body_blob(body: Option<&str>) -> Vec<u8> {
    body.map(|b| b.as_bytes().to_vec()).unwrap_or_default()
}

/// Convert a pull request.
pub fn pull_request_to_document(
    pr: &PullRequest,
    external_access: Option<&ExternalAccess>,
) -> Result<Document, ConversionError> {
    let html_url = pr.html_url.clone().ok_or(ConversionError::MissingField {
        item: "pull request",
        number: pr.number,
        field: "html_url",
    })?;
    let repo = pr.repo_full_name();
    let blob = body_blob(pr.body.as_deref());
    let name = sanitize_filename(pr.title.as_deref(), "md");

    let mut metadata = Metadata::default();
    metadata
        .set("object_type", Some("PullRequest"))
        .set("id", Some(pr.number.to_string()))
        .set("merged", pr.merged.map(|m| m.to_string()))
        .set("state", pr.state.clone())
        .set("user", pr.user.as_ref().map(user_info))
        .set_list("assignees", pr.assignees.iter().map(user_info).collect())
        .set("repo", repo)
        .set("num_commits", pr.commits.map(|n| n.to_string()))
        .set("num_files_changed", pr.changed_files.map(|n| n.to_string()))
        .set_list(
            "labels",
            pr.labels.iter().map(|l| l.name.clone()).collect(),
        )
        .set("created_at", timestamp(pr.created_at))
        .set("updated_at", timestamp(pr.updated_at))
        .set("closed_at", timestamp(pr.closed_at))
        .set("merged_at", timestamp(pr.merged_at))
        .set("merged_by", pr.merged_by.as_ref().map(user_info));

    Ok(Document {
        id: html_url,
        size_bytes: blob.len() as u64,
        blob,
        source: DocumentSource::Github,
        semantic_identifier: format!("{}:{}", pr.number, name),
        extension: DOCUMENT_EXTENSION.to_string(),
        doc_updated_at: pr.updated_at,
        metadata: metadata.0,
        external_access: external_access.cloned(),
        primary_owners: Vec::new(),
        doc_metadata: BTreeMap::from([("repo".to_string(), repo.unwrap_or_default().to_string())]),
    })
}

/// Convert an issue. Issues without an update time are rejected.
pub fn issue_to_document(
    issue: &Issue,
    external_access: Option<&ExternalAccess>,
) -> Result<Document, ConversionError> {
    let missing = |field| ConversionError::MissingField {
        item: "issue",
        number: issue.number,
        field,
    };
    let html_url = issue.html_url.clone().ok_or_else(|| missing("html_url"))?;
    let updated_at = issue.updated_at.ok_or_else(|| missing("updated_at"))?;
    let repo = issue.repo_full_name();
    let blob = body_blob(issue.body.as_deref());
    let name = sanitize_filename(issue.title.as_deref(), "md");

    let mut metadata = Metadata::default();
    metadata
        .set("object_type", Some("Issue"))
        .set("id", Some(issue.number.to_string()))
        .set("state", issue.state.clone())
        .set("user", issue.user.as_ref().map(user_info))
        .set_list("assignees", issue.assignees.iter().map(user_info).collect())
        .set("repo", repo.clone())
        .set_list(
            "labels",
            issue.labels.iter().map(|l| l.name.clone()).collect(),
        )
        .set("created_at", timestamp(issue.created_at))
        .set("updated_at", timestamp(Some(updated_at)))
        .set("closed_at", timestamp(issue.closed_at))
        .set("closed_by", issue.closed_by.as_ref().map(user_info));

    Ok(Document {
        id: html_url,
        size_bytes: blob.len() as u64,
        blob,
        source: DocumentSource::Github,
        semantic_identifier: format!("{}:{}", issue.number, name),
        extension: DOCUMENT_EXTENSION.to_string(),
        doc_updated_at: Some(updated_at),
        metadata: metadata.0,
        external_access: external_access.cloned(),
        primary_owners: issue.user.iter().map(person).collect(),
        doc_metadata: BTreeMap::from([("repo".to_string(), repo.unwrap_or_default())]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pr() -> PullRequest {
        serde_json::from_value(serde_json::json!({
            "id": 1001,
            "number": 42,
            "html_url": "https://github.com/acme/widgets/pull/42",
            "title": "Fix: parser <edge> cases",
            "body": "Fixes the parser",
            "state": "closed",
            "user": { "login": "ada", "name": "Ada" },
            "assignees": [{ "login": "bob" }],
            "labels": [{ "name": "bug" }, { "name": "parser" }],
            "created_at": "2024-01-01T10:00:00Z",
            "updated_at": "2024-01-03T12:30:00Z",
            "closed_at": "2024-01-03T12:30:00Z",
            "merged_at": "2024-01-03T12:30:00Z",
            "merged": true,
            "commits": 3,
            "changed_files": 2,
            "merged_by": { "login": "carol" },
            "base": { "repo": { "full_name": "acme/widgets" } }
        }))
        .expect("pull request")
    }

    fn issue() -> Issue {
        serde_json::from_value(serde_json::json!({
            "id": 2002,
            "number": 7,
            "html_url": "https://github.com/acme/widgets/issues/7",
            "title": "Crash on start",
            "body": null,
            "state": "open",
            "user": { "login": "dan", "email": "dan@example.com" },
            "assignees": [],
            "labels": [],
            "created_at": "2024-02-01T00:00:00Z",
            "updated_at": "2024-02-02T00:00:00Z",
            "closed_at": null,
            "repository_url": "https://api.github.com/repos/acme/widgets"
        }))
        .expect("issue")
    }

    fn text(doc: &Document, key: &str) -> Option<String> {
        match doc.metadata.get(key) {
            Some(MetadataValue::Text(s)) => Some(s.clone()),
            _ => None,
        }
    }

    #[test]
    fn test_sanitize_filename_replaces_forbidden_characters() {
        assert_eq!(
            sanitize_filename(Some("  a/b\\c?d#e%f*g:h|i<j>k\"l  "), "md"),
            "a b c d e f g h i j k l.md"
        );
        assert_eq!(sanitize_filename(Some("many    spaces\there"), "md"), "many spaces here.md");
    }

    #[test]
    fn test_sanitize_filename_extension_rules() {
        assert_eq!(sanitize_filename(None, "md"), "file.md");
        assert_eq!(sanitize_filename(Some("notes.txt"), "md"), "notes.txt");
        assert_eq!(sanitize_filename(Some("Bump to v1.2"), "md"), "Bump to v1.2");
        assert_eq!(sanitize_filename(Some(".profile"), "md"), ".profile.md");
        assert_eq!(sanitize_filename(Some(""), "md"), ".md");
    }

    #[test]
    fn test_sanitize_filename_truncates_long_names() {
        let long = "x".repeat(250);
        let name = sanitize_filename(Some(&long), "md");
        assert_eq!(name, format!("{}.md", "x".repeat(180)));

        let with_ext = format!("{} .log", "y".repeat(250));
        let name = sanitize_filename(Some(&with_ext), "md");
        assert_eq!(name, format!("{}.log", "y".repeat(180)));
    }

    #[test]
    fn test_pull_request_to_document() {
        let access = ExternalAccess::empty();
        let doc = pull_request_to_document(&pr(), Some(&access)).expect("document");

        assert_eq!(doc.id, "https://github.com/acme/widgets/pull/42");
        assert_eq!(doc.semantic_identifier, "42:Fix parser edge cases.md");
        assert_eq!(doc.blob, b"Fixes the parser".to_vec());
        assert_eq!(doc.size_bytes, 16);
        assert_eq!(doc.extension, ".md");
        assert_eq!(doc.external_access, Some(access));
        assert_eq!(
            doc.doc_updated_at.map(|d| d.timestamp()),
            Some(1_704_285_000)
        );

        assert_eq!(text(&doc, "object_type").as_deref(), Some("PullRequest"));
        assert_eq!(text(&doc, "id").as_deref(), Some("42"));
        assert_eq!(text(&doc, "merged").as_deref(), Some("true"));
        assert_eq!(text(&doc, "num_commits").as_deref(), Some("3"));
        assert_eq!(text(&doc, "num_files_changed").as_deref(), Some("2"));
        assert_eq!(text(&doc, "repo").as_deref(), Some("acme/widgets"));
        assert_eq!(
            text(&doc, "user").as_deref(),
            Some(r#"{"login":"ada","name":"Ada"}"#)
        );
        assert_eq!(
            text(&doc, "merged_at").as_deref(),
            Some("2024-01-03T12:30:00Z")
        );
        assert_eq!(
            doc.metadata.get("labels"),
            Some(&MetadataValue::List(vec![
                "bug".to_string(),
                "parser".to_string()
            ]))
        );
        assert_eq!(
            doc.doc_metadata.get("repo").map(String::as_str),
            Some("acme/widgets")
        );
        assert!(doc.primary_owners.is_empty());
    }

    #[test]
    fn test_pull_request_omits_absent_values() {
        let mut pr = pr();
        pr.merged = None;
        pr.commits = None;
        pr.closed_at = None;
        pr.merged_by = None;
        pr.user = None;

        let doc = pull_request_to_document(&pr, None).expect("document");
        for key in ["merged", "num_commits", "closed_at", "merged_by", "user"] {
            assert!(!doc.metadata.contains_key(key), "{key} should be omitted");
        }
        assert!(doc.external_access.is_none());
    }

    #[test]
    fn test_pull_request_without_url_is_an_error() {
        let mut pr = pr();
        pr.html_url = None;
        let err = pull_request_to_document(&pr, None).expect_err("missing url");
        assert_eq!(
            err,
            ConversionError::MissingField {
                item: "pull request",
                number: 42,
                field: "html_url"
            }
        );
    }

    #[test]
    fn test_issue_to_document() {
        let doc = issue_to_document(&issue(), None).expect("document");

        assert_eq!(doc.semantic_identifier, "7:Crash on start.md");
        assert!(doc.blob.is_empty());
        assert_eq!(doc.size_bytes, 0);
        assert_eq!(text(&doc, "object_type").as_deref(), Some("Issue"));
        assert_eq!(text(&doc, "repo").as_deref(), Some("acme/widgets"));
        assert!(!doc.metadata.contains_key("merged"));
        assert!(!doc.metadata.contains_key("closed_by"));
        assert_eq!(
            doc.metadata.get("assignees"),
            Some(&MetadataValue::List(Vec::new()))
        );
        assert_eq!(doc.primary_owners.len(), 1);
        assert_eq!(doc.primary_owners[0].login, "dan");
        assert_eq!(
            doc.primary_owners[0].email.as_deref(),
            Some("dan@example.com")
        );
    }

    #[test]
    fn test_issue_without_update_time_is_an_error() {
        let mut issue = issue();
        issue.updated_at = None;
        assert!(matches!(
            issue_to_document(&issue, None),
            Err(ConversionError::MissingField {
                field: "updated_at",
                ..
            })
        ));
    }
}
