//! `Link` header parsing.

/// Links extracted from a `Link` response header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkPagination {
    /// URL of the next page (rel="next").
    pub next: Option<String>,
    /// URL of the last page (rel="last"). Cursor-paginated listings omit it.
    pub last: Option<String>,
}

/// Parse the Link header to extract pagination links.
///
/// GitHub Link headers look like:
/// `<https://api.github.com/repos/o/r/pulls?per_page=100&page=2>; rel="next", <...&page=3>; rel="last"`
///
/// Cursor-paginated listings carry an opaque `after=` token in the next URL
/// instead of a page number; the URL is returned untouched either way.
pub fn parse_link_header(link_header: &str) -> LinkPagination {
    let mut links = LinkPagination::default();

    for part in link_header.split(',') {
        let part = part.trim();

        let mut url = None;
        let mut rel = None;

        for segment in part.split(';') {
            let segment = segment.trim();
            if segment.starts_with('<') && segment.ends_with('>') && segment.len() >= 2 {
                url = Some(&segment[1..segment.len() - 1]);
            } else if let Some(rel_value) = segment.strip_prefix("rel=") {
                rel = Some(rel_value.trim_matches('"'));
            }
        }

        if let (Some(url), Some(rel_type)) = (url, rel) {
            // rel may hold several space-separated values
            for rel_type in rel_type.split_whitespace() {
                match rel_type {
                    "next" => links.next = Some(url.to_string()),
                    "last" => links.last = Some(url.to_string()),
                    _ => {}
                }
            }
        }
    }

    links
}
