//! Helpers for extracting the RTSP path of a request URI.

use super::message::Uri;

/// Path and query of `uri` with the leading slash removed, joined by `?`
/// when a query is present. Returns `None` when the URI has no absolute
/// path (e.g. `*`).
pub fn path_and_query(uri: &Uri) -> Option<String> {
    let path = uri.path();
    let path = path.strip_prefix('/')?;
    Some(match uri.query() {
        Some(query) if !query.is_empty() => format!("{path}?{query}"),
        _ => path.to_string(),
    })
}

/// Split `path?query` into its parts. The query is empty when absent.
pub fn split_query(path_and_query: &str) -> (&str, &str) {
    path_and_query
        .split_once('?')
        .unwrap_or((path_and_query, ""))
}

#[cfg(test)]
mod tests {
    use super::{path_and_query, split_query};

    #[test]
    fn path_and_query_strips_leading_slash() {
        let uri = "rtsp://example.com/live/cam1?quality=high".parse().unwrap();
        assert_eq!(
            path_and_query(&uri).as_deref(),
            Some("live/cam1?quality=high")
        );
    }

    #[test]
    fn path_and_query_without_query() {
        let uri = "rtsp://example.com:8554/live".parse().unwrap();
        assert_eq!(path_and_query(&uri).as_deref(), Some("live"));
    }

    #[test]
    fn path_and_query_rejects_asterisk() {
        let uri = "*".parse().unwrap();
        assert_eq!(path_and_query(&uri), None);
    }

    #[test]
    fn split() {
        assert_eq!(split_query("a/b?c=d"), ("a/b", "c=d"));
        assert_eq!(split_query("a/b"), ("a/b", ""));
    }
}
