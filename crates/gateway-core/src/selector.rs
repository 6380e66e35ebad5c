//! Parsing of the client's location selector.
//!
//! A client names the locations it wants either with `?location=a,b` or as the
//! first path segment (`/a,b`). The query parameter wins when both are given.

use crate::location::normalize_name;

/// Location used when a client does not name any.
pub const DEFAULT_LOCATION: &str = "default";

/// Split a raw selector into normalized, de-duplicated location names.
///
/// Entries are split on `,`, trimmed and lower-cased; empty entries are
/// dropped. If nothing remains the result is `[DEFAULT_LOCATION]`. Request
/// order is preserved.
pub fn parse_selector(raw: Option<&str>) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for part in raw.unwrap_or_default().split(',') {
        let name = normalize_name(part);
        if !name.is_empty() && !names.contains(&name) {
            names.push(name);
        }
    }
    if names.is_empty() {
        names.push(DEFAULT_LOCATION.to_string());
    }
    names
}

/// First non-empty segment of a request path, if any.
pub fn first_path_segment(path: &str) -> Option<&str> {
    path.split('/').find(|segment| !segment.trim().is_empty())
}

/// Resolve the requested locations from an optional query value and the
/// request path.
pub fn resolve_selector(query: Option<&str>, path: &str) -> Vec<String> {
    let raw = query
        .filter(|q| !q.trim().is_empty())
        .or_else(|| first_path_segment(path));
    parse_selector(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_location() {
        assert_eq!(parse_selector(Some("north")), vec!["north"]);
    }

    #[test]
    fn multiple_locations_split_trim_lowercase() {
        assert_eq!(
            parse_selector(Some(" North , SOUTH ")),
            vec!["north", "south"]
        );
    }

    #[test]
    fn empty_entries_dropped() {
        assert_eq!(parse_selector(Some(",north,,")), vec!["north"]);
    }

    #[test]
    fn nothing_defaults() {
        assert_eq!(parse_selector(None), vec![DEFAULT_LOCATION]);
        assert_eq!(parse_selector(Some("")), vec![DEFAULT_LOCATION]);
        assert_eq!(parse_selector(Some(" , ,")), vec![DEFAULT_LOCATION]);
    }

    #[test]
    fn duplicates_collapse_in_request_order() {
        assert_eq!(
            parse_selector(Some("south,north,SOUTH")),
            vec!["south", "north"]
        );
    }

    #[test]
    fn first_segment_of_path() {
        assert_eq!(first_path_segment("/north"), Some("north"));
        assert_eq!(first_path_segment("/north,south/extra"), Some("north,south"));
        assert_eq!(first_path_segment("//north"), Some("north"));
        assert_eq!(first_path_segment("/"), None);
        assert_eq!(first_path_segment(""), None);
    }

    #[test]
    fn query_wins_over_path() {
        assert_eq!(resolve_selector(Some("south"), "/north"), vec!["south"]);
    }

    #[test]
    fn blank_query_falls_back_to_path() {
        assert_eq!(resolve_selector(Some("  "), "/north"), vec!["north"]);
        assert_eq!(resolve_selector(None, "/north,south"), vec!["north", "south"]);
    }

    #[test]
    fn root_path_without_query_defaults() {
        assert_eq!(resolve_selector(None, "/"), vec![DEFAULT_LOCATION]);
    }
}
