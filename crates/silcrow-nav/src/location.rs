//! Locations: parsed `pathname?search#hash` values plus per-entry state.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use silcrow_router::path::{normalize_path, resolve_path};

/// Key of the entry a history starts on
pub const DEFAULT_LOCATION_KEY: &str = "default";

/// One history entry
///
/// `search` is empty or starts with `?`; `hash` is empty or starts with `#`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub pathname: String,
    pub search: String,
    pub hash: String,
    pub state: Option<Value>,
    pub key: String,
}

impl Location {
    /// Parses an href into a location with the default key
    ///
    /// # Examples
    ///
    /// ```
    /// use silcrow_nav::Location;
    ///
    /// let location = Location::parse("/users/1?tab=posts#top");
    /// assert_eq!(location.pathname, "/users/1");
    /// assert_eq!(location.search, "?tab=posts");
    /// assert_eq!(location.hash, "#top");
    /// assert_eq!(location.href(), "/users/1?tab=posts#top");
    /// ```
    pub fn parse(href: &str) -> Self {
        let parts = split_href(href);
        Self {
            pathname: normalize_path(parts.pathname).into_owned(),
            search: normalize_prefixed(parts.search, '?'),
            hash: normalize_prefixed(parts.hash, '#'),
            state: None,
            key: DEFAULT_LOCATION_KEY.to_string(),
        }
    }

    pub fn with_state(mut self, state: Option<Value>) -> Self {
        self.state = state;
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// `pathname + search + hash`
    pub fn href(&self) -> String {
        format!("{}{}{}", self.pathname, self.search, self.hash)
    }

    /// `pathname + search`, the part loaders care about
    pub fn path_and_search(&self) -> String {
        format!("{}{}", self.pathname, self.search)
    }

    /// Whether moving to `next` only changes (or re-targets) the hash
    pub fn is_hash_change_only(&self, next: &Location) -> bool {
        self.pathname == next.pathname && self.search == next.search && !next.hash.is_empty()
    }
}

impl Default for Location {
    fn default() -> Self {
        Self::parse("/")
    }
}

/// Resolves `to` against the current location
///
/// Relative pathnames resolve against `from.pathname`; a bare `?search`
/// keeps the pathname; a bare `#hash` keeps the pathname and search.
///
/// # Examples
///
/// ```
/// use silcrow_nav::{resolve_to, Location};
///
/// let from = Location::parse("/users/1?tab=posts");
/// assert_eq!(resolve_to("edit", &from).href(), "/users/1/edit");
/// assert_eq!(resolve_to("../2", &from).href(), "/users/2");
/// assert_eq!(resolve_to("?tab=likes", &from).href(), "/users/1?tab=likes");
/// assert_eq!(resolve_to("#bio", &from).href(), "/users/1?tab=posts#bio");
/// ```
pub fn resolve_to(to: &str, from: &Location) -> Location {
    let parts = split_href(to);

    if parts.pathname.is_empty() {
        let search = if parts.search.is_empty() {
            from.search.clone()
        } else {
            normalize_prefixed(parts.search, '?')
        };
        return Location {
            pathname: from.pathname.clone(),
            search,
            hash: normalize_prefixed(parts.hash, '#'),
            ..Location::default()
        };
    }

    Location {
        pathname: resolve_path(parts.pathname, &from.pathname),
        search: normalize_prefixed(parts.search, '?'),
        hash: normalize_prefixed(parts.hash, '#'),
        ..Location::default()
    }
}

struct HrefParts<'a> {
    pathname: &'a str,
    search: &'a str,
    hash: &'a str,
}

fn split_href(href: &str) -> HrefParts<'_> {
    let (rest, hash) = match href.find('#') {
        Some(index) => href.split_at(index),
        None => (href, ""),
    };
    let (pathname, search) = match rest.find('?') {
        Some(index) => rest.split_at(index),
        None => (rest, ""),
    };
    HrefParts {
        pathname,
        search,
        hash,
    }
}

/// `"?"` and `"#"` alone are treated as empty
fn normalize_prefixed(value: &str, prefix: char) -> String {
    match value.strip_prefix(prefix) {
        Some("") => String::new(),
        Some(_) => value.to_string(),
        None if value.is_empty() => String::new(),
        None => format!("{}{}", prefix, value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_pathname_only() {
        let location = Location::parse("/about/");
        assert_eq!(location.pathname, "/about");
        assert_eq!(location.search, "");
        assert_eq!(location.hash, "");
        assert_eq!(location.key, DEFAULT_LOCATION_KEY);
    }

    #[test]
    fn test_parse_empty_markers() {
        let location = Location::parse("/a?#");
        assert_eq!(location.href(), "/a");
    }

    #[test]
    fn test_parse_hash_containing_question_mark() {
        let location = Location::parse("/a#b?c");
        assert_eq!(location.search, "");
        assert_eq!(location.hash, "#b?c");
    }

    #[test]
    fn test_hash_change_only() {
        let current = Location::parse("/a?x=1");
        assert!(current.is_hash_change_only(&Location::parse("/a?x=1#top")));
        assert!(!current.is_hash_change_only(&Location::parse("/a?x=2#top")));
        assert!(!Location::parse("/a#top").is_hash_change_only(&Location::parse("/a")));
    }

    #[test]
    fn test_resolve_absolute() {
        let from = Location::parse("/users/1");
        let resolved = resolve_to("/login?next=%2Fusers", &from);
        assert_eq!(resolved.pathname, "/login");
        assert_eq!(resolved.search, "?next=%2Fusers");
    }
}
