//! Pathname helpers shared by the compiler and the matcher: canonical
//! form, joining, splitting, decoding and relative resolution.

use std::borrow::Cow;

/// Whether `path` is already a canonical pathname
///
/// Canonical pathnames are rooted, use forward slashes only, carry no empty
/// segments and have no trailing slash. `/` is the one exception to the
/// last rule.
///
/// ```
/// use silcrow_router::path::is_valid_path;
///
/// assert!(is_valid_path("/"));
/// assert!(is_valid_path("/projects/7/tasks"));
/// assert!(!is_valid_path(""));
/// assert!(!is_valid_path("projects"));
/// assert!(!is_valid_path("/projects/"));
/// assert!(!is_valid_path("/projects//7"));
/// assert!(!is_valid_path("/projects\\7"));
/// ```
pub fn is_valid_path(path: &str) -> bool {
    if !path.starts_with('/') || path.contains("//") || path.contains('\\') {
        return false;
    }
    path == "/" || !path.ends_with('/')
}

/// Brings a pathname into canonical form before matching
///
/// Backslashes become slashes, empty segments are dropped and a leading
/// slash is added. Canonical input is borrowed as-is.
///
/// ```
/// use silcrow_router::path::normalize_path;
/// use std::borrow::Cow;
///
/// assert!(matches!(normalize_path("/projects"), Cow::Borrowed("/projects")));
/// assert_eq!(normalize_path("/projects/7/"), "/projects/7");
/// assert_eq!(normalize_path("\\projects\\7"), "/projects/7");
/// assert_eq!(normalize_path("projects//7"), "/projects/7");
/// assert_eq!(normalize_path(""), "/");
/// ```
pub fn normalize_path(path: &str) -> Cow<'_, str> {
    if is_valid_path(path) {
        return Cow::Borrowed(path);
    }

    let segments: Vec<&str> = path
        .split(['/', '\\'])
        .filter(|segment| !segment.is_empty())
        .collect();
    if segments.is_empty() {
        return Cow::Borrowed("/");
    }
    Cow::Owned(format!("/{}", segments.join("/")))
}

/// Joins a parent path and a child path into one canonical path
///
/// # Examples
///
/// ```
/// use silcrow_router::path::join_paths;
///
/// assert_eq!(join_paths("/users", ":id"), "/users/:id");
/// assert_eq!(join_paths("/", ""), "/");
/// assert_eq!(join_paths("", "about"), "/about");
/// ```
pub fn join_paths(parent: &str, child: &str) -> String {
    normalize_path(&format!("{}/{}", parent, child)).into_owned()
}

/// Splits a pathname into percent-decoded segments
///
/// Segments that fail to decode as UTF-8 are kept verbatim.
///
/// # Examples
///
/// ```
/// use silcrow_router::path::split_path;
///
/// assert_eq!(split_path("/users/john%20doe/"), vec!["users", "john doe"]);
/// assert!(split_path("/").is_empty());
/// ```
pub fn split_path(pathname: &str) -> Vec<String> {
    normalize_path(pathname)
        .split('/')
        .filter(|s| !s.is_empty())
        .map(decode_segment)
        .collect()
}

/// Percent-decodes one segment, keeping it verbatim if it is not valid UTF-8
pub fn decode_segment(segment: &str) -> String {
    match urlencoding::decode(segment) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => segment.to_string(),
    }
}

/// Resolves `to` against `from`, honoring `.` and `..`
///
/// An absolute `to` ignores `from`. `..` never climbs above the root.
///
/// # Examples
///
/// ```
/// use silcrow_router::path::resolve_path;
///
/// assert_eq!(resolve_path("edit", "/users/1"), "/users/1/edit");
/// assert_eq!(resolve_path("../2", "/users/1"), "/users/2");
/// assert_eq!(resolve_path("/about", "/users/1"), "/about");
/// assert_eq!(resolve_path("../../..", "/a"), "/");
/// ```
pub fn resolve_path(to: &str, from: &str) -> String {
    if to.starts_with('/') {
        return normalize_path(to).into_owned();
    }

    let resolved = to
        .split('/')
        .filter(|s| !s.is_empty())
        .fold(
            from.split('/')
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>(),
            |mut acc, segment| {
                match segment {
                    "." => {}
                    ".." => {
                        acc.pop();
                    }
                    other => acc.push(other),
                }
                acc
            },
        );

    format!("/{}", resolved.join("/"))
}

/// Strips `basename` from the front of `pathname`
///
/// Returns `None` when the pathname lies outside the basename. The
/// comparison is case-insensitive and must end on a segment boundary.
///
/// # Examples
///
/// ```
/// use silcrow_router::path::strip_basename;
///
/// assert_eq!(strip_basename("/app/users", "/app").as_deref(), Some("/users"));
/// assert_eq!(strip_basename("/app", "/app").as_deref(), Some("/"));
/// assert_eq!(strip_basename("/application", "/app"), None);
/// assert_eq!(strip_basename("/users", "/").as_deref(), Some("/users"));
/// ```
pub fn strip_basename<'a>(pathname: &'a str, basename: &str) -> Option<Cow<'a, str>> {
    let basename = normalize_path(basename);
    if basename == "/" {
        return Some(Cow::Borrowed(pathname));
    }

    let prefix = pathname.get(..basename.len())?;
    if !prefix.eq_ignore_ascii_case(&basename) {
        return None;
    }

    let rest = &pathname[basename.len()..];
    match rest.chars().next() {
        None => Some(Cow::Borrowed("/")),
        Some('/') => Some(Cow::Borrowed(rest)),
        Some(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_borrowed_when_valid() {
        assert!(matches!(normalize_path("/"), Cow::Borrowed("/")));
        assert!(matches!(
            normalize_path("/users/123"),
            Cow::Borrowed("/users/123")
        ));
    }

    #[test]
    fn test_normalize_path_user_mistakes() {
        assert_eq!(normalize_path("/path//to///page/"), "/path/to/page");
        assert_eq!(normalize_path("users"), "/users");
        assert_eq!(normalize_path("///"), "/");
    }

    #[test]
    fn test_join_paths_nested() {
        assert_eq!(join_paths("/", "/"), "/");
        assert_eq!(join_paths("/dashboard", ""), "/dashboard");
        assert_eq!(join_paths("/dashboard/", "/settings"), "/dashboard/settings");
    }

    #[test]
    fn test_split_path_keeps_undecodable_segment() {
        assert_eq!(split_path("/a/%FF"), vec!["a", "%FF"]);
    }

    #[test]
    fn test_resolve_path_dot_segments() {
        assert_eq!(resolve_path("./settings", "/dashboard"), "/dashboard/settings");
        assert_eq!(resolve_path("", "/dashboard"), "/dashboard");
    }

    #[test]
    fn test_strip_basename_case_insensitive() {
        assert_eq!(strip_basename("/APP/x", "/app").as_deref(), Some("/x"));
        assert_eq!(strip_basename("/other", "/app"), None);
        assert_eq!(strip_basename("/ap", "/app"), None);
    }
}
