/// Branch matching: turning a ranked branch into a root-to-leaf match chain
use std::cmp::Reverse;

use crate::path::{decode_segment, normalize_path};
use crate::route::compile_pattern;
use crate::tree::{RouteBranch, RouteNode};
use crate::{Params, RouteConfigError};

/// One route bound to concrete params at a resolved pathname
///
/// A match chain is ordered root to leaf. `params` holds every param bound by
/// this route and its ancestors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub route_id: String,
    pub params: Params,
    /// Pathname prefix consumed up to and including this route
    pub pathname: String,
    /// Same as `pathname` without the part bound by a splat
    pub pathname_base: String,
}

/// Result of [`match_path`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMatch {
    /// The concrete pattern variant that matched
    pub pattern: String,
    pub params: Params,
    pub pathname: String,
    pub pathname_base: String,
}

/// Pathname split once per match operation
pub(crate) struct SplitPathname<'a> {
    raw: Vec<&'a str>,
    decoded: Vec<String>,
}

impl<'a> SplitPathname<'a> {
    pub(crate) fn new(normalized: &'a str) -> Self {
        let raw: Vec<&str> = normalized.split('/').filter(|s| !s.is_empty()).collect();
        let decoded = raw.iter().map(|segment| decode_segment(segment)).collect();
        Self { raw, decoded }
    }

    fn prefix(&self, len: usize) -> String {
        format!("/{}", self.raw[..len].join("/"))
    }
}

/// Matches every link of `branch` in order; the last link must consume the
/// whole pathname.
pub(crate) fn match_branch<H>(
    branch: &RouteBranch,
    nodes: &[RouteNode<H>],
    pathname: &SplitPathname<'_>,
    default_case_sensitive: bool,
) -> Option<Vec<RouteMatch>> {
    let last = branch.links.len().saturating_sub(1);
    let mut params = Params::new();
    let mut offset = 0;
    let mut matches = Vec::with_capacity(branch.links.len());

    for (position, link) in branch.links.iter().enumerate() {
        let node = nodes.get(link.node)?;
        let case_sensitive = node.case_sensitive().unwrap_or(default_case_sensitive);
        let matched = link.pattern.match_segments(
            &pathname.decoded[offset..],
            case_sensitive,
            position == last,
        )?;

        params.extend(matched.params);
        let end = offset + matched.consumed;

        matches.push(RouteMatch {
            route_id: node.id().to_string(),
            params: params.clone(),
            pathname: pathname.prefix(end),
            pathname_base: pathname.prefix(end - matched.splat_len),
        });
        offset = end;
    }

    Some(matches)
}

/// Matches a single pattern against a pathname, without a route tree
///
/// Optional segments are expanded and the most specific variant that
/// consumes the whole pathname wins. Matching is case-insensitive.
///
/// # Examples
///
/// ```
/// use silcrow_router::match_path;
///
/// let matched = match_path("/users/:id/:tab?", "/users/42").unwrap().unwrap();
/// assert_eq!(matched.params.get("id"), Some(&"42".to_string()));
/// assert_eq!(matched.pattern, "/users/:id");
///
/// let docs = match_path("/docs/*", "/docs/a/b").unwrap().unwrap();
/// assert_eq!(docs.params.get("*"), Some(&"a/b".to_string()));
/// assert_eq!(docs.pathname_base, "/docs");
///
/// assert!(match_path("/users/:id", "/posts/1").unwrap().is_none());
/// ```
pub fn match_path(pattern: &str, pathname: &str) -> Result<Option<PathMatch>, RouteConfigError> {
    let mut variants = compile_pattern(pattern)?;
    variants.sort_by_key(|variant| Reverse(variant.score(false)));

    let normalized = normalize_path(pathname);
    let split = SplitPathname::new(&normalized);

    Ok(variants.iter().find_map(|variant| {
        let matched = variant.match_segments(&split.decoded, false, true)?;
        Some(PathMatch {
            pattern: variant.path().to_string(),
            params: matched.params.into_iter().collect(),
            pathname: split.prefix(matched.consumed),
            pathname_base: split.prefix(matched.consumed - matched.splat_len),
        })
    }))
}
