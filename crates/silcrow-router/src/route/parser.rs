/// Pattern compilation and specificity scoring for route paths
///
/// Pure parsers that turn a route path string into ordered segment
/// descriptors plus a comparable score.
/// All functions are **pure**: same input → same output, no side effects.
use std::collections::{HashMap, HashSet};

use super::pattern::{classify_segment, PatternSegmentType};
use crate::{GeneratePathError, RouteConfigError};

/// Weight of a static segment (`users`)
pub const STATIC_SEGMENT_VALUE: u32 = 10;
/// Weight of a dynamic segment (`:id`)
pub const DYNAMIC_SEGMENT_VALUE: u32 = 3;
/// Weight of the empty root segment (`/`)
pub const EMPTY_SEGMENT_VALUE: u32 = 1;
/// Bonus for index routes over their parent at the same path
pub const INDEX_ROUTE_VALUE: u32 = 2;
/// Offset placing every splat-free pattern above every splat pattern
pub const NON_SPLAT_TIER: u32 = 10_000;

/// A compiled, optional-free path segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Static(String),
    Dynamic(String),
    Splat(String),
}

/// A single concrete (optional-free) path pattern
///
/// Produced by [`compile_pattern`]. Validated on construction: a splat is
/// always last and no param name repeats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPattern {
    path: String,
    segments: Vec<Segment>,
}

/// Result of matching a compiled pattern against leading path segments
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SegmentMatch {
    pub params: Vec<(String, String)>,
    /// Path segments consumed, splat remainder included
    pub consumed: usize,
    /// Path segments bound by the splat
    pub splat_len: usize,
}

impl CompiledPattern {
    /// Parses one concrete pattern. Optional markers must already be exploded.
    pub(crate) fn parse(path: &str) -> Result<Self, RouteConfigError> {
        let raw: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut seen = HashSet::new();
        let mut segments = Vec::with_capacity(raw.len());

        for (position, segment) in raw.iter().enumerate() {
            let classified = classify_segment(segment);

            if let Some(name) = classified.param_name() {
                if name.is_empty() {
                    return Err(RouteConfigError::EmptyParamName {
                        path: path.to_string(),
                    });
                }
                if !seen.insert(name.to_string()) {
                    return Err(RouteConfigError::DuplicateParam {
                        path: path.to_string(),
                        name: name.to_string(),
                    });
                }
            }

            segments.push(match classified {
                PatternSegmentType::Splat(name) => {
                    if position + 1 != raw.len() {
                        return Err(RouteConfigError::SplatNotLast {
                            path: path.to_string(),
                        });
                    }
                    Segment::Splat(name)
                }
                PatternSegmentType::Required(name) | PatternSegmentType::Optional(name) => {
                    Segment::Dynamic(name)
                }
                PatternSegmentType::Static(text) | PatternSegmentType::OptionalStatic(text) => {
                    Segment::Static(text)
                }
            });
        }

        Ok(Self {
            path: path.to_string(),
            segments,
        })
    }

    /// The pattern text this was compiled from
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn has_splat(&self) -> bool {
        matches!(self.segments.last(), Some(Segment::Splat(_)))
    }

    /// Names of the params this pattern binds, in order
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Dynamic(name) | Segment::Splat(name) => Some(name.as_str()),
            Segment::Static(_) => None,
        })
    }

    /// Specificity score of this pattern
    pub fn score(&self, index: bool) -> u32 {
        compute_score(&self.segments, index)
    }

    /// Matches the pattern against the leading `path` segments
    ///
    /// With `end` set the pattern must consume every segment; otherwise
    /// trailing segments are left for child routes.
    pub(crate) fn match_segments(
        &self,
        path: &[String],
        case_sensitive: bool,
        end: bool,
    ) -> Option<SegmentMatch> {
        let mut params = Vec::new();

        for (position, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Splat(name) => {
                    let rest = path.get(position..).unwrap_or_default();
                    params.push((name.clone(), rest.join("/")));
                    return Some(SegmentMatch {
                        params,
                        consumed: position + rest.len(),
                        splat_len: rest.len(),
                    });
                }
                Segment::Dynamic(name) => {
                    let value = path.get(position)?;
                    params.push((name.clone(), value.clone()));
                }
                Segment::Static(text) => {
                    let value = path.get(position)?;
                    let equal = if case_sensitive {
                        text == value
                    } else {
                        text.eq_ignore_ascii_case(value)
                    };
                    if !equal {
                        return None;
                    }
                }
            }
        }

        let consumed = self.segments.len();
        if end && consumed != path.len() {
            return None;
        }

        Some(SegmentMatch {
            params,
            consumed,
            splat_len: 0,
        })
    }
}

/// Compiles a route path into one pattern per optional-segment variant
///
/// # Examples
///
/// ```
/// use silcrow_router::compile_pattern;
///
/// let variants = compile_pattern("/:lang?/about").unwrap();
/// let paths: Vec<&str> = variants.iter().map(|p| p.path()).collect();
/// assert_eq!(paths, vec!["/:lang/about", "/about"]);
///
/// assert!(compile_pattern("/files/*/edit").is_err());
/// assert!(compile_pattern("/:id/:id").is_err());
/// ```
pub fn compile_pattern(path: &str) -> Result<Vec<CompiledPattern>, RouteConfigError> {
    explode_optional_segments(path)
        .iter()
        .map(|variant| CompiledPattern::parse(variant))
        .collect()
}

/// Expands optional segments into every concrete path they describe
///
/// Variants that keep a segment come before variants that drop it, so
/// equal-score ties resolve toward the longer form.
///
/// # Examples
///
/// ```
/// use silcrow_router::explode_optional_segments;
///
/// assert_eq!(
///     explode_optional_segments("/:a?/b/:c?"),
///     vec!["/:a/b/:c", "/:a/b", "/b/:c", "/b"]
/// );
/// assert_eq!(explode_optional_segments("/:lang?"), vec!["/:lang", "/"]);
/// ```
pub fn explode_optional_segments(path: &str) -> Vec<String> {
    let absolute = path.starts_with('/');
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    explode(&segments)
        .into_iter()
        .map(|variant| {
            let joined = variant.join("/");
            if absolute {
                format!("/{}", joined)
            } else {
                joined
            }
        })
        .collect()
}

fn explode<'a>(segments: &[&'a str]) -> Vec<Vec<&'a str>> {
    let Some((first, rest)) = segments.split_first() else {
        return vec![Vec::new()];
    };

    let rest_variants = explode(rest);
    let (required, optional) = match first.strip_suffix('?') {
        Some(required) if !required.is_empty() => (required, true),
        _ => (*first, false),
    };

    let mut variants: Vec<Vec<&str>> = rest_variants
        .iter()
        .map(|variant| {
            let mut with_segment = Vec::with_capacity(variant.len() + 1);
            with_segment.push(required);
            with_segment.extend(variant.iter().copied());
            with_segment
        })
        .collect();

    if optional {
        variants.extend(rest_variants);
    }
    variants
}

/// Calculates specificity for ranking (pure function)
///
/// Higher is more specific. Static beats dynamic beats splat at the same
/// position; more segments beat fewer; an index route beats its parent; and
/// any splat pattern sits below every splat-free pattern.
///
/// # Examples
///
/// ```
/// use silcrow_router::{compile_pattern, compute_score};
///
/// let score = |path: &str| {
///     let pattern = &compile_pattern(path).unwrap()[0];
///     compute_score(pattern.segments(), false)
/// };
///
/// assert!(score("/users/new") > score("/users/:id"));
/// assert!(score("/:slug") > score("/docs/a/b/*"));
/// assert!(score("/a/:b") > score("/a"));
/// ```
pub fn compute_score(segments: &[Segment], index: bool) -> u32 {
    let has_splat = matches!(segments.last(), Some(Segment::Splat(_)));
    let tier = if has_splat { 0 } else { NON_SPLAT_TIER };
    let bonus = if index { INDEX_ROUTE_VALUE } else { 0 };

    if segments.is_empty() {
        return tier + 1 + EMPTY_SEGMENT_VALUE + bonus;
    }

    let weights: u32 = segments
        .iter()
        .map(|segment| match segment {
            Segment::Static(_) => STATIC_SEGMENT_VALUE,
            Segment::Dynamic(_) => DYNAMIC_SEGMENT_VALUE,
            Segment::Splat(_) => 0,
        })
        .sum();

    tier + segments.len() as u32 + weights + bonus
}

/// Generates a pathname by substituting params into a pattern
///
/// Values are percent-encoded, so matching the result yields them back.
/// Optional params that are missing are dropped, a missing splat becomes
/// empty, and a missing required param is an error.
///
/// # Examples
///
/// ```
/// use silcrow_router::generate_path;
/// use std::collections::HashMap;
///
/// let mut params = HashMap::new();
/// params.insert("id".to_string(), "123".to_string());
///
/// assert_eq!(generate_path("/users/:id", &params).unwrap(), "/users/123");
/// assert_eq!(generate_path("/users/:id/:tab?", &params).unwrap(), "/users/123");
/// assert!(generate_path("/posts/:slug", &params).is_err());
/// ```
pub fn generate_path(
    pattern: &str,
    params: &HashMap<String, String>,
) -> Result<String, GeneratePathError> {
    let segments = pattern
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|segment| match classify_segment(segment) {
            PatternSegmentType::Required(name) => params
                .get(&name)
                .map(|value| urlencoding::encode(value).into_owned())
                .ok_or(GeneratePathError::MissingParam(name)),
            PatternSegmentType::Optional(name) => Ok(params
                .get(&name)
                .map(|value| urlencoding::encode(value).into_owned())
                .unwrap_or_default()),
            PatternSegmentType::Splat(name) => Ok(params
                .get(&name)
                .map(|value| encode_splat(value))
                .unwrap_or_default()),
            PatternSegmentType::Static(text) | PatternSegmentType::OptionalStatic(text) => Ok(text),
        })
        .collect::<Result<Vec<String>, _>>()?;

    let filtered: Vec<String> = segments.into_iter().filter(|s| !s.is_empty()).collect();

    Ok(if filtered.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", filtered.join("/"))
    })
}

/// Splat values keep their slashes; each piece between them is encoded
fn encode_splat(value: &str) -> String {
    value
        .split('/')
        .map(|piece| urlencoding::encode(piece).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned(segments: &[&str]) -> Vec<String> {
        segments.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_static() {
        let pattern = CompiledPattern::parse("/about").unwrap();
        assert_eq!(pattern.segments(), &[Segment::Static("about".to_string())]);
        assert!(!pattern.has_splat());
    }

    #[test]
    fn test_parse_dynamic() {
        let pattern = CompiledPattern::parse("users/:id").unwrap();
        assert_eq!(
            pattern.segments(),
            &[
                Segment::Static("users".to_string()),
                Segment::Dynamic("id".to_string())
            ]
        );
        assert_eq!(pattern.param_names().collect::<Vec<_>>(), vec!["id"]);
    }

    #[test]
    fn test_parse_splat_last() {
        let pattern = CompiledPattern::parse("/docs/*").unwrap();
        assert!(pattern.has_splat());
    }

    #[test]
    fn test_parse_rejects_inner_splat() {
        assert_eq!(
            CompiledPattern::parse("/docs/*/edit"),
            Err(RouteConfigError::SplatNotLast {
                path: "/docs/*/edit".to_string()
            })
        );
    }

    #[test]
    fn test_parse_rejects_duplicate_param() {
        assert_eq!(
            CompiledPattern::parse("/:id/posts/:id"),
            Err(RouteConfigError::DuplicateParam {
                path: "/:id/posts/:id".to_string(),
                name: "id".to_string()
            })
        );
    }

    #[test]
    fn test_parse_rejects_empty_param() {
        assert!(matches!(
            CompiledPattern::parse("/users/:"),
            Err(RouteConfigError::EmptyParamName { .. })
        ));
    }

    #[test]
    fn test_explode_without_optionals() {
        assert_eq!(explode_optional_segments("/users/:id"), vec!["/users/:id"]);
        assert_eq!(explode_optional_segments(""), vec![""]);
        assert_eq!(explode_optional_segments("/"), vec!["/"]);
    }

    #[test]
    fn test_explode_optional_static() {
        assert_eq!(
            explode_optional_segments("posts/edit?"),
            vec!["posts/edit", "posts"]
        );
    }

    #[test]
    fn test_match_segments_prefix_and_end() {
        let pattern = CompiledPattern::parse("users").unwrap();
        let path = owned(&["users", "42"]);

        let prefix = pattern.match_segments(&path, false, false).unwrap();
        assert_eq!(prefix.consumed, 1);
        assert!(pattern.match_segments(&path, false, true).is_none());
    }

    #[test]
    fn test_match_segments_case_sensitivity() {
        let pattern = CompiledPattern::parse("About").unwrap();
        let path = owned(&["about"]);
        assert!(pattern.match_segments(&path, false, true).is_some());
        assert!(pattern.match_segments(&path, true, true).is_none());
    }

    #[test]
    fn test_match_segments_splat_binds_remainder() {
        let pattern = CompiledPattern::parse("files/*").unwrap();
        let path = owned(&["files", "a", "b.txt"]);
        let matched = pattern.match_segments(&path, false, true).unwrap();
        assert_eq!(matched.params, vec![("*".to_string(), "a/b.txt".to_string())]);
        assert_eq!(matched.consumed, 3);
        assert_eq!(matched.splat_len, 2);
    }

    #[test]
    fn test_match_segments_splat_may_be_empty() {
        let pattern = CompiledPattern::parse("files/*").unwrap();
        let matched = pattern
            .match_segments(&owned(&["files"]), false, true)
            .unwrap();
        assert_eq!(matched.params, vec![("*".to_string(), String::new())]);
    }

    #[test]
    fn test_score_ordering() {
        let score = |path: &str| CompiledPattern::parse(path).unwrap().score(false);

        assert!(score("/users/new") > score("/users/:id"));
        assert!(score("/users/:id") > score("/users/*"));
        assert!(score("/:a") > score("/a/b/c/d/*"));
        assert!(score("/a/b/*") > score("/a/*"));
        assert_eq!(score("/"), NON_SPLAT_TIER + 2);
    }

    #[test]
    fn test_index_bonus() {
        let pattern = CompiledPattern::parse("/dashboard").unwrap();
        assert_eq!(pattern.score(true), pattern.score(false) + INDEX_ROUTE_VALUE);
    }

    #[test]
    fn test_generate_path_splat_and_optional_static() {
        let mut params = HashMap::new();
        params.insert("*".to_string(), "guides/intro".to_string());
        assert_eq!(generate_path("/docs/*", &params).unwrap(), "/docs/guides/intro");
        assert_eq!(generate_path("/posts/edit?", &params).unwrap(), "/posts/edit");
        assert_eq!(generate_path("/", &params).unwrap(), "/");
    }

    #[test]
    fn test_generate_path_encodes_values() {
        let mut params = HashMap::new();
        params.insert("id".to_string(), "a%20b".to_string());
        params.insert("q".to_string(), "x?y#z".to_string());
        params.insert("*".to_string(), "my docs/a b".to_string());
        assert_eq!(generate_path("/users/:id", &params).unwrap(), "/users/a%2520b");
        assert_eq!(generate_path("/search/:q?", &params).unwrap(), "/search/x%3Fy%23z");
        assert_eq!(generate_path("/files/*", &params).unwrap(), "/files/my%20docs/a%20b");
    }
}
