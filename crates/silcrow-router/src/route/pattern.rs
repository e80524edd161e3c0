/// Segment classification for route path patterns
///
/// Pure parsing of a single path segment into a typed descriptor.
/// All functions are **pure**: same input → same output, no side effects.

/// Param key used for an unnamed splat (`*`)
pub const SPLAT_PARAM: &str = "*";

/// Represents the different kinds of segment a route path may contain
///
/// # Examples
///
/// ```
/// use silcrow_router::route::pattern::{classify_segment, PatternSegmentType};
///
/// assert!(matches!(classify_segment("about"), PatternSegmentType::Static(_)));
/// assert!(matches!(classify_segment(":id"), PatternSegmentType::Required(_)));
/// assert!(matches!(classify_segment(":id?"), PatternSegmentType::Optional(_)));
/// assert!(matches!(classify_segment("edit?"), PatternSegmentType::OptionalStatic(_)));
/// assert!(matches!(classify_segment("*"), PatternSegmentType::Splat(_)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternSegmentType {
    /// Splat segment: `*` or `*rest`
    Splat(String),
    /// Optional parameter: `:id?`
    Optional(String),
    /// Required parameter: `:id`
    Required(String),
    /// Optional static segment: `edit?`
    OptionalStatic(String),
    /// Static text segment
    Static(String),
}

impl PatternSegmentType {
    /// Whether this segment may be absent from a matching pathname
    pub fn is_optional(&self) -> bool {
        matches!(
            self,
            PatternSegmentType::Optional(_) | PatternSegmentType::OptionalStatic(_)
        )
    }

    /// Parameter name bound by this segment, if any
    pub fn param_name(&self) -> Option<&str> {
        match self {
            PatternSegmentType::Splat(name)
            | PatternSegmentType::Optional(name)
            | PatternSegmentType::Required(name) => Some(name),
            PatternSegmentType::OptionalStatic(_) | PatternSegmentType::Static(_) => None,
        }
    }
}

/// Classifies a segment into a pattern type (pure function)
///
/// # Parsing Rules (evaluated in order)
///
/// 1. **Splat**: `*` (bound as `*`) or `*name`
/// 2. **Optional param**: `:name?`
/// 3. **Required param**: `:name`
/// 4. **Optional static**: `text?`
/// 5. **Static**: any other text
pub fn classify_segment(segment: &str) -> PatternSegmentType {
    if let Some(name) = segment.strip_prefix('*') {
        let name = if name.is_empty() { SPLAT_PARAM } else { name };
        return PatternSegmentType::Splat(name.to_string());
    }

    match segment.strip_prefix(':') {
        Some(param) => match param.strip_suffix('?') {
            Some(name) => PatternSegmentType::Optional(name.to_string()),
            None => PatternSegmentType::Required(param.to_string()),
        },
        None => match segment.strip_suffix('?') {
            Some(text) if !text.is_empty() => PatternSegmentType::OptionalStatic(text.to_string()),
            _ => PatternSegmentType::Static(segment.to_string()),
        },
    }
}
