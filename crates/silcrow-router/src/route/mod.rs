/// Route module for pattern compilation
///
/// Contains pure functional components for route parsing and scoring.
/// All modules follow functional programming principles:
/// - Pure functions (same input → same output)
/// - Immutable data structures
/// - Pattern matching for control flow

pub mod parser;
pub mod pattern;

// Re-export commonly used types
pub use parser::{
    compile_pattern, compute_score, explode_optional_segments, generate_path, CompiledPattern,
    Segment,
};
pub use pattern::{classify_segment, PatternSegmentType, SPLAT_PARAM};
