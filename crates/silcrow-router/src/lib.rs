//! # Silcrow Router
//!
//! Declarative route-tree matching with support for:
//! - Static routes (`/about`)
//! - Dynamic parameters (`/users/:id`)
//! - Optional segments (`/:lang?/about`, `/posts/edit?`)
//! - Splat routes (`/docs/*`, `/files/*path`)
//! - Nested layouts, path-less layouts and index routes
//!
//! ## Ranking
//!
//! A route tree is flattened into every root-to-leaf branch it can produce.
//! Each branch is scored once, at construction time, and branches are tried
//! from most to least specific:
//! - static segments outrank dynamic segments, which outrank splats
//! - deeper branches outrank shallower ones of equal specificity
//! - any branch ending in a splat ranks below every branch without one
//! - equal scores keep declaration order
//!
//! ## Path Normalization
//!
//! Handles common user mistakes gracefully:
//! - Trailing slashes: `/path/` → `/path`
//! - Double slashes: `/path//to` → `/path/to`
//! - Backslashes: `\path\to` → `/path/to`
//!
//! Param values are percent-decoded.
//!
//! ## Example
//!
//! ```
//! use silcrow_router::{RouteDefinition, RouteTree};
//!
//! let routes: Vec<RouteDefinition> = vec![RouteDefinition::new("/")
//!     .with_id("root")
//!     .with_children(vec![
//!         RouteDefinition::index().with_id("home"),
//!         RouteDefinition::new("dashboard")
//!             .with_id("dashboard")
//!             .with_child(RouteDefinition::index().with_id("overview"))
//!             .with_child(RouteDefinition::new(":tab").with_id("tab")),
//!         RouteDefinition::new("*").with_id("not-found"),
//!     ])];
//!
//! let tree = RouteTree::new(routes).unwrap();
//!
//! let ids = |path: &str| -> Vec<String> {
//!     tree.match_routes(path)
//!         .unwrap()
//!         .into_iter()
//!         .map(|m| m.route_id)
//!         .collect()
//! };
//!
//! assert_eq!(ids("/"), vec!["root", "home"]);
//! assert_eq!(ids("/dashboard"), vec!["root", "dashboard", "overview"]);
//! assert_eq!(ids("/dashboard/reports"), vec!["root", "dashboard", "tab"]);
//! assert_eq!(ids("/anything/else"), vec!["root", "not-found"]);
//! ```

use std::collections::HashMap;

// ============================================================================
// Module Declarations
// ============================================================================

mod error;
mod matcher;
pub mod path;
pub mod route;
mod tree;

pub use error::{GeneratePathError, RouteConfigError};
pub use matcher::{match_path, PathMatch, RouteMatch};
pub use path::{is_valid_path, normalize_path};
pub use route::{
    classify_segment, compile_pattern, compute_score, explode_optional_segments, generate_path,
    CompiledPattern, PatternSegmentType, Segment, SPLAT_PARAM,
};
pub use tree::{RouteBranch, RouteDefinition, RouteNode, RouteTree};

/// Param values bound by a match, keyed by param name (`*` for a bare splat)
pub type Params = HashMap<String, String>;
