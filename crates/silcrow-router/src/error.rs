/// Errors raised while building a route tree or generating paths
///
/// Route trees are validated once, at construction time. A tree that builds
/// successfully never fails at match time.
use thiserror::Error;

/// A route definition that cannot be compiled into a matchable branch
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteConfigError {
    /// `*` appeared somewhere other than the final segment of a joined path
    #[error("splat segment must be the last segment in `{path}`")]
    SplatNotLast { path: String },

    /// The same parameter name is bound twice along one branch
    #[error("parameter `{name}` appears more than once in `{path}`")]
    DuplicateParam { path: String, name: String },

    /// `:` or `:?` with no name
    #[error("empty parameter name in `{path}`")]
    EmptyParamName { path: String },

    /// Two routes share an id
    #[error("route id `{0}` is used by more than one route")]
    DuplicateRouteId(String),

    /// Index routes are leaves
    #[error("index route `{0}` cannot have children")]
    IndexWithChildren(String),

    /// An absolute child path must start with the path of its parent
    #[error("absolute route path `{path}` is not nested under its parent path `{parent}`")]
    AbsoluteChildPath { path: String, parent: String },
}

/// Failure to substitute params into a pattern
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeneratePathError {
    #[error("missing required parameter `{0}`")]
    MissingParam(String),
}
