use silcrow_router::RouteConfigError;
use thiserror::Error;

/// Failures of the navigator itself
///
/// Loader and action failures are not errors here: they are committed into
/// the snapshot as route errors.
#[derive(Debug, Error)]
pub enum NavigatorError {
    #[error("navigator has been disposed")]
    Disposed,

    #[error("invalid route configuration: {0}")]
    Routes(#[from] RouteConfigError),
}
