//! Route payloads: the loader, action and revalidation predicate of a route.

use std::fmt;
use std::sync::Arc;

use silcrow_router::{RouteDefinition, RouteTree};

use crate::data::DataHandler;
use crate::revalidation::ShouldRevalidateArgs;

pub type ShouldRevalidate = Arc<dyn Fn(&ShouldRevalidateArgs) -> bool + Send + Sync>;

/// Handlers attached to one route
#[derive(Clone, Default)]
pub struct RouteHandlers {
    pub loader: Option<Arc<dyn DataHandler>>,
    pub action: Option<Arc<dyn DataHandler>>,
    pub should_revalidate: Option<ShouldRevalidate>,
}

impl fmt::Debug for RouteHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteHandlers")
            .field("loader", &self.loader.is_some())
            .field("action", &self.action.is_some())
            .field("should_revalidate", &self.should_revalidate.is_some())
            .finish()
    }
}

/// A route definition carrying data handlers
pub type Route = RouteDefinition<RouteHandlers>;

/// A compiled tree of [`Route`]s
pub type Routes = RouteTree<RouteHandlers>;

/// Builder methods for attaching handlers to a [`Route`]
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use silcrow_nav::{json, DataArgs, Route, RouteExt};
///
/// let route = Route::new("users/:id")
///     .with_loader(|args: DataArgs| async move {
///         json(json!({ "id": args.params.get("id") }))
///     })
///     .with_should_revalidate(|args| args.default_should_revalidate);
///
/// assert!(route.handle.loader.is_some());
/// assert!(route.handle.action.is_none());
/// ```
pub trait RouteExt {
    fn with_loader<H: DataHandler + 'static>(self, loader: H) -> Self;
    fn with_action<H: DataHandler + 'static>(self, action: H) -> Self;
    fn with_should_revalidate<F>(self, predicate: F) -> Self
    where
        F: Fn(&ShouldRevalidateArgs) -> bool + Send + Sync + 'static;
}

impl RouteExt for Route {
    fn with_loader<H: DataHandler + 'static>(mut self, loader: H) -> Self {
        self.handle.loader = Some(Arc::new(loader));
        self
    }

    fn with_action<H: DataHandler + 'static>(mut self, action: H) -> Self {
        self.handle.action = Some(Arc::new(action));
        self
    }

    fn with_should_revalidate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&ShouldRevalidateArgs) -> bool + Send + Sync + 'static,
    {
        self.handle.should_revalidate = Some(Arc::new(predicate));
        self
    }
}
