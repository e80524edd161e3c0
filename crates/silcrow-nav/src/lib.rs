//! # Silcrow Nav
//!
//! Client-side navigation engine built on [`silcrow_router`]:
//! - Loaders run in parallel for the routes a transition needs
//! - Actions run first for mutation submissions, then the page revalidates
//! - Fetchers load and submit beside navigation, keyed by the caller
//! - Deferred values commit with partial data and settle later
//! - Error boundaries catch loader and action failures at the nearest route
//!
//! ## Concurrency
//!
//! Starting a navigation cancels the pending one. Handlers get a
//! [`Cancellation`] token and are asked, not forced, to stop; their late
//! results are discarded. Only the most recent navigation ever commits, and
//! every commit publishes one complete [`RouterState`] snapshot.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use serde_json::json;
//! use silcrow_nav::{
//!     json, DataArgs, MemoryHistory, NavigateOptions, NavigationOutcome, Navigator,
//!     NavigatorConfig, Route, RouteExt,
//! };
//!
//! let routes = vec![Route::new("/")
//!     .with_id("root")
//!     .with_loader(|_args: DataArgs| async { json(json!({ "user": "ada" })) })
//!     .with_children(vec![Route::new("projects/:id")
//!         .with_id("project")
//!         .with_loader(|args: DataArgs| async move { json(json!({ "id": args.params["id"] })) })])];
//!
//! let runtime = tokio::runtime::Runtime::new().unwrap();
//! runtime.block_on(async {
//!     let history = Arc::new(MemoryHistory::default());
//!     let navigator = Navigator::new(routes, history, NavigatorConfig::default()).unwrap();
//!     navigator.initialize(None).await.unwrap();
//!
//!     let outcome = navigator
//!         .navigate("/projects/7", NavigateOptions::default())
//!         .await
//!         .unwrap();
//!     assert_eq!(outcome, NavigationOutcome::Committed);
//!
//!     let state = navigator.state();
//!     assert_eq!(state.location.pathname, "/projects/7");
//!     assert_eq!(state.loader_value("root"), Some(json!({ "user": "ada" })));
//!     assert_eq!(state.loader_value("project"), Some(json!({ "id": "7" })));
//! });
//! ```

// ============================================================================
// Module Declarations
// ============================================================================

mod cancel;
pub mod config;
mod data;
mod deferred;
mod error;
mod execution;
mod fetcher;
mod history;
mod location;
mod navigator;
mod revalidation;
mod routes;
mod store;
mod submission;

pub use cancel::Cancellation;
pub use config::{Config, NavigatorConfig};
pub use data::{
    defer, json, redirect, DataArgs, DataHandler, DataResponse, DataResult, ErrorResponse,
    Redirect, RouteData, RouteError,
};
pub use deferred::{DeferredData, DeferredError, DeferredHandle, DeferredValue};
pub use error::NavigatorError;
pub use fetcher::{FetchOptions, FetchOutcome};
pub use history::{
    create_key, History, HistoryAction, HistoryListener, HistoryUpdate, MemoryHistory, Unlisten,
};
pub use location::{resolve_to, Location, DEFAULT_LOCATION_KEY};
pub use navigator::{HydrationData, NavigateOptions, NavigationOutcome, Navigator, ROOT_ERROR_ID};
pub use revalidation::ShouldRevalidateArgs;
pub use routes::{Route, RouteExt, RouteHandlers, Routes, ShouldRevalidate};
pub use store::{
    Fetcher, FetcherState, Navigation, NavigationStore, RevalidationState, RouterState,
    Subscription,
};
pub use submission::{encode_search, has_naked_index, search_params, FormMethod, Submission, SubmissionBody};

pub use silcrow_router::{Params, RouteMatch};
