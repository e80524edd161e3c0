//! Shared fixtures for the navigator integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use silcrow_nav::*;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Records which handlers ran, in order
#[derive(Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, name: impl Into<String>) {
        self.calls.lock().unwrap().push(name.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == name).count()
    }

    pub fn counts(&self) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for call in self.calls.lock().unwrap().iter() {
            *counts.entry(call.clone()).or_insert(0) += 1;
        }
        counts
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }
}

/// Loader that records its route id, waits `delay_ms`, then returns the
/// route id, pathname and params
pub fn loader(log: &CallLog, delay_ms: u64) -> impl DataHandler + 'static {
    let log = log.clone();
    move |args: DataArgs| {
        let log = log.clone();
        async move {
            log.record(args.route_id.clone());
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            json(json!({
                "route": args.route_id,
                "pathname": args.location.pathname,
                "params": args.params,
            }))
        }
    }
}

/// Loader that records its route id and returns a fixed value
pub fn value_loader(log: &CallLog, value: Value) -> impl DataHandler + 'static {
    let log = log.clone();
    move |args: DataArgs| {
        let log = log.clone();
        let value = value.clone();
        async move {
            log.record(args.route_id);
            json(value)
        }
    }
}

/// Loader failing with `status` after `delay_ms`
pub fn failing_loader(log: &CallLog, status: u16, delay_ms: u64) -> impl DataHandler + 'static {
    let log = log.clone();
    move |args: DataArgs| {
        let log = log.clone();
        async move {
            log.record(args.route_id);
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            let result: DataResult = Err(ErrorResponse::new(status, "Loader Failed").into());
            result
        }
    }
}

/// Loader raising a redirect to `to`
pub fn redirecting_loader(log: &CallLog, to: &'static str) -> impl DataHandler + 'static {
    let log = log.clone();
    move |args: DataArgs| {
        let log = log.clone();
        async move {
            log.record(args.route_id);
            let result: DataResult = Err(Redirect::new(to).into());
            result
        }
    }
}

/// Action that records `action:<route id>` and echoes the submitted form
pub fn echo_action(log: &CallLog, delay_ms: u64) -> impl DataHandler + 'static {
    let log = log.clone();
    move |args: DataArgs| {
        let log = log.clone();
        async move {
            log.record(format!("action:{}", args.route_id));
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            let title = args
                .submission
                .as_ref()
                .and_then(|s| s.field("title"))
                .unwrap_or_default()
                .to_string();
            json(json!({ "saved": title }))
        }
    }
}

/// A small app:
///
/// ```text
/// /                  root (boundary)
/// ├── (index)        home
/// ├── login          login
/// ├── protected      protected -> redirects to /login
/// ├── projects       projects
/// │   ├── (index)    projects-index
/// │   └── :id        project (boundary, action)
/// │       └── tasks  tasks
/// └── settings       settings (opts out of revalidation)
/// ```
pub fn app_routes(log: &CallLog) -> Vec<Route> {
    vec![Route::new("/")
        .with_id("root")
        .with_error_boundary(true)
        .with_loader(loader(log, 10))
        .with_children(vec![
            Route::index().with_id("home").with_loader(loader(log, 10)),
            Route::new("login").with_id("login").with_loader(loader(log, 5)),
            Route::new("protected")
                .with_id("protected")
                .with_loader(redirecting_loader(log, "/login")),
            Route::new("projects")
                .with_id("projects")
                .with_loader(loader(log, 20))
                .with_children(vec![
                    Route::index()
                        .with_id("projects-index")
                        .with_loader(loader(log, 5)),
                    Route::new(":id")
                        .with_id("project")
                        .with_error_boundary(true)
                        .with_loader(loader(log, 30))
                        .with_action(echo_action(log, 15))
                        .with_child(Route::new("tasks").with_id("tasks").with_loader(loader(log, 5))),
                ]),
            Route::new("settings")
                .with_id("settings")
                .with_loader(loader(log, 5))
                .with_should_revalidate(|_| false),
        ])]
}

/// A navigator over `routes` at `start`, already initialized
pub async fn navigator_at(routes: Vec<Route>, start: &str) -> (Navigator, MemoryHistory) {
    init_tracing();
    let history = MemoryHistory::new([start]);
    let navigator = Navigator::new(routes, Arc::new(history.clone()), NavigatorConfig::default())
        .expect("valid routes");
    navigator.initialize(None).await.expect("initialized");
    (navigator, history)
}

pub fn route_ids(state: &RouterState) -> Vec<String> {
    state.matches.iter().map(|m| m.route_id.clone()).collect()
}

/// Lets spawned tasks run until paused time has advanced `ms`
pub async fn settle(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}
