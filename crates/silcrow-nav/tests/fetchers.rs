//! Integration tests for fetchers
//!
//! Covers:
//! - Keyed loads and their lifecycle
//! - Supersession and deletion while in flight
//! - Fetcher submissions and the revalidation they trigger
//! - Fetcher revalidation opt-in and opt-out
//! - Fetcher redirects

mod common;

use std::sync::{Arc, Mutex};

use common::*;
use pretty_assertions::assert_eq;
use serde_json::json;
use silcrow_nav::*;

// ============================================================================
// Loads
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_fetch_load_stores_data_without_navigating() {
    let log = CallLog::new();
    let (navigator, history) = navigator_at(app_routes(&log), "/").await;

    let outcome = navigator
        .fetch("preview", "/projects/5", FetchOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome, FetchOutcome::Completed);
    let fetcher = navigator.fetcher("preview");
    assert_eq!(fetcher.state, FetcherState::Idle);
    assert_eq!(
        fetcher.data,
        Some(json!({ "route": "project", "pathname": "/projects/5", "params": { "id": "5" } }))
    );
    assert_eq!(fetcher.error, None);

    let state = navigator.state();
    assert_eq!(state.location.pathname, "/");
    assert_eq!(history.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_fetch_load_goes_loading_then_idle() {
    let log = CallLog::new();
    let (navigator, _) = navigator_at(app_routes(&log), "/").await;

    let states = Arc::new(Mutex::new(Vec::new()));
    let sink = states.clone();
    let _subscription = navigator.subscribe(move |state| {
        if let Some(fetcher) = state.fetchers.get("preview") {
            sink.lock().unwrap().push(fetcher.state);
        }
    });

    navigator
        .fetch("preview", "/login", FetchOptions::default())
        .await
        .unwrap();

    assert_eq!(*states.lock().unwrap(), vec![FetcherState::Loading, FetcherState::Idle]);
}

#[tokio::test(start_paused = true)]
async fn test_fetch_unmatched_href_stores_not_found() {
    let log = CallLog::new();
    let (navigator, _) = navigator_at(app_routes(&log), "/").await;

    let outcome = navigator
        .fetch("missing", "/nope", FetchOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome, FetchOutcome::NotFound);
    let fetcher = navigator.fetcher("missing");
    assert_eq!(fetcher.state, FetcherState::Idle);
    assert_eq!(fetcher.error.as_ref().map(RouteError::status), Some(404));
    assert!(navigator.state().errors.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_fetch_loader_error_is_stored_on_the_fetcher() {
    let log = CallLog::new();
    let routes = vec![Route::new("/")
        .with_id("root")
        .with_error_boundary(true)
        .with_child(
            Route::new("broken")
                .with_id("broken")
                .with_loader(failing_loader(&log, 500, 5)),
        )];
    let (navigator, _) = navigator_at(routes, "/").await;

    let outcome = navigator
        .fetch("f", "/broken", FetchOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome, FetchOutcome::Failed);
    let fetcher = navigator.fetcher("f");
    assert_eq!(fetcher.data, None);
    assert_eq!(fetcher.error.as_ref().map(RouteError::status), Some(500));
    assert!(navigator.state().errors.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_unknown_fetcher_reads_idle() {
    let log = CallLog::new();
    let (navigator, _) = navigator_at(app_routes(&log), "/").await;

    assert_eq!(navigator.fetcher("never-used"), Fetcher::default());
}

// ============================================================================
// Supersession and deletion
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_newer_fetch_with_same_key_supersedes() {
    let log = CallLog::new();
    let (navigator, _) = navigator_at(app_routes(&log), "/").await;

    let first = tokio::spawn({
        let navigator = navigator.clone();
        async move {
            navigator
                .fetch("panel", "/projects/1", FetchOptions::default())
                .await
        }
    });
    settle(1).await;

    let second = navigator
        .fetch("panel", "/login", FetchOptions::default())
        .await
        .unwrap();

    assert_eq!(second, FetchOutcome::Completed);
    assert_eq!(first.await.unwrap().unwrap(), FetchOutcome::Superseded);

    settle(100).await;
    let fetcher = navigator.fetcher("panel");
    assert_eq!(
        fetcher.data,
        Some(json!({ "route": "login", "pathname": "/login", "params": {} }))
    );
}

#[tokio::test(start_paused = true)]
async fn test_different_keys_run_independently() {
    let log = CallLog::new();
    let (navigator, _) = navigator_at(app_routes(&log), "/").await;

    let (a, b) = tokio::join!(
        navigator.fetch("a", "/projects/1", FetchOptions::default()),
        navigator.fetch("b", "/projects/2", FetchOptions::default()),
    );

    assert_eq!(a.unwrap(), FetchOutcome::Completed);
    assert_eq!(b.unwrap(), FetchOutcome::Completed);
    assert_eq!(navigator.fetcher("a").data.unwrap()["params"]["id"], "1");
    assert_eq!(navigator.fetcher("b").data.unwrap()["params"]["id"], "2");
}

#[tokio::test(start_paused = true)]
async fn test_delete_in_flight_discards_result() {
    let log = CallLog::new();
    let (navigator, _) = navigator_at(app_routes(&log), "/").await;

    let pending = tokio::spawn({
        let navigator = navigator.clone();
        async move {
            navigator
                .fetch("panel", "/projects/1", FetchOptions::default())
                .await
        }
    });
    settle(1).await;
    assert_eq!(navigator.fetcher("panel").state, FetcherState::Loading);

    navigator.delete_fetcher("panel");

    assert_eq!(pending.await.unwrap().unwrap(), FetchOutcome::Deleted);
    settle(100).await;
    assert!(!navigator.state().fetchers.contains_key("panel"));
}

// ============================================================================
// Submissions
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_fetch_submit_runs_action_and_revalidates_page() {
    let log = CallLog::new();
    let (navigator, _) = navigator_at(app_routes(&log), "/projects/7").await;
    log.clear();

    let outcome = navigator
        .fetch(
            "rename",
            "/projects/9",
            FetchOptions::submit(Submission::post_form("/projects/9", [("title", "Renamed")])),
        )
        .await
        .unwrap();

    assert_eq!(outcome, FetchOutcome::Completed);
    assert_eq!(log.calls()[0], "action:project");
    assert_eq!(log.count("root"), 1);
    assert_eq!(log.count("projects"), 1);
    assert_eq!(log.count("project"), 1);

    let state = navigator.state();
    assert_eq!(state.location.pathname, "/projects/7");
    assert!(state.navigation.is_idle());
    assert_eq!(state.revalidation, RevalidationState::Idle);
    assert!(state.action_data.is_none());

    let fetcher = state.fetcher("rename");
    assert_eq!(fetcher.state, FetcherState::Idle);
    assert_eq!(fetcher.data, Some(json!({ "saved": "Renamed" })));
}

#[tokio::test(start_paused = true)]
async fn test_fetch_submit_passes_through_submitting_and_loading() {
    let log = CallLog::new();
    let (navigator, _) = navigator_at(app_routes(&log), "/projects/7").await;

    let states = Arc::new(Mutex::new(Vec::new()));
    let sink = states.clone();
    let _subscription = navigator.subscribe(move |state| {
        if let Some(fetcher) = state.fetchers.get("rename") {
            let mut states = sink.lock().unwrap();
            if states.last() != Some(&fetcher.state) {
                states.push(fetcher.state);
            }
        }
    });

    navigator
        .fetch(
            "rename",
            "/projects/7",
            FetchOptions::submit(Submission::post_form("/projects/7", [("title", "x")])),
        )
        .await
        .unwrap();

    assert_eq!(
        *states.lock().unwrap(),
        vec![FetcherState::Submitting, FetcherState::Loading, FetcherState::Idle]
    );
}

#[tokio::test(start_paused = true)]
async fn test_fetch_submit_without_action_fails_with_405() {
    let log = CallLog::new();
    let (navigator, _) = navigator_at(app_routes(&log), "/").await;
    log.clear();

    let outcome = navigator
        .fetch(
            "prefs",
            "/settings",
            FetchOptions::submit(Submission::post_form("/settings", [("theme", "dark")])),
        )
        .await
        .unwrap();

    assert_eq!(outcome, FetchOutcome::Failed);
    assert_eq!(
        navigator.fetcher("prefs").error.as_ref().map(RouteError::status),
        Some(405)
    );
    assert!(log.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_fetch_submit_respects_route_opt_out() {
    let log = CallLog::new();
    let (navigator, _) = navigator_at(app_routes(&log), "/settings").await;
    log.clear();

    navigator
        .fetch(
            "rename",
            "/projects/1",
            FetchOptions::submit(Submission::post_form("/projects/1", [("title", "x")])),
        )
        .await
        .unwrap();

    assert_eq!(log.count("root"), 1);
    assert_eq!(log.count("settings"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_fetch_submit_during_navigation_replans_without_cancelling() {
    let log = CallLog::new();
    let (navigator, _) = navigator_at(app_routes(&log), "/").await;
    log.clear();

    let navigation = tokio::spawn({
        let navigator = navigator.clone();
        async move {
            navigator
                .navigate("/projects/3", NavigateOptions::default())
                .await
        }
    });
    settle(1).await;

    let outcome = navigator
        .fetch(
            "quick-edit",
            "/projects/3",
            FetchOptions::submit(Submission::post_form("/projects/3", [("title", "edited")])),
        )
        .await
        .unwrap();
    assert_eq!(outcome, FetchOutcome::Completed);

    assert_eq!(navigation.await.unwrap().unwrap(), NavigationOutcome::Committed);

    // First plan: projects and project. After the mutation: everything.
    assert_eq!(log.count("action:project"), 1);
    assert_eq!(log.count("root"), 1);
    assert_eq!(log.count("projects"), 2);
    assert_eq!(log.count("project"), 2);

    let state = navigator.state();
    assert_eq!(state.location.pathname, "/projects/3");
    let fetcher = state.fetcher("quick-edit");
    assert_eq!(fetcher.state, FetcherState::Idle);
    assert_eq!(fetcher.data, Some(json!({ "saved": "edited" })));
}

#[tokio::test(start_paused = true)]
async fn test_fetch_submit_during_failing_action_still_revalidates() {
    let log = CallLog::new();
    let routes = vec![Route::new("/")
        .with_id("root")
        .with_error_boundary(true)
        .with_loader(loader(&log, 5))
        .with_children(vec![
            Route::new("form").with_id("form").with_action(failing_loader(&log, 400, 50)),
            Route::new("other").with_id("other").with_action(echo_action(&log, 5)),
        ])];
    let (navigator, _) = navigator_at(routes, "/").await;
    log.clear();

    let navigation = tokio::spawn({
        let navigator = navigator.clone();
        async move {
            navigator
                .submit(Submission::post_form("/form", [("title", "bad")]))
                .await
        }
    });
    settle(1).await;

    let outcome = navigator
        .fetch(
            "side",
            "/other",
            FetchOptions::submit(Submission::post_form("/other", [("title", "ok")])),
        )
        .await
        .unwrap();
    assert_eq!(outcome, FetchOutcome::Completed);
    assert_eq!(navigator.fetcher("side").state, FetcherState::Loading);

    assert_eq!(navigation.await.unwrap().unwrap(), NavigationOutcome::Committed);

    // The failed action skipped loaders, so the fetcher's mutation reloads
    // root in a revalidation of its own
    assert_eq!(log.calls(), vec!["form", "action:other", "root"]);

    let state = navigator.state();
    assert_eq!(state.location.pathname, "/form");
    assert_eq!(state.revalidation, RevalidationState::Idle);
    let fetcher = state.fetcher("side");
    assert_eq!(fetcher.state, FetcherState::Idle);
    assert_eq!(fetcher.data, Some(json!({ "saved": "ok" })));

    settle(100).await;
    assert_eq!(log.count("root"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_fetch_submit_before_action_redirect_reloads_target() {
    let log = CallLog::new();
    let routes = vec![Route::new("/")
        .with_id("root")
        .with_loader(loader(&log, 5))
        .with_children(vec![
            Route::new("slow").with_id("slow").with_action(|_args: DataArgs| async {
                tokio::time::sleep(std::time::Duration::from_millis(40)).await;
                let result: DataResult = Err(Redirect::new("/done").into());
                result
            }),
            Route::new("other").with_id("other").with_action(echo_action(&log, 5)),
            Route::new("done").with_id("done"),
        ])];
    let (navigator, _) = navigator_at(routes, "/").await;
    log.clear();

    let navigation = tokio::spawn({
        let navigator = navigator.clone();
        async move {
            navigator
                .submit(Submission::post_form("/slow", [("title", "a")]))
                .await
        }
    });
    settle(1).await;

    navigator
        .fetch(
            "side",
            "/other",
            FetchOptions::submit(Submission::post_form("/other", [("title", "b")])),
        )
        .await
        .unwrap();
    assert_eq!(navigation.await.unwrap().unwrap(), NavigationOutcome::Committed);

    assert_eq!(navigator.state().location.pathname, "/done");
    assert_eq!(log.calls(), vec!["action:other", "root"]);
    assert_eq!(navigator.fetcher("side").state, FetcherState::Idle);
}

// ============================================================================
// Revalidation of loaded fetchers
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_loaded_fetcher_reloads_with_its_route() {
    let log = CallLog::new();
    let (navigator, _) = navigator_at(app_routes(&log), "/projects/5").await;
    navigator
        .fetch("sidebar", "/projects/1", FetchOptions::default())
        .await
        .unwrap();
    log.clear();

    navigator
        .navigate("/projects/6", NavigateOptions::default())
        .await
        .unwrap();

    // One call for the page, one for the fetcher
    assert_eq!(log.count("project"), 2);
    let fetcher = navigator.fetcher("sidebar");
    assert_eq!(fetcher.state, FetcherState::Idle);
    assert_eq!(fetcher.data.unwrap()["pathname"], "/projects/1");
}

#[tokio::test(start_paused = true)]
async fn test_fetcher_opt_out_is_honored() {
    let log = CallLog::new();
    let (navigator, _) = navigator_at(app_routes(&log), "/projects/5").await;
    navigator
        .fetch(
            "sidebar",
            "/projects/1",
            FetchOptions::default().without_revalidation(),
        )
        .await
        .unwrap();
    log.clear();

    navigator
        .navigate("/projects/6", NavigateOptions::default())
        .await
        .unwrap();
    navigator.revalidate().await.unwrap();

    // Page loads only: the navigation and the forced revalidation
    assert_eq!(log.count("project"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_explicit_revalidation_reloads_fetchers() {
    let log = CallLog::new();
    let (navigator, _) = navigator_at(app_routes(&log), "/").await;
    navigator
        .fetch("login-preview", "/login", FetchOptions::default())
        .await
        .unwrap();
    log.clear();

    navigator.revalidate().await.unwrap();

    assert_eq!(log.count("login"), 1);
    assert_eq!(log.count("root"), 1);
    assert_eq!(log.count("home"), 1);
    assert_eq!(navigator.fetcher("login-preview").state, FetcherState::Idle);
}

// ============================================================================
// Redirects
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_fetch_redirect_navigates() {
    let log = CallLog::new();
    let (navigator, history) = navigator_at(app_routes(&log), "/").await;

    let outcome = navigator
        .fetch("guard", "/protected", FetchOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome, FetchOutcome::Redirected);
    let state = navigator.state();
    assert_eq!(state.location.pathname, "/login");
    assert_eq!(history.location().pathname, "/login");
    assert_eq!(state.fetcher("guard"), Fetcher::default());
}
