//! The navigator: sequences navigations, runs their handlers and commits
//! snapshots to the store.
//!
//! Every navigation gets a sequence number. Starting a new one cancels the
//! pending one; a navigation whose number is no longer current never
//! commits. The control lock guards sequencing and fetcher bookkeeping and
//! is never held across an await.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use silcrow_router::path::join_paths;
use silcrow_router::RouteMatch;
use tracing::{debug, info, warn};

use crate::cancel::Cancellation;
use crate::config::NavigatorConfig;
use crate::data::{DataArgs, ErrorResponse, HandlerOutcome, Redirect, RouteData, RouteError};
use crate::error::NavigatorError;
use crate::execution::{self, FetcherCall, LoadResults, LoaderCall};
use crate::history::{create_key, History, HistoryAction, HistoryUpdate, Unlisten};
use crate::location::{resolve_to, Location};
use crate::revalidation::{fetchers_to_revalidate, matches_to_load, FetchLoad, RevalidationInput};
use crate::routes::{Route, Routes};
use crate::store::{
    FetcherState, Navigation, NavigationStore, RevalidationState, RouterState, Subscription,
};
use crate::submission::{has_naked_index, Submission};

/// Error key used when no route can host an error
pub const ROOT_ERROR_ID: &str = "__root__";

#[derive(Debug, Clone, Default)]
pub struct NavigateOptions {
    /// Replace the current history entry instead of pushing
    pub replace: bool,
    pub state: Option<Value>,
    pub submission: Option<Submission>,
    /// Reload every matched loader, whatever their predicates say
    pub revalidate: bool,
}

impl NavigateOptions {
    pub fn replace() -> Self {
        Self {
            replace: true,
            ..Self::default()
        }
    }

    pub fn submit(submission: Submission) -> Self {
        Self {
            submission: Some(submission),
            ..Self::default()
        }
    }

    pub fn with_state(mut self, state: Value) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_replace(mut self, replace: bool) -> Self {
        self.replace = replace;
        self
    }

    pub fn with_revalidate(mut self, revalidate: bool) -> Self {
        self.revalidate = revalidate;
        self
    }
}

/// How a navigation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NavigationOutcome {
    /// A snapshot for the final location was committed
    Committed,
    /// Nothing matched; a 404 was committed
    NotFound,
    /// A newer navigation (or disposal) took over before commit
    Superseded,
}

/// Data rendered ahead of time, used to skip the initial load
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HydrationData {
    #[serde(default)]
    pub loader_data: HashMap<String, Value>,
    #[serde(default)]
    pub action_data: Option<HashMap<String, Value>>,
    #[serde(default)]
    pub errors: Option<HashMap<String, RouteError>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IntentKind {
    /// User or history driven; updates history on commit
    Navigate,
    /// Reload at the current location; navigation stays idle
    Revalidate,
    /// First load after startup; only fills in missing data
    Initial,
}

#[derive(Debug, Clone)]
pub(crate) struct Intent {
    pub kind: IntentKind,
    pub location: Location,
    pub action: HistoryAction,
    pub submission: Option<Submission>,
    pub force: bool,
    /// Give way to a running navigation instead of superseding it
    pub yields: bool,
    pub redirects: usize,
}

impl Intent {
    pub(crate) fn navigate(location: Location, action: HistoryAction) -> Self {
        Self {
            kind: IntentKind::Navigate,
            location,
            action,
            submission: None,
            force: false,
            yields: false,
            redirects: 0,
        }
    }

    pub(crate) fn revalidate(state: &RouterState) -> Self {
        Self {
            kind: IntentKind::Revalidate,
            location: state.location.clone(),
            action: state.history_action,
            submission: None,
            force: false,
            yields: false,
            redirects: 0,
        }
    }
}

struct PendingNavigation {
    id: u64,
    kind: IntentKind,
    location: Location,
    action: HistoryAction,
    submission: Option<Submission>,
    cancellation: Cancellation,
    /// `mutation_epoch` as of the last loader plan
    planned_epoch: u64,
}

/// Owner of one fetcher's in-flight request
pub(crate) struct FetchController {
    pub seq: u64,
    pub cancellation: Cancellation,
    /// Set when the request is a revalidation run by that navigation
    pub revalidation_of: Option<u64>,
}

#[derive(Default)]
pub(crate) struct Control {
    sequence: u64,
    pending: Option<PendingNavigation>,
    pub revalidation_required: bool,
    /// Bumped by fetcher mutations that land while a navigation is pending
    pub mutation_epoch: u64,
    pub fetch_seq: u64,
    pub fetch_controllers: HashMap<String, FetchController>,
    /// Sequence of the latest `fetch` call per key
    pub fetch_owners: HashMap<String, u64>,
    pub fetch_loads: HashMap<String, FetchLoad>,
    /// Loading fetchers that go idle with the next commit
    pub fetch_reloads: HashSet<String>,
    /// Set by a commit that skipped a mutation's reload
    revalidate_after_commit: bool,
    pub disposed: bool,
}

impl Control {
    pub(crate) fn is_navigating(&self) -> bool {
        self.pending.is_some()
    }

    pub(crate) fn next_fetch_seq(&mut self) -> u64 {
        self.fetch_seq += 1;
        self.fetch_seq
    }

    /// Cancels and forgets the request in flight for `key`
    pub(crate) fn abort_fetch(&mut self, key: &str) {
        if let Some(controller) = self.fetch_controllers.remove(key) {
            controller.cancellation.cancel();
        }
    }
}

pub(crate) struct Inner {
    pub routes: Routes,
    pub history: Arc<dyn History>,
    pub store: NavigationStore,
    pub config: NavigatorConfig,
    control: Mutex<Control>,
    unlisten: Mutex<Option<Unlisten>>,
}

enum Step {
    Done(NavigationOutcome),
    Redirect { id: u64, from: Intent, next: Intent },
}

/// Client-side navigation engine
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Navigator {
    pub(crate) inner: Arc<Inner>,
}

impl Navigator {
    /// Builds the navigator and its initial snapshot at the history's location
    ///
    /// Nothing runs until [`initialize`](Self::initialize).
    pub fn new(
        routes: Vec<Route>,
        history: Arc<dyn History>,
        config: NavigatorConfig,
    ) -> Result<Self, NavigatorError> {
        let routes = Routes::new(routes)?.with_case_sensitivity(config.case_sensitive);
        let location = history.location();

        let state = match routes.match_routes_with_basename(&location.pathname, &config.basename) {
            Some(matches) => {
                let initialized = !matches.iter().any(|m| has_loader(&routes, &m.route_id));
                let mut state = RouterState::new(location, matches);
                state.initialized = initialized;
                state
            }
            None => {
                let (matches, errors) = not_found(&routes, &location.pathname);
                let mut state = RouterState::new(location, matches);
                state.errors = Some(errors);
                state.initialized = true;
                state
            }
        };

        info!(
            routes = routes.routes().count(),
            basename = %config.basename,
            "navigator created"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                routes,
                history,
                store: NavigationStore::new(state),
                config,
                control: Mutex::new(Control::default()),
                unlisten: Mutex::new(None),
            }),
        })
    }

    /// Starts listening to history and loads the initial location
    ///
    /// With hydration data covering every matched loader the initial load is
    /// skipped; otherwise only routes lacking data are loaded.
    pub async fn initialize(
        &self,
        hydration: Option<HydrationData>,
    ) -> Result<NavigationOutcome, NavigatorError> {
        self.listen()?;

        if let Some(hydration) = hydration {
            if self.hydrate(hydration) {
                info!("navigator hydrated");
                return Ok(NavigationOutcome::Committed);
            }
        }

        let state = self.state();
        if state.initialized {
            return Ok(NavigationOutcome::Committed);
        }

        self.start(Intent {
            kind: IntentKind::Initial,
            ..Intent::navigate(state.location.clone(), HistoryAction::Pop)
        })
        .await
    }

    /// Navigates to `to`, resolved against the current location
    ///
    /// Absolute paths are resolved under the configured basename. A
    /// submission with a mutation method runs the target route's action
    /// first; a GET submission becomes the search string.
    pub async fn navigate(
        &self,
        to: &str,
        options: NavigateOptions,
    ) -> Result<NavigationOutcome, NavigatorError> {
        let current = self.state();
        let mut location = self
            .resolve(to, &current.location)
            .with_state(options.state)
            .with_key(create_key());

        if let Some(submission) = options.submission.as_ref().filter(|s| !s.method.is_mutation()) {
            location.search = submission.get_search(&location.search);
        }

        let action = if options.replace
            || (options.submission.is_none() && location.href() == current.location.href())
        {
            HistoryAction::Replace
        } else {
            HistoryAction::Push
        };

        info!(pathname = %location.pathname, action = ?action, "navigate");
        self.start(Intent {
            submission: options.submission,
            force: options.revalidate,
            ..Intent::navigate(location, action)
        })
        .await
    }

    /// Submits to `submission.action`
    pub async fn submit(&self, submission: Submission) -> Result<NavigationOutcome, NavigatorError> {
        let action = submission.action.clone();
        self.navigate(&action, NavigateOptions::submit(submission)).await
    }

    /// Reloads the current location's loaders, ignoring opt-outs
    ///
    /// During a navigation the pending navigation is restarted instead.
    pub async fn revalidate(&self) -> Result<NavigationOutcome, NavigatorError> {
        let intent = {
            let control = self.lock_control();
            if control.disposed {
                return Err(NavigatorError::Disposed);
            }
            match &control.pending {
                Some(pending) if pending.kind != IntentKind::Revalidate => Intent {
                    kind: pending.kind,
                    submission: pending.submission.clone().filter(|s| !s.method.is_mutation()),
                    force: true,
                    ..Intent::navigate(pending.location.clone(), pending.action)
                },
                _ => Intent {
                    force: true,
                    ..Intent::revalidate(&self.state())
                },
            }
        };

        info!(pathname = %intent.location.pathname, "revalidating");
        self.start(intent).await
    }

    /// Moves through history; the resulting pop navigates asynchronously
    pub fn go(&self, delta: isize) {
        self.inner.history.go(delta);
    }

    pub fn back(&self) {
        self.go(-1);
    }

    pub fn forward(&self) {
        self.go(1);
    }

    /// The current snapshot
    pub fn state(&self) -> Arc<RouterState> {
        self.inner.store.snapshot()
    }

    pub fn store(&self) -> &NavigationStore {
        &self.inner.store
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&RouterState) + Send + Sync + 'static,
    {
        self.inner.store.subscribe(callback)
    }

    pub fn routes(&self) -> &Routes {
        &self.inner.routes
    }

    pub fn config(&self) -> &NavigatorConfig {
        &self.inner.config
    }

    pub fn history(&self) -> &Arc<dyn History> {
        &self.inner.history
    }

    pub fn is_disposed(&self) -> bool {
        self.lock_control().disposed
    }

    /// Stops listening, cancels everything in flight and drops subscribers
    pub fn dispose(&self) {
        let unlisten = lock(&self.inner.unlisten).take();
        if let Some(unlisten) = unlisten {
            unlisten();
        }

        {
            let mut control = self.lock_control();
            if control.disposed {
                return;
            }
            control.disposed = true;
            if let Some(pending) = control.pending.take() {
                pending.cancellation.cancel();
            }
            for (_, controller) in control.fetch_controllers.drain() {
                controller.cancellation.cancel();
            }
            control.fetch_owners.clear();
            control.fetch_loads.clear();
            control.fetch_reloads.clear();
        }

        for data in self.state().loader_data.values() {
            data.cancel_deferred();
        }
        self.inner.store.clear_subscribers();
        info!("navigator disposed");
    }

    fn listen(&self) -> Result<(), NavigatorError> {
        if self.is_disposed() {
            return Err(NavigatorError::Disposed);
        }

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let unlisten = self.inner.history.listen(Arc::new(move |update: HistoryUpdate| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let navigator = Navigator { inner };
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    runtime.spawn(async move {
                        let intent = Intent::navigate(update.location, HistoryAction::Pop);
                        if let Err(err) = navigator.start(intent).await {
                            warn!(error = %err, "history pop ignored");
                        }
                    });
                }
                Err(_) => {
                    warn!(pathname = %update.location.pathname, "history pop outside a tokio runtime ignored")
                }
            }
        }));

        let previous = lock(&self.inner.unlisten).replace(unlisten);
        if let Some(previous) = previous {
            previous();
        }
        Ok(())
    }

    /// Seeds the snapshot; true when no initial load is needed
    fn hydrate(&self, hydration: HydrationData) -> bool {
        let routes = &self.inner.routes;
        self.transact(|_, state| {
            state.loader_data = hydration
                .loader_data
                .into_iter()
                .map(|(id, value)| (id, RouteData::Value(value)))
                .collect();
            state.action_data = hydration.action_data;
            if hydration.errors.is_some() {
                state.errors = hydration.errors;
            }

            let complete = state.errors.is_some()
                || state.matches.iter().all(|m| {
                    !has_loader(routes, &m.route_id) || state.loader_data.contains_key(&m.route_id)
                });
            state.initialized = complete;
            Some(complete)
        })
        .unwrap_or(false)
    }

    /// `resolve_to` with absolute paths placed under the basename
    pub(crate) fn resolve(&self, to: &str, from: &Location) -> Location {
        let mut location = resolve_to(to, from);
        if to.starts_with('/') {
            location.pathname = join_paths(&self.inner.config.basename, &location.pathname);
        }
        location
    }

    pub(crate) fn lock_control(&self) -> MutexGuard<'_, Control> {
        lock(&self.inner.control)
    }

    /// Applies `f` to the control block and a copy of the snapshot
    ///
    /// When `f` returns `Some`, the copy becomes the current snapshot and is
    /// published after the control lock is released.
    pub(crate) fn transact<T>(
        &self,
        f: impl FnOnce(&mut Control, &mut RouterState) -> Option<T>,
    ) -> Option<T> {
        let mut control = self.lock_control();
        let mut next = RouterState::clone(&self.inner.store.snapshot());
        let result = f(&mut control, &mut next)?;
        let committed = self.inner.store.replace(next);
        drop(control);

        self.inner.store.publish(&committed);
        Some(result)
    }

    fn is_current(&self, id: u64) -> bool {
        let control = self.lock_control();
        control.sequence == id && !control.disposed
    }

    /// Runs `intent`, following redirects up to the configured limit
    ///
    /// When a fetcher mutation landed too late for the committed navigation
    /// to reload its loaders, a revalidation follows before returning. The
    /// outcome reported is always that of `intent`.
    pub(crate) async fn start(&self, mut intent: Intent) -> Result<NavigationOutcome, NavigatorError> {
        let mut redirected_from = None;
        let mut first = None;
        loop {
            let step = match (self.run(intent, redirected_from.take()).await, first) {
                (Ok(step), _) => step,
                (Err(_), Some(outcome)) => return Ok(outcome),
                (Err(err), None) => return Err(err),
            };
            let outcome = match step {
                Step::Done(outcome) => outcome,
                Step::Redirect { id, from, next } if next.redirects > self.inner.config.max_redirects => {
                    warn!(
                        navigation = id,
                        pathname = %next.location.pathname,
                        limit = self.inner.config.max_redirects,
                        "too many redirects"
                    );
                    self.commit_redirect_loop(id, &from)
                }
                Step::Redirect { id, next, .. } => {
                    redirected_from = Some(id);
                    intent = next;
                    continue;
                }
            };

            let outcome = *first.get_or_insert(outcome);
            if !self.take_follow_up() {
                return Ok(outcome);
            }
            debug!("fetcher mutation missed the last commit, revalidating");
            intent = Intent {
                yields: true,
                ..Intent::revalidate(&self.state())
            };
        }
    }

    fn take_follow_up(&self) -> bool {
        let mut control = self.lock_control();
        std::mem::take(&mut control.revalidate_after_commit)
            && !control.disposed
            && !control.is_navigating()
    }

    /// Registers `intent` as the pending navigation, cancelling the previous one
    ///
    /// Returns `None` when a yielding intent finds a navigation running; that
    /// navigation picks up the pending revalidation instead. A redirect
    /// target (`redirected_from`) also returns `None` once a newer navigation
    /// has replaced the one that redirected.
    fn begin(
        &self,
        intent: &Intent,
        redirected_from: Option<u64>,
    ) -> Result<Option<(u64, Cancellation)>, NavigatorError> {
        let mut control = self.lock_control();
        if control.disposed {
            return Err(NavigatorError::Disposed);
        }

        if let Some(from) = redirected_from.filter(|&from| from != control.sequence) {
            debug!(navigation = from, "redirect dropped, navigation superseded");
            return Ok(None);
        }

        if intent.yields && control.is_navigating() {
            control.mutation_epoch += 1;
            debug!("revalidation folded into the running navigation");
            return Ok(None);
        }

        // Mutations the replaced navigation never planned for are still owed
        let mut planned_epoch = control.mutation_epoch;
        if let Some(previous) = control.pending.take() {
            planned_epoch = previous.planned_epoch;
            previous.cancellation.cancel();
            if previous.submission.as_ref().is_some_and(|s| s.method.is_mutation()) {
                control.revalidation_required = true;
            }
            release_revalidating_fetchers(&mut control, previous.id);
            debug!(navigation = previous.id, "navigation cancelled");
        }

        control.sequence += 1;
        let id = control.sequence;
        let cancellation = Cancellation::new();
        control.pending = Some(PendingNavigation {
            id,
            kind: intent.kind,
            location: intent.location.clone(),
            action: intent.action,
            submission: intent.submission.clone(),
            cancellation: cancellation.clone(),
            planned_epoch,
        });
        Ok(Some((id, cancellation)))
    }

    async fn run(&self, intent: Intent, redirected_from: Option<u64>) -> Result<Step, NavigatorError> {
        let Some((id, cancellation)) = self.begin(&intent, redirected_from)? else {
            return Ok(Step::Done(NavigationOutcome::Superseded));
        };
        debug!(
            navigation = id,
            kind = ?intent.kind,
            pathname = %intent.location.pathname,
            "navigation started"
        );

        let routes = &self.inner.routes;
        let Some(matches) =
            routes.match_routes_with_basename(&intent.location.pathname, &self.inner.config.basename)
        else {
            warn!(navigation = id, pathname = %intent.location.pathname, "no route matches");
            return Ok(Step::Done(self.commit_not_found(id, &intent)));
        };

        let current = self.state();
        if intent.kind == IntentKind::Navigate
            && intent.submission.is_none()
            && !intent.force
            && current.location.is_hash_change_only(&intent.location)
        {
            debug!(navigation = id, hash = %intent.location.hash, "hash change");
            let outcome = self.commit(id, &intent, |state, _| state.matches = matches);
            return Ok(Step::Done(outcome));
        }

        let mut action_data = None;
        let mut action_status = None;

        if let Some(submission) = intent.submission.clone().filter(|s| s.method.is_mutation()) {
            let target = target_index(routes, &matches, &intent.location.search);
            let target_id = matches[target].route_id.clone();

            let submitting = self.transact(|control, state| {
                (control.sequence == id).then(|| {
                    state.navigation = Navigation::Submitting {
                        location: intent.location.clone(),
                        submission: submission.clone(),
                    };
                })
            });
            if submitting.is_none() {
                return Ok(Step::Done(NavigationOutcome::Superseded));
            }

            let outcome = match routes.route(&target_id).and_then(|r| r.handle().action.clone()) {
                Some(action) => {
                    info!(navigation = id, route_id = %target_id, method = %submission.method, "running action");
                    let args = DataArgs {
                        route_id: target_id.clone(),
                        location: intent.location.clone(),
                        params: matches[target].params.clone(),
                        submission: Some(submission.clone()),
                        cancellation: cancellation.child(),
                    };
                    match execution::run_action(action, args, &cancellation).await {
                        Some(outcome) => execution::resolve_outcome(outcome).await,
                        None => return Ok(Step::Done(NavigationOutcome::Superseded)),
                    }
                }
                None => HandlerOutcome::Error(
                    ErrorResponse::method_not_allowed(
                        submission.method.as_str(),
                        &intent.location.pathname,
                        &target_id,
                    )
                    .into(),
                ),
            };

            if !self.is_current(id) {
                outcome.discard();
                return Ok(Step::Done(NavigationOutcome::Superseded));
            }

            match outcome {
                HandlerOutcome::Redirect(redirect) => {
                    self.lock_control().revalidation_required = true;
                    return Ok(self.redirect_step(id, intent, redirect));
                }
                HandlerOutcome::Error(error) => {
                    warn!(navigation = id, route_id = %target_id, status = error.status(), "action failed");
                    let outcome = self.commit_action_error(id, &intent, matches, target, error);
                    return Ok(Step::Done(outcome));
                }
                HandlerOutcome::Data(data) => {
                    let value = match data {
                        RouteData::Value(value) => value,
                        RouteData::Deferred(deferred) => deferred.current_value(),
                    };
                    action_data = Some(HashMap::from([(target_id, value)]));
                    action_status = Some(200);
                    self.lock_control().revalidation_required = true;
                }
            }
        }

        let form_method = intent.submission.as_ref().map(|s| s.method);
        let loader_submission = intent.submission.clone().filter(|s| !s.method.is_mutation());
        let boundaries: Vec<usize> = (0..matches.len())
            .map(|index| boundary_index(routes, &matches, index))
            .collect();

        loop {
            let current = self.state();
            let (epoch, required, fetch_loads, in_flight) = {
                let mut control = self.lock_control();
                let epoch = control.mutation_epoch;
                if let Some(pending) = control.pending.as_mut().filter(|p| p.id == id) {
                    pending.planned_epoch = epoch;
                }
                (
                    epoch,
                    control.revalidation_required,
                    control.fetch_loads.clone(),
                    control.fetch_controllers.keys().cloned().collect::<HashSet<_>>(),
                )
            };

            let input = RevalidationInput {
                current: &current,
                next_location: &intent.location,
                next_matches: &matches,
                form_method,
                action_status,
                revalidation_required: required,
                force: intent.force,
                initial: intent.kind == IntentKind::Initial,
            };
            let to_load = matches_to_load(routes, &input);
            let loading_routes: HashSet<&str> =
                to_load.iter().map(|&index| matches[index].route_id.as_str()).collect();
            let fetcher_keys =
                fetchers_to_revalidate(routes, &input, &fetch_loads, &in_flight, &loading_routes);

            let registered = self.transact(|control, state| {
                if control.sequence != id {
                    return None;
                }
                match intent.kind {
                    IntentKind::Revalidate => state.revalidation = RevalidationState::Loading,
                    IntentKind::Navigate | IntentKind::Initial => {
                        state.navigation = Navigation::Loading {
                            location: intent.location.clone(),
                            submission: intent.submission.clone(),
                        }
                    }
                }
                if action_data.is_some() {
                    state.action_data = action_data.clone();
                }

                let mut calls = Vec::new();
                for key in &fetcher_keys {
                    if control.fetch_controllers.contains_key(key) {
                        continue;
                    }
                    let Some(load) = control.fetch_loads.get(key).cloned() else {
                        continue;
                    };
                    let Some(handler) = routes
                        .route(&load.route_id)
                        .and_then(|r| r.handle().loader.clone())
                    else {
                        continue;
                    };

                    let seq = control.next_fetch_seq();
                    let token = cancellation.child();
                    control.fetch_controllers.insert(
                        key.clone(),
                        FetchController {
                            seq,
                            cancellation: token.clone(),
                            revalidation_of: Some(id),
                        },
                    );
                    if let Some(fetcher) = state.fetchers.get_mut(key) {
                        fetcher.state = FetcherState::Loading;
                    }
                    calls.push((
                        seq,
                        FetcherCall {
                            key: key.clone(),
                            handler,
                            args: DataArgs {
                                route_id: load.route_id,
                                location: load.location,
                                params: load.params,
                                submission: None,
                                cancellation: token,
                            },
                        },
                    ));
                }
                Some(calls)
            });
            let Some(registered) = registered else {
                return Ok(Step::Done(NavigationOutcome::Superseded));
            };

            let fetcher_seqs: HashMap<String, u64> = registered
                .iter()
                .map(|(seq, call)| (call.key.clone(), *seq))
                .collect();
            let fetcher_calls: Vec<FetcherCall> = registered.into_iter().map(|(_, call)| call).collect();

            let loader_calls: Vec<LoaderCall> = to_load
                .iter()
                .filter_map(|&index| {
                    let m = &matches[index];
                    let handler = routes.route(&m.route_id)?.handle().loader.clone()?;
                    Some(LoaderCall {
                        index,
                        handler,
                        args: DataArgs {
                            route_id: m.route_id.clone(),
                            location: intent.location.clone(),
                            params: m.params.clone(),
                            submission: loader_submission.clone(),
                            cancellation: cancellation.child(),
                        },
                    })
                })
                .collect();

            debug!(
                navigation = id,
                loaders = loader_calls.len(),
                fetchers = fetcher_calls.len(),
                "running loaders"
            );

            let Some(results) =
                execution::run_loaders(loader_calls, fetcher_calls, &boundaries, &cancellation).await
            else {
                return Ok(Step::Done(NavigationOutcome::Superseded));
            };

            let replan = {
                let mut control = self.lock_control();
                if control.sequence != id || control.disposed {
                    None
                } else if control.mutation_epoch != epoch {
                    release_revalidating_fetchers(&mut control, id);
                    Some(true)
                } else {
                    Some(false)
                }
            };

            match replan {
                None => {
                    results.discard();
                    return Ok(Step::Done(NavigationOutcome::Superseded));
                }
                Some(true) => {
                    debug!(navigation = id, "fetcher mutation landed, planning loaders again");
                    results.discard();
                }
                Some(false) => {
                    return self
                        .finish_loading(id, intent, matches, &to_load, &boundaries, results, fetcher_seqs, action_data)
                        .await;
                }
            }
        }
    }

    /// Turns loader results into the committed snapshot
    #[allow(clippy::too_many_arguments)]
    async fn finish_loading(
        &self,
        id: u64,
        intent: Intent,
        matches: Vec<RouteMatch>,
        to_load: &[usize],
        boundaries: &[usize],
        results: LoadResults,
        fetcher_seqs: HashMap<String, u64>,
        action_data: Option<HashMap<String, Value>>,
    ) -> Result<Step, NavigatorError> {
        let redirect = results
            .routes
            .iter()
            .map(|(_, outcome)| outcome)
            .chain(results.fetchers.iter().map(|(_, outcome)| outcome))
            .find_map(|outcome| match outcome {
                HandlerOutcome::Redirect(redirect) => Some(redirect.clone()),
                _ => None,
            });
        if let Some(redirect) = redirect {
            results.discard();
            return Ok(self.redirect_step(id, intent, redirect));
        }

        let mut fetcher_updates = Vec::new();
        for (key, outcome) in results.fetchers {
            let Some(&seq) = fetcher_seqs.get(&key) else {
                continue;
            };
            let update = match execution::resolve_outcome(outcome).await {
                HandlerOutcome::Data(RouteData::Value(value)) => Ok(value),
                HandlerOutcome::Data(RouteData::Deferred(deferred)) => Ok(deferred.current_value()),
                HandlerOutcome::Error(error) => Err(error),
                HandlerOutcome::Redirect(_) => continue,
            };
            fetcher_updates.push((key, seq, update));
        }

        let mut errors: HashMap<String, RouteError> = HashMap::new();
        let mut cutoff: Option<usize> = None;
        let mut loaded: HashMap<usize, RouteData> = HashMap::new();
        for (index, outcome) in results.routes {
            match outcome {
                HandlerOutcome::Data(data) => {
                    loaded.insert(index, data);
                }
                HandlerOutcome::Error(error) => {
                    let boundary = boundaries.get(index).copied().unwrap_or(0);
                    warn!(
                        navigation = id,
                        route_id = %matches[index].route_id,
                        boundary = %matches[boundary].route_id,
                        status = error.status(),
                        "loader failed"
                    );
                    errors.entry(matches[boundary].route_id.clone()).or_insert(error);
                    cutoff = Some(cutoff.map_or(boundary, |c| c.min(boundary)));
                }
                HandlerOutcome::Redirect(_) => {}
            }
        }

        let current = self.state();
        let mut loader_data = HashMap::new();
        let mut carried = HashSet::new();
        for (index, m) in matches.iter().enumerate() {
            let fresh = loaded.remove(&index);
            if cutoff.is_some_and(|c| index > c) {
                if let Some(data) = fresh {
                    data.cancel_deferred();
                }
                continue;
            }
            match fresh {
                Some(data) => {
                    loader_data.insert(m.route_id.clone(), data);
                }
                None if !to_load.contains(&index) => {
                    if let Some(data) = current.loader_data.get(&m.route_id) {
                        loader_data.insert(m.route_id.clone(), data.clone());
                        carried.insert(m.route_id.clone());
                    }
                }
                None => {}
            }
        }

        let stale: Vec<RouteData> = current
            .loader_data
            .iter()
            .filter(|(route_id, _)| !carried.contains(*route_id))
            .map(|(_, data)| data.clone())
            .collect();
        let fresh: Vec<RouteData> = loader_data
            .iter()
            .filter(|(route_id, _)| !carried.contains(*route_id))
            .map(|(_, data)| data.clone())
            .collect();
        let errors = (!errors.is_empty()).then_some(errors);

        let outcome = self.commit(id, &intent, |state, control| {
            state.matches = matches;
            state.loader_data = loader_data;
            state.errors = errors;
            if action_data.is_some() {
                state.action_data = action_data;
            }

            for (key, seq, update) in fetcher_updates {
                if !control.fetch_controllers.get(&key).is_some_and(|c| c.seq == seq) {
                    continue;
                }
                control.fetch_controllers.remove(&key);
                let fetcher = state.fetchers.entry(key).or_default();
                fetcher.state = FetcherState::Idle;
                match update {
                    Ok(value) => {
                        fetcher.data = Some(value);
                        fetcher.error = None;
                    }
                    Err(error) => {
                        fetcher.data = None;
                        fetcher.error = Some(error);
                    }
                }
            }
        });

        let cancelled = if outcome == NavigationOutcome::Committed {
            stale
        } else {
            fresh
        };
        for data in cancelled {
            data.cancel_deferred();
        }
        Ok(Step::Done(outcome))
    }

    fn redirect_step(&self, id: u64, from: Intent, redirect: Redirect) -> Step {
        let location = self
            .resolve(&redirect.location, &from.location)
            .with_key(create_key());
        if redirect.revalidate {
            self.lock_control().revalidation_required = true;
        }

        let action = if redirect.replace
            || from.action == HistoryAction::Replace
            || from.kind == IntentKind::Initial
        {
            HistoryAction::Replace
        } else {
            HistoryAction::Push
        };
        let submission = from
            .submission
            .clone()
            .filter(|_| redirect.preserves_submission());

        info!(
            navigation = id,
            from = %from.location.pathname,
            to = %location.pathname,
            status = redirect.status,
            "redirecting"
        );

        let next = Intent {
            submission,
            redirects: from.redirects + 1,
            ..Intent::navigate(location, action)
        };
        Step::Redirect { id, from, next }
    }

    /// Commits `intent` as the new current state
    ///
    /// Common fields are reset first; `build` fills in matches, data and
    /// errors. Fails when `id` is no longer the current navigation.
    fn commit<F>(&self, id: u64, intent: &Intent, build: F) -> NavigationOutcome
    where
        F: FnOnce(&mut RouterState, &mut Control),
    {
        let committed = self.transact(|control, state| {
            if control.sequence != id || control.disposed {
                return None;
            }

            state.location = intent.location.clone();
            if intent.kind != IntentKind::Revalidate {
                state.history_action = intent.action;
                state.action_data = None;
            }
            state.navigation = Navigation::Idle;
            state.revalidation = RevalidationState::Idle;
            state.initialized = true;
            build(state, control);

            // A mutation after the last plan has not been reloaded yet; its
            // fetchers stay loading until the follow-up revalidation commits
            let unplanned = control
                .pending
                .as_ref()
                .is_some_and(|p| p.planned_epoch != control.mutation_epoch);

            release_revalidating_fetchers(control, id);
            if !unplanned {
                for key in control.fetch_reloads.drain() {
                    if let Some(fetcher) = state.fetchers.get_mut(&key) {
                        if fetcher.state == FetcherState::Loading {
                            fetcher.state = FetcherState::Idle;
                        }
                    }
                }
            }

            control.pending = None;
            control.revalidation_required = unplanned;
            control.revalidate_after_commit = unplanned;

            match (intent.kind, intent.action) {
                (IntentKind::Navigate, HistoryAction::Push) => {
                    self.inner.history.push(intent.location.clone())
                }
                (IntentKind::Navigate, HistoryAction::Replace) => {
                    self.inner.history.replace(intent.location.clone())
                }
                _ => {}
            }
            Some(())
        });

        match committed {
            Some(()) => {
                debug!(navigation = id, pathname = %intent.location.pathname, "navigation committed");
                NavigationOutcome::Committed
            }
            None => NavigationOutcome::Superseded,
        }
    }

    /// Commits an error state; data at or above `keep_through` persists
    fn commit_error(
        &self,
        id: u64,
        intent: &Intent,
        matches: Vec<RouteMatch>,
        keep_through: Option<usize>,
        errors: HashMap<String, RouteError>,
    ) -> NavigationOutcome {
        let current = self.state();
        let mut kept = HashMap::new();
        if let Some(keep_through) = keep_through {
            for (index, m) in matches.iter().enumerate().take(keep_through + 1) {
                let persists = current
                    .matches
                    .get(index)
                    .is_some_and(|c| c.route_id == m.route_id);
                if let Some(data) = current.loader_data.get(&m.route_id).filter(|_| persists) {
                    kept.insert(m.route_id.clone(), data.clone());
                }
            }
        }
        let stale: Vec<RouteData> = current
            .loader_data
            .iter()
            .filter(|(route_id, _)| !kept.contains_key(*route_id))
            .map(|(_, data)| data.clone())
            .collect();

        let outcome = self.commit(id, intent, |state, _| {
            state.matches = matches;
            state.loader_data = kept;
            state.errors = Some(errors);
        });
        if outcome == NavigationOutcome::Committed {
            for data in stale {
                data.cancel_deferred();
            }
        }
        outcome
    }

    fn commit_not_found(&self, id: u64, intent: &Intent) -> NavigationOutcome {
        let (matches, errors) = not_found(&self.inner.routes, &intent.location.pathname);
        match self.commit_error(id, intent, matches, None, errors) {
            NavigationOutcome::Committed => NavigationOutcome::NotFound,
            other => other,
        }
    }

    fn commit_action_error(
        &self,
        id: u64,
        intent: &Intent,
        matches: Vec<RouteMatch>,
        target: usize,
        error: RouteError,
    ) -> NavigationOutcome {
        let boundary = boundary_index(&self.inner.routes, &matches, target);
        let errors = HashMap::from([(matches[boundary].route_id.clone(), error)]);
        self.commit_error(id, intent, matches, Some(boundary), errors)
    }

    fn commit_redirect_loop(&self, id: u64, from: &Intent) -> NavigationOutcome {
        let routes = &self.inner.routes;
        let matches = routes
            .match_routes_with_basename(&from.location.pathname, &self.inner.config.basename)
            .or_else(|| routes.fallback_match())
            .unwrap_or_default();
        let error_id = matches
            .first()
            .map_or_else(|| ROOT_ERROR_ID.to_string(), |m| m.route_id.clone());
        let error = RouteError::unexpected(format!(
            "too many redirects (more than {})",
            self.inner.config.max_redirects
        ));
        self.commit_error(id, from, matches, None, HashMap::from([(error_id, error)]))
    }
}

/// Drops revalidation requests owned by navigation `id`; their fetchers go
/// idle with the next commit
fn release_revalidating_fetchers(control: &mut Control, id: u64) {
    let released: Vec<String> = control
        .fetch_controllers
        .iter()
        .filter(|(_, c)| c.revalidation_of == Some(id))
        .map(|(key, _)| key.clone())
        .collect();
    for key in released {
        control.abort_fetch(&key);
        control.fetch_reloads.insert(key);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn has_loader(routes: &Routes, route_id: &str) -> bool {
    routes
        .route(route_id)
        .is_some_and(|route| route.handle().loader.is_some())
}

/// The fallback match chain and a 404 keyed to its root
pub(crate) fn not_found(
    routes: &Routes,
    pathname: &str,
) -> (Vec<RouteMatch>, HashMap<String, RouteError>) {
    let error = RouteError::from(ErrorResponse::not_found(pathname));
    let matches = routes.fallback_match().unwrap_or_default();
    let error_id = matches
        .first()
        .map_or_else(|| ROOT_ERROR_ID.to_string(), |m| m.route_id.clone());
    (matches, HashMap::from([(error_id, error)]))
}

/// The match a submission targets
///
/// The deepest match contributing a path segment, or the leaf index route
/// when the search carries a naked `index`.
pub(crate) fn target_index(routes: &Routes, matches: &[RouteMatch], search: &str) -> usize {
    let is_index = |m: &RouteMatch| routes.route(&m.route_id).is_some_and(|r| r.is_index());
    if has_naked_index(search) && matches.last().is_some_and(is_index) {
        return matches.len() - 1;
    }

    matches
        .iter()
        .enumerate()
        .rev()
        .find(|(index, m)| *index == 0 || routes.route(&m.route_id).is_some_and(|r| r.has_path()))
        .map_or(0, |(index, _)| index)
}

/// Nearest match at or above `index` declaring an error boundary, else the root
pub(crate) fn boundary_index(routes: &Routes, matches: &[RouteMatch], index: usize) -> usize {
    if matches.is_empty() {
        return 0;
    }
    (0..=index.min(matches.len() - 1))
        .rev()
        .find(|&i| routes.route(&matches[i].route_id).is_some_and(|r| r.error_boundary()))
        .unwrap_or(0)
}
