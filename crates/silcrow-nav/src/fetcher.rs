//! Fetchers: keyed loads and submissions that run beside navigation.
//!
//! A fetcher never changes the location. Its record lives in the snapshot
//! under its key, and a newer call with the same key supersedes an older
//! one.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use silcrow_router::RouteMatch;
use tracing::{debug, info, warn};

use crate::cancel::Cancellation;
use crate::data::{DataArgs, ErrorResponse, HandlerOutcome, Redirect, RouteData, RouteError};
use crate::error::NavigatorError;
use crate::execution;
use crate::history::{create_key, HistoryAction};
use crate::location::Location;
use crate::navigator::{target_index, Control, FetchController, Intent, Navigator};
use crate::revalidation::FetchLoad;
use crate::store::{Fetcher, FetcherState};
use crate::submission::Submission;

#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// A mutation runs the target route's action; GET becomes the search
    pub submission: Option<Submission>,
    /// Repeat this load when the page revalidates
    pub revalidate: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            submission: None,
            revalidate: true,
        }
    }
}

impl FetchOptions {
    pub fn submit(submission: Submission) -> Self {
        Self {
            submission: Some(submission),
            ..Self::default()
        }
    }

    /// Keeps the fetcher out of every revalidation
    pub fn without_revalidation(mut self) -> Self {
        self.revalidate = false;
        self
    }
}

/// How a fetch ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchOutcome {
    /// Data was stored on the fetcher
    Completed,
    /// The error was stored on the fetcher
    Failed,
    /// The handler redirected and a navigation followed
    Redirected,
    /// Nothing matched the href; a 404 was stored on the fetcher
    NotFound,
    /// A newer call with the same key took over
    Superseded,
    /// The fetcher was deleted while in flight
    Deleted,
}

impl Navigator {
    /// Loads or submits to `href` under `key`
    pub async fn fetch(
        &self,
        key: &str,
        href: &str,
        options: FetchOptions,
    ) -> Result<FetchOutcome, NavigatorError> {
        let current = self.state();
        let mut location = self.resolve(href, &current.location).with_key(create_key());
        if let Some(submission) = options.submission.as_ref().filter(|s| !s.method.is_mutation()) {
            location.search = submission.get_search(&location.search);
        }

        let routes = &self.inner.routes;
        let Some(matches) =
            routes.match_routes_with_basename(&location.pathname, &self.inner.config.basename)
        else {
            warn!(fetcher = key, pathname = %location.pathname, "no route matches fetcher href");
            let error = RouteError::from(ErrorResponse::not_found(&location.pathname));
            self.transact(|control, state| {
                if control.disposed {
                    return None;
                }
                forget(control, key);
                state.fetchers.insert(
                    key.to_string(),
                    Fetcher {
                        error: Some(error),
                        ..Fetcher::default()
                    },
                );
                Some(())
            })
            .ok_or(NavigatorError::Disposed)?;
            return Ok(FetchOutcome::NotFound);
        };

        let target = matches[target_index(routes, &matches, &location.search)].clone();
        match options.submission {
            Some(submission) if submission.method.is_mutation() => {
                self.fetch_submit(key, location, target, submission).await
            }
            submission => {
                self.fetch_load(key, location, target, submission, options.revalidate)
                    .await
            }
        }
    }

    /// The record for `key`, idle when unknown
    pub fn fetcher(&self, key: &str) -> Fetcher {
        self.state().fetcher(key)
    }

    /// Removes the record for `key`, cancelling its request
    pub fn delete_fetcher(&self, key: &str) {
        let removed = self.transact(|control, state| {
            forget(control, key);
            control.fetch_owners.remove(key);
            state.fetchers.remove(key).map(|_| ())
        });
        if removed.is_some() {
            debug!(fetcher = key, "fetcher deleted");
        }
    }

    async fn fetch_load(
        &self,
        key: &str,
        location: Location,
        target: RouteMatch,
        submission: Option<Submission>,
        revalidate: bool,
    ) -> Result<FetchOutcome, NavigatorError> {
        let load = FetchLoad {
            route_id: target.route_id.clone(),
            location: location.clone(),
            params: target.params.clone(),
            revalidate,
        };
        let (seq, cancellation) = self.register(key, Some(load), |fetcher| {
            fetcher.state = FetcherState::Loading;
            fetcher.error = None;
            fetcher.submission = submission.clone();
        })?;
        debug!(fetcher = key, route_id = %target.route_id, "fetcher load started");

        let Some(loader) = self
            .inner
            .routes
            .route(&target.route_id)
            .and_then(|r| r.handle().loader.clone())
        else {
            return Ok(self.settle(key, seq, FetchOutcome::Completed, |fetcher| {
                *fetcher = Fetcher::default();
            }));
        };

        let args = DataArgs {
            route_id: target.route_id,
            location,
            params: target.params,
            submission,
            cancellation: cancellation.child(),
        };
        let Some(outcome) = execution::run_action(loader, args, &cancellation).await else {
            return Ok(self.stale(key, seq));
        };

        match execution::resolve_outcome(outcome).await {
            HandlerOutcome::Redirect(redirect) => self.fetch_redirect(key, seq, redirect).await,
            HandlerOutcome::Error(error) => Ok(self.fail(key, seq, error)),
            HandlerOutcome::Data(data) => {
                let value = into_value(data);
                Ok(self.settle(key, seq, FetchOutcome::Completed, |fetcher| {
                    fetcher.state = FetcherState::Idle;
                    fetcher.data = Some(value);
                    fetcher.error = None;
                    fetcher.submission = None;
                }))
            }
        }
    }

    async fn fetch_submit(
        &self,
        key: &str,
        location: Location,
        target: RouteMatch,
        submission: Submission,
    ) -> Result<FetchOutcome, NavigatorError> {
        let (seq, cancellation) = self.register(key, None, |fetcher| {
            fetcher.state = FetcherState::Submitting;
            fetcher.error = None;
            fetcher.submission = Some(submission.clone());
        })?;
        info!(
            fetcher = key,
            route_id = %target.route_id,
            method = %submission.method,
            "fetcher submission"
        );

        let Some(action) = self
            .inner
            .routes
            .route(&target.route_id)
            .and_then(|r| r.handle().action.clone())
        else {
            let error = ErrorResponse::method_not_allowed(
                submission.method.as_str(),
                &location.pathname,
                &target.route_id,
            );
            return Ok(self.fail(key, seq, error.into()));
        };

        let args = DataArgs {
            route_id: target.route_id,
            location,
            params: target.params,
            submission: Some(submission),
            cancellation: cancellation.child(),
        };
        let Some(outcome) = execution::run_action(action, args, &cancellation).await else {
            return Ok(self.stale(key, seq));
        };

        let value = match execution::resolve_outcome(outcome).await {
            HandlerOutcome::Redirect(redirect) => {
                self.lock_control().revalidation_required = true;
                return self.fetch_redirect(key, seq, redirect).await;
            }
            HandlerOutcome::Error(error) => return Ok(self.fail(key, seq, error)),
            HandlerOutcome::Data(data) => into_value(data),
        };

        // The fetcher shows its data but stays loading until the page
        // revalidation that follows every mutation commits
        let mut outcome = FetchOutcome::Completed;
        let navigating = self.transact(|control, state| {
            if let Err(stale) = ownership(control, key, seq) {
                outcome = stale;
                return None;
            }
            control.fetch_controllers.remove(key);
            control.fetch_reloads.insert(key.to_string());
            control.revalidation_required = true;

            let navigating = control.is_navigating();
            if navigating {
                control.mutation_epoch += 1;
            }

            let fetcher = state.fetchers.entry(key.to_string()).or_default();
            fetcher.state = FetcherState::Loading;
            fetcher.data = Some(value);
            fetcher.error = None;
            Some(navigating)
        });

        match navigating {
            None => Ok(outcome),
            Some(true) => {
                debug!(fetcher = key, "revalidation joins the running navigation");
                Ok(FetchOutcome::Completed)
            }
            Some(false) => {
                let intent = Intent {
                    yields: true,
                    ..Intent::revalidate(&self.state())
                };
                self.start(intent).await?;
                Ok(FetchOutcome::Completed)
            }
        }
    }

    async fn fetch_redirect(
        &self,
        key: &str,
        seq: u64,
        redirect: Redirect,
    ) -> Result<FetchOutcome, NavigatorError> {
        let outcome = self.settle(key, seq, FetchOutcome::Redirected, |fetcher| {
            *fetcher = Fetcher::default();
        });
        if outcome != FetchOutcome::Redirected {
            return Ok(outcome);
        }
        if redirect.revalidate {
            self.lock_control().revalidation_required = true;
        }

        let current = self.state();
        let location = self
            .resolve(&redirect.location, &current.location)
            .with_key(create_key());
        let action = if redirect.replace {
            HistoryAction::Replace
        } else {
            HistoryAction::Push
        };
        info!(fetcher = key, to = %location.pathname, status = redirect.status, "fetcher redirected");

        self.start(Intent::navigate(location, action)).await?;
        Ok(FetchOutcome::Redirected)
    }

    /// Installs a new request for `key`, superseding any previous one
    fn register(
        &self,
        key: &str,
        load: Option<FetchLoad>,
        update: impl FnOnce(&mut Fetcher),
    ) -> Result<(u64, Cancellation), NavigatorError> {
        self.transact(|control, state| {
            if control.disposed {
                return None;
            }
            forget(control, key);
            if let Some(load) = load {
                control.fetch_loads.insert(key.to_string(), load);
            }

            let seq = control.next_fetch_seq();
            let cancellation = Cancellation::new();
            control.fetch_owners.insert(key.to_string(), seq);
            control.fetch_controllers.insert(
                key.to_string(),
                FetchController {
                    seq,
                    cancellation: cancellation.clone(),
                    revalidation_of: None,
                },
            );
            update(state.fetchers.entry(key.to_string()).or_default());
            Some((seq, cancellation))
        })
        .ok_or(NavigatorError::Disposed)
    }

    /// Applies `update` if request `seq` still owns `key`
    fn settle(
        &self,
        key: &str,
        seq: u64,
        outcome: FetchOutcome,
        update: impl FnOnce(&mut Fetcher),
    ) -> FetchOutcome {
        let mut result = outcome;
        self.transact(|control, state| {
            if let Err(stale) = ownership(control, key, seq) {
                result = stale;
                return None;
            }
            control.fetch_controllers.remove(key);
            update(state.fetchers.entry(key.to_string()).or_default());
            Some(())
        });

        if result != outcome {
            debug!(fetcher = key, outcome = ?result, "fetcher result discarded");
        }
        result
    }

    fn fail(&self, key: &str, seq: u64, error: RouteError) -> FetchOutcome {
        warn!(fetcher = key, status = error.status(), "fetcher failed");
        self.settle(key, seq, FetchOutcome::Failed, |fetcher| {
            *fetcher = Fetcher {
                error: Some(error),
                ..Fetcher::default()
            };
        })
    }

    fn stale(&self, key: &str, seq: u64) -> FetchOutcome {
        match ownership(&self.lock_control(), key, seq) {
            Ok(()) | Err(FetchOutcome::Superseded) => FetchOutcome::Superseded,
            Err(other) => other,
        }
    }
}

/// Whether request `seq` is still the live request for `key`
fn ownership(control: &Control, key: &str, seq: u64) -> Result<(), FetchOutcome> {
    match (control.fetch_owners.get(key), control.fetch_controllers.get(key)) {
        (Some(&owner), Some(controller)) if owner == seq && controller.seq == seq => Ok(()),
        (Some(&owner), _) if owner != seq => Err(FetchOutcome::Superseded),
        _ => Err(FetchOutcome::Deleted),
    }
}

/// Drops every trace of the request in flight for `key`
fn forget(control: &mut Control, key: &str) {
    control.abort_fetch(key);
    control.fetch_loads.remove(key);
    control.fetch_reloads.remove(key);
}

fn into_value(data: RouteData) -> Value {
    match data {
        RouteData::Value(value) => value,
        RouteData::Deferred(deferred) => deferred.current_value(),
    }
}
