//! Running loaders and actions.
//!
//! Handlers run as tokio tasks. Cancelling a navigation signals their tokens
//! and stops waiting for them, but never aborts the tasks: results that
//! arrive late are simply discarded.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::task::{JoinError, JoinHandle};
use tracing::debug;

use crate::cancel::Cancellation;
use crate::data::{DataArgs, DataHandler, DataResult, HandlerOutcome, RouteData, RouteError};

/// One route loader to run for a match
pub(crate) struct LoaderCall {
    /// Position of the match in the chain
    pub index: usize,
    pub handler: Arc<dyn DataHandler>,
    pub args: DataArgs,
}

/// A fetcher load repeated as part of a revalidation
pub(crate) struct FetcherCall {
    pub key: String,
    pub handler: Arc<dyn DataHandler>,
    pub args: DataArgs,
}

/// Results of one loader batch
#[derive(Debug, Default)]
pub(crate) struct LoadResults {
    /// Ordered by match position; loaders cut off below a boundary are absent
    pub routes: Vec<(usize, HandlerOutcome)>,
    pub fetchers: Vec<(String, HandlerOutcome)>,
}

impl LoadResults {
    /// Cancels deferred values in results that will never be committed
    pub(crate) fn discard(self) {
        let routes = self.routes.into_iter().map(|(_, outcome)| outcome);
        let fetchers = self.fetchers.into_iter().map(|(_, outcome)| outcome);
        for outcome in routes.chain(fetchers) {
            outcome.discard();
        }
    }
}

impl HandlerOutcome {
    pub(crate) fn discard(self) {
        if let HandlerOutcome::Data(data) = self {
            data.cancel_deferred();
        }
    }
}

pub(crate) fn spawn_handler(handler: Arc<dyn DataHandler>, args: DataArgs) -> JoinHandle<DataResult> {
    tokio::spawn(async move { handler.call(args).await })
}

pub(crate) fn joined(result: Result<DataResult, JoinError>) -> HandlerOutcome {
    match result {
        Ok(result) => HandlerOutcome::from(result),
        Err(err) => HandlerOutcome::Error(RouteError::unexpected(format!(
            "handler task failed: {}",
            err
        ))),
    }
}

/// Runs one handler, or gives up waiting once `navigation` is cancelled
pub(crate) async fn run_action(
    handler: Arc<dyn DataHandler>,
    args: DataArgs,
    navigation: &Cancellation,
) -> Option<HandlerOutcome> {
    let task = spawn_handler(handler, args);
    tokio::select! {
        biased;
        _ = navigation.cancelled() => None,
        result = task => Some(joined(result)),
    }
}

/// Collapses deferred data into a plain value; used where nothing can
/// render partial data (actions and fetchers)
pub(crate) async fn resolve_outcome(outcome: HandlerOutcome) -> HandlerOutcome {
    match outcome {
        HandlerOutcome::Data(RouteData::Deferred(deferred)) => match deferred.resolve_all().await {
            Ok(value) => HandlerOutcome::Data(RouteData::Value(value)),
            Err(error) => HandlerOutcome::Error(error),
        },
        other => other,
    }
}

enum Target {
    Route(usize),
    Fetcher(String),
}

/// Runs route loaders and fetcher revalidations in parallel
///
/// `boundaries[i]` is the position of the error boundary for match `i`. When
/// a loader fails, loaders still pending below its boundary are cancelled and
/// no longer awaited. Returns `None` if `navigation` is cancelled first.
pub(crate) async fn run_loaders(
    calls: Vec<LoaderCall>,
    fetchers: Vec<FetcherCall>,
    boundaries: &[usize],
    navigation: &Cancellation,
) -> Option<LoadResults> {
    let mut pending: FuturesUnordered<BoxFuture<'static, (Target, Result<DataResult, JoinError>)>> =
        FuturesUnordered::new();
    let mut tokens: Vec<(usize, Cancellation)> = Vec::with_capacity(calls.len());

    for call in calls {
        tokens.push((call.index, call.args.cancellation.clone()));
        let index = call.index;
        let task = spawn_handler(call.handler, call.args);
        pending.push(async move { (Target::Route(index), task.await) }.boxed());
    }
    for call in fetchers {
        let key = call.key;
        let task = spawn_handler(call.handler, call.args);
        pending.push(async move { (Target::Fetcher(key), task.await) }.boxed());
    }

    let mut outstanding = pending.len();
    let mut routes: BTreeMap<usize, HandlerOutcome> = BTreeMap::new();
    let mut fetcher_results = Vec::new();
    let mut skipped: HashSet<usize> = HashSet::new();

    while outstanding > 0 {
        let next = tokio::select! {
            biased;
            _ = navigation.cancelled() => return None,
            next = pending.next() => next,
        };
        let Some((target, result)) = next else {
            break;
        };

        match target {
            Target::Route(index) if skipped.contains(&index) => joined(result).discard(),
            Target::Route(index) => {
                outstanding -= 1;
                let outcome = joined(result);
                let failed = matches!(outcome, HandlerOutcome::Error(_));
                routes.insert(index, outcome);

                if failed {
                    let boundary = boundaries.get(index).copied().unwrap_or(0);
                    for (other, token) in &tokens {
                        if *other > boundary && !routes.contains_key(other) && skipped.insert(*other) {
                            debug!(boundary, skipped = *other, "loader cut off by error boundary");
                            token.cancel();
                            outstanding -= 1;
                        }
                    }
                }
            }
            Target::Fetcher(key) => {
                outstanding -= 1;
                fetcher_results.push((key, joined(result)));
            }
        }
    }

    Some(LoadResults {
        routes: routes.into_iter().collect(),
        fetchers: fetcher_results,
    })
}
