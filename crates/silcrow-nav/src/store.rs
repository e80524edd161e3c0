//! The navigation store: the one authoritative snapshot and its subscribers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde_json::Value;
use silcrow_router::RouteMatch;
use tokio::sync::watch;

use crate::data::{RouteData, RouteError};
use crate::history::HistoryAction;
use crate::location::Location;
use crate::submission::Submission;

/// The transition in progress, if any
#[derive(Debug, Clone, PartialEq)]
pub enum Navigation {
    Idle,
    /// Running loaders for `location`
    Loading {
        location: Location,
        submission: Option<Submission>,
    },
    /// Running the action for a mutation submission
    Submitting {
        location: Location,
        submission: Submission,
    },
}

impl Navigation {
    pub fn is_idle(&self) -> bool {
        matches!(self, Navigation::Idle)
    }

    pub fn location(&self) -> Option<&Location> {
        match self {
            Navigation::Idle => None,
            Navigation::Loading { location, .. } | Navigation::Submitting { location, .. } => {
                Some(location)
            }
        }
    }
}

/// Whether an explicit or fetcher-triggered revalidation is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevalidationState {
    Idle,
    Loading,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetcherState {
    Idle,
    Loading,
    Submitting,
}

/// Public record of one fetcher
#[derive(Debug, Clone, PartialEq)]
pub struct Fetcher {
    pub state: FetcherState,
    pub data: Option<Value>,
    pub error: Option<RouteError>,
    pub submission: Option<Submission>,
}

impl Default for Fetcher {
    fn default() -> Self {
        Self {
            state: FetcherState::Idle,
            data: None,
            error: None,
            submission: None,
        }
    }
}

/// Immutable snapshot of everything the view layer renders from
#[derive(Debug, Clone)]
pub struct RouterState {
    pub history_action: HistoryAction,
    pub location: Location,
    pub matches: Vec<RouteMatch>,
    /// Set once the first loaders have completed (or were hydrated)
    pub initialized: bool,
    pub navigation: Navigation,
    pub revalidation: RevalidationState,
    /// Keyed by route id
    pub loader_data: HashMap<String, RouteData>,
    /// Keyed by route id; only present right after a submission
    pub action_data: Option<HashMap<String, Value>>,
    /// Keyed by the id of the route whose error boundary renders the error
    pub errors: Option<HashMap<String, RouteError>>,
    pub fetchers: HashMap<String, Fetcher>,
}

impl RouterState {
    pub(crate) fn new(location: Location, matches: Vec<RouteMatch>) -> Self {
        Self {
            history_action: HistoryAction::Pop,
            location,
            matches,
            initialized: false,
            navigation: Navigation::Idle,
            revalidation: RevalidationState::Idle,
            loader_data: HashMap::new(),
            action_data: None,
            errors: None,
            fetchers: HashMap::new(),
        }
    }

    /// Plain loader value for a route; deferred data yields its settled parts
    pub fn loader_value(&self, route_id: &str) -> Option<Value> {
        self.loader_data.get(route_id).map(|data| match data {
            RouteData::Value(value) => value.clone(),
            RouteData::Deferred(deferred) => deferred.current_value(),
        })
    }

    pub fn action_value(&self, route_id: &str) -> Option<&Value> {
        self.action_data.as_ref()?.get(route_id)
    }

    pub fn error(&self, route_id: &str) -> Option<&RouteError> {
        self.errors.as_ref()?.get(route_id)
    }

    /// Fetcher record, idle when the key is unknown
    pub fn fetcher(&self, key: &str) -> Fetcher {
        self.fetchers.get(key).cloned().unwrap_or_default()
    }

    pub fn route_ids(&self) -> Vec<&str> {
        self.matches.iter().map(|m| m.route_id.as_str()).collect()
    }
}

type Subscriber = Arc<dyn Fn(&RouterState) + Send + Sync>;
type Subscribers = Mutex<Vec<(u64, Subscriber)>>;

/// Handle returned by [`NavigationStore::subscribe`]
pub struct Subscription {
    id: u64,
    subscribers: Weak<Subscribers>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            lock(&subscribers).retain(|(id, _)| *id != self.id);
        }
    }
}

/// Holder of the current snapshot
///
/// Only the navigator writes, and it publishes every committed snapshot to
/// callback subscribers and `watch` receivers alike. Subscribers always get
/// the full snapshot, never a diff.
pub struct NavigationStore {
    current: watch::Sender<Arc<RouterState>>,
    subscribers: Arc<Subscribers>,
    next_id: AtomicU64,
}

impl NavigationStore {
    pub(crate) fn new(initial: RouterState) -> Self {
        let (current, _) = watch::channel(Arc::new(initial));
        Self {
            current,
            subscribers: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// The current snapshot
    pub fn snapshot(&self) -> Arc<RouterState> {
        self.current.borrow().clone()
    }

    /// Calls `callback` with every snapshot published after this call
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&RouterState) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.subscribers).push((id, Arc::new(callback)));
        Subscription {
            id,
            subscribers: Arc::downgrade(&self.subscribers),
        }
    }

    /// A receiver that always holds the latest snapshot
    pub fn watch(&self) -> watch::Receiver<Arc<RouterState>> {
        self.current.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }

    /// Installs `state` as current; callers hold the navigator's control lock
    pub(crate) fn replace(&self, state: RouterState) -> Arc<RouterState> {
        let state = Arc::new(state);
        self.current.send_replace(state.clone());
        state
    }

    /// Delivers `state` to subscribers unless a newer snapshot replaced it
    pub(crate) fn publish(&self, state: &Arc<RouterState>) {
        if !Arc::ptr_eq(&self.snapshot(), state) {
            return;
        }

        let subscribers: Vec<Subscriber> = lock(&self.subscribers)
            .iter()
            .map(|(_, subscriber)| subscriber.clone())
            .collect();
        for subscriber in subscribers {
            subscriber(state);
        }
    }

    pub(crate) fn clear_subscribers(&self) {
        lock(&self.subscribers).clear();
    }
}

fn lock(subscribers: &Subscribers) -> MutexGuard<'_, Vec<(u64, Subscriber)>> {
    subscribers.lock().unwrap_or_else(PoisonError::into_inner)
}
