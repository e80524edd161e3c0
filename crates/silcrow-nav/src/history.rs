//! The history collaborator: where locations are pushed and pops come from.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::location::Location;

/// How the current location was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HistoryAction {
    Push,
    Replace,
    /// Back/forward, or the initial entry
    Pop,
}

/// An externally driven location change
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryUpdate {
    pub action: HistoryAction,
    pub location: Location,
    pub delta: Option<isize>,
}

pub type HistoryListener = Arc<dyn Fn(HistoryUpdate) + Send + Sync>;

/// Stops a listener registered with [`History::listen`]
pub type Unlisten = Box<dyn FnOnce() + Send + Sync>;

/// Abstract history stack
///
/// Only `go` (back/forward) notifies listeners; `push` and `replace` are
/// initiated by the navigator itself.
pub trait History: Send + Sync {
    fn location(&self) -> Location;
    fn push(&self, location: Location);
    fn replace(&self, location: Location);
    fn go(&self, delta: isize);
    fn listen(&self, listener: HistoryListener) -> Unlisten;
}

/// A fresh, unique entry key
pub fn create_key() -> String {
    Uuid::new_v4().simple().to_string()
}

#[derive(Default)]
struct MemoryState {
    entries: Vec<Location>,
    index: usize,
    listeners: Vec<(u64, HistoryListener)>,
    next_listener: u64,
}

/// In-memory history stack for tests and non-browser hosts
///
/// # Examples
///
/// ```
/// use silcrow_nav::{History, Location, MemoryHistory};
///
/// let history = MemoryHistory::new(["/", "/about"]);
/// assert_eq!(history.location().pathname, "/about");
///
/// history.push(Location::parse("/contact"));
/// history.go(-2);
/// assert_eq!(history.location().pathname, "/");
/// assert_eq!(history.len(), 3);
/// ```
#[derive(Clone)]
pub struct MemoryHistory {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryHistory {
    /// A stack of `entries`, positioned on the last one
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut entries: Vec<Location> = entries
            .into_iter()
            .enumerate()
            .map(|(position, href)| {
                let location = Location::parse(href.as_ref());
                if position == 0 {
                    location
                } else {
                    location.with_key(create_key())
                }
            })
            .collect();
        if entries.is_empty() {
            entries.push(Location::default());
        }

        let index = entries.len() - 1;
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                entries,
                index,
                ..MemoryState::default()
            })),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    pub fn index(&self) -> usize {
        self.lock().index
    }

    pub fn entries(&self) -> Vec<Location> {
        self.lock().entries.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryHistory {
    fn default() -> Self {
        Self::new(["/"])
    }
}

impl History for MemoryHistory {
    fn location(&self) -> Location {
        let state = self.lock();
        state.entries[state.index].clone()
    }

    fn push(&self, location: Location) {
        let mut state = self.lock();
        let next = state.index + 1;
        state.entries.truncate(next);
        state.entries.push(location);
        state.index = next;
    }

    fn replace(&self, location: Location) {
        let mut state = self.lock();
        let index = state.index;
        state.entries[index] = location;
    }

    fn go(&self, delta: isize) {
        let (update, listeners) = {
            let mut state = self.lock();
            let last = state.entries.len() as isize - 1;
            let target = (state.index as isize + delta).clamp(0, last) as usize;
            state.index = target;

            let update = HistoryUpdate {
                action: HistoryAction::Pop,
                location: state.entries[target].clone(),
                delta: Some(delta),
            };
            let listeners: Vec<HistoryListener> =
                state.listeners.iter().map(|(_, l)| l.clone()).collect();
            (update, listeners)
        };

        // Listeners may call back into the history
        for listener in listeners {
            listener(update.clone());
        }
    }

    fn listen(&self, listener: HistoryListener) -> Unlisten {
        let id = {
            let mut state = self.lock();
            let id = state.next_listener;
            state.next_listener += 1;
            state.listeners.push((id, listener));
            id
        };

        let state = Arc::downgrade(&self.state);
        Box::new(move || {
            if let Some(state) = state.upgrade() {
                state
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .listeners
                    .retain(|(listener_id, _)| *listener_id != id);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::DEFAULT_LOCATION_KEY;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_push_truncates_forward_entries() {
        let history = MemoryHistory::new(["/a", "/b", "/c"]);
        history.go(-2);
        history.push(Location::parse("/d"));

        let paths: Vec<String> = history.entries().into_iter().map(|l| l.pathname).collect();
        assert_eq!(paths, vec!["/a", "/d"]);
        assert_eq!(history.index(), 1);
    }

    #[test]
    fn test_replace_keeps_length() {
        let history = MemoryHistory::default();
        history.replace(Location::parse("/x"));
        assert_eq!(history.len(), 1);
        assert_eq!(history.location().pathname, "/x");
    }

    #[test]
    fn test_go_clamps_and_notifies() {
        let history = MemoryHistory::new(["/a", "/b"]);
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let _unlisten = history.listen(Arc::new(move |update: HistoryUpdate| {
            assert_eq!(update.action, HistoryAction::Pop);
            assert_eq!(update.location.pathname, "/a");
            seen.fetch_add(1, Ordering::SeqCst);
        }));

        history.go(-5);
        assert_eq!(history.index(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unlisten() {
        let history = MemoryHistory::new(["/a", "/b"]);
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let unlisten = history.listen(Arc::new(move |_: HistoryUpdate| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));

        unlisten();
        history.go(-1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_initial_entry_has_default_key() {
        let history = MemoryHistory::new(["/a", "/b"]);
        let entries = history.entries();
        assert_eq!(entries[0].key, DEFAULT_LOCATION_KEY);
        assert_ne!(entries[1].key, DEFAULT_LOCATION_KEY);
    }
}
