//! Revalidation policy: which loaders run for a transition.
//!
//! Precedence, highest first:
//! 1. a route that is new to the match set, or has no data yet, always loads
//! 2. a forced revalidation always loads, whatever the route's predicate says
//! 3. the route's `should_revalidate` predicate, when present, decides
//! 4. otherwise the default: reload after a mutation or explicit
//!    revalidation, when the search changed, when the URL is unchanged, or
//!    when the route's own pathname or params changed

use std::collections::{HashMap, HashSet};

use silcrow_router::RouteMatch;

use crate::location::Location;
use crate::routes::Routes;
use crate::store::{FetcherState, RouterState};
use crate::submission::FormMethod;
use crate::Params;

/// Arguments handed to a route's `should_revalidate` predicate
#[derive(Debug, Clone)]
pub struct ShouldRevalidateArgs {
    pub current_url: Location,
    pub current_params: Params,
    pub next_url: Location,
    pub next_params: Params,
    /// Method of the submission that triggered this revalidation
    pub form_method: Option<FormMethod>,
    /// Status of the action that ran, when one did
    pub action_status: Option<u16>,
    /// What the navigator would do without a predicate
    pub default_should_revalidate: bool,
}

/// Everything the plan depends on
pub(crate) struct RevalidationInput<'a> {
    pub current: &'a RouterState,
    pub next_location: &'a Location,
    pub next_matches: &'a [RouteMatch],
    pub form_method: Option<FormMethod>,
    pub action_status: Option<u16>,
    /// Set after mutations and explicit revalidation
    pub revalidation_required: bool,
    /// Dominates every predicate
    pub force: bool,
    /// Initial load: only fill in missing data
    pub initial: bool,
}

/// A fetcher whose last load may be repeated on revalidation
#[derive(Debug, Clone)]
pub(crate) struct FetchLoad {
    pub route_id: String,
    pub location: Location,
    pub params: Params,
    /// Consumer opt-in; `false` keeps the fetcher out of every revalidation
    pub revalidate: bool,
}

/// Indexes into `next_matches` whose loaders must run
pub(crate) fn matches_to_load(routes: &Routes, input: &RevalidationInput<'_>) -> Vec<usize> {
    let current = input.current;

    input
        .next_matches
        .iter()
        .enumerate()
        .filter(|(index, next)| {
            let Some(route) = routes.route(&next.route_id) else {
                return false;
            };
            if route.handle().loader.is_none() {
                return false;
            }

            let current_match = current
                .matches
                .get(*index)
                .filter(|m| m.route_id == next.route_id);
            let has_data = current.loader_data.contains_key(&next.route_id);

            if current_match.is_none() || !has_data {
                return true;
            }
            if input.initial {
                return false;
            }
            if input.force {
                return true;
            }

            let default = default_should_revalidate(
                &current.location,
                current_match,
                input.next_location,
                next,
                input.revalidation_required,
            );

            match &route.handle().should_revalidate {
                Some(predicate) => predicate(&ShouldRevalidateArgs {
                    current_url: current.location.clone(),
                    current_params: current_match
                        .map(|m| m.params.clone())
                        .unwrap_or_default(),
                    next_url: input.next_location.clone(),
                    next_params: next.params.clone(),
                    form_method: input.form_method,
                    action_status: input.action_status,
                    default_should_revalidate: default,
                }),
                None => default,
            }
        })
        .map(|(index, _)| index)
        .collect()
}

/// Keys of loaded fetchers that should repeat their load
///
/// Fetchers with a request in flight (`in_flight`) or a submission pending
/// are skipped. Otherwise a fetcher is eligible when revalidation is
/// required or forced, or when its route is among `loading_routes`.
pub(crate) fn fetchers_to_revalidate(
    routes: &Routes,
    input: &RevalidationInput<'_>,
    fetch_loads: &HashMap<String, FetchLoad>,
    in_flight: &HashSet<String>,
    loading_routes: &HashSet<&str>,
) -> Vec<String> {
    let mut keys: Vec<String> = fetch_loads
        .iter()
        .filter(|(key, load)| {
            if !load.revalidate || in_flight.contains(*key) {
                return false;
            }

            let has_data = input
                .current
                .fetchers
                .get(*key)
                .is_some_and(|f| f.state != FetcherState::Submitting && f.data.is_some());
            if !has_data {
                return false;
            }

            let Some(route) = routes.route(&load.route_id) else {
                return false;
            };
            if route.handle().loader.is_none() {
                return false;
            }
            if input.force {
                return true;
            }

            let default = input.revalidation_required
                || loading_routes.contains(load.route_id.as_str());

            match &route.handle().should_revalidate {
                Some(predicate) => predicate(&ShouldRevalidateArgs {
                    current_url: load.location.clone(),
                    current_params: load.params.clone(),
                    next_url: load.location.clone(),
                    next_params: load.params.clone(),
                    form_method: input.form_method,
                    action_status: input.action_status,
                    default_should_revalidate: default,
                }),
                None => default,
            }
        })
        .map(|(key, _)| key.clone())
        .collect();

    keys.sort();
    keys
}

/// The conservative default for a route that stays matched
pub(crate) fn default_should_revalidate(
    current_url: &Location,
    current_match: Option<&RouteMatch>,
    next_url: &Location,
    next_match: &RouteMatch,
    revalidation_required: bool,
) -> bool {
    if revalidation_required {
        return true;
    }
    if current_url.search != next_url.search {
        return true;
    }
    // Same link clicked again, or a GET form resubmitted
    if current_url.path_and_search() == next_url.path_and_search() {
        return true;
    }

    match current_match {
        Some(current) => {
            current.pathname != next_match.pathname || current.params != next_match.params
        }
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{json, DataArgs, RouteData};
    use crate::routes::{Route, RouteExt};
    use crate::store::Fetcher;
    use serde_json::json;

    fn loader(_: DataArgs) -> std::future::Ready<crate::data::DataResult> {
        std::future::ready(json(json!(null)))
    }

    fn routes() -> Routes {
        Routes::new(vec![Route::new("/")
            .with_id("root")
            .with_loader(loader)
            .with_children(vec![
                Route::new("users/:id").with_id("user").with_loader(loader),
                Route::new("static")
                    .with_id("static")
                    .with_loader(loader)
                    .with_should_revalidate(|_| false),
                Route::new("plain").with_id("plain"),
            ])])
        .unwrap()
    }

    fn state_at(routes: &Routes, href: &str) -> RouterState {
        let location = Location::parse(href);
        let matches = routes.match_routes(&location.pathname).unwrap();
        let mut state = RouterState::new(location, matches.clone());
        for m in &matches {
            state
                .loader_data
                .insert(m.route_id.clone(), RouteData::Value(json!(m.route_id)));
        }
        state
    }

    fn plan(routes: &Routes, current: &RouterState, href: &str, required: bool, force: bool) -> Vec<String> {
        let next = Location::parse(href);
        let matches = routes.match_routes(&next.pathname).unwrap();
        let input = RevalidationInput {
            current,
            next_location: &next,
            next_matches: &matches,
            form_method: None,
            action_status: None,
            revalidation_required: required,
            force,
            initial: false,
        };
        matches_to_load(routes, &input)
            .into_iter()
            .map(|index| matches[index].route_id.clone())
            .collect()
    }

    #[test]
    fn test_param_change_reloads_only_changed_route() {
        let routes = routes();
        let current = state_at(&routes, "/users/1");
        assert_eq!(plan(&routes, &current, "/users/2", false, false), vec!["user"]);
    }

    #[test]
    fn test_search_change_reloads_everything() {
        let routes = routes();
        let current = state_at(&routes, "/users/1");
        assert_eq!(
            plan(&routes, &current, "/users/1?tab=posts", false, false),
            vec!["root", "user"]
        );
    }

    #[test]
    fn test_same_url_reloads_everything() {
        let routes = routes();
        let current = state_at(&routes, "/users/1");
        assert_eq!(plan(&routes, &current, "/users/1", false, false), vec!["root", "user"]);
    }

    #[test]
    fn test_new_route_always_loads() {
        let routes = routes();
        let current = state_at(&routes, "/users/1");
        assert_eq!(plan(&routes, &current, "/static", false, false), vec!["static"]);
    }

    #[test]
    fn test_predicate_opts_out_of_required_revalidation() {
        let routes = routes();
        let current = state_at(&routes, "/static");
        assert_eq!(plan(&routes, &current, "/static", true, false), vec!["root"]);
    }

    #[test]
    fn test_force_dominates_predicate() {
        let routes = routes();
        let current = state_at(&routes, "/static");
        assert_eq!(
            plan(&routes, &current, "/static", false, true),
            vec!["root", "static"]
        );
    }

    #[test]
    fn test_routes_without_loaders_never_load() {
        let routes = routes();
        let current = state_at(&routes, "/users/1");
        assert_eq!(plan(&routes, &current, "/plain", true, true), vec!["root"]);
    }

    #[test]
    fn test_initial_only_fills_missing_data() {
        let routes = routes();
        let mut current = state_at(&routes, "/users/1");
        current.loader_data.remove("user");

        let next = current.location.clone();
        let matches = current.matches.clone();
        let input = RevalidationInput {
            current: &current,
            next_location: &next,
            next_matches: &matches,
            form_method: None,
            action_status: None,
            revalidation_required: false,
            force: false,
            initial: true,
        };
        assert_eq!(matches_to_load(&routes, &input), vec![1]);
    }

    #[test]
    fn test_fetcher_revalidation_respects_opt_out_and_state() {
        let routes = routes();
        let mut current = state_at(&routes, "/users/1");
        let loaded = Fetcher {
            data: Some(json!(1)),
            ..Fetcher::default()
        };
        current.fetchers.insert("a".to_string(), loaded.clone());
        current.fetchers.insert("b".to_string(), loaded.clone());
        current.fetchers.insert("c".to_string(), Fetcher::default());

        let load = |revalidate| FetchLoad {
            route_id: "user".to_string(),
            location: Location::parse("/users/9"),
            params: Params::new(),
            revalidate,
        };
        let mut loads = HashMap::new();
        loads.insert("a".to_string(), load(true));
        loads.insert("b".to_string(), load(false));
        loads.insert("c".to_string(), load(true));

        let next = current.location.clone();
        let matches = current.matches.clone();
        let input = RevalidationInput {
            current: &current,
            next_location: &next,
            next_matches: &matches,
            form_method: Some(FormMethod::Post),
            action_status: Some(200),
            revalidation_required: true,
            force: false,
            initial: false,
        };

        let keys = fetchers_to_revalidate(&routes, &input, &loads, &HashSet::new(), &HashSet::new());
        assert_eq!(keys, vec!["a"]);

        let in_flight: HashSet<String> = ["a".to_string()].into_iter().collect();
        assert!(fetchers_to_revalidate(&routes, &input, &loads, &in_flight, &HashSet::new()).is_empty());
    }

    #[test]
    fn test_fetcher_follows_loading_routes_without_mutation() {
        let routes = routes();
        let mut current = state_at(&routes, "/users/1");
        current.fetchers.insert(
            "a".to_string(),
            Fetcher {
                data: Some(json!(1)),
                ..Fetcher::default()
            },
        );
        let mut loads = HashMap::new();
        loads.insert(
            "a".to_string(),
            FetchLoad {
                route_id: "user".to_string(),
                location: Location::parse("/users/9"),
                params: Params::new(),
                revalidate: true,
            },
        );

        let next = current.location.clone();
        let matches = current.matches.clone();
        let input = RevalidationInput {
            current: &current,
            next_location: &next,
            next_matches: &matches,
            form_method: None,
            action_status: None,
            revalidation_required: false,
            force: false,
            initial: false,
        };

        let none: HashSet<&str> = HashSet::new();
        assert!(fetchers_to_revalidate(&routes, &input, &loads, &HashSet::new(), &none).is_empty());

        let loading: HashSet<&str> = ["user"].into_iter().collect();
        assert_eq!(
            fetchers_to_revalidate(&routes, &input, &loads, &HashSet::new(), &loading),
            vec!["a"]
        );
    }
}
