/// Route definitions and the compiled, ranked route tree
use std::collections::HashMap;

use crate::matcher::{match_branch, RouteMatch, SplitPathname};
use crate::path::{join_paths, normalize_path, strip_basename};
use crate::route::{explode_optional_segments, CompiledPattern};
use crate::{Params, RouteConfigError};

/// Declarative description of one node in the route tree
///
/// `H` is an opaque payload carried through to the compiled tree, used by
/// callers to attach loaders, actions or anything else to a route.
///
/// # Examples
///
/// ```
/// use silcrow_router::RouteDefinition;
///
/// let users: RouteDefinition = RouteDefinition::new("users")
///     .with_id("users")
///     .with_error_boundary(true)
///     .with_child(RouteDefinition::index())
///     .with_child(RouteDefinition::new(":id"));
///
/// assert_eq!(users.children.len(), 2);
/// assert!(users.children[0].index);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RouteDefinition<H = ()> {
    /// Explicit id; generated from the tree position when absent
    pub id: Option<String>,
    /// Path pattern, relative to the parent unless it starts with `/`
    pub path: Option<String>,
    pub index: bool,
    /// Overrides the tree-wide case sensitivity for this route's segments
    pub case_sensitive: Option<bool>,
    pub error_boundary: bool,
    pub handle: H,
    pub children: Vec<RouteDefinition<H>>,
}

impl<H: Default> RouteDefinition<H> {
    /// A route with a path pattern
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// An index route: matches when its parent's path is fully consumed
    pub fn index() -> Self {
        Self {
            index: true,
            ..Self::default()
        }
    }

    /// A path-less layout route
    pub fn layout() -> Self {
        Self::default()
    }
}

impl<H> RouteDefinition<H> {
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_children(mut self, children: Vec<RouteDefinition<H>>) -> Self {
        self.children = children;
        self
    }

    pub fn with_child(mut self, child: RouteDefinition<H>) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_error_boundary(mut self, error_boundary: bool) -> Self {
        self.error_boundary = error_boundary;
        self
    }

    pub fn with_case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = Some(case_sensitive);
        self
    }

    pub fn with_handle(mut self, handle: H) -> Self {
        self.handle = handle;
        self
    }
}

/// A route inside a compiled [`RouteTree`]
#[derive(Debug)]
pub struct RouteNode<H> {
    id: String,
    path: Option<String>,
    index: bool,
    case_sensitive: Option<bool>,
    error_boundary: bool,
    parent: Option<usize>,
    handle: H,
}

impl<H> RouteNode<H> {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn is_index(&self) -> bool {
        self.index
    }

    /// Whether this route contributes segments to the pathname
    pub fn has_path(&self) -> bool {
        self.path.as_deref().is_some_and(|path| !path.is_empty())
    }

    pub fn case_sensitive(&self) -> Option<bool> {
        self.case_sensitive
    }

    pub fn error_boundary(&self) -> bool {
        self.error_boundary
    }

    pub fn handle(&self) -> &H {
        &self.handle
    }
}

/// One link of a branch: a route and the pattern variant it contributes
#[derive(Debug, Clone)]
pub(crate) struct BranchLink {
    pub node: usize,
    pub pattern: CompiledPattern,
}

/// A complete root-to-leaf path the tree can produce, with its score
#[derive(Debug, Clone)]
pub struct RouteBranch {
    path: String,
    score: u32,
    pub(crate) links: Vec<BranchLink>,
}

impl RouteBranch {
    /// Full joined pattern of the branch
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    /// Number of routes in the chain, root included
    pub fn depth(&self) -> usize {
        self.links.len()
    }
}

/// Compiled route tree with branches ranked by specificity
///
/// Validated once by [`RouteTree::new`]; matching never fails afterward.
///
/// # Examples
///
/// ```
/// use silcrow_router::{RouteDefinition, RouteTree};
///
/// let tree: RouteTree = RouteTree::new(vec![RouteDefinition::new("/")
///     .with_id("root")
///     .with_child(RouteDefinition::new("users/:id").with_id("user"))
///     .with_child(RouteDefinition::new("users/new").with_id("new-user"))])
/// .unwrap();
///
/// let matches = tree.match_routes("/users/new").unwrap();
/// assert_eq!(matches.last().unwrap().route_id, "new-user");
///
/// let matches = tree.match_routes("/users/7").unwrap();
/// assert_eq!(matches[1].params.get("id"), Some(&"7".to_string()));
///
/// assert!(tree.match_routes("/missing").is_none());
/// ```
#[derive(Debug)]
pub struct RouteTree<H = ()> {
    nodes: Vec<RouteNode<H>>,
    by_id: HashMap<String, usize>,
    branches: Vec<RouteBranch>,
    top_level: Vec<usize>,
    case_sensitive: bool,
}

type Chain = Vec<(usize, String)>;

impl<H> RouteTree<H> {
    /// Compiles and ranks a route tree
    pub fn new(routes: Vec<RouteDefinition<H>>) -> Result<Self, RouteConfigError> {
        let mut tree = Self {
            nodes: Vec::new(),
            by_id: HashMap::new(),
            branches: Vec::new(),
            top_level: Vec::new(),
            case_sensitive: false,
        };

        tree.flatten(routes, None, "", &[Vec::new()])?;
        // Stable: equal scores keep declaration order
        tree.branches.sort_by(|a, b| b.score.cmp(&a.score));

        Ok(tree)
    }

    /// Sets the default case sensitivity for routes without their own
    pub fn with_case_sensitivity(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    /// Resolves a pathname to its root-to-leaf match chain
    ///
    /// `None` means nothing matched; callers decide how to surface it.
    pub fn match_routes(&self, pathname: &str) -> Option<Vec<RouteMatch>> {
        let normalized = normalize_path(pathname);
        let split = SplitPathname::new(&normalized);

        self.branches
            .iter()
            .find_map(|branch| match_branch(branch, &self.nodes, &split, self.case_sensitive))
    }

    /// Like [`match_routes`](Self::match_routes) for a pathname under `basename`
    ///
    /// Match pathnames are relative to the basename.
    pub fn match_routes_with_basename(
        &self,
        pathname: &str,
        basename: &str,
    ) -> Option<Vec<RouteMatch>> {
        let stripped = strip_basename(pathname, basename)?;
        self.match_routes(&stripped)
    }

    /// Match chain used to host a not-found error
    ///
    /// The single top-level route, or else the first top-level index,
    /// path-less or `/` route.
    pub fn fallback_match(&self) -> Option<Vec<RouteMatch>> {
        let root = match self.top_level.as_slice() {
            [only] => Some(*only),
            many => many.iter().copied().find(|&index| {
                let node = &self.nodes[index];
                node.index || node.path.as_deref().map_or(true, |p| normalize_path(p) == "/")
            }),
        }?;

        Some(vec![RouteMatch {
            route_id: self.nodes[root].id.clone(),
            params: Params::new(),
            pathname: "/".to_string(),
            pathname_base: "/".to_string(),
        }])
    }

    pub fn route(&self, id: &str) -> Option<&RouteNode<H>> {
        self.by_id.get(id).map(|&index| &self.nodes[index])
    }

    /// Id of the parent route, if `id` is nested
    pub fn parent_id(&self, id: &str) -> Option<&str> {
        let parent = self.route(id)?.parent?;
        Some(self.nodes[parent].id())
    }

    /// All routes in depth-first declaration order
    pub fn routes(&self) -> impl Iterator<Item = &RouteNode<H>> {
        self.nodes.iter()
    }

    /// Branches in match order, most specific first
    pub fn branches(&self) -> &[RouteBranch] {
        &self.branches
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    fn flatten(
        &mut self,
        routes: Vec<RouteDefinition<H>>,
        parent: Option<usize>,
        parent_path: &str,
        parent_chains: &[Chain],
    ) -> Result<(), RouteConfigError> {
        let parent_id = parent.map(|index| self.nodes[index].id.clone());

        for (position, route) in routes.into_iter().enumerate() {
            let RouteDefinition {
                id,
                path,
                index,
                case_sensitive,
                error_boundary,
                handle,
                children,
            } = route;

            let id = id.unwrap_or_else(|| match &parent_id {
                Some(parent_id) => format!("{}-{}", parent_id, position),
                None => position.to_string(),
            });

            if index && !children.is_empty() {
                return Err(RouteConfigError::IndexWithChildren(id));
            }
            if self.by_id.contains_key(&id) {
                return Err(RouteConfigError::DuplicateRouteId(id));
            }

            let relative = relative_path(path.as_deref(), parent_path)?;
            let full_path = join_paths(parent_path, &relative);

            let node = self.nodes.len();
            self.by_id.insert(id.clone(), node);
            self.nodes.push(RouteNode {
                id,
                path,
                index,
                case_sensitive,
                error_boundary,
                parent,
                handle,
            });
            if parent.is_none() {
                self.top_level.push(node);
            }

            let variants = explode_optional_segments(&relative);
            let chains: Vec<Chain> = parent_chains
                .iter()
                .flat_map(|chain| {
                    variants.iter().map(move |variant| {
                        let mut extended = chain.clone();
                        extended.push((node, variant.clone()));
                        extended
                    })
                })
                .collect();

            // Children rank ahead of their parent at equal score
            self.flatten(children, Some(node), &full_path, &chains)?;

            // Path-less layouts never match on their own
            if index || self.nodes[node].path.is_some() {
                for chain in &chains {
                    self.push_branch(chain, index)?;
                }
            }
        }

        Ok(())
    }

    fn push_branch(&mut self, chain: &[(usize, String)], index: bool) -> Result<(), RouteConfigError> {
        let joined = chain
            .iter()
            .fold(String::new(), |acc, (_, variant)| join_paths(&acc, variant));

        let full = CompiledPattern::parse(&joined)?;
        let links = chain
            .iter()
            .map(|(node, variant)| {
                Ok(BranchLink {
                    node: *node,
                    pattern: CompiledPattern::parse(variant)?,
                })
            })
            .collect::<Result<Vec<_>, RouteConfigError>>()?;

        self.branches.push(RouteBranch {
            score: full.score(index),
            path: joined,
            links,
        });
        Ok(())
    }
}

/// Path a route contributes below its parent
///
/// Absolute child paths must extend the parent's joined path.
fn relative_path(path: Option<&str>, parent_path: &str) -> Result<String, RouteConfigError> {
    let Some(path) = path else {
        return Ok(String::new());
    };
    if !path.starts_with('/') || parent_path.is_empty() {
        return Ok(path.to_string());
    }

    let absolute = normalize_path(path);
    let parent = normalize_path(parent_path);
    if parent == "/" {
        return Ok(absolute.into_owned());
    }

    match absolute.strip_prefix(parent.as_ref()) {
        Some("") => Ok(String::new()),
        Some(rest) if rest.starts_with('/') => Ok(rest.to_string()),
        _ => Err(RouteConfigError::AbsoluteChildPath {
            path: path.to_string(),
            parent: parent.into_owned(),
        }),
    }
}
