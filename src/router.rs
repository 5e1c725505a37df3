//! Router trees
//!
//! A router is a named tree whose leaves are procedures and whose internal
//! nodes are plain mappings or lazy nodes wrapping either. The tree's shape
//! is fixed at construction; only the content of lazy subtrees is unknown
//! until loaded. Contract leaves mark positions a published contract
//! declares but the implementation does not provide — the metadata is an
//! explicit variant on the node type rather than a hidden side channel.

use crate::lazy::Lazy;
use crate::procedure::{Procedure, RouteMeta};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// One position in a router tree.
#[derive(Debug, Clone)]
pub enum RouterNode {
    /// A callable leaf.
    Procedure(Arc<Procedure>),
    /// A nested plain mapping.
    Router(Arc<Router>),
    /// A deferred subtree (router or procedure), loaded on demand.
    Lazy(Lazy),
    /// Declared by contract, not implemented. Matching this leaf is a fatal
    /// misconfiguration, not a routing miss.
    Contract(RouteMeta),
}

/// Named tree of procedures and sub-routers.
///
/// # Example
/// ```rust,ignore
/// let router = Router::new()
///     .procedure("ping", ping)
///     .nest("users", users_router())
///     .lazy("admin", || async { Ok(Some(RouterNode::Router(Arc::new(admin_router())))) });
/// ```
#[derive(Debug, Clone, Default)]
pub struct Router {
    pub(crate) children: BTreeMap<String, RouterNode>,
}

impl Router {
    /// Create an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a procedure leaf.
    pub fn procedure(mut self, name: impl Into<String>, procedure: Procedure) -> Self {
        self.children
            .insert(name.into(), RouterNode::Procedure(Arc::new(procedure)));
        self
    }

    /// Nest another router under a name.
    pub fn nest(mut self, name: impl Into<String>, router: Router) -> Self {
        self.children
            .insert(name.into(), RouterNode::Router(Arc::new(router)));
        self
    }

    /// Add a lazy subtree. A fresh loader is installed unresolved; it runs
    /// at most once, on first access.
    pub fn lazy<F, Fut>(mut self, name: impl Into<String>, loader: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = crate::RpcResult<Option<RouterNode>>> + Send + 'static,
    {
        self.children
            .insert(name.into(), RouterNode::Lazy(Lazy::new(loader)));
        self
    }

    /// Add an already-built node.
    pub fn node(mut self, name: impl Into<String>, node: RouterNode) -> Self {
        self.children.insert(name.into(), node);
        self
    }

    /// Declare a contract leaf without an implementation.
    pub fn contract(mut self, name: impl Into<String>, meta: RouteMeta) -> Self {
        self.children
            .insert(name.into(), RouterNode::Contract(meta));
        self
    }

    /// Merge another router's children into this one; `other`'s entries win
    /// on name conflict.
    pub fn merge(mut self, other: Router) -> Self {
        self.children.extend(other.children);
        self
    }

    /// Look up a direct child.
    pub fn get(&self, name: &str) -> Option<&RouterNode> {
        self.children.get(name)
    }

    /// Iterate over direct children.
    pub fn children(&self) -> impl Iterator<Item = (&String, &RouterNode)> {
        self.children.iter()
    }

    /// Sorted dotted paths of all statically known leaves (procedures and
    /// contract declarations). Unresolved lazy subtrees are not listed.
    pub fn procedure_paths(&self) -> Vec<String> {
        fn walk(prefix: &str, router: &Router, out: &mut Vec<String>) {
            for (name, node) in &router.children {
                let path = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{prefix}.{name}")
                };
                match node {
                    RouterNode::Procedure(_) | RouterNode::Contract(_) => out.push(path),
                    RouterNode::Router(nested) => walk(&path, nested, out),
                    RouterNode::Lazy(_) => {}
                }
            }
        }
        let mut paths = Vec::new();
        walk("", self, &mut paths);
        paths
    }
}

impl fmt::Display for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Router({} children)", self.children.len())
    }
}

/// Walk `segments` down from `node`.
///
/// - No segments left: the current node matches.
/// - A procedure or contract leaf with segments remaining: no match.
/// - A lazy node is never resolved eagerly: the result is a new flattened
///   lazy node whose loader resolves this node and applies `get_child` to
///   the outcome with the same remaining segments.
pub fn get_child(node: &RouterNode, segments: &[String]) -> Option<RouterNode> {
    let Some((head, rest)) = segments.split_first() else {
        return Some(node.clone());
    };
    match node {
        RouterNode::Procedure(_) | RouterNode::Contract(_) => None,
        RouterNode::Router(nested) => nested
            .children
            .get(head)
            .and_then(|child| get_child(child, rest)),
        RouterNode::Lazy(lazy) => {
            let lazy = lazy.clone();
            let remaining: Vec<String> = segments.to_vec();
            Some(RouterNode::Lazy(
                Lazy::new(move || {
                    let lazy = lazy.clone();
                    let remaining = remaining.clone();
                    async move {
                        match lazy.load().await? {
                            None => Ok(None),
                            Some(resolved) => Ok(get_child(&resolved, &remaining)),
                        }
                    }
                })
                .flatten(),
            ))
        }
    }
}
