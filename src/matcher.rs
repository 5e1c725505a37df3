//! Path matching over router trees
//!
//! [`Matcher::new`] indexes the non-lazy parts of a tree eagerly and
//! synchronously, recording every reachable leaf and the prefixes at which
//! lazy nodes sit (pending subtrees), without resolving them.
//!
//! [`Matcher::match_route`] resolves pending subtrees on demand: only the
//! lazies whose prefix covers the requested path are loaded, the loaded
//! subtree is indexed in their place (possibly yielding deeper pending
//! prefixes), and the result is cached — each loader runs at most once
//! across repeated and concurrent matches.

use crate::error::{RpcError, RpcResult};
use crate::lazy::Lazy;
use crate::procedure::{Method, Procedure};
use crate::router::{Router, RouterNode};
use std::sync::Arc;
use tokio::sync::RwLock;

/// A successful match: the procedure and the path it was found at.
#[derive(Debug, Clone)]
pub struct MatchResult {
    /// The resolved procedure.
    pub procedure: Arc<Procedure>,
    /// The matched path segments.
    pub matched_path: Vec<String>,
}

/// Predicate excluding paths from the index; excluded paths behave as
/// "not found".
pub type PathFilter = Arc<dyn Fn(&[String]) -> bool + Send + Sync>;

#[derive(Default)]
struct MatchIndex {
    /// Leaf entries: `None` marks a contract declaration without an
    /// implementation.
    leaves: std::collections::HashMap<Vec<String>, Option<Arc<Procedure>>>,
    /// Lazy subtrees encountered but not yet resolved, by prefix.
    pending: Vec<(Vec<String>, Lazy)>,
}

impl MatchIndex {
    fn insert_node(&mut self, path: Vec<String>, node: &RouterNode, filter: Option<&PathFilter>) {
        match node {
            RouterNode::Procedure(procedure) => {
                if filter.is_none_or(|keep| keep(&path)) {
                    self.leaves.insert(path, Some(procedure.clone()));
                }
            }
            RouterNode::Contract(_) => {
                if filter.is_none_or(|keep| keep(&path)) {
                    self.leaves.insert(path, None);
                }
            }
            RouterNode::Router(router) => self.insert_router(path, router, filter),
            RouterNode::Lazy(lazy) => self.pending.push((path, lazy.clone())),
        }
    }

    fn insert_router(&mut self, prefix: Vec<String>, router: &Router, filter: Option<&PathFilter>) {
        for (name, node) in router.children() {
            let mut path = prefix.clone();
            path.push(name.clone());
            self.insert_node(path, node, filter);
        }
    }

    fn pending_covering(&self, segments: &[String]) -> Option<(Vec<String>, Lazy)> {
        self.pending
            .iter()
            .find(|(prefix, _)| segments.starts_with(prefix))
            .cloned()
    }
}

/// Resolves dotted or slash paths to concrete procedures, expanding lazy
/// subtrees transparently and caching the result.
pub struct Matcher {
    index: RwLock<MatchIndex>,
    filter: Option<PathFilter>,
}

impl Matcher {
    /// Index a router eagerly (non-lazy parts only).
    pub fn new(router: &Router) -> Self {
        Self::build(router, None)
    }

    /// Index a router with a path filter; filtered paths are not indexed
    /// and match as "not found".
    pub fn with_filter(router: &Router, filter: PathFilter) -> Self {
        Self::build(router, Some(filter))
    }

    fn build(router: &Router, filter: Option<PathFilter>) -> Self {
        let mut index = MatchIndex::default();
        index.insert_router(Vec::new(), router, filter.as_ref());
        Self {
            index: RwLock::new(index),
            filter,
        }
    }

    /// Split a path on `/` or `.`, dropping empty segments.
    pub fn parse_path(path: &str) -> Vec<String> {
        path.split(['/', '.'])
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Match a path (and optionally a method) against the tree.
    ///
    /// - `Ok(None)`: nothing at this path — recoverable.
    /// - `Err` with `NOT_IMPLEMENTED`: the path is declared by contract but
    ///   has no implementation — fatal misconfiguration, distinct from a
    ///   routing miss.
    /// - A declared `route.method` differing from `method` matches nothing.
    pub async fn match_route(
        &self,
        method: Option<Method>,
        path: &str,
    ) -> RpcResult<Option<MatchResult>> {
        let segments = Self::parse_path(path);

        {
            let index = self.index.read().await;
            if index.pending_covering(&segments).is_none() {
                return Self::lookup(&index, method, segments);
            }
        }

        // Resolve exactly the pending subtrees covering this path. The lazy
        // node memoizes the loader, so racing callers converge on a single
        // in-flight resolution; the write-lock guard keeps re-indexing from
        // being applied twice.
        loop {
            let covering = {
                let index = self.index.read().await;
                index.pending_covering(&segments)
            };
            let Some((prefix, lazy)) = covering else { break };

            tracing::debug!(prefix = prefix.join("."), "resolving lazy subtree");
            let resolved = lazy.load().await?;

            let mut index = self.index.write().await;
            let was_pending = index.pending.iter().any(|(p, _)| *p == prefix);
            index.pending.retain(|(p, _)| *p != prefix);
            if !was_pending {
                continue;
            }
            match resolved {
                Some(node) => index.insert_node(prefix, &node, self.filter.as_ref()),
                // a lazy position that loads to nothing simply vanishes
                None => {}
            }
        }

        let index = self.index.read().await;
        Self::lookup(&index, method, segments)
    }

    fn lookup(
        index: &MatchIndex,
        method: Option<Method>,
        segments: Vec<String>,
    ) -> RpcResult<Option<MatchResult>> {
        match index.leaves.get(&segments) {
            None => Ok(None),
            Some(None) => Err(RpcError::not_implemented(format!(
                "procedure '{}' is declared by contract but not implemented",
                segments.join(".")
            ))),
            Some(Some(procedure)) => {
                if let (Some(requested), Some(declared)) = (method, procedure.route().method)
                    && requested != declared
                {
                    return Ok(None);
                }
                Ok(Some(MatchResult {
                    procedure: procedure.clone(),
                    matched_path: segments,
                }))
            }
        }
    }
}
