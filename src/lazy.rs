//! Lazy router nodes
//!
//! A [`Lazy`] is a deferred, memoized reference to a subtree (a router, a
//! procedure, or nothing). The loader runs at most once per node: the first
//! `load` call starts it and every caller — including concurrent ones racing
//! before resolution — converges on the same settled result, success or
//! failure.
//!
//! Chains of lazy-of-lazy flatten into a single node whose load transitively
//! awaits until a non-lazy value is reached, and child navigation
//! ([`Lazy::child`]) produces new lazy nodes without awaiting anything, so a
//! caller can walk `admin.users.list` before the subtree has loaded.

use crate::error::{RpcError, RpcResult};
use crate::procedure::Procedure;
use crate::router::{self, RouterNode};
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Loader producing a subtree (or nothing) once.
pub type LazyLoader =
    Arc<dyn Fn() -> BoxFuture<'static, RpcResult<Option<RouterNode>>> + Send + Sync>;

struct LazyInner {
    loader: LazyLoader,
    cell: OnceCell<RpcResult<Option<RouterNode>>>,
}

/// Memoized, asynchronously resolved placeholder for a router subtree.
///
/// Clones share the memoized state; a fresh `Lazy::new` produces a fresh,
/// unresolved node.
#[derive(Clone)]
pub struct Lazy {
    inner: Arc<LazyInner>,
}

impl Lazy {
    /// Create a lazy node from an async loader closure.
    pub fn new<F, Fut>(loader: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RpcResult<Option<RouterNode>>> + Send + 'static,
    {
        Self::from_loader(Arc::new(move || Box::pin(loader())))
    }

    /// Create a lazy node from an already-boxed loader.
    pub fn from_loader(loader: LazyLoader) -> Self {
        Self {
            inner: Arc::new(LazyInner {
                loader,
                cell: OnceCell::new(),
            }),
        }
    }

    /// Resolve the node.
    ///
    /// The first call invokes the loader; the settled result (success or
    /// failure) is cached for the lifetime of the node and returned to every
    /// subsequent and concurrent caller without re-invoking the loader.
    pub async fn load(&self) -> RpcResult<Option<RouterNode>> {
        let loader = self.inner.loader.clone();
        self.inner
            .cell
            .get_or_init(move || async move { loader().await })
            .await
            .clone()
    }

    /// True once the node has settled (without triggering resolution).
    pub fn is_resolved(&self) -> bool {
        self.inner.cell.initialized()
    }

    /// Collapse lazy-of-lazy nesting: the returned node's load awaits
    /// repeatedly while the resolved value is itself lazy, terminating at
    /// the first non-lazy value (or nothing).
    ///
    /// Flattening is idempotent and never re-invokes an already-memoized
    /// inner loader; there is no fixed bound on nesting depth.
    pub fn flatten(&self) -> Lazy {
        let node = self.clone();
        Lazy::new(move || {
            let node = node.clone();
            async move {
                let mut current = node.load().await?;
                while let Some(RouterNode::Lazy(inner)) = current {
                    current = inner.load().await?;
                }
                Ok(current)
            }
        })
    }

    /// The child at `key` once this node resolves, as a new flattened lazy
    /// node. Navigation itself never awaits; only loading the returned node
    /// does.
    pub fn child(&self, key: impl Into<String>) -> Lazy {
        let key: String = key.into();
        let parent = self.clone();
        Lazy::new(move || {
            let parent = parent.clone();
            let key = key.clone();
            async move {
                match parent.load().await? {
                    None => Ok(None),
                    Some(node) => Ok(router::get_child(&node, std::slice::from_ref(&key))),
                }
            }
        })
        .flatten()
    }
}

impl fmt::Debug for Lazy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lazy")
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

/// Navigable handle over a lazily loaded router subtree.
///
/// Wraps a flattened [`Lazy`] so callers can walk `lazy.child("nested")
/// .child("ping")` without awaiting, then resolve a leaf with
/// [`LazyRouter::procedure`].
#[derive(Debug, Clone)]
pub struct LazyRouter {
    node: Lazy,
}

impl LazyRouter {
    /// Wrap a lazy node (flattened on entry).
    pub fn new(node: Lazy) -> Self {
        Self {
            node: node.flatten(),
        }
    }

    /// Navigate to a child without resolving anything.
    pub fn child(&self, key: impl Into<String>) -> LazyRouter {
        LazyRouter {
            node: self.node.child(key),
        }
    }

    /// The underlying lazy node.
    pub fn node(&self) -> &Lazy {
        &self.node
    }

    /// Resolve this position to a leaf procedure.
    ///
    /// A missing position resolves to `NOT_FOUND`; a contract leaf without
    /// an implementation is a fatal misconfiguration (`NOT_IMPLEMENTED`).
    pub async fn procedure(&self) -> RpcResult<Arc<Procedure>> {
        match self.node.load().await? {
            Some(RouterNode::Procedure(procedure)) => Ok(procedure),
            Some(RouterNode::Contract(_)) => Err(RpcError::not_implemented(
                "procedure is declared by contract but not implemented",
            )),
            Some(RouterNode::Router(_)) => {
                Err(RpcError::not_found("path resolves to a router, not a procedure"))
            }
            // flatten() on entry guarantees no lazy value survives here
            Some(RouterNode::Lazy(_)) | None => Err(RpcError::not_found("no procedure at path")),
        }
    }
}

impl From<Lazy> for LazyRouter {
    fn from(node: Lazy) -> Self {
        Self::new(node)
    }
}
