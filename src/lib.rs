//! rpc-dispatch
//!
//! oRPC-style call-execution core: named procedures organized into router
//! trees, executed through composable middleware chains with typed error
//! propagation and asynchronously loaded (lazy) subtrees.
//!
//! The crate is the runtime half of an RPC framework. It consumes finished,
//! immutable [`Procedure`]/[`Router`] shapes and an opaque [`Validator`]
//! capability, and exposes the [`Invoker`] as the sole integration point for
//! transport adapters. Wire formats, schema languages, and fluent typed
//! builder surfaces live outside this crate.
//!
//! # Example
//! ```rust,ignore
//! use rpc_dispatch::prelude::*;
//! use serde_json::json;
//!
//! let ping = Procedure::builder()
//!     .input(numeric_val())
//!     .handler(|req| async move { Ok(req.input) });
//!
//! let router = Router::new().procedure("ping", ping);
//! let matcher = Matcher::new(&router);
//! let invoker = Invoker::new();
//!
//! let out = invoker
//!     .call_path(&matcher, None, "/ping", json!({"val": "18"}), CallOptions::new())
//!     .await?;
//! assert_eq!(out, json!({"val": 18}));
//! ```

pub mod context;
pub mod error;
pub mod executor;
pub mod invoker;
pub mod lazy;
pub mod matcher;
pub mod middleware;
pub mod procedure;
pub mod router;
pub mod signal;
pub mod validator;

pub use context::Context;
pub use error::{ErrorCode, RpcError, RpcResult};
pub use invoker::{
    CallFailure, CallFinish, CallId, CallOptions, CallStart, CallSuccess, CallTarget,
    ContextSource, Hooks, InterceptNext, InterceptRequest, Interceptor, Invoker,
};
pub use lazy::{Lazy, LazyRouter};
pub use matcher::{MatchResult, Matcher, PathFilter};
pub use middleware::{ChainOutcome, Flow, MiddlewareFn, Next, StepRequest};
pub use procedure::{
    ErrorSpec, HandlerRequest, Method, Procedure, ProcedureBuilder, RouteMeta,
};
pub use router::{Router, RouterNode, get_child};
pub use signal::CancellationSignal;
pub use validator::{Issue, SharedValidator, Validator};

/// Convenience re-exports for consumers.
pub mod prelude {
    pub use crate::context::Context;
    pub use crate::error::{ErrorCode, RpcError, RpcResult};
    pub use crate::invoker::{CallOptions, Hooks, Invoker};
    pub use crate::lazy::{Lazy, LazyRouter};
    pub use crate::matcher::Matcher;
    pub use crate::middleware::{Flow, Next, StepRequest};
    pub use crate::procedure::{ErrorSpec, HandlerRequest, Method, Procedure, RouteMeta};
    pub use crate::router::{Router, RouterNode};
    pub use crate::signal::CancellationSignal;
    pub use crate::validator::{self, Issue};
}

#[cfg(test)]
mod tests;
