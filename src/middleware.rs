//! Middleware support for the chain executor
//!
//! A middleware receives the current [`StepRequest`] and a [`Next`]
//! continuation. It can:
//!
//! - return [`Flow::Continue`] with extra context, which is equivalent to
//!   calling `next` with that context exactly once after it returns;
//! - drive `next.run(..)` itself and return [`Flow::Done`] with the
//!   (possibly transformed) outcome;
//! - return `Flow::Done(next.short_circuit(value))` to terminate the chain
//!   immediately — downstream steps and the handler never run, but output
//!   validation still applies to `value`;
//! - return an error to abort the chain.

use crate::context::Context;
use crate::error::RpcResult;
use crate::executor::{self, ChainCore};
use crate::invoker::CallId;
use crate::signal::CancellationSignal;
use futures::future::BoxFuture;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// Request state exposed to a middleware: the context accumulated so far,
/// the (validated, once past the validation step) input, and the call's
/// path, signal, and identity.
#[derive(Debug, Clone)]
pub struct StepRequest {
    /// Context accumulated by upstream steps.
    pub context: Context,
    /// Current input value.
    pub input: Value,
    /// Matched path segments (empty when invoked directly).
    pub path: Vec<String>,
    /// Cooperative cancellation signal, shared by every step of the call.
    pub signal: CancellationSignal,
    /// Unique identity of this call.
    pub call_id: CallId,
}

/// Final result of a middleware chain: the output plus the context that
/// was accumulated up to the point the chain terminated.
#[derive(Debug, Clone)]
pub struct ChainOutcome {
    /// The produced output (pre output-validation).
    pub output: Value,
    /// Context at termination.
    pub context: Context,
}

/// What a middleware tells the executor to do after it returns.
pub enum Flow {
    /// Continue the chain, merging this context in (right-biased).
    /// Equivalent to a single automatic `next` call with this context.
    Continue(Context),
    /// The chain below this point has completed (via `next.run` or a
    /// short-circuit); this is its outcome.
    Done(ChainOutcome),
}

impl Flow {
    /// Continue with no extra context.
    pub fn pass() -> Self {
        Flow::Continue(Context::new())
    }
}

/// Continuation handle for the remainder of the chain.
///
/// `Next` is a cheap clone over shared chain state. Calling [`Next::run`]
/// more than once independently replays the static suffix of the chain from
/// this position — each call re-executes every downstream step with the
/// context supplied at that call, and every replay observes the same
/// cancellation signal. Downstream middleware with side effects must expect
/// one invocation per upstream `run`.
#[derive(Clone)]
pub struct Next {
    pub(crate) chain: Arc<ChainCore>,
    pub(crate) index: usize,
    pub(crate) context: Context,
    pub(crate) input: Value,
}

impl Next {
    /// Merge `extra` into the current context (right-biased) and run the
    /// rest of the chain, invoking the handler once the cursor passes the
    /// end of the middleware list.
    pub async fn run(&self, extra: Context) -> RpcResult<ChainOutcome> {
        executor::run_chain(
            self.chain.clone(),
            self.index,
            self.context.clone().merge(extra),
            self.input.clone(),
        )
        .await
    }

    /// Terminate the chain immediately with a fixed output and the context
    /// accumulated so far. Downstream steps and the handler do not run;
    /// output validation is still applied by the executor boundary.
    pub fn short_circuit(&self, output: Value) -> ChainOutcome {
        ChainOutcome {
            output,
            context: self.context.clone(),
        }
    }
}

/// Middleware function type.
pub type MiddlewareFn =
    Arc<dyn Fn(StepRequest, Next) -> BoxFuture<'static, RpcResult<Flow>> + Send + Sync>;

/// Create middleware from an async function.
///
/// # Example
/// ```rust,ignore
/// let auth = middleware::from_fn(|req: StepRequest, _next: Next| async move {
///     match req.context.get("user") {
///         Some(_) => Ok(Flow::pass()),
///         None => Err(RpcError::unauthorized("login required")),
///     }
/// });
/// ```
pub fn from_fn<F, Fut>(f: F) -> MiddlewareFn
where
    F: Fn(StepRequest, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = RpcResult<Flow>> + Send + 'static,
{
    Arc::new(move |req, next| Box::pin(f(req, next)))
}
