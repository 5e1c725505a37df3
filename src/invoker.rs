//! Call invocation
//!
//! The [`Invoker`] is the sole integration point for transports: it resolves
//! a (possibly lazy) procedure, resolves the per-call context, wraps the
//! middleware-chain execution in an onion of interceptors, fires lifecycle
//! hooks, and normalizes errors at the boundary.

use crate::context::Context;
use crate::error::{RpcError, RpcResult};
use crate::executor;
use crate::lazy::{Lazy, LazyRouter};
use crate::matcher::Matcher;
use crate::middleware::ChainOutcome;
use crate::procedure::{Method, Procedure};
use crate::signal::CancellationSignal;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

// =============================================================================
// Call ID (UUID v7 Newtype)
// =============================================================================

/// A unique, time-ordered call identifier based on UUID v7.
///
/// Attached to every invocation; surfaced to hooks and middleware for
/// correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(Uuid);

impl CallId {
    /// Create a new call ID using UUID v7.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Create a call ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "call_{}", self.0)
    }
}

// =============================================================================
// Lifecycle Hooks
// =============================================================================

/// Observed when a call starts executing.
#[derive(Debug, Clone)]
pub struct CallStart {
    /// Identity of the call.
    pub call_id: CallId,
    /// Path the call was addressed to.
    pub path: Vec<String>,
    /// Raw input (pre-validation).
    pub input: Value,
}

/// Observed when a call produced an output.
#[derive(Debug, Clone)]
pub struct CallSuccess {
    /// Identity of the call.
    pub call_id: CallId,
    /// Path the call was addressed to.
    pub path: Vec<String>,
    /// Final output (post-validation).
    pub output: Value,
}

/// Observed when a call failed.
#[derive(Debug, Clone)]
pub struct CallFailure {
    /// Identity of the call.
    pub call_id: CallId,
    /// Path the call was addressed to.
    pub path: Vec<String>,
    /// The error, post boundary normalization.
    pub error: RpcError,
}

/// Observed when a call finishes, success or failure.
#[derive(Debug, Clone)]
pub struct CallFinish {
    /// Identity of the call.
    pub call_id: CallId,
    /// Path the call was addressed to.
    pub path: Vec<String>,
}

/// Telemetry side-effect points around a call.
///
/// Hooks observe already-computed values and cannot alter them; a panicking
/// hook is outside the contract.
#[derive(Clone, Default)]
pub struct Hooks {
    on_start: Option<Arc<dyn Fn(&CallStart) + Send + Sync>>,
    on_success: Option<Arc<dyn Fn(&CallSuccess) + Send + Sync>>,
    on_error: Option<Arc<dyn Fn(&CallFailure) + Send + Sync>>,
    on_finish: Option<Arc<dyn Fn(&CallFinish) + Send + Sync>>,
}

impl Hooks {
    /// Create an empty hook set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run before the call executes.
    pub fn on_start<F: Fn(&CallStart) + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.on_start = Some(Arc::new(f));
        self
    }

    /// Run when the call produced an output.
    pub fn on_success<F: Fn(&CallSuccess) + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.on_success = Some(Arc::new(f));
        self
    }

    /// Run when the call failed.
    pub fn on_error<F: Fn(&CallFailure) + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Run after the call, regardless of outcome.
    pub fn on_finish<F: Fn(&CallFinish) + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.on_finish = Some(Arc::new(f));
        self
    }

    fn fire_start(&self, event: &CallStart) {
        if let Some(hook) = &self.on_start {
            hook(event);
        }
    }

    fn fire_success(&self, event: &CallSuccess) {
        if let Some(hook) = &self.on_success {
            hook(event);
        }
    }

    fn fire_error(&self, event: &CallFailure) {
        if let Some(hook) = &self.on_error {
            hook(event);
        }
    }

    fn fire_finish(&self, event: &CallFinish) {
        if let Some(hook) = &self.on_finish {
            hook(event);
        }
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("on_start", &self.on_start.is_some())
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_finish", &self.on_finish.is_some())
            .finish()
    }
}

// =============================================================================
// Interceptors
// =============================================================================

/// Request state exposed to an interceptor.
#[derive(Debug, Clone)]
pub struct InterceptRequest {
    /// Initial (resolved) context.
    pub context: Context,
    /// Raw input.
    pub input: Value,
    /// Path the call is addressed to.
    pub path: Vec<String>,
    /// Cancellation signal for the call.
    pub signal: CancellationSignal,
    /// Identity of the call.
    pub call_id: CallId,
}

/// Continuation for the remainder of the interceptor onion.
pub type InterceptNext =
    Arc<dyn Fn(InterceptRequest) -> BoxFuture<'static, RpcResult<Value>> + Send + Sync>;

/// Interceptor function: an outer onion layer around the whole call.
///
/// Interceptors run above validation and typed-error handling; they may
/// transform the request or result, or short-circuit by not calling `next`.
pub type Interceptor = Arc<
    dyn Fn(InterceptRequest, InterceptNext) -> BoxFuture<'static, RpcResult<Value>> + Send + Sync,
>;

/// Create an interceptor from an async function.
pub fn interceptor_from_fn<F, Fut>(f: F) -> Interceptor
where
    F: Fn(InterceptRequest, InterceptNext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = RpcResult<Value>> + Send + 'static,
{
    Arc::new(move |req, next| Box::pin(f(req, next)))
}

// =============================================================================
// Call Options
// =============================================================================

/// The per-call context, given directly or produced by a (sync or async)
/// factory resolved once per call.
#[derive(Clone)]
pub enum ContextSource {
    /// A ready context value.
    Value(Context),
    /// A factory resolved at call time.
    Factory(Arc<dyn Fn() -> BoxFuture<'static, RpcResult<Context>> + Send + Sync>),
}

impl ContextSource {
    /// A factory from a synchronous closure.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn() -> RpcResult<Context> + Send + Sync + 'static,
    {
        Self::Factory(Arc::new(move || Box::pin(futures::future::ready(f()))))
    }

    /// A factory from an asynchronous closure.
    pub fn from_async_fn<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RpcResult<Context>> + Send + 'static,
    {
        Self::Factory(Arc::new(move || Box::pin(f())))
    }

    async fn resolve(&self) -> RpcResult<Context> {
        match self {
            Self::Value(context) => Ok(context.clone()),
            Self::Factory(factory) => factory().await,
        }
    }
}

impl Default for ContextSource {
    fn default() -> Self {
        Self::Value(Context::new())
    }
}

impl From<Context> for ContextSource {
    fn from(context: Context) -> Self {
        Self::Value(context)
    }
}

impl fmt::Debug for ContextSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(context) => f.debug_tuple("Value").field(context).finish(),
            Self::Factory(_) => f.write_str("Factory(..)"),
        }
    }
}

/// What to invoke: a ready procedure or a lazily resolved position.
#[derive(Debug, Clone)]
pub enum CallTarget {
    /// An already-resolved procedure.
    Procedure(Arc<Procedure>),
    /// A lazy position, awaited (memoized) before execution.
    Lazy(LazyRouter),
}

impl From<Procedure> for CallTarget {
    fn from(procedure: Procedure) -> Self {
        Self::Procedure(Arc::new(procedure))
    }
}

impl From<Arc<Procedure>> for CallTarget {
    fn from(procedure: Arc<Procedure>) -> Self {
        Self::Procedure(procedure)
    }
}

impl From<LazyRouter> for CallTarget {
    fn from(lazy: LazyRouter) -> Self {
        Self::Lazy(lazy)
    }
}

impl From<Lazy> for CallTarget {
    fn from(lazy: Lazy) -> Self {
        Self::Lazy(LazyRouter::new(lazy))
    }
}

/// Per-call options.
#[derive(Clone, Default)]
pub struct CallOptions {
    /// Initial context, or a factory for it.
    pub context: ContextSource,
    /// Path reported to middleware and hooks.
    pub path: Vec<String>,
    /// Cancellation signal; a fresh one is created when absent.
    pub signal: Option<CancellationSignal>,
    /// Per-call interceptors, nested inside the invoker's own.
    pub interceptors: Vec<Interceptor>,
    /// Per-call hooks, fired alongside the invoker's own.
    pub hooks: Hooks,
}

impl CallOptions {
    /// Empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the context (value or source).
    pub fn context(mut self, context: impl Into<ContextSource>) -> Self {
        self.context = context.into();
        self
    }

    /// Set the call path.
    pub fn path(mut self, path: Vec<String>) -> Self {
        self.path = path;
        self
    }

    /// Set the cancellation signal.
    pub fn signal(mut self, signal: CancellationSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Append an interceptor.
    pub fn intercept<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(InterceptRequest, InterceptNext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RpcResult<Value>> + Send + 'static,
    {
        self.interceptors.push(interceptor_from_fn(f));
        self
    }

    /// Set the hooks.
    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }
}

impl fmt::Debug for CallOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallOptions")
            .field("context", &self.context)
            .field("path", &self.path)
            .field("signal", &self.signal.is_some())
            .field("interceptors", &self.interceptors.len())
            .field("hooks", &self.hooks)
            .finish()
    }
}

// =============================================================================
// Invoker
// =============================================================================

/// Public entry point composing matcher, executor, interceptors, and hooks.
///
/// # Example
/// ```rust,ignore
/// let invoker = Invoker::new().hooks(Hooks::new().on_finish(|ev| {
///     tracing::info!(call_id = %ev.call_id, "call finished");
/// }));
/// let output = invoker.invoke(ping, json!({"val": "18"}), CallOptions::new()).await?;
/// ```
#[derive(Clone, Default)]
pub struct Invoker {
    interceptors: Vec<Interceptor>,
    hooks: Hooks,
}

impl fmt::Debug for Invoker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invoker")
            .field("interceptors", &self.interceptors.len())
            .field("hooks", &self.hooks)
            .finish()
    }
}

impl Invoker {
    /// Create an invoker with no interceptors or hooks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an instance-level interceptor (outermost first registered).
    pub fn intercept<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(InterceptRequest, InterceptNext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RpcResult<Value>> + Send + 'static,
    {
        self.interceptors.push(interceptor_from_fn(f));
        self
    }

    /// Set instance-level hooks.
    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Invoke a procedure (resolving it first when lazy).
    ///
    /// Returns the final output or the error after boundary normalization:
    /// typed errors pass through (declared codes get their payload
    /// re-validated against the error map); anything else surfaces as
    /// `INTERNAL_SERVER_ERROR` with the original preserved as `cause`.
    pub async fn invoke(
        &self,
        target: impl Into<CallTarget>,
        input: Value,
        options: CallOptions,
    ) -> RpcResult<Value> {
        let call_id = CallId::new();
        let procedure = match target.into() {
            CallTarget::Procedure(procedure) => procedure,
            CallTarget::Lazy(lazy) => lazy.procedure().await?,
        };
        let context = options.context.resolve().await?;
        let signal = options.signal.clone().unwrap_or_default();
        let path = options.path.clone();

        let start = CallStart {
            call_id,
            path: path.clone(),
            input: input.clone(),
        };
        self.hooks.fire_start(&start);
        options.hooks.fire_start(&start);

        // Innermost layer: chain execution plus boundary normalization.
        let inner_procedure = procedure.clone();
        let core: InterceptNext = Arc::new(move |req: InterceptRequest| {
            let procedure = inner_procedure.clone();
            Box::pin(async move {
                let result = executor::execute(
                    procedure.clone(),
                    req.input,
                    req.context,
                    req.path,
                    req.signal,
                    req.call_id,
                )
                .await;
                match result {
                    Ok(ChainOutcome { output, .. }) => Ok(output),
                    Err(error) => Err(check_declared(&procedure, error).await),
                }
            })
        });

        // Onion composition, outermost = first registered instance
        // interceptor, then per-call interceptors inside.
        let chain = self
            .interceptors
            .iter()
            .chain(options.interceptors.iter())
            .rev()
            .fold(core, |next, interceptor| {
                let interceptor = interceptor.clone();
                Arc::new(move |req| {
                    let interceptor = interceptor.clone();
                    let next = next.clone();
                    Box::pin(async move { interceptor(req, next).await })
                })
            });

        let request = InterceptRequest {
            context,
            input,
            path: path.clone(),
            signal,
            call_id,
        };
        let result = chain(request).await;

        match &result {
            Ok(output) => {
                let event = CallSuccess {
                    call_id,
                    path: path.clone(),
                    output: output.clone(),
                };
                self.hooks.fire_success(&event);
                options.hooks.fire_success(&event);
            }
            Err(error) => {
                let event = CallFailure {
                    call_id,
                    path: path.clone(),
                    error: error.clone(),
                };
                self.hooks.fire_error(&event);
                options.hooks.fire_error(&event);
            }
        }
        let finish = CallFinish { call_id, path };
        self.hooks.fire_finish(&finish);
        options.hooks.fire_finish(&finish);

        result
    }

    /// Match a path against a tree and invoke the result.
    ///
    /// A routing miss surfaces as a `NOT_FOUND` error for transports; a
    /// contract misconfiguration propagates from the matcher unchanged.
    pub async fn call_path(
        &self,
        matcher: &Matcher,
        method: Option<Method>,
        path: &str,
        input: Value,
        mut options: CallOptions,
    ) -> RpcResult<Value> {
        match matcher.match_route(method, path).await? {
            None => Err(RpcError::not_found(format!("no procedure at '{path}'"))),
            Some(matched) => {
                options.path = matched.matched_path;
                self.invoke(matched.procedure, input, options).await
            }
        }
    }
}

/// Re-validate a declared error against the procedure's error map.
///
/// Declared codes pick up the declared status (unless already overridden)
/// and have their payload validated/coerced. An undeclared code, or a
/// payload that fails its own validation, passes through unchanged — the
/// error is never dropped, it just is not guaranteed to be
/// schema-conformant.
async fn check_declared(procedure: &Procedure, mut error: RpcError) -> RpcError {
    let Some(spec) = procedure.error_spec(error.code) else {
        return error;
    };
    if error.status.is_none() {
        error.status = spec.status;
    }
    if let (Some(validator), Some(data)) = (&spec.data_validator, error.data.clone()) {
        match validator.validate(data).await {
            Ok(coerced) => error.data = Some(coerced),
            Err(_) => {
                tracing::warn!(code = %error.code, "declared error payload failed validation");
            }
        }
    }
    error
}
