//! Procedure records
//!
//! A [`Procedure`] is an immutable record bundling a handler, its ordered
//! middleware list, input/output validators, the declared error map, and
//! route metadata. Builder operations take `self` and return a new value;
//! composition is structural sharing, never in-place mutation.

use crate::context::Context;
use crate::error::{ErrorCode, RpcResult};
use crate::invoker::CallId;
use crate::middleware::{Flow, MiddlewareFn, Next, StepRequest};
use crate::signal::CancellationSignal;
use crate::validator::SharedValidator;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Request passed to a procedure's handler: the accumulated context, the
/// validated input, and the call's identity and cancellation signal.
#[derive(Debug, Clone)]
pub struct HandlerRequest {
    /// Context accumulated across the middleware chain.
    pub context: Context,
    /// Validated input value.
    pub input: Value,
    /// Matched path segments (empty when invoked directly).
    pub path: Vec<String>,
    /// Cooperative cancellation signal for this call.
    pub signal: CancellationSignal,
    /// Unique identity of this call.
    pub call_id: CallId,
}

/// Type alias for the boxed async handler function.
pub type BoxedHandler =
    Arc<dyn Fn(HandlerRequest) -> BoxFuture<'static, RpcResult<Value>> + Send + Sync>;

/// Method associated with a procedure's route metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
}

impl Method {
    /// Returns the uppercase method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Route metadata carried by a procedure (and by contract leaves).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteMeta {
    /// Method this procedure answers to, if restricted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<Method>,
    /// Canonical path, if published.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Free-form tags for documentation and filtering.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl RouteMeta {
    /// Create empty route metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the method.
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Set the canonical path.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Add a tag.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

/// Declared shape of one error code in a procedure's error map.
#[derive(Clone, Default)]
pub struct ErrorSpec {
    /// Status override for this code.
    pub status: Option<u16>,
    /// Validator for the error's `data` payload.
    pub data_validator: Option<SharedValidator>,
}

impl ErrorSpec {
    /// Declare a code with defaults (code-default status, unvalidated data).
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the status for this code.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Attach a payload validator.
    pub fn with_data_validator(mut self, validator: SharedValidator) -> Self {
        self.data_validator = Some(validator);
        self
    }
}

impl fmt::Debug for ErrorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorSpec")
            .field("status", &self.status)
            .field("data_validator", &self.data_validator.is_some())
            .finish()
    }
}

/// An immutable, executable procedure.
///
/// Internals are `Arc`'d; cloning is cheap and shares structure.
#[derive(Clone)]
pub struct Procedure {
    pub(crate) handler: BoxedHandler,
    pub(crate) middlewares: Vec<MiddlewareFn>,
    pub(crate) input_validator: Option<SharedValidator>,
    pub(crate) output_validator: Option<SharedValidator>,
    pub(crate) error_map: HashMap<ErrorCode, ErrorSpec>,
    pub(crate) route: RouteMeta,
    /// Number of middlewares recorded before the input validation step.
    pub(crate) input_validation_index: usize,
    /// Number of middlewares recorded before the output validation step.
    /// Kept for builder fidelity; the runtime validates the final outcome.
    pub(crate) output_validation_index: usize,
}

impl Procedure {
    /// Start building a procedure.
    pub fn builder() -> ProcedureBuilder {
        ProcedureBuilder::new()
    }

    /// Route metadata.
    pub fn route(&self) -> &RouteMeta {
        &self.route
    }

    /// The declared spec for an error code, if any.
    pub fn error_spec(&self, code: ErrorCode) -> Option<&ErrorSpec> {
        self.error_map.get(&code)
    }

    /// Number of middlewares in the chain.
    pub fn middleware_len(&self) -> usize {
        self.middlewares.len()
    }

    /// Where input validation is inserted in the chain.
    pub fn input_validation_index(&self) -> usize {
        self.input_validation_index
    }

    /// Where output validation was recorded in the chain.
    pub fn output_validation_index(&self) -> usize {
        self.output_validation_index
    }
}

impl fmt::Debug for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Procedure")
            .field("middlewares", &self.middlewares.len())
            .field("input_validator", &self.input_validator.is_some())
            .field("output_validator", &self.output_validator.is_some())
            .field("error_map", &self.error_map)
            .field("route", &self.route)
            .finish()
    }
}

/// Builder assembling the immutable [`Procedure`] record.
///
/// This is deliberately minimal: it produces the finished shape the
/// executor runs, not a fluent typed surface. The positions at which
/// `input`/`output` are called relative to `use_middleware` calls are
/// recorded as the validation insertion points.
///
/// # Example
/// ```rust,ignore
/// let ping = Procedure::builder()
///     .input(numeric_string())
///     .use_middleware(auth)
///     .handler(|req| async move { Ok(req.input) });
/// ```
#[derive(Default)]
pub struct ProcedureBuilder {
    middlewares: Vec<MiddlewareFn>,
    input_validator: Option<SharedValidator>,
    output_validator: Option<SharedValidator>,
    error_map: HashMap<ErrorCode, ErrorSpec>,
    route: RouteMeta,
    input_validation_index: Option<usize>,
    output_validation_index: Option<usize>,
}

impl ProcedureBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a middleware. Middlewares run in registration order.
    pub fn use_middleware<F, Fut>(mut self, middleware: F) -> Self
    where
        F: Fn(StepRequest, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RpcResult<Flow>> + Send + 'static,
    {
        self.middlewares
            .push(Arc::new(move |req, next| Box::pin(middleware(req, next))));
        self
    }

    /// Append a middleware function (already wrapped as [`MiddlewareFn`]).
    pub fn use_middleware_fn(mut self, middleware: MiddlewareFn) -> Self {
        self.middlewares.push(middleware);
        self
    }

    /// Declare the input validator. Its insertion point in the chain is the
    /// number of middlewares registered so far.
    pub fn input(mut self, validator: SharedValidator) -> Self {
        self.input_validator = Some(validator);
        self.input_validation_index = Some(self.middlewares.len());
        self
    }

    /// Declare the output validator, recording its position likewise.
    pub fn output(mut self, validator: SharedValidator) -> Self {
        self.output_validator = Some(validator);
        self.output_validation_index = Some(self.middlewares.len());
        self
    }

    /// Declare an error code this procedure may raise.
    pub fn error(mut self, code: ErrorCode, spec: ErrorSpec) -> Self {
        self.error_map.insert(code, spec);
        self
    }

    /// Set route metadata.
    pub fn route(mut self, route: RouteMeta) -> Self {
        self.route = route;
        self
    }

    /// Finish with the handler, producing the immutable record.
    pub fn handler<F, Fut>(self, handler: F) -> Procedure
    where
        F: Fn(HandlerRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RpcResult<Value>> + Send + 'static,
    {
        let input_validation_index = self.input_validation_index.unwrap_or(0);
        let output_validation_index = self
            .output_validation_index
            .unwrap_or(self.middlewares.len());
        Procedure {
            handler: Arc::new(move |req| Box::pin(handler(req))),
            middlewares: self.middlewares,
            input_validator: self.input_validator,
            output_validator: self.output_validator,
            error_map: self.error_map,
            route: self.route,
            input_validation_index,
            output_validation_index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator;
    use serde_json::json;

    fn passthrough() -> SharedValidator {
        validator::from_fn(Ok)
    }

    #[test]
    fn builder_records_validation_indices() {
        let procedure = Procedure::builder()
            .use_middleware(|_req, next| async move { Ok(Flow::Done(next.run(Context::new()).await?)) })
            .input(passthrough())
            .use_middleware(|_req, next| async move { Ok(Flow::Done(next.run(Context::new()).await?)) })
            .output(passthrough())
            .handler(|req| async move { Ok(req.input) });

        assert_eq!(procedure.middleware_len(), 2);
        assert_eq!(procedure.input_validation_index(), 1);
        assert_eq!(procedure.output_validation_index(), 2);
    }

    #[test]
    fn default_indices_without_declarations() {
        let procedure = Procedure::builder().handler(|_req| async move { Ok(json!(null)) });
        assert_eq!(procedure.input_validation_index(), 0);
        assert_eq!(procedure.output_validation_index(), 0);
    }

    #[test]
    fn error_map_lookup() {
        let procedure = Procedure::builder()
            .error(ErrorCode::Conflict, ErrorSpec::new().with_status(409))
            .handler(|_req| async move { Ok(json!(null)) });

        assert!(procedure.error_spec(ErrorCode::Conflict).is_some());
        assert!(procedure.error_spec(ErrorCode::NotFound).is_none());
    }

    #[test]
    fn route_meta_builder() {
        let route = RouteMeta::new()
            .method(Method::Post)
            .path("/users")
            .tag("users");
        assert_eq!(route.method, Some(Method::Post));
        assert_eq!(route.path.as_deref(), Some("/users"));
        assert_eq!(route.tags, vec!["users"]);
    }
}
