//! Opaque validator capability
//!
//! The core never inspects schema internals. A [`Validator`] takes a JSON
//! value and either returns a (possibly coerced) value or a list of
//! structured [`Issue`]s. Validators back input validation, output
//! validation, and declared-error payload validation.

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// A single validation issue, addressed by a path into the value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Path segments into the validated value (empty for the root).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<String>,
    /// Human-readable description of the problem.
    pub message: String,
}

impl Issue {
    /// Create an issue at the root of the value.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            path: Vec::new(),
            message: message.into(),
        }
    }

    /// Create an issue at the given path.
    pub fn at(path: Vec<String>, message: impl Into<String>) -> Self {
        Self {
            path,
            message: message.into(),
        }
    }
}

/// Asynchronous validation capability.
///
/// `validate` consumes the value and returns the validated (and possibly
/// coerced) value on success. Validators may suspend, e.g. to consult an
/// external schema registry.
pub trait Validator: Send + Sync {
    /// Validate `value`, returning the coerced value or the issues found.
    fn validate(&self, value: Value) -> BoxFuture<'static, Result<Value, Vec<Issue>>>;
}

/// Shared validator handle stored on procedures and error specs.
pub type SharedValidator = Arc<dyn Validator>;

struct FnValidator<F>(F);

impl<F> Validator for FnValidator<F>
where
    F: Fn(Value) -> Result<Value, Vec<Issue>> + Send + Sync,
{
    fn validate(&self, value: Value) -> BoxFuture<'static, Result<Value, Vec<Issue>>> {
        Box::pin(futures::future::ready((self.0)(value)))
    }
}

struct AsyncFnValidator<F>(F);

impl<F, Fut> Validator for AsyncFnValidator<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, Vec<Issue>>> + Send + 'static,
{
    fn validate(&self, value: Value) -> BoxFuture<'static, Result<Value, Vec<Issue>>> {
        Box::pin((self.0)(value))
    }
}

/// Create a validator from a synchronous function.
///
/// # Example
/// ```rust,ignore
/// let numeric = validator::from_fn(|value| match value.as_str() {
///     Some(s) => s
///         .parse::<i64>()
///         .map(Value::from)
///         .map_err(|_| vec![Issue::new("expected a numeric string")]),
///     None => Err(vec![Issue::new("expected a string")]),
/// });
/// ```
pub fn from_fn<F>(f: F) -> SharedValidator
where
    F: Fn(Value) -> Result<Value, Vec<Issue>> + Send + Sync + 'static,
{
    Arc::new(FnValidator(f))
}

/// Create a validator from an asynchronous function.
pub fn from_async_fn<F, Fut>(f: F) -> SharedValidator
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, Vec<Issue>>> + Send + 'static,
{
    Arc::new(AsyncFnValidator(f))
}
