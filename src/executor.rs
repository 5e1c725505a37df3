//! Middleware chain executor
//!
//! Runs a resolved procedure: input validation, the middleware chain with
//! context accumulation and short-circuiting, the handler, and output
//! validation.
//!
//! The chain is an explicit forward cursor over a step list built from the
//! procedure: the middlewares in registration order with the input
//! validation step injected at the position recorded when the procedure was
//! built. From the executor's point of view validation is an ordinary step
//! at a fixed position. Output validation is applied exactly once to the
//! final outcome — whether it came from the handler or from a short-circuit
//! — before [`execute`] returns.
//!
//! Re-entrant `next` calls replay the static suffix of the chain from the
//! call site; see [`Next`](crate::middleware::Next).

use crate::context::Context;
use crate::error::{RpcError, RpcResult};
use crate::invoker::CallId;
use crate::middleware::{ChainOutcome, Flow, MiddlewareFn, Next, StepRequest};
use crate::procedure::{HandlerRequest, Procedure};
use crate::signal::CancellationSignal;
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;

/// One position in the effective forward chain.
#[derive(Clone)]
pub(crate) enum Step {
    /// Run the input validator (no-op when none is declared), replacing the
    /// input with the coerced value for downstream steps.
    ValidateInput,
    /// Run a middleware.
    Middleware(MiddlewareFn),
}

/// Shared per-call chain state; `Next` handles hold an `Arc` to this.
pub(crate) struct ChainCore {
    pub(crate) procedure: Arc<Procedure>,
    pub(crate) steps: Vec<Step>,
    pub(crate) path: Vec<String>,
    pub(crate) signal: CancellationSignal,
    pub(crate) call_id: CallId,
}

fn build_steps(procedure: &Procedure) -> Vec<Step> {
    let at = procedure
        .input_validation_index
        .min(procedure.middlewares.len());
    let mut steps = Vec::with_capacity(procedure.middlewares.len() + 1);
    for (i, middleware) in procedure.middlewares.iter().enumerate() {
        if i == at {
            steps.push(Step::ValidateInput);
        }
        steps.push(Step::Middleware(middleware.clone()));
    }
    if at >= procedure.middlewares.len() {
        steps.push(Step::ValidateInput);
    }
    steps
}

/// Drive the chain from `index` with the given context and input.
///
/// Returns a boxed future so the recursion through middleware futures stays
/// finite-sized; `Next::run` re-enters here, which is what makes suffix
/// replay fall out of the structure.
pub(crate) fn run_chain(
    chain: Arc<ChainCore>,
    index: usize,
    context: Context,
    input: Value,
) -> BoxFuture<'static, RpcResult<ChainOutcome>> {
    Box::pin(async move {
        let step = chain.steps.get(index).cloned();
        match step {
            None => {
                let request = HandlerRequest {
                    context: context.clone(),
                    input,
                    path: chain.path.clone(),
                    signal: chain.signal.clone(),
                    call_id: chain.call_id,
                };
                let output = (chain.procedure.handler)(request).await?;
                Ok(ChainOutcome { output, context })
            }
            Some(Step::ValidateInput) => {
                let validated = match &chain.procedure.input_validator {
                    Some(validator) => validator
                        .validate(input)
                        .await
                        .map_err(RpcError::input_validation)?,
                    None => input,
                };
                run_chain(chain.clone(), index + 1, context, validated).await
            }
            Some(Step::Middleware(middleware)) => {
                let request = StepRequest {
                    context: context.clone(),
                    input: input.clone(),
                    path: chain.path.clone(),
                    signal: chain.signal.clone(),
                    call_id: chain.call_id,
                };
                let next = Next {
                    chain: chain.clone(),
                    index: index + 1,
                    context: context.clone(),
                    input: input.clone(),
                };
                match middleware(request, next).await? {
                    Flow::Continue(extra) => {
                        run_chain(chain, index + 1, context.merge(extra), input).await
                    }
                    Flow::Done(outcome) => Ok(outcome),
                }
            }
        }
    })
}

/// Execute `procedure` with `input` and an initial `context`.
///
/// Input validation failure raises `BAD_REQUEST` and no middleware runs;
/// output validation failure raises `INTERNAL_SERVER_ERROR`. Errors from
/// middlewares and the handler propagate unmodified.
pub async fn execute(
    procedure: Arc<Procedure>,
    input: Value,
    context: Context,
    path: Vec<String>,
    signal: CancellationSignal,
    call_id: CallId,
) -> RpcResult<ChainOutcome> {
    let steps = build_steps(&procedure);
    let chain = Arc::new(ChainCore {
        procedure: procedure.clone(),
        steps,
        path,
        signal,
        call_id,
    });

    let outcome = run_chain(chain, 0, context, input).await?;

    match &procedure.output_validator {
        Some(validator) => {
            let output = validator.validate(outcome.output).await.map_err(|issues| {
                tracing::warn!(call_id = %call_id, "output validation failed");
                RpcError::output_validation(issues)
            })?;
            Ok(ChainOutcome {
                output,
                context: outcome.context,
            })
        }
        None => Ok(outcome),
    }
}
