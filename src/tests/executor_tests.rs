//! Executor tests - middleware chain semantics
//!
//! Covers chain ordering (onion and bare-context styles), context
//! accumulation, short-circuiting, validation interleaving, re-entrant
//! `next`, and signal propagation.

use crate::executor::execute;
use crate::middleware::Flow;
use crate::prelude::*;
use crate::validator::SharedValidator;
use proptest::prelude::*;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type Log = Arc<Mutex<Vec<String>>>;

fn log_push(log: &Log, entry: impl Into<String>) {
    log.lock().unwrap().push(entry.into());
}

fn log_entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

async fn run(procedure: Procedure, input: Value) -> RpcResult<crate::ChainOutcome> {
    execute(
        Arc::new(procedure),
        input,
        Context::new(),
        vec!["test".into()],
        CancellationSignal::new(),
        crate::CallId::new(),
    )
    .await
}

fn numeric_val() -> SharedValidator {
    validator::from_fn(|value| {
        let Some(s) = value.get("val").and_then(Value::as_str) else {
            return Err(vec![Issue::at(vec!["val".into()], "expected a string")]);
        };
        match s.parse::<i64>() {
            Ok(n) => Ok(json!({ "val": n })),
            Err(_) => Err(vec![Issue::at(
                vec!["val".into()],
                "expected a numeric string",
            )]),
        }
    })
}

#[tokio::test]
async fn onion_order_enter_and_exit() {
    let log: Log = Arc::default();
    let mut builder = Procedure::builder();
    for name in ["m1", "m2", "m3"] {
        let log = log.clone();
        builder = builder.use_middleware(move |_req, next: Next| {
            let log = log.clone();
            async move {
                log_push(&log, format!("{name}_enter"));
                let outcome = next.run(Context::new()).await?;
                log_push(&log, format!("{name}_exit"));
                Ok(Flow::Done(outcome))
            }
        });
    }
    let handler_log = log.clone();
    let procedure = builder.handler(move |_req| {
        let log = handler_log.clone();
        async move {
            log_push(&log, "handler");
            Ok(json!("ok"))
        }
    });

    let outcome = run(procedure, json!(null)).await.unwrap();
    assert_eq!(outcome.output, json!("ok"));
    assert_eq!(
        log_entries(&log),
        vec!["m1_enter", "m2_enter", "m3_enter", "handler", "m3_exit", "m2_exit", "m1_exit"]
    );
}

#[tokio::test]
async fn bare_context_style_is_an_implicit_next() {
    let log: Log = Arc::default();
    let m1_log = log.clone();
    let procedure = Procedure::builder()
        .use_middleware(move |_req, _next| {
            let log = m1_log.clone();
            async move {
                log_push(&log, "m1");
                Ok(Flow::Continue(Context::new().with("user", "alice")))
            }
        })
        .use_middleware(|req: StepRequest, _next| async move {
            // downstream step observes the context added upstream
            assert_eq!(req.context.get("user"), Some(&json!("alice")));
            Ok(Flow::Continue(Context::new().with("user", "bob")))
        })
        .handler(|req| async move {
            // right-biased: the later override wins
            Ok(req.context.get("user").cloned().unwrap_or(Value::Null))
        });

    let outcome = run(procedure, json!(null)).await.unwrap();
    assert_eq!(outcome.output, json!("bob"));
    assert_eq!(outcome.context.get("user"), Some(&json!("bob")));
    assert_eq!(log_entries(&log), vec!["m1"]);
}

#[tokio::test]
async fn next_merges_partial_context_right_biased() {
    let procedure = Procedure::builder()
        .use_middleware(|_req, next: Next| async move {
            Ok(Flow::Done(
                next.run(Context::new().with("x", 1).with("y", "keep")).await?,
            ))
        })
        .use_middleware(|_req, next: Next| async move {
            Ok(Flow::Done(next.run(Context::new().with("x", 2)).await?))
        })
        .handler(|req| async move {
            Ok(json!({
                "x": req.context.get("x"),
                "y": req.context.get("y"),
            }))
        });

    let outcome = run(procedure, json!(null)).await.unwrap();
    assert_eq!(outcome.output, json!({"x": 2, "y": "keep"}));
}

#[tokio::test]
async fn short_circuit_skips_rest_and_validates_output() {
    let log: Log = Arc::default();
    let tail_log = log.clone();
    let handler_log = log.clone();
    let procedure = Procedure::builder()
        .output(validator::from_fn(|value| match value.as_i64() {
            Some(n) => Ok(json!(n * 10)),
            None => Err(vec![Issue::new("expected a number")]),
        }))
        .use_middleware(|_req, next: Next| async move {
            Ok(Flow::Done(next.short_circuit(json!(7))))
        })
        .use_middleware(move |_req, _next| {
            let log = tail_log.clone();
            async move {
                log_push(&log, "tail");
                Ok(Flow::pass())
            }
        })
        .handler(move |_req| {
            let log = handler_log.clone();
            async move {
                log_push(&log, "handler");
                Ok(json!(0))
            }
        });

    let outcome = run(procedure, json!(null)).await.unwrap();
    // the short-circuit value still went through output validation
    assert_eq!(outcome.output, json!(70));
    assert!(log_entries(&log).is_empty());
}

#[tokio::test]
async fn input_validation_failure_precedes_everything() {
    let log: Log = Arc::default();
    let mw_log = log.clone();
    let handler_log = log.clone();
    let procedure = Procedure::builder()
        .input(numeric_val())
        .use_middleware(move |_req, _next| {
            let log = mw_log.clone();
            async move {
                log_push(&log, "middleware");
                Ok(Flow::pass())
            }
        })
        .handler(move |_req| {
            let log = handler_log.clone();
            async move {
                log_push(&log, "handler");
                Ok(json!(null))
            }
        });

    let err = run(procedure, json!({"val": "abc"})).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::BadRequest);
    assert_eq!(err.status(), 400);
    let issues = &err.data.as_ref().unwrap()["issues"];
    assert_eq!(issues[0]["path"], json!(["val"]));
    assert!(log_entries(&log).is_empty(), "chain never started");
}

#[tokio::test]
async fn input_validation_coerces_for_downstream() {
    let procedure = Procedure::builder()
        .input(numeric_val())
        .handler(|req| async move { Ok(req.input) });

    let outcome = run(procedure, json!({"val": "18"})).await.unwrap();
    assert_eq!(outcome.output, json!({"val": 18}));
}

#[tokio::test]
async fn middleware_before_input_sees_raw_input() {
    // .use() before .input() records the validation step after that
    // middleware: it observes the raw value, the handler the coerced one.
    let procedure = Procedure::builder()
        .use_middleware(|req: StepRequest, _next| async move {
            assert_eq!(req.input, json!({"val": "18"}));
            Ok(Flow::pass())
        })
        .input(numeric_val())
        .handler(|req| async move {
            assert_eq!(req.input, json!({"val": 18}));
            Ok(req.input)
        });

    assert_eq!(procedure.input_validation_index(), 1);
    let outcome = run(procedure, json!({"val": "18"})).await.unwrap();
    assert_eq!(outcome.output, json!({"val": 18}));
}

#[tokio::test]
async fn output_validation_failure_is_server_side() {
    let procedure = Procedure::builder()
        .output(validator::from_fn(|_| {
            Err(vec![Issue::new("shape mismatch")])
        }))
        .handler(|_req| async move { Ok(json!({"ok": true})) });

    let err = run(procedure, json!(null)).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::InternalServerError);
    assert!(err.data.is_none(), "issue detail is not client-facing");
    assert!(err.cause.as_deref().unwrap().contains("shape mismatch"));
}

#[tokio::test]
async fn middleware_error_aborts_chain() {
    let log: Log = Arc::default();
    let handler_log = log.clone();
    let procedure = Procedure::builder()
        .use_middleware(|_req, _next| async move {
            Err(RpcError::forbidden("nope"))
        })
        .handler(move |_req| {
            let log = handler_log.clone();
            async move {
                log_push(&log, "handler");
                Ok(json!(null))
            }
        });

    let err = run(procedure, json!(null)).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::Forbidden);
    assert_eq!(err.message, "nope");
    assert!(log_entries(&log).is_empty());
}

#[tokio::test]
async fn repeated_next_replays_suffix_per_call_site() {
    let downstream_runs = Arc::new(AtomicUsize::new(0));
    let handler_runs = Arc::new(AtomicUsize::new(0));

    let counted_mw = downstream_runs.clone();
    let counted_handler = handler_runs.clone();
    let procedure = Procedure::builder()
        .use_middleware(|_req, next: Next| async move {
            let first = next.run(Context::new().with("attempt", 1)).await?;
            assert_eq!(first.context.get("attempt"), Some(&json!(1)));
            // second call replays the suffix independently
            let second = next.run(Context::new().with("attempt", 2)).await?;
            assert_eq!(second.context.get("attempt"), Some(&json!(2)));
            Ok(Flow::Done(second))
        })
        .use_middleware(move |_req, _next| {
            let runs = counted_mw.clone();
            async move {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(Flow::pass())
            }
        })
        .handler(move |req| {
            let runs = counted_handler.clone();
            async move {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(req.context.get("attempt").cloned().unwrap_or(Value::Null))
            }
        });

    let outcome = run(procedure, json!(null)).await.unwrap();
    assert_eq!(outcome.output, json!(2));
    assert_eq!(downstream_runs.load(Ordering::SeqCst), 2);
    assert_eq!(handler_runs.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn same_signal_reaches_every_step() {
    let signal = CancellationSignal::new();
    let outer = signal.clone();
    let mw_signal = signal.clone();
    let handler_signal = signal.clone();

    let procedure = Procedure::builder()
        .use_middleware(move |req: StepRequest, _next| {
            let outer = mw_signal.clone();
            async move {
                assert!(req.signal.same_signal(&outer));
                Ok(Flow::pass())
            }
        })
        .handler(move |req| {
            let outer = handler_signal.clone();
            async move {
                assert!(req.signal.same_signal(&outer));
                Ok(json!(null))
            }
        });

    execute(
        Arc::new(procedure),
        json!(null),
        Context::new(),
        Vec::new(),
        outer,
        crate::CallId::new(),
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn cancellation_is_cooperative() {
    let signal = CancellationSignal::new();
    signal.cancel();

    let procedure = Procedure::builder().handler(|req| async move {
        if req.signal.is_cancelled() {
            return Err(RpcError::new(
                ErrorCode::ClientClosedRequest,
                "caller went away",
            ));
        }
        Ok(json!(null))
    });

    let err = execute(
        Arc::new(procedure),
        json!(null),
        Context::new(),
        Vec::new(),
        signal,
        crate::CallId::new(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code, ErrorCode::ClientClosedRequest);
}

proptest! {
    /// For any chain of N middlewares using the onion style, execution
    /// enters in registration order and exits in reverse.
    #[test]
    fn prop_chain_order(middleware_count in 1usize..6) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let log: Log = Arc::default();
            let mut builder = Procedure::builder();
            for i in 0..middleware_count {
                let log = log.clone();
                builder = builder.use_middleware(move |_req, next: Next| {
                    let log = log.clone();
                    async move {
                        log_push(&log, format!("enter{i}"));
                        let outcome = next.run(Context::new()).await?;
                        log_push(&log, format!("exit{i}"));
                        Ok(Flow::Done(outcome))
                    }
                });
            }
            let handler_log = log.clone();
            let procedure = builder.handler(move |_req| {
                let log = handler_log.clone();
                async move {
                    log_push(&log, "handler");
                    Ok(json!(null))
                }
            });

            run(procedure, json!(null)).await.unwrap();

            let mut expected: Vec<String> =
                (0..middleware_count).map(|i| format!("enter{i}")).collect();
            expected.push("handler".into());
            expected.extend((0..middleware_count).rev().map(|i| format!("exit{i}")));
            prop_assert_eq!(log_entries(&log), expected);
            Ok(())
        })?;
    }

    /// For any pair of values, a context merge keeps the right-hand value.
    #[test]
    fn prop_context_merge_right_bias(a in any::<i64>(), b in any::<i64>()) {
        let merged = Context::new().with("x", a).merge(Context::new().with("x", b));
        prop_assert_eq!(merged.get("x"), Some(&json!(b)));
    }
}
