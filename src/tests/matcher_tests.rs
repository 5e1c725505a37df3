//! Matcher tests - path resolution, lazy expansion, caching
//!
//! Verifies that lazy subtree loaders run exactly once across repeated and
//! concurrent matches, that routing misses stay recoverable while contract
//! misconfigurations are fatal, and that filters exclude paths.

use crate::matcher::{Matcher, PathFilter};
use crate::prelude::*;
use futures::future::join_all;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn echo(tag: &'static str) -> Procedure {
    Procedure::builder().handler(move |_req| async move { Ok(json!(tag)) })
}

fn counted_lazy_subtree(calls: Arc<AtomicUsize>) -> Router {
    Router::new()
        .procedure("pong", echo("pong"))
        .lazy("ping", move || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Some(RouterNode::Procedure(Arc::new(echo("lazy-ping")))))
            }
        })
}

#[tokio::test]
async fn static_paths_match_without_resolution() {
    let calls = Arc::new(AtomicUsize::new(0));
    let matcher = Matcher::new(&counted_lazy_subtree(calls.clone()));

    let matched = matcher.match_route(None, "/pong").await.unwrap().unwrap();
    assert_eq!(matched.matched_path, vec!["pong".to_string()]);
    assert_eq!(calls.load(Ordering::SeqCst), 0, "no lazy touched");
}

#[tokio::test]
async fn lazy_loader_runs_once_across_matches() {
    let calls = Arc::new(AtomicUsize::new(0));
    let matcher = Matcher::new(&counted_lazy_subtree(calls.clone()));

    for _ in 0..3 {
        let matched = matcher.match_route(None, "/ping").await.unwrap().unwrap();
        assert_eq!(matched.matched_path, vec!["ping".to_string()]);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn concurrent_matches_share_one_resolution() {
    let calls = Arc::new(AtomicUsize::new(0));
    let matcher = Arc::new(Matcher::new(&counted_lazy_subtree(calls.clone())));

    let matches = (0..8).map(|_| {
        let matcher = matcher.clone();
        async move { matcher.match_route(None, "ping").await }
    });
    for result in join_all(matches).await {
        assert!(result.unwrap().is_some());
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn deeper_lazy_subtrees_expand_incrementally() {
    let outer_calls = Arc::new(AtomicUsize::new(0));
    let inner_calls = Arc::new(AtomicUsize::new(0));

    let outer = outer_calls.clone();
    let inner_for_loader = inner_calls.clone();
    let router = Router::new().lazy("admin", move || {
        let outer = outer.clone();
        let inner = inner_for_loader.clone();
        async move {
            outer.fetch_add(1, Ordering::SeqCst);
            let subtree = Router::new()
                .procedure("list", echo("list"))
                .lazy("audit", move || {
                    let inner = inner.clone();
                    async move {
                        inner.fetch_add(1, Ordering::SeqCst);
                        Ok(Some(RouterNode::Router(Arc::new(
                            Router::new().procedure("tail", echo("tail")),
                        ))))
                    }
                });
            Ok(Some(RouterNode::Router(Arc::new(subtree))))
        }
    });
    let matcher = Matcher::new(&router);

    // resolving a sibling leaf loads the outer subtree only
    assert!(matcher.match_route(None, "admin.list").await.unwrap().is_some());
    assert_eq!(outer_calls.load(Ordering::SeqCst), 1);
    assert_eq!(inner_calls.load(Ordering::SeqCst), 0);

    let matched = matcher
        .match_route(None, "admin.audit.tail")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        matched.matched_path,
        vec!["admin".to_string(), "audit".into(), "tail".into()]
    );
    assert_eq!(outer_calls.load(Ordering::SeqCst), 1);
    assert_eq!(inner_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn lazy_resolving_to_nothing_is_not_found() {
    let router = Router::new().lazy("ghost", || async { Ok(None) });
    let matcher = Matcher::new(&router);
    assert!(matcher.match_route(None, "/ghost").await.unwrap().is_none());
    // and stays cached as absent
    assert!(matcher.match_route(None, "/ghost").await.unwrap().is_none());
}

#[tokio::test]
async fn lazy_load_failure_propagates() {
    let router = Router::new().lazy("flaky", || async {
        Err(RpcError::service_unavailable("registry down"))
    });
    let matcher = Matcher::new(&router);
    let err = matcher.match_route(None, "/flaky").await.unwrap_err();
    assert_eq!(err.code, ErrorCode::ServiceUnavailable);
}

#[tokio::test]
async fn not_found_is_recoverable() {
    let matcher = Matcher::new(&Router::new().procedure("ping", echo("ping")));
    assert!(matcher.match_route(None, "/pong").await.unwrap().is_none());
    assert!(
        matcher
            .match_route(None, "ping.deeper")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn contract_leaf_is_fatal_misconfiguration() {
    let router = Router::new()
        .procedure("ping", echo("ping"))
        .contract("promised", RouteMeta::new());
    let matcher = Matcher::new(&router);

    let err = matcher.match_route(None, "/promised").await.unwrap_err();
    assert_eq!(err.code, ErrorCode::NotImplemented);
    assert!(err.message.contains("promised"));
}

#[tokio::test]
async fn filter_excludes_paths_as_not_found() {
    let router = Router::new()
        .procedure("ping", echo("ping"))
        .procedure("beta", echo("beta"));
    let filter: PathFilter = Arc::new(|path: &[String]| path.first().map(String::as_str) != Some("beta"));
    let matcher = Matcher::with_filter(&router, filter);

    assert!(matcher.match_route(None, "/ping").await.unwrap().is_some());
    assert!(matcher.match_route(None, "/beta").await.unwrap().is_none());
}

#[tokio::test]
async fn method_mismatch_is_not_found() {
    let procedure = Procedure::builder()
        .route(RouteMeta::new().method(Method::Post).path("/users"))
        .handler(|_req| async move { Ok(json!(null)) });
    let matcher = Matcher::new(&Router::new().procedure("create", procedure));

    assert!(
        matcher
            .match_route(Some(Method::Post), "create")
            .await
            .unwrap()
            .is_some()
    );
    assert!(
        matcher
            .match_route(Some(Method::Get), "create")
            .await
            .unwrap()
            .is_none()
    );
    // no requested method matches regardless of declaration
    assert!(matcher.match_route(None, "create").await.unwrap().is_some());
}

#[test]
fn parse_path_accepts_both_separators() {
    assert_eq!(
        Matcher::parse_path("/users/get"),
        vec!["users".to_string(), "get".into()]
    );
    assert_eq!(
        Matcher::parse_path("users.get"),
        vec!["users".to_string(), "get".into()]
    );
    assert_eq!(Matcher::parse_path(""), Vec::<String>::new());
    assert_eq!(Matcher::parse_path("//a..b/"), vec!["a".to_string(), "b".into()]);
}
