//! Single-flight, staleness, retry and cancellation behaviour of the
//! orchestrator, driven on a paused clock.

use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use linkbudget_client::query::{CancellationToken, QueryError, QueryKey, QueryOptions, QueryOrchestrator};
use linkbudget_client::retry::FailureInfo;
use linkbudget_client::schema::CalculationResponse;

const RESPONSE: &str = include_str!("fixtures/calculation_response.json");

type Fetched = Result<String, FailureInfo>;

/// Fetch whose n-th call yields `script[n]` (the last entry repeats) after
/// `delay`, counting every call.
fn scripted(
    calls: &Arc<AtomicUsize>,
    delay: Duration,
    script: Vec<Fetched>,
) -> impl Fn() -> BoxFuture<'static, Fetched> + Clone + Send + Sync + 'static {
    let calls = Arc::clone(calls);
    let script = Arc::new(script);
    move || {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        let outcome = script[n.min(script.len() - 1)].clone();
        async move {
            tokio::time::sleep(delay).await;
            outcome
        }
        .boxed()
    }
}

fn ok() -> Fetched {
    Ok(RESPONSE.to_string())
}

fn key() -> QueryKey {
    QueryKey::from("POST /api/v1/link-budgets/calculate {\"test\":1}")
}

fn orchestrator() -> Arc<QueryOrchestrator<CalculationResponse>> {
    Arc::new(QueryOrchestrator::new(QueryOptions::default()))
}

#[tokio::test(start_paused = true)]
async fn concurrent_identical_calls_share_one_fetch() {
    let calls = Arc::new(AtomicUsize::new(0));
    let fetch = scripted(&calls, Duration::from_millis(200), vec![ok()]);
    let orch = orchestrator();
    let token = CancellationToken::new();

    let (a, b) = tokio::join!(
        orch.execute(key(), &token, fetch.clone()),
        orch.execute(key(), &token, fetch.clone()),
    );

    let (a, b) = (a.unwrap(), b.unwrap());
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(orch.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn concurrent_calls_share_the_same_failure() {
    let calls = Arc::new(AtomicUsize::new(0));
    let fetch = scripted(&calls, Duration::from_millis(50), vec![Err(FailureInfo::http(404, "no such satellite"))]);
    let orch = orchestrator();
    let token = CancellationToken::new();

    let (a, b) = tokio::join!(
        orch.execute(key(), &token, fetch.clone()),
        orch.execute(key(), &token, fetch.clone()),
    );

    assert!(matches!(a, Err(QueryError::Client { status: 404, .. })));
    assert!(matches!(b, Err(QueryError::Client { status: 404, .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn result_stays_fresh_for_thirty_seconds() {
    let calls = Arc::new(AtomicUsize::new(0));
    let fetch = scripted(&calls, Duration::from_millis(100), vec![ok()]);
    let orch = orchestrator();
    let token = CancellationToken::new();

    let first = orch.execute(key(), &token, fetch.clone()).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::advance(Duration::from_secs(10)).await;
    let second = orch.execute(key(), &token, fetch.clone()).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::advance(Duration::from_secs(21)).await;
    assert!(orch.cached(&key()).is_none());
    let third = orch.execute(key(), &token, fetch.clone()).await.unwrap();
    assert!(!Arc::ptr_eq(&first, &third));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn different_keys_fetch_independently() {
    let calls = Arc::new(AtomicUsize::new(0));
    let fetch = scripted(&calls, Duration::from_millis(10), vec![ok()]);
    let orch = orchestrator();
    let token = CancellationToken::new();

    orch.execute(QueryKey::from("a"), &token, fetch.clone()).await.unwrap();
    orch.execute(QueryKey::from("b"), &token, fetch.clone()).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(orch.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn server_errors_are_retried_with_backoff() {
    let calls = Arc::new(AtomicUsize::new(0));
    let fetch = scripted(
        &calls,
        Duration::ZERO,
        vec![
            Err(FailureInfo::http(503, "busy")),
            Err(FailureInfo::http(500, "oops")),
            ok(),
        ],
    );
    let orch = orchestrator();
    let started = Instant::now();

    let response = orch
        .execute(key(), &CancellationToken::new(), fetch)
        .await
        .unwrap();

    assert_eq!(response.schema_version, "1.1.0");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    // 1s before the first retry, 2s before the second.
    assert_eq!(started.elapsed(), Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn network_failures_give_up_after_four_attempts() {
    let calls = Arc::new(AtomicUsize::new(0));
    let fetch = scripted(&calls, Duration::ZERO, vec![Err(FailureInfo::network("connection refused"))]);
    let orch = orchestrator();
    let started = Instant::now();

    let err = orch
        .execute(key(), &CancellationToken::new(), fetch)
        .await
        .unwrap_err();

    match &err {
        QueryError::TransientNetwork { attempts, reason } => {
            assert_eq!(*attempts, 4);
            assert_eq!(reason, "connection refused");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.is_recoverable());
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(started.elapsed(), Duration::from_secs(1 + 2 + 4));
    assert!(orch.is_empty());
}

#[tokio::test(start_paused = true)]
async fn client_errors_surface_immediately() {
    let calls = Arc::new(AtomicUsize::new(0));
    let fetch = scripted(&calls, Duration::ZERO, vec![Err(FailureInfo::http(422, "{\"detail\":\"bad\"}")), ok()]);
    let orch = orchestrator();
    let started = Instant::now();

    let err = orch
        .execute(key(), &CancellationToken::new(), fetch)
        .await
        .unwrap_err();

    assert!(matches!(err, QueryError::Client { status: 422, .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(started.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn malformed_response_is_not_retried_or_cached() {
    let mut body: Value = serde_json::from_str(RESPONSE).unwrap();
    body.as_object_mut().unwrap().remove("schema_version");

    let calls = Arc::new(AtomicUsize::new(0));
    let fetch = scripted(&calls, Duration::ZERO, vec![Ok(body.to_string())]);
    let orch = orchestrator();
    let token = CancellationToken::new();

    let err = orch.execute(key(), &token, fetch.clone()).await.unwrap_err();
    let violations = err.validation().expect("validation error");
    assert_eq!(violations.first().path, "$.schema_version");
    assert_eq!(err.kind(), "validation");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Nothing was cached, so the next call asks again.
    let _ = orch.execute(key(), &token, fetch).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn non_json_body_is_a_validation_error() {
    let calls = Arc::new(AtomicUsize::new(0));
    let fetch = scripted(&calls, Duration::ZERO, vec![Ok("<html>oops</html>".to_string())]);
    let orch = orchestrator();

    let err = orch
        .execute(key(), &CancellationToken::new(), fetch)
        .await
        .unwrap_err();
    assert_eq!(err.validation().unwrap().first().path, "$");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn cancelling_one_caller_leaves_the_other_waiting() {
    let calls = Arc::new(AtomicUsize::new(0));
    let fetch = scripted(&calls, Duration::from_millis(500), vec![ok()]);
    let orch = orchestrator();
    let leaving = CancellationToken::new();
    let staying = CancellationToken::new();

    let a = tokio::spawn({
        let (orch, token, fetch) = (Arc::clone(&orch), leaving.clone(), fetch.clone());
        async move { orch.execute(key(), &token, fetch).await }
    });
    let b = tokio::spawn({
        let (orch, token, fetch) = (Arc::clone(&orch), staying.clone(), fetch.clone());
        async move { orch.execute(key(), &token, fetch).await }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    leaving.cancel();

    assert!(matches!(a.await.unwrap(), Err(QueryError::Cancelled)));
    assert_eq!(orch.in_flight(), 1);
    let response = b.await.unwrap().unwrap();
    assert_eq!(response.schema_version, "1.1.0");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(orch.cached(&key()).is_some());
}

#[tokio::test(start_paused = true)]
async fn last_caller_cancelling_abandons_the_fetch() {
    let calls = Arc::new(AtomicUsize::new(0));
    let fetch = scripted(&calls, Duration::from_millis(500), vec![ok()]);
    let orch = orchestrator();
    let token = CancellationToken::new();

    let a = tokio::spawn({
        let (orch, token, fetch) = (Arc::clone(&orch), token.clone(), fetch.clone());
        async move { orch.execute(key(), &token, fetch).await }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    token.cancel();
    assert!(matches!(a.await.unwrap(), Err(QueryError::Cancelled)));
    assert_eq!(orch.in_flight(), 0);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(orch.cached(&key()).is_none());
    assert!(orch.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn cancelled_token_never_starts_a_fetch() {
    let calls = Arc::new(AtomicUsize::new(0));
    let fetch = scripted(&calls, Duration::ZERO, vec![ok()]);
    let orch = orchestrator();
    let token = CancellationToken::new();
    token.cancel();

    let err = orch.execute(key(), &token, fetch).await.unwrap_err();
    assert!(matches!(err, QueryError::Cancelled));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn clear_aborts_running_fetches_and_empties_cache() {
    let calls = Arc::new(AtomicUsize::new(0));
    let fetch = scripted(&calls, Duration::from_millis(500), vec![ok()]);
    let orch = orchestrator();
    let token = CancellationToken::new();

    orch.execute(QueryKey::from("cached"), &token, fetch.clone())
        .await
        .unwrap();
    assert_eq!(orch.len(), 1);

    let pending = tokio::spawn({
        let (orch, token, fetch) = (Arc::clone(&orch), token.clone(), fetch.clone());
        async move { orch.execute(key(), &token, fetch).await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(orch.in_flight(), 1);

    orch.clear();

    assert!(matches!(pending.await.unwrap(), Err(QueryError::Cancelled)));
    assert!(orch.is_empty());
    assert_eq!(orch.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn invalidate_forces_the_next_call_to_fetch() {
    let calls = Arc::new(AtomicUsize::new(0));
    let fetch = scripted(&calls, Duration::ZERO, vec![ok()]);
    let orch = orchestrator();
    let token = CancellationToken::new();

    orch.execute(key(), &token, fetch.clone()).await.unwrap();
    assert!(orch.invalidate(&key()));
    assert!(!orch.invalidate(&key()));

    orch.execute(key(), &token, fetch).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn mutations_run_once_and_skip_the_cache() {
    let calls = Arc::new(AtomicUsize::new(0));
    let failing = scripted(&calls, Duration::ZERO, vec![Err(FailureInfo::http(503, "busy"))]);
    let orch = orchestrator();
    let token = CancellationToken::new();

    let err = orch.mutate(&token, failing).await.unwrap_err();
    assert!(matches!(err, QueryError::Server { status: 503, attempts: 1, .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let succeeding = scripted(&calls, Duration::ZERO, vec![ok()]);
    let response = orch.mutate(&token, succeeding).await.unwrap();
    assert_eq!(response.schema_version, "1.1.0");
    assert!(orch.is_empty());
}

#[tokio::test(start_paused = true)]
async fn expired_entries_are_evicted_when_new_results_arrive() {
    let calls = Arc::new(AtomicUsize::new(0));
    let fetch = scripted(&calls, Duration::ZERO, vec![ok()]);
    let orch = orchestrator();
    let token = CancellationToken::new();

    for i in 0..200 {
        let key = QueryKey::from(format!("body {i}").as_str());
        orch.execute(key, &token, fetch.clone()).await.unwrap();
    }
    assert_eq!(orch.len(), 200);

    tokio::time::advance(Duration::from_secs(3600)).await;
    orch.execute(QueryKey::from("fresh body"), &token, fetch).await.unwrap();

    assert_eq!(orch.len(), 1);
    assert!(orch.cached(&QueryKey::from("fresh body")).is_some());
}

#[tokio::test(start_paused = true)]
async fn evict_stale_keeps_fresh_entries() {
    let calls = Arc::new(AtomicUsize::new(0));
    let fetch = scripted(&calls, Duration::ZERO, vec![ok()]);
    let orch = orchestrator();
    let token = CancellationToken::new();

    orch.execute(QueryKey::from("old"), &token, fetch.clone()).await.unwrap();
    tokio::time::advance(Duration::from_secs(20)).await;
    orch.execute(QueryKey::from("young"), &token, fetch).await.unwrap();
    tokio::time::advance(Duration::from_secs(15)).await;

    assert_eq!(orch.evict_stale(), 1);
    assert_eq!(orch.len(), 1);
    assert!(orch.cached(&QueryKey::from("young")).is_some());
    assert_eq!(orch.evict_stale(), 0);
}

#[tokio::test(start_paused = true)]
async fn panicking_fetch_is_reported_as_internal_failure() {
    let orch = orchestrator();
    let fetch = || -> BoxFuture<'static, Fetched> { panic!("decoder blew up") };

    let err = orch
        .execute(key(), &CancellationToken::new(), fetch)
        .await
        .unwrap_err();

    match &err {
        QueryError::Internal { reason } => assert_eq!(reason, "decoder blew up"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.kind(), "internal");
    assert!(!err.is_recoverable());
    assert_eq!(orch.in_flight(), 0);
    assert!(orch.is_empty());

    let calls = Arc::new(AtomicUsize::new(0));
    let recovered = scripted(&calls, Duration::ZERO, vec![ok()]);
    orch.execute(key(), &CancellationToken::new(), recovered)
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
