//! End-to-end behaviour of the calculation client against a mock service.

use serde_json::{json, Value};
use std::io::Write;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use linkbudget_client::client::{CALCULATE_PATH, SCENARIOS_PATH, SWEEP_PATH};
use linkbudget_client::{CancellationToken, Config, LinkBudgetClient, QueryError};

const REQUEST: &str = include_str!("fixtures/calculation_request.json");
const RESPONSE: &str = include_str!("fixtures/calculation_response.json");
const SWEEP_REQUEST: &str = include_str!("fixtures/sweep_request.json");
const SWEEP_RESPONSE: &str = include_str!("fixtures/sweep_response.json");
const SCENARIO: &str = include_str!("fixtures/scenario.json");
const SCENARIO_ID: &str = "5e4d3c2b-1a09-4f8e-b7d6-c5b4a3928170";

fn request() -> Value {
    serde_json::from_str(REQUEST).unwrap()
}

fn sweep_request() -> Value {
    serde_json::from_str(SWEEP_REQUEST).unwrap()
}

fn scenario_draft() -> Value {
    serde_json::from_str(SCENARIO).unwrap()
}

/// The draft as the server echoes it back once stored.
fn stored_scenario() -> Value {
    let mut stored = scenario_draft();
    stored["id"] = json!(SCENARIO_ID);
    stored["schema_version"] = json!("1.1.0");
    stored["created_at"] = json!("2026-03-02T09:15:00Z");
    stored["updated_at"] = json!("2026-03-02T09:15:00Z");
    stored
}

/// Short backoff so failing scenarios finish quickly on the real clock.
fn config_for(base_url: &str) -> Config {
    Config::parse(&format!(
        "api:\n  base_url: {base_url}\n  api_key: test-key\n  timeout: 5s\n\
         retry:\n  max_retries: 3\n  base_delay: 10ms\n  max_delay: 40ms\n"
    ))
    .unwrap()
}

fn client_for(server: &MockServer) -> LinkBudgetClient {
    LinkBudgetClient::new(&config_for(&server.uri())).unwrap()
}

#[tokio::test]
async fn calculation_is_posted_once_and_then_served_from_cache() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CALCULATE_PATH))
        .and(header("X-API-Key", "test-key"))
        .and(body_partial_json(json!({ "transponder_type": "TRANSPARENT" })))
        .respond_with(ResponseTemplate::new(200).set_body_string(RESPONSE))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let token = CancellationToken::new();

    let first = client.calculate(&request(), &token).await.unwrap();
    assert_eq!(first.schema_version, "1.1.0");
    assert_eq!(first.results.uplink.modcod_selected.as_deref(), Some("QPSK_3/4"));

    let second = client.calculate(&request(), &token).await.unwrap();
    assert_eq!(first.schema_version, second.schema_version);
    assert_eq!(client.calculations().len(), 1);
}

#[tokio::test]
async fn reordered_request_hits_the_same_cache_entry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CALCULATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(RESPONSE))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let token = CancellationToken::new();
    client.calculate(&request(), &token).await.unwrap();

    let mut reordered = serde_json::Map::new();
    let original = request();
    for (k, v) in original.as_object().unwrap().iter().rev() {
        reordered.insert(k.clone(), v.clone());
    }
    client
        .calculate(&Value::Object(reordered), &token)
        .await
        .unwrap();
}

#[tokio::test]
async fn rejected_request_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(422).set_body_string(r#"{"detail":"unknown modcod table"}"#))
        .expect(1)
        .mount(&server)
        .await;

    let err = client_for(&server)
        .calculate(&request(), &CancellationToken::new())
        .await
        .unwrap_err();

    match &err {
        QueryError::Client { status, body } => {
            assert_eq!(*status, 422);
            assert!(body.contains("unknown modcod table"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!err.is_recoverable());
}

#[tokio::test]
async fn server_errors_are_retried_until_the_budget_runs_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .expect(4)
        .mount(&server)
        .await;

    let err = client_for(&server)
        .calculate(&request(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, QueryError::Server { status: 503, attempts: 4, .. }));
    assert!(err.is_recoverable());
}

#[tokio::test]
async fn service_recovering_mid_retry_yields_the_result() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string(RESPONSE))
        .expect(1)
        .mount(&server)
        .await;

    let response = client_for(&server)
        .calculate(&request(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(response.schema_version, "1.1.0");
}

#[tokio::test]
async fn invalid_request_never_reaches_the_service() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string(RESPONSE))
        .expect(0)
        .mount(&server)
        .await;

    let mut raw = request();
    raw["runtime"]["uplink"]["elevation_deg"] = json!(-5);

    let err = client_for(&server)
        .calculate(&raw, &CancellationToken::new())
        .await
        .unwrap_err();

    let violations = err.validation().expect("validation error");
    assert_eq!(violations.schema(), "CalculationRequest");
    assert!(violations.at("$.runtime.uplink.elevation_deg").is_some());
}

#[tokio::test]
async fn html_error_page_is_reported_as_a_validation_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client_for(&server)
        .calculate(&request(), &CancellationToken::new())
        .await
        .unwrap_err();

    let violations = err.validation().expect("validation error");
    assert_eq!(violations.schema(), "CalculationResponse");
    assert_eq!(violations.first().path, "$");
}

#[tokio::test]
async fn response_missing_results_is_rejected() {
    let mut body: Value = serde_json::from_str(RESPONSE).unwrap();
    body.as_object_mut().unwrap().remove("results");

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client
        .calculate(&request(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.validation().unwrap().at("$.results").is_some());
    assert!(client.calculations().is_empty());
}

#[tokio::test]
async fn unreachable_service_is_a_transient_network_failure() {
    // Grab a port nothing listens on any more.
    let uri = MockServer::start().await.uri();

    let client = LinkBudgetClient::new(&config_for(&uri)).unwrap();
    let err = client
        .calculate(&request(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, QueryError::TransientNetwork { attempts: 4, .. }));
    assert_eq!(err.kind(), "transient_network");
}

#[tokio::test]
async fn uncached_calculation_always_goes_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(CALCULATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(RESPONSE))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let token = CancellationToken::new();
    client.calculate_uncached(&request(), &token).await.unwrap();
    client.calculate_uncached(&request(), &token).await.unwrap();
    assert!(client.calculations().is_empty());
}

#[tokio::test]
async fn cancelling_a_slow_calculation_returns_promptly() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(RESPONSE)
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let client = client_for(&server);
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let started = std::time::Instant::now();
    let err = client.calculate(&request(), &token).await.unwrap_err();

    assert!(matches!(err, QueryError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(client.calculations().is_empty());
    assert_eq!(client.calculations().in_flight(), 0);
}

#[tokio::test]
async fn client_reads_its_settings_from_a_file() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("X-API-Key", "from-file"))
        .respond_with(ResponseTemplate::new(200).set_body_string(RESPONSE))
        .expect(1)
        .mount(&server)
        .await;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "api:\n  base_url: {}/\n  api_key: from-file\ncache:\n  stale_time: 5m",
        server.uri()
    )
    .unwrap();

    let config = Config::from_file(file.path().to_str().unwrap()).unwrap();
    assert_eq!(config.cache.stale_time, Duration::from_secs(300));

    let client = LinkBudgetClient::new(&config).unwrap();
    assert_eq!(client.url(CALCULATE_PATH), format!("{}{}", server.uri(), CALCULATE_PATH));
    client
        .calculate(&request(), &CancellationToken::new())
        .await
        .unwrap();
}

#[tokio::test]
async fn sweep_is_retried_then_served_from_its_own_cache() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SWEEP_PATH))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(SWEEP_PATH))
        .and(body_partial_json(json!({
            "sweep": { "parameter_path": "runtime.uplink.rain_rate_mm_per_hr", "steps": 6 }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string(SWEEP_RESPONSE))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let token = CancellationToken::new();

    let first = client.sweep(&sweep_request(), &token).await.unwrap();
    assert_eq!(first.points.len(), 3);
    assert_eq!(first.crossover_value, Some(32.5));

    client.sweep(&sweep_request(), &token).await.unwrap();
    assert_eq!(client.sweeps().len(), 1);
    assert!(client.calculations().is_empty());
}

#[tokio::test]
async fn sweep_outside_parameter_bounds_never_reaches_the_service() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SWEEP_RESPONSE))
        .expect(0)
        .mount(&server)
        .await;

    let mut raw = sweep_request();
    raw["sweep"]["start"] = json!(-10.0);

    let err = client_for(&server)
        .sweep(&raw, &CancellationToken::new())
        .await
        .unwrap_err();

    let violations = err.validation().expect("validation error");
    assert_eq!(violations.schema(), "SweepRequest");
    assert!(violations.at("$.sweep.start").is_some());
}

#[tokio::test]
async fn scenario_create_is_sent_once_even_when_the_service_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SCENARIOS_PATH))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let err = client_for(&server)
        .create_scenario(&scenario_draft(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, QueryError::Server { status: 503, attempts: 1, .. }));
}

#[tokio::test]
async fn scenario_create_returns_the_stored_scenario() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SCENARIOS_PATH))
        .and(header("X-API-Key", "test-key"))
        .and(body_partial_json(json!({ "status": "Saved", "schema_version": "1.1.0" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(stored_scenario()))
        .expect(1)
        .mount(&server)
        .await;

    let scenario = client_for(&server)
        .create_scenario(&scenario_draft(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(scenario.id.to_string(), SCENARIO_ID);
    assert_eq!(scenario.name, "Tokyo to Osaka Ku-band");
}

#[tokio::test]
async fn scenario_update_puts_to_the_scenario_url() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path(format!("{}/{}", SCENARIOS_PATH, SCENARIO_ID)))
        .respond_with(ResponseTemplate::new(200).set_body_json(stored_scenario()))
        .expect(1)
        .mount(&server)
        .await;

    let id: uuid::Uuid = SCENARIO_ID.parse().unwrap();
    let scenario = client_for(&server)
        .update_scenario(id, &scenario_draft(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(scenario.id, id);
}

#[tokio::test]
async fn scenario_with_unknown_fields_is_refused_locally() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201).set_body_json(stored_scenario()))
        .expect(0)
        .mount(&server)
        .await;

    let mut raw = scenario_draft();
    raw["owner"] = json!("ops");

    let err = client_for(&server)
        .create_scenario(&raw, &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.validation().unwrap().first().path, "$.owner");
}
