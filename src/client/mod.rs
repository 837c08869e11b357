//! HTTP access to the link-budget calculation service.

use log::{debug, info};
use reqwest::{Method, RequestBuilder};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::config::Config;
use crate::query::{self, CancellationToken, QueryError, QueryKey, QueryOrchestrator};
use crate::retry::FailureInfo;
use crate::schema::{
    self, CalculationRequest, CalculationResponse, Scenario, ScenarioDraft, Schema, SweepRequest,
    SweepResponse, ValidationError, ValidationErrors,
};

pub const CALCULATE_PATH: &str = "/api/v1/link-budgets/calculate";
pub const SWEEP_PATH: &str = "/api/v1/link-budgets/sweep";
pub const SCENARIOS_PATH: &str = "/api/v1/scenarios";
pub const API_KEY_HEADER: &str = "X-API-Key";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP client setup failed: {0}")]
    Http(#[from] reqwest::Error),
}

pub struct LinkBudgetClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    calculations: QueryOrchestrator<CalculationResponse>,
    sweeps: QueryOrchestrator<SweepResponse>,
}

impl LinkBudgetClient {
    pub fn new(config: &Config) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.api.timeout)
            .build()?;

        Ok(LinkBudgetClient {
            http,
            base_url: config.api.base_url.trim_end_matches('/').to_string(),
            api_key: config.api.api_key.clone(),
            calculations: QueryOrchestrator::new(config.query_options()),
            sweeps: QueryOrchestrator::new(config.query_options()),
        })
    }

    pub fn calculations(&self) -> &QueryOrchestrator<CalculationResponse> {
        &self.calculations
    }

    pub fn sweeps(&self) -> &QueryOrchestrator<SweepResponse> {
        &self.sweeps
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Validates `raw` locally, then fetches the calculation through the
    /// shared cache with retries. A request that fails validation never
    /// reaches the network.
    pub async fn calculate(
        &self,
        raw: &Value,
        token: &CancellationToken,
    ) -> Result<Arc<CalculationResponse>, QueryError> {
        let body = prepare::<CalculationRequest>(raw)?;
        self.query(&self.calculations, CALCULATE_PATH, body, token).await
    }

    /// Same call without cache or retry, for callers that need their own
    /// fresh computation.
    pub async fn calculate_uncached(
        &self,
        raw: &Value,
        token: &CancellationToken,
    ) -> Result<CalculationResponse, QueryError> {
        let body = prepare::<CalculationRequest>(raw)?;
        let request = self.build_request(Method::POST, &self.url(CALCULATE_PATH), &body);
        query::mutate(token, || send(request)).await
    }

    /// Runs a parameter sweep. Cached and retried like [`calculate`],
    /// in a cache of its own.
    ///
    /// [`calculate`]: LinkBudgetClient::calculate
    pub async fn sweep(
        &self,
        raw: &Value,
        token: &CancellationToken,
    ) -> Result<Arc<SweepResponse>, QueryError> {
        let body = prepare::<SweepRequest>(raw)?;
        self.query(&self.sweeps, SWEEP_PATH, body, token).await
    }

    /// Stores a new scenario. Sent once, never retried.
    pub async fn create_scenario(
        &self,
        raw: &Value,
        token: &CancellationToken,
    ) -> Result<Scenario, QueryError> {
        let body = prepare::<ScenarioDraft>(raw)?;
        let request = self.build_request(Method::POST, &self.url(SCENARIOS_PATH), &body);
        let scenario: Scenario = query::mutate(token, || send(request)).await?;
        info!("created scenario {}", scenario.id);
        Ok(scenario)
    }

    /// Replaces a stored scenario. Sent once, never retried.
    pub async fn update_scenario(
        &self,
        id: Uuid,
        raw: &Value,
        token: &CancellationToken,
    ) -> Result<Scenario, QueryError> {
        let body = prepare::<ScenarioDraft>(raw)?;
        let url = format!("{}/{}", self.url(SCENARIOS_PATH), id);
        let request = self.build_request(Method::PUT, &url, &body);
        let scenario: Scenario = query::mutate(token, || send(request)).await?;
        info!("updated scenario {}", scenario.id);
        Ok(scenario)
    }

    /// Drops cached results and aborts running fetches.
    pub fn shutdown(&self) {
        info!("shutting down calculation client");
        self.calculations.clear();
        self.sweeps.clear();
    }

    async fn query<T>(
        &self,
        cache: &QueryOrchestrator<T>,
        path: &str,
        body: Value,
        token: &CancellationToken,
    ) -> Result<Arc<T>, QueryError>
    where
        T: Schema + Send + Sync + 'static,
    {
        let url = self.url(path);
        let key = QueryKey::new(&format!("POST {}", url), &body);

        let http = self.http.clone();
        let api_key = self.api_key.clone();
        let fetch = move || {
            send(build_request(
                &http,
                Method::POST,
                &url,
                api_key.as_deref(),
                &body,
            ))
        };

        cache.execute(key, token, fetch).await
    }

    fn build_request(&self, method: Method, url: &str, body: &Value) -> RequestBuilder {
        build_request(&self.http, method, url, self.api_key.as_deref(), body)
    }
}

/// Checks the body and re-encodes it from the validated form.
fn prepare<T: Schema + Serialize>(raw: &Value) -> Result<Value, QueryError> {
    let validated: T = schema::validate(raw)?;
    serde_json::to_value(&validated).map_err(|e| {
        QueryError::Validation(ValidationErrors::single(
            T::NAME,
            ValidationError::new("$", "serializable request", e.to_string()),
        ))
    })
}

fn build_request(
    http: &reqwest::Client,
    method: Method,
    url: &str,
    api_key: Option<&str>,
    body: &Value,
) -> RequestBuilder {
    let request = http.request(method, url).json(body);
    match api_key {
        Some(key) => request.header(API_KEY_HEADER, key),
        None => request,
    }
}

/// Sends one attempt and sorts the outcome into a body or a classified
/// failure. Decoding the body is left to the caller.
async fn send(request: RequestBuilder) -> Result<String, FailureInfo> {
    let response = request
        .send()
        .await
        .map_err(|e| FailureInfo::network(describe_transport_error(&e)))?;

    let status = response.status();
    debug!("calculation service answered {}", status);

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(FailureInfo::http(status.as_u16(), body));
    }

    response
        .text()
        .await
        .map_err(|e| FailureInfo::network(describe_transport_error(&e)))
}

fn describe_transport_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("timed out: {}", e)
    } else if e.is_connect() {
        format!("connection failed: {}", e)
    } else {
        e.to_string()
    }
}
