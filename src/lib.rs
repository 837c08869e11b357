//! Client-side contract layer for the satellite link-budget calculation
//! service: payload validation, retry policy and a deduplicating result
//! cache.

pub mod client;
pub mod config;
pub mod query;
pub mod retry;
pub mod schema;

pub use client::LinkBudgetClient;
pub use config::Config;
pub use query::{mutate, CancellationToken, QueryError, QueryKey, QueryOptions, QueryOrchestrator};
pub use retry::{FailureInfo, RetryPolicy};
pub use schema::{
    validate, CalculationRequest, CalculationResponse, RuntimeParameters, Scenario, ScenarioDraft,
    SweepRequest, SweepResponse,
};
