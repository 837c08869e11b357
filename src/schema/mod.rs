//! Structural validation of calculation payloads.
//!
//! Every payload arrives as untyped JSON. A [`Schema`] walks it field by
//! field, records every broken rule with its path, and only hands back a
//! typed value when nothing was broken.

mod error;
mod reader;
mod request;
mod response;
mod runtime;
mod scenario;
mod sweep;

use serde_json::Value;

pub use error::{ValidationError, ValidationErrors};
pub use reader::Nullable;
pub use request::{CalculationOverrides, CalculationRequest, SatelliteOverrides, TransponderType};
pub use response::{
    CalculationResponse, CalculationResults, CombinedResult, DirectionResult, ModcodSelection,
    PayloadSnapshot, SelectedModcod, SnapshotMetadata, StrategySnapshot,
};
pub use runtime::{
    ChannelParameters, InterferenceParameters, IntermodulationParameters, RuntimeParameters,
};
pub use scenario::{Scenario, ScenarioDraft, ScenarioStatus, DEFAULT_SCENARIO_SCHEMA_VERSION};
pub use sweep::{
    sweep_parameter, SweepConfig, SweepParameter, SweepPoint, SweepRequest, SweepResponse,
    DEFAULT_THRESHOLD_DB, SWEEPABLE_PARAMETERS,
};

/// A payload shape that can be checked against untyped JSON.
pub trait Schema: Sized {
    const NAME: &'static str;

    /// Reads `value` found at `path`, pushing each violation onto `errors`.
    /// Returns `None` if any rule under this value failed.
    fn read(value: &Value, path: &str, errors: &mut Vec<ValidationError>) -> Option<Self>;
}

pub fn validate<T: Schema>(raw: &Value) -> Result<T, ValidationErrors> {
    validate_at(raw, "$")
}

/// Like [`validate`], with paths reported relative to `root`.
pub fn validate_at<T: Schema>(raw: &Value, root: &str) -> Result<T, ValidationErrors> {
    let mut errors = Vec::new();
    match T::read(raw, root, &mut errors) {
        Some(value) if errors.is_empty() => Ok(value),
        _ => Err(ValidationErrors::new(T::NAME, errors)),
    }
}

/// Parses a response body and validates it. A body that is not JSON at all
/// is reported as a violation at the root.
pub fn parse_and_validate<T: Schema>(body: &str) -> Result<T, ValidationErrors> {
    let raw: Value = serde_json::from_str(body).map_err(|e| {
        ValidationErrors::single(
            T::NAME,
            ValidationError::new("$", "JSON document", format!("unparsable body ({})", e)),
        )
    })?;
    validate(&raw)
}

/// Payload families known to the validator, for callers that choose the
/// schema at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    Runtime,
    Request,
    Response,
    SweepRequest,
    SweepResponse,
    Scenario,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Validated {
    Runtime(RuntimeParameters),
    Request(CalculationRequest),
    Response(Box<CalculationResponse>),
    SweepRequest(Box<SweepRequest>),
    SweepResponse(SweepResponse),
    Scenario(ScenarioDraft),
}

pub fn validate_kind(kind: SchemaKind, raw: &Value) -> Result<Validated, ValidationErrors> {
    match kind {
        SchemaKind::Runtime => validate(raw).map(Validated::Runtime),
        SchemaKind::Request => validate(raw).map(Validated::Request),
        SchemaKind::Response => validate(raw).map(|r| Validated::Response(Box::new(r))),
        SchemaKind::SweepRequest => validate(raw).map(|r| Validated::SweepRequest(Box::new(r))),
        SchemaKind::SweepResponse => validate(raw).map(Validated::SweepResponse),
        SchemaKind::Scenario => validate(raw).map(Validated::Scenario),
    }
}
