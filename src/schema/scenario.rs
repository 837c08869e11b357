use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::error::{ValidationError, ValidationErrors};
use super::reader::ObjectReader;
use super::request::{read_transponder_type, TransponderType};
use super::response::PayloadSnapshot;
use super::{validate_at, Schema};

pub const DEFAULT_SCENARIO_SCHEMA_VERSION: &str = "1.1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ScenarioStatus {
    #[default]
    Draft,
    Saved,
    Archived,
}

impl ScenarioStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Draft" => Some(ScenarioStatus::Draft),
            "Saved" => Some(ScenarioStatus::Saved),
            "Archived" => Some(ScenarioStatus::Archived),
            _ => None,
        }
    }
}

/// Body of a scenario create or update. The server refuses unknown keys
/// here, so they are refused before sending too.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioDraft {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub waveform_strategy: String,
    pub transponder_type: TransponderType,
    pub modcod_table_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub satellite_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub earth_station_tx_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub earth_station_rx_id: Option<Uuid>,
    pub schema_version: String,
    pub status: ScenarioStatus,
    /// Saved calculation inputs, stored by the server as given.
    pub payload_snapshot: Map<String, Value>,
}

/// A stored scenario as the server returns it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scenario {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub waveform_strategy: String,
    pub transponder_type: TransponderType,
    pub modcod_table_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub satellite_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub earth_station_tx_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub earth_station_rx_id: Option<Uuid>,
    pub schema_version: String,
    pub status: ScenarioStatus,
    pub payload_snapshot: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Scenario {
    /// Reads the stored snapshot as a calculation snapshot, when it has the
    /// metadata section one needs.
    pub fn snapshot(&self) -> Result<PayloadSnapshot, ValidationErrors> {
        validate_at(
            &Value::Object(self.payload_snapshot.clone()),
            "$.payload_snapshot",
        )
    }
}

const DRAFT_FIELDS: &[&str] = &[
    "name",
    "description",
    "waveform_strategy",
    "transponder_type",
    "modcod_table_id",
    "satellite_id",
    "earth_station_tx_id",
    "earth_station_rx_id",
    "schema_version",
    "status",
    "payload_snapshot",
];

/// Fields shared by drafts and stored scenarios.
struct Common {
    name: String,
    description: Option<String>,
    waveform_strategy: String,
    transponder_type: TransponderType,
    modcod_table_id: Uuid,
    satellite_id: Option<Uuid>,
    earth_station_tx_id: Option<Uuid>,
    earth_station_rx_id: Option<Uuid>,
    schema_version: String,
    status: ScenarioStatus,
    payload_snapshot: Map<String, Value>,
}

fn read_common(obj: &mut ObjectReader<'_, '_>) -> Option<Common> {
    let name = obj.string("name");
    let description = obj.optional_string("description");
    let waveform_strategy = obj.non_empty_string("waveform_strategy");
    let transponder_type = read_transponder_type(obj);
    let modcod_table_id = obj.uuid("modcod_table_id");
    let satellite_id = obj.optional_uuid("satellite_id");
    let earth_station_tx_id = obj.optional_uuid("earth_station_tx_id");
    let earth_station_rx_id = obj.optional_uuid("earth_station_rx_id");
    let schema_version = obj.optional_string("schema_version");
    let status = read_status(obj);
    let payload_snapshot = obj.raw("payload_snapshot").and_then(Value::as_object).cloned();
    if payload_snapshot.is_none() {
        obj.reject("payload_snapshot", "object");
    }

    Some(Common {
        name: name?,
        description: description?,
        waveform_strategy: waveform_strategy?,
        transponder_type: transponder_type?,
        modcod_table_id: modcod_table_id?,
        satellite_id: satellite_id?,
        earth_station_tx_id: earth_station_tx_id?,
        earth_station_rx_id: earth_station_rx_id?,
        schema_version: schema_version?
            .unwrap_or_else(|| DEFAULT_SCENARIO_SCHEMA_VERSION.to_string()),
        status: status?,
        payload_snapshot: payload_snapshot?,
    })
}

fn read_status(obj: &mut ObjectReader<'_, '_>) -> Option<ScenarioStatus> {
    match obj.raw("status") {
        None | Some(Value::Null) => Some(ScenarioStatus::default()),
        Some(v) => {
            let parsed = v.as_str().and_then(ScenarioStatus::parse);
            if parsed.is_none() {
                obj.reject("status", "one of Draft, Saved, Archived");
            }
            parsed
        }
    }
}

impl Schema for ScenarioDraft {
    const NAME: &'static str = "ScenarioDraft";

    fn read(value: &Value, path: &str, errors: &mut Vec<ValidationError>) -> Option<Self> {
        let mut obj = ObjectReader::open(value, path, errors)?;
        obj.deny_unknown(DRAFT_FIELDS);
        let c = read_common(&mut obj)?;

        Some(ScenarioDraft {
            name: c.name,
            description: c.description,
            waveform_strategy: c.waveform_strategy,
            transponder_type: c.transponder_type,
            modcod_table_id: c.modcod_table_id,
            satellite_id: c.satellite_id,
            earth_station_tx_id: c.earth_station_tx_id,
            earth_station_rx_id: c.earth_station_rx_id,
            schema_version: c.schema_version,
            status: c.status,
            payload_snapshot: c.payload_snapshot,
        })
    }
}

impl Schema for Scenario {
    const NAME: &'static str = "Scenario";

    fn read(value: &Value, path: &str, errors: &mut Vec<ValidationError>) -> Option<Self> {
        let mut obj = ObjectReader::open(value, path, errors)?;

        let id = obj.uuid("id");
        let common = read_common(&mut obj);
        let created_at = obj.optional_timestamp("created_at");
        let updated_at = obj.optional_timestamp("updated_at");
        let c = common?;

        Some(Scenario {
            id: id?,
            name: c.name,
            description: c.description,
            waveform_strategy: c.waveform_strategy,
            transponder_type: c.transponder_type,
            modcod_table_id: c.modcod_table_id,
            satellite_id: c.satellite_id,
            earth_station_tx_id: c.earth_station_tx_id,
            earth_station_rx_id: c.earth_station_rx_id,
            schema_version: c.schema_version,
            status: c.status,
            payload_snapshot: c.payload_snapshot,
            created_at: created_at?,
            updated_at: updated_at?,
        })
    }
}
