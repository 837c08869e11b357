use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use super::error::ValidationError;
use super::reader::{describe, Bound, ObjectReader};
use super::runtime::RuntimeParameters;
use super::Schema;

/// Transponder architecture. Decides how ModCod tables are assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransponderType {
    Transparent,
    Regenerative,
}

impl TransponderType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "TRANSPARENT" => Some(TransponderType::Transparent),
            "REGENERATIVE" => Some(TransponderType::Regenerative),
            _ => None,
        }
    }
}

/// Body of a calculate call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalculationRequest {
    pub waveform_strategy: String,
    pub transponder_type: TransponderType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modcod_table_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uplink_modcod_table_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downlink_modcod_table_id: Option<Uuid>,
    pub satellite_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub earth_station_tx_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub earth_station_rx_id: Option<Uuid>,
    pub runtime: RuntimeParameters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overrides: Option<CalculationOverrides>,
    pub include_snapshot: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalculationOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub satellite: Option<SatelliteOverrides>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SatelliteOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eirp_dbw: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gt_db_per_k: Option<f64>,
}

impl Schema for CalculationRequest {
    const NAME: &'static str = "CalculationRequest";

    fn read(value: &Value, path: &str, errors: &mut Vec<ValidationError>) -> Option<Self> {
        let mut obj = ObjectReader::open(value, path, errors)?;

        let waveform_strategy = obj.non_empty_string("waveform_strategy");
        let transponder_type = read_transponder_type(&mut obj);
        let modcod_table_id = obj.optional_uuid("modcod_table_id");
        let uplink_modcod_table_id = obj.optional_uuid("uplink_modcod_table_id");
        let downlink_modcod_table_id = obj.optional_uuid("downlink_modcod_table_id");
        let satellite_id = obj.uuid("satellite_id");
        let earth_station_tx_id = obj.optional_uuid("earth_station_tx_id");
        let earth_station_rx_id = obj.optional_uuid("earth_station_rx_id");
        let runtime = obj.nested::<RuntimeParameters>("runtime");
        let overrides = obj.optional_nested::<CalculationOverrides>("overrides");
        let include_snapshot = obj.flag("include_snapshot");

        if let (Some(kind), Some(table), Some(uplink), Some(downlink)) = (
            transponder_type,
            modcod_table_id,
            uplink_modcod_table_id,
            downlink_modcod_table_id,
        ) {
            check_modcod_tables(&mut obj, kind, table, uplink, downlink);
        }

        Some(CalculationRequest {
            waveform_strategy: waveform_strategy?,
            transponder_type: transponder_type?,
            modcod_table_id: modcod_table_id?,
            uplink_modcod_table_id: uplink_modcod_table_id?,
            downlink_modcod_table_id: downlink_modcod_table_id?,
            satellite_id: satellite_id?,
            earth_station_tx_id: earth_station_tx_id?,
            earth_station_rx_id: earth_station_rx_id?,
            runtime: runtime?,
            overrides: overrides?,
            include_snapshot: include_snapshot?,
        })
    }
}

pub(crate) fn read_transponder_type(obj: &mut ObjectReader<'_, '_>) -> Option<TransponderType> {
    let parsed = obj
        .raw("transponder_type")
        .and_then(Value::as_str)
        .and_then(TransponderType::parse);
    if parsed.is_none() {
        obj.reject("transponder_type", "one of TRANSPARENT, REGENERATIVE");
    }
    parsed
}

/// Transparent transponders run both directions off one ModCod table;
/// regenerative ones demodulate on board and need a table per direction.
fn check_modcod_tables(
    obj: &mut ObjectReader<'_, '_>,
    kind: TransponderType,
    table: Option<Uuid>,
    uplink: Option<Uuid>,
    downlink: Option<Uuid>,
) {
    match kind {
        TransponderType::Transparent => {
            let Some(table) = table else {
                obj.reject("modcod_table_id", "UUID string (required for TRANSPARENT)");
                return;
            };
            for (key, id) in [
                ("uplink_modcod_table_id", uplink),
                ("downlink_modcod_table_id", downlink),
            ] {
                if id.is_some_and(|id| id != table) {
                    let path = obj.field_path(key);
                    let received = describe(obj.raw(key));
                    obj.push(ValidationError::new(
                        path,
                        "same id as modcod_table_id for TRANSPARENT",
                        received,
                    ));
                }
            }
        }
        TransponderType::Regenerative => {
            if uplink.is_none() {
                obj.reject("uplink_modcod_table_id", "UUID string (required for REGENERATIVE)");
            }
            if downlink.is_none() {
                obj.reject(
                    "downlink_modcod_table_id",
                    "UUID string (required for REGENERATIVE)",
                );
            }
        }
    }
}

impl Schema for CalculationOverrides {
    const NAME: &'static str = "CalculationOverrides";

    fn read(value: &Value, path: &str, errors: &mut Vec<ValidationError>) -> Option<Self> {
        let mut obj = ObjectReader::open(value, path, errors)?;
        let satellite = obj.optional_nested::<SatelliteOverrides>("satellite");
        Some(CalculationOverrides {
            satellite: satellite?,
        })
    }
}

impl Schema for SatelliteOverrides {
    const NAME: &'static str = "SatelliteOverrides";

    fn read(value: &Value, path: &str, errors: &mut Vec<ValidationError>) -> Option<Self> {
        let mut obj = ObjectReader::open(value, path, errors)?;
        let eirp_dbw = obj.optional_number("eirp_dbw", Bound::Any);
        let gt_db_per_k = obj.optional_number("gt_db_per_k", Bound::Any);
        Some(SatelliteOverrides {
            eirp_dbw: eirp_dbw?,
            gt_db_per_k: gt_db_per_k?,
        })
    }
}
