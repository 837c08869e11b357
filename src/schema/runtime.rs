use serde::Serialize;
use serde_json::Value;

use super::error::ValidationError;
use super::reader::{Bound, Nullable, ObjectReader};
use super::Schema;

/// Parameters for one calculation run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuntimeParameters {
    pub sat_longitude_deg: f64,
    /// Channel bandwidth shared by both directions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bandwidth_hz: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rolloff: Option<f64>,
    pub uplink: ChannelParameters,
    pub downlink: ChannelParameters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intermodulation: Option<IntermodulationParameters>,
}

/// Per-direction link geometry and atmosphere.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelParameters {
    pub frequency_hz: f64,
    pub bandwidth_hz: f64,
    /// Look angle from the ground station. Negative angles put the
    /// satellite below the horizon.
    pub elevation_deg: f64,
    pub rain_rate_mm_per_hr: f64,
    pub temperature_k: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pressure_hpa: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub water_vapor_density: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ground_lat_deg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ground_lon_deg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ground_alt_m: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interference: Option<InterferenceParameters>,
}

/// Carrier-to-interference contributions. Each ratio may be left out,
/// or sent as an explicit `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterferenceParameters {
    #[serde(skip_serializing_if = "Nullable::is_absent")]
    pub adjacent_sat_ci_db: Nullable<f64>,
    #[serde(skip_serializing_if = "Nullable::is_absent")]
    pub cross_polar_ci_db: Nullable<f64>,
    #[serde(skip_serializing_if = "Nullable::is_absent")]
    pub other_carrier_ci_db: Nullable<f64>,
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntermodulationParameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_backoff_db: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_backoff_db: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saturation_power_dbw: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub composite_carriers: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_bandwidth_hz: Option<f64>,
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Schema for RuntimeParameters {
    const NAME: &'static str = "RuntimeParameters";

    fn read(value: &Value, path: &str, errors: &mut Vec<ValidationError>) -> Option<Self> {
        let mut obj = ObjectReader::open(value, path, errors)?;

        let sat_longitude_deg = obj.number("sat_longitude_deg", Bound::Any);
        let bandwidth_hz = obj.optional_number("bandwidth_hz", Bound::Positive);
        let rolloff = obj.optional_number("rolloff", Bound::NonNegative);
        let uplink = obj.nested::<ChannelParameters>("uplink");
        let downlink = obj.nested::<ChannelParameters>("downlink");
        let intermodulation = obj.optional_nested::<IntermodulationParameters>("intermodulation");

        Some(RuntimeParameters {
            sat_longitude_deg: sat_longitude_deg?,
            bandwidth_hz: bandwidth_hz?,
            rolloff: rolloff?,
            uplink: uplink?,
            downlink: downlink?,
            intermodulation: intermodulation?,
        })
    }
}

impl Schema for ChannelParameters {
    const NAME: &'static str = "ChannelParameters";

    fn read(value: &Value, path: &str, errors: &mut Vec<ValidationError>) -> Option<Self> {
        let mut obj = ObjectReader::open(value, path, errors)?;

        let frequency_hz = obj.number("frequency_hz", Bound::Positive);
        let bandwidth_hz = obj.number("bandwidth_hz", Bound::Positive);
        let elevation_deg = obj.number("elevation_deg", Bound::NonNegative);
        let rain_rate_mm_per_hr = obj.number("rain_rate_mm_per_hr", Bound::NonNegative);
        let temperature_k = obj.number("temperature_k", Bound::Positive);
        let pressure_hpa = obj.optional_number("pressure_hpa", Bound::Positive);
        let water_vapor_density = obj.optional_number("water_vapor_density", Bound::NonNegative);
        let ground_lat_deg = obj.optional_number("ground_lat_deg", Bound::Range(-90.0, 90.0));
        let ground_lon_deg = obj.optional_number("ground_lon_deg", Bound::Range(-180.0, 180.0));
        let ground_alt_m = obj.optional_number("ground_alt_m", Bound::Any);
        let interference = obj.optional_nested::<InterferenceParameters>("interference");

        Some(ChannelParameters {
            frequency_hz: frequency_hz?,
            bandwidth_hz: bandwidth_hz?,
            elevation_deg: elevation_deg?,
            rain_rate_mm_per_hr: rain_rate_mm_per_hr?,
            temperature_k: temperature_k?,
            pressure_hpa: pressure_hpa?,
            water_vapor_density: water_vapor_density?,
            ground_lat_deg: ground_lat_deg?,
            ground_lon_deg: ground_lon_deg?,
            ground_alt_m: ground_alt_m?,
            interference: interference?,
        })
    }
}

impl Schema for InterferenceParameters {
    const NAME: &'static str = "InterferenceParameters";

    fn read(value: &Value, path: &str, errors: &mut Vec<ValidationError>) -> Option<Self> {
        let mut obj = ObjectReader::open(value, path, errors)?;

        let adjacent_sat_ci_db = obj.nullable_number("adjacent_sat_ci_db", Bound::Any);
        let cross_polar_ci_db = obj.nullable_number("cross_polar_ci_db", Bound::Any);
        let other_carrier_ci_db = obj.nullable_number("other_carrier_ci_db", Bound::Any);
        let applied = obj.flag("applied");
        let notes = obj.optional_string("notes");

        Some(InterferenceParameters {
            adjacent_sat_ci_db: adjacent_sat_ci_db?,
            cross_polar_ci_db: cross_polar_ci_db?,
            other_carrier_ci_db: other_carrier_ci_db?,
            applied: applied?,
            notes: notes?,
        })
    }
}

impl Schema for IntermodulationParameters {
    const NAME: &'static str = "IntermodulationParameters";

    fn read(value: &Value, path: &str, errors: &mut Vec<ValidationError>) -> Option<Self> {
        let mut obj = ObjectReader::open(value, path, errors)?;

        let input_backoff_db = obj.optional_number("input_backoff_db", Bound::NonNegative);
        let output_backoff_db = obj.optional_number("output_backoff_db", Bound::NonNegative);
        let saturation_power_dbw = obj.optional_number("saturation_power_dbw", Bound::Any);
        let composite_carriers = obj.optional_integer("composite_carriers", 1);
        let reference_bandwidth_hz = obj.optional_number("reference_bandwidth_hz", Bound::Positive);
        let applied = obj.flag("applied");
        let notes = obj.optional_string("notes");

        Some(IntermodulationParameters {
            input_backoff_db: input_backoff_db?,
            output_backoff_db: output_backoff_db?,
            saturation_power_dbw: saturation_power_dbw?,
            composite_carriers: composite_carriers?,
            reference_bandwidth_hz: reference_bandwidth_hz?,
            applied: applied?,
            notes: notes?,
        })
    }
}
