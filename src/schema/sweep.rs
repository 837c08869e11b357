use serde::Serialize;
use serde_json::Value;

use super::error::ValidationError;
use super::reader::{describe, Bound, Nullable, ObjectReader};
use super::request::CalculationRequest;
use super::response::StrategySnapshot;
use super::Schema;

pub const DEFAULT_THRESHOLD_DB: f64 = 3.0;
pub const MIN_SWEEP_STEPS: u32 = 2;
pub const MAX_SWEEP_STEPS: u32 = 200;

/// A request field the service can vary across a sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepParameter {
    pub path: &'static str,
    pub label: &'static str,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl SweepParameter {
    const fn new(path: &'static str, label: &'static str, min: Option<f64>, max: Option<f64>) -> Self {
        SweepParameter {
            path,
            label,
            min,
            max,
        }
    }

    pub fn admits(&self, value: f64) -> bool {
        self.min.map_or(true, |min| value >= min) && self.max.map_or(true, |max| value <= max)
    }

    fn expected(&self) -> String {
        match (self.min, self.max) {
            (Some(min), Some(max)) => format!("number in [{}, {}] for {}", min, max, self.label),
            (Some(min), None) => format!("number >= {} for {}", min, self.label),
            (None, Some(max)) => format!("number <= {} for {}", max, self.label),
            (None, None) => format!("number for {}", self.label),
        }
    }
}

pub const SWEEPABLE_PARAMETERS: &[SweepParameter] = &[
    SweepParameter::new("runtime.uplink.rain_rate_mm_per_hr", "Uplink Rain Rate (mm/hr)", Some(0.0), None),
    SweepParameter::new("runtime.downlink.rain_rate_mm_per_hr", "Downlink Rain Rate (mm/hr)", Some(0.0), None),
    SweepParameter::new("runtime.uplink.frequency_hz", "Uplink Frequency (Hz)", Some(1e6), None),
    SweepParameter::new("runtime.downlink.frequency_hz", "Downlink Frequency (Hz)", Some(1e6), None),
    SweepParameter::new("runtime.bandwidth_hz", "Channel Bandwidth (Hz)", Some(1e3), None),
    SweepParameter::new("runtime.uplink.bandwidth_hz", "Uplink Bandwidth (Hz)", Some(1e3), None),
    SweepParameter::new("runtime.downlink.bandwidth_hz", "Downlink Bandwidth (Hz)", Some(1e3), None),
    SweepParameter::new("runtime.uplink.elevation_deg", "Uplink Elevation (deg)", Some(0.0), Some(90.0)),
    SweepParameter::new("runtime.downlink.elevation_deg", "Downlink Elevation (deg)", Some(0.0), Some(90.0)),
    SweepParameter::new("runtime.uplink.ground_lat_deg", "Uplink Ground Latitude (deg)", Some(-90.0), Some(90.0)),
    SweepParameter::new("runtime.downlink.ground_lat_deg", "Downlink Ground Latitude (deg)", Some(-90.0), Some(90.0)),
    SweepParameter::new("runtime.sat_longitude_deg", "Satellite Longitude (deg)", Some(-180.0), Some(180.0)),
    SweepParameter::new("overrides.satellite.eirp_dbw", "Satellite EIRP (dBW)", None, None),
    SweepParameter::new("overrides.satellite.gt_db_per_k", "Satellite G/T (dB/K)", None, None),
];

pub fn sweep_parameter(path: &str) -> Option<&'static SweepParameter> {
    SWEEPABLE_PARAMETERS.iter().find(|p| p.path == path)
}

/// Which field to vary and over what range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepConfig {
    pub parameter_path: String,
    pub start: f64,
    pub end: f64,
    pub steps: u32,
}

impl SweepConfig {
    pub fn parameter(&self) -> Option<&'static SweepParameter> {
        sweep_parameter(&self.parameter_path)
    }

    /// Evenly spaced values from `start` to `end`, both included.
    pub fn values(&self) -> Vec<f64> {
        let span = self.end - self.start;
        let intervals = f64::from(self.steps.saturating_sub(1).max(1));
        (0..self.steps)
            .map(|i| self.start + f64::from(i) * span / intervals)
            .collect()
    }
}

/// Body of a sweep call: a full calculation plus the parameter to vary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepRequest {
    pub base_request: CalculationRequest,
    pub sweep: SweepConfig,
    /// Margin the service looks for a crossover at. Absent means 3 dB,
    /// `null` disables the crossover search.
    pub threshold_db: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepPoint {
    pub sweep_value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub combined_link_margin_db: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub combined_cn_db: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub combined_cn0_dbhz: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uplink_cn_db: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uplink_rain_loss_db: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uplink_link_margin_db: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downlink_cn_db: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downlink_rain_loss_db: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downlink_link_margin_db: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modcod_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modcod_label: Option<String>,
    pub viable: bool,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepResponse {
    pub sweep_parameter: String,
    pub sweep_label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold_db: Option<f64>,
    pub points: Vec<SweepPoint>,
    /// Interpolated value where the combined margin crosses the threshold.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crossover_value: Option<f64>,
    pub strategy: StrategySnapshot,
}

impl SweepResponse {
    pub fn viable_points(&self) -> impl Iterator<Item = &SweepPoint> {
        self.points.iter().filter(|p| p.viable)
    }
}

impl Schema for SweepRequest {
    const NAME: &'static str = "SweepRequest";

    fn read(value: &Value, path: &str, errors: &mut Vec<ValidationError>) -> Option<Self> {
        let mut obj = ObjectReader::open(value, path, errors)?;

        let base_request = obj.nested::<CalculationRequest>("base_request");
        let sweep = obj.nested::<SweepConfig>("sweep");
        let threshold_db = obj
            .nullable_number("threshold_db", Bound::Any)
            .map(|threshold| match threshold {
                Nullable::Absent => Some(DEFAULT_THRESHOLD_DB),
                Nullable::Null => None,
                Nullable::Value(v) => Some(v),
            });

        Some(SweepRequest {
            base_request: base_request?,
            sweep: sweep?,
            threshold_db: threshold_db?,
        })
    }
}

impl Schema for SweepConfig {
    const NAME: &'static str = "SweepConfig";

    fn read(value: &Value, path: &str, errors: &mut Vec<ValidationError>) -> Option<Self> {
        let mut obj = ObjectReader::open(value, path, errors)?;

        let parameter = obj
            .raw("parameter_path")
            .and_then(Value::as_str)
            .and_then(sweep_parameter);
        if parameter.is_none() {
            obj.reject("parameter_path", "one of the sweepable parameter paths");
        }
        let start = obj.number("start", Bound::Any);
        let end = obj.number("end", Bound::Any);
        let steps = obj.integer("steps", MIN_SWEEP_STEPS, MAX_SWEEP_STEPS);

        if let (Some(start), Some(end)) = (start, end) {
            if start == end {
                let path = obj.field_path("end");
                let received = describe(obj.raw("end"));
                obj.push(ValidationError::new(path, "number different from start", received));
            }
            if let Some(parameter) = parameter {
                for (key, bound) in [("start", start), ("end", end)] {
                    if !parameter.admits(bound) {
                        obj.reject(key, parameter.expected());
                    }
                }
            }
        }

        Some(SweepConfig {
            parameter_path: parameter?.path.to_string(),
            start: start?,
            end: end?,
            steps: steps?,
        })
    }
}

impl Schema for SweepPoint {
    const NAME: &'static str = "SweepPoint";

    fn read(value: &Value, path: &str, errors: &mut Vec<ValidationError>) -> Option<Self> {
        let mut obj = ObjectReader::open(value, path, errors)?;

        let sweep_value = obj.number("sweep_value", Bound::Any);
        let combined_link_margin_db = obj.optional_number("combined_link_margin_db", Bound::Any);
        let combined_cn_db = obj.optional_number("combined_cn_db", Bound::Any);
        let combined_cn0_dbhz = obj.optional_number("combined_cn0_dbhz", Bound::Any);
        let uplink_cn_db = obj.optional_number("uplink_cn_db", Bound::Any);
        let uplink_rain_loss_db = obj.optional_number("uplink_rain_loss_db", Bound::Any);
        let uplink_link_margin_db = obj.optional_number("uplink_link_margin_db", Bound::Any);
        let downlink_cn_db = obj.optional_number("downlink_cn_db", Bound::Any);
        let downlink_rain_loss_db = obj.optional_number("downlink_rain_loss_db", Bound::Any);
        let downlink_link_margin_db = obj.optional_number("downlink_link_margin_db", Bound::Any);
        let modcod_id = obj.optional_string("modcod_id");
        let modcod_label = obj.optional_string("modcod_label");
        let viable = obj.flag_or("viable", true);
        let warnings = obj.optional_string_list("warnings");

        Some(SweepPoint {
            sweep_value: sweep_value?,
            combined_link_margin_db: combined_link_margin_db?,
            combined_cn_db: combined_cn_db?,
            combined_cn0_dbhz: combined_cn0_dbhz?,
            uplink_cn_db: uplink_cn_db?,
            uplink_rain_loss_db: uplink_rain_loss_db?,
            uplink_link_margin_db: uplink_link_margin_db?,
            downlink_cn_db: downlink_cn_db?,
            downlink_rain_loss_db: downlink_rain_loss_db?,
            downlink_link_margin_db: downlink_link_margin_db?,
            modcod_id: modcod_id?,
            modcod_label: modcod_label?,
            viable: viable?,
            warnings: warnings?.unwrap_or_default(),
        })
    }
}

impl Schema for SweepResponse {
    const NAME: &'static str = "SweepResponse";

    fn read(value: &Value, path: &str, errors: &mut Vec<ValidationError>) -> Option<Self> {
        let mut obj = ObjectReader::open(value, path, errors)?;

        let sweep_parameter = obj.string("sweep_parameter");
        let sweep_label = obj.string("sweep_label");
        let threshold_db = obj.optional_number("threshold_db", Bound::Any);
        let points = obj.nested_list::<SweepPoint>("points");
        let crossover_value = obj.optional_number("crossover_value", Bound::Any);
        let strategy = obj.nested::<StrategySnapshot>("strategy");

        Some(SweepResponse {
            sweep_parameter: sweep_parameter?,
            sweep_label: sweep_label?,
            threshold_db: threshold_db?,
            points: points?,
            crossover_value: crossover_value?,
            strategy: strategy?,
        })
    }
}
