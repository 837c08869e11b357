use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use super::error::{ValidationError, ValidationErrors};
use super::reader::{describe, Bound, ObjectReader};
use super::runtime::RuntimeParameters;
use super::{validate_at, Schema};

/// Reply of a calculate call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalculationResponse {
    /// Lets the client notice when the server starts sending a different
    /// payload shape.
    pub schema_version: String,
    pub strategy: StrategySnapshot,
    pub results: CalculationResults,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub combined_link_margin_db: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub combined_cn_db: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub combined_cn0_dbhz: Option<f64>,
    pub modcod_selected: Option<SelectedModcod>,
    pub runtime_echo: RuntimeParameters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_snapshot: Option<PayloadSnapshot>,
}

/// Strategy names are passed through as the server spells them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategySnapshot {
    pub waveform_strategy: String,
    pub transponder_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalculationResults {
    pub uplink: DirectionResult,
    pub downlink: DirectionResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub combined: Option<CombinedResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectionResult {
    pub direction: String,
    pub fspl_db: f64,
    pub rain_loss_db: f64,
    pub gas_loss_db: f64,
    pub cloud_loss_db: f64,
    pub atm_loss_db: f64,
    pub antenna_pointing_loss_db: f64,
    pub gt_db_per_k: f64,
    pub cn_db: f64,
    pub cn0_dbhz: f64,
    pub link_margin_db: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clean_link_margin_db: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clean_cn_db: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modcod_selected: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eirp_dbw: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bandwidth_hz: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cni_db: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cni0_dbhz: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub c_im_db: Option<f64>,
    pub interference_applied: bool,
    pub intermod_applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<String>>,
}

/// End-to-end figures across uplink and downlink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CombinedResult {
    pub cn_db: f64,
    pub cn0_dbhz: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cni_db: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cni0_dbhz: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub c_im_db: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_margin_db: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clean_link_margin_db: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clean_cn_db: Option<f64>,
}

/// Selected modulation and coding. Transparent links report one scheme,
/// regenerative links one per direction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SelectedModcod {
    Single(ModcodSelection),
    PerDirection {
        #[serde(skip_serializing_if = "Option::is_none")]
        uplink: Option<ModcodSelection>,
        #[serde(skip_serializing_if = "Option::is_none")]
        downlink: Option<ModcodSelection>,
    },
}

impl SelectedModcod {
    pub fn uplink(&self) -> Option<&ModcodSelection> {
        match self {
            SelectedModcod::Single(m) => Some(m),
            SelectedModcod::PerDirection { uplink, .. } => uplink.as_ref(),
        }
    }

    pub fn downlink(&self) -> Option<&ModcodSelection> {
        match self {
            SelectedModcod::Single(m) => Some(m),
            SelectedModcod::PerDirection { downlink, .. } => downlink.as_ref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModcodSelection {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modulation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_rate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_ebno_db: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_cn0_dbhz: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info_bits_per_symbol: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_spectral_efficiency: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rolloff: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pilots: Option<bool>,
}

/// Audit record of everything the server used for the calculation. Only
/// `metadata` is checked; the other sections are kept as raw JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PayloadSnapshot {
    #[serde(rename = "static", skip_serializing_if = "Option::is_none")]
    pub static_data: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Map<String, Value>>,
    pub metadata: SnapshotMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overrides: Option<Map<String, Value>>,
}

impl PayloadSnapshot {
    /// Checks the recorded runtime section against [`RuntimeParameters`].
    /// `None` when the snapshot carries no runtime section.
    pub fn runtime_parameters(&self) -> Option<Result<RuntimeParameters, ValidationErrors>> {
        self.runtime.as_ref().map(|runtime| {
            validate_at::<RuntimeParameters>(
                &Value::Object(runtime.clone()),
                "$.payload_snapshot.runtime",
            )
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotMetadata {
    pub schema_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub computed_at: Option<DateTime<Utc>>,
    /// Remaining metadata keys, untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Schema for CalculationResponse {
    const NAME: &'static str = "CalculationResponse";

    fn read(value: &Value, path: &str, errors: &mut Vec<ValidationError>) -> Option<Self> {
        let mut obj = ObjectReader::open(value, path, errors)?;

        let schema_version = obj.string("schema_version");
        let strategy = obj.nested::<StrategySnapshot>("strategy");
        let results = obj.nested::<CalculationResults>("results");
        let combined_link_margin_db = obj.optional_number("combined_link_margin_db", Bound::Any);
        let combined_cn_db = obj.optional_number("combined_cn_db", Bound::Any);
        let combined_cn0_dbhz = obj.optional_number("combined_cn0_dbhz", Bound::Any);
        let modcod_selected = read_selected_modcod(&mut obj);
        let runtime_echo = obj.nested::<RuntimeParameters>("runtime_echo");
        let payload_snapshot = obj.optional_nested::<PayloadSnapshot>("payload_snapshot");

        Some(CalculationResponse {
            schema_version: schema_version?,
            strategy: strategy?,
            results: results?,
            combined_link_margin_db: combined_link_margin_db?,
            combined_cn_db: combined_cn_db?,
            combined_cn0_dbhz: combined_cn0_dbhz?,
            modcod_selected: modcod_selected?,
            runtime_echo: runtime_echo?,
            payload_snapshot: payload_snapshot?,
        })
    }
}

/// The key must be present; `null` means the server found no viable scheme.
fn read_selected_modcod(obj: &mut ObjectReader<'_, '_>) -> Option<Option<SelectedModcod>> {
    const KEY: &str = "modcod_selected";
    let path = obj.field_path(KEY);

    match obj.raw(KEY) {
        None => {
            obj.reject(KEY, "object or null");
            None
        }
        Some(Value::Null) => Some(None),
        Some(v) if v.get("id").is_some() => {
            let mut errors = Vec::new();
            let single = ModcodSelection::read(v, &path, &mut errors);
            errors.into_iter().for_each(|e| obj.push(e));
            single.map(|m| Some(SelectedModcod::Single(m)))
        }
        Some(v) if v.get("uplink").is_some() || v.get("downlink").is_some() => {
            let mut errors = Vec::new();
            let directions = ObjectReader::open(v, &path, &mut errors).and_then(|mut dirs| {
                let uplink = dirs.optional_nested::<ModcodSelection>("uplink");
                let downlink = dirs.optional_nested::<ModcodSelection>("downlink");
                Some(SelectedModcod::PerDirection {
                    uplink: uplink?,
                    downlink: downlink?,
                })
            });
            errors.into_iter().for_each(|e| obj.push(e));
            directions.map(Some)
        }
        Some(v) => {
            obj.push(ValidationError::new(
                path,
                "object with `id`, or with `uplink`/`downlink`, or null",
                describe(Some(v)),
            ));
            None
        }
    }
}

impl Schema for StrategySnapshot {
    const NAME: &'static str = "StrategySnapshot";

    fn read(value: &Value, path: &str, errors: &mut Vec<ValidationError>) -> Option<Self> {
        let mut obj = ObjectReader::open(value, path, errors)?;
        let waveform_strategy = obj.string("waveform_strategy");
        let transponder_type = obj.string("transponder_type");
        Some(StrategySnapshot {
            waveform_strategy: waveform_strategy?,
            transponder_type: transponder_type?,
        })
    }
}

impl Schema for CalculationResults {
    const NAME: &'static str = "CalculationResults";

    fn read(value: &Value, path: &str, errors: &mut Vec<ValidationError>) -> Option<Self> {
        let mut obj = ObjectReader::open(value, path, errors)?;
        let uplink = obj.nested::<DirectionResult>("uplink");
        let downlink = obj.nested::<DirectionResult>("downlink");
        let combined = obj.optional_nested::<CombinedResult>("combined");
        Some(CalculationResults {
            uplink: uplink?,
            downlink: downlink?,
            combined: combined?,
        })
    }
}

impl Schema for DirectionResult {
    const NAME: &'static str = "DirectionResult";

    fn read(value: &Value, path: &str, errors: &mut Vec<ValidationError>) -> Option<Self> {
        let mut obj = ObjectReader::open(value, path, errors)?;

        let direction = obj.string("direction");
        let fspl_db = obj.number("fspl_db", Bound::Any);
        let rain_loss_db = obj.number("rain_loss_db", Bound::Any);
        let gas_loss_db = obj.number("gas_loss_db", Bound::Any);
        let cloud_loss_db = obj.number("cloud_loss_db", Bound::Any);
        let atm_loss_db = obj.number("atm_loss_db", Bound::Any);
        let antenna_pointing_loss_db = obj.number("antenna_pointing_loss_db", Bound::Any);
        let gt_db_per_k = obj.number("gt_db_per_k", Bound::Any);
        let cn_db = obj.number("cn_db", Bound::Any);
        let cn0_dbhz = obj.number("cn0_dbhz", Bound::Any);
        let link_margin_db = obj.number("link_margin_db", Bound::Any);
        let clean_link_margin_db = obj.optional_number("clean_link_margin_db", Bound::Any);
        let clean_cn_db = obj.optional_number("clean_cn_db", Bound::Any);
        let modcod_selected = obj.optional_string("modcod_selected");
        let eirp_dbw = obj.optional_number("eirp_dbw", Bound::Any);
        let bandwidth_hz = obj.optional_number("bandwidth_hz", Bound::Positive);
        let cni_db = obj.optional_number("cni_db", Bound::Any);
        let cni0_dbhz = obj.optional_number("cni0_dbhz", Bound::Any);
        let c_im_db = obj.optional_number("c_im_db", Bound::Any);
        let interference_applied = obj.flag("interference_applied");
        let intermod_applied = obj.flag("intermod_applied");
        let warnings = obj.optional_string_list("warnings");

        Some(DirectionResult {
            direction: direction?,
            fspl_db: fspl_db?,
            rain_loss_db: rain_loss_db?,
            gas_loss_db: gas_loss_db?,
            cloud_loss_db: cloud_loss_db?,
            atm_loss_db: atm_loss_db?,
            antenna_pointing_loss_db: antenna_pointing_loss_db?,
            gt_db_per_k: gt_db_per_k?,
            cn_db: cn_db?,
            cn0_dbhz: cn0_dbhz?,
            link_margin_db: link_margin_db?,
            clean_link_margin_db: clean_link_margin_db?,
            clean_cn_db: clean_cn_db?,
            modcod_selected: modcod_selected?,
            eirp_dbw: eirp_dbw?,
            bandwidth_hz: bandwidth_hz?,
            cni_db: cni_db?,
            cni0_dbhz: cni0_dbhz?,
            c_im_db: c_im_db?,
            interference_applied: interference_applied?,
            intermod_applied: intermod_applied?,
            warnings: warnings?,
        })
    }
}

impl Schema for CombinedResult {
    const NAME: &'static str = "CombinedResult";

    fn read(value: &Value, path: &str, errors: &mut Vec<ValidationError>) -> Option<Self> {
        let mut obj = ObjectReader::open(value, path, errors)?;

        let cn_db = obj.number("cn_db", Bound::Any);
        let cn0_dbhz = obj.number("cn0_dbhz", Bound::Any);
        let cni_db = obj.optional_number("cni_db", Bound::Any);
        let cni0_dbhz = obj.optional_number("cni0_dbhz", Bound::Any);
        let c_im_db = obj.optional_number("c_im_db", Bound::Any);
        let link_margin_db = obj.optional_number("link_margin_db", Bound::Any);
        let clean_link_margin_db = obj.optional_number("clean_link_margin_db", Bound::Any);
        let clean_cn_db = obj.optional_number("clean_cn_db", Bound::Any);

        Some(CombinedResult {
            cn_db: cn_db?,
            cn0_dbhz: cn0_dbhz?,
            cni_db: cni_db?,
            cni0_dbhz: cni0_dbhz?,
            c_im_db: c_im_db?,
            link_margin_db: link_margin_db?,
            clean_link_margin_db: clean_link_margin_db?,
            clean_cn_db: clean_cn_db?,
        })
    }
}

impl Schema for ModcodSelection {
    const NAME: &'static str = "ModcodSelection";

    fn read(value: &Value, path: &str, errors: &mut Vec<ValidationError>) -> Option<Self> {
        let mut obj = ObjectReader::open(value, path, errors)?;

        let id = obj.non_empty_string("id");
        let modulation = obj.optional_string("modulation");
        let code_rate = obj.optional_string("code_rate");
        let required_ebno_db = obj.optional_number("required_ebno_db", Bound::Any);
        let required_cn0_dbhz = obj.optional_number("required_cn0_dbhz", Bound::Any);
        let info_bits_per_symbol = obj.optional_number("info_bits_per_symbol", Bound::Positive);
        let effective_spectral_efficiency =
            obj.optional_number("effective_spectral_efficiency", Bound::Any);
        let rolloff = obj.optional_number("rolloff", Bound::NonNegative);
        let pilots = obj.optional_bool("pilots");

        Some(ModcodSelection {
            id: id?,
            modulation: modulation?,
            code_rate: code_rate?,
            required_ebno_db: required_ebno_db?,
            required_cn0_dbhz: required_cn0_dbhz?,
            info_bits_per_symbol: info_bits_per_symbol?,
            effective_spectral_efficiency: effective_spectral_efficiency?,
            rolloff: rolloff?,
            pilots: pilots?,
        })
    }
}

impl Schema for PayloadSnapshot {
    const NAME: &'static str = "PayloadSnapshot";

    fn read(value: &Value, path: &str, errors: &mut Vec<ValidationError>) -> Option<Self> {
        let mut obj = ObjectReader::open(value, path, errors)?;

        let static_data = obj.optional_object("static");
        let entity = obj.optional_object("entity");
        let runtime = obj.optional_object("runtime");
        let strategy = obj.optional_object("strategy");
        let metadata = obj.nested::<SnapshotMetadata>("metadata");
        let overrides = obj.optional_object("overrides");

        Some(PayloadSnapshot {
            static_data: static_data?,
            entity: entity?,
            runtime: runtime?,
            strategy: strategy?,
            metadata: metadata?,
            overrides: overrides?,
        })
    }
}

impl Schema for SnapshotMetadata {
    const NAME: &'static str = "SnapshotMetadata";

    fn read(value: &Value, path: &str, errors: &mut Vec<ValidationError>) -> Option<Self> {
        let mut obj = ObjectReader::open(value, path, errors)?;

        let schema_version = obj.string("schema_version");
        let computed_at = obj.optional_timestamp("computed_at");
        let extra = value
            .as_object()
            .map(|map| {
                map.iter()
                    .filter(|(k, _)| k.as_str() != "schema_version" && k.as_str() != "computed_at")
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default();

        Some(SnapshotMetadata {
            schema_version: schema_version?,
            computed_at: computed_at?,
            extra,
        })
    }
}
