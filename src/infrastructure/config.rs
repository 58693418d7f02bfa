use crate::domain::approval::StatusChangeConsent;
use crate::domain::interval::TimezoneMarker;
use crate::domain::models::StakeholderOptions;
use crate::error::{ScheduleError, ScheduleResult};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const ENGINE_JSON: &str = "engine.json";
const STAKEHOLDER_JSON: &str = "stakeholder.json";
const MAX_LOOKAROUND_HOURS: i64 = 24 * 31;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub default_timezone: TimezoneMarker,
    pub status_change_consent: StatusChangeConsent,
    pub overlap_lookaround_hours: i64,
    pub stakeholder: StakeholderOptions,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_timezone: TimezoneMarker::Utc,
            status_change_consent: StatusChangeConsent::Warn,
            overlap_lookaround_hours: 24,
            stakeholder: StakeholderOptions::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EngineFile {
    #[serde(default)]
    default_timezone: String,
    #[serde(default)]
    status_change_consent: StatusChangeConsent,
    #[serde(default = "default_lookaround_hours")]
    overlap_lookaround_hours: i64,
}

fn default_lookaround_hours() -> i64 {
    24
}

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    HashMap::from([
        (
            ENGINE_JSON,
            serde_json::json!({
                "schema": 1,
                "defaultTimezone": "",
                "statusChangeConsent": "warn",
                "overlapLookaroundHours": 24
            }),
        ),
        (
            STAKEHOLDER_JSON,
            serde_json::json!({
                "schema": 1,
                "allowableEarlyArrivalMinutes": 0,
                "allowableLateArrivalMinutes": 0,
                "allowableEarlyDepartureMinutes": 0,
                "allowableLateDepartureMinutes": 0
            }),
        ),
    ])
}

pub fn ensure_default_configs(config_dir: &Path) -> ScheduleResult<()> {
    for (name, value) in default_files() {
        let path = config_dir.join(name);
        if !path.exists() {
            let formatted = serde_json::to_string_pretty(&value)?;
            fs::write(path, format!("{formatted}\n"))?;
        }
    }
    Ok(())
}

fn read_config(path: &Path) -> ScheduleResult<serde_json::Value> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| {
            ScheduleError::InvalidConfig(format!("missing schema in {}", path.display()))
        })?;
    if schema != 1 {
        return Err(ScheduleError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn load_engine_config(config_dir: &Path) -> ScheduleResult<EngineConfig> {
    let engine_path = config_dir.join(ENGINE_JSON);
    let engine: EngineFile = serde_json::from_value(read_config(&engine_path)?)
        .map_err(|error| {
            ScheduleError::InvalidConfig(format!("{}: {error}", engine_path.display()))
        })?;
    let stakeholder_path = config_dir.join(STAKEHOLDER_JSON);
    let stakeholder: StakeholderOptions =
        serde_json::from_value(read_config(&stakeholder_path)?).map_err(|error| {
            ScheduleError::InvalidConfig(format!("{}: {error}", stakeholder_path.display()))
        })?;

    stakeholder.validate().map_err(ScheduleError::InvalidConfig)?;
    if !(0..=MAX_LOOKAROUND_HOURS).contains(&engine.overlap_lookaround_hours) {
        return Err(ScheduleError::InvalidConfig(format!(
            "overlapLookaroundHours must be between 0 and {MAX_LOOKAROUND_HOURS}"
        )));
    }
    let default_timezone = TimezoneMarker::parse(&engine.default_timezone).map_err(|error| {
        ScheduleError::InvalidConfig(format!("defaultTimezone: {error}"))
    })?;

    Ok(EngineConfig {
        default_timezone,
        status_change_consent: engine.status_change_consent,
        overlap_lookaround_hours: engine.overlap_lookaround_hours,
        stakeholder,
    })
}
