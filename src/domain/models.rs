use crate::domain::consolidator::ShiftDetails;
use crate::domain::diff::ShiftDiff;
use crate::domain::interval::{Period, TimezoneMarker, YearMonth};
use crate::error::ScheduleResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Plan,
    Fact,
    VacancyPlan,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Fact => "fact",
            Self::VacancyPlan => "vacancy_plan",
        }
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        match value.trim().to_ascii_lowercase().as_str() {
            "plan" => Ok(Self::Plan),
            "fact" => Ok(Self::Fact),
            "vacancy_plan" => Ok(Self::VacancyPlan),
            other => Err(format!("invalid shift kind: {other}")),
        }
    }

    pub fn is_plan(self) -> bool {
        matches!(self, Self::Plan | Self::VacancyPlan)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DeletionState {
    #[default]
    Active,
    Deleted { at: DateTime<Utc> },
}

impl DeletionState {
    pub fn from_deleted_at(deleted_at: Option<DateTime<Utc>>) -> Self {
        match deleted_at {
            Some(at) => Self::Deleted { at },
            None => Self::Active,
        }
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Active => None,
            Self::Deleted { at } => Some(*at),
        }
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, Self::Deleted { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShiftRecord {
    pub id: String,
    pub kind: RecordKind,
    pub timeline_id: String,
    pub work_start_utc: DateTime<Utc>,
    pub work_end_utc: DateTime<Utc>,
    pub shift_type_id: String,
    pub work_category_id: Option<String>,
    pub plan_id: Option<String>,
    pub identification_start_id: Option<String>,
    pub identification_finish_id: Option<String>,
    pub penalty_minutes: i64,
    pub deletion: DeletionState,
}

impl ShiftRecord {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "shift.id")?;
        validate_non_empty(&self.timeline_id, "shift.timeline_id")?;
        validate_non_empty(&self.shift_type_id, "shift.shift_type_id")?;
        if self.kind.is_plan() && self.work_end_utc <= self.work_start_utc {
            return Err("shift.work_end_utc must be after shift.work_start_utc".to_string());
        }
        if self.work_end_utc < self.work_start_utc {
            return Err("shift.work_end_utc must be >= shift.work_start_utc".to_string());
        }
        if self.penalty_minutes < 0 {
            return Err("shift.penalty_minutes must be >= 0".to_string());
        }
        if self.kind.is_plan() {
            if self.plan_id.is_some() {
                return Err("shift.plan_id is only allowed on facts".to_string());
            }
            if self.penalty_minutes != 0 {
                return Err("shift.penalty_minutes is only allowed on facts".to_string());
            }
        }
        Ok(())
    }

    pub fn period(&self) -> Period {
        Period::new(self.work_start_utc, self.work_end_utc)
    }

    pub fn is_live(&self) -> bool {
        !self.deletion.is_deleted()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum ShiftOwner {
    Employee(String),
    Vacancy(String),
}

impl ShiftOwner {
    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::Employee(_) => "employee",
            Self::Vacancy(_) => "vacancy",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Employee(id) | Self::Vacancy(id) => id,
        }
    }

    pub fn from_parts(kind: &str, id: String) -> Result<Self, String> {
        match kind {
            "employee" => Ok(Self::Employee(id)),
            "vacancy" => Ok(Self::Vacancy(id)),
            other => Err(format!("invalid timeline owner kind: {other}")),
        }
    }

    pub fn plan_kind(&self) -> RecordKind {
        match self {
            Self::Employee(_) => RecordKind::Plan,
            Self::Vacancy(_) => RecordKind::VacancyPlan,
        }
    }
}

impl fmt::Display for ShiftOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind_str(), self.id())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Draft,
    Waiting,
    Rejected,
    Confirmed,
}

impl ApprovalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Waiting => "waiting",
            Self::Rejected => "rejected",
            Self::Confirmed => "confirmed",
        }
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "waiting" => Ok(Self::Waiting),
            "rejected" => Ok(Self::Rejected),
            "confirmed" => Ok(Self::Confirmed),
            other => Err(format!("invalid approval status: {other}")),
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TimelineAggregates {
    pub plan_count: i64,
    pub fact_count: i64,
    pub plan_sum_minutes: i64,
    pub fact_sum_minutes: i64,
    pub penalty_sum_minutes: i64,
    pub billing_sum_minutes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Timeline {
    pub id: String,
    pub owner: ShiftOwner,
    pub trading_point_id: String,
    pub month: YearMonth,
    pub timezone_marker: String,
    pub aggregates: TimelineAggregates,
    pub shift_details: ShiftDetails,
    pub approval_status: ApprovalStatus,
    pub approval_status_last_changed_utc: Option<DateTime<Utc>>,
    pub rejected_at_utc: Option<DateTime<Utc>>,
    pub confirmed_at_utc: Option<DateTime<Utc>>,
}

impl Timeline {
    pub fn timezone(&self) -> ScheduleResult<TimezoneMarker> {
        TimezoneMarker::parse(&self.timezone_marker)
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "timeline.id")?;
        validate_non_empty(self.owner.id(), "timeline.owner")?;
        validate_non_empty(&self.trading_point_id, "timeline.trading_point_id")?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkCategory {
    pub id: String,
    pub name: String,
    pub overlap_acceptable: bool,
    pub blocked_at: Option<DateTime<Utc>>,
}

impl WorkCategory {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "work_category.id")?;
        validate_non_empty(&self.name, "work_category.name")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShiftType {
    pub id: String,
    pub name: String,
    pub blocked_at: Option<DateTime<Utc>>,
}

impl ShiftType {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "shift_type.id")?;
        validate_non_empty(&self.name, "shift_type.name")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TradingPoint {
    pub id: String,
    pub name: String,
    pub timezone_marker: String,
}

impl TradingPoint {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "trading_point.id")?;
        TimezoneMarker::parse(&self.timezone_marker)
            .map(|_| ())
            .map_err(|error| format!("trading_point.timezone_marker: {error}"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct StakeholderOptions {
    pub allowable_early_arrival_minutes: i64,
    pub allowable_late_arrival_minutes: i64,
    pub allowable_early_departure_minutes: i64,
    pub allowable_late_departure_minutes: i64,
}

impl StakeholderOptions {
    pub fn validate(&self) -> Result<(), String> {
        for (value, field_name) in [
            (self.allowable_early_arrival_minutes, "allowableEarlyArrivalMinutes"),
            (self.allowable_late_arrival_minutes, "allowableLateArrivalMinutes"),
            (self.allowable_early_departure_minutes, "allowableEarlyDepartureMinutes"),
            (self.allowable_late_departure_minutes, "allowableLateDepartureMinutes"),
        ] {
            if value < 0 {
                return Err(format!("stakeholder.{field_name} must be >= 0"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HistoryScope {
    Primary,
    PreviousOwner,
}

impl HistoryScope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::PreviousOwner => "previous_owner",
        }
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        match value {
            "primary" => Ok(Self::Primary),
            "previous_owner" => Ok(Self::PreviousOwner),
            other => Err(format!("invalid history scope: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangeHistoryEntry {
    pub id: String,
    pub timeline_id: String,
    pub shift_id: Option<String>,
    pub method: String,
    pub is_new_record: bool,
    pub scope: HistoryScope,
    pub diff: ShiftDiff,
    pub actor_id: String,
    pub created_at: DateTime<Utc>,
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}
