use crate::domain::interval::{format_utc, parse_utc};
use crate::domain::models::{DeletionState, ShiftRecord};
use crate::error::{ScheduleError, ScheduleResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ShiftField {
    TimelineId,
    WorkStartUtc,
    WorkEndUtc,
    ShiftTypeId,
    WorkCategoryId,
    PlanId,
    IdentificationStartId,
    IdentificationFinishId,
    PenaltyMinutes,
    DeletedAt,
}

impl ShiftField {
    pub const ALL: [ShiftField; 10] = [
        ShiftField::TimelineId,
        ShiftField::WorkStartUtc,
        ShiftField::WorkEndUtc,
        ShiftField::ShiftTypeId,
        ShiftField::WorkCategoryId,
        ShiftField::PlanId,
        ShiftField::IdentificationStartId,
        ShiftField::IdentificationFinishId,
        ShiftField::PenaltyMinutes,
        ShiftField::DeletedAt,
    ];

    fn read(self, record: &ShiftRecord) -> Value {
        match self {
            Self::TimelineId => Value::String(record.timeline_id.clone()),
            Self::WorkStartUtc => Value::String(format_utc(record.work_start_utc)),
            Self::WorkEndUtc => Value::String(format_utc(record.work_end_utc)),
            Self::ShiftTypeId => Value::String(record.shift_type_id.clone()),
            Self::WorkCategoryId => optional_string(&record.work_category_id),
            Self::PlanId => optional_string(&record.plan_id),
            Self::IdentificationStartId => optional_string(&record.identification_start_id),
            Self::IdentificationFinishId => optional_string(&record.identification_finish_id),
            Self::PenaltyMinutes => Value::from(record.penalty_minutes),
            Self::DeletedAt => record
                .deletion
                .deleted_at()
                .map(|at| Value::String(format_utc(at)))
                .unwrap_or(Value::Null),
        }
    }

    fn write(self, record: &mut ShiftRecord, value: &Value) -> ScheduleResult<()> {
        match self {
            Self::TimelineId => record.timeline_id = required_string(self, value)?,
            Self::WorkStartUtc => record.work_start_utc = required_time(self, value)?,
            Self::WorkEndUtc => record.work_end_utc = required_time(self, value)?,
            Self::ShiftTypeId => record.shift_type_id = required_string(self, value)?,
            Self::WorkCategoryId => record.work_category_id = nullable_string(self, value)?,
            Self::PlanId => record.plan_id = nullable_string(self, value)?,
            Self::IdentificationStartId => {
                record.identification_start_id = nullable_string(self, value)?
            }
            Self::IdentificationFinishId => {
                record.identification_finish_id = nullable_string(self, value)?
            }
            Self::PenaltyMinutes => {
                record.penalty_minutes = match value {
                    Value::Null => 0,
                    other => other.as_i64().ok_or_else(|| bad_value(self, value))?,
                }
            }
            Self::DeletedAt => {
                record.deletion = match value {
                    Value::Null => DeletionState::Active,
                    other => DeletionState::Deleted {
                        at: required_time(self, other)?,
                    },
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldChange {
    pub old: Value,
    pub new: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(transparent)]
pub struct ShiftDiff(BTreeMap<ShiftField, FieldChange>);

impl ShiftDiff {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, field: ShiftField) -> Option<&FieldChange> {
        self.0.get(&field)
    }

    pub fn changed(&self, field: ShiftField) -> bool {
        self.0.contains_key(&field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ShiftField, &FieldChange)> {
        self.0.iter()
    }

    pub fn undo(&self, record: &ShiftRecord) -> ScheduleResult<ShiftRecord> {
        let mut previous = record.clone();
        for (field, change) in &self.0 {
            field.write(&mut previous, &change.old)?;
        }
        Ok(previous)
    }
}

pub fn diff_shift(previous: Option<&ShiftRecord>, next: &ShiftRecord) -> ShiftDiff {
    let mut changes = BTreeMap::new();
    for field in ShiftField::ALL {
        let old = previous.map(|record| field.read(record)).unwrap_or(Value::Null);
        let new = field.read(next);
        if old != new {
            changes.insert(field, FieldChange { old, new });
        }
    }
    ShiftDiff(changes)
}

/// Typed partial update of a shift. `None` leaves the field untouched; nullable fields
/// take `Some(None)` to clear them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShiftPatch {
    pub timeline_id: Option<String>,
    pub work_start_utc: Option<DateTime<Utc>>,
    pub work_end_utc: Option<DateTime<Utc>>,
    pub shift_type_id: Option<String>,
    pub work_category_id: Option<Option<String>>,
    pub plan_id: Option<Option<String>>,
    pub identification_start_id: Option<Option<String>>,
    pub identification_finish_id: Option<Option<String>>,
    pub penalty_minutes: Option<i64>,
    pub deletion: Option<DeletionState>,
}

impl ShiftPatch {
    pub fn period(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            work_start_utc: Some(start),
            work_end_utc: Some(end),
            ..Self::default()
        }
    }

    pub fn delete(at: DateTime<Utc>) -> Self {
        Self {
            deletion: Some(DeletionState::Deleted { at }),
            ..Self::default()
        }
    }

    pub fn restore() -> Self {
        Self {
            deletion: Some(DeletionState::Active),
            ..Self::default()
        }
    }

    pub fn with_timeline(mut self, timeline_id: impl Into<String>) -> Self {
        self.timeline_id = Some(timeline_id.into());
        self
    }

    pub fn with_work_category(mut self, work_category_id: Option<String>) -> Self {
        self.work_category_id = Some(work_category_id);
        self
    }

    pub fn with_shift_type(mut self, shift_type_id: impl Into<String>) -> Self {
        self.shift_type_id = Some(shift_type_id.into());
        self
    }

    pub fn apply(&self, base: &ShiftRecord) -> ShiftRecord {
        ShiftRecord {
            id: base.id.clone(),
            kind: base.kind,
            timeline_id: self
                .timeline_id
                .clone()
                .unwrap_or_else(|| base.timeline_id.clone()),
            work_start_utc: self.work_start_utc.unwrap_or(base.work_start_utc),
            work_end_utc: self.work_end_utc.unwrap_or(base.work_end_utc),
            shift_type_id: self
                .shift_type_id
                .clone()
                .unwrap_or_else(|| base.shift_type_id.clone()),
            work_category_id: self
                .work_category_id
                .clone()
                .unwrap_or_else(|| base.work_category_id.clone()),
            plan_id: self.plan_id.clone().unwrap_or_else(|| base.plan_id.clone()),
            identification_start_id: self
                .identification_start_id
                .clone()
                .unwrap_or_else(|| base.identification_start_id.clone()),
            identification_finish_id: self
                .identification_finish_id
                .clone()
                .unwrap_or_else(|| base.identification_finish_id.clone()),
            penalty_minutes: self.penalty_minutes.unwrap_or(base.penalty_minutes),
            deletion: self.deletion.unwrap_or(base.deletion),
        }
    }
}

fn optional_string(value: &Option<String>) -> Value {
    value.clone().map(Value::String).unwrap_or(Value::Null)
}

fn bad_value(field: ShiftField, value: &Value) -> ScheduleError {
    ScheduleError::Consistency(format!("history value {value} is invalid for {field:?}"))
}

fn required_string(field: ShiftField, value: &Value) -> ScheduleResult<String> {
    value
        .as_str()
        .map(ToOwned::to_owned)
        .ok_or_else(|| bad_value(field, value))
}

fn nullable_string(field: ShiftField, value: &Value) -> ScheduleResult<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(text) => Ok(Some(text.clone())),
        _ => Err(bad_value(field, value)),
    }
}

fn required_time(field: ShiftField, value: &Value) -> ScheduleResult<DateTime<Utc>> {
    let raw = value.as_str().ok_or_else(|| bad_value(field, value))?;
    parse_utc(raw, "history value")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::RecordKind;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn sample_plan() -> ShiftRecord {
        ShiftRecord {
            id: "pln-1".to_string(),
            kind: RecordKind::Plan,
            timeline_id: "tml-1".to_string(),
            work_start_utc: fixed_time("2024-05-01T06:00:00Z"),
            work_end_utc: fixed_time("2024-05-01T14:00:00Z"),
            shift_type_id: "st-day".to_string(),
            work_category_id: None,
            plan_id: None,
            identification_start_id: None,
            identification_finish_id: None,
            penalty_minutes: 0,
            deletion: DeletionState::Active,
        }
    }

    #[test]
    fn insert_diff_lists_every_populated_field() {
        let diff = diff_shift(None, &sample_plan());
        assert!(diff.changed(ShiftField::TimelineId));
        assert!(diff.changed(ShiftField::WorkStartUtc));
        assert!(diff.changed(ShiftField::PenaltyMinutes));
        assert!(!diff.changed(ShiftField::WorkCategoryId));
        assert!(!diff.changed(ShiftField::DeletedAt));
    }

    #[test]
    fn unchanged_record_produces_empty_diff() {
        let plan = sample_plan();
        assert!(diff_shift(Some(&plan), &plan.clone()).is_empty());
    }

    #[test]
    fn patch_applies_only_named_fields() {
        let plan = sample_plan();
        let patched = ShiftPatch::period(
            fixed_time("2024-05-01T07:00:00Z"),
            fixed_time("2024-05-01T15:00:00Z"),
        )
        .with_work_category(Some("wc-1".to_string()))
        .apply(&plan);

        assert_eq!(patched.id, plan.id);
        assert_eq!(patched.shift_type_id, plan.shift_type_id);
        assert_eq!(patched.work_category_id.as_deref(), Some("wc-1"));

        let diff = diff_shift(Some(&plan), &patched);
        assert_eq!(diff.len(), 3);
        assert_eq!(
            diff.get(ShiftField::WorkStartUtc).map(|change| change.new.clone()),
            Some(Value::String("2024-05-01T07:00:00.000000Z".to_string()))
        );
    }

    #[test]
    fn undo_restores_previous_state() {
        let plan = sample_plan();
        let deleted = ShiftPatch::delete(fixed_time("2024-05-02T00:00:00Z"))
            .with_timeline("tml-2")
            .apply(&plan);
        let diff = diff_shift(Some(&plan), &deleted);
        assert_eq!(diff.undo(&deleted).expect("undo"), plan);
    }

    #[test]
    fn diff_serializes_with_camel_case_keys() {
        let plan = sample_plan();
        let restored = ShiftPatch::restore().apply(&ShiftPatch::delete(fixed_time("2024-05-02T00:00:00Z")).apply(&plan));
        assert_eq!(restored, plan);

        let diff = diff_shift(Some(&plan), &ShiftPatch::default().with_shift_type("st-night").apply(&plan));
        let json = serde_json::to_value(&diff).expect("serialize diff");
        assert_eq!(json["shiftTypeId"]["old"], Value::String("st-day".to_string()));
        let roundtrip: ShiftDiff = serde_json::from_value(json).expect("deserialize diff");
        assert_eq!(roundtrip, diff);
    }

    #[test]
    fn undo_rejects_corrupt_history_values() {
        let plan = sample_plan();
        let mut changes = BTreeMap::new();
        changes.insert(
            ShiftField::WorkStartUtc,
            FieldChange {
                old: Value::from(42),
                new: Value::Null,
            },
        );
        let result = ShiftDiff(changes).undo(&plan);
        assert!(matches!(result, Err(ScheduleError::Consistency(_))));
    }
}
