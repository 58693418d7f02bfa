use crate::domain::models::{ApprovalStatus, Timeline};
use crate::error::{ScheduleError, ScheduleResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StatusChangeConsent {
    Downgrade,
    #[default]
    Warn,
}

impl FromStr for StatusChangeConsent {
    type Err = ScheduleError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "downgrade" => Ok(Self::Downgrade),
            "warn" => Ok(Self::Warn),
            other => Err(ScheduleError::Validation(format!(
                "unknown status change consent: {other}"
            ))),
        }
    }
}

pub fn auto_downgrade(
    timeline_id: &str,
    current: ApprovalStatus,
    actor_elevated: bool,
    consent: StatusChangeConsent,
) -> ScheduleResult<Option<ApprovalStatus>> {
    if current == ApprovalStatus::Draft || actor_elevated {
        return Ok(None);
    }
    match consent {
        StatusChangeConsent::Downgrade => Ok(Some(ApprovalStatus::Draft)),
        StatusChangeConsent::Warn => Err(ScheduleError::ApprovalStatusChanging {
            timeline_id: timeline_id.to_string(),
            status: current.to_string(),
        }),
    }
}

pub fn transition(
    current: ApprovalStatus,
    target: ApprovalStatus,
    actor_elevated: bool,
) -> ScheduleResult<ApprovalStatus> {
    use ApprovalStatus::*;

    let allowed = match (current, target) {
        (Draft, Waiting) | (Waiting, Draft) | (Rejected, Draft) | (Rejected, Waiting) => true,
        (Waiting, Confirmed) | (Waiting, Rejected) | (Confirmed, Draft) | (Confirmed, Waiting) => {
            if !actor_elevated {
                return Err(ScheduleError::Validation(format!(
                    "moving approval status from {current} to {target} requires approval permission"
                )));
            }
            true
        }
        _ => false,
    };
    if !allowed {
        return Err(ScheduleError::Validation(format!(
            "approval status cannot move from {current} to {target}"
        )));
    }
    Ok(target)
}

pub fn apply_status(timeline: &mut Timeline, status: ApprovalStatus, now: DateTime<Utc>) {
    timeline.approval_status = status;
    timeline.approval_status_last_changed_utc = Some(now);
    match status {
        ApprovalStatus::Confirmed => timeline.confirmed_at_utc = Some(now),
        ApprovalStatus::Rejected => timeline.rejected_at_utc = Some(now),
        ApprovalStatus::Draft | ApprovalStatus::Waiting => {}
    }
}
