use crate::domain::models::{DeletionState, ShiftRecord};
use crate::domain::overlap::{OverlapPair, OverlapReport, PairSource};
use crate::error::{ConflictPair, ScheduleError, ScheduleResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    #[default]
    NotSpecified,
    CreateWithOverlapping,
    DeleteAndCreate,
    DeleteAndCreateSkipWithFact,
}

impl ConflictPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotSpecified => "not_specified",
            Self::CreateWithOverlapping => "create_with_overlapping",
            Self::DeleteAndCreate => "delete_and_create",
            Self::DeleteAndCreateSkipWithFact => "delete_and_create_skip_with_fact",
        }
    }
}

impl FromStr for ConflictPolicy {
    type Err = ScheduleError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "" | "not_specified" => Ok(Self::NotSpecified),
            "create_with_overlapping" => Ok(Self::CreateWithOverlapping),
            "delete_and_create" => Ok(Self::DeleteAndCreate),
            "delete_and_create_skip_with_fact" => Ok(Self::DeleteAndCreateSkipWithFact),
            other => Err(ScheduleError::Validation(format!(
                "unknown overlap policy: {other}"
            ))),
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct PolicyInput<'a> {
    pub desirable_plans: Vec<ShiftRecord>,
    pub plans: &'a OverlapReport,
    pub desirable_vacancy_plans: Vec<ShiftRecord>,
    pub vacancy_plans: &'a OverlapReport,
    pub shifts_with_fact: &'a HashSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    pub desirable_plans: Vec<ShiftRecord>,
    pub existing_plans_touched: Vec<ShiftRecord>,
    pub desirable_vacancy_plans: Vec<ShiftRecord>,
    pub existing_vacancy_plans_touched: Vec<ShiftRecord>,
}

impl Resolution {
    /// Touched rows first so deletions are saved before the shifts that replace them.
    pub fn into_rows(self) -> Vec<ShiftRecord> {
        self.existing_plans_touched
            .into_iter()
            .chain(self.existing_vacancy_plans_touched)
            .chain(self.desirable_plans)
            .chain(self.desirable_vacancy_plans)
            .collect()
    }
}

pub fn resolve(
    policy: ConflictPolicy,
    input: PolicyInput<'_>,
    now: DateTime<Utc>,
) -> ScheduleResult<Resolution> {
    let unacceptable = input
        .plans
        .unacceptable
        .iter()
        .chain(input.vacancy_plans.unacceptable.iter())
        .collect::<Vec<_>>();

    let (existing_plans_touched, existing_vacancy_plans_touched) = match policy {
        ConflictPolicy::NotSpecified => {
            if !unacceptable.is_empty() {
                return Err(ScheduleError::UnresolvedOverlap {
                    pairs: conflicts(&unacceptable),
                });
            }
            (Vec::new(), Vec::new())
        }
        ConflictPolicy::CreateWithOverlapping => {
            if !unacceptable.is_empty() {
                return Err(ScheduleError::OverlapNotAcceptable {
                    pairs: conflicts(&unacceptable),
                });
            }
            (Vec::new(), Vec::new())
        }
        ConflictPolicy::DeleteAndCreate | ConflictPolicy::DeleteAndCreateSkipWithFact => {
            let internal = unacceptable
                .iter()
                .copied()
                .filter(|pair| pair.source == PairSource::Batch)
                .collect::<Vec<_>>();
            if !internal.is_empty() {
                return Err(ScheduleError::OverlapNotAcceptable {
                    pairs: conflicts(&internal),
                });
            }

            let skip_with_fact = policy == ConflictPolicy::DeleteAndCreateSkipWithFact;
            let plans = deletion_targets(input.plans, input.shifts_with_fact, skip_with_fact)?;
            let vacancy_plans =
                deletion_targets(input.vacancy_plans, input.shifts_with_fact, skip_with_fact)?;
            (mark_deleted(plans, now), mark_deleted(vacancy_plans, now))
        }
    };

    Ok(Resolution {
        desirable_plans: input.desirable_plans,
        existing_plans_touched,
        desirable_vacancy_plans: input.desirable_vacancy_plans,
        existing_vacancy_plans_touched,
    })
}

fn conflicts(pairs: &[&OverlapPair]) -> Vec<ConflictPair> {
    pairs.iter().map(|pair| pair.conflict()).collect()
}

fn deletion_targets(
    report: &OverlapReport,
    shifts_with_fact: &HashSet<String>,
    skip_with_fact: bool,
) -> ScheduleResult<Vec<ShiftRecord>> {
    let mut seen = HashSet::new();
    let mut targets = Vec::new();
    let mut with_fact = Vec::new();

    for pair in &report.unacceptable {
        if pair.source != PairSource::Existing || !seen.insert(pair.other.id.clone()) {
            continue;
        }
        if shifts_with_fact.contains(&pair.other.id) {
            with_fact.push(pair.other.id.clone());
            continue;
        }
        targets.push(pair.other.clone());
    }

    if !with_fact.is_empty() && !skip_with_fact {
        return Err(ScheduleError::HasFactRecord {
            shift_ids: with_fact,
        });
    }
    Ok(targets)
}

fn mark_deleted(rows: Vec<ShiftRecord>, now: DateTime<Utc>) -> Vec<ShiftRecord> {
    rows.into_iter()
        .map(|row| ShiftRecord {
            deletion: DeletionState::Deleted { at: now },
            ..row
        })
        .collect()
}
