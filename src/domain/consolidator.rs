use crate::domain::interval::{
    day_window, month_days, to_wall, wall_minutes, Period, TimezoneMarker, YearMonth,
};
use crate::domain::models::{
    ShiftRecord, ShiftType, StakeholderOptions, TimelineAggregates, WorkCategory,
};
use crate::error::ScheduleResult;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ShiftBoundary {
    pub shift_id: String,
    pub wall: NaiveDateTime,
    pub utc: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub id: String,
    pub name: String,
    pub archived: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ShiftView {
    pub shift_from: Option<ShiftBoundary>,
    pub shift_to: Option<ShiftBoundary>,
    pub shift_count: i64,
    pub shift_type_list: Vec<CatalogEntry>,
    pub work_category_list: Vec<CatalogEntry>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ComparingView {
    pub plan_minutes: i64,
    pub fact_minutes: i64,
    pub penalty_minutes: i64,
    pub billing_minutes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DateCell {
    pub date: NaiveDate,
    pub plan_view: ShiftView,
    pub fact_view: ShiftView,
    pub comparing_view: ComparingView,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ShiftDetails {
    pub date_cell_list: Vec<DateCell>,
}

impl ShiftDetails {
    pub fn empty_month(month: YearMonth, tz: &TimezoneMarker) -> ScheduleResult<Self> {
        consolidate_month(
            month,
            tz,
            &[],
            &[],
            &CatalogSnapshot::default(),
            &StakeholderOptions::default(),
        )
    }

    pub fn cell(&self, date: NaiveDate) -> Option<&DateCell> {
        self.date_cell_list.iter().find(|cell| cell.date == date)
    }
}

impl TimelineAggregates {
    pub fn from_details(details: &ShiftDetails) -> Self {
        details
            .date_cell_list
            .iter()
            .fold(Self::default(), |mut totals, cell| {
                totals.plan_count += cell.plan_view.shift_count;
                totals.fact_count += cell.fact_view.shift_count;
                totals.plan_sum_minutes += cell.comparing_view.plan_minutes;
                totals.fact_sum_minutes += cell.comparing_view.fact_minutes;
                totals.penalty_sum_minutes += cell.comparing_view.penalty_minutes;
                totals.billing_sum_minutes += cell.comparing_view.billing_minutes;
                totals
            })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogSnapshot {
    pub work_categories: HashMap<String, WorkCategory>,
    pub shift_types: HashMap<String, ShiftType>,
}

impl CatalogSnapshot {
    pub fn overlap_acceptable(&self, work_category_id: Option<&str>) -> bool {
        work_category_id
            .and_then(|id| self.work_categories.get(id))
            .map(|category| category.overlap_acceptable)
            .unwrap_or(false)
    }
}

pub fn consolidate_month(
    month: YearMonth,
    tz: &TimezoneMarker,
    plans: &[ShiftRecord],
    facts: &[ShiftRecord],
    catalog: &CatalogSnapshot,
    options: &StakeholderOptions,
) -> ScheduleResult<ShiftDetails> {
    let date_cell_list = month_days(month)
        .into_iter()
        .map(|day| consolidate_day(day, tz, plans, facts, catalog, options))
        .collect::<ScheduleResult<Vec<_>>>()?;
    Ok(ShiftDetails { date_cell_list })
}

/// Builds the calendar cell of one wall-clock day. A shift belongs to the day that contains
/// its start instant, so shifts crossing midnight are counted once.
pub fn consolidate_day(
    day: NaiveDate,
    tz: &TimezoneMarker,
    plans: &[ShiftRecord],
    facts: &[ShiftRecord],
    catalog: &CatalogSnapshot,
    options: &StakeholderOptions,
) -> ScheduleResult<DateCell> {
    let window = day_window(day, tz)?;
    let day_plans = select_for_day(plans, &window);
    let day_facts = select_for_day(facts, &window);

    let plans_by_id = plans
        .iter()
        .filter(|plan| plan.is_live())
        .map(|plan| (plan.id.as_str(), plan))
        .collect::<HashMap<_, _>>();

    let comparing_view = ComparingView {
        plan_minutes: day_plans
            .iter()
            .map(|plan| wall_minutes(plan.work_start_utc, plan.work_end_utc, tz))
            .sum(),
        fact_minutes: day_facts
            .iter()
            .map(|fact| wall_minutes(fact.work_start_utc, fact.work_end_utc, tz))
            .sum(),
        penalty_minutes: day_facts.iter().map(|fact| fact.penalty_minutes).sum(),
        billing_minutes: day_facts
            .iter()
            .map(|fact| {
                let plan = fact
                    .plan_id
                    .as_deref()
                    .and_then(|plan_id| plans_by_id.get(plan_id).copied());
                billing_minutes(fact, plan, tz, options)
            })
            .sum(),
    };

    Ok(DateCell {
        date: day,
        plan_view: build_view(&day_plans, tz, &window, catalog),
        fact_view: build_view(&day_facts, tz, &window, catalog),
        comparing_view,
    })
}

fn select_for_day<'a>(records: &'a [ShiftRecord], window: &Period) -> Vec<&'a ShiftRecord> {
    records
        .iter()
        .filter(|record| record.is_live() && window.contains_instant(record.work_start_utc))
        .collect()
}

fn build_view(
    records: &[&ShiftRecord],
    tz: &TimezoneMarker,
    window: &Period,
    catalog: &CatalogSnapshot,
) -> ShiftView {
    let mut shift_from: Option<&ShiftRecord> = None;
    let mut shift_to: Option<&ShiftRecord> = None;
    for record in records {
        if shift_from.is_none_or(|current| record.work_start_utc < current.work_start_utc) {
            shift_from = Some(record);
        }
        if shift_to.is_none_or(|current| record.work_end_utc > current.work_end_utc) {
            shift_to = Some(record);
        }
    }

    let mut shift_type_list: Vec<CatalogEntry> = Vec::new();
    let mut work_category_list: Vec<CatalogEntry> = Vec::new();
    for record in records {
        if let Some(shift_type) = catalog.shift_types.get(&record.shift_type_id) {
            push_visible(
                &mut shift_type_list,
                &shift_type.id,
                &shift_type.name,
                shift_type.blocked_at,
                window,
            );
        }
        if let Some(category) = record
            .work_category_id
            .as_deref()
            .and_then(|id| catalog.work_categories.get(id))
        {
            push_visible(
                &mut work_category_list,
                &category.id,
                &category.name,
                category.blocked_at,
                window,
            );
        }
    }

    ShiftView {
        shift_from: shift_from.map(|record| ShiftBoundary {
            shift_id: record.id.clone(),
            wall: to_wall(record.work_start_utc, tz),
            utc: record.work_start_utc,
        }),
        shift_to: shift_to.map(|record| ShiftBoundary {
            shift_id: record.id.clone(),
            wall: to_wall(record.work_end_utc, tz),
            utc: record.work_end_utc,
        }),
        shift_count: records.len() as i64,
        shift_type_list,
        work_category_list,
    }
}

// Archived entries stay visible on days that began before they were archived.
fn push_visible(
    list: &mut Vec<CatalogEntry>,
    id: &str,
    name: &str,
    blocked_at: Option<DateTime<Utc>>,
    window: &Period,
) {
    if list.iter().any(|entry| entry.id == id) {
        return;
    }
    if blocked_at.is_some_and(|blocked_at| blocked_at <= window.start) {
        return;
    }
    list.push(CatalogEntry {
        id: id.to_string(),
        name: name.to_string(),
        archived: blocked_at.is_some(),
    });
}

/// Billable minutes of a fact measured against its plan. Early deviations within the
/// allowance are inclusive (`<=`), late deviations exclusive (`<`).
pub fn billing_minutes(
    fact: &ShiftRecord,
    plan: Option<&ShiftRecord>,
    tz: &TimezoneMarker,
    options: &StakeholderOptions,
) -> i64 {
    let Some(plan) = plan else {
        return wall_minutes(fact.work_start_utc, fact.work_end_utc, tz).max(0);
    };

    let start = if fact.work_start_utc < plan.work_start_utc {
        let delta = (plan.work_start_utc - fact.work_start_utc).num_minutes();
        if delta <= options.allowable_early_arrival_minutes {
            plan.work_start_utc
        } else {
            fact.work_start_utc
        }
    } else if fact.work_start_utc > plan.work_start_utc {
        let delta = (fact.work_start_utc - plan.work_start_utc).num_minutes();
        if delta < options.allowable_late_arrival_minutes {
            plan.work_start_utc
        } else {
            fact.work_start_utc
        }
    } else {
        plan.work_start_utc
    };

    let end = if fact.work_end_utc < plan.work_end_utc {
        let delta = (plan.work_end_utc - fact.work_end_utc).num_minutes();
        if delta <= options.allowable_early_departure_minutes {
            plan.work_end_utc
        } else {
            fact.work_end_utc
        }
    } else if fact.work_end_utc > plan.work_end_utc {
        let delta = (fact.work_end_utc - plan.work_end_utc).num_minutes();
        if delta < options.allowable_late_departure_minutes {
            plan.work_end_utc
        } else {
            fact.work_end_utc
        }
    } else {
        plan.work_end_utc
    };

    wall_minutes(start, end, tz).max(0)
}
