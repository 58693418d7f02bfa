use crate::domain::consolidator::{consolidate_month, CatalogSnapshot, DateCell};
use crate::domain::models::{HistoryScope, ShiftRecord, StakeholderOptions, Timeline};
use crate::error::ScheduleResult;
use crate::infrastructure::schedule_store::ScheduleStore;
use chrono::{DateTime, Utc};

pub fn reconstruct_before<S: ScheduleStore + ?Sized>(
    store: &S,
    timeline: &Timeline,
    cutoff: DateTime<Utc>,
    catalog: &CatalogSnapshot,
    options: &StakeholderOptions,
) -> ScheduleResult<Vec<DateCell>> {
    let mut shift_ids: Vec<String> = store
        .shifts_of_timeline(&timeline.id)?
        .into_iter()
        .map(|shift| shift.id)
        .collect();
    for entry in store.list_history(&timeline.id)? {
        if let Some(shift_id) = entry.shift_id {
            if !shift_ids.contains(&shift_id) {
                shift_ids.push(shift_id);
            }
        }
    }

    let mut plans = Vec::new();
    let mut facts = Vec::new();
    for shift_id in shift_ids {
        let Some(shift) = shift_state_before(store, &shift_id, cutoff)? else {
            continue;
        };
        if shift.timeline_id != timeline.id || !shift.is_live() {
            continue;
        }
        if shift.kind.is_plan() {
            plans.push(shift);
        } else {
            facts.push(shift);
        }
    }

    let tz = timeline.timezone()?;
    let details = consolidate_month(timeline.month, &tz, &plans, &facts, catalog, options)?;
    Ok(details.date_cell_list)
}

fn shift_state_before<S: ScheduleStore + ?Sized>(
    store: &S,
    shift_id: &str,
    cutoff: DateTime<Utc>,
) -> ScheduleResult<Option<ShiftRecord>> {
    let Some(mut shift) = store.shift(shift_id)? else {
        return Ok(None);
    };
    let history = store
        .history_of_shift(shift_id)?
        .into_iter()
        .filter(|entry| entry.scope == HistoryScope::Primary)
        .collect::<Vec<_>>();

    if history
        .first()
        .is_some_and(|created| created.is_new_record && created.created_at >= cutoff)
    {
        return Ok(None);
    }
    for entry in history.iter().rev().filter(|entry| entry.created_at >= cutoff) {
        shift = entry.diff.undo(&shift)?;
    }
    Ok(Some(shift))
}
