use crate::domain::interval::{intersects, Period};
use crate::domain::models::ShiftRecord;
use crate::error::ScheduleResult;
use crate::infrastructure::schedule_store::ScheduleStore;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShiftWindow {
    pub plans: Vec<ShiftRecord>,
    pub facts: Vec<ShiftRecord>,
}

pub fn find_shifts_in_window<S: ScheduleStore + ?Sized>(
    store: &S,
    timeline_id: &str,
    start_utc: DateTime<Utc>,
    end_utc: DateTime<Utc>,
    extra_plans: &[ShiftRecord],
    extra_facts: &[ShiftRecord],
) -> ScheduleResult<ShiftWindow> {
    let mut rows = store.shifts_of_timeline(timeline_id)?;
    for extra in extra_plans.iter().chain(extra_facts) {
        match rows.iter_mut().find(|row| row.id == extra.id) {
            Some(row) => *row = extra.clone(),
            None => rows.push(extra.clone()),
        }
    }

    let window = Period::new(start_utc, end_utc);
    let (plans, facts) = rows
        .into_iter()
        .filter(|row| {
            row.is_live() && row.timeline_id == timeline_id && intersects(&row.period(), &window)
        })
        .partition(|row| row.kind.is_plan());

    Ok(ShiftWindow { plans, facts })
}
