use crate::application::next_id;
use crate::application::shift_lookup::find_shifts_in_window;
use crate::domain::approval::{apply_status, auto_downgrade, StatusChangeConsent};
use crate::domain::consolidator::{consolidate_month, CatalogSnapshot};
use crate::domain::diff::{diff_shift, ShiftDiff};
use crate::domain::interval::month_window;
use crate::domain::models::{
    ChangeHistoryEntry, HistoryScope, ShiftRecord, StakeholderOptions, Timeline,
    TimelineAggregates,
};
use crate::error::{ScheduleError, ScheduleResult};
use crate::infrastructure::permissions::PermissionResolver;
use crate::infrastructure::schedule_store::ScheduleStore;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct SaveContext {
    pub actor_id: String,
    pub method: String,
    pub consent: StatusChangeConsent,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SavedShift {
    pub record: ShiftRecord,
    pub diff: ShiftDiff,
    pub is_new_record: bool,
}

struct PendingSave {
    desirable: ShiftRecord,
    existing: Option<ShiftRecord>,
    diff: ShiftDiff,
}

impl PendingSave {
    fn is_material(&self) -> bool {
        self.existing.is_none() || !self.diff.is_empty()
    }

    fn previous_timeline_id(&self) -> Option<&str> {
        self.existing
            .as_ref()
            .map(|existing| existing.timeline_id.as_str())
            .filter(|timeline_id| *timeline_id != self.desirable.timeline_id)
    }
}

pub struct ChangeModelSaver<'a, S: ScheduleStore + ?Sized, P: PermissionResolver + ?Sized> {
    store: &'a S,
    permissions: &'a P,
    catalog: &'a CatalogSnapshot,
    options: &'a StakeholderOptions,
}

impl<'a, S: ScheduleStore + ?Sized, P: PermissionResolver + ?Sized> ChangeModelSaver<'a, S, P> {
    pub fn new(
        store: &'a S,
        permissions: &'a P,
        catalog: &'a CatalogSnapshot,
        options: &'a StakeholderOptions,
    ) -> Self {
        Self {
            store,
            permissions,
            catalog,
            options,
        }
    }

    pub fn save(&self, desirable: ShiftRecord, context: &SaveContext) -> ScheduleResult<SavedShift> {
        self.save_batch(vec![desirable], context)?
            .pop()
            .ok_or_else(|| ScheduleError::Consistency("save produced no result".to_string()))
    }

    pub fn save_batch(
        &self,
        items: Vec<ShiftRecord>,
        context: &SaveContext,
    ) -> ScheduleResult<Vec<SavedShift>> {
        let pending = self.prepare(items)?;

        let mut affected: Vec<String> = Vec::new();
        for item in pending.iter().filter(|item| item.is_material()) {
            for timeline_id in [Some(item.desirable.timeline_id.as_str()), item.previous_timeline_id()]
                .into_iter()
                .flatten()
            {
                if !affected.iter().any(|known| known == timeline_id) {
                    affected.push(timeline_id.to_string());
                }
            }
        }

        let mut timelines = Vec::with_capacity(affected.len());
        for timeline_id in &affected {
            let timeline = self
                .store
                .timeline(timeline_id)?
                .ok_or_else(|| ScheduleError::not_found("timeline", timeline_id.clone()))?;
            timelines.push(timeline);
        }

        for timeline in &mut timelines {
            self.approval_gate(timeline, context)?;
        }

        let batch = pending
            .iter()
            .filter(|item| item.is_material())
            .map(|item| item.desirable.clone())
            .collect::<Vec<_>>();
        let (batch_plans, batch_facts): (Vec<_>, Vec<_>) =
            batch.into_iter().partition(|row| row.kind.is_plan());

        for timeline in &mut timelines {
            self.recompute(timeline, &batch_plans, &batch_facts)?;
            self.store.upsert_timeline(timeline)?;
        }

        let mut saved = Vec::with_capacity(pending.len());
        for item in pending {
            if item.is_material() {
                self.store.upsert_shift(&item.desirable)?;
            }
            self.append_history(&item, context)?;
            saved.push(SavedShift {
                is_new_record: item.existing.is_none(),
                record: item.desirable,
                diff: item.diff,
            });
        }

        debug!(
            method = %context.method,
            shifts = saved.len(),
            timelines = timelines.len(),
            "saved shift batch"
        );
        Ok(saved)
    }

    fn prepare(&self, items: Vec<ShiftRecord>) -> ScheduleResult<Vec<PendingSave>> {
        let mut seen = HashSet::new();
        let mut pending = Vec::with_capacity(items.len());
        for desirable in items {
            desirable.validate().map_err(ScheduleError::Validation)?;
            if !seen.insert(desirable.id.clone()) {
                return Err(ScheduleError::Validation(format!(
                    "shift {} appears twice in one save",
                    desirable.id
                )));
            }
            let existing = self.store.shift(&desirable.id)?;
            if let Some(existing) = &existing {
                if existing.kind != desirable.kind {
                    return Err(ScheduleError::Validation(format!(
                        "shift {} cannot change kind from {} to {}",
                        desirable.id,
                        existing.kind.as_str(),
                        desirable.kind.as_str()
                    )));
                }
            }
            let diff = diff_shift(existing.as_ref(), &desirable);
            pending.push(PendingSave {
                desirable,
                existing,
                diff,
            });
        }
        Ok(pending)
    }

    fn approval_gate(&self, timeline: &mut Timeline, context: &SaveContext) -> ScheduleResult<()> {
        let elevated = self.permissions.has_approval_permission(
            &context.actor_id,
            &timeline.owner,
            &timeline.trading_point_id,
        )?;
        if let Some(status) =
            auto_downgrade(&timeline.id, timeline.approval_status, elevated, context.consent)?
        {
            info!(
                timeline_id = %timeline.id,
                from = %timeline.approval_status,
                to = %status,
                actor_id = %context.actor_id,
                "approval status reset by shift change"
            );
            apply_status(timeline, status, context.now);
        }
        Ok(())
    }

    fn recompute(
        &self,
        timeline: &mut Timeline,
        batch_plans: &[ShiftRecord],
        batch_facts: &[ShiftRecord],
    ) -> ScheduleResult<()> {
        let tz = timeline.timezone()?;
        let window = month_window(timeline.month, &tz)?;
        let shifts = find_shifts_in_window(
            self.store,
            &timeline.id,
            window.start,
            window.end,
            batch_plans,
            batch_facts,
        )?;
        let details = consolidate_month(
            timeline.month,
            &tz,
            &shifts.plans,
            &shifts.facts,
            self.catalog,
            self.options,
        )?;
        timeline.aggregates = TimelineAggregates::from_details(&details);
        timeline.shift_details = details;
        Ok(())
    }

    fn append_history(&self, item: &PendingSave, context: &SaveContext) -> ScheduleResult<()> {
        let entry = ChangeHistoryEntry {
            id: next_id("chg"),
            timeline_id: item.desirable.timeline_id.clone(),
            shift_id: Some(item.desirable.id.clone()),
            method: context.method.clone(),
            is_new_record: item.existing.is_none(),
            scope: HistoryScope::Primary,
            diff: item.diff.clone(),
            actor_id: context.actor_id.clone(),
            created_at: context.now,
        };
        self.store.append_history(&entry)?;

        if let Some(previous) = item.previous_timeline_id() {
            self.store.append_history(&ChangeHistoryEntry {
                id: next_id("chg"),
                timeline_id: previous.to_string(),
                scope: HistoryScope::PreviousOwner,
                ..entry
            })?;
        }
        Ok(())
    }
}
