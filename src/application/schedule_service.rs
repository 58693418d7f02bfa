use crate::application::bootstrap::bootstrap_workspace;
use crate::application::next_id;
use crate::application::past_state;
use crate::application::save_pipeline::{ChangeModelSaver, SaveContext, SavedShift};
use crate::domain::approval::{apply_status, transition, StatusChangeConsent};
use crate::domain::conflict_policy::{resolve, ConflictPolicy, PolicyInput};
use crate::domain::consolidator::{CatalogSnapshot, DateCell, ShiftDetails};
use crate::domain::diff::{ShiftDiff, ShiftPatch};
use crate::domain::interval::{parse_utc, wall_date, TimezoneMarker, YearMonth};
use crate::domain::models::{
    ApprovalStatus, ChangeHistoryEntry, DeletionState, HistoryScope, RecordKind, ShiftOwner,
    ShiftRecord, Timeline, TimelineAggregates,
};
use crate::domain::overlap::{detect_overlaps, OverlapCandidate, OverlapReport};
use crate::error::{ConflictPair, ScheduleError, ScheduleResult};
use crate::infrastructure::catalog::CatalogRepository;
use crate::infrastructure::config::EngineConfig;
use crate::infrastructure::permissions::PermissionResolver;
use crate::infrastructure::schedule_store::{ScheduleStore, SqliteScheduleStore};
use crate::infrastructure::storage::open_connection;
use chrono::{DateTime, Duration, Utc};
use rusqlite::TransactionBehavior;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlanDraft {
    #[serde(default)]
    pub shift_id: Option<String>,
    pub owner: ShiftOwner,
    pub trading_point_id: String,
    pub work_start: String,
    pub work_end: String,
    pub shift_type_id: String,
    #[serde(default)]
    pub work_category_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SchedulePlansRequest {
    #[serde(default)]
    pub plans: Vec<PlanDraft>,
    #[serde(default)]
    pub vacancy_plans: Vec<PlanDraft>,
    #[serde(default)]
    pub policy: ConflictPolicy,
    #[serde(default)]
    pub consent: Option<StatusChangeConsent>,
    pub actor_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleOutcome {
    pub saved: Vec<ShiftRecord>,
    pub deleted: Vec<String>,
    pub acceptable_overlaps: Vec<ConflictPair>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FactDraft {
    #[serde(default)]
    pub fact_id: Option<String>,
    pub employee_id: String,
    pub trading_point_id: String,
    pub work_start: String,
    pub work_end: String,
    pub shift_type_id: String,
    #[serde(default)]
    pub work_category_id: Option<String>,
    #[serde(default)]
    pub plan_id: Option<String>,
    #[serde(default)]
    pub identification_start_id: Option<String>,
    #[serde(default)]
    pub identification_finish_id: Option<String>,
    #[serde(default)]
    pub penalty_minutes: i64,
}

struct Location {
    trading_point_id: String,
    tz: TimezoneMarker,
}

pub struct ScheduleService<C: CatalogRepository, P: PermissionResolver> {
    database_path: PathBuf,
    config: EngineConfig,
    catalog: Arc<C>,
    permissions: Arc<P>,
    now_provider: NowProvider,
}

impl<C: CatalogRepository, P: PermissionResolver> ScheduleService<C, P> {
    pub fn new(
        database_path: impl Into<PathBuf>,
        config: EngineConfig,
        catalog: Arc<C>,
        permissions: Arc<P>,
    ) -> Self {
        Self {
            database_path: database_path.into(),
            config,
            catalog,
            permissions,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn open(workspace_root: &Path, catalog: Arc<C>, permissions: Arc<P>) -> ScheduleResult<Self> {
        let bootstrap = bootstrap_workspace(workspace_root)?;
        Ok(Self::new(
            bootstrap.database_path,
            bootstrap.config,
            catalog,
            permissions,
        ))
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn schedule_plans(&self, request: SchedulePlansRequest) -> ScheduleResult<ScheduleOutcome> {
        validate_actor(&request.actor_id)?;
        let now = (self.now_provider)();
        let context = self.context("schedule_plans", &request.actor_id, request.consent, now);

        self.in_transaction("schedule_plans", TransactionBehavior::Immediate, |store| {
            let catalog = self.catalog.snapshot()?;

            let mut employee_rows = Vec::with_capacity(request.plans.len());
            for draft in &request.plans {
                employee_rows.push(self.build_plan(store, draft, false)?);
            }
            let mut vacancy_rows = Vec::with_capacity(request.vacancy_plans.len());
            for draft in &request.vacancy_plans {
                vacancy_rows.push(self.build_plan(store, draft, true)?);
            }

            let plans_report = self.detect_for_batch(store, &catalog, &employee_rows)?;
            let vacancy_report = self.detect_for_batch(store, &catalog, &vacancy_rows)?;

            let conflicting_existing = plans_report
                .unacceptable
                .iter()
                .chain(vacancy_report.unacceptable.iter())
                .map(|pair| pair.other.id.clone())
                .collect::<HashSet<_>>()
                .into_iter()
                .collect::<Vec<_>>();
            let shifts_with_fact = store.plans_with_live_fact(&conflicting_existing)?;

            let acceptable_overlaps = plans_report
                .acceptable
                .iter()
                .chain(vacancy_report.acceptable.iter())
                .map(|pair| pair.conflict())
                .collect::<Vec<_>>();

            let resolution = resolve(
                request.policy,
                PolicyInput {
                    desirable_plans: employee_rows.into_iter().map(|(_, row)| row).collect(),
                    plans: &plans_report,
                    desirable_vacancy_plans: vacancy_rows.into_iter().map(|(_, row)| row).collect(),
                    vacancy_plans: &vacancy_report,
                    shifts_with_fact: &shifts_with_fact,
                },
                now,
            )?;
            let deleted = resolution
                .existing_plans_touched
                .iter()
                .chain(resolution.existing_vacancy_plans_touched.iter())
                .map(|row| row.id.clone())
                .collect::<Vec<_>>();

            let saver = ChangeModelSaver::new(
                store,
                self.permissions.as_ref(),
                &catalog,
                &self.config.stakeholder,
            );
            let saved = saver
                .save_batch(resolution.into_rows(), &context)?
                .into_iter()
                .map(|saved| saved.record)
                .filter(|record| !deleted.contains(&record.id))
                .collect::<Vec<_>>();

            info!(
                actor_id = %request.actor_id,
                policy = %request.policy,
                saved = saved.len(),
                deleted = deleted.len(),
                acceptable_overlaps = acceptable_overlaps.len(),
                "plans scheduled"
            );
            Ok(ScheduleOutcome {
                saved,
                deleted,
                acceptable_overlaps,
            })
        })
    }

    pub fn delete_shift(
        &self,
        shift_id: &str,
        actor_id: &str,
        consent: Option<StatusChangeConsent>,
    ) -> ScheduleResult<ShiftRecord> {
        validate_actor(actor_id)?;
        let now = (self.now_provider)();
        let context = self.context("delete_shift", actor_id, consent, now);

        self.in_transaction("delete_shift", TransactionBehavior::Immediate, |store| {
            let existing = load_shift(store, shift_id)?;
            let desirable = if existing.is_live() {
                ShiftPatch::delete(now).apply(&existing)
            } else {
                existing
            };
            let saved = self.save_one(store, desirable, &context)?;
            info!(shift_id, actor_id, "shift deleted");
            Ok(saved.record)
        })
    }

    pub fn restore_shift(
        &self,
        shift_id: &str,
        actor_id: &str,
        consent: Option<StatusChangeConsent>,
    ) -> ScheduleResult<ShiftRecord> {
        validate_actor(actor_id)?;
        let now = (self.now_provider)();
        let context = self.context("restore_shift", actor_id, consent, now);

        self.in_transaction("restore_shift", TransactionBehavior::Immediate, |store| {
            let existing = load_shift(store, shift_id)?;
            let desirable = ShiftPatch::restore().apply(&existing);
            if existing.deletion.is_deleted() && desirable.kind.is_plan() {
                let timeline = load_timeline(store, &desirable.timeline_id)?;
                let catalog = self.catalog.snapshot()?;
                let report = self.detect_for_batch(
                    store,
                    &catalog,
                    &[(timeline.owner, desirable.clone())],
                )?;
                if !report.is_clear() {
                    return Err(ScheduleError::UnresolvedOverlap {
                        pairs: report.unacceptable_conflicts(),
                    });
                }
            }
            let saved = self.save_one(store, desirable, &context)?;
            info!(shift_id, actor_id, "shift restored");
            Ok(saved.record)
        })
    }

    pub fn record_fact(
        &self,
        draft: FactDraft,
        actor_id: &str,
        consent: Option<StatusChangeConsent>,
    ) -> ScheduleResult<ShiftRecord> {
        validate_actor(actor_id)?;
        let now = (self.now_provider)();
        let context = self.context("record_fact", actor_id, consent, now);

        self.in_transaction("record_fact", TransactionBehavior::Immediate, |store| {
            if draft.employee_id.trim().is_empty() {
                return Err(ScheduleError::Validation(
                    "fact.employee_id must not be empty".to_string(),
                ));
            }
            let start = parse_utc(&draft.work_start, "fact.work_start")?;
            let end = parse_utc(&draft.work_end, "fact.work_end")?;
            let owner = ShiftOwner::Employee(draft.employee_id.clone());
            let location = self.location(&draft.trading_point_id)?;
            self.check_catalog_refs(&draft.shift_type_id, draft.work_category_id.as_deref())?;

            if let Some(plan_id) = &draft.plan_id {
                let plan = load_shift(store, plan_id)?;
                if plan.kind != RecordKind::Plan || !plan.is_live() {
                    return Err(ScheduleError::Validation(format!(
                        "fact can only be linked to a live employee plan, {plan_id} is not one"
                    )));
                }
                let plan_timeline = load_timeline(store, &plan.timeline_id)?;
                if plan_timeline.owner != owner {
                    return Err(ScheduleError::Validation(format!(
                        "plan {plan_id} belongs to {}, not to {owner}",
                        plan_timeline.owner
                    )));
                }
            }

            let month = YearMonth::of(wall_date(start, &location.tz));
            let timeline = self.ensure_timeline(store, &location, &owner, month)?;
            let patch = ShiftPatch {
                plan_id: Some(draft.plan_id.clone()),
                identification_start_id: Some(draft.identification_start_id.clone()),
                identification_finish_id: Some(draft.identification_finish_id.clone()),
                penalty_minutes: Some(draft.penalty_minutes),
                ..ShiftPatch::period(start, end)
            }
            .with_timeline(timeline.id.clone())
            .with_shift_type(draft.shift_type_id.clone())
            .with_work_category(draft.work_category_id.clone());

            let base = match &draft.fact_id {
                Some(fact_id) => {
                    let existing = load_shift(store, fact_id)?;
                    if existing.kind != RecordKind::Fact {
                        return Err(ScheduleError::Validation(format!(
                            "shift {fact_id} is not a fact"
                        )));
                    }
                    existing
                }
                None => blank_shift(next_id("fct"), RecordKind::Fact, &timeline.id, start, end),
            };
            let saved = self.save_one(store, patch.apply(&base), &context)?;
            info!(
                shift_id = %saved.record.id,
                employee_id = %draft.employee_id,
                is_new_record = saved.is_new_record,
                "fact recorded"
            );
            Ok(saved.record)
        })
    }

    pub fn change_approval_status(
        &self,
        timeline_id: &str,
        target: ApprovalStatus,
        actor_id: &str,
    ) -> ScheduleResult<Timeline> {
        validate_actor(actor_id)?;
        let now = (self.now_provider)();

        self.in_transaction("change_approval_status", TransactionBehavior::Immediate, |store| {
            let mut timeline = load_timeline(store, timeline_id)?;
            let elevated = self.permissions.has_approval_permission(
                actor_id,
                &timeline.owner,
                &timeline.trading_point_id,
            )?;
            let from = timeline.approval_status;
            let status = transition(from, target, elevated)?;
            apply_status(&mut timeline, status, now);
            store.upsert_timeline(&timeline)?;
            store.append_history(&ChangeHistoryEntry {
                id: next_id("chg"),
                timeline_id: timeline.id.clone(),
                shift_id: None,
                method: "change_approval_status".to_string(),
                is_new_record: false,
                scope: HistoryScope::Primary,
                diff: ShiftDiff::default(),
                actor_id: actor_id.to_string(),
                created_at: now,
            })?;
            info!(timeline_id, %from, to = %status, actor_id, "approval status changed");
            Ok(timeline)
        })
    }

    pub fn timeline(&self, timeline_id: &str) -> ScheduleResult<Timeline> {
        self.in_transaction("timeline", TransactionBehavior::Deferred, |store| {
            load_timeline(store, timeline_id)
        })
    }

    pub fn find_timeline(
        &self,
        trading_point_id: &str,
        owner: &ShiftOwner,
        month: YearMonth,
    ) -> ScheduleResult<Option<Timeline>> {
        self.in_transaction("find_timeline", TransactionBehavior::Deferred, |store| {
            store.find_timeline(trading_point_id, owner, month)
        })
    }

    pub fn shift(&self, shift_id: &str) -> ScheduleResult<ShiftRecord> {
        self.in_transaction("shift", TransactionBehavior::Deferred, |store| {
            load_shift(store, shift_id)
        })
    }

    pub fn history(&self, timeline_id: &str) -> ScheduleResult<Vec<ChangeHistoryEntry>> {
        self.in_transaction("history", TransactionBehavior::Deferred, |store| {
            store.list_history(timeline_id)
        })
    }

    pub fn reconstruct_before(
        &self,
        timeline_id: &str,
        cutoff: DateTime<Utc>,
    ) -> ScheduleResult<Vec<DateCell>> {
        self.in_transaction("reconstruct_before", TransactionBehavior::Deferred, |store| {
            let timeline = load_timeline(store, timeline_id)?;
            let catalog = self.catalog.snapshot()?;
            past_state::reconstruct_before(
                store,
                &timeline,
                cutoff,
                &catalog,
                &self.config.stakeholder,
            )
        })
    }

    pub fn reconstruct_before_last_status_change(
        &self,
        timeline_id: &str,
    ) -> ScheduleResult<Vec<DateCell>> {
        self.in_transaction(
            "reconstruct_before_last_status_change",
            TransactionBehavior::Deferred,
            |store| {
                let timeline = load_timeline(store, timeline_id)?;
                let Some(cutoff) = timeline.approval_status_last_changed_utc else {
                    let tz = timeline.timezone()?;
                    return Ok(ShiftDetails::empty_month(timeline.month, &tz)?.date_cell_list);
                };
                let catalog = self.catalog.snapshot()?;
                past_state::reconstruct_before(
                    store,
                    &timeline,
                    cutoff,
                    &catalog,
                    &self.config.stakeholder,
                )
            },
        )
    }

    fn context(
        &self,
        method: &str,
        actor_id: &str,
        consent: Option<StatusChangeConsent>,
        now: DateTime<Utc>,
    ) -> SaveContext {
        SaveContext {
            actor_id: actor_id.to_string(),
            method: method.to_string(),
            consent: consent.unwrap_or(self.config.status_change_consent),
            now,
        }
    }

    fn save_one(
        &self,
        store: &SqliteScheduleStore<'_>,
        desirable: ShiftRecord,
        context: &SaveContext,
    ) -> ScheduleResult<SavedShift> {
        let catalog = self.catalog.snapshot()?;
        ChangeModelSaver::new(
            store,
            self.permissions.as_ref(),
            &catalog,
            &self.config.stakeholder,
        )
        .save(desirable, context)
    }

    fn location(&self, trading_point_id: &str) -> ScheduleResult<Location> {
        let trading_point = self
            .catalog
            .trading_point(trading_point_id)?
            .ok_or_else(|| ScheduleError::not_found("trading point", trading_point_id))?;
        let tz = if trading_point.timezone_marker.trim().is_empty() {
            self.config.default_timezone
        } else {
            TimezoneMarker::parse(&trading_point.timezone_marker)?
        };
        Ok(Location {
            trading_point_id: trading_point.id,
            tz,
        })
    }

    fn check_catalog_refs(
        &self,
        shift_type_id: &str,
        work_category_id: Option<&str>,
    ) -> ScheduleResult<()> {
        if self.catalog.shift_type(shift_type_id)?.is_none() {
            return Err(ScheduleError::not_found("shift type", shift_type_id));
        }
        if let Some(work_category_id) = work_category_id {
            if self.catalog.work_category(work_category_id)?.is_none() {
                return Err(ScheduleError::not_found("work category", work_category_id));
            }
        }
        Ok(())
    }

    fn ensure_timeline(
        &self,
        store: &SqliteScheduleStore<'_>,
        location: &Location,
        owner: &ShiftOwner,
        month: YearMonth,
    ) -> ScheduleResult<Timeline> {
        if let Some(timeline) = store.find_timeline(&location.trading_point_id, owner, month)? {
            return Ok(timeline);
        }
        let timeline = Timeline {
            id: next_id("tml"),
            owner: owner.clone(),
            trading_point_id: location.trading_point_id.clone(),
            month,
            timezone_marker: location.tz.as_marker(),
            aggregates: TimelineAggregates::default(),
            shift_details: ShiftDetails::empty_month(month, &location.tz)?,
            approval_status: ApprovalStatus::Draft,
            approval_status_last_changed_utc: None,
            rejected_at_utc: None,
            confirmed_at_utc: None,
        };
        timeline.validate().map_err(ScheduleError::Validation)?;
        store.upsert_timeline(&timeline)?;
        info!(timeline_id = %timeline.id, %owner, %month, "timeline created");
        Ok(timeline)
    }

    fn build_plan(
        &self,
        store: &SqliteScheduleStore<'_>,
        draft: &PlanDraft,
        vacancy: bool,
    ) -> ScheduleResult<(ShiftOwner, ShiftRecord)> {
        if matches!(draft.owner, ShiftOwner::Vacancy(_)) != vacancy {
            return Err(ScheduleError::Validation(format!(
                "{} cannot be scheduled as {}",
                draft.owner,
                if vacancy { "a vacancy plan" } else { "an employee plan" }
            )));
        }
        if draft.owner.id().trim().is_empty() {
            return Err(ScheduleError::Validation("plan.owner must not be empty".to_string()));
        }
        let start = parse_utc(&draft.work_start, "plan.work_start")?;
        let end = parse_utc(&draft.work_end, "plan.work_end")?;
        let location = self.location(&draft.trading_point_id)?;
        self.check_catalog_refs(&draft.shift_type_id, draft.work_category_id.as_deref())?;

        let month = YearMonth::of(wall_date(start, &location.tz));
        let timeline = self.ensure_timeline(store, &location, &draft.owner, month)?;
        let kind = draft.owner.plan_kind();
        let base = match &draft.shift_id {
            Some(shift_id) => {
                let existing = load_shift(store, shift_id)?;
                if existing.kind != kind {
                    return Err(ScheduleError::Validation(format!(
                        "shift {shift_id} is not a {}",
                        kind.as_str()
                    )));
                }
                existing
            }
            None => {
                let prefix = if vacancy { "vpl" } else { "pln" };
                blank_shift(next_id(prefix), kind, &timeline.id, start, end)
            }
        };
        let desirable = ShiftPatch::period(start, end)
            .with_timeline(timeline.id)
            .with_shift_type(draft.shift_type_id.clone())
            .with_work_category(draft.work_category_id.clone())
            .apply(&base);
        desirable.validate().map_err(ScheduleError::Validation)?;
        Ok((draft.owner.clone(), desirable))
    }

    fn detect_for_batch(
        &self,
        store: &SqliteScheduleStore<'_>,
        catalog: &CatalogSnapshot,
        batch: &[(ShiftOwner, ShiftRecord)],
    ) -> ScheduleResult<OverlapReport> {
        let (Some(start), Some(end)) = (
            batch.iter().map(|(_, row)| row.work_start_utc).min(),
            batch.iter().map(|(_, row)| row.work_end_utc).max(),
        ) else {
            return Ok(OverlapReport::default());
        };
        let hours = self.config.overlap_lookaround_hours;
        let (window_start, window_end) = Duration::try_hours(hours)
            .filter(|lookaround| *lookaround >= Duration::zero())
            .and_then(|lookaround| {
                Some((
                    start.checked_sub_signed(lookaround)?,
                    end.checked_add_signed(lookaround)?,
                ))
            })
            .ok_or_else(|| {
                ScheduleError::InvalidConfig(format!(
                    "overlap lookaround of {hours} hours is out of range"
                ))
            })?;

        let mut owners: Vec<&ShiftOwner> = Vec::new();
        for (owner, _) in batch {
            if !owners.contains(&owner) {
                owners.push(owner);
            }
        }

        let mut existing = Vec::new();
        for owner in owners {
            for (timeline, row) in
                store.live_plans_of_owner(owner, window_start, window_end)?
            {
                let acceptable = catalog.overlap_acceptable(row.work_category_id.as_deref());
                existing.push(OverlapCandidate::new(timeline.owner, row, acceptable));
            }
        }
        let proposed = batch
            .iter()
            .map(|(owner, row)| {
                OverlapCandidate::new(
                    owner.clone(),
                    row.clone(),
                    catalog.overlap_acceptable(row.work_category_id.as_deref()),
                )
            })
            .collect::<Vec<_>>();

        Ok(detect_overlaps(&proposed, &existing))
    }

    fn in_transaction<T, F>(
        &self,
        operation: &'static str,
        behavior: TransactionBehavior,
        body: F,
    ) -> ScheduleResult<T>
    where
        F: FnOnce(&SqliteScheduleStore<'_>) -> ScheduleResult<T>,
    {
        let result = self.run_transaction(behavior, body);
        match &result {
            Err(error) if error.is_conflict() => {
                warn!(operation, %error, "schedule operation rejected");
            }
            Err(error) => error!(operation, %error, "schedule operation failed"),
            Ok(_) => {}
        }
        result
    }

    fn run_transaction<T, F>(&self, behavior: TransactionBehavior, body: F) -> ScheduleResult<T>
    where
        F: FnOnce(&SqliteScheduleStore<'_>) -> ScheduleResult<T>,
    {
        let mut connection = open_connection(&self.database_path)?;
        let transaction = connection.transaction_with_behavior(behavior)?;
        let value = body(&SqliteScheduleStore::new(&transaction))?;
        transaction.commit()?;
        Ok(value)
    }
}

fn validate_actor(actor_id: &str) -> ScheduleResult<()> {
    if actor_id.trim().is_empty() {
        return Err(ScheduleError::Validation("actor_id must not be empty".to_string()));
    }
    Ok(())
}

fn load_shift<S: ScheduleStore + ?Sized>(store: &S, shift_id: &str) -> ScheduleResult<ShiftRecord> {
    store
        .shift(shift_id)?
        .ok_or_else(|| ScheduleError::not_found("shift", shift_id))
}

fn load_timeline<S: ScheduleStore + ?Sized>(store: &S, timeline_id: &str) -> ScheduleResult<Timeline> {
    store
        .timeline(timeline_id)?
        .ok_or_else(|| ScheduleError::not_found("timeline", timeline_id))
}

fn blank_shift(
    id: String,
    kind: RecordKind,
    timeline_id: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> ShiftRecord {
    ShiftRecord {
        id,
        kind,
        timeline_id: timeline_id.to_string(),
        work_start_utc: start,
        work_end_utc: end,
        shift_type_id: String::new(),
        work_category_id: None,
        plan_id: None,
        identification_start_id: None,
        identification_finish_id: None,
        penalty_minutes: 0,
        deletion: DeletionState::Active,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ShiftType, TradingPoint, WorkCategory};
    use crate::infrastructure::catalog::InMemoryCatalogRepository;
    use crate::infrastructure::permissions::StaticPermissionResolver;
    use chrono::NaiveDate;
    use std::fs;
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

    static NEXT_TEMP_WORKSPACE: AtomicUsize = AtomicUsize::new(0);

    type TestService = ScheduleService<InMemoryCatalogRepository, StaticPermissionResolver>;

    struct TempWorkspace {
        path: PathBuf,
    }

    impl TempWorkspace {
        fn new() -> Self {
            let sequence = NEXT_TEMP_WORKSPACE.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "shift-timeline-service-tests-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&path).expect("create temp workspace");
            Self { path }
        }

        fn service(&self) -> TestService {
            let catalog = InMemoryCatalogRepository::new();
            catalog
                .insert_trading_point(TradingPoint {
                    id: "tp-msk".to_string(),
                    name: "Moscow".to_string(),
                    timezone_marker: "+03:00".to_string(),
                })
                .expect("trading point");
            catalog
                .insert_trading_point(TradingPoint {
                    id: "tp-utc".to_string(),
                    name: "Default".to_string(),
                    timezone_marker: String::new(),
                })
                .expect("trading point");
            catalog
                .insert_shift_type(ShiftType {
                    id: "st-day".to_string(),
                    name: "Day".to_string(),
                    blocked_at: None,
                })
                .expect("shift type");
            for (id, overlap_acceptable) in [("wc-main", false), ("wc-training", true)] {
                catalog
                    .insert_work_category(WorkCategory {
                        id: id.to_string(),
                        name: id.to_string(),
                        overlap_acceptable,
                        blocked_at: None,
                    })
                    .expect("work category");
            }

            let permissions = StaticPermissionResolver::new();
            permissions.grant_everywhere("manager").expect("grant");

            let base = fixed_time("2024-04-01T00:00:00Z");
            let tick = AtomicI64::new(0);
            TestService::open(&self.path, Arc::new(catalog), Arc::new(permissions))
                .expect("open service")
                .with_now_provider(Arc::new(move || {
                    base + Duration::minutes(tick.fetch_add(1, Ordering::Relaxed))
                }))
        }
    }

    impl Drop for TempWorkspace {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn employee(id: &str) -> ShiftOwner {
        ShiftOwner::Employee(id.to_string())
    }

    fn may() -> YearMonth {
        YearMonth::new(2024, 5).expect("month")
    }

    fn draft(
        shift_id: Option<&str>,
        owner: ShiftOwner,
        trading_point_id: &str,
        start: &str,
        end: &str,
        work_category_id: &str,
    ) -> PlanDraft {
        PlanDraft {
            shift_id: shift_id.map(str::to_string),
            owner,
            trading_point_id: trading_point_id.to_string(),
            work_start: start.to_string(),
            work_end: end.to_string(),
            shift_type_id: "st-day".to_string(),
            work_category_id: Some(work_category_id.to_string()),
        }
    }

    fn request(plans: Vec<PlanDraft>, policy: ConflictPolicy, actor_id: &str) -> SchedulePlansRequest {
        SchedulePlansRequest {
            plans,
            vacancy_plans: Vec::new(),
            policy,
            consent: None,
            actor_id: actor_id.to_string(),
        }
    }

    fn schedule_one(service: &TestService, plan: PlanDraft) -> ShiftRecord {
        let mut outcome = service
            .schedule_plans(request(vec![plan], ConflictPolicy::NotSpecified, "manager"))
            .expect("schedule plan");
        assert_eq!(outcome.saved.len(), 1);
        outcome.saved.remove(0)
    }

    fn timeline_of(service: &TestService, trading_point_id: &str, owner: &ShiftOwner, month: YearMonth) -> Timeline {
        service
            .find_timeline(trading_point_id, owner, month)
            .expect("lookup")
            .expect("timeline present")
    }

    fn day(cells: &[DateCell], month: u32, day: u32) -> &DateCell {
        let date = NaiveDate::from_ymd_opt(2024, month, day).expect("date");
        cells
            .iter()
            .find(|cell| cell.date == date)
            .expect("cell present")
    }

    #[test]
    fn scheduling_a_plan_creates_the_month_timeline() {
        let workspace = TempWorkspace::new();
        let service = workspace.service();
        let owner = employee("emp-1");

        let plan = schedule_one(
            &service,
            draft(None, owner.clone(), "tp-msk", "2024-05-01T09:00:00+03:00", "2024-05-01T17:00:00+03:00", "wc-main"),
        );
        assert!(plan.id.starts_with("pln-"));
        assert_eq!(plan.work_start_utc, fixed_time("2024-05-01T06:00:00Z"));

        let timeline = timeline_of(&service, "tp-msk", &owner, may());
        assert_eq!(timeline.timezone_marker, "+03:00");
        assert_eq!(timeline.approval_status, ApprovalStatus::Draft);
        assert_eq!(timeline.aggregates.plan_count, 1);
        assert_eq!(timeline.aggregates.plan_sum_minutes, 480);
        assert_eq!(timeline.shift_details.date_cell_list.len(), 31);

        let cell = day(&timeline.shift_details.date_cell_list, 5, 1);
        assert_eq!(cell.plan_view.shift_count, 1);
        assert_eq!(cell.comparing_view.plan_minutes, 480);

        let history = service.history(&timeline.id).expect("history");
        assert_eq!(history.len(), 1);
        assert!(history[0].is_new_record);
    }

    #[test]
    fn unresolved_overlap_lists_both_shifts_and_persists_nothing() {
        let workspace = TempWorkspace::new();
        let service = workspace.service();
        let owner = employee("emp-1");
        let first = schedule_one(
            &service,
            draft(None, owner.clone(), "tp-utc", "2024-05-01T09:00:00Z", "2024-05-01T13:00:00Z", "wc-main"),
        );

        let error = service
            .schedule_plans(request(
                vec![draft(None, owner.clone(), "tp-utc", "2024-05-01T12:00:00Z", "2024-05-01T16:00:00Z", "wc-main")],
                ConflictPolicy::NotSpecified,
                "manager",
            ))
            .expect_err("overlap must be rejected");
        assert!(matches!(error, ScheduleError::UnresolvedOverlap { .. }));
        let ids = error.conflicting_ids();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&first.id));

        let timeline = timeline_of(&service, "tp-utc", &owner, may());
        assert_eq!(timeline.aggregates.plan_count, 1);
        assert_eq!(service.history(&timeline.id).expect("history").len(), 1);
    }

    #[test]
    fn overlap_acceptable_categories_keep_both_plans() {
        let workspace = TempWorkspace::new();
        let service = workspace.service();
        let owner = employee("emp-1");
        schedule_one(
            &service,
            draft(None, owner.clone(), "tp-utc", "2024-05-01T09:00:00Z", "2024-05-01T13:00:00Z", "wc-training"),
        );

        let outcome = service
            .schedule_plans(request(
                vec![draft(None, owner.clone(), "tp-utc", "2024-05-01T12:00:00Z", "2024-05-01T16:00:00Z", "wc-training")],
                ConflictPolicy::NotSpecified,
                "manager",
            ))
            .expect("acceptable overlap");
        assert_eq!(outcome.saved.len(), 1);
        assert_eq!(outcome.acceptable_overlaps.len(), 1);

        let timeline = timeline_of(&service, "tp-utc", &owner, may());
        assert_eq!(timeline.aggregates.plan_count, 2);
        assert_eq!(timeline.aggregates.plan_sum_minutes, 480);
    }

    #[test]
    fn create_with_overlapping_needs_both_sides_acceptable() {
        let workspace = TempWorkspace::new();
        let service = workspace.service();
        let owner = employee("emp-1");
        schedule_one(
            &service,
            draft(None, owner.clone(), "tp-utc", "2024-05-01T09:00:00Z", "2024-05-01T13:00:00Z", "wc-main"),
        );

        let error = service
            .schedule_plans(request(
                vec![draft(None, owner, "tp-utc", "2024-05-01T12:00:00Z", "2024-05-01T16:00:00Z", "wc-training")],
                ConflictPolicy::CreateWithOverlapping,
                "manager",
            ))
            .expect_err("one-sided acceptance is not enough");
        assert!(matches!(error, ScheduleError::OverlapNotAcceptable { .. }));
    }

    #[test]
    fn delete_and_create_replaces_overlapping_plans() {
        let workspace = TempWorkspace::new();
        let service = workspace.service();
        let owner = employee("emp-1");
        let first = schedule_one(
            &service,
            draft(None, owner.clone(), "tp-utc", "2024-05-01T09:00:00Z", "2024-05-01T13:00:00Z", "wc-main"),
        );
        let second = schedule_one(
            &service,
            draft(None, owner.clone(), "tp-utc", "2024-05-01T13:00:00Z", "2024-05-01T15:00:00Z", "wc-main"),
        );

        let outcome = service
            .schedule_plans(request(
                vec![draft(None, owner.clone(), "tp-utc", "2024-05-01T12:00:00Z", "2024-05-01T16:00:00Z", "wc-main")],
                ConflictPolicy::DeleteAndCreate,
                "manager",
            ))
            .expect("replace");
        assert_eq!(outcome.saved.len(), 1);
        let mut deleted = outcome.deleted.clone();
        deleted.sort();
        let mut expected = vec![first.id.clone(), second.id.clone()];
        expected.sort();
        assert_eq!(deleted, expected);
        assert!(service.shift(&first.id).expect("shift").deletion.is_deleted());

        let timeline = timeline_of(&service, "tp-utc", &owner, may());
        assert_eq!(timeline.aggregates.plan_count, 1);
        assert_eq!(timeline.aggregates.plan_sum_minutes, 240);
    }

    #[test]
    fn plans_with_facts_block_or_survive_replacement() {
        let workspace = TempWorkspace::new();
        let service = workspace.service();
        let owner = employee("emp-1");
        let plan = schedule_one(
            &service,
            draft(None, owner.clone(), "tp-utc", "2024-05-01T09:00:00Z", "2024-05-01T17:00:00Z", "wc-main"),
        );
        service
            .record_fact(
                FactDraft {
                    fact_id: None,
                    employee_id: "emp-1".to_string(),
                    trading_point_id: "tp-utc".to_string(),
                    work_start: "2024-05-01T09:05:00Z".to_string(),
                    work_end: "2024-05-01T17:00:00Z".to_string(),
                    shift_type_id: "st-day".to_string(),
                    work_category_id: Some("wc-main".to_string()),
                    plan_id: Some(plan.id.clone()),
                    identification_start_id: Some("clock-in-1".to_string()),
                    identification_finish_id: None,
                    penalty_minutes: 0,
                },
                "manager",
                None,
            )
            .expect("fact");

        let replacement = || {
            vec![draft(None, owner.clone(), "tp-utc", "2024-05-01T12:00:00Z", "2024-05-01T20:00:00Z", "wc-main")]
        };
        let error = service
            .schedule_plans(request(replacement(), ConflictPolicy::DeleteAndCreate, "manager"))
            .expect_err("plan with fact cannot be deleted");
        match &error {
            ScheduleError::HasFactRecord { shift_ids } => assert_eq!(shift_ids, &vec![plan.id.clone()]),
            other => panic!("expected has fact record, got {other:?}"),
        }
        assert!(service.shift(&plan.id).expect("shift").is_live());

        let outcome = service
            .schedule_plans(request(
                replacement(),
                ConflictPolicy::DeleteAndCreateSkipWithFact,
                "manager",
            ))
            .expect("skip variant");
        assert!(outcome.deleted.is_empty());
        assert_eq!(outcome.saved.len(), 1);
        assert!(service.shift(&plan.id).expect("shift").is_live());
    }

    #[test]
    fn vacancy_plans_do_not_conflict_with_employee_plans() {
        let workspace = TempWorkspace::new();
        let service = workspace.service();
        let outcome = service
            .schedule_plans(SchedulePlansRequest {
                plans: vec![draft(None, employee("emp-1"), "tp-utc", "2024-05-01T09:00:00Z", "2024-05-01T17:00:00Z", "wc-main")],
                vacancy_plans: vec![draft(
                    None,
                    ShiftOwner::Vacancy("vac-1".to_string()),
                    "tp-utc",
                    "2024-05-01T09:00:00Z",
                    "2024-05-01T17:00:00Z",
                    "wc-main",
                )],
                policy: ConflictPolicy::NotSpecified,
                consent: None,
                actor_id: "manager".to_string(),
            })
            .expect("different owners");
        assert_eq!(outcome.saved.len(), 2);
        assert!(outcome
            .saved
            .iter()
            .any(|row| row.kind == RecordKind::VacancyPlan && row.id.starts_with("vpl-")));

        let misplaced = service
            .schedule_plans(request(
                vec![draft(None, ShiftOwner::Vacancy("vac-1".to_string()), "tp-utc", "2024-05-02T09:00:00Z", "2024-05-02T17:00:00Z", "wc-main")],
                ConflictPolicy::NotSpecified,
                "manager",
            ))
            .expect_err("vacancy in employee list");
        assert!(matches!(misplaced, ScheduleError::Validation(_)));
    }

    #[test]
    fn overlapping_vacancy_plans_follow_the_policy() {
        let workspace = TempWorkspace::new();
        let service = workspace.service();
        let vacancy = ShiftOwner::Vacancy("vac-1".to_string());
        let vacancy_request = |start: &str, end: &str, policy: ConflictPolicy| SchedulePlansRequest {
            plans: Vec::new(),
            vacancy_plans: vec![draft(None, vacancy.clone(), "tp-utc", start, end, "wc-main")],
            policy,
            consent: None,
            actor_id: "manager".to_string(),
        };

        let first = service
            .schedule_plans(vacancy_request(
                "2024-05-01T09:00:00Z",
                "2024-05-01T13:00:00Z",
                ConflictPolicy::NotSpecified,
            ))
            .expect("first vacancy plan")
            .saved
            .remove(0);
        assert_eq!(first.kind, RecordKind::VacancyPlan);

        let error = service
            .schedule_plans(vacancy_request(
                "2024-05-01T12:00:00Z",
                "2024-05-01T16:00:00Z",
                ConflictPolicy::NotSpecified,
            ))
            .expect_err("overlapping vacancy plan");
        assert!(matches!(error, ScheduleError::UnresolvedOverlap { .. }));
        assert!(error.conflicting_ids().contains(&first.id));
        assert!(service.shift(&first.id).expect("shift").is_live());

        let outcome = service
            .schedule_plans(vacancy_request(
                "2024-05-01T12:00:00Z",
                "2024-05-01T16:00:00Z",
                ConflictPolicy::DeleteAndCreate,
            ))
            .expect("replace vacancy plan");
        assert_eq!(outcome.deleted, vec![first.id.clone()]);
        assert_eq!(outcome.saved.len(), 1);
        assert!(outcome.saved[0].id.starts_with("vpl-"));
        assert!(service.shift(&first.id).expect("shift").deletion.is_deleted());

        let timeline = timeline_of(&service, "tp-utc", &vacancy, may());
        assert_eq!(timeline.aggregates.plan_count, 1);
        assert_eq!(timeline.aggregates.plan_sum_minutes, 240);
        let cell = day(&timeline.shift_details.date_cell_list, 5, 1);
        assert_eq!(cell.plan_view.shift_count, 1);
        assert_eq!(cell.comparing_view.plan_minutes, 240);
    }

    #[test]
    fn out_of_range_lookaround_is_a_config_error() {
        let workspace = TempWorkspace::new();
        let service = ScheduleService {
            config: EngineConfig {
                overlap_lookaround_hours: i64::MAX,
                ..EngineConfig::default()
            },
            ..workspace.service()
        };

        let error = service
            .schedule_plans(request(
                vec![draft(None, employee("emp-1"), "tp-utc", "2024-05-01T09:00:00Z", "2024-05-01T17:00:00Z", "wc-main")],
                ConflictPolicy::NotSpecified,
                "manager",
            ))
            .expect_err("lookaround out of range");
        assert!(matches!(error, ScheduleError::InvalidConfig(_)));
    }

    #[test]
    fn confirmed_timeline_needs_consent_from_non_elevated_actor() {
        let workspace = TempWorkspace::new();
        let service = workspace.service();
        let owner = employee("emp-1");
        let plan = schedule_one(
            &service,
            draft(None, owner.clone(), "tp-utc", "2024-05-01T09:00:00Z", "2024-05-01T13:00:00Z", "wc-main"),
        );
        let timeline = timeline_of(&service, "tp-utc", &owner, may());
        service
            .change_approval_status(&timeline.id, ApprovalStatus::Waiting, "manager")
            .expect("submit");
        let confirmed = service
            .change_approval_status(&timeline.id, ApprovalStatus::Confirmed, "manager")
            .expect("confirm");
        assert!(confirmed.confirmed_at_utc.is_some());

        let edit = || {
            vec![draft(Some(&plan.id), owner.clone(), "tp-utc", "2024-05-01T09:00:00Z", "2024-05-01T17:00:00Z", "wc-main")]
        };
        let error = service
            .schedule_plans(request(edit(), ConflictPolicy::NotSpecified, "cashier"))
            .expect_err("confirmed timeline");
        assert!(matches!(error, ScheduleError::ApprovalStatusChanging { .. }));
        let unchanged = service.timeline(&timeline.id).expect("timeline");
        assert_eq!(unchanged.approval_status, ApprovalStatus::Confirmed);
        assert_eq!(unchanged.aggregates.plan_sum_minutes, 240);

        let mut with_consent = request(edit(), ConflictPolicy::NotSpecified, "cashier");
        with_consent.consent = Some(StatusChangeConsent::Downgrade);
        service.schedule_plans(with_consent).expect("downgrade");
        let downgraded = service.timeline(&timeline.id).expect("timeline");
        assert_eq!(downgraded.approval_status, ApprovalStatus::Draft);
        assert_eq!(downgraded.aggregates.plan_sum_minutes, 480);

        let before = service
            .reconstruct_before_last_status_change(&timeline.id)
            .expect("reconstruct");
        assert_eq!(day(&before, 5, 1).comparing_view.plan_minutes, 240);
    }

    #[test]
    fn approval_transitions_require_permission() {
        let workspace = TempWorkspace::new();
        let service = workspace.service();
        let owner = employee("emp-1");
        schedule_one(
            &service,
            draft(None, owner.clone(), "tp-utc", "2024-05-01T09:00:00Z", "2024-05-01T13:00:00Z", "wc-main"),
        );
        let timeline = timeline_of(&service, "tp-utc", &owner, may());

        service
            .change_approval_status(&timeline.id, ApprovalStatus::Waiting, "cashier")
            .expect("anyone may submit");
        let error = service
            .change_approval_status(&timeline.id, ApprovalStatus::Confirmed, "cashier")
            .expect_err("confirmation needs permission");
        assert!(matches!(error, ScheduleError::Validation(_)));

        let history = service.history(&timeline.id).expect("history");
        let status_entries = history.iter().filter(|entry| entry.shift_id.is_none()).count();
        assert_eq!(status_entries, 1);
    }

    #[test]
    fn resaving_identical_plan_records_empty_diff() {
        let workspace = TempWorkspace::new();
        let service = workspace.service();
        let owner = employee("emp-1");
        let plan = schedule_one(
            &service,
            draft(None, owner.clone(), "tp-utc", "2024-05-01T09:00:00Z", "2024-05-01T13:00:00Z", "wc-main"),
        );
        let before = timeline_of(&service, "tp-utc", &owner, may());

        let again = schedule_one(
            &service,
            draft(Some(&plan.id), owner.clone(), "tp-utc", "2024-05-01T09:00:00Z", "2024-05-01T13:00:00Z", "wc-main"),
        );
        assert_eq!(again, plan);

        let after = timeline_of(&service, "tp-utc", &owner, may());
        assert_eq!(after.aggregates, before.aggregates);
        assert_eq!(after.shift_details, before.shift_details);
        let history = service.history(&after.id).expect("history");
        assert_eq!(history.len(), 2);
        assert!(history[1].diff.is_empty());
        assert!(!history[1].is_new_record);
    }

    #[test]
    fn month_aggregate_matches_day_cells() {
        let workspace = TempWorkspace::new();
        let service = workspace.service();
        let owner = employee("emp-1");
        let plans = vec![
            draft(None, owner.clone(), "tp-msk", "2024-05-01T09:00:00+03:00", "2024-05-01T17:00:00+03:00", "wc-main"),
            draft(None, owner.clone(), "tp-msk", "2024-05-02T22:00:00+03:00", "2024-05-03T06:00:00+03:00", "wc-main"),
            draft(None, owner.clone(), "tp-msk", "2024-05-31T20:00:00+03:00", "2024-06-01T02:00:00+03:00", "wc-main"),
        ];
        service
            .schedule_plans(request(plans, ConflictPolicy::NotSpecified, "manager"))
            .expect("schedule");

        let timeline = timeline_of(&service, "tp-msk", &owner, may());
        let cells = &timeline.shift_details.date_cell_list;
        let sum = cells
            .iter()
            .map(|cell| cell.comparing_view.plan_minutes)
            .sum::<i64>();
        assert_eq!(sum, timeline.aggregates.plan_sum_minutes);
        assert_eq!(timeline.aggregates.plan_count, 3);
        assert_eq!(day(cells, 5, 2).comparing_view.plan_minutes, 480);
        assert_eq!(day(cells, 5, 3).plan_view.shift_count, 0);
        assert_eq!(day(cells, 5, 31).comparing_view.plan_minutes, 360);
    }

    #[test]
    fn moving_plan_to_another_month_recomputes_both_timelines() {
        let workspace = TempWorkspace::new();
        let service = workspace.service();
        let owner = employee("emp-1");
        let plan = schedule_one(
            &service,
            draft(None, owner.clone(), "tp-utc", "2024-05-10T09:00:00Z", "2024-05-10T13:00:00Z", "wc-main"),
        );
        let may_timeline = timeline_of(&service, "tp-utc", &owner, may());

        let moved = schedule_one(
            &service,
            draft(Some(&plan.id), owner.clone(), "tp-utc", "2024-06-10T09:00:00Z", "2024-06-10T13:00:00Z", "wc-main"),
        );
        assert_eq!(moved.id, plan.id);
        assert_ne!(moved.timeline_id, plan.timeline_id);

        let june = timeline_of(&service, "tp-utc", &owner, YearMonth::new(2024, 6).expect("month"));
        assert_eq!(june.aggregates.plan_count, 1);
        assert_eq!(june.aggregates.plan_sum_minutes, 240);
        let may_after = service.timeline(&may_timeline.id).expect("timeline");
        assert_eq!(may_after.aggregates.plan_count, 0);

        let may_history = service.history(&may_timeline.id).expect("history");
        assert!(may_history
            .iter()
            .any(|entry| entry.scope == HistoryScope::PreviousOwner));
    }

    #[test]
    fn delete_and_restore_follow_overlap_rules() {
        let workspace = TempWorkspace::new();
        let service = workspace.service();
        let owner = employee("emp-1");
        let plan = schedule_one(
            &service,
            draft(None, owner.clone(), "tp-utc", "2024-05-01T09:00:00Z", "2024-05-01T13:00:00Z", "wc-main"),
        );

        let deleted = service.delete_shift(&plan.id, "manager", None).expect("delete");
        assert!(deleted.deletion.is_deleted());
        assert_eq!(timeline_of(&service, "tp-utc", &owner, may()).aggregates.plan_count, 0);

        let restored = service.restore_shift(&plan.id, "manager", None).expect("restore");
        assert!(restored.is_live());
        assert_eq!(timeline_of(&service, "tp-utc", &owner, may()).aggregates.plan_count, 1);

        service.delete_shift(&plan.id, "manager", None).expect("delete again");
        schedule_one(
            &service,
            draft(None, owner.clone(), "tp-utc", "2024-05-01T10:00:00Z", "2024-05-01T12:00:00Z", "wc-main"),
        );
        let error = service
            .restore_shift(&plan.id, "manager", None)
            .expect_err("restore into overlap");
        assert!(matches!(error, ScheduleError::UnresolvedOverlap { .. }));
    }

    #[test]
    fn facts_count_towards_fact_and_penalty_totals() {
        let workspace = TempWorkspace::new();
        let service = workspace.service();
        let owner = employee("emp-1");
        let plan = schedule_one(
            &service,
            draft(None, owner.clone(), "tp-utc", "2024-05-01T09:00:00Z", "2024-05-01T17:00:00Z", "wc-main"),
        );
        let fact = service
            .record_fact(
                FactDraft {
                    fact_id: None,
                    employee_id: "emp-1".to_string(),
                    trading_point_id: "tp-utc".to_string(),
                    work_start: "2024-05-01T08:50:00Z".to_string(),
                    work_end: "2024-05-01T17:20:00Z".to_string(),
                    shift_type_id: "st-day".to_string(),
                    work_category_id: None,
                    plan_id: Some(plan.id.clone()),
                    identification_start_id: None,
                    identification_finish_id: None,
                    penalty_minutes: 15,
                },
                "manager",
                None,
            )
            .expect("fact");
        assert_eq!(fact.kind, RecordKind::Fact);
        assert_eq!(fact.plan_id.as_deref(), Some(plan.id.as_str()));

        let timeline = timeline_of(&service, "tp-utc", &owner, may());
        assert_eq!(timeline.aggregates.fact_count, 1);
        assert_eq!(timeline.aggregates.fact_sum_minutes, 510);
        assert_eq!(timeline.aggregates.penalty_sum_minutes, 15);

        let foreign = service
            .record_fact(
                FactDraft {
                    fact_id: None,
                    employee_id: "emp-2".to_string(),
                    trading_point_id: "tp-utc".to_string(),
                    work_start: "2024-05-01T09:00:00Z".to_string(),
                    work_end: "2024-05-01T17:00:00Z".to_string(),
                    shift_type_id: "st-day".to_string(),
                    work_category_id: None,
                    plan_id: Some(plan.id.clone()),
                    identification_start_id: None,
                    identification_finish_id: None,
                    penalty_minutes: 0,
                },
                "manager",
                None,
            )
            .expect_err("plan of another employee");
        assert!(matches!(foreign, ScheduleError::Validation(_)));
    }

    #[test]
    fn unchanged_status_reconstructs_an_empty_month() {
        let workspace = TempWorkspace::new();
        let service = workspace.service();
        let owner = employee("emp-1");
        schedule_one(
            &service,
            draft(None, owner.clone(), "tp-utc", "2024-05-01T09:00:00Z", "2024-05-01T13:00:00Z", "wc-main"),
        );
        let timeline = timeline_of(&service, "tp-utc", &owner, may());

        let cells = service
            .reconstruct_before_last_status_change(&timeline.id)
            .expect("reconstruct");
        assert_eq!(cells.len(), 31);
        assert!(cells.iter().all(|cell| cell.plan_view.shift_count == 0));
    }

    #[test]
    fn rejects_unknown_references_and_blank_actor() {
        let workspace = TempWorkspace::new();
        let service = workspace.service();

        let error = service
            .schedule_plans(request(
                vec![draft(None, employee("emp-1"), "tp-missing", "2024-05-01T09:00:00Z", "2024-05-01T13:00:00Z", "wc-main")],
                ConflictPolicy::NotSpecified,
                "manager",
            ))
            .expect_err("unknown trading point");
        assert!(matches!(error, ScheduleError::NotFound { entity: "trading point", .. }));

        let error = service
            .schedule_plans(request(
                vec![draft(None, employee("emp-1"), "tp-utc", "2024-05-01T09:00:00Z", "2024-05-01T13:00:00Z", "wc-unknown")],
                ConflictPolicy::NotSpecified,
                "manager",
            ))
            .expect_err("unknown category");
        assert!(matches!(error, ScheduleError::NotFound { entity: "work category", .. }));

        let error = service
            .schedule_plans(request(Vec::new(), ConflictPolicy::NotSpecified, "  "))
            .expect_err("blank actor");
        assert!(matches!(error, ScheduleError::Validation(_)));

        let error = service
            .schedule_plans(request(
                vec![draft(None, employee("emp-1"), "tp-utc", "not a date", "2024-05-01T13:00:00Z", "wc-main")],
                ConflictPolicy::NotSpecified,
                "manager",
            ))
            .expect_err("malformed date");
        assert!(matches!(error, ScheduleError::MalformedDate(_)));
    }
}
