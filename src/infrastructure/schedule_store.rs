use crate::domain::consolidator::ShiftDetails;
use crate::domain::diff::ShiftDiff;
use crate::domain::interval::{format_utc, parse_utc, YearMonth};
use crate::domain::models::{
    ApprovalStatus, ChangeHistoryEntry, DeletionState, HistoryScope, RecordKind, ShiftOwner,
    ShiftRecord, Timeline, TimelineAggregates,
};
use crate::error::{ScheduleError, ScheduleResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::HashSet;

pub trait ScheduleStore {
    fn timeline(&self, id: &str) -> ScheduleResult<Option<Timeline>>;
    fn find_timeline(
        &self,
        trading_point_id: &str,
        owner: &ShiftOwner,
        month: YearMonth,
    ) -> ScheduleResult<Option<Timeline>>;
    fn upsert_timeline(&self, timeline: &Timeline) -> ScheduleResult<()>;

    fn shift(&self, id: &str) -> ScheduleResult<Option<ShiftRecord>>;
    fn shifts_of_timeline(&self, timeline_id: &str) -> ScheduleResult<Vec<ShiftRecord>>;
    fn live_plans_of_owner(
        &self,
        owner: &ShiftOwner,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ScheduleResult<Vec<(Timeline, ShiftRecord)>>;
    fn plans_with_live_fact(&self, plan_ids: &[String]) -> ScheduleResult<HashSet<String>>;
    fn upsert_shift(&self, shift: &ShiftRecord) -> ScheduleResult<()>;

    fn append_history(&self, entry: &ChangeHistoryEntry) -> ScheduleResult<()>;
    fn list_history(&self, timeline_id: &str) -> ScheduleResult<Vec<ChangeHistoryEntry>>;
    fn history_of_shift(&self, shift_id: &str) -> ScheduleResult<Vec<ChangeHistoryEntry>>;
}

pub struct SqliteScheduleStore<'c> {
    connection: &'c Connection,
}

impl<'c> SqliteScheduleStore<'c> {
    pub fn new(connection: &'c Connection) -> Self {
        Self { connection }
    }
}

const TIMELINE_COLUMNS: &str = "id, owner_kind, owner_id, trading_point_id, month, timezone_marker,
    plan_count, fact_count, plan_sum_minutes, fact_sum_minutes, penalty_sum_minutes,
    billing_sum_minutes, shift_details_json, approval_status, approval_status_last_changed_utc,
    rejected_at_utc, confirmed_at_utc";

const SHIFT_COLUMNS: &str = "id, kind, timeline_id, work_start_utc, work_end_utc, shift_type_id,
    work_category_id, plan_id, identification_start_id, identification_finish_id,
    penalty_minutes, deleted_at";

const HISTORY_COLUMNS: &str =
    "id, timeline_id, shift_id, method, is_new_record, scope, diff_json, actor_id, created_at";

struct TimelineRow {
    id: String,
    owner_kind: String,
    owner_id: String,
    trading_point_id: String,
    month: String,
    timezone_marker: String,
    aggregates: TimelineAggregates,
    shift_details_json: String,
    approval_status: String,
    approval_status_last_changed_utc: Option<String>,
    rejected_at_utc: Option<String>,
    confirmed_at_utc: Option<String>,
}

impl TimelineRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            owner_kind: row.get(1)?,
            owner_id: row.get(2)?,
            trading_point_id: row.get(3)?,
            month: row.get(4)?,
            timezone_marker: row.get(5)?,
            aggregates: TimelineAggregates {
                plan_count: row.get(6)?,
                fact_count: row.get(7)?,
                plan_sum_minutes: row.get(8)?,
                fact_sum_minutes: row.get(9)?,
                penalty_sum_minutes: row.get(10)?,
                billing_sum_minutes: row.get(11)?,
            },
            shift_details_json: row.get(12)?,
            approval_status: row.get(13)?,
            approval_status_last_changed_utc: row.get(14)?,
            rejected_at_utc: row.get(15)?,
            confirmed_at_utc: row.get(16)?,
        })
    }

    fn into_timeline(self) -> ScheduleResult<Timeline> {
        Ok(Timeline {
            owner: ShiftOwner::from_parts(&self.owner_kind, self.owner_id)
                .map_err(ScheduleError::Consistency)?,
            month: self.month.parse()?,
            shift_details: serde_json::from_str::<ShiftDetails>(&self.shift_details_json)?,
            approval_status: ApprovalStatus::parse(&self.approval_status)
                .map_err(ScheduleError::Consistency)?,
            approval_status_last_changed_utc: optional_time(
                self.approval_status_last_changed_utc,
                "timeline.approval_status_last_changed_utc",
            )?,
            rejected_at_utc: optional_time(self.rejected_at_utc, "timeline.rejected_at_utc")?,
            confirmed_at_utc: optional_time(self.confirmed_at_utc, "timeline.confirmed_at_utc")?,
            id: self.id,
            trading_point_id: self.trading_point_id,
            timezone_marker: self.timezone_marker,
            aggregates: self.aggregates,
        })
    }
}

struct ShiftRow {
    id: String,
    kind: String,
    timeline_id: String,
    work_start_utc: String,
    work_end_utc: String,
    shift_type_id: String,
    work_category_id: Option<String>,
    plan_id: Option<String>,
    identification_start_id: Option<String>,
    identification_finish_id: Option<String>,
    penalty_minutes: i64,
    deleted_at: Option<String>,
}

impl ShiftRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            kind: row.get(1)?,
            timeline_id: row.get(2)?,
            work_start_utc: row.get(3)?,
            work_end_utc: row.get(4)?,
            shift_type_id: row.get(5)?,
            work_category_id: row.get(6)?,
            plan_id: row.get(7)?,
            identification_start_id: row.get(8)?,
            identification_finish_id: row.get(9)?,
            penalty_minutes: row.get(10)?,
            deleted_at: row.get(11)?,
        })
    }

    fn into_record(self) -> ScheduleResult<ShiftRecord> {
        Ok(ShiftRecord {
            kind: RecordKind::parse(&self.kind).map_err(ScheduleError::Consistency)?,
            work_start_utc: parse_utc(&self.work_start_utc, "shift.work_start_utc")?,
            work_end_utc: parse_utc(&self.work_end_utc, "shift.work_end_utc")?,
            deletion: DeletionState::from_deleted_at(optional_time(
                self.deleted_at,
                "shift.deleted_at",
            )?),
            id: self.id,
            timeline_id: self.timeline_id,
            shift_type_id: self.shift_type_id,
            work_category_id: self.work_category_id,
            plan_id: self.plan_id,
            identification_start_id: self.identification_start_id,
            identification_finish_id: self.identification_finish_id,
            penalty_minutes: self.penalty_minutes,
        })
    }
}

struct HistoryRow {
    id: String,
    timeline_id: String,
    shift_id: Option<String>,
    method: String,
    is_new_record: bool,
    scope: String,
    diff_json: String,
    actor_id: String,
    created_at: String,
}

impl HistoryRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            timeline_id: row.get(1)?,
            shift_id: row.get(2)?,
            method: row.get(3)?,
            is_new_record: row.get::<_, i64>(4)? != 0,
            scope: row.get(5)?,
            diff_json: row.get(6)?,
            actor_id: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    fn into_entry(self) -> ScheduleResult<ChangeHistoryEntry> {
        Ok(ChangeHistoryEntry {
            scope: HistoryScope::parse(&self.scope).map_err(ScheduleError::Consistency)?,
            diff: serde_json::from_str::<ShiftDiff>(&self.diff_json)?,
            created_at: parse_utc(&self.created_at, "change_history.created_at")?,
            id: self.id,
            timeline_id: self.timeline_id,
            shift_id: self.shift_id,
            method: self.method,
            is_new_record: self.is_new_record,
            actor_id: self.actor_id,
        })
    }
}

fn optional_time(value: Option<String>, field_name: &str) -> ScheduleResult<Option<DateTime<Utc>>> {
    value.map(|raw| parse_utc(&raw, field_name)).transpose()
}

impl ScheduleStore for SqliteScheduleStore<'_> {
    fn timeline(&self, id: &str) -> ScheduleResult<Option<Timeline>> {
        let row = self
            .connection
            .query_row(
                &format!("SELECT {TIMELINE_COLUMNS} FROM timeline WHERE id = ?1"),
                params![id],
                TimelineRow::read,
            )
            .optional()?;
        row.map(TimelineRow::into_timeline).transpose()
    }

    fn find_timeline(
        &self,
        trading_point_id: &str,
        owner: &ShiftOwner,
        month: YearMonth,
    ) -> ScheduleResult<Option<Timeline>> {
        let row = self
            .connection
            .query_row(
                &format!(
                    "SELECT {TIMELINE_COLUMNS} FROM timeline
                     WHERE trading_point_id = ?1 AND owner_kind = ?2 AND owner_id = ?3 AND month = ?4"
                ),
                params![trading_point_id, owner.kind_str(), owner.id(), month.to_string()],
                TimelineRow::read,
            )
            .optional()?;
        row.map(TimelineRow::into_timeline).transpose()
    }

    fn upsert_timeline(&self, timeline: &Timeline) -> ScheduleResult<()> {
        let details = serde_json::to_string(&timeline.shift_details)?;
        let aggregates = &timeline.aggregates;
        self.connection.execute(
            "INSERT INTO timeline (
               id, owner_kind, owner_id, trading_point_id, month, timezone_marker,
               plan_count, fact_count, plan_sum_minutes, fact_sum_minutes, penalty_sum_minutes,
               billing_sum_minutes, shift_details_json, approval_status,
               approval_status_last_changed_utc, rejected_at_utc, confirmed_at_utc
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
             ON CONFLICT(id) DO UPDATE SET
               timezone_marker = excluded.timezone_marker,
               plan_count = excluded.plan_count,
               fact_count = excluded.fact_count,
               plan_sum_minutes = excluded.plan_sum_minutes,
               fact_sum_minutes = excluded.fact_sum_minutes,
               penalty_sum_minutes = excluded.penalty_sum_minutes,
               billing_sum_minutes = excluded.billing_sum_minutes,
               shift_details_json = excluded.shift_details_json,
               approval_status = excluded.approval_status,
               approval_status_last_changed_utc = excluded.approval_status_last_changed_utc,
               rejected_at_utc = excluded.rejected_at_utc,
               confirmed_at_utc = excluded.confirmed_at_utc",
            params![
                timeline.id,
                timeline.owner.kind_str(),
                timeline.owner.id(),
                timeline.trading_point_id,
                timeline.month.to_string(),
                timeline.timezone_marker,
                aggregates.plan_count,
                aggregates.fact_count,
                aggregates.plan_sum_minutes,
                aggregates.fact_sum_minutes,
                aggregates.penalty_sum_minutes,
                aggregates.billing_sum_minutes,
                details,
                timeline.approval_status.as_str(),
                timeline.approval_status_last_changed_utc.map(format_utc),
                timeline.rejected_at_utc.map(format_utc),
                timeline.confirmed_at_utc.map(format_utc),
            ],
        )?;
        Ok(())
    }

    fn shift(&self, id: &str) -> ScheduleResult<Option<ShiftRecord>> {
        let row = self
            .connection
            .query_row(
                &format!("SELECT {SHIFT_COLUMNS} FROM shift WHERE id = ?1"),
                params![id],
                ShiftRow::read,
            )
            .optional()?;
        row.map(ShiftRow::into_record).transpose()
    }

    fn shifts_of_timeline(&self, timeline_id: &str) -> ScheduleResult<Vec<ShiftRecord>> {
        let mut statement = self.connection.prepare(&format!(
            "SELECT {SHIFT_COLUMNS} FROM shift WHERE timeline_id = ?1
             ORDER BY work_start_utc ASC, id ASC"
        ))?;
        let rows = statement
            .query_map(params![timeline_id], ShiftRow::read)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(ShiftRow::into_record).collect()
    }

    fn live_plans_of_owner(
        &self,
        owner: &ShiftOwner,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ScheduleResult<Vec<(Timeline, ShiftRecord)>> {
        let columns = SHIFT_COLUMNS
            .split(',')
            .map(|column| format!("s.{}", column.trim()))
            .collect::<Vec<_>>()
            .join(", ");
        let mut statement = self.connection.prepare(&format!(
            "SELECT {columns} FROM shift s
             JOIN timeline t ON t.id = s.timeline_id
             WHERE t.owner_kind = ?1 AND t.owner_id = ?2 AND s.kind = ?3
               AND s.deleted_at IS NULL
               AND s.work_start_utc < ?5 AND s.work_end_utc > ?4
             ORDER BY s.work_start_utc ASC, s.id ASC"
        ))?;
        let rows = statement
            .query_map(
                params![
                    owner.kind_str(),
                    owner.id(),
                    owner.plan_kind().as_str(),
                    format_utc(start),
                    format_utc(end)
                ],
                ShiftRow::read,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        let mut result = Vec::with_capacity(rows.len());
        for row in rows {
            let record = row.into_record()?;
            let timeline = self
                .timeline(&record.timeline_id)?
                .ok_or_else(|| ScheduleError::not_found("timeline", record.timeline_id.clone()))?;
            result.push((timeline, record));
        }
        Ok(result)
    }

    fn plans_with_live_fact(&self, plan_ids: &[String]) -> ScheduleResult<HashSet<String>> {
        if plan_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let placeholders = vec!["?"; plan_ids.len()].join(", ");
        let mut statement = self.connection.prepare(&format!(
            "SELECT DISTINCT plan_id FROM shift
             WHERE kind = 'fact' AND deleted_at IS NULL AND plan_id IN ({placeholders})"
        ))?;
        let ids = statement
            .query_map(params_from_iter(plan_ids.iter()), |row| row.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(ids)
    }

    fn upsert_shift(&self, shift: &ShiftRecord) -> ScheduleResult<()> {
        self.connection.execute(
            "INSERT INTO shift (
               id, kind, timeline_id, work_start_utc, work_end_utc, shift_type_id,
               work_category_id, plan_id, identification_start_id, identification_finish_id,
               penalty_minutes, deleted_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(id) DO UPDATE SET
               kind = excluded.kind,
               timeline_id = excluded.timeline_id,
               work_start_utc = excluded.work_start_utc,
               work_end_utc = excluded.work_end_utc,
               shift_type_id = excluded.shift_type_id,
               work_category_id = excluded.work_category_id,
               plan_id = excluded.plan_id,
               identification_start_id = excluded.identification_start_id,
               identification_finish_id = excluded.identification_finish_id,
               penalty_minutes = excluded.penalty_minutes,
               deleted_at = excluded.deleted_at",
            params![
                shift.id,
                shift.kind.as_str(),
                shift.timeline_id,
                format_utc(shift.work_start_utc),
                format_utc(shift.work_end_utc),
                shift.shift_type_id,
                shift.work_category_id,
                shift.plan_id,
                shift.identification_start_id,
                shift.identification_finish_id,
                shift.penalty_minutes,
                shift.deletion.deleted_at().map(format_utc),
            ],
        )?;
        Ok(())
    }

    fn append_history(&self, entry: &ChangeHistoryEntry) -> ScheduleResult<()> {
        self.connection.execute(
            &format!(
                "INSERT INTO change_history ({HISTORY_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
            ),
            params![
                entry.id,
                entry.timeline_id,
                entry.shift_id,
                entry.method,
                entry.is_new_record,
                entry.scope.as_str(),
                serde_json::to_string(&entry.diff)?,
                entry.actor_id,
                format_utc(entry.created_at),
            ],
        )?;
        Ok(())
    }

    fn list_history(&self, timeline_id: &str) -> ScheduleResult<Vec<ChangeHistoryEntry>> {
        self.query_history("timeline_id", timeline_id)
    }

    fn history_of_shift(&self, shift_id: &str) -> ScheduleResult<Vec<ChangeHistoryEntry>> {
        self.query_history("shift_id", shift_id)
    }
}

impl SqliteScheduleStore<'_> {
    fn query_history(&self, column: &str, value: &str) -> ScheduleResult<Vec<ChangeHistoryEntry>> {
        let mut statement = self.connection.prepare(&format!(
            "SELECT {HISTORY_COLUMNS} FROM change_history WHERE {column} = ?1
             ORDER BY created_at ASC, rowid ASC"
        ))?;
        let rows = statement
            .query_map(params![value], HistoryRow::read)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(HistoryRow::into_entry).collect()
    }
}
