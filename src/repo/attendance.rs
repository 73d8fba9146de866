use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use sqlx::types::Json;
use sqlx::{FromRow, MySql, MySqlPool, Transaction};

use crate::model::attendance::{AttendanceRecord, CheckInType, EditEntry, RecordStatus};
use crate::model::location::Coordinate;
use crate::repo::placeholders;

#[derive(FromRow)]
struct RecordRow {
    id: u64,
    employee_id: u64,
    check_in_time: DateTime<Utc>,
    check_in_latitude: f64,
    check_in_longitude: f64,
    check_in_type: String,
    locations_within: Json<Vec<u64>>,
    primary_location_id: Option<u64>,
    shift_id: Option<u64>,
    check_out_time: Option<DateTime<Utc>>,
    check_out_latitude: Option<f64>,
    check_out_longitude: Option<f64>,
    regular_hours: f64,
    overtime_hours: f64,
    total_hours: f64,
    break_hours: f64,
    status: String,
    is_late: bool,
    late_minutes: i64,
    is_overnight_shift: bool,
    auto_checkout: bool,
    forgot_checkout: bool,
    split_from_record_id: Option<u64>,
}

#[derive(FromRow)]
struct EditRow {
    record_id: u64,
    editor: String,
    edited_at: DateTime<Utc>,
    field: String,
    old_value: Option<String>,
    new_value: Option<String>,
    reason: String,
}

fn decode_err(e: strum::ParseError, column: &str, value: &str) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: format!("unexpected value '{value}': {e}").into(),
    }
}

impl TryFrom<RecordRow> for AttendanceRecord {
    type Error = sqlx::Error;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        let status = RecordStatus::from_str(&row.status).map_err(|e| decode_err(e, "status", &row.status))?;
        let check_in_type = CheckInType::from_str(&row.check_in_type)
            .map_err(|e| decode_err(e, "check_in_type", &row.check_in_type))?;
        let check_out_location = match (row.check_out_latitude, row.check_out_longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinate { latitude, longitude }),
            _ => None,
        };

        Ok(AttendanceRecord {
            id: row.id,
            employee_id: row.employee_id,
            check_in_time: row.check_in_time,
            check_in_location: Coordinate { latitude: row.check_in_latitude, longitude: row.check_in_longitude },
            check_in_type,
            locations_within: row.locations_within.0,
            primary_location_id: row.primary_location_id,
            shift_id: row.shift_id,
            check_out_time: row.check_out_time,
            check_out_location,
            regular_hours: row.regular_hours,
            overtime_hours: row.overtime_hours,
            total_hours: row.total_hours,
            break_hours: row.break_hours,
            status,
            is_late: row.is_late,
            late_minutes: row.late_minutes,
            is_overnight_shift: row.is_overnight_shift,
            auto_checkout: row.auto_checkout,
            forgot_checkout: row.forgot_checkout,
            split_from_record_id: row.split_from_record_id,
            edit_history: Vec::new(),
        })
    }
}

impl From<EditRow> for EditEntry {
    fn from(row: EditRow) -> Self {
        EditEntry {
            editor: row.editor,
            edited_at: row.edited_at,
            field: row.field,
            old_value: row.old_value,
            new_value: row.new_value,
            reason: row.reason,
        }
    }
}

const RECORD_COLUMNS: &str = "id, employee_id, check_in_time, check_in_latitude, check_in_longitude, \
    check_in_type, locations_within, primary_location_id, shift_id, check_out_time, check_out_latitude, \
    check_out_longitude, regular_hours, overtime_hours, total_hours, break_hours, status, is_late, \
    late_minutes, is_overnight_shift, auto_checkout, forgot_checkout, split_from_record_id";

/// Most record ids bound into one history query. MySQL caps a prepared
/// statement at 65,535 parameters.
const HISTORY_BATCH: usize = 1_000;

fn history_sql(ids: usize) -> String {
    format!(
        "SELECT record_id, editor, edited_at, field, old_value, new_value, reason \
         FROM attendance_edits WHERE record_id IN ({}) ORDER BY record_id, id",
        placeholders(ids)
    )
}

/// Fill in `edit_history` for `records`, one query per batch of ids.
async fn attach_history(pool: &MySqlPool, records: &mut [AttendanceRecord]) -> Result<(), sqlx::Error> {
    for batch in records.chunks_mut(HISTORY_BATCH) {
        attach_history_batch(pool, batch).await?;
    }
    Ok(())
}

async fn attach_history_batch(pool: &MySqlPool, records: &mut [AttendanceRecord]) -> Result<(), sqlx::Error> {
    let sql = history_sql(records.len());
    let mut query = sqlx::query_as::<_, EditRow>(&sql);
    for record in records.iter() {
        query = query.bind(record.id);
    }

    let mut by_record: HashMap<u64, Vec<EditEntry>> = HashMap::new();
    for row in query.fetch_all(pool).await? {
        by_record.entry(row.record_id).or_default().push(row.into());
    }
    for record in records.iter_mut() {
        record.edit_history = by_record.remove(&record.id).unwrap_or_default();
    }
    Ok(())
}

async fn insert_edits(
    tx: &mut Transaction<'_, MySql>,
    record_id: u64,
    edits: &[EditEntry],
) -> Result<(), sqlx::Error> {
    for edit in edits {
        sqlx::query(
            r#"
            INSERT INTO attendance_edits (record_id, editor, edited_at, field, old_value, new_value, reason)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record_id)
        .bind(&edit.editor)
        .bind(edit.edited_at)
        .bind(&edit.field)
        .bind(&edit.old_value)
        .bind(&edit.new_value)
        .bind(&edit.reason)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

async fn insert_in(tx: &mut Transaction<'_, MySql>, record: &AttendanceRecord) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO attendance_records
            (employee_id, check_in_time, check_in_latitude, check_in_longitude, check_in_type,
             locations_within, primary_location_id, shift_id, check_out_time, check_out_latitude,
             check_out_longitude, regular_hours, overtime_hours, total_hours, break_hours, status,
             is_late, late_minutes, is_overnight_shift, auto_checkout, forgot_checkout, split_from_record_id)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(record.employee_id)
    .bind(record.check_in_time)
    .bind(record.check_in_location.latitude)
    .bind(record.check_in_location.longitude)
    .bind(record.check_in_type.as_ref())
    .bind(Json(&record.locations_within))
    .bind(record.primary_location_id)
    .bind(record.shift_id)
    .bind(record.check_out_time)
    .bind(record.check_out_location.map(|c| c.latitude))
    .bind(record.check_out_location.map(|c| c.longitude))
    .bind(record.regular_hours)
    .bind(record.overtime_hours)
    .bind(record.total_hours)
    .bind(record.break_hours)
    .bind(record.status.as_ref())
    .bind(record.is_late)
    .bind(record.late_minutes)
    .bind(record.is_overnight_shift)
    .bind(record.auto_checkout)
    .bind(record.forgot_checkout)
    .bind(record.split_from_record_id)
    .execute(&mut **tx)
    .await?;

    let id = result.last_insert_id();
    insert_edits(tx, id, &record.edit_history).await?;
    Ok(id)
}

/// Update the mutable columns of `record` only if it is still in `expected` status,
/// and append `new_edits`. Returns false when the guard did not match.
async fn update_in(
    tx: &mut Transaction<'_, MySql>,
    record: &AttendanceRecord,
    expected: RecordStatus,
    new_edits: &[EditEntry],
) -> Result<bool, sqlx::Error> {
    // Lock the row first: MySQL reports 0 affected rows for an UPDATE that
    // happens to change nothing, so rows_affected cannot tell us about races.
    let current = sqlx::query_scalar::<_, String>("SELECT status FROM attendance_records WHERE id = ? FOR UPDATE")
        .bind(record.id)
        .fetch_optional(&mut **tx)
        .await?;
    if current.as_deref() != Some(expected.as_ref()) {
        return Ok(false);
    }

    sqlx::query(
        r#"
        UPDATE attendance_records
        SET check_in_time = ?, shift_id = ?, check_out_time = ?, check_out_latitude = ?,
            check_out_longitude = ?, regular_hours = ?, overtime_hours = ?, total_hours = ?,
            break_hours = ?, status = ?, is_late = ?, late_minutes = ?, is_overnight_shift = ?,
            auto_checkout = ?, forgot_checkout = ?
        WHERE id = ?
        "#,
    )
    .bind(record.check_in_time)
    .bind(record.shift_id)
    .bind(record.check_out_time)
    .bind(record.check_out_location.map(|c| c.latitude))
    .bind(record.check_out_location.map(|c| c.longitude))
    .bind(record.regular_hours)
    .bind(record.overtime_hours)
    .bind(record.total_hours)
    .bind(record.break_hours)
    .bind(record.status.as_ref())
    .bind(record.is_late)
    .bind(record.late_minutes)
    .bind(record.is_overnight_shift)
    .bind(record.auto_checkout)
    .bind(record.forgot_checkout)
    .bind(record.id)
    .execute(&mut **tx)
    .await?;

    insert_edits(tx, record.id, new_edits).await?;
    Ok(true)
}

/// Insert a newly opened record unless the employee already has one open.
/// Returns `None` in that case.
///
/// The employee row is locked first, so concurrent check-ins for one
/// employee run this check one at a time.
pub async fn insert_open(pool: &MySqlPool, record: &AttendanceRecord) -> Result<Option<u64>, sqlx::Error> {
    let mut tx = pool.begin().await?;
    sqlx::query("SELECT id FROM employees WHERE id = ? FOR UPDATE")
        .bind(record.employee_id)
        .fetch_optional(&mut *tx)
        .await?;

    let open = sqlx::query_scalar::<_, u64>(
        "SELECT id FROM attendance_records WHERE employee_id = ? AND status = ? LIMIT 1 FOR UPDATE",
    )
    .bind(record.employee_id)
    .bind(RecordStatus::CheckedIn.as_ref())
    .fetch_optional(&mut *tx)
    .await?;
    if open.is_some() {
        tx.rollback().await?;
        return Ok(None);
    }

    let id = insert_in(&mut tx, record).await?;
    tx.commit().await?;
    Ok(Some(id))
}

/// Persist a mutation made by the attendance core.
///
/// `history_len_before` is the length of `edit_history` when the record was
/// loaded; everything after it is appended.
pub async fn save(
    pool: &MySqlPool,
    record: &AttendanceRecord,
    expected: RecordStatus,
    history_len_before: usize,
) -> Result<bool, sqlx::Error> {
    let new_edits = record.edit_history.get(history_len_before..).unwrap_or_default();

    let mut tx = pool.begin().await?;
    if !update_in(&mut tx, record, expected, new_edits).await? {
        tx.rollback().await?;
        return Ok(false);
    }
    tx.commit().await?;
    Ok(true)
}

/// Store both halves of a split in one transaction. Returns the new record's
/// id, or `None` if the original changed in the meantime.
pub async fn save_split(
    pool: &MySqlPool,
    original: &AttendanceRecord,
    expected: RecordStatus,
    history_len_before: usize,
    tail: &AttendanceRecord,
) -> Result<Option<u64>, sqlx::Error> {
    let new_edits = original.edit_history.get(history_len_before..).unwrap_or_default();

    let mut tx = pool.begin().await?;
    if !update_in(&mut tx, original, expected, new_edits).await? {
        tx.rollback().await?;
        return Ok(None);
    }
    let id = insert_in(&mut tx, tail).await?;
    tx.commit().await?;
    Ok(Some(id))
}

pub async fn find(pool: &MySqlPool, id: u64) -> Result<Option<AttendanceRecord>, sqlx::Error> {
    let sql = format!("SELECT {RECORD_COLUMNS} FROM attendance_records WHERE id = ?");
    let Some(row) = sqlx::query_as::<_, RecordRow>(&sql).bind(id).fetch_optional(pool).await? else {
        return Ok(None);
    };

    let mut records = vec![AttendanceRecord::try_from(row)?];
    attach_history(pool, &mut records).await?;
    Ok(records.pop())
}

/// The employee's currently open record, if any.
pub async fn find_open(pool: &MySqlPool, employee_id: u64) -> Result<Option<AttendanceRecord>, sqlx::Error> {
    let sql = format!(
        "SELECT {RECORD_COLUMNS} FROM attendance_records \
         WHERE employee_id = ? AND status = ? ORDER BY check_in_time DESC LIMIT 1"
    );
    let row = sqlx::query_as::<_, RecordRow>(&sql)
        .bind(employee_id)
        .bind(RecordStatus::CheckedIn.as_ref())
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => {
            let mut records = vec![AttendanceRecord::try_from(row)?];
            attach_history(pool, &mut records).await?;
            Ok(records.pop())
        }
        None => Ok(None),
    }
}

pub async fn list_for_employee(
    pool: &MySqlPool,
    employee_id: u64,
    limit: u32,
) -> Result<Vec<AttendanceRecord>, sqlx::Error> {
    let sql = format!(
        "SELECT {RECORD_COLUMNS} FROM attendance_records \
         WHERE employee_id = ? ORDER BY check_in_time DESC LIMIT ?"
    );
    let rows = sqlx::query_as::<_, RecordRow>(&sql)
        .bind(employee_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    let mut records = rows.into_iter().map(AttendanceRecord::try_from).collect::<Result<Vec<_>, _>>()?;
    attach_history(pool, &mut records).await?;
    Ok(records)
}

/// Open records checked in before `boundary`, oldest first.
pub async fn fetch_open_before(
    pool: &MySqlPool,
    boundary: DateTime<Utc>,
) -> Result<Vec<AttendanceRecord>, sqlx::Error> {
    let sql = format!(
        "SELECT {RECORD_COLUMNS} FROM attendance_records \
         WHERE status = ? AND check_in_time < ? ORDER BY check_in_time, id"
    );
    let mut stream = sqlx::query_as::<_, RecordRow>(&sql)
        .bind(RecordStatus::CheckedIn.as_ref())
        .bind(boundary)
        .fetch(pool);

    let mut records = Vec::new();
    while let Some(row) = stream.try_next().await? {
        records.push(AttendanceRecord::try_from(row)?);
    }
    drop(stream);

    attach_history(pool, &mut records).await?;
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::AttendancePolicy;
    use crate::attendance::checkin::plan_check_in;
    use crate::attendance::shift_matcher::ShiftSelection;

    #[test]
    fn history_batches_stay_under_the_bind_limit() {
        let ids: Vec<u64> = (1..=70_000).collect();
        let batches: Vec<&[u64]> = ids.chunks(HISTORY_BATCH).collect();

        assert_eq!(batches.len(), 70);
        for batch in &batches {
            assert!(history_sql(batch.len()).matches('?').count() <= u16::MAX as usize);
        }
        assert_eq!(batches.concat(), ids);
    }

    #[actix_web::test]
    #[ignore = "needs a MySQL database (DATABASE_URL)"]
    async fn concurrent_check_ins_open_one_record() {
        let url = std::env::var("DATABASE_URL").unwrap();
        let pool = crate::db::init_db(&url, true).await.unwrap();
        let employee_id = sqlx::query("INSERT INTO employees (display_name, allow_offsite_checkin) VALUES (?, TRUE)")
            .bind("Concurrent")
            .execute(&pool)
            .await
            .unwrap()
            .last_insert_id();

        let policy = AttendancePolicy::default();
        let point = Coordinate { latitude: 13.7563, longitude: 100.5018 };
        let plan = plan_check_in(employee_id, point, &[], true, ShiftSelection::AutoMatch, Utc::now(), &policy).unwrap();

        let (a, b) = futures::join!(insert_open(&pool, &plan.record), insert_open(&pool, &plan.record));
        let opened = [a.unwrap(), b.unwrap()].into_iter().flatten().count();
        assert_eq!(opened, 1);

        let open = find_open(&pool, employee_id).await.unwrap().unwrap();
        assert_eq!(open.employee_id, employee_id);
        assert!(insert_open(&pool, &plan.record).await.unwrap().is_none());
    }
}
