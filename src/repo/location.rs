use std::collections::HashMap;

use chrono::NaiveTime;
use sqlx::types::Json;
use sqlx::{FromRow, MySql, MySqlPool, Transaction};

use crate::model::location::{Coordinate, Location, Shift, WeeklyHours};
use crate::repo::placeholders;

#[derive(FromRow)]
struct LocationRow {
    id: u64,
    name: String,
    address: String,
    latitude: f64,
    longitude: f64,
    radius_meters: f64,
    working_hours: Json<WeeklyHours>,
    break_hours: f64,
    is_active: bool,
}

#[derive(FromRow)]
struct ShiftRow {
    id: u64,
    location_id: u64,
    name: String,
    start_time: NaiveTime,
    end_time: NaiveTime,
    grace_minutes: u32,
}

impl LocationRow {
    fn into_location(self, shifts: Vec<Shift>) -> Location {
        Location {
            id: self.id,
            name: self.name,
            address: self.address,
            center: Coordinate { latitude: self.latitude, longitude: self.longitude },
            radius_meters: self.radius_meters,
            working_hours: self.working_hours.0,
            shifts,
            break_hours: self.break_hours,
            is_active: self.is_active,
        }
    }
}

impl From<ShiftRow> for Shift {
    fn from(row: ShiftRow) -> Self {
        Shift {
            id: row.id,
            name: row.name,
            start_time: row.start_time,
            end_time: row.end_time,
            grace_minutes: row.grace_minutes,
        }
    }
}

const LOCATION_COLUMNS: &str =
    "id, name, address, latitude, longitude, radius_meters, working_hours, break_hours, is_active";

async fn shifts_for(pool: &MySqlPool, location_ids: &[u64]) -> Result<HashMap<u64, Vec<Shift>>, sqlx::Error> {
    let mut by_location: HashMap<u64, Vec<Shift>> = HashMap::new();
    if location_ids.is_empty() {
        return Ok(by_location);
    }

    let sql = format!(
        "SELECT id, location_id, name, start_time, end_time, grace_minutes \
         FROM shifts WHERE location_id IN ({}) ORDER BY location_id, position, id",
        placeholders(location_ids.len())
    );
    let mut query = sqlx::query_as::<_, ShiftRow>(&sql);
    for id in location_ids {
        query = query.bind(*id);
    }

    for row in query.fetch_all(pool).await? {
        by_location.entry(row.location_id).or_default().push(row.into());
    }
    Ok(by_location)
}

/// All locations with their shifts in declaration order.
pub async fn fetch_all(pool: &MySqlPool, active_only: bool) -> Result<Vec<Location>, sqlx::Error> {
    let sql = if active_only {
        format!("SELECT {LOCATION_COLUMNS} FROM locations WHERE is_active = TRUE ORDER BY id")
    } else {
        format!("SELECT {LOCATION_COLUMNS} FROM locations ORDER BY id")
    };
    let rows = sqlx::query_as::<_, LocationRow>(&sql).fetch_all(pool).await?;

    let ids: Vec<u64> = rows.iter().map(|r| r.id).collect();
    let mut shifts = shifts_for(pool, &ids).await?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let own = shifts.remove(&row.id).unwrap_or_default();
            row.into_location(own)
        })
        .collect())
}

pub async fn fetch_one(pool: &MySqlPool, id: u64) -> Result<Option<Location>, sqlx::Error> {
    let sql = format!("SELECT {LOCATION_COLUMNS} FROM locations WHERE id = ?");
    let Some(row) = sqlx::query_as::<_, LocationRow>(&sql).bind(id).fetch_optional(pool).await? else {
        return Ok(None);
    };

    let own = shifts_for(pool, &[id]).await?.remove(&id).unwrap_or_default();
    Ok(Some(row.into_location(own)))
}

async fn write_shifts(tx: &mut Transaction<'_, MySql>, location_id: u64, shifts: &[Shift]) -> Result<(), sqlx::Error> {
    // Keep ids of shifts that survive so records referencing them stay valid.
    let kept: Vec<u64> = shifts.iter().map(|s| s.id).filter(|id| *id != 0).collect();
    if kept.is_empty() {
        sqlx::query("DELETE FROM shifts WHERE location_id = ?")
            .bind(location_id)
            .execute(&mut **tx)
            .await?;
    } else {
        let sql = format!(
            "DELETE FROM shifts WHERE location_id = ? AND id NOT IN ({})",
            placeholders(kept.len())
        );
        let mut query = sqlx::query(&sql).bind(location_id);
        for id in &kept {
            query = query.bind(*id);
        }
        query.execute(&mut **tx).await?;
    }

    for (position, shift) in shifts.iter().enumerate() {
        let position = position as u32;
        if shift.id == 0 {
            sqlx::query(
                r#"
                INSERT INTO shifts (location_id, position, name, start_time, end_time, grace_minutes)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(location_id)
            .bind(position)
            .bind(&shift.name)
            .bind(shift.start_time)
            .bind(shift.end_time)
            .bind(shift.grace_minutes)
            .execute(&mut **tx)
            .await?;
        } else {
            sqlx::query(
                r#"
                UPDATE shifts
                SET position = ?, name = ?, start_time = ?, end_time = ?, grace_minutes = ?
                WHERE id = ? AND location_id = ?
                "#,
            )
            .bind(position)
            .bind(&shift.name)
            .bind(shift.start_time)
            .bind(shift.end_time)
            .bind(shift.grace_minutes)
            .bind(shift.id)
            .bind(location_id)
            .execute(&mut **tx)
            .await?;
        }
    }
    Ok(())
}

/// Insert a location and its shifts; shift ids in `location` are ignored.
pub async fn insert(pool: &MySqlPool, location: &Location) -> Result<u64, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        r#"
        INSERT INTO locations
            (name, address, latitude, longitude, radius_meters, working_hours, break_hours, is_active)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&location.name)
    .bind(&location.address)
    .bind(location.center.latitude)
    .bind(location.center.longitude)
    .bind(location.radius_meters)
    .bind(Json(&location.working_hours))
    .bind(location.break_hours)
    .bind(location.is_active)
    .execute(&mut *tx)
    .await?;
    let id = result.last_insert_id();

    let fresh: Vec<Shift> = location.shifts.iter().cloned().map(|s| Shift { id: 0, ..s }).collect();
    write_shifts(&mut tx, id, &fresh).await?;

    tx.commit().await?;
    Ok(id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationUpdate {
    Updated,
    NotFound,
    /// A kept shift id does not belong to this location.
    UnknownShift(u64),
}

/// First non-zero shift id in `requested` that is not among `existing`.
fn first_unknown_shift(requested: &[Shift], existing: &[u64]) -> Option<u64> {
    requested
        .iter()
        .map(|s| s.id)
        .find(|id| *id != 0 && !existing.contains(id))
}

/// Replace a location's fields and shift list. Nothing is written when the
/// location is missing or a shift id is not one of its own.
pub async fn update(pool: &MySqlPool, location: &Location) -> Result<LocationUpdate, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let exists = sqlx::query_scalar::<_, u64>("SELECT id FROM locations WHERE id = ? FOR UPDATE")
        .bind(location.id)
        .fetch_optional(&mut *tx)
        .await?;
    if exists.is_none() {
        tx.rollback().await?;
        return Ok(LocationUpdate::NotFound);
    }

    let existing = sqlx::query_scalar::<_, u64>("SELECT id FROM shifts WHERE location_id = ?")
        .bind(location.id)
        .fetch_all(&mut *tx)
        .await?;
    if let Some(id) = first_unknown_shift(&location.shifts, &existing) {
        tx.rollback().await?;
        return Ok(LocationUpdate::UnknownShift(id));
    }

    sqlx::query(
        r#"
        UPDATE locations
        SET name = ?, address = ?, latitude = ?, longitude = ?, radius_meters = ?,
            working_hours = ?, break_hours = ?, is_active = ?
        WHERE id = ?
        "#,
    )
    .bind(&location.name)
    .bind(&location.address)
    .bind(location.center.latitude)
    .bind(location.center.longitude)
    .bind(location.radius_meters)
    .bind(Json(&location.working_hours))
    .bind(location.break_hours)
    .bind(location.is_active)
    .bind(location.id)
    .execute(&mut *tx)
    .await?;

    write_shifts(&mut tx, location.id, &location.shifts).await?;

    tx.commit().await?;
    Ok(LocationUpdate::Updated)
}

/// Soft delete: records keep pointing at the location.
pub async fn deactivate(pool: &MySqlPool, id: u64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE locations SET is_active = FALSE WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
