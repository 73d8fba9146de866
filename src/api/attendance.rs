use actix_web::{HttpResponse, web};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::{info, instrument, warn};
use utoipa::{IntoParams, ToSchema};

use crate::api::{internal, message};
use crate::attendance::AttendancePolicy;
use crate::attendance::checkin::{CheckInPlan, complete_check_out, plan_check_in};
use crate::attendance::correction::{RecordEdit, apply_edit, split_overnight};
use crate::attendance::geofence::{LocationCheckResult, resolve};
use crate::auth::auth::AuthUser;
use crate::model::attendance::{AttendanceRecord, RecordStatus};
use crate::model::employee::EmployeeProfile;
use crate::model::location::{Coordinate, Location};
use crate::repo;
use crate::utils::location_cache;
use crate::utils::timestamp::Timestamp;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckInRequest {
    #[schema(example = 13.7563)]
    pub latitude: f64,
    #[schema(example = 100.5018)]
    pub longitude: f64,
    /// Leave out to match the shift starting nearest to now.
    #[schema(example = 1, nullable = true)]
    pub shift_id: Option<u64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckOutRequest {
    #[schema(example = 13.7563)]
    pub latitude: f64,
    #[schema(example = 100.5018)]
    pub longitude: f64,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LocationQuery {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RecordsQuery {
    /// Newest first, at most 100.
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EditRecordRequest {
    /// RFC 3339 string, epoch seconds, or `{ "seconds": .. }`.
    #[schema(value_type = Option<String>, example = "2026-01-01T02:00:00Z")]
    pub check_in_time: Option<Timestamp>,
    #[schema(value_type = Option<String>, example = "2026-01-01T11:00:00Z")]
    pub check_out_time: Option<Timestamp>,
    pub shift_id: Option<u64>,
    pub status: Option<RecordStatus>,
    #[schema(example = "forgot to check out, confirmed with supervisor")]
    pub reason: String,
}

impl From<EditRecordRequest> for RecordEdit {
    fn from(req: EditRecordRequest) -> Self {
        RecordEdit {
            check_in_time: req.check_in_time.map(Into::into),
            check_out_time: req.check_out_time.map(Into::into),
            shift_id: req.shift_id,
            status: req.status,
            reason: req.reason,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SplitResponse {
    pub original: AttendanceRecord,
    pub created: AttendanceRecord,
}

async fn active_profile(pool: &MySqlPool, employee_id: u64) -> actix_web::Result<Option<EmployeeProfile>> {
    let profile = repo::employee::fetch_profile(pool, employee_id)
        .await
        .map_err(|e| internal(e, "Failed to load employee profile"))?;
    Ok(profile.filter(|p| p.is_active))
}

/// The location a record was made at, active or not.
async fn record_location(pool: &MySqlPool, record: &AttendanceRecord) -> actix_web::Result<Option<Location>> {
    match record.primary_location_id {
        Some(id) => repo::location::fetch_one(pool, id)
            .await
            .map_err(|e| internal(e, "Failed to load location")),
        None => Ok(None),
    }
}

/// Check-in endpoint
#[utoipa::path(
    post,
    path = "/api/v1/attendance/check-in",
    request_body = CheckInRequest,
    responses(
        (status = 201, description = "Checked in", body = CheckInPlan),
        (status = 400, description = "Invalid coordinates or unknown shift", body = Object, example = json!({
            "message": "invalid input: latitude must be between -90 and 90"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "No active employee profile"),
        (status = 409, description = "Already checked in", body = Object, example = json!({
            "message": "Already checked in"
        })),
        (status = 422, description = "Outside every location or no shift nearby", body = Object, example = json!({
            "message": "not within any registered location",
            "nearest_meters": 150.0
        })),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
#[instrument(skip_all, fields(user_id = auth.user_id))]
pub async fn check_in(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    policy: web::Data<AttendancePolicy>,
    payload: web::Json<CheckInRequest>,
) -> actix_web::Result<HttpResponse> {
    let employee_id = auth.require_employee()?;
    let Some(profile) = active_profile(&pool, employee_id).await? else {
        return Ok(HttpResponse::Forbidden().json(message("No active employee profile")));
    };

    let open = repo::attendance::find_open(&pool, employee_id)
        .await
        .map_err(|e| internal(e, "Failed to look up open record"))?;
    if open.is_some() {
        return Ok(HttpResponse::Conflict().json(message("Already checked in")));
    }

    let point = Coordinate::new(payload.latitude, payload.longitude)?;
    let locations = location_cache::active_locations(&pool)
        .await
        .map_err(|e| internal(e, "Failed to load locations"))?;

    let mut plan = plan_check_in(
        employee_id,
        point,
        &locations,
        profile.allow_offsite_checkin,
        payload.shift_id.into(),
        Utc::now(),
        &policy,
    )?;

    let inserted = repo::attendance::insert_open(&pool, &plan.record)
        .await
        .map_err(|e| internal(e, "Failed to store check-in"))?;
    let Some(id) = inserted else {
        return Ok(HttpResponse::Conflict().json(message("Already checked in")));
    };
    plan.record.id = id;

    info!(
        employee_id,
        record_id = plan.record.id,
        check_in_type = %plan.record.check_in_type,
        late_minutes = plan.record.late_minutes,
        "Checked in"
    );
    Ok(HttpResponse::Created().json(plan))
}

/// Check-out endpoint
#[utoipa::path(
    put,
    path = "/api/v1/attendance/check-out",
    request_body = CheckOutRequest,
    responses(
        (status = 200, description = "Checked out", body = AttendanceRecord),
        (status = 400, description = "Invalid coordinates", body = Object, example = json!({
            "message": "invalid input: longitude must be between -180 and 180"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "No employee profile"),
        (status = 404, description = "No open check-in", body = Object, example = json!({
            "message": "No open check-in found"
        })),
        (status = 409, description = "Record closed meanwhile"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
#[instrument(skip_all, fields(user_id = auth.user_id))]
pub async fn check_out(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    policy: web::Data<AttendancePolicy>,
    payload: web::Json<CheckOutRequest>,
) -> actix_web::Result<HttpResponse> {
    let employee_id = auth.require_employee()?;
    let point = Coordinate::new(payload.latitude, payload.longitude)?;

    let Some(mut record) = repo::attendance::find_open(&pool, employee_id)
        .await
        .map_err(|e| internal(e, "Failed to look up open record"))?
    else {
        return Ok(HttpResponse::NotFound().json(message("No open check-in found")));
    };

    let location = record_location(&pool, &record).await?;
    let history_before = record.edit_history.len();
    let hours = complete_check_out(&mut record, point, Utc::now(), location.as_ref(), &policy)?;

    let saved = repo::attendance::save(&pool, &record, RecordStatus::CheckedIn, history_before)
        .await
        .map_err(|e| internal(e, "Failed to store check-out"))?;
    if !saved {
        warn!(record_id = record.id, "Record closed before check-out was stored");
        return Ok(HttpResponse::Conflict().json(message("Record was closed in the meantime")));
    }

    info!(
        employee_id,
        record_id = record.id,
        total_hours = hours.total_hours,
        overtime_hours = hours.overtime_hours,
        "Checked out"
    );
    Ok(HttpResponse::Ok().json(record))
}

/// Which locations a point is inside, without checking in.
#[utoipa::path(
    get,
    path = "/api/v1/attendance/location-check",
    params(LocationQuery),
    responses(
        (status = 200, description = "Locations in range and the nearest one", body = LocationCheckResult),
        (status = 400, description = "Invalid coordinates"),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn location_check(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<LocationQuery>,
) -> actix_web::Result<HttpResponse> {
    let point = Coordinate::new(query.latitude, query.longitude)?;
    let allow_offsite = match auth.employee_id {
        Some(id) => active_profile(&pool, id).await?.is_some_and(|p| p.allow_offsite_checkin),
        None => false,
    };

    let locations = location_cache::active_locations(&pool)
        .await
        .map_err(|e| internal(e, "Failed to load locations"))?;
    let result = resolve(point, &locations, allow_offsite)?;
    Ok(HttpResponse::Ok().json(result))
}

/// The caller's own records, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/attendance/me",
    params(RecordsQuery),
    responses(
        (status = 200, description = "Attendance records", body = [AttendanceRecord]),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "No employee profile"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn my_records(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<RecordsQuery>,
) -> actix_web::Result<HttpResponse> {
    let employee_id = auth.require_employee()?;
    let limit = query.limit.unwrap_or(30).clamp(1, 100);

    let records = repo::attendance::list_for_employee(&pool, employee_id, limit)
        .await
        .map_err(|e| internal(e, "Failed to list attendance records"))?;
    Ok(HttpResponse::Ok().json(records))
}

#[utoipa::path(
    get,
    path = "/api/v1/attendance/records/{id}",
    params(
        ("id", Path, description = "Attendance record ID")
    ),
    responses(
        (status = 200, description = "Attendance record with edit history", body = AttendanceRecord),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not your record"),
        (status = 404, description = "Record not found"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
pub async fn get_record(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<HttpResponse> {
    let id = path.into_inner();
    let Some(record) = repo::attendance::find(&pool, id)
        .await
        .map_err(|e| internal(e, "Failed to load attendance record"))?
    else {
        return Ok(HttpResponse::NotFound().json(message("Record not found")));
    };

    if !auth.is_hr_or_admin() && auth.employee_id != Some(record.employee_id) {
        return Ok(HttpResponse::Forbidden().json(message("Not your record")));
    }
    Ok(HttpResponse::Ok().json(record))
}

/// Administrator correction. Every changed field lands in the edit history.
#[utoipa::path(
    patch,
    path = "/api/v1/attendance/records/{id}",
    params(
        ("id", Path, description = "Attendance record ID")
    ),
    request_body = EditRecordRequest,
    responses(
        (status = 200, description = "Record corrected", body = AttendanceRecord),
        (status = 400, description = "Invalid edit", body = Object, example = json!({
            "message": "invalid input: a reason is required for every edit"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "HR/Admin only"),
        (status = 404, description = "Record not found"),
        (status = 409, description = "Record changed meanwhile"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
#[instrument(skip_all, fields(user_id = auth.user_id))]
pub async fn edit_record(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    policy: web::Data<AttendancePolicy>,
    path: web::Path<u64>,
    payload: web::Json<EditRecordRequest>,
) -> actix_web::Result<HttpResponse> {
    auth.require_hr_or_admin()?;
    let id = path.into_inner();

    let Some(mut record) = repo::attendance::find(&pool, id)
        .await
        .map_err(|e| internal(e, "Failed to load attendance record"))?
    else {
        return Ok(HttpResponse::NotFound().json(message("Record not found")));
    };

    let location = record_location(&pool, &record).await?;
    let status_before = record.status;
    let history_before = record.edit_history.len();
    let edit = RecordEdit::from(payload.into_inner());

    apply_edit(&mut record, &edit, &auth.editor(), Utc::now(), location.as_ref(), &policy)?;

    let saved = repo::attendance::save(&pool, &record, status_before, history_before)
        .await
        .map_err(|e| internal(e, "Failed to store correction"))?;
    if !saved {
        return Ok(HttpResponse::Conflict().json(message("Record was modified in the meantime")));
    }

    info!(
        record_id = id,
        changes = record.edit_history.len() - history_before,
        "Attendance record corrected"
    );
    Ok(HttpResponse::Ok().json(record))
}

/// Split a record that runs past midnight into two days.
#[utoipa::path(
    post,
    path = "/api/v1/attendance/records/{id}/split",
    params(
        ("id", Path, description = "Attendance record ID")
    ),
    responses(
        (status = 201, description = "Record split at midnight", body = SplitResponse),
        (status = 400, description = "Record does not cross midnight"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "HR/Admin only"),
        (status = 404, description = "Record not found"),
        (status = 409, description = "Record is still open or changed meanwhile"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
#[instrument(skip_all, fields(user_id = auth.user_id))]
pub async fn split_record(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    policy: web::Data<AttendancePolicy>,
    path: web::Path<u64>,
) -> actix_web::Result<HttpResponse> {
    auth.require_hr_or_admin()?;
    let id = path.into_inner();

    let Some(mut record) = repo::attendance::find(&pool, id)
        .await
        .map_err(|e| internal(e, "Failed to load attendance record"))?
    else {
        return Ok(HttpResponse::NotFound().json(message("Record not found")));
    };

    let location = record_location(&pool, &record).await?;
    let status_before = record.status;
    let history_before = record.edit_history.len();

    let mut created = split_overnight(&mut record, &auth.editor(), Utc::now(), location.as_ref(), &policy)?;

    let Some(new_id) = repo::attendance::save_split(&pool, &record, status_before, history_before, &created)
        .await
        .map_err(|e| internal(e, "Failed to store split"))?
    else {
        return Ok(HttpResponse::Conflict().json(message("Record was modified in the meantime")));
    };
    created.id = new_id;

    info!(record_id = id, new_record_id = new_id, "Overnight record split");
    Ok(HttpResponse::Created().json(SplitResponse { original: record, created }))
}
