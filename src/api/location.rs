use actix_web::{HttpResponse, web};
use chrono::NaiveTime;
use serde::Deserialize;
use sqlx::MySqlPool;
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};

use crate::api::{internal, message};
use crate::attendance::{AttendanceError, AttendancePolicy};
use crate::auth::auth::AuthUser;
use crate::model::location::{Coordinate, Location, Shift, WeeklyHours};
use crate::repo;
use crate::repo::location::LocationUpdate;
use crate::utils::clock::hhmm;
use crate::utils::location_cache;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ShiftInput {
    /// Existing shift to keep; leave out for a new one.
    #[schema(example = 1, nullable = true)]
    pub id: Option<u64>,
    #[schema(example = "Morning")]
    pub name: String,
    #[serde(with = "hhmm")]
    #[schema(value_type = String, example = "10:00")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    #[schema(value_type = String, example = "18:00")]
    pub end_time: NaiveTime,
    #[serde(default)]
    #[schema(example = 15)]
    pub grace_minutes: u32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LocationInput {
    #[schema(example = "Head office")]
    pub name: String,
    #[serde(default)]
    #[schema(example = "1 Silom Rd, Bangkok")]
    pub address: String,
    pub center: Coordinate,
    #[schema(example = 100.0)]
    pub radius_meters: f64,
    #[serde(default)]
    pub working_hours: WeeklyHours,
    #[serde(default)]
    pub shifts: Vec<ShiftInput>,
    /// Falls back to the configured default break when left out.
    #[schema(example = 1.0, nullable = true)]
    pub break_hours: Option<f64>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl LocationInput {
    fn into_location(self, id: u64, default_break_hours: f64) -> Location {
        Location {
            id,
            name: self.name.trim().to_string(),
            address: self.address,
            center: self.center,
            radius_meters: self.radius_meters,
            working_hours: self.working_hours,
            shifts: self
                .shifts
                .into_iter()
                .map(|s| Shift {
                    id: s.id.unwrap_or(0),
                    name: s.name.trim().to_string(),
                    start_time: s.start_time,
                    end_time: s.end_time,
                    grace_minutes: s.grace_minutes,
                })
                .collect(),
            break_hours: self.break_hours.unwrap_or(default_break_hours),
            is_active: self.is_active,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LocationFilter {
    /// HR/Admin only.
    pub include_inactive: Option<bool>,
}

#[utoipa::path(
    get,
    path = "/api/v1/locations",
    params(LocationFilter),
    responses(
        (status = 200, description = "Registered locations with their shifts", body = [Location]),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Location"
)]
pub async fn list_locations(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<LocationFilter>,
) -> actix_web::Result<HttpResponse> {
    if query.include_inactive.unwrap_or(false) && auth.is_hr_or_admin() {
        let all = repo::location::fetch_all(&pool, false)
            .await
            .map_err(|e| internal(e, "Failed to list locations"))?;
        return Ok(HttpResponse::Ok().json(all));
    }

    let active = location_cache::active_locations(&pool)
        .await
        .map_err(|e| internal(e, "Failed to list locations"))?;
    Ok(HttpResponse::Ok().json(active.as_ref()))
}

#[utoipa::path(
    get,
    path = "/api/v1/locations/{id}",
    params(
        ("id", Path, description = "Location ID")
    ),
    responses(
        (status = 200, description = "Location", body = Location),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Location not found", body = Object, example = json!({
            "message": "Location not found"
        })),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Location"
)]
pub async fn get_location(
    _auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<HttpResponse> {
    match repo::location::fetch_one(&pool, path.into_inner())
        .await
        .map_err(|e| internal(e, "Failed to load location"))?
    {
        Some(location) => Ok(HttpResponse::Ok().json(location)),
        None => Ok(HttpResponse::NotFound().json(message("Location not found"))),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/locations",
    request_body = LocationInput,
    responses(
        (status = 201, description = "Location created", body = Location),
        (status = 400, description = "Invalid location", body = Object, example = json!({
            "message": "invalid input: radius must be greater than 0"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin only"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Location"
)]
#[instrument(skip_all, fields(user_id = auth.user_id))]
pub async fn create_location(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    policy: web::Data<AttendancePolicy>,
    payload: web::Json<LocationInput>,
) -> actix_web::Result<HttpResponse> {
    auth.require_admin()?;

    let mut location = payload.into_inner().into_location(0, policy.default_break_hours);
    location.validate()?;

    location.id = repo::location::insert(&pool, &location)
        .await
        .map_err(|e| internal(e, "Failed to create location"))?;
    location_cache::invalidate().await;

    // Shift ids are assigned by the database.
    let stored = repo::location::fetch_one(&pool, location.id)
        .await
        .map_err(|e| internal(e, "Failed to reload location"))?
        .unwrap_or(location);

    info!(location_id = stored.id, shifts = stored.shifts.len(), "Location created");
    Ok(HttpResponse::Created().json(stored))
}

#[utoipa::path(
    put,
    path = "/api/v1/locations/{id}",
    params(
        ("id", Path, description = "Location ID")
    ),
    request_body = LocationInput,
    responses(
        (status = 200, description = "Location replaced", body = Location),
        (status = 400, description = "Invalid location or a shift id not configured here", body = Object, example = json!({
            "message": "shift 12 is not configured at this location"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Location not found"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Location"
)]
#[instrument(skip_all, fields(user_id = auth.user_id))]
pub async fn update_location(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    policy: web::Data<AttendancePolicy>,
    path: web::Path<u64>,
    payload: web::Json<LocationInput>,
) -> actix_web::Result<HttpResponse> {
    auth.require_admin()?;
    let id = path.into_inner();

    let location = payload.into_inner().into_location(id, policy.default_break_hours);
    location.validate()?;

    let outcome = repo::location::update(&pool, &location)
        .await
        .map_err(|e| internal(e, "Failed to update location"))?;
    match outcome {
        LocationUpdate::Updated => {}
        LocationUpdate::NotFound => return Ok(HttpResponse::NotFound().json(message("Location not found"))),
        LocationUpdate::UnknownShift(shift_id) => return Err(AttendanceError::UnknownShift(shift_id).into()),
    }
    location_cache::invalidate().await;

    let stored = repo::location::fetch_one(&pool, id)
        .await
        .map_err(|e| internal(e, "Failed to reload location"))?
        .unwrap_or(location);

    info!(location_id = id, "Location updated");
    Ok(HttpResponse::Ok().json(stored))
}

/// Deactivate a location. Existing records keep their reference to it.
#[utoipa::path(
    delete,
    path = "/api/v1/locations/{id}",
    params(
        ("id", Path, description = "Location ID")
    ),
    responses(
        (status = 200, description = "Location deactivated", body = Object, example = json!({
            "message": "Location deactivated"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Location not found"),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Location"
)]
pub async fn delete_location(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> actix_web::Result<HttpResponse> {
    auth.require_admin()?;
    let id = path.into_inner();

    let found = repo::location::deactivate(&pool, id)
        .await
        .map_err(|e| internal(e, "Failed to deactivate location"))?;
    if !found {
        return Ok(HttpResponse::NotFound().json(message("Location not found")));
    }
    location_cache::invalidate().await;

    info!(location_id = id, "Location deactivated");
    Ok(HttpResponse::Ok().json(message("Location deactivated")))
}
