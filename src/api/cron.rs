use actix_web::{HttpRequest, HttpResponse, error::ErrorInternalServerError, web};
use chrono::Utc;
use sqlx::MySqlPool;
use tracing::{error, warn};

use crate::api::message;
use crate::attendance::AttendancePolicy;
use crate::attendance::sweep::SweepReport;
use crate::config::Config;
use crate::jobs::auto_checkout::sweep_once;

fn bearer(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

/// Close every record left open past the daily cutoff. Called by an external
/// scheduler with the shared cron secret.
#[utoipa::path(
    post,
    path = "/cron/auto-checkout",
    responses(
        (status = 200, description = "Sweep finished; per-record failures are listed", body = SweepReport),
        (status = 401, description = "Wrong or missing cron secret", body = Object, example = json!({
            "message": "Unauthorized"
        })),
        (status = 500, description = "Sweep could not start")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Cron"
)]
pub async fn auto_checkout(
    req: HttpRequest,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    policy: web::Data<AttendancePolicy>,
) -> actix_web::Result<HttpResponse> {
    if config.cron_secret.is_empty() || bearer(&req) != Some(config.cron_secret.as_str()) {
        warn!("Rejected auto checkout trigger");
        return Ok(HttpResponse::Unauthorized().json(message("Unauthorized")));
    }

    let report = sweep_once(&pool, &policy, Utc::now()).await.map_err(|e| {
        error!(error = ?e, "Auto checkout run failed");
        ErrorInternalServerError("Internal Server Error")
    })?;

    Ok(HttpResponse::Ok().json(report))
}
