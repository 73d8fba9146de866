pub mod attendance;
pub mod cron;
pub mod location;

use actix_web::error::ErrorInternalServerError;
use serde_json::json;

/// Log a storage failure and hide the details from the client.
pub(crate) fn internal(e: sqlx::Error, context: &'static str) -> actix_web::Error {
    tracing::error!(error = %e, "{context}");
    ErrorInternalServerError("Internal Server Error")
}

pub(crate) fn message(text: impl Into<String>) -> serde_json::Value {
    json!({ "message": text.into() })
}
