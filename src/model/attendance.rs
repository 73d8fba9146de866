use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

use crate::model::location::Coordinate;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RecordStatus {
    CheckedIn,
    Completed,
    /// Closed by the auto-checkout sweep, waiting for an administrator to confirm.
    Pending,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CheckInType {
    WithinGeofence,
    OutsideGeofence,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EditEntry {
    #[schema(example = "system")]
    pub editor: String,
    #[schema(example = "2026-01-01T16:59:00Z", format = "date-time", value_type = String)]
    pub edited_at: DateTime<Utc>,
    #[schema(example = "check_out_time")]
    pub field: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    #[schema(example = "auto checkout at daily cutoff")]
    pub reason: String,
}

/// One check-in/check-out pair for one employee.
///
/// `id` is 0 until the record is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AttendanceRecord {
    pub id: u64,
    pub employee_id: u64,

    #[schema(example = "2026-01-01T02:00:00Z", format = "date-time", value_type = String)]
    pub check_in_time: DateTime<Utc>,
    pub check_in_location: Coordinate,
    pub check_in_type: CheckInType,
    pub locations_within: Vec<u64>,
    pub primary_location_id: Option<u64>,
    pub shift_id: Option<u64>,

    #[schema(example = "2026-01-01T11:00:00Z", format = "date-time", value_type = String, nullable = true)]
    pub check_out_time: Option<DateTime<Utc>>,
    pub check_out_location: Option<Coordinate>,

    pub regular_hours: f64,
    pub overtime_hours: f64,
    pub total_hours: f64,
    pub break_hours: f64,

    pub status: RecordStatus,
    pub is_late: bool,
    pub late_minutes: i64,
    pub is_overnight_shift: bool,
    pub auto_checkout: bool,
    pub forgot_checkout: bool,
    pub split_from_record_id: Option<u64>,

    pub edit_history: Vec<EditEntry>,
}

impl AttendanceRecord {
    pub fn is_open(&self) -> bool {
        self.status == RecordStatus::CheckedIn
    }

    pub fn record_edit(
        &mut self,
        editor: &str,
        at: DateTime<Utc>,
        field: &str,
        old_value: Option<String>,
        new_value: Option<String>,
        reason: &str,
    ) {
        self.edit_history.push(EditEntry {
            editor: editor.to_string(),
            edited_at: at,
            field: field.to_string(),
            old_value,
            new_value,
            reason: reason.to_string(),
        });
    }
}
