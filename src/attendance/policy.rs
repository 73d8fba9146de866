use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, NaiveTime, TimeZone, Utc};

use crate::model::attendance::RecordStatus;

/// Organization-wide knobs for the attendance calculations. Built once from
/// configuration and passed into every computation explicitly.
#[derive(Debug, Clone)]
pub struct AttendancePolicy {
    /// Hours per day counted as regular time; the rest is overtime.
    pub standard_hours: f64,
    /// Used when a record has no primary location to take break hours from.
    pub default_break_hours: f64,
    /// How far from a shift's start an auto-matched check-in may be.
    pub shift_match_window: Duration,
    /// Local wall-clock time at which open records are force-closed.
    pub auto_checkout_cutoff: NaiveTime,
    /// Status given to records closed by the sweep.
    pub auto_checkout_status: RecordStatus,
    /// Offset of the organization's local time from UTC.
    pub utc_offset: FixedOffset,
}

impl Default for AttendancePolicy {
    fn default() -> Self {
        Self {
            standard_hours: 8.0,
            default_break_hours: 1.0,
            shift_match_window: Duration::hours(4),
            auto_checkout_cutoff: NaiveTime::from_hms_opt(23, 59, 0).expect("23:59 is a valid time"),
            auto_checkout_status: RecordStatus::Pending,
            utc_offset: FixedOffset::east_opt(7 * 3600).expect("UTC+7 is a valid offset"),
        }
    }
}

impl AttendancePolicy {
    pub fn to_local(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        instant.with_timezone(&self.utc_offset).naive_local()
    }

    pub fn to_utc(&self, local: NaiveDateTime) -> DateTime<Utc> {
        Utc.from_utc_datetime(&(local - Duration::seconds(self.utc_offset.local_minus_utc() as i64)))
    }
}
