use chrono::NaiveTime;

use crate::attendance::error::AttendanceError;

/// Parse a local wall-clock time in `HH:MM` form (seconds are not accepted).
pub fn parse_hhmm(value: &str) -> Result<NaiveTime, AttendanceError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|_| AttendanceError::InvalidInput(format!("malformed time '{value}', expected HH:MM")))
}

pub fn format_hhmm(time: &NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

/// Serde adapter for `NaiveTime` fields exchanged as `"HH:MM"`.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_hhmm(time))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_hhmm(&raw).map_err(D::Error::custom)
    }
}
