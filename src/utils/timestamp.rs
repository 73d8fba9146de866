use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A point in time accepted from clients or imported documents.
///
/// Clients and older exports send timestamps in several shapes:
/// RFC 3339 strings, epoch seconds, and `{ "seconds": .. }` /
/// `{ "_seconds": .. }` objects. They are all folded into one
/// `DateTime<Utc>` here so nothing past the boundary has to care.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTimestamp")]
pub struct Timestamp(pub DateTime<Utc>);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Text(String),
    EpochSeconds(i64),
    Object {
        #[serde(alias = "_seconds")]
        seconds: i64,
        #[serde(default, alias = "_nanoseconds")]
        nanoseconds: u32,
    },
}

impl TryFrom<RawTimestamp> for Timestamp {
    type Error = String;

    fn try_from(raw: RawTimestamp) -> Result<Self, Self::Error> {
        let parsed = match raw {
            RawTimestamp::Text(text) => DateTime::parse_from_rfc3339(text.trim())
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| format!("invalid timestamp '{text}': {e}"))?,
            RawTimestamp::EpochSeconds(secs) => from_epoch(secs, 0)?,
            RawTimestamp::Object { seconds, nanoseconds } => from_epoch(seconds, nanoseconds)?,
        };
        Ok(Timestamp(parsed))
    }
}

fn from_epoch(seconds: i64, nanos: u32) -> Result<DateTime<Utc>, String> {
    DateTime::from_timestamp(seconds, nanos).ok_or_else(|| format!("epoch seconds {seconds} out of range"))
}

impl From<Timestamp> for DateTime<Utc> {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}
