use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::attendance::error::AttendanceError;
use crate::utils::clock::hhmm;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "latitude": 13.7563, "longitude": 100.5018 }))]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, AttendanceError> {
        let point = Self { latitude, longitude };
        point.validate()?;
        Ok(point)
    }

    pub fn validate(&self) -> Result<(), AttendanceError> {
        let ok = self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude);

        if ok {
            Ok(())
        } else {
            Err(AttendanceError::InvalidInput(format!(
                "coordinate ({}, {}) is out of range",
                self.latitude, self.longitude
            )))
        }
    }
}

/// Named working window at a location. `end_time < start_time` means the
/// shift finishes on the following day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Shift {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = "Morning")]
    pub name: String,
    #[serde(with = "hhmm")]
    #[schema(value_type = String, example = "10:00")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    #[schema(value_type = String, example = "18:00")]
    pub end_time: NaiveTime,
    #[schema(example = 15)]
    pub grace_minutes: u32,
}

impl Shift {
    pub fn is_overnight(&self) -> bool {
        self.end_time < self.start_time
    }

    pub fn validate(&self) -> Result<(), AttendanceError> {
        if self.name.trim().is_empty() {
            return Err(AttendanceError::InvalidInput("shift name must not be empty".into()));
        }
        if self.start_time == self.end_time {
            return Err(AttendanceError::InvalidInput(format!(
                "shift '{}' starts and ends at the same time",
                self.name
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DayHours {
    #[serde(with = "hhmm")]
    #[schema(value_type = String, example = "09:00")]
    pub open: NaiveTime,
    #[serde(with = "hhmm")]
    #[schema(value_type = String, example = "18:00")]
    pub close: NaiveTime,
}

/// Opening hours per weekday; `None` means closed that day.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct WeeklyHours {
    pub monday: Option<DayHours>,
    pub tuesday: Option<DayHours>,
    pub wednesday: Option<DayHours>,
    pub thursday: Option<DayHours>,
    pub friday: Option<DayHours>,
    pub saturday: Option<DayHours>,
    pub sunday: Option<DayHours>,
}

impl WeeklyHours {
    pub fn for_day(&self, day: Weekday) -> Option<&DayHours> {
        match day {
            Weekday::Mon => self.monday.as_ref(),
            Weekday::Tue => self.tuesday.as_ref(),
            Weekday::Wed => self.wednesday.as_ref(),
            Weekday::Thu => self.thursday.as_ref(),
            Weekday::Fri => self.friday.as_ref(),
            Weekday::Sat => self.saturday.as_ref(),
            Weekday::Sun => self.sunday.as_ref(),
        }
    }

    pub fn validate(&self) -> Result<(), AttendanceError> {
        let days = [
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
            Weekday::Sat,
            Weekday::Sun,
        ];
        for day in days {
            if let Some(hours) = self.for_day(day) {
                if hours.open >= hours.close {
                    return Err(AttendanceError::InvalidInput(format!(
                        "{day:?}: open time must be before close time"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Location {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = "Head office")]
    pub name: String,
    #[schema(example = "1 Silom Rd, Bangkok")]
    pub address: String,
    pub center: Coordinate,
    #[schema(example = 100.0)]
    pub radius_meters: f64,
    pub working_hours: WeeklyHours,
    /// Declaration order matters: it breaks ties during shift matching.
    pub shifts: Vec<Shift>,
    #[schema(example = 1.0)]
    pub break_hours: f64,
    pub is_active: bool,
}

impl Location {
    pub fn shift(&self, shift_id: u64) -> Option<&Shift> {
        self.shifts.iter().find(|s| s.id == shift_id)
    }

    pub fn validate(&self) -> Result<(), AttendanceError> {
        if self.name.trim().is_empty() {
            return Err(AttendanceError::InvalidInput("location name must not be empty".into()));
        }
        self.center.validate()?;
        if !(self.radius_meters.is_finite() && self.radius_meters > 0.0) {
            return Err(AttendanceError::InvalidInput("radius must be greater than 0".into()));
        }
        if !(self.break_hours.is_finite() && self.break_hours >= 0.0) {
            return Err(AttendanceError::InvalidInput("break hours must be 0 or more".into()));
        }
        self.working_hours.validate()?;
        for shift in &self.shifts {
            shift.validate()?;
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn overnight_when_end_precedes_start() {
        assert!(shift(1, "Night", (22, 0), (6, 0), 0).is_overnight());
        assert!(!shift(2, "Day", (10, 0), (18, 0), 15).is_overnight());
    }

    #[test]
    fn rejects_non_positive_radius() {
        let mut loc = location(1, 13.7563, 100.5018, 0.0);
        assert!(loc.validate().is_err());
        loc.radius_meters = -5.0;
        assert!(loc.validate().is_err());
        loc.radius_meters = 50.0;
        assert!(loc.validate().is_ok());
    }

    #[test]
    fn rejects_inverted_opening_hours() {
        let mut loc = location(1, 13.7563, 100.5018, 100.0);
        loc.working_hours.friday = Some(DayHours { open: time(18, 0), close: time(9, 0) });
        assert!(loc.validate().is_err());
    }

    #[test]
    fn rejects_zero_length_shift() {
        let mut loc = location(1, 13.7563, 100.5018, 100.0);
        loc.shifts.push(shift(1, "Broken", (9, 0), (9, 0), 0));
        assert!(loc.validate().is_err());
    }

    #[test]
    fn shift_times_round_trip_as_hhmm() {
        let json = r#"{"id":3,"name":"Late","start_time":"13:30","end_time":"22:00","grace_minutes":10}"#;
        let parsed: Shift = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.start_time, time(13, 30));
        assert_eq!(serde_json::to_string(&parsed).unwrap(), json);
    }

    #[test]
    fn coordinate_bounds() {
        assert!(Coordinate::new(91.0, 0.0).is_err());
        assert!(Coordinate::new(0.0, f64::NAN).is_err());
        assert!(Coordinate::new(13.7563, 100.5018).is_ok());
    }
}
