use chrono::NaiveDateTime;
use serde::Serialize;
use utoipa::ToSchema;

use crate::attendance::error::AttendanceError;
use crate::attendance::policy::AttendancePolicy;
use crate::model::location::Shift;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, ToSchema)]
pub struct HoursBreakdown {
    #[schema(example = 8.0)]
    pub regular_hours: f64,
    #[schema(example = 1.5)]
    pub overtime_hours: f64,
    #[schema(example = 9.5)]
    pub total_hours: f64,
    #[schema(example = 1.0)]
    pub break_hours: f64,
    pub is_overnight_shift: bool,
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Worked hours between two local times.
///
/// Rounding is applied to the reported fields only.
pub fn compute_hours(
    check_in: NaiveDateTime,
    check_out: NaiveDateTime,
    shift: Option<&Shift>,
    break_hours: f64,
    policy: &AttendancePolicy,
) -> Result<HoursBreakdown, AttendanceError> {
    if check_out < check_in {
        return Err(AttendanceError::InvalidInput(format!(
            "check-out {check_out} is before check-in {check_in}"
        )));
    }
    if !(break_hours.is_finite() && break_hours >= 0.0) {
        return Err(AttendanceError::InvalidInput(format!("break hours {break_hours} must be 0 or more")));
    }

    let elapsed = (check_out - check_in).num_seconds() as f64 / 3600.0;
    let total = (elapsed - break_hours).max(0.0);
    let regular = total.min(policy.standard_hours);
    let overtime = (total - policy.standard_hours).max(0.0);

    let is_overnight_shift = shift.is_some_and(Shift::is_overnight) && check_out.date() > check_in.date();

    Ok(HoursBreakdown {
        regular_hours: round2(regular),
        overtime_hours: round2(overtime),
        total_hours: round2(total),
        break_hours,
        is_overnight_shift,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::location::fixtures::shift;
    use chrono::{Duration, NaiveDate};

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, day).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn nine_to_seven_thirty_with_one_hour_break() {
        let h = compute_hours(at(10, 9, 0), at(10, 19, 30), None, 1.0, &AttendancePolicy::default()).unwrap();
        assert_eq!(h.total_hours, 9.5);
        assert_eq!(h.regular_hours, 8.0);
        assert_eq!(h.overtime_hours, 1.5);
        assert!(!h.is_overnight_shift);
    }

    #[test]
    fn short_day_floors_at_zero() {
        let h = compute_hours(at(10, 9, 0), at(10, 9, 30), None, 1.0, &AttendancePolicy::default()).unwrap();
        assert_eq!(h.total_hours, 0.0);
        assert_eq!(h.regular_hours, 0.0);
        assert_eq!(h.overtime_hours, 0.0);
    }

    #[test]
    fn standard_hours_come_from_policy() {
        let policy = AttendancePolicy { standard_hours: 7.0, ..AttendancePolicy::default() };
        let h = compute_hours(at(10, 9, 0), at(10, 17, 0), None, 0.0, &policy).unwrap();
        assert_eq!(h.regular_hours, 7.0);
        assert_eq!(h.overtime_hours, 1.0);
    }

    #[test]
    fn monotonic_in_check_out_and_parts_sum_to_total() {
        let policy = AttendancePolicy::default();
        let check_in = at(10, 8, 17);
        let mut previous = 0.0;
        for minutes in (0..=16 * 60).step_by(7) {
            let check_out = check_in + Duration::minutes(minutes);
            let h = compute_hours(check_in, check_out, None, 0.75, &policy).unwrap();
            assert!(h.total_hours >= previous, "total dropped at +{minutes}m");
            assert!((h.regular_hours + h.overtime_hours - h.total_hours).abs() <= 0.01 + f64::EPSILON);
            previous = h.total_hours;
        }
    }

    #[test]
    fn overnight_flag_needs_overnight_shift_and_next_day_checkout() {
        let policy = AttendancePolicy::default();
        let night = shift(1, "Night", (22, 0), (6, 0), 0);
        let day = shift(2, "Day", (9, 0), (17, 0), 0);

        let h = compute_hours(at(10, 22, 0), at(11, 6, 0), Some(&night), 0.0, &policy).unwrap();
        assert!(h.is_overnight_shift);
        assert_eq!(h.total_hours, 8.0);

        let h = compute_hours(at(10, 22, 0), at(10, 23, 50), Some(&night), 0.0, &policy).unwrap();
        assert!(!h.is_overnight_shift);

        let h = compute_hours(at(10, 9, 0), at(11, 1, 0), Some(&day), 0.0, &policy).unwrap();
        assert!(!h.is_overnight_shift);
    }

    #[test]
    fn rejects_reversed_times_and_bad_breaks() {
        let policy = AttendancePolicy::default();
        assert!(compute_hours(at(10, 18, 0), at(10, 9, 0), None, 0.0, &policy).is_err());
        assert!(compute_hours(at(10, 9, 0), at(10, 18, 0), None, -1.0, &policy).is_err());
        assert!(compute_hours(at(10, 9, 0), at(10, 18, 0), None, f64::NAN, &policy).is_err());
    }

    #[test]
    fn rounds_to_two_decimals() {
        assert_eq!(round2(1.005_1), 1.01);
        assert_eq!(round2(7.994), 7.99);
        let h = compute_hours(at(10, 9, 0), at(10, 9, 20), None, 0.0, &AttendancePolicy::default()).unwrap();
        assert_eq!(h.total_hours, 0.33);
    }
}
