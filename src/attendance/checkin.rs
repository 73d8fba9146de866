use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::attendance::error::AttendanceError;
use crate::attendance::geofence::{LocationCheckResult, resolve};
use crate::attendance::hours::{HoursBreakdown, compute_hours};
use crate::attendance::policy::AttendancePolicy;
use crate::attendance::shift_matcher::{ShiftMatch, ShiftSelection, match_shift};
use crate::model::attendance::{AttendanceRecord, CheckInType, RecordStatus};
use crate::model::location::{Coordinate, Location};

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CheckInPlan {
    pub record: AttendanceRecord,
    pub geofence: LocationCheckResult,
    pub shift: Option<ShiftMatch>,
}

/// Build the `checked_in` record for an employee standing at `point`.
pub fn plan_check_in(
    employee_id: u64,
    point: Coordinate,
    locations: &[Location],
    allow_offsite: bool,
    selection: ShiftSelection,
    now_utc: DateTime<Utc>,
    policy: &AttendancePolicy,
) -> Result<CheckInPlan, AttendanceError> {
    let geofence = resolve(point, locations, allow_offsite)?;
    if !geofence.can_check_in {
        return Err(AttendanceError::OutsideGeofence {
            nearest_meters: geofence.nearest.as_ref().map(|n| n.distance_meters),
        });
    }

    let primary_location_id = geofence.primary().map(|p| p.location_id);
    let location = primary_location_id.and_then(|id| locations.iter().find(|loc| loc.id == id));

    let now_local = policy.to_local(now_utc);
    let shift = match location {
        Some(loc) if !loc.shifts.is_empty() => {
            Some(match_shift(&loc.shifts, selection, now_local, policy.shift_match_window)?)
        }
        _ => match selection {
            ShiftSelection::Explicit(shift_id) => return Err(AttendanceError::UnknownShift(shift_id)),
            ShiftSelection::AutoMatch => None,
        },
    };

    let check_in_type = if geofence.in_range.is_empty() {
        CheckInType::OutsideGeofence
    } else {
        CheckInType::WithinGeofence
    };

    let record = AttendanceRecord {
        id: 0,
        employee_id,
        check_in_time: now_utc,
        check_in_location: point,
        check_in_type,
        locations_within: geofence.in_range.iter().map(|l| l.location_id).collect(),
        primary_location_id,
        shift_id: shift.as_ref().map(|m| m.shift.id),
        check_out_time: None,
        check_out_location: None,
        regular_hours: 0.0,
        overtime_hours: 0.0,
        total_hours: 0.0,
        break_hours: 0.0,
        status: RecordStatus::CheckedIn,
        is_late: shift.as_ref().is_some_and(|m| m.is_late),
        late_minutes: shift.as_ref().map_or(0, |m| m.late_minutes),
        is_overnight_shift: false,
        auto_checkout: false,
        forgot_checkout: false,
        split_from_record_id: None,
        edit_history: Vec::new(),
    };

    Ok(CheckInPlan { record, geofence, shift })
}

/// Close an open record with a check-out made by the employee.
pub fn complete_check_out(
    record: &mut AttendanceRecord,
    point: Coordinate,
    now_utc: DateTime<Utc>,
    location: Option<&Location>,
    policy: &AttendancePolicy,
) -> Result<HoursBreakdown, AttendanceError> {
    if !record.is_open() {
        return Err(AttendanceError::InvalidState { record_id: record.id, status: record.status });
    }
    point.validate()?;

    let shift = match (location, record.shift_id) {
        (Some(loc), Some(shift_id)) => loc.shift(shift_id),
        _ => None,
    };
    let break_hours = location.map_or(policy.default_break_hours, |loc| loc.break_hours);
    let hours = compute_hours(
        policy.to_local(record.check_in_time),
        policy.to_local(now_utc),
        shift,
        break_hours,
        policy,
    )?;

    record.check_out_time = Some(now_utc);
    record.check_out_location = Some(point);
    record.regular_hours = hours.regular_hours;
    record.overtime_hours = hours.overtime_hours;
    record.total_hours = hours.total_hours;
    record.break_hours = hours.break_hours;
    record.is_overnight_shift = hours.is_overnight_shift;
    record.status = RecordStatus::Completed;

    Ok(hours)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::geofence::EARTH_RADIUS_METERS;
    use crate::model::location::fixtures::{location, shift};
    use chrono::{NaiveDate, NaiveDateTime};

    const CENTER: (f64, f64) = (13.7563, 100.5018);

    fn north_of(meters: f64) -> Coordinate {
        let d_lat = (meters / EARTH_RADIUS_METERS).to_degrees();
        Coordinate { latitude: CENTER.0 + d_lat, longitude: CENTER.1 }
    }

    fn local(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 10).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    fn office() -> Location {
        let mut site = location(1, CENTER.0, CENTER.1, 100.0);
        site.shifts = vec![shift(11, "Day", (10, 0), (18, 0), 15), shift(12, "Night", (22, 0), (6, 0), 15)];
        site
    }

    #[test]
    fn late_check_in_inside_geofence() {
        let policy = AttendancePolicy::default();
        let plan = plan_check_in(
            7,
            north_of(50.0),
            &[office()],
            false,
            ShiftSelection::AutoMatch,
            policy.to_utc(local(10, 20)),
            &policy,
        )
        .unwrap();

        let r = &plan.record;
        assert_eq!(r.status, RecordStatus::CheckedIn);
        assert_eq!(r.check_in_type, CheckInType::WithinGeofence);
        assert_eq!(r.locations_within, vec![1]);
        assert_eq!(r.primary_location_id, Some(1));
        assert_eq!(r.shift_id, Some(11));
        assert!(r.is_late);
        assert_eq!(r.late_minutes, 5);
    }

    #[test]
    fn outside_without_permission_is_refused() {
        let policy = AttendancePolicy::default();
        let err = plan_check_in(
            7,
            north_of(150.0),
            &[office()],
            false,
            ShiftSelection::AutoMatch,
            policy.to_utc(local(10, 0)),
            &policy,
        )
        .unwrap_err();

        match err {
            AttendanceError::OutsideGeofence { nearest_meters: Some(m) } => assert!((m - 150.0).abs() < 0.5),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn offsite_check_in_attributed_to_nearest() {
        let policy = AttendancePolicy::default();
        let plan = plan_check_in(
            7,
            north_of(2_000.0),
            &[office()],
            true,
            ShiftSelection::Explicit(11),
            policy.to_utc(local(9, 55)),
            &policy,
        )
        .unwrap();

        assert_eq!(plan.record.check_in_type, CheckInType::OutsideGeofence);
        assert!(plan.record.locations_within.is_empty());
        assert_eq!(plan.record.primary_location_id, Some(1));
        assert!(!plan.record.is_late);
    }

    #[test]
    fn no_shift_near_now_requires_explicit_choice() {
        let policy = AttendancePolicy::default();
        let err = plan_check_in(
            7,
            north_of(10.0),
            &[office()],
            false,
            ShiftSelection::AutoMatch,
            policy.to_utc(local(4, 0)),
            &policy,
        );
        // 04:00 is six hours from both 10:00 and 22:00
        assert_eq!(err.unwrap_err(), AttendanceError::NoApplicableShift);
    }

    #[test]
    fn location_without_shifts_skips_matching() {
        let policy = AttendancePolicy::default();
        let site = location(1, CENTER.0, CENTER.1, 100.0);
        let plan = plan_check_in(7, north_of(10.0), &[site.clone()], false, ShiftSelection::AutoMatch, Utc::now(), &policy)
            .unwrap();
        assert_eq!(plan.record.shift_id, None);
        assert!(plan.shift.is_none());

        let err = plan_check_in(7, north_of(10.0), &[site], false, ShiftSelection::Explicit(3), Utc::now(), &policy)
            .unwrap_err();
        assert_eq!(err, AttendanceError::UnknownShift(3));
    }

    #[test]
    fn check_out_completes_and_computes_hours() {
        let policy = AttendancePolicy::default();
        let site = office();
        let mut record = plan_check_in(
            7,
            north_of(20.0),
            &[site.clone()],
            false,
            ShiftSelection::Explicit(11),
            policy.to_utc(local(9, 0)),
            &policy,
        )
        .unwrap()
        .record;

        let hours = complete_check_out(&mut record, north_of(30.0), policy.to_utc(local(19, 30)), Some(&site), &policy)
            .unwrap();

        assert_eq!(hours.total_hours, 9.5);
        assert_eq!(record.regular_hours, 8.0);
        assert_eq!(record.overtime_hours, 1.5);
        assert_eq!(record.status, RecordStatus::Completed);
        assert!(record.check_out_location.is_some());

        let again = complete_check_out(&mut record, north_of(30.0), policy.to_utc(local(20, 0)), Some(&site), &policy);
        assert!(matches!(again, Err(AttendanceError::InvalidState { .. })));
    }
}
