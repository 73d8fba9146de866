use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::attendance::error::AttendanceError;
use crate::model::location::Shift;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShiftSelection {
    Explicit(u64),
    AutoMatch,
}

impl From<Option<u64>> for ShiftSelection {
    fn from(shift_id: Option<u64>) -> Self {
        shift_id.map_or(ShiftSelection::AutoMatch, ShiftSelection::Explicit)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ShiftMatch {
    pub shift: Shift,
    #[schema(value_type = String, example = "2026-01-01T10:00:00")]
    pub starts_at: NaiveDateTime,
    #[schema(value_type = String, example = "2026-01-01T10:15:00")]
    pub grace_ends_at: NaiveDateTime,
    /// Falls on the next day for overnight shifts.
    #[schema(value_type = String, example = "2026-01-01T18:00:00")]
    pub ends_at: NaiveDateTime,
    pub is_late: bool,
    #[schema(example = 5)]
    pub late_minutes: i64,
}

/// The occurrence of `shift`'s start (yesterday, today or tomorrow) closest to `now`.
fn nearest_start(shift: &Shift, now: NaiveDateTime) -> NaiveDateTime {
    let today = now.date().and_time(shift.start_time);
    [today - Duration::days(1), today, today + Duration::days(1)]
        .into_iter()
        .min_by_key(|start| (*start - now).num_seconds().abs())
        .unwrap_or(today)
}

/// The occurrence of a pre-selected `shift` that `now` belongs to.
///
/// Today's start once it has passed, however late. Before today's start,
/// yesterday's occurrence while it is still running (overnight shifts),
/// otherwise today's start as an early arrival.
fn selected_start(shift: &Shift, now: NaiveDateTime) -> NaiveDateTime {
    let today = now.date().and_time(shift.start_time);
    if now >= today {
        return today;
    }

    let yesterday = today - Duration::days(1);
    if now < occurrence_end(shift, yesterday) { yesterday } else { today }
}

fn occurrence_end(shift: &Shift, starts_at: NaiveDateTime) -> NaiveDateTime {
    let ends_at = starts_at.date().and_time(shift.end_time);
    if shift.is_overnight() { ends_at + Duration::days(1) } else { ends_at }
}

/// Minutes past the grace period, any started minute counting as a full one.
fn minutes_late(late: Duration) -> i64 {
    let whole = late.num_minutes();
    if late > Duration::minutes(whole) { whole + 1 } else { whole }
}

fn build_match(shift: &Shift, starts_at: NaiveDateTime, now: NaiveDateTime) -> ShiftMatch {
    let grace_ends_at = starts_at + Duration::minutes(shift.grace_minutes as i64);
    let ends_at = occurrence_end(shift, starts_at);

    let late_minutes = if now > grace_ends_at { minutes_late(now - grace_ends_at) } else { 0 };
    let is_late = late_minutes > 0;

    ShiftMatch { shift: shift.clone(), starts_at, grace_ends_at, ends_at, is_late, late_minutes }
}

/// Pick the shift a check-in at local time `now` belongs to and work out lateness.
///
/// Auto-matching takes the shift whose start is nearest to `now` by absolute
/// difference, as long as it lies within `window`; equal distances go to the
/// shift declared first.
pub fn match_shift(
    shifts: &[Shift],
    selection: ShiftSelection,
    now: NaiveDateTime,
    window: Duration,
) -> Result<ShiftMatch, AttendanceError> {
    match selection {
        ShiftSelection::Explicit(shift_id) => {
            let shift = shifts
                .iter()
                .find(|s| s.id == shift_id)
                .ok_or(AttendanceError::UnknownShift(shift_id))?;
            Ok(build_match(shift, selected_start(shift, now), now))
        }
        ShiftSelection::AutoMatch => {
            let mut best: Option<(&Shift, NaiveDateTime, i64)> = None;
            for shift in shifts {
                let start = nearest_start(shift, now);
                let gap = (start - now).num_seconds().abs();
                if gap > window.num_seconds() {
                    continue;
                }
                // strict `<` keeps the earlier declaration on ties
                if best.map_or(true, |(_, _, best_gap)| gap < best_gap) {
                    best = Some((shift, start, gap));
                }
            }

            best.map(|(shift, start, _)| build_match(shift, start, now))
                .ok_or(AttendanceError::NoApplicableShift)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::location::fixtures::shift;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 10).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    fn window() -> Duration {
        Duration::hours(4)
    }

    #[test]
    fn late_after_grace_period() {
        let shifts = vec![shift(1, "Day", (10, 0), (18, 0), 15)];
        let m = match_shift(&shifts, ShiftSelection::AutoMatch, at(10, 20), window()).unwrap();
        assert_eq!(m.shift.id, 1);
        assert!(m.is_late);
        assert_eq!(m.late_minutes, 5);
        assert_eq!(m.grace_ends_at, at(10, 15));
    }

    #[test]
    fn on_time_within_grace() {
        let shifts = vec![shift(1, "Day", (10, 0), (18, 0), 15)];
        for now in [at(9, 40), at(10, 0), at(10, 15)] {
            let m = match_shift(&shifts, ShiftSelection::AutoMatch, now, window()).unwrap();
            assert!(!m.is_late, "{now}");
            assert_eq!(m.late_minutes, 0);
        }
    }

    #[test]
    fn picks_nearest_start() {
        let shifts = vec![
            shift(1, "Morning", (6, 0), (14, 0), 0),
            shift(2, "Day", (9, 0), (17, 0), 0),
            shift(3, "Evening", (14, 0), (22, 0), 0),
        ];
        let m = match_shift(&shifts, ShiftSelection::AutoMatch, at(8, 10), window()).unwrap();
        assert_eq!(m.shift.id, 2);
        let m = match_shift(&shifts, ShiftSelection::AutoMatch, at(13, 0), window()).unwrap();
        assert_eq!(m.shift.id, 3);
    }

    #[test]
    fn ties_go_to_first_declared() {
        let shifts = vec![
            shift(7, "Early", (8, 0), (16, 0), 0),
            shift(3, "Late", (10, 0), (18, 0), 0),
        ];
        let m = match_shift(&shifts, ShiftSelection::AutoMatch, at(9, 0), window()).unwrap();
        assert_eq!(m.shift.id, 7);
    }

    #[test]
    fn nothing_inside_window() {
        let shifts = vec![shift(1, "Day", (9, 0), (17, 0), 0)];
        let err = match_shift(&shifts, ShiftSelection::AutoMatch, at(15, 0), window()).unwrap_err();
        assert_eq!(err, AttendanceError::NoApplicableShift);
        let err = match_shift(&[], ShiftSelection::AutoMatch, at(9, 0), window()).unwrap_err();
        assert_eq!(err, AttendanceError::NoApplicableShift);
    }

    #[test]
    fn explicit_selection_ignores_window() {
        let shifts = vec![shift(1, "Day", (9, 0), (17, 0), 10), shift(2, "Late", (13, 0), (21, 0), 0)];
        let m = match_shift(&shifts, ShiftSelection::Explicit(1), at(15, 0), window()).unwrap();
        assert_eq!(m.shift.id, 1);
        assert!(m.is_late);
        assert_eq!(m.late_minutes, 350);
    }

    #[test]
    fn explicit_unknown_shift() {
        let shifts = vec![shift(1, "Day", (9, 0), (17, 0), 0)];
        let err = match_shift(&shifts, ShiftSelection::Explicit(99), at(9, 0), window()).unwrap_err();
        assert_eq!(err, AttendanceError::UnknownShift(99));
    }

    #[test]
    fn overnight_shift_ends_next_day() {
        let shifts = vec![shift(5, "Night", (22, 0), (6, 0), 10)];
        let m = match_shift(&shifts, ShiftSelection::AutoMatch, at(21, 50), window()).unwrap();
        assert_eq!(m.starts_at, at(22, 0));
        assert_eq!(m.ends_at, at(6, 0) + Duration::days(1));
        assert!(!m.is_late);
    }

    #[test]
    fn start_shortly_after_midnight_matches_previous_day() {
        let shifts = vec![shift(5, "Night", (23, 30), (7, 30), 15)];
        // 00:10 on the 10th belongs to the shift that started 23:30 on the 9th.
        let m = match_shift(&shifts, ShiftSelection::AutoMatch, at(0, 10), window()).unwrap();
        assert_eq!(m.starts_at, at(23, 30) - Duration::days(1));
        assert!(m.is_late);
        assert_eq!(m.late_minutes, 25);
        assert_eq!(m.ends_at, at(7, 30));
    }

    #[test]
    fn explicit_shift_stays_on_todays_start_when_very_late() {
        let shifts = vec![shift(1, "Day", (8, 0), (17, 0), 10)];
        let m = match_shift(&shifts, ShiftSelection::Explicit(1), at(20, 30), window()).unwrap();
        assert_eq!(m.starts_at, at(8, 0));
        assert!(m.is_late);
        assert_eq!(m.late_minutes, 740);
    }

    #[test]
    fn explicit_shift_early_arrival_is_on_time() {
        let shifts = vec![shift(1, "Day", (9, 0), (17, 0), 10)];
        let m = match_shift(&shifts, ShiftSelection::Explicit(1), at(7, 45), window()).unwrap();
        assert_eq!(m.starts_at, at(9, 0));
        assert!(!m.is_late);
        assert_eq!(m.late_minutes, 0);
    }

    #[test]
    fn explicit_overnight_shift_still_running_uses_previous_start() {
        let shifts = vec![shift(5, "Night", (22, 0), (6, 0), 15)];
        let m = match_shift(&shifts, ShiftSelection::Explicit(5), at(3, 0), window()).unwrap();
        assert_eq!(m.starts_at, at(22, 0) - Duration::days(1));
        assert_eq!(m.ends_at, at(6, 0));
        assert_eq!(m.late_minutes, 285);

        // once it has ended, the next night is the one being arrived for
        let m = match_shift(&shifts, ShiftSelection::Explicit(5), at(7, 0), window()).unwrap();
        assert_eq!(m.starts_at, at(22, 0));
        assert!(!m.is_late);
    }

    #[test]
    fn seconds_past_grace_count_as_a_started_minute() {
        let shifts = vec![shift(1, "Day", (10, 0), (18, 0), 15)];
        let now = at(10, 15) + Duration::seconds(30);
        let m = match_shift(&shifts, ShiftSelection::AutoMatch, now, window()).unwrap();
        assert!(m.is_late);
        assert_eq!(m.late_minutes, 1);

        let m = match_shift(&shifts, ShiftSelection::AutoMatch, at(10, 20) + Duration::seconds(1), window()).unwrap();
        assert_eq!(m.late_minutes, 6);
    }

    #[test]
    fn selection_from_optional_id() {
        assert_eq!(ShiftSelection::from(Some(4)), ShiftSelection::Explicit(4));
        assert_eq!(ShiftSelection::from(None), ShiftSelection::AutoMatch);
    }
}
