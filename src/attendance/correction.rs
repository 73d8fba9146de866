use chrono::{DateTime, NaiveTime, Utc};

use crate::attendance::error::AttendanceError;
use crate::attendance::hours::compute_hours;
use crate::attendance::policy::AttendancePolicy;
use crate::attendance::shift_matcher::{ShiftSelection, match_shift};
use crate::model::attendance::{AttendanceRecord, RecordStatus};
use crate::model::location::Location;

/// An administrator's correction. `None` leaves a field as it is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordEdit {
    pub check_in_time: Option<DateTime<Utc>>,
    pub check_out_time: Option<DateTime<Utc>>,
    pub shift_id: Option<u64>,
    pub status: Option<RecordStatus>,
    pub reason: String,
}

fn show_time(t: Option<DateTime<Utc>>) -> Option<String> {
    t.map(|t| t.to_rfc3339())
}

/// Re-derive hours and lateness after the times or shift of a record changed.
fn recompute(
    record: &mut AttendanceRecord,
    location: Option<&Location>,
    policy: &AttendancePolicy,
) -> Result<(), AttendanceError> {
    let check_in = policy.to_local(record.check_in_time);
    let shift = match (location, record.shift_id) {
        (Some(loc), Some(shift_id)) => loc.shift(shift_id),
        _ => None,
    };

    match (location, record.shift_id) {
        (Some(loc), Some(shift_id)) => {
            let m = match_shift(&loc.shifts, ShiftSelection::Explicit(shift_id), check_in, policy.shift_match_window)?;
            record.is_late = m.is_late;
            record.late_minutes = m.late_minutes;
        }
        _ => {
            record.is_late = false;
            record.late_minutes = 0;
        }
    }

    if let Some(check_out) = record.check_out_time {
        let break_hours = location.map_or(policy.default_break_hours, |loc| loc.break_hours);
        let hours = compute_hours(check_in, policy.to_local(check_out), shift, break_hours, policy)?;
        record.regular_hours = hours.regular_hours;
        record.overtime_hours = hours.overtime_hours;
        record.total_hours = hours.total_hours;
        record.break_hours = hours.break_hours;
        record.is_overnight_shift = hours.is_overnight_shift;
    } else {
        record.regular_hours = 0.0;
        record.overtime_hours = 0.0;
        record.total_hours = 0.0;
        record.break_hours = 0.0;
        record.is_overnight_shift = false;
    }
    Ok(())
}

/// Apply an administrator edit, appending one history entry per changed field.
///
/// Nothing is written to `record` unless the whole edit is valid.
pub fn apply_edit(
    record: &mut AttendanceRecord,
    edit: &RecordEdit,
    editor: &str,
    now: DateTime<Utc>,
    location: Option<&Location>,
    policy: &AttendancePolicy,
) -> Result<(), AttendanceError> {
    let reason = edit.reason.trim();
    if reason.is_empty() {
        return Err(AttendanceError::InvalidInput("a reason is required for every edit".into()));
    }

    let mut draft = record.clone();
    let before = draft.edit_history.len();

    if let Some(t) = edit.check_in_time.filter(|t| *t != draft.check_in_time) {
        draft.record_edit(editor, now, "check_in_time", show_time(Some(draft.check_in_time)), show_time(Some(t)), reason);
        draft.check_in_time = t;
    }
    if let Some(t) = edit.check_out_time.filter(|t| Some(*t) != draft.check_out_time) {
        draft.record_edit(editor, now, "check_out_time", show_time(draft.check_out_time), show_time(Some(t)), reason);
        draft.check_out_time = Some(t);
    }
    if let Some(shift_id) = edit.shift_id.filter(|id| Some(*id) != draft.shift_id) {
        if let Some(loc) = location {
            if loc.shift(shift_id).is_none() {
                return Err(AttendanceError::UnknownShift(shift_id));
            }
        }
        draft.record_edit(
            editor,
            now,
            "shift_id",
            draft.shift_id.map(|id| id.to_string()),
            Some(shift_id.to_string()),
            reason,
        );
        draft.shift_id = Some(shift_id);
    }
    if let Some(status) = edit.status.filter(|s| *s != draft.status) {
        draft.record_edit(editor, now, "status", Some(draft.status.to_string()), Some(status.to_string()), reason);
        draft.status = status;
    }

    if draft.edit_history.len() == before {
        return Err(AttendanceError::InvalidInput("edit does not change anything".into()));
    }

    match (draft.status, draft.check_out_time) {
        (RecordStatus::CheckedIn, Some(_)) => {
            return Err(AttendanceError::InvalidInput("a checked-in record cannot have a check-out".into()));
        }
        (RecordStatus::Completed | RecordStatus::Pending, None) => {
            return Err(AttendanceError::InvalidInput(format!("a {} record needs a check-out", draft.status)));
        }
        _ => {}
    }

    recompute(&mut draft, location, policy)?;
    *record = draft;
    Ok(())
}

/// Split a closed record that runs past local midnight into two records.
///
/// `record` keeps the part up to midnight (and its break); the returned record
/// covers midnight to the original check-out and points back through
/// `split_from_record_id`. The returned record has id 0 until it is stored.
pub fn split_overnight(
    record: &mut AttendanceRecord,
    editor: &str,
    now: DateTime<Utc>,
    location: Option<&Location>,
    policy: &AttendancePolicy,
) -> Result<AttendanceRecord, AttendanceError> {
    let check_out_utc = match record.check_out_time {
        Some(t) if !record.is_open() => t,
        _ => return Err(AttendanceError::InvalidState { record_id: record.id, status: record.status }),
    };

    let check_in = policy.to_local(record.check_in_time);
    let check_out = policy.to_local(check_out_utc);
    let midnight = check_in
        .date()
        .succ_opt()
        .map(|d| d.and_time(NaiveTime::MIN))
        .ok_or_else(|| AttendanceError::InvalidInput("check-in date out of range".into()))?;
    if check_out <= midnight {
        return Err(AttendanceError::InvalidInput("record does not cross midnight".into()));
    }

    let shift = match (location, record.shift_id) {
        (Some(loc), Some(shift_id)) => loc.shift(shift_id),
        _ => None,
    };
    let break_hours = location.map_or(policy.default_break_hours, |loc| loc.break_hours);
    let first = compute_hours(check_in, midnight, shift, break_hours, policy)?;
    let second = compute_hours(midnight, check_out, shift, 0.0, policy)?;
    let midnight_utc = policy.to_utc(midnight);

    let mut tail = record.clone();
    tail.id = 0;
    tail.check_in_time = midnight_utc;
    tail.is_late = false;
    tail.late_minutes = 0;
    tail.regular_hours = second.regular_hours;
    tail.overtime_hours = second.overtime_hours;
    tail.total_hours = second.total_hours;
    tail.break_hours = second.break_hours;
    tail.is_overnight_shift = second.is_overnight_shift;
    tail.split_from_record_id = Some(record.id);
    tail.edit_history.clear();
    tail.record_edit(
        editor,
        now,
        "split_from_record_id",
        None,
        Some(record.id.to_string()),
        "split at midnight",
    );

    record.record_edit(
        editor,
        now,
        "check_out_time",
        show_time(Some(check_out_utc)),
        show_time(Some(midnight_utc)),
        "split at midnight",
    );
    record.check_out_time = Some(midnight_utc);
    record.check_out_location = None;
    record.regular_hours = first.regular_hours;
    record.overtime_hours = first.overtime_hours;
    record.total_hours = first.total_hours;
    record.break_hours = first.break_hours;
    record.is_overnight_shift = false;

    Ok(tail)
}
