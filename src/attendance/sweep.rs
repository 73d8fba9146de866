use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::attendance::error::AttendanceError;
use crate::attendance::hours::compute_hours;
use crate::attendance::policy::AttendancePolicy;
use crate::model::attendance::AttendanceRecord;
use crate::model::location::Location;
use crate::model::role::Role;
use crate::utils::clock::format_hhmm;

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SweepFailure {
    #[schema(example = 42)]
    pub record_id: u64,
    #[schema(example = "invalid input: open record already has a check-out")]
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct SweepReport {
    #[schema(example = 3)]
    pub processed: usize,
    /// Ids of the records that were closed.
    pub closed: Vec<u64>,
    pub errors: Vec<SweepFailure>,
}

impl SweepReport {
    /// Move a record from `closed` into `errors`, e.g. when persisting it failed.
    pub fn record_failure(&mut self, record_id: u64, reason: impl Into<String>) {
        if let Some(pos) = self.closed.iter().position(|id| *id == record_id) {
            self.closed.remove(pos);
            self.processed -= 1;
        }
        self.errors.push(SweepFailure { record_id, reason: reason.into() });
    }
}

/// The most recent cutoff at or before `now`.
pub fn cutoff_boundary(now: NaiveDateTime, cutoff: NaiveTime) -> NaiveDateTime {
    let today = now.date().and_time(cutoff);
    if now >= today { today } else { today - Duration::days(1) }
}

/// The first cutoff strictly after `check_in`; that is where a forgotten
/// check-out gets pinned.
pub fn cutoff_after(check_in: NaiveDateTime, cutoff: NaiveTime) -> NaiveDateTime {
    let same_day = check_in.date().and_time(cutoff);
    if same_day > check_in { same_day } else { same_day + Duration::days(1) }
}

/// Whether the sweep running at `now_utc` should close `record`.
pub fn is_due(record: &AttendanceRecord, now_utc: DateTime<Utc>, policy: &AttendancePolicy) -> bool {
    let boundary = cutoff_boundary(policy.to_local(now_utc), policy.auto_checkout_cutoff);
    record.is_open() && policy.to_local(record.check_in_time) < boundary
}

/// Close one abandoned record at the cutoff following its check-in.
pub fn auto_close(
    record: &mut AttendanceRecord,
    location: Option<&Location>,
    now_utc: DateTime<Utc>,
    policy: &AttendancePolicy,
) -> Result<(), AttendanceError> {
    if record.check_out_time.is_some() {
        return Err(AttendanceError::InvalidInput("open record already has a check-out".into()));
    }

    let check_in = policy.to_local(record.check_in_time);
    let check_out = cutoff_after(check_in, policy.auto_checkout_cutoff);

    let shift = match (location, record.shift_id) {
        (Some(loc), Some(shift_id)) => loc.shift(shift_id),
        _ => None,
    };
    let break_hours = location.map_or(policy.default_break_hours, |loc| loc.break_hours);
    let hours = compute_hours(check_in, check_out, shift, break_hours, policy)?;

    let check_out_utc = policy.to_utc(check_out);
    record.check_out_time = Some(check_out_utc);
    record.check_out_location = None;
    record.regular_hours = hours.regular_hours;
    record.overtime_hours = hours.overtime_hours;
    record.total_hours = hours.total_hours;
    record.break_hours = hours.break_hours;
    record.is_overnight_shift = hours.is_overnight_shift;
    record.status = policy.auto_checkout_status;
    record.auto_checkout = true;
    record.forgot_checkout = true;
    record.record_edit(
        Role::System.as_editor(),
        now_utc,
        "check_out_time",
        None,
        Some(check_out_utc.to_rfc3339()),
        &format!("auto checkout at daily cutoff {}", format_hhmm(&policy.auto_checkout_cutoff)),
    );
    Ok(())
}

/// Force-close every record still checked in from before the latest cutoff.
///
/// A record that fails is left untouched and reported; the rest of the batch
/// carries on. Records that are not open are skipped, so running the sweep
/// again over the same records changes nothing.
pub fn run_sweep(
    now_utc: DateTime<Utc>,
    records: &mut [AttendanceRecord],
    locations: &[Location],
    policy: &AttendancePolicy,
) -> SweepReport {
    let by_id: HashMap<u64, &Location> = locations.iter().map(|loc| (loc.id, loc)).collect();
    let mut report = SweepReport::default();

    for record in records.iter_mut().filter(|r| is_due(r, now_utc, policy)) {
        let location = record.primary_location_id.and_then(|id| by_id.get(&id).copied());

        let mut draft = record.clone();
        match auto_close(&mut draft, location, now_utc, policy) {
            Ok(()) => {
                *record = draft;
                report.processed += 1;
                report.closed.push(record.id);
            }
            Err(e) => {
                warn!(record_id = record.id, error = %e, "Auto checkout failed");
                report.errors.push(SweepFailure { record_id: record.id, reason: e.to_string() });
            }
        }
    }

    info!(processed = report.processed, failed = report.errors.len(), "Auto checkout sweep finished");
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::attendance::{CheckInType, RecordStatus};
    use crate::model::location::Coordinate;
    use crate::model::location::fixtures::{location, shift, time};
    use chrono::NaiveDate;

    fn local(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, day).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    fn open_record(id: u64, policy: &AttendancePolicy, check_in: NaiveDateTime) -> AttendanceRecord {
        AttendanceRecord {
            id,
            employee_id: 1000 + id,
            check_in_time: policy.to_utc(check_in),
            check_in_location: Coordinate { latitude: 13.7563, longitude: 100.5018 },
            check_in_type: CheckInType::WithinGeofence,
            locations_within: vec![1],
            primary_location_id: Some(1),
            shift_id: None,
            check_out_time: None,
            check_out_location: None,
            regular_hours: 0.0,
            overtime_hours: 0.0,
            total_hours: 0.0,
            break_hours: 0.0,
            status: RecordStatus::CheckedIn,
            is_late: false,
            late_minutes: 0,
            is_overnight_shift: false,
            auto_checkout: false,
            forgot_checkout: false,
            split_from_record_id: None,
            edit_history: Vec::new(),
        }
    }

    #[test]
    fn boundary_is_latest_cutoff_not_after_now() {
        let cutoff = time(23, 59);
        assert_eq!(cutoff_boundary(local(10, 23, 59), cutoff), local(10, 23, 59));
        assert_eq!(cutoff_boundary(local(11, 0, 5), cutoff), local(10, 23, 59));
        assert_eq!(cutoff_boundary(local(10, 12, 0), cutoff), local(9, 23, 59));
    }

    #[test]
    fn checkout_pinned_to_cutoff_after_check_in() {
        let cutoff = time(23, 59);
        assert_eq!(cutoff_after(local(10, 8, 0), cutoff), local(10, 23, 59));
        assert_eq!(cutoff_after(local(10, 23, 59), cutoff), local(11, 23, 59));
    }

    #[test]
    fn closes_open_record_at_cutoff() {
        let policy = AttendancePolicy::default();
        let now = policy.to_utc(local(10, 23, 59));
        let mut records = vec![open_record(1, &policy, local(10, 8, 0))];
        let sites = vec![location(1, 13.7563, 100.5018, 100.0)];

        let report = run_sweep(now, &mut records, &sites, &policy);

        assert_eq!(report.processed, 1);
        assert_eq!(report.closed, vec![1]);
        assert!(report.errors.is_empty());

        let r = &records[0];
        assert_eq!(r.status, RecordStatus::Pending);
        assert!(r.auto_checkout && r.forgot_checkout);
        assert_eq!(r.check_out_time, Some(policy.to_utc(local(10, 23, 59))));
        // 15h59m minus the location's 1h break
        assert_eq!(r.total_hours, 14.98);
        assert_eq!(r.regular_hours, 8.0);
        assert_eq!(r.overtime_hours, 6.98);
        assert_eq!(r.edit_history.len(), 1);
        assert_eq!(r.edit_history[0].editor, "system");
        assert_eq!(r.edit_history[0].field, "check_out_time");
    }

    #[test]
    fn second_run_is_a_no_op() {
        let policy = AttendancePolicy::default();
        let now = policy.to_utc(local(10, 23, 59));
        let mut records = vec![open_record(1, &policy, local(10, 8, 0)), open_record(2, &policy, local(10, 9, 30))];
        let sites = vec![location(1, 13.7563, 100.5018, 100.0)];

        run_sweep(now, &mut records, &sites, &policy);
        let after_first = records.clone();
        let report = run_sweep(now, &mut records, &sites, &policy);

        assert_eq!(report.processed, 0);
        assert!(report.closed.is_empty());
        assert_eq!(records, after_first);
    }

    #[test]
    fn completed_status_when_policy_says_so() {
        let policy = AttendancePolicy { auto_checkout_status: RecordStatus::Completed, ..AttendancePolicy::default() };
        let now = policy.to_utc(local(11, 0, 30));
        let mut records = vec![open_record(1, &policy, local(10, 8, 0))];

        run_sweep(now, &mut records, &[], &policy);

        assert_eq!(records[0].status, RecordStatus::Completed);
        // no location: falls back to the policy's default break hours
        assert_eq!(records[0].break_hours, policy.default_break_hours);
    }

    #[test]
    fn leaves_todays_records_before_cutoff_alone() {
        let policy = AttendancePolicy::default();
        let now = policy.to_utc(local(10, 18, 0));
        let mut records = vec![open_record(1, &policy, local(10, 8, 0)), open_record(2, &policy, local(9, 9, 0))];

        let report = run_sweep(now, &mut records, &[], &policy);

        assert_eq!(report.closed, vec![2]);
        assert!(records[0].is_open());
        assert_eq!(records[1].check_out_time, Some(policy.to_utc(local(9, 23, 59))));
    }

    #[test]
    fn one_bad_record_does_not_stop_the_batch() {
        let policy = AttendancePolicy::default();
        let now = policy.to_utc(local(10, 23, 59));
        let mut broken = open_record(1, &policy, local(10, 8, 0));
        broken.check_out_time = Some(policy.to_utc(local(10, 17, 0)));
        let mut records = vec![broken.clone(), open_record(2, &policy, local(10, 9, 0))];

        let report = run_sweep(now, &mut records, &[], &policy);

        assert_eq!(report.processed, 1);
        assert_eq!(report.closed, vec![2]);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].record_id, 1);
        assert_eq!(records[0], broken);
        assert!(!records[1].is_open());
    }

    #[test]
    fn overnight_shift_flagged_when_closed_next_day() {
        let policy = AttendancePolicy::default();
        let mut site = location(1, 13.7563, 100.5018, 100.0);
        site.shifts.push(shift(3, "Night", (23, 59), (6, 0), 0));
        let mut record = open_record(1, &policy, local(10, 23, 59));
        record.shift_id = Some(3);

        let now = policy.to_utc(local(11, 23, 59));
        let mut records = vec![record];
        run_sweep(now, &mut records, &[site], &policy);

        assert!(records[0].is_overnight_shift);
        assert_eq!(records[0].total_hours, 23.0);
    }

    #[test]
    fn persistence_failure_moves_record_to_errors() {
        let mut report = SweepReport { processed: 2, closed: vec![4, 5], errors: vec![] };
        report.record_failure(5, "row changed underneath");
        assert_eq!(report.processed, 1);
        assert_eq!(report.closed, vec![4]);
        assert_eq!(report.errors[0].record_id, 5);
    }
}
