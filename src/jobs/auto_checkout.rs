use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use sqlx::MySqlPool;
use tracing::{error, info, warn};

use crate::attendance::AttendancePolicy;
use crate::attendance::sweep::{SweepReport, cutoff_boundary, run_sweep};
use crate::model::attendance::RecordStatus;
use crate::repo;
use crate::utils::location_cache;

/// Load every record due at `now`, close them, and write them back one by one.
///
/// Loading failures abort the run (nothing has been changed yet). After that,
/// each record succeeds or fails on its own.
pub async fn sweep_once(pool: &MySqlPool, policy: &AttendancePolicy, now: DateTime<Utc>) -> Result<SweepReport> {
    let boundary = policy.to_utc(cutoff_boundary(policy.to_local(now), policy.auto_checkout_cutoff));

    let mut records = repo::attendance::fetch_open_before(pool, boundary)
        .await
        .context("Failed to load open attendance records")?;
    // Closed locations still carry the break hours of their old records.
    let locations = repo::location::fetch_all(pool, false)
        .await
        .context("Failed to load locations")?;

    let history_before: Vec<usize> = records.iter().map(|r| r.edit_history.len()).collect();
    let mut report = run_sweep(now, &mut records, &locations, policy);

    for (record, before) in records.iter().zip(history_before) {
        if !report.closed.contains(&record.id) {
            continue;
        }
        match repo::attendance::save(pool, record, RecordStatus::CheckedIn, before).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(record_id = record.id, "Record changed during auto checkout, skipped");
                report.record_failure(record.id, "record was modified concurrently");
            }
            Err(e) => {
                error!(record_id = record.id, error = %e, "Failed to save auto checkout");
                report.record_failure(record.id, format!("database error: {e}"));
            }
        }
    }

    info!(
        processed = report.processed,
        failed = report.errors.len(),
        boundary = %boundary,
        "Auto checkout run complete"
    );
    Ok(report)
}

/// Time from `now` until the next cutoff (strictly in the future).
pub fn until_next_cutoff(now: DateTime<Utc>, policy: &AttendancePolicy) -> Duration {
    let last = policy.to_utc(cutoff_boundary(policy.to_local(now), policy.auto_checkout_cutoff));
    last + Duration::days(1) - now
}

/// Run the sweep every day at the cutoff, forever.
pub async fn run_daily(pool: MySqlPool, policy: AttendancePolicy) {
    loop {
        let wait = until_next_cutoff(Utc::now(), &policy);
        info!(seconds = wait.num_seconds(), "Next auto checkout scheduled");
        actix_web::rt::time::sleep(wait.to_std().unwrap_or_default()).await;

        if let Err(e) = sweep_once(&pool, &policy, Utc::now()).await {
            error!(error = ?e, "Auto checkout run failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn next_cutoff_is_later_today_or_tomorrow() {
        let policy = AttendancePolicy::default();
        let local = |d: u32, h: u32, m: u32| NaiveDate::from_ymd_opt(2026, 3, d).unwrap().and_hms_opt(h, m, 0).unwrap();

        let wait = until_next_cutoff(policy.to_utc(local(10, 23, 0)), &policy);
        assert_eq!(wait, Duration::minutes(59));

        // exactly at the cutoff: the next one is a full day away
        let wait = until_next_cutoff(policy.to_utc(local(10, 23, 59)), &policy);
        assert_eq!(wait, Duration::days(1));

        let wait = until_next_cutoff(policy.to_utc(local(11, 0, 4)), &policy);
        assert_eq!(wait, Duration::hours(23) + Duration::minutes(55));
    }
}
