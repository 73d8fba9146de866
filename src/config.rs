use std::env;
use std::fmt::Display;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use chrono::{Duration, FixedOffset, NaiveTime};
use dotenvy::dotenv;

use crate::attendance::AttendancePolicy;
use crate::model::attendance::RecordStatus;
use crate::utils::clock::parse_hhmm;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub cron_secret: String,
    pub server_addr: String,
    pub api_prefix: String,
    pub run_migrations: bool,
    pub log_level: tracing::Level,

    // Rate limiting
    pub rate_checkin_per_min: u32,
    pub rate_protected_per_min: u32,

    // Attendance rules
    pub utc_offset_minutes: i32,
    pub standard_hours: f64,
    pub default_break_hours: f64,
    pub shift_match_window_minutes: i64,
    pub auto_checkout_cutoff: NaiveTime,
    pub auto_checkout_status: RecordStatus,
    /// Run the sweep from inside the server instead of waiting for the cron call.
    pub auto_checkout_scheduler: bool,
}

fn required(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("{key} must be set"))
}

fn parsed<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    raw.trim().parse().map_err(|e| anyhow!("invalid {key} value '{raw}': {e}"))
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let cutoff = env::var("AUTO_CHECKOUT_CUTOFF").unwrap_or_else(|_| "23:59".to_string());
        let auto_checkout_cutoff = parse_hhmm(&cutoff).context("invalid AUTO_CHECKOUT_CUTOFF")?;

        let auto_checkout_status: RecordStatus = parsed("AUTO_CHECKOUT_STATUS", "pending")?;
        if auto_checkout_status == RecordStatus::CheckedIn {
            return Err(anyhow!("AUTO_CHECKOUT_STATUS must be 'pending' or 'completed'"));
        }

        let config = Self {
            server_addr: required("SERVER_ADDR")?,
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            cron_secret: required("CRON_SECRET")?,
            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api/v1".to_string()),
            run_migrations: parsed("RUN_MIGRATIONS", "true")?,
            log_level: parsed("LOG_LEVEL", "debug")?,

            rate_checkin_per_min: parsed("RATE_CHECKIN_PER_MIN", "30")?,
            rate_protected_per_min: parsed("RATE_PROTECTED_PER_MIN", "1000")?,

            utc_offset_minutes: parsed("UTC_OFFSET_MINUTES", "420")?, // Asia/Bangkok
            standard_hours: parsed("STANDARD_HOURS", "8")?,
            default_break_hours: parsed("DEFAULT_BREAK_HOURS", "1")?,
            shift_match_window_minutes: parsed("SHIFT_MATCH_WINDOW_MINUTES", "240")?,
            auto_checkout_cutoff,
            auto_checkout_status,
            auto_checkout_scheduler: parsed("AUTO_CHECKOUT_SCHEDULER", "false")?,
        };

        config.attendance_policy()?;
        Ok(config)
    }

    /// The rules the attendance core runs with.
    pub fn attendance_policy(&self) -> Result<AttendancePolicy> {
        let utc_offset = FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .ok_or_else(|| anyhow!("UTC_OFFSET_MINUTES {} is out of range", self.utc_offset_minutes))?;
        if !(self.standard_hours > 0.0 && self.standard_hours <= 24.0) {
            return Err(anyhow!("STANDARD_HOURS must be within (0, 24]"));
        }
        if !(self.default_break_hours >= 0.0 && self.default_break_hours.is_finite()) {
            return Err(anyhow!("DEFAULT_BREAK_HOURS must be 0 or more"));
        }
        if self.shift_match_window_minutes <= 0 {
            return Err(anyhow!("SHIFT_MATCH_WINDOW_MINUTES must be positive"));
        }

        Ok(AttendancePolicy {
            standard_hours: self.standard_hours,
            default_break_hours: self.default_break_hours,
            shift_match_window: Duration::minutes(self.shift_match_window_minutes),
            auto_checkout_cutoff: self.auto_checkout_cutoff,
            auto_checkout_status: self.auto_checkout_status,
            utc_offset,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub fn test_config() -> Config {
        Config {
            database_url: "mysql://localhost/hrm_test".into(),
            jwt_secret: "test-secret".into(),
            cron_secret: "cron-secret".into(),
            server_addr: "127.0.0.1:0".into(),
            api_prefix: "/api/v1".into(),
            run_migrations: false,
            log_level: tracing::Level::DEBUG,
            rate_checkin_per_min: 30,
            rate_protected_per_min: 1000,
            utc_offset_minutes: 420,
            standard_hours: 8.0,
            default_break_hours: 1.0,
            shift_match_window_minutes: 240,
            auto_checkout_cutoff: NaiveTime::from_hms_opt(23, 59, 0).unwrap(),
            auto_checkout_status: RecordStatus::Pending,
            auto_checkout_scheduler: false,
        }
    }

    #[test]
    fn policy_mirrors_config() {
        let policy = test_config().attendance_policy().unwrap();
        assert_eq!(policy.standard_hours, 8.0);
        assert_eq!(policy.utc_offset.local_minus_utc(), 7 * 3600);
        assert_eq!(policy.shift_match_window, Duration::hours(4));
        assert_eq!(policy.auto_checkout_status, RecordStatus::Pending);
    }

    #[test]
    fn policy_rejects_nonsense() {
        let mut config = test_config();
        config.utc_offset_minutes = 24 * 60;
        assert!(config.attendance_policy().is_err());

        let mut config = test_config();
        config.standard_hours = 0.0;
        assert!(config.attendance_policy().is_err());

        let mut config = test_config();
        config.shift_match_window_minutes = 0;
        assert!(config.attendance_policy().is_err());
    }
}
