//! Schedule planner
//!
//! Turns the relative schedule in the config (day offset, time of day,
//! interval, retention) into the absolute values a job creation request
//! carries. Deterministic for a given clock reading.

use ap_cloud::ScheduleParams;
use ap_config::{ScheduleConfig, TIME_OF_DAY_FORMAT};
use chrono::{DateTime, NaiveTime, TimeDelta, Utc};
use thiserror::Error;

/// Format of `start_date` in job requests
pub const START_DATE_FORMAT: &str = "%m/%d/%y";

/// Format of `start_time` in job requests
pub const START_TIME_FORMAT: &str = "%I:%M %p";

/// Planning errors; all of them are configuration mistakes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("Start offset of {0} days is out of range")]
    OffsetOutOfRange(i64),

    #[error("Time of day '{value}' is not {expected}: {reason}")]
    BadTime {
        value: String,
        expected: &'static str,
        reason: String,
    },
}

fn parse_time(value: &str, format: &'static str) -> Result<NaiveTime, PlanError> {
    NaiveTime::parse_from_str(value.trim(), format).map_err(|e| PlanError::BadTime {
        value: value.to_string(),
        expected: format,
        reason: e.to_string(),
    })
}

/// Parse a `start_time` produced by the planner back into a time of day.
///
/// # Errors
///
/// Returns [`PlanError::BadTime`] when the text is not `HH:MM AM|PM`.
pub fn parse_start_time(value: &str) -> Result<NaiveTime, PlanError> {
    parse_time(value, START_TIME_FORMAT)
}

/// Compute schedule parameters from individual values.
///
/// # Errors
///
/// Returns [`PlanError`] when the offset overflows the calendar or the time of
/// day is not a 24-hour `HH:MM:SS` string.
pub fn plan_parts(
    now: DateTime<Utc>,
    offset_days: i64,
    time_of_day: &str,
    interval: &str,
    retention: u32,
) -> Result<ScheduleParams, PlanError> {
    let start = TimeDelta::try_days(offset_days)
        .and_then(|offset| now.checked_add_signed(offset))
        .ok_or(PlanError::OffsetOutOfRange(offset_days))?;
    let time = parse_time(time_of_day, TIME_OF_DAY_FORMAT)?;

    Ok(ScheduleParams {
        start_date: start.format(START_DATE_FORMAT).to_string(),
        start_time: time.format(START_TIME_FORMAT).to_string(),
        interval: interval.to_string(),
        retention,
        enabled: true,
    })
}

/// Compute schedule parameters from the configured schedule.
///
/// # Errors
///
/// See [`plan_parts`].
pub fn plan(now: DateTime<Utc>, schedule: &ScheduleConfig) -> Result<ScheduleParams, PlanError> {
    plan_parts(
        now,
        schedule.start_offset_days,
        &schedule.start_time,
        &schedule.interval,
        schedule.retention,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};
    use proptest::prelude::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_next_day_two_am() {
        let params = plan_parts(now(), 1, "02:00:00", "24hrs", 5).unwrap();
        assert_eq!(params.start_date, "01/11/24");
        assert_eq!(params.start_time, "02:00 AM");
        assert_eq!(params.interval, "24hrs");
        assert_eq!(params.retention, 5);
        assert!(params.enabled);
    }

    #[test]
    fn test_afternoon_time() {
        let params = plan_parts(now(), 0, "14:30:59", "12hr", 3).unwrap();
        assert_eq!(params.start_date, "01/10/24");
        assert_eq!(params.start_time, "02:30 PM");
    }

    #[test]
    fn test_midnight_and_noon() {
        assert_eq!(
            plan_parts(now(), 0, "00:15:00", "1hr", 1).unwrap().start_time,
            "12:15 AM"
        );
        assert_eq!(
            plan_parts(now(), 0, "12:00:00", "1hr", 1).unwrap().start_time,
            "12:00 PM"
        );
    }

    #[test]
    fn test_negative_offset_crosses_year() {
        let params = plan_parts(now(), -10, "02:00:00", "24hrs", 5).unwrap();
        assert_eq!(params.start_date, "12/31/23");
    }

    #[test]
    fn test_offset_out_of_range() {
        let err = plan_parts(now(), i64::MAX, "02:00:00", "24hrs", 5).unwrap_err();
        assert_eq!(err, PlanError::OffsetOutOfRange(i64::MAX));
    }

    #[test]
    fn test_bad_time_of_day() {
        for bad in ["2am", "25:00:00", "02:00", "02:00 AM", ""] {
            let err = plan_parts(now(), 1, bad, "24hrs", 5).unwrap_err();
            assert!(matches!(err, PlanError::BadTime { .. }), "{bad} should fail");
        }
    }

    #[test]
    fn test_plan_from_config() {
        let schedule = ScheduleConfig {
            start_offset_days: 1,
            start_time: "02:00:00".to_string(),
            interval: "24hrs".to_string(),
            retention: 5,
        };
        assert_eq!(
            plan(now(), &schedule).unwrap(),
            plan_parts(now(), 1, "02:00:00", "24hrs", 5).unwrap()
        );
    }

    proptest! {
        #[test]
        fn test_start_time_round_trip(h in 0u32..24, m in 0u32..60, s in 0u32..60) {
            let input = format!("{h:02}:{m:02}:{s:02}");
            let params = plan_parts(now(), 1, &input, "24hrs", 5).unwrap();
            let parsed = parse_start_time(&params.start_time).unwrap();
            prop_assert_eq!(parsed.hour(), h);
            prop_assert_eq!(parsed.minute(), m);
        }

        #[test]
        fn test_plan_is_deterministic(offset in -365i64..365, h in 0u32..24, m in 0u32..60) {
            let input = format!("{h:02}:{m:02}:00");
            let a = plan_parts(now(), offset, &input, "24hrs", 7).unwrap();
            let b = plan_parts(now(), offset, &input, "24hrs", 7).unwrap();
            prop_assert_eq!(a, b);
        }
    }
}
