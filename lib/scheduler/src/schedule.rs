//! Cron schedule parsing and next-fire computation.
//!
//! Expressions use the common five-field cron form (minute, hour,
//! day-of-month, month, day-of-week); a seconds field of `0` is prepended
//! before handing the expression to the `cron` crate, which expects six or
//! seven fields. Fire times are computed in the schedule's timezone and
//! returned in UTC.

use crate::error::ScheduleError;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::str::FromStr;

/// A parsed, timezone-aware cron schedule.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    timezone: Tz,
    schedule: cron::Schedule,
}

impl CronSchedule {
    /// Parses a five-field cron expression in the given tz-database timezone.
    ///
    /// Six- and seven-field expressions (with seconds, and optionally a
    /// year) are accepted as-is.
    ///
    /// # Errors
    ///
    /// Returns an error if the timezone is unknown or the expression does
    /// not parse.
    pub fn parse(expression: &str, timezone: &str) -> Result<Self, ScheduleError> {
        let timezone: Tz = timezone
            .parse()
            .map_err(|_| ScheduleError::InvalidTimezone {
                timezone: timezone.to_string(),
            })?;

        let normalized = match expression.split_whitespace().count() {
            5 => format!("0 {expression}"),
            _ => expression.to_string(),
        };
        let schedule =
            cron::Schedule::from_str(&normalized).map_err(|e| {
                ScheduleError::InvalidCronExpression {
                    expression: expression.to_string(),
                    reason: e.to_string(),
                }
            })?;

        Ok(Self {
            expression: expression.to_string(),
            timezone,
            schedule,
        })
    }

    /// The original expression, as supplied.
    #[must_use]
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// The schedule's timezone.
    #[must_use]
    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// The next fire time strictly after `after`, or `None` if the
    /// schedule never fires again.
    #[must_use]
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let local = after.with_timezone(&self.timezone);
        self.schedule
            .after(&local)
            .find(|t| *t > local)
            .map(|t| t.with_timezone(&Utc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn daily_schedule_advances_one_day_when_fired_on_the_dot() {
        let schedule = CronSchedule::parse("0 9 * * *", "UTC").unwrap();
        let fired_at = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();

        let next = schedule.next_after(fired_at).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap());
    }

    #[test]
    fn next_fire_is_strictly_after_the_reference_time() {
        let schedule = CronSchedule::parse("*/15 * * * *", "UTC").unwrap();
        let on_boundary = Utc.with_ymd_and_hms(2024, 6, 1, 12, 15, 0).unwrap();

        let next = schedule.next_after(on_boundary).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 6, 1, 12, 30, 0).unwrap());
    }

    #[test]
    fn fire_times_respect_the_timezone() {
        let schedule = CronSchedule::parse("0 9 * * *", "America/New_York").unwrap();
        // 2024-01-15 is EST (UTC-5), so 09:00 local is 14:00 UTC.
        let after = Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap();

        let next = schedule.next_after(after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap());
    }

    #[test]
    fn six_field_expressions_pass_through() {
        let schedule = CronSchedule::parse("30 0 9 * * *", "UTC").unwrap();
        let after = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let next = schedule.next_after(after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 30).unwrap());
    }

    #[test]
    fn rejects_garbage_expression() {
        let err = CronSchedule::parse("not a cron", "UTC").unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidCronExpression { .. }));
    }

    #[test]
    fn rejects_unknown_timezone() {
        let err = CronSchedule::parse("0 9 * * *", "Mars/Olympus_Mons").unwrap_err();
        assert!(matches!(
            err,
            ScheduleError::InvalidTimezone { timezone } if timezone == "Mars/Olympus_Mons"
        ));
    }
}
