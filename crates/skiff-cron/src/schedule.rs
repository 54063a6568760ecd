// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Schedule validation and next-occurrence computation.
//!
//! Cron expressions are evaluated on the wall clock of the job's IANA zone,
//! so "0 9 * * *" in `America/New_York` stays at 09:00 local time on both
//! sides of a DST switch.

use chrono::{DateTime, TimeDelta, Utc};
use chrono_tz::Tz;
use croner::Cron;
use skiff_core::SkiffError;

use crate::types::CronSchedule;

fn parse_expr(expr: &str) -> Result<Cron, SkiffError> {
    expr.parse::<Cron>()
        .map_err(|e| SkiffError::Scheduling(format!("invalid cron expression '{expr}': {e}")))
}

fn parse_tz(tz: &str) -> Result<Tz, SkiffError> {
    tz.parse::<Tz>()
        .map_err(|_| SkiffError::Scheduling(format!("unknown timezone '{tz}'")))
}

fn interval(every_secs: u64) -> Result<TimeDelta, SkiffError> {
    i64::try_from(every_secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .filter(|d| *d > TimeDelta::zero())
        .ok_or_else(|| {
            SkiffError::Scheduling(format!("interval must be positive, got {every_secs}s"))
        })
}

/// Rejects schedules that could never fire correctly.
pub fn validate(schedule: &CronSchedule, now: DateTime<Utc>) -> Result<(), SkiffError> {
    match schedule {
        CronSchedule::At { at } => {
            if *at <= now {
                return Err(SkiffError::Scheduling(format!(
                    "'at' time {} is not in the future",
                    at.to_rfc3339()
                )));
            }
        }
        CronSchedule::Every { every_secs } => {
            interval(*every_secs)?;
        }
        CronSchedule::Cron { expr, tz } => {
            parse_expr(expr)?;
            if let Some(tz) = tz {
                parse_tz(tz)?;
            }
        }
    }
    Ok(())
}

/// The first occurrence strictly after `now`, or `None` when the schedule
/// has no further runs.
pub fn next_run(
    schedule: &CronSchedule,
    now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, SkiffError> {
    match schedule {
        CronSchedule::At { at } => Ok((*at > now).then_some(*at)),
        CronSchedule::Every { every_secs } => Ok(Some(now + interval(*every_secs)?)),
        CronSchedule::Cron { expr, tz } => {
            let cron = parse_expr(expr)?;
            let next = match tz {
                Some(tz) => {
                    let tz = parse_tz(tz)?;
                    cron.find_next_occurrence(&now.with_timezone(&tz), false)
                        .map(|at| at.with_timezone(&Utc))
                }
                None => cron.find_next_occurrence(&now, false),
            };
            next.map(Some).map_err(|e| {
                SkiffError::Scheduling(format!("no next occurrence for '{expr}': {e}"))
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn daily_nine(tz: &str) -> CronSchedule {
        CronSchedule::Cron {
            expr: "0 9 * * *".into(),
            tz: Some(tz.into()),
        }
    }

    fn wall_clock(at: DateTime<Utc>, tz: &str) -> String {
        let tz: Tz = tz.parse().unwrap();
        at.with_timezone(&tz).format("%H:%M").to_string()
    }

    #[test]
    fn moscow_nine_am_across_european_dst_dates() {
        let schedule = daily_nine("Europe/Moscow");
        // Europe springs forward on 2024-03-31 and falls back on 2024-10-27.
        for (from, expected) in [
            (utc(2024, 3, 30, 12, 0), utc(2024, 3, 31, 6, 0)),
            (utc(2024, 3, 31, 12, 0), utc(2024, 4, 1, 6, 0)),
            (utc(2024, 10, 26, 12, 0), utc(2024, 10, 27, 6, 0)),
            (utc(2024, 10, 27, 12, 0), utc(2024, 10, 28, 6, 0)),
        ] {
            let next = next_run(&schedule, from).unwrap().unwrap();
            assert_eq!(next, expected);
            assert_eq!(wall_clock(next, "Europe/Moscow"), "09:00");
        }
    }

    #[test]
    fn new_york_keeps_local_time_across_its_dst_switch() {
        let schedule = daily_nine("America/New_York");
        // EST (UTC-5) before 2024-03-10, EDT (UTC-4) after.
        assert_eq!(
            next_run(&schedule, utc(2024, 3, 9, 12, 0)).unwrap(),
            Some(utc(2024, 3, 9, 14, 0))
        );
        assert_eq!(
            next_run(&schedule, utc(2024, 3, 9, 15, 0)).unwrap(),
            Some(utc(2024, 3, 10, 13, 0))
        );
        // Back to EST on 2024-11-03.
        let fall = next_run(&schedule, utc(2024, 11, 2, 14, 0)).unwrap().unwrap();
        assert_eq!(fall, utc(2024, 11, 3, 14, 0));
        assert_eq!(wall_clock(fall, "America/New_York"), "09:00");
    }

    #[test]
    fn cron_without_zone_is_utc() {
        let schedule = CronSchedule::Cron {
            expr: "30 8 * * *".into(),
            tz: None,
        };
        assert_eq!(
            next_run(&schedule, utc(2024, 5, 1, 9, 0)).unwrap(),
            Some(utc(2024, 5, 2, 8, 30))
        );
    }

    #[test]
    fn next_is_strictly_after_now() {
        let schedule = daily_nine("UTC");
        let now = utc(2024, 5, 1, 9, 0);
        assert_eq!(next_run(&schedule, now).unwrap(), Some(utc(2024, 5, 2, 9, 0)));
    }

    #[test]
    fn at_and_every() {
        let now = utc(2024, 1, 1, 0, 0);
        let later = utc(2024, 1, 2, 0, 0);
        assert_eq!(
            next_run(&CronSchedule::At { at: later }, now).unwrap(),
            Some(later)
        );
        assert_eq!(next_run(&CronSchedule::At { at: now }, later).unwrap(), None);
        assert_eq!(
            next_run(&CronSchedule::Every { every_secs: 90 }, now).unwrap(),
            Some(now + TimeDelta::seconds(90))
        );
    }

    #[test]
    fn validation_rejects_bad_schedules() {
        let now = utc(2024, 1, 1, 0, 0);
        let rejected = [
            CronSchedule::At { at: now },
            CronSchedule::Every { every_secs: 0 },
            CronSchedule::Cron {
                expr: "not a cron".into(),
                tz: None,
            },
            CronSchedule::Cron {
                expr: "0 9 * * *".into(),
                tz: Some("Mars/Olympus_Mons".into()),
            },
        ];
        for schedule in rejected {
            let err = validate(&schedule, now).unwrap_err();
            assert!(matches!(err, SkiffError::Scheduling(_)), "{schedule:?}");
        }
        assert!(validate(&daily_nine("Europe/Moscow"), now).is_ok());
    }
}
