use chrono::{DateTime, Duration, NaiveTime, TimeZone};

use crate::error::{AppError, AppResult};
use crate::models::AlarmRecord;

pub mod logging;

/// Interval choices offered for a repeating alarm, in minutes.
pub const INTERVAL_PRESET_MINUTES: [i64; 5] = [5, 10, 15, 30, 60];

pub fn minutes_to_millis(minutes: i64) -> i64 {
    minutes.saturating_mul(60_000)
}

/// The next instant at `hour:minute` strictly after `now`, in `now`'s time zone.
///
/// A time that already passed today resolves to tomorrow.
pub fn next_time_of_day<Tz: TimeZone>(
    hour: u32,
    minute: u32,
    now: &DateTime<Tz>,
) -> AppResult<DateTime<Tz>> {
    let time = NaiveTime::from_hms_opt(hour, minute, 0)
        .ok_or_else(|| AppError::invalid_input(format!("{}:{:02} is not a time of day", hour, minute)))?;

    let tz = now.timezone();
    let mut date = now.date_naive();
    // Two days covers both "later today" and "tomorrow"; a third absorbs a DST gap.
    for _ in 0..3 {
        if let Some(candidate) = tz.from_local_datetime(&date.and_time(time)).earliest() {
            if candidate > *now {
                return Ok(candidate);
            }
        }
        date = date
            .succ_opt()
            .ok_or_else(|| AppError::invalid_input("date out of range"))?;
    }

    Err(AppError::invalid_input(format!(
        "no upcoming {}:{:02} found",
        hour, minute
    )))
}

/// `HH:MM:SS` countdown, clamped at zero.
pub fn format_countdown(remaining_millis: i64) -> String {
    let remaining = Duration::milliseconds(remaining_millis.max(0));
    let hours = remaining.num_hours();
    let minutes = remaining.num_minutes() % 60;
    let seconds = remaining.num_seconds() % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

/// One-line summary used by list views and logs.
pub fn describe_alarm(record: &AlarmRecord) -> String {
    match record.interval_millis {
        Some(interval) if record.is_recurring() => format!(
            "{} - {} - Interval: {} minutes",
            record.display_name(),
            record.kind,
            interval / 60_000
        ),
        _ => format!("{} - {}", record.display_name(), record.kind),
    }
}
