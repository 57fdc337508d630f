//! UTC calendar-day helpers used by daily quotas and counters

use chrono::{DateTime, Days, NaiveTime, Utc};

/// Calendar day key (`YYYY-MM-DD`) for the UTC day containing `now`
pub fn utc_day(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d").to_string()
}

/// Start of the next UTC day
pub fn next_utc_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    let today = now.date_naive();
    let tomorrow = today.checked_add_days(Days::new(1)).unwrap_or(today);
    tomorrow.and_time(NaiveTime::MIN).and_utc()
}

/// Whole seconds until the next UTC midnight, never less than one
pub fn seconds_until_utc_midnight(now: DateTime<Utc>) -> u64 {
    let remaining = (next_utc_midnight(now) - now).num_seconds();
    u64::try_from(remaining).unwrap_or(0).max(1)
}
