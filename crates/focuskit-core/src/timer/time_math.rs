//! Pure conversions between timestamps and second counts.
//!
//! Elapsed values always floor and remaining values always ceil, so a session
//! is never credited for more minutes than it ran and a countdown never shows
//! negative time.

use chrono::{DateTime, Duration, Utc};

/// Seconds left until `end`, rounded up and clamped at zero.
pub fn remaining_seconds(end: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let ms = (end - now).num_milliseconds();
    if ms <= 0 {
        0
    } else {
        ((ms + 999) / 1000) as u64
    }
}

/// Seconds since `start`, rounded down and clamped at zero.
pub fn elapsed_seconds(start: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let ms = (now - start).num_milliseconds();
    if ms <= 0 {
        0
    } else {
        (ms / 1000) as u64
    }
}

/// End timestamp for a countdown resumed at `now` with `remaining` seconds left.
pub fn resume_end_timestamp(now: DateTime<Utc>, remaining: u64) -> DateTime<Utc> {
    now + Duration::seconds(remaining as i64)
}

/// Start timestamp that makes a countdown of `selected_minutes` show
/// `remaining` seconds at `now`.
pub fn resume_start_for_countdown(
    now: DateTime<Utc>,
    selected_minutes: u32,
    remaining: u64,
) -> DateTime<Utc> {
    let worked = minutes_to_seconds(selected_minutes).saturating_sub(remaining);
    now - Duration::seconds(worked as i64)
}

/// Start timestamp that makes an open-ended run show `elapsed` seconds at `now`.
pub fn resume_start_for_open_ended(now: DateTime<Utc>, elapsed: u64) -> DateTime<Utc> {
    now - Duration::seconds(elapsed as i64)
}

pub fn minutes_to_seconds(minutes: u32) -> u64 {
    minutes as u64 * 60
}

/// Whole minutes contained in `seconds` (floored).
pub fn whole_minutes(seconds: u64) -> u32 {
    (seconds / 60).min(u32::MAX as u64) as u32
}
