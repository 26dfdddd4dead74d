//! Time and timestamp helpers.
//!
//! All engine times are UTC; schedules never consult a local timezone.

use chrono::{DateTime, TimeZone, Utc};

/// UTC timestamp used for creation times, run-state and event times.
pub type Timestamp = DateTime<Utc>;

/// Return the current UTC time.
#[must_use]
pub fn now() -> Timestamp {
    Utc::now()
}

/// Build a UTC timestamp from calendar fields, `None` if they do not exist.
#[must_use]
pub fn utc(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> Option<Timestamp> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0).single()
}
