//! Schedules and next-fire computation.
//!
//! A [`Recurrence`] constrains up to five calendar fields. An unconstrained
//! field (`None`) accepts every value. All computation is in UTC with minute
//! resolution; dates that do not exist (the 30th of February, the 29th in a
//! common year) are skipped rather than rejected.

use std::collections::BTreeSet;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::time::Timestamp;

/// How far ahead the search for a matching instant may go.
///
/// Weekday + 29th of February rules repeat on a 28-year cycle, so the
/// horizon has to cover at least that.
const SEARCH_HORIZON_YEARS: i32 = 30;

/// When a cron job fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Schedule {
    /// Fire once at the given instant, then become consumed.
    Once { at: Timestamp },
    /// Fire at every instant matching the rule.
    Recurring { rule: Recurrence },
}

impl Schedule {
    /// Check the schedule can ever fire.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidSchedule`] when a field is out of
    /// range or the rule matches no date at all.
    pub fn validate(&self, now: Timestamp) -> Result<(), ValidationError> {
        match self {
            Self::Once { .. } => Ok(()),
            Self::Recurring { rule } => {
                rule.validate()?;
                if rule.next_after(now).is_none() {
                    return Err(ValidationError::InvalidSchedule(
                        "rule never matches a calendar date".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }

    #[must_use]
    pub fn is_once(&self) -> bool {
        matches!(self, Self::Once { .. })
    }
}

/// Field constraints of a recurring schedule.
///
/// `day_of_week` counts from Sunday (`0`) to Saturday (`6`). When both
/// `day_of_month` and `day_of_week` are constrained a date must satisfy both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurrence {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minute: Option<BTreeSet<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hour: Option<BTreeSet<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_month: Option<BTreeSet<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_week: Option<BTreeSet<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month: Option<BTreeSet<u32>>,
}

struct Field {
    name: &'static str,
    min: u32,
    max: u32,
}

const MINUTE: Field = Field {
    name: "minute",
    min: 0,
    max: 59,
};
const HOUR: Field = Field {
    name: "hour",
    min: 0,
    max: 23,
};
const DAY_OF_MONTH: Field = Field {
    name: "day of month",
    min: 1,
    max: 31,
};
const MONTH: Field = Field {
    name: "month",
    min: 1,
    max: 12,
};
const DAY_OF_WEEK: Field = Field {
    name: "day of week",
    min: 0,
    max: 6,
};

impl Recurrence {
    /// Parse a five-field crontab expression (`minute hour dom month dow`).
    ///
    /// Each field accepts `*`, a number, a range `a-b`, a step `*/n` or
    /// `a-b/n`, and comma-separated lists of those. A day of week of `7` is
    /// read as Sunday.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidSchedule`] for malformed or
    /// out-of-range fields.
    pub fn parse_crontab(expr: &str) -> Result<Self, ValidationError> {
        let parts: Vec<&str> = expr.split_whitespace().collect();
        let [minute, hour, dom, month, dow] = parts.as_slice() else {
            return Err(ValidationError::InvalidSchedule(format!(
                "expected 5 fields, got {} in {expr:?}",
                parts.len()
            )));
        };
        let day_of_week = parse_field(dow, &Field {
            max: 7,
            ..DAY_OF_WEEK
        })?
        .map(|days| days.into_iter().map(|d| d % 7).collect());
        let rule = Self {
            minute: parse_field(minute, &MINUTE)?,
            hour: parse_field(hour, &HOUR)?,
            day_of_month: parse_field(dom, &DAY_OF_MONTH)?,
            day_of_week,
            month: parse_field(month, &MONTH)?,
        };
        rule.validate()?;
        Ok(rule)
    }

    /// Check every constrained field is non-empty and in range.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidSchedule`] naming the bad field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let fields = [
            (&self.minute, &MINUTE),
            (&self.hour, &HOUR),
            (&self.day_of_month, &DAY_OF_MONTH),
            (&self.day_of_week, &DAY_OF_WEEK),
            (&self.month, &MONTH),
        ];
        for (values, field) in fields {
            let Some(values) = values else { continue };
            if values.is_empty() {
                return Err(ValidationError::InvalidSchedule(format!(
                    "{} has no allowed values",
                    field.name
                )));
            }
            if let Some(bad) = values.iter().find(|v| **v < field.min || **v > field.max) {
                return Err(ValidationError::InvalidSchedule(format!(
                    "{} {bad} outside {}..={}",
                    field.name, field.min, field.max
                )));
            }
        }
        Ok(())
    }

    /// Smallest whole-minute instant strictly after `after` satisfying every
    /// constrained field, or `None` if no such instant exists within the
    /// search horizon.
    #[must_use]
    pub fn next_after(&self, after: Timestamp) -> Option<Timestamp> {
        let start = after.naive_utc();
        let start = start.date().and_hms_opt(start.hour(), start.minute(), 0)? + Duration::minutes(1);
        let horizon = start.year() + SEARCH_HORIZON_YEARS;
        let mut t = start;

        loop {
            if t.year() > horizon {
                return None;
            }
            let date = t.date();
            if !allows(self.month.as_ref(), date.month()) {
                t = first_of_next_month(date)?.and_time(NaiveTime::MIN);
                continue;
            }
            if !self.allows_date(date) {
                t = date.succ_opt()?.and_time(NaiveTime::MIN);
                continue;
            }
            if !allows(self.hour.as_ref(), t.hour()) {
                t = top_of_hour(t)? + Duration::hours(1);
                continue;
            }
            if !allows(self.minute.as_ref(), t.minute()) {
                t += Duration::minutes(1);
                continue;
            }
            return Some(t.and_utc());
        }
    }

    /// Whether `instant` (truncated to the minute) satisfies the rule.
    #[must_use]
    pub fn matches(&self, instant: Timestamp) -> bool {
        let t = instant.naive_utc();
        allows(self.month.as_ref(), t.month())
            && self.allows_date(t.date())
            && allows(self.hour.as_ref(), t.hour())
            && allows(self.minute.as_ref(), t.minute())
    }

    fn allows_date(&self, date: NaiveDate) -> bool {
        allows(self.day_of_month.as_ref(), date.day())
            && allows(
                self.day_of_week.as_ref(),
                date.weekday().num_days_from_sunday(),
            )
    }
}

fn allows(values: Option<&BTreeSet<u32>>, value: u32) -> bool {
    values.is_none_or(|set| set.contains(&value))
}

fn first_of_next_month(date: NaiveDate) -> Option<NaiveDate> {
    if date.month() == 12 {
        NaiveDate::from_ymd_opt(date.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(date.year(), date.month() + 1, 1)
    }
}

fn top_of_hour(t: NaiveDateTime) -> Option<NaiveDateTime> {
    t.date().and_hms_opt(t.hour(), 0, 0)
}

fn parse_field(text: &str, field: &Field) -> Result<Option<BTreeSet<u32>>, ValidationError> {
    if text == "*" {
        return Ok(None);
    }
    let bad = || ValidationError::InvalidSchedule(format!("bad {} field {text:?}", field.name));
    let number = |s: &str| s.parse::<u32>().map_err(|_| bad());

    let mut values = BTreeSet::new();
    for item in text.split(',') {
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => (range, number(step)?),
            None => (item, 1),
        };
        if step == 0 {
            return Err(bad());
        }
        let (lo, hi) = if range == "*" {
            (field.min, field.max)
        } else if let Some((lo, hi)) = range.split_once('-') {
            (number(lo)?, number(hi)?)
        } else {
            let v = number(range)?;
            let hi = if item.contains('/') { field.max } else { v };
            (v, hi)
        };
        if lo > hi || lo < field.min || hi > field.max {
            return Err(bad());
        }
        values.extend((lo..=hi).step_by(step as usize));
    }
    Ok(Some(values))
}
