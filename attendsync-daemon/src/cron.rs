//! Cron expressions, evaluated in UTC.
//!
//! Five fields (`min hour dom month dow`) or six with a leading seconds
//! field. Each field takes `*`, numbers, `a-b` ranges, `,` lists and `/n`
//! steps; month and weekday also take three-letter names, and weekday `7`
//! is Sunday. When both day-of-month and day-of-week are restricted a day
//! matches if either one does (Vixie cron semantics).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};

use crate::error::ScheduleError;

const MONTH_NAMES: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];
const WEEKDAY_NAMES: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

/// Give up searching for a fire time this many years past the start.
const SEARCH_YEARS: i32 = 5;

/// Set of allowed values for one field, as a bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldSet(u64);

impl FieldSet {
    fn contains(self, value: u32) -> bool {
        value < 64 && self.0 & (1 << value) != 0
    }
}

struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
    names: &'static [&'static str],
    /// Value of `names[0]`.
    name_base: u32,
}

const SECOND: FieldSpec = FieldSpec {
    name: "second",
    min: 0,
    max: 59,
    names: &[],
    name_base: 0,
};
const MINUTE: FieldSpec = FieldSpec {
    name: "minute",
    min: 0,
    max: 59,
    names: &[],
    name_base: 0,
};
const HOUR: FieldSpec = FieldSpec {
    name: "hour",
    min: 0,
    max: 23,
    names: &[],
    name_base: 0,
};
const DAY_OF_MONTH: FieldSpec = FieldSpec {
    name: "day-of-month",
    min: 1,
    max: 31,
    names: &[],
    name_base: 0,
};
const MONTH: FieldSpec = FieldSpec {
    name: "month",
    min: 1,
    max: 12,
    names: &MONTH_NAMES,
    name_base: 1,
};
// 7 is accepted and folded onto 0.
const DAY_OF_WEEK: FieldSpec = FieldSpec {
    name: "day-of-week",
    min: 0,
    max: 7,
    names: &WEEKDAY_NAMES,
    name_base: 0,
};

/// A parsed cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    expression: String,
    seconds: FieldSet,
    minutes: FieldSet,
    hours: FieldSet,
    days_of_month: FieldSet,
    months: FieldSet,
    days_of_week: FieldSet,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self, ScheduleError> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        let (seconds, rest) = match fields.len() {
            5 => (FieldSet(1), &fields[..]),
            6 => (parse_field(fields[0], &SECOND, expression)?, &fields[1..]),
            n => {
                return Err(ScheduleError::invalid(
                    expression,
                    format!("expected 5 or 6 fields, found {n}"),
                ))
            }
        };

        let mut days_of_week = parse_field(rest[4], &DAY_OF_WEEK, expression)?;
        if days_of_week.contains(7) {
            days_of_week = FieldSet((days_of_week.0 | 1) & !(1 << 7));
        }

        Ok(Self {
            expression: fields.join(" "),
            seconds,
            minutes: parse_field(rest[0], &MINUTE, expression)?,
            hours: parse_field(rest[1], &HOUR, expression)?,
            days_of_month: parse_field(rest[2], &DAY_OF_MONTH, expression)?,
            months: parse_field(rest[3], &MONTH, expression)?,
            days_of_week,
            dom_restricted: !rest[2].starts_with('*'),
            dow_restricted: !rest[4].starts_with('*'),
        })
    }

    /// Normalised source text.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First fire time strictly after `after`, or `None` if the expression
    /// never fires within the search horizon (e.g. `0 0 30 2 *`).
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = after.naive_utc().with_nanosecond(0)? + Duration::seconds(1);
        let last_year = start.year() + SEARCH_YEARS;
        let mut t = start;

        loop {
            if t.year() > last_year {
                return None;
            }
            if !self.months.contains(t.month()) {
                t = first_of_next_month(t.date())?;
                continue;
            }
            if !self.day_matches(t.date()) {
                t = t.date().succ_opt()?.and_hms_opt(0, 0, 0)?;
                continue;
            }
            if !self.hours.contains(t.hour()) {
                t = t.date().and_hms_opt(t.hour(), 0, 0)? + Duration::hours(1);
                continue;
            }
            if !self.minutes.contains(t.minute()) {
                t = t.date().and_hms_opt(t.hour(), t.minute(), 0)? + Duration::minutes(1);
                continue;
            }
            if !self.seconds.contains(t.second()) {
                t += Duration::seconds(1);
                continue;
            }
            return Some(Utc.from_utc_datetime(&t));
        }
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        let dom = self.days_of_month.contains(date.day());
        let dow = self
            .days_of_week
            .contains(date.weekday().num_days_from_sunday());
        if self.dom_restricted && self.dow_restricted {
            dom || dow
        } else {
            dom && dow
        }
    }
}

impl FromStr for CronSchedule {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

fn first_of_next_month(date: NaiveDate) -> Option<NaiveDateTime> {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)
}

fn parse_field(text: &str, spec: &FieldSpec, expression: &str) -> Result<FieldSet, ScheduleError> {
    let invalid = |reason: String| ScheduleError::invalid(expression, reason);
    let mut bits = 0u64;

    for part in text.split(',') {
        if part.is_empty() {
            return Err(invalid(format!("empty list item in {} field", spec.name)));
        }

        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .ok()
                    .filter(|s| *s > 0)
                    .ok_or_else(|| invalid(format!("bad step '{step}' in {} field", spec.name)))?;
                (range, Some(step))
            }
            None => (part, None),
        };

        let (low, high) = if range == "*" {
            (spec.min, spec.max)
        } else if let Some((a, b)) = range.split_once('-') {
            (value(a, spec, expression)?, value(b, spec, expression)?)
        } else {
            let v = value(range, spec, expression)?;
            // `5/15` means "from 5 in steps of 15".
            (v, if step.is_some() { spec.max } else { v })
        };

        if low > high {
            return Err(invalid(format!(
                "range {low}-{high} is reversed in {} field",
                spec.name
            )));
        }

        let step = step.unwrap_or(1) as usize;
        for v in (low..=high).step_by(step) {
            bits |= 1 << v;
        }
    }

    Ok(FieldSet(bits))
}

fn value(text: &str, spec: &FieldSpec, expression: &str) -> Result<u32, ScheduleError> {
    let parsed = text.parse::<u32>().ok().or_else(|| {
        spec.names
            .iter()
            .position(|name| name.eq_ignore_ascii_case(text))
            .map(|i| i as u32 + spec.name_base)
    });
    match parsed {
        Some(v) if (spec.min..=spec.max).contains(&v) => Ok(v),
        _ => Err(ScheduleError::invalid(
            expression,
            format!(
                "'{text}' is not a valid {} ({}-{})",
                spec.name, spec.min, spec.max
            ),
        )),
    }
}
