//! Date predicates: `after`/`before` bounds, partial-date matches and ages.
//!
//! An age such as `"5"` (years) or `"3m"` is turned into the window of birth
//! dates whose age, truncated to the finest unit written, equals the period.

use std::sync::LazyLock;

use chrono::{Days, Months, NaiveDate};
use regex::Regex;
use sea_query::{Condition, LikeExpr, SimpleExpr, Value};

use crate::ast::{FilterSpec, JoinMode};
use crate::clause::ClauseScope;
use crate::sql_compiler::ColumnRef;

use super::{escape_like, literal_text, LIKE_ESCAPE};

const DATE_FORMAT: &str = "%Y-%m-%d";

static PERIOD_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+[ymwd]?)+$").expect("period shape pattern"));
static PERIOD_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)([ymwd]?)").expect("period token pattern"));
static PARTIAL_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})(?:-(\d{1,2})(?:-(\d{1,2}))?)?$").expect("partial date pattern")
});

/// Smallest unit written in a period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precision {
    Year,
    Month,
    Week,
    Day,
}

/// A period like `2y6m`. A bare number counts years.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Period {
    pub years: u32,
    pub months: u32,
    pub weeks: u32,
    pub days: u32,
}

impl Period {
    pub fn parse(raw: &str) -> Option<Self> {
        let compact: String = raw
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();
        if !PERIOD_SHAPE.is_match(&compact) {
            return None;
        }

        let mut period = Period::default();
        for token in PERIOD_TOKEN.captures_iter(&compact) {
            let amount: u32 = token[1].parse().ok()?;
            let slot = match &token[2] {
                "m" => &mut period.months,
                "w" => &mut period.weeks,
                "d" => &mut period.days,
                _ => &mut period.years,
            };
            *slot = slot.checked_add(amount)?;
        }
        Some(period)
    }

    pub fn precision(&self) -> Precision {
        if self.days > 0 {
            Precision::Day
        } else if self.weeks > 0 {
            Precision::Week
        } else if self.months > 0 {
            Precision::Month
        } else {
            Precision::Year
        }
    }

    fn subtract_from(&self, date: NaiveDate) -> Option<NaiveDate> {
        let months = self.years.checked_mul(12)?.checked_add(self.months)?;
        let days = self.weeks.checked_mul(7)?.checked_add(self.days)?;
        date.checked_sub_months(Months::new(months))?
            .checked_sub_days(Days::new(u64::from(days)))
    }
}

fn subtract_unit(date: NaiveDate, precision: Precision) -> Option<NaiveDate> {
    match precision {
        Precision::Year => date.checked_sub_months(Months::new(12)),
        Precision::Month => date.checked_sub_months(Months::new(1)),
        Precision::Week => date.checked_sub_days(Days::new(7)),
        Precision::Day => date.checked_sub_days(Days::new(1)),
    }
}

/// Inclusive window of birth dates for an age.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgeWindow {
    pub earliest: NaiveDate,
    pub latest: NaiveDate,
}

impl AgeWindow {
    pub fn compute(period: &Period, today: NaiveDate) -> Option<Self> {
        let latest = period.subtract_from(today)?;
        let earliest = subtract_unit(latest, period.precision())?.checked_add_days(Days::new(1))?;
        Some(Self { earliest, latest })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.earliest <= date && date <= self.latest
    }
}

/// A date written with year, month or day precision, matching `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PartialDate {
    text: String,
    start: NaiveDate,
    end: NaiveDate,
}

impl PartialDate {
    fn parse(raw: &str) -> Option<Self> {
        let caps = PARTIAL_DATE.captures(raw.trim())?;
        let year: i32 = caps[1].parse().ok()?;
        let month: Option<u32> = caps.get(2).and_then(|m| m.as_str().parse().ok());
        let day: Option<u32> = caps.get(3).and_then(|d| d.as_str().parse().ok());

        let (text, start, end) = match (month, day) {
            (Some(month), Some(day)) => {
                let start = NaiveDate::from_ymd_opt(year, month, day)?;
                (start.format(DATE_FORMAT).to_string(), start, start.checked_add_days(Days::new(1))?)
            }
            (Some(month), None) => {
                let start = NaiveDate::from_ymd_opt(year, month, 1)?;
                (format!("{:04}-{:02}", year, month), start, start.checked_add_months(Months::new(1))?)
            }
            _ => {
                let start = NaiveDate::from_ymd_opt(year, 1, 1)?;
                (format!("{:04}", year), start, start.checked_add_months(Months::new(12))?)
            }
        };
        Some(Self { text, start, end })
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    // Accept full timestamps by keeping their date part.
    let date_part = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, DATE_FORMAT).ok()
}

#[derive(Debug, Clone, PartialEq)]
pub struct DateFilter {
    /// Inclusive lower bound.
    after: Option<NaiveDate>,
    /// Inclusive upper bound.
    before: Option<NaiveDate>,
    exact: Vec<PartialDate>,
    /// Stored as `yyyy-MM-dd` text rather than as a native date.
    encrypted: bool,
}

impl DateFilter {
    pub fn from_spec(spec: &FilterSpec, encrypted: bool, today: NaiveDate) -> Self {
        let age = spec
            .age
            .as_deref()
            .and_then(Period::parse)
            .and_then(|period| AgeWindow::compute(&period, today));

        let (after, before) = match age {
            Some(window) => (Some(window.earliest), Some(window.latest)),
            None => (
                spec.after.as_deref().and_then(parse_date),
                spec.before.as_deref().and_then(parse_date),
            ),
        };

        Self {
            after,
            before,
            exact: spec
                .values
                .iter()
                .filter_map(literal_text)
                .filter_map(|text| PartialDate::parse(&text))
                .collect(),
            encrypted,
        }
    }

    pub fn bounds(&self) -> (Option<NaiveDate>, Option<NaiveDate>) {
        (self.after, self.before)
    }

    pub fn is_valid(&self) -> bool {
        self.after.is_some() || self.before.is_some() || !self.exact.is_empty()
    }

    fn bound(&self, date: NaiveDate) -> Value {
        if self.encrypted {
            Value::from(date.format(DATE_FORMAT).to_string())
        } else {
            Value::from(date)
        }
    }

    pub fn emit(&self, column: &ColumnRef, negate: bool) -> Option<Condition> {
        let mut scope = ClauseScope::new(JoinMode::And).negated(negate);

        if let Some(after) = self.after {
            scope = scope.append(column.expr().gte(self.bound(after)));
        }
        if let Some(before) = self.before {
            // The upper bound is inclusive: everything before the next day.
            if let Some(next) = before.checked_add_days(Days::new(1)) {
                scope = scope.append(column.expr().lt(self.bound(next)));
            }
        }

        if !self.exact.is_empty() {
            let mut any = scope.open(JoinMode::Or);
            for date in &self.exact {
                any = any.append_opt(self.match_partial(column, date));
            }
            scope = scope.close(any);
        }

        scope.finish()
    }

    fn match_partial(&self, column: &ColumnRef, date: &PartialDate) -> Option<Condition> {
        if self.encrypted {
            let pattern = LikeExpr::new(format!("{}%", escape_like(&date.text))).escape(LIKE_ESCAPE);
            let like: SimpleExpr = column.expr().like(pattern);
            return ClauseScope::new(JoinMode::And).append(like).finish();
        }
        ClauseScope::new(JoinMode::And)
            .append(column.expr().gte(self.bound(date.start)))
            .append(column.expr().lt(self.bound(date.end)))
            .finish()
    }
}
