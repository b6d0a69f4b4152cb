//! Trading calendar gate: is today the last trading session of the month?
//!
//! The gate scans backward from the month's final calendar day until the
//! calendar reports a session. A calendar that cannot answer for a date fails
//! the gate with [`Error::CalendarUnavailable`] instead of reporting "not a
//! rebalance day", so a missed month is always surfaced.

use std::collections::BTreeSet;

use chrono::{Datelike, Days, NaiveDate, Weekday};

use crate::error::{Error, Result};

/// Source of trading sessions.
pub trait TradingCalendar {
    /// Whether the exchange holds a regular session on `date`.
    fn is_session(&self, date: NaiveDate) -> Result<bool>;
}

impl<T: TradingCalendar + ?Sized> TradingCalendar for &T {
    fn is_session(&self, date: NaiveDate) -> Result<bool> {
        (**self).is_session(date)
    }
}

impl<T: TradingCalendar + ?Sized> TradingCalendar for Box<T> {
    fn is_session(&self, date: NaiveDate) -> Result<bool> {
        (**self).is_session(date)
    }
}

/// Last calendar day of `year`-`month`, or `None` for an invalid month.
pub fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()
}

/// The last trading session of `year`-`month`.
pub fn last_session_of_month<C: TradingCalendar + ?Sized>(
    year: i32,
    month: u32,
    calendar: &C,
) -> Result<NaiveDate> {
    let unavailable = |date: NaiveDate, reason: &str| Error::CalendarUnavailable {
        date,
        reason: reason.to_string(),
    };

    let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| Error::CalendarUnavailable {
        date: NaiveDate::MIN,
        reason: format!("invalid month {year}-{month:02}"),
    })?;
    let mut day = last_day_of_month(year, month)
        .ok_or_else(|| unavailable(first, "month end out of range"))?;

    while day >= first {
        if calendar.is_session(day)? {
            return Ok(day);
        }
        day = match day.pred_opt() {
            Some(prev) => prev,
            None => break,
        };
    }

    Err(unavailable(first, "no trading session in month"))
}

/// True iff `today` is the last trading session of its month.
pub fn is_rebalance_day<C: TradingCalendar + ?Sized>(today: NaiveDate, calendar: &C) -> Result<bool> {
    Ok(last_session_of_month(today.year(), today.month(), calendar)? == today)
}

/// The first rebalance day on or after `from`.
pub fn next_rebalance_day<C: TradingCalendar + ?Sized>(
    from: NaiveDate,
    calendar: &C,
) -> Result<NaiveDate> {
    let this_month = last_session_of_month(from.year(), from.month(), calendar)?;
    if this_month >= from {
        return Ok(this_month);
    }
    let (year, month) = if from.month() == 12 {
        (from.year() + 1, 1)
    } else {
        (from.year(), from.month() + 1)
    };
    last_session_of_month(year, month, calendar)
}

/// Rule-based NYSE calendar.
///
/// Knows the regular NYSE holiday schedule and its weekend observance rules,
/// the unscheduled closures since 2000, and any extra closures added with
/// [`NyseCalendar::with_closures`]. Dates outside the supported year range are
/// [`Error::CalendarUnavailable`].
#[derive(Debug, Clone)]
pub struct NyseCalendar {
    first_year: i32,
    last_year: i32,
    closures: BTreeSet<NaiveDate>,
}

/// Full-day closures outside the regular holiday rules.
const UNSCHEDULED_CLOSURES: &[(i32, u32, u32)] = &[
    (2001, 9, 11),
    (2001, 9, 12),
    (2001, 9, 13),
    (2001, 9, 14),
    (2004, 6, 11),
    (2007, 1, 2),
    (2012, 10, 29),
    (2012, 10, 30),
    (2018, 12, 5),
    (2025, 1, 9),
];

impl Default for NyseCalendar {
    fn default() -> Self {
        Self::new()
    }
}

impl NyseCalendar {
    pub const FIRST_YEAR: i32 = 2000;
    pub const LAST_YEAR: i32 = 2099;

    pub fn new() -> Self {
        let closures = UNSCHEDULED_CLOSURES
            .iter()
            .filter_map(|&(y, m, d)| NaiveDate::from_ymd_opt(y, m, d))
            .collect();
        Self {
            first_year: Self::FIRST_YEAR,
            last_year: Self::LAST_YEAR,
            closures,
        }
    }

    /// Add full-day closures (e.g. a national day of mourning announced
    /// after this table was written).
    pub fn with_closures(mut self, dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.closures.extend(dates);
        self
    }

    /// Restrict the years the calendar answers for. Years outside the
    /// built-in range stay unavailable.
    pub fn with_year_range(mut self, first_year: i32, last_year: i32) -> Self {
        self.first_year = first_year.max(Self::FIRST_YEAR);
        self.last_year = last_year.min(Self::LAST_YEAR);
        self
    }

    /// Regular NYSE holidays observed in `year`, sorted.
    pub fn holidays(year: i32) -> Vec<NaiveDate> {
        let mut days = Vec::with_capacity(10);

        // New Year's Day: a Saturday holiday is not moved to Friday.
        if let Some(d) = NaiveDate::from_ymd_opt(year, 1, 1) {
            match d.weekday() {
                Weekday::Sat => {}
                Weekday::Sun => days.extend(d.succ_opt()),
                _ => days.push(d),
            }
        }
        days.extend(NaiveDate::from_weekday_of_month_opt(year, 1, Weekday::Mon, 3));
        days.extend(NaiveDate::from_weekday_of_month_opt(year, 2, Weekday::Mon, 3));
        days.extend(easter_sunday(year).and_then(|e| e.checked_sub_days(Days::new(2))));
        days.extend(last_weekday_of_month(year, 5, Weekday::Mon));
        if year >= 2022 {
            days.extend(NaiveDate::from_ymd_opt(year, 6, 19).and_then(observed));
        }
        days.extend(NaiveDate::from_ymd_opt(year, 7, 4).and_then(observed));
        days.extend(NaiveDate::from_weekday_of_month_opt(year, 9, Weekday::Mon, 1));
        days.extend(NaiveDate::from_weekday_of_month_opt(year, 11, Weekday::Thu, 4));
        days.extend(NaiveDate::from_ymd_opt(year, 12, 25).and_then(observed));

        days.sort();
        days
    }

    /// True for regular holidays and known closures (weekends excluded).
    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.closures.contains(&date) || Self::holidays(date.year()).contains(&date)
    }
}

impl TradingCalendar for NyseCalendar {
    fn is_session(&self, date: NaiveDate) -> Result<bool> {
        let year = date.year();
        if year < self.first_year || year > self.last_year {
            return Err(Error::CalendarUnavailable {
                date,
                reason: format!(
                    "no session data outside {}..={}",
                    self.first_year, self.last_year
                ),
            });
        }
        if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            return Ok(false);
        }
        Ok(!self.is_holiday(date))
    }
}

/// Saturday holidays are observed Friday, Sunday holidays Monday.
fn observed(date: NaiveDate) -> Option<NaiveDate> {
    match date.weekday() {
        Weekday::Sat => date.pred_opt(),
        Weekday::Sun => date.succ_opt(),
        _ => Some(date),
    }
}

fn last_weekday_of_month(year: i32, month: u32, weekday: Weekday) -> Option<NaiveDate> {
    let mut day = last_day_of_month(year, month)?;
    while day.weekday() != weekday {
        day = day.pred_opt()?;
    }
    Some(day)
}

/// Gregorian Easter Sunday (anonymous algorithm).
fn easter_sunday(year: i32) -> Option<NaiveDate> {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;
    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
}
