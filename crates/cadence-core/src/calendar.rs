//! Pure calendar arithmetic. Every helper returns a fresh date and never
//! mutates its input; `None` means the result falls outside chrono's range.

use chrono::{Datelike, Days, NaiveDate, Weekday};

/// Maps 0 = Sunday .. 6 = Saturday onto [`Weekday`].
pub fn weekday_from_index(index: u32) -> Option<Weekday> {
    match index {
        0 => Some(Weekday::Sun),
        1 => Some(Weekday::Mon),
        2 => Some(Weekday::Tue),
        3 => Some(Weekday::Wed),
        4 => Some(Weekday::Thu),
        5 => Some(Weekday::Fri),
        6 => Some(Weekday::Sat),
        _ => None,
    }
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first_next| first_next.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}

/// The given day of the month, clamped to the month's length.
pub fn clamped_day(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let day = day.clamp(1, days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Year and month `months` after the month containing `date`.
pub fn month_after(date: NaiveDate, months: u32) -> (i32, u32) {
    let index = date.year() * 12 + date.month0() as i32 + months as i32;
    (index.div_euclid(12), index.rem_euclid(12) as u32 + 1)
}

/// Same month and day `years` later, clamped for February 29th.
pub fn add_years(date: NaiveDate, years: i32) -> Option<NaiveDate> {
    clamped_day(date.year().checked_add(years)?, date.month(), date.day())
}

pub fn add_days(date: NaiveDate, days: u32) -> Option<NaiveDate> {
    date.checked_add_days(Days::new(days as u64))
}

/// First date on or after `date` that falls on `weekday`.
pub fn next_weekday_on_or_after(date: NaiveDate, weekday: Weekday) -> Option<NaiveDate> {
    let current = date.weekday().num_days_from_sunday();
    let target = weekday.num_days_from_sunday();
    add_days(date, (target + 7 - current) % 7)
}

/// The `ordinal`-th (zero-based) `weekday` of a month. Months without that many
/// matching weekdays resolve to the last one, since every month has at least four.
pub fn nth_weekday_of_month(
    year: i32,
    month: u32,
    weekday: Weekday,
    ordinal: u32,
) -> Option<NaiveDate> {
    let n = u8::try_from(ordinal + 1).ok()?;
    NaiveDate::from_weekday_of_month_opt(year, month, weekday, n)
        .or_else(|| NaiveDate::from_weekday_of_month_opt(year, month, weekday, 4))
}
