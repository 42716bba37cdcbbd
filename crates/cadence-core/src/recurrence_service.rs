//! Expansion of recurring obligations into dated occurrences.

use std::iter::FusedIterator;

use chrono::{Datelike, NaiveDate, Weekday};

use cadence_domain::{DateWindow, Frequency, Obligation, Occurrence};

use crate::{
    calendar::{
        add_days, clamped_day, month_after, next_weekday_on_or_after, nth_weekday_of_month,
        weekday_from_index,
    },
    CoreError,
};

const MAX_WEEK_OF_MONTH: u32 = 4;

/// Step policy derived once from an obligation's frequency fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cadence {
    EveryDays(u32),
    MonthlyOnDay { day: u32 },
    MonthlyOnWeekday { weekday: Weekday, ordinal: u32 },
    YearlyOnDay { month: u32, day: u32 },
    YearlyOnWeekday { month: u32, weekday: Weekday, ordinal: u32 },
}

impl Cadence {
    fn for_obligation(obligation: &Obligation) -> Self {
        let interval = obligation.effective_interval();
        let start = obligation.start();
        let weekday = obligation.day_of_week.and_then(weekday_from_index);
        let nth = weekday.zip(obligation.week_of_month);
        match obligation.frequency {
            Frequency::Daily | Frequency::Custom => Cadence::EveryDays(interval),
            Frequency::Weekly => Cadence::EveryDays(interval.saturating_mul(7)),
            Frequency::Monthly => match nth {
                Some((weekday, ordinal)) => Cadence::MonthlyOnWeekday { weekday, ordinal },
                None => Cadence::MonthlyOnDay { day: start.day() },
            },
            Frequency::Yearly => {
                let month = obligation.month_of_year.unwrap_or(start.month());
                match nth {
                    Some((weekday, ordinal)) => Cadence::YearlyOnWeekday {
                        month,
                        weekday,
                        ordinal,
                    },
                    None => Cadence::YearlyOnDay {
                        month,
                        day: start.day(),
                    },
                }
            }
        }
    }

    /// Candidate date inside the period (month or year) that contains `date`.
    fn in_period_of(self, date: NaiveDate) -> Option<NaiveDate> {
        match self {
            Cadence::EveryDays(_) => Some(date),
            Cadence::MonthlyOnDay { day } => clamped_day(date.year(), date.month(), day),
            Cadence::MonthlyOnWeekday { weekday, ordinal } => {
                nth_weekday_of_month(date.year(), date.month(), weekday, ordinal)
            }
            Cadence::YearlyOnDay { month, day } => clamped_day(date.year(), month, day),
            Cadence::YearlyOnWeekday {
                month,
                weekday,
                ordinal,
            } => nth_weekday_of_month(date.year(), month, weekday, ordinal),
        }
    }

    /// Candidate date in the period following the one containing `date`.
    fn in_next_period(self, date: NaiveDate) -> Option<NaiveDate> {
        match self {
            Cadence::EveryDays(days) => add_days(date, days),
            Cadence::MonthlyOnDay { .. } | Cadence::MonthlyOnWeekday { .. } => {
                let (year, month) = month_after(date, 1);
                self.in_period_of(NaiveDate::from_ymd_opt(year, month, 1)?)
            }
            Cadence::YearlyOnDay { .. } | Cadence::YearlyOnWeekday { .. } => {
                self.in_period_of(NaiveDate::from_ymd_opt(date.year() + 1, 1, 1)?)
            }
        }
    }
}

/// Lazy, finite sequence of occurrences for one obligation over one window.
/// Clone it to restart from the first occurrence.
#[derive(Debug, Clone)]
pub struct Occurrences<'a> {
    obligation: &'a Obligation,
    cadence: Cadence,
    window_from: NaiveDate,
    last: NaiveDate,
    cursor: Option<NaiveDate>,
}

impl<'a> Occurrences<'a> {
    fn new(obligation: &'a Obligation, window: DateWindow) -> Self {
        let cadence = Cadence::for_obligation(obligation);
        let first = first_occurrence(obligation, cadence);
        let cursor = first.and_then(|date| fast_forward(cadence, date, window.from));
        Self {
            obligation,
            cadence,
            window_from: window.from,
            last: obligation.last_date_within(window.to),
            cursor,
        }
    }

    fn occurrence_on(&self, date: NaiveDate) -> Occurrence {
        Occurrence {
            title: self.obligation.title.clone(),
            description: self.obligation.description.clone(),
            date,
            amount: self.obligation.signed_amount(),
        }
    }
}

impl Iterator for Occurrences<'_> {
    type Item = Occurrence;

    fn next(&mut self) -> Option<Occurrence> {
        loop {
            let date = self.cursor?;
            if date > self.last {
                self.cursor = None;
                return None;
            }
            self.cursor = self.cadence.in_next_period(date);
            if date >= self.window_from {
                return Some(self.occurrence_on(date));
            }
        }
    }
}

impl FusedIterator for Occurrences<'_> {}

fn first_occurrence(obligation: &Obligation, cadence: Cadence) -> Option<NaiveDate> {
    let start = obligation.start();
    if obligation.frequency == Frequency::Weekly {
        return match obligation.day_of_week.and_then(weekday_from_index) {
            Some(weekday) => next_weekday_on_or_after(start, weekday),
            None => Some(start),
        };
    }
    let candidate = cadence.in_period_of(start)?;
    if candidate >= start {
        Some(candidate)
    } else {
        cadence.in_next_period(candidate)
    }
}

/// Skips whole day-steps that end before the window opens.
fn fast_forward(cadence: Cadence, first: NaiveDate, window_from: NaiveDate) -> Option<NaiveDate> {
    match cadence {
        Cadence::EveryDays(days) if first < window_from => {
            let gap = (window_from - first).num_days() as u64;
            let steps = gap / days as u64;
            first.checked_add_days(chrono::Days::new(steps * days as u64))
        }
        _ => Some(first),
    }
}

/// Expands obligations into occurrences. Pure and side-effect free.
pub struct RecurrenceExpander;

impl RecurrenceExpander {
    /// Occurrences of `obligation` dated within `[from, to]`, never before the
    /// obligation begins and never after its end date.
    pub fn expand(
        obligation: &Obligation,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Occurrences<'_>, CoreError> {
        let window = DateWindow::new(from, to)?;
        Self::validate(obligation)?;
        Ok(Occurrences::new(obligation, window))
    }

    /// Collects every obligation's occurrences in the window, ordered by date.
    pub fn expand_all(
        obligations: &[Obligation],
        window: DateWindow,
    ) -> Result<Vec<Occurrence>, CoreError> {
        let mut occurrences = Vec::new();
        for obligation in obligations {
            occurrences.extend(Self::expand(obligation, window.from, window.to)?);
        }
        occurrences.sort_by_key(|occurrence| occurrence.date);
        Ok(occurrences)
    }

    pub fn validate(obligation: &Obligation) -> Result<(), CoreError> {
        if !obligation.amount.is_finite() {
            return Err(CoreError::Validation(format!(
                "obligation `{}` has a non-finite amount",
                obligation.title
            )));
        }
        if let Some(end) = obligation.end_date {
            if end < obligation.start() {
                return Err(CoreError::Validation(format!(
                    "obligation `{}` ends on {} before it begins on {}",
                    obligation.title,
                    end,
                    obligation.start()
                )));
            }
        }
        if let Some(day) = obligation.day_of_week {
            if weekday_from_index(day).is_none() {
                return Err(CoreError::Validation(format!(
                    "day of week {day} is outside 0..=6"
                )));
            }
        }
        if let Some(week) = obligation.week_of_month {
            if week > MAX_WEEK_OF_MONTH {
                return Err(CoreError::Validation(format!(
                    "week of month {week} is outside 0..={MAX_WEEK_OF_MONTH}"
                )));
            }
        }
        if let Some(month) = obligation.month_of_year {
            if !(1..=12).contains(&month) {
                return Err(CoreError::Validation(format!(
                    "month of year {month} is outside 1..=12"
                )));
            }
        }
        Ok(())
    }
}
