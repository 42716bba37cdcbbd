//! Occurrences, ledger entries, and the date windows they are generated over.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
/// Inclusive date range `[from, to]`.
pub struct DateWindow {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateWindow {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self, DateWindowError> {
        if to < from {
            return Err(DateWindowError::InvalidRange { from, to });
        }
        Ok(Self { from, to })
    }

    pub fn single_day(day: NaiveDate) -> Self {
        Self { from: day, to: day }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.from && date <= self.to
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Errors that can occur when constructing [`DateWindow`] values.
pub enum DateWindowError {
    InvalidRange { from: NaiveDate, to: NaiveDate },
}

impl fmt::Display for DateWindowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateWindowError::InvalidRange { from, to } => {
                write!(f, "window end {to} is before start {from}")
            }
        }
    }
}

impl std::error::Error for DateWindowError {}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// One concrete, dated instance of an obligation. Never persisted.
pub struct Occurrence {
    pub title: String,
    pub description: String,
    pub date: NaiveDate,
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
/// A money movement on an account. Entries with an `id` are realized and already
/// folded into the account's current balance; entries without one are projected.
pub struct LedgerEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_modified: Option<NaiveDateTime>,
    pub amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<f64>,
}

impl LedgerEntry {
    pub fn realized(id: impl Into<String>, date: NaiveDate, amount: f64) -> Self {
        Self {
            id: Some(id.into()),
            date,
            date_modified: None,
            amount,
            balance: None,
        }
    }

    pub fn projected(date: NaiveDate, amount: f64) -> Self {
        Self {
            id: None,
            date,
            date_modified: None,
            amount,
            balance: None,
        }
    }

    pub fn is_realized(&self) -> bool {
        self.id.is_some()
    }
}

impl From<Occurrence> for LedgerEntry {
    fn from(occurrence: Occurrence) -> Self {
        LedgerEntry::projected(occurrence.date, occurrence.amount)
    }
}

impl From<&Occurrence> for LedgerEntry {
    fn from(occurrence: &Occurrence) -> Self {
        LedgerEntry::projected(occurrence.date, occurrence.amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn window_rejects_reversed_range() {
        assert!(DateWindow::new(day(10), day(9)).is_err());
        let single = DateWindow::new(day(9), day(9)).expect("single day window");
        assert!(single.contains(day(9)));
        assert!(!single.contains(day(10)));
    }

    #[test]
    fn occurrences_convert_to_projected_entries() {
        let occurrence = Occurrence {
            title: "Rent".into(),
            description: String::new(),
            date: day(1),
            amount: -900.0,
        };
        let entry = LedgerEntry::from(&occurrence);
        assert!(!entry.is_realized());
        assert_eq!(entry.amount, -900.0);
        assert_eq!(entry.balance, None);
    }
}
