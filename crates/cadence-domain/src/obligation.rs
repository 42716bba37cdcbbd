//! Recurring financial obligations and their money-flow direction.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::common::{flexible_datetime, Frequency};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
/// Which side of a transfer an obligation represents.
pub enum TransferLeg {
    Outgoing,
    Incoming,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
/// Classifies an obligation and therefore the sign of its occurrences.
pub enum ObligationKind {
    Expense,
    Loan,
    Transfer(TransferLeg),
    Payroll,
}

impl ObligationKind {
    /// `-1.0` for money leaving the account, `1.0` for money arriving.
    pub fn sign(self) -> f64 {
        match self {
            ObligationKind::Expense
            | ObligationKind::Loan
            | ObligationKind::Transfer(TransferLeg::Outgoing) => -1.0,
            ObligationKind::Payroll | ObligationKind::Transfer(TransferLeg::Incoming) => 1.0,
        }
    }

    /// Applies the kind's direction to an amount regardless of the amount's own sign.
    pub fn signed(self, amount: f64) -> f64 {
        self.sign() * amount.abs()
    }

    pub fn slug(self) -> &'static str {
        match self {
            ObligationKind::Expense => "expense",
            ObligationKind::Loan => "loan",
            ObligationKind::Transfer(_) => "transfer",
            ObligationKind::Payroll => "payroll",
        }
    }
}

impl fmt::Display for ObligationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ObligationKind::Expense => "Expense",
            ObligationKind::Loan => "Loan",
            ObligationKind::Transfer(TransferLeg::Outgoing) => "Transfer (out)",
            ObligationKind::Transfer(TransferLeg::Incoming) => "Transfer (in)",
            ObligationKind::Payroll => "Payroll",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
/// A recurring commitment. Immutable once built; the amount is stored as a
/// magnitude and signed through [`ObligationKind::signed`].
pub struct Obligation {
    pub kind: ObligationKind,
    pub amount: f64,
    #[serde(with = "flexible_datetime")]
    pub begin_date: NaiveDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    pub frequency: Frequency,
    #[serde(default = "Obligation::default_interval")]
    pub interval_multiplier: i64,
    /// 0 = Sunday through 6 = Saturday.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_week: Option<u32>,
    /// Zero-based ordinal of the weekday within the month (1 = second).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub week_of_month: Option<u32>,
    /// 1 = January through 12 = December.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month_of_year: Option<u32>,
    pub title: String,
    #[serde(default)]
    pub description: String,
}

impl Obligation {
    pub fn new(
        kind: ObligationKind,
        title: impl Into<String>,
        amount: f64,
        begin_date: NaiveDateTime,
        frequency: Frequency,
    ) -> Self {
        Self {
            kind,
            amount,
            begin_date,
            end_date: None,
            frequency,
            interval_multiplier: Self::default_interval(),
            day_of_week: None,
            week_of_month: None,
            month_of_year: None,
            title: title.into(),
            description: String::new(),
        }
    }

    /// Builds the two legs of a transfer: the source account's outflow and the
    /// destination account's inflow, sharing every schedule field.
    pub fn transfer_pair(
        title: impl Into<String>,
        amount: f64,
        begin_date: NaiveDateTime,
        frequency: Frequency,
    ) -> (Self, Self) {
        let outgoing = Self::new(
            ObligationKind::Transfer(TransferLeg::Outgoing),
            title,
            amount,
            begin_date,
            frequency,
        );
        let mut incoming = outgoing.clone();
        incoming.kind = ObligationKind::Transfer(TransferLeg::Incoming);
        (outgoing, incoming)
    }

    pub fn default_interval() -> i64 {
        1
    }

    pub fn with_end_date(mut self, end_date: NaiveDate) -> Self {
        self.end_date = Some(end_date);
        self
    }

    pub fn with_interval(mut self, interval_multiplier: i64) -> Self {
        self.interval_multiplier = interval_multiplier;
        self
    }

    pub fn with_day_of_week(mut self, day_of_week: u32) -> Self {
        self.day_of_week = Some(day_of_week);
        self
    }

    pub fn with_week_of_month(mut self, week_of_month: u32) -> Self {
        self.week_of_month = Some(week_of_month);
        self
    }

    pub fn with_month_of_year(mut self, month_of_year: u32) -> Self {
        self.month_of_year = Some(month_of_year);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn start(&self) -> NaiveDate {
        self.begin_date.date()
    }

    /// Interval floored to 1 so that stepping always terminates.
    pub fn effective_interval(&self) -> u32 {
        self.interval_multiplier.clamp(1, u32::MAX as i64) as u32
    }

    pub fn signed_amount(&self) -> f64 {
        self.kind.signed(self.amount)
    }

    /// Last date an occurrence may fall on given a window end.
    pub fn last_date_within(&self, window_end: NaiveDate) -> NaiveDate {
        match self.end_date {
            Some(end) if end < window_end => end,
            _ => window_end,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn begin() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap()
    }

    #[test]
    fn kinds_sign_amounts_by_direction() {
        assert_eq!(ObligationKind::Expense.signed(120.0), -120.0);
        assert_eq!(ObligationKind::Loan.signed(-80.0), -80.0);
        assert_eq!(ObligationKind::Payroll.signed(-2500.0), 2500.0);
        assert_eq!(
            ObligationKind::Transfer(TransferLeg::Incoming).signed(50.0),
            50.0
        );
    }

    #[test]
    fn transfer_pair_mirrors_schedule_with_opposite_signs() {
        let (out, inc) = Obligation::transfer_pair("Savings", 300.0, begin(), Frequency::Monthly);
        assert_eq!(out.signed_amount(), -300.0);
        assert_eq!(inc.signed_amount(), 300.0);
        assert_eq!(out.begin_date, inc.begin_date);
        assert_eq!(out.frequency, inc.frequency);
    }

    #[test]
    fn effective_interval_floors_non_positive_values() {
        let obligation =
            Obligation::new(ObligationKind::Expense, "Rent", 1.0, begin(), Frequency::Daily);
        assert_eq!(obligation.clone().with_interval(0).effective_interval(), 1);
        assert_eq!(obligation.clone().with_interval(-4).effective_interval(), 1);
        assert_eq!(obligation.with_interval(3).effective_interval(), 3);
    }

    #[test]
    fn deserializes_camel_case_payload() {
        let json = r#"{
            "kind": "expense",
            "amount": 42.5,
            "beginDate": "2021-07-19T13:30",
            "frequency": "monthly",
            "dayOfWeek": 3,
            "weekOfMonth": 1,
            "title": "Gym"
        }"#;
        let obligation: Obligation = serde_json::from_str(json).expect("deserialize");
        assert_eq!(obligation.interval_multiplier, 1);
        assert_eq!(obligation.day_of_week, Some(3));
        assert_eq!(obligation.begin_date.format("%H:%M").to_string(), "13:30");
        assert!(obligation.description.is_empty());
    }
}
