use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{MinorUnits, Transaction, TransactionKind};

/// Category id reported for expenses recorded without a merchant category code.
pub const UNCATEGORIZED: &str = "uncategorized";

/// Months of history the forecast averages over.
pub const FORECAST_LOOKBACK_MONTHS: u32 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimePeriod {
    #[default]
    Month,
    Quarter,
    Year,
}

impl TimePeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimePeriod::Month => "month",
            TimePeriod::Quarter => "quarter",
            TimePeriod::Year => "year",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "month" => Some(TimePeriod::Month),
            "quarter" => Some(TimePeriod::Quarter),
            "year" => Some(TimePeriod::Year),
            _ => None,
        }
    }

    /// Unrecognized groupings fall back to monthly buckets.
    pub fn parse_or_default(s: &str) -> Self {
        Self::from_str(s).unwrap_or_default()
    }

    /// Length of a calendar bucket.
    pub fn bucket_months(&self) -> u32 {
        match self {
            TimePeriod::Month => 1,
            TimePeriod::Quarter => 3,
            TimePeriod::Year => 12,
        }
    }

    /// Distance between consecutive forecast periods. A forecast "quarter"
    /// advances four months.
    pub fn forecast_step_months(&self) -> u32 {
        match self {
            TimePeriod::Month => 1,
            TimePeriod::Quarter => 4,
            TimePeriod::Year => 12,
        }
    }

    /// Truncate a timestamp to the start of its calendar bucket.
    pub fn truncate(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let month = match self {
            TimePeriod::Month => at.month(),
            TimePeriod::Quarter => (at.month() - 1) / 3 * 3 + 1,
            TimePeriod::Year => 1,
        };
        NaiveDate::from_ymd_opt(at.year(), month, 1)
            .map(|date| date.and_time(NaiveTime::MIN).and_utc())
            .unwrap_or(at)
    }

    /// Calendar-aligned `[start, end)` bucket containing `at`.
    pub fn bucket(&self, at: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = self.truncate(at);
        let end = start
            .checked_add_months(Months::new(self.bucket_months()))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        (start, end)
    }
}

impl std::fmt::Display for TimePeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Income and expense sums over a range. Transfers count towards neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Totals {
    pub income: MinorUnits,
    pub expense: MinorUnits,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodBalance {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub income: MinorUnits,
    pub expense: MinorUnits,
    /// income - expense
    pub balance: MinorUnits,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySpending {
    pub category_id: String,
    pub total_amount: MinorUnits,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Forecast {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub expected_income: MinorUnits,
    pub expected_expense: MinorUnits,
    pub expected_balance: MinorUnits,
    pub currency: String,
}

/// A bucket total left the `i64` range.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{currency} totals of the period starting {period_start} overflow")]
pub struct AmountOverflow {
    pub period_start: DateTime<Utc>,
    pub currency: String,
}

/// Group transactions into calendar buckets keyed by (period start, currency),
/// ascending by period start.
///
/// Every transaction opens its bucket, so a period with only transfers is
/// reported with zero income and expense.
pub fn period_balances(
    transactions: &[Transaction],
    group_by: TimePeriod,
) -> Result<Vec<PeriodBalance>, AmountOverflow> {
    let mut buckets: BTreeMap<(DateTime<Utc>, String), PeriodBalance> = BTreeMap::new();

    for tx in transactions {
        let (period_start, period_end) = group_by.bucket(tx.created_at);
        let bucket = buckets
            .entry((period_start, tx.currency.clone()))
            .or_insert_with(|| PeriodBalance {
                period_start,
                period_end,
                income: 0,
                expense: 0,
                balance: 0,
                currency: tx.currency.clone(),
            });
        let overflow = || AmountOverflow {
            period_start,
            currency: tx.currency.clone(),
        };

        match tx.kind {
            TransactionKind::Income => {
                bucket.income = bucket.income.checked_add(tx.amount).ok_or_else(overflow)?;
            }
            TransactionKind::Expense => {
                bucket.expense = bucket.expense.checked_add(tx.amount).ok_or_else(overflow)?;
            }
            TransactionKind::Transfer => {}
        }
        bucket.balance = bucket
            .income
            .checked_sub(bucket.expense)
            .ok_or_else(overflow)?;
    }

    Ok(buckets.into_values().collect())
}

/// Flat projection of the trailing average: every period carries the same
/// expected values and differs only in its date range.
pub fn project_forecast(
    now: DateTime<Utc>,
    period: TimePeriod,
    periods_ahead: u32,
    history: Totals,
    currency: &str,
) -> Vec<Forecast> {
    let lookback = i64::from(FORECAST_LOOKBACK_MONTHS);
    let avg_income = history.income / lookback;
    let avg_expense = history.expense / lookback;
    let step = period.forecast_step_months();

    (0..periods_ahead)
        .map_while(|i| {
            let period_start = now.checked_add_months(Months::new(i.checked_mul(step)?))?;
            let period_end = now.checked_add_months(Months::new((i + 1).checked_mul(step)?))?;
            Some(Forecast {
                period_start,
                period_end,
                expected_income: avg_income,
                expected_expense: avg_expense,
                expected_balance: avg_income - avg_expense,
                currency: currency.to_string(),
            })
        })
        .collect()
}

/// Start of the history window the forecast averages over.
pub fn forecast_lookback_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now.checked_sub_months(Months::new(FORECAST_LOOKBACK_MONTHS))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
