use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    Account, CategorySpending, Figi, InvestmentPosition, MinorUnits, Money, PeriodBalance,
    Security, TimePeriod, Transaction,
};

/// Income/expense statistics of a user over a date range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub total_income: MinorUnits,
    pub total_expense: MinorUnits,
    pub period_balances: Vec<PeriodBalance>,
    pub category_breakdown: Vec<CategorySpending>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsRequest {
    pub user_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Month when absent
    pub group_by: Option<TimePeriod>,
}

/// A user's accounts and their summed balance.
///
/// Balances are added up as-is, whatever currency each account holds, and
/// labelled with the reporting currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceReport {
    pub total_balance: Money,
    pub accounts: Vec<Account>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overview {
    pub balance: BalanceReport,
    pub recent_transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionValuation {
    pub position: InvestmentPosition,
    /// `None` when the FIGI is unknown
    pub security: Option<Security>,
    /// price × quantity, `None` when there is no current price
    pub value: Option<MinorUnits>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Portfolio {
    pub positions: Vec<PositionValuation>,
    /// Sum of the priced positions
    pub total_value: MinorUnits,
    pub unpriced: Vec<Figi>,
}

impl PositionValuation {
    pub fn new(position: InvestmentPosition, security: Option<Security>) -> Self {
        let value = security
            .as_ref()
            .and_then(|s| s.current_price)
            .and_then(|price| price.checked_mul(i64::from(position.quantity)));

        Self {
            position,
            security,
            value,
        }
    }
}

impl Portfolio {
    pub fn new(positions: Vec<PositionValuation>) -> Self {
        let total_value = positions.iter().filter_map(|p| p.value).sum();
        let unpriced = positions
            .iter()
            .filter(|p| p.value.is_none())
            .map(|p| p.position.figi.clone())
            .collect();

        Self {
            positions,
            total_value,
            unpriced,
        }
    }
}
