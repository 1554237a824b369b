use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{MinorUnits, Money};

pub type AccountId = Uuid;
pub type UserId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    /// Current accounts, cards, cash
    Regular,
    /// Brokerage accounts holding securities
    Investment,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Regular => "regular",
            AccountType::Investment => "investment",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "regular" => Some(AccountType::Regular),
            "investment" => Some(AccountType::Investment),
            _ => None,
        }
    }
}

impl std::fmt::Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An account owned by a user. The balance is only mutated by the
/// transaction engine, always in minor units of `currency`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub user_id: UserId,
    pub name: String,
    pub account_type: AccountType,
    pub balance: MinorUnits,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(
        user_id: UserId,
        name: impl Into<String>,
        account_type: AccountType,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            name: name.into(),
            account_type,
            balance: 0,
            currency: currency.into(),
            created_at: Utc::now(),
        }
    }

    pub fn with_balance(mut self, balance: MinorUnits) -> Self {
        self.balance = balance;
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn balance_money(&self) -> Money {
        Money::new(self.balance, self.currency.clone())
    }
}
