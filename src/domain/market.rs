use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, MinorUnits};

/// Financial Instrument Global Identifier, e.g. "BBG004730N88".
pub type Figi = String;

/// Quantity of a security held on an investment account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestmentPosition {
    pub id: Uuid,
    pub account_id: AccountId,
    pub figi: Figi,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
}

impl InvestmentPosition {
    pub fn new(account_id: AccountId, figi: impl Into<Figi>, quantity: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            figi: figi.into(),
            quantity,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Security {
    pub figi: Figi,
    pub name: String,
    /// Last known price per share, absent until the first quote arrives
    pub current_price: Option<MinorUnits>,
    pub security_type: String,
    pub price_updated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Security {
    pub fn new(figi: impl Into<Figi>, name: impl Into<String>, security_type: impl Into<String>) -> Self {
        Self {
            figi: figi.into(),
            name: name.into(),
            current_price: None,
            security_type: security_type.into(),
            price_updated_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_price(mut self, price: MinorUnits, updated_at: DateTime<Utc>) -> Self {
        self.current_price = Some(price);
        self.price_updated_at = Some(updated_at);
        self
    }
}

/// A dividend or coupon paid per share of a security.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityPayment {
    pub id: Uuid,
    pub figi: Figi,
    pub amount_per_share: MinorUnits,
    pub payment_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl SecurityPayment {
    pub fn new(figi: impl Into<Figi>, amount_per_share: MinorUnits, payment_date: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            figi: figi.into(),
            amount_per_share,
            payment_date,
            created_at: Utc::now(),
        }
    }
}
