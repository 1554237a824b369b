use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::{AccountId, MinorUnits, Money};

pub type TransactionId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Income,
    Expense,
    Transfer,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Income => "income",
            TransactionKind::Expense => "expense",
            TransactionKind::Transfer => "transfer",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "income" => Some(TransactionKind::Income),
            "expense" => Some(TransactionKind::Expense),
            "transfer" => Some(TransactionKind::Transfer),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    #[error("amount must not be negative, got {0}")]
    NegativeAmount(MinorUnits),
    #[error("a transfer requires a destination account")]
    MissingDestination,
    #[error("only transfers may carry a destination account, got {0}")]
    UnexpectedDestination(TransactionKind),
    #[error("currency must not be empty")]
    MissingCurrency,
}

/// A single ledger movement. Immutable once recorded: the engine never
/// updates or deletes a stored transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    /// Source account; the only account touched by income and expense
    pub account_id: AccountId,
    /// Destination account, present if and only if `kind` is a transfer
    pub to_account_id: Option<AccountId>,
    pub kind: TransactionKind,
    /// Always stored non-negative; the sign is derived from `kind`
    pub amount: MinorUnits,
    pub currency: String,
    /// Merchant category code
    pub mcc: Option<i32>,
    pub description: Option<String>,
    /// When the transaction occurred
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(
        account_id: AccountId,
        to_account_id: Option<AccountId>,
        kind: TransactionKind,
        amount: MinorUnits,
        currency: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, TransactionError> {
        if amount < 0 {
            return Err(TransactionError::NegativeAmount(amount));
        }
        match (kind, to_account_id) {
            (TransactionKind::Transfer, None) => return Err(TransactionError::MissingDestination),
            (TransactionKind::Income | TransactionKind::Expense, Some(_)) => {
                return Err(TransactionError::UnexpectedDestination(kind));
            }
            _ => {}
        }
        let currency = currency.into();
        if currency.trim().is_empty() {
            return Err(TransactionError::MissingCurrency);
        }

        Ok(Self {
            id: Uuid::new_v4(),
            account_id,
            to_account_id,
            kind,
            amount,
            currency,
            mcc: None,
            description: None,
            created_at,
        })
    }

    pub fn with_mcc(mut self, mcc: i32) -> Self {
        self.mcc = Some(mcc);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Balance change applied to the source account.
    pub fn signed_amount(&self) -> MinorUnits {
        match self.kind {
            TransactionKind::Income => self.amount,
            TransactionKind::Expense | TransactionKind::Transfer => -self.amount,
        }
    }

    /// Balance changes this transaction implies, source leg first.
    pub fn postings(&self) -> Vec<Posting> {
        let mut postings = vec![Posting {
            account_id: self.account_id,
            delta: self.signed_amount(),
        }];
        if let Some(to_account_id) = self.to_account_id {
            postings.push(Posting {
                account_id: to_account_id,
                delta: self.amount,
            });
        }
        postings
    }

    pub fn money(&self) -> Money {
        Money::new(self.amount, self.currency.clone())
    }
}

/// A relative balance change for one account (one leg).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub account_id: AccountId,
    pub delta: MinorUnits,
}

/// What happened to a leg when the transaction was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegOutcome {
    pub account_id: AccountId,
    pub delta: MinorUnits,
    /// False when no account row matched, so the balance was left untouched
    pub applied: bool,
}

/// The recorded transaction together with the outcome of each balance leg.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostedTransaction {
    pub transaction: Transaction,
    pub legs: Vec<LegOutcome>,
}

impl PostedTransaction {
    pub fn fully_applied(&self) -> bool {
        self.legs.iter().all(|leg| leg.applied)
    }

    pub fn unapplied_legs(&self) -> impl Iterator<Item = &LegOutcome> {
        self.legs.iter().filter(|leg| !leg.applied)
    }
}
