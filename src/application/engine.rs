use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{MinorUnits, PostedTransaction, Transaction, TransactionKind};
use crate::storage::{BalanceOverflow, WalletRepository};

use super::{AppError, parse_id};

/// A caller's request to record a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub from_account_id: String,
    /// Required for transfers, rejected otherwise. Blank counts as absent.
    pub to_account_id: Option<String>,
    pub kind: TransactionKind,
    pub amount: MinorUnits,
    pub currency: String,
    /// Numeric merchant category code. Anything else is recorded as
    /// uncategorized.
    pub category: Option<String>,
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// The write path: validates a transaction and applies its balance legs.
pub struct TransactionEngine {
    wallet: Arc<dyn WalletRepository>,
}

impl TransactionEngine {
    pub fn new(wallet: Arc<dyn WalletRepository>) -> Self {
        Self { wallet }
    }

    /// Validate a request and build the transaction it describes. No I/O.
    pub fn prepare(request: NewTransaction) -> Result<Transaction, AppError> {
        if request.amount < 0 {
            return Err(AppError::InvalidAmount(request.amount));
        }

        let account_id = parse_id("account ID", &request.from_account_id)?;
        let to_account_id = non_blank(request.to_account_id)
            .map(|id| parse_id("destination account ID", &id))
            .transpose()?;
        let mcc = non_blank(request.category).and_then(|code| match code.trim().parse::<i32>() {
            Ok(mcc) => Some(mcc),
            Err(_) => {
                tracing::warn!(category = %code, "ignoring non-numeric category code");
                None
            }
        });

        let mut transaction = Transaction::new(
            account_id,
            to_account_id,
            request.kind,
            request.amount,
            request.currency.trim(),
            request.occurred_at,
        )?;
        if let Some(mcc) = mcc {
            transaction = transaction.with_mcc(mcc);
        }
        if let Some(description) = non_blank(request.description) {
            transaction = transaction.with_description(description);
        }

        Ok(transaction)
    }

    /// Record a transaction and move the balances it implies.
    ///
    /// Row and balance legs commit together. Legs whose account does not
    /// exist are reported in the result and logged, but do not fail the call.
    /// A leg that would overflow a balance fails it and nothing is written.
    pub async fn create_transaction(
        &self,
        request: NewTransaction,
    ) -> Result<PostedTransaction, AppError> {
        let transaction = Self::prepare(request)?;
        let postings = transaction.postings();

        let legs = self
            .wallet
            .apply_transaction(&transaction, &postings)
            .await
            .map_err(|err| match err.downcast_ref::<BalanceOverflow>() {
                Some(overflow) => AppError::BalanceOverflow {
                    account_id: overflow.account_id,
                },
                None => AppError::write("create transaction")(err),
            })?;

        let posted = PostedTransaction { transaction, legs };
        for leg in posted.unapplied_legs() {
            tracing::warn!(
                transaction_id = %posted.transaction.id,
                account_id = %leg.account_id,
                delta = leg.delta,
                "balance leg not applied: account not found"
            );
        }
        tracing::info!(
            transaction_id = %posted.transaction.id,
            kind = %posted.transaction.kind,
            amount = posted.transaction.amount,
            "transaction recorded"
        );

        Ok(posted)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
