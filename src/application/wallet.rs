use std::sync::Arc;

use futures::future::try_join_all;

use crate::domain::{Account, AccountType, Transaction};
use crate::storage::WalletRepository;

use super::{AppError, parse_id};

/// Read side of the wallet domain plus account provisioning.
pub struct WalletService {
    repo: Arc<dyn WalletRepository>,
}

impl WalletService {
    pub fn new(repo: Arc<dyn WalletRepository>) -> Self {
        Self { repo }
    }

    /// Open an empty account for a user.
    pub async fn open_account(
        &self,
        user_id: &str,
        name: &str,
        account_type: AccountType,
        currency: &str,
    ) -> Result<Account, AppError> {
        let user_id = parse_id("user ID", user_id)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::MissingField("account name"));
        }
        let currency = currency.trim().to_uppercase();
        if currency.is_empty() {
            return Err(AppError::MissingField("currency"));
        }

        let account = Account::new(user_id, name, account_type, currency);
        self.repo
            .save_account(&account)
            .await
            .map_err(AppError::write("open account"))?;

        tracing::info!(account_id = %account.id, user_id = %user_id, "account opened");
        Ok(account)
    }

    pub async fn get_account(&self, account_id: &str) -> Result<Account, AppError> {
        let id = parse_id("account ID", account_id)?;
        self.repo
            .get_account(id)
            .await
            .map_err(AppError::retrieval("get account"))?
            .ok_or_else(|| AppError::NotFound(format!("account {id}")))
    }

    pub async fn get_user_accounts(&self, user_id: &str) -> Result<Vec<Account>, AppError> {
        let user_id = parse_id("user ID", user_id)?;
        self.repo
            .get_accounts_by_user(user_id)
            .await
            .map_err(AppError::retrieval("get accounts"))
    }

    pub async fn get_account_transactions(
        &self,
        account_id: &str,
        limit: u32,
    ) -> Result<Vec<Transaction>, AppError> {
        let account_id = parse_id("account ID", account_id)?;
        self.repo
            .get_transactions_by_account(account_id, limit)
            .await
            .map_err(AppError::retrieval("get transactions"))
    }

    /// The newest `limit` transactions across every account of a user.
    pub async fn get_user_transactions(
        &self,
        user_id: &str,
        limit: u32,
    ) -> Result<Vec<Transaction>, AppError> {
        let accounts = self.get_user_accounts(user_id).await?;

        let per_account = try_join_all(
            accounts
                .iter()
                .map(|account| self.repo.get_transactions_by_account(account.id, limit)),
        )
        .await
        .map_err(AppError::retrieval("get transactions"))?;

        Ok(merge_newest_first(per_account, limit))
    }
}

/// Merge per-account lists into one, newest first, keeping at most `limit`.
fn merge_newest_first(lists: Vec<Vec<Transaction>>, limit: u32) -> Vec<Transaction> {
    let mut merged: Vec<Transaction> = lists.into_iter().flatten().collect();
    merged.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
    merged.truncate(limit as usize);
    merged
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use uuid::Uuid;

    use super::*;
    use crate::domain::TransactionKind;

    fn tx_at(minutes: i64) -> Transaction {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + Duration::minutes(minutes);
        Transaction::new(Uuid::new_v4(), None, TransactionKind::Income, 100, "RUB", at).unwrap()
    }

    #[test]
    fn test_merge_orders_newest_first_and_truncates() {
        let a = vec![tx_at(30), tx_at(10)];
        let b = vec![tx_at(40), tx_at(20), tx_at(0)];

        let merged = merge_newest_first(vec![a, b], 4);
        let minutes: Vec<i64> = merged
            .iter()
            .map(|tx| (tx.created_at - Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()).num_minutes())
            .collect();
        assert_eq!(minutes, vec![40, 30, 20, 10]);
    }

    #[test]
    fn test_merge_of_nothing_is_empty() {
        assert!(merge_newest_first(Vec::new(), 10).is_empty());
    }
}
