use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool};
use thiserror::Error;

use crate::domain::{
    Account, AccountId, AccountType, LegOutcome, MinorUnits, Posting, Transaction,
    TransactionKind, UserId,
};

use super::{decode_timestamp, decode_uuid, encode_timestamp};

pub(crate) const TRANSACTION_COLUMNS: &str =
    "t.id, t.account_id, t.to_account_id, t.type, t.amount, t.currency, t.mcc, t.description, t.created_at";

const ACCOUNT_COLUMNS: &str = "id, user_id, name, type, balance, currency, created_at";

/// Accounts and transactions of the ledger.
#[async_trait]
pub trait WalletRepository: Send + Sync {
    /// Provision a new account.
    async fn save_account(&self, account: &Account) -> Result<()>;

    /// `None` when no account has this id.
    async fn get_account(&self, id: AccountId) -> Result<Option<Account>>;

    /// All accounts of a user, newest first.
    async fn get_accounts_by_user(&self, user_id: UserId) -> Result<Vec<Account>>;

    /// Transactions whose source is `account_id`, newest first.
    async fn get_transactions_by_account(
        &self,
        account_id: AccountId,
        limit: u32,
    ) -> Result<Vec<Transaction>>;

    /// Record `transaction` and apply every posting as one unit of work.
    ///
    /// The transaction row is written before any balance changes. Either
    /// everything commits or nothing does. A posting for an account that does
    /// not exist is reported as not applied rather than failing the unit. A
    /// posting that would overflow a balance fails the unit with
    /// [`BalanceOverflow`].
    async fn apply_transaction(
        &self,
        transaction: &Transaction,
        postings: &[Posting],
    ) -> Result<Vec<LegOutcome>>;
}

pub struct SqliteWalletRepository {
    pool: SqlitePool,
}

impl SqliteWalletRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Start a ledger write on a pooled connection.
    pub async fn begin_unit(&self) -> Result<LedgerUnit> {
        let tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin ledger transaction")?;
        Ok(LedgerUnit { tx })
    }

    fn row_to_account(row: &SqliteRow) -> Result<Account> {
        let type_str: String = row.get("type");
        let created_at: String = row.get("created_at");

        Ok(Account {
            id: decode_uuid(row.get("id"), "account ID")?,
            user_id: decode_uuid(row.get("user_id"), "user ID")?,
            name: row.get("name"),
            account_type: AccountType::from_str(&type_str)
                .ok_or_else(|| anyhow!("Invalid account type: {}", type_str))?,
            balance: row.get("balance"),
            currency: row.get("currency"),
            created_at: decode_timestamp(&created_at, "created_at")?,
        })
    }
}

pub(crate) fn row_to_transaction(row: &SqliteRow) -> Result<Transaction> {
    let type_str: String = row.get("type");
    let to_account: Option<String> = row.get("to_account_id");
    let created_at: String = row.get("created_at");

    Ok(Transaction {
        id: decode_uuid(row.get("id"), "transaction ID")?,
        account_id: decode_uuid(row.get("account_id"), "account ID")?,
        to_account_id: to_account
            .map(|id| decode_uuid(&id, "destination account ID"))
            .transpose()?,
        kind: TransactionKind::from_str(&type_str)
            .ok_or_else(|| anyhow!("Invalid transaction type: {}", type_str))?,
        amount: row.get("amount"),
        currency: row.get("currency"),
        mcc: row.get("mcc"),
        description: row.get("description"),
        created_at: decode_timestamp(&created_at, "created_at")?,
    })
}

#[async_trait]
impl WalletRepository for SqliteWalletRepository {
    async fn save_account(&self, account: &Account) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, user_id, name, type, balance, currency, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(account.id.to_string())
        .bind(account.user_id.to_string())
        .bind(&account.name)
        .bind(account.account_type.as_str())
        .bind(account.balance)
        .bind(&account.currency)
        .bind(encode_timestamp(account.created_at))
        .execute(&self.pool)
        .await
        .context("Failed to save account")?;
        Ok(())
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        let row = sqlx::query(&format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch account")?;

        row.as_ref().map(Self::row_to_account).transpose()
    }

    async fn get_accounts_by_user(&self, user_id: UserId) -> Result<Vec<Account>> {
        let rows = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE user_id = ? ORDER BY created_at DESC, id"
        ))
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to get accounts for user {user_id}"))?;

        rows.iter().map(Self::row_to_account).collect()
    }

    async fn get_transactions_by_account(
        &self,
        account_id: AccountId,
        limit: u32,
    ) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
            FROM transactions t
            WHERE t.account_id = ?
            ORDER BY t.created_at DESC, t.id DESC
            LIMIT ?
            "#
        ))
        .bind(account_id.to_string())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to get transactions for account {account_id}"))?;

        rows.iter().map(row_to_transaction).collect()
    }

    async fn apply_transaction(
        &self,
        transaction: &Transaction,
        postings: &[Posting],
    ) -> Result<Vec<LegOutcome>> {
        let mut unit = self.begin_unit().await?;
        unit.record(transaction).await?;

        let mut legs = Vec::with_capacity(postings.len());
        for posting in postings {
            legs.push(unit.post(posting).await?);
        }

        unit.commit().await?;
        Ok(legs)
    }
}

/// A posting would push a balance outside the `i64` range.
#[derive(Debug, Error)]
#[error("balance of account {account_id} would overflow: {balance} + {delta}")]
pub struct BalanceOverflow {
    pub account_id: AccountId,
    pub balance: MinorUnits,
    pub delta: MinorUnits,
}

/// An open ledger write. Dropping it without [`LedgerUnit::commit`] rolls
/// back everything recorded through it.
pub struct LedgerUnit {
    tx: sqlx::Transaction<'static, Sqlite>,
}

impl LedgerUnit {
    /// Insert the transaction row.
    pub async fn record(&mut self, transaction: &Transaction) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO transactions (id, account_id, to_account_id, type, amount, currency, mcc, description, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(transaction.id.to_string())
        .bind(transaction.account_id.to_string())
        .bind(transaction.to_account_id.map(|id| id.to_string()))
        .bind(transaction.kind.as_str())
        .bind(transaction.amount)
        .bind(&transaction.currency)
        .bind(transaction.mcc)
        .bind(&transaction.description)
        .bind(encode_timestamp(transaction.created_at))
        .execute(&mut *self.tx)
        .await
        .with_context(|| {
            format!(
                "Failed to create transaction for account {}",
                transaction.account_id
            )
        })?;
        Ok(())
    }

    /// Apply one balance leg. A missing account leaves the leg unapplied;
    /// a result outside the `i64` range fails with [`BalanceOverflow`].
    pub async fn post(&mut self, posting: &Posting) -> Result<LegOutcome> {
        let mut outcome = LegOutcome {
            account_id: posting.account_id,
            delta: posting.delta,
            applied: false,
        };

        // After `record` the unit holds the write lock, so this read cannot go stale.
        let balance: Option<MinorUnits> =
            sqlx::query_scalar("SELECT balance FROM accounts WHERE id = ?")
                .bind(posting.account_id.to_string())
                .fetch_optional(&mut *self.tx)
                .await
                .with_context(|| format!("Failed to read balance of account {}", posting.account_id))?;
        let Some(balance) = balance else {
            return Ok(outcome);
        };
        if balance.checked_add(posting.delta).is_none() {
            return Err(BalanceOverflow {
                account_id: posting.account_id,
                balance,
                delta: posting.delta,
            }
            .into());
        }

        sqlx::query("UPDATE accounts SET balance = balance + ? WHERE id = ?")
            .bind(posting.delta)
            .bind(posting.account_id.to_string())
            .execute(&mut *self.tx)
            .await
            .with_context(|| {
                format!(
                    "Failed to update balance of account {} by {}",
                    posting.account_id, posting.delta
                )
            })?;

        outcome.applied = true;
        Ok(outcome)
    }

    pub async fn commit(self) -> Result<()> {
        self.tx
            .commit()
            .await
            .context("Failed to commit ledger transaction")
    }
}
