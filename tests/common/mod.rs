// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use fingate::application::Gateway;
use fingate::client::{ClientError, DeliveryReceipt, NotificationSender, OutgoingNotification};
use fingate::config::{DatabaseSettings, GatewaySettings};
use fingate::domain::{
    Account, AccountId, AccountType, CategorySpending, LegOutcome, MinorUnits, Notification,
    PeriodBalance, Posting, TimePeriod, Totals, Transaction, UserId,
};
use fingate::storage::{
    AnalyzerRepository, LedgerStore, NotificationRepository, Repositories,
    SqliteWalletRepository, WalletRepository,
};
use tempfile::TempDir;
use uuid::Uuid;

/// Helper to create a migrated store in a temporary database file
pub async fn test_store() -> Result<(LedgerStore, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let settings = DatabaseSettings {
        url: format!("sqlite:{}", db_path.display()),
        max_connections: 5,
        busy_timeout_ms: 5_000,
    };
    let store = LedgerStore::open(&settings).await?;
    Ok((store, temp_dir))
}

pub fn gateway_settings() -> GatewaySettings {
    GatewaySettings {
        reporting_currency: "RUB".into(),
        request_timeout_ms: None,
        transactions_limit: 50,
    }
}

/// Helper to create a gateway over a fresh temporary database
pub async fn test_gateway() -> Result<(Gateway, LedgerStore, TempDir)> {
    let (store, temp_dir) = test_store().await?;
    let gateway = Gateway::new(store.repositories(), &gateway_settings());
    Ok((gateway, store, temp_dir))
}

/// Helper to parse a date string into DateTime<Utc>
pub fn parse_date(date_str: &str) -> DateTime<Utc> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_utc()
}

/// Test fixture: accounts seeded straight into storage
pub struct Fixtures;

impl Fixtures {
    pub async fn account(
        store: &LedgerStore,
        user_id: UserId,
        name: &str,
        balance: MinorUnits,
    ) -> Result<Account> {
        let account = Account::new(user_id, name, AccountType::Regular, "RUB").with_balance(balance);
        store.wallet().save_account(&account).await?;
        Ok(account)
    }

    pub async fn investment_account(store: &LedgerStore, user_id: UserId) -> Result<Account> {
        let account = Account::new(user_id, "Broker", AccountType::Investment, "RUB");
        store.wallet().save_account(&account).await?;
        Ok(account)
    }

    pub async fn balance_of(store: &LedgerStore, account_id: AccountId) -> Result<MinorUnits> {
        let account = store
            .wallet()
            .get_account(account_id)
            .await?
            .ok_or_else(|| anyhow!("account {account_id} missing"))?;
        Ok(account.balance)
    }

    pub async fn transaction_count(store: &LedgerStore) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM transactions")
            .fetch_one(store.pool())
            .await?;
        Ok(count)
    }
}

/// Notification sender that records what it was asked to deliver.
#[derive(Default)]
pub struct FakeSender {
    pub sent: Mutex<Vec<OutgoingNotification>>,
    pub fail_with_status: Option<u16>,
}

impl FakeSender {
    pub fn ok() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail_with_status: Some(503),
            ..Self::default()
        })
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl NotificationSender for FakeSender {
    async fn send(
        &self,
        notification: &OutgoingNotification,
    ) -> Result<DeliveryReceipt, ClientError> {
        if let Some(status) = self.fail_with_status {
            return Err(ClientError::Unavailable(format!("status {status}")));
        }
        self.sent.lock().unwrap().push(notification.clone());
        Ok(DeliveryReceipt {
            delivered: true,
            delivery_id: Some(Uuid::new_v4().to_string()),
            sent_at: Utc::now(),
        })
    }
}

/// Audit store that rejects every write.
pub struct FailingNotificationRepository;

#[async_trait]
impl NotificationRepository for FailingNotificationRepository {
    async fn create_notification(&self, _notification: &Notification) -> Result<()> {
        Err(anyhow!("audit store offline"))
    }

    async fn get_notifications_by_user(
        &self,
        _user_id: UserId,
        _limit: u32,
    ) -> Result<Vec<Notification>> {
        Err(anyhow!("audit store offline"))
    }
}

/// Analyzer whose category breakdown always fails; other reads pass through.
pub struct FailingAnalyzerRepository {
    pub inner: Arc<dyn AnalyzerRepository>,
}

#[async_trait]
impl AnalyzerRepository for FailingAnalyzerRepository {
    async fn get_totals(
        &self,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Totals> {
        self.inner.get_totals(user_id, start, end).await
    }

    async fn get_period_balances(
        &self,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        group_by: TimePeriod,
    ) -> Result<Vec<PeriodBalance>> {
        self.inner
            .get_period_balances(user_id, start, end, group_by)
            .await
    }

    async fn get_category_spending(
        &self,
        _user_id: UserId,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<CategorySpending>> {
        Err(anyhow!("category index unavailable"))
    }
}

/// Wallet repository that writes the transaction row and every balance leg,
/// then stalls before committing.
pub struct StalledWalletRepository {
    pub inner: SqliteWalletRepository,
    pub stall: Duration,
    /// Set once the row and legs are written inside the open unit.
    pub staged: Arc<AtomicBool>,
}

impl StalledWalletRepository {
    pub fn new(store: &LedgerStore, stall: Duration) -> Self {
        Self {
            inner: store.wallet(),
            stall,
            staged: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait]
impl WalletRepository for StalledWalletRepository {
    async fn save_account(&self, account: &Account) -> Result<()> {
        self.inner.save_account(account).await
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        self.inner.get_account(id).await
    }

    async fn get_accounts_by_user(&self, user_id: UserId) -> Result<Vec<Account>> {
        self.inner.get_accounts_by_user(user_id).await
    }

    async fn get_transactions_by_account(
        &self,
        account_id: AccountId,
        limit: u32,
    ) -> Result<Vec<Transaction>> {
        self.inner
            .get_transactions_by_account(account_id, limit)
            .await
    }

    async fn apply_transaction(
        &self,
        transaction: &Transaction,
        postings: &[Posting],
    ) -> Result<Vec<LegOutcome>> {
        let mut unit = self.inner.begin_unit().await?;
        unit.record(transaction).await?;
        let mut legs = Vec::with_capacity(postings.len());
        for posting in postings {
            legs.push(unit.post(posting).await?);
        }
        self.staged.store(true, Ordering::SeqCst);

        tokio::time::sleep(self.stall).await;
        unit.commit().await?;
        Ok(legs)
    }
}

/// Repositories of `store` with some replaced.
pub fn repositories_with(
    store: &LedgerStore,
    patch: impl FnOnce(&mut Repositories),
) -> Repositories {
    let mut repos = store.repositories();
    patch(&mut repos);
    repos
}
