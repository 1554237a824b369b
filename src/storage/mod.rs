mod analyzer;
mod market;
mod notification;
mod wallet;

use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use uuid::Uuid;

use crate::config::DatabaseSettings;

pub use analyzer::*;
pub use market::*;
pub use notification::*;
pub use wallet::*;

/// SQL migration for accounts and transactions
pub const MIGRATION_001_LEDGER: &str = include_str!("migrations/001_ledger.sql");

/// SQL migration for the notification audit log
pub const MIGRATION_002_NOTIFICATIONS: &str = include_str!("migrations/002_notifications.sql");

/// SQL migration for securities, positions and payments
pub const MIGRATION_003_MARKET: &str = include_str!("migrations/003_market.sql");

/// Shared handle to the ledger database. Every repository borrows its pool.
#[derive(Clone)]
pub struct LedgerStore {
    pool: SqlitePool,
}

impl LedgerStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the SQLite database described by `settings`, creating the
    /// file if it doesn't exist.
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&settings.url)
            .with_context(|| format!("Invalid database url: {}", settings.url))?
            .create_if_missing(true)
            .busy_timeout(settings.busy_timeout());

        let pool = SqlitePoolOptions::new()
            .max_connections(settings.max_connections)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        Ok(Self::new(pool))
    }

    /// Run database migrations. Safe to repeat.
    pub async fn migrate(&self) -> Result<()> {
        for (name, sql) in [
            ("001", MIGRATION_001_LEDGER),
            ("002", MIGRATION_002_NOTIFICATIONS),
            ("003", MIGRATION_003_MARKET),
        ] {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .with_context(|| format!("Failed to run migration {name}"))?;
        }
        Ok(())
    }

    /// Connect and migrate.
    pub async fn open(settings: &DatabaseSettings) -> Result<Self> {
        let store = Self::connect(settings).await?;
        store.migrate().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn wallet(&self) -> SqliteWalletRepository {
        SqliteWalletRepository::new(self.pool.clone())
    }

    pub fn analyzer(&self) -> SqliteAnalyzerRepository {
        SqliteAnalyzerRepository::new(self.pool.clone())
    }

    pub fn market(&self) -> SqliteMarketRepository {
        SqliteMarketRepository::new(self.pool.clone())
    }

    pub fn notifications(&self) -> SqliteNotificationRepository {
        SqliteNotificationRepository::new(self.pool.clone())
    }

    /// All domain repositories backed by this store.
    pub fn repositories(&self) -> Repositories {
        Repositories {
            wallet: Arc::new(self.wallet()),
            analyzer: Arc::new(self.analyzer()),
            market: Arc::new(self.market()),
            notifications: Arc::new(self.notifications()),
        }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// The set of repositories the gateway composes.
#[derive(Clone)]
pub struct Repositories {
    pub wallet: Arc<dyn WalletRepository>,
    pub analyzer: Arc<dyn AnalyzerRepository>,
    pub market: Arc<dyn MarketRepository>,
    pub notifications: Arc<dyn NotificationRepository>,
}

/// Fixed-width RFC 3339 so that text comparison matches time order.
pub(crate) fn encode_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn decode_timestamp(raw: &str, column: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("Invalid {column} timestamp: {raw}"))?
        .with_timezone(&Utc))
}

pub(crate) fn decode_uuid(raw: &str, column: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).with_context(|| format!("Invalid {column}: {raw}"))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_timestamps_sort_lexically() {
        let early = Utc.with_ymd_and_hms(2024, 1, 5, 9, 0, 0).unwrap();
        let late = early + chrono::Duration::nanoseconds(1);

        let (a, b) = (encode_timestamp(early), encode_timestamp(late));
        assert_eq!(a.len(), b.len());
        assert!(a < b);
        assert_eq!(decode_timestamp(&b, "created_at").unwrap(), late);
    }
}
