use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use crate::domain::{AccountId, InvestmentPosition, Security, SecurityPayment};

use super::{decode_timestamp, decode_uuid, encode_timestamp};

const SECURITY_COLUMNS: &str = "figi, name, current_price, type, price_updated_at, created_at";

/// Securities, holdings and payouts of the market domain.
#[async_trait]
pub trait MarketRepository: Send + Sync {
    /// Positions held on an account, newest first.
    async fn get_positions_by_account(&self, account_id: AccountId)
    -> Result<Vec<InvestmentPosition>>;

    /// `None` when no security has this FIGI.
    async fn get_security_by_figi(&self, figi: &str) -> Result<Option<Security>>;

    /// Securities matching any of `figis`, ordered by FIGI. Unknown FIGIs are skipped.
    async fn get_securities_by_figis(&self, figis: &[String]) -> Result<Vec<Security>>;

    /// Payments for `figi` dated within `[from, to]`, newest first.
    async fn get_security_payments(
        &self,
        figi: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<SecurityPayment>>;
}

pub struct SqliteMarketRepository {
    pool: SqlitePool,
}

impl SqliteMarketRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or refresh a security quote.
    pub async fn save_security(&self, security: &Security) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO securities (figi, name, current_price, type, price_updated_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (figi) DO UPDATE SET
                name = excluded.name,
                current_price = excluded.current_price,
                price_updated_at = excluded.price_updated_at
            "#,
        )
        .bind(&security.figi)
        .bind(&security.name)
        .bind(security.current_price)
        .bind(&security.security_type)
        .bind(security.price_updated_at.map(encode_timestamp))
        .bind(encode_timestamp(security.created_at))
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to save security {}", security.figi))?;
        Ok(())
    }

    pub async fn save_position(&self, position: &InvestmentPosition) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO investment_positions (id, account_id, figi, quantity, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(position.id.to_string())
        .bind(position.account_id.to_string())
        .bind(&position.figi)
        .bind(position.quantity)
        .bind(encode_timestamp(position.created_at))
        .execute(&self.pool)
        .await
        .context("Failed to save investment position")?;
        Ok(())
    }

    pub async fn save_payment(&self, payment: &SecurityPayment) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO security_payments (id, figi, amount_per_share, payment_date, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(payment.id.to_string())
        .bind(&payment.figi)
        .bind(payment.amount_per_share)
        .bind(encode_timestamp(payment.payment_date))
        .bind(encode_timestamp(payment.created_at))
        .execute(&self.pool)
        .await
        .context("Failed to save security payment")?;
        Ok(())
    }

    fn row_to_security(row: &SqliteRow) -> Result<Security> {
        let price_updated_at: Option<String> = row.get("price_updated_at");
        let created_at: String = row.get("created_at");

        Ok(Security {
            figi: row.get("figi"),
            name: row.get("name"),
            current_price: row.get("current_price"),
            security_type: row.get("type"),
            price_updated_at: price_updated_at
                .map(|raw| decode_timestamp(&raw, "price_updated_at"))
                .transpose()?,
            created_at: decode_timestamp(&created_at, "created_at")?,
        })
    }

    fn row_to_position(row: &SqliteRow) -> Result<InvestmentPosition> {
        let created_at: String = row.get("created_at");

        Ok(InvestmentPosition {
            id: decode_uuid(row.get("id"), "position ID")?,
            account_id: decode_uuid(row.get("account_id"), "account ID")?,
            figi: row.get("figi"),
            quantity: row.get("quantity"),
            created_at: decode_timestamp(&created_at, "created_at")?,
        })
    }

    fn row_to_payment(row: &SqliteRow) -> Result<SecurityPayment> {
        let payment_date: String = row.get("payment_date");
        let created_at: String = row.get("created_at");

        Ok(SecurityPayment {
            id: decode_uuid(row.get("id"), "payment ID")?,
            figi: row.get("figi"),
            amount_per_share: row.get("amount_per_share"),
            payment_date: decode_timestamp(&payment_date, "payment_date")?,
            created_at: decode_timestamp(&created_at, "created_at")?,
        })
    }
}

#[async_trait]
impl MarketRepository for SqliteMarketRepository {
    async fn get_positions_by_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<InvestmentPosition>> {
        let rows = sqlx::query(
            r#"
            SELECT id, account_id, figi, quantity, created_at
            FROM investment_positions
            WHERE account_id = ?
            ORDER BY created_at DESC, id
            "#,
        )
        .bind(account_id.to_string())
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to get investment positions for account {account_id}"))?;

        rows.iter().map(Self::row_to_position).collect()
    }

    async fn get_security_by_figi(&self, figi: &str) -> Result<Option<Security>> {
        let row = sqlx::query(&format!("SELECT {SECURITY_COLUMNS} FROM securities WHERE figi = ?"))
            .bind(figi)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to get security {figi}"))?;

        row.as_ref().map(Self::row_to_security).transpose()
    }

    async fn get_securities_by_figis(&self, figis: &[String]) -> Result<Vec<Security>> {
        if figis.is_empty() {
            return Ok(Vec::new());
        }

        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {SECURITY_COLUMNS} FROM securities WHERE figi IN ("));
        let mut separated = query.separated(", ");
        for figi in figis {
            separated.push_bind(figi);
        }
        query.push(") ORDER BY figi");

        let rows = query
            .build()
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Failed to get {} securities", figis.len()))?;

        rows.iter().map(Self::row_to_security).collect()
    }

    async fn get_security_payments(
        &self,
        figi: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<SecurityPayment>> {
        let rows = sqlx::query(
            r#"
            SELECT id, figi, amount_per_share, payment_date, created_at
            FROM security_payments
            WHERE figi = ?
                AND payment_date BETWEEN ? AND ?
            ORDER BY payment_date DESC, id
            "#,
        )
        .bind(figi)
        .bind(encode_timestamp(from))
        .bind(encode_timestamp(to))
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to get security payments for {figi}"))?;

        rows.iter().map(Self::row_to_payment).collect()
    }
}
