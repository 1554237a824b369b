use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::domain::{
    CategorySpending, PeriodBalance, TimePeriod, Totals, UNCATEGORIZED, UserId, period_balances,
};

use super::wallet::{TRANSACTION_COLUMNS, row_to_transaction};
use super::encode_timestamp;

/// Read-only aggregations over a user's transactions. Ranges are inclusive on
/// both ends and a transaction belongs to the user owning its source account.
#[async_trait]
pub trait AnalyzerRepository: Send + Sync {
    async fn get_totals(
        &self,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Totals>;

    /// Calendar buckets, ascending by period start.
    async fn get_period_balances(
        &self,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        group_by: TimePeriod,
    ) -> Result<Vec<PeriodBalance>>;

    /// Expense totals per merchant category, largest first.
    async fn get_category_spending(
        &self,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CategorySpending>>;
}

pub struct SqliteAnalyzerRepository {
    pool: SqlitePool,
}

impl SqliteAnalyzerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AnalyzerRepository for SqliteAnalyzerRepository {
    async fn get_totals(
        &self,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Totals> {
        let row = sqlx::query(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN t.type = 'income' THEN t.amount ELSE 0 END), 0) as total_income,
                COALESCE(SUM(CASE WHEN t.type = 'expense' THEN t.amount ELSE 0 END), 0) as total_expense
            FROM transactions t
            JOIN accounts a ON t.account_id = a.id
            WHERE a.user_id = ?
                AND t.created_at BETWEEN ? AND ?
            "#,
        )
        .bind(user_id.to_string())
        .bind(encode_timestamp(start))
        .bind(encode_timestamp(end))
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("Failed to get statistics for user {user_id}"))?;

        Ok(Totals {
            income: row.get("total_income"),
            expense: row.get("total_expense"),
        })
    }

    async fn get_period_balances(
        &self,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        group_by: TimePeriod,
    ) -> Result<Vec<PeriodBalance>> {
        // SQLite has no date_trunc; bucket in Rust instead.
        let rows = sqlx::query(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
            FROM transactions t
            JOIN accounts a ON t.account_id = a.id
            WHERE a.user_id = ?
                AND t.created_at BETWEEN ? AND ?
            ORDER BY t.created_at, t.id
            "#
        ))
        .bind(user_id.to_string())
        .bind(encode_timestamp(start))
        .bind(encode_timestamp(end))
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to get period balances for user {user_id}"))?;

        let transactions = rows
            .iter()
            .map(row_to_transaction)
            .collect::<Result<Vec<_>>>()?;

        period_balances(&transactions, group_by)
            .with_context(|| format!("Failed to group transactions of user {user_id}"))
    }

    async fn get_category_spending(
        &self,
        user_id: UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CategorySpending>> {
        let rows = sqlx::query(
            r#"
            SELECT
                COALESCE(CAST(t.mcc AS TEXT), ?) as category_id,
                SUM(t.amount) as total_amount,
                t.currency
            FROM transactions t
            JOIN accounts a ON t.account_id = a.id
            WHERE a.user_id = ?
                AND t.type = 'expense'
                AND t.created_at BETWEEN ? AND ?
            GROUP BY category_id, t.currency
            ORDER BY total_amount DESC, category_id, t.currency
            "#,
        )
        .bind(UNCATEGORIZED)
        .bind(user_id.to_string())
        .bind(encode_timestamp(start))
        .bind(encode_timestamp(end))
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to get category spending for user {user_id}"))?;

        Ok(rows
            .iter()
            .map(|row| CategorySpending {
                category_id: row.get("category_id"),
                total_amount: row.get("total_amount"),
                currency: row.get("currency"),
            })
            .collect())
    }
}
