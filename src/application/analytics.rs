use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::clock::{Clock, SystemClock};
use crate::domain::{Forecast, TimePeriod, forecast_lookback_start, project_forecast};
use crate::storage::AnalyzerRepository;

use super::{AppError, Statistics, parse_id};

/// Statistics and forecasts over a user's transaction history.
pub struct AnalyticsService {
    repo: Arc<dyn AnalyzerRepository>,
    clock: Arc<dyn Clock>,
    reporting_currency: String,
}

impl AnalyticsService {
    pub fn new(repo: Arc<dyn AnalyzerRepository>, reporting_currency: impl Into<String>) -> Self {
        Self {
            repo,
            clock: Arc::new(SystemClock),
            reporting_currency: reporting_currency.into(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Totals, calendar buckets and category breakdown for `[start, end]`.
    ///
    /// The three reads run concurrently and the first failure fails the call.
    pub async fn get_statistics(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        group_by: TimePeriod,
    ) -> Result<Statistics, AppError> {
        let user_id = parse_id("user ID", user_id)?;
        if start > end {
            return Err(AppError::InvalidRange { start, end });
        }

        let (totals, period_balances, category_breakdown) = tokio::try_join!(
            self.repo.get_totals(user_id, start, end),
            self.repo.get_period_balances(user_id, start, end, group_by),
            self.repo.get_category_spending(user_id, start, end),
        )
        .map_err(AppError::retrieval("get statistics"))?;

        Ok(Statistics {
            total_income: totals.income,
            total_expense: totals.expense,
            period_balances,
            category_breakdown,
        })
    }

    /// Project the trailing twelve-month monthly average `periods_ahead`
    /// periods forward from now.
    pub async fn get_forecast(
        &self,
        user_id: &str,
        period: TimePeriod,
        periods_ahead: u32,
    ) -> Result<Vec<Forecast>, AppError> {
        let user_id = parse_id("user ID", user_id)?;
        let now = self.clock.now();

        let history = self
            .repo
            .get_totals(user_id, forecast_lookback_start(now), now)
            .await
            .map_err(AppError::retrieval("get forecast"))?;

        Ok(project_forecast(
            now,
            period,
            periods_ahead,
            history,
            &self.reporting_currency,
        ))
    }
}
