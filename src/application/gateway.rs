use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::client::NotificationSender;
use crate::clock::Clock;
use crate::config::GatewaySettings;
use crate::domain::{
    Account, AccountType, Forecast, Money, Notification, PostedTransaction, Security,
    SecurityPayment, TimePeriod, Transaction,
};
use crate::storage::Repositories;

use super::{
    AnalyticsRequest, AnalyticsService, AppError, BalanceReport, MarketService, NewTransaction,
    NotificationService, Overview, Portfolio, PositionValuation, SentNotification, Statistics,
    TransactionEngine, WalletService,
};

/// Single entry point for callers. Every operation takes caller-supplied
/// identifiers, validates them and delegates to the owning service.
pub struct Gateway {
    engine: TransactionEngine,
    wallet: WalletService,
    analytics: AnalyticsService,
    market: MarketService,
    notifications: NotificationService,
    reporting_currency: String,
    transactions_limit: u32,
    request_timeout: Option<Duration>,
}

impl Gateway {
    pub fn new(repos: Repositories, settings: &GatewaySettings) -> Self {
        Self {
            engine: TransactionEngine::new(Arc::clone(&repos.wallet)),
            wallet: WalletService::new(repos.wallet),
            analytics: AnalyticsService::new(repos.analyzer, settings.reporting_currency.clone()),
            market: MarketService::new(repos.market),
            notifications: NotificationService::new(repos.notifications),
            reporting_currency: settings.reporting_currency.clone(),
            transactions_limit: settings.transactions_limit,
            request_timeout: settings.request_timeout(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.analytics = self.analytics.with_clock(Arc::clone(&clock));
        self.market = self.market.with_clock(clock);
        self
    }

    pub fn with_notifier(mut self, sender: Arc<dyn NotificationSender>) -> Self {
        self.notifications = self.notifications.with_sender(sender);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    // ========================
    // Wallet
    // ========================

    pub async fn open_account(
        &self,
        user_id: &str,
        name: &str,
        account_type: AccountType,
        currency: &str,
    ) -> Result<Account, AppError> {
        self.observe(
            "open_account",
            self.wallet.open_account(user_id, name, account_type, currency),
        )
        .await
    }

    pub async fn get_account(&self, account_id: &str) -> Result<Account, AppError> {
        self.observe("get_account", self.wallet.get_account(account_id))
            .await
    }

    pub async fn create_transaction(
        &self,
        request: NewTransaction,
    ) -> Result<PostedTransaction, AppError> {
        self.observe("create_transaction", self.engine.create_transaction(request))
            .await
    }

    pub async fn get_balance(&self, user_id: &str) -> Result<BalanceReport, AppError> {
        self.observe("get_balance", self.balance_report(user_id)).await
    }

    /// Newest transactions across all of the user's accounts.
    pub async fn get_transactions(
        &self,
        user_id: &str,
        limit: Option<u32>,
    ) -> Result<Vec<Transaction>, AppError> {
        let limit = limit.unwrap_or(self.transactions_limit);
        self.observe(
            "get_transactions",
            self.wallet.get_user_transactions(user_id, limit),
        )
        .await
    }

    pub async fn get_account_transactions(
        &self,
        account_id: &str,
        limit: Option<u32>,
    ) -> Result<Vec<Transaction>, AppError> {
        let limit = limit.unwrap_or(self.transactions_limit);
        self.observe(
            "get_account_transactions",
            self.wallet.get_account_transactions(account_id, limit),
        )
        .await
    }

    /// Balance and recent history, fetched concurrently.
    pub async fn get_overview(
        &self,
        user_id: &str,
        limit: Option<u32>,
    ) -> Result<Overview, AppError> {
        let limit = limit.unwrap_or(self.transactions_limit);
        self.observe("get_overview", async {
            let (balance, recent_transactions) = tokio::try_join!(
                self.balance_report(user_id),
                self.wallet.get_user_transactions(user_id, limit),
            )?;
            Ok(Overview {
                balance,
                recent_transactions,
            })
        })
        .await
    }

    // ========================
    // Analytics
    // ========================

    pub async fn get_analytics(&self, request: AnalyticsRequest) -> Result<Statistics, AppError> {
        self.observe(
            "get_analytics",
            self.analytics.get_statistics(
                &request.user_id,
                request.start,
                request.end,
                request.group_by.unwrap_or_default(),
            ),
        )
        .await
    }

    pub async fn get_forecast(
        &self,
        user_id: &str,
        period: TimePeriod,
        periods_ahead: u32,
    ) -> Result<Vec<Forecast>, AppError> {
        self.observe(
            "get_forecast",
            self.analytics.get_forecast(user_id, period, periods_ahead),
        )
        .await
    }

    // ========================
    // Market
    // ========================

    /// Positions of an investment account valued at current prices.
    pub async fn get_portfolio(&self, account_id: &str) -> Result<Portfolio, AppError> {
        self.observe("get_portfolio", async {
            let positions = self.market.get_investment_positions(account_id).await?;
            let figis: Vec<String> = positions
                .iter()
                .map(|p| p.figi.clone())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();

            let securities: HashMap<String, Security> = self
                .market
                .get_securities_prices(&figis)
                .await?
                .into_iter()
                .map(|s| (s.figi.clone(), s))
                .collect();

            let valuations = positions
                .into_iter()
                .map(|position| {
                    let security = securities.get(&position.figi).cloned();
                    PositionValuation::new(position, security)
                })
                .collect();

            Ok(Portfolio::new(valuations))
        })
        .await
    }

    pub async fn get_security(&self, figi: &str) -> Result<Security, AppError> {
        self.observe("get_security", self.market.get_security(figi))
            .await
    }

    pub async fn get_security_payments(
        &self,
        figi: &str,
    ) -> Result<Vec<SecurityPayment>, AppError> {
        self.observe(
            "get_security_payments",
            self.market.get_security_payments(figi),
        )
        .await
    }

    // ========================
    // Notifications
    // ========================

    pub async fn send_notification(
        &self,
        user_id: &str,
        title: &str,
        message: &str,
    ) -> Result<SentNotification, AppError> {
        self.observe(
            "send_notification",
            self.notifications.send(user_id, title, message),
        )
        .await
    }

    pub async fn list_notifications(
        &self,
        user_id: &str,
        limit: Option<u32>,
    ) -> Result<Vec<Notification>, AppError> {
        let limit = limit.unwrap_or(self.transactions_limit);
        self.observe(
            "list_notifications",
            self.notifications.list(user_id, limit),
        )
        .await
    }

    // ========================
    // Helpers
    // ========================

    async fn balance_report(&self, user_id: &str) -> Result<BalanceReport, AppError> {
        let accounts = self.wallet.get_user_accounts(user_id).await?;
        let total = accounts
            .iter()
            .fold(0i64, |sum, account| sum.saturating_add(account.balance));

        Ok(BalanceReport {
            total_balance: Money::new(total, self.reporting_currency.clone()),
            accounts,
        })
    }

    /// Log the call and bound it by the request timeout. Dropping `call` on
    /// timeout cancels it; a pending ledger write is rolled back.
    async fn observe<T, F>(&self, method: &'static str, call: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, AppError>>,
    {
        let started = Instant::now();
        tracing::info!(method, "request started");

        let result = match self.request_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .unwrap_or_else(|_| Err(AppError::Timeout { operation: method })),
            None => call.await,
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => tracing::info!(method, duration_ms, "request completed"),
            Err(err) if err.is_validation() => {
                tracing::warn!(method, duration_ms, error = %err, "request failed")
            }
            Err(err) => tracing::error!(method, duration_ms, error = %err, "request failed"),
        }

        result
    }
}
