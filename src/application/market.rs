use std::sync::Arc;

use chrono::Months;

use crate::clock::{Clock, SystemClock};
use crate::domain::{InvestmentPosition, Security, SecurityPayment};
use crate::storage::MarketRepository;

use super::{AppError, parse_id};

/// How far either side of now security payments are listed.
pub const PAYMENT_WINDOW_MONTHS: u32 = 6;

/// Read-only access to securities, holdings and payouts.
pub struct MarketService {
    repo: Arc<dyn MarketRepository>,
    clock: Arc<dyn Clock>,
}

impl MarketService {
    pub fn new(repo: Arc<dyn MarketRepository>) -> Self {
        Self {
            repo,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub async fn get_investment_positions(
        &self,
        account_id: &str,
    ) -> Result<Vec<InvestmentPosition>, AppError> {
        let account_id = parse_id("account ID", account_id)?;
        self.repo
            .get_positions_by_account(account_id)
            .await
            .map_err(AppError::retrieval("get investment positions"))
    }

    pub async fn get_security(&self, figi: &str) -> Result<Security, AppError> {
        let figi = require_figi(figi)?;
        self.repo
            .get_security_by_figi(figi)
            .await
            .map_err(AppError::retrieval("get security"))?
            .ok_or_else(|| AppError::NotFound(format!("security {figi}")))
    }

    /// Securities for the given FIGIs; unknown ones are left out.
    pub async fn get_securities_prices(&self, figis: &[String]) -> Result<Vec<Security>, AppError> {
        let figis: Vec<String> = figis
            .iter()
            .map(|figi| figi.trim())
            .filter(|figi| !figi.is_empty())
            .map(str::to_string)
            .collect();

        self.repo
            .get_securities_by_figis(&figis)
            .await
            .map_err(AppError::retrieval("get securities"))
    }

    /// Payments dated within six months either side of now, newest first.
    pub async fn get_security_payments(&self, figi: &str) -> Result<Vec<SecurityPayment>, AppError> {
        let figi = require_figi(figi)?;
        let now = self.clock.now();
        let window = Months::new(PAYMENT_WINDOW_MONTHS);
        let from = now.checked_sub_months(window).unwrap_or(now);
        let to = now.checked_add_months(window).unwrap_or(now);

        self.repo
            .get_security_payments(figi, from, to)
            .await
            .map_err(AppError::retrieval("get security payments"))
    }
}

fn require_figi(figi: &str) -> Result<&str, AppError> {
    let figi = figi.trim();
    if figi.is_empty() {
        return Err(AppError::MissingField("FIGI"));
    }
    Ok(figi)
}
