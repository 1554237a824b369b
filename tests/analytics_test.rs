mod common;

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, TimeZone, Utc};
use common::{
    FailingAnalyzerRepository, Fixtures, gateway_settings, parse_date, repositories_with,
    test_gateway, test_store,
};
use fingate::application::{AnalyticsRequest, AppError, Gateway, NewTransaction};
use fingate::clock::FixedClock;
use fingate::domain::{Account, TimePeriod, TransactionKind, UNCATEGORIZED};
use uuid::Uuid;

async fn record(
    gateway: &Gateway,
    account: &Account,
    kind: TransactionKind,
    amount: i64,
    mcc: Option<&str>,
    at: DateTime<Utc>,
) -> Result<()> {
    gateway
        .create_transaction(NewTransaction {
            from_account_id: account.id.to_string(),
            to_account_id: None,
            kind,
            amount,
            currency: "RUB".into(),
            category: mcc.map(str::to_string),
            description: None,
            occurred_at: at,
        })
        .await?;
    Ok(())
}

async fn transfer(
    gateway: &Gateway,
    from: &Account,
    to: &Account,
    amount: i64,
    at: DateTime<Utc>,
) -> Result<()> {
    gateway
        .create_transaction(NewTransaction {
            from_account_id: from.id.to_string(),
            to_account_id: Some(to.id.to_string()),
            kind: TransactionKind::Transfer,
            amount,
            currency: "RUB".into(),
            category: None,
            description: None,
            occurred_at: at,
        })
        .await?;
    Ok(())
}

/// Q1 2024: one salary, four expenses over three categories and a
/// transfer-only March.
async fn seed_first_quarter(gateway: &Gateway, card: &Account, savings: &Account) -> Result<()> {
    record(gateway, card, TransactionKind::Income, 100_000, None, parse_date("2024-01-05")).await?;
    record(gateway, card, TransactionKind::Expense, 3_000, Some("5411"), parse_date("2024-01-20")).await?;
    record(gateway, card, TransactionKind::Expense, 5_000, Some("5812"), parse_date("2024-02-03")).await?;
    record(gateway, card, TransactionKind::Expense, 2_000, None, parse_date("2024-02-15")).await?;
    record(gateway, card, TransactionKind::Expense, 2_000, Some("5411"), parse_date("2024-02-20")).await?;
    transfer(gateway, card, savings, 1_000, parse_date("2024-03-01")).await?;
    Ok(())
}

fn first_quarter(user_id: Uuid, group_by: Option<TimePeriod>) -> AnalyticsRequest {
    AnalyticsRequest {
        user_id: user_id.to_string(),
        start: parse_date("2024-01-01"),
        end: parse_date("2024-03-31") + Duration::days(1) - Duration::nanoseconds(1),
        group_by,
    }
}

#[tokio::test]
async fn test_statistics_by_month() -> Result<()> {
    let (gateway, store, _temp) = test_gateway().await?;
    let user = Uuid::new_v4();
    let card = Fixtures::account(&store, user, "Card", 0).await?;
    let savings = Fixtures::account(&store, user, "Savings", 0).await?;
    seed_first_quarter(&gateway, &card, &savings).await?;

    let stats = gateway.get_analytics(first_quarter(user, None)).await?;

    assert_eq!(stats.total_income, 100_000);
    assert_eq!(stats.total_expense, 12_000);

    let periods: Vec<_> = stats
        .period_balances
        .iter()
        .map(|p| (p.period_start, p.income, p.expense, p.balance))
        .collect();
    assert_eq!(
        periods,
        vec![
            (parse_date("2024-01-01"), 100_000, 3_000, 97_000),
            (parse_date("2024-02-01"), 0, 9_000, -9_000),
            (parse_date("2024-03-01"), 0, 0, 0),
        ]
    );
    assert_eq!(stats.period_balances[0].period_end, parse_date("2024-02-01"));

    let categories: Vec<_> = stats
        .category_breakdown
        .iter()
        .map(|c| (c.category_id.as_str(), c.total_amount))
        .collect();
    assert_eq!(
        categories,
        vec![("5411", 5_000), ("5812", 5_000), (UNCATEGORIZED, 2_000)]
    );
    Ok(())
}

#[tokio::test]
async fn test_statistics_by_quarter_collapse_to_one_bucket() -> Result<()> {
    let (gateway, store, _temp) = test_gateway().await?;
    let user = Uuid::new_v4();
    let card = Fixtures::account(&store, user, "Card", 0).await?;
    let savings = Fixtures::account(&store, user, "Savings", 0).await?;
    seed_first_quarter(&gateway, &card, &savings).await?;

    let stats = gateway
        .get_analytics(first_quarter(user, Some(TimePeriod::Quarter)))
        .await?;

    assert_eq!(stats.period_balances.len(), 1);
    let q1 = &stats.period_balances[0];
    assert_eq!(q1.period_start, parse_date("2024-01-01"));
    assert_eq!(q1.period_end, parse_date("2024-04-01"));
    assert_eq!((q1.income, q1.expense, q1.balance), (100_000, 12_000, 88_000));
    Ok(())
}

#[tokio::test]
async fn test_statistics_are_stable_and_scoped_to_the_user() -> Result<()> {
    let (gateway, store, _temp) = test_gateway().await?;
    let user = Uuid::new_v4();
    let card = Fixtures::account(&store, user, "Card", 0).await?;
    let savings = Fixtures::account(&store, user, "Savings", 0).await?;
    seed_first_quarter(&gateway, &card, &savings).await?;

    let stranger = Fixtures::account(&store, Uuid::new_v4(), "Other", 0).await?;
    record(&gateway, &stranger, TransactionKind::Income, 777, None, parse_date("2024-02-02")).await?;

    let first = gateway.get_analytics(first_quarter(user, None)).await?;
    let second = gateway.get_analytics(first_quarter(user, None)).await?;
    assert_eq!(first, second);
    assert_eq!(first.total_income, 100_000);
    Ok(())
}

#[tokio::test]
async fn test_statistics_range_is_inclusive() -> Result<()> {
    let (gateway, store, _temp) = test_gateway().await?;
    let user = Uuid::new_v4();
    let card = Fixtures::account(&store, user, "Card", 0).await?;
    let at = Utc.with_ymd_and_hms(2024, 5, 17, 10, 30, 0).unwrap();
    record(&gateway, &card, TransactionKind::Income, 4_200, None, at).await?;

    let stats = gateway
        .get_analytics(AnalyticsRequest {
            user_id: user.to_string(),
            start: at,
            end: at,
            group_by: None,
        })
        .await?;
    assert_eq!(stats.total_income, 4_200);
    assert_eq!(stats.period_balances.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_statistics_for_empty_range() -> Result<()> {
    let (gateway, store, _temp) = test_gateway().await?;
    let user = Uuid::new_v4();
    let card = Fixtures::account(&store, user, "Card", 0).await?;
    record(&gateway, &card, TransactionKind::Income, 4_200, None, parse_date("2024-05-01")).await?;

    let stats = gateway
        .get_analytics(AnalyticsRequest {
            user_id: user.to_string(),
            start: parse_date("2023-01-01"),
            end: parse_date("2023-12-31"),
            group_by: Some(TimePeriod::Year),
        })
        .await?;

    assert_eq!(stats.total_income, 0);
    assert_eq!(stats.total_expense, 0);
    assert!(stats.period_balances.is_empty());
    assert!(stats.category_breakdown.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_statistics_validation() -> Result<()> {
    let (gateway, _store, _temp) = test_gateway().await?;

    let err = gateway
        .get_analytics(AnalyticsRequest {
            user_id: "user-1".into(),
            start: parse_date("2024-01-01"),
            end: parse_date("2024-02-01"),
            group_by: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidId { field: "user ID", .. }));

    let err = gateway
        .get_analytics(AnalyticsRequest {
            user_id: Uuid::new_v4().to_string(),
            start: parse_date("2024-02-01"),
            end: parse_date("2024-01-01"),
            group_by: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidRange { .. }));
    Ok(())
}

#[tokio::test]
async fn test_statistics_fail_when_any_read_fails() -> Result<()> {
    let (store, _temp) = test_store().await?;
    let repos = repositories_with(&store, |repos| {
        repos.analyzer = Arc::new(FailingAnalyzerRepository {
            inner: Arc::new(store.analyzer()),
        });
    });
    let gateway = Gateway::new(repos, &gateway_settings());

    let err = gateway
        .get_analytics(first_quarter(Uuid::new_v4(), None))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Retrieval { operation: "get statistics", .. }));
    assert!(err.to_string().contains("category index unavailable"));
    Ok(())
}

#[tokio::test]
async fn test_statistics_fail_cleanly_when_totals_leave_i64_range() -> Result<()> {
    let (gateway, store, _temp) = test_gateway().await?;
    let user = Uuid::new_v4();
    // Two accounts, so each balance stays in range on its own.
    let card = Fixtures::account(&store, user, "Card", 0).await?;
    let savings = Fixtures::account(&store, user, "Savings", 0).await?;
    let half = i64::MAX / 2 + 1;
    record(&gateway, &card, TransactionKind::Income, half, None, parse_date("2024-01-10")).await?;
    record(&gateway, &savings, TransactionKind::Income, half, None, parse_date("2024-01-20")).await?;

    let err = gateway
        .get_analytics(first_quarter(user, None))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Retrieval { operation: "get statistics", .. }));

    // A range holding only one of them still reports.
    let stats = gateway
        .get_analytics(AnalyticsRequest {
            user_id: user.to_string(),
            start: parse_date("2024-01-01"),
            end: parse_date("2024-01-15"),
            group_by: None,
        })
        .await?;
    assert_eq!(stats.total_income, half);
    assert_eq!(stats.period_balances[0].balance, half);
    Ok(())
}

#[tokio::test]
async fn test_forecast_projects_trailing_average() -> Result<()> {
    let (gateway, store, _temp) = test_gateway().await?;
    let now = Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap();
    let gateway = gateway.with_clock(Arc::new(FixedClock(now)));

    let user = Uuid::new_v4();
    let card = Fixtures::account(&store, user, "Card", 0).await?;
    record(&gateway, &card, TransactionKind::Income, 120_000, None, parse_date("2024-03-10")).await?;
    record(&gateway, &card, TransactionKind::Expense, 60_000, Some("5411"), parse_date("2024-05-01")).await?;
    // Outside the twelve-month window.
    record(&gateway, &card, TransactionKind::Income, 999_999, None, parse_date("2023-01-01")).await?;

    let forecasts = gateway
        .get_forecast(&user.to_string(), TimePeriod::Month, 3)
        .await?;
    assert_eq!(forecasts.len(), 3);
    let starts: Vec<_> = forecasts.iter().map(|f| f.period_start).collect();
    assert_eq!(
        starts,
        vec![parse_date("2024-07-01"), parse_date("2024-08-01"), parse_date("2024-09-01")]
    );
    for forecast in &forecasts {
        assert_eq!(forecast.expected_income, 10_000);
        assert_eq!(forecast.expected_expense, 5_000);
        assert_eq!(forecast.expected_balance, 5_000);
        assert_eq!(forecast.currency, "RUB");
    }
    assert_eq!(forecasts[2].period_end, parse_date("2024-10-01"));

    let quarters = gateway
        .get_forecast(&user.to_string(), TimePeriod::Quarter, 2)
        .await?;
    let ranges: Vec<_> = quarters.iter().map(|f| (f.period_start, f.period_end)).collect();
    assert_eq!(
        ranges,
        vec![
            (parse_date("2024-07-01"), parse_date("2024-11-01")),
            (parse_date("2024-11-01"), parse_date("2025-03-01")),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_forecast_truncates_average_and_handles_zero_periods() -> Result<()> {
    let (gateway, store, _temp) = test_gateway().await?;
    let now = Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap();
    let gateway = gateway.with_clock(Arc::new(FixedClock(now)));

    let user = Uuid::new_v4();
    let card = Fixtures::account(&store, user, "Card", 0).await?;
    record(&gateway, &card, TransactionKind::Income, 100, None, parse_date("2024-06-01")).await?;

    let forecasts = gateway
        .get_forecast(&user.to_string(), TimePeriod::Year, 1)
        .await?;
    assert_eq!(forecasts.len(), 1);
    assert_eq!(forecasts[0].expected_income, 8);
    assert_eq!(forecasts[0].period_end, parse_date("2025-07-01"));

    assert!(gateway
        .get_forecast(&user.to_string(), TimePeriod::Month, 0)
        .await?
        .is_empty());
    Ok(())
}
