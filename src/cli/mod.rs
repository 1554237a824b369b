use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use crate::application::{AnalyticsRequest, Gateway, NewTransaction};
use crate::client::HttpNotificationSender;
use crate::config::{LogSettings, Settings};
use crate::domain::{
    AccountType, TimePeriod, Transaction, TransactionKind, format_minor, parse_minor,
};
use crate::storage::LedgerStore;

/// Fingate - financial aggregation gateway
#[derive(Parser)]
#[command(name = "fingate")]
#[command(about = "Accounts, transactions, analytics and forecasts over a local ledger")]
#[command(version)]
pub struct Cli {
    /// Configuration file (defaults to ./fingate.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Database url, overrides the configured one (e.g. "sqlite:fingate.db")
    #[arg(long, global = true, env = "FINGATE_DATABASE")]
    pub database: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print results as JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Account management commands
    #[command(subcommand)]
    Account(AccountCommands),

    /// Transaction commands
    #[command(subcommand)]
    Transaction(TransactionCommands),

    /// Show a user's accounts and total balance
    Balance {
        /// User ID
        user: String,
    },

    /// List a user's newest transactions across all accounts
    Transactions {
        /// User ID
        user: String,

        /// Maximum number of transactions to show
        #[arg(short, long)]
        limit: Option<u32>,
    },

    /// List the newest transactions of one account
    AccountTransactions {
        /// Account ID
        account: String,

        /// Maximum number of transactions to show
        #[arg(short, long)]
        limit: Option<u32>,
    },

    /// Income/expense statistics over a date range
    Analytics {
        /// User ID
        user: String,

        /// Start date (YYYY-MM-DD), defaults to the start of the current month
        #[arg(long)]
        from: Option<String>,

        /// End date (YYYY-MM-DD, inclusive), defaults to now
        #[arg(long)]
        to: Option<String>,

        /// Bucket size: month, quarter or year
        #[arg(short, long)]
        group_by: Option<String>,
    },

    /// Forecast income and expense from the last twelve months
    Forecast {
        /// User ID
        user: String,

        /// Period length: month, quarter or year
        #[arg(short, long, default_value = "month")]
        period: String,

        /// Number of periods to forecast
        #[arg(short = 'n', long, default_value = "3")]
        periods: u32,
    },

    /// Balance and recent transactions in one view
    Overview {
        /// User ID
        user: String,

        /// Maximum number of transactions to show
        #[arg(short, long)]
        limit: Option<u32>,
    },

    /// Value the positions of an investment account
    Portfolio {
        /// Account ID
        account: String,
    },

    /// Show a security by FIGI
    Security {
        figi: String,
    },

    /// List payments of a security within six months of today
    Payments {
        figi: String,
    },

    /// Send a notification to a user
    Notify {
        /// User ID
        user: String,

        #[arg(short, long)]
        title: String,

        #[arg(short, long)]
        message: String,
    },

    /// List notifications sent to a user
    Notifications {
        /// User ID
        user: String,

        #[arg(short, long)]
        limit: Option<u32>,
    },
}

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Open a new account
    Open {
        /// Owning user ID
        user: String,

        /// Account name
        name: String,

        /// Account type: regular or investment
        #[arg(short = 't', long, default_value = "regular")]
        account_type: String,

        /// Currency code
        #[arg(long, default_value = "RUB")]
        currency: String,
    },

    /// List a user's accounts
    List {
        /// User ID
        user: String,
    },

    /// Show one account and its balance
    Show {
        /// Account ID
        account: String,
    },
}

#[derive(Subcommand)]
pub enum TransactionCommands {
    /// Record an income, expense or transfer
    Create {
        /// Source account ID
        account: String,

        /// Amount (e.g., "50.00" or "50")
        amount: String,

        /// Kind: income, expense or transfer
        #[arg(short, long, default_value = "expense")]
        kind: String,

        /// Destination account ID (transfers only)
        #[arg(long)]
        to: Option<String>,

        /// Currency code
        #[arg(long, default_value = "RUB")]
        currency: String,

        /// Merchant category code
        #[arg(long)]
        category: Option<String>,

        /// Description of the transaction
        #[arg(short, long)]
        description: Option<String>,

        /// Date of the transaction (YYYY-MM-DD, defaults to now)
        #[arg(long)]
        date: Option<String>,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let mut settings = Settings::load(self.config.as_deref()).context("Failed to load settings")?;
        if let Some(url) = self.database {
            settings.database.url = url;
        }
        init_tracing(&settings.log, self.verbose);

        let store = LedgerStore::open(&settings.database).await?;
        if let Commands::Init = self.command {
            println!("Database initialized: {}", settings.database.url);
            store.close().await;
            return Ok(());
        }

        let gateway = build_gateway(&store, &settings)?;
        let result = run_command(&gateway, self.command, self.json).await;
        store.close().await;
        result
    }
}

fn init_tracing(log: &LogSettings, verbose: bool) {
    let level = if verbose { "debug" } else { log.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn build_gateway(store: &LedgerStore, settings: &Settings) -> Result<Gateway> {
    let mut gateway = Gateway::new(store.repositories(), &settings.gateway);
    if let Some(url) = &settings.notification.url {
        let sender = HttpNotificationSender::new(url, settings.notification.timeout())
            .context("Failed to set up notification client")?;
        gateway = gateway.with_notifier(Arc::new(sender));
    }
    Ok(gateway)
}

async fn run_command(gateway: &Gateway, command: Commands, json: bool) -> Result<()> {
    match command {
        Commands::Init => {}

        Commands::Account(account_cmd) => run_account_command(gateway, account_cmd, json).await?,

        Commands::Transaction(TransactionCommands::Create {
            account,
            amount,
            kind,
            to,
            currency,
            category,
            description,
            date,
        }) => {
            let amount = parse_minor(&amount).context("Invalid amount format. Use '50.00' or '50'")?;
            let kind = TransactionKind::from_str(&kind).ok_or_else(|| {
                anyhow!("Invalid kind '{kind}'. Valid kinds: income, expense, transfer")
            })?;
            let occurred_at = match date {
                Some(date_str) => parse_date(&date_str)
                    .with_context(|| format!("Invalid date format '{date_str}'. Use YYYY-MM-DD"))?,
                None => Utc::now(),
            };

            let posted = gateway
                .create_transaction(NewTransaction {
                    from_account_id: account,
                    to_account_id: to,
                    kind,
                    amount,
                    currency,
                    category,
                    description,
                    occurred_at,
                })
                .await?;

            if json {
                return print_json(&posted);
            }
            let tx = &posted.transaction;
            println!(
                "Recorded {}: {} {} ({})",
                tx.kind,
                format_minor(tx.amount),
                tx.currency,
                tx.id
            );
            for leg in posted.unapplied_legs() {
                println!(
                    "  Warning: account {} not found, {} not applied",
                    leg.account_id,
                    format_minor(leg.delta)
                );
            }
        }

        Commands::Balance { user } => {
            let report = gateway.get_balance(&user).await?;
            if json {
                return print_json(&report);
            }
            if report.accounts.is_empty() {
                println!("No accounts found.");
            } else {
                println!("{:<20} {:>14} {:<8}", "ACCOUNT", "BALANCE", "CURRENCY");
                println!("{}", "-".repeat(44));
                for account in &report.accounts {
                    println!(
                        "{:<20} {:>14} {:<8}",
                        truncate(&account.name, 20),
                        format_minor(account.balance),
                        account.currency
                    );
                }
                println!("{}", "-".repeat(44));
            }
            println!(
                "{:<20} {:>14} {:<8}",
                "TOTAL",
                format_minor(report.total_balance.amount),
                report.total_balance.currency
            );
        }

        Commands::Transactions { user, limit } => {
            let transactions = gateway.get_transactions(&user, limit).await?;
            if json {
                return print_json(&transactions);
            }
            print_transactions(&transactions);
        }

        Commands::AccountTransactions { account, limit } => {
            let transactions = gateway.get_account_transactions(&account, limit).await?;
            if json {
                return print_json(&transactions);
            }
            print_transactions(&transactions);
        }

        Commands::Analytics {
            user,
            from,
            to,
            group_by,
        } => {
            let (start, end) = parse_date_range(from, to)?;
            let stats = gateway
                .get_analytics(AnalyticsRequest {
                    user_id: user,
                    start,
                    end,
                    group_by: group_by.as_deref().map(TimePeriod::parse_or_default),
                })
                .await?;
            if json {
                return print_json(&stats);
            }

            println!(
                "Statistics {} to {}",
                start.format("%Y-%m-%d"),
                end.format("%Y-%m-%d")
            );
            println!("  Income:  {:>14}", format_minor(stats.total_income));
            println!("  Expense: {:>14}", format_minor(stats.total_expense));
            println!(
                "  Net:     {:>14}",
                format_minor(stats.total_income - stats.total_expense)
            );

            if !stats.period_balances.is_empty() {
                println!();
                println!(
                    "{:<12} {:>14} {:>14} {:>14} {:<8}",
                    "PERIOD", "INCOME", "EXPENSE", "BALANCE", "CURRENCY"
                );
                println!("{}", "-".repeat(66));
                for period in &stats.period_balances {
                    println!(
                        "{:<12} {:>14} {:>14} {:>14} {:<8}",
                        period.period_start.format("%Y-%m-%d"),
                        format_minor(period.income),
                        format_minor(period.expense),
                        format_minor(period.balance),
                        period.currency
                    );
                }
            }

            if !stats.category_breakdown.is_empty() {
                println!();
                println!("{:<16} {:>14} {:<8}", "CATEGORY", "SPENT", "CURRENCY");
                println!("{}", "-".repeat(40));
                for category in &stats.category_breakdown {
                    println!(
                        "{:<16} {:>14} {:<8}",
                        category.category_id,
                        format_minor(category.total_amount),
                        category.currency
                    );
                }
            }
        }

        Commands::Forecast {
            user,
            period,
            periods,
        } => {
            let forecasts = gateway
                .get_forecast(&user, TimePeriod::parse_or_default(&period), periods)
                .await?;
            if json {
                return print_json(&forecasts);
            }
            if forecasts.is_empty() {
                println!("Nothing to forecast.");
            } else {
                println!(
                    "{:<12} {:<12} {:>14} {:>14} {:>14} {:<8}",
                    "FROM", "TO", "INCOME", "EXPENSE", "BALANCE", "CURRENCY"
                );
                println!("{}", "-".repeat(80));
                for forecast in forecasts {
                    println!(
                        "{:<12} {:<12} {:>14} {:>14} {:>14} {:<8}",
                        forecast.period_start.format("%Y-%m-%d"),
                        forecast.period_end.format("%Y-%m-%d"),
                        format_minor(forecast.expected_income),
                        format_minor(forecast.expected_expense),
                        format_minor(forecast.expected_balance),
                        forecast.currency
                    );
                }
            }
        }

        Commands::Overview { user, limit } => {
            let overview = gateway.get_overview(&user, limit).await?;
            if json {
                return print_json(&overview);
            }
            println!(
                "Total balance: {} across {} account(s)",
                overview.balance.total_balance,
                overview.balance.accounts.len()
            );
            println!();
            print_transactions(&overview.recent_transactions);
        }

        Commands::Portfolio { account } => {
            let portfolio = gateway.get_portfolio(&account).await?;
            if json {
                return print_json(&portfolio);
            }
            if portfolio.positions.is_empty() {
                println!("No positions found.");
            } else {
                println!("{:<14} {:<20} {:>8} {:>14}", "FIGI", "NAME", "QTY", "VALUE");
                println!("{}", "-".repeat(59));
                for valuation in &portfolio.positions {
                    let name = valuation
                        .security
                        .as_ref()
                        .map(|s| truncate(&s.name, 20))
                        .unwrap_or_else(|| "-".to_string());
                    let value = valuation
                        .value
                        .map(format_minor)
                        .unwrap_or_else(|| "n/a".to_string());
                    println!(
                        "{:<14} {:<20} {:>8} {:>14}",
                        valuation.position.figi, name, valuation.position.quantity, value
                    );
                }
                println!("{}", "-".repeat(59));
                println!("{:<44} {:>14}", "TOTAL", format_minor(portfolio.total_value));
            }
        }

        Commands::Security { figi } => {
            let security = gateway.get_security(&figi).await?;
            if json {
                return print_json(&security);
            }
            println!("Security: {}", security.name);
            println!("  FIGI:  {}", security.figi);
            println!("  Type:  {}", security.security_type);
            match (security.current_price, security.price_updated_at) {
                (Some(price), Some(at)) => println!(
                    "  Price: {} (as of {})",
                    format_minor(price),
                    at.format("%Y-%m-%d %H:%M")
                ),
                (Some(price), None) => println!("  Price: {}", format_minor(price)),
                _ => println!("  Price: n/a"),
            }
        }

        Commands::Payments { figi } => {
            let payments = gateway.get_security_payments(&figi).await?;
            if json {
                return print_json(&payments);
            }
            if payments.is_empty() {
                println!("No payments found.");
            } else {
                println!("{:<12} {:>14}", "DATE", "PER SHARE");
                println!("{}", "-".repeat(27));
                for payment in payments {
                    println!(
                        "{:<12} {:>14}",
                        payment.payment_date.format("%Y-%m-%d"),
                        format_minor(payment.amount_per_share)
                    );
                }
            }
        }

        Commands::Notify {
            user,
            title,
            message,
        } => {
            let sent = gateway.send_notification(&user, &title, &message).await?;
            let recorded = sent.audit.wait().await;
            if json {
                return print_json(&sent.receipt);
            }
            println!(
                "Notification {}: {}",
                if sent.receipt.delivered { "delivered" } else { "accepted" },
                sent.receipt.delivery_id.as_deref().unwrap_or("-")
            );
            if !recorded {
                println!("  Warning: notification was not recorded");
            }
        }

        Commands::Notifications { user, limit } => {
            let notifications = gateway.list_notifications(&user, limit).await?;
            if json {
                return print_json(&notifications);
            }
            if notifications.is_empty() {
                println!("No notifications found.");
            } else {
                println!("{:<17} {:<24} {}", "SENT", "TITLE", "MESSAGE");
                println!("{}", "-".repeat(80));
                for notification in notifications {
                    println!(
                        "{:<17} {:<24} {}",
                        notification.sent_at.format("%Y-%m-%d %H:%M"),
                        truncate(&notification.title, 24),
                        truncate(&notification.message, 37)
                    );
                }
            }
        }
    }

    Ok(())
}

async fn run_account_command(gateway: &Gateway, cmd: AccountCommands, json: bool) -> Result<()> {
    match cmd {
        AccountCommands::Open {
            user,
            name,
            account_type,
            currency,
        } => {
            let at = AccountType::from_str(&account_type).ok_or_else(|| {
                anyhow!("Invalid account type '{account_type}'. Valid types: regular, investment")
            })?;
            let account = gateway.open_account(&user, &name, at, &currency).await?;
            if json {
                return print_json(&account);
            }
            println!(
                "Opened account: {} ({}, {}) {}",
                account.name, account.account_type, account.currency, account.id
            );
        }

        AccountCommands::List { user } => {
            let report = gateway.get_balance(&user).await?;
            if json {
                return print_json(&report.accounts);
            }
            if report.accounts.is_empty() {
                println!("No accounts found.");
            } else {
                println!("{:<36} {:<20} {:<12} {:<8}", "ID", "NAME", "TYPE", "CURRENCY");
                println!("{}", "-".repeat(79));
                for account in report.accounts {
                    println!(
                        "{:<36} {:<20} {:<12} {:<8}",
                        account.id,
                        truncate(&account.name, 20),
                        account.account_type,
                        account.currency
                    );
                }
            }
        }

        AccountCommands::Show { account } => {
            let account = gateway.get_account(&account).await?;
            if json {
                return print_json(&account);
            }
            println!("{} ({}, {})", account.name, account.account_type, account.id);
            println!("Balance: {} {}", format_minor(account.balance), account.currency);
        }
    }

    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{out}");
    Ok(())
}

fn print_transactions(transactions: &[Transaction]) {
    if transactions.is_empty() {
        println!("No transactions found.");
        return;
    }

    println!(
        "{:<12} {:<9} {:>14} {:<8} {:<8} {}",
        "DATE", "KIND", "AMOUNT", "CURRENCY", "MCC", "DESCRIPTION"
    );
    println!("{}", "-".repeat(80));
    for tx in transactions {
        println!(
            "{:<12} {:<9} {:>14} {:<8} {:<8} {}",
            tx.created_at.format("%Y-%m-%d"),
            tx.kind,
            format_minor(tx.amount),
            tx.currency,
            tx.mcc.map(|m| m.to_string()).unwrap_or_default(),
            truncate(tx.description.as_deref().unwrap_or(""), 24)
        );
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

fn parse_date_range(
    from: Option<String>,
    to: Option<String>,
) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let now = Utc::now();

    let end = match to {
        Some(date_str) => end_of_day(&date_str)?,
        None => now,
    };

    let start = match from {
        Some(date_str) => parse_date(&date_str)?,
        None => TimePeriod::Month.truncate(now),
    };

    Ok((start, end))
}

fn parse_naive(date_str: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d").context("Date must be in YYYY-MM-DD format")
}

/// Midnight UTC at the start of the date.
fn parse_date(date_str: &str) -> Result<DateTime<Utc>> {
    let naive = parse_naive(date_str)?
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow!("Invalid date"))?;
    Ok(naive.and_utc())
}

/// Last representable instant of the date, so a `--to` day is included.
fn end_of_day(date_str: &str) -> Result<DateTime<Utc>> {
    let naive = parse_naive(date_str)?
        .and_hms_nano_opt(23, 59, 59, 999_999_999)
        .ok_or_else(|| anyhow!("Invalid date"))?;
    Ok(naive.and_utc())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("2024-03-15").unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap()
        );
        assert!(parse_date("15/03/2024").is_err());
    }

    #[test]
    fn test_end_of_day_is_inclusive() {
        let end = end_of_day("2024-03-15").unwrap();
        assert!(end > Utc.with_ymd_and_hms(2024, 3, 15, 23, 59, 59).unwrap());
        assert!(end < Utc.with_ymd_and_hms(2024, 3, 16, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a very long description", 10), "a very ...");
    }

    #[test]
    fn test_cli_parses_transfer() {
        let cli = Cli::try_parse_from([
            "fingate",
            "transaction",
            "create",
            "4b7c0d3e-4c33-4d1b-9a53-5b7c5a3e2f10",
            "12.50",
            "--kind",
            "transfer",
            "--to",
            "0f2a9b7e-1d2c-4e5f-8a9b-0c1d2e3f4a5b",
        ])
        .unwrap();

        match cli.command {
            Commands::Transaction(TransactionCommands::Create { kind, to, amount, .. }) => {
                assert_eq!(kind, "transfer");
                assert_eq!(amount, "12.50");
                assert!(to.is_some());
            }
            _ => panic!("expected transaction create"),
        }
    }

    #[test]
    fn test_cli_parses_account_show() {
        let cli = Cli::try_parse_from(["fingate", "--json", "account", "show", "acc-1"]).unwrap();

        assert!(cli.json);
        match cli.command {
            Commands::Account(AccountCommands::Show { account }) => assert_eq!(account, "acc-1"),
            _ => panic!("expected account show"),
        }
    }
}
