//! Runtime settings.
//!
//! Values are layered: built-in defaults, then an optional TOML file
//! (`fingate.toml` unless another path is given), then environment variables
//! prefixed with `FINGATE__`, using `__` between nested keys
//! (e.g. `FINGATE__DATABASE__URL`).
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "fingate";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub gateway: GatewaySettings,
    pub notification: NotificationSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewaySettings {
    /// Currency totals and forecasts are reported in
    pub reporting_currency: String,
    /// Upper bound for one gateway call; absent means unbounded
    pub request_timeout_ms: Option<u64>,
    /// Default page size for transaction listings
    pub transactions_limit: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationSettings {
    /// Base URL of the notification service; notifications are disabled when unset
    pub url: Option<String>,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    pub level: String,
    pub json: bool,
}

impl Settings {
    /// Load settings from `path` (extension optional) or the default file,
    /// which may be absent, then from the environment.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::with_name(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        Self::builder()?
            .add_source(file)
            .add_source(Environment::with_prefix("FINGATE").separator("__"))
            .build()?
            .try_deserialize()
    }

    /// Built-in defaults only.
    pub fn defaults() -> Result<Self, ConfigError> {
        Self::builder()?.build()?.try_deserialize()
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("database.url", "sqlite:fingate.db")?
            .set_default("database.max_connections", 5)?
            .set_default("database.busy_timeout_ms", 5_000)?
            .set_default("gateway.reporting_currency", "RUB")?
            .set_default("gateway.transactions_limit", 50)?
            .set_default("notification.timeout_ms", 3_000)?
            .set_default("log.level", "info")?
            .set_default("log.json", false)
    }
}

impl DatabaseSettings {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

impl GatewaySettings {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

impl NotificationSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::defaults().unwrap();
        assert_eq!(settings.database.max_connections, 5);
        assert_eq!(settings.gateway.reporting_currency, "RUB");
        assert_eq!(settings.gateway.request_timeout(), None);
        assert!(settings.notification.url.is_none());
        assert_eq!(settings.log.level, "info");
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[database]\nurl = \"sqlite:/tmp/other.db\"\n\n[gateway]\nreporting_currency = \"EUR\"\nrequest_timeout_ms = 250\n\n[notification]\nurl = \"http://localhost:9090/\""
        )
        .unwrap();

        let settings = Settings::load(file.path().to_str()).unwrap();
        assert_eq!(settings.database.url, "sqlite:/tmp/other.db");
        assert_eq!(settings.database.max_connections, 5);
        assert_eq!(settings.gateway.reporting_currency, "EUR");
        assert_eq!(settings.gateway.request_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(settings.notification.url.as_deref(), Some("http://localhost:9090/"));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        assert!(Settings::load(Some("/nonexistent/fingate-settings")).is_err());
    }
}
