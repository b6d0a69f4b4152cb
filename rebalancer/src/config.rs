//! TOML configuration loading and validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use allocbook::{LimitRule, Price, RebalanceTarget, Symbol};
use allocbook_broker::tastytrade::Environment;
use chrono::NaiveDate;
use serde::Deserialize;
use zeroize::Zeroizing;

use crate::error::{Error, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub target: TargetConfig,
    pub broker: BrokerConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub calendar: CalendarConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

/// The one instrument held and its fixed dollar allocation.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    pub symbol: String,
    /// Dollars, e.g. `2000.0`.
    pub value: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    #[serde(default)]
    pub environment: Environment,
    pub account: String,
    /// Name of the environment variable holding the login.
    #[serde(default = "default_username_env")]
    pub username_env: String,
    /// Name of the environment variable holding the password.
    #[serde(default = "default_password_env")]
    pub password_env: String,
    /// Session token cache file. Unset disables caching.
    #[serde(default)]
    pub session_cache: Option<PathBuf>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_username_env() -> String {
    "TASTYTRADE_USERNAME".into()
}
fn default_password_env() -> String {
    "TASTYTRADE_PASSWORD".into()
}
fn default_request_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_order_timeout")]
    pub order_timeout_secs: u64,
    #[serde(default = "default_max_poll_retries")]
    pub max_poll_retries: u32,
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_offset")]
    pub limit_offset_bps: u32,
    #[serde(default = "default_increment")]
    pub price_increment_cents: i64,
}

fn default_poll_interval() -> u64 {
    5_000
}
fn default_order_timeout() -> u64 {
    300
}
fn default_max_poll_retries() -> u32 {
    5
}
fn default_retry_backoff() -> u64 {
    1_000
}
fn default_offset() -> u32 {
    allocbook::pricing::DEFAULT_OFFSET_BPS
}
fn default_increment() -> i64 {
    1
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            order_timeout_secs: default_order_timeout(),
            max_poll_retries: default_max_poll_retries(),
            retry_backoff_ms: default_retry_backoff(),
            limit_offset_bps: default_offset(),
            price_increment_cents: default_increment(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CalendarConfig {
    /// Closures the built-in NYSE rules don't know about (e.g. a national
    /// day of mourning).
    #[serde(default)]
    pub extra_closures: Vec<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotifyConfig {
    /// SMTP delivery. Without it, summaries only go to the log.
    #[serde(default)]
    pub email: Option<EmailConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub username: String,
    #[serde(default = "default_smtp_password_env")]
    pub password_env: String,
    pub from: String,
    pub to: Vec<String>,
}

fn default_smtp_port() -> u16 {
    587
}
fn default_smtp_password_env() -> String {
    "SMTP_PASSWORD".into()
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate config invariants.
    pub fn validate(&self) -> Result<()> {
        self.rebalance_target()?;
        self.limit_rule()?;

        if self.broker.account.trim().is_empty() {
            return Err(Error::Config("broker account must not be empty".into()));
        }
        if self.broker.request_timeout_secs == 0 {
            return Err(Error::Config("request_timeout_secs must be > 0".into()));
        }
        if self.execution.poll_interval_ms == 0 {
            return Err(Error::Config("poll_interval_ms must be > 0".into()));
        }
        if self.execution.order_timeout_secs == 0 {
            return Err(Error::Config("order_timeout_secs must be > 0".into()));
        }
        if self.execution.poll_interval_ms > self.execution.order_timeout_secs * 1_000 {
            return Err(Error::Config(
                "poll_interval_ms must not exceed order_timeout_secs".into(),
            ));
        }
        if let Some(email) = &self.notify.email {
            if email.smtp_host.is_empty() {
                return Err(Error::Config("notify.email.smtp_host must not be empty".into()));
            }
            if email.to.is_empty() {
                return Err(Error::Config("notify.email.to needs at least one address".into()));
            }
        }
        Ok(())
    }

    /// Target instrument and dollar allocation.
    pub fn rebalance_target(&self) -> Result<RebalanceTarget> {
        let symbol = Symbol::try_new(self.target.symbol.trim()).ok_or_else(|| {
            Error::Config(format!(
                "target symbol {:?} must be 1-{} characters",
                self.target.symbol,
                Symbol::MAX_LEN
            ))
        })?;
        let value = Price::from_dollars(self.target.value)
            .ok_or_else(|| Error::Config(format!("target value {} is not a valid amount", self.target.value)))?;
        RebalanceTarget::new(symbol, value).map_err(|e| Error::Config(e.to_string()))
    }

    /// Limit offset and price increment.
    pub fn limit_rule(&self) -> Result<LimitRule> {
        LimitRule::new(
            self.execution.limit_offset_bps,
            Price(self.execution.price_increment_cents),
        )
        .map_err(|e| Error::Config(e.to_string()))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.broker.request_timeout_secs)
    }
}

/// Read a secret from the environment variable `var`.
pub fn secret_from_env(var: &str) -> Result<Zeroizing<String>> {
    match std::env::var(var) {
        Ok(v) if !v.is_empty() => Ok(Zeroizing::new(v)),
        _ => Err(Error::MissingSecret(var.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example_toml() -> &'static str {
        r#"
[target]
symbol = "TQQQ"
value = 2000.0

[broker]
environment = "sandbox"
account = "5WT00000"
username_env = "TASTY_USER"
password_env = "TASTY_PASS"
session_cache = "./state/session.json"
request_timeout_secs = 15

[execution]
poll_interval_ms = 5000
order_timeout_secs = 300
max_poll_retries = 5
retry_backoff_ms = 1000
limit_offset_bps = 50
price_increment_cents = 1

[calendar]
extra_closures = ["2026-12-24"]

[notify.email]
smtp_host = "smtp.gmail.com"
username = "me@example.com"
from = "Rebalancer <me@example.com>"
to = ["me@example.com"]
"#
    }

    #[test]
    fn parse_example_config() {
        let config: Config = toml::from_str(example_toml()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.broker.environment, Environment::Sandbox);
        assert_eq!(config.broker.request_timeout_secs, 15);
        assert_eq!(config.execution.poll_interval_ms, 5000);
        assert_eq!(
            config.calendar.extra_closures,
            vec![NaiveDate::from_ymd_opt(2026, 12, 24).unwrap()]
        );

        let email = config.notify.email.as_ref().unwrap();
        assert_eq!(email.smtp_port, 587);
        assert_eq!(email.password_env, "SMTP_PASSWORD");
    }

    #[test]
    fn rebalance_target_in_cents() {
        let config: Config = toml::from_str(example_toml()).unwrap();
        let target = config.rebalance_target().unwrap();
        assert_eq!(target.symbol, Symbol::new("TQQQ"));
        assert_eq!(target.target_value, Price(2000_00));
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let toml = r#"
[target]
symbol = "TQQQ"
value = 2000.0

[broker]
account = "5WT00000"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.broker.environment, Environment::Sandbox);
        assert_eq!(config.broker.password_env, "TASTYTRADE_PASSWORD");
        assert!(config.broker.session_cache.is_none());
        assert_eq!(config.execution.order_timeout_secs, 300);
        assert_eq!(config.execution.limit_offset_bps, 50);
        assert!(config.calendar.extra_closures.is_empty());
        assert!(config.notify.email.is_none());
        assert_eq!(config.limit_rule().unwrap(), LimitRule::default());
    }

    #[test]
    fn production_environment() {
        let toml = example_toml().replace("\"sandbox\"", "\"production\"");
        let config: Config = toml::from_str(&toml).unwrap();
        assert_eq!(config.broker.environment, Environment::Production);
    }

    #[test]
    fn validate_catches_bad_target() {
        let mut config: Config = toml::from_str(example_toml()).unwrap();
        config.target.value = 0.0;
        assert!(config.validate().is_err());

        let mut config: Config = toml::from_str(example_toml()).unwrap();
        config.target.symbol = "TOOLONGSYM".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_catches_bad_execution() {
        let mut config: Config = toml::from_str(example_toml()).unwrap();
        config.execution.price_increment_cents = 0;
        assert!(config.validate().is_err());

        let mut config: Config = toml::from_str(example_toml()).unwrap();
        config.execution.poll_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config: Config = toml::from_str(example_toml()).unwrap();
        config.execution.poll_interval_ms = 301_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_catches_empty_recipients() {
        let mut config: Config = toml::from_str(example_toml()).unwrap();
        if let Some(email) = config.notify.email.as_mut() {
            email.to.clear();
        }
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, example_toml()).unwrap();
        assert!(Config::load(&path).is_ok());

        let missing = dir.path().join("missing.toml");
        assert!(matches!(Config::load(&missing), Err(Error::ConfigRead { .. })));
    }

    #[test]
    fn missing_secret() {
        let err = secret_from_env("ALLOCBOOK_TEST_UNSET_VARIABLE").unwrap_err();
        assert!(matches!(err, Error::MissingSecret(_)));
    }
}
