//! Tastytrade broker implementation.

pub mod client;
pub mod session;
pub mod types;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use allocbook::{Price, Quote, Side, Symbol};
use chrono::Utc;
use log::{info, warn};
use serde::Deserialize;
use zeroize::Zeroizing;

use crate::Broker;
use crate::error::BrokerError;
use crate::types::*;
use client::TastytradeClient;
use session::SessionCache;
use types::{Decimal, OrderLegRequest, OrderRequest};

/// Which tastytrade deployment to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Certification sandbox. Orders never reach a market.
    #[default]
    Sandbox,
    Production,
}

impl Environment {
    pub fn base_url(self) -> &'static str {
        match self {
            Environment::Sandbox => "https://api.cert.tastyworks.com",
            Environment::Production => "https://api.tastyworks.com",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Sandbox => "sandbox",
            Environment::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection settings for [`TastytradeBroker`].
pub struct TastytradeConfig {
    pub environment: Environment,
    pub account_number: String,
    pub login: String,
    pub password: Zeroizing<String>,
    /// Where to cache the session token between runs. `None` logs in every time.
    pub session_cache: Option<PathBuf>,
    pub request_timeout: Duration,
}

/// Tastytrade broker implementing the generic Broker trait.
///
/// Uses the REST API for all operations. Blocking (sync) via reqwest::blocking.
pub struct TastytradeBroker {
    config: TastytradeConfig,
    client: Option<TastytradeClient>,
}

impl TastytradeBroker {
    /// Create a new tastytrade broker handle (not yet connected).
    pub fn new(config: TastytradeConfig) -> Self {
        Self {
            config,
            client: None,
        }
    }

    fn require_client(&self) -> Result<&TastytradeClient, BrokerError> {
        self.client.as_ref().ok_or(BrokerError::NotConnected)
    }

    fn account_number(&self) -> &str {
        &self.config.account_number
    }

    fn fresh_session(&self, client: &TastytradeClient) -> Result<Zeroizing<String>, BrokerError> {
        let env = self.config.environment;
        info!("Creating new tastytrade {env} session");
        let token = client.create_session(&self.config.login, &self.config.password)?;

        if let Some(path) = &self.config.session_cache {
            let cache = SessionCache::new(path);
            if let Err(e) = cache.store(env.as_str(), &token, Utc::now()) {
                warn!("Failed to cache session token at {}: {e}", path.display());
            }
        }
        Ok(token)
    }
}

impl Broker for TastytradeBroker {
    fn connect(&mut self) -> Result<(), BrokerError> {
        let env = self.config.environment;
        let mut client = TastytradeClient::new(env.base_url(), self.config.request_timeout)?;

        let cache = self.config.session_cache.as_ref().map(SessionCache::new);
        let cached = cache
            .as_ref()
            .and_then(|c| c.load(env.as_str(), Utc::now()));

        if let Some(token) = cached {
            client.set_token(token);
            // A cached token can be revoked early; probe it once.
            match client.balances(self.account_number()) {
                Ok(_) => {
                    info!("Connected to tastytrade {env} with cached session");
                    self.client = Some(client);
                    return Ok(());
                }
                Err(BrokerError::Auth(msg)) => {
                    warn!("Cached session rejected ({msg}), logging in again");
                    if let Some(c) = &cache {
                        c.clear();
                    }
                }
                Err(e) => return Err(e),
            }
        }

        let token = self.fresh_session(&client)?;
        client.set_token(token);
        info!("Connected to tastytrade {env}");
        self.client = Some(client);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), BrokerError> {
        self.client = None;
        Ok(())
    }

    fn holding(&self, symbol: &Symbol) -> Result<Holding, BrokerError> {
        let client = self.require_client()?;
        let positions = client.positions(self.account_number())?;

        let holding = positions
            .iter()
            .filter(|p| {
                p.instrument_type
                    .as_deref()
                    .is_none_or(|t| t.eq_ignore_ascii_case("equity"))
            })
            .find(|p| p.symbol.eq_ignore_ascii_case(symbol.as_str()))
            .map(|p| Holding {
                symbol: *symbol,
                quantity: p.signed_quantity(),
                avg_cost_cents: p.average_open_price.map(Decimal::to_cents),
                close_price_cents: p.close_price.map(Decimal::to_cents),
            })
            .unwrap_or_else(|| Holding::flat(*symbol));

        Ok(holding)
    }

    fn account(&self) -> Result<Account, BrokerError> {
        let client = self.require_client()?;
        let balances = client.balances(self.account_number())?;
        let cents = |d: Option<Decimal>| d.map_or(0, Decimal::to_cents);

        Ok(Account {
            equity_cents: cents(balances.net_liquidating_value),
            buying_power_cents: cents(balances.equity_buying_power),
            cash_cents: cents(balances.cash_balance),
        })
    }

    fn quote(&self, symbol: &Symbol) -> Result<Quote, BrokerError> {
        let client = self.require_client()?;
        let item = client.equity_quote(symbol.as_str())?;

        // Zero means "no quote" on this endpoint.
        let price = |d: Option<Decimal>| {
            d.and_then(|d| Price::from_dollars(d.0))
                .filter(|p| p.is_positive())
        };

        Ok(Quote {
            symbol: *symbol,
            bid: price(item.bid),
            ask: price(item.ask),
            last: price(item.last),
            timestamp: Utc::now(),
        })
    }

    fn submit_order(&self, order: &BrokerOrder) -> Result<OrderId, BrokerError> {
        let client = self.require_client()?;
        let request = order_request(order);
        let placed = client.place_order(self.account_number(), &request)?;

        if placed.status.eq_ignore_ascii_case("rejected") {
            return Err(BrokerError::Rejected(
                placed
                    .reject_reason
                    .unwrap_or_else(|| "rejected at submission".into()),
            ));
        }

        info!(
            "tastytrade order {}: {} {} {} @ {}",
            placed.id, order.side, order.quantity, order.symbol, order.limit_price
        );
        Ok(OrderId(placed.id))
    }

    fn order_status(&self, id: OrderId) -> Result<BrokerOrderStatus, BrokerError> {
        let client = self.require_client()?;
        let data = client.order(self.account_number(), id.0)?;

        let ordered = data.ordered_quantity();
        let filled = data.filled_quantity().min(ordered);
        let status = map_status(&data.status, filled)?;

        Ok(BrokerOrderStatus {
            id,
            status,
            filled_quantity: filled,
            remaining_quantity: ordered - filled,
            avg_fill_price_cents: data.avg_fill_price_cents(),
        })
    }

    fn cancel_order(&self, id: OrderId) -> Result<(), BrokerError> {
        let client = self.require_client()?;
        client.cancel_order(self.account_number(), id.0)
    }
}

/// Day limit order with a single equity leg.
///
/// The leg action follows the order's position effect. An order that
/// would cross zero goes out as a single closing leg.
pub fn order_request(order: &BrokerOrder) -> OrderRequest {
    let (action, price_effect) = match (order.side, order.effect) {
        (Side::Buy, PositionEffect::Open) => ("Buy to Open", "Debit"),
        (Side::Buy, PositionEffect::Close) => ("Buy to Close", "Debit"),
        (Side::Sell, PositionEffect::Open) => ("Sell to Open", "Credit"),
        (Side::Sell, PositionEffect::Close) => ("Sell to Close", "Credit"),
    };

    OrderRequest {
        time_in_force: "Day",
        order_type: "Limit",
        price: decimal_string(order.limit_price),
        price_effect,
        legs: vec![OrderLegRequest {
            instrument_type: "Equity",
            symbol: order.symbol.as_str().to_string(),
            quantity: order.quantity,
            action,
        }],
    }
}

/// "50.25" for 5025 cents.
fn decimal_string(price: Price) -> String {
    let sign = if price.0 < 0 { "-" } else { "" };
    let cents = price.0.unsigned_abs();
    format!("{sign}{}.{:02}", cents / 100, cents % 100)
}

/// Translate a tastytrade order status string.
pub fn map_status(status: &str, filled: u64) -> Result<BrokerOrderState, BrokerError> {
    let working = if filled > 0 {
        BrokerOrderState::PartiallyFilled
    } else {
        BrokerOrderState::Working
    };

    let state = match status {
        "Received" | "Routed" | "In Flight" | "Contingent" => BrokerOrderState::Pending,
        "Live" | "Cancel Requested" | "Replace Requested" => working,
        "Filled" => BrokerOrderState::Filled,
        "Cancelled" | "Removed" | "Partially Removed" => BrokerOrderState::Cancelled,
        "Expired" => BrokerOrderState::Expired,
        "Rejected" => BrokerOrderState::Rejected,
        other => {
            return Err(BrokerError::Parse(format!("unknown order status {other:?}")));
        }
    };
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_strings() {
        assert_eq!(decimal_string(Price(50_25)), "50.25");
        assert_eq!(decimal_string(Price(5)), "0.05");
        assert_eq!(decimal_string(Price(100_00)), "100.00");
    }

    #[test]
    fn base_urls() {
        assert_eq!(Environment::Sandbox.base_url(), "https://api.cert.tastyworks.com");
        assert_eq!(Environment::Production.base_url(), "https://api.tastyworks.com");
        assert_eq!(Environment::default(), Environment::Sandbox);
    }

    #[test]
    fn not_connected() {
        let broker = TastytradeBroker::new(TastytradeConfig {
            environment: Environment::Sandbox,
            account_number: "5WT00000".into(),
            login: "user".into(),
            password: Zeroizing::new("secret".into()),
            session_cache: None,
            request_timeout: Duration::from_secs(5),
        });
        assert!(matches!(
            broker.holding(&Symbol::new("TQQQ")),
            Err(BrokerError::NotConnected)
        ));
    }
}
