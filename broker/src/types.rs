//! Shared broker types: holdings, accounts, orders, order status.

use std::fmt;

use allocbook::{OrderIntent, Price, Side, Symbol};

/// Broker-reported holding in one instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Holding {
    pub symbol: Symbol,
    /// Whole shares. Positive = long, negative = short, zero = flat.
    pub quantity: i64,
    pub avg_cost_cents: Option<i64>,
    /// Broker's reference price (previous close or mark), informational.
    pub close_price_cents: Option<i64>,
}

impl Holding {
    /// No position.
    pub fn flat(symbol: Symbol) -> Self {
        Self {
            symbol,
            quantity: 0,
            avg_cost_cents: None,
            close_price_cents: None,
        }
    }

    /// Market value at `price`.
    pub fn market_value(&self, price: Price) -> Price {
        Price(self.quantity.saturating_mul(price.0))
    }

    /// Unrealized P&L at `price`. `None` without an average cost.
    pub fn unrealized_pnl(&self, price: Price) -> Option<Price> {
        let avg = self.avg_cost_cents?;
        Some(Price((price.0 - avg).saturating_mul(self.quantity)))
    }
}

/// Account summary from the broker.
#[derive(Debug, Clone)]
pub struct Account {
    pub equity_cents: i64,
    pub buying_power_cents: i64,
    pub cash_cents: i64,
}

/// Whether an order opens (or adds to) a position or reduces one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionEffect {
    Open,
    Close,
}

impl PositionEffect {
    /// `Close` when `side` trades against a holding of `held` shares.
    pub fn for_order(side: Side, held: i64) -> Self {
        match side {
            Side::Buy if held < 0 => PositionEffect::Close,
            Side::Sell if held > 0 => PositionEffect::Close,
            _ => PositionEffect::Open,
        }
    }
}

/// Day limit order to submit to a broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerOrder {
    pub symbol: Symbol,
    pub side: Side,
    pub quantity: u64,
    pub limit_price: Price,
    pub effect: PositionEffect,
}

impl BrokerOrder {
    /// Order for `intent` placed against a holding of `held` shares.
    pub fn new(intent: &OrderIntent, held: i64) -> Self {
        Self {
            symbol: intent.symbol,
            side: intent.side,
            quantity: intent.quantity,
            limit_price: intent.limit_price,
            effect: PositionEffect::for_order(intent.side, held),
        }
    }
}

/// Opaque order ID returned by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Status of a submitted order, as the broker reports it.
#[derive(Debug, Clone)]
pub struct BrokerOrderStatus {
    pub id: OrderId,
    pub status: BrokerOrderState,
    pub filled_quantity: u64,
    pub remaining_quantity: u64,
    /// Zero until something fills.
    pub avg_fill_price_cents: i64,
}

/// Broker-side order state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerOrderState {
    /// Received but not yet working at the exchange.
    Pending,
    /// Working, nothing filled.
    Working,
    PartiallyFilled,
    Filled,
    Cancelled,
    Expired,
    Rejected,
}

impl BrokerOrderState {
    /// The order can no longer fill.
    pub fn is_done(self) -> bool {
        matches!(
            self,
            BrokerOrderState::Filled
                | BrokerOrderState::Cancelled
                | BrokerOrderState::Expired
                | BrokerOrderState::Rejected
        )
    }
}
