//! Order intents and the lifecycle states an order resolves to.

use std::fmt;

use crate::error::{Error, Result};
use crate::pricing::LimitRule;
use crate::quote::Quote;
use crate::side::Side;
use crate::sizing::Sizing;
use crate::types::{Price, Symbol};

/// A limit order the cycle intends to place. Never zero quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OrderIntent {
    pub symbol: Symbol,
    pub side: Side,
    pub quantity: u64,
    pub limit_price: Price,
}

impl OrderIntent {
    pub fn new(symbol: Symbol, side: Side, quantity: u64, limit_price: Price) -> Result<Self> {
        if quantity == 0 {
            return Err(Error::ZeroQuantity);
        }
        if !limit_price.is_positive() {
            return Err(Error::ZeroPrice);
        }
        Ok(Self {
            symbol,
            side,
            quantity,
            limit_price,
        })
    }

    /// Build the order for a sizing result. `Ok(None)` when already balanced.
    pub fn from_sizing(sizing: &Sizing, quote: &Quote, rule: &LimitRule) -> Result<Option<Self>> {
        let Some(side) = sizing.side() else {
            return Ok(None);
        };
        let limit_price = rule
            .limit_from_mid(sizing.mid, side)
            .ok_or_else(|| Error::InvalidQuote {
                symbol: quote.symbol,
                reason: format!("{side} limit at mid {} rounds to zero", sizing.mid),
            })?;
        Self::new(quote.symbol, side, sizing.order_quantity(), limit_price).map(Some)
    }

    /// Quantity times limit price.
    pub fn notional(&self) -> Price {
        Price(self.limit_price.0.saturating_mul(self.quantity as i64))
    }
}

impl fmt::Display for OrderIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} @ {} LMT",
            self.side, self.quantity, self.symbol, self.limit_price
        )
    }
}

/// Lifecycle of a submitted order.
///
/// ```text
/// submitted -> filled | partially_filled | unfilled_timeout | cancelled | rejected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum OrderState {
    Submitted,
    Filled,
    /// Some quantity filled before the order stopped working.
    PartiallyFilled,
    /// Nothing filled before the poll deadline; a cancel was requested.
    UnfilledTimeout,
    Cancelled,
    Rejected,
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderState::Submitted => "submitted",
            OrderState::Filled => "filled",
            OrderState::PartiallyFilled => "partially_filled",
            OrderState::UnfilledTimeout => "unfilled_timeout",
            OrderState::Cancelled => "cancelled",
            OrderState::Rejected => "rejected",
        };
        f.write_str(s)
    }
}
