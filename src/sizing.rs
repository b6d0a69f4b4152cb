//! Position sizing: how many whole shares reach the dollar target.
//!
//! Target shares are `floor(target_value / mid)`. Truncation never buys past
//! the dollar target, and the sizing is done in integer cents so the result
//! does not depend on float rounding.

use crate::error::{Error, Result};
use crate::quote::{Mid, Quote};
use crate::side::Side;
use crate::types::{Price, Symbol};

/// The fixed allocation: one instrument, one dollar amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RebalanceTarget {
    pub symbol: Symbol,
    pub target_value: Price,
}

impl RebalanceTarget {
    pub fn new(symbol: Symbol, target_value: Price) -> Result<Self> {
        if !target_value.is_positive() {
            return Err(Error::InvalidTarget(format!(
                "target value for {symbol} must be positive, got {target_value}"
            )));
        }
        Ok(Self {
            symbol,
            target_value,
        })
    }
}

/// Outcome of sizing one decision cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sizing {
    pub mid: Mid,
    pub target_shares: i64,
    pub current_quantity: i64,
    /// `target_shares - current_quantity`. Positive buys, negative sells.
    pub delta: i64,
}

impl Sizing {
    /// True when no order is needed.
    pub fn is_balanced(&self) -> bool {
        self.delta == 0
    }

    pub fn side(&self) -> Option<Side> {
        Side::from_delta(self.delta)
    }

    /// Absolute share count to trade.
    pub fn order_quantity(&self) -> u64 {
        self.delta.unsigned_abs()
    }
}

/// Whole shares of `target_value` at `mid`, truncated toward zero.
pub fn target_shares(target_value: Price, mid: Mid) -> i64 {
    if !target_value.is_positive() {
        return 0;
    }
    // target / (twice / 2) == 2 * target / twice
    let shares = (2 * target_value.0 as i128) / mid.twice_cents() as i128;
    i64::try_from(shares).unwrap_or(i64::MAX)
}

/// Compute the signed share delta that moves `current_quantity` to the
/// target allocation at the quote's mid price.
///
/// Fails with [`Error::InvalidQuote`] if the quote has no usable mid.
pub fn compute_delta(target_value: Price, quote: &Quote, current_quantity: i64) -> Result<Sizing> {
    let mid = quote.mid()?;
    let target_shares = target_shares(target_value, mid);
    let delta = target_shares.checked_sub(current_quantity).ok_or_else(|| {
        Error::InvalidTarget(format!(
            "share delta overflows: target {target_shares}, held {current_quantity}"
        ))
    })?;

    Ok(Sizing {
        mid,
        target_shares,
        current_quantity,
        delta,
    })
}
