//! Limit price derivation: a fixed basis-point offset from the mid.
//!
//! Buys rest `offset_bps` above mid, sells the same distance below, then the
//! price is rounded half-up to the instrument's increment. After rounding a
//! buy is never below mid and a sell never above it.

use crate::error::{Error, Result};
use crate::quote::{Mid, Quote};
use crate::side::Side;
use crate::types::Price;

/// Default offset from mid: 0.5%.
pub const DEFAULT_OFFSET_BPS: u32 = 50;

/// How limit prices are derived from a mid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitRule {
    offset_bps: u32,
    increment: Price,
}

impl Default for LimitRule {
    fn default() -> Self {
        Self {
            offset_bps: DEFAULT_OFFSET_BPS,
            increment: Price::ONE_CENT,
        }
    }
}

impl LimitRule {
    /// `offset_bps` must be below 10 000 (100%) and `increment` positive.
    pub fn new(offset_bps: u32, increment: Price) -> Result<Self> {
        if offset_bps >= 10_000 {
            return Err(Error::InvalidTarget(format!(
                "limit offset must be below 10000 bps, got {offset_bps}"
            )));
        }
        if !increment.is_positive() {
            return Err(Error::InvalidTarget(format!(
                "price increment must be positive, got {increment}"
            )));
        }
        Ok(Self {
            offset_bps,
            increment,
        })
    }

    pub fn offset_bps(&self) -> u32 {
        self.offset_bps
    }

    pub fn increment(&self) -> Price {
        self.increment
    }

    /// Limit price for `side` at the quote's mid.
    pub fn derive_limit(&self, quote: &Quote, side: Side) -> Result<Price> {
        let mid = quote.mid()?;
        self.limit_from_mid(mid, side).ok_or_else(|| Error::InvalidQuote {
            symbol: quote.symbol,
            reason: format!("{side} limit at mid {mid} rounds to zero"),
        })
    }

    /// Limit price for `side` at `mid`, or `None` if it rounds to zero.
    pub fn limit_from_mid(&self, mid: Mid, side: Side) -> Option<Price> {
        let twice = mid.twice_cents() as i128;
        let inc = self.increment.0 as i128;
        let factor = match side {
            Side::Buy => 10_000 + self.offset_bps as i128,
            Side::Sell => 10_000 - self.offset_bps as i128,
        };

        // exact limit in cents = twice * factor / 20_000; in increments, halves up
        let num = twice * factor;
        let den = 20_000 * inc;
        let mut ticks = (2 * num + den) / (2 * den);

        match side {
            Side::Buy if 2 * ticks * inc < twice => {
                ticks = (twice + 2 * inc - 1) / (2 * inc);
            }
            Side::Sell if 2 * ticks * inc > twice => {
                ticks = twice / (2 * inc);
            }
            _ => {}
        }

        let cents = i64::try_from(ticks * inc).ok()?;
        (cents > 0).then_some(Price(cents))
    }
}

/// Limit price with the default rule: 0.5% from mid, one-cent increment.
pub fn derive_limit(quote: &Quote, side: Side) -> Result<Price> {
    LimitRule::default().derive_limit(quote, side)
}
