//! Quotes and the mid price derived from them.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::types::{Price, Symbol};

/// A point-in-time quote. Fetched fresh for every decision cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Quote {
    pub symbol: Symbol,
    pub bid: Option<Price>,
    pub ask: Option<Price>,
    pub last: Option<Price>,
    pub timestamp: DateTime<Utc>,
}

impl Quote {
    /// A two-sided quote with no last price.
    pub fn two_sided(symbol: Symbol, bid: Price, ask: Price, timestamp: DateTime<Utc>) -> Self {
        Self {
            symbol,
            bid: Some(bid),
            ask: Some(ask),
            last: None,
            timestamp,
        }
    }

    /// A last-trade-only quote.
    pub fn last_only(symbol: Symbol, last: Price, timestamp: DateTime<Utc>) -> Self {
        Self {
            symbol,
            bid: None,
            ask: None,
            last: Some(last),
            timestamp,
        }
    }

    /// Mid price: `(bid + ask) / 2` when both sides are present and positive,
    /// otherwise the last price.
    ///
    /// A crossed book (`bid > ask`) is rejected rather than falling back to
    /// `last`, since either side may be stale.
    pub fn mid(&self) -> Result<Mid> {
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) if bid.is_positive() && ask.is_positive() => {
                if bid > ask {
                    return Err(Error::invalid_quote(
                        self.symbol,
                        format!("crossed quote: bid {bid} > ask {ask}"),
                    ));
                }
                bid.0
                    .checked_add(ask.0)
                    .map(Mid)
                    .ok_or_else(|| Error::invalid_quote(self.symbol, "bid + ask overflows"))
            }
            _ => match self.last {
                Some(last) if last.is_positive() => Mid::from_price(last).ok_or_else(|| {
                    Error::invalid_quote(self.symbol, "last price overflows")
                }),
                Some(last) => Err(Error::invalid_quote(
                    self.symbol,
                    format!("non-positive last price {last} and no two-sided quote"),
                )),
                None => Err(Error::invalid_quote(
                    self.symbol,
                    "no bid/ask and no last price",
                )),
            },
        }
    }
}

/// Mid price held as doubled cents, so the half-cent mid of an odd-width
/// spread stays exact. Always positive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Mid(i64);

impl Mid {
    /// `None` unless `price` is positive and doubling it fits.
    pub fn from_price(price: Price) -> Option<Mid> {
        if !price.is_positive() {
            return None;
        }
        price.0.checked_mul(2).map(Mid)
    }

    /// Doubled cents: `Mid` of $54.725 is `10945`.
    #[inline]
    pub fn twice_cents(self) -> i64 {
        self.0
    }

    /// Nearest whole cent, half-cents rounded up.
    pub fn to_price(self) -> Price {
        Price(self.0 / 2 + self.0 % 2)
    }
}

impl fmt::Display for Mid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 % 2 == 0 {
            write!(f, "{}", Price(self.0 / 2))
        } else {
            let cents = self.0 / 2;
            write!(f, "${}.{:02}5", cents / 100, cents % 100)
        }
    }
}
