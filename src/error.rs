//! Decision errors: calendar gaps, unusable quotes, invalid order inputs.

use chrono::NaiveDate;

use crate::types::Symbol;

/// Errors returned by the rebalancing decision functions.
///
/// Every variant aborts the cycle before an order is built.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The trading calendar has no data for the queried date.
    #[error("calendar unavailable for {date}: {reason}")]
    CalendarUnavailable { date: NaiveDate, reason: String },

    /// The quote has no usable mid price (missing, non-positive, or crossed).
    #[error("invalid quote for {symbol}: {reason}")]
    InvalidQuote { symbol: Symbol, reason: String },

    /// The configured target or pricing rule is unusable.
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    /// Quantity must be greater than zero.
    #[error("quantity must be greater than zero")]
    ZeroQuantity,

    /// Limit price must be greater than zero.
    #[error("price must be greater than zero")]
    ZeroPrice,
}

impl Error {
    pub(crate) fn invalid_quote(symbol: Symbol, reason: impl Into<String>) -> Self {
        Error::InvalidQuote {
            symbol,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
