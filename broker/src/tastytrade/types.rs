//! Tastytrade API wire types.
//!
//! Every response is wrapped in a `{"data": ...}` envelope. Numeric fields
//! arrive as strings on some endpoints and as numbers on others, so they
//! are read through [`Decimal`].

use serde::{Deserialize, Serialize};

/// `{"data": T}` response envelope.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

/// `{"items": [...]}` list payload.
#[derive(Debug, Deserialize)]
pub struct Items<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

/// A decimal that may be encoded as a JSON number or a string.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(try_from = "NumOrStr")]
pub struct Decimal(pub f64);

#[derive(Deserialize)]
#[serde(untagged)]
enum NumOrStr {
    Num(f64),
    Str(String),
}

impl TryFrom<NumOrStr> for Decimal {
    type Error = String;

    fn try_from(value: NumOrStr) -> Result<Self, Self::Error> {
        let v = match value {
            NumOrStr::Num(n) => n,
            NumOrStr::Str(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|e| format!("invalid decimal {s:?}: {e}"))?,
        };
        if v.is_finite() {
            Ok(Decimal(v))
        } else {
            Err(format!("non-finite decimal {v}"))
        }
    }
}

impl Decimal {
    /// Dollars to whole cents, rounded.
    pub fn to_cents(self) -> i64 {
        (self.0 * 100.0).round() as i64
    }

    /// Share count, rounded to the nearest whole share.
    pub fn to_shares(self) -> i64 {
        self.0.round() as i64
    }
}

// ============================================================================
// Sessions
// ============================================================================

/// Body of `POST /sessions`.
#[derive(Serialize)]
pub struct SessionRequest<'a> {
    pub login: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SessionData {
    pub session_token: String,
}

// ============================================================================
// Account data
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PositionItem {
    pub symbol: String,
    #[serde(default)]
    pub instrument_type: Option<String>,
    pub quantity: Decimal,
    /// "Long", "Short" or "Zero".
    pub quantity_direction: String,
    #[serde(default)]
    pub average_open_price: Option<Decimal>,
    #[serde(default)]
    pub close_price: Option<Decimal>,
}

impl PositionItem {
    /// Quantity with short positions negative.
    pub fn signed_quantity(&self) -> i64 {
        let qty = self.quantity.to_shares().abs();
        if self.quantity_direction.eq_ignore_ascii_case("short") {
            -qty
        } else {
            qty
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BalanceData {
    #[serde(default)]
    pub net_liquidating_value: Option<Decimal>,
    #[serde(default)]
    pub equity_buying_power: Option<Decimal>,
    #[serde(default)]
    pub cash_balance: Option<Decimal>,
}

/// One entry of `GET /market-data/by-type`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MarketDataItem {
    pub symbol: String,
    #[serde(default)]
    pub bid: Option<Decimal>,
    #[serde(default)]
    pub ask: Option<Decimal>,
    #[serde(default)]
    pub last: Option<Decimal>,
}

// ============================================================================
// Orders
// ============================================================================

/// Body of `POST /accounts/{account}/orders`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct OrderRequest {
    pub time_in_force: &'static str,
    pub order_type: &'static str,
    /// Dollars with two decimals, e.g. "50.25".
    pub price: String,
    /// "Debit" for buys, "Credit" for sells.
    pub price_effect: &'static str,
    pub legs: Vec<OrderLegRequest>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct OrderLegRequest {
    pub instrument_type: &'static str,
    pub symbol: String,
    pub quantity: u64,
    pub action: &'static str,
}

/// Payload of a successful order placement.
#[derive(Debug, Deserialize)]
pub struct PlacedOrder {
    pub order: OrderData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OrderData {
    pub id: u64,
    pub status: String,
    #[serde(default)]
    pub legs: Vec<OrderLeg>,
    #[serde(default)]
    pub reject_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OrderLeg {
    pub quantity: Decimal,
    #[serde(default)]
    pub remaining_quantity: Option<Decimal>,
    #[serde(default)]
    pub fills: Vec<Fill>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Fill {
    pub quantity: Decimal,
    pub fill_price: Decimal,
}

impl OrderData {
    pub fn ordered_quantity(&self) -> u64 {
        self.legs
            .iter()
            .map(|l| l.quantity.to_shares().max(0) as u64)
            .sum()
    }

    /// Filled shares, from the fills list or, without fills, from the
    /// remaining quantity.
    pub fn filled_quantity(&self) -> u64 {
        self.legs
            .iter()
            .map(|leg| {
                if !leg.fills.is_empty() {
                    leg.fills
                        .iter()
                        .map(|f| f.quantity.to_shares().max(0) as u64)
                        .sum()
                } else {
                    let ordered = leg.quantity.to_shares();
                    let remaining = leg.remaining_quantity.map_or(ordered, Decimal::to_shares);
                    (ordered - remaining).max(0) as u64
                }
            })
            .sum()
    }

    /// Share-weighted average fill price in cents, zero without fills.
    pub fn avg_fill_price_cents(&self) -> i64 {
        let (shares, notional) = self
            .legs
            .iter()
            .flat_map(|l| l.fills.iter())
            .fold((0.0, 0.0), |(s, n), f| {
                (s + f.quantity.0, n + f.quantity.0 * f.fill_price.0)
            });
        if shares > 0.0 {
            Decimal(notional / shares).to_cents()
        } else {
            0
        }
    }
}
