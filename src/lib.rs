// Allow our dollar.cents digit grouping convention (e.g., 100_00 = $100.00)
#![allow(clippy::inconsistent_digit_grouping)]

//! # allocbook
//!
//! Decision core for a month-end fixed-allocation rebalancer: keep one
//! brokerage position worth a fixed dollar amount, adjusted once a month on
//! the last trading session.
//!
//! ## Features
//!
//! - **Calendar gate**: last trading session of the month, from any [`TradingCalendar`]
//! - **NYSE calendar**: rule-based holidays with weekend observance
//! - **Position sizing**: whole shares, truncated toward the dollar target
//! - **Limit pricing**: fixed basis-point offset from mid, rounded to the price increment
//! - **Fixed-point prices**: integer cents, no float rounding in decisions
//!
//! ## Quick Start
//!
//! ```
//! use allocbook::{compute_delta, LimitRule, OrderIntent, Price, Quote, Side, Symbol};
//! use chrono::Utc;
//!
//! let tqqq = Symbol::new("TQQQ");
//! let quote = Quote::two_sided(tqqq, Price(49_99), Price(50_01), Utc::now());
//!
//! // $2000 target at a $50.00 mid is 40 shares; 38 are held
//! let sizing = compute_delta(Price(2000_00), &quote, 38).unwrap();
//! assert_eq!(sizing.delta, 2);
//!
//! let intent = OrderIntent::from_sizing(&sizing, &quote, &LimitRule::default())
//!     .unwrap()
//!     .expect("not balanced");
//! assert_eq!(intent.side, Side::Buy);
//! assert_eq!(intent.limit_price, Price(50_25));
//! ```
//!
//! ## Calendar Gate
//!
//! ```
//! use allocbook::{is_rebalance_day, NyseCalendar};
//! use chrono::NaiveDate;
//!
//! let nyse = NyseCalendar::new();
//!
//! // March 2024 ended on Good Friday followed by a weekend
//! let thursday = NaiveDate::from_ymd_opt(2024, 3, 28).unwrap();
//! assert!(is_rebalance_day(thursday, &nyse).unwrap());
//! ```
//!
//! ## Rounding Policy
//!
//! | Value | Rule |
//! |-------|------|
//! | Target shares | `floor(target_value / mid)` |
//! | Limit price | round half up to the increment, never past mid on the wrong side |

pub mod calendar;
mod error;
mod order;
pub mod pricing;
mod quote;
mod side;
pub mod sizing;
mod types;

// Re-export public API
pub use calendar::{
    NyseCalendar, TradingCalendar, is_rebalance_day, last_session_of_month, next_rebalance_day,
};
pub use error::{Error, Result};
pub use order::{OrderIntent, OrderState};
pub use pricing::{LimitRule, derive_limit};
pub use quote::{Mid, Quote};
pub use side::Side;
pub use sizing::{RebalanceTarget, Sizing, compute_delta};
pub use types::{Price, Symbol};
