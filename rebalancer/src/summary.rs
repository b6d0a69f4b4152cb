//! Run summary: the one artifact every run hands to the notifier.

use std::fmt;

use allocbook::{OrderIntent, OrderState, Price, RebalanceTarget, Sizing, Symbol};
use allocbook_broker::Holding;
use chrono::NaiveDate;
use serde::Serialize;

use crate::driver::Execution;

/// What the run decided to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Nothing was evaluated or ordered: wrong day, or an error before sizing.
    Skipped,
    /// Sized, and the holding already equals the target share count.
    AtTarget,
    /// An order was planned but not submitted.
    DryRun,
    /// The operator declined the confirmation prompt.
    Declined,
    /// An order was submitted.
    Executed,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Decision::Skipped => "skipped",
            Decision::AtTarget => "at target",
            Decision::DryRun => "dry run",
            Decision::Declined => "declined",
            Decision::Executed => "executed",
        };
        f.write_str(s)
    }
}

/// Holding valued at a price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionSnapshot {
    pub quantity: i64,
    pub price: Option<Price>,
    pub market_value: Option<Price>,
    pub avg_cost: Option<Price>,
    pub unrealized_pnl: Option<Price>,
}

impl PositionSnapshot {
    /// Value `holding` at `price`, falling back to the broker's close price.
    pub fn new(holding: &Holding, price: Option<Price>) -> Self {
        let price = price.or(holding.close_price_cents.map(Price));
        Self {
            quantity: holding.quantity,
            price,
            market_value: price.map(|p| holding.market_value(p)),
            avg_cost: holding.avg_cost_cents.map(Price),
            unrealized_pnl: price.and_then(|p| holding.unrealized_pnl(p)),
        }
    }
}

/// Everything that happened in one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub date: NaiveDate,
    pub environment: String,
    pub symbol: Symbol,
    pub target_value: Price,
    pub decision: Decision,
    pub reason: Option<String>,
    /// Mid rounded to the cent.
    pub mid_price: Option<Price>,
    pub target_shares: Option<i64>,
    pub delta: Option<i64>,
    pub position: Option<PositionSnapshot>,
    pub intent: Option<OrderIntent>,
    pub execution: Option<Execution>,
    /// Holding re-read after the order resolved.
    pub final_position: Option<PositionSnapshot>,
    pub error: Option<String>,
    /// An order may be working at the broker in an unknown state.
    pub status_unknown: bool,
}

impl RunSummary {
    pub fn new(date: NaiveDate, environment: impl Into<String>, target: &RebalanceTarget) -> Self {
        Self {
            date,
            environment: environment.into(),
            symbol: target.symbol,
            target_value: target.target_value,
            decision: Decision::Skipped,
            reason: None,
            mid_price: None,
            target_shares: None,
            delta: None,
            position: None,
            intent: None,
            execution: None,
            final_position: None,
            error: None,
            status_unknown: false,
        }
    }

    /// Mark skipped with `reason`.
    pub fn skip(&mut self, reason: impl Into<String>) {
        self.decision = Decision::Skipped;
        self.reason = Some(reason.into());
    }

    /// Mark skipped because of `error`.
    pub fn fail(&mut self, error: impl fmt::Display) {
        let msg = error.to_string();
        self.decision = Decision::Skipped;
        self.reason = Some(format!("aborted before ordering: {msg}"));
        self.error = Some(msg);
    }

    pub fn record_sizing(&mut self, sizing: &Sizing) {
        self.mid_price = Some(sizing.mid.to_price());
        self.target_shares = Some(sizing.target_shares);
        self.delta = Some(sizing.delta);
    }

    pub fn is_skipped(&self) -> bool {
        self.decision == Decision::Skipped
    }

    pub fn order_state(&self) -> Option<OrderState> {
        self.execution.as_ref().map(|e| e.state)
    }

    pub fn filled_quantity(&self) -> u64 {
        self.execution.as_ref().map_or(0, |e| e.filled_quantity)
    }

    /// The run did not do what it set out to: an error, an unknown order,
    /// or an order that ended without a complete fill.
    pub fn needs_attention(&self) -> bool {
        self.error.is_some()
            || self.status_unknown
            || matches!(
                self.order_state(),
                Some(
                    OrderState::Rejected
                        | OrderState::Cancelled
                        | OrderState::UnfilledTimeout
                        | OrderState::PartiallyFilled
                )
            )
    }

    /// One-line email subject.
    pub fn subject(&self) -> String {
        let headline = if self.status_unknown {
            "ORDER STATUS UNKNOWN".to_string()
        } else if self.error.is_some() {
            "ERROR".to_string()
        } else {
            match (self.decision, &self.intent, self.order_state()) {
                (Decision::Executed, Some(intent), Some(state)) => format!("{state} {intent}"),
                (Decision::DryRun, Some(intent), _) => format!("dry run {intent}"),
                (decision, _, _) => decision.to_string(),
            }
        };
        format!("{} rebalance {}: {headline}", self.symbol, self.date)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} rebalance {} ({})", self.symbol, self.date, self.environment)?;
        writeln!(f)?;
        writeln!(f, "Decision: {}", self.decision)?;
        if let Some(reason) = &self.reason {
            writeln!(f, "Reason: {reason}")?;
        }

        if let Some(pos) = &self.position {
            writeln!(f)?;
            writeln!(f, "Current Position:")?;
            write_position(f, pos)?;
            writeln!(f, "  Target Allocation: {}", self.target_value)?;
            if let Some(value) = pos.market_value {
                writeln!(
                    f,
                    "  Difference from Target: {}",
                    Price(value.0 - self.target_value.0)
                )?;
            }
        } else {
            writeln!(f, "Target Allocation: {}", self.target_value)?;
        }

        if let (Some(mid), Some(target_shares), Some(delta)) =
            (self.mid_price, self.target_shares, self.delta)
        {
            writeln!(f)?;
            writeln!(f, "Sizing:")?;
            writeln!(f, "  Mid: {mid}")?;
            writeln!(f, "  Target Shares: {target_shares}")?;
            writeln!(f, "  Delta: {delta:+}")?;
        }

        if let Some(intent) = &self.intent {
            writeln!(f)?;
            writeln!(f, "Trade:")?;
            writeln!(f, "  Order: {intent}")?;
            if let Some(exec) = &self.execution {
                writeln!(f, "  Result: {}", exec.state)?;
                if let Some(id) = exec.order_id {
                    writeln!(f, "  Order ID: {id}")?;
                }
                match exec.avg_fill_price {
                    Some(avg) => writeln!(f, "  Filled: {} @ {avg}", exec.filled_quantity)?,
                    None => writeln!(f, "  Filled: {}", exec.filled_quantity)?,
                }
                if let Some(reason) = &exec.reason {
                    writeln!(f, "  Broker Reason: {reason}")?;
                }
            }
        }

        if let Some(pos) = &self.final_position {
            writeln!(f)?;
            writeln!(f, "Position After:")?;
            write_position(f, pos)?;
        }

        if let Some(error) = &self.error {
            writeln!(f)?;
            writeln!(f, "ERROR:")?;
            writeln!(f, "  {error}")?;
        }
        if self.status_unknown {
            writeln!(f, "  Check the account: an order may still be working.")?;
        }

        writeln!(f)?;
        write!(f, "Environment: {}", self.environment)
    }
}

fn write_position(f: &mut fmt::Formatter<'_>, pos: &PositionSnapshot) -> fmt::Result {
    writeln!(f, "  Shares: {}", pos.quantity)?;
    if let Some(price) = pos.price {
        writeln!(f, "  Price: {price}")?;
    }
    if let Some(value) = pos.market_value {
        writeln!(f, "  Position Value: {value}")?;
    }
    if let Some(pnl) = pos.unrealized_pnl {
        writeln!(f, "  Unrealized P&L: {pnl}")?;
    }
    Ok(())
}
