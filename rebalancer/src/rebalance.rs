//! One decision cycle: calendar gate → sizing → limit → execution → notify.

use std::fmt;

use allocbook::{
    LimitRule, OrderIntent, Price, Quote, RebalanceTarget, Symbol, TradingCalendar,
    compute_delta, is_rebalance_day, next_rebalance_day,
};
use allocbook_broker::{Broker, Holding};
use chrono::NaiveDate;
use log::{info, warn};
use serde::Serialize;

use crate::driver::{self, ExecutionPolicy, Pacer, retry_transient};
use crate::error::{Error, Result};
use crate::notify::{self, Notifier};
use crate::summary::{Decision, PositionSnapshot, RunSummary};

/// Fixed inputs of every cycle.
#[derive(Debug, Clone)]
pub struct Settings {
    pub target: RebalanceTarget,
    pub rule: LimitRule,
    pub policy: ExecutionPolicy,
    /// Label for summaries, e.g. "sandbox".
    pub environment: String,
}

/// Per-invocation switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Plan the order but don't submit it.
    pub dry_run: bool,
    /// Submit without asking for confirmation.
    pub force: bool,
    /// Run even when today isn't the month's last session.
    pub ignore_calendar: bool,
}

/// Result of checking a run date against the trading calendar.
#[derive(Debug)]
pub enum Gate {
    /// The run trades.
    Open,
    /// Not the month's last session.
    Closed(String),
    /// The calendar can't answer for the date.
    Unavailable(allocbook::Error),
}

impl Gate {
    /// Record a closed or unavailable gate in `summary`. Returns whether
    /// the run continues.
    pub fn apply(self, summary: &mut RunSummary) -> bool {
        match self {
            Gate::Open => true,
            Gate::Closed(reason) => {
                summary.skip(reason);
                false
            }
            Gate::Unavailable(e) => {
                summary.fail(e);
                false
            }
        }
    }
}

/// Check `date` against `calendar`. Needs no broker.
pub fn calendar_gate<C>(calendar: &C, date: NaiveDate, opts: &RunOptions) -> Gate
where
    C: TradingCalendar + ?Sized,
{
    if opts.ignore_calendar {
        warn!("Calendar check bypassed for {date}");
        return Gate::Open;
    }
    match is_rebalance_day(date, calendar) {
        Ok(true) => Gate::Open,
        Ok(false) => {
            let reason = match next_rebalance_day(date, calendar) {
                Ok(next) => format!(
                    "{date} is not the last trading session of the month (next rebalance {next})"
                ),
                Err(_) => format!("{date} is not the last trading session of the month"),
            };
            Gate::Closed(reason)
        }
        Err(e) => Gate::Unavailable(e),
    }
}

/// What a cycle would do on `date`, without submitting anything.
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub date: NaiveDate,
    pub rebalance_day: bool,
    pub symbol: Symbol,
    pub target_value: Price,
    pub current_quantity: i64,
    pub mid_price: Price,
    pub target_shares: i64,
    pub delta: i64,
    pub intent: Option<OrderIntent>,
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} on {} ({})",
            self.symbol,
            self.date,
            if self.rebalance_day {
                "rebalance day"
            } else {
                "not a rebalance day"
            }
        )?;
        writeln!(f, "  Target:        {}", self.target_value)?;
        writeln!(f, "  Mid:           {}", self.mid_price)?;
        writeln!(f, "  Held:          {} shares", self.current_quantity)?;
        writeln!(f, "  Target shares: {}", self.target_shares)?;
        writeln!(f, "  Delta:         {:+}", self.delta)?;
        match &self.intent {
            Some(intent) => write!(f, "  Order:         {intent}"),
            None => write!(f, "  Order:         none (at target)"),
        }
    }
}

/// Runs decision cycles against a broker and a calendar.
pub struct Rebalancer<'a, B: ?Sized, C: ?Sized, P> {
    broker: &'a B,
    calendar: &'a C,
    pacer: P,
    settings: Settings,
}

impl<'a, B, C, P> Rebalancer<'a, B, C, P>
where
    B: Broker + ?Sized,
    C: TradingCalendar + ?Sized,
    P: Pacer,
{
    pub fn new(broker: &'a B, calendar: &'a C, pacer: P, settings: Settings) -> Self {
        Self {
            broker,
            calendar,
            pacer,
            settings,
        }
    }

    /// Size the order for `date` without submitting it.
    pub fn plan(&self, date: NaiveDate) -> Result<Plan> {
        let rebalance_day = is_rebalance_day(date, self.calendar)?;
        let target = &self.settings.target;
        let holding = self.read_holding()?;
        let quote = self.read_quote()?;
        let sizing = compute_delta(target.target_value, &quote, holding.quantity)?;
        let intent = OrderIntent::from_sizing(&sizing, &quote, &self.settings.rule)?;

        Ok(Plan {
            date,
            rebalance_day,
            symbol: target.symbol,
            target_value: target.target_value,
            current_quantity: holding.quantity,
            mid_price: sizing.mid.to_price(),
            target_shares: sizing.target_shares,
            delta: sizing.delta,
            intent,
        })
    }

    /// Run one cycle for `date` and notify exactly once.
    ///
    /// `confirm` is asked before submission unless `opts.force` is set.
    /// Never fails: every outcome, errors included, lands in the summary.
    pub fn run<F, N>(
        &self,
        date: NaiveDate,
        opts: &RunOptions,
        confirm: F,
        notifier: &N,
    ) -> RunSummary
    where
        F: FnOnce(&OrderIntent) -> bool,
        N: Notifier + ?Sized,
    {
        let settings = &self.settings;
        let mut summary = RunSummary::new(date, &settings.environment, &settings.target);
        self.cycle(date, opts, confirm, &mut summary);
        notify::deliver(notifier, &summary);
        summary
    }

    fn cycle<F>(&self, date: NaiveDate, opts: &RunOptions, confirm: F, summary: &mut RunSummary)
    where
        F: FnOnce(&OrderIntent) -> bool,
    {
        if !calendar_gate(self.calendar, date, opts).apply(summary) {
            return;
        }
        info!("Rebalancing {} for {date}", self.settings.target.symbol);

        let holding = match self.read_holding() {
            Ok(h) => h,
            Err(e) => return summary.fail(e),
        };
        let quote = match self.read_quote() {
            Ok(q) => q,
            Err(e) => {
                summary.position = Some(PositionSnapshot::new(&holding, None));
                return summary.fail(e);
            }
        };

        let target = &self.settings.target;
        let sizing = match compute_delta(target.target_value, &quote, holding.quantity) {
            Ok(s) => s,
            Err(e) => {
                summary.position = Some(PositionSnapshot::new(&holding, None));
                return summary.fail(e);
            }
        };
        summary.record_sizing(&sizing);
        summary.position = Some(PositionSnapshot::new(&holding, Some(sizing.mid.to_price())));
        info!(
            "{}: mid {}, holding {}, target {} shares, delta {:+}",
            target.symbol, sizing.mid, holding.quantity, sizing.target_shares, sizing.delta
        );

        let intent = match OrderIntent::from_sizing(&sizing, &quote, &self.settings.rule) {
            Ok(Some(intent)) => intent,
            Ok(None) => {
                summary.decision = Decision::AtTarget;
                summary.reason = Some(format!(
                    "holding {} shares already equals the target",
                    holding.quantity
                ));
                return;
            }
            Err(e) => return summary.fail(e),
        };
        summary.intent = Some(intent);

        if opts.dry_run {
            info!("Dry run: {intent} not submitted");
            summary.decision = Decision::DryRun;
            summary.reason = Some("dry run, order not submitted".into());
            return;
        }
        if !opts.force && !confirm(&intent) {
            info!("Operator declined {intent}");
            summary.decision = Decision::Declined;
            summary.reason = Some("declined at the confirmation prompt".into());
            return;
        }

        summary.decision = Decision::Executed;
        match driver::execute(
            self.broker,
            &intent,
            holding.quantity,
            &self.settings.policy,
            &self.pacer,
        ) {
            Ok(execution) => summary.execution = Some(execution),
            Err(e) => {
                summary.status_unknown = matches!(e, Error::OrderStatusUnknown { .. });
                summary.error = Some(e.to_string());
            }
        }

        match self.read_holding() {
            Ok(after) => {
                summary.final_position = Some(PositionSnapshot::new(&after, summary.mid_price));
            }
            Err(e) => warn!("Could not re-read the holding after execution: {e}"),
        }
    }

    fn read_holding(&self) -> Result<Holding> {
        let symbol = self.settings.target.symbol;
        retry_transient(&self.pacer, &self.settings.policy, "holding read", || {
            self.broker.holding(&symbol)
        })
        .map_err(Error::from)
    }

    fn read_quote(&self) -> Result<Quote> {
        let symbol = self.settings.target.symbol;
        retry_transient(&self.pacer, &self.settings.policy, "quote read", || {
            self.broker.quote(&symbol)
        })
        .map_err(Error::from)
    }
}
