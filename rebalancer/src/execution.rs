//! CLI commands: wire config, broker, calendar, and notifier into a cycle.

use allocbook::{
    NyseCalendar, OrderIntent, Price, TradingCalendar, is_rebalance_day, last_session_of_month,
    next_rebalance_day,
};
use allocbook_broker::Broker;
use chrono::{Datelike, NaiveDate};
use log::{error, warn};

use crate::broker::connect_broker;
use crate::config::Config;
use crate::driver::{ExecutionPolicy, SystemPacer};
use crate::error::Result;
use crate::notify;
use crate::rebalance::{Rebalancer, RunOptions, Settings, calendar_gate};
use crate::summary::RunSummary;

/// NYSE calendar plus the configured extra closures.
pub fn calendar(config: &Config) -> NyseCalendar {
    NyseCalendar::new().with_closures(config.calendar.extra_closures.iter().copied())
}

pub fn settings(config: &Config) -> Result<Settings> {
    Ok(Settings {
        target: config.rebalance_target()?,
        rule: config.limit_rule()?,
        policy: ExecutionPolicy::from_config(&config.execution),
        environment: config.broker.environment.to_string(),
    })
}

/// Execute a full cycle for `date` and print the summary.
///
/// Errors only when nothing can be notified (notifier setup). The calendar
/// is checked before the broker is contacted, so a skipped day never logs
/// in. A broker that can't be reached still produces a notified summary.
pub fn run(config: &Config, date: NaiveDate, opts: &RunOptions, json: bool) -> Result<RunSummary> {
    let settings = settings(config)?;
    let notifier = notify::from_config(&config.notify)?;
    let calendar = calendar(config);

    let mut summary = RunSummary::new(date, &settings.environment, &settings.target);
    if !calendar_gate(&calendar, date, opts).apply(&mut summary) {
        notify::deliver(&notifier, &summary);
        print_summary(&summary, json)?;
        return Ok(summary);
    }

    let broker = match connect_broker(config) {
        Ok(b) => b,
        Err(e) => {
            error!("Broker connection failed: {e}");
            summary.fail(e);
            notify::deliver(&notifier, &summary);
            print_summary(&summary, json)?;
            return Ok(summary);
        }
    };

    let rebalancer = Rebalancer::new(&*broker, &calendar, SystemPacer, settings);
    let summary = rebalancer.run(date, opts, confirm, &notifier);
    print_summary(&summary, json)?;
    Ok(summary)
}

/// Show what a run on `date` would order.
pub fn plan(config: &Config, date: NaiveDate, json: bool) -> Result<()> {
    let settings = settings(config)?;
    let calendar = calendar(config);
    let broker = connect_broker(config)?;

    let plan = Rebalancer::new(&*broker, &calendar, SystemPacer, settings).plan(date)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        println!("{plan}");
    }
    Ok(())
}

/// Show whether `date` is a rebalance day and when the next one is.
pub fn show_calendar(config: &Config, date: NaiveDate) -> Result<()> {
    let calendar = calendar(config);
    let last = last_session_of_month(date.year(), date.month(), &calendar)?;
    let next = next_rebalance_day(date, &calendar)?;

    println!("Date:                   {date} ({})", date.weekday());
    println!(
        "Trading session:        {}",
        if calendar.is_session(date)? { "yes" } else { "no" }
    );
    println!("Last session of month:  {last}");
    println!(
        "Rebalance day:          {}",
        if is_rebalance_day(date, &calendar)? { "yes" } else { "no" }
    );
    println!("Next rebalance day:     {next}");
    Ok(())
}

/// Show the current holding and account.
pub fn show_positions(config: &Config) -> Result<()> {
    let target = config.rebalance_target()?;
    let broker = connect_broker(config)?;
    let account = broker.account()?;
    let holding = broker.holding(&target.symbol)?;

    println!(
        "Account {} ({}): {} equity, {} cash, {} buying power\n",
        config.broker.account,
        config.broker.environment,
        Price(account.equity_cents),
        Price(account.cash_cents),
        Price(account.buying_power_cents),
    );

    if holding.quantity == 0 {
        println!("No {} position.", target.symbol);
        return Ok(());
    }
    print!("  {:8} {:>6}", holding.symbol, holding.quantity);
    if let Some(avg) = holding.avg_cost_cents {
        print!(" @ {} avg", Price(avg));
    }
    if let Some(close) = holding.close_price_cents {
        let value = holding.market_value(Price(close));
        print!("  = {value} at close {}", Price(close));
        if let Some(pnl) = holding.unrealized_pnl(Price(close)) {
            print!(" ({pnl} unrealized)");
        }
    }
    println!();
    println!("  Target allocation: {}", target.target_value);
    Ok(())
}

/// Check broker connectivity.
pub fn check_status(config: &Config) -> Result<()> {
    print!(
        "Connecting to tastytrade {} ({})... ",
        config.broker.environment,
        config.broker.environment.base_url()
    );
    let broker = connect_broker(config)?;
    println!("OK");

    let account = broker.account()?;
    println!(
        "Account {}: {} equity",
        config.broker.account,
        Price(account.equity_cents)
    );
    Ok(())
}

fn confirm(intent: &OrderIntent) -> bool {
    let prompt = format!("Submit {intent} ({} notional)?", intent.notional());
    match dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
    {
        Ok(answer) => answer,
        Err(e) => {
            warn!("Confirmation prompt failed ({e}); treating as declined");
            false
        }
    }
}

fn print_summary(summary: &RunSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
    } else {
        println!("{}\n\n{summary}", summary.subject());
    }
    Ok(())
}
