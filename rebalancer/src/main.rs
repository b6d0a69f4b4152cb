//! CLI entry point for the allocbook rebalancer.
//!
//! Meant to run once per trading day from cron, shortly before the regular
//! session closes, e.g.
//! `30 15 * * 1-5 rebalancer --config /etc/allocbook.toml run --force`
//! with the host clock on New York time. Only the month's last session
//! trades; other days send a "skipped" summary. Nothing stops a second run
//! on the same day, so schedule exactly one.

use std::path::PathBuf;
use std::process;

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};

use allocbook::OrderState;
use allocbook_rebalancer::config::Config;
use allocbook_rebalancer::execution;
use allocbook_rebalancer::rebalance::RunOptions;
use allocbook_rebalancer::summary::RunSummary;

#[derive(Parser)]
#[command(name = "rebalancer")]
#[command(about = "Month-end fixed-dollar rebalancer for one equity on tastytrade")]
#[command(version)]
struct Cli {
    /// Path to config.toml
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Rebalance if today is the last trading session of the month
    Run {
        /// Evaluate as of this date (YYYY-MM-DD) instead of today
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Show the order without submitting it
        #[arg(long)]
        dry_run: bool,

        /// Skip confirmation prompt (for automation/cron)
        #[arg(long)]
        force: bool,

        /// Run even if today is not the month's last session
        #[arg(long)]
        ignore_calendar: bool,
    },

    /// Show the order a run would place, without submitting
    Plan {
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Show whether a date is a rebalance day, and the next one
    Calendar {
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Show the current holding and account
    Positions,

    /// Check broker connection
    Status,
}

/// 0 = done or skipped, 1 = error or rejected order, 2 = order state unknown.
fn exit_code(summary: &RunSummary) -> i32 {
    if summary.status_unknown {
        2
    } else if summary.error.is_some() || summary.order_state() == Some(OrderState::Rejected) {
        1
    } else {
        0
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {e}");
            process::exit(1);
        }
    };

    let today = || Local::now().date_naive();

    let result = match cli.command {
        Command::Run {
            date,
            dry_run,
            force,
            ignore_calendar,
        } => {
            let opts = RunOptions {
                dry_run,
                force,
                ignore_calendar,
            };
            execution::run(&config, date.unwrap_or_else(today), &opts, cli.json)
                .map(|summary| exit_code(&summary))
        }
        Command::Plan { date } => {
            execution::plan(&config, date.unwrap_or_else(today), cli.json).map(|()| 0)
        }
        Command::Calendar { date } => {
            execution::show_calendar(&config, date.unwrap_or_else(today)).map(|()| 0)
        }
        Command::Positions => execution::show_positions(&config).map(|()| 0),
        Command::Status => execution::check_status(&config).map(|()| 0),
    };

    match result {
        Ok(0) => {}
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
