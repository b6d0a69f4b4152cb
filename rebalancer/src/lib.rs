//! allocbook-rebalancer: month-end fixed-dollar rebalancer for one equity.
//!
//! On the last trading session of each month, reads the tastytrade holding
//! and quote, sizes the whole-share order that brings the position back to
//! a fixed dollar allocation, works it as a day limit order offset from the
//! mid, and emails a summary of the run.

pub mod broker;
pub mod config;
pub mod driver;
pub mod error;
pub mod execution;
pub mod notify;
pub mod rebalance;
pub mod summary;
