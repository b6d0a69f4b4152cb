//! Broker trait and implementations for allocbook.
//!
//! Provides a generic `Broker` trait that abstracts over brokerages, so the
//! rebalancer runs the same against a sandbox, production, or a test double.
//! Implementations:
//!
//! - **tastytrade** (feature `tastytrade`): tastytrade REST API, sandbox or production
//! - **mock**: scripted in-process broker for tests

pub mod error;
pub mod mock;
pub mod types;

#[cfg(feature = "tastytrade")]
pub mod tastytrade;

pub use error::BrokerError;
pub use types::*;

use allocbook::{Quote, Symbol};

/// A broker connection that can read holdings and quotes and manage orders.
///
/// The broker account is the system of record: callers re-read holdings
/// rather than caching them.
pub trait Broker {
    /// Connect (and authenticate) to the broker.
    fn connect(&mut self) -> Result<(), BrokerError>;

    /// Disconnect gracefully.
    fn disconnect(&mut self) -> Result<(), BrokerError>;

    /// Current holding in `symbol`. A flat account returns a zero holding.
    fn holding(&self, symbol: &Symbol) -> Result<Holding, BrokerError>;

    /// Get account summary (equity, buying power, cash).
    fn account(&self) -> Result<Account, BrokerError>;

    /// Get current quote for a symbol.
    fn quote(&self, symbol: &Symbol) -> Result<Quote, BrokerError>;

    /// Submit an order. Returns order ID, or [`BrokerError::Rejected`] if the
    /// broker refuses it.
    fn submit_order(&self, order: &BrokerOrder) -> Result<OrderId, BrokerError>;

    /// Get status of a submitted order.
    fn order_status(&self, id: OrderId) -> Result<BrokerOrderStatus, BrokerError>;

    /// Cancel a working order.
    fn cancel_order(&self, id: OrderId) -> Result<(), BrokerError>;
}

impl<B: Broker + ?Sized> Broker for Box<B> {
    fn connect(&mut self) -> Result<(), BrokerError> {
        (**self).connect()
    }

    fn disconnect(&mut self) -> Result<(), BrokerError> {
        (**self).disconnect()
    }

    fn holding(&self, symbol: &Symbol) -> Result<Holding, BrokerError> {
        (**self).holding(symbol)
    }

    fn account(&self) -> Result<Account, BrokerError> {
        (**self).account()
    }

    fn quote(&self, symbol: &Symbol) -> Result<Quote, BrokerError> {
        (**self).quote(symbol)
    }

    fn submit_order(&self, order: &BrokerOrder) -> Result<OrderId, BrokerError> {
        (**self).submit_order(order)
    }

    fn order_status(&self, id: OrderId) -> Result<BrokerOrderStatus, BrokerError> {
        (**self).order_status(id)
    }

    fn cancel_order(&self, id: OrderId) -> Result<(), BrokerError> {
        (**self).cancel_order(id)
    }
}
