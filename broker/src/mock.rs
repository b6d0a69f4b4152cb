//! Mock broker for testing: implements the `Broker` trait with scripted behavior.
//!
//! Use this in tests to simulate broker responses without network calls.
//! Fills update the mock's holdings, so a post-trade holding read reflects
//! them the way a real account would.
//!
//! ```
//! use allocbook::Symbol;
//! use allocbook_broker::Broker;
//! use allocbook_broker::mock::{FillMode, MockBroker};
//!
//! let mut broker = MockBroker::builder()
//!     .fill_mode(FillMode::ImmediateFull)
//!     .with_position(Symbol::new("TQQQ"), 38, 45_00)
//!     .with_quote(Symbol::new("TQQQ"), 49_99, 50_01)
//!     .build();
//! broker.connect().unwrap();
//! assert_eq!(broker.holding(&Symbol::new("TQQQ")).unwrap().quantity, 38);
//! ```

use std::sync::{Mutex, MutexGuard};

use allocbook::{Price, Quote, Side, Symbol};
use chrono::Utc;

use crate::Broker;
use crate::error::BrokerError;
use crate::types::*;

/// How the mock broker handles submitted orders.
#[derive(Clone, Debug)]
pub enum FillMode {
    /// Orders fill completely at the limit price on the first status poll.
    ImmediateFull,
    /// Orders fill the given fraction (e.g., 0.5 = 50%) and keep working.
    ImmediatePartial(f64),
    /// All orders are refused at submission.
    Reject,
    /// Orders are accepted, then reported rejected on the first status poll.
    RejectAfterSubmit,
    /// Orders work forever without filling.
    Resting,
    /// Orders work for the given number of status polls, then fill completely.
    FillAfter(u32),
    /// Submission times out: the order's fate is unknown to the caller.
    LostOnSubmit,
    /// Orders work until the broker cancels them on the given status poll.
    CancelledExternally(u32),
    /// Orders rest until a cancel is requested, then fill completely
    /// before the cancel takes effect.
    FillOnCancel,
}

/// A recorded order submission for assertion in tests.
#[derive(Clone, Debug)]
pub struct RecordedOrder {
    pub symbol: Symbol,
    pub side: Side,
    pub quantity: u64,
    pub limit_price: Price,
    pub effect: PositionEffect,
}

/// Builder for `MockBroker`.
pub struct MockBrokerBuilder {
    fill_mode: FillMode,
    holdings: Vec<Holding>,
    quotes: Vec<Quote>,
    equity_cents: i64,
    cash_cents: i64,
    quote_failures: usize,
    holding_failures: usize,
    status_failures: usize,
    connect_failures: usize,
    fail_cancels: bool,
    fail_after_cancel: bool,
}

impl MockBrokerBuilder {
    pub fn fill_mode(mut self, mode: FillMode) -> Self {
        self.fill_mode = mode;
        self
    }

    pub fn with_position(mut self, symbol: Symbol, quantity: i64, avg_cost_cents: i64) -> Self {
        self.holdings.push(Holding {
            symbol,
            quantity,
            avg_cost_cents: Some(avg_cost_cents),
            close_price_cents: None,
        });
        self
    }

    /// Two-sided quote in cents.
    pub fn with_quote(self, symbol: Symbol, bid: i64, ask: i64) -> Self {
        self.with_quote_raw(Quote::two_sided(symbol, Price(bid), Price(ask), Utc::now()))
    }

    /// Arbitrary quote, e.g. one missing both sides.
    pub fn with_quote_raw(mut self, quote: Quote) -> Self {
        self.quotes.retain(|q| q.symbol != quote.symbol);
        self.quotes.push(quote);
        self
    }

    pub fn with_account(mut self, equity_cents: i64, cash_cents: i64) -> Self {
        self.equity_cents = equity_cents;
        self.cash_cents = cash_cents;
        self
    }

    /// The next `n` quote requests time out.
    pub fn fail_quotes(mut self, n: usize) -> Self {
        self.quote_failures = n;
        self
    }

    /// The next `n` holding requests time out.
    pub fn fail_holdings(mut self, n: usize) -> Self {
        self.holding_failures = n;
        self
    }

    /// The next `n` order status requests fail with a connection error.
    pub fn fail_status_polls(mut self, n: usize) -> Self {
        self.status_failures = n;
        self
    }

    /// Cancel requests are recorded but fail with a connection error.
    pub fn fail_cancels(mut self) -> Self {
        self.fail_cancels = true;
        self
    }

    /// Status requests for an order fail once a cancel was requested for it.
    pub fn fail_status_after_cancel(mut self) -> Self {
        self.fail_after_cancel = true;
        self
    }

    /// The next `n` connection attempts time out.
    pub fn fail_connects(mut self, n: usize) -> Self {
        self.connect_failures = n;
        self
    }

    pub fn build(self) -> MockBroker {
        MockBroker {
            connected: false,
            fill_mode: self.fill_mode,
            holdings: self.holdings,
            quotes: self.quotes,
            equity_cents: self.equity_cents,
            cash_cents: self.cash_cents,
            fail_cancels: self.fail_cancels,
            fail_after_cancel: self.fail_after_cancel,
            connect_failures: self.connect_failures,
            connect_attempts: 0,
            state: Mutex::new(MockState {
                next_order_id: 1,
                orders: Vec::new(),
                cancel_requests: Vec::new(),
                status_polls: 0,
                quote_failures: self.quote_failures,
                holding_failures: self.holding_failures,
                status_failures: self.status_failures,
            }),
        }
    }
}

#[derive(Debug)]
struct MockOrder {
    id: OrderId,
    order: BrokerOrder,
    filled: u64,
    polls: u32,
    cancelled: bool,
}

#[derive(Debug)]
struct MockState {
    next_order_id: u64,
    orders: Vec<MockOrder>,
    cancel_requests: Vec<OrderId>,
    status_polls: usize,
    quote_failures: usize,
    holding_failures: usize,
    status_failures: usize,
}

/// A mock broker that records submitted orders and returns scripted responses.
pub struct MockBroker {
    connected: bool,
    fill_mode: FillMode,
    holdings: Vec<Holding>,
    quotes: Vec<Quote>,
    equity_cents: i64,
    cash_cents: i64,
    fail_cancels: bool,
    fail_after_cancel: bool,
    connect_failures: usize,
    connect_attempts: usize,
    state: Mutex<MockState>,
}

impl MockBroker {
    pub fn builder() -> MockBrokerBuilder {
        MockBrokerBuilder {
            fill_mode: FillMode::ImmediateFull,
            holdings: Vec::new(),
            quotes: Vec::new(),
            equity_cents: 100_000_00,
            cash_cents: 100_000_00,
            quote_failures: 0,
            holding_failures: 0,
            status_failures: 0,
            connect_failures: 0,
            fail_cancels: false,
            fail_after_cancel: false,
        }
    }

    /// Get all orders that were submitted (for assertion in tests).
    pub fn submitted_orders(&self) -> Vec<RecordedOrder> {
        self.state()
            .orders
            .iter()
            .map(|o| RecordedOrder {
                symbol: o.order.symbol,
                side: o.order.side,
                quantity: o.order.quantity,
                limit_price: o.order.limit_price,
                effect: o.order.effect,
            })
            .collect()
    }

    /// Order IDs a cancel was requested for, in request order.
    pub fn cancel_requests(&self) -> Vec<OrderId> {
        self.state().cancel_requests.clone()
    }

    /// Number of order status requests, including failed ones.
    pub fn status_polls(&self) -> usize {
        self.state().status_polls
    }

    /// Number of `connect` calls, including failed ones.
    pub fn connect_attempts(&self) -> usize {
        self.connect_attempts
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        // A test that panicked mid-call poisons the lock; the data is still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn require_connected(&self) -> Result<(), BrokerError> {
        if self.connected {
            Ok(())
        } else {
            Err(BrokerError::NotConnected)
        }
    }

    /// Advance a working order by one poll according to the fill mode.
    fn advance(&self, order: &mut MockOrder) -> BrokerOrderState {
        order.polls += 1;
        let qty = order.order.quantity;

        if order.cancelled {
            if matches!(self.fill_mode, FillMode::FillOnCancel) {
                // the fill landed before the cancel
                order.filled = qty;
                return BrokerOrderState::Filled;
            }
            return BrokerOrderState::Cancelled;
        }

        match &self.fill_mode {
            FillMode::ImmediateFull => order.filled = qty,
            FillMode::ImmediatePartial(frac) => {
                order.filled = ((qty as f64 * frac).floor() as u64).min(qty);
            }
            FillMode::FillAfter(n) if order.polls > *n => order.filled = qty,
            FillMode::RejectAfterSubmit | FillMode::Reject => {
                return BrokerOrderState::Rejected;
            }
            FillMode::CancelledExternally(n) if order.polls >= *n => {
                order.cancelled = true;
                return BrokerOrderState::Cancelled;
            }
            FillMode::FillAfter(_)
            | FillMode::Resting
            | FillMode::LostOnSubmit
            | FillMode::CancelledExternally(_)
            | FillMode::FillOnCancel => {}
        }

        if order.filled == qty {
            BrokerOrderState::Filled
        } else if order.filled > 0 {
            BrokerOrderState::PartiallyFilled
        } else {
            BrokerOrderState::Working
        }
    }
}

impl Broker for MockBroker {
    fn connect(&mut self) -> Result<(), BrokerError> {
        self.connect_attempts += 1;
        if self.connect_failures > 0 {
            self.connect_failures -= 1;
            return Err(BrokerError::Timeout("mock: login timed out".into()));
        }
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), BrokerError> {
        self.connected = false;
        Ok(())
    }

    fn holding(&self, symbol: &Symbol) -> Result<Holding, BrokerError> {
        self.require_connected()?;
        let mut state = self.state();
        if state.holding_failures > 0 {
            state.holding_failures -= 1;
            return Err(BrokerError::Timeout("mock: positions timed out".into()));
        }

        let mut holding = self
            .holdings
            .iter()
            .find(|h| h.symbol == *symbol)
            .cloned()
            .unwrap_or_else(|| Holding::flat(*symbol));

        for o in state.orders.iter().filter(|o| o.order.symbol == *symbol) {
            holding.quantity += o.order.side.sign() * o.filled as i64;
        }
        Ok(holding)
    }

    fn account(&self) -> Result<Account, BrokerError> {
        self.require_connected()?;
        Ok(Account {
            equity_cents: self.equity_cents,
            buying_power_cents: self.cash_cents,
            cash_cents: self.cash_cents,
        })
    }

    fn quote(&self, symbol: &Symbol) -> Result<Quote, BrokerError> {
        self.require_connected()?;
        let mut state = self.state();
        if state.quote_failures > 0 {
            state.quote_failures -= 1;
            return Err(BrokerError::Timeout("mock: quote timed out".into()));
        }
        self.quotes
            .iter()
            .find(|q| q.symbol == *symbol)
            .cloned()
            .ok_or_else(|| BrokerError::InvalidSymbol(symbol.as_str().to_string()))
    }

    fn submit_order(&self, order: &BrokerOrder) -> Result<OrderId, BrokerError> {
        self.require_connected()?;
        let mut state = self.state();

        let id = OrderId(state.next_order_id);
        state.next_order_id += 1;

        if matches!(self.fill_mode, FillMode::Reject) {
            // refused orders are still recorded so tests can count attempts
            state.orders.push(MockOrder {
                id,
                order: order.clone(),
                filled: 0,
                polls: 0,
                cancelled: true,
            });
            return Err(BrokerError::Rejected("mock: insufficient buying power".into()));
        }

        state.orders.push(MockOrder {
            id,
            order: order.clone(),
            filled: 0,
            polls: 0,
            cancelled: false,
        });

        if matches!(self.fill_mode, FillMode::LostOnSubmit) {
            return Err(BrokerError::Timeout("mock: order submission timed out".into()));
        }
        Ok(id)
    }

    fn order_status(&self, id: OrderId) -> Result<BrokerOrderStatus, BrokerError> {
        self.require_connected()?;
        let mut state = self.state();
        state.status_polls += 1;
        if state.status_failures > 0 {
            state.status_failures -= 1;
            return Err(BrokerError::Connection("mock: connection reset".into()));
        }
        if self.fail_after_cancel && state.cancel_requests.contains(&id) {
            return Err(BrokerError::Connection("mock: status unavailable".into()));
        }

        let Some(pos) = state.orders.iter().position(|o| o.id == id) else {
            return Err(BrokerError::Order(format!("mock: unknown order {id}")));
        };
        let mut order = state.orders.swap_remove(pos);
        let status = self.advance(&mut order);
        let result = BrokerOrderStatus {
            id,
            status,
            filled_quantity: order.filled,
            remaining_quantity: order.order.quantity - order.filled,
            avg_fill_price_cents: if order.filled > 0 {
                order.order.limit_price.0
            } else {
                0
            },
        };
        state.orders.push(order);
        Ok(result)
    }

    fn cancel_order(&self, id: OrderId) -> Result<(), BrokerError> {
        self.require_connected()?;
        let mut state = self.state();
        state.cancel_requests.push(id);
        if self.fail_cancels {
            return Err(BrokerError::Connection("mock: cancel request failed".into()));
        }
        if let Some(order) = state.orders.iter_mut().find(|o| o.id == id) {
            if order.filled < order.order.quantity {
                order.cancelled = true;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tqqq() -> Symbol {
        Symbol::new("TQQQ")
    }

    fn buy(quantity: u64) -> BrokerOrder {
        BrokerOrder {
            symbol: tqqq(),
            side: Side::Buy,
            quantity,
            limit_price: Price(50_25),
            effect: PositionEffect::Open,
        }
    }

    fn connected(builder: MockBrokerBuilder) -> MockBroker {
        let mut broker = builder.build();
        broker.connect().unwrap();
        broker
    }

    #[test]
    fn builder_basic() {
        let broker = connected(
            MockBroker::builder()
                .with_position(tqqq(), 38, 45_00)
                .with_account(10_000_00, 5_000_00)
                .with_quote(tqqq(), 49_99, 50_01),
        );

        let holding = broker.holding(&tqqq()).unwrap();
        assert_eq!(holding.quantity, 38);
        assert_eq!(holding.avg_cost_cents, Some(45_00));

        assert_eq!(broker.account().unwrap().equity_cents, 10_000_00);

        let quote = broker.quote(&tqqq()).unwrap();
        assert_eq!(quote.bid, Some(Price(49_99)));
        assert_eq!(quote.ask, Some(Price(50_01)));
    }

    #[test]
    fn unknown_symbol_is_flat() {
        let broker = connected(MockBroker::builder());
        assert_eq!(broker.holding(&tqqq()).unwrap(), Holding::flat(tqqq()));
        assert!(broker.quote(&tqqq()).is_err());
    }

    #[test]
    fn not_connected_errors() {
        let broker = MockBroker::builder().build();
        assert!(matches!(broker.holding(&tqqq()), Err(BrokerError::NotConnected)));
        assert!(broker.account().is_err());
    }

    #[test]
    fn fills_update_holding() {
        let broker = connected(MockBroker::builder().with_position(tqqq(), 38, 45_00));
        let id = broker.submit_order(&buy(2)).unwrap();
        assert_eq!(id, OrderId(1));

        let status = broker.order_status(id).unwrap();
        assert_eq!(status.status, BrokerOrderState::Filled);
        assert_eq!(status.avg_fill_price_cents, 50_25);
        assert_eq!(broker.holding(&tqqq()).unwrap().quantity, 40);
        assert_eq!(broker.submitted_orders().len(), 1);
    }

    #[test]
    fn reject_mode() {
        let broker = connected(MockBroker::builder().fill_mode(FillMode::Reject));
        assert!(matches!(
            broker.submit_order(&buy(2)),
            Err(BrokerError::Rejected(_))
        ));
        assert_eq!(broker.submitted_orders().len(), 1);
    }

    #[test]
    fn partial_fill_keeps_working_until_cancelled() {
        let broker = connected(MockBroker::builder().fill_mode(FillMode::ImmediatePartial(0.5)));
        let id = broker.submit_order(&buy(4)).unwrap();

        let status = broker.order_status(id).unwrap();
        assert_eq!(status.status, BrokerOrderState::PartiallyFilled);
        assert_eq!(status.filled_quantity, 2);

        broker.cancel_order(id).unwrap();
        let status = broker.order_status(id).unwrap();
        assert_eq!(status.status, BrokerOrderState::Cancelled);
        assert_eq!(status.filled_quantity, 2);
        assert_eq!(broker.cancel_requests(), vec![id]);
    }

    #[test]
    fn fill_after_polls() {
        let broker = connected(MockBroker::builder().fill_mode(FillMode::FillAfter(2)));
        let id = broker.submit_order(&buy(1)).unwrap();
        assert_eq!(broker.order_status(id).unwrap().status, BrokerOrderState::Working);
        assert_eq!(broker.order_status(id).unwrap().status, BrokerOrderState::Working);
        assert_eq!(broker.order_status(id).unwrap().status, BrokerOrderState::Filled);
    }

    #[test]
    fn scripted_failures_run_out() {
        let broker = connected(
            MockBroker::builder()
                .with_quote(tqqq(), 49_99, 50_01)
                .fail_quotes(1)
                .fail_status_polls(1),
        );
        assert!(broker.quote(&tqqq()).unwrap_err().is_transient());
        assert!(broker.quote(&tqqq()).is_ok());

        let id = broker.submit_order(&buy(1)).unwrap();
        assert!(broker.order_status(id).is_err());
        assert!(broker.order_status(id).is_ok());
        assert_eq!(broker.status_polls(), 2);
    }

    #[test]
    fn external_cancel_on_given_poll() {
        let broker = connected(
            MockBroker::builder().fill_mode(FillMode::CancelledExternally(2)),
        );
        let id = broker.submit_order(&buy(2)).unwrap();
        assert_eq!(broker.order_status(id).unwrap().status, BrokerOrderState::Working);
        let status = broker.order_status(id).unwrap();
        assert_eq!(status.status, BrokerOrderState::Cancelled);
        assert_eq!(status.filled_quantity, 0);
        assert!(broker.cancel_requests().is_empty());
    }

    #[test]
    fn fill_beats_cancel() {
        let broker = connected(
            MockBroker::builder()
                .fill_mode(FillMode::FillOnCancel)
                .with_position(tqqq(), 38, 45_00),
        );
        let id = broker.submit_order(&buy(2)).unwrap();
        assert_eq!(broker.order_status(id).unwrap().status, BrokerOrderState::Working);

        broker.cancel_order(id).unwrap();
        let status = broker.order_status(id).unwrap();
        assert_eq!(status.status, BrokerOrderState::Filled);
        assert_eq!(status.filled_quantity, 2);
        assert_eq!(broker.holding(&tqqq()).unwrap().quantity, 40);
    }

    #[test]
    fn status_fails_after_cancel() {
        let broker = connected(
            MockBroker::builder()
                .fill_mode(FillMode::Resting)
                .fail_status_after_cancel(),
        );
        let id = broker.submit_order(&buy(1)).unwrap();
        assert!(broker.order_status(id).is_ok());
        broker.cancel_order(id).unwrap();
        assert!(broker.order_status(id).unwrap_err().is_transient());
    }

    #[test]
    fn scripted_connect_failures() {
        let mut broker = MockBroker::builder().fail_connects(1).build();
        assert!(broker.connect().unwrap_err().is_transient());
        assert!(broker.account().is_err());
        broker.connect().unwrap();
        assert!(broker.account().is_ok());
        assert_eq!(broker.connect_attempts(), 2);
    }

    #[test]
    fn lost_submission_still_records() {
        let broker = connected(MockBroker::builder().fill_mode(FillMode::LostOnSubmit));
        let err = broker.submit_order(&buy(1)).unwrap_err();
        assert!(!err.is_refusal());
        assert_eq!(broker.submitted_orders().len(), 1);
    }
}
