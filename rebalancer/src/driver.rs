//! Order lifecycle: submit once, poll to a deadline, cancel, resolve.
//!
//! ```text
//! submitted --(broker reports fill)--------------> filled
//! submitted --(deadline, some quantity filled)---> partially_filled
//! submitted --(deadline, nothing filled)---------> unfilled_timeout
//! submitted --(cancelled/expired at the broker)--> cancelled
//! submitted --(broker refuses)-------------------> rejected
//! ```
//!
//! Exactly one order is submitted per call. Transient status errors are
//! retried; they never cause a second submission.

use std::cell::Cell;
use std::thread;
use std::time::{Duration, Instant};

use allocbook::{OrderIntent, OrderState, Price};
use allocbook_broker::{
    Broker, BrokerError, BrokerOrder, BrokerOrderState, BrokerOrderStatus, OrderId,
};
use log::{debug, info, warn};
use serde::Serialize;

use crate::config::ExecutionConfig;
use crate::error::{Error, Result};

/// Upper bound on a single retry backoff.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Clock and sleep used by the poll loop.
pub trait Pacer {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

/// Wall clock with `std::thread::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPacer;

impl Pacer for SystemPacer {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Manual clock: `sleep` advances time instantly.
#[derive(Debug)]
pub struct ManualPacer {
    start: Instant,
    elapsed: Cell<Duration>,
    sleeps: Cell<u32>,
}

impl ManualPacer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            elapsed: Cell::new(Duration::ZERO),
            sleeps: Cell::new(0),
        }
    }

    /// Simulated time since creation.
    pub fn elapsed(&self) -> Duration {
        self.elapsed.get()
    }

    pub fn sleeps(&self) -> u32 {
        self.sleeps.get()
    }
}

impl Default for ManualPacer {
    fn default() -> Self {
        Self::new()
    }
}

impl Pacer for ManualPacer {
    fn now(&self) -> Instant {
        self.start + self.elapsed.get()
    }

    fn sleep(&self, duration: Duration) {
        self.elapsed.set(self.elapsed.get() + duration);
        self.sleeps.set(self.sleeps.get() + 1);
    }
}

impl<P: Pacer + ?Sized> Pacer for &P {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// Poll cadence, deadline, and retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionPolicy {
    pub poll_interval: Duration,
    pub order_timeout: Duration,
    /// Retries after the first failed attempt of a transient call.
    pub max_retries: u32,
    /// First retry delay. Doubles per retry, capped at 30 s.
    pub retry_backoff: Duration,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self::from_config(&ExecutionConfig::default())
    }
}

impl ExecutionPolicy {
    pub fn from_config(config: &ExecutionConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            order_timeout: Duration::from_secs(config.order_timeout_secs),
            max_retries: config.max_poll_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.retry_backoff.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

/// How one order ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Execution {
    /// Broker order ID. `None` when the broker refused the submission.
    pub order_id: Option<u64>,
    pub state: OrderState,
    pub filled_quantity: u64,
    pub avg_fill_price: Option<Price>,
    /// Successful status reads.
    pub polls: u32,
    /// Broker's reason when the order was rejected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Execution {
    fn refused(reason: String) -> Self {
        Self {
            order_id: None,
            state: OrderState::Rejected,
            filled_quantity: 0,
            avg_fill_price: None,
            polls: 0,
            reason: Some(reason),
        }
    }

    fn resolved(
        id: OrderId,
        state: OrderState,
        status: Option<&BrokerOrderStatus>,
        polls: u32,
    ) -> Self {
        let filled = status.map_or(0, |s| s.filled_quantity);
        let avg = status
            .filter(|s| s.filled_quantity > 0 && s.avg_fill_price_cents > 0)
            .map(|s| Price(s.avg_fill_price_cents));
        Self {
            order_id: Some(id.0),
            state,
            filled_quantity: filled,
            avg_fill_price: avg,
            polls,
            reason: None,
        }
    }
}

/// Run `op`, retrying transient broker errors with exponential backoff.
///
/// Non-transient errors return immediately. After `max_retries` retries
/// the last error is returned.
pub fn retry_transient<T, P: Pacer>(
    pacer: &P,
    policy: &ExecutionPolicy,
    what: &str,
    mut op: impl FnMut() -> std::result::Result<T, BrokerError>,
) -> std::result::Result<T, BrokerError> {
    let mut attempt = 0;
    loop {
        match op() {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                let delay = policy.backoff(attempt);
                warn!(
                    "{what} failed ({e}), retry {}/{} in {}ms",
                    attempt + 1,
                    policy.max_retries,
                    delay.as_millis()
                );
                pacer.sleep(delay);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Connect `broker`, retrying transient failures (e.g. a login timeout)
/// under the same policy as reads.
pub fn connect_with_retry<B, P>(
    broker: &mut B,
    policy: &ExecutionPolicy,
    pacer: &P,
) -> std::result::Result<(), BrokerError>
where
    B: Broker + ?Sized,
    P: Pacer,
{
    retry_transient(pacer, policy, "broker login", || broker.connect())
}

/// Submit `intent`, placed against a holding of `held` shares, and follow
/// it to a terminal state.
///
/// Returns `Err(OrderStatusUnknown)` when the order may be working at the
/// broker but its state can't be read: a submission that failed without a
/// refusal, or status reads that kept failing. A cancel is attempted first
/// in the latter case.
pub fn execute<B, P>(
    broker: &B,
    intent: &OrderIntent,
    held: i64,
    policy: &ExecutionPolicy,
    pacer: &P,
) -> Result<Execution>
where
    B: Broker + ?Sized,
    P: Pacer,
{
    let order = BrokerOrder::new(intent, held);
    info!("Submitting {intent}");

    let id = match broker.submit_order(&order) {
        Ok(id) => id,
        Err(e) if e.is_refusal() => {
            warn!("Order refused: {e}");
            return Ok(Execution::refused(e.to_string()));
        }
        Err(e) => {
            return Err(Error::OrderStatusUnknown {
                order_id: None,
                reason: format!("submission failed without a broker response: {e}"),
            });
        }
    };
    info!(
        "Order {id} accepted, polling every {}ms for up to {}s",
        policy.poll_interval.as_millis(),
        policy.order_timeout.as_secs()
    );

    let deadline = pacer.now() + policy.order_timeout;
    let mut polls = 0u32;
    let mut last: Option<BrokerOrderStatus> = None;

    loop {
        let remaining = deadline.saturating_duration_since(pacer.now());
        if remaining.is_zero() {
            break;
        }
        pacer.sleep(policy.poll_interval.min(remaining));

        let status = retry_transient(pacer, policy, "order status", || broker.order_status(id));
        let status = match status {
            Ok(s) => s,
            Err(e) => {
                warn!("Lost track of order {id}: {e}; requesting cancel");
                cancel_best_effort(broker, id);
                return Err(Error::OrderStatusUnknown {
                    order_id: Some(id),
                    reason: format!("order status unavailable: {e}"),
                });
            }
        };
        polls += 1;
        debug!(
            "Order {id}: {:?} filled={} remaining={}",
            status.status, status.filled_quantity, status.remaining_quantity
        );

        match status.status {
            BrokerOrderState::Filled => {
                info!(
                    "Order {id} filled {} @ {}",
                    status.filled_quantity,
                    Price(status.avg_fill_price_cents)
                );
                return Ok(Execution::resolved(
                    id,
                    OrderState::Filled,
                    Some(&status),
                    polls,
                ));
            }
            BrokerOrderState::Rejected => {
                warn!("Order {id} rejected by the broker");
                let mut exec =
                    Execution::resolved(id, OrderState::Rejected, Some(&status), polls);
                exec.reason = Some("rejected after acceptance".into());
                return Ok(exec);
            }
            BrokerOrderState::Cancelled | BrokerOrderState::Expired => {
                let state = if status.filled_quantity > 0 {
                    OrderState::PartiallyFilled
                } else {
                    OrderState::Cancelled
                };
                warn!("Order {id} ended at the broker as {:?}", status.status);
                return Ok(Execution::resolved(id, state, Some(&status), polls));
            }
            BrokerOrderState::Pending
            | BrokerOrderState::Working
            | BrokerOrderState::PartiallyFilled => {
                last = Some(status);
            }
        }
    }

    warn!(
        "Order {id} not filled within {}s, cancelling",
        policy.order_timeout.as_secs()
    );
    cancel_best_effort(broker, id);

    // A fill can land between the last poll and the cancel.
    let final_status = retry_transient(pacer, policy, "final order status", || {
        broker.order_status(id)
    });
    let final_status = match final_status {
        Ok(s) => {
            polls += 1;
            Some(s)
        }
        Err(e) => {
            warn!("Final status read for order {id} failed: {e}");
            None
        }
    };
    let status = final_status.or(last);

    let state = match &status {
        Some(s) if s.status == BrokerOrderState::Filled => OrderState::Filled,
        Some(s) if s.filled_quantity > 0 => OrderState::PartiallyFilled,
        _ => OrderState::UnfilledTimeout,
    };
    info!("Order {id} resolved as {state}");
    Ok(Execution::resolved(id, state, status.as_ref(), polls))
}

/// Cancel, logging the outcome only.
fn cancel_best_effort<B: Broker + ?Sized>(broker: &B, id: OrderId) {
    match broker.cancel_order(id) {
        Ok(()) => info!("Cancel requested for order {id}"),
        Err(e) => warn!("Cancel request for order {id} failed: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = ExecutionPolicy {
            retry_backoff: Duration::from_secs(1),
            ..ExecutionPolicy::default()
        };
        assert_eq!(policy.backoff(0), Duration::from_secs(1));
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(8));
        assert_eq!(policy.backoff(10), MAX_BACKOFF);
        assert_eq!(policy.backoff(40), MAX_BACKOFF);
    }

    #[test]
    fn default_policy() {
        let policy = ExecutionPolicy::default();
        assert_eq!(policy.poll_interval, Duration::from_secs(5));
        assert_eq!(policy.order_timeout, Duration::from_secs(300));
        assert_eq!(policy.max_retries, 5);
    }

    #[test]
    fn manual_pacer_advances_on_sleep() {
        let pacer = ManualPacer::new();
        let t0 = pacer.now();
        pacer.sleep(Duration::from_secs(5));
        pacer.sleep(Duration::from_secs(5));
        assert_eq!(pacer.now() - t0, Duration::from_secs(10));
        assert_eq!(pacer.sleeps(), 2);
    }

    #[test]
    fn retry_gives_up_after_max_retries() {
        let pacer = ManualPacer::new();
        let policy = ExecutionPolicy {
            max_retries: 2,
            retry_backoff: Duration::from_millis(100),
            ..ExecutionPolicy::default()
        };
        let mut calls = 0;
        let result: std::result::Result<(), _> = retry_transient(&pacer, &policy, "test", || {
            calls += 1;
            Err(BrokerError::Timeout("slow".into()))
        });
        assert!(result.is_err());
        assert_eq!(calls, 3);
        assert_eq!(pacer.elapsed(), Duration::from_millis(300));
    }

    #[test]
    fn retry_stops_on_permanent_error() {
        let pacer = ManualPacer::new();
        let mut calls = 0;
        let result: std::result::Result<(), _> =
            retry_transient(&pacer, &ExecutionPolicy::default(), "test", || {
                calls += 1;
                Err(BrokerError::Auth("bad token".into()))
            });
        assert!(matches!(result, Err(BrokerError::Auth(_))));
        assert_eq!(calls, 1);
        assert_eq!(pacer.sleeps(), 0);
    }

    #[test]
    fn login_timeouts_are_retried() {
        use allocbook_broker::mock::MockBroker;

        let pacer = ManualPacer::new();
        let mut broker = MockBroker::builder().fail_connects(2).build();
        connect_with_retry(&mut broker, &ExecutionPolicy::default(), &pacer).unwrap();
        assert_eq!(broker.connect_attempts(), 3);
        assert_eq!(pacer.elapsed(), Duration::from_secs(3));
    }

    #[test]
    fn retry_recovers() {
        let pacer = ManualPacer::new();
        let mut calls = 0;
        let result = retry_transient(&pacer, &ExecutionPolicy::default(), "test", || {
            calls += 1;
            if calls < 3 {
                Err(BrokerError::Connection("reset".into()))
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result.unwrap(), 3);
    }
}
