//! Broker error types.

/// Errors that can occur during broker operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BrokerError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    /// The broker refused the order. It is not working at the broker.
    #[error("order rejected: {0}")]
    Rejected(String),

    #[error("order error: {0}")]
    Order(String),

    #[error("not connected")]
    NotConnected,

    #[error("invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("rate limit exceeded")]
    RateLimit,

    #[error("unexpected response: {0}")]
    Parse(String),

    #[error("{0}")]
    Other(String),
}

impl BrokerError {
    /// Worth retrying: the request may succeed if sent again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BrokerError::Connection(_) | BrokerError::Timeout(_) | BrokerError::RateLimit
        )
    }

    /// On order submission: the broker definitely did not accept the order.
    ///
    /// Anything else (a timeout, a dropped connection, an unreadable reply)
    /// leaves it unknown whether the order is working.
    pub fn is_refusal(&self) -> bool {
        matches!(
            self,
            BrokerError::Rejected(_)
                | BrokerError::NotConnected
                | BrokerError::InvalidSymbol(_)
                | BrokerError::Auth(_)
                | BrokerError::RateLimit
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(BrokerError::Timeout("quote".into()).is_transient());
        assert!(BrokerError::Connection("reset".into()).is_transient());
        assert!(BrokerError::RateLimit.is_transient());
        assert!(!BrokerError::Rejected("buying power".into()).is_transient());
        assert!(!BrokerError::Parse("bad json".into()).is_transient());
    }

    #[test]
    fn refusal_classification() {
        assert!(BrokerError::Rejected("buying power".into()).is_refusal());
        assert!(BrokerError::NotConnected.is_refusal());
        assert!(!BrokerError::Timeout("submit".into()).is_refusal());
        assert!(!BrokerError::Parse("bad json".into()).is_refusal());
    }
}
