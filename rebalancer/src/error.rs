//! Error types for the rebalancer.

use std::path::PathBuf;

use allocbook_broker::{BrokerError, OrderId};

/// All errors that can occur during rebalancer operation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("environment variable {0} is not set")]
    MissingSecret(String),

    /// Calendar, quote, or target problem. Raised before any order exists.
    #[error(transparent)]
    Decision(#[from] allocbook::Error),

    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    /// An order may be working at the broker but its state could not be
    /// established. Needs a human.
    #[error("order status unknown{}: {reason}", order_suffix(.order_id))]
    OrderStatusUnknown {
        order_id: Option<OrderId>,
        reason: String,
    },

    #[error("failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),
}

fn order_suffix(id: &Option<OrderId>) -> String {
    id.map(|id| format!(" for order {id}")).unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_status_message() {
        let e = Error::OrderStatusUnknown {
            order_id: Some(OrderId(42)),
            reason: "status polls kept failing".into(),
        };
        assert_eq!(
            e.to_string(),
            "order status unknown for order 42: status polls kept failing"
        );

        let e = Error::OrderStatusUnknown {
            order_id: None,
            reason: "submission timed out".into(),
        };
        assert_eq!(e.to_string(), "order status unknown: submission timed out");
    }
}
