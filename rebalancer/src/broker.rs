//! Broker connection from config.

use allocbook_broker::Broker;
use allocbook_broker::tastytrade::{TastytradeBroker, TastytradeConfig};
use log::info;

use crate::config::{Config, secret_from_env};
use crate::driver::{ExecutionPolicy, SystemPacer, connect_with_retry};
use crate::error::Result;

/// Connect to tastytrade using the rebalancer config.
///
/// Credentials come from the environment variables the config names.
/// Transient login failures are retried under the execution policy.
pub fn connect_broker(config: &Config) -> Result<Box<dyn Broker>> {
    let broker_config = &config.broker;
    let login = secret_from_env(&broker_config.username_env)?;
    let password = secret_from_env(&broker_config.password_env)?;

    info!(
        "Connecting to tastytrade {} account {}",
        broker_config.environment, broker_config.account
    );
    let mut broker = TastytradeBroker::new(TastytradeConfig {
        environment: broker_config.environment,
        account_number: broker_config.account.clone(),
        login: login.to_string(),
        password,
        session_cache: broker_config.session_cache.clone(),
        request_timeout: config.request_timeout(),
    });
    let policy = ExecutionPolicy::from_config(&config.execution);
    connect_with_retry(&mut broker, &policy, &SystemPacer)?;
    Ok(Box::new(broker))
}
