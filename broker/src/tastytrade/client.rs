//! Tastytrade REST API client.

use std::time::Duration;

use log::debug;
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use zeroize::Zeroizing;

use super::types::{
    BalanceData, Envelope, Items, MarketDataItem, OrderData, OrderRequest, PlacedOrder,
    PositionItem, SessionData, SessionRequest,
};
use crate::error::BrokerError;

const USER_AGENT: &str = concat!("allocbook/", env!("CARGO_PKG_VERSION"));

/// Blocking tastytrade REST client.
pub struct TastytradeClient {
    client: Client,
    base_url: String,
    token: Option<Zeroizing<String>>,
}

impl TastytradeClient {
    /// Create a client without a session. Every request times out after `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BrokerError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| BrokerError::Connection(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    pub fn set_token(&mut self, token: Zeroizing<String>) {
        self.token = Some(token);
    }

    /// Log in (POST /sessions) and return the new session token.
    pub fn create_session(
        &self,
        login: &str,
        password: &str,
    ) -> Result<Zeroizing<String>, BrokerError> {
        let url = format!("{}/sessions", self.base_url);
        debug!("Creating tastytrade session at {url}");

        let resp = self
            .client
            .post(&url)
            .json(&SessionRequest { login, password })
            .send()
            .map_err(|e| transport_error(e, "session"))?;

        let resp = match resp.status() {
            s if s.is_success() => resp,
            StatusCode::TOO_MANY_REQUESTS => return Err(BrokerError::RateLimit),
            s if s.is_client_error() => {
                return Err(BrokerError::Auth(format!(
                    "session returned {s}: {}",
                    error_body(resp)
                )));
            }
            s => {
                return Err(BrokerError::Connection(format!(
                    "session returned {s}: {}",
                    error_body(resp)
                )));
            }
        };

        let session: Envelope<SessionData> = parse(resp, "session")?;
        Ok(Zeroizing::new(session.data.session_token))
    }

    /// Get positions (GET /accounts/{account}/positions).
    pub fn positions(&self, account: &str) -> Result<Vec<PositionItem>, BrokerError> {
        let url = format!("{}/accounts/{account}/positions", self.base_url);
        let items: Envelope<Items<PositionItem>> = self.get_json(&url, "positions")?;
        Ok(items.data.items)
    }

    /// Get balances (GET /accounts/{account}/balances).
    pub fn balances(&self, account: &str) -> Result<BalanceData, BrokerError> {
        let url = format!("{}/accounts/{account}/balances", self.base_url);
        let data: Envelope<BalanceData> = self.get_json(&url, "balances")?;
        Ok(data.data)
    }

    /// Get an equity quote (GET /market-data/by-type?equity=SYM).
    pub fn equity_quote(&self, symbol: &str) -> Result<MarketDataItem, BrokerError> {
        let url = format!("{}/market-data/by-type?equity={symbol}", self.base_url);
        let data: Envelope<Items<MarketDataItem>> = self.get_json(&url, "quote")?;
        data.data
            .items
            .into_iter()
            .find(|item| item.symbol.eq_ignore_ascii_case(symbol))
            .ok_or_else(|| BrokerError::InvalidSymbol(symbol.to_string()))
    }

    /// Submit a new order (POST /accounts/{account}/orders).
    ///
    /// A 4xx reply means the order was refused. Anything else that is not a
    /// success leaves the order's fate unknown.
    pub fn place_order(
        &self,
        account: &str,
        order: &OrderRequest,
    ) -> Result<OrderData, BrokerError> {
        let url = format!("{}/accounts/{account}/orders", self.base_url);
        debug!("Submitting tastytrade order: {order:?}");

        let resp = self
            .authorized(self.client.post(&url))?
            .json(order)
            .send()
            .map_err(|e| transport_error(e, "order"))?;

        let resp = match resp.status() {
            s if s.is_success() => resp,
            StatusCode::UNAUTHORIZED => return Err(auth_error(resp)),
            StatusCode::TOO_MANY_REQUESTS => return Err(BrokerError::RateLimit),
            s if s.is_client_error() => {
                return Err(BrokerError::Rejected(format!(
                    "order returned {s}: {}",
                    error_body(resp)
                )));
            }
            s => {
                return Err(BrokerError::Order(format!(
                    "order returned {s}: {}",
                    error_body(resp)
                )));
            }
        };

        let placed: Envelope<PlacedOrder> = parse(resp, "order")?;
        Ok(placed.data.order)
    }

    /// Get order status (GET /accounts/{account}/orders/{id}).
    pub fn order(&self, account: &str, id: u64) -> Result<OrderData, BrokerError> {
        let url = format!("{}/accounts/{account}/orders/{id}", self.base_url);
        let data: Envelope<OrderData> = self.get_json(&url, "order status")?;
        Ok(data.data)
    }

    /// Cancel an order (DELETE /accounts/{account}/orders/{id}).
    pub fn cancel_order(&self, account: &str, id: u64) -> Result<(), BrokerError> {
        let url = format!("{}/accounts/{account}/orders/{id}", self.base_url);
        let resp = self
            .authorized(self.client.delete(&url))?
            .send()
            .map_err(|e| transport_error(e, "cancel"))?;
        check(resp, "cancel").map(|_| ())
    }

    fn authorized(&self, req: RequestBuilder) -> Result<RequestBuilder, BrokerError> {
        let token = self.token.as_ref().ok_or(BrokerError::NotConnected)?;
        Ok(req.header("Authorization", token.as_str()))
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<T, BrokerError> {
        let resp = self
            .authorized(self.client.get(url))?
            .send()
            .map_err(|e| transport_error(e, what))?;
        parse(check(resp, what)?, what)
    }
}

/// Map a non-success reply to an error; pass a success through.
fn check(resp: Response, what: &str) -> Result<Response, BrokerError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    Err(match status {
        StatusCode::UNAUTHORIZED => auth_error(resp),
        StatusCode::TOO_MANY_REQUESTS => BrokerError::RateLimit,
        s if s.is_server_error() => {
            BrokerError::Connection(format!("{what} returned {s}: {}", error_body(resp)))
        }
        s => BrokerError::Other(format!("{what} returned {s}: {}", error_body(resp))),
    })
}

fn parse<T: DeserializeOwned>(resp: Response, what: &str) -> Result<T, BrokerError> {
    resp.json::<T>()
        .map_err(|e| BrokerError::Parse(format!("failed to parse {what}: {e}")))
}

fn transport_error(e: reqwest::Error, what: &str) -> BrokerError {
    if e.is_timeout() {
        BrokerError::Timeout(format!("{what} request: {e}"))
    } else {
        BrokerError::Connection(format!("{what} request failed: {e}"))
    }
}

fn auth_error(resp: Response) -> BrokerError {
    BrokerError::Auth(format!("session rejected: {}", error_body(resp)))
}

fn error_body(resp: Response) -> String {
    resp.text().unwrap_or_default()
}
