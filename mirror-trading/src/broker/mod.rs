//! Brokerage connection abstraction.
//!
//! The scheduler only sees the [`Brokerage`] trait. The one shipped adapter
//! is [`TwsBroker`], which talks to TWS or IB Gateway over the socket API.

mod tws;

pub use tws::TwsBroker;

use crate::execution::Side;
use async_trait::async_trait;
use mirror_common::BrokerConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Brokerage errors.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Timed out waiting for {0}")]
    Timeout(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Broker error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("Order rejected: {0}")]
    Rejected(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BrokerError {
    /// Reason string recorded on a rejected outcome.
    pub fn reason(&self) -> String {
        match self {
            BrokerError::Rejected(reason) => reason.clone(),
            other => other.to_string(),
        }
    }
}

/// Where the terminal listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerEndpoint {
    pub host: String,
    pub port: u16,
    pub client_id: i32,
    pub connect_timeout: Duration,
}

impl From<&BrokerConfig> for BrokerEndpoint {
    fn from(config: &BrokerConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            client_id: config.client_id,
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
        }
    }
}

impl std::fmt::Display for BrokerEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} (client {})", self.host, self.port, self.client_id)
    }
}

/// Price instruction sent with an order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "price", rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit(f64),
}

impl OrderType {
    pub fn limit_price(&self) -> Option<f64> {
        match self {
            OrderType::Market => None,
            OrderType::Limit(price) => Some(*price),
        }
    }
}

/// A sized order ready for submission.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    /// Canonical symbol (`BRK.B`); adapters convert it to their own format
    pub symbol: String,
    pub side: Side,
    pub quantity: u64,
    pub order_type: OrderType,
    pub account: String,
}

/// State reported by the broker when it acknowledged the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckState {
    Submitted,
    Filled,
}

/// Broker acknowledgement of an accepted order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderAck {
    pub broker_order_id: String,
    pub state: AckState,
    pub fill_price: Option<f64>,
}

/// Connection to a brokerage terminal.
///
/// One instance serves one batch: `connect`, any number of queries and
/// submissions, then `disconnect`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Brokerage: Send {
    /// Adapter name for logs
    fn name(&self) -> &'static str;

    async fn connect(&mut self, endpoint: &BrokerEndpoint) -> Result<(), BrokerError>;

    /// Accounts the session may trade
    async fn managed_accounts(&mut self) -> Result<Vec<String>, BrokerError>;

    /// Last known price, `None` when the terminal has no usable quote
    async fn current_price(&mut self, symbol: &str) -> Result<Option<f64>, BrokerError>;

    /// Signed share count held in `account` (empty = any account)
    async fn current_position(&mut self, symbol: &str, account: &str) -> Result<i64, BrokerError>;

    async fn submit_order(&mut self, order: &OrderRequest) -> Result<OrderAck, BrokerError>;

    async fn disconnect(&mut self) -> Result<(), BrokerError>;
}

// ============================================================================
// Tests
// ============================================================================
