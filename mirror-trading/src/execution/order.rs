//! Trade actions and their outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How large an order should be.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "usd", rename_all = "snake_case")]
pub enum Sizing {
    /// Spend up to this many dollars, in whole shares
    DollarAmount(f64),
    /// Liquidate the whole existing position
    FullClose,
}

/// One normalized instruction derived from the scraped portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeAction {
    pub symbol: String,
    pub side: Side,
    pub sizing: Sizing,
}

impl TradeAction {
    pub fn buy(symbol: impl Into<String>, dollars: f64) -> Self {
        Self {
            symbol: symbol.into(),
            side: Side::Buy,
            sizing: Sizing::DollarAmount(dollars),
        }
    }

    pub fn close(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            side: Side::Sell,
            sizing: Sizing::FullClose,
        }
    }
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.sizing {
            Sizing::DollarAmount(usd) => write!(f, "{} {} ${usd:.0}", self.side, self.symbol),
            Sizing::FullClose => write!(f, "{} {} (close)", self.side, self.symbol),
        }
    }
}

/// Order price policy for a batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OrderKind {
    Market,
    /// Limit at last price moved by `tolerance_pct` in the trader's disfavor
    Limit { tolerance_pct: f64 },
}

impl OrderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderKind::Market => "market",
            OrderKind::Limit { .. } => "limit",
        }
    }

    /// Limit price for `side` given the last price, rounded to cents.
    pub fn limit_price(&self, side: Side, last: f64) -> Option<f64> {
        match self {
            OrderKind::Market => None,
            OrderKind::Limit { tolerance_pct } => {
                let factor = match side {
                    Side::Buy => 1.0 + tolerance_pct / 100.0,
                    Side::Sell => 1.0 - tolerance_pct / 100.0,
                };
                Some((last * factor * 100.0).round() / 100.0)
            }
        }
    }
}

/// Final state of one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Submitted,
    Filled,
    Rejected,
    Skipped,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Submitted => "submitted",
            OrderStatus::Filled => "filled",
            OrderStatus::Rejected => "rejected",
            OrderStatus::Skipped => "skipped",
        }
    }
}

/// Why an action could not be sized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InsufficientData {
    #[error("no price")]
    NoPrice,

    #[error("insufficient funds for one share")]
    ZeroQuantity,

    #[error("no position")]
    NoPosition,
}

/// Result of executing one action. Never mutated once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderOutcome {
    pub action: TradeAction,
    pub status: OrderStatus,
    /// Shares sent to the broker
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u64>,
    /// Price used for sizing or the limit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_price: Option<f64>,
    /// Average fill price reported by the broker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broker_order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl OrderOutcome {
    fn new(action: TradeAction, status: OrderStatus) -> Self {
        Self {
            action,
            status,
            quantity: None,
            reference_price: None,
            fill_price: None,
            broker_order_id: None,
            error: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn skipped(action: TradeAction, reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Self::new(action, OrderStatus::Skipped)
        }
    }

    pub fn rejected(action: TradeAction, reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Self::new(action, OrderStatus::Rejected)
        }
    }

    pub fn accepted(
        action: TradeAction,
        status: OrderStatus,
        quantity: u64,
        broker_order_id: String,
    ) -> Self {
        Self {
            quantity: Some(quantity),
            broker_order_id: Some(broker_order_id),
            ..Self::new(action, status)
        }
    }

    pub fn with_quantity(mut self, quantity: u64) -> Self {
        self.quantity = Some(quantity);
        self
    }

    pub fn with_reference_price(mut self, price: Option<f64>) -> Self {
        self.reference_price = price;
        self
    }

    pub fn with_fill_price(mut self, price: Option<f64>) -> Self {
        self.fill_price = price;
        self
    }

    /// Fill price when known, else the sizing price.
    pub fn effective_price(&self) -> Option<f64> {
        self.fill_price.or(self.reference_price)
    }

    pub fn is_placed(&self) -> bool {
        matches!(self.status, OrderStatus::Submitted | OrderStatus::Filled)
    }
}
