//! Batch order execution.
//!
//! All BUY actions are attempted before any SELL action. Each action is
//! independent: a failure is recorded on its outcome and the batch moves on.
//! Only a failed connect aborts the batch.

use super::journal::OutcomeJournal;
use super::order::{InsufficientData, OrderKind, OrderOutcome, OrderStatus, Side, Sizing, TradeAction};
use crate::broker::{AckState, BrokerEndpoint, BrokerError, Brokerage, OrderRequest, OrderType};
use mirror_common::{Config, OrderTypeSetting};
use std::future::Future;
use std::time::Duration;

/// Execution parameters for one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Dollars per BUY when an action carries no amount of its own
    pub dollar_amount: f64,
    pub order_kind: OrderKind,
    /// Bound on waiting for an order acknowledgement
    pub ack_timeout: Duration,
    /// Bound on price and position queries
    pub data_timeout: Duration,
    /// Pause after each submitted order
    pub pause_between_orders: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            dollar_amount: 500.0,
            order_kind: OrderKind::Market,
            ack_timeout: Duration::from_secs(10),
            data_timeout: Duration::from_secs(5),
            pause_between_orders: Duration::from_secs(1),
        }
    }
}

impl From<&Config> for SchedulerConfig {
    fn from(config: &Config) -> Self {
        let trading = &config.trading;
        let order_kind = match trading.order_type {
            OrderTypeSetting::Market => OrderKind::Market,
            OrderTypeSetting::Limit => OrderKind::Limit {
                tolerance_pct: trading.limit_tolerance_pct,
            },
        };
        Self {
            dollar_amount: trading.dollar_amount,
            order_kind,
            ack_timeout: Duration::from_secs(trading.ack_timeout_secs),
            data_timeout: Duration::from_secs(trading.price_timeout_secs),
            pause_between_orders: Duration::from_millis(trading.order_pause_ms),
        }
    }
}

/// The account and connection a batch runs against.
pub struct AccountContext<B> {
    /// Empty means "the first account the terminal manages"
    pub account_id: String,
    pub endpoint: BrokerEndpoint,
    pub broker: B,
}

impl<B: Brokerage> AccountContext<B> {
    pub fn new(account_id: impl Into<String>, endpoint: BrokerEndpoint, broker: B) -> Self {
        Self {
            account_id: account_id.into(),
            endpoint,
            broker,
        }
    }
}

/// Outcomes of one batch, in execution order.
#[derive(Debug, Clone)]
pub struct BatchResult {
    /// Account the orders were placed in
    pub account_id: String,
    pub outcomes: Vec<OrderOutcome>,
}

/// Sizes and places a batch of actions.
pub struct OrderScheduler {
    config: SchedulerConfig,
    journal: Option<OutcomeJournal>,
    run_id: String,
}

impl OrderScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            journal: None,
            run_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Stream every outcome to `journal` as it is recorded.
    pub fn with_journal(mut self, journal: OutcomeJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Run the batch: connect, BUYs, SELLs, disconnect.
    ///
    /// Returns `Err` only when the connection cannot be established; in that
    /// case no order was attempted. Once connected the batch always
    /// completes and the connection is always released.
    pub async fn execute<B: Brokerage>(
        &mut self,
        actions: &[TradeAction],
        ctx: &mut AccountContext<B>,
    ) -> Result<BatchResult, BrokerError> {
        let broker_name = ctx.broker.name();
        if let Err(e) = ctx.broker.connect(&ctx.endpoint).await {
            tracing::error!(broker = broker_name, endpoint = %ctx.endpoint, error = %e, "Connect failed");
            if let Err(e) = ctx.broker.disconnect().await {
                tracing::debug!(error = %e, "Disconnect after failed connect");
            }
            return Err(e);
        }

        let account_id = self.resolve_account(ctx).await;
        let (buys, sells): (Vec<&TradeAction>, Vec<&TradeAction>) =
            actions.iter().partition(|a| a.side == Side::Buy);
        tracing::info!(
            account = %account_id,
            buys = buys.len(),
            sells = sells.len(),
            order_kind = self.config.order_kind.as_str(),
            "Executing batch"
        );

        let mut outcomes = Vec::with_capacity(actions.len());
        for action in buys.into_iter().chain(sells) {
            let outcome = self.execute_one(action, &account_id, &mut ctx.broker).await;
            tracing::info!(
                symbol = %action.symbol,
                side = %action.side,
                status = outcome.status.as_str(),
                quantity = ?outcome.quantity,
                order_id = ?outcome.broker_order_id,
                reason = ?outcome.error,
                "Action complete"
            );
            self.record(&outcome);
            let placed = outcome.is_placed();
            outcomes.push(outcome);

            if placed && !self.config.pause_between_orders.is_zero() {
                tokio::time::sleep(self.config.pause_between_orders).await;
            }
        }

        if let Err(e) = ctx.broker.disconnect().await {
            tracing::warn!(error = %e, "Disconnect failed");
        }

        Ok(BatchResult {
            account_id,
            outcomes,
        })
    }

    async fn resolve_account<B: Brokerage>(&self, ctx: &mut AccountContext<B>) -> String {
        if !ctx.account_id.is_empty() {
            return ctx.account_id.clone();
        }
        let managed = bounded(
            self.config.data_timeout,
            "managed accounts",
            ctx.broker.managed_accounts(),
        )
        .await;
        match managed {
            Ok(accounts) => match accounts.into_iter().next() {
                Some(first) => {
                    tracing::info!(account = %first, "Using first managed account");
                    first
                }
                None => String::new(),
            },
            Err(e) => {
                tracing::warn!(error = %e, "Could not list managed accounts");
                String::new()
            }
        }
    }

    async fn execute_one<B: Brokerage>(
        &self,
        action: &TradeAction,
        account: &str,
        broker: &mut B,
    ) -> OrderOutcome {
        match action.side {
            Side::Buy => self.execute_buy(action, account, broker).await,
            Side::Sell => self.execute_sell(action, account, broker).await,
        }
    }

    async fn execute_buy<B: Brokerage>(
        &self,
        action: &TradeAction,
        account: &str,
        broker: &mut B,
    ) -> OrderOutcome {
        let dollars = match action.sizing {
            Sizing::DollarAmount(usd) => usd,
            Sizing::FullClose => self.config.dollar_amount,
        };

        let price = match self.price(action, broker).await {
            Ok(price) => price,
            Err(reason) => return OrderOutcome::skipped(action.clone(), reason),
        };

        let quantity = (dollars / price).floor();
        if quantity < 1.0 {
            return OrderOutcome::skipped(action.clone(), InsufficientData::ZeroQuantity.to_string())
                .with_reference_price(Some(price));
        }

        self.submit(action, quantity as u64, Some(price), account, broker)
            .await
    }

    async fn execute_sell<B: Brokerage>(
        &self,
        action: &TradeAction,
        account: &str,
        broker: &mut B,
    ) -> OrderOutcome {
        let position = bounded(
            self.config.data_timeout,
            "position",
            broker.current_position(&action.symbol, account),
        )
        .await;
        let shares = match position {
            Ok(shares) if shares > 0 => shares as u64,
            Ok(_) => {
                return OrderOutcome::skipped(action.clone(), InsufficientData::NoPosition.to_string())
            }
            Err(e) => {
                return OrderOutcome::skipped(
                    action.clone(),
                    format!("position query failed: {}", e.reason()),
                )
            }
        };

        let price = match self.config.order_kind {
            OrderKind::Market => None,
            OrderKind::Limit { .. } => match self.price(action, broker).await {
                Ok(price) => Some(price),
                Err(reason) => return OrderOutcome::skipped(action.clone(), reason),
            },
        };

        self.submit(action, shares, price, account, broker).await
    }

    /// Current price, or the skip reason.
    async fn price<B: Brokerage>(&self, action: &TradeAction, broker: &mut B) -> Result<f64, String> {
        let price = bounded(
            self.config.data_timeout,
            "price",
            broker.current_price(&action.symbol),
        )
        .await;
        match price {
            Ok(Some(price)) if price > 0.0 => Ok(price),
            Ok(_) => Err(InsufficientData::NoPrice.to_string()),
            Err(e) => Err(format!("{}: {}", InsufficientData::NoPrice, e.reason())),
        }
    }

    async fn submit<B: Brokerage>(
        &self,
        action: &TradeAction,
        quantity: u64,
        reference_price: Option<f64>,
        account: &str,
        broker: &mut B,
    ) -> OrderOutcome {
        let order_type = match reference_price.and_then(|p| self.config.order_kind.limit_price(action.side, p)) {
            Some(limit) => OrderType::Limit(limit),
            None => OrderType::Market,
        };
        let request = OrderRequest {
            symbol: action.symbol.clone(),
            side: action.side,
            quantity,
            order_type,
            account: account.to_string(),
        };

        let ack = bounded(
            self.config.ack_timeout,
            "order acknowledgement",
            broker.submit_order(&request),
        )
        .await;
        let outcome = match ack {
            Ok(ack) => {
                let status = match ack.state {
                    AckState::Filled => OrderStatus::Filled,
                    AckState::Submitted => OrderStatus::Submitted,
                };
                OrderOutcome::accepted(action.clone(), status, quantity, ack.broker_order_id)
                    .with_fill_price(ack.fill_price)
            }
            Err(e @ BrokerError::Timeout(_)) => OrderOutcome::rejected(
                action.clone(),
                format!("{e}; the order may still be live at the broker"),
            )
            .with_quantity(quantity),
            Err(e) => OrderOutcome::rejected(action.clone(), e.reason()).with_quantity(quantity),
        };
        outcome.with_reference_price(reference_price)
    }

    fn record(&mut self, outcome: &OrderOutcome) {
        if let Some(journal) = &mut self.journal {
            if let Err(e) = journal.append(&self.run_id, outcome) {
                tracing::warn!(error = %e, path = %journal.path().display(), "Journal append failed");
            }
        }
    }
}

/// Bound a broker call; expiry becomes [`BrokerError::Timeout`].
async fn bounded<T>(
    limit: Duration,
    what: &str,
    call: impl Future<Output = Result<T, BrokerError>>,
) -> Result<T, BrokerError> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(BrokerError::Timeout(format!("{what} after {}ms", limit.as_millis()))),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{MockBrokerage, OrderAck};
    use mockall::predicate::eq;
    use mockall::Sequence;
    use proptest::prelude::*;

    fn endpoint() -> BrokerEndpoint {
        BrokerEndpoint {
            host: "127.0.0.1".into(),
            port: 7497,
            client_id: 0,
            connect_timeout: Duration::from_secs(1),
        }
    }

    fn quick_config() -> SchedulerConfig {
        SchedulerConfig {
            pause_between_orders: Duration::ZERO,
            ack_timeout: Duration::from_millis(100),
            data_timeout: Duration::from_millis(100),
            ..SchedulerConfig::default()
        }
    }

    fn filled(id: &str) -> Result<OrderAck, BrokerError> {
        Ok(OrderAck {
            broker_order_id: id.to_string(),
            state: AckState::Filled,
            fill_price: None,
        })
    }

    #[tokio::test]
    async fn test_buy_sized_by_dollar_amount() {
        let mut broker = MockBrokerage::new();
        broker.expect_name().return_const("mock");
        broker.expect_connect().times(1).returning(|_| Ok(()));
        broker
            .expect_current_price()
            .with(eq("NEM"))
            .returning(|_| Ok(Some(45.20)));
        broker
            .expect_submit_order()
            .withf(|o| o.symbol == "NEM" && o.quantity == 11 && o.order_type == OrderType::Market)
            .times(1)
            .returning(|_| filled("1001"));
        broker.expect_disconnect().times(1).returning(|| Ok(()));

        let mut ctx = AccountContext::new("DU111", endpoint(), broker);
        let result = OrderScheduler::new(quick_config())
            .execute(&[TradeAction::buy("NEM", 500.0)], &mut ctx)
            .await
            .unwrap();

        assert_eq!(result.account_id, "DU111");
        let outcome = &result.outcomes[0];
        assert_eq!(outcome.status, OrderStatus::Filled);
        assert_eq!(outcome.quantity, Some(11));
        assert_eq!(outcome.reference_price, Some(45.20));
        assert_eq!(outcome.broker_order_id.as_deref(), Some("1001"));
    }

    #[tokio::test]
    async fn test_buys_run_before_sells() {
        let mut seq = Sequence::new();
        let mut broker = MockBrokerage::new();
        broker.expect_name().return_const("mock");
        broker.expect_connect().returning(|_| Ok(()));
        broker
            .expect_current_price()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Some(10.0)));
        broker
            .expect_submit_order()
            .withf(|o| o.side == Side::Buy)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| filled("1"));
        broker
            .expect_current_position()
            .with(eq("W"), eq("DU111"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(30));
        broker
            .expect_submit_order()
            .withf(|o| o.side == Side::Sell && o.quantity == 30)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| filled("2"));
        broker.expect_disconnect().returning(|| Ok(()));

        let actions = [TradeAction::close("W"), TradeAction::buy("NEM", 500.0)];
        let mut ctx = AccountContext::new("DU111", endpoint(), broker);
        let result = OrderScheduler::new(quick_config())
            .execute(&actions, &mut ctx)
            .await
            .unwrap();

        let order: Vec<_> = result.outcomes.iter().map(|o| o.action.symbol.as_str()).collect();
        assert_eq!(order, vec!["NEM", "W"]);
    }

    #[tokio::test]
    async fn test_missing_price_and_position_are_skipped() {
        let mut broker = MockBrokerage::new();
        broker.expect_name().return_const("mock");
        broker.expect_connect().returning(|_| Ok(()));
        broker.expect_current_price().returning(|_| Ok(None));
        broker.expect_current_position().returning(|_, _| Ok(0));
        broker.expect_submit_order().never();
        broker.expect_disconnect().times(1).returning(|| Ok(()));

        let actions = [TradeAction::buy("NEM", 500.0), TradeAction::close("W")];
        let mut ctx = AccountContext::new("DU111", endpoint(), broker);
        let result = OrderScheduler::new(quick_config())
            .execute(&actions, &mut ctx)
            .await
            .unwrap();

        assert_eq!(result.outcomes[0].status, OrderStatus::Skipped);
        assert_eq!(result.outcomes[0].error.as_deref(), Some("no price"));
        assert_eq!(result.outcomes[1].status, OrderStatus::Skipped);
        assert_eq!(result.outcomes[1].error.as_deref(), Some("no position"));
    }

    #[tokio::test]
    async fn test_price_above_budget_is_skipped() {
        let mut broker = MockBrokerage::new();
        broker.expect_name().return_const("mock");
        broker.expect_connect().returning(|_| Ok(()));
        broker.expect_current_price().returning(|_| Ok(Some(612.40)));
        broker.expect_submit_order().never();
        broker.expect_disconnect().returning(|| Ok(()));

        let mut ctx = AccountContext::new("DU111", endpoint(), broker);
        let result = OrderScheduler::new(quick_config())
            .execute(&[TradeAction::buy("AVGO", 500.0)], &mut ctx)
            .await
            .unwrap();

        let outcome = &result.outcomes[0];
        assert_eq!(outcome.status, OrderStatus::Skipped);
        assert_eq!(outcome.error.as_deref(), Some("insufficient funds for one share"));
        assert_eq!(outcome.reference_price, Some(612.40));
    }

    #[tokio::test]
    async fn test_rejection_does_not_stop_batch() {
        let mut broker = MockBrokerage::new();
        broker.expect_name().return_const("mock");
        broker.expect_connect().returning(|_| Ok(()));
        broker.expect_current_price().returning(|_| Ok(Some(50.0)));
        broker
            .expect_submit_order()
            .withf(|o| o.symbol == "BAD")
            .returning(|_| Err(BrokerError::Rejected("200: No security definition".into())));
        broker
            .expect_submit_order()
            .withf(|o| o.symbol == "NEM")
            .returning(|_| filled("7"));
        broker.expect_disconnect().times(1).returning(|| Ok(()));

        let actions = [TradeAction::buy("BAD", 500.0), TradeAction::buy("NEM", 500.0)];
        let mut ctx = AccountContext::new("DU111", endpoint(), broker);
        let result = OrderScheduler::new(quick_config())
            .execute(&actions, &mut ctx)
            .await
            .unwrap();

        assert_eq!(result.outcomes[0].status, OrderStatus::Rejected);
        assert_eq!(
            result.outcomes[0].error.as_deref(),
            Some("200: No security definition")
        );
        assert_eq!(result.outcomes[1].status, OrderStatus::Filled);
    }

    #[tokio::test]
    async fn test_connect_failure_is_fatal_and_releases() {
        let mut broker = MockBrokerage::new();
        broker.expect_name().return_const("mock");
        broker
            .expect_connect()
            .returning(|_| Err(BrokerError::Connect("connection refused".into())));
        broker.expect_current_price().never();
        broker.expect_submit_order().never();
        broker.expect_disconnect().times(1).returning(|| Ok(()));

        let mut ctx = AccountContext::new("DU111", endpoint(), broker);
        let err = OrderScheduler::new(quick_config())
            .execute(&[TradeAction::buy("NEM", 500.0)], &mut ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::Connect(_)));
    }

    #[tokio::test]
    async fn test_empty_account_uses_first_managed() {
        let mut broker = MockBrokerage::new();
        broker.expect_name().return_const("mock");
        broker.expect_connect().returning(|_| Ok(()));
        broker
            .expect_managed_accounts()
            .times(1)
            .returning(|| Ok(vec!["DU222".into(), "DU333".into()]));
        broker
            .expect_current_position()
            .with(eq("W"), eq("DU222"))
            .returning(|_, _| Ok(4));
        broker
            .expect_submit_order()
            .withf(|o| o.account == "DU222")
            .returning(|_| filled("9"));
        broker.expect_disconnect().returning(|| Ok(()));

        let mut ctx = AccountContext::new("", endpoint(), broker);
        let result = OrderScheduler::new(quick_config())
            .execute(&[TradeAction::close("W")], &mut ctx)
            .await
            .unwrap();
        assert_eq!(result.account_id, "DU222");
        assert_eq!(result.outcomes[0].quantity, Some(4));
    }

    #[tokio::test]
    async fn test_limit_sell_without_price_is_skipped() {
        let mut broker = MockBrokerage::new();
        broker.expect_name().return_const("mock");
        broker.expect_connect().returning(|_| Ok(()));
        broker.expect_current_position().returning(|_, _| Ok(10));
        broker.expect_current_price().returning(|_| Ok(None));
        broker.expect_submit_order().never();
        broker.expect_disconnect().returning(|| Ok(()));

        let config = SchedulerConfig {
            order_kind: OrderKind::Limit { tolerance_pct: 0.5 },
            ..quick_config()
        };
        let mut ctx = AccountContext::new("DU111", endpoint(), broker);
        let result = OrderScheduler::new(config)
            .execute(&[TradeAction::close("W")], &mut ctx)
            .await
            .unwrap();
        assert_eq!(result.outcomes[0].status, OrderStatus::Skipped);
        assert_eq!(result.outcomes[0].error.as_deref(), Some("no price"));
    }

    #[tokio::test]
    async fn test_limit_buy_price() {
        let mut broker = MockBrokerage::new();
        broker.expect_name().return_const("mock");
        broker.expect_connect().returning(|_| Ok(()));
        broker.expect_current_price().returning(|_| Ok(Some(45.20)));
        broker
            .expect_submit_order()
            .withf(|o| o.order_type == OrderType::Limit(45.43) && o.quantity == 11)
            .times(1)
            .returning(|_| {
                Ok(OrderAck {
                    broker_order_id: "12".into(),
                    state: AckState::Submitted,
                    fill_price: None,
                })
            });
        broker.expect_disconnect().returning(|| Ok(()));

        let config = SchedulerConfig {
            order_kind: OrderKind::Limit { tolerance_pct: 0.5 },
            ..quick_config()
        };
        let mut ctx = AccountContext::new("DU111", endpoint(), broker);
        let result = OrderScheduler::new(config)
            .execute(&[TradeAction::buy("NEM", 500.0)], &mut ctx)
            .await
            .unwrap();
        assert_eq!(result.outcomes[0].status, OrderStatus::Submitted);
    }

    #[tokio::test]
    async fn test_position_failure_is_skipped() {
        let mut broker = MockBrokerage::new();
        broker.expect_name().return_const("mock");
        broker.expect_connect().returning(|_| Ok(()));
        broker
            .expect_current_position()
            .returning(|_, _| Err(BrokerError::Timeout("positions".into())));
        broker.expect_submit_order().never();
        broker.expect_disconnect().times(1).returning(|| Ok(()));

        let mut ctx = AccountContext::new("DU111", endpoint(), broker);
        let result = OrderScheduler::new(quick_config())
            .execute(&[TradeAction::close("W")], &mut ctx)
            .await
            .unwrap();

        let outcome = &result.outcomes[0];
        assert_eq!(outcome.status, OrderStatus::Skipped);
        assert!(!outcome.is_placed());
        assert!(outcome
            .error
            .as_deref()
            .unwrap()
            .starts_with("position query failed"));
    }

    #[tokio::test]
    async fn test_fill_price_reaches_outcome() {
        let mut broker = MockBrokerage::new();
        broker.expect_name().return_const("mock");
        broker.expect_connect().returning(|_| Ok(()));
        broker.expect_current_price().returning(|_| Ok(Some(45.20)));
        broker.expect_submit_order().returning(|_| {
            Ok(OrderAck {
                broker_order_id: "1001".into(),
                state: AckState::Filled,
                fill_price: Some(45.31),
            })
        });
        broker.expect_disconnect().returning(|| Ok(()));

        let mut ctx = AccountContext::new("DU111", endpoint(), broker);
        let result = OrderScheduler::new(quick_config())
            .execute(&[TradeAction::buy("NEM", 500.0)], &mut ctx)
            .await
            .unwrap();

        let outcome = &result.outcomes[0];
        assert_eq!(outcome.reference_price, Some(45.20));
        assert_eq!(outcome.fill_price, Some(45.31));
    }

    /// Terminal with fixed quotes and holdings that logs every call.
    struct RecordingBroker {
        calls: Vec<(String, Side)>,
    }

    const QUOTES: &[(&str, Option<f64>, i64)] = &[
        ("NEM", Some(45.20), 0),
        ("CAT", Some(341.10), 7),
        ("W", Some(51.02), 30),
        ("AVGO", Some(612.40), 2),
        ("BAD", Some(20.0), 5),
        ("GONE", None, 0),
    ];

    fn quote(symbol: &str) -> (Option<f64>, i64) {
        QUOTES
            .iter()
            .find(|(s, _, _)| *s == symbol)
            .map_or((None, 0), |(_, price, held)| (*price, *held))
    }

    #[async_trait::async_trait]
    impl Brokerage for RecordingBroker {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn connect(&mut self, _endpoint: &BrokerEndpoint) -> Result<(), BrokerError> {
            Ok(())
        }

        async fn managed_accounts(&mut self) -> Result<Vec<String>, BrokerError> {
            Ok(vec!["DU111".into()])
        }

        async fn current_price(&mut self, symbol: &str) -> Result<Option<f64>, BrokerError> {
            self.calls.push((format!("price {symbol}"), Side::Buy));
            Ok(quote(symbol).0)
        }

        async fn current_position(&mut self, symbol: &str, _account: &str) -> Result<i64, BrokerError> {
            self.calls.push((format!("position {symbol}"), Side::Sell));
            Ok(quote(symbol).1)
        }

        async fn submit_order(&mut self, order: &OrderRequest) -> Result<OrderAck, BrokerError> {
            self.calls.push((format!("submit {}", order.symbol), order.side));
            if order.symbol == "BAD" {
                return Err(BrokerError::Rejected("201: Order rejected".into()));
            }
            filled(&self.calls.len().to_string())
        }

        async fn disconnect(&mut self) -> Result<(), BrokerError> {
            Ok(())
        }
    }

    fn action_strategy() -> impl Strategy<Value = TradeAction> {
        (proptest::bool::ANY, 0..QUOTES.len()).prop_map(|(buy, i)| {
            let symbol = QUOTES[i].0;
            if buy {
                TradeAction::buy(symbol, 500.0)
            } else {
                TradeAction::close(symbol)
            }
        })
    }

    proptest! {
        #[test]
        fn prop_no_buy_work_after_first_sell(actions in proptest::collection::vec(action_strategy(), 0..12)) {
            let broker = RecordingBroker { calls: Vec::new() };
            let mut ctx = AccountContext::new("DU111", endpoint(), broker);
            let mut scheduler = OrderScheduler::new(quick_config());
            let result = tokio_test::block_on(scheduler.execute(&actions, &mut ctx)).unwrap();

            // Every broker call made for a BUY precedes every call made for a SELL.
            let sides: Vec<Side> = ctx.broker.calls.iter().map(|(_, side)| *side).collect();
            if let Some(first_sell) = sides.iter().position(|s| *s == Side::Sell) {
                prop_assert!(sides[first_sell..].iter().all(|s| *s == Side::Sell), "calls: {:?}", ctx.broker.calls);
            }

            // One outcome per action: BUYs in input order, then SELLs in input order.
            let expected: Vec<(Side, &str)> = actions
                .iter()
                .filter(|a| a.side == Side::Buy)
                .chain(actions.iter().filter(|a| a.side == Side::Sell))
                .map(|a| (a.side, a.symbol.as_str()))
                .collect();
            let got: Vec<(Side, &str)> = result
                .outcomes
                .iter()
                .map(|o| (o.action.side, o.action.symbol.as_str()))
                .collect();
            prop_assert_eq!(got, expected);
        }
    }

    #[test]
    fn test_config_from_app_config() {
        let mut config = Config::default();
        config.trading.order_type = OrderTypeSetting::Limit;
        config.trading.limit_tolerance_pct = 1.0;
        config.trading.dollar_amount = 750.0;
        config.trading.order_pause_ms = 0;

        let scheduler = SchedulerConfig::from(&config);
        assert_eq!(scheduler.order_kind, OrderKind::Limit { tolerance_pct: 1.0 });
        assert_eq!(scheduler.dollar_amount, 750.0);
        assert!(scheduler.pause_between_orders.is_zero());
    }
}
