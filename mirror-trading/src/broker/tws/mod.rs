//! Interactive Brokers TWS / IB Gateway adapter.
//!
//! # Prerequisites
//!
//! 1. Run TWS or IB Gateway and log in (paper account recommended)
//! 2. Enable "ActiveX and Socket Clients" in the API settings
//! 3. Default ports: 7497 (TWS paper), 7496 (TWS live), 4002/4001 (Gateway)
//!
//! # Protocol
//!
//! A plain TCP socket carrying length-prefixed, NUL-separated text fields
//! (see [`codec`]). After the handshake a reader task decodes every inbound
//! frame into an [`Incoming`] and forwards it over a channel, so request
//! methods can wait on the channel with a deadline without tearing a frame.

mod codec;
mod message;

use super::{AckState, BrokerEndpoint, BrokerError, Brokerage, OrderAck, OrderRequest};
use async_trait::async_trait;
use message::{
    is_connection_fatal, is_informational, price_tick_rank, Incoming, OrderSpec, StockContract,
    MAX_CLIENT_VERSION, MIN_SERVER_VERSION,
};
use mirror_common::BrokerConfig;
use mirror_scraper::{broker_symbol, normalize_symbol};
use std::ops::ControlFlow;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// First market-data request id. Order ids start at the terminal's
/// nextValidId (often 1), so request ids live far above them and an error
/// for a stale request can never be read as an order rejection.
const REQUEST_ID_BASE: i64 = 1_000_000_000;

/// One live socket session.
struct Connection {
    writer: OwnedWriteHalf,
    inbox: mpsc::UnboundedReceiver<Incoming>,
    reader: JoinHandle<()>,
    server_version: i32,
}

impl Connection {
    async fn send(&mut self, frame: &[u8]) -> Result<(), BrokerError> {
        self.writer.write_all(frame).await?;
        Ok(())
    }

    /// Feed inbound messages to `handle` until it breaks or `timeout` passes.
    async fn wait_for<T, F>(
        &mut self,
        what: &str,
        timeout: Duration,
        mut handle: F,
    ) -> Result<T, BrokerError>
    where
        F: FnMut(Incoming) -> ControlFlow<Result<T, BrokerError>>,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let msg = match tokio::time::timeout_at(deadline, self.inbox.recv()).await {
                Ok(Some(msg)) => msg,
                Ok(None) => {
                    return Err(BrokerError::Protocol(format!(
                        "connection closed while waiting for {what}"
                    )))
                }
                Err(_) => return Err(BrokerError::Timeout(what.to_string())),
            };
            if let ControlFlow::Break(result) = handle(msg) {
                return result;
            }
        }
    }

    /// Drop messages left over from earlier requests.
    fn discard_pending(&mut self) -> usize {
        let mut dropped = 0;
        while let Ok(msg) = self.inbox.try_recv() {
            tracing::debug!(?msg, "Discarding stale terminal message");
            dropped += 1;
        }
        dropped
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_loop(
    mut reader: OwnedReadHalf,
    server_version: i32,
    tx: mpsc::UnboundedSender<Incoming>,
) {
    loop {
        let payload = match codec::read_frame(&mut reader).await {
            Ok(payload) => payload,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                tracing::debug!("Terminal closed the connection");
                break;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Terminal read failed");
                break;
            }
        };

        let fields = codec::split_fields(&payload);
        match Incoming::parse(&fields, server_version) {
            Ok(Incoming::Error { id, code, message }) if is_informational(code) => {
                tracing::debug!(id, code, message = %message, "Terminal notice");
            }
            Ok(msg) => {
                if tx.send(msg).is_err() {
                    break;
                }
            }
            Err(e) => tracing::warn!(error = %e, "Undecodable terminal message"),
        }
    }
}

/// TWS socket API broker.
pub struct TwsBroker {
    market_data_type: i32,
    request_timeout: Duration,
    conn: Option<Connection>,
    accounts: Vec<String>,
    next_order_id: i64,
    next_request_id: i64,
    market_data_type_sent: bool,
}

impl TwsBroker {
    pub fn new(config: &BrokerConfig) -> Self {
        Self {
            market_data_type: config.market_data_type,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            conn: None,
            accounts: Vec::new(),
            next_order_id: 0,
            next_request_id: REQUEST_ID_BASE,
            market_data_type_sent: false,
        }
    }

    /// Upper bound for any single request/response exchange.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    pub fn server_version(&self) -> Option<i32> {
        self.conn.as_ref().map(|c| c.server_version)
    }

    fn connection(&mut self) -> Result<&mut Connection, BrokerError> {
        self.conn.as_mut().ok_or(BrokerError::NotConnected)
    }

    fn request_id(&mut self) -> i64 {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }

    async fn open(endpoint: &BrokerEndpoint) -> Result<(Connection, Vec<String>, i64), BrokerError> {
        let addr = format!("{}:{}", endpoint.host, endpoint.port);
        let mut stream =
            match tokio::time::timeout(endpoint.connect_timeout, TcpStream::connect(&addr)).await {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => return Err(BrokerError::Connect(format!("{addr}: {e}"))),
                Err(_) => {
                    return Err(BrokerError::Connect(format!(
                        "{addr}: no answer within {}s",
                        endpoint.connect_timeout.as_secs()
                    )))
                }
            };
        stream.set_nodelay(true)?;

        stream
            .write_all(&codec::handshake(MIN_SERVER_VERSION, MAX_CLIENT_VERSION))
            .await?;
        let reply = tokio::time::timeout(endpoint.connect_timeout, codec::read_frame(&mut stream))
            .await
            .map_err(|_| BrokerError::Connect(format!("{addr}: no handshake reply")))?
            .map_err(|e| BrokerError::Connect(format!("{addr}: handshake failed: {e}")))?;

        let fields = codec::split_fields(&reply);
        let server_version: i32 = fields
            .first()
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| BrokerError::Protocol(format!("bad handshake reply: {fields:?}")))?;
        if server_version < MIN_SERVER_VERSION {
            return Err(BrokerError::Connect(format!(
                "server version {server_version} is older than the supported minimum {MIN_SERVER_VERSION}"
            )));
        }

        let (read_half, write_half) = stream.into_split();
        let (tx, inbox) = mpsc::unbounded_channel();
        let reader = tokio::spawn(read_loop(read_half, server_version, tx));
        let mut conn = Connection {
            writer: write_half,
            inbox,
            reader,
            server_version,
        };

        conn.send(&message::start_api(endpoint.client_id)).await?;

        let mut accounts = Vec::new();
        let next_order_id = conn
            .wait_for("nextValidId", endpoint.connect_timeout, |msg| match msg {
                Incoming::ManagedAccounts(list) => {
                    accounts = list;
                    ControlFlow::Continue(())
                }
                Incoming::NextValidId(id) => ControlFlow::Break(Ok(id)),
                Incoming::Error { code, message, .. } if is_connection_fatal(code) => {
                    ControlFlow::Break(Err(BrokerError::Connect(format!("{code}: {message}"))))
                }
                _ => ControlFlow::Continue(()),
            })
            .await
            .map_err(|e| match e {
                BrokerError::Connect(_) => e,
                other => BrokerError::Connect(other.to_string()),
            })?;

        Ok((conn, accounts, next_order_id))
    }
}

#[async_trait]
impl Brokerage for TwsBroker {
    fn name(&self) -> &'static str {
        "tws"
    }

    async fn connect(&mut self, endpoint: &BrokerEndpoint) -> Result<(), BrokerError> {
        if self.conn.is_some() {
            self.disconnect().await?;
        }

        let (conn, accounts, next_order_id) = Self::open(endpoint).await?;
        tracing::info!(
            endpoint = %endpoint,
            server_version = conn.server_version,
            accounts = accounts.len(),
            next_order_id,
            "Connected to terminal"
        );

        self.conn = Some(conn);
        self.accounts = accounts;
        self.next_order_id = next_order_id;
        Ok(())
    }

    async fn managed_accounts(&mut self) -> Result<Vec<String>, BrokerError> {
        if self.conn.is_none() {
            return Err(BrokerError::NotConnected);
        }
        if !self.accounts.is_empty() {
            return Ok(self.accounts.clone());
        }

        let timeout = self.request_timeout;
        let conn = self.connection()?;
        conn.send(&message::req_managed_accounts()).await?;
        let accounts = conn
            .wait_for("managed accounts", timeout, |msg| match msg {
                Incoming::ManagedAccounts(list) => ControlFlow::Break(Ok(list)),
                _ => ControlFlow::Continue(()),
            })
            .await?;
        self.accounts = accounts.clone();
        Ok(accounts)
    }

    async fn current_price(&mut self, symbol: &str) -> Result<Option<f64>, BrokerError> {
        let timeout = self.request_timeout;
        let data_type = (!self.market_data_type_sent).then_some(self.market_data_type);
        let req_id = self.request_id();
        let contract = StockContract::smart_usd(broker_symbol(symbol));

        let conn = self.connection()?;
        if let Some(data_type) = data_type {
            conn.send(&message::req_market_data_type(data_type)).await?;
        }
        conn.send(&message::req_mkt_data_snapshot(req_id, &contract))
            .await?;

        let mut best: Option<(usize, f64)> = None;
        let mut ended = false;
        let result = conn
            .wait_for("market data snapshot", timeout, |msg| match msg {
                Incoming::TickPrice {
                    req_id: id,
                    tick_type,
                    price,
                } if id == req_id => {
                    if let Some(rank) = price_tick_rank(tick_type).filter(|_| price > 0.0) {
                        if best.map_or(true, |(current, _)| rank < current) {
                            best = Some((rank, price));
                        }
                        if rank == 0 {
                            return ControlFlow::Break(Ok(()));
                        }
                    }
                    ControlFlow::Continue(())
                }
                Incoming::TickSnapshotEnd(id) if id == req_id => {
                    ended = true;
                    ControlFlow::Break(Ok(()))
                }
                Incoming::Error { id, code, message } if id == req_id => {
                    ended = true;
                    ControlFlow::Break(Err(BrokerError::Api { code, message }))
                }
                _ => ControlFlow::Continue(()),
            })
            .await;

        // A finished snapshot is already closed on the terminal side.
        if !ended {
            if let Err(e) = conn.send(&message::cancel_mkt_data(req_id)).await {
                tracing::debug!(error = %e, req_id, "Cancel market data failed");
            }
        }
        self.market_data_type_sent = true;

        match result {
            Ok(()) => {}
            Err(BrokerError::Timeout(_)) => {
                tracing::warn!(symbol, received = best.is_some(), "Snapshot incomplete at deadline");
            }
            Err(e) => return Err(e),
        }
        Ok(best.map(|(_, price)| price))
    }

    async fn current_position(&mut self, symbol: &str, account: &str) -> Result<i64, BrokerError> {
        let timeout = self.request_timeout;
        let wanted = normalize_symbol(symbol).unwrap_or_else(|| symbol.to_uppercase());
        let conn = self.connection()?;

        conn.send(&message::req_positions()).await?;
        let mut total = 0.0;
        let result = conn
            .wait_for("positions", timeout, |msg| match msg {
                Incoming::Position {
                    account: held_in,
                    symbol: held,
                    sec_type,
                    quantity,
                } => {
                    let same_symbol = normalize_symbol(&held).as_deref() == Some(wanted.as_str());
                    if sec_type == "STK" && same_symbol && (account.is_empty() || held_in == account)
                    {
                        total += quantity;
                    }
                    ControlFlow::Continue(())
                }
                Incoming::PositionEnd => ControlFlow::Break(Ok(())),
                _ => ControlFlow::Continue(()),
            })
            .await;

        if let Err(e) = conn.send(&message::cancel_positions()).await {
            tracing::debug!(error = %e, "Cancel positions failed");
        }
        result?;

        let shares = f64::trunc(total) as i64;
        tracing::debug!(symbol = %wanted, account, shares, "Position");
        Ok(shares)
    }

    async fn submit_order(&mut self, order: &OrderRequest) -> Result<OrderAck, BrokerError> {
        let timeout = self.request_timeout;
        let order_id = self.next_order_id;
        self.next_order_id += 1;

        let contract = StockContract::smart_usd(broker_symbol(&order.symbol));
        let spec = OrderSpec {
            side: order.side,
            quantity: order.quantity,
            limit_price: order.order_type.limit_price(),
            account: order.account.clone(),
        };

        let conn = self.connection()?;
        let stale = conn.discard_pending();
        if stale > 0 {
            tracing::debug!(stale, order_id, "Dropped stale messages before placeOrder");
        }
        conn.send(&message::place_order(order_id, &contract, &spec))
            .await?;
        tracing::debug!(order_id, symbol = %order.symbol, side = %order.side, "placeOrder sent");

        conn.wait_for("order acknowledgement", timeout, |msg| match msg {
            Incoming::OrderStatus {
                order_id: id,
                status,
                avg_fill_price,
                ..
            } if id == order_id => match status.as_str() {
                "PendingSubmit" | "ApiPending" => ControlFlow::Continue(()),
                "Filled" => ControlFlow::Break(Ok(OrderAck {
                    broker_order_id: order_id.to_string(),
                    state: AckState::Filled,
                    fill_price: (avg_fill_price > 0.0).then_some(avg_fill_price),
                })),
                "Cancelled" | "ApiCancelled" | "Inactive" => {
                    ControlFlow::Break(Err(BrokerError::Rejected(format!("order {status}"))))
                }
                _ => ControlFlow::Break(Ok(OrderAck {
                    broker_order_id: order_id.to_string(),
                    state: AckState::Submitted,
                    fill_price: None,
                })),
            },
            Incoming::Error { id, code, message } if id == order_id => {
                ControlFlow::Break(Err(BrokerError::Rejected(format!("{code}: {message}"))))
            }
            _ => ControlFlow::Continue(()),
        })
        .await
    }

    async fn disconnect(&mut self) -> Result<(), BrokerError> {
        if let Some(mut conn) = self.conn.take() {
            if let Err(e) = conn.writer.shutdown().await {
                tracing::debug!(error = %e, "Socket shutdown failed");
            }
            tracing::info!("Disconnected from terminal");
        }
        self.accounts.clear();
        self.market_data_type_sent = false;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
