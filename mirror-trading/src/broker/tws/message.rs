//! TWS API messages used by the adapter.
//!
//! Outgoing layouts are written for server version 151, the minimum the
//! adapter negotiates.

use super::codec::{FieldReader, FieldWriter};
use crate::execution::Side;

/// Lowest server version whose message layouts this module encodes.
pub const MIN_SERVER_VERSION: i32 = 151;
/// Highest client version announced in the handshake.
pub const MAX_CLIENT_VERSION: i32 = 151;

mod out {
    pub const REQ_MKT_DATA: i32 = 1;
    pub const CANCEL_MKT_DATA: i32 = 2;
    pub const PLACE_ORDER: i32 = 3;
    pub const REQ_MANAGED_ACCTS: i32 = 17;
    pub const REQ_MARKET_DATA_TYPE: i32 = 59;
    pub const REQ_POSITIONS: i32 = 61;
    pub const CANCEL_POSITIONS: i32 = 64;
    pub const START_API: i32 = 71;
}

mod inc {
    pub const TICK_PRICE: i64 = 1;
    pub const ORDER_STATUS: i64 = 3;
    pub const ERR_MSG: i64 = 4;
    pub const OPEN_ORDER: i64 = 5;
    pub const NEXT_VALID_ID: i64 = 9;
    pub const MANAGED_ACCTS: i64 = 15;
    pub const TICK_SNAPSHOT_END: i64 = 57;
    pub const MARKET_DATA_TYPE: i64 = 58;
    pub const POSITION_DATA: i64 = 61;
    pub const POSITION_END: i64 = 62;
}

/// Tick types carrying a usable reference price, best first.
const PRICE_TICKS: &[i64] = &[
    4,  // last
    68, // delayed last
    9,  // close
    75, // delayed close
];

/// Preference rank of a price tick; lower is better.
pub fn price_tick_rank(tick_type: i64) -> Option<usize> {
    PRICE_TICKS.iter().position(|t| *t == tick_type)
}

/// Error codes that are notices rather than failures.
pub fn is_informational(code: i64) -> bool {
    (2100..2200).contains(&code) || matches!(code, 399 | 10167 | 10168)
}

/// Error codes that mean the session itself is unusable.
pub fn is_connection_fatal(code: i64) -> bool {
    matches!(code, 326 | 502 | 503 | 504 | 507 | 1100)
}

/// US stock routed through SMART.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockContract {
    /// Symbol in the terminal's format (`BRK B`)
    pub symbol: String,
    pub exchange: String,
    pub currency: String,
}

impl StockContract {
    pub fn smart_usd(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            exchange: "SMART".into(),
            currency: "USD".into(),
        }
    }

    fn write(&self, w: &mut FieldWriter) {
        w.push(0) // conId
            .push(&self.symbol)
            .push("STK")
            .push_empty() // lastTradeDateOrContractMonth
            .push(0) // strike
            .push_empty() // right
            .push_empty() // multiplier
            .push(&self.exchange)
            .push_empty() // primaryExchange
            .push(&self.currency)
            .push_empty() // localSymbol
            .push_empty(); // tradingClass
    }
}

/// Order fields the adapter sets; everything else is sent as the API default.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSpec {
    pub side: Side,
    pub quantity: u64,
    pub limit_price: Option<f64>,
    pub account: String,
}

// ============================================================================
// Outgoing
// ============================================================================

pub fn start_api(client_id: i32) -> Vec<u8> {
    FieldWriter::new()
        .push(out::START_API)
        .push(2)
        .push(client_id)
        .push_empty() // optionalCapabilities
        .finish()
}

pub fn req_managed_accounts() -> Vec<u8> {
    FieldWriter::new()
        .push(out::REQ_MANAGED_ACCTS)
        .push(1)
        .finish()
}

pub fn req_market_data_type(data_type: i32) -> Vec<u8> {
    FieldWriter::new()
        .push(out::REQ_MARKET_DATA_TYPE)
        .push(1)
        .push(data_type)
        .finish()
}

/// One-off snapshot request.
pub fn req_mkt_data_snapshot(req_id: i64, contract: &StockContract) -> Vec<u8> {
    let mut w = FieldWriter::new();
    w.push(out::REQ_MKT_DATA).push(11).push(req_id);
    contract.write(&mut w);
    w.push_bool(false) // deltaNeutralContract
        .push_empty() // genericTickList
        .push_bool(true) // snapshot
        .push_bool(false) // regulatorySnapshot
        .push_empty(); // mktDataOptions
    w.finish()
}

pub fn cancel_mkt_data(req_id: i64) -> Vec<u8> {
    FieldWriter::new()
        .push(out::CANCEL_MKT_DATA)
        .push(2)
        .push(req_id)
        .finish()
}

pub fn req_positions() -> Vec<u8> {
    FieldWriter::new().push(out::REQ_POSITIONS).push(1).finish()
}

pub fn cancel_positions() -> Vec<u8> {
    FieldWriter::new()
        .push(out::CANCEL_POSITIONS)
        .push(1)
        .finish()
}

/// `placeOrder` for a plain DAY stock order.
pub fn place_order(order_id: i64, contract: &StockContract, order: &OrderSpec) -> Vec<u8> {
    let mut w = FieldWriter::new();
    w.push(out::PLACE_ORDER).push(order_id);
    contract.write(&mut w);
    w.push_empty() // secIdType
        .push_empty(); // secId

    let (order_type, limit_price) = match order.limit_price {
        Some(price) => ("LMT", Some(price)),
        None => ("MKT", None),
    };
    w.push(order.side.as_str())
        .push(order.quantity)
        .push(order_type)
        .push_opt(limit_price)
        .push_empty() // auxPrice
        .push("DAY")
        .push_empty() // ocaGroup
        .push(&order.account)
        .push_empty() // openClose
        .push(0) // origin: customer
        .push_empty() // orderRef
        .push_bool(true) // transmit
        .push(0) // parentId
        .push_bool(false) // blockOrder
        .push_bool(false) // sweepToFill
        .push(0) // displaySize
        .push(0) // triggerMethod
        .push_bool(false) // outsideRth
        .push_bool(false); // hidden

    w.push_empty() // sharesAllocation
        .push(0) // discretionaryAmt
        .push_empty() // goodAfterTime
        .push_empty() // goodTillDate
        .push_empty() // faGroup
        .push_empty() // faMethod
        .push_empty() // faPercentage
        .push_empty() // faProfile
        .push_empty() // modelCode
        .push(0) // shortSaleSlot
        .push_empty() // designatedLocation
        .push(-1) // exemptCode
        .push(0) // ocaType
        .push_empty() // rule80A
        .push_empty() // settlingFirm
        .push_bool(false) // allOrNone
        .push_empty() // minQty
        .push_empty() // percentOffset
        .push_bool(false) // eTradeOnly
        .push_bool(false) // firmQuoteOnly
        .push_empty() // nbboPriceCap
        .push(0) // auctionStrategy
        .push_empty() // startingPrice
        .push_empty() // stockRefPrice
        .push_empty() // delta
        .push_empty() // stockRangeLower
        .push_empty() // stockRangeUpper
        .push_bool(false) // overridePercentageConstraints
        .push_empty() // volatility
        .push_empty() // volatilityType
        .push_empty() // deltaNeutralOrderType
        .push_empty() // deltaNeutralAuxPrice
        .push_bool(false) // continuousUpdate
        .push_empty() // referencePriceType
        .push_empty() // trailStopPrice
        .push_empty() // trailingPercent
        .push_empty() // scaleInitLevelSize
        .push_empty() // scaleSubsLevelSize
        .push_empty() // scalePriceIncrement
        .push_empty() // scaleTable
        .push_empty() // activeStartTime
        .push_empty() // activeStopTime
        .push_empty() // hedgeType
        .push_bool(false) // optOutSmartRouting
        .push_empty() // clearingAccount
        .push_empty() // clearingIntent
        .push_bool(false) // notHeld
        .push_bool(false) // deltaNeutralContract present
        .push_empty() // algoStrategy
        .push_empty() // algoId
        .push_bool(false) // whatIf
        .push_empty() // orderMiscOptions
        .push_bool(false) // solicited
        .push_bool(false) // randomizeSize
        .push_bool(false) // randomizePrice
        .push(0) // conditions count
        .push_empty() // adjustedOrderType
        .push_unset_double() // triggerPrice
        .push_unset_double() // lmtPriceOffset
        .push_unset_double() // adjustedStopPrice
        .push_unset_double() // adjustedStopLimitPrice
        .push_unset_double() // adjustedTrailingAmount
        .push(0) // adjustableTrailingUnit
        .push_empty() // extOperator
        .push_empty() // softDollarTier name
        .push_empty() // softDollarTier value
        .push_unset_double() // cashQty
        .push_empty() // mifid2DecisionMaker
        .push_empty() // mifid2DecisionAlgo
        .push_empty() // mifid2ExecutionTrader
        .push_empty() // mifid2ExecutionAlgo
        .push_bool(false) // dontUseAutoPriceForHedge
        .push_bool(false) // isOmsContainer
        .push_bool(false) // discretionaryUpToLimitPrice
        .push_empty(); // usePriceMgmtAlgo
    w.finish()
}

// ============================================================================
// Incoming
// ============================================================================

/// Messages the adapter reacts to. Everything else is `Other`.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    NextValidId(i64),
    ManagedAccounts(Vec<String>),
    TickPrice {
        req_id: i64,
        tick_type: i64,
        price: f64,
    },
    TickSnapshotEnd(i64),
    MarketDataType {
        req_id: i64,
        data_type: i64,
    },
    Position {
        account: String,
        symbol: String,
        sec_type: String,
        quantity: f64,
    },
    PositionEnd,
    OrderStatus {
        order_id: i64,
        status: String,
        filled: f64,
        avg_fill_price: f64,
    },
    OpenOrder {
        order_id: i64,
    },
    Error {
        id: i64,
        code: i64,
        message: String,
    },
    Other(i64),
}

impl Incoming {
    /// Decode a split frame. `server_version` gates the `orderStatus` layout.
    pub fn parse(fields: &[String], server_version: i32) -> Result<Self, String> {
        let mut r = FieldReader::new(fields);
        let msg_id = r.next_i64()?;

        let msg = match msg_id {
            inc::NEXT_VALID_ID => {
                r.skip(1)?;
                Incoming::NextValidId(r.next_i64()?)
            }
            inc::MANAGED_ACCTS => {
                r.skip(1)?;
                let accounts = r
                    .next_str()?
                    .split(',')
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .map(String::from)
                    .collect();
                Incoming::ManagedAccounts(accounts)
            }
            inc::TICK_PRICE => {
                r.skip(1)?;
                Incoming::TickPrice {
                    req_id: r.next_i64()?,
                    tick_type: r.next_i64()?,
                    price: r.next_f64()?,
                }
            }
            inc::TICK_SNAPSHOT_END => {
                r.skip(1)?;
                Incoming::TickSnapshotEnd(r.next_i64()?)
            }
            inc::MARKET_DATA_TYPE => {
                r.skip(1)?;
                Incoming::MarketDataType {
                    req_id: r.next_i64()?,
                    data_type: r.next_i64()?,
                }
            }
            inc::POSITION_DATA => {
                let version = r.next_i64()?;
                let account = r.next_str()?.to_string();
                r.skip(1)?; // conId
                let symbol = r.next_str()?.to_string();
                let sec_type = r.next_str()?.to_string();
                // lastTradeDate, strike, right, multiplier, exchange, currency, localSymbol
                r.skip(7)?;
                if version >= 2 {
                    r.skip(1)?; // tradingClass
                }
                let quantity = r.next_f64()?;
                Incoming::Position {
                    account,
                    symbol,
                    sec_type,
                    quantity,
                }
            }
            inc::POSITION_END => Incoming::PositionEnd,
            inc::ORDER_STATUS => {
                if server_version < 131 {
                    r.skip(1)?; // version
                }
                Incoming::OrderStatus {
                    order_id: r.next_i64()?,
                    status: r.next_str()?.to_string(),
                    filled: r.next_f64()?,
                    avg_fill_price: {
                        r.skip(1)?; // remaining
                        r.next_f64()?
                    },
                }
            }
            inc::OPEN_ORDER => Incoming::OpenOrder {
                order_id: r.next_i64()?,
            },
            inc::ERR_MSG => {
                r.skip(1)?;
                Incoming::Error {
                    id: r.next_i64()?,
                    code: r.next_i64()?,
                    message: r.next_str()?.to_string(),
                }
            }
            other => Incoming::Other(other),
        };
        Ok(msg)
    }
}
