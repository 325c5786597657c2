//! mirror-trading - mirrors a scraped model portfolio into a brokerage account.
//!
//! Records from `mirror-scraper` flow through [`MovementFilter`] and
//! [`ActionConverter`] into an action list, which [`OrderScheduler`] executes
//! against a [`Brokerage`] (BUYs first). [`TradeReporter`] turns the outcomes
//! into a [`TradeReport`].

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod broker;
pub mod convert;
pub mod error;
pub mod execution;
pub mod filter;
pub mod pipeline;
pub mod report;

pub use broker::{
    AckState, BrokerEndpoint, BrokerError, Brokerage, OrderAck, OrderRequest, OrderType, TwsBroker,
};
pub use convert::{ActionConverter, Conversion, ConverterConfig};
pub use error::PipelineError;
pub use execution::{
    AccountContext, BatchResult, InsufficientData, OrderKind, OrderOutcome, OrderScheduler,
    OrderStatus, OutcomeJournal, SchedulerConfig, Side, Sizing, TradeAction,
};
pub use filter::{target_friday, FilterMode, MovementFilter};
pub use pipeline::{Plan, RunOptions};
pub use report::{ReportContext, ReportEntry, ReportSummary, ReportWriter, TradeReport, TradeReporter};
