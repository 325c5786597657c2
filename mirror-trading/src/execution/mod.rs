//! Order sizing and execution against a brokerage connection.

mod journal;
mod order;
mod scheduler;

pub use journal::OutcomeJournal;
pub use order::{
    InsufficientData, OrderKind, OrderOutcome, OrderStatus, Side, Sizing, TradeAction,
};
pub use scheduler::{AccountContext, BatchResult, OrderScheduler, SchedulerConfig};
