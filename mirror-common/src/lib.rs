//! Mirror Common - shared configuration, logging and errors for quant-mirror.
//!
//! This crate provides:
//! - Configuration types and loading
//! - Error types
//! - Logging setup

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;

pub use config::{
    BrokerConfig, Config, ObservabilityConfig, OrderTypeSetting, ReportsConfig, ScraperConfig,
    TradingConfig,
};
pub use error::{Error, Result};
pub use logging::{init_logging, LogFormat};
