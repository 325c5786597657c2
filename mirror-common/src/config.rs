//! Configuration management for quant-mirror.
//!
//! The pipeline reads a single configuration file at `~/.quantmirror/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (`QM_*` prefix, `.env` file honoured)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `QM_IBKR_HOST` → broker.host
//! - `QM_IBKR_PORT` → broker.port
//! - `QM_IBKR_CLIENT_ID` → broker.client_id
//! - `QM_IBKR_ACCOUNT` → broker.account
//! - `QM_TRADE_AMOUNT` → trading.dollar_amount
//! - `QM_PROFILE_DIR` → scraper.profile_dir
//! - `QM_REPORTS_DIR` → reports.dir
//! - `QM_LOG_LEVEL` → observability.log_level
//! - `QM_LOG_FORMAT` → observability.log_format
//! - `QM_LOG_FILE` → observability.log_file

use crate::error::Error;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".quantmirror"),
        |dirs| dirs.home_dir().join(".quantmirror"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Brokerage
// ============================================================================

/// Trading terminal connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Terminal host
    #[serde(default = "default_broker_host")]
    pub host: String,

    /// Terminal API port (7497 paper, 7496 live)
    #[serde(default = "default_broker_port")]
    pub port: u16,

    /// API client id; must be unique per connected process
    #[serde(default)]
    pub client_id: i32,

    /// Account identifier; empty selects the terminal's primary account
    #[serde(default)]
    pub account: String,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Market data type requested before price snapshots
    /// (1 live, 2 frozen, 3 delayed, 4 delayed-frozen)
    #[serde(default = "default_market_data_type")]
    pub market_data_type: i32,

    /// Upper bound for one request/response exchange with the terminal
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_broker_host() -> String {
    "127.0.0.1".into()
}

fn default_broker_port() -> u16 {
    7497
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_market_data_type() -> i32 {
    3
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: default_broker_host(),
            port: default_broker_port(),
            client_id: 0,
            account: String::new(),
            connect_timeout_secs: default_connect_timeout(),
            market_data_type: default_market_data_type(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

// ============================================================================
// Trading
// ============================================================================

/// Order type selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderTypeSetting {
    #[default]
    Market,
    Limit,
}

/// Order sizing and submission settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Dollar budget per BUY order
    #[serde(default = "default_dollar_amount")]
    pub dollar_amount: f64,

    #[serde(default)]
    pub order_type: OrderTypeSetting,

    /// Limit price offset from the last price, in percent
    #[serde(default = "default_limit_tolerance")]
    pub limit_tolerance_pct: f64,

    /// Wait for the terminal to acknowledge an order
    #[serde(default = "default_ack_timeout")]
    pub ack_timeout_secs: u64,

    /// Wait for a price or position snapshot
    #[serde(default = "default_price_timeout")]
    pub price_timeout_secs: u64,

    /// Pause between consecutive order submissions
    #[serde(default = "default_order_pause")]
    pub order_pause_ms: u64,

    /// Rebalance weight changes within this band are ignored
    #[serde(default)]
    pub rebalance_deadband_pct: f64,
}

fn default_dollar_amount() -> f64 {
    500.0
}

fn default_limit_tolerance() -> f64 {
    0.5
}

fn default_ack_timeout() -> u64 {
    10
}

fn default_price_timeout() -> u64 {
    5
}

fn default_order_pause() -> u64 {
    1000
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            dollar_amount: default_dollar_amount(),
            order_type: OrderTypeSetting::default(),
            limit_tolerance_pct: default_limit_tolerance(),
            ack_timeout_secs: default_ack_timeout(),
            price_timeout_secs: default_price_timeout(),
            order_pause_ms: default_order_pause(),
            rebalance_deadband_pct: 0.0,
        }
    }
}

// ============================================================================
// Scraper
// ============================================================================

/// Portfolio page and browser settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    #[serde(default = "default_current_picks_url")]
    pub current_picks_url: String,

    #[serde(default = "default_history_url")]
    pub history_url: String,

    #[serde(default = "default_true")]
    pub headless: bool,

    /// Persistent browser profile holding the login session.
    /// Defaults to `browser-profile/` under the config directory.
    #[serde(default)]
    pub profile_dir: Option<PathBuf>,

    /// Optional Chromium executable; auto-detected when unset
    #[serde(default)]
    pub chrome_executable: Option<PathBuf>,

    #[serde(default = "default_table_timeout")]
    pub table_timeout_secs: u64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_navigation_timeout")]
    pub navigation_timeout_secs: u64,

    #[serde(default = "default_window_width")]
    pub window_width: u32,

    #[serde(default = "default_window_height")]
    pub window_height: u32,
}

fn default_current_picks_url() -> String {
    "https://seekingalpha.com/pro-quant-portfolio/picks/current".into()
}

fn default_history_url() -> String {
    "https://seekingalpha.com/pro-quant-portfolio/portfolio-history".into()
}

fn default_true() -> bool {
    true
}

fn default_table_timeout() -> u64 {
    30
}

fn default_poll_interval() -> u64 {
    500
}

fn default_navigation_timeout() -> u64 {
    30
}

fn default_window_width() -> u32 {
    1920
}

fn default_window_height() -> u32 {
    1080
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            current_picks_url: default_current_picks_url(),
            history_url: default_history_url(),
            headless: true,
            profile_dir: None,
            chrome_executable: None,
            table_timeout_secs: default_table_timeout(),
            poll_interval_ms: default_poll_interval(),
            navigation_timeout_secs: default_navigation_timeout(),
            window_width: default_window_width(),
            window_height: default_window_height(),
        }
    }
}

impl ScraperConfig {
    /// Resolved browser profile directory.
    pub fn profile_dir(&self) -> PathBuf {
        self.profile_dir
            .clone()
            .unwrap_or_else(|| config_dir().join("browser-profile"))
    }
}

// ============================================================================
// Reports
// ============================================================================

/// Report persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportsConfig {
    /// Reports directory. Defaults to `reports/` under the config directory.
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Append each order outcome to a JSON-lines journal while the batch runs
    #[serde(default = "default_true")]
    pub journal: bool,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            dir: None,
            journal: true,
        }
    }
}

impl ReportsConfig {
    /// Resolved reports directory.
    pub fn dir(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| config_dir().join("reports"))
    }
}

// ============================================================================
// Observability
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Also append JSON log lines to this file
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            log_file: None,
        }
    }
}

// ============================================================================
// Root
// ============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub broker: BrokerConfig,

    #[serde(default)]
    pub trading: TradingConfig,

    #[serde(default)]
    pub scraper: ScraperConfig,

    #[serde(default)]
    pub reports: ReportsConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path, then apply `.env` and
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let path = config_path();
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path without environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load from an explicit path and apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self> {
        let _ = dotenvy::dotenv();
        let mut config = Self::load_from(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply `QM_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup. Unparseable values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("QM_IBKR_HOST") {
            self.broker.host = host;
        }
        if let Some(port) = lookup("QM_IBKR_PORT").and_then(|v| v.parse().ok()) {
            self.broker.port = port;
        }
        if let Some(id) = lookup("QM_IBKR_CLIENT_ID").and_then(|v| v.parse().ok()) {
            self.broker.client_id = id;
        }
        if let Some(account) = lookup("QM_IBKR_ACCOUNT") {
            self.broker.account = account;
        }
        if let Some(amount) = lookup("QM_TRADE_AMOUNT").and_then(|v| v.parse().ok()) {
            self.trading.dollar_amount = amount;
        }
        if let Some(dir) = lookup("QM_PROFILE_DIR") {
            self.scraper.profile_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = lookup("QM_REPORTS_DIR") {
            self.reports.dir = Some(PathBuf::from(dir));
        }
        if let Some(level) = lookup("QM_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = lookup("QM_LOG_FORMAT") {
            self.observability.log_format = format;
        }
        if let Some(file) = lookup("QM_LOG_FILE") {
            self.observability.log_file = (!file.is_empty()).then(|| PathBuf::from(file));
        }
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> crate::Result<()> {
        if !(self.trading.dollar_amount.is_finite() && self.trading.dollar_amount > 0.0) {
            return Err(Error::Config(format!(
                "trading.dollar_amount must be positive, got {}",
                self.trading.dollar_amount
            )));
        }
        if !(0.0..50.0).contains(&self.trading.limit_tolerance_pct) {
            return Err(Error::Config(format!(
                "trading.limit_tolerance_pct must be in [0, 50), got {}",
                self.trading.limit_tolerance_pct
            )));
        }
        if self.broker.port == 0 {
            return Err(Error::Config("broker.port must be non-zero".into()));
        }
        if self.broker.request_timeout_secs == 0 {
            return Err(Error::Config("broker.request_timeout_secs must be non-zero".into()));
        }
        if self.scraper.poll_interval_ms == 0 {
            return Err(Error::Config("scraper.poll_interval_ms must be non-zero".into()));
        }
        Ok(())
    }

    /// Write the configuration as pretty JSON.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
    }
}
