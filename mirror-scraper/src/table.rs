//! Portfolio table discovery.
//!
//! The table body has shipped under more than one `data-test-id`. Rather than
//! detecting the page version, the extractor tries an ordered list of
//! strategies and takes the first one that yields rows. Supporting a new
//! markup variant means appending a strategy.

use crate::error::ScrapeError;
use crate::page::{PageHandle, RawRow};
use mirror_common::ScraperConfig;
use std::time::{Duration, Instant};

/// Infinite-scroll table body (current markup).
pub const INFINITE_TABLE_BODY: &str = r#"tbody[data-test-id="table-body-infinite"]"#;
/// Static table body (older markup).
pub const STATIC_TABLE_BODY: &str = r#"tbody[data-test-id="table-body"]"#;

/// One way of locating the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableStrategy {
    pub name: String,
    pub selector: String,
}

impl TableStrategy {
    pub fn new(name: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            selector: selector.into(),
        }
    }

    /// Built-in strategies in the order they are tried.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("infinite", INFINITE_TABLE_BODY),
            Self::new("static", STATIC_TABLE_BODY),
        ]
    }
}

/// Polling bounds for table discovery.
#[derive(Debug, Clone, Copy)]
pub struct ExtractorConfig {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(500),
        }
    }
}

impl From<&ScraperConfig> for ExtractorConfig {
    fn from(config: &ScraperConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.table_timeout_secs),
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
        }
    }
}

/// Rows found by a strategy.
#[derive(Debug, Clone)]
pub struct ExtractedTable {
    pub strategy: String,
    pub rows: Vec<RawRow>,
}

/// Locates the portfolio table on a page.
#[derive(Debug, Clone)]
pub struct TableExtractor {
    strategies: Vec<TableStrategy>,
    config: ExtractorConfig,
}

impl TableExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self {
            strategies: TableStrategy::defaults(),
            config,
        }
    }

    pub fn with_strategies(strategies: Vec<TableStrategy>, config: ExtractorConfig) -> Self {
        Self { strategies, config }
    }

    /// Append a strategy; it is tried after the existing ones.
    pub fn push_strategy(&mut self, strategy: TableStrategy) {
        self.strategies.push(strategy);
    }

    pub fn strategies(&self) -> &[TableStrategy] {
        &self.strategies
    }

    pub fn selectors(&self) -> Vec<String> {
        self.strategies.iter().map(|s| s.selector.clone()).collect()
    }

    /// Try every strategy once, in order.
    ///
    /// Query failures other than a malformed selector are treated as "not
    /// rendered yet" so that polling can continue.
    pub async fn scan_once(
        &self,
        page: &dyn PageHandle,
    ) -> Result<Option<ExtractedTable>, ScrapeError> {
        for strategy in &self.strategies {
            match page.query_rows(&strategy.selector).await {
                Ok(rows) if !rows.is_empty() => {
                    return Ok(Some(ExtractedTable {
                        strategy: strategy.name.clone(),
                        rows,
                    }));
                }
                Ok(_) => {}
                Err(e @ ScrapeError::InvalidSelector(_)) => return Err(e),
                Err(e) => {
                    tracing::debug!(strategy = %strategy.name, error = %e, "Table query failed");
                }
            }
        }
        Ok(None)
    }

    /// Poll until a strategy yields rows or the timeout expires.
    pub async fn extract(&self, page: &dyn PageHandle) -> Result<ExtractedTable, ScrapeError> {
        let started = Instant::now();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            if let Some(table) = self.scan_once(page).await? {
                tracing::info!(
                    strategy = %table.strategy,
                    rows = table.rows.len(),
                    attempts,
                    "Portfolio table located"
                );
                return Ok(table);
            }

            let elapsed = started.elapsed();
            if elapsed >= self.config.timeout {
                return Err(ScrapeError::TableNotFound {
                    selectors: self.selectors(),
                    waited_ms: elapsed.as_millis() as u64,
                });
            }

            let remaining = self.config.timeout - elapsed;
            tokio::time::sleep(self.config.poll_interval.min(remaining)).await;
        }
    }
}

impl Default for TableExtractor {
    fn default() -> Self {
        Self::new(ExtractorConfig::default())
    }
}
