//! One scrape pass: locate the table, parse its rows.

use crate::error::ScrapeError;
use crate::page::PageHandle;
use crate::row::{PortfolioRecord, RowParser, TableVariant};
use crate::table::TableExtractor;
use mirror_common::ScraperConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which page to read and how to interpret it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeMode {
    /// Present holdings
    CurrentPicks,
    /// Movements from the most recent rebalance
    LatestMovements,
    /// Every recorded movement
    AllHistory,
}

impl ScrapeMode {
    pub fn variant(&self) -> TableVariant {
        match self {
            ScrapeMode::CurrentPicks => TableVariant::CurrentPicks,
            ScrapeMode::LatestMovements | ScrapeMode::AllHistory => TableVariant::History,
        }
    }

    pub fn url<'a>(&self, config: &'a ScraperConfig) -> &'a str {
        match self {
            ScrapeMode::CurrentPicks => &config.current_picks_url,
            ScrapeMode::LatestMovements | ScrapeMode::AllHistory => &config.history_url,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScrapeMode::CurrentPicks => "current_picks",
            ScrapeMode::LatestMovements => "latest_movements",
            ScrapeMode::AllHistory => "all_history",
        }
    }
}

impl fmt::Display for ScrapeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of a scrape pass.
#[derive(Debug, Clone)]
pub struct ScrapeResult {
    pub strategy: String,
    pub total_rows: usize,
    pub dropped_rows: usize,
    pub records: Vec<PortfolioRecord>,
}

/// Extract the table from `page` and parse it as `variant`.
///
/// Only table discovery can fail; unparseable rows are dropped and counted.
pub async fn scrape_page(
    page: &dyn PageHandle,
    extractor: &TableExtractor,
    variant: TableVariant,
) -> Result<ScrapeResult, ScrapeError> {
    let table = extractor.extract(page).await?;
    let parsed = RowParser::new(variant).parse_all(&table.rows);

    tracing::info!(
        variant = variant.as_str(),
        strategy = %table.strategy,
        rows = table.rows.len(),
        records = parsed.records.len(),
        dropped = parsed.dropped,
        "Scrape pass complete"
    );

    Ok(ScrapeResult {
        strategy: table.strategy,
        total_rows: table.rows.len(),
        dropped_rows: parsed.dropped,
        records: parsed.records,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_selects_page_and_variant() {
        let config = ScraperConfig::default();
        assert_eq!(ScrapeMode::CurrentPicks.variant(), TableVariant::CurrentPicks);
        assert_eq!(ScrapeMode::AllHistory.variant(), TableVariant::History);
        assert!(ScrapeMode::CurrentPicks.url(&config).ends_with("/picks/current"));
        assert!(ScrapeMode::LatestMovements.url(&config).ends_with("/portfolio-history"));
        assert_eq!(ScrapeMode::LatestMovements.to_string(), "latest_movements");
    }
}
