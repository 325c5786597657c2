//! Scrape-to-trade orchestration.
//!
//! The run is strictly sequential: the browser is opened, read and closed
//! before any broker connection exists, and the full action list is known
//! before the first order is placed.

use crate::broker::Brokerage;
use crate::convert::{ActionConverter, Conversion, ConverterConfig};
use crate::error::PipelineError;
use crate::execution::{AccountContext, OrderScheduler};
use crate::filter::{FilterMode, MovementFilter};
use crate::report::{ReportContext, TradeReport, TradeReporter};
use chrono::NaiveDate;
use mirror_common::ScraperConfig;
use mirror_scraper::{
    needs_login, scrape_page, BrowserSession, PageHandle, PortfolioRecord, ScrapeError, ScrapeMode,
    ScrapeResult, SessionConfig, TableExtractor,
};

/// What to scrape and how to filter it.
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub mode: ScrapeMode,
    /// Disable the date filter
    pub all: bool,
    /// Filter on the newest date present instead of the Friday target
    pub latest_available: bool,
    /// Defaults to today
    pub reference_date: Option<NaiveDate>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            mode: ScrapeMode::LatestMovements,
            all: false,
            latest_available: false,
            reference_date: None,
        }
    }
}

impl RunOptions {
    pub fn filter_mode(&self) -> FilterMode {
        match self.mode {
            ScrapeMode::CurrentPicks | ScrapeMode::AllHistory => FilterMode::All,
            ScrapeMode::LatestMovements if self.all => FilterMode::All,
            ScrapeMode::LatestMovements if self.latest_available => FilterMode::LatestDate,
            ScrapeMode::LatestMovements => FilterMode::Friday,
        }
    }

    pub fn filter(&self) -> MovementFilter {
        match self.reference_date {
            Some(date) => MovementFilter::with_reference(self.filter_mode(), date),
            None => MovementFilter::new(self.filter_mode()),
        }
    }

    pub fn converter_config(&self, dollar_amount: f64, deadband_pct: f64) -> ConverterConfig {
        ConverterConfig {
            dollar_amount,
            unknown_as_buy: self.mode == ScrapeMode::CurrentPicks,
            deadband_pct,
        }
    }
}

/// Scrape-phase output: everything the trade phase needs.
#[derive(Debug, Clone)]
pub struct Plan {
    pub mode: ScrapeMode,
    pub scraped: usize,
    pub dropped_rows: usize,
    pub target_date: Option<NaiveDate>,
    pub records: Vec<PortfolioRecord>,
    pub conversion: Conversion,
}

/// Filter and convert scraped records.
pub fn plan(scrape: ScrapeResult, options: &RunOptions, converter: &ActionConverter) -> Plan {
    let filter = options.filter();
    let target_date = filter.target_date(&scrape.records);
    let scraped = scrape.records.len();
    let records = filter.apply(scrape.records);
    let conversion = converter.convert(&records);

    tracing::info!(
        mode = %options.mode,
        scraped,
        kept = records.len(),
        actions = conversion.actions.len(),
        warnings = conversion.warnings.len(),
        "Plan ready"
    );

    Plan {
        mode: options.mode,
        scraped,
        dropped_rows: scrape.dropped_rows,
        target_date,
        records,
        conversion,
    }
}

/// Scrape an already-open page. A missing table on a login wall is
/// reported as [`ScrapeError::LoginRequired`].
pub async fn scrape_with_page(
    page: &dyn PageHandle,
    extractor: &TableExtractor,
    mode: ScrapeMode,
) -> Result<ScrapeResult, PipelineError> {
    match scrape_page(page, extractor, mode.variant()).await {
        Ok(result) => Ok(result),
        Err(e @ ScrapeError::TableNotFound { .. }) => {
            if matches!(needs_login(page).await, Ok(true)) {
                let url = page.current_url().await.unwrap_or_default();
                tracing::warn!(url = %url, "Portfolio table hidden behind login");
                return Err(ScrapeError::LoginRequired { url }.into());
            }
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}

/// Launch the browser on the persistent profile, scrape `mode`, close.
pub async fn scrape_live(
    config: &ScraperConfig,
    session_config: SessionConfig,
    mode: ScrapeMode,
) -> Result<ScrapeResult, PipelineError> {
    let url = mode.url(config).to_string();
    let extractor = TableExtractor::new(config.into());

    let session = BrowserSession::launch(session_config).await?;
    let result = match session.open(&url).await {
        Ok(page) => scrape_with_page(&page, &extractor, mode).await,
        Err(e) => Err(e.into()),
    };
    if let Err(e) = session.close().await {
        tracing::warn!(error = %e, "Browser close failed");
    }
    result
}

/// Execute the plan's actions and build the report.
///
/// Only a failed connect is an error. An empty action list still connects
/// so the report names the account.
pub async fn trade<B: Brokerage>(
    plan: &Plan,
    scheduler: &mut OrderScheduler,
    ctx: &mut AccountContext<B>,
) -> Result<TradeReport, PipelineError> {
    let batch = scheduler.execute(&plan.conversion.actions, ctx).await?;
    let report_ctx = ReportContext {
        run_id: scheduler.run_id().to_string(),
        account: batch.account_id,
        mode: plan.mode.to_string(),
        order_kind: scheduler.config().order_kind,
        dollar_amount: scheduler.config().dollar_amount,
    };
    Ok(TradeReporter::build(&report_ctx, &batch.outcomes))
}
