//! Batch-fatal pipeline errors.
//!
//! Row- and order-level failures never surface here; they are recorded on
//! the scrape result or the order outcome and the run continues.

use crate::broker::BrokerError;
use mirror_scraper::ScrapeError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// No table strategy matched before the deadline
    #[error("{0}")]
    TableNotFound(ScrapeError),

    #[error("Brokerage connection failed: {0}")]
    Connection(#[source] BrokerError),

    #[error("Scrape failed: {0}")]
    Scrape(#[source] ScrapeError),

    #[error("Report not written: {0}")]
    Report(#[source] mirror_common::Error),
}

impl PipelineError {
    /// Follow-up the user can act on.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            PipelineError::Scrape(ScrapeError::LoginRequired { .. }) => {
                Some("run `quant-mirror login` to sign in on the browser profile")
            }
            PipelineError::TableNotFound(_) => {
                Some("the page layout may have changed; try `quant-mirror scrape --headed`")
            }
            PipelineError::Connection(_) => {
                Some("check that TWS or IB Gateway is running with API access enabled")
            }
            _ => None,
        }
    }
}

impl From<ScrapeError> for PipelineError {
    fn from(e: ScrapeError) -> Self {
        match e {
            e @ ScrapeError::TableNotFound { .. } => PipelineError::TableNotFound(e),
            other => PipelineError::Scrape(other),
        }
    }
}

impl From<BrokerError> for PipelineError {
    fn from(e: BrokerError) -> Self {
        PipelineError::Connection(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scrape_errors_are_split() {
        let err: PipelineError = ScrapeError::TableNotFound {
            selectors: vec!["tbody".into()],
            waited_ms: 30_000,
        }
        .into();
        assert!(matches!(err, PipelineError::TableNotFound(_)));
        assert!(err.to_string().starts_with("Portfolio table not found"));

        let err: PipelineError = ScrapeError::LoginRequired {
            url: "https://example.com/login".into(),
        }
        .into();
        assert!(err.hint().unwrap().contains("quant-mirror login"));
    }

    #[test]
    fn test_connection_display() {
        let err: PipelineError = BrokerError::Connect("127.0.0.1:7497: connection refused".into()).into();
        assert_eq!(
            err.to_string(),
            "Brokerage connection failed: Connection failed: 127.0.0.1:7497: connection refused"
        );
    }
}
