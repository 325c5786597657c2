//! Error types for mirror-scraper.

/// Scrape errors.
#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("Portfolio table not found after {waited_ms} ms (tried: {})", .selectors.join(", "))]
    TableNotFound {
        selectors: Vec<String>,
        waited_ms: u64,
    },

    #[error("Row parse failed: {reason}")]
    RowParse { reason: String },

    #[error("Invalid CSS selector: {0}")]
    InvalidSelector(String),

    #[error("Browser launch failed: {0}")]
    LaunchFailed(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Navigation timeout: {url}")]
    NavigationTimeout { url: String },

    #[error("Login required: {url}")]
    LoginRequired { url: String },
}

impl ScrapeError {
    pub(crate) fn row(reason: impl Into<String>) -> Self {
        Self::RowParse {
            reason: reason.into(),
        }
    }
}
