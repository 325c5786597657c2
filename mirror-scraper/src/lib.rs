//! mirror-scraper - portfolio table extraction for quant-mirror.
//!
//! Data flow: [`PageHandle`] → [`TableExtractor`] → [`RawRow`] →
//! [`RowParser`] → [`PortfolioRecord`].

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod browser;
pub mod error;
pub mod page;
pub mod row;
pub mod scrape;
pub mod symbol;
pub mod table;

pub use browser::{needs_login, BrowserSession, ChromiumPage, SessionConfig};
pub use error::ScrapeError;
pub use page::{CellLink, HtmlSnapshot, PageHandle, RawCell, RawRow};
pub use row::{Action, ParsedRows, PortfolioRecord, RowParser, TableVariant};
pub use scrape::{scrape_page, ScrapeMode, ScrapeResult};
pub use symbol::{broker_symbol, normalize_symbol};
pub use table::{ExtractedTable, ExtractorConfig, TableExtractor, TableStrategy};
