//! Read-only page abstraction.
//!
//! Extraction code only ever sees a [`PageHandle`]. The live browser page and
//! static HTML snapshots both implement it, so extraction strategies can be
//! exercised against fixture fragments.

use crate::error::ScrapeError;
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

/// Anchor found inside a table cell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellLink {
    #[serde(default)]
    pub href: Option<String>,
    #[serde(default)]
    pub test_id: Option<String>,
    #[serde(default)]
    pub text: String,
}

/// One table cell as captured from the DOM.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCell {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub test_id: Option<String>,
    #[serde(default)]
    pub link: Option<CellLink>,
}

impl RawCell {
    /// Plain text cell without attributes.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Cell holding a single anchor.
    pub fn linked(text: impl Into<String>, href: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            text: text.clone(),
            test_id: None,
            link: Some(CellLink {
                href: Some(href.into()),
                test_id: None,
                text,
            }),
        }
    }

    pub fn with_test_id(mut self, test_id: impl Into<String>) -> Self {
        self.test_id = Some(test_id.into());
        self
    }
}

/// One table row. Immutable once captured.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRow {
    pub cells: Vec<RawCell>,
}

impl RawRow {
    pub fn new(cells: Vec<RawCell>) -> Self {
        Self { cells }
    }

    /// Build a row of plain text cells.
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cells: texts.into_iter().map(RawCell::text).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cell(&self, index: usize) -> Option<&RawCell> {
        self.cells.get(index)
    }
}

/// Read-only query interface over a rendered page.
#[async_trait]
pub trait PageHandle: Send + Sync {
    /// Rows (`tr` with at least one `td`) under the first element matching
    /// `selector`. An absent table is an empty result, not an error.
    async fn query_rows(&self, selector: &str) -> Result<Vec<RawRow>, ScrapeError>;

    /// Current document URL, when known.
    async fn current_url(&self) -> Option<String>;

    /// Case-insensitive search of the visible page text.
    async fn contains_text(&self, needle: &str) -> Result<bool, ScrapeError>;
}

// ============================================================================
// Static HTML snapshot
// ============================================================================

/// A page backed by a static HTML document.
#[derive(Debug, Clone)]
pub struct HtmlSnapshot {
    html: String,
    url: Option<String>,
}

impl HtmlSnapshot {
    pub fn new(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            url: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    fn rows_blocking(&self, selector: &str) -> Result<Vec<RawRow>, ScrapeError> {
        let table_sel = parse_selector(selector)?;
        let row_sel = parse_selector("tr")?;
        let cell_sel = parse_selector("td")?;
        let link_sel = parse_selector("a")?;

        let document = Html::parse_document(&self.html);
        let Some(table) = document.select(&table_sel).next() else {
            return Ok(Vec::new());
        };

        let rows = table
            .select(&row_sel)
            .map(|tr| {
                let cells = tr
                    .select(&cell_sel)
                    .map(|td| RawCell {
                        text: element_text(&td),
                        test_id: td.value().attr("data-test-id").map(String::from),
                        link: td.select(&link_sel).next().map(|a| CellLink {
                            href: a.value().attr("href").map(String::from),
                            test_id: a.value().attr("data-test-id").map(String::from),
                            text: element_text(&a),
                        }),
                    })
                    .collect::<Vec<_>>();
                RawRow::new(cells)
            })
            .filter(|row| !row.is_empty())
            .collect();

        Ok(rows)
    }

    fn body_text(&self) -> String {
        let document = Html::parse_document(&self.html);
        document.root_element().text().collect::<Vec<_>>().join(" ")
    }
}

#[async_trait]
impl PageHandle for HtmlSnapshot {
    async fn query_rows(&self, selector: &str) -> Result<Vec<RawRow>, ScrapeError> {
        self.rows_blocking(selector)
    }

    async fn current_url(&self) -> Option<String> {
        self.url.clone()
    }

    async fn contains_text(&self, needle: &str) -> Result<bool, ScrapeError> {
        Ok(self
            .body_text()
            .to_lowercase()
            .contains(&needle.to_lowercase()))
    }
}

fn parse_selector(selector: &str) -> Result<Selector, ScrapeError> {
    Selector::parse(selector)
        .map_err(|e| ScrapeError::InvalidSelector(format!("{selector}: {e:?}")))
}

/// Visible text with whitespace runs collapsed.
fn element_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
