//! Row parsing: raw table rows into typed portfolio records.
//!
//! Column order differs between the current-picks and history tables, and
//! either table has shipped with extra or missing columns. Fields are
//! therefore located by content first (a `$` amount is a price, a `%` token
//! is a weight) and by per-variant column position only when content is
//! ambiguous.

use crate::error::ScrapeError;
use crate::page::{RawCell, RawRow};
use crate::symbol::normalize_symbol;
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

static CURRENCY_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-+]?\$\s?\d[\d,]*(?:\.\d+)?").unwrap());
static PERCENT_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-+]?\d[\d,]*(?:\.\d+)?\s?%").unwrap());
static DATE_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{1,2}/\d{1,2}/\d{4}|\d{4}-\d{2}-\d{2}|[A-Za-z]{3,9}\.? \d{1,2}, \d{4}").unwrap()
});

const DATE_FORMATS: &[&str] = &["%m/%d/%Y", "%Y-%m-%d", "%b %d, %Y", "%B %d, %Y", "%b. %d, %Y"];

// ============================================================================
// Types
// ============================================================================

/// Movement kind reported by the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Buy,
    Sell,
    Rebalance,
    Unknown,
}

impl Action {
    /// Match action words case-insensitively; anything else is `Unknown`.
    pub fn from_text(text: &str) -> Self {
        let lower = text.to_lowercase();
        let mut words = lower.split(|c: char| !c.is_ascii_alphabetic());
        let found = words.find_map(|word| match word {
            "buy" | "bought" | "add" | "added" => Some(Action::Buy),
            "sell" | "sold" | "remove" | "removed" => Some(Action::Sell),
            "rebalance" | "rebalanced" | "rebalancing" => Some(Action::Rebalance),
            _ => None,
        });
        found.unwrap_or(Action::Unknown)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Buy => "Buy",
            Action::Sell => "Sell",
            Action::Rebalance => "Rebalance",
            Action::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// Typed portfolio record. `symbol` is always a normalized ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioRecord {
    pub symbol: String,
    pub date: Option<NaiveDate>,
    pub action: Action,
    /// Signed percentage. On the history table this is the weight change.
    pub weight: Option<f64>,
    /// Portfolio weight after the movement (history table only).
    pub resulting_weight: Option<f64>,
    pub price: Option<f64>,
}

impl PortfolioRecord {
    pub fn new(symbol: impl Into<String>, action: Action) -> Self {
        Self {
            symbol: symbol.into(),
            date: None,
            action,
            weight: None,
            resulting_weight: None,
            price: None,
        }
    }

    pub fn on(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn with_resulting_weight(mut self, weight: f64) -> Self {
        self.resulting_weight = Some(weight);
        self
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }
}

/// Known table layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableVariant {
    /// company, symbol, picked price, sector, weight, quant rating, price return
    CurrentPicks,
    /// symbol, date, action, starting weight, new weight, change, price/share
    History,
}

/// Positional fallback columns for a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnLayout {
    pub symbol: usize,
    pub date: Option<usize>,
    pub action: Option<usize>,
    pub price: usize,
    pub weight: usize,
    pub resulting_weight: Option<usize>,
    pub min_cells: usize,
}

impl TableVariant {
    pub fn layout(&self) -> ColumnLayout {
        match self {
            TableVariant::CurrentPicks => ColumnLayout {
                symbol: 1,
                date: None,
                action: None,
                price: 2,
                weight: 4,
                resulting_weight: None,
                min_cells: 5,
            },
            TableVariant::History => ColumnLayout {
                symbol: 0,
                date: Some(1),
                action: Some(2),
                price: 6,
                weight: 5,
                resulting_weight: Some(4),
                min_cells: 7,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TableVariant::CurrentPicks => "current_picks",
            TableVariant::History => "history",
        }
    }
}

/// Records parsed from a table, with the count of rows dropped.
#[derive(Debug, Clone, Default)]
pub struct ParsedRows {
    pub records: Vec<PortfolioRecord>,
    pub dropped: usize,
}

// ============================================================================
// Parser
// ============================================================================

/// Parses raw rows of one table variant.
#[derive(Debug, Clone, Copy)]
pub struct RowParser {
    variant: TableVariant,
}

impl RowParser {
    pub fn new(variant: TableVariant) -> Self {
        Self { variant }
    }

    pub fn variant(&self) -> TableVariant {
        self.variant
    }

    /// Parse one row. Fails only when no tradable symbol can be resolved.
    pub fn parse(&self, row: &RawRow) -> Result<PortfolioRecord, ScrapeError> {
        if row.is_empty() {
            return Err(ScrapeError::row("empty row"));
        }

        let layout = self.variant.layout();
        let (symbol_idx, symbol) = resolve_symbol(row, layout.symbol).ok_or_else(|| {
            ScrapeError::row(format!("no resolvable symbol in {}-cell row", row.len()))
        })?;

        if row.len() < layout.min_cells {
            tracing::trace!(
                symbol = %symbol,
                cells = row.len(),
                expected = layout.min_cells,
                "Short row, positional fallback limited"
            );
        }

        let price = locate_field(
            row,
            symbol_idx,
            "price",
            &CURRENCY_TOKEN,
            parse_currency,
            layout.price,
        );
        let weight = locate_field(
            row,
            symbol_idx,
            "weight",
            &PERCENT_TOKEN,
            parse_percent,
            layout.weight,
        );
        let resulting_weight = layout
            .resulting_weight
            .and_then(|idx| row.cell(idx))
            .and_then(|cell| parse_percent(&cell.text));

        let date = match self.variant {
            TableVariant::History => extract_date(row, layout.date),
            TableVariant::CurrentPicks => None,
        };
        let action = match self.variant {
            TableVariant::History => extract_action(row, layout.action, symbol_idx),
            TableVariant::CurrentPicks => Action::Unknown,
        };

        Ok(PortfolioRecord {
            symbol,
            date,
            action,
            weight,
            resulting_weight,
            price,
        })
    }

    /// Parse every row, dropping (and logging) rows that fail.
    pub fn parse_all(&self, rows: &[RawRow]) -> ParsedRows {
        let mut parsed = ParsedRows::default();
        for (index, row) in rows.iter().enumerate() {
            match self.parse(row) {
                Ok(record) => parsed.records.push(record),
                Err(e) => {
                    tracing::warn!(row = index, error = %e, "Dropping unparseable row");
                    parsed.dropped += 1;
                }
            }
        }
        parsed
    }
}

// ============================================================================
// Field extraction
// ============================================================================

fn is_ticker_marker(value: Option<&str>) -> bool {
    value.is_some_and(|v| {
        let v = v.to_ascii_lowercase();
        v.contains("ticker") || v.contains("symbol")
    })
}

/// Ticker segment of a `/symbol/XYZ` style link.
fn symbol_from_href(href: &str) -> Option<&str> {
    let (_, rest) = href.split_once("/symbol/")?;
    rest.split(['/', '?', '#']).next().filter(|s| !s.is_empty())
}

/// Symbol resolution order: explicit ticker link, then the variant's symbol
/// column, then link text elsewhere in the row.
///
/// Other link text comes last because the picks table links the company
/// name in its first column.
fn resolve_symbol(row: &RawRow, symbol_column: usize) -> Option<(usize, String)> {
    let explicit = row.cells.iter().enumerate().find_map(|(idx, cell)| {
        let link = cell.link.as_ref()?;
        let href_symbol = link.href.as_deref().and_then(symbol_from_href);
        let marked = is_ticker_marker(link.test_id.as_deref())
            || is_ticker_marker(cell.test_id.as_deref())
            || href_symbol.is_some();
        if !marked {
            return None;
        }
        href_symbol
            .and_then(normalize_symbol)
            .or_else(|| normalize_symbol(&link.text))
            .map(|symbol| (idx, symbol))
    });
    if explicit.is_some() {
        return explicit;
    }

    let positional = row.cell(symbol_column).and_then(|cell| {
        cell.link
            .as_ref()
            .and_then(|link| normalize_symbol(&link.text))
            .or_else(|| normalize_symbol(&cell.text))
    });
    if let Some(symbol) = positional {
        return Some((symbol_column, symbol));
    }

    row.cells.iter().enumerate().find_map(|(idx, cell)| {
        let link = cell.link.as_ref()?;
        normalize_symbol(&link.text).map(|symbol| (idx, symbol))
    })
}

/// Explicit test-id first, then a unique content match, then the fallback
/// column.
fn locate_field(
    row: &RawRow,
    skip: usize,
    test_id_hint: &str,
    token: &Regex,
    parse: fn(&str) -> Option<f64>,
    fallback_column: usize,
) -> Option<f64> {
    let tagged: Vec<&RawCell> = row
        .cells
        .iter()
        .filter(|cell| {
            cell.test_id
                .as_deref()
                .is_some_and(|id| id.to_ascii_lowercase().contains(test_id_hint))
        })
        .collect();
    if let [cell] = tagged.as_slice() {
        if let Some(value) = parse(&cell.text) {
            return Some(value);
        }
    }

    let candidates: Vec<f64> = row
        .cells
        .iter()
        .enumerate()
        .filter(|(idx, _)| *idx != skip)
        .flat_map(move |(_, cell)| {
            token
                .find_iter(&cell.text)
                .filter_map(move |m| parse(m.as_str()))
        })
        .collect();
    if let [value] = candidates.as_slice() {
        return Some(*value);
    }

    row.cell(fallback_column).and_then(|cell| {
        token
            .find(&cell.text)
            .and_then(|m| parse(m.as_str()))
            .or_else(|| parse(&cell.text))
    })
}

fn clean_number(text: &str) -> String {
    text.replace('\u{2212}', "-")
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+'))
        .collect()
}

/// `$1,234.50`, `-$3.10`, `45.20`
pub fn parse_currency(text: &str) -> Option<f64> {
    let cleaned = clean_number(text.trim());
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// `3.1%`, `-5%`, `+0.25 %`
pub fn parse_percent(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if !trimmed.ends_with('%') {
        return None;
    }
    let cleaned = clean_number(trimmed);
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a date token in any of the page's formats.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
}

fn extract_date(row: &RawRow, column: Option<usize>) -> Option<NaiveDate> {
    let positional = column
        .and_then(|idx| row.cell(idx))
        .and_then(|cell| DATE_TOKEN.find(&cell.text))
        .and_then(|m| parse_date(m.as_str()));
    if positional.is_some() {
        return positional;
    }
    row.cells
        .iter()
        .flat_map(|cell| DATE_TOKEN.find_iter(&cell.text))
        .find_map(|m| parse_date(m.as_str()))
}

fn extract_action(row: &RawRow, column: Option<usize>, symbol_idx: usize) -> Action {
    let positional = column
        .and_then(|idx| row.cell(idx))
        .map(|cell| Action::from_text(&cell.text))
        .unwrap_or(Action::Unknown);
    if positional != Action::Unknown {
        return positional;
    }
    // Some layouts move the action column; accept a cell that is exactly an action word
    row.cells
        .iter()
        .enumerate()
        .filter(|(idx, _)| *idx != symbol_idx)
        .map(|(_, cell)| cell.text.trim())
        .filter(|text| !text.is_empty() && !text.contains(' '))
        .map(Action::from_text)
        .find(|action| *action != Action::Unknown)
        .unwrap_or(Action::Unknown)
}
