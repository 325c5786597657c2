//! Trade report generation and persistence.

use crate::execution::{OrderKind, OrderOutcome, OrderStatus, Side, Sizing};
use chrono::{DateTime, Utc};
use mirror_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Run-level facts the outcomes do not carry.
#[derive(Debug, Clone)]
pub struct ReportContext {
    pub run_id: String,
    pub account: String,
    pub mode: String,
    pub order_kind: OrderKind,
    pub dollar_amount: f64,
}

/// Counts by status and side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total: usize,
    pub submitted: usize,
    pub filled: usize,
    pub rejected: usize,
    pub skipped: usize,
    pub buy_count: usize,
    pub sell_count: usize,
    /// Sum of quantity × fill price (reference price when unfilled) over
    /// placed BUY orders
    pub estimated_buy_notional: f64,
}

/// One row per action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub symbol: String,
    pub side: Side,
    pub status: OrderStatus,
    pub sizing: Sizing,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broker_order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Structured result of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeReport {
    pub run_id: String,
    pub generated_at: DateTime<Utc>,
    pub account: String,
    pub mode: String,
    pub order_type: String,
    pub dollar_amount: f64,
    pub summary: ReportSummary,
    pub entries: Vec<ReportEntry>,
}

/// Builds reports from outcomes. Pure: no IO.
pub struct TradeReporter;

impl TradeReporter {
    pub fn build(ctx: &ReportContext, outcomes: &[OrderOutcome]) -> TradeReport {
        Self::build_at(ctx, outcomes, Utc::now())
    }

    pub fn build_at(
        ctx: &ReportContext,
        outcomes: &[OrderOutcome],
        generated_at: DateTime<Utc>,
    ) -> TradeReport {
        let mut summary = ReportSummary {
            total: outcomes.len(),
            ..ReportSummary::default()
        };

        for outcome in outcomes {
            match outcome.status {
                OrderStatus::Submitted => summary.submitted += 1,
                OrderStatus::Filled => summary.filled += 1,
                OrderStatus::Rejected => summary.rejected += 1,
                OrderStatus::Skipped => summary.skipped += 1,
            }
            match outcome.action.side {
                Side::Buy => {
                    summary.buy_count += 1;
                    if outcome.is_placed() {
                        if let (Some(qty), Some(price)) = (outcome.quantity, outcome.effective_price()) {
                            summary.estimated_buy_notional += qty as f64 * price;
                        }
                    }
                }
                Side::Sell => summary.sell_count += 1,
            }
        }
        summary.estimated_buy_notional = (summary.estimated_buy_notional * 100.0).round() / 100.0;

        let entries = outcomes
            .iter()
            .map(|o| ReportEntry {
                symbol: o.action.symbol.clone(),
                side: o.action.side,
                status: o.status,
                sizing: o.action.sizing,
                quantity: o.quantity,
                reference_price: o.reference_price,
                fill_price: o.fill_price,
                broker_order_id: o.broker_order_id.clone(),
                reason: o.error.clone(),
            })
            .collect();

        TradeReport {
            run_id: ctx.run_id.clone(),
            generated_at,
            account: ctx.account.clone(),
            mode: ctx.mode.clone(),
            order_type: ctx.order_kind.as_str().to_string(),
            dollar_amount: ctx.dollar_amount,
            summary,
            entries,
        }
    }
}

impl TradeReport {
    /// Human-readable rendering.
    pub fn to_text_report(&self) -> String {
        let rule = "=".repeat(64);
        let thin = "-".repeat(64);
        let mut report = String::new();

        report.push_str(&format!("{rule}\n"));
        report.push_str("                    PORTFOLIO MIRROR TRADE REPORT\n");
        report.push_str(&format!("{rule}\n"));
        report.push_str(&format!("Generated:     {}\n", self.generated_at.format("%Y-%m-%d %H:%M:%S UTC")));
        report.push_str(&format!("Run:           {}\n", self.run_id));
        report.push_str(&format!("Account:       {}\n", display_or_dash(&self.account)));
        report.push_str(&format!("Mode:          {}\n", self.mode));
        report.push_str(&format!("Order type:    {}\n", self.order_type));
        report.push_str(&format!("Per BUY:       ${:.2}\n\n", self.dollar_amount));

        report.push_str("SUMMARY\n");
        report.push_str(&format!("{thin}\n"));
        report.push_str(&format!("  Total actions:   {:>8}\n", self.summary.total));
        report.push_str(&format!("  BUY / SELL:      {:>4} / {}\n", self.summary.buy_count, self.summary.sell_count));
        report.push_str(&format!("  Filled:          {:>8}\n", self.summary.filled));
        report.push_str(&format!("  Submitted:       {:>8}\n", self.summary.submitted));
        report.push_str(&format!("  Rejected:        {:>8}\n", self.summary.rejected));
        report.push_str(&format!("  Skipped:         {:>8}\n", self.summary.skipped));
        report.push_str(&format!(
            "  Est. BUY value:  ${:>11.2}\n\n",
            self.summary.estimated_buy_notional
        ));

        report.push_str("DETAILED MOVEMENTS\n");
        report.push_str(&format!("{thin}\n"));
        if self.entries.is_empty() {
            report.push_str("  No movements.\n");
        }
        let mut entries: Vec<&ReportEntry> = self.entries.iter().collect();
        entries.sort_by(|a, b| {
            (a.side == Side::Sell, &a.symbol).cmp(&(b.side == Side::Sell, &b.symbol))
        });
        for entry in entries {
            let qty = entry.quantity.map_or_else(|| "-".to_string(), |q| q.to_string());
            let price = entry
                .reference_price
                .map_or_else(|| "-".to_string(), |p| format!("${p:.2}"));
            report.push_str(&format!(
                "  {:<4} {:<8} {:<10} qty {:>6}  @ {:>10}",
                entry.side.as_str(),
                entry.symbol,
                entry.status.as_str(),
                qty,
                price
            ));
            if let Some(id) = &entry.broker_order_id {
                report.push_str(&format!("  #{id}"));
            }
            if let Some(fill) = entry.fill_price {
                report.push_str(&format!("  filled @ ${fill:.2}"));
            }
            if let Some(reason) = &entry.reason {
                report.push_str(&format!("  ({reason})"));
            }
            report.push('\n');
        }

        report.push_str(&format!("\n{rule}\nEnd of Report\n"));
        report
    }
}

fn display_or_dash(value: &str) -> &str {
    if value.is_empty() {
        "-"
    } else {
        value
    }
}

/// Writes reports as a JSON file plus a text sibling.
pub struct ReportWriter {
    dir: PathBuf,
}

impl ReportWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the JSON and text paths.
    pub fn write(&self, report: &TradeReport) -> Result<(PathBuf, PathBuf)> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| Error::Io(e).with_context(format!("creating {}", self.dir.display())))?;

        let stem = format!("trade_report_{}", report.generated_at.format("%Y%m%d_%H%M%S"));
        let json_path = self.dir.join(format!("{stem}.json"));
        let text_path = self.dir.join(format!("{stem}.txt"));

        std::fs::write(&json_path, serde_json::to_string_pretty(report)?)
            .map_err(|e| Error::Io(e).with_context(format!("writing {}", json_path.display())))?;
        std::fs::write(&text_path, report.to_text_report())
            .map_err(|e| Error::Io(e).with_context(format!("writing {}", text_path.display())))?;

        tracing::info!(json = %json_path.display(), text = %text_path.display(), "Report written");
        Ok((json_path, text_path))
    }
}

// ============================================================================
// Tests
// ============================================================================
