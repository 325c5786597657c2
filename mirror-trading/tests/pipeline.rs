//! End-to-end pipeline tests: fixture page in, trade report out.

use async_trait::async_trait;
use chrono::NaiveDate;
use mirror_scraper::{ExtractorConfig, HtmlSnapshot, ScrapeMode, TableExtractor};
use mirror_trading::pipeline::{self, RunOptions};
use mirror_trading::{
    AccountContext, AckState, ActionConverter, BrokerEndpoint, BrokerError, Brokerage, OrderAck,
    OrderKind, OrderRequest, OrderScheduler, OrderStatus, OutcomeJournal, PipelineError,
    ReportWriter, SchedulerConfig, Side, TradeAction,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const HISTORY_PAGE: &str = r#"
<html><body>
<table>
  <tbody data-test-id="table-body-infinite">
    <tr>
      <td><a data-test-id="ticker-link" href="/symbol/NEM">NEM</a></td>
      <td>6/7/2024</td><td>Buy</td><td>0.00%</td><td>2.00%</td><td>2.00%</td><td>$45.20</td>
    </tr>
    <tr>
      <td><a data-test-id="ticker-link" href="/symbol/BRK.B">BRK.B</a></td>
      <td>6/7/2024</td><td>Rebalance</td><td>4.10%</td><td>3.60%</td><td>-0.50%</td><td>$412.77</td>
    </tr>
    <tr>
      <td><a data-test-id="ticker-link" href="/symbol/CAT">CAT</a></td>
      <td>6/7/2024</td><td>Sell</td><td>3.00%</td><td>0.00%</td><td>-3.00%</td><td>$341.10</td>
    </tr>
    <tr>
      <td><a data-test-id="ticker-link" href="/symbol/W">W</a></td>
      <td>5/31/2024</td><td>Sell</td><td>5.00%</td><td>0.00%</td><td>-5.00%</td><td>$51.02</td>
    </tr>
  </tbody>
</table>
</body></html>
"#;

fn extractor() -> TableExtractor {
    TableExtractor::new(ExtractorConfig {
        timeout: Duration::from_millis(100),
        poll_interval: Duration::from_millis(10),
    })
}

fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()
}

fn endpoint() -> BrokerEndpoint {
    BrokerEndpoint {
        host: "127.0.0.1".into(),
        port: 7497,
        client_id: 0,
        connect_timeout: Duration::from_millis(200),
    }
}

fn scheduler() -> OrderScheduler {
    OrderScheduler::new(SchedulerConfig {
        dollar_amount: 500.0,
        order_kind: OrderKind::Market,
        ack_timeout: Duration::from_millis(200),
        data_timeout: Duration::from_millis(200),
        pause_between_orders: Duration::ZERO,
    })
    .with_run_id("run-test")
}

/// In-memory terminal that records every call.
#[derive(Clone, Default)]
struct ScriptedBroker {
    prices: HashMap<String, f64>,
    positions: HashMap<String, i64>,
    refuse_connect: bool,
    calls: Arc<Mutex<Vec<String>>>,
    next_id: u64,
}

impl ScriptedBroker {
    fn log(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Brokerage for ScriptedBroker {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn connect(&mut self, _endpoint: &BrokerEndpoint) -> Result<(), BrokerError> {
        self.log("connect".into());
        if self.refuse_connect {
            return Err(BrokerError::Connect("connection refused".into()));
        }
        Ok(())
    }

    async fn managed_accounts(&mut self) -> Result<Vec<String>, BrokerError> {
        Ok(vec!["DU123456".into()])
    }

    async fn current_price(&mut self, symbol: &str) -> Result<Option<f64>, BrokerError> {
        self.log(format!("price {symbol}"));
        Ok(self.prices.get(symbol).copied())
    }

    async fn current_position(&mut self, symbol: &str, _account: &str) -> Result<i64, BrokerError> {
        self.log(format!("position {symbol}"));
        Ok(self.positions.get(symbol).copied().unwrap_or(0))
    }

    async fn submit_order(&mut self, order: &OrderRequest) -> Result<OrderAck, BrokerError> {
        self.log(format!("{} {} {}", order.side, order.quantity, order.symbol));
        self.next_id += 1;
        Ok(OrderAck {
            broker_order_id: format!("{}", 1000 + self.next_id),
            state: AckState::Filled,
            fill_price: None,
        })
    }

    async fn disconnect(&mut self) -> Result<(), BrokerError> {
        self.log("disconnect".into());
        Ok(())
    }
}

async fn scrape_plan(options: &RunOptions) -> pipeline::Plan {
    let page = HtmlSnapshot::new(HISTORY_PAGE);
    let scrape = pipeline::scrape_with_page(&page, &extractor(), options.mode)
        .await
        .unwrap();
    let converter = ActionConverter::new(options.converter_config(500.0, 0.0));
    pipeline::plan(scrape, options, &converter)
}

#[tokio::test]
async fn test_friday_movements_become_orders() {
    let options = RunOptions {
        reference_date: Some(monday()),
        ..RunOptions::default()
    };
    let plan = scrape_plan(&options).await;

    assert_eq!(plan.target_date, NaiveDate::from_ymd_opt(2024, 6, 7));
    assert_eq!(plan.records.len(), 3);
    assert_eq!(
        plan.conversion.actions,
        vec![TradeAction::buy("NEM", 500.0), TradeAction::close("CAT")]
    );
    assert_eq!(plan.conversion.warnings.len(), 1);

    let broker = ScriptedBroker {
        prices: HashMap::from([("NEM".to_string(), 45.20)]),
        positions: HashMap::from([("CAT".to_string(), 7)]),
        ..ScriptedBroker::default()
    };
    let mut ctx = AccountContext::new("", endpoint(), broker.clone());
    let report = pipeline::trade(&plan, &mut scheduler(), &mut ctx)
        .await
        .unwrap();

    assert_eq!(
        broker.calls(),
        vec![
            "connect",
            "price NEM",
            "BUY 11 NEM",
            "position CAT",
            "SELL 7 CAT",
            "disconnect",
        ]
    );
    assert_eq!(report.account, "DU123456");
    assert_eq!(report.run_id, "run-test");
    assert_eq!(report.mode, "latest_movements");
    assert_eq!(report.summary.filled, 2);
    assert_eq!(report.summary.estimated_buy_notional, 497.20);
    assert_eq!(report.entries[0].side, Side::Buy);
    assert_eq!(report.entries[0].status, OrderStatus::Filled);
}

#[tokio::test]
async fn test_all_history_keeps_every_date() {
    let options = RunOptions {
        mode: ScrapeMode::AllHistory,
        reference_date: Some(monday()),
        ..RunOptions::default()
    };
    let plan = scrape_plan(&options).await;
    assert_eq!(plan.target_date, None);
    assert_eq!(plan.records.len(), 4);
    assert_eq!(
        plan.conversion.actions,
        vec![
            TradeAction::buy("NEM", 500.0),
            TradeAction::close("CAT"),
            TradeAction::close("W"),
        ]
    );
}

#[tokio::test]
async fn test_quiet_week_still_reports() {
    let options = RunOptions {
        reference_date: NaiveDate::from_ymd_opt(2024, 6, 20),
        ..RunOptions::default()
    };
    let plan = scrape_plan(&options).await;
    assert!(plan.records.is_empty());
    assert!(plan.conversion.actions.is_empty());

    let broker = ScriptedBroker::default();
    let mut ctx = AccountContext::new("DU999", endpoint(), broker.clone());
    let report = pipeline::trade(&plan, &mut scheduler(), &mut ctx)
        .await
        .unwrap();

    assert_eq!(broker.calls(), vec!["connect", "disconnect"]);
    assert_eq!(report.summary.total, 0);
    assert!(report.to_text_report().contains("No movements."));
}

#[tokio::test]
async fn test_connect_failure_aborts_before_orders() {
    let options = RunOptions {
        reference_date: Some(monday()),
        ..RunOptions::default()
    };
    let plan = scrape_plan(&options).await;

    let broker = ScriptedBroker {
        refuse_connect: true,
        ..ScriptedBroker::default()
    };
    let mut ctx = AccountContext::new("", endpoint(), broker.clone());
    let err = pipeline::trade(&plan, &mut scheduler(), &mut ctx)
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::Connection(_)));
    assert!(err.hint().is_some());
    assert_eq!(broker.calls(), vec!["connect", "disconnect"]);
}

fn quick_extractor() -> TableExtractor {
    TableExtractor::new(ExtractorConfig {
        timeout: Duration::from_millis(30),
        poll_interval: Duration::from_millis(10),
    })
}

#[tokio::test]
async fn test_missing_table_is_fatal() {
    let page = HtmlSnapshot::new(
        r#"<table><tbody class="renamed"><tr><td>NEM</td></tr></tbody></table>"#,
    )
    .with_url("https://example.com/portfolio-history");
    let err = pipeline::scrape_with_page(&page, &quick_extractor(), ScrapeMode::LatestMovements)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::TableNotFound(_)), "unexpected error: {err}");
    assert!(err.hint().unwrap().contains("layout"));
}

#[tokio::test]
async fn test_paywall_without_table_needs_login() {
    let page = HtmlSnapshot::new("<h1>Subscribe to see the portfolio</h1>")
        .with_url("https://example.com/portfolio-history");
    let err = pipeline::scrape_with_page(&page, &quick_extractor(), ScrapeMode::LatestMovements)
        .await
        .unwrap_err();
    assert!(
        matches!(err, PipelineError::Scrape(mirror_scraper::ScrapeError::LoginRequired { .. })),
        "unexpected error: {err}"
    );
}

#[tokio::test]
async fn test_journal_and_report_files() {
    let dir = tempfile::tempdir().unwrap();
    let journal_path = dir.path().join("journal.jsonl");

    let options = RunOptions {
        reference_date: Some(monday()),
        ..RunOptions::default()
    };
    let plan = scrape_plan(&options).await;

    let broker = ScriptedBroker {
        prices: HashMap::from([("NEM".to_string(), 45.20)]),
        ..ScriptedBroker::default()
    };
    let mut scheduler = scheduler().with_journal(OutcomeJournal::open(&journal_path).unwrap());
    let mut ctx = AccountContext::new("DU1", endpoint(), broker);
    let report = pipeline::trade(&plan, &mut scheduler, &mut ctx)
        .await
        .unwrap();

    let journaled = OutcomeJournal::read_run(&journal_path, "run-test").unwrap();
    assert_eq!(journaled.len(), 2);
    assert_eq!(journaled[1].status, OrderStatus::Skipped);
    assert_eq!(journaled[1].error.as_deref(), Some("no position"));

    let (json_path, text_path) = ReportWriter::new(dir.path().join("reports"))
        .write(&report)
        .unwrap();
    assert!(json_path.exists());
    assert!(std::fs::read_to_string(text_path)
        .unwrap()
        .contains("SELL CAT"));
}
