//! quant-mirror - scrape a model portfolio and mirror its movements.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use mirror_common::{init_logging, Config, OrderTypeSetting};
use mirror_scraper::{
    needs_login, BrowserSession, PortfolioRecord, ScrapeMode, SessionConfig, TableExtractor,
};
use mirror_trading::pipeline::{self, Plan, RunOptions};
use mirror_trading::{
    AccountContext, ActionConverter, BrokerEndpoint, Brokerage, OrderScheduler, OutcomeJournal,
    PipelineError, ReportWriter, SchedulerConfig, Sizing, TwsBroker,
};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Mirror a subscription model portfolio into an Interactive Brokers account.
#[derive(Parser, Debug)]
#[command(name = "quant-mirror")]
#[command(version)]
#[command(about = "Scrape model-portfolio movements and place matching orders.", long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.quantmirror/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scrape, convert and trade (default)
    Run(RunArgs),
    /// Scrape only and print the parsed records
    Scrape {
        #[command(flatten)]
        scrape: ScrapeArgs,

        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },
    /// Open a headed browser so the profile can be logged in once
    Login,
    /// List the accounts managed by the connected terminal
    Accounts,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum ModeArg {
    Current,
    Latest,
    All,
}

impl From<ModeArg> for ScrapeMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Current => ScrapeMode::CurrentPicks,
            ModeArg::Latest => ScrapeMode::LatestMovements,
            ModeArg::All => ScrapeMode::AllHistory,
        }
    }
}

#[derive(Args, Debug, Default)]
struct ScrapeArgs {
    /// Which table to read
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Keep every dated movement instead of the target Friday
    #[arg(long)]
    all: bool,

    /// Run the browser without a window
    #[arg(long, conflicts_with = "headed")]
    headless: bool,

    /// Run the browser with a window
    #[arg(long)]
    headed: bool,

    /// Reference date for the Friday filter (YYYY-MM-DD)
    #[arg(long)]
    reference_date: Option<NaiveDate>,

    /// Filter on the newest date in the table
    #[arg(long)]
    latest_available: bool,
}

impl ScrapeArgs {
    fn options(&self) -> RunOptions {
        RunOptions {
            mode: self.mode.map_or(ScrapeMode::LatestMovements, ScrapeMode::from),
            all: self.all,
            latest_available: self.latest_available,
            reference_date: self.reference_date,
        }
    }

    fn apply(&self, config: &mut Config) {
        if self.headless {
            config.scraper.headless = true;
        }
        if self.headed {
            config.scraper.headless = false;
        }
    }
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    #[command(flatten)]
    scrape: ScrapeArgs,

    /// Brokerage account (defaults to the first managed account)
    #[arg(long)]
    account: Option<String>,

    /// Dollars per BUY
    #[arg(long)]
    amount: Option<f64>,

    /// Place limit orders around the last price
    #[arg(long)]
    limit: bool,

    /// Print the actions without connecting to the broker
    #[arg(long)]
    dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(long, short, alias = "auto")]
    yes: bool,
}

impl RunArgs {
    fn apply(&self, config: &mut Config) -> Result<()> {
        self.scrape.apply(config);
        if let Some(account) = &self.account {
            config.broker.account = account.clone();
        }
        if let Some(amount) = self.amount {
            if !(amount.is_finite() && amount > 0.0) {
                bail!("--amount must be a positive number, got {amount}");
            }
            config.trading.dollar_amount = amount;
        }
        if self.limit {
            config.trading.order_type = OrderTypeSetting::Limit;
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load()?,
    };
    if let Some(level) = &cli.log_level {
        config.observability.log_level = level.clone();
    }

    init_logging(&config.observability)?;

    tracing::info!("quant-mirror v{}", env!("CARGO_PKG_VERSION"));

    match cli.command.unwrap_or(Commands::Run(RunArgs::default())) {
        Commands::Run(args) => run(config, args).await,
        Commands::Scrape { scrape, json } => scrape_only(config, scrape, json).await,
        Commands::Login => login(config).await,
        Commands::Accounts => accounts(config).await,
    }
}

async fn run(mut config: Config, args: RunArgs) -> Result<()> {
    args.apply(&mut config)?;
    let options = args.scrape.options();

    let scrape = pipeline::scrape_live(
        &config.scraper,
        SessionConfig::from(&config.scraper),
        options.mode,
    )
    .await
    .map_err(fatal)?;

    let converter = ActionConverter::new(options.converter_config(
        config.trading.dollar_amount,
        config.trading.rebalance_deadband_pct,
    ));
    let plan = pipeline::plan(scrape, &options, &converter);
    print_plan(&plan);

    if args.dry_run {
        tracing::info!("Dry run, no orders placed");
        return Ok(());
    }
    if !args.yes && !confirm(&plan).await? {
        println!("Aborted.");
        return Ok(());
    }

    let mut scheduler = OrderScheduler::new(SchedulerConfig::from(&config));
    if config.reports.journal {
        let path = config.reports.dir().join("journal.jsonl");
        let journal = OutcomeJournal::open(&path)
            .with_context(|| format!("opening outcome journal {}", path.display()))?;
        scheduler = scheduler.with_journal(journal);
    }

    let mut ctx = AccountContext::new(
        config.broker.account.clone(),
        BrokerEndpoint::from(&config.broker),
        TwsBroker::new(&config.broker),
    );
    let report = pipeline::trade(&plan, &mut scheduler, &mut ctx)
        .await
        .map_err(fatal)?;

    println!("{}", report.to_text_report());

    let (json_path, text_path) = ReportWriter::new(config.reports.dir())
        .write(&report)
        .map_err(|e| fatal(PipelineError::Report(e)))?;
    println!("Report: {}", json_path.display());
    println!("        {}", text_path.display());
    Ok(())
}

async fn scrape_only(mut config: Config, args: ScrapeArgs, json: bool) -> Result<()> {
    args.apply(&mut config);
    let options = args.options();

    let scrape = pipeline::scrape_live(
        &config.scraper,
        SessionConfig::from(&config.scraper),
        options.mode,
    )
    .await
    .map_err(fatal)?;

    let filter = options.filter();
    let records = filter.apply(scrape.records);

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    println!(
        "{} ({} rows, {} dropped, strategy {})",
        options.mode, scrape.total_rows, scrape.dropped_rows, scrape.strategy
    );
    print_records(&records);
    Ok(())
}

async fn login(mut config: Config) -> Result<()> {
    config.scraper.headless = false;
    let session = BrowserSession::launch(SessionConfig::from(&config.scraper))
        .await
        .context("launching browser")?;

    let outcome = async {
        let page = session.open(&config.scraper.current_picks_url).await?;
        println!("Log in inside the browser window, then press Enter here.");
        read_line().await?;
        let walled = needs_login(&page).await?;
        let table = TableExtractor::default().scan_once(&page).await?;
        Ok::<_, anyhow::Error>((walled, table.is_some()))
    }
    .await;

    if let Err(e) = session.close().await {
        tracing::warn!(error = %e, "Browser close failed");
    }

    let (walled, table_visible) = outcome?;
    if walled {
        bail!("still not logged in; the page shows a login or subscribe prompt");
    }
    if !table_visible {
        bail!("no login prompt, but the portfolio table is not visible either");
    }
    println!(
        "Logged in. Profile saved at {}",
        config.scraper.profile_dir().display()
    );
    Ok(())
}

async fn accounts(config: Config) -> Result<()> {
    let endpoint = BrokerEndpoint::from(&config.broker);
    let mut broker = TwsBroker::new(&config.broker);
    broker
        .connect(&endpoint)
        .await
        .map_err(|e| fatal(e.into()))?;

    let listed = broker.managed_accounts().await;
    if let Err(e) = broker.disconnect().await {
        tracing::warn!(error = %e, "Disconnect failed");
    }

    for account in listed? {
        println!("{account}");
    }
    Ok(())
}

/// Log the follow-up hint and hand the error to anyhow.
fn fatal(e: PipelineError) -> anyhow::Error {
    if let Some(hint) = e.hint() {
        tracing::error!(error = %e, hint, "Run aborted");
    }
    anyhow::Error::new(e)
}

fn print_plan(plan: &Plan) {
    let date = plan
        .target_date
        .map_or_else(|| "-".to_string(), |d| d.format("%Y-%m-%d").to_string());
    println!(
        "{}: {} scraped, {} kept for {}, {} rows unparseable",
        plan.mode,
        plan.scraped,
        plan.records.len(),
        date,
        plan.dropped_rows
    );
    for warning in &plan.conversion.warnings {
        println!("  skipped {warning}");
    }
    if plan.conversion.actions.is_empty() {
        println!("No actions.");
        return;
    }
    println!("Actions:");
    for action in &plan.conversion.actions {
        println!("  {action}");
    }
}

fn print_records(records: &[PortfolioRecord]) {
    if records.is_empty() {
        println!("No records.");
        return;
    }
    let opt = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |v| format!("{v:.2}"));
    for r in records {
        let date = r
            .date
            .map_or_else(|| "-".to_string(), |d| d.format("%Y-%m-%d").to_string());
        println!(
            "  {:<8} {:<10} {:<10} weight {:>7}  result {:>7}  price {:>9}",
            r.symbol,
            date,
            r.action.to_string(),
            opt(r.weight),
            opt(r.resulting_weight),
            opt(r.price)
        );
    }
}

async fn confirm(plan: &Plan) -> Result<bool> {
    let buys = plan
        .conversion
        .actions
        .iter()
        .filter_map(|a| match a.sizing {
            Sizing::DollarAmount(usd) => Some(usd),
            Sizing::FullClose => None,
        })
        .sum::<f64>();
    println!(
        "Place {} orders (up to ${buys:.2} of BUYs)? [y/N]",
        plan.conversion.actions.len()
    );
    let answer = read_line().await?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

async fn read_line() -> Result<String> {
    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("reading stdin")?;
    Ok(line)
}
