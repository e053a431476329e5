use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use smartmoney_core::aggregate::{self, AggregateInput, AggregateOptions, FinalReport};
use smartmoney_core::config::{PipelineOptions, Settings};
use smartmoney_core::indicators::IndicatorEngine;
use smartmoney_core::ingest::prices::{load_price_file, PRICES_FILE};
use smartmoney_core::ingest::provider::HttpJsonProvider;
use smartmoney_core::llm::anthropic::AnthropicClient;
use smartmoney_core::llm::summaries::{generate_missing, SummaryOptions};
use smartmoney_core::llm::TextGenerator;
use smartmoney_core::performance;
use smartmoney_core::retry::BackoffPolicy;
use smartmoney_core::signals::volume::VolumeAnalyzer;
use smartmoney_core::signals::{etf_flow, insider, institutional, options, risk, BatchOptions};
use smartmoney_core::storage::files::FileSnapshotStore;
use smartmoney_core::storage::lock::AnalysisDateLock;
use smartmoney_core::storage::postgres::PgSnapshotStore;
use smartmoney_core::storage::sector_cache::{SectorCache, SECTOR_CACHE_FILE};
use smartmoney_core::storage::summaries::{SummaryBook, SUMMARIES_FILE};
use smartmoney_core::storage::tables::{self, write_csv_atomic};
use smartmoney_core::storage::{self, write_json_atomic, SnapshotStore};
use smartmoney_core::time::market_date::resolve_analysis_date;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::Instrument;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod universe;

#[derive(Debug, Parser)]
#[command(name = "smartmoney_worker")]
struct Cli {
    /// Directory holding input tables and pipeline outputs. Overrides DATA_DIR.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Analysis date (YYYY-MM-DD). Defaults to the last complete US session.
    #[arg(long, global = true)]
    date: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Volume/price accumulation scores from the daily price table.
    Volume,
    /// Ownership, insider balance and short interest per ticker.
    Institutional,
    /// Sector/asset-class ETF flow proxies plus an AI digest.
    EtfFlows,
    /// Recent large insider purchases.
    Insider {
        #[arg(long, value_delimiter = ',')]
        tickers: Vec<String>,
    },
    /// Put/call volume and unusual contract counts.
    Options {
        #[arg(long, value_delimiter = ',')]
        tickers: Vec<String>,
    },
    /// Fill in missing bilingual AI summaries for the top quant rows.
    Summaries,
    /// Merge quant scores with summaries into the dated snapshot.
    Report,
    /// Re-price a stored snapshot (current one unless --date is given).
    Performance,
    /// Correlation and equal-weight volatility of the current picks.
    Risk {
        /// Analyze these instead of the stored picks.
        #[arg(long, value_delimiter = ',')]
        tickers: Vec<String>,
    },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Self::Volume => "volume",
            Self::Institutional => "institutional",
            Self::EtfFlows => "etf-flows",
            Self::Insider { .. } => "insider",
            Self::Options { .. } => "options",
            Self::Summaries => "summaries",
            Self::Report => "report",
            Self::Performance => "performance",
            Self::Risk { .. } => "risk",
        }
    }
}

/// Exit status a scheduler can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunOutcome {
    Completed,
    /// Another run holds the analysis date; nothing was written.
    Skipped,
}

impl RunOutcome {
    const SKIPPED_EXIT: u8 = 3;

    fn exit_code(self) -> u8 {
        match self {
            Self::Completed => 0,
            Self::Skipped => Self::SKIPPED_EXIT,
        }
    }
}

struct Ctx {
    settings: Settings,
    opts: PipelineOptions,
    data_dir: PathBuf,
    date_arg: Option<String>,
}

impl Ctx {
    fn path(&self, file: &str) -> PathBuf {
        self.data_dir.join(file)
    }

    fn analysis_date(&self) -> anyhow::Result<NaiveDate> {
        resolve_analysis_date(
            self.date_arg.as_deref(),
            Utc::now(),
            self.opts.market_utc_offset_hours,
        )
    }

    fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            delay: self.opts.request_delay,
            progress_every: self.opts.progress_every,
        }
    }

    fn provider(&self) -> anyhow::Result<HttpJsonProvider> {
        HttpJsonProvider::from_settings(&self.settings, &self.opts)
    }

    /// Sector lookups and price refreshes degrade gracefully without a provider.
    fn optional_provider(&self) -> Option<HttpJsonProvider> {
        match self.provider() {
            Ok(p) => Some(p),
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "market data provider not configured");
                None
            }
        }
    }

    fn text_generator(&self) -> anyhow::Result<AnthropicClient> {
        Ok(AnthropicClient::from_settings(&self.settings)?.with_backoff(BackoffPolicy::linear(
            self.opts.retry_base,
            self.opts.retry_max_attempts,
        )))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let cli = Cli::parse();
    let opts = PipelineOptions::from_env();
    opts.validate()?;

    let ctx = Ctx {
        data_dir: cli.data_dir.clone().unwrap_or_else(|| settings.data_dir.clone()),
        settings,
        opts,
        date_arg: cli.date.clone(),
    };

    let run_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("run", %run_id, command = cli.command.name());
    let result = run(&ctx, &cli.command).instrument(span).await;

    match result {
        Ok(outcome) => {
            tracing::info!(%run_id, ?outcome, "worker run finished");
            Ok(ExitCode::from(outcome.exit_code()))
        }
        Err(err) => {
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(%run_id, error = %format!("{err:#}"), "worker run failed");
            Err(err)
        }
    }
}

async fn run(ctx: &Ctx, command: &Command) -> anyhow::Result<RunOutcome> {
    let done = match command {
        Command::Volume => run_volume(ctx),
        Command::Institutional => run_institutional(ctx).await,
        Command::EtfFlows => run_etf_flows(ctx).await,
        Command::Insider { tickers } => run_insider(ctx, tickers).await,
        Command::Options { tickers } => run_options(ctx, tickers).await,
        Command::Summaries => run_summaries(ctx).await,
        Command::Report => return run_report(ctx).await,
        Command::Performance => run_performance(ctx).await,
        Command::Risk { tickers } => run_risk(ctx, tickers).await,
    };
    done.map(|()| RunOutcome::Completed)
}

fn run_volume(ctx: &Ctx) -> anyhow::Result<()> {
    let prices = load_price_file(&ctx.path(PRICES_FILE))?;
    for err in prices.rejected.iter().take(10) {
        tracing::warn!(error = %err, "rejected price series");
    }
    tracing::info!(
        tickers = prices.series.len(),
        rejected = prices.rejected.len(),
        skipped_rows = prices.skipped_rows,
        "price table loaded"
    );

    let analyzer = VolumeAnalyzer::new(IndicatorEngine::with_surge_threshold(ctx.opts.surge_threshold));
    let (signals, _) = analyzer.run(&prices.series, ctx.opts.progress_every);

    let out = ctx.path(tables::VOLUME_FILE);
    write_csv_atomic(&out, &signals)?;
    tracing::info!(rows = signals.len(), path = %out.display(), "volume analysis saved");
    Ok(())
}

async fn run_institutional(ctx: &Ctx) -> anyhow::Result<()> {
    let provider = ctx.provider()?;
    let tickers = universe::load_universe(&ctx.data_dir)?;
    let (signals, _) = institutional::run(&provider, &tickers, &ctx.batch_options()).await;

    let out = ctx.path(tables::INSTITUTIONAL_FILE);
    write_csv_atomic(&out, &signals)?;
    tracing::info!(rows = signals.len(), path = %out.display(), "institutional analysis saved");
    Ok(())
}

async fn run_etf_flows(ctx: &Ctx) -> anyhow::Result<()> {
    let provider = ctx.provider()?;
    let (signals, _) = etf_flow::run(&provider, &ctx.batch_options()).await;

    let out = ctx.path(tables::ETF_FLOWS_FILE);
    write_csv_atomic(&out, &signals)?;
    tracing::info!(rows = signals.len(), path = %out.display(), "ETF flows saved");

    let generator = match ctx.text_generator() {
        Ok(g) => Some(g),
        Err(err) => {
            tracing::warn!(error = %format!("{err:#}"), "text generator not configured");
            None
        }
    };
    let digest = etf_flow::build_digest(
        &signals,
        generator.as_ref().map(|g| g as &dyn TextGenerator),
        Utc::now(),
    )
    .await;
    write_json_atomic(&ctx.path(etf_flow::FLOW_DIGEST_FILE), &digest)?;
    Ok(())
}

async fn run_insider(ctx: &Ctx, explicit: &[String]) -> anyhow::Result<()> {
    let provider = ctx.provider()?;
    let as_of = ctx.analysis_date()?;
    let tickers = universe::watchlist(explicit);
    let (report, _) = insider::run(&provider, &tickers, as_of, &ctx.batch_options()).await;

    let out = ctx.path(insider::INSIDER_FILE);
    write_json_atomic(&out, &report)?;
    tracing::info!(tickers = report.details.len(), path = %out.display(), "insider moves saved");
    Ok(())
}

async fn run_options(ctx: &Ctx, explicit: &[String]) -> anyhow::Result<()> {
    let provider = ctx.provider()?;
    let tickers = universe::watchlist(explicit);
    let (report, _) = options::run(&provider, &tickers, &ctx.batch_options()).await;

    let out = ctx.path(options::OPTIONS_FILE);
    write_json_atomic(&out, &report)?;
    tracing::info!(tickers = report.options_flow.len(), path = %out.display(), "options flow saved");
    Ok(())
}

async fn run_summaries(ctx: &Ctx) -> anyhow::Result<()> {
    let generator = ctx.text_generator()?;
    let quants = tables::load_quant_scores(&ctx.path(tables::QUANT_FILE))?;
    let path = ctx.path(SUMMARIES_FILE);
    let mut book = SummaryBook::load(&path)?;

    let opts = SummaryOptions {
        top_n: ctx.opts.summary_top_n,
        max_age: ctx.opts.summary_max_age_days.map(chrono::Duration::days),
        delay: ctx.opts.request_delay,
    };
    let stats = generate_missing(&generator, &mut book, &quants, &opts, &path, Utc::now()).await?;
    if stats.generated == 0 && stats.failed > 0 {
        tracing::warn!(failed = stats.failed, "no summaries generated this run");
    }
    Ok(())
}

async fn run_report(ctx: &Ctx) -> anyhow::Result<RunOutcome> {
    let analysis_date = ctx.analysis_date()?;
    let quants = tables::load_quant_scores(&ctx.path(tables::QUANT_FILE))?;
    let book = SummaryBook::load(&ctx.path(SUMMARIES_FILE))?;

    let mut sectors = SectorCache::load(ctx.path(SECTOR_CACHE_FILE));
    let known = sectors.lookup_all(quants.iter().map(|q| q.ticker.as_str()));

    let mut snapshot = aggregate::aggregate(
        AggregateInput {
            quants: &quants,
            sentiment: book.entries(),
            sectors: &known,
        },
        AggregateOptions::from(&ctx.opts),
        analysis_date,
        Utc::now(),
    );

    if let Some(provider) = ctx.optional_provider() {
        for pick in snapshot
            .picks
            .iter_mut()
            .filter(|p| p.sector == aggregate::MISSING_SECTOR)
        {
            pick.sector = sectors.resolve(&pick.ticker, &provider).await;
        }
        if let Err(err) = sectors.save_if_dirty() {
            tracing::warn!(error = %err, "sector cache not saved");
        }
    }

    write_json_atomic(
        &ctx.path(aggregate::FINAL_REPORT_FILE),
        &FinalReport::from(&snapshot),
    )?;

    match ctx.settings.database_url.as_deref() {
        Some(db_url) => {
            let pool = connect(db_url).await?;
            let Some(lock) = AnalysisDateLock::try_acquire(&pool, analysis_date).await? else {
                tracing::info!(%analysis_date, "another run holds the analysis date; snapshot not written");
                return Ok(RunOutcome::Skipped);
            };
            let saved = PgSnapshotStore::new(pool.clone()).save(&snapshot).await;
            if let Err(err) = lock.release().await {
                tracing::warn!(error = %format!("{err:#}"), "report lock not released");
            }
            saved?;
        }
        None => FileSnapshotStore::new(&ctx.data_dir).save(&snapshot).await?,
    }

    tracing::info!(%analysis_date, picks = snapshot.picks.len(), "report finished");
    Ok(RunOutcome::Completed)
}

async fn run_performance(ctx: &Ctx) -> anyhow::Result<()> {
    let store = open_store(ctx).await?;
    let snapshot = match ctx.date_arg.as_deref() {
        Some(_) => {
            let date = ctx.analysis_date()?;
            store
                .load(date)
                .await?
                .with_context(|| format!("no snapshot stored for {date}"))?
        }
        None => store.current().await?.context("no current snapshot stored")?,
    };

    let tickers: Vec<String> = snapshot.picks.iter().map(|p| p.ticker.clone()).collect();
    let prices = match ctx.optional_provider() {
        Some(provider) => {
            performance::fetch_current_prices(&provider, &tickers, ctx.opts.request_delay).await
        }
        None => Default::default(),
    };

    let report = performance::track(&snapshot, &prices);
    tracing::info!(
        date = %report.analysis_date,
        picks = report.summary.total,
        avg_performance = report.summary.avg_performance,
        "performance tracked"
    );
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("serialize performance report failed")?
    );
    Ok(())
}

async fn run_risk(ctx: &Ctx, explicit: &[String]) -> anyhow::Result<()> {
    let tickers: Vec<String> = if explicit.is_empty() {
        let snapshot = open_store(ctx)
            .await?
            .current()
            .await?
            .context("no current snapshot stored; pass --tickers")?;
        snapshot.picks.into_iter().map(|p| p.ticker).collect()
    } else {
        explicit.iter().map(|t| t.trim().to_uppercase()).collect()
    };

    let provider = ctx.provider()?;
    let (report, _) = risk::run(&provider, &tickers, &ctx.batch_options()).await?;

    let out = ctx.path(risk::PORTFOLIO_RISK_FILE);
    write_json_atomic(&out, &report)?;
    tracing::info!(volatility = report.volatility, path = %out.display(), "portfolio risk saved");
    Ok(())
}

async fn open_store(ctx: &Ctx) -> anyhow::Result<Box<dyn SnapshotStore>> {
    Ok(match ctx.settings.database_url.as_deref() {
        Some(db_url) => Box::new(PgSnapshotStore::new(connect(db_url).await?)),
        None => Box::new(FileSnapshotStore::new(&ctx.data_dir)),
    })
}

async fn connect(db_url: &str) -> anyhow::Result<sqlx::PgPool> {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;
    storage::migrate(&pool).await?;
    Ok(pool)
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
