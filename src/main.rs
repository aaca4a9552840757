//! Command-line entry point: `research`, `analytics`, and `ingestion`
//! subcommands, each accepting `--format table|json|csv` and exiting 0 on
//! success, 1 on error. Uses the same `clap` derive `Cli`/`Subcommand`
//! structuring and `tracing_subscriber` setup as the rest of this crate's
//! binaries.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::AtomicBool;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};

use callbench::application::executor::execute_policy;
use callbench::application::optimizer::{run_optimizer, GridSpec, OptimizerReport};
use callbench::application::reporting::{self, OutputFormat};
use callbench::config::Config;
use callbench::domain::call::{CallRecord, Chain};
use callbench::domain::candle::CandleInterval;
use callbench::domain::path_metrics::compute_path_metrics;
use callbench::domain::policy::RiskPolicy;
use callbench::domain::ports::{IngestionSpec, MarketDataPort, OhlcvIngestionPort};
use callbench::domain::run_id::compute_run_id;
use callbench::infrastructure::ingestion::StubIngestionAdapter;
use callbench::infrastructure::market_data::CsvMarketDataAdapter;

#[derive(Parser)]
#[command(author, version, about = "Deterministic call risk-policy backtester and grid-search optimizer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Root directory the CSV market data adapter reads candles from.
    #[arg(long, global = true, default_value = "data/candles")]
    candles_dir: PathBuf,

    /// Output format for any command that renders a result set.
    #[arg(long, global = true, default_value = "table")]
    format: String,
}

#[derive(Subcommand)]
enum Commands {
    #[command(subcommand)]
    Research(ResearchCommand),
    #[command(subcommand)]
    Analytics(AnalyticsCommand),
    #[command(subcommand)]
    Ingestion(IngestionCommand),
}

#[derive(Subcommand)]
enum ResearchCommand {
    /// Replay a single call against one fixed-stop policy.
    Run {
        #[arg(long)]
        mint: String,
        #[arg(long, default_value = "solana")]
        chain: String,
        #[arg(long)]
        caller: String,
        #[arg(long)]
        alert_ts_ms: i64,
        #[arg(long, default_value = "0.2")]
        stop_pct: String,
        #[arg(long)]
        take_profit_pct: Option<String>,
    },
    /// Re-render a previously saved sweep report from the artifacts dir.
    Replay {
        #[arg(long)]
        run_id: String,
    },
    /// Run `sweep` independently over every manifest in a directory.
    Batch {
        #[arg(long)]
        manifests_dir: PathBuf,
    },
    /// Run the full policy grid against a CSV manifest of calls.
    Sweep {
        /// CSV with columns call_id,caller_name,mint,chain,alert_ts_ms,alert_price
        #[arg(long)]
        calls_csv: PathBuf,
    },
    /// List saved run reports under the artifacts directory.
    List,
    /// Print one saved run report.
    Show {
        #[arg(long)]
        run_id: String,
    },
    /// Merge every saved run's best policy into one cross-run ranking.
    Leaderboard,
    /// Print the canonical id a fixed-stop policy would get, without running it.
    CreatePolicy {
        #[arg(long, default_value = "0.2")]
        stop_pct: String,
        #[arg(long)]
        take_profit_pct: Option<String>,
    },
}

#[derive(Subcommand)]
enum AnalyticsCommand {
    /// Compute truth-layer path metrics for one call.
    Analyze {
        #[arg(long)]
        mint: String,
        #[arg(long, default_value = "solana")]
        chain: String,
        #[arg(long)]
        caller: String,
        #[arg(long)]
        alert_ts_ms: i64,
    },
    /// Print the stored metrics for a saved run (currently: re-run analyze).
    Metrics {
        #[arg(long)]
        mint: String,
        #[arg(long, default_value = "solana")]
        chain: String,
        #[arg(long)]
        caller: String,
        #[arg(long)]
        alert_ts_ms: i64,
    },
    /// Re-render a saved sweep report in a different format.
    Report {
        #[arg(long)]
        run_id: String,
    },
}

#[derive(Subcommand)]
enum IngestionCommand {
    /// Plan (but do not execute) an OHLCV fetch for a list of mints.
    Ohlcv {
        #[arg(long, value_delimiter = ',')]
        mints: Vec<String>,
        #[arg(long, default_value = "solana")]
        chain: String,
        #[arg(long, default_value = "1m")]
        interval: String,
        #[arg(long)]
        from_s: i64,
        #[arg(long)]
        to_s: i64,
    },
    /// Plan a narrow fetch around a single alert timestamp.
    SurgicalFetch {
        #[arg(long)]
        mint: String,
        #[arg(long, default_value = "solana")]
        chain: String,
        #[arg(long)]
        alert_ts_ms: i64,
    },
    /// Check (without fetching) whether coverage exists for a window.
    EnsureCoverage {
        #[arg(long, value_delimiter = ',')]
        mints: Vec<String>,
        #[arg(long, default_value = "solana")]
        chain: String,
        #[arg(long)]
        from_s: i64,
        #[arg(long)]
        to_s: i64,
    },
}

fn main() {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok();
    dotenvy::dotenv().ok();

    if let Err(e) = run() {
        error!("{e:#}");
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env().context("loading configuration")?;
    let format = OutputFormat::from_str(&cli.format).map_err(|e| anyhow::anyhow!(e))?;
    let market_data = CsvMarketDataAdapter::new(&cli.candles_dir);

    match cli.command {
        Commands::Research(cmd) => run_research(cmd, &config, &market_data, format),
        Commands::Analytics(cmd) => run_analytics(cmd, &market_data),
        Commands::Ingestion(cmd) => run_ingestion(cmd),
    }
}

fn run_id_path(config: &Config, run_id: &str) -> PathBuf {
    config.storage.artifacts_dir.join("runs").join(format!("{run_id}.json"))
}

fn run_research(
    cmd: ResearchCommand,
    config: &Config,
    market_data: &CsvMarketDataAdapter,
    format: OutputFormat,
) -> Result<()> {
    match cmd {
        ResearchCommand::Run { mint, chain, caller, alert_ts_ms, stop_pct, take_profit_pct } => {
            let chain = Chain::from_str(&chain).context("parsing --chain")?;
            let stop_pct = rust_decimal::Decimal::from_str(&stop_pct).context("parsing --stop-pct")?;
            let take_profit_pct =
                take_profit_pct.map(|v| rust_decimal::Decimal::from_str(&v)).transpose().context("parsing --take-profit-pct")?;
            let policy = RiskPolicy::FixedStop { stop_pct, take_profit_pct };
            policy.validate().context("invalid policy parameters")?;

            let candles = market_data
                .fetch_ohlcv(&mint, chain, CandleInterval::Min1, 0, i64::MAX / 1000)
                .context("fetching candles")?;
            let fees = config.fees;
            let result = execute_policy(&candles, alert_ts_ms, &policy, &fees);
            let run_id = compute_run_id("research-run", Some(&policy.canonical_id()), &mint, alert_ts_ms, Some(&caller));
            info!(run_id = %run_id, policy = %policy.canonical_id(), "executed policy");
            print_formatted(&result, format)
        }
        ResearchCommand::Sweep { calls_csv } => {
            let calls = read_calls_csv(&calls_csv)?;
            let candles_by_call = load_candles_for_calls(market_data, &calls)?;
            let grid = config.grid.clone();
            let cancel = AtomicBool::new(false);
            let report = run_optimizer(&calls, &candles_by_call, &grid, &config.fees, &config.scoring, &cancel);
            let run_id = compute_run_id("research-sweep", None, &calls_csv.display().to_string(), 0, None);
            let rendered = reporting::render_report(&report, format);
            let out_path = run_id_path(config, &run_id);
            reporting::write_output(&reporting::render_report(&report, OutputFormat::Json), Some(out_path.as_path()))?;
            reporting::print_best(report.best_feasible());
            println!("run_id: {run_id}");
            println!("{rendered}");
            Ok(())
        }
        ResearchCommand::Batch { manifests_dir } => {
            let entries = std::fs::read_dir(&manifests_dir).context("reading manifests directory")?;
            for entry in entries {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) != Some("csv") {
                    continue;
                }
                info!(manifest = %path.display(), "running batch sweep");
                run_research(ResearchCommand::Sweep { calls_csv: path }, config, market_data, format)?;
            }
            Ok(())
        }
        ResearchCommand::List => {
            let dir = config.storage.artifacts_dir.join("runs");
            if !dir.exists() {
                println!("no saved runs under {}", dir.display());
                return Ok(());
            }
            for entry in std::fs::read_dir(&dir).context("reading runs directory")? {
                let path = entry?.path();
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    println!("{stem}");
                }
            }
            Ok(())
        }
        ResearchCommand::Show { run_id } => {
            let path = run_id_path(config, &run_id);
            let contents = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
            println!("{contents}");
            Ok(())
        }
        ResearchCommand::Replay { run_id } => {
            let path = run_id_path(config, &run_id);
            let contents = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
            let report: OptimizerReport = serde_json::from_str(&contents).context("parsing saved report")?;
            println!("{}", reporting::render_report(&report, format));
            Ok(())
        }
        ResearchCommand::Leaderboard => {
            let dir = config.storage.artifacts_dir.join("runs");
            let mut best_per_run = Vec::new();
            if dir.exists() {
                for entry in std::fs::read_dir(&dir).context("reading runs directory")? {
                    let path = entry?.path();
                    let Ok(contents) = std::fs::read_to_string(&path) else { continue };
                    let Ok(report) = serde_json::from_str::<OptimizerReport>(&contents) else { continue };
                    if let Some(best) = report.ranked.first() {
                        let run_id = path.file_stem().and_then(|s| s.to_str()).unwrap_or("?").to_string();
                        best_per_run.push((run_id, best.clone()));
                    }
                }
            }
            best_per_run.sort_by(|a, b| rank_across_runs(&a.1.score, &b.1.score));
            for (i, (run_id, eval)) in best_per_run.iter().enumerate() {
                println!("{:<4} | {:<32} | {}", i + 1, run_id, eval.policy_id);
            }
            Ok(())
        }
        ResearchCommand::CreatePolicy { stop_pct, take_profit_pct } => {
            let stop_pct = rust_decimal::Decimal::from_str(&stop_pct).context("parsing --stop-pct")?;
            let take_profit_pct =
                take_profit_pct.map(|v| rust_decimal::Decimal::from_str(&v)).transpose().context("parsing --take-profit-pct")?;
            let policy = RiskPolicy::FixedStop { stop_pct, take_profit_pct };
            policy.validate().context("invalid policy parameters")?;
            println!("{}", policy.canonical_id());
            Ok(())
        }
    }
}

fn rank_across_runs(a: &callbench::domain::scoring::PolicyScore, b: &callbench::domain::scoring::PolicyScore) -> std::cmp::Ordering {
    use callbench::domain::scoring::PolicyScore::{Feasible, Infeasible};
    use std::cmp::Ordering;
    match (a, b) {
        (Feasible(va), Feasible(vb)) => vb.cmp(va),
        (Feasible(_), Infeasible { .. }) => Ordering::Less,
        (Infeasible { .. }, Feasible(_)) => Ordering::Greater,
        (Infeasible { violations: va }, Infeasible { violations: vb }) => va.cmp(vb),
    }
}

fn run_analytics(cmd: AnalyticsCommand, market_data: &CsvMarketDataAdapter) -> Result<()> {
    match cmd {
        AnalyticsCommand::Analyze { mint, chain, caller, alert_ts_ms }
        | AnalyticsCommand::Metrics { mint, chain, caller, alert_ts_ms } => {
            let chain = Chain::from_str(&chain).context("parsing --chain")?;
            let candles = market_data
                .fetch_ohlcv(&mint, chain, CandleInterval::Min1, 0, i64::MAX / 1000)
                .context("fetching candles")?;
            let call = CallRecord { call_id: mint.clone(), caller_name: caller, mint, chain, alert_ts_ms, alert_price: None };
            call.validate().context("invalid call record")?;
            let run_id = compute_run_id("analytics", None, &call.mint, alert_ts_ms, Some(&call.caller_name));
            match compute_path_metrics(&run_id, &call, &candles, CandleInterval::Min1, 50) {
                Some(row) => println!("{}", serde_json::to_string_pretty(&row)?),
                None => println!("no path metrics: no candle at or after the alert"),
            }
            Ok(())
        }
        AnalyticsCommand::Report { run_id: _ } => {
            bail!("analytics report requires a saved run; use `research show`/`research replay` instead")
        }
    }
}

fn run_ingestion(cmd: IngestionCommand) -> Result<()> {
    let adapter = StubIngestionAdapter;
    match cmd {
        IngestionCommand::Ohlcv { mints, chain, interval, from_s, to_s } => {
            let chain = Chain::from_str(&chain).context("parsing --chain")?;
            let interval = CandleInterval::from_str(&interval).context("parsing --interval")?;
            let spec = IngestionSpec {
                duckdb_path: "artifacts/calls.duckdb".into(),
                chain,
                interval,
                from_s,
                to_s,
                pre_window_min: 0,
                post_window_min: 0,
                mints: Some(mints),
                check_coverage: false,
                rate_limit_ms: 50,
                max_retries: 3,
            };
            let summary = adapter.ingest(&spec).map_err(|e| anyhow::anyhow!(e.to_string()))?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        IngestionCommand::SurgicalFetch { mint, chain, alert_ts_ms } => {
            let chain = Chain::from_str(&chain).context("parsing --chain")?;
            let alert_s = alert_ts_ms / 1000;
            let spec = IngestionSpec {
                duckdb_path: "artifacts/calls.duckdb".into(),
                chain,
                interval: CandleInterval::Sec15,
                from_s: alert_s,
                to_s: alert_s,
                pre_window_min: 5,
                post_window_min: 60,
                mints: Some(vec![mint]),
                check_coverage: true,
                rate_limit_ms: 50,
                max_retries: 3,
            };
            let summary = adapter.ingest(&spec).map_err(|e| anyhow::anyhow!(e.to_string()))?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        IngestionCommand::EnsureCoverage { mints, chain, from_s, to_s } => {
            let chain = Chain::from_str(&chain).context("parsing --chain")?;
            let spec = IngestionSpec {
                duckdb_path: "artifacts/calls.duckdb".into(),
                chain,
                interval: CandleInterval::Min1,
                from_s,
                to_s,
                pre_window_min: 0,
                post_window_min: 0,
                mints: Some(mints),
                check_coverage: true,
                rate_limit_ms: 50,
                max_retries: 3,
            };
            let summary = adapter.ingest(&spec).map_err(|e| anyhow::anyhow!(e.to_string()))?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
    }
}

fn print_formatted<T: serde::Serialize>(value: &T, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Table | OutputFormat::Csv => println!("{}", serde_json::to_string(value)?),
    }
    Ok(())
}

fn read_calls_csv(path: &PathBuf) -> Result<Vec<CallRecord>> {
    let mut reader = csv::Reader::from_path(path).with_context(|| format!("opening {}", path.display()))?;
    let mut calls = Vec::new();
    for record in reader.deserialize::<CallRecord>() {
        let call = record.context("parsing call record")?;
        call.validate().with_context(|| format!("invalid call {}", call.call_id))?;
        calls.push(call);
    }
    Ok(calls)
}

fn load_candles_for_calls(
    market_data: &CsvMarketDataAdapter,
    calls: &[CallRecord],
) -> Result<HashMap<String, Vec<callbench::domain::candle::Candle>>> {
    let mut out = HashMap::new();
    for call in calls {
        match market_data.fetch_ohlcv(&call.mint, call.chain, CandleInterval::Min1, 0, i64::MAX / 1000) {
            Ok(candles) => {
                out.insert(call.call_id.clone(), candles);
            }
            Err(e) => {
                info!(call_id = %call.call_id, error = %e, "skipping call with no candle coverage");
            }
        }
    }
    Ok(out)
}
