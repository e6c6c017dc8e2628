use std::path::PathBuf;

use anyhow::{bail, Context as _, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use liquidity_hunter::engine::session::ClockRecord;
use liquidity_hunter::feed::{self, CsvCandleRepository};
use liquidity_hunter::settings::Settings;
use liquidity_hunter::types::{RawBar, RunMode};
use liquidity_hunter::venue::HttpVenue;
use liquidity_hunter::Context;

#[derive(Parser)]
#[command(name = "liquidity-hunter", about = "Liquidity-hunt pattern detection engine")]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay historical candles from a CSV file
    Backtest {
        /// Candle CSV (pair,period,open,high,low,close,close_time)
        #[arg(long)]
        candles: PathBuf,
        /// Settings overrides (JSON array of {key, value, parse_to})
        #[arg(long)]
        settings: Option<PathBuf>,
        /// Session records (JSON array of {title, start, end})
        #[arg(long)]
        sessions: Option<PathBuf>,
        /// Work-time records (same format as sessions)
        #[arg(long)]
        worktimes: Option<PathBuf>,
        /// Range start, unix seconds (falls back to BackTestStartUTCUnix)
        #[arg(long)]
        start: Option<i64>,
        /// Range end, unix seconds (falls back to BackTestEndUTCUnix)
        #[arg(long)]
        end: Option<i64>,
        /// Bars per replay chunk
        #[arg(long)]
        chunk_size: Option<usize>,
        /// Write the final engine snapshot here as JSON
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Consume NDJSON bars from stdin and trade against an HTTP venue
    Live {
        #[arg(long)]
        settings: Option<PathBuf>,
        #[arg(long)]
        sessions: Option<PathBuf>,
        #[arg(long)]
        worktimes: Option<PathBuf>,
        /// Position endpoint
        #[arg(long, default_value = "http://127.0.0.1:5000/positions", env = "VENUE_URL")]
        venue_url: String,
    },
}

#[derive(Debug, Deserialize)]
struct ClockSpec {
    title: String,
    start: String,
    end: String,
}

fn load_settings(path: &Option<PathBuf>) -> Result<Settings> {
    match path {
        Some(path) => Settings::from_overrides_file(path),
        None => Ok(Settings::seeded()),
    }
}

fn load_clock_records(path: &Option<PathBuf>) -> Result<Vec<ClockRecord>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading clock records {}", path.display()))?;
    let specs: Vec<ClockSpec> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing clock records {}", path.display()))?;
    specs
        .into_iter()
        .map(|s| ClockRecord::new(s.title, &s.start, &s.end))
        .collect()
}

#[allow(clippy::too_many_arguments)]
fn run_backtest(
    candles: &PathBuf,
    settings: Settings,
    sessions: Vec<ClockRecord>,
    worktimes: Vec<ClockRecord>,
    start: Option<i64>,
    end: Option<i64>,
    chunk_size: Option<usize>,
    report: Option<PathBuf>,
) -> Result<()> {
    let Some(start) = start.or_else(|| settings.int("BackTestStartUTCUnix")) else {
        bail!("backtest start missing: pass --start or set BackTestStartUTCUnix");
    };
    let Some(end) = end.or_else(|| settings.int("BackTestEndUTCUnix")) else {
        bail!("backtest end missing: pass --end or set BackTestEndUTCUnix");
    };
    let chunk_size =
        chunk_size.unwrap_or_else(|| settings.int_or("BackTestChunkSize", 10_000) as usize);

    let mut ctx = Context::new(RunMode::Backtest, settings);
    ctx.sessions.load_records(sessions);
    ctx.worktimes.load_records(worktimes);

    let repo = CsvCandleRepository::open(candles)?;
    let total = feed::replay(&mut ctx, &repo, start, end, chunk_size)?;
    info!(
        bars = total,
        liquidity = ctx.liquidity.ring.len(),
        shifts = ctx.shifts.ring.len(),
        blocks = ctx.blocks.ring.len(),
        signals = ctx.signals.ring.len(),
        "backtest complete"
    );

    if let Some(report) = report {
        let snapshot = serde_json::to_string_pretty(&ctx.snapshot())?;
        std::fs::write(&report, snapshot)
            .with_context(|| format!("writing report {}", report.display()))?;
        info!(file = %report.display(), "report written");
    }
    Ok(())
}

async fn run_live(
    settings: Settings,
    sessions: Vec<ClockRecord>,
    worktimes: Vec<ClockRecord>,
    venue_url: String,
) -> Result<()> {
    let mut ctx = Context::new(RunMode::Live, settings);
    ctx.sessions.load_records(sessions);
    ctx.worktimes.load_records(worktimes);
    let venue = HttpVenue::new(venue_url);

    let (tx, mut rx) = mpsc::channel::<RawBar>(1024);
    tokio::task::spawn_blocking(move || {
        for line in std::io::stdin().lines() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    warn!(%err, "stdin closed");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RawBar>(&line) {
                Ok(bar) => {
                    if tx.blocking_send(bar).is_err() {
                        break;
                    }
                }
                Err(err) => warn!(%err, "bad bar line skipped"),
            }
        }
    });

    info!("live pipeline running");
    feed::drain_live(&mut ctx, &mut rx, &venue).await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if args.verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match args.command {
        Command::Backtest {
            candles,
            settings,
            sessions,
            worktimes,
            start,
            end,
            chunk_size,
            report,
        } => run_backtest(
            &candles,
            load_settings(&settings)?,
            load_clock_records(&sessions)?,
            load_clock_records(&worktimes)?,
            start,
            end,
            chunk_size,
            report,
        ),
        Command::Live {
            settings,
            sessions,
            worktimes,
            venue_url,
        } => {
            run_live(
                load_settings(&settings)?,
                load_clock_records(&sessions)?,
                load_clock_records(&worktimes)?,
                venue_url,
            )
            .await
        }
    }
}
