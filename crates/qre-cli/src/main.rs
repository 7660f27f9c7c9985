//! qre-cli: thin smoke-test runner for the strategy executor.
//!
//! Loads a CSV, runs the trailing-MA strategy with its published defaults
//! over the requested warmup window, and prints the resulting basic
//! metrics. An external collaborator of the core crates, not part of them.
//!
//! Usage:
//!   qre-cli --csv bars.csv
//!   qre-cli --csv bars.csv --warmup 750

use std::path::PathBuf;

use clap::Parser;
use qre_core::{load_csv, resolve_csv_path};
use qre_strategy::{default_warmup_bars, prepare_dataset_with_warmup, schema, BalanceMixer, StrategyParams};

#[derive(Parser, Debug)]
#[command(name = "qre-cli", about = "Smoke-test runner for the trailing-MA strategy")]
struct Args {
    /// Path to an OHLCV CSV file.
    #[arg(long)]
    csv: PathBuf,

    /// Warmup bars to prepend to the trading window. Defaults to the
    /// strategy's recommended warmup for its published default parameters.
    #[arg(long)]
    warmup: Option<usize>,
}

fn run(args: Args) -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?;
    let mut allowed_roots = vec![cwd];
    if let Some(parent) = args.csv.parent() {
        if !parent.as_os_str().is_empty() {
            allowed_roots.push(parent.to_path_buf());
        }
    }

    let resolved = resolve_csv_path(&args.csv, &allowed_roots)?;
    let table = load_csv(&resolved)?;
    tracing::info!(bars = table.len(), path = %resolved.display(), "loaded CSV");

    let params = StrategyParams::default();
    let _ = schema();
    let warmup_bars = args.warmup.unwrap_or_else(|| default_warmup_bars(&params));
    let (windowed, trade_start_idx) = prepare_dataset_with_warmup(&table, params.start, params.end, warmup_bars);

    let result = qre_strategy::run(&windowed, &params, trade_start_idx, BalanceMixer::default())?;

    println!("bars: {}", windowed.len());
    println!("trade_start_idx: {trade_start_idx}");
    println!("net_profit_pct: {:.2}%", result.basic.net_profit_pct);
    println!("max_drawdown_pct: {:.2}%", result.basic.max_drawdown_pct);
    println!("total_trades: {}", result.basic.total_trades);

    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "qre_cli=info".into()))
        .init();

    let args = Args::parse();
    if let Err(err) = run(args) {
        tracing::error!(%err, "qre-cli failed");
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
