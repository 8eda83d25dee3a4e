//! Schedule Cleaner CLI Tool
//!
//! Normalizes a raw schedule export into the compact game-line format the
//! ranking tool ingests: slashed dates become `YYYYMMDD`, rows without a
//! date are dropped and duplicated fixtures (including home/away swapped
//! copies) are written only once.
//!
//! Usage:
//!   cargo run --bin schedule-cleaner -- raw_results.csv
//!   cargo run --bin schedule-cleaner -- raw_results.csv --output results.csv
//!   cargo run --bin schedule-cleaner -- raw_results.csv --day-first

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use power_rank::ingest::{normalize_schedule, write_schedule, DateOrder};
use tracing::info;

#[derive(Parser)]
#[command(name = "schedule-cleaner")]
#[command(about = "Normalize a raw schedule export into clean game lines")]
struct Cli {
    /// Raw schedule file
    input: PathBuf,

    /// Output file; defaults to clean_<input name> next to the input
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Read slashed dates as day/month/year instead of month/day/year
    #[arg(long)]
    day_first: bool,
}

fn default_output(input: &Path) -> PathBuf {
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "schedule.csv".to_string());
    input.with_file_name(format!("clean_{}", name))
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let order = if cli.day_first {
        DateOrder::DayFirst
    } else {
        DateOrder::MonthFirst
    };

    let raw = fs::read_to_string(&cli.input)
        .with_context(|| format!("reading {}", cli.input.display()))?;
    let lines = normalize_schedule(&raw, order)?;

    let output = cli.output.unwrap_or_else(|| default_output(&cli.input));
    write_schedule(&output, &lines)?;
    info!(
        "wrote {} clean game lines to {}",
        lines.len(),
        output.display()
    );

    Ok(())
}
