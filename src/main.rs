use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use playlog::config::{AnalysisConfig, GapBasis};
use playlog::report;
use playlog::sessions::{group_and_sort, load_events, reconstruct_all};

#[derive(Parser)]
#[command(name = "playlog")]
#[command(about = "Play session analytics from SDK event logs")]
struct Cli {
    /// Event log file, or a directory of *.log files
    #[arg(default_value = "ggevent.log")]
    log_path: PathBuf,

    /// Analysis configuration YAML (thresholds and merge policy)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Emit a session still accumulating when the log ends
    #[arg(long)]
    flush_trailing: bool,

    /// Measure the merge window as idle time between a stop and the next
    /// start, instead of the span of the previous fragment
    #[arg(long)]
    idle_gap: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AnalysisConfig::load(path)?,
        None => AnalysisConfig::default(),
    };
    if cli.flush_trailing {
        config.flush_trailing = true;
    }
    if cli.idle_gap {
        config.gap_basis = GapBasis::IdleTime;
    }

    let outcome = load_events(&cli.log_path)?;
    if outcome.skipped > 0 {
        warn!("skipped {} malformed records", outcome.skipped);
    }

    let grouped = group_and_sort(outcome.events);
    let summaries = reconstruct_all(&grouped, &config);

    let rows = report::user_rows(&summaries, &config);
    print!("{}", report::render_user_table(&rows));
    println!();

    let valid_counts: Vec<f64> = rows.iter().map(|r| r.valid_sessions as f64).collect();
    if let Some(summary) = report::describe(&valid_counts) {
        print!("{}", report::render_describe("valid sessions per user", &summary));
    }

    let valid_averages: Vec<f64> = rows
        .iter()
        .filter(|r| r.average_valid_secs > 0.0)
        .map(|r| r.average_valid_secs)
        .collect();
    if let Some(summary) = report::describe(&valid_averages) {
        print!("{}", report::render_describe("valid average session times", &summary));
    }
    println!();

    let aggregates = report::sdk_aggregates(&rows);
    print!("{}", report::render_sdk_table(&aggregates));

    Ok(())
}
