//! trajplot CLI: render diagnostic figures for every run of a sweep.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use trajplot::dispatch::{run_all, JobConfig, JobState};
use trajplot::figure::default_figure_spec;
use trajplot::store::SweepStore;

/// Batch-render diagnostic figures, one PNG per run of a sweep.
#[derive(Parser, Debug)]
#[command(name = "trajplot", version)]
struct Args {
    /// Path to the sweep file
    sweep: PathBuf,
    /// Worker-pool size
    pool_size: usize,
    /// Parallel mode: 0 = sequential (aborts on first failure), 1 = pool
    parallel: u8,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let parallel = args.parallel != 0;

    // a sweep that cannot be opened aborts before any run is processed
    let store = SweepStore::open(&args.sweep)
        .with_context(|| format!("cannot open sweep {}", args.sweep.display()))?;
    let num_runs = store.run_count();
    let config = JobConfig::for_sweep(store.path(), default_figure_spec()?);
    drop(store);

    tracing::info!(
        sweep = %config.sweep_path.display(),
        num_runs,
        parallel,
        pool_size = args.pool_size,
        "dispatching render jobs"
    );

    let reports = run_all(&config, num_runs, parallel, args.pool_size)?;

    let done = reports
        .iter()
        .filter(|r| r.state() == JobState::Done)
        .count();
    let failed = reports
        .iter()
        .filter(|r| r.state() == JobState::Failed)
        .count();
    tracing::info!(done, failed, out_dir = %config.out_dir.display(), "batch finished");

    // parallel-mode job failures only show up as missing artifacts;
    // a sequential failure aborted the batch and is an error exit
    if !parallel && failed > 0 {
        anyhow::bail!("sequential batch aborted after {done} completed runs");
    }
    Ok(())
}
