//! densecloud
//!
//! Removes outliers from a dense point cloud dataset by comparing every point
//! with a reference mesh and with its local neighborhood.

mod args;
mod pipeline;

use anyhow::{Context, Result};
use args::{Args, VerboseLevel};
use clap::Parser;
use std::process::ExitCode;
use std::time::Instant;
use tracing::{error, info};

fn init_logging(level: VerboseLevel) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.as_filter())),
        )
        .with_target(false)
        .init();
}

fn execute(args: &Args) -> Result<()> {
    let config = args.filter_config()?;

    if let Some(threads) = args.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("cannot configure the worker thread pool")?;
    }

    info!(?config, "Dense point cloud filtering");
    pipeline::run(args, &config)?;
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose_level);

    let timer = Instant::now();
    match execute(&args) {
        Ok(()) => {
            info!("Task done in (s): {:.3}", timer.elapsed().as_secs_f64());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
