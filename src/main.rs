//! Shard Compositor - Main Entry Point
//!
//! Without rank variables in the environment this process acts as the
//! launcher and starts one child process per rank. With `COMPOSITOR_RANK` and
//! `COMPOSITOR_SIZE` set it runs as that rank.
//!
//! Usage: `shard-compositor [settings.xml]`

use std::path::PathBuf;
use std::process::ExitCode;

use shard_compositor::dataset::block_grid;
use shard_compositor::launcher::{spawn_group, LaunchContext};
use shard_compositor::telemetry::{init_logging, LogConfig};
use shard_compositor::{run_rank, RunSettings, SplatRenderer, TcpCommunicator};

fn main() -> ExitCode {
    let launch = match LaunchContext::from_env() {
        Ok(launch) => launch,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let log_config = LogConfig {
        rank: launch.as_ref().map(|ctx| ctx.rank),
        ..LogConfig::default()
    };
    // Keep the guard alive for the program duration
    let _log_guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            None
        }
    };

    let args: Vec<String> = std::env::args().skip(1).collect();
    let settings = match args.first() {
        Some(path) => match RunSettings::load_from_file(&PathBuf::from(path)) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::error!("Failed to load settings from {}: {}", path, e);
                return ExitCode::FAILURE;
            }
        },
        None => RunSettings::default(),
    };

    let result = match launch {
        Some(ctx) => {
            let _span = tracing::info_span!("rank", rank = ctx.rank).entered();
            run_as_rank(ctx, settings)
        }
        None => run_as_launcher(&args, &settings),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_as_launcher(args: &[String], settings: &RunSettings) -> Result<(), Box<dyn std::error::Error>> {
    let executable = std::env::current_exe()?;
    tracing::info!(
        ranks = settings.num_processes,
        coordinator = %settings.coordinator_address,
        "Launching compositing run"
    );
    spawn_group(&executable, args, settings.num_processes, &settings.coordinator_address)?;
    tracing::info!(path = %settings.final_image_path().display(), "Run complete");
    Ok(())
}

fn run_as_rank(ctx: LaunchContext, mut settings: RunSettings) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(address) = ctx.coordinator_address {
        settings.coordinator_address = address;
    }

    let mut comm = TcpCommunicator::connect(&settings.group_config(), ctx.rank, ctx.size)?;
    let blocks = block_grid(settings.blocks_per_axis);
    let outcome = run_rank(&mut comm, &settings, &blocks, &SplatRenderer::default())?;

    tracing::info!(
        rank = outcome.rank,
        elements = outcome.elements,
        total_ms = outcome.timings.total_ms(),
        "Rank finished"
    );
    Ok(())
}
