mod cli;
mod error;
mod logging;
mod params;

use std::process;

use clap::Parser;
use hlsrec_engine::{MergeEngine, Recorder};
use mimalloc::MiMalloc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cli::{Args, Commands, MergeArgs, RecordArgs};
use crate::error::{AppError, Result};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let guard = match logging::init_logging(args.command.destination(), args.verbose, args.quiet)
    {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(2);
        }
    };

    let token = CancellationToken::new();
    spawn_interrupt_handler(token.clone());

    let result = match args.command {
        Commands::Record(record) => run_record(record, token).await,
        Commands::Merge(merge) => run_merge(merge, token).await,
    };

    if let Err(e) = result {
        error!("Application error: {}", e);
        // Exiting skips destructors; flush the error log first.
        drop(guard);
        process::exit(1);
    }
}

/// Cancels `token` on the first Ctrl-C.
fn spawn_interrupt_handler(token: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Interrupt received, stopping");
                token.cancel();
            }
            Err(e) => error!("Failed to listen for interrupt signal: {}", e),
        }
    });
}

async fn run_record(args: RecordArgs, token: CancellationToken) -> Result<()> {
    let config = args.to_config()?;
    info!(
        url = %args.url,
        destination = %args.destination.display(),
        workers = config.download.workers,
        "Starting recording"
    );

    let summary = Recorder::new(config, &args.url)?.run(token).await?;
    info!(
        discovered = summary.discovered,
        completed = summary.completed,
        failed = summary.failed.len(),
        bytes = summary.bytes,
        "Recording summary"
    );

    if summary.is_success() {
        Ok(())
    } else {
        Err(AppError::IncompleteRecording {
            failed: summary.failed.len(),
        })
    }
}

async fn run_merge(args: MergeArgs, token: CancellationToken) -> Result<()> {
    let engine = MergeEngine::new(args.to_config());
    let report = tokio::select! {
        biased;
        _ = token.cancelled() => return Err(hlsrec_engine::RecorderError::Cancelled.into()),
        report = engine.run(&args.destination) => report?,
    };

    for run in &report.runs {
        info!(
            first = run.first_index,
            last = run.last_index,
            segments = run.segments,
            output = %run.output.display(),
            outcome = ?run.outcome,
            "Run"
        );
    }

    let failed = report.failed_runs().count();
    if failed == 0 {
        Ok(())
    } else {
        Err(AppError::IncompleteMerge {
            failed,
            total: report.runs.len(),
        })
    }
}
