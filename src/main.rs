mod cli;

use adic_sequence::engine::Engine;
use adic_sequence::interrupt::RunState;
use clap::Parser;
use cli::{init_logging, run_command, CliArgs, RunSettings};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    init_logging(&args.log_level)?;

    if let Some(command) = args.command {
        print!("{}", run_command(command, &args.store()?)?);
        return Ok(());
    }
    let settings = RunSettings::try_from(args)?;

    if cfg!(debug_assertions) {
        info!("Starting with full config: {:#?}", settings);
    }

    let engine = Engine::new(settings.engine, settings.payload.build())?;
    let report = engine.run_until_ctrl_c(settings.count).await?;

    for failure in &report.failures {
        error!(
            start = failure.batch.start,
            end = failure.batch.end(),
            error = %failure.error,
            "Batch excluded from checkpoint"
        );
    }

    match report.status {
        RunState::Done => info!(
            count = report.achieved,
            path = %report.checkpoint.path.display(),
            "Sequence complete"
        ),
        _ => info!(
            count = report.achieved,
            requested = report.requested,
            path = %report.checkpoint.path.display(),
            "Partial sequence saved; run again with the same count to resume"
        ),
    }

    Ok(())
}
