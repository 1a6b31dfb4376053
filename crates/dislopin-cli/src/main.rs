mod cli;
mod commands;
mod config;
mod error;
mod logging;
mod ui;

use crate::cli::{Cli, Commands};
use crate::error::{CliError, Result};
use crate::ui::{UiEvent, UiManager};
use clap::Parser;
use tokio::sync::mpsc;
use tokio::task;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() {
    if let Err(e) = run_app().await {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        eprintln!("\n❌ Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run_app() -> Result<()> {
    let (ui_manager, ui_sender, shutdown_sender) = UiManager::new();
    let ui_handle = task::spawn(ui_manager.run());

    let cli = Cli::parse();
    logging::setup_logging(cli.verbose, cli.quiet, &cli.log_file, ui_sender.clone())?;
    install_error_hooks()?;

    info!("🚀 dislopin v{} starting up.", env!("CARGO_PKG_VERSION"));
    debug!("Full CLI arguments parsed: {:?}", &cli);
    let name = cli.command.name();
    let command_result = match configure_thread_pool(cli.threads) {
        Ok(()) => dispatch(cli.command, ui_sender).await,
        Err(e) => Err(e),
    };

    match &command_result {
        Ok(()) => {
            info!("✅ '{}' completed successfully.", name);
            println!("✅ '{}' completed successfully.", name);
        }
        Err(e) => {
            error!("❌ '{}' failed: {}", name, e);
            eprintln!("❌ '{}' failed: {}", name, e);
        }
    }

    if shutdown_sender.send(true).is_err() {
        warn!("UI manager may have already exited before shutdown signal.");
    }
    ui_handle
        .await
        .map_err(|e| CliError::Other(anyhow::anyhow!("UI manager task failed: {}", e)))?;

    command_result
}

/// Routes panic reports through `tracing` so they reach the log file and the UI.
fn install_error_hooks() -> Result<()> {
    let (panic_hook, eyre_hook) = color_eyre::config::HookBuilder::default().into_hooks();
    eyre_hook.install().map_err(|e| CliError::Other(e.into()))?;
    std::panic::set_hook(Box::new(move |pi| {
        error!("{}", panic_hook.panic_report(pi));
    }));
    Ok(())
}

/// Sizes the pool used for the in-process atom partition. The engine's MPI ranks are
/// set separately with `--np`.
fn configure_thread_pool(threads: Option<usize>) -> Result<()> {
    let Some(num_threads) = threads else {
        return Ok(());
    };
    info!("Partitioning atoms on {} threads.", num_threads);
    rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()
        .map_err(|e| CliError::Other(anyhow::anyhow!("Failed to build global thread pool: {}", e)))
}

async fn dispatch(command: Commands, ui_sender: mpsc::Sender<UiEvent>) -> Result<()> {
    info!("Dispatching to '{}' command.", command.name());
    match command {
        Commands::Build(args) => commands::build::run(args, ui_sender).await,
        Commands::Relax(args) => commands::relax::run(args, ui_sender).await,
        Commands::Shear(args) => commands::shear::run(args, ui_sender).await,
        Commands::Run(args) => commands::run::run(args, ui_sender).await,
    }
}
