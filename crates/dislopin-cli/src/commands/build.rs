use super::{Collaborators, print_build_summary, reporter};
use crate::cli::BuildArgs;
use crate::config::builder::{CliOverrides, build_config};
use crate::error::Result;
use crate::ui::UiEvent;
use dislopin::engine::context::RunContext;
use dislopin::workflows;
use tokio::sync::mpsc;
use tracing::info;

pub async fn run(args: BuildArgs, ui_sender: mpsc::Sender<UiEvent>) -> Result<()> {
    let app = build_config(
        &args.common,
        &args.engine,
        &CliOverrides {
            build: Some(&args.flags),
            ..CliOverrides::default()
        },
    )?;
    let collaborators = Collaborators::new(&app);
    let fitter = collaborators.fitter(&app.build.fit);
    let tools = collaborators.build_tools(fitter.as_ref());
    let reporter = reporter(ui_sender);
    let ctx = RunContext::new(&app.paths, &app.potential, &collaborators.engine, &reporter);

    println!("Building the {} configuration...", app.build.mode.name());
    info!("Invoking the configuration builder workflow...");
    let result = tokio::task::block_in_place(|| workflows::build::run(&ctx, &tools, &app.build))?;

    print_build_summary(&result);
    Ok(())
}
