use super::{
    Collaborators, print_build_summary, print_relax_summary, print_shear_summary, reporter,
};
use crate::cli::RunArgs;
use crate::config::builder::{CliOverrides, build_config};
use crate::error::Result;
use crate::ui::UiEvent;
use dislopin::engine::context::RunContext;
use dislopin::workflows;
use tokio::sync::mpsc;
use tracing::info;

pub async fn run(args: RunArgs, ui_sender: mpsc::Sender<UiEvent>) -> Result<()> {
    let app = build_config(
        &args.common,
        &args.engine,
        &CliOverrides {
            build: Some(&args.build),
            relax: Some(&args.relax),
            shear: Some(&args.shear),
        },
    )?;
    let collaborators = Collaborators::new(&app);
    let fitter = collaborators.fitter(&app.build.fit);
    let tools = collaborators.build_tools(fitter.as_ref());
    let reporter = reporter(ui_sender);
    let ctx = RunContext::new(&app.paths, &app.potential, &collaborators.engine, &reporter);

    println!(
        "Running the full pipeline under {}...",
        app.paths.data_root.display()
    );
    info!("Invoking the pipeline workflow...");
    let result = tokio::task::block_in_place(|| {
        workflows::pipeline::run(&ctx, &tools, &app.build, &app.relax, &app.shear)
    })?;

    print_build_summary(&result.build);
    print_relax_summary(&result.relax);
    print_shear_summary(&result.shear);
    Ok(())
}
