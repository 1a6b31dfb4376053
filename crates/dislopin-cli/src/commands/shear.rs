use super::{Collaborators, open_relaxed, print_shear_summary, reporter};
use crate::cli::ShearArgs;
use crate::config::builder::{CliOverrides, build_config};
use crate::error::Result;
use crate::ui::UiEvent;
use dislopin::engine::context::RunContext;
use dislopin::workflows;
use tokio::sync::mpsc;
use tracing::info;

pub async fn run(args: ShearArgs, ui_sender: mpsc::Sender<UiEvent>) -> Result<()> {
    let app = build_config(
        &args.common,
        &args.engine,
        &CliOverrides {
            shear: Some(&args.flags),
            ..CliOverrides::default()
        },
    )?;
    let input = open_relaxed(&args.input, &app)?;
    let collaborators = Collaborators::new(&app);
    let reporter = reporter(ui_sender);
    let ctx = RunContext::new(&app.paths, &app.potential, &collaborators.engine, &reporter);

    println!(
        "Shearing {} for {} steps at {} K...",
        input.path().display(),
        app.shear.steps,
        app.shear.temperature
    );
    info!("Invoking the defect-interaction workflow...");
    let result = tokio::task::block_in_place(|| workflows::shear::run(&ctx, &input, &app.shear))?;

    print_shear_summary(&result);
    Ok(())
}
