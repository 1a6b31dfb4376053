use super::{Collaborators, open_built, print_relax_summary, reporter};
use crate::cli::RelaxArgs;
use crate::config::builder::{CliOverrides, build_config};
use crate::error::Result;
use crate::ui::UiEvent;
use dislopin::engine::context::RunContext;
use dislopin::workflows;
use tokio::sync::mpsc;
use tracing::info;

pub async fn run(args: RelaxArgs, ui_sender: mpsc::Sender<UiEvent>) -> Result<()> {
    let app = build_config(
        &args.common,
        &args.engine,
        &CliOverrides {
            relax: Some(&args.flags),
            ..CliOverrides::default()
        },
    )?;
    let input = open_built(&args.input, &app)?;
    let collaborators = Collaborators::new(&app);
    let reporter = reporter(ui_sender);
    let ctx = RunContext::new(&app.paths, &app.potential, &collaborators.engine, &reporter);

    println!("Relaxing {}...", input.path().display());
    info!("Invoking the relaxation workflow...");
    let result = tokio::task::block_in_place(|| workflows::relax::run(&ctx, &input, &app.relax))?;

    print_relax_summary(&result);
    Ok(())
}
