pub mod build;
pub mod relax;
pub mod run;
pub mod shear;

use crate::cli::InputArgs;
use crate::config::models::AppConfig;
use crate::error::{CliError, Result};
use crate::ui::{CliProgressHandler, UiEvent};
use dislopin::core::models::simulation_box::Periodicity;
use dislopin::engine::artifact::{BuiltConfiguration, RelaxedConfiguration};
use dislopin::engine::atomsk::Atomsk;
use dislopin::engine::config::FitSource;
use dislopin::engine::context::BuildTools;
use dislopin::engine::fitting::{EngineFitter, KnownConstants, PotentialFitter};
use dislopin::engine::generator::ExternalGenerator;
use dislopin::engine::lammps::LammpsEngine;
use dislopin::engine::progress::ProgressReporter;
use dislopin::engine::workspace::Stage;
use dislopin::workflows::build::BuildResult;
use dislopin::workflows::relax::RelaxResult;
use dislopin::workflows::shear::ShearResult;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::info;

/// The shipped external programs, configured from the resolved settings.
pub struct Collaborators {
    pub engine: LammpsEngine,
    pub structure_tool: Atomsk,
    pub generator: ExternalGenerator,
}

impl Collaborators {
    pub fn new(app: &AppConfig) -> Self {
        Self {
            engine: LammpsEngine::new(app.engine.clone()),
            structure_tool: Atomsk::new(&app.tools.atomsk),
            generator: ExternalGenerator::new(&app.tools.generator, app.tools.generator_args.clone()),
        }
    }

    pub fn fitter(&self, fit: &FitSource) -> Box<dyn PotentialFitter + '_> {
        match fit {
            FitSource::Engine(settings) => Box::new(EngineFitter::new(&self.engine, *settings)),
            FitSource::Known(fitted) => Box::new(KnownConstants(*fitted)),
        }
    }

    pub fn build_tools<'a>(&'a self, fitter: &'a dyn PotentialFitter) -> BuildTools<'a> {
        BuildTools {
            fitter,
            generator: &self.generator,
            structure_tool: &self.structure_tool,
        }
    }
}

pub fn reporter(ui_sender: mpsc::Sender<UiEvent>) -> ProgressReporter<'static> {
    let handler = CliProgressHandler::new(ui_sender);
    ProgressReporter::with_callback(handler.get_callback())
}

fn parse_boundary(text: &str) -> Result<Periodicity> {
    text.parse()
        .map_err(|e: String| CliError::Argument(format!("--boundary: {}", e)))
}

fn explicit_or_default(input: &InputArgs, default: PathBuf) -> PathBuf {
    input.input.clone().unwrap_or(default)
}

/// The build artifact named on the command line, or the build stage's output.
pub fn open_built(input: &InputArgs, app: &AppConfig) -> Result<BuiltConfiguration> {
    let default = app
        .paths
        .workspace(Stage::Build)
        .output(&app.build.output_name);
    let path = explicit_or_default(input, default);
    info!("Relaxation input: {}", path.display());
    Ok(match &input.boundary {
        Some(flags) => BuiltConfiguration::adopt(&path, parse_boundary(flags)?)?,
        None => BuiltConfiguration::open(&path)?,
    })
}

/// The relaxed artifact named on the command line, or the relaxation stage's output.
pub fn open_relaxed(input: &InputArgs, app: &AppConfig) -> Result<RelaxedConfiguration> {
    let default = app
        .paths
        .workspace(Stage::Relax)
        .output(&app.relax.output_name);
    let path = explicit_or_default(input, default);
    info!("Shear input: {}", path.display());
    Ok(match &input.boundary {
        Some(flags) => RelaxedConfiguration::adopt(&path, parse_boundary(flags)?)?,
        None => RelaxedConfiguration::open(&path)?,
    })
}

fn show(path: &Path) -> String {
    path.display().to_string()
}

pub fn print_build_summary(result: &BuildResult) {
    let [x, y, z] = result.extents;
    println!(
        "✓ Built {} atoms in a {:.2} x {:.2} x {:.2} Å box (a = {:.4} Å) -> {}",
        result.atom_count,
        x,
        y,
        z,
        result.fitted.lattice_constant,
        show(result.artifact.path())
    );
}

pub fn print_relax_summary(result: &RelaxResult) {
    println!(
        "✓ Minimization {} after {} iterations, final energy {:.6} eV -> {}",
        result.status,
        result.stats.iterations,
        result.stats.energies[2],
        show(result.artifact.path())
    );
    if !result.status.is_converged() {
        println!("  Warning: the minimizer stopped before meeting a tolerance.");
    }
}

pub fn print_shear_summary(result: &ShearResult) {
    let counts: Vec<String> = result
        .group_counts
        .iter()
        .map(|(label, n)| format!("{} {}", label, n))
        .collect();
    println!(
        "✓ Dynamics finished at step {} ({}) -> {}",
        result.last_step.unwrap_or_default(),
        counts.join(", "),
        show(&result.final_path)
    );
    println!(
        "  {} restart files; resume with {}",
        result.restarts.len(),
        show(&result.resume_script)
    );
}
