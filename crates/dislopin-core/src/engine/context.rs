use super::atomsk::StructureTool;
use super::config::PathsConfig;
use super::error::PipelineError;
use super::fitting::PotentialFitter;
use super::generator::DislocationGenerator;
use super::lammps::{EngineJob, MdEngine};
use super::progress::ProgressReporter;
use super::script::InputScript;
use super::workspace::{Stage, StageWorkspace};
use crate::core::models::potential::PotentialModel;
use std::path::{self, Path, PathBuf};
use tracing::debug;

pub const ENGINE_LOG_NAME: &str = "log.lammps";

pub(crate) fn absolute(stage: Stage, path: &Path) -> Result<PathBuf, PipelineError> {
    path::absolute(path).map_err(PipelineError::io(stage, path))
}

/// Shared, read-only inputs of every stage.
#[derive(Clone, Copy)]
pub struct RunContext<'a> {
    pub paths: &'a PathsConfig,
    pub potential: &'a PotentialModel,
    pub engine: &'a dyn MdEngine,
    pub reporter: &'a ProgressReporter<'a>,
}

impl<'a> RunContext<'a> {
    pub fn new(
        paths: &'a PathsConfig,
        potential: &'a PotentialModel,
        engine: &'a dyn MdEngine,
        reporter: &'a ProgressReporter<'a>,
    ) -> Self {
        Self {
            paths,
            potential,
            engine,
            reporter,
        }
    }

    /// The stage's workspace with an absolute root, since the engine runs inside it.
    pub fn workspace(&self, stage: Stage) -> Result<StageWorkspace, PipelineError> {
        let workspace = self.paths.workspace(stage);
        Ok(StageWorkspace::new(stage, absolute(stage, &workspace.root)?))
    }

    /// The potential with its file path made absolute.
    pub fn engine_potential(&self, stage: Stage) -> Result<PotentialModel, PipelineError> {
        let mut potential = self.potential.clone();
        potential.file = absolute(stage, &potential.file)?;
        Ok(potential)
    }

    pub fn engine_log_path(&self, workspace: &StageWorkspace) -> PathBuf {
        workspace.log(ENGINE_LOG_NAME)
    }

    /// Fails unless the potential file exists and names at least one element.
    pub fn validate_potential(&self, stage: Stage) -> Result<(), PipelineError> {
        if !self.potential.file.is_file() {
            return Err(PipelineError::Validation {
                stage,
                message: format!(
                    "potential file '{}' does not exist",
                    self.potential.file.display()
                ),
            });
        }
        if self.potential.primary_element().is_none() {
            return Err(PipelineError::Validation {
                stage,
                message: "potential declares no element".to_string(),
            });
        }
        Ok(())
    }

    /// Runs `script` as the stage's single engine invocation.
    ///
    /// The script lands in `logs/<stage>.in`; every stdout line goes to `on_line` and to the
    /// `engine` tracing target.
    pub fn run_engine(
        &self,
        workspace: &StageWorkspace,
        script: &InputScript,
        on_line: &mut dyn FnMut(&str),
    ) -> Result<(), PipelineError> {
        let stage = workspace.stage;
        let job = EngineJob {
            stage,
            script,
            script_path: workspace.log(&format!("{}.in", stage.key())),
            log_path: self.engine_log_path(workspace),
            working_dir: workspace.root().to_path_buf(),
        };
        self.engine
            .execute(&job, &mut |line| {
                debug!(target: "engine", "{}", line);
                on_line(line);
            })
            .map_err(PipelineError::process(stage))
    }
}

/// External collaborators only the configuration builder needs.
#[derive(Clone, Copy)]
pub struct BuildTools<'a> {
    pub fitter: &'a dyn PotentialFitter,
    pub generator: &'a dyn DislocationGenerator,
    pub structure_tool: &'a dyn StructureTool,
}
