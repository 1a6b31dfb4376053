use super::config::EngineConfig;
use super::process::{ExternalCommand, ProcessError};
use super::script::InputScript;
use super::workspace::Stage;
use crate::core::io::log::EngineLog;
use std::path::PathBuf;
use tracing::{debug, warn};

/// One engine invocation: a complete directive script and where its files go.
#[derive(Debug, Clone)]
pub struct EngineJob<'a> {
    pub stage: Stage,
    pub script: &'a InputScript,
    /// Where the rendered script is written before launch.
    pub script_path: PathBuf,
    /// The log file named by the script's `log` directive.
    pub log_path: PathBuf,
    pub working_dir: PathBuf,
}

impl EngineJob<'_> {
    pub fn write_script(&self) -> Result<(), ProcessError> {
        self.script
            .write_to_path(&self.script_path)
            .map_err(|source| ProcessError::Io {
                command: format!("write {}", self.script_path.display()),
                source,
            })
    }
}

/// A molecular-dynamics engine that executes directive scripts.
///
/// Execution blocks until the engine exits; every stdout line is handed to `on_line` as it
/// arrives. The engine aborts on the first failing directive, which surfaces here as an error.
pub trait MdEngine {
    fn execute(&self, job: &EngineJob, on_line: &mut dyn FnMut(&str)) -> Result<(), ProcessError>;
}

/// Runs the LAMMPS executable, optionally under an MPI launcher.
#[derive(Debug, Clone)]
pub struct LammpsEngine {
    config: EngineConfig,
}

impl LammpsEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn command_line(&self, job: &EngineJob) -> ExternalCommand {
        let base = match &self.config.mpi {
            Some(mpi) => ExternalCommand::new(&mpi.launcher)
                .args(["-np".to_string(), mpi.processes.to_string()])
                .arg(self.config.binary.to_string_lossy()),
            None => ExternalCommand::new(&self.config.binary),
        };
        base.args(self.config.accelerator_args.iter().cloned())
            .args([
                "-in".to_string(),
                job.script_path.to_string_lossy().into_owned(),
                "-log".to_string(),
                "none".to_string(),
                "-echo".to_string(),
                "log".to_string(),
            ])
            .current_dir(&job.working_dir)
    }
}

impl MdEngine for LammpsEngine {
    fn execute(&self, job: &EngineJob, on_line: &mut dyn FnMut(&str)) -> Result<(), ProcessError> {
        job.write_script()?;
        let command = self.command_line(job);
        debug!(stage = %job.stage, script = %job.script_path.display(), "Launching engine");

        let result = command.run_streaming(on_line);
        if let Err(ProcessError::Failed { .. }) = &result {
            // The engine prints the reason into its log; prefer it over the raw exit status.
            if let Ok(log) = EngineLog::read(&job.log_path) {
                if let Some(line) = log.error_lines().last() {
                    warn!("Engine reported: {}", line);
                    return Err(ProcessError::Reported {
                        command: command.to_string(),
                        message: line.to_string(),
                    });
                }
            }
        }
        result
    }
}
