use super::process::{ExternalCommand, ProcessError};
use super::workspace::discard_stale;
use crate::core::models::potential::ElasticConstants;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error("Failed to prepare '{path}': {source}", path = path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to serialize job description: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Generator finished but produced no file at '{}'", .0.display())]
    MissingOutput(PathBuf),
}

/// Everything the dislocation generator needs to build a periodic dislocation array.
///
/// Serialized as the TOML job file handed to the external generator. Lengths are in Å,
/// elastic constants in GPa. The line direction is mapped onto x and the slip-plane normal
/// onto y.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct DislocationJob {
    pub element: String,
    pub lattice: String,
    pub lattice_constant: f64,
    pub burgers: [f64; 3],
    pub slip_plane: [f64; 3],
    pub line_direction: [f64; 3],
    pub min_lengths: [f64; 3],
    pub boundary_width: f64,
    pub boundary_scale: bool,
    pub shift: [f64; 3],
    pub shift_scale: bool,
    pub output: PathBuf,
    pub elastic: ElasticConstants,
}

impl DislocationJob {
    pub fn to_toml(&self) -> Result<String, GeneratorError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Builds the initial dislocation configuration and writes it to `job.output`.
pub trait DislocationGenerator {
    fn generate(&self, job: &DislocationJob, job_path: &Path) -> Result<(), GeneratorError>;
}

/// A generator run as an external command: `<program> <args...> <job.toml>`.
#[derive(Debug, Clone)]
pub struct ExternalGenerator {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl ExternalGenerator {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn command(&self, job_path: &Path) -> ExternalCommand {
        ExternalCommand::new(&self.program)
            .args(self.args.iter().cloned())
            .arg(job_path.to_string_lossy())
    }
}

impl DislocationGenerator for ExternalGenerator {
    fn generate(&self, job: &DislocationJob, job_path: &Path) -> Result<(), GeneratorError> {
        fs::write(job_path, job.to_toml()?).map_err(|source| GeneratorError::Io {
            path: job_path.to_path_buf(),
            source,
        })?;
        info!("Wrote dislocation job file {}", job_path.display());

        discard_stale(&job.output).map_err(|source| GeneratorError::Io {
            path: job.output.clone(),
            source,
        })?;
        self.command(job_path).run()?;
        if !job.output.is_file() {
            return Err(GeneratorError::MissingOutput(job.output.clone()));
        }
        Ok(())
    }
}
