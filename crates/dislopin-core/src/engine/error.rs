use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::atomsk::StructureToolError;
use super::config::ConfigError;
use super::fitting::FitError;
use super::generator::GeneratorError;
use super::process::ProcessError;
use super::script::ScriptError;
use super::workspace::Stage;
use crate::core::geometry::GeometryError;
use crate::core::io::dump::DumpError;
use crate::core::io::lammps_data::LammpsDataError;
use crate::core::io::log::LogParseError;
use crate::core::models::crystal::CrystalError;

/// Every failure a stage can report. Each variant names the stage it happened in.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{stage} stage: invalid input: {message}")]
    Validation { stage: Stage, message: String },

    #[error("{stage} stage: invalid configuration: {source}")]
    Config {
        stage: Stage,
        #[source]
        source: ConfigError,
    },

    #[error("{stage} stage: crystallographic input rejected: {source}")]
    Crystal {
        stage: Stage,
        #[source]
        source: CrystalError,
    },

    #[error("{stage} stage: {source}")]
    Process {
        stage: Stage,
        #[source]
        source: ProcessError,
    },

    #[error("{stage} stage: structure tool: {source}")]
    Structure {
        stage: Stage,
        #[source]
        source: StructureToolError,
    },

    #[error("{stage} stage: dislocation generator: {source}")]
    Generator {
        stage: Stage,
        #[source]
        source: GeneratorError,
    },

    #[error("{stage} stage: potential fit: {source}")]
    Fit {
        stage: Stage,
        #[source]
        source: FitError,
    },

    #[error("{stage} stage: directive script rejected: {source}")]
    Script {
        stage: Stage,
        #[source]
        source: ScriptError,
    },

    #[error("{stage} stage: geometric degeneracy: {source}")]
    Geometry {
        stage: Stage,
        #[source]
        source: GeometryError,
    },

    #[error("{stage} stage: data file '{path}': {source}", path = path.display())]
    DataFile {
        stage: Stage,
        path: PathBuf,
        #[source]
        source: LammpsDataError,
    },

    #[error("{stage} stage: dump file '{path}': {source}", path = path.display())]
    Dump {
        stage: Stage,
        path: PathBuf,
        #[source]
        source: DumpError,
    },

    #[error("{stage} stage: engine log '{path}': {source}", path = path.display())]
    Log {
        stage: Stage,
        path: PathBuf,
        #[source]
        source: LogParseError,
    },

    #[error("{stage} stage: I/O error at '{path}': {source}", path = path.display())]
    Io {
        stage: Stage,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{stage} stage: upstream artifact rejected: {message}")]
    Artifact { stage: Stage, message: String },

    #[error("{stage} stage: construction failed: {message}")]
    Construction { stage: Stage, message: String },
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            Self::Validation { stage, .. }
            | Self::Config { stage, .. }
            | Self::Crystal { stage, .. }
            | Self::Process { stage, .. }
            | Self::Structure { stage, .. }
            | Self::Generator { stage, .. }
            | Self::Fit { stage, .. }
            | Self::Script { stage, .. }
            | Self::Geometry { stage, .. }
            | Self::DataFile { stage, .. }
            | Self::Dump { stage, .. }
            | Self::Log { stage, .. }
            | Self::Io { stage, .. }
            | Self::Artifact { stage, .. }
            | Self::Construction { stage, .. } => *stage,
        }
    }

    pub(crate) fn io(stage: Stage, path: &Path) -> impl FnOnce(io::Error) -> Self {
        move |source| Self::Io {
            stage,
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn data_file(stage: Stage, path: &Path) -> impl FnOnce(LammpsDataError) -> Self {
        move |source| Self::DataFile {
            stage,
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn process(stage: Stage) -> impl FnOnce(ProcessError) -> Self {
        move |source| Self::Process { stage, source }
    }

    pub(crate) fn script(stage: Stage) -> impl FnOnce(ScriptError) -> Self {
        move |source| Self::Script { stage, source }
    }
}
