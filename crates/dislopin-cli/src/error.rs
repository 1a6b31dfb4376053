use dislopin::engine::error::PipelineError;
use dislopin::engine::workspace::Stage;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse file '{path}': {source}", path = path.display())]
    FileParsing {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid argument: {0}")]
    Argument(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CliError {
    /// Process exit status: 3, 4 and 5 for build, relax and shear failures, 2 for bad input.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Pipeline(err) => match err.stage() {
                Stage::Build => 3,
                Stage::Relax => 4,
                Stage::Shear => 5,
            },
            CliError::Config(_) | CliError::FileParsing { .. } | CliError::Argument(_) => 2,
            CliError::Io(_) | CliError::Other(_) => 1,
        }
    }
}
