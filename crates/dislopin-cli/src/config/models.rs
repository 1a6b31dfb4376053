use dislopin::core::models::potential::PotentialModel;
use dislopin::engine::config::{BuildConfig, EngineConfig, PathsConfig, RelaxConfig, ShearConfig};
use std::path::PathBuf;

/// External programs the build stage drives besides the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolsConfig {
    pub atomsk: PathBuf,
    pub generator: PathBuf,
    pub generator_args: Vec<String>,
}

/// Fully resolved settings for one invocation.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub paths: PathsConfig,
    pub potential: PotentialModel,
    pub engine: EngineConfig,
    pub tools: ToolsConfig,
    pub build: BuildConfig,
    pub relax: RelaxConfig,
    pub shear: ShearConfig,
}
