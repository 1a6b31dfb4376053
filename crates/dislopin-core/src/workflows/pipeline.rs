use super::build::{self, BuildResult};
use super::relax::{self, RelaxResult};
use super::shear::{self, ShearResult};
use crate::engine::config::{BuildConfig, RelaxConfig, ShearConfig};
use crate::engine::context::{BuildTools, RunContext};
use crate::engine::error::PipelineError;
use tracing::{info, instrument};

#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub build: BuildResult,
    pub relax: RelaxResult,
    pub shear: ShearResult,
}

/// Runs build, relaxation and shear back to back.
///
/// Each stage reads only the artifact its predecessor returned, so a failure stops the
/// chain with the failing stage recorded on the error.
#[instrument(skip_all, name = "pipeline_workflow")]
pub fn run(
    ctx: &RunContext,
    tools: &BuildTools,
    build_config: &BuildConfig,
    relax_config: &RelaxConfig,
    shear_config: &ShearConfig,
) -> Result<PipelineResult, PipelineError> {
    let build = build::run(ctx, tools, build_config)?;
    let relax = relax::run(ctx, &build.artifact, relax_config)?;
    let shear = shear::run(ctx, &relax.artifact, shear_config)?;
    info!(
        "Pipeline complete: {} atoms built, relaxation {}, final configuration {}",
        build.atom_count,
        relax.status,
        shear.final_path.display()
    );
    Ok(PipelineResult {
        build,
        relax,
        shear,
    })
}
