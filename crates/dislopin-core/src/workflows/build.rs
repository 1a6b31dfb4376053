use crate::core::elements;
use crate::core::io::lammps_data::LammpsDataFile;
use crate::core::io::traits::ConfigurationFile;
use crate::core::models::potential::FittedPotential;
use crate::core::models::simulation_box::Axis;
use crate::engine::artifact::{BuiltConfiguration, ConfigurationArtifact};
use crate::engine::config::{BicrystalConfig, BuildConfig, BuildMode, PeriodicArrayConfig};
use crate::engine::context::{BuildTools, RunContext};
use crate::engine::error::PipelineError;
use crate::engine::generator::DislocationJob;
use crate::engine::progress::Progress;
use crate::engine::workspace::{Stage, StageWorkspace, discard_stale};
use std::path::Path;
use tracing::{info, instrument, warn};

const STAGE: Stage = Stage::Build;
const LATTICE: &str = "bcc";
/// Slack when comparing box extents against requested minima (Å).
const EXTENT_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone)]
pub struct BuildResult {
    pub artifact: BuiltConfiguration,
    pub fitted: FittedPotential,
    pub atom_count: usize,
    pub extents: [f64; 3],
}

/// Replica counts and strains that turn one oriented unit cell into two mismatched slabs.
///
/// The lower slab holds `n` periods along the transport axis and the upper slab `n + 1`;
/// both are strained to the common length `(n + ½)·p`, which leaves one extra lattice
/// plane in the upper slab.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BicrystalPlan {
    pub lower_replicas: [u32; 3],
    pub upper_replicas: [u32; 3],
    pub lower_strain: f64,
    pub upper_strain: f64,
    pub common_length: f64,
}

impl BicrystalPlan {
    pub fn new(cell_extents: [f64; 3], config: &BicrystalConfig) -> Result<Self, String> {
        if let Some(axis) = Axis::ALL
            .into_iter()
            .find(|a| !(cell_extents[a.index()] > 0.0))
        {
            return Err(format!("unit cell has no extent along {}", axis));
        }
        let replicas_for = |length: f64, extent: f64| (length / extent).ceil().max(1.0) as u32;

        let mut lower_replicas = [1u32; 3];
        for axis in Axis::ALL {
            let i = axis.index();
            let target = if axis == config.merge_axis {
                0.5 * config.min_lengths[i]
            } else {
                config.min_lengths[i]
            };
            lower_replicas[i] = replicas_for(target, cell_extents[i]);
        }
        let t = config.transport_axis.index();
        let mut upper_replicas = lower_replicas;
        upper_replicas[t] += 1;

        let period = cell_extents[t];
        let n = f64::from(lower_replicas[t]);
        let common_length = (n + 0.5) * period;
        Ok(Self {
            lower_replicas,
            upper_replicas,
            lower_strain: common_length / (n * period) - 1.0,
            upper_strain: common_length / ((n + 1.0) * period) - 1.0,
            common_length,
        })
    }
}

/// Produces the initial configuration: fits the potential, runs the selected construction
/// path and persists `output/<output_name>` with its manifest.
#[instrument(skip_all, name = "build_workflow")]
pub fn run(
    ctx: &RunContext,
    tools: &BuildTools,
    config: &BuildConfig,
) -> Result<BuildResult, PipelineError> {
    ctx.reporter.report(Progress::StageStart { stage: STAGE });

    // === Phase 0: Validation and workspace ===
    ctx.reporter.report(Progress::PhaseStart {
        name: "Validation",
    });
    ctx.validate_potential(STAGE)?;
    validate_mode(&config.mode)?;
    let workspace = ctx.workspace(STAGE)?;
    workspace
        .ensure()
        .map_err(PipelineError::io(STAGE, &workspace.root))?;
    let potential = ctx.engine_potential(STAGE)?;
    let element = potential.primary_element().unwrap_or_default().to_string();
    ctx.reporter.report(Progress::PhaseFinish);

    // === Phase 1: Potential fit ===
    ctx.reporter.report(Progress::PhaseStart {
        name: "Potential Fit",
    });
    let fitted = tools
        .fitter
        .fit(&potential, &workspace)
        .map_err(|source| PipelineError::Fit {
            stage: STAGE,
            source,
        })?;
    ctx.reporter.report(Progress::PhaseFinish);

    // === Phase 2: Construction ===
    ctx.reporter.report(Progress::PhaseStart {
        name: "Construction",
    });
    let output = workspace.output(&config.output_name);
    discard_stale(&output).map_err(PipelineError::io(STAGE, &output))?;
    info!(
        "Constructing {} configuration into {}",
        config.mode.name(),
        output.display()
    );
    match &config.mode {
        BuildMode::PeriodicArray(array) => {
            build_periodic_array(tools, &workspace, array, &fitted, &element, &output)?
        }
        BuildMode::Bicrystal(bicrystal) => {
            build_bicrystal(ctx, tools, &workspace, bicrystal, &fitted, &element, &output)?
        }
    }
    ctx.reporter.report(Progress::PhaseFinish);

    // === Phase 3: Verification and persistence ===
    let mut structure = LammpsDataFile::read_from_path(&output)
        .map_err(PipelineError::data_file(STAGE, &output))?;
    if structure.is_empty() {
        return Err(PipelineError::Construction {
            stage: STAGE,
            message: format!("'{}' contains no atoms", output.display()),
        });
    }
    let min_lengths = config.mode.min_lengths();
    for axis in Axis::ALL {
        let extent = structure.simulation_box.extent(axis);
        if extent + EXTENT_TOLERANCE < min_lengths[axis.index()] {
            return Err(PipelineError::Construction {
                stage: STAGE,
                message: format!(
                    "box extent {:.4} Å along {} is below the requested {} Å",
                    extent,
                    axis,
                    min_lengths[axis.index()]
                ),
            });
        }
    }
    structure.set_periodicity(config.mode.periodicity());
    if structure.masses.is_empty() {
        if let Some(mass) = elements::atomic_mass(&element) {
            structure.masses.insert(1, mass);
        } else {
            warn!("No mass known for '{}'; data file has no Masses section", element);
        }
    }
    if structure.title.is_empty() {
        structure.title = format!("{} {} configuration", element, config.mode.name());
    }
    LammpsDataFile::write_to_path(&structure, &output)
        .map_err(PipelineError::data_file(STAGE, &output))?;
    let artifact = ConfigurationArtifact::record(STAGE, &output, &structure)?;

    let extents = structure.simulation_box.extents();
    info!(
        "Built {} atoms in a {:.2} x {:.2} x {:.2} Å box ({})",
        structure.len(),
        extents[0],
        extents[1],
        extents[2],
        structure.simulation_box.periodicity
    );
    Ok(BuildResult {
        artifact: BuiltConfiguration::new(artifact),
        fitted,
        atom_count: structure.len(),
        extents,
    })
}

fn validate_mode(mode: &BuildMode) -> Result<(), PipelineError> {
    let crystal = |source| PipelineError::Crystal {
        stage: STAGE,
        source,
    };
    match mode {
        BuildMode::PeriodicArray(array) => array.slip.validate().map_err(crystal),
        BuildMode::Bicrystal(bicrystal) => {
            for vector in &bicrystal.orientation {
                vector.miller_indices().map_err(crystal)?;
            }
            let [x, y, z] = &bicrystal.orientation;
            for (a, b) in [(x, y), (y, z), (x, z)] {
                if a.dot(b).abs() > 1e-9 {
                    return Err(PipelineError::Validation {
                        stage: STAGE,
                        message: format!("orientation vectors {} and {} are not orthogonal", a, b),
                    });
                }
            }
            Ok(())
        }
    }
}

fn build_periodic_array(
    tools: &BuildTools,
    workspace: &StageWorkspace,
    array: &PeriodicArrayConfig,
    fitted: &FittedPotential,
    element: &str,
    output: &Path,
) -> Result<(), PipelineError> {
    let job = DislocationJob {
        element: element.to_string(),
        lattice: LATTICE.to_string(),
        lattice_constant: fitted.lattice_constant,
        burgers: array.slip.burgers.0,
        slip_plane: array.slip.slip_plane.0,
        line_direction: array.slip.line_direction.0,
        min_lengths: array.min_lengths,
        boundary_width: array.boundary_width,
        boundary_scale: array.boundary_scale,
        shift: array.shift,
        shift_scale: array.shift_scale,
        output: output.to_path_buf(),
        elastic: fitted.elastic,
    };
    info!(
        "Dislocation character angle {:.1}°",
        array.slip.character_angle()
    );
    tools
        .generator
        .generate(&job, &workspace.log("dislocation.toml"))
        .map_err(|source| PipelineError::Generator {
            stage: STAGE,
            source,
        })
}

fn build_bicrystal(
    ctx: &RunContext,
    tools: &BuildTools,
    workspace: &StageWorkspace,
    bicrystal: &BicrystalConfig,
    fitted: &FittedPotential,
    element: &str,
    output: &Path,
) -> Result<(), PipelineError> {
    let structure_error = |source| PipelineError::Structure {
        stage: STAGE,
        source,
    };
    ctx.reporter.report(Progress::TaskStart { total: 4 });

    let unit = workspace.output("unit_cell.lmp");
    let lower = workspace.output("lower_slab.lmp");
    let upper = workspace.output("upper_slab.lmp");
    for path in [&unit, &lower, &upper] {
        discard_stale(path).map_err(PipelineError::io(STAGE, path))?;
    }
    let status = |text: &str| {
        ctx.reporter.report(Progress::StatusUpdate {
            text: text.to_string(),
        })
    };
    status("unit cell");
    tools
        .structure_tool
        .create_unit_cell(
            LATTICE,
            fitted.lattice_constant,
            element,
            &bicrystal.orientation,
            &unit,
        )
        .map_err(structure_error)?;
    ctx.reporter.report(Progress::TaskIncrement { amount: 1 });

    let cell = LammpsDataFile::read_from_path(&unit)
        .map_err(PipelineError::data_file(STAGE, &unit))?;
    let plan = BicrystalPlan::new(cell.simulation_box.extents(), bicrystal).map_err(|message| {
        PipelineError::Construction {
            stage: STAGE,
            message,
        }
    })?;
    info!(
        "Bicrystal slabs: {:?} and {:?} replicas strained to {:.4} Å along {}",
        plan.lower_replicas, plan.upper_replicas, plan.common_length, bicrystal.transport_axis
    );

    for (label, path, replicas, strain) in [
        ("lower slab", &lower, plan.lower_replicas, plan.lower_strain),
        ("upper slab", &upper, plan.upper_replicas, plan.upper_strain),
    ] {
        status(label);
        tools
            .structure_tool
            .duplicate(
                &unit,
                replicas,
                Some((bicrystal.transport_axis, strain)),
                path,
            )
            .map_err(structure_error)?;
        ctx.reporter.report(Progress::TaskIncrement { amount: 1 });
    }

    status("merging slabs");
    tools
        .structure_tool
        .merge(bicrystal.merge_axis, &[lower, upper], output)
        .map_err(structure_error)?;
    ctx.reporter.report(Progress::TaskIncrement { amount: 1 });
    ctx.reporter.report(Progress::TaskFinish);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::crystal::{CrystalVector, SlipSystem};
    use crate::core::models::simulation_box::Periodicity;
    use crate::engine::config::{BuildConfigBuilder, FitSource, PathsConfig};
    use crate::engine::fitting::KnownConstants;
    use crate::engine::generator::{DislocationGenerator, GeneratorError};
    use crate::engine::progress::ProgressReporter;
    use crate::workflows::testing::{
        FakeGenerator, FakeStructureTool, NoEngine, fitted_iron, potential_file,
        recording_reporter,
    };

    fn periodic_array(min: f64) -> BuildConfig {
        BuildConfigBuilder::new()
            .mode(BuildMode::PeriodicArray(PeriodicArrayConfig {
                slip: SlipSystem::bcc_screw(),
                min_lengths: [min; 3],
                boundary_width: 3.0,
                boundary_scale: true,
                shift: [0.0, 0.0, 2.0 / 3.0],
                shift_scale: true,
            }))
            .fit(FitSource::Known(fitted_iron()))
            .output_name("input.lmp")
            .build()
            .unwrap()
    }

    fn bicrystal() -> BicrystalConfig {
        BicrystalConfig {
            orientation: [
                CrystalVector::new(1.0, 1.0, 1.0),
                CrystalVector::new(-1.0, 1.0, 0.0),
                CrystalVector::new(-1.0, -1.0, 2.0),
            ],
            min_lengths: [40.0, 40.0, 20.0],
            transport_axis: Axis::X,
            merge_axis: Axis::Y,
        }
    }

    #[test]
    fn periodic_array_is_free_along_y_and_large_enough() {
        let dir = tempfile::tempdir().unwrap();
        let paths = PathsConfig::new(dir.path());
        let potential = potential_file(dir.path());
        let reporter = ProgressReporter::new();
        let ctx = RunContext::new(&paths, &potential, &NoEngine, &reporter);
        let fitter = KnownConstants(fitted_iron());
        let generator = FakeGenerator::default();
        let tools = BuildTools {
            fitter: &fitter,
            generator: &generator,
            structure_tool: &FakeStructureTool,
        };

        let result = run(&ctx, &tools, &periodic_array(30.0)).unwrap();
        assert!(result.atom_count > 0);
        assert!(result.extents.iter().all(|e| *e >= 30.0));

        let built = BuiltConfiguration::open(result.artifact.path()).unwrap();
        assert_eq!(built.artifact().periodicity(), Periodicity::slab(Axis::Y));
        assert_eq!(built.artifact().periodicity().to_string(), "p f p");
        assert!(dir.path().join("01_input/logs/dislocation.toml").is_file());
        assert!(dir.path().join("01_input/dump").is_dir());
    }

    #[test]
    fn rebuilding_overwrites_the_same_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let paths = PathsConfig::new(dir.path());
        let potential = potential_file(dir.path());
        let reporter = ProgressReporter::new();
        let ctx = RunContext::new(&paths, &potential, &NoEngine, &reporter);
        let fitter = KnownConstants(fitted_iron());
        let generator = FakeGenerator::default();
        let tools = BuildTools {
            fitter: &fitter,
            generator: &generator,
            structure_tool: &FakeStructureTool,
        };
        let first = run(&ctx, &tools, &periodic_array(20.0)).unwrap();
        let second = run(&ctx, &tools, &periodic_array(20.0)).unwrap();
        assert_eq!(first.artifact, second.artifact);
    }

    #[test]
    fn undersized_generator_output_is_a_construction_failure() {
        let dir = tempfile::tempdir().unwrap();
        let paths = PathsConfig::new(dir.path());
        let potential = potential_file(dir.path());
        let reporter = ProgressReporter::new();
        let ctx = RunContext::new(&paths, &potential, &NoEngine, &reporter);
        let fitter = KnownConstants(fitted_iron());
        let generator = FakeGenerator { shrink: 0.5 };
        let tools = BuildTools {
            fitter: &fitter,
            generator: &generator,
            structure_tool: &FakeStructureTool,
        };
        let err = run(&ctx, &tools, &periodic_array(20.0)).unwrap_err();
        assert!(matches!(err, PipelineError::Construction { .. }));
    }

    struct SilentGenerator;

    impl DislocationGenerator for SilentGenerator {
        fn generate(&self, _: &DislocationJob, _: &Path) -> Result<(), GeneratorError> {
            Ok(())
        }
    }

    #[test]
    fn previous_build_output_is_not_reused() {
        let dir = tempfile::tempdir().unwrap();
        let paths = PathsConfig::new(dir.path());
        let potential = potential_file(dir.path());
        let reporter = ProgressReporter::new();
        let ctx = RunContext::new(&paths, &potential, &NoEngine, &reporter);
        let fitter = KnownConstants(fitted_iron());
        let generator = FakeGenerator::default();
        let tools = BuildTools {
            fitter: &fitter,
            generator: &generator,
            structure_tool: &FakeStructureTool,
        };
        let first = run(&ctx, &tools, &periodic_array(20.0)).unwrap();
        assert!(first.artifact.path().is_file());

        let tools = BuildTools {
            generator: &SilentGenerator,
            ..tools
        };
        let err = run(&ctx, &tools, &periodic_array(20.0)).unwrap_err();
        assert!(matches!(err, PipelineError::DataFile { stage: Stage::Build, .. }));
        assert!(!dir.path().join("01_input/output/input.lmp").exists());
    }

    #[test]
    fn degenerate_slip_system_fails_before_any_collaborator_runs() {
        let dir = tempfile::tempdir().unwrap();
        let paths = PathsConfig::new(dir.path());
        let potential = potential_file(dir.path());
        let reporter = ProgressReporter::new();
        let ctx = RunContext::new(&paths, &potential, &NoEngine, &reporter);
        let fitter = KnownConstants(fitted_iron());
        let generator = FakeGenerator::default();
        let tools = BuildTools {
            fitter: &fitter,
            generator: &generator,
            structure_tool: &FakeStructureTool,
        };
        let mut config = periodic_array(20.0);
        if let BuildMode::PeriodicArray(array) = &mut config.mode {
            array.slip.burgers = CrystalVector::new(1.0, 0.0, 0.0);
        }
        let err = run(&ctx, &tools, &config).unwrap_err();
        assert!(matches!(err, PipelineError::Crystal { stage: Stage::Build, .. }));
        assert!(!dir.path().join("01_input").exists());
    }

    #[test]
    fn missing_potential_is_a_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let paths = PathsConfig::new(dir.path());
        let potential = crate::core::models::potential::PotentialModel::new(
            dir.path().join("absent.fs"),
            "eam/fs",
            &["Fe"],
        );
        let reporter = ProgressReporter::new();
        let ctx = RunContext::new(&paths, &potential, &NoEngine, &reporter);
        let fitter = KnownConstants(fitted_iron());
        let generator = FakeGenerator::default();
        let tools = BuildTools {
            fitter: &fitter,
            generator: &generator,
            structure_tool: &FakeStructureTool,
        };
        let err = run(&ctx, &tools, &periodic_array(20.0)).unwrap_err();
        assert!(matches!(err, PipelineError::Validation { .. }));
    }

    #[test]
    fn bicrystal_plan_adds_one_period_to_the_upper_slab() {
        let plan = BicrystalPlan::new([4.945, 4.038, 6.994], &bicrystal()).unwrap();
        assert_eq!(plan.lower_replicas, [9, 5, 3]);
        assert_eq!(plan.upper_replicas, [10, 5, 3]);
        let lower = 9.0 * 4.945 * (1.0 + plan.lower_strain);
        let upper = 10.0 * 4.945 * (1.0 + plan.upper_strain);
        assert!((lower - plan.common_length).abs() < 1e-9);
        assert!((upper - plan.common_length).abs() < 1e-9);
        assert!(plan.lower_strain > 0.0 && plan.upper_strain < 0.0);
    }

    #[test]
    fn bicrystal_is_merged_and_free_along_the_merge_axis() {
        let dir = tempfile::tempdir().unwrap();
        let paths = PathsConfig::new(dir.path());
        let potential = potential_file(dir.path());
        let (reporter, events) = recording_reporter();
        let ctx = RunContext::new(&paths, &potential, &NoEngine, &reporter);
        let fitter = KnownConstants(fitted_iron());
        let generator = FakeGenerator::default();
        let tools = BuildTools {
            fitter: &fitter,
            generator: &generator,
            structure_tool: &FakeStructureTool,
        };
        let config = BuildConfigBuilder::new()
            .mode(BuildMode::Bicrystal(bicrystal()))
            .fit(FitSource::Known(fitted_iron()))
            .output_name("input.lmp")
            .build()
            .unwrap();
        let result = run(&ctx, &tools, &config).unwrap();
        assert_eq!(
            result.artifact.artifact().periodicity(),
            Periodicity::slab(Axis::Y)
        );
        assert!(result.extents[1] >= 40.0);
        assert!(dir.path().join("01_input/output/lower_slab.lmp").is_file());
        let statuses: Vec<String> = events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                Progress::StatusUpdate { text } => Some(text.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(
            statuses,
            ["unit cell", "lower slab", "upper slab", "merging slabs"]
        );
    }
}
