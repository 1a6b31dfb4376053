use super::defaults::DefaultsConfig;
use super::file::{
    FileBuildConfig, FileBuildMode, FileConfig, FileFitConfig, FileFitSource, FileRelaxConfig,
    FileShearConfig,
};
use super::models::{AppConfig, ToolsConfig};
use crate::cli::{BuildFlags, CommonArgs, EngineArgs, ModeArg, RelaxFlags, ShearFlags};
use crate::error::{CliError, Result};
use directories::ProjectDirs;
use dislopin::core::models::crystal::{CrystalVector, SlipSystem};
use dislopin::core::models::potential::{ElasticConstants, FittedPotential, PotentialModel};
use dislopin::core::models::simulation_box::Axis;
use dislopin::engine::config::{
    self as core_config, BicrystalConfig, BuildConfigBuilder, BuildMode, ElasticFitSettings,
    EngineConfig, FitSource, MpiLaunch, PathsConfig, PeriodicArrayConfig, RelaxConfigBuilder,
    ShearConfigBuilder,
};
use std::path::PathBuf;
use tracing::{debug, info};

/// Command-line values that take precedence over the config file.
#[derive(Debug, Default)]
pub struct CliOverrides<'a> {
    pub build: Option<&'a BuildFlags>,
    pub relax: Option<&'a RelaxFlags>,
    pub shear: Option<&'a ShearFlags>,
}

/// `<config dir>/dislopin/config.toml` on this platform.
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "dislopin").map(|dirs| dirs.config_dir().join("config.toml"))
}

fn config_error(e: core_config::ConfigError) -> CliError {
    CliError::Config(e.to_string())
}

/// Merges built-in defaults, the config file, `-S` overrides and command-line flags, in
/// increasing order of precedence.
pub fn build_config(
    common: &CommonArgs,
    engine_args: &EngineArgs,
    overrides: &CliOverrides,
) -> Result<AppConfig> {
    let defaults = DefaultsConfig::default();

    let config_path = match &common.config {
        Some(path) => Some(path.clone()),
        None => default_config_path().filter(|p| p.is_file()),
    };
    if let Some(path) = &config_path {
        info!("Using configuration file {}", path.display());
    }
    let file = FileConfig::load(config_path.as_deref(), &common.set_values)?;

    let data_root = common
        .data_root
        .clone()
        .or(file.data_root)
        .unwrap_or_else(|| PathBuf::from("."));
    let paths_file = file.paths.unwrap_or_default();
    let paths = PathsConfig {
        data_root,
        build_dir: paths_file
            .build_dir
            .unwrap_or_else(|| defaults.build_dir.to_string()),
        relax_dir: paths_file
            .relax_dir
            .unwrap_or_else(|| defaults.relax_dir.to_string()),
        shear_dir: paths_file
            .shear_dir
            .unwrap_or_else(|| defaults.shear_dir.to_string()),
    };

    let potential_file = file.potential.unwrap_or_default();
    let elements = potential_file
        .elements
        .unwrap_or_else(|| vec![defaults.element.to_string()]);
    let element_refs: Vec<&str> = elements.iter().map(String::as_str).collect();
    let potential = PotentialModel::new(
        common
            .potential
            .clone()
            .or(potential_file.file)
            .unwrap_or_else(|| PathBuf::from(defaults.potential_file)),
        potential_file
            .pair_style
            .as_deref()
            .unwrap_or(defaults.pair_style),
        &element_refs,
    );

    let engine_file = file.engine.unwrap_or_default();
    let processes = engine_args.np.or(engine_file.mpi_processes);
    let mpi = match processes {
        Some(0) => {
            return Err(CliError::Argument(
                "the number of MPI workers must be positive".to_string(),
            ));
        }
        Some(processes) => Some(MpiLaunch {
            launcher: engine_file
                .mpi_launcher
                .unwrap_or_else(|| PathBuf::from(defaults.mpi_launcher)),
            processes,
        }),
        None => None,
    };
    let engine = EngineConfig {
        binary: engine_args
            .lmp
            .clone()
            .or(engine_file.binary)
            .unwrap_or_else(|| PathBuf::from(defaults.lmp)),
        mpi,
        accelerator_args: match &engine_args.accel {
            Some(text) => text.split_whitespace().map(str::to_string).collect(),
            None => engine_file.accelerator_args.unwrap_or_default(),
        },
    };

    let tools_file = file.tools.unwrap_or_default();
    let tools = ToolsConfig {
        atomsk: tools_file
            .atomsk
            .unwrap_or_else(|| PathBuf::from(defaults.atomsk)),
        generator: tools_file
            .generator
            .unwrap_or_else(|| PathBuf::from(defaults.generator)),
        generator_args: tools_file.generator_args.unwrap_or_default(),
    };

    let build = merge_build(file.build.unwrap_or_default(), overrides.build, &defaults)?;
    let relax = merge_relax(file.relax.unwrap_or_default(), overrides.relax, &defaults)?;
    let shear = merge_shear(file.shear.unwrap_or_default(), overrides.shear, &defaults)?;

    debug!(
        "Resolved configuration: data root {}, engine {}",
        paths.data_root.display(),
        engine.binary.display()
    );
    Ok(AppConfig {
        paths,
        potential,
        engine,
        tools,
        build,
        relax,
        shear,
    })
}

fn merge_fit(
    file: FileFitConfig,
    force_known: bool,
    defaults: &DefaultsConfig,
) -> Result<FitSource> {
    let source = if force_known {
        FileFitSource::Known
    } else {
        file.source.unwrap_or(FileFitSource::Engine)
    };
    match source {
        FileFitSource::Engine => Ok(FitSource::Engine(ElasticFitSettings {
            lattice_guess: file.lattice_guess.unwrap_or(defaults.lattice_guess),
            strain: file.strain.unwrap_or(defaults.fit_strain),
        })),
        FileFitSource::Known => {
            let require = |value: Option<f64>, key: &str| {
                value.ok_or_else(|| {
                    CliError::Config(format!("known constants require `build.fit.{}`", key))
                })
            };
            Ok(FitSource::Known(FittedPotential {
                lattice_constant: require(file.lattice_constant, "lattice-constant")?,
                elastic: ElasticConstants {
                    c11: require(file.c11, "c11")?,
                    c12: require(file.c12, "c12")?,
                    c44: require(file.c44, "c44")?,
                },
            }))
        }
    }
}

fn merge_build(
    file: FileBuildConfig,
    flags: Option<&BuildFlags>,
    defaults: &DefaultsConfig,
) -> Result<core_config::BuildConfig> {
    let min_override = flags.and_then(|f| f.min_length).map(|m| [m; 3]);
    let mode = match flags.and_then(|f| f.mode) {
        Some(ModeArg::PeriodicArray) => FileBuildMode::PeriodicArray,
        Some(ModeArg::Bicrystal) => FileBuildMode::Bicrystal,
        None => file.mode.unwrap_or(FileBuildMode::PeriodicArray),
    };

    let mode = match mode {
        FileBuildMode::PeriodicArray => {
            let array = file.periodic_array.unwrap_or_default();
            BuildMode::PeriodicArray(PeriodicArrayConfig {
                slip: SlipSystem {
                    burgers: array.burgers.unwrap_or(defaults.slip.burgers),
                    slip_plane: array.slip_plane.unwrap_or(defaults.slip.slip_plane),
                    line_direction: array
                        .line_direction
                        .unwrap_or(defaults.slip.line_direction),
                },
                min_lengths: min_override
                    .or(array.min_lengths)
                    .unwrap_or([defaults.min_length; 3]),
                boundary_width: array.boundary_width.unwrap_or(defaults.boundary_width),
                boundary_scale: array.boundary_scale.unwrap_or(true),
                shift: array.shift.unwrap_or(defaults.shift),
                shift_scale: array.shift_scale.unwrap_or(true),
            })
        }
        FileBuildMode::Bicrystal => {
            let bicrystal = file.bicrystal.unwrap_or_default();
            BuildMode::Bicrystal(BicrystalConfig {
                orientation: bicrystal.orientation.unwrap_or([
                    CrystalVector::new(1.0, 1.0, 1.0),
                    CrystalVector::new(-1.0, 1.0, 0.0),
                    CrystalVector::new(-1.0, -1.0, 2.0),
                ]),
                min_lengths: min_override
                    .or(bicrystal.min_lengths)
                    .unwrap_or([defaults.min_length; 3]),
                transport_axis: bicrystal.transport_axis.unwrap_or(Axis::X),
                merge_axis: bicrystal.merge_axis.unwrap_or(Axis::Y),
            })
        }
    };

    let force_known = flags.is_some_and(|f| f.known_constants);
    BuildConfigBuilder::new()
        .mode(mode)
        .fit(merge_fit(file.fit.unwrap_or_default(), force_known, defaults)?)
        .output_name(
            file.output_name
                .unwrap_or_else(|| defaults.build_output.to_string()),
        )
        .build()
        .map_err(config_error)
}

fn columns(names: &[&str]) -> Vec<String> {
    names.iter().map(|c| c.to_string()).collect()
}

fn merge_relax(
    file: FileRelaxConfig,
    flags: Option<&RelaxFlags>,
    defaults: &DefaultsConfig,
) -> Result<core_config::RelaxConfig> {
    RelaxConfigBuilder::new()
        .energy_tolerance(
            flags
                .and_then(|f| f.etol)
                .or(file.energy_tolerance)
                .unwrap_or(defaults.energy_tolerance),
        )
        .force_tolerance(
            flags
                .and_then(|f| f.ftol)
                .or(file.force_tolerance)
                .unwrap_or(defaults.force_tolerance),
        )
        .max_iterations(file.max_iterations.unwrap_or(defaults.max_iterations))
        .max_evaluations(file.max_evaluations.unwrap_or(defaults.max_evaluations))
        .thermo_every(file.thermo_every.unwrap_or(defaults.relax_thermo_every))
        .dump_columns(
            file.dump_columns
                .unwrap_or_else(|| columns(defaults.relax_dump_columns)),
        )
        .output_name(
            file.output_name
                .unwrap_or_else(|| defaults.relax_output.to_string()),
        )
        .dump_name(
            file.dump_name
                .unwrap_or_else(|| defaults.relax_dump.to_string()),
        )
        .build()
        .map_err(config_error)
}

fn merge_shear(
    file: FileShearConfig,
    flags: Option<&ShearFlags>,
    defaults: &DefaultsConfig,
) -> Result<core_config::ShearConfig> {
    ShearConfigBuilder::new()
        .precipitate_radius(
            flags
                .and_then(|f| f.radius)
                .or(file.precipitate_radius)
                .unwrap_or(defaults.precipitate_radius),
        )
        .initial_offset(file.initial_offset.unwrap_or(defaults.initial_offset))
        .surface_depth(file.surface_depth.unwrap_or(defaults.surface_depth))
        .displacement_axis(file.displacement_axis.unwrap_or(defaults.displacement_axis))
        .shear_axis(file.shear_axis.unwrap_or(defaults.shear_axis))
        .timestep(file.timestep.unwrap_or(defaults.timestep))
        .temperature(
            flags
                .and_then(|f| f.temperature)
                .or(file.temperature)
                .unwrap_or(defaults.temperature),
        )
        .shear_velocity(
            flags
                .and_then(|f| f.velocity)
                .or(file.shear_velocity)
                .unwrap_or(defaults.shear_velocity),
        )
        .damping_factor(file.damping_factor.unwrap_or(defaults.damping_factor))
        .velocity_seed(file.velocity_seed.unwrap_or(defaults.velocity_seed))
        .steps(
            flags
                .and_then(|f| f.steps)
                .or(file.steps)
                .unwrap_or(defaults.steps),
        )
        .thermo_every(file.thermo_every.unwrap_or(defaults.shear_thermo_every))
        .dump_every(file.dump_every.unwrap_or(defaults.dump_every))
        .restart_every(file.restart_every.unwrap_or(defaults.restart_every))
        .dump_columns(
            file.dump_columns
                .unwrap_or_else(|| columns(defaults.shear_dump_columns)),
        )
        .final_name(
            file.final_name
                .unwrap_or_else(|| defaults.final_name.to_string()),
        )
        .build()
        .map_err(config_error)
}
