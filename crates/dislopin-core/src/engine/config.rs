use super::workspace::{Stage, StageWorkspace};
use crate::core::models::crystal::{CrystalVector, SlipSystem};
use crate::core::models::potential::FittedPotential;
use crate::core::models::simulation_box::{Axis, Periodicity};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

fn require_positive(name: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(value)
    } else {
        Err(ConfigError::InvalidParameter {
            name,
            reason: format!("must be a positive number, got {}", value),
        })
    }
}

fn require_non_negative(name: &'static str, value: f64) -> Result<f64, ConfigError> {
    if value >= 0.0 && value.is_finite() {
        Ok(value)
    } else {
        Err(ConfigError::InvalidParameter {
            name,
            reason: format!("must be non-negative, got {}", value),
        })
    }
}

fn require_nonzero(name: &'static str, value: u64) -> Result<u64, ConfigError> {
    if value > 0 {
        Ok(value)
    } else {
        Err(ConfigError::InvalidParameter {
            name,
            reason: "must be at least 1".to_string(),
        })
    }
}

fn require_lengths(name: &'static str, lengths: [f64; 3]) -> Result<[f64; 3], ConfigError> {
    for value in lengths {
        require_positive(name, value)?;
    }
    Ok(lengths)
}

pub const DEFAULT_BUILD_DIR: &str = "01_input";
pub const DEFAULT_RELAX_DIR: &str = "02_minimize";
pub const DEFAULT_SHEAR_DIR: &str = "03_pin_dislo";

/// Where each stage keeps its files, relative to a shared data root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathsConfig {
    pub data_root: PathBuf,
    pub build_dir: String,
    pub relax_dir: String,
    pub shear_dir: String,
}

impl PathsConfig {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            build_dir: DEFAULT_BUILD_DIR.to_string(),
            relax_dir: DEFAULT_RELAX_DIR.to_string(),
            shear_dir: DEFAULT_SHEAR_DIR.to_string(),
        }
    }

    pub fn stage_dir(&self, stage: Stage) -> PathBuf {
        let name = match stage {
            Stage::Build => &self.build_dir,
            Stage::Relax => &self.relax_dir,
            Stage::Shear => &self.shear_dir,
        };
        self.data_root.join(name)
    }

    pub fn workspace(&self, stage: Stage) -> StageWorkspace {
        StageWorkspace::new(stage, self.stage_dir(stage))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MpiLaunch {
    pub launcher: PathBuf,
    pub processes: u32,
}

/// How the MD engine binary is launched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub binary: PathBuf,
    pub mpi: Option<MpiLaunch>,
    /// Extra command-line switches, e.g. `-k on g 1 -sf kk` for the Kokkos package.
    pub accelerator_args: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("lmp"),
            mpi: None,
            accelerator_args: Vec::new(),
        }
    }
}

/// Settings for measuring the lattice constant and cubic elastic constants with the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElasticFitSettings {
    /// Starting lattice constant for the box relaxation (Å).
    pub lattice_guess: f64,
    /// Magnitude of the finite strain applied to measure the pressure response.
    pub strain: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FitSource {
    Engine(ElasticFitSettings),
    Known(FittedPotential),
}

/// A periodic array of straight dislocations built by the dislocation generator.
///
/// The line direction runs along x, the glide-plane normal along y. The box is free along
/// y and periodic along x and z.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodicArrayConfig {
    pub slip: SlipSystem,
    pub min_lengths: [f64; 3],
    pub boundary_width: f64,
    /// Whether `boundary_width` is given in lattice constants.
    pub boundary_scale: bool,
    pub shift: [f64; 3],
    /// Whether `shift` is given in lattice constants.
    pub shift_scale: bool,
}

impl PeriodicArrayConfig {
    pub const FREE_AXIS: Axis = Axis::Y;
}

/// Two slabs of the same crystal, one replica apart along the transport axis, strained to a
/// common length and stacked along the merge axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BicrystalConfig {
    /// Crystal directions mapped onto the x, y and z box axes.
    pub orientation: [CrystalVector; 3],
    pub min_lengths: [f64; 3],
    pub transport_axis: Axis,
    pub merge_axis: Axis,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BuildMode {
    PeriodicArray(PeriodicArrayConfig),
    Bicrystal(BicrystalConfig),
}

impl BuildMode {
    pub fn free_axis(&self) -> Axis {
        match self {
            BuildMode::PeriodicArray(_) => PeriodicArrayConfig::FREE_AXIS,
            BuildMode::Bicrystal(config) => config.merge_axis,
        }
    }

    /// Boundary flags of the configuration this mode produces.
    pub fn periodicity(&self) -> Periodicity {
        Periodicity::slab(self.free_axis())
    }

    pub fn min_lengths(&self) -> [f64; 3] {
        match self {
            BuildMode::PeriodicArray(config) => config.min_lengths,
            BuildMode::Bicrystal(config) => config.min_lengths,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BuildMode::PeriodicArray(_) => "periodic-array",
            BuildMode::Bicrystal(_) => "bicrystal",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuildConfig {
    pub mode: BuildMode,
    pub fit: FitSource,
    pub output_name: String,
}

#[derive(Default)]
pub struct BuildConfigBuilder {
    mode: Option<BuildMode>,
    fit: Option<FitSource>,
    output_name: Option<String>,
}

impl BuildConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(mut self, mode: BuildMode) -> Self {
        self.mode = Some(mode);
        self
    }
    pub fn fit(mut self, fit: FitSource) -> Self {
        self.fit = Some(fit);
        self
    }
    pub fn output_name(mut self, name: impl Into<String>) -> Self {
        self.output_name = Some(name.into());
        self
    }

    pub fn build(self) -> Result<BuildConfig, ConfigError> {
        let mode = self.mode.ok_or(ConfigError::MissingParameter("mode"))?;
        require_lengths("min_lengths", mode.min_lengths())?;
        match &mode {
            BuildMode::PeriodicArray(config) => {
                require_non_negative("boundary_width", config.boundary_width)?;
            }
            BuildMode::Bicrystal(config) => {
                if config.transport_axis == config.merge_axis {
                    return Err(ConfigError::InvalidParameter {
                        name: "merge_axis",
                        reason: format!(
                            "must differ from the transport axis ({})",
                            config.transport_axis
                        ),
                    });
                }
            }
        }
        let fit = self.fit.ok_or(ConfigError::MissingParameter("fit"))?;
        if let FitSource::Engine(settings) = &fit {
            require_positive("lattice_guess", settings.lattice_guess)?;
            require_positive("strain", settings.strain)?;
        }
        Ok(BuildConfig {
            mode,
            fit,
            output_name: self
                .output_name
                .ok_or(ConfigError::MissingParameter("output_name"))?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelaxConfig {
    pub energy_tolerance: f64,
    pub force_tolerance: f64,
    pub max_iterations: u64,
    pub max_evaluations: u64,
    pub thermo_every: u64,
    pub dump_columns: Vec<String>,
    pub output_name: String,
    pub dump_name: String,
}

#[derive(Default)]
pub struct RelaxConfigBuilder {
    energy_tolerance: Option<f64>,
    force_tolerance: Option<f64>,
    max_iterations: Option<u64>,
    max_evaluations: Option<u64>,
    thermo_every: Option<u64>,
    dump_columns: Option<Vec<String>>,
    output_name: Option<String>,
    dump_name: Option<String>,
}

impl RelaxConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn energy_tolerance(mut self, tolerance: f64) -> Self {
        self.energy_tolerance = Some(tolerance);
        self
    }
    pub fn force_tolerance(mut self, tolerance: f64) -> Self {
        self.force_tolerance = Some(tolerance);
        self
    }
    pub fn max_iterations(mut self, iterations: u64) -> Self {
        self.max_iterations = Some(iterations);
        self
    }
    pub fn max_evaluations(mut self, evaluations: u64) -> Self {
        self.max_evaluations = Some(evaluations);
        self
    }
    pub fn thermo_every(mut self, steps: u64) -> Self {
        self.thermo_every = Some(steps);
        self
    }
    pub fn dump_columns(mut self, columns: Vec<String>) -> Self {
        self.dump_columns = Some(columns);
        self
    }
    pub fn output_name(mut self, name: impl Into<String>) -> Self {
        self.output_name = Some(name.into());
        self
    }
    pub fn dump_name(mut self, name: impl Into<String>) -> Self {
        self.dump_name = Some(name.into());
        self
    }

    pub fn build(self) -> Result<RelaxConfig, ConfigError> {
        let energy_tolerance = self
            .energy_tolerance
            .ok_or(ConfigError::MissingParameter("energy_tolerance"))?;
        if !(0.0..1.0).contains(&energy_tolerance) {
            return Err(ConfigError::InvalidParameter {
                name: "energy_tolerance",
                reason: format!("must be in [0, 1), got {}", energy_tolerance),
            });
        }
        let force_tolerance = require_non_negative(
            "force_tolerance",
            self.force_tolerance
                .ok_or(ConfigError::MissingParameter("force_tolerance"))?,
        )?;
        let max_iterations = require_nonzero(
            "max_iterations",
            self.max_iterations
                .ok_or(ConfigError::MissingParameter("max_iterations"))?,
        )?;
        let max_evaluations = require_nonzero(
            "max_evaluations",
            self.max_evaluations
                .ok_or(ConfigError::MissingParameter("max_evaluations"))?,
        )?;
        let dump_columns = self
            .dump_columns
            .ok_or(ConfigError::MissingParameter("dump_columns"))?;
        if dump_columns.first().map(String::as_str) != Some("id") {
            return Err(ConfigError::InvalidParameter {
                name: "dump_columns",
                reason: "the first column must be 'id'".to_string(),
            });
        }
        Ok(RelaxConfig {
            energy_tolerance,
            force_tolerance,
            max_iterations,
            max_evaluations,
            thermo_every: require_nonzero(
                "thermo_every",
                self.thermo_every
                    .ok_or(ConfigError::MissingParameter("thermo_every"))?,
            )?,
            dump_columns,
            output_name: self
                .output_name
                .ok_or(ConfigError::MissingParameter("output_name"))?,
            dump_name: self
                .dump_name
                .ok_or(ConfigError::MissingParameter("dump_name"))?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShearConfig {
    /// Precipitate sphere radius (Å).
    pub precipitate_radius: f64,
    /// Extra separation between dislocation and precipitate surface (Å).
    pub initial_offset: f64,
    /// Depth of the pinned layers at both free faces (Å).
    pub surface_depth: f64,
    pub displacement_axis: Axis,
    pub shear_axis: Axis,
    /// Integration timestep (ps).
    pub timestep: f64,
    /// Thermostat target (K).
    pub temperature: f64,
    /// Relative velocity of the two surface layers (Å/ps).
    pub shear_velocity: f64,
    /// Thermostat damping time in units of the timestep.
    pub damping_factor: f64,
    pub velocity_seed: u32,
    pub steps: u64,
    pub thermo_every: u64,
    pub dump_every: u64,
    pub restart_every: u64,
    pub dump_columns: Vec<String>,
    pub final_name: String,
}

impl ShearConfig {
    /// Rigid shift applied to every atom before the regions are carved.
    pub fn displacement(&self) -> f64 {
        self.precipitate_radius + self.initial_offset
    }

    pub fn damping_time(&self) -> f64 {
        self.damping_factor * self.timestep
    }
}

#[derive(Default)]
pub struct ShearConfigBuilder {
    precipitate_radius: Option<f64>,
    initial_offset: Option<f64>,
    surface_depth: Option<f64>,
    displacement_axis: Option<Axis>,
    shear_axis: Option<Axis>,
    timestep: Option<f64>,
    temperature: Option<f64>,
    shear_velocity: Option<f64>,
    damping_factor: Option<f64>,
    velocity_seed: Option<u32>,
    steps: Option<u64>,
    thermo_every: Option<u64>,
    dump_every: Option<u64>,
    restart_every: Option<u64>,
    dump_columns: Option<Vec<String>>,
    final_name: Option<String>,
}

impl ShearConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn precipitate_radius(mut self, radius: f64) -> Self {
        self.precipitate_radius = Some(radius);
        self
    }
    pub fn initial_offset(mut self, offset: f64) -> Self {
        self.initial_offset = Some(offset);
        self
    }
    pub fn surface_depth(mut self, depth: f64) -> Self {
        self.surface_depth = Some(depth);
        self
    }
    pub fn displacement_axis(mut self, axis: Axis) -> Self {
        self.displacement_axis = Some(axis);
        self
    }
    pub fn shear_axis(mut self, axis: Axis) -> Self {
        self.shear_axis = Some(axis);
        self
    }
    pub fn timestep(mut self, dt: f64) -> Self {
        self.timestep = Some(dt);
        self
    }
    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }
    pub fn shear_velocity(mut self, velocity: f64) -> Self {
        self.shear_velocity = Some(velocity);
        self
    }
    pub fn damping_factor(mut self, factor: f64) -> Self {
        self.damping_factor = Some(factor);
        self
    }
    pub fn velocity_seed(mut self, seed: u32) -> Self {
        self.velocity_seed = Some(seed);
        self
    }
    pub fn steps(mut self, steps: u64) -> Self {
        self.steps = Some(steps);
        self
    }
    pub fn thermo_every(mut self, steps: u64) -> Self {
        self.thermo_every = Some(steps);
        self
    }
    pub fn dump_every(mut self, steps: u64) -> Self {
        self.dump_every = Some(steps);
        self
    }
    pub fn restart_every(mut self, steps: u64) -> Self {
        self.restart_every = Some(steps);
        self
    }
    pub fn dump_columns(mut self, columns: Vec<String>) -> Self {
        self.dump_columns = Some(columns);
        self
    }
    pub fn final_name(mut self, name: impl Into<String>) -> Self {
        self.final_name = Some(name.into());
        self
    }

    pub fn build(self) -> Result<ShearConfig, ConfigError> {
        let initial_offset = require_non_negative(
            "initial_offset",
            self.initial_offset
                .ok_or(ConfigError::MissingParameter("initial_offset"))?,
        )?;
        let shear_velocity = self
            .shear_velocity
            .ok_or(ConfigError::MissingParameter("shear_velocity"))?;
        if !shear_velocity.is_finite() {
            return Err(ConfigError::InvalidParameter {
                name: "shear_velocity",
                reason: "must be finite".to_string(),
            });
        }
        let velocity_seed = self
            .velocity_seed
            .ok_or(ConfigError::MissingParameter("velocity_seed"))?;
        if velocity_seed == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "velocity_seed",
                reason: "must be a positive integer".to_string(),
            });
        }
        let dump_columns = self
            .dump_columns
            .ok_or(ConfigError::MissingParameter("dump_columns"))?;
        if dump_columns.is_empty() {
            return Err(ConfigError::InvalidParameter {
                name: "dump_columns",
                reason: "at least one column is required".to_string(),
            });
        }

        Ok(ShearConfig {
            precipitate_radius: require_positive(
                "precipitate_radius",
                self.precipitate_radius
                    .ok_or(ConfigError::MissingParameter("precipitate_radius"))?,
            )?,
            initial_offset,
            surface_depth: require_positive(
                "surface_depth",
                self.surface_depth
                    .ok_or(ConfigError::MissingParameter("surface_depth"))?,
            )?,
            displacement_axis: self
                .displacement_axis
                .ok_or(ConfigError::MissingParameter("displacement_axis"))?,
            shear_axis: self
                .shear_axis
                .ok_or(ConfigError::MissingParameter("shear_axis"))?,
            timestep: require_positive(
                "timestep",
                self.timestep.ok_or(ConfigError::MissingParameter("timestep"))?,
            )?,
            temperature: require_positive(
                "temperature",
                self.temperature
                    .ok_or(ConfigError::MissingParameter("temperature"))?,
            )?,
            shear_velocity,
            damping_factor: require_positive(
                "damping_factor",
                self.damping_factor
                    .ok_or(ConfigError::MissingParameter("damping_factor"))?,
            )?,
            velocity_seed,
            steps: require_nonzero(
                "steps",
                self.steps.ok_or(ConfigError::MissingParameter("steps"))?,
            )?,
            thermo_every: require_nonzero(
                "thermo_every",
                self.thermo_every
                    .ok_or(ConfigError::MissingParameter("thermo_every"))?,
            )?,
            dump_every: require_nonzero(
                "dump_every",
                self.dump_every
                    .ok_or(ConfigError::MissingParameter("dump_every"))?,
            )?,
            restart_every: require_nonzero(
                "restart_every",
                self.restart_every
                    .ok_or(ConfigError::MissingParameter("restart_every"))?,
            )?,
            dump_columns,
            final_name: self
                .final_name
                .ok_or(ConfigError::MissingParameter("final_name"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shear_builder() -> ShearConfigBuilder {
        ShearConfigBuilder::new()
            .precipitate_radius(25.0)
            .initial_offset(10.0)
            .surface_depth(5.0)
            .displacement_axis(Axis::X)
            .shear_axis(Axis::X)
            .timestep(0.001)
            .temperature(800.0)
            .shear_velocity(1.0)
            .damping_factor(100.0)
            .velocity_seed(1234)
            .steps(100)
            .thermo_every(1000)
            .dump_every(1000)
            .restart_every(10000)
            .dump_columns(vec!["id".into(), "x".into()])
            .final_name("final.lmp")
    }

    #[test]
    fn stage_directories_hang_off_the_data_root() {
        let paths = PathsConfig::new("/data");
        assert_eq!(paths.stage_dir(Stage::Relax), PathBuf::from("/data/02_minimize"));
        assert_eq!(
            paths.workspace(Stage::Shear).restarts_dir(),
            PathBuf::from("/data/03_pin_dislo/restarts")
        );
    }

    #[test]
    fn shear_config_derives_displacement_and_damping() {
        let config = shear_builder().build().unwrap();
        assert_eq!(config.displacement(), 35.0);
        assert!((config.damping_time() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn shear_builder_reports_missing_and_invalid_parameters() {
        assert_eq!(
            ShearConfigBuilder::new().build().unwrap_err(),
            ConfigError::MissingParameter("initial_offset")
        );
        assert!(matches!(
            shear_builder().timestep(0.0).build(),
            Err(ConfigError::InvalidParameter { name: "timestep", .. })
        ));
        assert!(matches!(
            shear_builder().velocity_seed(0).build(),
            Err(ConfigError::InvalidParameter { name: "velocity_seed", .. })
        ));
        assert!(matches!(
            shear_builder().restart_every(0).build(),
            Err(ConfigError::InvalidParameter { name: "restart_every", .. })
        ));
    }

    #[test]
    fn shear_builder_rejects_nan_offsets() {
        for offset in [f64::NAN, -1.0, f64::INFINITY] {
            assert!(matches!(
                shear_builder().initial_offset(offset).build(),
                Err(ConfigError::InvalidParameter { name: "initial_offset", .. })
            ));
        }
    }

    #[test]
    fn relax_builder_requires_id_as_first_dump_column() {
        let builder = || {
            RelaxConfigBuilder::new()
                .energy_tolerance(1e-6)
                .force_tolerance(1e-8)
                .max_iterations(1000)
                .max_evaluations(10000)
                .thermo_every(10)
                .output_name("output.lmp")
                .dump_name("dump")
        };
        assert!(
            builder()
                .dump_columns(vec!["id".into(), "x".into()])
                .build()
                .is_ok()
        );
        assert!(matches!(
            builder().dump_columns(vec!["x".into()]).build(),
            Err(ConfigError::InvalidParameter { name: "dump_columns", .. })
        ));
        assert!(matches!(
            builder()
                .energy_tolerance(1.5)
                .dump_columns(vec!["id".into()])
                .build(),
            Err(ConfigError::InvalidParameter { name: "energy_tolerance", .. })
        ));
    }

    #[test]
    fn build_modes_report_their_free_axis() {
        let array = BuildMode::PeriodicArray(PeriodicArrayConfig {
            slip: SlipSystem::bcc_screw(),
            min_lengths: [300.0; 3],
            boundary_width: 3.0,
            boundary_scale: true,
            shift: [0.0, 0.0, 2.0 / 3.0],
            shift_scale: true,
        });
        assert_eq!(array.periodicity(), Periodicity::slab(Axis::Y));

        let bicrystal = BuildMode::Bicrystal(BicrystalConfig {
            orientation: [
                CrystalVector::new(1.0, 1.0, 1.0),
                CrystalVector::new(-1.0, -1.0, 2.0),
                CrystalVector::new(1.0, -1.0, 0.0),
            ],
            min_lengths: [100.0; 3],
            transport_axis: Axis::X,
            merge_axis: Axis::Y,
        });
        assert_eq!(bicrystal.free_axis(), Axis::Y);
    }

    #[test]
    fn bicrystal_axes_must_differ() {
        let mode = BuildMode::Bicrystal(BicrystalConfig {
            orientation: [
                CrystalVector::new(1.0, 0.0, 0.0),
                CrystalVector::new(0.0, 1.0, 0.0),
                CrystalVector::new(0.0, 0.0, 1.0),
            ],
            min_lengths: [50.0; 3],
            transport_axis: Axis::Z,
            merge_axis: Axis::Z,
        });
        let result = BuildConfigBuilder::new()
            .mode(mode)
            .fit(FitSource::Engine(ElasticFitSettings {
                lattice_guess: 2.855,
                strain: 0.005,
            }))
            .output_name("input.lmp")
            .build();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidParameter { name: "merge_axis", .. })
        ));
    }
}
