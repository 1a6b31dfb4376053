use crate::core::geometry::GeometryError;
use crate::core::geometry::partition::{GroupLabel, Partition, PartitionLayout};
use crate::core::io::dump::{list_step_files, read_last_frame};
use crate::core::io::lammps_data::LammpsDataFile;
use crate::core::io::log::{EngineLog, ThermoTable};
use crate::core::io::traits::ConfigurationFile;
use crate::core::models::configuration::AtomicConfiguration;
use crate::core::models::potential::PotentialModel;
use crate::core::models::simulation_box::{Axis, Periodicity};
use crate::engine::artifact::{ConfigurationArtifact, RelaxedConfiguration};
use crate::engine::config::ShearConfig;
use crate::engine::context::{RunContext, absolute};
use crate::engine::error::PipelineError;
use crate::engine::progress::Progress;
use crate::engine::script::{InputScript, ScriptError};
use crate::engine::workspace::{Stage, StageWorkspace, discard_stale};
use nalgebra::Vector3;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

const STAGE: Stage = Stage::Shear;

pub const PRECIPITATE_IDS_NAME: &str = "precipitate_ID";
pub const RESUME_SCRIPT_NAME: &str = "resume.in";
const DUMP_PREFIX: &str = "dump_";
const RESTART_PREFIX: &str = "restart_";
const PRECIPITATE_FIX: &str = "precipitate_freeze";

const THERMO_COLUMNS: [&str; 13] = [
    "step",
    "temp",
    "pe",
    "etotal",
    "c_press_comp[1]",
    "c_press_comp[2]",
    "c_press_comp[3]",
    "c_press_comp[4]",
    "c_press_comp[5]",
    "c_press_comp[6]",
    "f_precipitate_freeze[1]",
    "f_precipitate_freeze[2]",
    "f_precipitate_freeze[3]",
];

/// Velocities of the top and bottom surface layers along the shear axis.
///
/// The layers move in opposite directions so the relative velocity is `v` and the box
/// carries no net momentum from the drive.
pub fn surface_velocities(shear_velocity: f64) -> (f64, f64) {
    (-0.5 * shear_velocity, 0.5 * shear_velocity)
}

/// Geometry fixed in-process before any directive is issued.
#[derive(Debug, Clone)]
pub struct ShearPlan {
    pub free_axis: Axis,
    pub displacement: Vector3<f64>,
    pub layout: PartitionLayout,
    /// Owning groups of the displaced configuration.
    pub partition: Partition,
}

#[derive(Debug, Clone)]
pub struct ShearResult {
    pub final_path: PathBuf,
    pub group_counts: [(GroupLabel, usize); 4],
    /// Top and bottom surface velocities along the shear axis (Å/ps).
    pub surface_velocities: (f64, f64),
    pub last_step: Option<u64>,
    pub thermo_csv: Option<PathBuf>,
    pub resume_script: PathBuf,
    pub trajectory: Vec<PathBuf>,
    pub restarts: Vec<PathBuf>,
}

fn geometry(source: GeometryError) -> PipelineError {
    PipelineError::Geometry {
        stage: STAGE,
        source,
    }
}

/// The single non-periodic axis of a slab configuration.
fn free_axis(periodicity: &Periodicity) -> Result<Axis, PipelineError> {
    match periodicity.fixed_axes().as_slice() {
        [axis] => Ok(*axis),
        _ => Err(PipelineError::Artifact {
            stage: STAGE,
            message: format!(
                "expected exactly one non-periodic axis, found boundary '{}'",
                periodicity
            ),
        }),
    }
}

/// Validates the geometry against the relaxed box and computes the atom partition.
///
/// The partition is taken after the rigid displacement, exactly as the engine will see it.
pub fn plan(relaxed: &AtomicConfiguration, config: &ShearConfig) -> Result<ShearPlan, PipelineError> {
    let periodicity = relaxed.simulation_box.periodicity;
    let free_axis = free_axis(&periodicity)?;
    if !periodicity.is_periodic(config.displacement_axis) {
        return Err(geometry(GeometryError::DisplacementAxisNotPeriodic(
            config.displacement_axis,
        )));
    }
    if !periodicity.is_periodic(config.shear_axis) {
        return Err(geometry(GeometryError::ShearAxisNotPeriodic(config.shear_axis)));
    }
    let layout = PartitionLayout::for_box(
        &relaxed.simulation_box,
        free_axis,
        config.precipitate_radius,
        config.surface_depth,
    )
    .map_err(geometry)?;

    let displacement = config.displacement_axis.vector(config.displacement());
    let mut displaced = relaxed.clone();
    displaced.displace(&displacement);
    let partition = layout.partition(&displaced);
    partition.ensure_mobile_atoms().map_err(geometry)?;

    Ok(ShearPlan {
        free_axis,
        displacement,
        layout,
        partition,
    })
}

fn components(axis: Axis, value: f64) -> String {
    let mut v = [0.0; 3];
    v[axis.index()] = value;
    format!("{} {} {}", v[0], v[1], v[2])
}

fn declare_diagnostics(script: &mut InputScript) -> Result<(), ScriptError> {
    script
        .compute("peratom", "all", "pe/atom")?
        .compute("stress", "all", "stress/atom NULL")?
        .compute("temp_compute", "all", "temp")?
        .compute("press_comp", "all", "pressure temp_compute")?;
    Ok(())
}

/// Integrators, constraints and, for a fresh start, initial velocities.
///
/// Only the mobile interior is thermostatted; the precipitate and both surface layers carry
/// zero force and move with their assigned velocities under plain NVE.
fn declare_kinematics(
    script: &mut InputScript,
    config: &ShearConfig,
    fresh: bool,
) -> Result<(), ScriptError> {
    let (top, bottom) = surface_velocities(config.shear_velocity);
    let mobile = GroupLabel::Mobile.group_name();
    script.timestep(config.timestep)?.fix(
        "mobile_thermostat",
        mobile,
        &format!(
            "nvt temp {} {} {}",
            config.temperature,
            config.temperature,
            config.damping_time()
        ),
    )?;
    if fresh {
        script.velocity(
            mobile,
            &format!(
                "create {} {} mom yes rot yes",
                config.temperature, config.velocity_seed
            ),
        )?;
    }
    for (label, fix, velocity) in [
        (GroupLabel::Precipitate, PRECIPITATE_FIX, 0.0),
        (GroupLabel::TopSurface, "top_surface_freeze", top),
        (GroupLabel::BottomSurface, "bottom_surface_freeze", bottom),
    ] {
        let group = label.group_name();
        script
            .fix(fix, group, "setforce 0.0 0.0 0.0")?
            .fix(&format!("{}_nve", group), group, "nve")?;
        if fresh {
            script.velocity(
                group,
                &format!("set {} units box", components(config.shear_axis, velocity)),
            )?;
        }
    }
    Ok(())
}

fn declare_outputs(
    script: &mut InputScript,
    workspace: &StageWorkspace,
    config: &ShearConfig,
) -> Result<(), ScriptError> {
    script
        .thermo_style(&THERMO_COLUMNS)?
        .thermo(config.thermo_every)?
        .dump_custom(
            "trajectory",
            "all",
            config.dump_every,
            &workspace.dump(&format!("{}*", DUMP_PREFIX)),
            &config.dump_columns,
        )?
        .restart(
            config.restart_every,
            &workspace.restart(&format!("{}*", RESTART_PREFIX)),
        )?;
    Ok(())
}

/// The stage's directive script: displacement, regions, groups, kinematics, outputs, run.
pub fn script(
    workspace: &StageWorkspace,
    data: &Path,
    potential: &PotentialModel,
    log_path: &Path,
    periodicity: &Periodicity,
    plan: &ShearPlan,
    config: &ShearConfig,
) -> Result<InputScript, ScriptError> {
    let mut script = InputScript::new();
    script.comment("dislocation/precipitate interaction under shear");
    script
        .log(log_path)?
        .metal_setup(periodicity)?
        .read_data(data)?
        .potential(potential)?
        .command(format!(
            "displace_atoms all move {} {} {} units box",
            plan.displacement.x, plan.displacement.y, plan.displacement.z
        ))?;

    let precipitate = GroupLabel::Precipitate.group_name();
    let top = GroupLabel::TopSurface.group_name();
    let bottom = GroupLabel::BottomSurface.group_name();
    script
        .region(&plan.layout.precipitate)?
        .region(&plan.layout.top_slab)?
        .region(&plan.layout.bottom_slab)?
        .group_region(precipitate, &plan.layout.precipitate.name)?
        .group_region("top_slab", &plan.layout.top_slab.name)?
        .group_subtract(top, "top_slab", &[precipitate])?
        .group_region("bottom_slab", &plan.layout.bottom_slab.name)?
        .group_subtract(bottom, "bottom_slab", &[precipitate, top])?
        .group_subtract(
            GroupLabel::Mobile.group_name(),
            "all",
            &[precipitate, top, bottom],
        )?;

    declare_diagnostics(&mut script)?;
    declare_kinematics(&mut script, config, true)?;
    script.write_dump(
        precipitate,
        &workspace.output(PRECIPITATE_IDS_NAME),
        &["id".to_string()],
    )?;
    declare_outputs(&mut script, workspace, config)?;
    script
        .run(config.steps)?
        .write_data(&workspace.output(&config.final_name))?;
    Ok(script)
}

/// Continues the trajectory from the newest checkpoint.
///
/// Groups and velocities travel with the restart file; the potential, computes, fixes and
/// outputs are declared again exactly as in the main script.
pub fn resume_script(
    workspace: &StageWorkspace,
    potential: &PotentialModel,
    config: &ShearConfig,
) -> Result<InputScript, ScriptError> {
    let mut script = InputScript::new();
    script.comment("resume from the newest restart file");
    script
        .command(format!(
            "log {} append",
            workspace.log("log.resume.lammps").display()
        ))?
        .read_restart(&workspace.restart(&format!("{}*", RESTART_PREFIX)))?
        .potential(potential)?;
    declare_diagnostics(&mut script)?;
    declare_kinematics(&mut script, config, false)?;
    declare_outputs(&mut script, workspace, config)?;
    script
        .command(format!("run {} upto", config.steps))?
        .write_data(&workspace.output(&config.final_name))?;
    Ok(script)
}

/// Runs the shear simulation on the relaxed configuration.
#[instrument(skip_all, name = "shear_workflow")]
pub fn run(
    ctx: &RunContext,
    input: &RelaxedConfiguration,
    config: &ShearConfig,
) -> Result<ShearResult, PipelineError> {
    ctx.reporter.report(Progress::StageStart { stage: STAGE });

    // === Phase 0: Validation and geometry ===
    ctx.reporter.report(Progress::PhaseStart { name: "Geometry" });
    ctx.validate_potential(STAGE)?;
    let relaxed = input.artifact().load(STAGE)?;
    let plan = plan(&relaxed, config)?;
    for label in GroupLabel::ALL {
        info!("Group {}: {} atoms", label, plan.partition.count(label));
    }
    ctx.reporter.report(Progress::Message(
        GroupLabel::ALL
            .map(|label| format!("{} {}", label, plan.partition.count(label)))
            .join(", "),
    ));
    ctx.reporter.report(Progress::PhaseFinish);

    // === Phase 1: Scripts ===
    let workspace = ctx.workspace(STAGE)?;
    workspace
        .ensure()
        .map_err(PipelineError::io(STAGE, &workspace.root))?;
    let potential = ctx.engine_potential(STAGE)?;
    let data = absolute(STAGE, input.path())?;
    let periodicity = relaxed.simulation_box.periodicity;
    let script = script(
        &workspace,
        &data,
        &potential,
        &ctx.engine_log_path(&workspace),
        &periodicity,
        &plan,
        config,
    )
    .map_err(PipelineError::script(STAGE))?;
    let resume_path = workspace.restart(RESUME_SCRIPT_NAME);
    resume_script(&workspace, &potential, config)
        .map_err(PipelineError::script(STAGE))?
        .write_to_path(&resume_path)
        .map_err(PipelineError::io(STAGE, &resume_path))?;

    for path in [
        workspace.output(&config.final_name),
        workspace.output(PRECIPITATE_IDS_NAME),
    ] {
        discard_stale(&path).map_err(PipelineError::io(STAGE, &path))?;
    }

    // === Phase 2: Dynamics ===
    ctx.reporter.report(Progress::PhaseStart { name: "Dynamics" });
    ctx.reporter.report(Progress::TaskStart {
        total: config.steps,
    });
    let mut last_step = 0u64;
    ctx.run_engine(&workspace, &script, &mut |line| {
        if let Some(row) = super::relax::thermo_row(line, THERMO_COLUMNS.len()) {
            let step = row[0] as u64;
            if step > last_step {
                ctx.reporter.report(Progress::TaskIncrement {
                    amount: step - last_step,
                });
                last_step = step;
            }
            ctx.reporter.report(Progress::StatusUpdate {
                text: format!("T = {:.1} K", row[1]),
            });
        }
    })?;
    ctx.reporter.report(Progress::TaskFinish);
    ctx.reporter.report(Progress::PhaseFinish);

    // === Phase 3: Outputs ===
    let log_path = ctx.engine_log_path(&workspace);
    let log = EngineLog::read(&log_path).map_err(|source| PipelineError::Log {
        stage: STAGE,
        path: log_path.clone(),
        source,
    })?;
    let table = ThermoTable::merge(&log.thermo_tables());
    let last_step = table.as_ref().and_then(ThermoTable::last_step);
    let thermo_csv = match &table {
        Some(table) => {
            let path = workspace.log("thermo.csv");
            table.write_csv(&path).map_err(|source| PipelineError::Log {
                stage: STAGE,
                path: path.clone(),
                source,
            })?;
            Some(path)
        }
        None => None,
    };

    let ids_path = workspace.output(PRECIPITATE_IDS_NAME);
    let frame = read_last_frame(&ids_path).map_err(|source| PipelineError::Dump {
        stage: STAGE,
        path: ids_path.clone(),
        source,
    })?;
    let expected = plan.partition.count(GroupLabel::Precipitate);
    if frame.len() != expected {
        warn!(
            "Engine placed {} atoms in the precipitate, the in-process partition has {}",
            frame.len(),
            expected
        );
    }

    let final_path = workspace.output(&config.final_name);
    let mut final_config = LammpsDataFile::read_from_path(&final_path)
        .map_err(PipelineError::data_file(STAGE, &final_path))?;
    if !final_config.same_ids_as(&relaxed) {
        return Err(PipelineError::Artifact {
            stage: STAGE,
            message: format!(
                "final configuration has {} atoms, the relaxed input had {}, or the atom ids differ",
                final_config.len(),
                relaxed.len()
            ),
        });
    }
    final_config.set_periodicity(periodicity);
    ConfigurationArtifact::record(STAGE, &final_path, &final_config)?;

    let step_files = |dir: PathBuf, prefix: &str| -> Result<Vec<PathBuf>, PipelineError> {
        Ok(list_step_files(&dir, prefix)
            .map_err(PipelineError::io(STAGE, &dir))?
            .into_iter()
            .map(|(_, path)| path)
            .collect())
    };
    let trajectory = step_files(workspace.dump_dir(), DUMP_PREFIX)?;
    let restarts = step_files(workspace.restarts_dir(), RESTART_PREFIX)?;
    info!(
        "Dynamics finished at step {}: {} trajectory frames, {} restart files",
        last_step.unwrap_or_default(),
        trajectory.len(),
        restarts.len()
    );

    Ok(ShearResult {
        final_path,
        group_counts: GroupLabel::ALL.map(|label| (label, plan.partition.count(label))),
        surface_velocities: surface_velocities(config.shear_velocity),
        last_step,
        thermo_csv,
        resume_script: resume_path,
        trajectory,
        restarts,
    })
}
