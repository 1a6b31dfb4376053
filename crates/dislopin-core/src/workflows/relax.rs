use crate::core::io::lammps_data::LammpsDataFile;
use crate::core::io::log::{EngineLog, MinimizationStats, StoppingCriterion, ThermoTable};
use crate::core::io::traits::ConfigurationFile;
use crate::core::models::potential::PotentialModel;
use crate::engine::artifact::{BuiltConfiguration, ConfigurationArtifact, RelaxedConfiguration};
use crate::engine::config::RelaxConfig;
use crate::engine::context::{RunContext, absolute};
use crate::engine::error::PipelineError;
use crate::engine::progress::Progress;
use crate::engine::script::{InputScript, ScriptError};
use crate::engine::workspace::{Stage, StageWorkspace, discard_stale};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

const STAGE: Stage = Stage::Relax;
const THERMO_COLUMNS: [&str; 3] = ["step", "pe", "fnorm"];
/// Relative energy rise tolerated between thermo rows before the trace counts as increasing.
const ENERGY_RISE_TOLERANCE: f64 = 1e-10;

/// How a minimization ended. Only [`MinimizationStatus::Converged`] means a tolerance was met;
/// the other outcomes still persist the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinimizationStatus {
    Converged,
    IterationCapExceeded,
    EvaluationCapExceeded,
    Stalled,
}

impl MinimizationStatus {
    pub fn from_criterion(criterion: &StoppingCriterion) -> Self {
        match criterion {
            StoppingCriterion::EnergyTolerance
            | StoppingCriterion::ForceTolerance
            | StoppingCriterion::ForcesZero => Self::Converged,
            StoppingCriterion::MaxIterations => Self::IterationCapExceeded,
            StoppingCriterion::MaxForceEvaluations => Self::EvaluationCapExceeded,
            StoppingCriterion::LinesearchAlphaZero
            | StoppingCriterion::QuadraticFactorsZero
            | StoppingCriterion::Other(_) => Self::Stalled,
        }
    }

    pub fn is_converged(self) -> bool {
        self == Self::Converged
    }
}

impl fmt::Display for MinimizationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Converged => "converged",
            Self::IterationCapExceeded => "iteration-cap-exceeded",
            Self::EvaluationCapExceeded => "evaluation-cap-exceeded",
            Self::Stalled => "stalled",
        })
    }
}

#[derive(Debug, Clone)]
pub struct RelaxResult {
    pub artifact: RelaxedConfiguration,
    pub status: MinimizationStatus,
    pub stats: MinimizationStats,
    /// Potential energy at every thermo row of the minimization (eV).
    pub energy_trace: Vec<f64>,
    pub dump_path: PathBuf,
    pub thermo_csv: Option<PathBuf>,
}

/// True when no energy in `trace` exceeds its predecessor by more than the relative tolerance.
pub fn is_non_increasing(trace: &[f64]) -> bool {
    trace
        .windows(2)
        .all(|w| w[1] <= w[0] + ENERGY_RISE_TOLERANCE * w[0].abs().max(1.0))
}

/// The stage's single directive script.
///
/// The boundary flags come from the upstream artifact; they are never re-derived here.
pub fn script(
    ctx: &RunContext,
    workspace: &StageWorkspace,
    input: &BuiltConfiguration,
    config: &RelaxConfig,
) -> Result<InputScript, PipelineError> {
    let potential = ctx.engine_potential(STAGE)?;
    let data = absolute(STAGE, input.path())?;
    let mut script = InputScript::new();
    script.comment("energy minimization of the built configuration");
    build_script(&mut script, ctx, workspace, &data, input, &potential, config)
        .map_err(PipelineError::script(STAGE))?;
    Ok(script)
}

fn build_script(
    script: &mut InputScript,
    ctx: &RunContext,
    workspace: &StageWorkspace,
    data: &Path,
    input: &BuiltConfiguration,
    potential: &PotentialModel,
    config: &RelaxConfig,
) -> Result<(), ScriptError> {
    script
        .log(&ctx.engine_log_path(workspace))?
        .metal_setup(&input.artifact().periodicity())?
        .read_data(data)?
        .potential(potential)?
        .compute("peratom", "all", "pe/atom")?
        .thermo(config.thermo_every)?
        .thermo_style(&THERMO_COLUMNS)?
        .minimize(
            config.energy_tolerance,
            config.force_tolerance,
            config.max_iterations,
            config.max_evaluations,
        )?
        .write_dump("all", &workspace.dump(&config.dump_name), &config.dump_columns)?
        .write_data(&workspace.output(&config.output_name))?;
    Ok(())
}

/// Minimizes the built configuration and persists the relaxed one with its manifest.
#[instrument(skip_all, name = "relax_workflow")]
pub fn run(
    ctx: &RunContext,
    input: &BuiltConfiguration,
    config: &RelaxConfig,
) -> Result<RelaxResult, PipelineError> {
    ctx.reporter.report(Progress::StageStart { stage: STAGE });

    // === Phase 0: Validation and workspace ===
    ctx.reporter.report(Progress::PhaseStart {
        name: "Validation",
    });
    ctx.validate_potential(STAGE)?;
    let initial = input.artifact().load(STAGE)?;
    let workspace = ctx.workspace(STAGE)?;
    workspace
        .ensure()
        .map_err(PipelineError::io(STAGE, &workspace.root))?;
    let script = script(ctx, &workspace, input, config)?;
    for path in [
        workspace.output(&config.output_name),
        workspace.dump(&config.dump_name),
    ] {
        discard_stale(&path).map_err(PipelineError::io(STAGE, &path))?;
    }
    ctx.reporter.report(Progress::PhaseFinish);

    // === Phase 1: Minimization ===
    ctx.reporter.report(Progress::PhaseStart {
        name: "Minimization",
    });
    ctx.reporter.report(Progress::TaskStart {
        total: config.max_iterations,
    });
    let mut last_step = 0u64;
    ctx.run_engine(&workspace, &script, &mut |line| {
        if let Some(row) = thermo_row(line, THERMO_COLUMNS.len()) {
            let step = row[0] as u64;
            if step > last_step {
                ctx.reporter.report(Progress::TaskIncrement {
                    amount: step - last_step,
                });
                last_step = step;
            }
            ctx.reporter.report(Progress::StatusUpdate {
                text: format!("E = {:.4} eV", row[1]),
            });
        }
    })?;
    ctx.reporter.report(Progress::TaskFinish);
    ctx.reporter.report(Progress::PhaseFinish);

    // === Phase 2: Outcome and verification ===
    let log_path = ctx.engine_log_path(&workspace);
    let log = EngineLog::read(&log_path).map_err(|source| PipelineError::Log {
        stage: STAGE,
        path: log_path.clone(),
        source,
    })?;
    let stats = log
        .minimization_stats()
        .map_err(|source| PipelineError::Log {
            stage: STAGE,
            path: log_path.clone(),
            source,
        })?;
    let status = MinimizationStatus::from_criterion(&stats.criterion);
    let table = ThermoTable::merge(&log.thermo_tables());
    let energy_trace = table
        .as_ref()
        .and_then(|t| t.column("PotEng"))
        .unwrap_or_default();
    if !is_non_increasing(&energy_trace) {
        warn!("Potential energy increased during minimization");
    }
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

    let output = workspace.output(&config.output_name);
    let mut relaxed = LammpsDataFile::read_from_path(&output)
        .map_err(PipelineError::data_file(STAGE, &output))?;
    if !relaxed.same_ids_as(&initial) {
        return Err(PipelineError::Artifact {
            stage: STAGE,
            message: format!(
                "relaxed configuration has {} atoms, input had {}, or the atom ids differ",
                relaxed.len(),
                initial.len()
            ),
        });
    }
    relaxed.set_periodicity(input.artifact().periodicity());
    let artifact = ConfigurationArtifact::record(STAGE, &output, &relaxed)?;

    ctx.reporter.report(Progress::Message(format!(
        "minimization {} after {} iterations",
        status, stats.iterations
    )));
    match status {
        MinimizationStatus::Converged => info!(
            "Minimization converged ({}) after {} iterations: {:.6} -> {:.6} eV",
            stats.criterion, stats.iterations, stats.energies[0], stats.energies[2]
        ),
        other => warn!(
            "Minimization {} ({}) after {} iterations; configuration persisted anyway",
            other, stats.criterion, stats.iterations
        ),
    }

    Ok(RelaxResult {
        artifact: RelaxedConfiguration::new(artifact),
        status,
        stats,
        energy_trace,
        dump_path: workspace.dump(&config.dump_name),
        thermo_csv,
    })
}

/// The values of a thermo row with `columns` numeric fields, if `line` is one.
pub(crate) fn thermo_row(line: &str, columns: usize) -> Option<Vec<f64>> {
    let values: Vec<f64> = line
        .split_whitespace()
        .map(|t| t.parse::<f64>().ok())
        .collect::<Option<_>>()?;
    (values.len() == columns).then_some(values)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::simulation_box::{Axis, Periodicity};
    use crate::engine::config::{PathsConfig, RelaxConfigBuilder};
    use crate::engine::progress::ProgressReporter;
    use crate::workflows::testing::{FakeLammps, grid, potential_file, recording_reporter};
    use std::fs;

    fn relax_config() -> RelaxConfig {
        RelaxConfigBuilder::new()
            .energy_tolerance(1e-6)
            .force_tolerance(1e-8)
            .max_iterations(1000)
            .max_evaluations(10000)
            .thermo_every(10)
            .dump_columns(["id", "x", "y", "z", "c_peratom"].map(String::from).to_vec())
            .output_name("output.lmp")
            .dump_name("dump")
            .build()
            .unwrap()
    }

    fn built_artifact(paths: &PathsConfig) -> BuiltConfiguration {
        let workspace = paths.workspace(Stage::Build);
        workspace.ensure().unwrap();
        let path = workspace.output("input.lmp");
        let config = grid([20.0; 3], 2.5, Periodicity::slab(Axis::Y));
        LammpsDataFile::write_to_path(&config, &path).unwrap();
        ConfigurationArtifact::record(Stage::Build, &path, &config).unwrap();
        BuiltConfiguration::open(&path).unwrap()
    }

    #[test]
    fn criteria_map_to_statuses() {
        use StoppingCriterion::*;
        assert_eq!(
            MinimizationStatus::from_criterion(&EnergyTolerance),
            MinimizationStatus::Converged
        );
        assert_eq!(
            MinimizationStatus::from_criterion(&MaxIterations),
            MinimizationStatus::IterationCapExceeded
        );
        assert_eq!(
            MinimizationStatus::from_criterion(&MaxForceEvaluations).to_string(),
            "evaluation-cap-exceeded"
        );
        assert_eq!(
            MinimizationStatus::from_criterion(&LinesearchAlphaZero),
            MinimizationStatus::Stalled
        );
    }

    #[test]
    fn energy_trace_monotonicity() {
        assert!(is_non_increasing(&[-10.0, -10.5, -10.5, -10.6]));
        assert!(!is_non_increasing(&[-10.0, -10.5, -10.4]));
        assert!(is_non_increasing(&[]));
    }

    #[test]
    fn thermo_rows_are_recognized_by_width() {
        assert_eq!(
            thermo_row("  120   -1000.5  0.01", 3),
            Some(vec![120.0, -1000.5, 0.01])
        );
        assert_eq!(thermo_row("120 -1000.5", 3), None);
        assert_eq!(thermo_row("Step PotEng Fnorm", 3), None);
        assert_eq!(thermo_row("800 atoms in group", 3), None);
    }

    #[test]
    fn script_keeps_upstream_boundary_and_directive_order() {
        let dir = tempfile::tempdir().unwrap();
        let paths = PathsConfig::new(dir.path());
        let potential = potential_file(dir.path());
        let engine = FakeLammps::default();
        let reporter = ProgressReporter::new();
        let ctx = RunContext::new(&paths, &potential, &engine, &reporter);
        let input = built_artifact(&paths);
        let workspace = ctx.workspace(Stage::Relax).unwrap();

        let text = script(&ctx, &workspace, &input, &relax_config())
            .unwrap()
            .render();
        assert!(text.contains("boundary p f p\n"));
        assert!(text.contains("compute peratom all pe/atom\n"));
        assert!(text.contains("minimize 0.000001 0.00000001 1000 10000\n"));
        assert!(text.contains("custom"));
        assert!(text.contains(" id x y z c_peratom\n"));
        let commands: Vec<&str> = text
            .lines()
            .filter_map(|line| line.split_whitespace().next())
            .collect();
        let order = [
            "log",
            "units",
            "read_data",
            "pair_style",
            "pair_coeff",
            "minimize",
            "write_dump",
            "write_data",
        ];
        let positions: Vec<usize> = order
            .iter()
            .map(|d| commands.iter().position(|c| c == d).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{commands:?}");
    }

    #[test]
    fn converged_relaxation_persists_same_atoms() {
        let dir = tempfile::tempdir().unwrap();
        let paths = PathsConfig::new(dir.path());
        let potential = potential_file(dir.path());
        let engine = FakeLammps::default();
        let (reporter, events) = recording_reporter();
        let ctx = RunContext::new(&paths, &potential, &engine, &reporter);
        let input = built_artifact(&paths);

        let result = run(&ctx, &input, &relax_config()).unwrap();
        assert_eq!(result.status, MinimizationStatus::Converged);
        {
            let events = events.lock().unwrap();
            assert!(matches!(
                events[0],
                Progress::StageStart {
                    stage: Stage::Relax
                }
            ));
            assert!(events.iter().any(|e| matches!(
                e,
                Progress::StatusUpdate { text } if text == "E = -1000.4500 eV"
            )));
            assert!(events.iter().any(|e| matches!(
                e,
                Progress::Message(text) if text == "minimization converged after 20 iterations"
            )));
        }
        assert!(result.stats.iterations < 1000);
        assert!(is_non_increasing(&result.energy_trace));
        assert_eq!(result.energy_trace.len(), 3);
        assert!(result.dump_path.is_file());
        assert!(fs::read_to_string(result.thermo_csv.unwrap())
            .unwrap()
            .starts_with("Step,PotEng,Fnorm"));

        let relaxed = RelaxedConfiguration::open(result.artifact.path()).unwrap();
        assert_eq!(relaxed.artifact().periodicity(), Periodicity::slab(Axis::Y));
        assert_eq!(relaxed.artifact().manifest.atom_count, 512);
        assert!(dir.path().join("02_minimize/logs/relax.in").is_file());
    }

    #[test]
    fn iteration_cap_is_reported_but_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let paths = PathsConfig::new(dir.path());
        let potential = potential_file(dir.path());
        let engine = FakeLammps {
            criterion: "max iterations",
            ..FakeLammps::default()
        };
        let reporter = ProgressReporter::new();
        let ctx = RunContext::new(&paths, &potential, &engine, &reporter);
        let input = built_artifact(&paths);

        let result = run(&ctx, &input, &relax_config()).unwrap();
        assert_eq!(result.status, MinimizationStatus::IterationCapExceeded);
        assert!(!result.status.is_converged());
        assert!(result.artifact.path().is_file());
    }
}
