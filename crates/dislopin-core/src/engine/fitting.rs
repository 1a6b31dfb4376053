use super::config::ElasticFitSettings;
use super::lammps::{EngineJob, MdEngine};
use super::process::ProcessError;
use super::script::{InputScript, ScriptError};
use super::workspace::StageWorkspace;
use crate::core::elements;
use crate::core::geometry::region::{NamedRegion, Region};
use crate::core::io::log::{EngineLog, LogParseError};
use crate::core::models::potential::{ElasticConstants, FittedPotential, PotentialModel};
use crate::core::models::simulation_box::Periodicity;
use crate::core::units::bar_to_gpa;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info, instrument};

const RECORD_PREFIX: &str = "FIT";
/// Conventional cubic cells per edge of the fitting block.
const BLOCK_CELLS: u32 = 4;

#[derive(Debug, Error)]
pub enum FitError {
    #[error("Potential declares no element")]
    NoElement,
    #[error("No atomic mass known for element '{0}'")]
    UnknownElement(String),
    #[error(transparent)]
    Script(#[from] ScriptError),
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error("Failed to read fitting log: {0}")]
    Log(#[from] LogParseError),
    #[error("Fitting log has no '{0}' record")]
    MissingRecord(&'static str),
    #[error(
        "Fitted constants violate cubic stability (C11={c11:.1}, C12={c12:.1}, C44={c44:.1} GPa)",
        c11 = .0.c11, c12 = .0.c12, c44 = .0.c44
    )]
    Unstable(ElasticConstants),
}

/// Supplies the lattice constant and cubic elastic constants of a potential.
pub trait PotentialFitter {
    fn fit(&self, potential: &PotentialModel, workspace: &StageWorkspace)
    -> Result<FittedPotential, FitError>;
}

/// Constants supplied up front; nothing is run.
#[derive(Debug, Clone, Copy)]
pub struct KnownConstants(pub FittedPotential);

impl PotentialFitter for KnownConstants {
    fn fit(&self, _: &PotentialModel, _: &StageWorkspace) -> Result<FittedPotential, FitError> {
        if !self.0.elastic.is_mechanically_stable() {
            return Err(FitError::Unstable(self.0.elastic));
        }
        Ok(self.0)
    }
}

/// Measures the constants with the MD engine.
///
/// A periodic BCC block is relaxed under zero pressure with `box/relax`; the lattice
/// constant is read from the relaxed box. C11 and C12 follow from the normal-pressure
/// response to a symmetric ±ε stretch along x, C44 from the shear-pressure response to a
/// ±ε tilt of the xy face. Central differences cancel the residual pressure of the relaxed
/// block.
pub struct EngineFitter<'a> {
    engine: &'a dyn MdEngine,
    settings: ElasticFitSettings,
}

impl<'a> EngineFitter<'a> {
    pub fn new(engine: &'a dyn MdEngine, settings: ElasticFitSettings) -> Self {
        Self { engine, settings }
    }

    pub fn script(
        &self,
        potential: &PotentialModel,
        workspace: &StageWorkspace,
    ) -> Result<InputScript, FitError> {
        let element = potential.primary_element().ok_or(FitError::NoElement)?;
        let mass = elements::atomic_mass(element)
            .ok_or_else(|| FitError::UnknownElement(element.to_string()))?;
        let a = self.settings.lattice_guess;
        let eps = self.settings.strain;
        let edge = f64::from(BLOCK_CELLS) * a;
        let region = NamedRegion::new(
            "fit_box",
            Region::Block {
                lower: [0.0; 3],
                upper: [edge; 3],
            },
        );

        let mut script = InputScript::new();
        script
            .log(&workspace.log("fit.log"))?
            .metal_setup(&Periodicity::fully_periodic())?
            .command(format!("lattice bcc {}", a))?
            .create_box(1, &region)?
            .command("create_atoms 1 box")?
            .command(format!("mass 1 {}", mass))?
            .potential(potential)?
            .thermo_style(&["step", "pe", "lx", "ly", "lz", "pxx", "pyy", "pzz", "pxy"])?
            .command("fix fit_relax all box/relax iso 0.0 vmax 0.001")?
            .command("min_style cg")?
            .minimize(0.0, 1e-10, 5000, 50000)?
            .command("unfix fit_relax")?
            .print(&format!("{} a0 $(lx/{})", RECORD_PREFIX, BLOCK_CELLS))?
            .command("variable xlo0 equal $(xlo)")?
            .command("variable xhi0 equal $(xhi)")?
            .command("variable ly0 equal $(ly)")?;

        for (sign, tag) in [(1.0, "plus"), (-1.0, "minus")] {
            script
                .command(format!("change_box all x scale {} remap", 1.0 + sign * eps))?
                .run(0)?
                .print(&format!("{} normal_{} $(pxx) $(pyy)", RECORD_PREFIX, tag))?
                .command("change_box all x final ${xlo0} ${xhi0} remap")?;
        }

        script.command("change_box all triclinic")?;
        for (sign, tag) in [(1.0, "plus"), (-1.0, "minus")] {
            script
                .command(format!("change_box all xy final $({}*v_ly0) remap", sign * eps))?
                .run(0)?
                .print(&format!("{} shear_{} $(pxy)", RECORD_PREFIX, tag))?;
        }
        Ok(script)
    }
}

fn record<const N: usize>(
    records: &BTreeMap<String, Vec<f64>>,
    key: &'static str,
) -> Result<[f64; N], FitError> {
    records
        .get(key)
        .and_then(|values| <[f64; N]>::try_from(values.as_slice()).ok())
        .ok_or(FitError::MissingRecord(key))
}

/// Turns the `FIT` records of a fitting log into constants.
///
/// Engine pressures are compressive-positive, so a tensile strain lowers them.
pub fn constants_from_log(log: &EngineLog, strain: f64) -> Result<FittedPotential, FitError> {
    let records = log.print_records(RECORD_PREFIX)?;
    let [a0] = record::<1>(&records, "a0")?;
    let [pxx_plus, pyy_plus] = record::<2>(&records, "normal_plus")?;
    let [pxx_minus, pyy_minus] = record::<2>(&records, "normal_minus")?;
    let [pxy_plus] = record::<1>(&records, "shear_plus")?;
    let [pxy_minus] = record::<1>(&records, "shear_minus")?;

    let modulus = |plus: f64, minus: f64| bar_to_gpa(-(plus - minus) / (2.0 * strain));
    let elastic = ElasticConstants {
        c11: modulus(pxx_plus, pxx_minus),
        c12: modulus(pyy_plus, pyy_minus),
        c44: modulus(pxy_plus, pxy_minus),
    };
    if !elastic.is_mechanically_stable() {
        return Err(FitError::Unstable(elastic));
    }
    Ok(FittedPotential {
        lattice_constant: a0,
        elastic,
    })
}

impl PotentialFitter for EngineFitter<'_> {
    #[instrument(skip_all, name = "potential_fit")]
    fn fit(
        &self,
        potential: &PotentialModel,
        workspace: &StageWorkspace,
    ) -> Result<FittedPotential, FitError> {
        let script = self.script(potential, workspace)?;
        let job = EngineJob {
            stage: workspace.stage,
            script: &script,
            script_path: workspace.log("fit.in"),
            log_path: workspace.log("fit.log"),
            working_dir: workspace.root().to_path_buf(),
        };
        self.engine
            .execute(&job, &mut |line| debug!(target: "engine", "{}", line))?;

        let fitted = constants_from_log(&EngineLog::read(&job.log_path)?, self.settings.strain)?;
        info!(
            "Fitted a0 = {:.5} Å, C11 = {:.1}, C12 = {:.1}, C44 = {:.1} GPa",
            fitted.lattice_constant, fitted.elastic.c11, fitted.elastic.c12, fitted.elastic.c44
        );
        Ok(fitted)
    }
}
